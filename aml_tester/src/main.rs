/*
 * This is a small program for running the interpreter over artificial AML. It:
 *      - scans a directory (or takes a list of files) for ASL files
 *      - compiles them using `iasl` into AML files, but only if the ASL file is newer than the AML file (or
 *        there isn't a corresponding AML file)
 *      - loads each AML file, invokes `\MAIN` if it exists, and checks that nothing was leaked
 *      - prints a summary of which files passed
 */

use aml_eval::{AmlError, AmlName, Config, DebugVerbosity, Interpreter, PciAddress};
use clap::{Arg, ArgAction, ArgGroup};
use std::{
    collections::HashSet,
    ffi::OsStr,
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

enum CompilationOutcome {
    Ignored,
    IsAml(PathBuf),
    Newer(PathBuf),
    NotCompiled(PathBuf),
    Failed(PathBuf),
    Succeeded(PathBuf),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum TestResult {
    Pass,
    /// `iasl` failed to compile the ASL.
    CompileFail,
    /// The interpreter failed to load the table or run `\MAIN`.
    ParseFail,
    NotCompiled,
}

const AML_TABLE_HEADER_LENGTH: usize = 36;

fn main() -> std::io::Result<()> {
    let mut cmd = clap::Command::new("aml_tester")
        .version("v0.1.0")
        .author("Isaac Woods")
        .about("Compiles ASL files and runs them through the interpreter")
        .arg(Arg::new("no_compile").long("no-compile").action(ArgAction::SetTrue).help("Don't compile ASL to AML"))
        .arg(
            Arg::new("combined")
                .long("combined")
                .action(ArgAction::SetTrue)
                .help("Don't clear the namespace between tests"),
        )
        .arg(
            Arg::new("slack")
                .long("slack")
                .action(ArgAction::SetTrue)
                .help("Return the last result from methods without a Return"),
        )
        .arg(
            Arg::new("revision")
                .long("revision")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(u8))
                .default_value("2")
                .help("The DSDT revision to interpret tables as. Below 2 means 32-bit integers"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Trace method invocations (-v), or every scope (-vv)"),
        )
        .arg(Arg::new("path").short('p').long("path").required(false).action(ArgAction::Set).value_name("DIR"))
        .arg(
            Arg::new("files")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .value_name("FILE.{asl,aml}"),
        )
        .group(ArgGroup::new("files_list").args(["path", "files"]).required(true));
    if std::env::args().count() <= 1 {
        cmd.print_help()?;
        return Ok(());
    }
    log::set_logger(&Logger).map_err(std::io::Error::other)?;
    log::set_max_level(log::LevelFilter::Trace);

    let matches = cmd.get_matches();

    let config = Config {
        dsdt_revision: matches.get_one::<u8>("revision").copied().unwrap_or(2),
        slack_mode: matches.get_flag("slack"),
        debug_verbosity: match matches.get_count("verbose") {
            0 => DebugVerbosity::None,
            1 => DebugVerbosity::Scopes,
            _ => DebugVerbosity::AllScopes,
        },
        ..Config::default()
    };

    // Make sure we have the ability to compile ASL -> AML, if the user wants it
    let user_wants_compile = !matches.get_flag("no_compile");
    let can_compile = user_wants_compile &&
        match Command::new("iasl").arg("-v").status() {
            Ok(exit_status) if exit_status.success() => true,
            Ok(exit_status) => {
                panic!("`iasl` exited with unsuccessful status: {:?}", exit_status);
            },
            Err(_) => false,
    };

    let tests = find_tests(&matches)?;
    let compiled_files =
        tests.iter().map(|name| resolve_and_compile(name, can_compile)).collect::<std::io::Result<Vec<_>>>()?;

    if user_wants_compile
        && compiled_files.iter().any(|outcome| matches!(outcome, CompilationOutcome::NotCompiled(_)))
    {
        panic!(
            "`iasl` is not installed, but we want to compile some ASL files! Pass --no-compile, or install `iasl`"
        );
    }
    if user_wants_compile {
        let (passed, failed) = compiled_files.iter().fold((0, 0), |(passed, failed), outcome| match outcome {
            CompilationOutcome::Succeeded(_) => (passed + 1, failed),
            CompilationOutcome::Failed(_) => (passed, failed + 1),
            _ => (passed, failed),
        });
        if passed + failed > 0 {
            println!(
                "Compiled {} ASL files: {}{} passed{}, {}{} failed{}",
                passed + failed,
                termion::color::Fg(termion::color::Green),
                passed,
                termion::style::Reset,
                termion::color::Fg(termion::color::Red),
                failed,
                termion::style::Reset
            );
            println!();
        }
    }

    let mut dedup_list: HashSet<PathBuf> = HashSet::new();
    let mut summaries: HashSet<(PathBuf, TestResult)> = HashSet::new();
    let aml_files = compiled_files
        .iter()
        .filter_map(|outcome| match outcome {
            CompilationOutcome::IsAml(path) | CompilationOutcome::Newer(path) | CompilationOutcome::Succeeded(path) => {
                Some(path.clone())
            }
            CompilationOutcome::Failed(path) => {
                summaries.insert((path.clone(), TestResult::CompileFail));
                None
            }
            CompilationOutcome::NotCompiled(path) => {
                summaries.insert((path.clone(), TestResult::NotCompiled));
                None
            }
            CompilationOutcome::Ignored => None,
        })
        .filter(|path| dedup_list.insert(path.clone()))
        .collect::<Vec<_>>();

    let combined_test = matches.get_flag("combined");
    let mut interpreter = Interpreter::new(Handler, config.clone());

    let mut passed = 0;
    let mut failed = 0;
    for file_entry in aml_files {
        print!("Testing AML file: {:?}... ", file_entry);
        std::io::stdout().flush()?;

        let contents = match fs::read(&file_entry) {
            Ok(contents) if contents.len() >= AML_TABLE_HEADER_LENGTH => contents,
            _ => {
                println!("{}Not a valid table{}", termion::color::Fg(termion::color::Red), termion::style::Reset);
                summaries.insert((file_entry, TestResult::CompileFail));
                failed += 1;
                continue;
            }
        };

        if !combined_test {
            interpreter = Interpreter::new(Handler, config.clone());
        }

        match run_test(&contents[AML_TABLE_HEADER_LENGTH..], &interpreter) {
            Ok(()) => {
                println!("{}OK{}", termion::color::Fg(termion::color::Green), termion::style::Reset);
                summaries.insert((file_entry, TestResult::Pass));
                passed += 1;
            }
            Err(err) => {
                println!("{}Failed ({:?}){}", termion::color::Fg(termion::color::Red), err, termion::style::Reset);
                println!("Namespace: {}", interpreter.namespace_tree());
                summaries.insert((file_entry, TestResult::ParseFail));
                failed += 1;
            }
        }
    }

    println!("Summary:");
    for (file, status) in summaries.iter() {
        let status = match status {
            TestResult::Pass => {
                format!("{}OK{}", termion::color::Fg(termion::color::Green), termion::style::Reset)
            }
            TestResult::CompileFail => {
                format!("{}COMPILE FAIL{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
            TestResult::ParseFail => {
                format!("{}PARSE FAIL{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
            TestResult::NotCompiled => {
                format!("{}NOT COMPILED{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
        };
        println!("\t{:<50}: {}", file.display(), status);
    }
    println!(
        "\nTest results: {}{} passed{}, {}{} failed{}",
        termion::color::Fg(termion::color::Green),
        passed,
        termion::style::Reset,
        termion::color::Fg(termion::color::Red),
        failed,
        termion::style::Reset
    );
    Ok(())
}

fn run_test(stream: &[u8], interpreter: &Interpreter) -> Result<(), AmlError> {
    interpreter.load_table(stream)?;

    let main = AmlName::from_str("\\MAIN")?;
    match interpreter.invoke_method(&main, vec![]) {
        Ok(result) => println!("\\MAIN returned {}", result),
        Err(AmlError::ObjectDoesNotExist(name)) if name == main => (),
        Err(other) => return Err(other),
    }

    interpreter.leak_check()
}

fn find_tests(matches: &clap::ArgMatches) -> std::io::Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = if let Some(dir_path) = matches.get_one::<String>("path") {
        let dir_path = Path::new(dir_path);

        if fs::metadata(dir_path)?.is_dir() {
            println!("Running tests in directory: {:?}", dir_path);
            fs::read_dir(dir_path)?.filter_map(|entry| entry.ok().map(|entry| entry.path())).collect()
        } else {
            println!("Running single test: {:?}", dir_path);
            vec![dir_path.to_path_buf()]
        }
    } else {
        matches.get_many::<PathBuf>("files").unwrap_or_default().cloned().collect()
    };

    for path in &files {
        if !path.is_file() {
            println!("Not a regular file: {}", path.display());
            path.metadata()?;
        }
    }

    Ok(files)
}

/// Determine what to do with this file: ignore it, compile and then run it, or just run it. ASL files are
/// compiled if there is no AML file next to them, or if the ASL is newer.
fn resolve_and_compile(path: &Path, can_compile: bool) -> std::io::Result<CompilationOutcome> {
    if path.extension() == Some(OsStr::new("aml")) && path.metadata()?.is_file() {
        return Ok(CompilationOutcome::IsAml(path.to_path_buf()));
    }

    if path.extension() != Some(OsStr::new("asl")) || !path.metadata()?.is_file() {
        return Ok(CompilationOutcome::Ignored);
    }

    let aml_path = path.with_extension("aml");

    if aml_path.is_file() {
        let asl_last_modified = path.metadata()?.modified()?;
        let aml_last_modified = aml_path.metadata()?.modified()?;
        if asl_last_modified <= aml_last_modified {
            return Ok(CompilationOutcome::Newer(aml_path));
        }
    }

    if !can_compile {
        return Ok(CompilationOutcome::NotCompiled(path.to_path_buf()));
    }

    println!("Compiling file: {}", path.display());
    let output = Command::new("iasl").arg(path).output()?;

    if !output.status.success() {
        println!(
            "Failed to compile ASL file: {}. Output from iasl:\n {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(CompilationOutcome::Failed(path.to_path_buf()))
    } else {
        Ok(CompilationOutcome::Succeeded(aml_path))
    }
}

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

struct Handler;

impl aml_eval::Handler for Handler {
    fn read_u8(&self, address: usize) -> u8 {
        println!("read_u8 {address:#x}");
        0
    }
    fn read_u16(&self, address: usize) -> u16 {
        println!("read_u16 {address:#x}");
        0
    }
    fn read_u32(&self, address: usize) -> u32 {
        println!("read_u32 {address:#x}");
        0
    }
    fn read_u64(&self, address: usize) -> u64 {
        println!("read_u64 {address:#x}");
        0
    }

    fn write_u8(&self, address: usize, value: u8) {
        println!("write_u8 {address:#x}<-{value:#x}");
    }
    fn write_u16(&self, address: usize, value: u16) {
        println!("write_u16 {address:#x}<-{value:#x}");
    }
    fn write_u32(&self, address: usize, value: u32) {
        println!("write_u32 {address:#x}<-{value:#x}");
    }
    fn write_u64(&self, address: usize, value: u64) {
        println!("write_u64 {address:#x}<-{value:#x}");
    }

    fn read_io_u8(&self, port: u16) -> u8 {
        println!("read_io_u8 {port:#x}");
        0
    }
    fn read_io_u16(&self, port: u16) -> u16 {
        println!("read_io_u16 {port:#x}");
        0
    }
    fn read_io_u32(&self, port: u16) -> u32 {
        println!("read_io_u32 {port:#x}");
        0
    }

    fn write_io_u8(&self, port: u16, value: u8) {
        println!("write_io_u8 {port:#x}<-{value:#x}");
    }
    fn write_io_u16(&self, port: u16, value: u16) {
        println!("write_io_u16 {port:#x}<-{value:#x}");
    }
    fn write_io_u32(&self, port: u16, value: u32) {
        println!("write_io_u32 {port:#x}<-{value:#x}");
    }

    fn read_pci_u8(&self, address: PciAddress, offset: u16) -> u8 {
        println!("read_pci_u8 ({address}) {offset:#x}");
        0
    }
    fn read_pci_u16(&self, address: PciAddress, offset: u16) -> u16 {
        println!("read_pci_u16 ({address}) {offset:#x}");
        0
    }
    fn read_pci_u32(&self, address: PciAddress, offset: u16) -> u32 {
        println!("read_pci_u32 ({address}) {offset:#x}");
        0
    }

    fn write_pci_u8(&self, address: PciAddress, offset: u16, value: u8) {
        println!("write_pci_u8 ({address}) {offset:#x}<-{value:#x}");
    }
    fn write_pci_u16(&self, address: PciAddress, offset: u16, value: u16) {
        println!("write_pci_u16 ({address}) {offset:#x}<-{value:#x}");
    }
    fn write_pci_u32(&self, address: PciAddress, offset: u16, value: u32) {
        println!("write_pci_u32 ({address}) {offset:#x}<-{value:#x}");
    }

    fn nanos_since_boot(&self) -> u64 {
        0
    }

    fn stall(&self, microseconds: u64) {
        println!("Stalling for {}us", microseconds);
    }
    fn sleep(&self, milliseconds: u64) {
        println!("Sleeping for {}ms", milliseconds);
    }

    fn notify(&self, path: &AmlName, value: u64) {
        println!("Notify {} with {:#x}", path, value);
    }
}

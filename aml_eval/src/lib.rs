//! `aml_eval` is an interpreter for ACPI Machine Language (AML), the bytecode that firmware puts in the DSDT and
//! SSDTs to describe the devices of a platform and how to drive them. The crate is `no_std`, but needs `alloc`.
//!
//! An [`Interpreter`] is created with a [`Handler`], which gives it access to the hardware (memory, I/O ports,
//! PCI configuration space) and some platform services. Tables are loaded with [`Interpreter::load_table`], which
//! executes them to build the namespace, and then objects in it can be evaluated by path.
//!
//! ### Using the interpreter
//! ```ignore
//! let interpreter = Interpreter::new(MyHandler, Config::default());
//! interpreter.load_table(dsdt_body)?;
//! interpreter.initialize_devices()?;
//!
//! for device in interpreter.enumerate_devices()? {
//!     let resources = interpreter.device_resources(&device.path.as_string())?;
//! }
//! ```
//!
//! Every entry point takes the interpreter's lock for its whole duration, so the interpreter can be shared between
//! threads, but only one of them will be executing AML at a time.

#![no_std]

#[cfg(test)]
extern crate std;

extern crate alloc;

pub mod convert;
pub mod device;
mod expression;
mod method;
mod name_object;
pub mod namespace;
pub mod object;
pub mod op_region;
mod opcode;
mod pkg_length;
pub mod resource;
mod statement;
mod stream;
mod term_object;

#[cfg(test)]
mod test_utils;

pub use crate::{
    device::{DeviceInfo, StatusObject},
    namespace::{AmlHandle, AmlName, NameSeg},
    object::{Object, ObjectType},
    op_region::RegionSpace,
    opcode::Opcode,
    resource::Resource,
    term_object::INTERPRETER_REVISION,
};
pub use pci_types::PciAddress;

use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};
use log::{debug, error};
use method::Executor;
use namespace::{LoadGroup, Namespace};
use spinning_top::Spinlock;

pub struct Interpreter {
    handler: Box<dyn Handler>,
    config: Config,
    pub(crate) namespace: Spinlock<Namespace>,
}

/// Identifies the objects created by loading a table, so they can be removed again with
/// [`Interpreter::unload_table`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TableHandle(LoadGroup);

impl Interpreter {
    pub fn new<H>(handler: H, config: Config) -> Interpreter
    where
        H: Handler + 'static,
    {
        Interpreter {
            namespace: Spinlock::new(Namespace::new(config.os_name)),
            handler: Box::new(handler),
            config,
        }
    }

    /// Load a definition block. `stream` is the body of the table, without its header. The table is executed at
    /// the root scope, creating the objects it defines. If it fails part of the way through, the objects created
    /// before the error are left in the namespace.
    pub fn load_table(&self, stream: &[u8]) -> Result<TableHandle, AmlError> {
        debug!("Loading AML table of {:#x} bytes", stream.len());
        let code: Arc<[u8]> = Arc::from(stream);

        self.with_executor(|executor| {
            let group = executor.namespace.new_group();
            executor.load_block(&code, group)?;
            Ok(TableHandle(group))
        })
    }

    /// Remove every object that was created by loading a table.
    pub fn unload_table(&self, table: TableHandle) {
        self.namespace.lock().remove_subtree_by_group(table.0);
    }

    /// Evaluate the object at an absolute path. Methods are invoked with no arguments, fields are read, and
    /// anything else is returned directly.
    pub fn evaluate(&self, path: &str) -> Result<Object, AmlError> {
        let path = AmlName::from_str(path)?;
        self.with_executor(|executor| {
            let handle = executor.namespace.lookup(&path)?;
            let handle = executor.namespace.follow_aliases(handle)?;
            let result = executor.evaluate_handle(handle, Vec::new())?;
            let snapshot = result.snapshot();
            Ok(snapshot)
        })
    }

    /// Invoke the method at `path` with `args`.
    pub fn invoke_method(&self, path: &AmlName, args: Vec<Object>) -> Result<Object, AmlError> {
        self.with_executor(|executor| {
            let handle = executor.namespace.lookup(path)?;
            let handle = executor.namespace.follow_aliases(handle)?;
            let args = args.into_iter().map(|arg| executor.wrap(arg)).collect();
            let result = executor.evaluate_handle(handle, args)?;
            let snapshot = result.snapshot();
            Ok(snapshot)
        })
    }

    /// Evaluate the `_CRS` of the device at `path`, and parse the resources it describes.
    pub fn device_resources(&self, path: &str) -> Result<Vec<Resource>, AmlError> {
        let path = AmlName::from_str(path)?;
        self.with_executor(|executor| {
            device_node(executor, &path)?;
            executor.current_resources(&path)
        })
    }

    /// Get the hardware id (`_HID`) of the device at `path`, decoding EISA ids into their string form.
    pub fn device_hardware_id(&self, path: &str) -> Result<String, AmlError> {
        let path = AmlName::from_str(path)?;
        self.with_executor(|executor| {
            device_node(executor, &path)?;
            executor.hardware_id(&path)?.ok_or(AmlError::NoSuchDevice)
        })
    }

    /// Get the compatible ids (`_CID`) of the device at `path`. Devices without a `_CID` have none.
    pub fn device_compatible_id(&self, path: &str) -> Result<Vec<String>, AmlError> {
        let path = AmlName::from_str(path)?;
        self.with_executor(|executor| {
            device_node(executor, &path)?;
            executor.compatible_ids(&path)
        })
    }

    /// Find the devices that are present, sorted by their ids.
    pub fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AmlError> {
        self.with_executor(|executor| executor.enumerate_devices())
    }

    /// Run the `_INI` methods of `\_SB` and the devices that are present. This should be done once, after the
    /// DSDT and any SSDTs have been loaded.
    pub fn initialize_devices(&self) -> Result<(), AmlError> {
        self.with_executor(|executor| executor.initialize_devices())
    }

    /// Check that every live object is reachable from the namespace. Objects that are alive but unreachable have
    /// been leaked, for example by a reference cycle.
    pub fn leak_check(&self) -> Result<(), AmlError> {
        let namespace = self.namespace.lock();
        let live = namespace.tracker().live();
        let reachable = namespace.reachable_objects();
        if live == reachable {
            Ok(())
        } else {
            Err(AmlError::LeakedObjects { live, reachable })
        }
    }

    /// Render the namespace as a tree, for debugging.
    pub fn namespace_tree(&self) -> String {
        format!("{}", self.namespace.lock())
    }

    /// The object at `path`, without evaluating it.
    #[cfg(test)]
    pub(crate) fn namespace_object(&self, path: &str) -> Result<Object, AmlError> {
        let namespace = self.namespace.lock();
        let handle = namespace.lookup(&AmlName::from_str(path)?)?;
        let object = namespace.get(handle)?;
        let snapshot = object.snapshot();
        Ok(snapshot)
    }

    fn with_executor<T, F>(&self, f: F) -> Result<T, AmlError>
    where
        F: FnOnce(&mut Executor<'_>) -> Result<T, AmlError>,
    {
        let mut namespace = self.namespace.lock();
        let mut executor = Executor::new(&*self.handler, &self.config, &mut namespace);
        f(&mut executor)
    }
}

fn device_node(executor: &Executor<'_>, path: &AmlName) -> Result<AmlHandle, AmlError> {
    match executor.namespace.lookup(path) {
        Ok(handle) => executor.namespace.follow_aliases(handle),
        Err(AmlError::ObjectDoesNotExist(_)) => Err(AmlError::NoSuchDevice),
        Err(err) => Err(err),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum DebugVerbosity {
    /// Print no debug information
    None,
    /// Print heads and tails when entering and leaving scopes of major objects, but not more minor ones.
    Scopes,
    /// Print heads and tails when entering and leaving scopes of all objects.
    AllScopes,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The revision of the DSDT. Tables with a revision below 2 use 32-bit integers.
    pub dsdt_revision: u8,
    /// Return the result of the last expression from methods that end without a `Return`, as some firmware
    /// expects. Otherwise they return an uninitialized object.
    pub slack_mode: bool,
    pub debug_verbosity: DebugVerbosity,
    /// The value returned by `\_OS`.
    pub os_name: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dsdt_revision: 2,
            slack_mode: false,
            debug_verbosity: DebugVerbosity::None,
            os_name: "Microsoft Windows NT",
        }
    }
}

/// The broad class of an [`AmlError`]. Kernels usually care about which of these went wrong rather than the
/// details, which are mostly useful for debugging firmware.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// The AML, or data returned by it, is malformed.
    IllegalSequence,
    InvalidArgument,
    NotFound,
    NoDevice,
    AlreadyExists,
    OutOfMemory,
    Unimplemented,
}

#[derive(Clone, PartialEq, Debug)]
pub enum AmlError {
    RunOutOfStream,
    IllegalOpcode(u16),
    /// An opcode was found somewhere it can't appear, such as a statement where an expression was expected.
    UnexpectedOpcode(Opcode),
    InvalidPkgLength,
    InvalidStringConstant,

    InvalidNameSeg,
    InvalidName(Option<AmlName>),
    InvalidNormalizedName(AmlName),
    RootHasNoParent,
    EmptyNamesAreInvalid,
    NameCollision(AmlName),
    ObjectDoesNotExist(AmlName),
    InvalidHandle(AmlHandle),
    AliasLoop(AmlName),

    ObjectNotOfExpectedType { expected: ObjectType, got: ObjectType },
    InvalidConversion,
    UninitializedValue,
    InvalidBcd(u64),
    IndexOutOfBounds,
    /// A reference to a local or argument of a method that has since returned.
    DanglingReference,
    InvalidStoreTarget,
    DivideByZero,
    InvalidMatchOpcode(u8),

    InvalidFieldFlags,
    FieldInvalidAddress,
    FieldInvalidAccessSize,
    FieldOutOfRegion,
    BufferFieldOutOfBounds,
    UnsupportedRegionSpace(RegionSpace),
    /// A PCI configuration region that isn't inside a device, so has no `_ADR` to locate the function.
    PciRegionWithoutDevice,

    TooManyArgs { expected: usize, got: usize },
    MethodDepthExceeded,
    /// Expressions or statements were nested more deeply than the interpreter can follow.
    NestingTooDeep,
    SyncLevelTooLow { current: u8, requested: u8 },
    /// Sync levels run from 0 to 15.
    InvalidSyncLevel(u8),
    BreakOrContinueOutsideLoop,
    MutexNotAcquired,
    /// Firmware executed `DefFatal`. The handler will already have been told.
    FatalError,

    NoSuchDevice,
    /// A firmware method, such as `_CRS` or `_HID`, returned an object of a type it is not allowed to return.
    InvalidReturnType { expected: ObjectType, got: ObjectType },
    InvalidStatusObject,
    InvalidResourceDescriptor,
    ResourceDescriptorTooShort,
    ReservedResourceType,
    ResourceChecksumMismatch,

    OutOfMemory,
    Unimplemented,
    LeakedObjects { live: usize, reachable: usize },
}

impl AmlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AmlError::RunOutOfStream
            | AmlError::IllegalOpcode(_)
            | AmlError::UnexpectedOpcode(_)
            | AmlError::InvalidPkgLength
            | AmlError::InvalidStringConstant
            | AmlError::InvalidNameSeg
            | AmlError::InvalidFieldFlags
            | AmlError::InvalidMatchOpcode(_)
            | AmlError::BreakOrContinueOutsideLoop
            | AmlError::MutexNotAcquired
            | AmlError::MethodDepthExceeded
            | AmlError::NestingTooDeep
            | AmlError::SyncLevelTooLow { .. }
            | AmlError::AliasLoop(_)
            | AmlError::FatalError
            | AmlError::InvalidReturnType { .. }
            | AmlError::InvalidStatusObject
            | AmlError::InvalidResourceDescriptor
            | AmlError::ResourceDescriptorTooShort
            | AmlError::ReservedResourceType
            | AmlError::ResourceChecksumMismatch
            | AmlError::LeakedObjects { .. } => ErrorKind::IllegalSequence,

            AmlError::InvalidName(_)
            | AmlError::InvalidNormalizedName(_)
            | AmlError::RootHasNoParent
            | AmlError::EmptyNamesAreInvalid
            | AmlError::InvalidHandle(_)
            | AmlError::ObjectNotOfExpectedType { .. }
            | AmlError::InvalidConversion
            | AmlError::UninitializedValue
            | AmlError::InvalidBcd(_)
            | AmlError::IndexOutOfBounds
            | AmlError::DanglingReference
            | AmlError::InvalidStoreTarget
            | AmlError::DivideByZero
            | AmlError::FieldInvalidAddress
            | AmlError::FieldInvalidAccessSize
            | AmlError::FieldOutOfRegion
            | AmlError::BufferFieldOutOfBounds
            | AmlError::PciRegionWithoutDevice
            | AmlError::TooManyArgs { .. }
            | AmlError::InvalidSyncLevel(_) => ErrorKind::InvalidArgument,

            AmlError::ObjectDoesNotExist(_) => ErrorKind::NotFound,
            AmlError::NoSuchDevice => ErrorKind::NoDevice,
            AmlError::NameCollision(_) => ErrorKind::AlreadyExists,
            AmlError::OutOfMemory => ErrorKind::OutOfMemory,
            AmlError::Unimplemented | AmlError::UnsupportedRegionSpace(_) => ErrorKind::Unimplemented,
        }
    }
}

/// This trait represents the interface from the `Interpreter` to the hosting kernel, and allows
/// AML to interact with the underlying hardware.
///
/// All methods take `&self`: the interpreter only calls into the handler with its lock held, but handlers that
/// keep state of their own must synchronize it themselves.
pub trait Handler: Send + Sync {
    fn read_u8(&self, address: usize) -> u8;
    fn read_u16(&self, address: usize) -> u16;
    fn read_u32(&self, address: usize) -> u32;
    fn read_u64(&self, address: usize) -> u64;

    fn write_u8(&self, address: usize, value: u8);
    fn write_u16(&self, address: usize, value: u16);
    fn write_u32(&self, address: usize, value: u32);
    fn write_u64(&self, address: usize, value: u64);

    fn read_io_u8(&self, port: u16) -> u8;
    fn read_io_u16(&self, port: u16) -> u16;
    fn read_io_u32(&self, port: u16) -> u32;

    fn write_io_u8(&self, port: u16, value: u8);
    fn write_io_u16(&self, port: u16, value: u16);
    fn write_io_u32(&self, port: u16, value: u32);

    fn read_pci_u8(&self, address: PciAddress, offset: u16) -> u8;
    fn read_pci_u16(&self, address: PciAddress, offset: u16) -> u16;
    fn read_pci_u32(&self, address: PciAddress, offset: u16) -> u32;

    fn write_pci_u8(&self, address: PciAddress, offset: u16, value: u8);
    fn write_pci_u16(&self, address: PciAddress, offset: u16, value: u16);
    fn write_pci_u32(&self, address: PciAddress, offset: u16, value: u32);

    /// Returns a monotonically-increasing value of nanoseconds.
    fn nanos_since_boot(&self) -> u64;

    /// Stall for at least the given number of **microseconds**. An implementation should not relinquish control of
    /// the processor during the stall, and for this reason, firmwares should not stall for periods of more than
    /// 100 microseconds.
    fn stall(&self, microseconds: u64);

    /// Sleep for at least the given number of **milliseconds**. An implementation may round to the closest sleep
    /// time supported, and should relinquish the processor.
    fn sleep(&self, milliseconds: u64);

    /// Called when AML executes `Notify` on an object. The meaning of `value` depends on the type of the object,
    /// and values of `0x80` and above are device-specific.
    fn notify(&self, _path: &AmlName, _value: u64) {}

    fn handle_fatal_error(&self, fatal_type: u8, fatal_code: u32, fatal_arg: u64) {
        error!(
            "Fatal error while executing AML (encountered DefFatalOp). fatal_type = {:?}, fatal_code = {:?}, fatal_arg = {:?}",
            fatal_type, fatal_code, fatal_arg
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use alloc::vec;
    use std::thread;

    #[test]
    fn tables_load_and_unload() {
        let interpreter = test_interpreter();
        let first = interpreter.load_table(&name("FOO_", &int(0x2a))).unwrap();
        let second = interpreter.load_table(&[&name("BAR_", &string("bar"))[..], &method("BAZ_", 0, &[])].concat());
        let second = second.unwrap();
        check_ok!(interpreter.evaluate("\\FOO_"), Object::Integer(0x2a));
        check_ok!(interpreter.evaluate("\\BAR_"), Object::String(s) if s == "bar");

        interpreter.unload_table(second);
        check_ok!(interpreter.evaluate("\\FOO_"), Object::Integer(0x2a));
        check_err!(interpreter.evaluate("\\BAR_"), AmlError::ObjectDoesNotExist(_));
        check_err!(interpreter.evaluate("\\BAZ_"), AmlError::ObjectDoesNotExist(_));

        interpreter.unload_table(first);
        check_err!(interpreter.evaluate("\\FOO_"), AmlError::ObjectDoesNotExist(_));
        check_ok!(interpreter.load_table(&[]));
    }

    #[test]
    fn bad_paths() {
        let interpreter = test_interpreter();
        check_err_kind!(interpreter.evaluate("FOO_"), ErrorKind::InvalidArgument);
        check_err_kind!(interpreter.evaluate(""), ErrorKind::InvalidArgument);
        check_err_kind!(interpreter.evaluate("\\NOPE"), ErrorKind::NotFound);
    }

    #[test]
    fn invoke_with_args() {
        let interpreter = test_interpreter();
        // Method(ADD_, 2) { Return (Add(Arg0, Arg1)) }
        check_ok!(interpreter.load_table(&method("ADD_", 2, &[0xa4, 0x72, 0x68, 0x69, 0x00])));

        let path = AmlName::from_str("\\ADD_").unwrap();
        check_ok!(interpreter.invoke_method(&path, vec![Object::Integer(2), Object::Integer(3)]), Object::Integer(5));
        check_err!(
            interpreter.invoke_method(&path, vec![Object::Integer(1); 3]),
            AmlError::TooManyArgs { expected: 2, got: 3 }
        );
        // Missing arguments are uninitialized
        check_err!(interpreter.invoke_method(&path, vec![Object::Integer(1)]), AmlError::UninitializedValue);
    }

    #[test]
    fn predefined_objects() {
        let interpreter = test_interpreter_with(Config { os_name: "Test OS", ..Default::default() });
        check_ok!(interpreter.evaluate("\\_OS"), Object::String(s) if s == "Test OS");
        check_ok!(interpreter.evaluate("\\_REV"), Object::Integer(2));
        let osi = AmlName::from_str("\\_OSI").unwrap();
        check_ok!(interpreter.invoke_method(&osi, vec![Object::String("Windows 2015".into())]), Object::Integer(u64::MAX));
    }

    #[test]
    fn method_objects_are_removed_on_exit() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            // Method(MAIN) { Name(TEMP, 5); Return (TEMP) }
            &method("MAIN", 0, &[&name("TEMP", &[0x0a, 0x05])[..], &[0xa4], b"TEMP"].concat())[..],
            // Method(FAIL) { Name(TMP2, 5); Divide(1, 0, Local0) }
            &method("FAIL", 0, &[&name("TMP2", &[0x0a, 0x05])[..], &[0x78, 0x01, 0x00, 0x60, 0x00]].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        check_ok!(interpreter.evaluate("\\MAIN"), Object::Integer(5));
        check_err!(interpreter.evaluate("\\MAIN.TEMP"), AmlError::ObjectDoesNotExist(_));
        check_err!(interpreter.evaluate("\\FAIL"), AmlError::DivideByZero);
        check_err!(interpreter.evaluate("\\FAIL.TMP2"), AmlError::ObjectDoesNotExist(_));
        check_ok!(interpreter.leak_check());
    }

    #[test]
    fn serialized_methods_raise_sync_level() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            // Method(LOW_, 0, Serialized, 2) { Return (1) }
            &[0x14][..], &pkg(&[&b"LOW_"[..], &[0x28, 0xa4, 0x01]].concat()),
            // Method(HIGH, 0, Serialized, 5) { Return (LOW_()) }
            &[0x14], &pkg(&[&b"HIGH"[..], &[0x58, 0xa4], b"LOW_"].concat()),
            // Method(MAIN, 0, Serialized, 1) { Return (LOW_()) }
            &[0x14], &pkg(&[&b"MAIN"[..], &[0x18, 0xa4], b"LOW_"].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        check_ok!(interpreter.evaluate("\\MAIN"), Object::Integer(1));
        check_err!(interpreter.evaluate("\\HIGH"), AmlError::SyncLevelTooLow { current: 5, requested: 2 });
        // The sync level goes back down after a failure
        check_ok!(interpreter.evaluate("\\LOW_"), Object::Integer(1));
    }

    #[test]
    fn recursion_is_bounded() {
        // Method(MAIN) { MAIN() }
        check_err!(evaluate_body(b"MAIN"), AmlError::MethodDepthExceeded);
        // Method(MAIN) { Return (MAIN()) }
        check_err!(evaluate_body(&[&[0xa4][..], b"MAIN"].concat()), AmlError::MethodDepthExceeded);
    }

    /// `Return (Add(Add(...Add(One, One)..., One), One))`, with `depth` `Add`s.
    fn nested_adds(depth: usize) -> Vec<u8> {
        let mut body = vec![0xa4];
        body.extend(core::iter::repeat(0x72).take(depth));
        body.push(0x01);
        for _ in 0..depth {
            body.extend_from_slice(&[0x01, 0x00]);
        }
        body
    }

    #[test]
    fn expression_nesting_is_bounded() {
        check_ok!(evaluate_body(&nested_adds(20)), Object::Integer(21));
        check_ok!(evaluate_body(&nested_adds(200)), Object::Integer(201));

        let interpreter = test_interpreter();
        let table = [method("DEEP", 0, &nested_adds(1000)), method("MAIN", 0, &nested_adds(3))].concat();
        check_ok!(interpreter.load_table(&table));
        check_err!(interpreter.evaluate("\\DEEP"), AmlError::NestingTooDeep);
        check_err_kind!(interpreter.evaluate("\\DEEP"), ErrorKind::IllegalSequence);
        // The interpreter is still usable after unwinding
        check_ok!(interpreter.evaluate("\\MAIN"), Object::Integer(4));
        check_ok!(interpreter.leak_check());
    }

    #[test]
    fn statement_nesting_is_bounded() {
        // If (One) { If (One) { ... Return (7) ... } }
        let mut body = vec![0xa4, 0x0a, 0x07];
        for _ in 0..300 {
            body = [&[0xa0][..], &pkg(&[&[0x01][..], &body].concat())].concat();
        }
        check_err!(evaluate_body(&body), AmlError::NestingTooDeep);

        let mut body = vec![0xa4, 0x0a, 0x07];
        for _ in 0..50 {
            body = [&[0xa0][..], &pkg(&[&[0x01][..], &body].concat())].concat();
        }
        check_ok!(evaluate_body(&body), Object::Integer(7));
    }

    #[test]
    fn implicit_return_in_slack_mode() {
        // Method(MAIN) { Add(2, 3) }
        let body = [0x72, 0x0a, 0x02, 0x0a, 0x03, 0x00];
        check_ok!(evaluate_body(&body), Object::Uninitialized);
        check_ok!(evaluate_body_with(Config { slack_mode: true, ..Default::default() }, &body), Object::Integer(5));
        check_ok!(evaluate_body_with(Config { slack_mode: true, ..Default::default() }, &[]), Object::Integer(0));
    }

    #[test]
    fn no_leaks_after_evaluation() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("PKG_", &[&[0x12][..], &pkg(&[0x02, 0x01, 0x0a, 0x02])].concat())[..],
            // Method(MAIN) { Local0 = Package() { Local1, PKG_ }; Local1 = RefOf(Local0); Return (DerefOf(Index(PKG_, 1))) }
            &method("MAIN", 0, &[
                &[0x70, 0x12][..], &pkg(&[&[0x02, 0x01][..], b"PKG_"].concat()), &[0x60],
                &[0x70, 0x71, 0x60, 0x61],
                &[0xa4, 0x83, 0x88], b"PKG_", &[0x01, 0x00],
            ].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\MAIN"), Object::Integer(2));
        check_ok!(interpreter.leak_check());
    }

    #[test]
    fn leaked_objects_are_detected() {
        let interpreter = test_interpreter();
        check_ok!(interpreter.load_table(&name("FOO_", &[0x01])));
        let leaked = interpreter.namespace.lock().tracker().wrap(Object::Integer(4));
        check_err!(interpreter.leak_check(), AmlError::LeakedObjects { live: _, reachable: _ });
        drop(leaked);
        check_ok!(interpreter.leak_check());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(AmlError::IllegalOpcode(0x5bff).kind(), ErrorKind::IllegalSequence);
        assert_eq!(AmlError::UninitializedValue.kind(), ErrorKind::InvalidArgument);
        assert_eq!(AmlError::ObjectDoesNotExist(AmlName::root()).kind(), ErrorKind::NotFound);
        assert_eq!(AmlError::NoSuchDevice.kind(), ErrorKind::NoDevice);
        assert_eq!(AmlError::NameCollision(AmlName::root()).kind(), ErrorKind::AlreadyExists);
        assert_eq!(AmlError::OutOfMemory.kind(), ErrorKind::OutOfMemory);
        assert_eq!(AmlError::Unimplemented.kind(), ErrorKind::Unimplemented);
    }

    #[test]
    fn concurrent_evaluations_are_serialized() {
        let interpreter = Arc::new(test_interpreter());
        #[rustfmt::skip]
        let table = [
            &name("CNT_", &[0x00])[..],
            // Method(INC_) { Local0 = CNT_; Sleep(0); CNT_ = Local0 + 1 }
            &method("INC_", 0, &[
                &[0x70][..], b"CNT_", &[0x60],
                &[0x5b, 0x22, 0x00],
                &[0x72, 0x60, 0x01], b"CNT_",
            ].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let interpreter = interpreter.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        interpreter.evaluate("\\INC_").unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        check_ok!(interpreter.evaluate("\\CNT_"), Object::Integer(200));
    }
}

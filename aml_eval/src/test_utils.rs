use crate::{namespace::AmlName, object::Object, AmlError, Config, Handler, Interpreter, PciAddress};
use alloc::{collections::BTreeMap, sync::Arc, vec, vec::Vec};
use spinning_top::Spinlock;

/// The time since boot reported by the test handlers.
pub(crate) const TEST_TIME_NANOS: u64 = 1_234_567_800;

/// A handler for tests that don't touch hardware. Every read returns zero, and writes are discarded.
pub(crate) struct TestHandler;

#[rustfmt::skip]
impl Handler for TestHandler {
    fn read_u8(&self, _address: usize) -> u8 {0}
    fn read_u16(&self, _address: usize) -> u16 {0}
    fn read_u32(&self, _address: usize) -> u32 {0}
    fn read_u64(&self, _address: usize) -> u64 {0}
    fn write_u8(&self, _address: usize, _value: u8) {}
    fn write_u16(&self, _address: usize, _value: u16) {}
    fn write_u32(&self, _address: usize, _value: u32) {}
    fn write_u64(&self, _address: usize, _value: u64) {}
    fn read_io_u8(&self, _port: u16) -> u8 {0}
    fn read_io_u16(&self, _port: u16) -> u16 {0}
    fn read_io_u32(&self, _port: u16) -> u32 {0}
    fn write_io_u8(&self, _port: u16, _value: u8) {}
    fn write_io_u16(&self, _port: u16, _value: u16) {}
    fn write_io_u32(&self, _port: u16, _value: u32) {}
    fn read_pci_u8(&self, _address: PciAddress, _offset: u16) -> u8 {0}
    fn read_pci_u16(&self, _address: PciAddress, _offset: u16) -> u16 {0}
    fn read_pci_u32(&self, _address: PciAddress, _offset: u16) -> u32 {0}
    fn write_pci_u8(&self, _address: PciAddress, _offset: u16, _value: u8) {}
    fn write_pci_u16(&self, _address: PciAddress, _offset: u16, _value: u16) {}
    fn write_pci_u32(&self, _address: PciAddress, _offset: u16, _value: u32) {}
    fn nanos_since_boot(&self) -> u64 {TEST_TIME_NANOS}
    fn stall(&self, _microseconds: u64) {}
    fn sleep(&self, _milliseconds: u64) {}
}

/// An access made through a [`RecordingHandler`]. Widths are in bits.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum Access {
    ReadMem(usize, usize),
    WriteMem(usize, usize, u64),
    ReadIo(u16, usize),
    WriteIo(u16, usize, u64),
    ReadPci(PciAddress, u16, usize),
    WritePci(PciAddress, u16, usize, u64),
    Notify(AmlName, u64),
    Sleep(u64),
    Stall(u64),
}

#[derive(Default)]
struct Recording {
    memory: BTreeMap<usize, u8>,
    accesses: Vec<Access>,
}

/// A handler that backs system memory with a sparse byte map, and records every access made through it. Clones
/// share the same state, so a test can keep one while the interpreter owns another.
#[derive(Clone, Default)]
pub(crate) struct RecordingHandler(Arc<Spinlock<Recording>>);

impl RecordingHandler {
    pub fn with_memory(base: usize, bytes: &[u8]) -> RecordingHandler {
        let handler = RecordingHandler::default();
        handler.0.lock().memory.extend(bytes.iter().enumerate().map(|(i, &byte)| (base + i, byte)));
        handler
    }

    pub fn accesses(&self) -> Vec<Access> {
        self.0.lock().accesses.clone()
    }

    pub fn memory_byte(&self, address: usize) -> u8 {
        self.0.lock().memory.get(&address).copied().unwrap_or(0)
    }

    fn read(&self, address: usize, width: usize) -> u64 {
        let mut recording = self.0.lock();
        recording.accesses.push(Access::ReadMem(address, width));
        (0..(width / 8)).fold(0, |value, i| {
            value | (recording.memory.get(&(address + i)).copied().unwrap_or(0) as u64) << (8 * i)
        })
    }

    fn write(&self, address: usize, width: usize, value: u64) {
        let mut recording = self.0.lock();
        recording.accesses.push(Access::WriteMem(address, width, value));
        for i in 0..(width / 8) {
            recording.memory.insert(address + i, (value >> (8 * i)) as u8);
        }
    }

    fn record(&self, access: Access) {
        self.0.lock().accesses.push(access);
    }
}

#[rustfmt::skip]
impl Handler for RecordingHandler {
    fn read_u8(&self, address: usize) -> u8 {self.read(address, 8) as u8}
    fn read_u16(&self, address: usize) -> u16 {self.read(address, 16) as u16}
    fn read_u32(&self, address: usize) -> u32 {self.read(address, 32) as u32}
    fn read_u64(&self, address: usize) -> u64 {self.read(address, 64)}
    fn write_u8(&self, address: usize, value: u8) {self.write(address, 8, value as u64)}
    fn write_u16(&self, address: usize, value: u16) {self.write(address, 16, value as u64)}
    fn write_u32(&self, address: usize, value: u32) {self.write(address, 32, value as u64)}
    fn write_u64(&self, address: usize, value: u64) {self.write(address, 64, value)}
    fn read_io_u8(&self, port: u16) -> u8 {self.record(Access::ReadIo(port, 8)); 0}
    fn read_io_u16(&self, port: u16) -> u16 {self.record(Access::ReadIo(port, 16)); 0}
    fn read_io_u32(&self, port: u16) -> u32 {self.record(Access::ReadIo(port, 32)); 0}
    fn write_io_u8(&self, port: u16, value: u8) {self.record(Access::WriteIo(port, 8, value as u64))}
    fn write_io_u16(&self, port: u16, value: u16) {self.record(Access::WriteIo(port, 16, value as u64))}
    fn write_io_u32(&self, port: u16, value: u32) {self.record(Access::WriteIo(port, 32, value as u64))}
    fn read_pci_u8(&self, address: PciAddress, offset: u16) -> u8 {self.record(Access::ReadPci(address, offset, 8)); 0}
    fn read_pci_u16(&self, address: PciAddress, offset: u16) -> u16 {self.record(Access::ReadPci(address, offset, 16)); 0}
    fn read_pci_u32(&self, address: PciAddress, offset: u16) -> u32 {self.record(Access::ReadPci(address, offset, 32)); 0}
    fn write_pci_u8(&self, address: PciAddress, offset: u16, value: u8) {self.record(Access::WritePci(address, offset, 8, value as u64))}
    fn write_pci_u16(&self, address: PciAddress, offset: u16, value: u16) {self.record(Access::WritePci(address, offset, 16, value as u64))}
    fn write_pci_u32(&self, address: PciAddress, offset: u16, value: u32) {self.record(Access::WritePci(address, offset, 32, value as u64))}
    fn nanos_since_boot(&self) -> u64 {TEST_TIME_NANOS}
    fn stall(&self, microseconds: u64) {self.record(Access::Stall(microseconds))}
    fn sleep(&self, milliseconds: u64) {self.record(Access::Sleep(milliseconds))}
    fn notify(&self, path: &AmlName, value: u64) {self.record(Access::Notify(path.clone(), value))}
}

pub(crate) fn test_interpreter() -> Interpreter {
    Interpreter::new(TestHandler, Config::default())
}

pub(crate) fn test_interpreter_with(config: Config) -> Interpreter {
    Interpreter::new(TestHandler, config)
}

/// Load a table containing just `Method(MAIN) { body }`, and evaluate it.
pub(crate) fn evaluate_body(body: &[u8]) -> Result<Object, AmlError> {
    evaluate_body_with(Config::default(), body)
}

pub(crate) fn evaluate_body_with(config: Config, body: &[u8]) -> Result<Object, AmlError> {
    let interpreter = test_interpreter_with(config);
    interpreter.load_table(&method("MAIN", 0, body))?;
    interpreter.evaluate("\\MAIN")
}

/// Prefix `contents` with its encoded `PkgLength`. The length includes the bytes of the `PkgLength` itself.
pub(crate) fn pkg(contents: &[u8]) -> Vec<u8> {
    let length = contents.len();
    let mut encoded = if length + 1 < 0x40 {
        vec![(length + 1) as u8]
    } else {
        let extra_bytes = (1..=3).find(|extra| length + 1 + extra < 1 << (4 + 8 * extra)).unwrap_or(3);
        let total = length + 1 + extra_bytes;
        let mut bytes = vec![((extra_bytes as u8) << 6) | (total & 0xf) as u8];
        bytes.extend((0..extra_bytes).map(|i| (total >> (4 + 8 * i)) as u8));
        bytes
    };
    encoded.extend_from_slice(contents);
    encoded
}

/// Pad a name of up to four characters out to a `NameSeg` with underscores.
pub(crate) fn name_seg(name: &str) -> [u8; 4] {
    let mut seg = [b'_'; 4];
    seg[..name.len()].copy_from_slice(name.as_bytes());
    seg
}

/// `Method(name, arg_count, NotSerialized) { body }`
pub(crate) fn method(name: &str, arg_count: u8, body: &[u8]) -> Vec<u8> {
    [&[0x14][..], &pkg(&[&name_seg(name)[..], &[arg_count & 0x7], body].concat())].concat()
}

/// `Name(path, value)`, with the path's bytes used as given.
pub(crate) fn name(path: &str, value: &[u8]) -> Vec<u8> {
    [&[0x08][..], path.as_bytes(), value].concat()
}

/// The shortest encoding of an integer constant.
pub(crate) fn int(value: u64) -> Vec<u8> {
    match value {
        0 => vec![0x00],
        1 => vec![0x01],
        u64::MAX => vec![0xff],
        2..=0xff => vec![0x0a, value as u8],
        0x100..=0xffff => [&[0x0b][..], &(value as u16).to_le_bytes()].concat(),
        0x1_0000..=0xffff_ffff => [&[0x0c][..], &(value as u32).to_le_bytes()].concat(),
        _ => [&[0x0e][..], &value.to_le_bytes()].concat(),
    }
}

pub(crate) fn string(value: &str) -> Vec<u8> {
    [&[0x0d][..], value.as_bytes(), &[0x00]].concat()
}

/// Check that an evaluation succeeded, optionally matching its value against a pattern.
macro_rules! check_ok {
    ($result: expr) => {
        match $result {
            Ok(_) => (),
            Err(err) => panic!("Expected Ok, got {:?}", err),
        }
    };
    ($result: expr, $pattern: pat $(if $guard: expr)?) => {
        match $result {
            Ok($pattern) $(if $guard)? => (),
            Ok(other) => panic!("Successfully evaluated Ok, but it was wrong: {:?}", other),
            Err(err) => panic!("Expected Ok, got {:?}", err),
        }
    };
}

macro_rules! check_err {
    ($result: expr, $error: pat) => {
        match $result {
            Err($error) => (),
            Err(err) => panic!("Got wrong error: {:?}", err),
            Ok(value) => panic!("Expected Err, got {:?}", value),
        }
    };
}

/// Check that an evaluation failed with an error of the given [`crate::ErrorKind`].
macro_rules! check_err_kind {
    ($result: expr, $kind: expr) => {
        match $result {
            Err(err) if err.kind() == $kind => (),
            Err(err) => panic!("Got error of the wrong kind: {:?} ({:?})", err, err.kind()),
            Ok(value) => panic!("Expected Err, got {:?}", value),
        }
    };
}

pub(crate) use {check_err, check_err_kind, check_ok};

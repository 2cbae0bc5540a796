use crate::{
    method::Executor,
    namespace::{AmlName, NameSeg},
    object::{Object, ObjectRef},
    AmlError,
};
use alloc::{vec, vec::Vec};
use bit_field::BitField;
use bitvec::{order::Lsb0, view::BitView};
use core::fmt;
use pci_types::PciAddress;

#[derive(Clone, Debug)]
pub struct OpRegion {
    pub space: RegionSpace,
    pub base: u64,
    /// The length of the region, in bytes.
    pub length: u64,
    /// The device the region was defined in. PCI configuration regions find their address through this.
    pub parent_device: Option<AmlName>,
}

impl fmt::Display for OpRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationRegion(Space={}, Offset={:#x}, Length={:#x})", self.space, self.base, self.length)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum RegionSpace {
    SystemMemory,
    SystemIO,
    PciConfig,
    EmbeddedControl,
    SmBus,
    SystemCmos,
    PciBarTarget,
    Ipmi,
    GeneralPurposeIo,
    GenericSerialBus,
    Pcc,
    Oem(u8),
}

impl From<u8> for RegionSpace {
    fn from(value: u8) -> Self {
        match value {
            0 => RegionSpace::SystemMemory,
            1 => RegionSpace::SystemIO,
            2 => RegionSpace::PciConfig,
            3 => RegionSpace::EmbeddedControl,
            4 => RegionSpace::SmBus,
            5 => RegionSpace::SystemCmos,
            6 => RegionSpace::PciBarTarget,
            7 => RegionSpace::Ipmi,
            8 => RegionSpace::GeneralPurposeIo,
            9 => RegionSpace::GenericSerialBus,
            10 => RegionSpace::Pcc,
            _ => RegionSpace::Oem(value),
        }
    }
}

impl fmt::Display for RegionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionSpace::SystemMemory => write!(f, "SystemMemory"),
            RegionSpace::SystemIO => write!(f, "SystemIO"),
            RegionSpace::PciConfig => write!(f, "PCIConfig"),
            RegionSpace::EmbeddedControl => write!(f, "EmbeddedControl"),
            RegionSpace::SmBus => write!(f, "SMBus"),
            RegionSpace::SystemCmos => write!(f, "SystemCMOS"),
            RegionSpace::PciBarTarget => write!(f, "PciBarTarget"),
            RegionSpace::Ipmi => write!(f, "IPMI"),
            RegionSpace::GeneralPurposeIo => write!(f, "GeneralPurposeIO"),
            RegionSpace::GenericSerialBus => write!(f, "GenericSerialBus"),
            RegionSpace::Pcc => write!(f, "PCC"),
            RegionSpace::Oem(space) => write!(f, "OEM({:#x})", space),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldAccessType {
    Any,
    Byte,
    Word,
    DWord,
    QWord,
    Buffer,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldUpdateRule {
    Preserve,
    WriteAsOnes,
    WriteAsZeros,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FieldFlags(pub u8);

impl FieldFlags {
    pub fn access_type(&self) -> Result<FieldAccessType, AmlError> {
        match self.0.get_bits(0..4) {
            0 => Ok(FieldAccessType::Any),
            1 => Ok(FieldAccessType::Byte),
            2 => Ok(FieldAccessType::Word),
            3 => Ok(FieldAccessType::DWord),
            4 => Ok(FieldAccessType::QWord),
            5 => Ok(FieldAccessType::Buffer),
            _ => Err(AmlError::InvalidFieldFlags),
        }
    }

    pub fn lock_rule(&self) -> bool {
        self.0.get_bit(4)
    }

    pub fn field_update_rule(&self) -> Result<FieldUpdateRule, AmlError> {
        match self.0.get_bits(5..7) {
            0 => Ok(FieldUpdateRule::Preserve),
            1 => Ok(FieldUpdateRule::WriteAsOnes),
            2 => Ok(FieldUpdateRule::WriteAsZeros),
            _ => Err(AmlError::InvalidFieldFlags),
        }
    }

    /// Replace the access type, as done by an `AccessField` entry in a field list.
    pub fn with_access_type(mut self, access_type: u8) -> FieldFlags {
        self.0.set_bits(0..4, access_type.get_bits(0..4));
        self
    }
}

#[derive(Clone, Debug)]
pub enum FieldUnitKind {
    Normal { region: ObjectRef },
    /// A field in a banked region. `bank` is the field unit selecting the bank, which is written with
    /// `bank_value` before every access.
    Bank { region: ObjectRef, bank: ObjectRef, bank_value: u64 },
    /// A field accessed through an index/data register pair. Both registers are field units.
    Index { index: ObjectRef, data: ObjectRef },
}

#[derive(Clone, Debug)]
pub struct FieldUnit {
    pub kind: FieldUnitKind,
    pub flags: FieldFlags,
    pub bit_index: usize,
    pub bit_length: usize,
}

impl FieldUnit {
    pub(crate) fn for_each_held(&self, f: &mut dyn FnMut(&ObjectRef)) {
        match &self.kind {
            FieldUnitKind::Normal { region } => f(region),
            FieldUnitKind::Bank { region, bank, .. } => {
                f(region);
                f(bank);
            }
            FieldUnitKind::Index { index, data } => {
                f(index);
                f(data);
            }
        }
    }
}

impl fmt::Display for FieldUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let typ = match self.kind {
            FieldUnitKind::Normal { .. } => "Normal",
            FieldUnitKind::Bank { .. } => "Bank",
            FieldUnitKind::Index { .. } => "Index",
        };
        write!(f, "FieldUnit(Type={}, BitOffset={}, BitSize={})", typ, self.bit_index, self.bit_length)
    }
}

/// Where the aligned accesses making up a field access go.
enum AccessTarget {
    Region(ObjectRef),
    IndexData { index: ObjectRef, data: ObjectRef },
}

impl Executor<'_> {
    pub(crate) fn read_field(&mut self, field: &FieldUnit) -> Result<Object, AmlError> {
        let target = self.select_access_target(field)?;
        let width = self.access_width(field, &target)?;

        let mut bytes = vec![0u8; field.bit_length.div_ceil(8)];
        {
            let field_bits = bytes.view_bits_mut::<Lsb0>();
            let field_end = field.bit_index + field.bit_length;
            let mut access_bit = field.bit_index - field.bit_index % width;

            while access_bit < field_end {
                let value = self.read_access(&target, access_bit / 8, width)?.to_le_bytes();
                let value_bits = value.view_bits::<Lsb0>();

                let low = usize::max(access_bit, field.bit_index);
                let high = usize::min(access_bit + width, field_end);
                field_bits[(low - field.bit_index)..(high - field.bit_index)]
                    .copy_from_bitslice(&value_bits[(low - access_bit)..(high - access_bit)]);

                access_bit += width;
            }
        }

        if field.flags.access_type()? == FieldAccessType::Buffer {
            Ok(Object::RawDataBuffer(bytes))
        } else if field.bit_length <= self.integer_width() {
            Ok(Object::Integer(bytes_to_integer(&bytes)))
        } else {
            Ok(Object::Buffer(bytes))
        }
    }

    pub(crate) fn write_field(&mut self, field: &FieldUnit, value: &Object) -> Result<(), AmlError> {
        let target = self.select_access_target(field)?;
        let width = self.access_width(field, &target)?;
        let update_rule = field.flags.field_update_rule()?;

        let mut source = field_source_bytes(value)?;
        source.resize(usize::max(source.len(), field.bit_length.div_ceil(8)), 0);
        let source_bits = source.view_bits::<Lsb0>();

        let field_end = field.bit_index + field.bit_length;
        let mut access_bit = field.bit_index - field.bit_index % width;

        while access_bit < field_end {
            let low = usize::max(access_bit, field.bit_index);
            let high = usize::min(access_bit + width, field_end);

            /*
             * Accesses that only cover part of the field need the bits outside of the field filled in
             * according to the update rule.
             */
            let initial = if low == access_bit && high == access_bit + width {
                0
            } else {
                match update_rule {
                    FieldUpdateRule::Preserve => self.read_access(&target, access_bit / 8, width)?,
                    FieldUpdateRule::WriteAsOnes => u64::MAX,
                    FieldUpdateRule::WriteAsZeros => 0,
                }
            };

            let mut value = initial.to_le_bytes();
            value.view_bits_mut::<Lsb0>()[(low - access_bit)..(high - access_bit)]
                .copy_from_bitslice(&source_bits[(low - field.bit_index)..(high - field.bit_index)]);
            self.write_access(&target, access_bit / 8, width, u64::from_le_bytes(value))?;

            access_bit += width;
        }

        Ok(())
    }

    /// Work out where accesses to a field go, selecting the right bank first if the field is banked.
    fn select_access_target(&mut self, field: &FieldUnit) -> Result<AccessTarget, AmlError> {
        match &field.kind {
            FieldUnitKind::Normal { region } => Ok(AccessTarget::Region(region.share())),
            FieldUnitKind::Bank { region, bank, bank_value } => {
                let bank_field = field_unit_of(bank)?;
                self.write_field(&bank_field, &Object::Integer(*bank_value))?;
                Ok(AccessTarget::Region(region.share()))
            }
            FieldUnitKind::Index { index, data } => {
                Ok(AccessTarget::IndexData { index: index.share(), data: data.share() })
            }
        }
    }

    /// The width, in bits, of each access made to the field.
    fn access_width(&self, field: &FieldUnit, target: &AccessTarget) -> Result<usize, AmlError> {
        let max_width = match target {
            AccessTarget::Region(region) => match region_of(region)?.space {
                RegionSpace::SystemMemory => 64,
                _ => 32,
            },
            AccessTarget::IndexData { .. } => 32,
        };

        let width = match field.flags.access_type()? {
            FieldAccessType::Byte | FieldAccessType::Buffer => 8,
            FieldAccessType::Word => 16,
            FieldAccessType::DWord => 32,
            FieldAccessType::QWord => 64,
            FieldAccessType::Any => {
                // The smallest aligned access that covers the whole field
                let end = field.bit_index + field.bit_length;
                [8, 16, 32, 64]
                    .into_iter()
                    .find(|width| field.bit_index - field.bit_index % width + width >= end)
                    .unwrap_or(64)
            }
        };

        Ok(usize::min(width, max_width))
    }

    fn read_access(&mut self, target: &AccessTarget, byte_offset: usize, width: usize) -> Result<u64, AmlError> {
        match target {
            AccessTarget::Region(region) => {
                let region = region_of(region)?;
                self.read_region(&region, byte_offset as u64, width)
            }
            AccessTarget::IndexData { index, data } => {
                let (index, data) = (field_unit_of(index)?, field_unit_of(data)?);
                self.write_field(&index, &Object::Integer(byte_offset as u64))?;
                match self.read_field(&data)? {
                    Object::Integer(value) => Ok(value),
                    Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(bytes_to_integer(&bytes)),
                    _ => Err(AmlError::FieldInvalidAccessSize),
                }
            }
        }
    }

    fn write_access(
        &mut self,
        target: &AccessTarget,
        byte_offset: usize,
        width: usize,
        value: u64,
    ) -> Result<(), AmlError> {
        match target {
            AccessTarget::Region(region) => {
                let region = region_of(region)?;
                self.write_region(&region, byte_offset as u64, width, value)
            }
            AccessTarget::IndexData { index, data } => {
                let (index, data) = (field_unit_of(index)?, field_unit_of(data)?);
                self.write_field(&index, &Object::Integer(byte_offset as u64))?;
                self.write_field(&data, &Object::Integer(value.get_bits(0..width)))
            }
        }
    }

    /// Perform a standard-size read from an op-region. `width` must be a supported power-of-2, and `offset`
    /// correctly aligned for it.
    pub(crate) fn read_region(&mut self, region: &OpRegion, offset: u64, width: usize) -> Result<u64, AmlError> {
        check_region_bounds(region, offset, width)?;

        match region.space {
            RegionSpace::SystemMemory => {
                let address = region_address(region, offset)?;
                match width {
                    8 => Ok(self.handler.read_u8(address) as u64),
                    16 => Ok(self.handler.read_u16(address) as u64),
                    32 => Ok(self.handler.read_u32(address) as u64),
                    64 => Ok(self.handler.read_u64(address)),
                    _ => Err(AmlError::FieldInvalidAccessSize),
                }
            }

            RegionSpace::SystemIO => {
                let port = region_address(region, offset)?.try_into().map_err(|_| AmlError::FieldInvalidAddress)?;
                match width {
                    8 => Ok(self.handler.read_io_u8(port) as u64),
                    16 => Ok(self.handler.read_io_u16(port) as u64),
                    32 => Ok(self.handler.read_io_u32(port) as u64),
                    _ => Err(AmlError::FieldInvalidAccessSize),
                }
            }

            RegionSpace::PciConfig => {
                let (address, offset) = self.pci_address(region, offset)?;
                match width {
                    8 => Ok(self.handler.read_pci_u8(address, offset) as u64),
                    16 => Ok(self.handler.read_pci_u16(address, offset) as u64),
                    32 => Ok(self.handler.read_pci_u32(address, offset) as u64),
                    _ => Err(AmlError::FieldInvalidAccessSize),
                }
            }

            space => Err(AmlError::UnsupportedRegionSpace(space)),
        }
    }

    /// Perform a standard-size write to an op-region. `width` must be a supported power-of-2, and `offset`
    /// correctly aligned for it.
    pub(crate) fn write_region(
        &mut self,
        region: &OpRegion,
        offset: u64,
        width: usize,
        value: u64,
    ) -> Result<(), AmlError> {
        check_region_bounds(region, offset, width)?;

        match region.space {
            RegionSpace::SystemMemory => {
                let address = region_address(region, offset)?;
                match width {
                    8 => self.handler.write_u8(address, value as u8),
                    16 => self.handler.write_u16(address, value as u16),
                    32 => self.handler.write_u32(address, value as u32),
                    64 => self.handler.write_u64(address, value),
                    _ => return Err(AmlError::FieldInvalidAccessSize),
                }
                Ok(())
            }

            RegionSpace::SystemIO => {
                let port = region_address(region, offset)?.try_into().map_err(|_| AmlError::FieldInvalidAddress)?;
                match width {
                    8 => self.handler.write_io_u8(port, value as u8),
                    16 => self.handler.write_io_u16(port, value as u16),
                    32 => self.handler.write_io_u32(port, value as u32),
                    _ => return Err(AmlError::FieldInvalidAccessSize),
                }
                Ok(())
            }

            RegionSpace::PciConfig => {
                let (address, offset) = self.pci_address(region, offset)?;
                match width {
                    8 => self.handler.write_pci_u8(address, offset, value as u8),
                    16 => self.handler.write_pci_u16(address, offset, value as u16),
                    32 => self.handler.write_pci_u32(address, offset, value as u32),
                    _ => return Err(AmlError::FieldInvalidAccessSize),
                }
                Ok(())
            }

            space => Err(AmlError::UnsupportedRegionSpace(space)),
        }
    }

    /// Find the PCI function, and the offset into its configuration space, that an access to a PCI
    /// configuration region refers to. The device is described by the `_ADR` of the region's parent device.
    /// `_SEG` and `_BBN` are optional, with defaults that line up with legacy PCI implementations (a single
    /// segment group and a single root, respectively).
    fn pci_address(&mut self, region: &OpRegion, offset: u64) -> Result<(PciAddress, u16), AmlError> {
        let device = region.parent_device.as_ref().ok_or(AmlError::PciRegionWithoutDevice)?;

        let adr = self
            .evaluate_child_integer(device, NameSeg(*b"_ADR"))?
            .ok_or_else(|| AmlError::ObjectDoesNotExist(device.clone()))?;
        let seg = self.evaluate_child_integer(device, NameSeg(*b"_SEG"))?.unwrap_or(0);
        let bbn = self.evaluate_child_integer(device, NameSeg(*b"_BBN"))?.unwrap_or(0);

        let address = PciAddress::new(
            seg.try_into().map_err(|_| AmlError::FieldInvalidAddress)?,
            bbn.try_into().map_err(|_| AmlError::FieldInvalidAddress)?,
            adr.get_bits(16..21) as u8,
            adr.get_bits(0..3) as u8,
        );
        let offset = (region.base + offset).try_into().map_err(|_| AmlError::FieldInvalidAddress)?;
        Ok((address, offset))
    }
}

/// Read a bit range of a buffer. Fields that fit in an integer read as one, wider ones as a `Buffer`.
pub(crate) fn read_buffer_field(
    buffer: &ObjectRef,
    bit_offset: usize,
    bit_length: usize,
    integer_width: usize,
) -> Result<Object, AmlError> {
    let buffer = buffer.lock();
    let bytes = match &*buffer {
        Object::Buffer(bytes) => bytes,
        other => return Err(AmlError::ObjectNotOfExpectedType { expected: crate::ObjectType::Buffer, got: other.typ() }),
    };
    let bits = bytes.view_bits::<Lsb0>();
    if bit_offset + bit_length > bits.len() {
        return Err(AmlError::BufferFieldOutOfBounds);
    }

    let mut result = vec![0u8; bit_length.div_ceil(8)];
    result.view_bits_mut::<Lsb0>()[..bit_length].copy_from_bitslice(&bits[bit_offset..(bit_offset + bit_length)]);

    if bit_length <= integer_width {
        Ok(Object::Integer(bytes_to_integer(&result)))
    } else {
        Ok(Object::Buffer(result))
    }
}

/// Write a bit range of a buffer. The value is truncated, or zero-extended, to the width of the field.
pub(crate) fn write_buffer_field(
    buffer: &ObjectRef,
    bit_offset: usize,
    bit_length: usize,
    value: &Object,
) -> Result<(), AmlError> {
    let mut source = field_source_bytes(value)?;
    source.resize(usize::max(source.len(), bit_length.div_ceil(8)), 0);

    let mut buffer = buffer.lock();
    let bytes = match &mut *buffer {
        Object::Buffer(bytes) => bytes,
        other => return Err(AmlError::ObjectNotOfExpectedType { expected: crate::ObjectType::Buffer, got: other.typ() }),
    };
    let bits = bytes.view_bits_mut::<Lsb0>();
    if bit_offset + bit_length > bits.len() {
        return Err(AmlError::BufferFieldOutOfBounds);
    }

    bits[bit_offset..(bit_offset + bit_length)].copy_from_bitslice(&source.view_bits::<Lsb0>()[..bit_length]);
    Ok(())
}

fn field_source_bytes(value: &Object) -> Result<Vec<u8>, AmlError> {
    match value {
        Object::Integer(value) => Ok(value.to_le_bytes().to_vec()),
        Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(bytes.clone()),
        Object::String(string) => Ok(string.as_bytes().to_vec()),
        _ => Err(AmlError::InvalidConversion),
    }
}

fn bytes_to_integer(bytes: &[u8]) -> u64 {
    let mut value = [0u8; 8];
    let length = usize::min(bytes.len(), 8);
    value[..length].copy_from_slice(&bytes[..length]);
    u64::from_le_bytes(value)
}

fn region_of(object: &ObjectRef) -> Result<OpRegion, AmlError> {
    match &*object.lock() {
        Object::OpRegion(region) => Ok(region.clone()),
        other => Err(AmlError::ObjectNotOfExpectedType { expected: crate::ObjectType::OpRegion, got: other.typ() }),
    }
}

fn field_unit_of(object: &ObjectRef) -> Result<FieldUnit, AmlError> {
    match &*object.lock() {
        Object::FieldUnit(field) => Ok(field.clone()),
        other => Err(AmlError::ObjectNotOfExpectedType { expected: crate::ObjectType::FieldUnit, got: other.typ() }),
    }
}

fn check_region_bounds(region: &OpRegion, offset: u64, width: usize) -> Result<(), AmlError> {
    if offset + (width as u64 / 8) > region.length {
        return Err(AmlError::FieldOutOfRegion);
    }
    Ok(())
}

fn region_address(region: &OpRegion, offset: u64) -> Result<usize, AmlError> {
    region
        .base
        .checked_add(offset)
        .ok_or(AmlError::FieldInvalidAddress)?
        .try_into()
        .map_err(|_| AmlError::FieldInvalidAddress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        namespace::Namespace,
        object::ObjectTracker,
        test_utils::{Access, RecordingHandler},
        Config,
    };

    fn memory_region(tracker: &ObjectTracker, length: u64) -> ObjectRef {
        tracker.wrap(Object::OpRegion(OpRegion {
            space: RegionSpace::SystemMemory,
            base: 0x1000,
            length,
            parent_device: None,
        }))
    }

    fn field(region: &ObjectRef, flags: u8, bit_index: usize, bit_length: usize) -> FieldUnit {
        FieldUnit { kind: FieldUnitKind::Normal { region: region.share() }, flags: FieldFlags(flags), bit_index, bit_length }
    }

    #[test]
    fn unaligned_read_is_split_and_masked() {
        let handler = RecordingHandler::with_memory(0x1000, &[0xff, 0xa5, 0x3c, 0x00]);
        let config = Config::default();
        let mut namespace = Namespace::new(config.os_name);
        let region = memory_region(namespace.tracker(), 4);
        let mut executor = Executor::new(&handler, &config, &mut namespace);

        // 12 bits starting at bit 4, with byte accesses
        let value = executor.read_field(&field(&region, 0x01, 4, 12)).unwrap();
        assert!(matches!(value, Object::Integer(0xa5f)));
        assert_eq!(handler.accesses(), vec![Access::ReadMem(0x1000, 8), Access::ReadMem(0x1001, 8)]);
    }

    #[test]
    fn any_access_uses_smallest_covering_width() {
        let handler = RecordingHandler::with_memory(0x1000, &[0x00, 0x34, 0x12, 0x00]);
        let config = Config::default();
        let mut namespace = Namespace::new(config.os_name);
        let region = memory_region(namespace.tracker(), 4);
        let mut executor = Executor::new(&handler, &config, &mut namespace);

        let value = executor.read_field(&field(&region, 0x00, 8, 16)).unwrap();
        assert!(matches!(value, Object::Integer(0x1234)));
        assert_eq!(handler.accesses(), vec![Access::ReadMem(0x1000, 32)]);
    }

    #[test]
    fn update_rules() {
        let config = Config::default();

        for (flags, expected) in [(0x01, 0x35), (0x21, 0xf5), (0x41, 0x05)] {
            let handler = RecordingHandler::with_memory(0x1000, &[0x30]);
            let mut namespace = Namespace::new(config.os_name);
            let region = memory_region(namespace.tracker(), 1);
            let mut executor = Executor::new(&handler, &config, &mut namespace);

            // Preserve reads the top nibble back; WriteAsOnes and WriteAsZeros fill it in
            executor.write_field(&field(&region, flags, 0, 4), &Object::Integer(0x5)).unwrap();
            assert_eq!(handler.memory_byte(0x1000), expected);
        }
    }

    #[test]
    fn whole_access_writes_skip_reads() {
        let handler = RecordingHandler::with_memory(0x1000, &[0; 4]);
        let config = Config::default();
        let mut namespace = Namespace::new(config.os_name);
        let region = memory_region(namespace.tracker(), 4);
        let mut executor = Executor::new(&handler, &config, &mut namespace);

        executor.write_field(&field(&region, 0x03, 0, 32), &Object::Integer(0xdeadbeef)).unwrap();
        assert_eq!(handler.accesses(), vec![Access::WriteMem(0x1000, 32, 0xdeadbeef)]);
    }

    #[test]
    fn accesses_outside_region_fail() {
        let handler = RecordingHandler::with_memory(0x1000, &[0; 4]);
        let config = Config::default();
        let mut namespace = Namespace::new(config.os_name);
        let region = memory_region(namespace.tracker(), 2);
        let mut executor = Executor::new(&handler, &config, &mut namespace);

        assert_eq!(executor.read_field(&field(&region, 0x01, 16, 8)).map(|_| ()), Err(AmlError::FieldOutOfRegion));
    }

    #[test]
    fn wide_and_buffer_fields() {
        let handler = RecordingHandler::with_memory(0x1000, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let config = Config::default();
        let mut namespace = Namespace::new(config.os_name);
        let region = memory_region(namespace.tracker(), 10);
        let mut executor = Executor::new(&handler, &config, &mut namespace);

        let wide = executor.read_field(&field(&region, 0x01, 0, 80)).unwrap();
        assert!(matches!(wide, Object::Buffer(ref bytes) if bytes == &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
        let raw = executor.read_field(&field(&region, 0x05, 8, 16)).unwrap();
        assert!(matches!(raw, Object::RawDataBuffer(ref bytes) if bytes == &[2, 3]));
    }

    #[test]
    fn buffer_fields() {
        let tracker = ObjectTracker::new();
        let buffer = tracker.wrap(Object::Buffer(vec![0x00, 0xf0, 0x0f, 0x00]));

        assert!(matches!(read_buffer_field(&buffer, 12, 8, 64), Ok(Object::Integer(0xff))));
        assert!(matches!(read_buffer_field(&buffer, 0, 32, 16), Ok(Object::Buffer(ref b)) if b == &[0x00, 0xf0, 0x0f, 0x00]));
        assert_eq!(read_buffer_field(&buffer, 30, 3, 64).map(|_| ()), Err(AmlError::BufferFieldOutOfBounds));

        write_buffer_field(&buffer, 4, 4, &Object::Integer(0xa)).unwrap();
        write_buffer_field(&buffer, 24, 8, &Object::Integer(0x1ff)).unwrap();
        assert!(matches!(&*buffer.lock(), Object::Buffer(b) if b == &[0xa0, 0xf0, 0x0f, 0xff]));
    }
}

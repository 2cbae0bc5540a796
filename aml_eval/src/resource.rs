use crate::AmlError;
use alloc::vec::Vec;
use bit_field::BitField;
use byteorder::{ByteOrder, LittleEndian};
use log::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Irq(IrqDescriptor),
    Dma(DmaDescriptor),
    IOPort(IOPortDescriptor),
    FixedIOPort { base: u16, length: u8 },
    MemoryRange(MemoryRangeDescriptor),
    AddressSpace(AddressSpaceDescriptor),
    /// Marks the start of a set of alternative configurations. The priorities are absent if the descriptor
    /// doesn't specify them.
    StartDependentFunctions { compatibility: Option<u8>, performance: Option<u8> },
    EndDependentFunctions,
    Vendor(Vec<u8>),
}

/// Parse a resource template, such as the buffer returned by `_CRS`, into its descriptors. Parsing stops at the
/// end tag, or at the end of the buffer if the template doesn't have one.
pub fn resource_descriptor_list(bytes: &[u8]) -> Result<Vec<Resource>, AmlError> {
    let mut resources = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let remaining = &bytes[offset..];

        /*
         * If bit 7 of Byte 0 is set, it's a large descriptor. If not, it's a small descriptor.
         */
        if remaining[0].get_bit(7) {
            /*
             * We're parsing a large item. The descriptor type is encoded in Bits 0-6 of Byte 0. Byte 1 contains
             * bits 0-7 of the length, and Byte 2 contains bits 8-15 of the length. Subsequent bytes contain the
             * actual data items.
             */
            if remaining.len() < 3 {
                return Err(AmlError::ResourceDescriptorTooShort);
            }
            let descriptor_type = remaining[0].get_bits(0..7);
            let length = LittleEndian::read_u16(&remaining[1..3]) as usize;
            let descriptor = remaining.get(0..(3 + length)).ok_or(AmlError::ResourceDescriptorTooShort)?;

            match descriptor_type {
                0x01 => resources.push(memory_24_descriptor(descriptor)?),
                0x04 => resources.push(Resource::Vendor(descriptor[3..].to_vec())),
                0x05 => resources.push(memory_32_descriptor(descriptor)?),
                0x06 => resources.push(fixed_memory_descriptor(descriptor)?),
                0x07 => resources.push(address_space_descriptor::<u32>(descriptor)?),
                0x08 => resources.push(address_space_descriptor::<u16>(descriptor)?),
                0x09 => resources.push(extended_interrupt_descriptor(descriptor)?),
                0x0a => resources.push(address_space_descriptor::<u64>(descriptor)?),
                0x02 | 0x03 | 0x0b..=0x12 => warn!("Skipping unsupported large resource descriptor {:#x}", descriptor_type),
                _ => return Err(AmlError::ReservedResourceType),
            }
            offset += descriptor.len();
        } else {
            /*
             * We're parsing a small descriptor. Byte 0 has the format:
             *    | Bits        | Field             |
             *    |-------------|-------------------|
             *    | 0-2         | Length - n bytes  |
             *    | 3-6         | Small item type   |
             *    | 7           | 0 = small item    |
             */
            let descriptor_type = remaining[0].get_bits(3..7);
            let length = remaining[0].get_bits(0..3) as usize;
            let descriptor = remaining.get(0..(1 + length)).ok_or(AmlError::ResourceDescriptorTooShort)?;

            match descriptor_type {
                0x04 => resources.push(irq_format_descriptor(descriptor)?),
                0x05 => resources.push(dma_format_descriptor(descriptor)?),
                0x06 => resources.push(start_dependent_functions_descriptor(descriptor)),
                0x07 => resources.push(Resource::EndDependentFunctions),
                0x08 => resources.push(io_port_descriptor(descriptor)?),
                0x09 => resources.push(fixed_io_port_descriptor(descriptor)?),
                0x0a => warn!("Skipping unsupported fixed DMA descriptor"),
                0x0e => resources.push(Resource::Vendor(descriptor[1..].to_vec())),
                0x0f => {
                    check_end_tag(&bytes[..(offset + descriptor.len())], descriptor)?;
                    return Ok(resources);
                }
                _ => return Err(AmlError::ReservedResourceType),
            }
            offset += descriptor.len();
        }
    }

    Ok(resources)
}

/// Byte 1 of the end tag is a checksum, such that the whole template sums to zero. A checksum of zero means it
/// wasn't computed, and the template is accepted as-is.
fn check_end_tag(template: &[u8], descriptor: &[u8]) -> Result<(), AmlError> {
    match descriptor.get(1) {
        None | Some(0) => Ok(()),
        Some(_) => {
            let sum = template.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
            if sum == 0 {
                Ok(())
            } else {
                Err(AmlError::ResourceChecksumMismatch)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptTrigger {
    Edge,
    Level,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptPolarity {
    ActiveHigh,
    ActiveLow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IrqDescriptor {
    pub is_consumer: bool,
    pub trigger: InterruptTrigger,
    pub polarity: InterruptPolarity,
    pub is_shared: bool,
    pub is_wake_capable: bool,
    pub irqs: Vec<u32>,
}

fn irq_format_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * IRQ Descriptor Definition
     *
     * Offset   Field Name
     * Byte 0   Value = 0x22 or 0x23 (0010001nB)
     * Byte 1   IRQ mask bits[7:0], _INT
     *          Bit [0] represents IRQ0, bit[1] is IRQ1, and so on.
     * Byte 2   IRQ mask bits[15:8], _INT
     * Byte 3   IRQ Information. Each bit, when set, indicates this device is capable of driving a certain type
     *          of interrupt. This byte is optional; if not included then the device is assumed to be
     *          edge-triggered, high true.
     *          Bit [5]   Wake Capability, _WKC
     *          Bit [4]   Interrupt Sharing, _SHR
     *          Bit [3]   Interrupt Polarity, _LL (0 = active-high, 1 = active-low)
     *          Bit [0]   Interrupt Mode, _HE (0 = level-triggered, 1 = edge-triggered)
     */
    if bytes.len() < 3 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let mask = LittleEndian::read_u16(&bytes[1..3]);
    let irqs = (0..16).filter(|&irq| mask.get_bit(irq)).map(|irq| irq as u32).collect();

    match bytes.get(3) {
        None => Ok(Resource::Irq(IrqDescriptor {
            is_consumer: false,
            trigger: InterruptTrigger::Edge,
            polarity: InterruptPolarity::ActiveHigh,
            is_shared: false,
            is_wake_capable: false,
            irqs,
        })),
        Some(&information) => Ok(Resource::Irq(IrqDescriptor {
            is_consumer: false,
            trigger: if information.get_bit(0) { InterruptTrigger::Edge } else { InterruptTrigger::Level },
            polarity: if information.get_bit(3) { InterruptPolarity::ActiveLow } else { InterruptPolarity::ActiveHigh },
            is_shared: information.get_bit(4),
            is_wake_capable: information.get_bit(5),
            irqs,
        })),
    }
}

fn extended_interrupt_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * --- Extended Interrupt Descriptor ---
     * Byte 3 contains the Interrupt Vector Flags:
     *      Bit 0: 1 if device consumes the resource, 0 if it produces it
     *      Bit 1: 1 if edge-triggered, 0 if level-triggered
     *      Bit 2: 1 = active-low, 0 = active-high
     *      Bit 3: 1 if interrupt is shared with other devices
     *      Bit 4: 1 if this interrupt is capable of waking the system, 0 if it is not
     * Byte 4 contains the number of interrupt numbers that follow.
     *
     * From Byte 5 onwards, there are `n` interrupt numbers, each of which is encoded as a
     * 4-byte little-endian number.
     */
    if bytes.len() < 5 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let number_of_interrupts = bytes[4] as usize;
    let numbers = bytes.get(5..(5 + 4 * number_of_interrupts)).ok_or(AmlError::ResourceDescriptorTooShort)?;
    let irqs = numbers.chunks_exact(4).map(LittleEndian::read_u32).collect();

    Ok(Resource::Irq(IrqDescriptor {
        is_consumer: bytes[3].get_bit(0),
        trigger: if bytes[3].get_bit(1) { InterruptTrigger::Edge } else { InterruptTrigger::Level },
        polarity: if bytes[3].get_bit(2) { InterruptPolarity::ActiveLow } else { InterruptPolarity::ActiveHigh },
        is_shared: bytes[3].get_bit(3),
        is_wake_capable: bytes[3].get_bit(4),
        irqs,
    }))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaSupportedSpeed {
    CompatibilityMode,
    TypeA,
    TypeB,
    TypeF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaTransferTypePreference {
    _8BitOnly,
    _8And16Bit,
    _16Bit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaDescriptor {
    pub channel_mask: u8,
    pub supported_speeds: DmaSupportedSpeed,
    pub is_bus_master: bool,
    pub transfer_type_preference: DmaTransferTypePreference,
}

fn dma_format_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * DMA Descriptor Definition
     * Offset   Field Name
     * Byte 0   Value = 0x2A (00101010B)
     * Byte 1   DMA channel mask bits [7:0] (channels 0 - 7), _DMA
     * Byte 2   Bit [7]     Reserved (must be 0)
     *          Bits [6:5]  DMA channel speed supported, _TYP
     *             00 Indicates compatibility mode
     *             01 Indicates Type A DMA as described in the EISA
     *             10 Indicates Type B DMA
     *             11 Indicates Type F
     *          Bits [4:3]  Ignored
     *          Bit [2]     Logical device bus master status, _BM
     *          Bits [1:0]  DMA transfer type preference, _SIZ
     *             00 8-bit only
     *             01 8- and 16-bit
     *             10 16-bit only
     *             11 Reserved
     */
    if bytes.len() < 3 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let supported_speeds = match bytes[2].get_bits(5..=6) {
        0 => DmaSupportedSpeed::CompatibilityMode,
        1 => DmaSupportedSpeed::TypeA,
        2 => DmaSupportedSpeed::TypeB,
        _ => DmaSupportedSpeed::TypeF,
    };
    let transfer_type_preference = match bytes[2].get_bits(0..=1) {
        0 => DmaTransferTypePreference::_8BitOnly,
        1 => DmaTransferTypePreference::_8And16Bit,
        2 => DmaTransferTypePreference::_16Bit,
        _ => return Err(AmlError::InvalidResourceDescriptor),
    };

    Ok(Resource::Dma(DmaDescriptor {
        channel_mask: bytes[1],
        supported_speeds,
        is_bus_master: bytes[2].get_bit(2),
        transfer_type_preference,
    }))
}

fn start_dependent_functions_descriptor(bytes: &[u8]) -> Resource {
    /*
     * Byte 1, if present, holds the priorities:
     *      Bits [3:2]: performance/robustness
     *      Bits [1:0]: compatibility priority
     */
    match bytes.get(1) {
        Some(priority) => Resource::StartDependentFunctions {
            compatibility: Some(priority.get_bits(0..2)),
            performance: Some(priority.get_bits(2..4)),
        },
        None => Resource::StartDependentFunctions { compatibility: None, performance: None },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IOPortDescriptor {
    pub decodes_full_address: bool,
    pub memory_range: (u16, u16),
    pub base_alignment: u8,
    pub range_length: u8,
}

fn io_port_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * I/O Port Descriptor Definition
     * Offset   Field Name                                  Definition
     * Byte 0   I/O Port Descriptor                         Value = 0x47 (01000111B)
     * Byte 1   Information                                 Bits [7:1] Reserved and must be 0
     *                                                      Bit [0] (_DEC)
     *                                                        1 The logical device decodes 16-bit addresses
     *                                                        0 The logical device only decodes address bits[9:0]
     * Byte 2   Range minimum base address, _MIN bits[7:0]
     * Byte 3   Range minimum base address, _MIN bits[15:8]
     * Byte 4   Range maximum base address, _MAX bits[7:0]
     * Byte 5   Range maximum base address, _MAX bits[15:8]
     * Byte 6   Base alignment, _ALN
     * Byte 7   Range length, _LEN
     */
    if bytes.len() < 8 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::IOPort(IOPortDescriptor {
        decodes_full_address: bytes[1].get_bit(0),
        memory_range: (LittleEndian::read_u16(&bytes[2..4]), LittleEndian::read_u16(&bytes[4..6])),
        base_alignment: bytes[6],
        range_length: bytes[7],
    }))
}

fn fixed_io_port_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * Byte 1-2: range base address, of which only bits [9:0] are decoded
     * Byte 3:   range length
     */
    if bytes.len() < 4 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::FixedIOPort { base: LittleEndian::read_u16(&bytes[1..3]).get_bits(0..10), length: bytes[3] })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryRangeDescriptor {
    FixedLocation { is_writable: bool, base_address: u32, range_length: u32 },
    Range { is_writable: bool, minimum: u32, maximum: u32, alignment: u32, range_length: u32 },
}

fn memory_24_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * 24-bit Memory Range Descriptor. Addresses and lengths are stored as bits [23:8], and alignment is in
     * bytes, with 0 meaning 64KiB.
     * Byte 3:     Information, bit [0] set if writeable
     * Byte 4-5:   Range minimum base address
     * Byte 6-7:   Range maximum base address
     * Byte 8-9:   Base alignment
     * Byte 10-11: Range length
     */
    if bytes.len() < 12 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let alignment = match LittleEndian::read_u16(&bytes[8..10]) {
        0 => 0x10000,
        alignment => alignment as u32,
    };
    Ok(Resource::MemoryRange(MemoryRangeDescriptor::Range {
        is_writable: bytes[3].get_bit(0),
        minimum: (LittleEndian::read_u16(&bytes[4..6]) as u32) << 8,
        maximum: (LittleEndian::read_u16(&bytes[6..8]) as u32) << 8,
        alignment,
        range_length: (LittleEndian::read_u16(&bytes[10..12]) as u32) << 8,
    }))
}

fn memory_32_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * 32-bit Memory Range Descriptor
     * Byte 3:     Information, bit [0] set if writeable
     * Byte 4-7:   Range minimum base address
     * Byte 8-11:  Range maximum base address
     * Byte 12-15: Base alignment
     * Byte 16-19: Range length
     */
    if bytes.len() < 20 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::MemoryRange(MemoryRangeDescriptor::Range {
        is_writable: bytes[3].get_bit(0),
        minimum: LittleEndian::read_u32(&bytes[4..8]),
        maximum: LittleEndian::read_u32(&bytes[8..12]),
        alignment: LittleEndian::read_u32(&bytes[12..16]),
        range_length: LittleEndian::read_u32(&bytes[16..20]),
    }))
}

fn fixed_memory_descriptor(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * -- 32-bit Fixed Memory Descriptor ---
     * Offset     Field Name                              Definition
     * Byte 0     32-bit Fixed Memory Range Descriptor    Value = 0x86 (10000110B) – Type = 1, Large item name = 0x06
     * Byte 1     Length, bits [7:0]                      Value = 0x09 (9)
     * Byte 2     Length, bits [15:8]                     Value = 0x00
     * Byte 3     Information                             This field provides extra information about this memory.
     *                                                    Bit [7:1]   Ignored
     *                                                    Bit [0]     Write status, _RW
     * Byte 4-7   Range base address, _BAS bits [31:0]
     * Byte 8-11  Range length, _LEN bits [31:0]
     */
    if bytes.len() < 12 {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    Ok(Resource::MemoryRange(MemoryRangeDescriptor::FixedLocation {
        is_writable: bytes[3].get_bit(0),
        base_address: LittleEndian::read_u32(&bytes[4..8]),
        range_length: LittleEndian::read_u32(&bytes[8..12]),
    }))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSpaceResourceType {
    MemoryRange,
    IORange,
    BusNumberRange,
    /// Types 192-255 are defined by the hardware vendor.
    Vendor(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSpaceDecodeType {
    Additive,
    Subtractive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressSpaceDescriptor {
    pub resource_type: AddressSpaceResourceType,
    pub is_maximum_address_fixed: bool,
    pub is_minimum_address_fixed: bool,
    pub decode_type: AddressSpaceDecodeType,
    /// The resource-type-specific flags, such as cacheability for memory ranges.
    pub type_flags: u8,
    pub granularity: u64,
    pub address_range: (u64, u64),
    pub translation_offset: u64,
    pub length: u64,
}

/// The width of the fields of a word, dword or qword address space descriptor.
trait AddressField {
    const SIZE: usize;
    fn read(bytes: &[u8]) -> u64;
}

impl AddressField for u16 {
    const SIZE: usize = 2;
    fn read(bytes: &[u8]) -> u64 {
        LittleEndian::read_u16(bytes) as u64
    }
}

impl AddressField for u32 {
    const SIZE: usize = 4;
    fn read(bytes: &[u8]) -> u64 {
        LittleEndian::read_u32(bytes) as u64
    }
}

impl AddressField for u64 {
    const SIZE: usize = 8;
    fn read(bytes: &[u8]) -> u64 {
        LittleEndian::read_u64(bytes)
    }
}

fn address_space_descriptor<T: AddressField>(bytes: &[u8]) -> Result<Resource, AmlError> {
    /*
     * WORD, DWORD and QWORD Address Space Descriptors share a layout, differing only in the size of their
     * address fields:
     * Byte 3: Resource Type
     *      0: Memory range
     *      1: I/O range
     *      2: Bus number range
     *      3-191: Reserved
     *      192-255: Hardware vendor defined
     * Byte 4: General Flags
     *      Bit [3]: 1 if the maximum address is fixed, _MAF
     *      Bit [2]: 1 if the minimum address is fixed, _MIF
     *      Bit [1]: 1 if the bridge subtractively decodes this address, _DEC
     * Byte 5: Type Specific Flags
     * Then, each `T::SIZE` bytes wide: granularity, range minimum, range maximum, translation offset, length.
     * An optional resource source index and string may follow, and are ignored.
     */
    const GENERAL_FLAGS: usize = 4;
    let fields_start = 6;
    if bytes.len() < fields_start + 5 * T::SIZE {
        return Err(AmlError::ResourceDescriptorTooShort);
    }

    let resource_type = match bytes[3] {
        0 => AddressSpaceResourceType::MemoryRange,
        1 => AddressSpaceResourceType::IORange,
        2 => AddressSpaceResourceType::BusNumberRange,
        vendor @ 192..=255 => AddressSpaceResourceType::Vendor(vendor),
        _ => return Err(AmlError::InvalidResourceDescriptor),
    };
    let field = |n: usize| T::read(&bytes[(fields_start + n * T::SIZE)..(fields_start + (n + 1) * T::SIZE)]);
    let flags = bytes[GENERAL_FLAGS];

    Ok(Resource::AddressSpace(AddressSpaceDescriptor {
        resource_type,
        is_maximum_address_fixed: flags.get_bit(3),
        is_minimum_address_fixed: flags.get_bit(2),
        decode_type: if flags.get_bit(1) { AddressSpaceDecodeType::Subtractive } else { AddressSpaceDecodeType::Additive },
        type_flags: bytes[5],
        granularity: field(0),
        address_range: (field(1), field(2)),
        translation_offset: field(3),
        length: field(4),
    }))
}

use crate::{stream::AmlStream, AmlError};
use bit_field::BitField;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PkgLength {
    pub raw_length: u32,
    /// The offset in the stream to stop parsing at - the "end" of the structure the `PkgLength` belongs to.
    /// We need to track this instead of the actual length encoded in the `PkgLength` as we often need to parse
    /// some stuff between the `PkgLength` and the explicit-length structure.
    pub end_offset: usize,
}

/// Parses a `PkgLength`, checking that the structure it describes fits in the current region of the stream.
pub fn pkg_length(stream: &mut AmlStream) -> Result<PkgLength, AmlError> {
    let start = stream.pc();
    let raw_length = raw_pkg_length(stream)?;

    /*
     * NOTE: the raw length includes the bytes used to encode the `PkgLength` itself, so we measure from
     * where it started.
     */
    let end_offset = start + raw_length as usize;
    if end_offset > stream.end() || end_offset < stream.pc() {
        return Err(AmlError::InvalidPkgLength);
    }

    Ok(PkgLength { raw_length, end_offset })
}

/// Parses a `PkgLength` and returns the *raw length*. If you want an instance of `PkgLength`, use
/// `pkg_length` instead.
pub fn raw_pkg_length(stream: &mut AmlStream) -> Result<u32, AmlError> {
    /*
     * PkgLength := PkgLeadByte |
     * <PkgLeadByte ByteData> |
     * <PkgLeadByte ByteData ByteData> |
     * <PkgLeadByte ByteData ByteData ByteData>
     *
     * The length encoded by the PkgLength includes the number of bytes used to encode it.
     */
    let lead_byte = stream.next()?;
    let byte_count = lead_byte.get_bits(6..8);

    if byte_count == 0 {
        return Ok(u32::from(lead_byte.get_bits(0..6)));
    }

    let mut length = u32::from(lead_byte.get_bits(0..4));
    for i in 0..byte_count {
        length |= u32::from(stream.next()?) << (4 + i * 8);
    }

    Ok(length)
}

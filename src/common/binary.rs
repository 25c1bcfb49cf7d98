//! Binary data parsing utilities shared across formats.
//!
//! Classic Macintosh containers are mostly big-endian, but individual zones
//! may declare little-endian storage, so every reader here takes an
//! [`Endian`] selector instead of hard-coding a byte order.

use zerocopy::{BE, F64, FromBytes, I16, I32, LE, U16, U32};

/// Binary parsing error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    #[error("Insufficient data: expected {expected}, got {available}")]
    InsufficientData { expected: usize, available: usize },
    /// Failed to parse the data
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

/// Byte order of a value stored in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum Endian {
    /// Most significant byte first ("HiLo"), the classic Mac layout
    #[default]
    Big,
    /// Least significant byte first ("LoHi")
    Little,
}

#[inline]
fn window(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| BinaryError::ParseError("offset overflow".to_string()))?;
    if end > data.len() {
        return Err(BinaryError::InsufficientData {
            expected: end,
            available: data.len(),
        });
    }
    Ok(&data[offset..end])
}

/// Read a u8 at the given offset.
#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> BinaryResult<u8> {
    window(data, offset, 1).map(|b| b[0])
}

/// Read a u16 at the given offset.
///
/// # Examples
///
/// ```
/// use macdoc::common::binary::{read_u16, Endian};
/// let data = [0x12, 0x34];
/// assert_eq!(read_u16(&data, 0, Endian::Big).unwrap(), 0x1234);
/// assert_eq!(read_u16(&data, 0, Endian::Little).unwrap(), 0x3412);
/// ```
#[inline]
pub fn read_u16(data: &[u8], offset: usize, endian: Endian) -> BinaryResult<u16> {
    let bytes = window(data, offset, 2)?;
    let value = match endian {
        Endian::Big => U16::<BE>::read_from_bytes(bytes).ok().map(|v| v.get()),
        Endian::Little => U16::<LE>::read_from_bytes(bytes).ok().map(|v| v.get()),
    };
    value.ok_or_else(|| BinaryError::ParseError("Failed to read u16".to_string()))
}

/// Read an i16 at the given offset.
#[inline]
pub fn read_i16(data: &[u8], offset: usize, endian: Endian) -> BinaryResult<i16> {
    let bytes = window(data, offset, 2)?;
    let value = match endian {
        Endian::Big => I16::<BE>::read_from_bytes(bytes).ok().map(|v| v.get()),
        Endian::Little => I16::<LE>::read_from_bytes(bytes).ok().map(|v| v.get()),
    };
    value.ok_or_else(|| BinaryError::ParseError("Failed to read i16".to_string()))
}

/// Read a u32 at the given offset.
///
/// # Examples
///
/// ```
/// use macdoc::common::binary::{read_u32, Endian};
/// let data = [0x43, 0x23, 0x2B, 0x44];
/// assert_eq!(read_u32(&data, 0, Endian::Big).unwrap(), 0x4323_2B44);
/// ```
#[inline]
pub fn read_u32(data: &[u8], offset: usize, endian: Endian) -> BinaryResult<u32> {
    let bytes = window(data, offset, 4)?;
    let value = match endian {
        Endian::Big => U32::<BE>::read_from_bytes(bytes).ok().map(|v| v.get()),
        Endian::Little => U32::<LE>::read_from_bytes(bytes).ok().map(|v| v.get()),
    };
    value.ok_or_else(|| BinaryError::ParseError("Failed to read u32".to_string()))
}

/// Read an i32 at the given offset.
#[inline]
pub fn read_i32(data: &[u8], offset: usize, endian: Endian) -> BinaryResult<i32> {
    let bytes = window(data, offset, 4)?;
    let value = match endian {
        Endian::Big => I32::<BE>::read_from_bytes(bytes).ok().map(|v| v.get()),
        Endian::Little => I32::<LE>::read_from_bytes(bytes).ok().map(|v| v.get()),
    };
    value.ok_or_else(|| BinaryError::ParseError("Failed to read i32".to_string()))
}

/// Read an IEEE-754 f64 at the given offset.
#[inline]
pub fn read_f64(data: &[u8], offset: usize, endian: Endian) -> BinaryResult<f64> {
    let bytes = window(data, offset, 8)?;
    let value = match endian {
        Endian::Big => F64::<BE>::read_from_bytes(bytes).ok().map(|v| v.get()),
        Endian::Little => F64::<LE>::read_from_bytes(bytes).ok().map(|v| v.get()),
    };
    value.ok_or_else(|| BinaryError::ParseError("Failed to read f64".to_string()))
}

/// Borrow `len` bytes starting at `offset`.
#[inline]
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    window(data, offset, len)
}

/// Decode UCS-2 code units, stopping at the first NUL.
///
/// Unpaired surrogates are replaced with U+FFFD rather than rejected; old
/// files routinely carry them.
///
/// # Examples
///
/// ```
/// use macdoc::common::binary::{decode_ucs2, Endian};
/// let data = [0x00, 0x48, 0x00, 0x69];
/// assert_eq!(decode_ucs2(&data, Endian::Big), "Hi");
/// ```
pub fn decode_ucs2(data: &[u8], endian: Endian) -> String {
    let units = data.chunks_exact(2).map(|pair| match endian {
        Endian::Big => u16::from_be_bytes([pair[0], pair[1]]),
        Endian::Little => u16::from_le_bytes([pair[0], pair[1]]),
    });
    char::decode_utf16(units.take_while(|&unit| unit != 0))
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decode an 8-bit Mac OS Roman string.
pub fn decode_mac_roman(data: &[u8]) -> String {
    let (text, _, _) = encoding_rs::MACINTOSH.decode(data);
    text.into_owned()
}

//! "Pack" decompression.
//!
//! Packed zones hold a variable-width dictionary coder close to classic LZW:
//!
//! - 4-byte big-endian header: `flag << 24 | size`, where `size` is the
//!   expanded length and `flag` must have a zero low nibble and a non-zero
//!   high nibble
//! - MSB-first codes, 9 bits wide at start, one bit wider each time the
//!   dictionary reaches `2^width - 0x102` entries
//! - `0x00..=0xFF` literal bytes, `0x100` reset, `0x101` end of stream,
//!   `0x102..` dictionary entries
//!
//! Every emitted string becomes a new dictionary entry, and the entry
//! created by the previous step is completed with the first byte of the
//! current one.

use crate::ragtime5::{Error, Result};

const RESET_CODE: u32 = 0x100;
const END_CODE: u32 = 0x101;
const FIRST_ENTRY: u32 = 0x102;
const INITIAL_WIDTH: u32 = 9;
const MAX_WIDTH: u32 = 16;
const MAX_EXPANSION: usize = 64;

/// Pulls fixed-width codes out of a byte slice, most significant bit first.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    bits: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            bits: 0,
        }
    }

    /// Next `width`-bit code, or `None` once the input runs dry.
    fn read(&mut self, width: u32) -> Option<u32> {
        while self.bits < width {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            self.buffer = (self.buffer << 8) | u64::from(byte);
            self.bits += 8;
        }
        self.bits -= width;
        let code = (self.buffer >> self.bits) & ((1u64 << width) - 1);
        self.buffer &= (1u64 << self.bits) - 1;
        Some(code as u32)
    }

    /// Whether the bits left in the current byte are all zero padding.
    fn padding_is_clear(&self) -> bool {
        self.buffer == 0
    }
}

/// Read the `(flag, size)` pair from a Pack header.
pub fn read_pack_header(data: &[u8]) -> Result<(u8, usize)> {
    let header: [u8; 4] = data
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| corrupt("missing pack header"))?;
    let word = u32::from_be_bytes(header);
    let flag = (word >> 24) as u8;
    let size = (word & 0x00FF_FFFF) as usize;
    if flag & 0x0F != 0 || flag & 0xF0 == 0 {
        return Err(corrupt(format!("invalid pack flag {flag:#04x}")));
    }
    Ok((flag, size))
}

/// Expand a Pack payload (header included).
///
/// Any inconsistency fails the whole call; callers treat the zone as empty.
///
/// # Examples
///
/// ```
/// use macdoc::ragtime5::unpack::unpack;
///
/// // flag 0x10, size 1; codes 'A' (0x041) and end (0x101), 9 bits each
/// let data = [0x10, 0x00, 0x00, 0x01, 0x20, 0xC0, 0x40];
/// assert_eq!(unpack(&data).unwrap(), b"A");
/// ```
pub fn unpack(data: &[u8]) -> Result<Vec<u8>> {
    let (_, size) = read_pack_header(data)?;
    let mut reader = BitReader::new(&data[4..]);
    let mut output = Vec::with_capacity(initial_capacity(size, data.len()));
    let mut dictionary: Vec<Vec<u8>> = Vec::new();
    // index of the entry still waiting for its final byte
    let mut pending: Option<usize> = None;
    let mut width = INITIAL_WIDTH;

    loop {
        let code = reader
            .read(width)
            .ok_or_else(|| corrupt("stream exhausted before end code"))?;
        match code {
            RESET_CODE => {
                dictionary.clear();
                pending = None;
                width = INITIAL_WIDTH;
                continue;
            },
            END_CODE => {
                if !reader.padding_is_clear() {
                    return Err(corrupt("trailing bits after end code"));
                }
                break;
            },
            _ => {},
        }

        let current = if code < RESET_CODE {
            vec![code as u8]
        } else {
            let index = (code - FIRST_ENTRY) as usize;
            let entry = dictionary.get(index).ok_or_else(|| {
                corrupt(format!(
                    "code {code:#x} past dictionary end ({} entries)",
                    dictionary.len()
                ))
            })?;
            let mut entry = entry.clone();
            if pending == Some(index) {
                entry.push(entry[0]);
            }
            entry
        };

        if let Some(previous) = pending {
            dictionary[previous].push(current[0]);
        }
        output.extend_from_slice(&current);
        if output.len() > size {
            return Err(corrupt(format!(
                "output exceeds declared size {size}"
            )));
        }
        dictionary.push(current);
        pending = Some(dictionary.len() - 1);

        if width < MAX_WIDTH && dictionary.len() + FIRST_ENTRY as usize >= 1usize << width {
            width += 1;
        }
    }

    if output.len() != size {
        return Err(corrupt(format!(
            "unpacked {} bytes, header declares {size}",
            output.len()
        )));
    }
    Ok(output)
}

/// Reservation for the output buffer; the declared size is only trusted up
/// to what the compressed length could plausibly expand to.
#[inline]
fn initial_capacity(declared: usize, stored: usize) -> usize {
    declared.min(stored.saturating_mul(MAX_EXPANSION))
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::ZoneCorrupt {
        zone: 0,
        reason: reason.into(),
    }
}

#[cfg(test)]
pub(crate) fn pack_codes(size: u32, codes: &[(u32, u32)]) -> Vec<u8> {
    let mut out = (0x1000_0000 | size).to_be_bytes().to_vec();
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    for &(code, width) in codes {
        buffer = (buffer << width) | u64::from(code);
        bits += width;
        while bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
        buffer &= (1u64 << bits) - 1;
    }
    if bits > 0 {
        out.push((buffer << (8 - bits)) as u8);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // "AAAABBBBAAAA" spelled with literals and back-references
    const AB_CODES: [(u32, u32); 9] = [
        (0x041, 9), // A
        (0x102, 9), // AA (pending entry + its own first byte)
        (0x041, 9), // A
        (0x042, 9), // B
        (0x105, 9), // BB
        (0x042, 9), // B
        (0x103, 9), // AAA
        (0x041, 9), // A
        (END_CODE, 9),
    ];

    #[test]
    fn test_unpack_back_references() {
        let data = pack_codes(12, &AB_CODES);
        assert_eq!(unpack(&data).unwrap(), b"AAAABBBBAAAA");
    }

    #[test]
    fn test_truncated_stream_fails() {
        let data = pack_codes(12, &AB_CODES[..AB_CODES.len() - 1]);
        assert!(matches!(unpack(&data), Err(Error::ZoneCorrupt { .. })));
    }

    #[test]
    fn test_size_mismatch_fails() {
        let data = pack_codes(11, &AB_CODES);
        assert!(unpack(&data).is_err());
        let data = pack_codes(13, &AB_CODES);
        assert!(unpack(&data).is_err());
    }

    #[test]
    fn test_oversized_declaration_is_not_reserved() {
        let data = pack_codes(0x00FF_FFFF, &[(0x041, 9), (END_CODE, 9)]);
        assert_eq!(initial_capacity(0x00FF_FFFF, data.len()), data.len() * MAX_EXPANSION);
        assert!(matches!(unpack(&data), Err(Error::ZoneCorrupt { .. })));
        assert_eq!(initial_capacity(12, 4096), 12);
    }

    #[test]
    fn test_reference_past_dictionary_fails() {
        let data = pack_codes(2, &[(0x041, 9), (0x110, 9), (END_CODE, 9)]);
        assert!(unpack(&data).is_err());
    }

    #[test]
    fn test_reset_restarts_dictionary() {
        // A, AA, reset, then 0x102 refers to the fresh B entry
        let codes = [
            (0x041, 9),
            (0x102, 9),
            (RESET_CODE, 9),
            (0x100, 9), // a second reset on an empty dictionary is harmless
            (0x042, 9),
            (0x102, 9),
            (END_CODE, 9),
        ];
        let data = pack_codes(6, &codes);
        assert_eq!(unpack(&data).unwrap(), b"AAABBB");
    }

    #[test]
    fn test_invalid_flag_rejected() {
        assert!(read_pack_header(&[0x00, 0, 0, 1]).is_err());
        assert!(read_pack_header(&[0x11, 0, 0, 1]).is_err());
        assert_eq!(read_pack_header(&[0x80, 0, 1, 0]).unwrap(), (0x80, 256));
        assert!(read_pack_header(&[0x80, 0]).is_err());
    }

    #[test]
    fn test_nonzero_padding_rejected() {
        let mut data = pack_codes(1, &[(0x041, 9), (END_CODE, 9)]);
        *data.last_mut().unwrap() |= 0x01;
        assert!(unpack(&data).is_err());
    }

    #[test]
    fn test_code_width_grows() {
        // 253 literals fill the dictionary to 2^9 - 0x102 entries, after
        // which codes are read 10 bits wide.
        let mut codes: Vec<(u32, u32)> = (0..253).map(|i| (i % 200, 9)).collect();
        codes.push((0x041, 9));
        codes.push((END_CODE, 10));
        let data = pack_codes(254, &codes);
        let out = unpack(&data).unwrap();
        assert_eq!(out.len(), 254);
        assert_eq!(out[253], b'A');
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_unpack_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = unpack(&data);
        }
    }
}

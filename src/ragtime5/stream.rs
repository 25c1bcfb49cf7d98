//! Seekable, byte-order aware view over zone data.
//!
//! A [`ByteStream`] wraps a [`Bytes`] buffer, so carving a record out of a
//! zone is a reference-count bump rather than a copy.

use bytes::Bytes;

use crate::common::binary::{self, BinaryError, BinaryResult, Endian};

/// Cursor over one logical zone buffer.
#[derive(Debug, Clone)]
pub struct ByteStream {
    data: Bytes,
    pos: usize,
    endian: Endian,
}

impl ByteStream {
    /// Create a stream positioned at the start of `data`.
    pub fn new(data: Bytes, endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    /// Total length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the cursor and the end of the buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The whole underlying buffer, independent of the cursor.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Move the cursor to an absolute position (the end is a valid target).
    pub fn seek(&mut self, pos: usize) -> BinaryResult<()> {
        if pos > self.data.len() {
            return Err(BinaryError::InsufficientData {
                expected: pos,
                available: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the cursor by `len` bytes.
    pub fn skip(&mut self, len: usize) -> BinaryResult<()> {
        let target = self
            .pos
            .checked_add(len)
            .ok_or_else(|| BinaryError::ParseError("offset overflow".to_string()))?;
        self.seek(target)
    }

    /// Next byte without advancing.
    #[inline]
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> BinaryResult<u8> {
        let value = binary::read_u8(&self.data, self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> BinaryResult<u16> {
        let value = binary::read_u16(&self.data, self.pos, self.endian)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_i16(&mut self) -> BinaryResult<i16> {
        let value = binary::read_i16(&self.data, self.pos, self.endian)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> BinaryResult<u32> {
        let value = binary::read_u32(&self.data, self.pos, self.endian)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> BinaryResult<i32> {
        let value = binary::read_i32(&self.data, self.pos, self.endian)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_f64(&mut self) -> BinaryResult<f64> {
        let value = binary::read_f64(&self.data, self.pos, self.endian)?;
        self.pos += 8;
        Ok(value)
    }

    /// Read `len` bytes as a shared slice of the underlying buffer.
    pub fn read_bytes(&mut self, len: usize) -> BinaryResult<Bytes> {
        binary::read_bytes(&self.data, self.pos, len)?;
        let out = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    /// A new stream over `[start, end)` sharing this buffer and byte order.
    pub fn sub_stream(&self, start: usize, end: usize) -> BinaryResult<ByteStream> {
        if start > end || end > self.data.len() {
            return Err(BinaryError::InsufficientData {
                expected: end,
                available: self.data.len(),
            });
        }
        Ok(ByteStream::new(self.data.slice(start..end), self.endian))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let mut stream = ByteStream::new(
            Bytes::from_static(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xFF]),
            Endian::Big,
        );
        assert_eq!(stream.read_u16().unwrap(), 1);
        assert_eq!(stream.read_u32().unwrap(), 2);
        assert_eq!(stream.remaining(), 1);
        assert_eq!(stream.read_u8().unwrap(), 0xFF);
        assert!(stream.is_end());
        assert!(stream.read_u8().is_err());
    }

    #[test]
    fn test_sub_stream_shares_byte_order() {
        let stream = ByteStream::new(Bytes::from_static(&[0xAA, 0x01, 0x00, 0xBB]), Endian::Little);
        let mut sub = stream.sub_stream(1, 3).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.read_u16().unwrap(), 1);
        assert!(stream.sub_stream(3, 5).is_err());
        assert!(stream.sub_stream(3, 2).is_err());
    }

    #[test]
    fn test_seek_bounds() {
        let mut stream = ByteStream::new(Bytes::from_static(&[1, 2, 3]), Endian::Big);
        assert!(stream.seek(3).is_ok());
        assert!(stream.is_end());
        assert!(stream.seek(4).is_err());
        stream.seek(1).unwrap();
        assert_eq!(stream.read_bytes(2).unwrap().as_ref(), &[2u8, 3][..]);
    }
}

//! Self-describing fields of struct records.
//!
//! A field is `(size_tag:u8, type_code:u32, payload)`. The size tag picks
//! the payload encoding; the type code is opaque to this layer and only
//! means something to the visitor that consumes the field.

use bytes::Bytes;
use serde::Serialize;

use crate::common::binary::{self, BinaryError, Endian};
use crate::ragtime5::stream::ByteStream;

const TAG_SHORT: u8 = 0x01;
const TAG_LONG: u8 = 0x02;
const TAG_DOUBLE: u8 = 0x08;
const TAG_UNICODE: u8 = 0x0c;
const TAG_LIST: u8 = 0x10;
const TAG_BLOB: u8 = 0x20;

/// Errors raised while decoding a field run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("truncated field: {0}")]
    Truncated(#[from] BinaryError),

    #[error("unknown size tag {tag:#04x} at {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("field at {offset} runs past its enclosing record")]
    Overrun { offset: usize },
}

/// Decoded payload of a [`Field`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Long(i64),
    Double(f64),
    Unicode(String),
    List(Vec<Field>),
    Unstructured(Bytes),
}

/// One tagged value of a struct record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Raw 4-byte type code
    pub type_code: u32,
    pub value: FieldValue,
}

impl Field {
    pub fn as_long(&self) -> Option<i64> {
        match self.value {
            FieldValue::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.value {
            FieldValue::Double(v) => Some(v),
            FieldValue::Long(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Unicode(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.value {
            FieldValue::Unstructured(b) => Some(b),
            _ => None,
        }
    }

    /// Nested fields of a list field (empty for scalars).
    pub fn children(&self) -> &[Field] {
        match &self.value {
            FieldValue::List(fields) => fields,
            _ => &[],
        }
    }
}

struct Frame {
    type_code: u32,
    end: usize,
    fields: Vec<Field>,
}

/// Decode fields from the stream cursor up to `end`.
///
/// Nested lists are tracked on an explicit frame stack, so hostile nesting
/// depth costs heap, not call stack.
pub fn read_fields(stream: &mut ByteStream, end: usize) -> Result<Vec<Field>, FieldError> {
    if end > stream.len() {
        return Err(FieldError::Overrun {
            offset: stream.position(),
        });
    }
    let mut frames = vec![Frame {
        type_code: 0,
        end,
        fields: Vec::new(),
    }];

    loop {
        let Some(frame_end) = frames.last().map(|top| top.end) else {
            return Ok(Vec::new());
        };
        let offset = stream.position();
        if offset >= frame_end {
            if offset > frame_end {
                return Err(FieldError::Overrun { offset });
            }
            let Some(done) = frames.pop() else {
                return Ok(Vec::new());
            };
            match frames.last_mut() {
                None => return Ok(done.fields),
                Some(parent) => parent.fields.push(Field {
                    type_code: done.type_code,
                    value: FieldValue::List(done.fields),
                }),
            }
            continue;
        }

        let tag = stream.read_u8()?;
        let type_code = stream.read_u32()?;
        let value = match tag {
            TAG_SHORT => FieldValue::Long(i64::from(stream.read_i16()?)),
            TAG_LONG => FieldValue::Long(i64::from(stream.read_i32()?)),
            TAG_DOUBLE => FieldValue::Double(stream.read_f64()?),
            TAG_UNICODE => {
                let count = usize::from(stream.read_u16()?);
                let units = stream.read_bytes(count * 2)?;
                FieldValue::Unicode(binary::decode_ucs2(&units, Endian::Little))
            },
            TAG_LIST => {
                let length = stream.read_u32()? as usize;
                let nested_end = stream
                    .position()
                    .checked_add(length)
                    .filter(|&e| e <= frame_end)
                    .ok_or(FieldError::Overrun { offset })?;
                frames.push(Frame {
                    type_code,
                    end: nested_end,
                    fields: Vec::new(),
                });
                continue;
            },
            TAG_BLOB => {
                let length = stream.read_u32()? as usize;
                FieldValue::Unstructured(stream.read_bytes(length)?)
            },
            tag => return Err(FieldError::UnknownTag { tag, offset }),
        };
        if stream.position() > frame_end {
            return Err(FieldError::Overrun { offset });
        }
        if let Some(top) = frames.last_mut() {
            top.fields.push(Field { type_code, value });
        }
    }
}

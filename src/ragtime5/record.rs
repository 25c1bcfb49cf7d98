//! Generic record layouts.
//!
//! Three strategies slice a zone into records and hand them to a caller
//! supplied visitor:
//!
//! - [`read_list`]: records delimited by an offsets zone of `i32`
//! - [`read_fixed_size`]: `count` records of `field_size` bytes
//! - [`read_struct`]: records made of an optional header plus
//!   self-describing [`Field`]s, either offset-driven or length-prefixed
//!
//! Visitors report success as a `bool`. A `false` is logged as a
//! [`DiagnosticKind::VisitorFailure`] and the traversal moves on.

use crate::ragtime5::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ragtime5::field::{self, Field};
use crate::ragtime5::stream::ByteStream;
use crate::ragtime5::{Error, Result};

/// Consumer of list and fixed-size records.
pub trait RecordVisitor {
    /// Decode record `index`; the stream covers exactly that record.
    fn visit_record(&mut self, index: usize, record: &mut ByteStream) -> bool;
}

/// Consumer of struct records.
pub trait StructVisitor {
    /// Size of the fixed header in front of record `index`'s fields.
    fn header_size(&self, _index: usize) -> usize {
        0
    }

    fn visit_header(&mut self, _index: usize, _header: &mut ByteStream) -> bool {
        true
    }

    fn visit_field(&mut self, index: usize, field: &Field) -> bool;
}

/// Counters returned by every reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Records delimited by the layout, empty ones included
    pub records: usize,
    /// Records handed to the visitor
    pub visited: usize,
    /// Records skipped or rejected
    pub failed: usize,
}

/// Where a link's records live.
#[derive(Debug, Clone)]
pub struct RecordSource {
    /// Data zone id, for diagnostics
    pub zone: u32,
    pub data: ByteStream,
    /// Offsets zone, when the layout has one
    pub offsets: Option<ByteStream>,
}

impl RecordSource {
    pub fn new(zone: u32, data: ByteStream) -> Self {
        Self {
            zone,
            data,
            offsets: None,
        }
    }

    pub fn with_offsets(mut self, offsets: ByteStream) -> Self {
        self.offsets = Some(offsets);
        self
    }
}

/// Record spans derived from an offsets zone. `None` marks a span that was
/// rejected; empty spans are kept so indices stay aligned.
fn list_spans(
    source: &RecordSource,
    stats: &mut ReadStats,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Option<(usize, usize)>>> {
    let Some(offsets) = &source.offsets else {
        // without an offsets zone the whole data zone is one record
        let len = source.data.len();
        stats.records = usize::from(len > 0);
        return Ok(if len > 0 { vec![Some((0, len))] } else { Vec::new() });
    };

    let mut cursor = offsets.clone();
    cursor.seek(0).map_err(|err| Error::corrupt(source.zone, err))?;
    let mut values = Vec::with_capacity(cursor.len() / 4);
    while cursor.remaining() >= 4 {
        values.push(cursor.read_i32().map_err(|err| Error::corrupt(source.zone, err))?);
    }

    let data_len = source.data.len();
    let mut spans = Vec::with_capacity(values.len().saturating_sub(1));
    for (index, pair) in values.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);
        let valid = start >= 0 && end >= start && end as usize <= data_len;
        if valid {
            spans.push(Some((start as usize, end as usize)));
        } else {
            diagnostics.push(
                DiagnosticKind::ZoneCorrupt,
                Some(source.zone),
                Some(index as u64 * 4),
                format!("record {index}: bad offsets {start}..{end} (data is {data_len} bytes)"),
            );
            stats.failed += 1;
            spans.push(None);
        }
    }
    stats.records = spans.len();
    Ok(spans)
}

/// Read a list layout. Equal consecutive offsets denote an empty record,
/// which is counted but never visited.
pub fn read_list(
    source: &RecordSource,
    visitor: &mut impl RecordVisitor,
    diagnostics: &mut Diagnostics,
) -> Result<ReadStats> {
    let mut stats = ReadStats::default();
    let spans = list_spans(source, &mut stats, diagnostics)?;
    for (index, span) in spans.into_iter().enumerate() {
        let Some((start, end)) = span else {
            continue;
        };
        if start == end {
            log::trace!("ragtime5: Zone{} record {index} is empty", source.zone);
            continue;
        }
        let mut record = source
            .data
            .sub_stream(start, end)
            .map_err(|err| Error::corrupt(source.zone, err))?;
        stats.visited += 1;
        if !visitor.visit_record(index, &mut record) {
            stats.failed += 1;
            visitor_failure(diagnostics, source.zone, start, format!("record {index} rejected"));
        }
    }
    Ok(stats)
}

/// Read `count` records of `field_size` bytes. Fails as a whole when the
/// zone is too short to hold them.
pub fn read_fixed_size(
    source: &RecordSource,
    field_size: usize,
    count: usize,
    visitor: &mut impl RecordVisitor,
    diagnostics: &mut Diagnostics,
) -> Result<ReadStats> {
    let data_len = source.data.len();
    let total = field_size.checked_mul(count).filter(|&t| t <= data_len);
    let Some(total) = total else {
        return Err(Error::ZoneCorrupt {
            zone: source.zone,
            reason: format!("{count} records of {field_size} bytes exceed {data_len} bytes"),
        });
    };
    if field_size == 0 {
        return Ok(ReadStats::default());
    }
    if total < data_len {
        log::debug!(
            "ragtime5: Zone{} keeps {} trailing bytes after {count} records",
            source.zone,
            data_len - total
        );
    }

    let mut stats = ReadStats {
        records: count,
        ..ReadStats::default()
    };
    for index in 0..count {
        let start = index * field_size;
        let mut record = source
            .data
            .sub_stream(start, start + field_size)
            .map_err(|err| Error::corrupt(source.zone, err))?;
        stats.visited += 1;
        if !visitor.visit_record(index, &mut record) {
            stats.failed += 1;
            visitor_failure(diagnostics, source.zone, start, format!("record {index} rejected"));
        }
    }
    Ok(stats)
}

/// Read struct records.
///
/// With an offsets zone each span is one record; otherwise records follow
/// each other, each prefixed by its total length (`u32`, itself included).
pub fn read_struct(
    source: &RecordSource,
    visitor: &mut impl StructVisitor,
    diagnostics: &mut Diagnostics,
) -> Result<ReadStats> {
    let mut stats = ReadStats::default();
    if source.offsets.is_some() {
        let spans = list_spans(source, &mut stats, diagnostics)?;
        for (index, span) in spans.into_iter().enumerate() {
            let Some((start, end)) = span else {
                continue;
            };
            if start == end {
                continue;
            }
            let mut record = source
                .data
                .sub_stream(start, end)
                .map_err(|err| Error::corrupt(source.zone, err))?;
            stats.visited += 1;
            if !struct_record(source.zone, index, start, &mut record, visitor, diagnostics) {
                stats.failed += 1;
            }
        }
        return Ok(stats);
    }

    let mut stream = source.data.clone();
    stream.seek(0).map_err(|err| Error::corrupt(source.zone, err))?;
    let mut index = 0;
    while !stream.is_end() {
        let start = stream.position();
        let length = match stream.read_u32() {
            Ok(length) => length as usize,
            Err(err) => {
                diagnostics.record(&Error::corrupt(source.zone, err), Some(start as u64));
                stats.failed += 1;
                break;
            },
        };
        let end = start.saturating_add(length);
        if length < 4 || end > stream.len() {
            diagnostics.push(
                DiagnosticKind::ZoneCorrupt,
                Some(source.zone),
                Some(start as u64),
                format!("struct record {index} declares {length} bytes"),
            );
            stats.records += 1;
            stats.failed += 1;
            break;
        }
        let mut record = stream
            .sub_stream(start + 4, end)
            .map_err(|err| Error::corrupt(source.zone, err))?;
        stats.records += 1;
        stats.visited += 1;
        if !struct_record(source.zone, index, start + 4, &mut record, visitor, diagnostics) {
            stats.failed += 1;
        }
        stream.seek(end).map_err(|err| Error::corrupt(source.zone, err))?;
        index += 1;
    }
    Ok(stats)
}

/// One struct record: header, then fields. Returns `false` on any failure.
fn struct_record(
    zone: u32,
    index: usize,
    base: usize,
    record: &mut ByteStream,
    visitor: &mut impl StructVisitor,
    diagnostics: &mut Diagnostics,
) -> bool {
    let header_size = visitor.header_size(index);
    if header_size > record.len() {
        visitor_failure(
            diagnostics,
            zone,
            base,
            format!("record {index} shorter than its {header_size}-byte header"),
        );
        return false;
    }
    let mut ok = true;
    if header_size > 0 {
        let header = record.sub_stream(0, header_size);
        let accepted = match header {
            Ok(mut header) => visitor.visit_header(index, &mut header),
            Err(_) => false,
        };
        if !accepted {
            visitor_failure(diagnostics, zone, base, format!("record {index} header rejected"));
            ok = false;
        }
    }
    if record.seek(header_size).is_err() {
        return false;
    }

    let len = record.len();
    let fields = match field::read_fields(record, len) {
        Ok(fields) => fields,
        Err(err) => {
            visitor_failure(diagnostics, zone, base + record.position(), format!("record {index}: {err}"));
            return false;
        },
    };
    for field in &fields {
        if !visitor.visit_field(index, field) {
            ok = false;
            visitor_failure(
                diagnostics,
                zone,
                base,
                format!("record {index}: field {:#010x} rejected", field.type_code),
            );
        }
    }
    ok
}

fn visitor_failure(diagnostics: &mut Diagnostics, zone: u32, offset: usize, message: String) {
    diagnostics.push(DiagnosticKind::VisitorFailure, Some(zone), Some(offset as u64), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::Endian;
    use crate::ragtime5::field::builder;
    use bytes::Bytes;

    #[derive(Default)]
    struct Collect {
        records: Vec<(usize, Vec<u8>)>,
        reject: Option<usize>,
    }

    impl RecordVisitor for Collect {
        fn visit_record(&mut self, index: usize, record: &mut ByteStream) -> bool {
            let len = record.len();
            self.records.push((index, record.read_bytes(len).unwrap().to_vec()));
            self.reject != Some(index)
        }
    }

    #[derive(Default)]
    struct Fields {
        headers: Vec<(usize, u32)>,
        fields: Vec<(usize, Field)>,
    }

    impl StructVisitor for Fields {
        fn header_size(&self, index: usize) -> usize {
            if index == 0 { 4 } else { 0 }
        }

        fn visit_header(&mut self, index: usize, header: &mut ByteStream) -> bool {
            self.headers.push((index, header.read_u32().unwrap()));
            true
        }

        fn visit_field(&mut self, index: usize, field: &Field) -> bool {
            self.fields.push((index, field.clone()));
            field.type_code != 0xBAD
        }
    }

    fn stream(data: Vec<u8>) -> ByteStream {
        ByteStream::new(Bytes::from(data), Endian::Big)
    }

    fn offsets(values: &[i32]) -> ByteStream {
        stream(values.iter().flat_map(|v| v.to_be_bytes()).collect())
    }

    #[test]
    fn test_list_skips_empty_records() {
        let source = RecordSource::new(3, stream((0..10).collect())).with_offsets(offsets(&[0, 4, 4, 10]));
        let mut visitor = Collect::default();
        let mut diagnostics = Diagnostics::new();
        let stats = read_list(&source, &mut visitor, &mut diagnostics).unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.visited, 2);
        assert_eq!(visitor.records.len(), 2);
        assert_eq!(visitor.records[0], (0, vec![0, 1, 2, 3]));
        assert_eq!(visitor.records[1], (2, vec![4, 5, 6, 7, 8, 9]));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_list_skips_bad_offsets_and_continues() {
        let source = RecordSource::new(3, stream((0..10).collect())).with_offsets(offsets(&[0, 6, 2, 20, 8, 10]));
        let mut visitor = Collect::default();
        let mut diagnostics = Diagnostics::new();
        let stats = read_list(&source, &mut visitor, &mut diagnostics).unwrap();

        assert_eq!(stats.records, 5);
        assert_eq!(stats.failed, 3);
        let indices: Vec<usize> = visitor.records.iter().map(|r| r.0).collect();
        assert_eq!(indices, vec![0, 4]);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::ZoneCorrupt).count(), 3);
    }

    #[test]
    fn test_list_without_offsets_is_one_record() {
        let source = RecordSource::new(1, stream(vec![1, 2, 3]));
        let mut visitor = Collect::default();
        let stats = read_list(&source, &mut visitor, &mut Diagnostics::new()).unwrap();
        assert_eq!(stats.visited, 1);
        assert_eq!(visitor.records[0].1, vec![1, 2, 3]);
    }

    #[test]
    fn test_fixed_size() {
        let source = RecordSource::new(4, stream((0..7).collect()));
        let mut visitor = Collect {
            reject: Some(1),
            ..Collect::default()
        };
        let mut diagnostics = Diagnostics::new();
        let stats = read_fixed_size(&source, 2, 3, &mut visitor, &mut diagnostics).unwrap();
        assert_eq!(stats.visited, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(visitor.records[2], (2, vec![4, 5]));
        assert!(diagnostics.has(DiagnosticKind::VisitorFailure, 4));

        let mut visitor = Collect::default();
        let err = read_fixed_size(&source, 2, 4, &mut visitor, &mut diagnostics).unwrap_err();
        assert!(matches!(err, Error::ZoneCorrupt { zone: 4, .. }));
        assert!(visitor.records.is_empty());
    }

    #[test]
    fn test_sequential_struct_records() {
        let mut first = vec![0, 0, 0, 42];
        builder::long(&mut first, 0x10, 5);
        builder::unicode(&mut first, 0x11, "ab");
        let mut second = Vec::new();
        builder::double(&mut second, 0xBAD, 1.0);

        let mut data = Vec::new();
        for body in [&first, &second] {
            data.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
            data.extend_from_slice(body);
        }
        let source = RecordSource::new(9, stream(data));
        let mut visitor = Fields::default();
        let mut diagnostics = Diagnostics::new();
        let stats = read_struct(&source, &mut visitor, &mut diagnostics).unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(visitor.headers, vec![(0, 42)]);
        assert_eq!(visitor.fields.len(), 3);
        assert_eq!(visitor.fields[1].1.as_str(), Some("ab"));
        assert_eq!(visitor.fields[2].0, 1);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::VisitorFailure).count(), 1);
    }

    #[test]
    fn test_struct_record_with_bad_length_stops() {
        let mut data = Vec::new();
        data.extend_from_slice(&8u32.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&100u32.to_be_bytes());
        let source = RecordSource::new(9, stream(data));
        let mut visitor = Fields::default();
        let mut diagnostics = Diagnostics::new();
        let stats = read_struct(&source, &mut visitor, &mut diagnostics).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.visited, 1);
        assert!(diagnostics.has(DiagnosticKind::ZoneCorrupt, 9));
    }

    #[test]
    fn test_struct_with_offsets() {
        let mut data = vec![0, 0, 0, 7];
        builder::short(&mut data, 0x20, 3);
        let mut tail = Vec::new();
        builder::short(&mut tail, 0x21, 4);
        let split = data.len() as i32;
        data.extend_from_slice(&tail);
        let source = RecordSource::new(2, stream(data.clone())).with_offsets(offsets(&[0, split, data.len() as i32]));
        let mut visitor = Fields::default();
        let stats = read_struct(&source, &mut visitor, &mut Diagnostics::new()).unwrap();
        assert_eq!(stats.visited, 2);
        assert_eq!(visitor.headers, vec![(0, 7)]);
        assert_eq!(visitor.fields[0].1.as_long(), Some(3));
        assert_eq!(visitor.fields[1].0, 1);
        assert_eq!(visitor.fields[1].1.as_long(), Some(4));
    }
}

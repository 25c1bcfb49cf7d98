//! Formula tokens and the cell reference table.

use std::fmt;

use serde::Serialize;

use crate::common::binary::BinaryResult;
use crate::ragtime5::stream::ByteStream;

/// Cell coordinates, zero based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellPosition {
    pub col: u32,
    pub row: u32,
    pub absolute_col: bool,
    pub absolute_row: bool,
}

impl CellPosition {
    pub fn new(col: u32, row: u32) -> Self {
        Self {
            col,
            row,
            absolute_col: false,
            absolute_row: false,
        }
    }
}

/// Column letters for a zero-based column (`0` -> `A`, `26` -> `AA`).
pub fn column_name(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = u64::from(col) + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute_col {
            f.write_str("$")?;
        }
        f.write_str(&column_name(self.col))?;
        if self.absolute_row {
            f.write_str("$")?;
        }
        write!(f, "{}", u64::from(self.row) + 1)
    }
}

const REF_KIND_RANGE: u16 = 1;
const FLAG_ABS_COL: u32 = 0x1;
const FLAG_ABS_ROW: u32 = 0x2;
const FLAG_ABS_COL2: u32 = 0x4;
const FLAG_ABS_ROW2: u32 = 0x8;

/// Size of one entry in a cell reference table.
pub const CELL_REFERENCE_SIZE: usize = 16;

/// Entry of a formula cluster's cell reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellReference {
    /// Sheet index, 0 for the formula's own sheet
    pub sheet: u16,
    pub first: CellPosition,
    /// Bottom-right corner, for ranges
    pub last: Option<CellPosition>,
}

impl CellReference {
    /// Decode `kind:u16, sheet:u16, col:u16, row:u16, col2:u16, row2:u16,
    /// flags:u32`.
    pub fn read(stream: &mut ByteStream) -> BinaryResult<Self> {
        let kind = stream.read_u16()?;
        let sheet = stream.read_u16()?;
        let col = stream.read_u16()?;
        let row = stream.read_u16()?;
        let col2 = stream.read_u16()?;
        let row2 = stream.read_u16()?;
        let flags = stream.read_u32()?;
        let first = CellPosition {
            col: u32::from(col),
            row: u32::from(row),
            absolute_col: flags & FLAG_ABS_COL != 0,
            absolute_row: flags & FLAG_ABS_ROW != 0,
        };
        let last = (kind == REF_KIND_RANGE).then_some(CellPosition {
            col: u32::from(col2),
            row: u32::from(row2),
            absolute_col: flags & FLAG_ABS_COL2 != 0,
            absolute_row: flags & FLAG_ABS_ROW2 != 0,
        });
        Ok(Self { sheet, first, last })
    }

    /// Token for this reference.
    pub fn instruction(&self) -> FormulaInstruction {
        match self.last {
            Some(last) => FormulaInstruction::CellRange {
                sheet: self.sheet,
                top_left: self.first,
                bottom_right: last,
            },
            None => FormulaInstruction::Cell {
                sheet: self.sheet,
                position: self.first,
            },
        }
    }
}

/// One token of a reconstructed infix formula.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FormulaInstruction {
    Cell {
        sheet: u16,
        position: CellPosition,
    },
    CellRange {
        sheet: u16,
        top_left: CellPosition,
        bottom_right: CellPosition,
    },
    Double(f64),
    Long(i64),
    Text(String),
    Function(String),
    Operator(String),
}

impl FormulaInstruction {
    pub fn cell(col: u32, row: u32) -> Self {
        FormulaInstruction::Cell {
            sheet: 0,
            position: CellPosition::new(col, row),
        }
    }

    pub fn operator(symbol: &str) -> Self {
        FormulaInstruction::Operator(symbol.to_string())
    }

    pub fn is_operator(&self, symbol: &str) -> bool {
        matches!(self, FormulaInstruction::Operator(s) if s == symbol)
    }
}

fn write_sheet(f: &mut fmt::Formatter<'_>, sheet: u16) -> fmt::Result {
    if sheet != 0 {
        write!(f, "Sheet{sheet}!")?;
    }
    Ok(())
}

impl fmt::Display for FormulaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaInstruction::Cell { sheet, position } => {
                write_sheet(f, *sheet)?;
                write!(f, "{position}")
            },
            FormulaInstruction::CellRange {
                sheet,
                top_left,
                bottom_right,
            } => {
                write_sheet(f, *sheet)?;
                write!(f, "{top_left}:{bottom_right}")
            },
            FormulaInstruction::Double(v) => write!(f, "{v}"),
            FormulaInstruction::Long(v) => write!(f, "{v}"),
            FormulaInstruction::Text(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaInstruction::Function(name) => f.write_str(name),
            FormulaInstruction::Operator(op) => f.write_str(op),
        }
    }
}

/// Render a token list as formula text (without the leading `=`).
pub fn render(instructions: &[FormulaInstruction]) -> String {
    let mut out = String::new();
    for instruction in instructions {
        match instruction {
            FormulaInstruction::Operator(op) if op == "AND" || op == "OR" || op == "NOT" => {
                if !out.is_empty() && !out.ends_with(['(', ' ']) {
                    out.push(' ');
                }
                out.push_str(op);
                out.push(' ');
            },
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::Endian;
    use bytes::Bytes;

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_read_cell_reference() {
        let mut data = Vec::new();
        for v in [1u16, 2, 0, 0, 3, 9] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.extend_from_slice(&(FLAG_ABS_COL | FLAG_ABS_ROW2).to_be_bytes());
        let mut stream = ByteStream::new(Bytes::from(data), Endian::Big);
        let reference = CellReference::read(&mut stream).unwrap();
        assert_eq!(reference.sheet, 2);
        assert_eq!(reference.instruction().to_string(), "Sheet2!$A1:D$10");
    }

    #[test]
    fn test_render_tokens() {
        let tokens = vec![
            FormulaInstruction::Function("SUM".to_string()),
            FormulaInstruction::operator("("),
            FormulaInstruction::cell(0, 0),
            FormulaInstruction::operator(";"),
            FormulaInstruction::Text("a\"b".to_string()),
            FormulaInstruction::operator(")"),
            FormulaInstruction::operator("AND"),
            FormulaInstruction::Long(1),
        ];
        assert_eq!(render(&tokens), "SUM(A1;\"a\"\"b\") AND 1");
    }
}

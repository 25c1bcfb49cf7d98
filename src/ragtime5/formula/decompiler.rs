//! Formula bytecode decompiler.
//!
//! The bytecode is postfix: literals and references push operands, operators
//! and function calls pop them. Each operand remembers which combinator
//! produced it so that re-grouping can add the parentheses the bytecode
//! leaves implicit.

use crate::common::binary::{self, Endian};
use crate::ragtime5::formula::instruction::{CellReference, FormulaInstruction};
use crate::ragtime5::formula::opcode::{self, Arity, Operator};
use crate::ragtime5::{Error, Result};

/// Tables shared by every formula of one definition cluster.
#[derive(Debug, Clone, Copy)]
pub struct FormulaContext<'a> {
    pub function_names: &'a [String],
    pub cell_references: &'a [CellReference],
    pub endian: Endian,
}

impl<'a> FormulaContext<'a> {
    pub fn new(function_names: &'a [String], cell_references: &'a [CellReference], endian: Endian) -> Self {
        Self {
            function_names,
            cell_references,
            endian,
        }
    }

    fn function_name(&self, id: u16) -> String {
        match self.function_names.get(usize::from(id)) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                log::debug!("ragtime5: unknown formula function {id:#x}");
                format!("Funct{id:x}")
            },
        }
    }
}

/// Which combinator produced an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Constant,
    Function,
    Operator(u8),
    Unary(u8),
}

#[derive(Debug, Clone)]
struct Operand {
    tokens: Vec<FormulaInstruction>,
    tag: Combinator,
}

impl Operand {
    fn single(token: FormulaInstruction) -> Self {
        Self {
            tokens: vec![token],
            tag: Combinator::Constant,
        }
    }

    fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            tag: Combinator::Constant,
        }
    }

    fn priority(&self) -> u8 {
        match self.tag {
            Combinator::Constant | Combinator::Function => opcode::PRIORITY_ATOM,
            Combinator::Operator(op) | Combinator::Unary(op) => {
                opcode::operator(op).map_or(opcode::PRIORITY_ATOM, |o| o.priority)
            },
        }
    }

    fn append_to(self, out: &mut Vec<FormulaInstruction>, parenthesize: bool) {
        if parenthesize && !self.tokens.is_empty() {
            out.push(FormulaInstruction::operator("("));
            out.extend(self.tokens);
            out.push(FormulaInstruction::operator(")"));
        } else {
            out.extend(self.tokens);
        }
    }
}

/// Bytecode cursor bounded by the end of the code section.
struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl Cursor<'_> {
    fn fail(&self, reason: impl Into<String>) -> Error {
        Error::DecompileFailure {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        let value = binary::read_u8(self.code, self.pos).map_err(|e| self.fail(e.to_string()))?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16> {
        let value = binary::read_u16(self.code, self.pos, self.endian).map_err(|e| self.fail(e.to_string()))?;
        self.pos += 2;
        Ok(value)
    }

    fn i16(&mut self) -> Result<i16> {
        let value = binary::read_i16(self.code, self.pos, self.endian).map_err(|e| self.fail(e.to_string()))?;
        self.pos += 2;
        Ok(value)
    }

    fn f64(&mut self) -> Result<f64> {
        let value = binary::read_f64(self.code, self.pos, self.endian).map_err(|e| self.fail(e.to_string()))?;
        self.pos += 8;
        Ok(value)
    }
}

/// Split a formula record into `(code, side_buffer)`.
pub fn split_record(record: &[u8], endian: Endian) -> Result<(&[u8], &[u8])> {
    let fail = |reason: String| Error::DecompileFailure { offset: 0, reason };
    let code_len = usize::from(binary::read_u16(record, 0, endian).map_err(|e| fail(e.to_string()))?);
    let end = 2 + code_len;
    if end > record.len() {
        return Err(fail(format!("code length {code_len} exceeds record of {} bytes", record.len())));
    }
    Ok((&record[2..end], &record[end..]))
}

/// Decompile one formula record (`code_len:u16`, code, side buffer) into
/// infix tokens, without the leading `=`.
pub fn decompile(record: &[u8], context: &FormulaContext<'_>) -> Result<Vec<FormulaInstruction>> {
    let (code, side) = split_record(record, context.endian)?;
    decompile_code(code, side, context)
}

/// Decompile a bare code section against its side buffer.
pub fn decompile_code(code: &[u8], side: &[u8], context: &FormulaContext<'_>) -> Result<Vec<FormulaInstruction>> {
    let mut cursor = Cursor {
        code,
        pos: 0,
        endian: context.endian,
    };
    let mut stack: Vec<Operand> = Vec::new();
    let mut previous: Option<u8> = None;
    // an operand was pushed since the last separator
    let mut argument_started = false;

    while cursor.pos < code.len() {
        let start = cursor.pos;
        let op = cursor.u8()?;
        let mut pushed = true;
        match op {
            opcode::OP_SEPARATOR => {
                pushed = false;
                if previous == Some(opcode::OP_OPEN_OPTIONAL) {
                    log::trace!("ragtime5: dropping separator after optional bracket at {start}");
                } else if !argument_started {
                    stack.push(Operand::empty());
                }
                argument_started = false;
            },
            opcode::OP_OPTIONAL_ARG => stack.push(Operand::empty()),
            opcode::OP_OPEN_OPTIONAL => pushed = false,
            opcode::OP_DOUBLE_A | opcode::OP_DOUBLE_B | opcode::OP_DOUBLE_C => {
                stack.push(Operand::single(FormulaInstruction::Double(cursor.f64()?)));
            },
            opcode::OP_BYTE => stack.push(Operand::single(FormulaInstruction::Long(i64::from(cursor.u8()?)))),
            opcode::OP_SHORT => stack.push(Operand::single(FormulaInstruction::Long(i64::from(cursor.i16()?)))),
            opcode::OP_STRING_8 | opcode::OP_STRING_16 => {
                let text = read_string(&mut cursor, side, op == opcode::OP_STRING_16)?;
                stack.push(Operand::single(FormulaInstruction::Text(text)));
            },
            opcode::OP_REFERENCE_A | opcode::OP_REFERENCE_B | opcode::OP_REFERENCE_C => {
                let index = cursor.u16()?;
                let reference = context
                    .cell_references
                    .get(usize::from(index))
                    .ok_or_else(|| cursor.fail(format!("cell reference {index} out of table")))?;
                stack.push(Operand::single(reference.instruction()));
            },
            opcode::OP_FUNCTION => {
                let arity = usize::from(cursor.u8()?);
                let id = cursor.u16()?;
                call_function(&mut stack, arity, id, context, &cursor)?;
            },
            opcode::OP_FUNCTION_OFFSETS => {
                let arity = usize::from(cursor.u8()?);
                for _ in 0..arity {
                    let offset = usize::from(cursor.u16()?);
                    if offset > code.len() {
                        return Err(cursor.fail(format!("argument offset {offset} past code end")));
                    }
                }
                let id = cursor.u16()?;
                call_function(&mut stack, arity, id, context, &cursor)?;
            },
            opcode::OP_ACTION => {
                pushed = false;
                let first = read_string(&mut cursor, side, false)?;
                let second = read_string(&mut cursor, side, false)?;
                log::trace!("ragtime5: formula action {first:?} {second:?}");
            },
            op => {
                let Some(operator) = opcode::operator(op) else {
                    cursor.pos = start;
                    return Err(cursor.fail(format!("unknown opcode {op:#04x}")));
                };
                combine(&mut stack, op, operator, &cursor)?;
            },
        }
        if pushed {
            argument_started = true;
        }
        previous = Some(op);
    }

    if stack.len() != 1 {
        return Err(cursor.fail(format!("{} operands left at end", stack.len())));
    }
    let Some(result) = stack.pop() else {
        return Err(cursor.fail("empty stack"));
    };
    let mut tokens = result.tokens;
    match tokens.first() {
        Some(first) if first.is_operator("=") => {
            tokens.remove(0);
            Ok(tokens)
        },
        _ => Err(cursor.fail("formula does not start with an assignment")),
    }
}

fn read_string(cursor: &mut Cursor<'_>, side: &[u8], wide: bool) -> Result<String> {
    let offset = usize::from(cursor.u16()?);
    let len = usize::from(cursor.u16()?);
    let byte_len = if wide { len * 2 } else { len };
    let bytes = side
        .get(offset..offset + byte_len)
        .ok_or_else(|| cursor.fail(format!("string {offset}+{byte_len} outside side buffer")))?;
    Ok(if wide {
        binary::decode_ucs2(bytes, Endian::Big)
    } else {
        binary::decode_mac_roman(bytes)
    })
}

fn pop(stack: &mut Vec<Operand>, cursor: &Cursor<'_>) -> Result<Operand> {
    stack.pop().ok_or_else(|| cursor.fail("operand stack underflow"))
}

fn call_function(
    stack: &mut Vec<Operand>,
    arity: usize,
    id: u16,
    context: &FormulaContext<'_>,
    cursor: &Cursor<'_>,
) -> Result<()> {
    if stack.len() < arity {
        return Err(cursor.fail(format!("function {id:#x} needs {arity} arguments")));
    }
    let args = stack.split_off(stack.len() - arity);
    let mut tokens = vec![
        FormulaInstruction::Function(context.function_name(id)),
        FormulaInstruction::operator("("),
    ];
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            tokens.push(FormulaInstruction::operator(";"));
        }
        tokens.extend(arg.tokens);
    }
    tokens.push(FormulaInstruction::operator(")"));
    stack.push(Operand {
        tokens,
        tag: Combinator::Function,
    });
    Ok(())
}

fn combine(stack: &mut Vec<Operand>, op: u8, operator: &Operator, cursor: &Cursor<'_>) -> Result<()> {
    let mut tokens = Vec::new();
    let tag = match operator.arity {
        Arity::Unary => {
            let operand = pop(stack, cursor)?;
            let wrap = operand.priority() < operator.priority;
            tokens.push(FormulaInstruction::operator(operator.symbol));
            operand.append_to(&mut tokens, wrap);
            Combinator::Unary(op)
        },
        Arity::Binary => {
            let right = pop(stack, cursor)?;
            let left = pop(stack, cursor)?;
            let wrap_left = left.priority() < operator.priority;
            let right_priority = right.priority();
            let wrap_right = right_priority < operator.priority
                || (right_priority == operator.priority
                    && !(operator.associative && right.tag == Combinator::Operator(op)));
            left.append_to(&mut tokens, wrap_left);
            tokens.push(FormulaInstruction::operator(operator.symbol));
            right.append_to(&mut tokens, wrap_right);
            Combinator::Operator(op)
        },
    };
    stack.push(Operand { tokens, tag });
    Ok(())
}

#[cfg(test)]
pub(crate) mod builder {
    //! Bytecode assembler for tests (big-endian operands).

    #[derive(Default)]
    pub struct Code {
        pub code: Vec<u8>,
        pub side: Vec<u8>,
    }

    impl Code {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn op(mut self, op: u8) -> Self {
            self.code.push(op);
            self
        }

        pub fn double(mut self, value: f64) -> Self {
            self.code.push(0x25);
            self.code.extend_from_slice(&value.to_be_bytes());
            self
        }

        pub fn short(mut self, value: i16) -> Self {
            self.code.push(0x2c);
            self.code.extend_from_slice(&value.to_be_bytes());
            self
        }

        pub fn reference(mut self, index: u16) -> Self {
            self.code.push(0x30);
            self.code.extend_from_slice(&index.to_be_bytes());
            self
        }

        pub fn text(mut self, value: &str) -> Self {
            let offset = self.side.len() as u16;
            self.side.extend_from_slice(value.as_bytes());
            self.code.push(0x2e);
            self.code.extend_from_slice(&offset.to_be_bytes());
            self.code.extend_from_slice(&(value.len() as u16).to_be_bytes());
            self
        }

        pub fn function(mut self, arity: u8, id: u16) -> Self {
            self.code.push(0x34);
            self.code.push(arity);
            self.code.extend_from_slice(&id.to_be_bytes());
            self
        }

        pub fn function_with_offsets(mut self, offsets: &[u16], id: u16) -> Self {
            self.code.push(0x35);
            self.code.push(offsets.len() as u8);
            for offset in offsets {
                self.code.extend_from_slice(&offset.to_be_bytes());
            }
            self.code.extend_from_slice(&id.to_be_bytes());
            self
        }

        /// Full record: `code_len`, code, side buffer.
        pub fn record(&self) -> Vec<u8> {
            let mut out = (self.code.len() as u16).to_be_bytes().to_vec();
            out.extend_from_slice(&self.code);
            out.extend_from_slice(&self.side);
            out
        }
    }
}

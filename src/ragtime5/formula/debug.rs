//! Flat listing of formula bytecode, for diagnostics only.
//!
//! Opcodes are named through the coarse family table in
//! [`opcode::DEBUG_NAMES`]; operands are shown as raw hex. Nothing here
//! feeds the decompiled token list.

use std::fmt::Write;

use crate::ragtime5::formula::opcode;

/// Render `code` as `family(op)[operand bytes]` entries separated by
/// spaces. Stops at the first opcode it cannot size.
pub fn render_debug(code: &[u8]) -> String {
    let mut out = String::new();
    let mut pos = 0;
    while pos < code.len() {
        let op = code[pos];
        pos += 1;
        if !out.is_empty() {
            out.push(' ');
        }
        let name = opcode::debug_name(op).unwrap_or("?");
        let _ = write!(out, "{name}({op:02x})");
        let Some(len) = opcode::operand_len(op, code, pos) else {
            out.push('!');
            break;
        };
        let Some(operand) = code.get(pos..pos + len) else {
            out.push_str("[truncated]");
            break;
        };
        if !operand.is_empty() {
            out.push('[');
            for byte in operand {
                let _ = write!(out, "{byte:02x}");
            }
            out.push(']');
        }
        pos += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_debug_listing() {
        let code = [0x30, 0x00, 0x01, 0x2b, 0x07, 0x01, 0x00];
        assert_eq!(render_debug(&code), "ref(30)[0001] num(2b)[07] arith(01) arith(00)");
    }

    #[test]
    fn test_render_debug_stops_on_unknown() {
        assert_eq!(render_debug(&[0x01, 0xd0, 0x01]), "arith(01) ?(d0)!");
        assert_eq!(render_debug(&[0x25, 0x00]), "num(25)[truncated]");
        assert_eq!(render_debug(&[]), "");
    }
}

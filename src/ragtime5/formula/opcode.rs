//! Formula bytecode tables.

pub const OP_ASSIGN: u8 = 0x00;
pub const OP_OPTIONAL_ARG: u8 = 0x12;
pub const OP_SEPARATOR: u8 = 0x13;
pub const OP_DOUBLE_A: u8 = 0x25;
pub const OP_DOUBLE_B: u8 = 0x26;
pub const OP_DOUBLE_C: u8 = 0x29;
pub const OP_BYTE: u8 = 0x2b;
pub const OP_SHORT: u8 = 0x2c;
pub const OP_STRING_8: u8 = 0x2e;
pub const OP_STRING_16: u8 = 0x2f;
pub const OP_REFERENCE_A: u8 = 0x30;
pub const OP_OPEN_OPTIONAL: u8 = 0x33;
pub const OP_FUNCTION: u8 = 0x34;
pub const OP_FUNCTION_OFFSETS: u8 = 0x35;
pub const OP_REFERENCE_B: u8 = 0x37;
pub const OP_ACTION: u8 = 0x39;
pub const OP_REFERENCE_C: u8 = 0x3a;

/// Assignment priority; the lowest of all.
pub const PRIORITY_ASSIGN: u8 = 0;
/// Priority of unary `+` and `-`.
pub const PRIORITY_UNARY: u8 = 9;
/// Priority of anything that never needs parentheses.
pub const PRIORITY_ATOM: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
}

/// One built-in operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub symbol: &'static str,
    pub arity: Arity,
    pub priority: u8,
    /// `a op (b op c)` may drop its parentheses
    pub associative: bool,
}

const fn binary(symbol: &'static str, priority: u8, associative: bool) -> Option<Operator> {
    Some(Operator {
        symbol,
        arity: Arity::Binary,
        priority,
        associative,
    })
}

const fn unary(symbol: &'static str, priority: u8) -> Option<Operator> {
    Some(Operator {
        symbol,
        arity: Arity::Unary,
        priority,
        associative: false,
    })
}

/// Operators `0x00..=0x11`; `0x12` and `0x13` are handled by the decompiler.
static OPERATORS: [Option<Operator>; 0x12] = [
    unary("=", PRIORITY_ASSIGN),
    binary("+", 6, true),
    binary("-", 6, false),
    binary("*", 7, true),
    binary("/", 7, false),
    binary("^", 8, false),
    unary("+", PRIORITY_UNARY),
    unary("-", PRIORITY_UNARY),
    binary("=", 4, false),
    binary("<>", 4, false),
    binary("<", 4, false),
    binary("<=", 4, false),
    binary(">", 4, false),
    binary(">=", 4, false),
    binary("&", 5, true),
    binary("AND", 2, true),
    binary("OR", 1, true),
    unary("NOT", 3),
];

pub fn operator(op: u8) -> Option<&'static Operator> {
    OPERATORS.get(usize::from(op)).and_then(Option::as_ref)
}

/// Operand bytes following `op` in `code`, where `pos` is just past the
/// opcode. `None` for opcodes outside the table.
pub fn operand_len(op: u8, code: &[u8], pos: usize) -> Option<usize> {
    match op {
        0x00..=0x13 | OP_OPEN_OPTIONAL => Some(0),
        OP_DOUBLE_A | OP_DOUBLE_B | OP_DOUBLE_C => Some(8),
        OP_BYTE => Some(1),
        OP_SHORT => Some(2),
        OP_STRING_8 | OP_STRING_16 => Some(4),
        OP_REFERENCE_A | OP_REFERENCE_B | OP_REFERENCE_C => Some(2),
        OP_FUNCTION => Some(3),
        OP_FUNCTION_OFFSETS => {
            let arity = usize::from(*code.get(pos)?);
            Some(1 + 2 * arity + 2)
        },
        OP_ACTION => Some(8),
        _ => None,
    }
}

/// Coarse opcode families for the debug listing, one per group of four
/// opcodes from `0x00` to `0xc0`.
pub static DEBUG_NAMES: [&str; 49] = [
    "arith", "arith", "compare", "concat", "logic", "ext14", "ext18", "ext1C",
    "ext20", "num", "num", "literal", "ref", "fn", "ref", "ext3C",
    "ext40", "ext44", "ext48", "ext4C", "ext50", "ext54", "ext58", "ext5C",
    "ext60", "ext64", "ext68", "ext6C", "ext70", "ext74", "ext78", "ext7C",
    "ext80", "ext84", "ext88", "ext8C", "ext90", "ext94", "ext98", "ext9C",
    "extA0", "extA4", "extA8", "extAC", "extB0", "extB4", "extB8", "extBC",
    "extC0",
];

/// Debug family name of an opcode.
pub fn debug_name(op: u8) -> Option<&'static str> {
    DEBUG_NAMES.get(usize::from(op >> 2)).copied()
}

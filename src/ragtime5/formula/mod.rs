//! Spreadsheet formula support.
//!
//! Formula definition clusters store each formula as postfix bytecode plus
//! a side buffer of string literals. [`decompile`] rebuilds the infix token
//! list; [`render_debug`] produces a flat listing used in diagnostics.

pub mod debug;
pub mod decompiler;
pub mod instruction;
pub mod opcode;

pub use debug::render_debug;
pub use decompiler::{FormulaContext, decompile, decompile_code, split_record};
pub use instruction::{CellPosition, CellReference, FormulaInstruction, column_name, render};

//! CIL instruction editing.
//!
//! Method bodies are decoded into an [`InstructionStream`], an arena of [`Instruction`]s in
//! which branch targets and exception clause boundaries are instruction indices. Edits are
//! explicit insertions that renumber those indices; encoding recomputes byte offsets and widens
//! short branches as needed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mlg::assembly::{op, Instruction, InstructionStream};
//! use mlg::metadata::method::MethodBody;
//!
//! let body = MethodBody::read(&[0x0A, 0x00, 0x2A])?;
//! let mut stream = InstructionStream::from_body(&body)?;
//! stream.insert_after(0, vec![Instruction::simple(op::NOP)])?;
//! let rewritten = stream.to_body(&body, body.max_stack)?;
//! assert_eq!(rewritten.code, [0x00, 0x00, 0x2A]);
//! # Ok::<(), mlg::Error>(())
//! ```

mod decoder;
mod instruction;
mod opcodes;
mod stream;

pub use decoder::decode;
pub use instruction::{Instruction, Operand};
pub use opcodes::{is_call, op, opcode_size, operand_kind, widen_branch, OperandKind};
pub use stream::{Clause, InstructionStream};

use crate::{
    assembly::opcodes::{op, opcode_size, operand_kind, OperandKind},
    metadata::token::Token,
    Result,
};

/// Decoded operand of an [`Instruction`].
///
/// Branch and switch operands address instructions by their index in the owning
/// [`crate::assembly::InstructionStream`], never by byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// `int8`
    Int8(i8),
    /// `unsigned int8`
    UInt8(u8),
    /// `unsigned int16`
    UInt16(u16),
    /// `int32`
    Int32(i32),
    /// `int64`
    Int64(i64),
    /// `float32`, as raw bits
    Float32(u32),
    /// `float64`, as raw bits
    Float64(u64),
    /// A metadata token
    Token(Token),
    /// Index of the branch target
    Target(usize),
    /// Indices of the jump table targets
    Switch(Vec<usize>),
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode, `0xFE00 | b` for two byte opcodes
    pub opcode: u16,
    /// Operand
    pub operand: Operand,
}

impl Instruction {
    /// An instruction without operand.
    #[must_use]
    pub fn simple(opcode: u16) -> Instruction {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// An instruction with a token operand, such as `call` or `ldtoken`.
    #[must_use]
    pub fn with_token(opcode: u16, token: Token) -> Instruction {
        Instruction {
            opcode,
            operand: Operand::Token(token),
        }
    }

    /// The shortest `ldarg` form loading argument `index`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn ldarg(index: u16) -> Instruction {
        match index {
            0..=3 => Instruction::simple(op::LDARG_0 + index),
            4..=255 => Instruction {
                opcode: op::LDARG_S,
                operand: Operand::UInt8(index as u8),
            },
            _ => Instruction {
                opcode: op::LDARG,
                operand: Operand::UInt16(index),
            },
        }
    }

    /// Token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match &self.operand {
            Operand::None => 0,
            Operand::Int8(_) | Operand::UInt8(_) => 1,
            Operand::UInt16(_) => 2,
            Operand::Int32(_) | Operand::Float32(_) | Operand::Token(_) => 4,
            Operand::Int64(_) | Operand::Float64(_) => 8,
            Operand::Target(_) => {
                if matches!(operand_kind(self.opcode), Ok(OperandKind::ShortBranch)) {
                    1
                } else {
                    4
                }
            }
            Operand::Switch(targets) => 4 + 4 * targets.len(),
        };

        opcode_size(self.opcode) + operand
    }

    /// Returns `true` if the instruction is `ret`.
    #[must_use]
    pub fn is_ret(&self) -> bool {
        self.opcode == op::RET
    }

    /// Check that the operand shape matches the opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on a mismatch or an unassigned opcode.
    pub fn validate(&self) -> Result<()> {
        let matches = matches!(
            (operand_kind(self.opcode)?, &self.operand),
            (OperandKind::None, Operand::None)
                | (OperandKind::Int8, Operand::Int8(_))
                | (OperandKind::UInt8, Operand::UInt8(_))
                | (OperandKind::UInt16, Operand::UInt16(_))
                | (OperandKind::Int32, Operand::Int32(_))
                | (OperandKind::Int64, Operand::Int64(_))
                | (OperandKind::Float32, Operand::Float32(_))
                | (OperandKind::Float64, Operand::Float64(_))
                | (OperandKind::Token, Operand::Token(_))
                | (OperandKind::ShortBranch | OperandKind::Branch, Operand::Target(_))
                | (OperandKind::Switch, Operand::Switch(_))
        );

        if matches {
            Ok(())
        } else {
            Err(malformed_error!(
                "Operand {:?} does not match opcode {:#06x}",
                self.operand,
                self.opcode
            ))
        }
    }
}

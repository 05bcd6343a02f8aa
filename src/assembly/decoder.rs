//! Decoding of raw IL into an index-addressed [`InstructionStream`].
//!
//! Decoding runs in two passes: the first reads every instruction and records branch targets
//! as byte offsets, the second maps those offsets (and the exception clause boundaries) to
//! instruction indices. A target that does not fall on an instruction boundary is rejected.

use std::collections::HashMap;

use crate::{
    assembly::{
        opcodes::{op, operand_kind, OperandKind},
        Clause, Instruction, InstructionStream, Operand,
    },
    file::parser::Parser,
    metadata::{method::ExceptionHandler, token::Token},
    Result,
};

/// Operand before branch targets are resolved.
enum RawOperand {
    Resolved(Operand),
    Target(i64),
    Switch(Vec<i64>),
}

/// Decode the instruction at the parser's position into its opcode and raw operand.
#[allow(clippy::cast_possible_wrap)]
fn decode_one(parser: &mut Parser) -> Result<(u16, RawOperand)> {
    let first = parser.read_le::<u8>()?;
    let opcode = if u16::from(first) == op::PREFIX {
        0xFE00 | u16::from(parser.read_le::<u8>()?)
    } else {
        u16::from(first)
    };

    let operand = match operand_kind(opcode)? {
        OperandKind::None => RawOperand::Resolved(Operand::None),
        OperandKind::Int8 => RawOperand::Resolved(Operand::Int8(parser.read_le::<i8>()?)),
        OperandKind::UInt8 => RawOperand::Resolved(Operand::UInt8(parser.read_le::<u8>()?)),
        OperandKind::UInt16 => RawOperand::Resolved(Operand::UInt16(parser.read_le::<u16>()?)),
        OperandKind::Int32 => RawOperand::Resolved(Operand::Int32(parser.read_le::<i32>()?)),
        OperandKind::Int64 => RawOperand::Resolved(Operand::Int64(parser.read_le::<i64>()?)),
        OperandKind::Float32 => RawOperand::Resolved(Operand::Float32(parser.read_le::<u32>()?)),
        OperandKind::Float64 => RawOperand::Resolved(Operand::Float64(parser.read_le::<u64>()?)),
        OperandKind::Token => {
            RawOperand::Resolved(Operand::Token(Token::new(parser.read_le::<u32>()?)))
        }
        OperandKind::ShortBranch => {
            let displacement = i64::from(parser.read_le::<i8>()?);
            RawOperand::Target(parser.pos() as i64 + displacement)
        }
        OperandKind::Branch => {
            let displacement = i64::from(parser.read_le::<i32>()?);
            RawOperand::Target(parser.pos() as i64 + displacement)
        }
        OperandKind::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            let mut displacements = Vec::with_capacity(count.min(parser.remaining() / 4));
            for _ in 0..count {
                displacements.push(i64::from(parser.read_le::<i32>()?));
            }
            let next = parser.pos() as i64;
            RawOperand::Switch(displacements.into_iter().map(|d| next + d).collect())
        }
    };

    Ok((opcode, operand))
}

/// Decode `code` and its exception clauses into an [`InstructionStream`].
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid opcodes, truncated operands, or branch
/// targets and clause boundaries that do not fall on an instruction boundary.
#[allow(clippy::cast_possible_wrap)]
pub fn decode(code: &[u8], handlers: &[ExceptionHandler]) -> Result<InstructionStream> {
    let mut parser = Parser::new(code);
    let mut raw = Vec::new();
    let mut index_of = HashMap::new();

    while parser.has_more_data() {
        index_of.insert(parser.pos() as i64, raw.len());
        raw.push(decode_one(&mut parser)?);
    }
    // One past the last instruction, used by exclusive clause ends
    index_of.insert(code.len() as i64, raw.len());

    let resolve = |offset: i64| -> Result<usize> {
        index_of
            .get(&offset)
            .copied()
            .ok_or_else(|| malformed_error!("Offset {} is not an instruction boundary", offset))
    };

    let mut instructions = Vec::with_capacity(raw.len());
    for (opcode, operand) in raw {
        let operand = match operand {
            RawOperand::Resolved(operand) => operand,
            RawOperand::Target(offset) => Operand::Target(resolve(offset)?),
            RawOperand::Switch(offsets) => Operand::Switch(
                offsets
                    .into_iter()
                    .map(&resolve)
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        instructions.push(Instruction { opcode, operand });
    }

    let mut clauses = Vec::with_capacity(handlers.len());
    for handler in handlers {
        let try_start = i64::from(handler.try_offset);
        let handler_start = i64::from(handler.handler_offset);
        clauses.push(Clause {
            flags: handler.flags,
            try_start: resolve(try_start)?,
            try_end: resolve(try_start + i64::from(handler.try_length))?,
            handler_start: resolve(handler_start)?,
            handler_end: resolve(handler_start + i64::from(handler.handler_length))?,
            class_token: if handler.is_filter() {
                0
            } else {
                handler.class_token_or_filter
            },
            filter_start: if handler.is_filter() {
                Some(resolve(i64::from(handler.class_token_or_filter))?)
            } else {
                None
            },
        });
    }

    Ok(InstructionStream::new(instructions, clauses))
}

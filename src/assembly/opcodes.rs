//! CIL opcode values and operand encodings (ECMA-335 III).
//!
//! Two byte opcodes are represented as `0xFE00 | second_byte`.

use crate::Result;

#[allow(missing_docs)]
pub mod op {
    pub const NOP: u16 = 0x00;
    pub const LDARG_0: u16 = 0x02;
    pub const LDARG_1: u16 = 0x03;
    pub const LDARG_2: u16 = 0x04;
    pub const LDARG_3: u16 = 0x05;
    pub const LDARG_S: u16 = 0x0E;
    pub const LDNULL: u16 = 0x14;
    pub const LDC_I4_0: u16 = 0x16;
    pub const LDC_I4_1: u16 = 0x17;
    pub const LDC_I4_S: u16 = 0x1F;
    pub const POP: u16 = 0x26;
    pub const CALL: u16 = 0x28;
    pub const RET: u16 = 0x2A;
    pub const BR_S: u16 = 0x2B;
    pub const BRFALSE_S: u16 = 0x2C;
    pub const BRTRUE_S: u16 = 0x2D;
    pub const BLT_UN_S: u16 = 0x37;
    pub const BR: u16 = 0x38;
    pub const BRFALSE: u16 = 0x39;
    pub const BRTRUE: u16 = 0x3A;
    pub const SWITCH: u16 = 0x45;
    pub const CALLVIRT: u16 = 0x6F;
    pub const LDSTR: u16 = 0x72;
    pub const NEWOBJ: u16 = 0x73;
    pub const THROW: u16 = 0x7A;
    pub const LDTOKEN: u16 = 0xD0;
    pub const ENDFINALLY: u16 = 0xDC;
    pub const LEAVE: u16 = 0xDD;
    pub const LEAVE_S: u16 = 0xDE;
    pub const PREFIX: u16 = 0xFE;
    pub const LDARG: u16 = 0xFE09;
}

/// Encoding of the operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// `int8`
    Int8,
    /// `unsigned int8`, also short variable indices
    UInt8,
    /// `unsigned int16` variable indices
    UInt16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
    /// A metadata token
    Token,
    /// `int8` branch displacement
    ShortBranch,
    /// `int32` branch displacement
    Branch,
    /// Jump table
    Switch,
}

/// Operand encoding of `opcode`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unassigned opcodes.
pub fn operand_kind(opcode: u16) -> Result<OperandKind> {
    use OperandKind::{
        Branch, Float32, Float64, Int32, Int64, Int8, None, ShortBranch, Switch, Token, UInt16,
        UInt8,
    };

    let kind = match opcode {
        0x00..=0x0D | 0x14..=0x1E | 0x25 | 0x26 | 0x2A => None,
        0x0E..=0x13 => UInt8,
        0x1F => Int8,
        0x20 => Int32,
        0x21 => Int64,
        0x22 => Float32,
        0x23 => Float64,
        0x27..=0x29 => Token,
        0x2B..=0x37 | 0xDE => ShortBranch,
        0x38..=0x44 | 0xDD => Branch,
        0x45 => Switch,
        0x46..=0x6E | 0x76 | 0x7A | 0x82..=0x8B | 0x8E | 0x90..=0xA2 | 0xB3..=0xBA | 0xC3 => None,
        0xD1..=0xDC | 0xDF | 0xE0 => None,
        0x6F..=0x75 | 0x79 | 0x7B..=0x81 | 0x8C | 0x8D | 0x8F | 0xA3..=0xA5 => Token,
        0xC2 | 0xC6 | 0xD0 => Token,
        0xFE00..=0xFE05 | 0xFE0F | 0xFE11 | 0xFE13 | 0xFE14 | 0xFE17 | 0xFE18 | 0xFE1A
        | 0xFE1D | 0xFE1E => None,
        0xFE06 | 0xFE07 | 0xFE15 | 0xFE16 | 0xFE1C => Token,
        0xFE09..=0xFE0E => UInt16,
        0xFE12 | 0xFE19 => UInt8,
        _ => return Err(malformed_error!("Invalid opcode - {:#06x}", opcode)),
    };

    Ok(kind)
}

/// Size in bytes of the opcode itself.
#[must_use]
pub fn opcode_size(opcode: u16) -> usize {
    if opcode >> 8 == op::PREFIX {
        2
    } else {
        1
    }
}

/// The long form of a short branch opcode, or `None` if `opcode` is not a short branch.
#[must_use]
pub fn widen_branch(opcode: u16) -> Option<u16> {
    match opcode {
        op::BR_S..=op::BLT_UN_S => Some(opcode + (op::BR - op::BR_S)),
        op::LEAVE_S => Some(op::LEAVE),
        _ => None,
    }
}

/// Returns `true` for `call` and `callvirt`.
#[must_use]
pub fn is_call(opcode: u16) -> bool {
    opcode == op::CALL || opcode == op::CALLVIRT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(operand_kind(op::NOP).unwrap(), OperandKind::None);
        assert_eq!(operand_kind(op::LDARG_S).unwrap(), OperandKind::UInt8);
        assert_eq!(operand_kind(op::CALL).unwrap(), OperandKind::Token);
        assert_eq!(operand_kind(op::CALLVIRT).unwrap(), OperandKind::Token);
        assert_eq!(operand_kind(op::LDTOKEN).unwrap(), OperandKind::Token);
        assert_eq!(operand_kind(op::LEAVE_S).unwrap(), OperandKind::ShortBranch);
        assert_eq!(operand_kind(op::SWITCH).unwrap(), OperandKind::Switch);
        assert_eq!(operand_kind(op::LDARG).unwrap(), OperandKind::UInt16);
        assert_eq!(operand_kind(0xFE16).unwrap(), OperandKind::Token);
        assert!(operand_kind(0x24).is_err());
        assert!(operand_kind(0xA6).is_err());
        assert!(operand_kind(0xFE08).is_err());
    }

    #[test]
    fn widening() {
        assert_eq!(widen_branch(op::BR_S), Some(op::BR));
        assert_eq!(widen_branch(op::BRTRUE_S), Some(op::BRTRUE));
        assert_eq!(widen_branch(op::BLT_UN_S), Some(0x44));
        assert_eq!(widen_branch(op::LEAVE_S), Some(op::LEAVE));
        assert_eq!(widen_branch(op::BR), None);
        assert_eq!(opcode_size(op::LDARG), 2);
        assert_eq!(opcode_size(op::RET), 1);
    }
}

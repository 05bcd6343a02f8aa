//! Metadata tokens.
//!
//! A token is a 32-bit value whose high byte names a metadata table and whose low 24 bits hold
//! a 1-based row index. Instruction operands such as the targets of `call` or `ldtoken` are
//! tokens, with `0x70` (user strings) as the only non-table high byte.

use std::fmt;

use crate::metadata::tables::TableId;

/// A metadata token (ECMA-335 II.22 / III.1.9).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Create a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a table byte and row index.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Create a token referring to `row` of `table`.
    #[must_use]
    pub fn for_row(table: TableId, row: u32) -> Self {
        Self::from_parts(table as u8, row)
    }

    /// The raw 32-bit value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table this token refers to, if the table byte is a known metadata table.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_u8(self.table())
    }

    /// The 1-based row index.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` if the row part is zero.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::from_parts(0x0A, 0x17);
        assert_eq!(token.value(), 0x0A00_0017);
        assert_eq!(token.table(), 0x0A);
        assert_eq!(token.table_id(), Some(TableId::MemberRef));
        assert_eq!(token.row(), 0x17);

        assert_eq!(Token::for_row(TableId::MethodDef, 1), Token(0x0600_0001));
    }

    #[test]
    fn null_and_strings() {
        assert!(Token(0x0100_0000).is_null());
        assert!(!Token(0x7000_0001).is_null());
        assert_eq!(Token(0x7000_0001).table_id(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Token(0x0200_0003).to_string(), "0x02000003");
        assert_eq!(
            format!("{:?}", Token(0x0200_0003)),
            "Token(0x02000003, table: 0x02, row: 3)"
        );
    }
}

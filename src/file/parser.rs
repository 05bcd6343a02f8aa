//! Cursor-based reader for metadata heaps, signatures and method bodies.
//!
//! [`Parser`] wraps a byte slice and a position. All reads are bounds checked and advance the
//! cursor; failures leave the cursor where it was.

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::token::Token,
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over a byte slice.
///
/// # Examples
///
/// ```rust,no_run
/// use mlg::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x81, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u32>()?, 0x0403_0201);
/// assert_eq!(parser.read_compressed_uint()?, 0x100);
/// assert!(!parser.has_more_data());
/// # Ok::<(), mlg::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is beyond the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the skip would exceed the buffer.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.calc_end_position(step)?;
        self.position = end;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// The complete underlying buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the buffer.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Advance the cursor to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position is beyond the buffer.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read would exceed the buffer.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a compressed unsigned integer as defined in ECMA-335 II.23.2.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] for an invalid leading byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let start = self.position;
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let Ok(second_byte) = self.read_le::<u8>() else {
                self.position = start;
                return Err(OutOfBounds);
            };
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let Ok(rest) = self.read_bytes(3) else {
                self.position = start;
                return Err(OutOfBounds);
            };
            return Ok(((u32::from(first_byte) & 0x1F) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2]));
        }

        self.position = start;
        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a `TypeDefOrRefOrSpecEncoded` value (ECMA-335 II.23.2.8) as a [`Token`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid table tag.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let value = self.read_compressed_uint()?;
        let table = match value & 0x3 {
            0 => 0x02,
            1 => 0x01,
            2 => 0x1B,
            _ => return Err(malformed_error!("Invalid compressed token tag - {}", value)),
        };

        Ok(Token::from_parts(table, value >> 2))
    }

    /// Read a null-terminated UTF-8 string and consume the terminator.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if no terminator exists or
    /// [`crate::Error::Malformed`] for invalid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let rest = &self.data[self.position..];
        let Some(len) = rest.iter().position(|b| *b == 0) else {
            return Err(OutOfBounds);
        };

        let value = std::str::from_utf8(&rest[..len])
            .map_err(|_| malformed_error!("Invalid UTF-8 string at {}", self.position))?
            .to_string();
        self.position += len + 1;
        Ok(value)
    }

    /// Read a custom attribute `SerString` (ECMA-335 II.23.3).
    ///
    /// Returns `None` for the null string marker `0xFF`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data or
    /// [`crate::Error::Malformed`] for invalid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.position += 1;
            return Ok(None);
        }

        let start = self.position;
        let length = self.read_compressed_uint()? as usize;
        let Ok(bytes) = self.read_bytes(length) else {
            self.position = start;
            return Err(OutOfBounds);
        };

        match std::str::from_utf8(bytes) {
            Ok(value) => Ok(Some(value.to_string())),
            Err(_) => Err(malformed_error!("Invalid UTF-8 SerString at {}", start)),
        }
    }

    /// Compute the absolute end position for a read of `length` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the end lies beyond the buffer.
    pub fn calc_end_position(&self, length: usize) -> Result<usize> {
        match self.position.checked_add(length) {
            Some(end) if end <= self.data.len() => Ok(end),
            _ => Err(OutOfBounds),
        }
    }

    /// Read `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read would exceed the buffer.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }
}

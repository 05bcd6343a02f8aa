use crate::{file::parser::Parser, Result};

/// A metadata stream header (ECMA-335 II.24.2.2).
///
/// Each header names a stream and gives its offset and size relative to the metadata root.
/// Names are null terminated and padded to a 4 byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream from the start of the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name, such as `#~` or `#Strings`
    pub name: String,
}

impl StreamHeader {
    /// Read a header at the parser's position and leave the cursor on the next one.
    ///
    /// # Errors
    /// Returns an error if the header is truncated or its name is not terminated within
    /// 32 bytes.
    pub fn read(parser: &mut Parser) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let start = parser.pos();
        let name = parser.read_string_utf8()?;
        if parser.pos() - start > 32 {
            return Err(malformed_error!("Stream name too long - {}", name));
        }
        parser.align(4)?;

        Ok(StreamHeader { offset, size, name })
    }

    /// Append this header's encoded form to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    /// Encoded size of this header in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + (self.name.len() + 1).div_ceil(4) * 4
    }
}

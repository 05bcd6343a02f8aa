//! The metadata root (ECMA-335 II.24.2.1).
//!
//! The root sits at the start of the metadata block referenced by the CLI header. It starts
//! with the `BSJB` signature, carries a runtime version string and lists the streams that
//! follow it.

use crate::{
    file::parser::Parser,
    metadata::streams::StreamHeader,
    Result,
};

/// Signature of the metadata root, `BSJB` in little-endian.
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Parsed metadata root header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Major version, 1 for all current runtimes
    pub major_version: u16,
    /// Minor version, 1 for all current runtimes
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Padded length of the version string as stored
    pub version_length: u32,
    /// Runtime version string, such as `v4.0.30319`
    pub version: String,
    /// Reserved flags, always 0
    pub flags: u16,
    /// Stream headers in on-disk order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the root at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong signature or streams that lie outside
    /// `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);

        let signature = parser.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!("Invalid metadata signature - {:#x}", signature));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        let reserved = parser.read_le::<u32>()?;
        let version_length = parser.read_le::<u32>()?;
        if version_length > 255 {
            return Err(malformed_error!("Version string too long - {}", version_length));
        }

        let version_bytes = parser.read_bytes(version_length as usize)?;
        let end = version_bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8_lossy(&version_bytes[..end]).into_owned();

        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut parser)?;
            let in_bounds = u64::from(header.offset) + u64::from(header.size) <= data.len() as u64;
            if !in_bounds {
                return Err(malformed_error!(
                    "Stream {} exceeds metadata - {} + {}",
                    header.name,
                    header.offset,
                    header.size
                ));
            }
            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            reserved,
            version_length,
            version,
            flags,
            stream_headers,
        })
    }

    /// Length of the version string field when written, a multiple of 4 that fits the
    /// version and its terminator.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn padded_version_length(&self) -> u32 {
        let needed = (self.version.len() + 1).div_ceil(4) * 4;
        self.version_length.max(needed as u32)
    }

    /// Size of the root including all stream headers.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        20 + self.padded_version_length() as usize
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::encoded_len)
                .sum::<usize>()
    }

    /// Append the encoded root to `out`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&CIL_HEADER_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.major_version.to_le_bytes());
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());

        let length = self.padded_version_length();
        out.extend_from_slice(&length.to_le_bytes());
        let start = out.len();
        out.extend_from_slice(self.version.as_bytes());
        out.resize(start + length as usize, 0);

        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&(self.stream_headers.len() as u16).to_le_bytes());
        for header in &self.stream_headers {
            header.write(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const ROOT: [u8; 44] = [
        0x42, 0x53, 0x4A, 0x42,
        0x01, 0x00, 0x01, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x0C, 0x00, 0x00, 0x00,
        b'v', b'4', b'.', b'0', b'.', b'3', b'0', b'3', b'1', b'9', 0x00, 0x00,
        0x00, 0x00,
        0x01, 0x00,
        // #~ at 0x2C, 0 bytes
        0x2C, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x23, 0x7E, 0x00, 0x00,
    ];

    #[test]
    fn crafted() {
        let root = Root::read(&ROOT).unwrap();
        assert_eq!(root.version, "v4.0.30319");
        assert_eq!(root.version_length, 12);
        assert_eq!(root.stream_headers.len(), 1);
        assert_eq!(root.stream_headers[0].name, "#~");
        assert_eq!(root.encoded_len(), ROOT.len());

        let mut out = Vec::new();
        root.write(&mut out);
        assert_eq!(out, ROOT);
    }

    #[test]
    fn bad_signature() {
        let mut data = ROOT;
        data[0] = 0x00;
        assert!(matches!(Root::read(&data), Err(crate::Error::Malformed { .. })));
    }

    #[test]
    fn stream_out_of_bounds() {
        let mut data = ROOT;
        data[36] = 0x10;
        assert!(Root::read(&data).is_err());
    }
}

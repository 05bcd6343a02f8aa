//! The CLI header (ECMA-335 II.25.3.3) locating the metadata block.

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// Size of the CLI header.
pub const COR20_HEADER_SIZE: usize = 72;
/// Offset of the metadata RVA within the CLI header.
pub const COR20_METADATA_RVA_OFFSET: usize = 8;
/// Offset of the metadata size within the CLI header.
pub const COR20_METADATA_SIZE_OFFSET: usize = 12;
/// Offset of the runtime flags within the CLI header.
pub const COR20_FLAGS_OFFSET: usize = 16;

/// `COMIMAGE_FLAGS_ILONLY`
pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;
/// `COMIMAGE_FLAGS_STRONGNAMESIGNED`: cleared on rewrite, the signature no longer matches
pub const COMIMAGE_FLAGS_STRONGNAMESIGNED: u32 = 0x0000_0008;

/// The CLI header (ECMA-335 II.25.3.3), the entry point of all managed metadata in a PE image.
///
/// Only the fields the patcher inspects are kept; the writer edits the remaining layout in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Major runtime version, 2 for all current images
    pub major_runtime_version: u16,
    /// Minor runtime version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata block
    pub meta_data_size: u32,
    /// Runtime flags (`COMIMAGE_FLAGS_*`)
    pub flags: u32,
    /// Entry point token, or RVA for native entry points
    pub entry_point_token: u32,
    /// RVA of the managed resources
    pub resource_rva: u32,
    /// Size of the managed resources
    pub resource_size: u32,
    /// RVA of the strong name signature
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Parse a CLI header from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for short input and [`crate::Error::Malformed`] if
    /// the size field or metadata directory is invalid.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);
        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("CLR header has no metadata directory"));
        }

        Ok(Cor20Header {
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags: parser.read_le::<u32>()?,
            entry_point_token: parser.read_le::<u32>()?,
            resource_rva: parser.read_le::<u32>()?,
            resource_size: parser.read_le::<u32>()?,
            strong_name_signature_rva: parser.read_le::<u32>()?,
            strong_name_signature_size: parser.read_le::<u32>()?,
        })
    }

    /// Returns `true` if the image claims a strong name signature.
    #[must_use]
    pub fn is_strong_name_signed(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_STRONGNAMESIGNED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn header() -> [u8; 72] {
        let mut data = [0u8; 72];
        data[..24].copy_from_slice(&[
            0x48, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x05, 0x00,
            0x00, 0x21, 0x00, 0x00,
            0x00, 0x03, 0x00, 0x00,
            0x09, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x06,
        ]);
        data
    }

    #[test]
    fn crafted() {
        let header = Cor20Header::read(&header()).unwrap();
        assert_eq!(header.major_runtime_version, 2);
        assert_eq!(header.minor_runtime_version, 5);
        assert_eq!(header.meta_data_rva, 0x2100);
        assert_eq!(header.meta_data_size, 0x300);
        assert_eq!(header.entry_point_token, 0x0600_0001);
        assert!(header.is_strong_name_signed());
    }

    #[test]
    fn invalid() {
        assert!(matches!(Cor20Header::read(&[0u8; 10]), Err(OutOfBounds)));

        let mut data = header();
        data[0] = 0x40;
        assert!(Cor20Header::read(&data).is_err());

        let mut data = header();
        data[8..12].fill(0);
        assert!(Cor20Header::read(&data).is_err());
    }
}

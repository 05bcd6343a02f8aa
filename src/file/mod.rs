//! PE container access for managed modules.
//!
//! [`File`] loads a PE image through a [`Backend`] (memory-mapped or owned), validates that it
//! carries a CLR runtime header, and extracts the header geometry the writer needs into an owned
//! [`PeLayout`]. Parsing of the PE structures themselves is delegated to `goblin`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mlg::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("Game.dll"))?;
//! let (clr_rva, clr_size) = file.clr();
//! let clr_offset = file.rva_to_offset(clr_rva as usize)?;
//! println!("CLR header at {clr_offset:#x}, {clr_size} bytes");
//! # Ok::<(), mlg::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use goblin::pe::PE;

pub use memory::Memory;
pub use physical::Physical;

use crate::{
    Error::{Empty, GoblinErr, OutOfBounds},
    Result,
};

/// Data directory index of the certificate table.
pub const DIRECTORY_CERTIFICATE: usize = 4;
/// Data directory index of the debug directory.
pub const DIRECTORY_DEBUG: usize = 6;
/// Data directory index of the CLR runtime header.
pub const DIRECTORY_CLR: usize = 14;

/// Size of a single section table entry.
pub const SECTION_HEADER_SIZE: usize = 40;

/// Backing storage a [`File`] reads from.
pub trait Backend: std::fmt::Debug + Send + Sync {
    /// Returns a slice of `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

pub(crate) fn slice_checked(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let Some(offset_end) = offset.checked_add(len) else {
        return Err(OutOfBounds);
    };

    if offset_end > data.len() {
        return Err(OutOfBounds);
    }

    Ok(&data[offset..offset_end])
}

/// One entry of the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Raw, null-padded section name
    pub name: [u8; 8],
    /// Size of the section once mapped
    pub virtual_size: u32,
    /// RVA of the section
    pub virtual_address: u32,
    /// Size of the section data in the file
    pub size_of_raw_data: u32,
    /// File offset of the section data
    pub pointer_to_raw_data: u32,
    /// Section characteristics flags
    pub characteristics: u32,
}

impl SectionInfo {
    /// Section name with trailing padding removed.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Returns `true` if `rva` lies inside this section's raw data.
    #[must_use]
    pub fn contains_rva(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.size_of_raw_data);
        rva >= self.virtual_address && u64::from(rva) < u64::from(self.virtual_address) + u64::from(extent)
    }
}

/// Header geometry of a PE image, extracted once at load time.
#[derive(Debug, Clone)]
pub struct PeLayout {
    /// File offset of the `PE\0\0` signature (`e_lfanew`)
    pub pe_offset: usize,
    /// Number of entries in the section table
    pub number_of_sections: u16,
    /// Size of the optional header in bytes
    pub size_of_optional_header: u16,
    /// `true` for PE32+ images
    pub is_64: bool,
    /// File alignment of section data
    pub file_alignment: u32,
    /// Memory alignment of sections
    pub section_alignment: u32,
    /// Combined size of all headers, rounded to the file alignment
    pub size_of_headers: u32,
    /// Size of the mapped image
    pub size_of_image: u32,
    /// RVA and size of the CLR runtime header
    pub clr: (u32, u32),
    /// RVA and size of the debug directory, if present
    pub debug: Option<(u32, u32)>,
    /// The section table
    pub sections: Vec<SectionInfo>,
}

impl PeLayout {
    fn from_pe(pe: &PE) -> Result<PeLayout> {
        let Some(optional_header) = pe.header.optional_header else {
            return Err(malformed_error!("File does not have an OptionalHeader"));
        };

        let clr = match optional_header.data_directories.get_clr_runtime_header() {
            Some(dir) if dir.virtual_address != 0 => (dir.virtual_address, dir.size),
            _ => {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ))
            }
        };

        let debug = match optional_header.data_directories.get_debug_table() {
            Some(dir) if dir.virtual_address != 0 && dir.size != 0 => {
                Some((dir.virtual_address, dir.size))
            }
            _ => None,
        };

        let sections = pe
            .sections
            .iter()
            .map(|section| SectionInfo {
                name: section.name,
                virtual_size: section.virtual_size,
                virtual_address: section.virtual_address,
                size_of_raw_data: section.size_of_raw_data,
                pointer_to_raw_data: section.pointer_to_raw_data,
                characteristics: section.characteristics,
            })
            .collect();

        Ok(PeLayout {
            pe_offset: pe.header.dos_header.pe_pointer as usize,
            number_of_sections: pe.header.coff_header.number_of_sections,
            size_of_optional_header: pe.header.coff_header.size_of_optional_header,
            is_64: pe.is_64,
            file_alignment: optional_header.windows_fields.file_alignment,
            section_alignment: optional_header.windows_fields.section_alignment,
            size_of_headers: optional_header.windows_fields.size_of_headers,
            size_of_image: optional_header.windows_fields.size_of_image,
            clr,
            debug,
            sections,
        })
    }

    /// File offset of the COFF file header.
    #[must_use]
    pub fn coff_header_offset(&self) -> usize {
        self.pe_offset + 4
    }

    /// File offset of the optional header.
    #[must_use]
    pub fn optional_header_offset(&self) -> usize {
        self.coff_header_offset() + 20
    }

    /// File offset of the first section table entry.
    #[must_use]
    pub fn section_table_offset(&self) -> usize {
        self.optional_header_offset() + self.size_of_optional_header as usize
    }

    /// File offset just past the last section table entry.
    #[must_use]
    pub fn section_table_end(&self) -> usize {
        self.section_table_offset() + self.sections.len() * SECTION_HEADER_SIZE
    }

    /// File offset of data directory entry `index`.
    #[must_use]
    pub fn data_directory_offset(&self, index: usize) -> usize {
        let base = if self.is_64 { 112 } else { 96 };
        self.optional_header_offset() + base + index * 8
    }

    /// Map an RVA to a file offset through the section table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        for section in &self.sections {
            if section.contains_rva(rva) {
                return Ok((rva - section.virtual_address) as usize
                    + section.pointer_to_raw_data as usize);
            }
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - {:#x}",
            rva
        ))
    }

    /// First RVA past every section, rounded up to the section alignment.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a section extends past the 32-bit address space.
    pub fn next_section_rva(&self) -> Result<u32> {
        let mut end = self.size_of_headers;
        for section in &self.sections {
            let extent = section.virtual_size.max(section.size_of_raw_data);
            let Some(section_end) = section.virtual_address.checked_add(extent) else {
                return Err(malformed_error!(
                    "Section {} overflows the address space - {:#x} + {:#x}",
                    section.name(),
                    section.virtual_address,
                    extent
                ));
            };
            end = end.max(section_end);
        }

        align_up(end, self.section_alignment.max(1))
            .ok_or_else(|| malformed_error!("No RVA left after {:#x}", end))
    }
}

/// Round `value` up to the next multiple of `alignment`, `None` on overflow.
#[must_use]
pub fn align_up(value: u32, alignment: u32) -> Option<u32> {
    value.checked_next_multiple_of(alignment)
}

/// A loaded PE image with a CLR runtime header.
///
/// # Examples
///
/// ```rust,no_run
/// use mlg::File;
///
/// let data = std::fs::read("Game.dll")?;
/// let file = File::from_mem(data)?;
/// for section in &file.layout().sections {
///     println!("{} at {:#x}", section.name(), section.virtual_address);
/// }
/// # Ok::<(), mlg::Error>(())
/// ```
#[derive(Debug)]
pub struct File {
    data: Box<dyn Backend>,
    layout: PeLayout,
}

impl File {
    /// Load a module from disk through a memory mapping.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a PE image, or has no CLR header.
    pub fn from_file(file: &Path) -> Result<File> {
        Self::load(Physical::new(file)?)
    }

    /// Load a module from an owned buffer.
    ///
    /// # Errors
    /// Returns an error if the data is not a PE image or has no CLR header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let layout = match PE::parse(data.data()) {
            Ok(pe) => PeLayout::from_pe(&pe)?,
            Err(error) => return Err(GoblinErr(error)),
        };

        Ok(File {
            data: Box::new(data),
            layout,
        })
    }

    /// Total size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the image has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The complete image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// A bounds checked slice of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Header geometry of the image.
    #[must_use]
    pub fn layout(&self) -> &PeLayout {
        &self.layout
    }

    /// RVA and size of the CLR runtime header.
    #[must_use]
    pub fn clr(&self) -> (u32, u32) {
        self.layout.clr
    }

    /// Map an RVA to a file offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva = u32::try_from(rva)
            .map_err(|_| malformed_error!("RVA too large to fit in u32: {}", rva))?;
        self.layout.rva_to_offset(rva)
    }

    /// Slice of `len` bytes starting at `rva`.
    ///
    /// # Errors
    /// Returns an error if `rva` is unmapped or the range exceeds the image.
    pub fn rva_slice(&self, rva: u32, len: usize) -> Result<&[u8]> {
        let offset = self.layout.rva_to_offset(rva)?;
        self.data_slice(offset, len)
    }

    /// All bytes from `rva` to the end of the image.
    ///
    /// # Errors
    /// Returns an error if `rva` is unmapped.
    pub fn rva_tail(&self, rva: u32) -> Result<&[u8]> {
        let offset = self.layout.rva_to_offset(rva)?;
        if offset > self.len() {
            return Err(OutOfBounds);
        }
        Ok(&self.data()[offset..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ModuleBuilder;

    #[test]
    fn load_synthetic_module() {
        let image = ModuleBuilder::game("Game").build();
        let file = File::from_mem(image).unwrap();

        let layout = file.layout();
        assert_eq!(layout.pe_offset, 0x80);
        assert!(!layout.is_64);
        assert_eq!(layout.file_alignment, 0x200);
        assert_eq!(layout.section_alignment, 0x2000);
        assert_eq!(layout.sections.len(), 1);
        assert_eq!(layout.sections[0].name(), ".text");
        assert_eq!(file.clr(), (0x2000, 72));
        assert_eq!(file.rva_to_offset(0x2000).unwrap(), 0x200);
        assert!(file.rva_to_offset(0x10).is_err());
    }

    #[test]
    fn empty_and_garbage() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
        assert!(File::from_mem(vec![0x4D, 0x5A, 0x00, 0x01]).is_err());
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0, 0x200), Some(0));
        assert_eq!(align_up(1, 0x200), Some(0x200));
        assert_eq!(align_up(0x200, 0x200), Some(0x200));
        assert_eq!(align_up(0x2001, 0x2000), Some(0x4000));
        assert_eq!(align_up(u32::MAX - 0x10, 0x2000), None);
    }

    #[test]
    fn section_at_top_of_address_space() {
        let file = File::from_mem(ModuleBuilder::game("Game").build()).unwrap();
        assert_eq!(file.layout().next_section_rva().unwrap(), 0x4000);

        let mut layout = file.layout().clone();
        layout.sections[0].virtual_address = 0xFFFF_F000;
        assert!(matches!(
            layout.next_section_rva(),
            Err(crate::Error::Malformed { .. })
        ));

        layout.sections[0].virtual_address = 0xFFFF_0000;
        layout.sections[0].virtual_size = 0x2_0000;
        assert!(layout.next_section_rva().is_err());
    }
}

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    Result,
};

/// The `#Blob` heap (ECMA-335 II.24.2.4): length-prefixed binary entries.
///
/// Entries are signatures, custom attribute values, public keys and marshalling descriptors.
/// Like [`crate::metadata::streams::Strings`] the heap is append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Vec<u8>,
}

impl Default for Blob {
    fn default() -> Self {
        Blob { data: vec![0] }
    }
}

impl From<&[u8]> for Blob {
    fn from(data: &[u8]) -> Self {
        if data.is_empty() {
            return Blob::default();
        }
        Blob {
            data: data.to_vec(),
        }
    }
}

impl Blob {
    /// Read the entry starting at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap or an entry whose
    /// length exceeds it.
    pub fn get(&self, index: u32) -> Result<&[u8]> {
        let index = index as usize;
        if index >= self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        let mut parser = Parser::new(&self.data);
        parser.seek(index)?;
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }

    /// Offset of an existing entry with exactly these bytes.
    ///
    /// Walks the heap entry by entry and stops at the first undecodable length prefix, which
    /// only trailing padding produces.
    #[must_use]
    pub fn find(&self, value: &[u8]) -> Option<u32> {
        let mut parser = Parser::new(&self.data);
        while parser.has_more_data() {
            let offset = parser.pos();
            let Ok(len) = parser.read_compressed_uint() else {
                break;
            };
            let Ok(entry) = parser.read_bytes(len as usize) else {
                break;
            };
            if entry == value {
                return u32::try_from(offset).ok();
            }
        }
        None
    }

    /// Offset of an entry holding `value`, appending one if none exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` is too large for a blob length prefix.
    #[allow(clippy::cast_possible_truncation)]
    pub fn intern(&mut self, value: &[u8]) -> Result<u32> {
        if let Some(offset) = self.find(value) {
            return Ok(offset);
        }

        let offset = self.data.len() as u32;
        let len = u32::try_from(value.len())
            .map_err(|_| malformed_error!("Blob too large - {} bytes", value.len()))?;
        push_compressed_uint(&mut self.data, len)?;
        self.data.extend_from_slice(value);
        Ok(offset)
    }

    /// Size of the heap in bytes, before padding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the heap holds only the mandatory empty entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// Raw heap bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

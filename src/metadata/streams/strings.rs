use crate::Result;

/// The `#Strings` heap (ECMA-335 II.24.2.3): null-terminated UTF-8 identifiers.
///
/// The heap is append-only. Existing offsets stay valid across every edit, so rows that are not
/// touched keep pointing at the same names after serialization.
///
/// # Examples
///
/// ```rust,ignore
/// use mlg::metadata::streams::Strings;
///
/// let mut strings = Strings::from(&[0x00, b'G', b'a', b'm', b'e', 0x00][..]);
/// assert_eq!(strings.get(1)?, "Game");
///
/// let offset = strings.intern("Game.Patched");
/// assert_eq!(strings.get(offset)?, "Game.Patched");
/// # Ok::<(), mlg::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strings {
    data: Vec<u8>,
}

impl Default for Strings {
    fn default() -> Self {
        Strings { data: vec![0] }
    }
}

impl From<&[u8]> for Strings {
    fn from(data: &[u8]) -> Self {
        if data.is_empty() {
            return Strings::default();
        }
        Strings {
            data: data.to_vec(),
        }
    }
}

impl Strings {
    /// Read the string starting at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap, or
    /// [`crate::Error::Malformed`] for an unterminated or non-UTF-8 entry.
    pub fn get(&self, index: u32) -> Result<&str> {
        let index = index as usize;
        if index >= self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        let rest = &self.data[index..];
        let Some(len) = rest.iter().position(|b| *b == 0) else {
            return Err(malformed_error!("Unterminated string at {}", index));
        };

        std::str::from_utf8(&rest[..len])
            .map_err(|_| malformed_error!("Invalid UTF-8 string at {}", index))
    }

    /// Offset of an existing entry equal to `value`, reusing suffixes of longer entries.
    #[must_use]
    pub fn find(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }

        let needle = value.as_bytes();
        let window = needle.len() + 1;
        self.data
            .windows(window)
            .position(|candidate| &candidate[..needle.len()] == needle && candidate[needle.len()] == 0)
            .and_then(|offset| u32::try_from(offset).ok())
    }

    /// Offset of `value`, appending it if the heap does not contain it yet.
    #[allow(clippy::cast_possible_truncation)]
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(offset) = self.find(value) {
            return offset;
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        offset
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

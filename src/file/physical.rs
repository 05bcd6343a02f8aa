//! Memory-mapped access to modules on disk.

use std::{
    fs,
    path::{Path, PathBuf},
};

use memmap2::Mmap;

use super::{slice_checked, Backend};
use crate::Result;

/// A module file mapped read-only into memory.
///
/// The mapping is held only for as long as the owning [`crate::File`] lives; editors copy the
/// bytes they rewrite, so the source file can be replaced once the module is dropped.
#[derive(Debug)]
pub struct Physical {
    path: PathBuf,
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;

        // SAFETY: the mapping is read-only and never outlives `Physical`; callers must not
        // truncate the file while a module is loaded from it.
        let data = unsafe { Mmap::map(&file) }?;

        Ok(Physical {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Path the mapping was created from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        slice_checked(&self.data, offset, len)
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn physical() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x4D, 0x5A, 0x90, 0x00, 0x03]).unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();
        assert_eq!(physical.len(), 5);
        assert_eq!(physical.path(), file.path());
        assert_eq!(physical.data_slice(0, 2).unwrap(), &[0x4D, 0x5A]);
        assert!(physical.data_slice(4, 2).is_err());
    }

    #[test]
    fn physical_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = Physical::new(dir.path().join("absent.dll"));
        assert!(matches!(result, Err(crate::Error::FileError(_))));
    }
}

//! Memory-mapped output file with atomic finalization.
//!
//! [`Output`] maps a temporary file created next to the destination, so the final rename never
//! crosses a filesystem boundary. Until [`Output::finalize`] succeeds the destination is left
//! untouched and the temporary file is removed when the [`Output`] is dropped.
//!
//! # Examples
//!
//! ```rust,ignore
//! use crate::writer::Output;
//!
//! let mut output = Output::create("Game_patched.dll", image.len() as u64)?;
//! output.write_at(0, &image)?;
//! output.finalize()?;
//! # Ok::<(), crate::Error>(())
//! ```

use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tempfile::NamedTempFile;

use crate::{Error::OutOfBounds, Result};

/// A memory-mapped temporary file that is renamed over its target on success.
#[derive(Debug)]
pub struct Output {
    mmap: MmapMut,
    file: NamedTempFile,
    target_path: PathBuf,
}

impl Output {
    /// Create a temporary output of `size` bytes in the directory of `target_path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the temporary file cannot be created, sized, or
    /// mapped.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();
        let directory = match target_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let file = NamedTempFile::new_in(&directory)?;
        file.as_file().set_len(size)?;

        // SAFETY: the temporary file is private to this process and outlives the mapping
        let mmap = unsafe { MmapOptions::new().map_mut(file.as_file())? };

        Ok(Output {
            mmap,
            file,
            target_path,
        })
    }

    /// Copy `data` into the output at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the write would exceed the output size.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let Some(end) = offset.checked_add(data.len()) else {
            return Err(OutOfBounds);
        };
        if end > self.mmap.len() {
            return Err(OutOfBounds);
        }

        self.mmap[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Flush the mapping and atomically move the file to its destination, replacing any
    /// existing file there.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if flushing or the rename fails; the temporary file
    /// is removed in that case.
    pub fn finalize(self) -> Result<()> {
        let Output {
            mmap,
            file,
            target_path,
        } = self;

        mmap.flush()?;
        drop(mmap);

        file.persist(&target_path).map_err(|error| error.error)?;
        log::debug!("Wrote {}", target_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.dll");
        std::fs::write(&target, b"old contents").unwrap();

        let mut output = Output::create(&target, 4).unwrap();
        output.write_at(0, b"MZ").unwrap();
        output.write_at(2, &[0x90, 0x00]).unwrap();
        output.finalize().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), [b'M', b'Z', 0x90, 0x00]);
    }

    #[test]
    fn dropped_output_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.dll");

        {
            let mut output = Output::create(&target, 8).unwrap();
            output.write_at(0, b"partial").unwrap();
        }

        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn bounds_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = Output::create(dir.path().join("out.dll"), 4).unwrap();
        assert!(matches!(output.write_at(3, &[0, 0]), Err(OutOfBounds)));
        assert!(matches!(output.write_at(usize::MAX, &[0]), Err(OutOfBounds)));
    }
}

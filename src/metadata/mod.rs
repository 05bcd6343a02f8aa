//! ECMA-335 metadata: reading, editing and re-serializing the metadata of a managed module.
//!
//! # Key Components
//!
//! - [`Metadata`] - the metadata block: root, heaps and tables as one editable value
//! - [`cilmodule::CilModule`] - a loaded module with lookups and edits used by the patcher
//! - [`tables`] - generic table rows, column layouts and coded indices
//! - [`streams`] - the `#Strings`, `#Blob` and `#~` streams
//! - [`method`] - method body headers and exception clauses
//! - [`signatures`] - method signature inspection
//! - [`customattributes`] - fixed-string custom attribute values
//! - [`identity`] - the observable identity of an assembly

pub mod cilmodule;
pub mod cor20header;
pub mod customattributes;
pub mod identity;
pub mod method;
pub mod root;
pub mod signatures;
pub mod streams;
pub mod tables;
pub mod token;

use crate::{
    metadata::{
        root::Root,
        streams::{Blob, StreamHeader, Strings, TablesStream},
    },
    Result,
};

/// Stream kinds in on-disk order, so re-serialized metadata keeps the original stream layout.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamSlot {
    Tables(String),
    Strings,
    Blob,
    Guid,
    UserStrings,
    Other(String, Vec<u8>),
}

/// The metadata block of a module.
///
/// # Examples
///
/// ```rust,ignore
/// use mlg::metadata::Metadata;
///
/// let mut metadata = Metadata::read(&metadata_bytes)?;
/// let name = metadata.strings.intern("Game.Patched");
/// let rewritten = metadata.write()?;
/// # Ok::<(), mlg::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Metadata {
    /// The metadata root as read; stream headers are regenerated on write
    pub root: Root,
    /// The `#Strings` heap
    pub strings: Strings,
    /// The `#Blob` heap
    pub blob: Blob,
    /// The `#GUID` heap, raw
    pub guid: Vec<u8>,
    /// The `#US` heap, raw
    pub user_strings: Vec<u8>,
    /// The tables stream
    pub tables: TablesStream,
    order: Vec<StreamSlot>,
}

impl Metadata {
    /// Parse a metadata block.
    ///
    /// # Errors
    /// Returns an error for a malformed root, a missing tables stream, or unsupported tables.
    pub fn read(data: &[u8]) -> Result<Metadata> {
        let root = Root::read(data)?;

        let mut strings = None;
        let mut blob = None;
        let mut guid = None;
        let mut user_strings = None;
        let mut tables = None;
        let mut order = Vec::with_capacity(root.stream_headers.len());

        for header in &root.stream_headers {
            let start = header.offset as usize;
            let bytes = &data[start..start + header.size as usize];
            match header.name.as_str() {
                "#~" | "#-" if tables.is_none() => {
                    tables = Some(TablesStream::read(bytes)?);
                    order.push(StreamSlot::Tables(header.name.clone()));
                }
                "#Strings" if strings.is_none() => {
                    strings = Some(Strings::from(bytes));
                    order.push(StreamSlot::Strings);
                }
                "#Blob" if blob.is_none() => {
                    blob = Some(Blob::from(bytes));
                    order.push(StreamSlot::Blob);
                }
                "#GUID" if guid.is_none() => {
                    guid = Some(bytes.to_vec());
                    order.push(StreamSlot::Guid);
                }
                "#US" if user_strings.is_none() => {
                    user_strings = Some(bytes.to_vec());
                    order.push(StreamSlot::UserStrings);
                }
                name => {
                    log::warn!("Keeping unrecognized metadata stream {name} verbatim");
                    order.push(StreamSlot::Other(name.to_string(), bytes.to_vec()));
                }
            }
        }

        let Some(tables) = tables else {
            return Err(malformed_error!("Metadata has no tables stream"));
        };

        for (present, slot) in [
            (strings.is_some(), StreamSlot::Strings),
            (blob.is_some(), StreamSlot::Blob),
            (guid.is_some(), StreamSlot::Guid),
        ] {
            if !present {
                order.push(slot);
            }
        }

        Ok(Metadata {
            root,
            strings: strings.unwrap_or_default(),
            blob: blob.unwrap_or_default(),
            guid: guid.unwrap_or_default(),
            user_strings: user_strings.unwrap_or_default(),
            tables,
            order,
        })
    }

    /// Create empty metadata with the conventional stream order.
    #[must_use]
    pub fn new(version: &str) -> Metadata {
        Metadata {
            root: Root {
                major_version: 1,
                minor_version: 1,
                reserved: 0,
                version_length: 0,
                version: version.to_string(),
                flags: 0,
                stream_headers: Vec::new(),
            },
            strings: Strings::default(),
            blob: Blob::default(),
            guid: Vec::new(),
            user_strings: vec![0],
            tables: TablesStream::new(),
            order: vec![
                StreamSlot::Tables("#~".to_string()),
                StreamSlot::Strings,
                StreamSlot::UserStrings,
                StreamSlot::Guid,
                StreamSlot::Blob,
            ],
        }
    }

    /// Serialize the metadata block.
    ///
    /// Heap index widths are recomputed from the final heap sizes and table column widths from
    /// the final row counts.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the block grows beyond 4 GiB.
    pub fn write(&self) -> Result<Vec<u8>> {
        let heap_sizes =
            self.tables
                .heap_sizes_for(self.strings.len(), self.guid.len(), self.blob.len());

        let mut streams: Vec<(String, Vec<u8>)> = Vec::with_capacity(self.order.len());
        for slot in &self.order {
            let (name, mut bytes) = match slot {
                StreamSlot::Tables(name) => (name.clone(), self.tables.write(heap_sizes)),
                StreamSlot::Strings => ("#Strings".to_string(), self.strings.data().to_vec()),
                StreamSlot::Blob => ("#Blob".to_string(), self.blob.data().to_vec()),
                StreamSlot::Guid => ("#GUID".to_string(), self.guid.clone()),
                StreamSlot::UserStrings => ("#US".to_string(), self.user_strings.clone()),
                StreamSlot::Other(name, bytes) => (name.clone(), bytes.clone()),
            };
            while bytes.len() % 4 != 0 {
                bytes.push(0);
            }
            streams.push((name, bytes));
        }

        let mut root = self.root.clone();
        root.stream_headers = streams
            .iter()
            .map(|(name, _)| StreamHeader {
                offset: 0,
                size: 0,
                name: name.clone(),
            })
            .collect();

        let mut offset = root.encoded_len();
        for (header, (_, bytes)) in root.stream_headers.iter_mut().zip(&streams) {
            header.offset = u32::try_from(offset)
                .map_err(|_| malformed_error!("Metadata too large - {} bytes", offset))?;
            header.size = u32::try_from(bytes.len())
                .map_err(|_| malformed_error!("Stream too large - {} bytes", bytes.len()))?;
            offset += bytes.len();
        }

        let mut out = Vec::with_capacity(offset);
        root.write(&mut out);
        for (_, bytes) in &streams {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{typeref, TableId};

    #[test]
    fn empty_metadata_roundtrip() {
        let metadata = Metadata::new("v4.0.30319");
        let bytes = metadata.write().unwrap();
        let reread = Metadata::read(&bytes).unwrap();

        assert_eq!(reread.root.version, "v4.0.30319");
        let names: Vec<_> = reread
            .root
            .stream_headers
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        assert_eq!(names, ["#~", "#Strings", "#US", "#GUID", "#Blob"]);
        assert_eq!(reread.tables.tables.row_count(TableId::TypeRef), 0);
    }

    #[test]
    fn edits_survive_serialization() {
        let mut metadata = Metadata::new("v4.0.30319");
        let name = metadata.strings.intern("Object");
        let namespace = metadata.strings.intern("System");
        metadata
            .tables
            .tables
            .push(TableId::TypeRef, vec![0x06, name, namespace])
            .unwrap();
        let sig = metadata.blob.intern(&[0x20, 0x00, 0x01]).unwrap();

        let bytes = metadata.write().unwrap();
        assert_eq!(bytes.len() % 4, 0);

        let reread = Metadata::read(&bytes).unwrap();
        let row_name = reread.tables.tables.get(TableId::TypeRef, 1, typeref::NAME).unwrap();
        assert_eq!(reread.strings.get(row_name).unwrap(), "Object");
        assert_eq!(reread.blob.get(sig).unwrap(), &[0x20, 0x00, 0x01]);

        // A second pass is byte-identical
        assert_eq!(reread.write().unwrap(), bytes);
    }

    #[test]
    fn missing_tables_stream() {
        let mut metadata = Metadata::new("v4.0.30319");
        metadata.order.retain(|slot| !matches!(slot, StreamSlot::Tables(_)));
        let bytes = metadata.write().unwrap();
        assert!(Metadata::read(&bytes).is_err());
    }
}

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{push_le_dyn, read_le_at, read_le_at_dyn},
    metadata::tables::{
        TableId, TableInfo, Tables, HEAP_EXTRA_DATA, HEAP_LARGE_BLOB, HEAP_LARGE_GUID,
        HEAP_LARGE_STRINGS,
    },
    Error::NotSupported,
    Result,
};

/// The `#~` (or `#-`) tables stream (ECMA-335 II.24.2.6).
///
/// Holds the stream header fields and every table's rows. Row counts and column widths are
/// derived from the rows themselves when the stream is written, so rows can be appended or
/// removed freely in between.
#[derive(Debug, Clone)]
pub struct TablesStream {
    /// Major version of the table schema
    pub major_version: u8,
    /// Minor version of the table schema
    pub minor_version: u8,
    /// `HeapSizes` flags as read, used as a lower bound when writing
    pub heap_sizes: u8,
    /// Bit vector of tables that are sorted
    pub sorted: u64,
    extra_data: Option<u32>,
    /// Row data of all tables
    pub tables: Tables,
}

impl Default for TablesStream {
    fn default() -> Self {
        Self::new()
    }
}

impl TablesStream {
    /// Create an empty schema 2.0 tables stream with the conventional sorted mask.
    #[must_use]
    pub fn new() -> TablesStream {
        TablesStream {
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            sorted: 0x0000_1600_3301_FA00,
            extra_data: None,
            tables: Tables::new(),
        }
    }

    /// Parse a tables stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the stream contains tables outside the
    /// assembly table set, or an error if it is truncated.
    pub fn read(data: &[u8]) -> Result<TablesStream> {
        if data.len() < 24 {
            return Err(crate::Error::OutOfBounds);
        }

        let mut offset = 4_usize;
        let major_version = read_le_at::<u8>(data, &mut offset)?;
        let minor_version = read_le_at::<u8>(data, &mut offset)?;
        let heap_sizes = read_le_at::<u8>(data, &mut offset)?;
        offset += 1;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let sorted = read_le_at::<u64>(data, &mut offset)?;

        if valid >> TableId::COUNT != 0 {
            return Err(NotSupported);
        }

        let mut rows = [0u32; TableId::COUNT];
        for table in TableId::iter() {
            if valid & (1 << table.index()) != 0 {
                rows[table.index()] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        let extra_data = if heap_sizes & HEAP_EXTRA_DATA != 0 {
            Some(read_le_at::<u32>(data, &mut offset)?)
        } else {
            None
        };

        let info = TableInfo::new(rows, heap_sizes);
        let mut tables = Tables::new();
        for table in TableId::iter() {
            let columns = table.columns();
            for _ in 0..info.rows(table) {
                let mut row = Vec::with_capacity(columns.len());
                for column in columns {
                    row.push(read_le_at_dyn(data, &mut offset, info.is_large(*column))?);
                }
                tables.push(table, row)?;
            }
        }

        Ok(TablesStream {
            major_version,
            minor_version,
            heap_sizes,
            sorted,
            extra_data,
            tables,
        })
    }

    /// Compute the `HeapSizes` flags for heaps of the given byte lengths.
    ///
    /// Flags already set in the original stream are kept, so untouched modules keep their
    /// exact column widths.
    #[must_use]
    pub fn heap_sizes_for(&self, strings: usize, guid: usize, blob: usize) -> u8 {
        let mut flags = self.heap_sizes;
        if strings > usize::from(u16::MAX) {
            flags |= HEAP_LARGE_STRINGS;
        }
        if guid > usize::from(u16::MAX) {
            flags |= HEAP_LARGE_GUID;
        }
        if blob > usize::from(u16::MAX) {
            flags |= HEAP_LARGE_BLOB;
        }
        flags
    }

    /// Encode the stream, padded to a 4 byte boundary.
    ///
    /// `heap_sizes` must come from [`TablesStream::heap_sizes_for`] with the final heap sizes.
    #[must_use]
    pub fn write(&self, heap_sizes: u8) -> Vec<u8> {
        let rows = self.tables.row_counts();
        let info = TableInfo::new(rows, heap_sizes);

        let mut valid = 0u64;
        for table in TableId::iter() {
            if rows[table.index()] > 0 {
                valid |= 1 << table.index();
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(self.major_version);
        out.push(self.minor_version);
        out.push(heap_sizes);
        out.push(1);
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&self.sorted.to_le_bytes());

        for table in TableId::iter() {
            if rows[table.index()] > 0 {
                out.extend_from_slice(&rows[table.index()].to_le_bytes());
            }
        }

        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            out.extend_from_slice(&self.extra_data.unwrap_or(0).to_le_bytes());
        }

        for table in TableId::iter() {
            let columns = table.columns();
            for row in self.tables.rows(table) {
                for (column, value) in columns.iter().zip(row) {
                    push_le_dyn(&mut out, *value, info.is_large(*column));
                }
            }
        }

        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::typeref;

    #[rustfmt::skip]
    fn crafted() -> Vec<u8> {
        vec![
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x01,
            // valid: Module, TypeRef
            0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            // Module
            0x00, 0x00, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            // TypeRef x2
            0x06, 0x00, 0x10, 0x00, 0x18, 0x00,
            0x06, 0x00, 0x20, 0x00, 0x18, 0x00,
        ]
    }

    #[test]
    fn read_crafted() {
        let stream = TablesStream::read(&crafted()).unwrap();
        assert_eq!(stream.major_version, 2);
        assert_eq!(stream.tables.row_count(TableId::Module), 1);
        assert_eq!(stream.tables.row_count(TableId::TypeRef), 2);
        assert_eq!(stream.tables.get(TableId::Module, 1, 1).unwrap(), 0x0A);
        assert_eq!(stream.tables.get(TableId::TypeRef, 2, typeref::NAME).unwrap(), 0x20);
    }

    #[test]
    fn write_is_stable() {
        let data = crafted();
        let stream = TablesStream::read(&data).unwrap();
        let written = stream.write(stream.heap_sizes);
        // 54 bytes of rows and header, padded to 56
        assert_eq!(&written[..data.len()], &data[..]);
        assert_eq!(written.len(), 56);
    }

    #[test]
    fn large_heaps_widen_columns() {
        let stream = TablesStream::read(&crafted()).unwrap();
        let flags = stream.heap_sizes_for(0x1_0000, 16, 1);
        assert_eq!(flags, HEAP_LARGE_STRINGS);

        let written = stream.write(flags);
        let reread = TablesStream::read(&written).unwrap();
        assert_eq!(reread.heap_sizes, HEAP_LARGE_STRINGS);
        assert_eq!(reread.tables.get(TableId::TypeRef, 1, typeref::NAMESPACE).unwrap(), 0x18);
    }

    #[test]
    fn unknown_tables_rejected() {
        let mut data = crafted();
        data[14] = 0x01; // bit 0x30
        assert!(matches!(TablesStream::read(&data), Err(NotSupported)));
    }
}

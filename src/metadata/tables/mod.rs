//! Metadata table model.
//!
//! Tables are held generically: every row is a vector of raw column values whose meaning is
//! given by [`TableId::columns`]. Coded indices stay encoded, so appending rows never requires
//! re-encoding existing values; only the on-disk width of each column is recomputed when the
//! tables stream is written.

mod codedindex;
mod schema;
mod tableid;

pub use codedindex::CodedIndexType;
pub use schema::{
    assembly, assemblyref, customattribute, memberref, methoddef, methodspec, typedef, typeref,
    ColumnType,
};
pub use tableid::TableId;

use strum::{EnumCount, IntoEnumIterator};

/// `HeapSizes` flag: `#Strings` indices are 4 bytes wide
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// `HeapSizes` flag: `#GUID` indices are 4 bytes wide
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// `HeapSizes` flag: `#Blob` indices are 4 bytes wide
pub const HEAP_LARGE_BLOB: u8 = 0x04;
/// `HeapSizes` flag: an extra `u32` follows the row counts
pub const HEAP_EXTRA_DATA: u8 = 0x40;

/// Column widths for one concrete set of row counts and heap sizes.
#[derive(Debug, Clone)]
pub struct TableInfo {
    rows: [u32; TableId::COUNT],
    large_strings: bool,
    large_guid: bool,
    large_blob: bool,
}

impl TableInfo {
    /// Create width information from row counts and the `HeapSizes` flags.
    #[must_use]
    pub fn new(rows: [u32; TableId::COUNT], heap_sizes: u8) -> Self {
        TableInfo {
            rows,
            large_strings: heap_sizes & HEAP_LARGE_STRINGS != 0,
            large_guid: heap_sizes & HEAP_LARGE_GUID != 0,
            large_blob: heap_sizes & HEAP_LARGE_BLOB != 0,
        }
    }

    /// Row count of `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table.index()]
    }

    /// Returns `true` if simple indices into `table` need 4 bytes.
    #[must_use]
    pub fn is_large_index(&self, table: TableId) -> bool {
        self.rows(table) > u32::from(u16::MAX)
    }

    /// Returns `true` if coded indices of kind `coded` need 4 bytes.
    #[must_use]
    pub fn is_large_coded(&self, coded: CodedIndexType) -> bool {
        let limit = 1u32 << (16 - coded.tag_bits());
        coded
            .tables()
            .iter()
            .flatten()
            .any(|table| self.rows(*table) >= limit)
    }

    /// Returns `true` if a column of type `column` is 4 bytes wide.
    #[must_use]
    pub fn is_large(&self, column: ColumnType) -> bool {
        match column {
            ColumnType::U16 => false,
            ColumnType::U32 => true,
            ColumnType::Str => self.large_strings,
            ColumnType::Guid => self.large_guid,
            ColumnType::Blob => self.large_blob,
            ColumnType::Index(table) => self.is_large_index(table),
            ColumnType::Coded(coded) => self.is_large_coded(coded),
        }
    }

    /// Size in bytes of a single row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| if self.is_large(*column) { 4 } else { 2 })
            .sum()
    }
}

/// A single table row: one raw value per column.
pub type Row = Vec<u32>;

/// All rows of every table, addressed by table and 1-based row index.
#[derive(Debug, Clone)]
pub struct Tables {
    rows: Vec<Vec<Row>>,
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    /// Create an empty table set.
    #[must_use]
    pub fn new() -> Self {
        Tables {
            rows: vec![Vec::new(); TableId::COUNT],
        }
    }

    /// Row counts of all tables, indexed by [`TableId::index`].
    #[must_use]
    pub fn row_counts(&self) -> [u32; TableId::COUNT] {
        let mut counts = [0u32; TableId::COUNT];
        for table in TableId::iter() {
            counts[table.index()] = self.row_count(table);
        }
        counts
    }

    /// Number of rows in `table`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table.index()].len() as u32
    }

    /// All rows of `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> &[Row] {
        &self.rows[table.index()]
    }

    /// Row `rid` (1-based) of `table`.
    #[must_use]
    pub fn row(&self, table: TableId, rid: u32) -> Option<&Row> {
        let position = usize::try_from(rid).ok()?.checked_sub(1)?;
        self.rows[table.index()].get(position)
    }

    /// Value of column `column` in row `rid` of `table`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row or column does not exist.
    pub fn get(&self, table: TableId, rid: u32, column: usize) -> crate::Result<u32> {
        self.row(table, rid)
            .and_then(|row| row.get(column).copied())
            .ok_or_else(|| malformed_error!("{:?} row {} column {} does not exist", table, rid, column))
    }

    /// Overwrite column `column` in row `rid` of `table`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row or column does not exist.
    pub fn set(&mut self, table: TableId, rid: u32, column: usize, value: u32) -> crate::Result<()> {
        let cell = usize::try_from(rid)
            .ok()
            .and_then(|rid| rid.checked_sub(1))
            .and_then(|position| self.rows[table.index()].get_mut(position))
            .and_then(|row| row.get_mut(column));

        match cell {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(malformed_error!(
                "{:?} row {} column {} does not exist",
                table,
                rid,
                column
            )),
        }
    }

    /// Append a row to `table` and return its 1-based index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `row` does not match the table's column count.
    pub fn push(&mut self, table: TableId, row: Row) -> crate::Result<u32> {
        if row.len() != table.columns().len() {
            return Err(malformed_error!(
                "{:?} expects {} columns, got {}",
                table,
                table.columns().len(),
                row.len()
            ));
        }

        self.rows[table.index()].push(row);
        Ok(self.row_count(table))
    }

    /// Remove row `rid` of `table`, shifting later rows down by one.
    ///
    /// Only valid for tables that no other table indexes into, such as `CustomAttribute`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn remove(&mut self, table: TableId, rid: u32) -> crate::Result<Row> {
        let rows = &mut self.rows[table.index()];
        match usize::try_from(rid).ok().and_then(|rid| rid.checked_sub(1)) {
            Some(position) if position < rows.len() => Ok(rows.remove(position)),
            _ => Err(malformed_error!("{:?} row {} does not exist", table, rid)),
        }
    }

    /// Range of rows in `child` owned by row `rid` of `owner`, following the ECMA-335 list
    /// convention: a row owns everything from its list column up to the next row's list column.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `rid` does not exist.
    pub fn owned_range(
        &self,
        owner: TableId,
        rid: u32,
        list_column: usize,
        child: TableId,
    ) -> crate::Result<std::ops::Range<u32>> {
        let start = self.get(owner, rid, list_column)?;
        let end = match self.row(owner, rid + 1) {
            Some(next) => next.get(list_column).copied().unwrap_or(start),
            None => self.row_count(child) + 1,
        };

        Ok(start..end.max(start))
    }
}

//! Purpose: The storage-engine surface every table handle reads through.
//! Exports: `RowStore`, `TableMeta`, `IndexSpec`, `SeekKey`, `SeekHit`.
//! Role: Seam between typed access (cursor, decoders, searches) and byte-level storage.
//! Invariants: Record numbers are 1-based and physical; index positions are 0-based.
//! Invariants: Engine errors carry an `ErrorKind` so seek outcomes can be classified.
use serde::{Deserialize, Serialize};
use time::Date;

use crate::core::codepage::Codepage;
use crate::core::column::Column;
use crate::core::error::Error;

/// Table-level metadata as the engine reports it at open.
#[derive(Clone, Debug, PartialEq)]
pub struct TableMeta {
    /// Record count declared by the header, if the engine tracks one separately.
    pub declared_record_count: Option<u32>,
    pub last_updated: Option<Date>,
    pub codepage: Codepage,
    pub has_index: bool,
    pub has_memo: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub column: String,
    #[serde(default)]
    pub unique: bool,
    /// The tag carries a FOR filter, so it may not cover every row.
    #[serde(default)]
    pub filtered: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeekKey<'a> {
    Text(&'a str),
    Number(f64),
}

/// Where a keyed search landed, as an index position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekHit {
    Exact(usize),
    After(usize),
    End,
}

pub trait RowStore {
    fn meta(&self) -> TableMeta;

    fn columns(&self) -> &[Column];

    fn record_count(&self) -> u32;

    /// Raw cell bytes in the conventional encoding for the column's type.
    fn raw(&self, recno: u32, column: usize) -> Result<&[u8], Error>;

    fn memo(&self, recno: u32, column: usize) -> Result<String, Error>;

    fn is_null(&self, recno: u32, column: usize) -> Result<bool, Error>;

    fn is_deleted(&self, recno: u32) -> Result<bool, Error>;

    fn set_deleted(&mut self, recno: u32, deleted: bool) -> Result<(), Error>;

    /// Removes flagged rows, renumbers the survivors, and rebuilds indexes.
    fn pack(&mut self) -> Result<u32, Error>;

    fn indexes(&self) -> &[IndexSpec];

    fn index_len(&self, slot: usize) -> Result<usize, Error>;

    fn index_entry(&self, slot: usize, pos: usize) -> Result<u32, Error>;

    fn index_position_of(&self, slot: usize, recno: u32) -> Result<Option<usize>, Error>;

    fn index_key(&self, slot: usize, pos: usize) -> Result<&[u8], Error>;

    fn index_seek(&self, slot: usize, key: SeekKey<'_>) -> Result<SeekHit, Error>;

    /// Whether the entry at `pos` matches `key` under the same rules `index_seek` uses.
    fn index_key_matches(&self, slot: usize, pos: usize, key: SeekKey<'_>) -> Result<bool, Error>;

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

//! Purpose: Define the stable public Rust API boundary for fixtab.
//! Exports: Table handle, field views, seeks, searches, the reference store, and errors.
//! Role: Public, additive-only surface used by the CLI and embedding programs.
//! Invariants: Callers never need a `core` path for ordinary table work.
//! Invariants: Engine internals (decoder strategies, cursor plumbing) stay crate-private.
pub use crate::core::codepage::Codepage;
pub use crate::core::column::{Column, Columns, FieldType};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, conversion_error};
pub use crate::core::expr::{ExprType, Expression};
pub use crate::core::field::{Field, Value};
pub use crate::core::format::{FIXTURE_FORMAT_VERSION, SUPPORTED_FIXTURE_FORMAT_VERSIONS};
pub use crate::core::index::{SeekResult, Tag};
pub use crate::core::julian::{julian_to_date, julian_to_ymd, ymd_to_julian};
pub use crate::core::memory::{Fixture, FixtureRow, MemoryStore};
pub use crate::core::regex_search::{RegexMatch, RegexSearchOptions, RegexSearchResult};
pub use crate::core::search::{ExprSearchOptions, ExprSearchResult, RowSnapshot};
pub use crate::core::store::{IndexSpec, RowStore, SeekHit, SeekKey, TableMeta};
pub use crate::core::table::{FieldRef, Header, OpenOptions, Table};

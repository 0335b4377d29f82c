//! Purpose: Library crate backing the `fixtab` CLI: typed access to fixed-width flat-file tables.
//! Exports: `api` (stable surface), `core` (decoders, cursor, index seeks, searches, reference store).
//! Role: Everything the binary does goes through `api`; tests may reach into `core`.
//! Invariants: One `Table` handle owns one cursor; nothing here is shared across threads.
//! Invariants: Storage engines plug in through `core::store::RowStore`.
pub mod api;
pub mod core;

// Core modules: decoding, cursor, seeks, deletion, searches, and the reference store.
pub mod codepage;
pub mod column;
pub mod cursor;
pub mod deleted;
pub mod error;
pub mod expr;
pub mod field;
pub mod format;
pub mod index;
pub mod julian;
pub mod memory;
pub mod regex_search;
pub mod search;
pub mod store;
pub mod table;

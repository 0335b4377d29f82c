//! Purpose: Table handle lifecycle, header, field views, and cursor navigation.
//! Exports: `Table`, `OpenOptions`, `Header`, `FieldRef`.
//! Role: Aggregate owning the row store, per-column decoders, and the single cursor.
//! Invariants: A closed table owns no store; row-level calls report `NotOpen` before anything else.
//! Invariants: Each open gets a fresh session id; tags and expressions from older sessions are rejected.
//! Invariants: Scans restore the caller's cursor and ordering on drop, whatever the exit path.
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use time::{Date, OffsetDateTime};

use crate::core::codepage::Codepage;
use crate::core::column::{Column, Columns, FieldType};
use crate::core::cursor::{Cursor, Order, Position};
use crate::core::error::{Error, ErrorKind};
use crate::core::field::{Cell, Field, Value};
use crate::core::memory::MemoryStore;
use crate::core::store::RowStore;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpenOptions {
    /// Reject tables whose header record count disagrees with the rows present.
    pub verify_record_count: bool,
    /// Refuse delete, recall, and pack.
    pub read_only: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self {
            verify_record_count: true,
            read_only: false,
        }
    }

    pub fn with_verify_record_count(mut self, verify: bool) -> Self {
        self.verify_record_count = verify;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Table-level metadata captured at open.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub record_count: u32,
    /// Absent when the stored date is not a real calendar date.
    pub last_updated: Option<Date>,
    pub codepage: Codepage,
    pub has_index: bool,
    pub has_memo: bool,
}

pub(crate) struct OpenTable {
    pub(crate) store: Box<dyn RowStore>,
    pub(crate) session: u64,
    pub(crate) header: Header,
    pub(crate) fields: Vec<Field>,
    pub(crate) columns: Columns,
    pub(crate) cursor: Cursor,
}

impl OpenTable {
    pub(crate) fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    pub(crate) fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.columns.index_of(name).and_then(|idx| self.fields.get(idx))
    }
}

pub struct Table {
    path: Option<PathBuf>,
    options: OpenOptions,
    open: Option<OpenTable>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            path: None,
            options: OpenOptions::new(),
            open: None,
        }
    }
}

impl Table {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, OpenOptions::new())
    }

    pub fn with_options(path: impl Into<PathBuf>, options: OpenOptions) -> Self {
        Self {
            path: Some(path.into()),
            options,
            open: None,
        }
    }

    /// Opens a handle directly over an engine, with default options.
    pub fn from_store(store: Box<dyn RowStore>) -> Result<Self, Error> {
        let mut table = Self::default();
        table.open_store(store)?;
        Ok(table)
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn set_options(&mut self, options: OpenOptions) {
        self.options = options;
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.open.is_some()
    }

    pub fn open(&mut self) -> Result<(), Error> {
        if self.is_active() {
            return Err(already_open());
        }
        let path = self.path.clone().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("table has no path")
                .with_hint("Construct it with Table::new(path), or attach an engine with open_store.")
        })?;
        let store = MemoryStore::open(&path)?;
        self.open_store(Box::new(store))
            .map_err(|err| match err.path() {
                Some(_) => err,
                None => err.with_path(&path),
            })
    }

    pub fn open_store(&mut self, store: Box<dyn RowStore>) -> Result<(), Error> {
        if self.is_active() {
            return Err(already_open());
        }

        let meta = store.meta();
        let record_count = store.record_count();
        if self.options.verify_record_count {
            if let Some(declared) = meta.declared_record_count {
                if declared != record_count {
                    return Err(Error::new(ErrorKind::Consistency)
                        .with_message(format!(
                            "header declares {declared} records but the table holds {record_count}"
                        ))
                        .with_hint("The table may be truncated; reopen with record count verification off to inspect it."));
                }
            }
        }

        let columns: Vec<Column> = store.columns().to_vec();
        let fields = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| Field::new(column.clone(), idx))
            .collect();
        let session = NEXT_SESSION.fetch_add(1, AtomicOrdering::Relaxed);

        tracing::info!(
            path = ?self.path,
            records = record_count,
            columns = columns.len(),
            indexes = store.indexes().len(),
            "opened table"
        );

        self.open = Some(OpenTable {
            header: Header {
                record_count,
                last_updated: meta.last_updated,
                codepage: meta.codepage,
                has_index: meta.has_index,
                has_memo: meta.has_memo,
            },
            store,
            session,
            fields,
            columns: Columns::new(columns),
            cursor: Cursor::new(),
        });
        Ok(())
    }

    /// Flushes pending deletion flags and releases the engine. Closing a closed table is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(mut state) = self.open.take() else {
            return Ok(());
        };
        state.store.flush()?;
        tracing::info!(path = ?self.path, "closed table");
        Ok(())
    }

    pub fn header(&self) -> Result<&Header, Error> {
        Ok(&self.state()?.header)
    }

    pub fn record_count(&self) -> Result<u32, Error> {
        Ok(self.state()?.store.record_count())
    }

    /// Number of columns; 0 when closed.
    pub fn field_count(&self) -> usize {
        self.open.as_ref().map(|state| state.fields.len()).unwrap_or(0)
    }

    pub fn fields(&self) -> Result<&[Field], Error> {
        Ok(&self.state()?.fields)
    }

    pub fn columns(&self) -> Result<&Columns, Error> {
        Ok(&self.state()?.columns)
    }

    pub fn field(&self, idx: usize) -> Result<FieldRef<'_>, Error> {
        let state = self.state()?;
        let field = state.fields.get(idx).ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument).with_message(format!(
                "field index {idx} out of range (table has {} fields)",
                state.fields.len()
            ))
        })?;
        Ok(FieldRef { table: state, field })
    }

    pub fn field_by_name(&self, name: &str) -> Result<FieldRef<'_>, Error> {
        let state = self.state()?;
        let field = state
            .field_by_name(name)
            .ok_or_else(|| unknown_field(name))?;
        Ok(FieldRef { table: state, field })
    }

    pub fn first(&mut self) -> Result<(), Error> {
        let state = self.state_mut()?;
        state.cursor.first(state.store.as_ref())
    }

    pub fn last(&mut self) -> Result<(), Error> {
        let state = self.state_mut()?;
        state.cursor.last(state.store.as_ref())
    }

    pub fn next(&mut self) -> Result<(), Error> {
        self.skip(1)
    }

    pub fn previous(&mut self) -> Result<(), Error> {
        self.skip(-1)
    }

    pub fn skip(&mut self, count: i64) -> Result<(), Error> {
        let state = self.state_mut()?;
        state.cursor.skip(state.store.as_ref(), count)
    }

    /// Jumps to a 1-based physical record number regardless of the selected ordering.
    pub fn goto(&mut self, recno: i64) -> Result<(), Error> {
        let state = self.state_mut()?;
        state.cursor.goto(state.store.as_ref(), recno)
    }

    /// 1-based record number, or -1 when closed or not positioned.
    pub fn position(&self) -> i64 {
        self.recno().map(i64::from).unwrap_or(-1)
    }

    pub fn recno(&self) -> Option<u32> {
        self.open.as_ref().and_then(|state| state.cursor.recno())
    }

    pub fn is_bof(&self) -> bool {
        self.cursor_position() == Some(Position::Bof)
    }

    pub fn is_eof(&self) -> bool {
        self.cursor_position() == Some(Position::Eof)
    }

    fn cursor_position(&self) -> Option<Position> {
        self.open.as_ref().map(|state| state.cursor.position())
    }

    pub(crate) fn state(&self) -> Result<&OpenTable, Error> {
        self.open.as_ref().ok_or_else(Error::not_open)
    }

    pub(crate) fn state_mut(&mut self) -> Result<&mut OpenTable, Error> {
        self.open.as_mut().ok_or_else(Error::not_open)
    }

    pub(crate) fn check_writable(&self) -> Result<(), Error> {
        if self.options.read_only {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("table is open read-only")
                .with_hint("Reopen without the read-only option to modify deletion flags."));
        }
        Ok(())
    }

    pub(crate) fn session(&self) -> Option<u64> {
        self.open.as_ref().map(|state| state.session)
    }

    /// Visits every row in physical order; the cursor and ordering are restored afterwards.
    pub(crate) fn scan_physical<E, F>(&mut self, mut visit: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&mut Table, u32) -> Result<(), E>,
    {
        let mut guard = ScanGuard::physical(self)?;
        guard.first()?;
        while let Some(recno) = guard.recno() {
            visit(&mut *guard, recno)?;
            guard.next()?;
        }
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if let Some(mut state) = self.open.take() {
            if let Err(err) = state.store.flush() {
                tracing::warn!(error = %err, "failed to flush table on drop");
            }
        }
    }
}

fn already_open() -> Error {
    Error::new(ErrorKind::AlreadyOpen)
        .with_message("table already open")
        .with_hint("Close the table before opening it again.")
}

pub(crate) fn unknown_field(name: &str) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("field {name:?} not found"))
}

/// Borrowed view of one column at the table's current row.
pub struct FieldRef<'t> {
    table: &'t OpenTable,
    field: &'t Field,
}

impl<'t> FieldRef<'t> {
    pub fn field(&self) -> &'t Field {
        self.field
    }

    pub fn name(&self) -> &'t str {
        self.field.name()
    }

    pub fn field_type(&self) -> FieldType {
        self.field.field_type()
    }

    fn cell(&self) -> Result<Cell<'t>, Error> {
        let recno = self.table.cursor.require_row()?;
        self.field.cell(self.table.store(), recno)
    }

    pub fn value(&self) -> Result<Value, Error> {
        self.cell()?.value()
    }

    pub fn as_string(&self) -> Result<String, Error> {
        self.cell()?.as_string()
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        self.cell()?.as_int()
    }

    pub fn as_float(&self) -> Result<f64, Error> {
        self.cell()?.as_float()
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        self.cell()?.as_bool()
    }

    pub fn as_time(&self) -> Result<Option<OffsetDateTime>, Error> {
        self.cell()?.as_time()
    }

    pub fn as_cents(&self) -> Result<i64, Error> {
        self.cell()?.as_cents()
    }

    pub fn raw(&self) -> Result<Vec<u8>, Error> {
        Ok(self.cell()?.raw().to_vec())
    }

    pub fn is_null(&self) -> Result<bool, Error> {
        let recno = self.table.cursor.require_row()?;
        self.table.store().is_null(recno, self.field.position())
    }
}

/// Saves the cursor on creation and puts it back on drop.
pub(crate) struct ScanGuard<'t> {
    table: &'t mut Table,
    saved: Cursor,
    restore_position: bool,
}

impl<'t> ScanGuard<'t> {
    /// Restores both position and ordering.
    pub(crate) fn new(table: &'t mut Table) -> Result<Self, Error> {
        let saved = table.state()?.cursor;
        Ok(Self {
            table,
            saved,
            restore_position: true,
        })
    }

    /// Restores both, and switches to physical order for the scan.
    pub(crate) fn physical(table: &'t mut Table) -> Result<Self, Error> {
        let mut guard = Self::new(table)?;
        guard.state_mut()?.cursor.set_order(Order::Physical);
        Ok(guard)
    }

    /// Restores the ordering only; the position the scan reached is kept.
    pub(crate) fn order_only(table: &'t mut Table) -> Result<Self, Error> {
        let mut guard = Self::new(table)?;
        guard.restore_position = false;
        Ok(guard)
    }
}

impl Deref for ScanGuard<'_> {
    type Target = Table;

    fn deref(&self) -> &Table {
        self.table
    }
}

impl DerefMut for ScanGuard<'_> {
    fn deref_mut(&mut self) -> &mut Table {
        self.table
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        let Some(state) = self.table.open.as_mut() else {
            tracing::warn!("table closed during scan; cursor not restored");
            return;
        };
        state.cursor.set_order(self.saved.order());
        if !self.restore_position {
            return;
        }
        let position = match self.saved.position() {
            Position::Row(recno) if recno > state.store.record_count() => {
                tracing::warn!(recno, "saved row no longer exists; cursor left at EOF");
                Position::Eof
            }
            position => position,
        };
        state.cursor.set_position(position);
    }
}

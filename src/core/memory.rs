//! Purpose: In-memory `RowStore` built from a JSON table fixture.
//! Exports: `MemoryStore`, `Fixture`, `FixtureRow`.
//! Role: Reference engine backing the CLI and tests; encodes fixture values into DBF cell bytes.
//! Invariants: Index entries are ordered by key, then by record number.
//! Invariants: A unique index holding duplicate keys is marked violated and refuses seeks.
//! Invariants: Only deletion flags and pack results are ever written back to a fixture file.
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::core::codepage::Codepage;
use crate::core::column::{Column, FieldType};
use crate::core::error::{Error, ErrorKind};
use crate::core::field::format_number;
use crate::core::format::{FIXTURE_FORMAT_VERSION, check_fixture_version};
use crate::core::julian::ymd_to_julian;
use crate::core::store::{IndexSpec, RowStore, SeekHit, SeekKey, TableMeta};

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default = "default_format")]
    pub format: u32,
    #[serde(default = "default_codepage")]
    pub codepage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Record count the header claims; lets tests model a damaged header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_record_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_memo: Option<bool>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<FixtureRow>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

fn default_format() -> u32 {
    FIXTURE_FORMAT_VERSION
}

fn default_codepage() -> u8 {
    0x03
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixtureRow {
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nulls: Vec<String>,
}

#[derive(Debug)]
struct StoredRow {
    deleted: bool,
    cells: Vec<Vec<u8>>,
    memos: Vec<Option<String>>,
    nulls: Vec<bool>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum KeyKind {
    Bytes,
    Number,
}

#[derive(Debug)]
struct BuiltIndex {
    kind: KeyKind,
    violated: bool,
    recnos: Vec<u32>,
    keys: Vec<Vec<u8>>,
    numbers: Vec<f64>,
    // positions[recno - 1] is the entry position of that record.
    positions: Vec<usize>,
}

#[derive(Debug)]
pub struct MemoryStore {
    fixture: Fixture,
    meta: TableMeta,
    rows: Vec<StoredRow>,
    index_columns: Vec<usize>,
    indexes: Vec<BuiltIndex>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl MemoryStore {
    /// Loads a fixture file; `flush` writes deletion changes back to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| io_error(err, path, "failed to read table"))?;
        let fixture: Fixture = serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message("invalid table fixture")
                .with_path(path)
                .with_source(err)
        })?;
        let mut store = Self::from_fixture(fixture).map_err(|err| match err.path() {
            Some(_) => err,
            None => err.with_path(path),
        })?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn from_value(value: Value) -> Result<Self, Error> {
        let fixture: Fixture = serde_json::from_value(value).map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message("invalid table fixture")
                .with_source(err)
        })?;
        Self::from_fixture(fixture)
    }

    pub fn from_fixture(fixture: Fixture) -> Result<Self, Error> {
        check_fixture_version(fixture.format)?;

        let mut seen = HashSet::new();
        for column in &fixture.columns {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(fixture_error(format!(
                    "duplicate column name {:?}",
                    column.name
                )));
            }
        }

        let rows = fixture
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| encode_row(&fixture.columns, row, idx as u32 + 1))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index_names = HashSet::new();
        let mut index_columns = Vec::with_capacity(fixture.indexes.len());
        for spec in &fixture.indexes {
            if !index_names.insert(spec.name.to_ascii_lowercase()) {
                return Err(fixture_error(format!("duplicate index name {:?}", spec.name)));
            }
            let column = column_position(&fixture.columns, &spec.column).ok_or_else(|| {
                fixture_error(format!(
                    "index {:?} names unknown column {:?}",
                    spec.name, spec.column
                ))
            })?;
            index_columns.push(column);
        }

        let meta = build_meta(&fixture);
        let mut store = Self {
            fixture,
            meta,
            rows,
            index_columns,
            indexes: Vec::new(),
            path: None,
            dirty: false,
        };
        store.rebuild_indexes();
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    fn rebuild_indexes(&mut self) {
        self.indexes = self
            .fixture
            .indexes
            .iter()
            .zip(self.index_columns.iter())
            .map(|(spec, column)| build_index(spec, &self.fixture.columns[*column], *column, &self.rows))
            .collect();
    }

    fn row(&self, recno: u32) -> Result<&StoredRow, Error> {
        let len = self.rows.len();
        recno
            .checked_sub(1)
            .and_then(|idx| self.rows.get(idx as usize))
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("record {recno} out of range (1..={len})"))
                    .with_recno(recno)
            })
    }

    fn check_column(&self, column: usize) -> Result<(), Error> {
        if column < self.fixture.columns.len() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("column {column} out of range")))
        }
    }

    fn index(&self, slot: usize) -> Result<&BuiltIndex, Error> {
        self.indexes.get(slot).ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument).with_message(format!("index slot {slot} out of range"))
        })
    }
}

impl RowStore for MemoryStore {
    fn meta(&self) -> TableMeta {
        self.meta.clone()
    }

    fn columns(&self) -> &[Column] {
        &self.fixture.columns
    }

    fn record_count(&self) -> u32 {
        self.rows.len() as u32
    }

    fn raw(&self, recno: u32, column: usize) -> Result<&[u8], Error> {
        self.check_column(column)?;
        Ok(self.row(recno)?.cells[column].as_slice())
    }

    fn memo(&self, recno: u32, column: usize) -> Result<String, Error> {
        self.check_column(column)?;
        Ok(self.row(recno)?.memos[column].clone().unwrap_or_default())
    }

    fn is_null(&self, recno: u32, column: usize) -> Result<bool, Error> {
        self.check_column(column)?;
        Ok(self.row(recno)?.nulls[column])
    }

    fn is_deleted(&self, recno: u32) -> Result<bool, Error> {
        Ok(self.row(recno)?.deleted)
    }

    fn set_deleted(&mut self, recno: u32, deleted: bool) -> Result<(), Error> {
        self.row(recno)?;
        let idx = recno as usize - 1;
        if self.rows[idx].deleted != deleted {
            self.rows[idx].deleted = deleted;
            self.fixture.rows[idx].deleted = deleted;
            self.dirty = true;
        }
        Ok(())
    }

    fn pack(&mut self) -> Result<u32, Error> {
        let before = self.rows.len();
        self.rows.retain(|row| !row.deleted);
        self.fixture.rows.retain(|row| !row.deleted);
        let removed = (before - self.rows.len()) as u32;
        if self.fixture.header_record_count.is_some() {
            self.fixture.header_record_count = Some(self.rows.len() as u32);
            self.meta.declared_record_count = self.fixture.header_record_count;
        }
        self.rebuild_indexes();
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn indexes(&self) -> &[IndexSpec] {
        &self.fixture.indexes
    }

    fn index_len(&self, slot: usize) -> Result<usize, Error> {
        Ok(self.index(slot)?.recnos.len())
    }

    fn index_entry(&self, slot: usize, pos: usize) -> Result<u32, Error> {
        let index = self.index(slot)?;
        index.recnos.get(pos).copied().ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("index position {pos} out of range"))
        })
    }

    fn index_position_of(&self, slot: usize, recno: u32) -> Result<Option<usize>, Error> {
        let index = self.index(slot)?;
        Ok(recno
            .checked_sub(1)
            .and_then(|idx| index.positions.get(idx as usize))
            .copied())
    }

    fn index_key(&self, slot: usize, pos: usize) -> Result<&[u8], Error> {
        let index = self.index(slot)?;
        index.keys.get(pos).map(Vec::as_slice).ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("index position {pos} out of range"))
        })
    }

    fn index_seek(&self, slot: usize, key: SeekKey<'_>) -> Result<SeekHit, Error> {
        let index = self.index(slot)?;
        let name = &self.fixture.indexes[slot].name;
        if index.violated {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("unique index {name:?} holds duplicate keys")));
        }

        let (pos, exact) = match (index.kind, key) {
            (KeyKind::Bytes, SeekKey::Text(text)) => {
                let needle = text.as_bytes();
                let pos = index
                    .keys
                    .partition_point(|key| compare_prefix(key, needle) == Ordering::Less);
                let exact = index
                    .keys
                    .get(pos)
                    .is_some_and(|key| compare_prefix(key, needle) == Ordering::Equal);
                (pos, exact)
            }
            (KeyKind::Bytes, SeekKey::Number(_)) => {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("index {name:?} has character keys; use a text key")));
            }
            (KeyKind::Number, SeekKey::Number(value)) => number_bound(&index.numbers, value),
            (KeyKind::Number, SeekKey::Text(text)) => {
                let value = text.trim().parse::<f64>().map_err(|_| {
                    Error::new(ErrorKind::InvalidArgument).with_message(format!(
                        "index {name:?} has numeric keys; {text:?} is not a number"
                    ))
                })?;
                number_bound(&index.numbers, value)
            }
        };

        Ok(if exact {
            SeekHit::Exact(pos)
        } else if pos < index.recnos.len() {
            SeekHit::After(pos)
        } else {
            SeekHit::End
        })
    }

    fn index_key_matches(&self, slot: usize, pos: usize, key: SeekKey<'_>) -> Result<bool, Error> {
        let index = self.index(slot)?;
        if pos >= index.recnos.len() {
            return Ok(false);
        }
        match (index.kind, key) {
            (KeyKind::Bytes, SeekKey::Text(text)) => {
                Ok(compare_prefix(&index.keys[pos], text.as_bytes()) == Ordering::Equal)
            }
            (KeyKind::Number, SeekKey::Number(value)) => Ok(index.numbers[pos] == value),
            (KeyKind::Number, SeekKey::Text(text)) => {
                Ok(text.trim().parse::<f64>().is_ok_and(|value| index.numbers[pos] == value))
            }
            (KeyKind::Bytes, SeekKey::Number(_)) => Ok(false),
        }
    }

    fn flush(&mut self) -> Result<(), Error> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&self.fixture).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode table fixture")
                .with_source(err)
        })?;
        write_locked(path, &bytes)?;
        tracing::debug!(path = %path.display(), "flushed table fixture");
        self.dirty = false;
        Ok(())
    }
}

fn build_meta(fixture: &Fixture) -> TableMeta {
    TableMeta {
        declared_record_count: fixture.header_record_count,
        last_updated: fixture.last_updated.as_deref().and_then(parse_header_date),
        codepage: Codepage(fixture.codepage),
        has_index: fixture.has_index.unwrap_or(!fixture.indexes.is_empty()),
        has_memo: fixture.has_memo.unwrap_or_else(|| {
            fixture
                .columns
                .iter()
                .any(|column| column.field_type == FieldType::Memo)
        }),
    }
}

fn parse_header_date(text: &str) -> Option<Date> {
    let dashed = format_description!("[year]-[month]-[day]");
    let compact = format_description!("[year][month][day]");
    Date::parse(text, dashed)
        .or_else(|_| Date::parse(text, compact))
        .ok()
}

fn column_position(columns: &[Column], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|column| column.name.eq_ignore_ascii_case(name))
}

fn fixture_error(message: String) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!("invalid table fixture: {message}"))
}

struct WriteLock<'a> {
    file: &'a File,
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

/// Rewrites the fixture under an exclusive advisory lock; a held lock is `Busy`.
fn write_locked(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|err| io_error(err, path, "failed to open table for writing"))?;
    file.try_lock_exclusive().map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::WouldBlock {
            ErrorKind::Busy
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to lock table for writing")
            .with_hint("Another process may be writing the table; retry once it finishes.")
            .with_path(path)
            .with_source(err)
    })?;
    let _lock = WriteLock { file: &file };
    let mut writer = &file;
    file.set_len(0)
        .and_then(|()| writer.write_all(bytes))
        .and_then(|()| writer.flush())
        .map_err(|err| io_error(err, path, "failed to write table"))
}

fn io_error(err: io::Error, path: &Path, message: &str) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        _ => ErrorKind::Io,
    };
    Error::new(kind)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

fn encode_row(columns: &[Column], row: &FixtureRow, recno: u32) -> Result<StoredRow, Error> {
    for name in row.values.keys().chain(row.nulls.iter()) {
        if column_position(columns, name).is_none() {
            return Err(fixture_error(format!("row {recno} names unknown column {name:?}")));
        }
    }

    let mut cells = Vec::with_capacity(columns.len());
    let mut memos = Vec::with_capacity(columns.len());
    let mut nulls = Vec::with_capacity(columns.len());
    for column in columns {
        let value = row
            .values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column.name))
            .map(|(_, value)| value);
        let (cell, memo) = encode_cell(column, value, recno).map_err(|err| err.with_recno(recno))?;
        cells.push(cell);
        memos.push(memo);
        nulls.push(
            row.nulls
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&column.name)),
        );
    }

    Ok(StoredRow {
        deleted: row.deleted,
        cells,
        memos,
        nulls,
    })
}

fn encode_cell(
    column: &Column,
    value: Option<&Value>,
    recno: u32,
) -> Result<(Vec<u8>, Option<String>), Error> {
    let value = value.unwrap_or(&Value::Null);
    if let Some(hex) = value.get("hex").and_then(Value::as_str) {
        return Ok((decode_hex(hex).map_err(|msg| cell_error(column, msg))?, None));
    }

    let width = column.width as usize;
    let cell = match column.field_type {
        FieldType::Numeric | FieldType::Float => match value {
            Value::Null => vec![b' '; width],
            Value::Number(number) => {
                let number = number.as_f64().unwrap_or_default();
                right_align(&format_number(number, column.decimals), width)
            }
            Value::String(text) => right_align(text, width),
            other => return Err(cell_error(column, format!("cannot store {other} as a number"))),
        },
        FieldType::Integer => {
            let number = match value {
                Value::Null => 0,
                Value::Number(number) => number
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(|| cell_error(column, format!("{number} is not a 32-bit integer")))?,
                Value::String(text) => text
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| cell_error(column, format!("{text:?} is not a 32-bit integer")))?,
                other => return Err(cell_error(column, format!("cannot store {other} as an integer"))),
            };
            number.to_le_bytes().to_vec()
        }
        FieldType::Currency => {
            let number = fixture_f64(column, value)?;
            ((number * 10_000.0).round() as i64).to_le_bytes().to_vec()
        }
        FieldType::Double => fixture_f64(column, value)?.to_le_bytes().to_vec(),
        FieldType::Logical => {
            let flag = match value {
                Value::Bool(true) => b'T',
                Value::Bool(false) => b'F',
                Value::String(text) => text.bytes().next().unwrap_or(b' '),
                Value::Null => b' ',
                other => return Err(cell_error(column, format!("cannot store {other} as a logical"))),
            };
            let mut cell = vec![b' '; width.max(1)];
            cell[0] = flag;
            cell
        }
        FieldType::Date => {
            let text = value_text(value);
            let bytes = text.as_bytes();
            let text = if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
                text.replace('-', "")
            } else {
                text
            };
            pad_text(&text, if width == 0 { 8 } else { width })
        }
        FieldType::DateTime if width == 8 => encode_datetime(column, value)?,
        FieldType::Memo => {
            let text = value_text(value);
            let block = if text.is_empty() { 0 } else { recno };
            let cell = if width == 4 {
                block.to_le_bytes().to_vec()
            } else if block == 0 {
                vec![b' '; width]
            } else {
                right_align(&block.to_string(), width)
            };
            return Ok((cell, Some(text)));
        }
        _ => pad_text(&value_text(value), width),
    };
    Ok((cell, None))
}

fn encode_datetime(column: &Column, value: &Value) -> Result<Vec<u8>, Error> {
    let text = value_text(value);
    if text.trim().is_empty() {
        return Ok(vec![0; 8]);
    }
    let stamp = parse_fixture_datetime(text.trim())
        .ok_or_else(|| cell_error(column, format!("{text:?} is not a datetime")))?;
    let julian = ymd_to_julian(stamp.year(), u8::from(stamp.month()) as i32, stamp.day() as i32);
    let millis = (stamp.hour() as u32 * 3600 + stamp.minute() as u32 * 60 + stamp.second() as u32)
        * 1000
        + stamp.millisecond() as u32;
    let mut cell = Vec::with_capacity(8);
    cell.extend_from_slice(&(julian as u32).to_le_bytes());
    cell.extend_from_slice(&millis.to_le_bytes());
    Ok(cell)
}

fn parse_fixture_datetime(text: &str) -> Option<PrimitiveDateTime> {
    let with_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let plain = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let date_only = format_description!("[year]-[month]-[day]");
    PrimitiveDateTime::parse(text, with_fraction)
        .or_else(|_| PrimitiveDateTime::parse(text, plain))
        .or_else(|_| PrimitiveDateTime::parse(text, spaced))
        .ok()
        .or_else(|| {
            OffsetDateTime::parse(text, &Rfc3339)
                .ok()
                .map(|stamp| stamp.to_offset(UtcOffset::UTC))
                .map(|stamp| PrimitiveDateTime::new(stamp.date(), stamp.time()))
        })
        .or_else(|| Date::parse(text, date_only).ok().map(|date| date.midnight()))
}

fn fixture_f64(column: &Column, value: &Value) -> Result<f64, Error> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(number) => Ok(number.as_f64().unwrap_or_default()),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| cell_error(column, format!("{text:?} is not a number"))),
        other => Err(cell_error(column, format!("cannot store {other} as a number"))),
    }
}

fn cell_error(column: &Column, message: String) -> Error {
    fixture_error(format!("column {:?}: {message}", column.name))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(true) => "T".to_string(),
        Value::Bool(false) => "F".to_string(),
        other => other.to_string(),
    }
}

fn pad_text(text: &str, width: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    if width > 0 {
        bytes.truncate(width);
        bytes.resize(width, b' ');
    }
    bytes
}

fn right_align(text: &str, width: usize) -> Vec<u8> {
    format!("{text:>width$}").into_bytes()
}

fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("hex value {text:?} has an odd number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let high = (pair[0] as char).to_digit(16);
            let low = (pair[1] as char).to_digit(16);
            match (high, low) {
                (Some(high), Some(low)) => Ok((high * 16 + low) as u8),
                _ => Err(format!("hex value {text:?} has a non-hex digit")),
            }
        })
        .collect()
}

fn key_kind(column: &Column) -> KeyKind {
    if column.field_type.is_numeric() || (column.field_type == FieldType::DateTime && column.width == 8) {
        KeyKind::Number
    } else {
        KeyKind::Bytes
    }
}

fn numeric_key(field_type: FieldType, raw: &[u8]) -> f64 {
    fn fixed<const N: usize>(raw: &[u8]) -> Option<[u8; N]> {
        raw.get(..N).and_then(|bytes| bytes.try_into().ok())
    }
    let key = match field_type {
        FieldType::Integer => fixed::<4>(raw).map(|b| i32::from_le_bytes(b) as f64),
        FieldType::Currency => fixed::<8>(raw).map(|b| i64::from_le_bytes(b) as f64 / 10_000.0),
        FieldType::Double => fixed::<8>(raw).map(f64::from_le_bytes),
        FieldType::DateTime => fixed::<8>(raw).map(|b| {
            let day = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64;
            let ms = u32::from_le_bytes([b[4], b[5], b[6], b[7]]) as f64;
            day * MS_PER_DAY + ms
        }),
        _ => {
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            if text.is_empty() {
                Some(0.0)
            } else {
                text.parse::<f64>().ok()
            }
        }
    };
    key.unwrap_or(f64::NAN)
}

fn build_index(spec: &IndexSpec, column: &Column, column_idx: usize, rows: &[StoredRow]) -> BuiltIndex {
    let kind = key_kind(column);
    let mut entries: Vec<(u32, &[u8], f64)> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let raw = row.cells[column_idx].as_slice();
            let number = match kind {
                KeyKind::Number => numeric_key(column.field_type, raw),
                KeyKind::Bytes => 0.0,
            };
            (idx as u32 + 1, raw, number)
        })
        .collect();
    entries.sort_by(|a, b| {
        let by_key = match kind {
            KeyKind::Bytes => a.1.cmp(b.1),
            KeyKind::Number => a.2.total_cmp(&b.2),
        };
        by_key.then(a.0.cmp(&b.0))
    });

    let violated = spec.unique
        && entries.windows(2).any(|pair| match kind {
            KeyKind::Bytes => pair[0].1 == pair[1].1,
            KeyKind::Number => pair[0].2 == pair[1].2,
        });
    if violated {
        tracing::debug!(index = %spec.name, "unique index holds duplicate keys");
    }

    let mut positions = vec![0; rows.len()];
    for (pos, (recno, _, _)) in entries.iter().enumerate() {
        positions[*recno as usize - 1] = pos;
    }

    BuiltIndex {
        kind,
        violated,
        recnos: entries.iter().map(|entry| entry.0).collect(),
        keys: entries.iter().map(|entry| entry.1.to_vec()).collect(),
        numbers: entries.iter().map(|entry| entry.2).collect(),
        positions,
    }
}

// Compares a key against a search key over the search key's length; short keys pad with blanks.
fn compare_prefix(key: &[u8], needle: &[u8]) -> Ordering {
    for (idx, want) in needle.iter().enumerate() {
        let have = key.get(idx).copied().unwrap_or(b' ');
        match have.cmp(want) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn number_bound(numbers: &[f64], value: f64) -> (usize, bool) {
    let pos = numbers.partition_point(|n| *n < value);
    let exact = numbers.get(pos).is_some_and(|n| *n == value);
    (pos, exact)
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::core::error::ErrorKind;
    use crate::core::store::{RowStore, SeekHit, SeekKey};
    use serde_json::json;

    fn people() -> MemoryStore {
        MemoryStore::from_value(json!({
            "last_updated": "2024-02-30",
            "columns": [
                {"name": "NAME", "type": "C", "width": 8},
                {"name": "AGE", "type": "N", "width": 3},
                {"name": "BORN", "type": "D", "width": 8},
                {"name": "NOTES", "type": "M", "width": 4},
                {"name": "SEEN", "type": "T", "width": 8}
            ],
            "rows": [
                {"values": {"NAME": "Carol", "AGE": 41, "BORN": "1983-04-05", "NOTES": "likes tea"}},
                {"values": {"name": "Alice", "age": 9, "SEEN": "2024-01-02T03:04:05.678"}, "nulls": ["born"]},
                {"deleted": true, "values": {"NAME": "Bob", "AGE": 130}}
            ],
            "indexes": [
                {"name": "NAME", "column": "NAME"},
                {"name": "AGE", "column": "age", "unique": true}
            ]
        }))
        .expect("fixture")
    }

    #[test]
    fn encodes_cells_in_dbf_layout() {
        let store = people();
        assert_eq!(store.record_count(), 3);
        assert_eq!(store.raw(1, 0).expect("name"), b"Carol   ");
        assert_eq!(store.raw(1, 1).expect("age"), b" 41");
        assert_eq!(store.raw(1, 2).expect("born"), b"19830405");
        assert_eq!(store.raw(2, 2).expect("blank born"), b"        ");
        assert!(store.is_null(2, 2).expect("null"));
        assert!(!store.is_null(1, 2).expect("not null"));
        assert_eq!(store.memo(1, 3).expect("memo"), "likes tea");
        assert_eq!(store.raw(1, 4).expect("zero stamp"), &[0u8; 8]);

        let seen = store.raw(2, 4).expect("stamp");
        let day = u32::from_le_bytes([seen[0], seen[1], seen[2], seen[3]]);
        let ms = u32::from_le_bytes([seen[4], seen[5], seen[6], seen[7]]);
        assert_eq!(day, 2_460_312);
        assert_eq!(ms, (3 * 3600 + 4 * 60 + 5) * 1000 + 678);
        assert!(store.is_deleted(3).expect("deleted"));
        assert!(store.meta().last_updated.is_none());
        assert!(store.meta().has_memo);
    }

    #[test]
    fn index_orders_by_key_and_seeks_by_prefix() {
        let store = people();
        let order: Vec<u32> = (0..3).map(|pos| store.index_entry(0, pos).expect("entry")).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(store.index_position_of(0, 1).expect("pos"), Some(2));
        assert_eq!(store.index_seek(0, SeekKey::Text("Bo")).expect("seek"), SeekHit::Exact(1));
        assert_eq!(store.index_seek(0, SeekKey::Text("Bz")).expect("seek"), SeekHit::After(2));
        assert_eq!(store.index_seek(0, SeekKey::Text("Zed")).expect("seek"), SeekHit::End);
        let err = store.index_seek(0, SeekKey::Number(1.0)).expect_err("numeric on text");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let ages: Vec<u32> = (0..3).map(|pos| store.index_entry(1, pos).expect("entry")).collect();
        assert_eq!(ages, vec![2, 1, 3]);
        assert_eq!(store.index_seek(1, SeekKey::Number(41.0)).expect("seek"), SeekHit::Exact(1));
        assert_eq!(store.index_seek(1, SeekKey::Text(" 100")).expect("seek"), SeekHit::After(2));
    }

    #[test]
    fn duplicate_keys_violate_unique_index() {
        let store = MemoryStore::from_value(json!({
            "columns": [{"name": "CODE", "type": "C", "width": 2}],
            "rows": [{"values": {"CODE": "A"}}, {"values": {"CODE": "A"}}],
            "indexes": [{"name": "CODE", "column": "CODE", "unique": true}]
        }))
        .expect("fixture");
        let err = store.index_seek(0, SeekKey::Text("A")).expect_err("violated");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn numeric_cells_encode_like_the_decoder_renders() {
        let store = MemoryStore::from_value(json!({
            "columns": [
                {"name": "BIG", "type": "N", "width": 20},
                {"name": "PRICE", "type": "N", "width": 8, "decimals": 2}
            ],
            "rows": [{"values": {"BIG": 1e16, "PRICE": 3.5}}]
        }))
        .expect("fixture");
        let big = format!("{:>20}", crate::core::field::format_number(1e16, 0));
        assert_eq!(store.raw(1, 0).expect("big"), big.as_bytes());
        assert_eq!(store.raw(1, 0).expect("big"), b"   10000000000000000");
        assert_eq!(store.raw(1, 1).expect("price"), b"    3.50");
    }

    #[test]
    fn pack_drops_flagged_rows_and_rebuilds() {
        let mut store = people();
        store.set_deleted(1, true).expect("flag");
        assert_eq!(store.pack().expect("pack"), 2);
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.raw(1, 0).expect("survivor"), b"Alice   ");
        assert_eq!(store.index_len(0).expect("len"), 1);
        assert_eq!(store.fixture().rows.len(), 1);
    }

    #[test]
    fn flush_reports_a_held_lock_as_busy() {
        use fs2::FileExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!({
                "columns": [{"name": "ID", "type": "I", "width": 4}],
                "rows": [{"values": {"ID": 1}}]
            }))
            .expect("encode"),
        )
        .expect("write");

        let mut store = MemoryStore::open(&path).expect("open");
        store.set_deleted(1, true).expect("flag");
        let holder = std::fs::File::open(&path).expect("holder");
        holder.lock_exclusive().expect("lock");
        let err = store.flush().expect_err("locked");
        assert_eq!(err.kind(), ErrorKind::Busy);

        FileExt::unlock(&holder).expect("unlock");
        store.flush().expect("flush after unlock");
        assert!(MemoryStore::open(&path).expect("reopen").is_deleted(1).expect("flag"));
    }

    #[test]
    fn flush_writes_deletion_flags_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!({
                "columns": [{"name": "ID", "type": "I", "width": 4}],
                "rows": [{"values": {"ID": 1}}, {"values": {"ID": 2}}]
            }))
            .expect("encode"),
        )
        .expect("write");

        let mut store = MemoryStore::open(&path).expect("open");
        store.set_deleted(2, true).expect("flag");
        store.flush().expect("flush");

        let reopened = MemoryStore::open(&path).expect("reopen");
        assert!(reopened.is_deleted(2).expect("flag"));
        assert!(!reopened.is_deleted(1).expect("flag"));
    }

    #[test]
    fn bad_fixtures_are_rejected() {
        let err = MemoryStore::from_value(json!({
            "columns": [{"name": "A", "type": "C", "width": 1}],
            "rows": [{"values": {"B": "x"}}]
        }))
        .expect_err("unknown column");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = MemoryStore::from_value(json!({"format": 7, "columns": []}))
            .expect_err("format");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = MemoryStore::open("/definitely/not/here.json").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let store = MemoryStore::from_value(json!({
            "columns": [{"name": "RAW", "type": "C", "width": 2}],
            "rows": [{"values": {"RAW": {"hex": "00 41"}}}]
        }))
        .expect("hex");
        assert_eq!(store.raw(1, 0).expect("raw"), &[0x00, 0x41]);
    }
}

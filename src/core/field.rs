//! Purpose: Per-column decode strategies turning raw cell bytes into typed values.
//! Exports: `Field`, `Value`, `Cell`.
//! Role: Resolved once per column at open; readers dispatch on the cached `Decoder`.
//! Invariants: Blank dates and zero datetimes decode to `None`, never an error.
//! Invariants: Conversion failures name the column type, the target, and the value.
//! Invariants: Null detection is separate; decoders never consult the null flag.
use serde::Serialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::core::column::{Column, FieldType};
use crate::core::error::{Error, conversion_error};
use crate::core::julian::{julian_to_date, ymd_to_julian};
use crate::core::store::RowStore;

/// Decoded native value of a cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Date(Option<Date>),
    DateTime(Option<OffsetDateTime>),
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(text) => serializer.serialize_str(text),
            Value::Number(number) => serializer.serialize_f64(*number),
            Value::Integer(number) => serializer.serialize_i64(*number),
            Value::Bool(flag) => serializer.serialize_bool(*flag),
            Value::Date(Some(date)) => {
                let format = format_description!("[year]-[month]-[day]");
                let text = date.format(format).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            Value::DateTime(Some(stamp)) => {
                let text = stamp.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            Value::Date(None) | Value::DateTime(None) => serializer.serialize_none(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Decoder {
    Character,
    Numeric,
    Integer,
    Currency,
    Double,
    Logical,
    Date,
    DateTime,
    Memo,
}

impl Decoder {
    fn for_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Numeric | FieldType::Float => Decoder::Numeric,
            FieldType::Integer => Decoder::Integer,
            FieldType::Currency => Decoder::Currency,
            FieldType::Double => Decoder::Double,
            FieldType::Logical => Decoder::Logical,
            FieldType::Date => Decoder::Date,
            FieldType::DateTime => Decoder::DateTime,
            FieldType::Memo => Decoder::Memo,
            _ => Decoder::Character,
        }
    }
}

/// A column paired with its decode strategy.
#[derive(Clone, Debug)]
pub struct Field {
    column: Column,
    position: usize,
    decoder: Decoder,
}

impl Field {
    pub(crate) fn new(column: Column, position: usize) -> Self {
        let decoder = Decoder::for_type(column.field_type);
        Self {
            column,
            position,
            decoder,
        }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }

    pub fn field_type(&self) -> FieldType {
        self.column.field_type
    }

    /// Zero-based position in the column list.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Reads the cell at `recno` without consulting any cursor.
    pub(crate) fn cell<'a>(&'a self, store: &'a dyn RowStore, recno: u32) -> Result<Cell<'a>, Error> {
        let raw = store.raw(recno, self.position)?;
        let memo = match self.decoder {
            Decoder::Memo => Some(store.memo(recno, self.position)?),
            _ => None,
        };
        Ok(Cell {
            field: self,
            raw,
            memo,
        })
    }
}

/// One decoded-on-demand cell.
#[derive(Debug)]
pub struct Cell<'a> {
    field: &'a Field,
    raw: &'a [u8],
    memo: Option<String>,
}

impl Cell<'_> {
    pub fn raw(&self) -> &[u8] {
        self.raw
    }

    fn type_name(&self) -> &'static str {
        self.field.column.field_type.name()
    }

    fn convert_err(&self, to: &str, value: &str) -> Error {
        conversion_error(self.type_name(), to, Some(value))
    }

    /// Text with surrounding blanks and NULs removed.
    fn trimmed(&self) -> String {
        String::from_utf8_lossy(self.raw)
            .trim_matches(is_pad)
            .to_string()
    }

    fn is_blank(&self) -> bool {
        self.raw.iter().all(|b| *b == b' ' || *b == 0)
    }

    pub fn value(&self) -> Result<Value, Error> {
        match self.field.decoder {
            Decoder::Character => Ok(Value::Text(self.trimmed())),
            Decoder::Memo => Ok(Value::Text(self.memo_text())),
            Decoder::Numeric | Decoder::Currency | Decoder::Double => {
                Ok(Value::Number(self.as_float()?))
            }
            Decoder::Integer => Ok(Value::Integer(self.as_int()?)),
            Decoder::Logical => Ok(Value::Bool(self.logical())),
            Decoder::Date => Ok(Value::Date(self.date()?)),
            Decoder::DateTime => Ok(Value::DateTime(self.datetime()?)),
        }
    }

    pub fn as_string(&self) -> Result<String, Error> {
        match self.field.decoder {
            Decoder::Character => Ok(self.trimmed()),
            Decoder::Memo => Ok(self.memo_text()),
            Decoder::Numeric | Decoder::Double => {
                Ok(format_number(self.as_float()?, self.field.column.decimals))
            }
            Decoder::Currency => Ok(format!("{:.4}", self.as_float()?)),
            Decoder::Integer => Ok(self.as_int()?.to_string()),
            Decoder::Logical => Ok(if self.logical() { "T" } else { "F" }.to_string()),
            Decoder::Date => {
                if self.is_blank() {
                    Ok(String::new())
                } else {
                    Ok(String::from_utf8_lossy(self.raw).into_owned())
                }
            }
            Decoder::DateTime => match self.datetime()? {
                Some(stamp) => stamp
                    .format(&Rfc3339)
                    .map_err(|_| self.convert_err("string", &stamp.to_string())),
                None => Ok(String::new()),
            },
        }
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self.field.decoder {
            Decoder::Character => {
                let text = self.trimmed();
                if text.is_empty() {
                    return Ok(0);
                }
                text.parse::<i64>()
                    .map_err(|_| self.convert_err("integer", &text))
            }
            Decoder::Memo => Err(self.convert_err("integer", &self.memo_text())),
            Decoder::Numeric | Decoder::Currency | Decoder::Double => {
                Ok(self.as_float()?.trunc() as i64)
            }
            Decoder::Integer => self
                .fixed::<4>()
                .map(|bytes| i32::from_le_bytes(bytes) as i64),
            Decoder::Logical => Ok(self.logical() as i64),
            Decoder::Date => Ok(self.date_julian()?.unwrap_or(0)),
            Decoder::DateTime => Ok(self
                .datetime()?
                .map(|stamp| stamp.unix_timestamp())
                .unwrap_or(0)),
        }
    }

    pub fn as_float(&self) -> Result<f64, Error> {
        match self.field.decoder {
            Decoder::Character => {
                let text = self.trimmed();
                if text.is_empty() {
                    return Ok(0.0);
                }
                text.parse::<f64>()
                    .map_err(|_| self.convert_err("float", &text))
            }
            Decoder::Memo => Err(self.convert_err("float", &self.memo_text())),
            Decoder::Numeric => {
                let text = self.trimmed();
                if text.is_empty() {
                    return Ok(0.0);
                }
                text.parse::<f64>()
                    .map_err(|_| self.convert_err("float", &text))
            }
            Decoder::Currency => self
                .fixed::<8>()
                .map(|bytes| i64::from_le_bytes(bytes) as f64 / 10_000.0),
            Decoder::Double => self.fixed::<8>().map(f64::from_le_bytes),
            Decoder::Integer => Ok(self.as_int()? as f64),
            Decoder::Logical => Ok(if self.logical() { 1.0 } else { 0.0 }),
            Decoder::Date => Ok(self.date_julian()?.unwrap_or(0) as f64),
            Decoder::DateTime => Ok(self
                .datetime()?
                .map(|stamp| stamp.unix_timestamp() as f64 + stamp.nanosecond() as f64 / 1e9)
                .unwrap_or(0.0)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match self.field.decoder {
            Decoder::Character => {
                let text = self.trimmed();
                match text.to_ascii_uppercase().as_str() {
                    "T" | "TRUE" | "Y" | "YES" | "1" => Ok(true),
                    "F" | "FALSE" | "N" | "NO" | "0" | "" => Ok(false),
                    _ => Err(self.convert_err("boolean", &text)),
                }
            }
            Decoder::Memo => Ok(!self.memo_text().is_empty()),
            Decoder::Numeric | Decoder::Currency | Decoder::Double => Ok(self.as_float()? != 0.0),
            Decoder::Integer => Ok(self.as_int()? != 0),
            Decoder::Logical => Ok(self.logical()),
            Decoder::Date => Ok(!self.is_blank()),
            Decoder::DateTime => Ok(self.datetime()?.is_some()),
        }
    }

    /// Absent dates and times come back as `None`.
    pub fn as_time(&self) -> Result<Option<OffsetDateTime>, Error> {
        match self.field.decoder {
            Decoder::Character => {
                let text = self.trimmed();
                if text.is_empty() {
                    return Ok(None);
                }
                parse_character_time(&text)
                    .map(Some)
                    .ok_or_else(|| self.convert_err("time", &text))
            }
            Decoder::Date => Ok(self
                .date()?
                .map(|date| date.midnight().assume_utc())),
            Decoder::DateTime => self.datetime(),
            _ => Err(self.convert_err("time", &self.as_string()?)),
        }
    }

    /// Currency as an integer count of ten-thousandths.
    pub fn as_cents(&self) -> Result<i64, Error> {
        match self.field.decoder {
            Decoder::Currency => self.fixed::<8>().map(i64::from_le_bytes),
            _ => Err(self.convert_err("currency", &self.as_string()?)),
        }
    }

    fn memo_text(&self) -> String {
        self.memo.clone().unwrap_or_default()
    }

    fn logical(&self) -> bool {
        matches!(self.raw.first(), Some(b'T' | b't' | b'Y' | b'y'))
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N], Error> {
        self.raw
            .get(..N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                conversion_error(
                    self.type_name(),
                    &format!("{N}-byte value"),
                    Some(&format!("{:02x?}", self.raw)),
                )
            })
    }

    /// Validated (year, month, day) of a non-blank date cell.
    fn date_parts(&self) -> Result<Option<(i32, i32, i32)>, Error> {
        if self.is_blank() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(self.raw);
        let bad = || self.convert_err("date", &text);
        if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let year = text[0..4].parse::<i32>().map_err(|_| bad())?;
        let month = text[4..6].parse::<i32>().map_err(|_| bad())?;
        let day = text[6..8].parse::<i32>().map_err(|_| bad())?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(bad());
        }
        Ok(Some((year, month, day)))
    }

    fn date_julian(&self) -> Result<Option<i64>, Error> {
        Ok(self
            .date_parts()?
            .map(|(year, month, day)| ymd_to_julian(year, month, day)))
    }

    // Day overflow (Feb 30) rolls into the next month through the day number.
    fn date(&self) -> Result<Option<Date>, Error> {
        match self.date_julian()? {
            Some(julian) => julian_to_date(julian)
                .map(Some)
                .ok_or_else(|| self.convert_err("date", &String::from_utf8_lossy(self.raw))),
            None => Ok(None),
        }
    }

    fn datetime(&self) -> Result<Option<OffsetDateTime>, Error> {
        if self.raw.len() == 8 && self.field.column.width == 8 {
            let bytes = self.fixed::<8>()?;
            let day = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let millis = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            if day == 0 && millis == 0 {
                return Ok(None);
            }
            let date = julian_to_date(day as i64).ok_or_else(|| {
                self.convert_err("datetime", &format!("julian day {day}"))
            })?;
            if millis >= MS_PER_DAY {
                return Err(self.convert_err("datetime", &format!("{millis} ms past midnight")));
            }
            let stamp = date
                .midnight()
                .assume_utc()
                .checked_add(Duration::milliseconds(millis as i64))
                .ok_or_else(|| {
                    self.convert_err("datetime", &format!("julian day {day} + {millis} ms"))
                })?;
            return Ok(Some(stamp));
        }

        let text = self.trimmed();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(parse_datetime_text(&text))
    }
}

const MS_PER_DAY: u32 = 86_400_000;

fn is_pad(ch: char) -> bool {
    ch.is_ascii_whitespace() || ch == '\0'
}

/// Fixed-point when the column has a scale, otherwise integer-looking or shortest round-trip.
pub(crate) fn format_number(number: f64, decimals: u8) -> String {
    if decimals > 0 {
        format!("{number:.prec$}", prec = decimals as usize)
    } else if number.fract() == 0.0 && number.abs() < 9.2e18 {
        (number as i64).to_string()
    } else {
        number.to_string()
    }
}

fn parse_character_time(text: &str) -> Option<OffsetDateTime> {
    let iso = format_description!("[year]-[month]-[day]");
    let us = format_description!("[month]/[day]/[year]");
    let european = format_description!("[day]/[month]/[year]");
    let slashed = format_description!("[year]/[month]/[day]");
    let compact = format_description!("[year][month][day]");
    Date::parse(text, iso)
        .or_else(|_| Date::parse(text, us))
        .or_else(|_| Date::parse(text, european))
        .or_else(|_| Date::parse(text, slashed))
        .or_else(|_| Date::parse(text, compact))
        .map(|date| date.midnight().assume_utc())
        .or_else(|_| OffsetDateTime::parse(text, &Rfc3339))
        .or_else(|_| OffsetDateTime::parse(text, &Rfc2822))
        .ok()
}

fn parse_datetime_text(text: &str) -> Option<OffsetDateTime> {
    let compact_spaced = format_description!("[year][month][day] [hour]:[minute]:[second]");
    let compact_t = format_description!("[year][month][day]T[hour]:[minute]:[second]");
    let dashed_spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let dashed_t = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let date_only = format_description!("[year][month][day]");
    PrimitiveDateTime::parse(text, compact_spaced)
        .or_else(|_| PrimitiveDateTime::parse(text, compact_t))
        .or_else(|_| PrimitiveDateTime::parse(text, dashed_spaced))
        .or_else(|_| PrimitiveDateTime::parse(text, dashed_t))
        .map(PrimitiveDateTime::assume_utc)
        .or_else(|_| Date::parse(text, date_only).map(|date| date.midnight().assume_utc()))
        .or_else(|_| OffsetDateTime::parse(text, &Rfc3339))
        .or_else(|_| OffsetDateTime::parse(text, &Rfc2822))
        .map(|stamp| stamp.to_offset(UtcOffset::UTC))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::{Field, Value};
    use crate::core::column::{Column, FieldType};
    use crate::core::error::ErrorKind;
    use crate::core::memory::MemoryStore;
    use crate::core::store::RowStore;
    use serde_json::json;
    use time::macros::datetime;

    fn store(columns: serde_json::Value, values: serde_json::Value) -> MemoryStore {
        MemoryStore::from_value(json!({
            "columns": columns,
            "rows": [{"values": values}]
        }))
        .expect("fixture")
    }

    fn field(store: &MemoryStore, position: usize) -> Field {
        Field::new(store.columns()[position].clone(), position)
    }

    #[test]
    fn character_trims_and_converts() {
        let store = store(
            json!([{"name": "C", "type": "C", "width": 6}, {"name": "Z", "type": "C", "width": 4}]),
            json!({"C": "  42  ", "Z": {"hex": "41000000"}}),
        );
        let field = field(&store, 0);
        let cell = field.cell(&store, 1).expect("cell");
        assert_eq!(cell.as_int().expect("int"), 42);
        assert_eq!(cell.as_float().expect("float"), 42.0);
        assert_eq!(cell.as_string().expect("string"), "42");
        let err = cell.as_bool().expect_err("bool");
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert!(err.to_string().contains("\"42\""));

        let nul_field = super::Field::new(store.columns()[1].clone(), 1);
        let nul = nul_field.cell(&store, 1).expect("cell");
        assert_eq!(nul.as_string().expect("string"), "A");
    }

    #[test]
    fn character_time_tries_formats_in_order() {
        let store = store(
            json!([
                {"name": "A", "type": "C", "width": 10},
                {"name": "B", "type": "C", "width": 10},
                {"name": "C", "type": "C", "width": 10},
                {"name": "D", "type": "C", "width": 10}
            ]),
            json!({"A": "2024-03-01", "B": "03/04/2024", "C": "", "D": "soon"}),
        );
        let a = field(&store, 0);
        let b = field(&store, 1);
        let c = field(&store, 2);
        let d = field(&store, 3);
        assert_eq!(
            a.cell(&store, 1).expect("a").as_time().expect("time"),
            Some(datetime!(2024-03-01 0:00 UTC))
        );
        // Month-first wins over day-first.
        assert_eq!(
            b.cell(&store, 1).expect("b").as_time().expect("time"),
            Some(datetime!(2024-03-04 0:00 UTC))
        );
        assert_eq!(c.cell(&store, 1).expect("c").as_time().expect("time"), None);
        let err = d.cell(&store, 1).expect("d").as_time().expect_err("time");
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn numeric_formatting_follows_scale() {
        let store = store(
            json!([
                {"name": "A", "type": "N", "width": 8, "decimals": 2},
                {"name": "B", "type": "N", "width": 8},
                {"name": "C", "type": "F", "width": 8},
                {"name": "D", "type": "N", "width": 8},
                {"name": "E", "type": "N", "width": 8}
            ]),
            json!({"A": 3.5, "B": 12, "C": "2.25", "D": "", "E": "x1"}),
        );
        let cell = |idx| field(&store, idx);
        let a = cell(0);
        let b = cell(1);
        let c = cell(2);
        let d = cell(3);
        let e = cell(4);
        assert_eq!(a.cell(&store, 1).expect("a").as_string().expect("s"), "3.50");
        assert_eq!(b.cell(&store, 1).expect("b").as_string().expect("s"), "12");
        assert_eq!(c.cell(&store, 1).expect("c").as_string().expect("s"), "2.25");
        assert_eq!(c.cell(&store, 1).expect("c").as_int().expect("i"), 2);
        assert_eq!(d.cell(&store, 1).expect("d").as_float().expect("f"), 0.0);
        assert!(!d.cell(&store, 1).expect("d").as_bool().expect("b"));
        let err = e.cell(&store, 1).expect("e").as_float().expect_err("garbage");
        assert_eq!(err.kind(), ErrorKind::Conversion);
        let err = a.cell(&store, 1).expect("a").as_time().expect_err("time");
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn binary_numbers_decode_little_endian() {
        let store = store(
            json!([
                {"name": "I", "type": "I", "width": 4},
                {"name": "Y", "type": "Y", "width": 8},
                {"name": "X", "type": "B", "width": 8},
                {"name": "L", "type": "L", "width": 1}
            ]),
            json!({"I": -7, "Y": 12.3456, "X": "raw", "L": "y"}),
        );
        let i = field(&store, 0);
        let y = field(&store, 1);
        let b = field(&store, 2);
        let l = field(&store, 3);
        let i = i.cell(&store, 1).expect("i");
        assert_eq!(i.as_int().expect("int"), -7);
        assert_eq!(i.as_string().expect("string"), "-7");
        assert!(i.as_bool().expect("bool"));
        let y = y.cell(&store, 1).expect("y");
        assert_eq!(y.as_cents().expect("cents"), 123_456);
        assert_eq!(y.as_string().expect("string"), "12.3456");
        assert_eq!(y.as_int().expect("int"), 12);
        // Blob columns fall back to character decoding.
        assert_eq!(b.cell(&store, 1).expect("b").value().expect("v"), Value::Text("raw".into()));
        let l = l.cell(&store, 1).expect("l");
        assert!(l.as_bool().expect("bool"));
        assert_eq!(l.as_string().expect("string"), "T");
        assert_eq!(l.as_int().expect("int"), 1);
    }

    #[test]
    fn dates_blank_valid_and_invalid() {
        let store = store(
            json!([
                {"name": "A", "type": "D", "width": 8},
                {"name": "B", "type": "D", "width": 8},
                {"name": "C", "type": "D", "width": 8},
                {"name": "E", "type": "D", "width": 8}
            ]),
            json!({"A": "", "B": "20240115", "C": "20231345", "E": "20230230"}),
        );
        let blank = field(&store, 0);
        let blank = blank.cell(&store, 1).expect("blank");
        assert_eq!(blank.as_time().expect("time"), None);
        assert_eq!(blank.as_string().expect("string"), "");
        assert_eq!(blank.as_int().expect("int"), 0);
        assert!(!blank.as_bool().expect("bool"));
        assert_eq!(blank.value().expect("value"), Value::Date(None));

        let good = field(&store, 1);
        let good = good.cell(&store, 1).expect("good");
        assert_eq!(good.as_string().expect("string"), "20240115");
        assert_eq!(good.as_int().expect("int"), 2_460_325);
        assert_eq!(good.as_time().expect("time"), Some(datetime!(2024-01-15 0:00 UTC)));

        let bad = field(&store, 2);
        let err = bad.cell(&store, 1).expect("bad").as_time().expect_err("month 13");
        assert_eq!(err.kind(), ErrorKind::Conversion);

        let rolled = field(&store, 3);
        assert_eq!(
            rolled.cell(&store, 1).expect("rolled").as_time().expect("time"),
            Some(datetime!(2023-03-02 0:00 UTC))
        );
    }

    #[test]
    fn zero_datetime_is_absent_and_null_is_independent() {
        let store = MemoryStore::from_value(json!({
            "columns": [
                {"name": "T", "type": "T", "width": 8, "nullable": true},
                {"name": "S", "type": "T", "width": 19}
            ],
            "rows": [
                {"values": {"T": {"hex": "0000000000000000"}, "S": "2024-01-02 03:04:05"}},
                {"values": {"T": "2024-01-02T03:04:05.250", "S": "not a time"}, "nulls": ["T"]}
            ]
        }))
        .expect("fixture");
        let t = field(&store, 0);
        let s = field(&store, 1);

        let zero = t.cell(&store, 1).expect("zero");
        assert_eq!(zero.as_time().expect("time"), None);
        assert!(!zero.as_bool().expect("bool"));
        assert_eq!(zero.as_string().expect("string"), "");
        assert_eq!(zero.raw(), &[0u8; 8]);
        assert!(!store.is_null(1, 0).expect("null"));

        let set = t.cell(&store, 2).expect("set");
        assert_eq!(set.as_time().expect("time"), Some(datetime!(2024-01-02 03:04:05.25 UTC)));
        assert_eq!(set.as_int().expect("int"), 1_704_164_645);
        assert_eq!(set.as_float().expect("float"), 1_704_164_645.25);
        assert!(store.is_null(2, 0).expect("null"));

        let text = s.cell(&store, 1).expect("text");
        assert_eq!(text.as_time().expect("time"), Some(datetime!(2024-01-02 03:04:05 UTC)));
        assert_eq!(text.as_string().expect("string"), "2024-01-02T03:04:05Z");
        let junk = s.cell(&store, 2).expect("junk");
        assert_eq!(junk.as_time().expect("time"), None);
    }

    #[test]
    fn memo_reads_side_channel() {
        let store = store(
            json!([{"name": "M", "type": "M", "width": 10}]),
            json!({"M": "  long text "}),
        );
        let memo = field(&store, 0);
        let cell = memo.cell(&store, 1).expect("memo");
        assert_eq!(cell.as_string().expect("string"), "  long text ");
        assert!(cell.as_bool().expect("bool"));
        let err = cell.as_int().expect_err("int");
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert!(err.to_string().contains("long text"));
        let err = cell.as_time().expect_err("time");
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert!(err.to_string().contains("long text"));
    }

    #[test]
    fn datetime_millis_past_the_day_are_rejected() {
        let store = MemoryStore::from_value(json!({
            "columns": [{"name": "T", "type": "T", "width": 8}],
            "rows": [
                {"values": {"T": {"hex": "2cfe5100005c2605"}}},
                {"values": {"T": {"hex": "2cfe5100ff5b2605"}}},
                {"values": {"T": {"hex": "988a2500ffffffff"}}}
            ]
        }))
        .expect("fixture");
        let t = field(&store, 0);

        let overflow = t.cell(&store, 1).expect("cell");
        let err = overflow.as_time().expect_err("past year 9999");
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert!(err.to_string().contains("86400000"));
        assert_eq!(overflow.as_int().expect_err("int").kind(), ErrorKind::Conversion);

        let last = t.cell(&store, 2).expect("cell");
        assert_eq!(
            last.as_time().expect("time"),
            Some(datetime!(9999-12-31 23:59:59.999 UTC))
        );

        let garbage = t.cell(&store, 3).expect("cell");
        assert_eq!(garbage.as_time().expect_err("huge millis").kind(), ErrorKind::Conversion);
    }

    #[test]
    fn unknown_type_reads_as_character() {
        let column = Column::new("Q", FieldType::Unknown, 3);
        let field = Field::new(column, 0);
        assert_eq!(field.decoder, super::Decoder::Character);
    }
}

//! Purpose: Column catalog metadata and the declared field type tags.
//! Exports: `FieldType`, `Column`, `Columns`.
//! Role: Immutable description of a table's columns, built once at open.
//! Invariants: Column names are unique case-insensitively; lookups ignore case.
//! Invariants: Unrecognized type tags map to `FieldType::Unknown`, never an error.
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

const TYPE_CODES: &str = "CNLDITYMBFGPQVWX";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldType {
    Unknown,
    Character,
    Numeric,
    Logical,
    Date,
    Integer,
    DateTime,
    Currency,
    Memo,
    Blob,
    Float,
    General,
    Picture,
    VarBinary,
    Varchar,
    Timestamp,
    Double,
}

impl FieldType {
    const ALL: [FieldType; 16] = [
        FieldType::Character,
        FieldType::Numeric,
        FieldType::Logical,
        FieldType::Date,
        FieldType::Integer,
        FieldType::DateTime,
        FieldType::Currency,
        FieldType::Memo,
        FieldType::Blob,
        FieldType::Float,
        FieldType::General,
        FieldType::Picture,
        FieldType::VarBinary,
        FieldType::Varchar,
        FieldType::Timestamp,
        FieldType::Double,
    ];

    /// Parses a one-letter type tag, ignoring case.
    pub fn from_code(code: &str) -> Self {
        let mut chars = code.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return FieldType::Unknown;
        };
        let upper = ch.to_ascii_uppercase();
        TYPE_CODES
            .find(upper)
            .map(|idx| Self::ALL[idx])
            .unwrap_or(FieldType::Unknown)
    }

    pub fn code(self) -> Option<char> {
        Self::ALL
            .iter()
            .position(|ty| *ty == self)
            .and_then(|idx| TYPE_CODES.chars().nth(idx))
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Unknown => "unknown",
            FieldType::Character => "character",
            FieldType::Numeric => "numeric",
            FieldType::Logical => "logical",
            FieldType::Date => "date",
            FieldType::Integer => "integer",
            FieldType::DateTime => "datetime",
            FieldType::Currency => "currency",
            FieldType::Memo => "memo",
            FieldType::Blob => "blob",
            FieldType::Float => "float",
            FieldType::General => "general",
            FieldType::Picture => "picture",
            FieldType::VarBinary => "varbinary",
            FieldType::Varchar => "varchar",
            FieldType::Timestamp => "timestamp",
            FieldType::Double => "double",
        }
    }

    /// Text-typed columns are the only ones regex search accepts.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            FieldType::Character | FieldType::Varchar | FieldType::Memo
        )
    }

    /// Columns whose index keys order by numeric value rather than bytes.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Numeric
                | FieldType::Float
                | FieldType::Integer
                | FieldType::Currency
                | FieldType::Double
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{code}"),
            None => write!(f, "unknown"),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(FieldType::from_code(&code))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub width: u8,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub system: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: FieldType, width: u8) -> Self {
        Self {
            name: name.into(),
            field_type,
            width,
            decimals: 0,
            nullable: false,
            binary: false,
            system: false,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Ordered column list with a case-insensitive name map.
#[derive(Clone, Debug, Default)]
pub struct Columns {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
}

impl Columns {
    pub fn new(columns: Vec<Column>) -> Self {
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.name.to_ascii_lowercase(), idx))
            .collect();
        Self { columns, by_name }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Column> {
        self.index_of(name).and_then(|idx| self.columns.get(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, Columns, FieldType};

    #[test]
    fn type_codes_round_trip() {
        for code in "CNLDITYMBFGPQVWX".chars() {
            let ty = FieldType::from_code(&code.to_string());
            assert_ne!(ty, FieldType::Unknown);
            assert_eq!(ty.code(), Some(code));
        }
        assert_eq!(FieldType::from_code("n"), FieldType::Numeric);
        assert_eq!(FieldType::from_code("Z"), FieldType::Unknown);
        assert_eq!(FieldType::from_code("CN"), FieldType::Unknown);
        assert_eq!(FieldType::from_code(""), FieldType::Unknown);
        assert_eq!(FieldType::Unknown.to_string(), "unknown");
    }

    #[test]
    fn type_names_are_lowercase_words() {
        assert_eq!(FieldType::Character.name(), "character");
        assert_eq!(FieldType::DateTime.name(), "datetime");
        assert_eq!(FieldType::Double.name(), "double");
        assert_eq!(FieldType::Unknown.name(), "unknown");
    }

    #[test]
    fn lookup_ignores_case() {
        let columns = Columns::new(vec![
            Column::new("NAME", FieldType::Character, 20),
            Column::new("Amount", FieldType::Numeric, 10).with_decimals(2),
        ]);
        assert_eq!(columns.index_of("name"), Some(0));
        assert_eq!(columns.index_of("AMOUNT"), Some(1));
        assert_eq!(columns.by_name("amount").map(|c| c.decimals), Some(2));
        assert!(columns.by_name("missing").is_none());
    }
}

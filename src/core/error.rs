//! Purpose: One error type for every table, cursor, decode, and search failure.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`, `conversion_error`.
//! Role: Builder-style error shared by the library, the reference store, and the CLI.
//! Invariants: Kinds are stable; positioning failures never masquerade as `NotOpen`.
//! Invariants: Conversion and parse errors always name the value/pattern and the target.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotOpen,
    AlreadyOpen,
    NotPositioned,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Busy,
    Conversion,
    Parse,
    Evaluation,
    Consistency,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    recno: Option<u32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            recno: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn recno(&self) -> Option<u32> {
        self.recno
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_recno(mut self, recno: u32) -> Self {
        self.recno = Some(recno);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn not_open() -> Self {
        Self::new(ErrorKind::NotOpen).with_message("table not open")
    }

    pub(crate) fn at_bof() -> Self {
        Self::new(ErrorKind::NotPositioned)
            .with_message("positioned at beginning of file (BOF)")
    }

    pub(crate) fn at_eof() -> Self {
        Self::new(ErrorKind::NotPositioned).with_message("positioned at end of file (EOF)")
    }
}

/// Builds the standard conversion failure, naming both sides and the value.
pub fn conversion_error(from: &str, to: &str, value: Option<&str>) -> Error {
    let message = match value {
        Some(value) => format!("cannot convert {from} value {value:?} to {to}"),
        None => format!("cannot convert {from} to {to}"),
    };
    Error::new(ErrorKind::Conversion).with_message(message)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(recno) = self.recno {
            write!(f, " (recno: {recno})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyExists => 4,
        ErrorKind::Busy => 5,
        ErrorKind::Consistency => 7,
        ErrorKind::Io => 8,
        ErrorKind::NotOpen => 9,
        ErrorKind::AlreadyOpen => 10,
        ErrorKind::NotPositioned => 11,
        ErrorKind::InvalidArgument => 12,
        ErrorKind::Conversion => 13,
        ErrorKind::Parse => 14,
        ErrorKind::Evaluation => 15,
    }
}

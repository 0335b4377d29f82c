//! Purpose: Named index tags, ordering selection, and keyed seeks with classified outcomes.
//! Exports: `Tag`, `SeekResult`.
//! Role: Extends `Table` with tag enumeration and the seek family.
//! Invariants: A seek that fails leaves the cursor where it was.
//! Invariants: `seek_with_tag` always puts the previous ordering back, even when the seek errors.
use std::fmt;

use crate::core::cursor::{Order, Position};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::{IndexSpec, SeekHit, SeekKey};
use crate::core::table::{OpenTable, ScanGuard, Table};

/// Handle to one index, valid only for the open session that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tag {
    name: String,
    column: String,
    unique: bool,
    filtered: bool,
    slot: usize,
    session: u64,
}

impl Tag {
    fn from_spec(spec: &IndexSpec, slot: usize, session: u64) -> Self {
        Self {
            name: spec.name.clone(),
            column: spec.column.clone(),
            unique: spec.unique,
            filtered: spec.filtered,
            slot,
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column the tag's key is built from.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// True while `table` is still the open session this tag came from.
    pub fn is_valid_for(&self, table: &Table) -> bool {
        table.session() == Some(self.session)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekResult {
    Success,
    AfterInsertionPoint,
    Eof,
    NoSuchEntry,
    LockFailure,
    DuplicateKeyViolation,
    NoActiveOrdering,
    OtherError,
}

impl SeekResult {
    pub fn is_found(self) -> bool {
        self == SeekResult::Success
    }

    /// The cursor sits on a row after the seek.
    pub fn is_positioned(self) -> bool {
        matches!(self, SeekResult::Success | SeekResult::AfterInsertionPoint)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeekResult::Success => "Success",
            SeekResult::AfterInsertionPoint => "After",
            SeekResult::Eof => "EOF",
            SeekResult::NoSuchEntry => "Entry",
            SeekResult::LockFailure => "Locked",
            SeekResult::DuplicateKeyViolation => "Unique",
            SeekResult::NoActiveOrdering => "NoTag",
            SeekResult::OtherError => "Error",
        }
    }

    fn from_engine_error(err: &Error) -> Self {
        match err.kind() {
            ErrorKind::Busy => SeekResult::LockFailure,
            ErrorKind::AlreadyExists => SeekResult::DuplicateKeyViolation,
            ErrorKind::NotFound => SeekResult::NoSuchEntry,
            _ => SeekResult::OtherError,
        }
    }
}

impl fmt::Display for SeekResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Table {
    /// All tags in declaration order; empty when closed.
    pub fn list_tags(&self) -> Vec<Tag> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        state
            .store()
            .indexes()
            .iter()
            .enumerate()
            .map(|(slot, spec)| Tag::from_spec(spec, slot, state.session))
            .collect()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.list_tags().into_iter().map(|tag| tag.name).collect()
    }

    pub fn tag_count(&self) -> usize {
        self.state()
            .map(|state| state.store().indexes().len())
            .unwrap_or(0)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tag_by_name(name).is_some()
    }

    /// Case-insensitive lookup.
    pub fn tag_by_name(&self, name: &str) -> Option<Tag> {
        self.list_tags()
            .into_iter()
            .find(|tag| tag.name.eq_ignore_ascii_case(name))
    }

    pub fn default_tag(&self) -> Option<Tag> {
        self.list_tags().into_iter().next()
    }

    pub fn selected_tag(&self) -> Option<Tag> {
        let state = self.state().ok()?;
        match state.cursor.order() {
            Order::Physical => None,
            Order::Index(slot) => state
                .store()
                .indexes()
                .get(slot)
                .map(|spec| Tag::from_spec(spec, slot, state.session)),
        }
    }

    /// Switches ordering without moving off the current row; `None` selects physical order.
    pub fn select_tag(&mut self, tag: Option<&Tag>) -> Result<(), Error> {
        let order = match tag {
            None => Order::Physical,
            Some(tag) => {
                self.check_tag(tag)?;
                Order::Index(tag.slot)
            }
        };
        let state = self.state_mut()?;
        state.cursor.set_order(order);
        tracing::debug!(tag = tag.map(Tag::name), "selected ordering");
        Ok(())
    }

    fn check_tag(&self, tag: &Tag) -> Result<(), Error> {
        let state = self.state()?;
        if tag.session != state.session || tag.slot >= state.store().indexes().len() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("tag {:?} is not valid for this table", tag.name))
                .with_hint("Tags are tied to the open that produced them; look the tag up again after reopening."));
        }
        Ok(())
    }

    pub fn seek(&mut self, key: &str) -> Result<SeekResult, Error> {
        self.seek_key(SeekKey::Text(key))
    }

    pub fn seek_numeric(&mut self, key: f64) -> Result<SeekResult, Error> {
        self.seek_key(SeekKey::Number(key))
    }

    /// Steps past the current row when it already matches `key`, otherwise behaves like `seek`.
    pub fn seek_next(&mut self, key: &str) -> Result<SeekResult, Error> {
        self.seek_next_key(SeekKey::Text(key))
    }

    pub fn seek_next_numeric(&mut self, key: f64) -> Result<SeekResult, Error> {
        self.seek_next_key(SeekKey::Number(key))
    }

    pub fn seek_with_tag(&mut self, tag: &Tag, key: &str) -> Result<SeekResult, Error> {
        self.seek_tagged(tag, SeekKey::Text(key))
    }

    pub fn seek_numeric_with_tag(&mut self, tag: &Tag, key: f64) -> Result<SeekResult, Error> {
        self.seek_tagged(tag, SeekKey::Number(key))
    }

    fn seek_tagged(&mut self, tag: &Tag, key: SeekKey<'_>) -> Result<SeekResult, Error> {
        self.check_tag(tag)?;
        let mut guard = ScanGuard::order_only(self)?;
        guard.select_tag(Some(tag))?;
        guard.seek_key(key)
    }

    pub(crate) fn seek_key(&mut self, key: SeekKey<'_>) -> Result<SeekResult, Error> {
        let state = self.state_mut()?;
        let Order::Index(slot) = state.cursor.order() else {
            return Ok(SeekResult::NoActiveOrdering);
        };
        let outcome = seek_in(state, slot, key);
        tracing::debug!(?key, slot, outcome = %outcome, "seek");
        Ok(outcome)
    }

    fn seek_next_key(&mut self, key: SeekKey<'_>) -> Result<SeekResult, Error> {
        let state = self.state_mut()?;
        let Order::Index(slot) = state.cursor.order() else {
            return Ok(SeekResult::NoActiveOrdering);
        };
        let Some(recno) = state.cursor.recno() else {
            return Ok(seek_in(state, slot, key));
        };

        let store = state.store();
        let advanced = store.index_position_of(slot, recno).and_then(|pos| match pos {
            Some(pos) if store.index_key_matches(slot, pos, key)? => {
                let next = pos + 1;
                if next >= store.index_len(slot)? {
                    return Ok(Some((Position::Eof, SeekResult::Eof)));
                }
                let recno = store.index_entry(slot, next)?;
                let outcome = if store.index_key_matches(slot, next, key)? {
                    SeekResult::Success
                } else {
                    SeekResult::AfterInsertionPoint
                };
                Ok(Some((Position::Row(recno), outcome)))
            }
            _ => Ok(None),
        });

        match advanced {
            Ok(Some((position, outcome))) => {
                state.cursor.set_position(position);
                Ok(outcome)
            }
            Ok(None) => Ok(seek_in(state, slot, key)),
            Err(err) => Ok(classify(&err)),
        }
    }
}

fn seek_in(state: &mut OpenTable, slot: usize, key: SeekKey<'_>) -> SeekResult {
    let store = state.store();
    let landed = store.index_seek(slot, key).and_then(|hit| match hit {
        SeekHit::Exact(pos) => Ok((Position::Row(store.index_entry(slot, pos)?), SeekResult::Success)),
        SeekHit::After(pos) => Ok((
            Position::Row(store.index_entry(slot, pos)?),
            SeekResult::AfterInsertionPoint,
        )),
        SeekHit::End => Ok((Position::Eof, SeekResult::Eof)),
    });
    match landed {
        Ok((position, outcome)) => {
            state.cursor.set_position(position);
            outcome
        }
        Err(err) => classify(&err),
    }
}

fn classify(err: &Error) -> SeekResult {
    let outcome = SeekResult::from_engine_error(err);
    tracing::debug!(error = %err, outcome = %outcome, "seek failed");
    outcome
}

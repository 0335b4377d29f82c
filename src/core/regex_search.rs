//! Purpose: Regular-expression search over one text column, with an index shortcut for `^literal` patterns.
//! Exports: `RegexSearchOptions`, `RegexSearchResult`, `RegexMatch`.
//! Role: Second search engine beside expression search; drives the CLI `grep` command.
//! Invariants: The shortcut returns exactly what a full scan returns (row numbers, values, spans).
//! Invariants: Unusable indexes fall back to a full scan without an error.
//! Invariants: The caller's cursor and ordering are untouched afterwards.
use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::core::column::FieldType;
use crate::core::error::{Error, ErrorKind};
use crate::core::field::Field;
use crate::core::index::Tag;
use crate::core::store::{SeekHit, SeekKey};
use crate::core::table::{OpenTable, ScanGuard, Table, unknown_field};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegexSearchOptions {
    pub case_insensitive: bool,
    /// 0 means no limit.
    pub max_results: usize,
    pub use_index: bool,
    /// Name used to look for a matching index; defaults to the searched field.
    pub index_field: Option<String>,
}

impl Default for RegexSearchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            max_results: 0,
            use_index: true,
            index_field: None,
        }
    }
}

impl RegexSearchOptions {
    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_use_index(mut self, use_index: bool) -> Self {
        self.use_index = use_index;
        self
    }

    pub fn with_index_field(mut self, index_field: impl Into<String>) -> Self {
        self.index_field = Some(index_field.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegexMatch {
    pub recno: u32,
    pub value: String,
    /// Byte ranges of every non-overlapping match within `value`.
    pub spans: Vec<(usize, usize)>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegexSearchResult {
    pub pattern: String,
    pub matches: Vec<RegexMatch>,
    pub total_scanned: usize,
    pub total_matched: usize,
    /// Index the shortcut walked, when it was taken.
    pub index: Option<String>,
}

impl Table {
    pub fn regex_search(
        &mut self,
        field_name: &str,
        pattern: &str,
        options: &RegexSearchOptions,
    ) -> Result<RegexSearchResult, Error> {
        let state = self.state()?;
        let field = state
            .field_by_name(field_name)
            .ok_or_else(|| unknown_field(field_name))?;
        if !field.field_type().is_text() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!(
                    "field {:?} is {}, not a text field",
                    field.name(),
                    field.field_type().name()
                ))
                .with_hint("Regex search works on character, varchar, and memo fields."));
        }
        let position = field.position();
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::Parse)
                    .with_message(format!("invalid regex pattern {pattern:?}"))
                    .with_source(err)
            })?;

        let mut result = RegexSearchResult {
            pattern: pattern.to_string(),
            matches: Vec::new(),
            total_scanned: 0,
            total_matched: 0,
            index: None,
        };

        let shortcut = match self.shortcut_tag(field_name, pattern, options) {
            Some((tag, prefix)) => {
                let state = self.state()?;
                match prefix_candidates(state, tag.slot(), &prefix) {
                    Ok(recnos) => Some((tag, recnos)),
                    Err(err) => {
                        tracing::debug!(tag = tag.name(), error = %err, "index walk failed; scanning");
                        None
                    }
                }
            }
            None => None,
        };

        match shortcut {
            Some((tag, recnos)) => {
                let state = self.state()?;
                let field = &state.fields[position];
                for recno in recnos {
                    result.total_scanned += 1;
                    if let Some(found) = match_row(state, field, &regex, recno)? {
                        result.matches.push(found);
                    }
                }
                if options.max_results > 0 {
                    result.matches.truncate(options.max_results);
                }
                result.index = Some(tag.name().to_string());
            }
            None => self.scan_for_matches(position, &regex, options, &mut result)?,
        }

        result.total_matched = result.matches.len();
        tracing::debug!(
            field = field_name,
            pattern,
            index = ?result.index,
            scanned = result.total_scanned,
            matched = result.total_matched,
            "regex search"
        );
        Ok(result)
    }

    pub fn regex_count(
        &mut self,
        field_name: &str,
        pattern: &str,
        options: &RegexSearchOptions,
    ) -> Result<usize, Error> {
        let options = options.clone().with_max_results(0);
        Ok(self.regex_search(field_name, pattern, &options)?.total_matched)
    }

    pub fn regex_exists(
        &mut self,
        field_name: &str,
        pattern: &str,
        options: &RegexSearchOptions,
    ) -> Result<bool, Error> {
        let options = options.clone().with_max_results(1);
        Ok(self.regex_search(field_name, pattern, &options)?.total_matched > 0)
    }

    /// The tag and literal prefix the shortcut would use, if every precondition holds.
    fn shortcut_tag(
        &self,
        field_name: &str,
        pattern: &str,
        options: &RegexSearchOptions,
    ) -> Option<(Tag, String)> {
        if !options.use_index || options.case_insensitive {
            return None;
        }
        let prefix = literal_prefix(pattern)?;
        let field = self.state().ok()?.field_by_name(field_name)?;
        if !matches!(field.field_type(), FieldType::Character | FieldType::Varchar) {
            return None;
        }
        let hint = options.index_field.as_deref().unwrap_or(field_name);
        let tag = find_tag_for(&self.list_tags(), hint)?;
        if !tag.column().eq_ignore_ascii_case(field.name()) || tag.is_filtered() {
            tracing::debug!(tag = tag.name(), "index does not cover the searched field; scanning");
            return None;
        }
        Some((tag, prefix))
    }

    fn scan_for_matches(
        &mut self,
        position: usize,
        regex: &Regex,
        options: &RegexSearchOptions,
        result: &mut RegexSearchResult,
    ) -> Result<(), Error> {
        let mut guard = ScanGuard::physical(self)?;
        guard.first()?;
        while let Some(recno) = guard.recno() {
            if options.max_results > 0 && result.matches.len() >= options.max_results {
                break;
            }
            result.total_scanned += 1;
            let state = guard.state()?;
            if let Some(found) = match_row(state, &state.fields[position], regex, recno)? {
                result.matches.push(found);
            }
            guard.next()?;
        }
        Ok(())
    }
}

fn match_row(
    state: &OpenTable,
    field: &Field,
    regex: &Regex,
    recno: u32,
) -> Result<Option<RegexMatch>, Error> {
    let value = field
        .cell(state.store(), recno)
        .and_then(|cell| cell.as_string())
        .map_err(|err| err.with_recno(recno))?;
    let spans: Vec<_> = regex.find_iter(&value).map(|m| (m.start(), m.end())).collect();
    if spans.is_empty() {
        return Ok(None);
    }
    Ok(Some(RegexMatch {
        recno,
        value,
        spans,
    }))
}

/// Literal text after a leading `^`, or `None` when the pattern has no usable prefix.
fn literal_prefix(pattern: &str) -> Option<String> {
    let body = pattern.strip_prefix('^')?;
    if pattern.contains('|') {
        return None;
    }
    let mut prefix = String::new();
    for ch in body.chars() {
        match ch {
            // These make the previous character optional.
            '*' | '?' | '{' => {
                prefix.pop();
                break;
            }
            '.' | '+' | '[' | ']' | '(' | ')' | '}' | '\\' | '$' | '^' => break,
            _ => prefix.push(ch),
        }
    }
    (!prefix.is_empty()).then_some(prefix)
}

/// Exact name or `<name>_IDX` first, then any tag that starts or ends with the name.
fn find_tag_for(tags: &[Tag], name: &str) -> Option<Tag> {
    let suffixed = format!("{name}_IDX");
    let exact = tags.iter().find(|tag| {
        tag.name().eq_ignore_ascii_case(name) || tag.name().eq_ignore_ascii_case(&suffixed)
    });
    let name = name.to_ascii_uppercase();
    exact
        .or_else(|| {
            tags.iter().find(|tag| {
                let tag_name = tag.name().to_ascii_uppercase();
                tag_name.len() > name.len()
                    && (tag_name.starts_with(&name) || tag_name.ends_with(&name))
            })
        })
        .cloned()
}

/// Rows whose index key begins with `prefix`, plus rows whose key starts with padding
/// (their trimmed value can still match), in record-number order.
fn prefix_candidates(state: &OpenTable, slot: usize, prefix: &str) -> Result<Vec<u32>, Error> {
    let store = state.store();
    let len = store.index_len(slot)?;
    let mut recnos = BTreeSet::new();

    for pos in 0..len {
        if !store.index_key(slot, pos)?.first().is_none_or(|b| *b <= b' ') {
            break;
        }
        recnos.insert(store.index_entry(slot, pos)?);
    }

    let start = match store.index_seek(slot, SeekKey::Text(prefix))? {
        SeekHit::Exact(pos) | SeekHit::After(pos) => pos,
        SeekHit::End => len,
    };
    for pos in start..len {
        if !store.index_key(slot, pos)?.starts_with(prefix.as_bytes()) {
            break;
        }
        recnos.insert(store.index_entry(slot, pos)?);
    }
    Ok(recnos.into_iter().collect())
}

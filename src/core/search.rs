//! Purpose: Predicate search: walk physical order and collect rows an expression accepts.
//! Exports: `ExprSearchOptions`, `ExprSearchResult`, `RowSnapshot`.
//! Role: Search driver over `Expression`; also builds row snapshots for callers and the CLI.
//! Invariants: The caller's cursor and ordering are restored on every exit path.
//! Invariants: Compile failures are `Parse`; per-row failures are `Evaluation` tagged with the recno.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::expr::{ExprType, Expression};
use crate::core::field::Value;
use crate::core::table::{OpenTable, ScanGuard, Table};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExprSearchOptions {
    /// Stop after this many matches; 0 means no limit.
    pub max_results: usize,
}

impl ExprSearchOptions {
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Decoded copy of one row. Columns that fail to decode are left out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RowSnapshot {
    pub recno: u32,
    pub deleted: bool,
    pub values: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExprSearchResult {
    pub expression: String,
    pub matches: Vec<RowSnapshot>,
    pub total_scanned: usize,
    pub total_matched: usize,
}

pub(crate) fn snapshot(state: &OpenTable, recno: u32) -> RowSnapshot {
    let store = state.store();
    let values = state
        .fields
        .iter()
        .filter_map(|field| {
            let value = field.cell(store, recno).and_then(|cell| cell.value());
            match value {
                Ok(value) => Some((field.name().to_string(), value)),
                Err(err) => {
                    tracing::debug!(recno, field = field.name(), error = %err, "skipping undecodable column");
                    None
                }
            }
        })
        .collect();
    RowSnapshot {
        recno,
        deleted: store.is_deleted(recno).unwrap_or(false),
        values,
    }
}

impl Table {
    /// Snapshot of the row under the cursor.
    pub fn current_row(&self) -> Result<RowSnapshot, Error> {
        let state = self.state()?;
        let recno = state.cursor.require_row()?;
        Ok(snapshot(state, recno))
    }

    /// Compiles `source` and insists on a logical result.
    pub fn compile_predicate(&self, source: &str) -> Result<Expression, Error> {
        let expr = self.compile_expression(source)?;
        if expr.result_type() != ExprType::Logical {
            return Err(Error::new(ErrorKind::Parse)
                .with_message(format!(
                    "search expression {source:?} is {}, not logical",
                    expr.result_type()
                ))
                .with_hint("Compare the value with something, e.g. AGE > 30 or TRIM(NAME) == 'Smith'."));
        }
        Ok(expr)
    }

    pub fn search_by_expression(
        &mut self,
        source: &str,
        options: &ExprSearchOptions,
    ) -> Result<ExprSearchResult, Error> {
        let expr = self.compile_predicate(source)?;
        let mut result = ExprSearchResult {
            expression: source.to_string(),
            matches: Vec::new(),
            total_scanned: 0,
            total_matched: 0,
        };

        let mut guard = ScanGuard::physical(self)?;
        guard.first()?;
        while let Some(recno) = guard.recno() {
            result.total_scanned += 1;
            if accepts(&expr, &guard, recno)? {
                result.matches.push(snapshot(guard.state()?, recno));
                result.total_matched += 1;
                if options.max_results > 0 && result.total_matched >= options.max_results {
                    break;
                }
            }
            guard.next()?;
        }
        drop(guard);

        tracing::debug!(
            expression = source,
            scanned = result.total_scanned,
            matched = result.total_matched,
            "expression search"
        );
        Ok(result)
    }

    pub fn count_by_expression(&mut self, source: &str) -> Result<usize, Error> {
        let mut count = 0;
        self.for_each_expression_match(source, |_, _| {
            count += 1;
            Ok::<(), Error>(())
        })?;
        Ok(count)
    }

    /// Calls `visit` with the table positioned on each matching row, in physical order.
    pub fn for_each_expression_match<E, F>(&mut self, source: &str, mut visit: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&mut Table, u32) -> Result<(), E>,
    {
        let expr = self.compile_predicate(source)?;
        self.scan_physical(|table, recno| {
            if accepts(&expr, table, recno)? {
                visit(table, recno)?;
            }
            Ok(())
        })
    }
}

fn accepts(expr: &Expression, table: &Table, recno: u32) -> Result<bool, Error> {
    expr.evaluate_bool(table).map_err(|err| match err.recno() {
        Some(_) => err,
        None => err.with_recno(recno),
    })
}

//! Purpose: Compile xBase-style filter expressions against a table and evaluate them per row.
//! Exports: `Expression`, `ExprType`.
//! Role: Predicate engine behind expression search; also usable directly for computed values.
//! Invariants: Type errors surface at compile time as `Parse`; runtime failures are `Evaluation`.
//! Invariants: An expression only evaluates against the open session that compiled it.
use std::fmt;

use crate::core::column::FieldType;
use crate::core::error::{Error, ErrorKind, conversion_error};
use crate::core::field::{Value, format_number};
use crate::core::julian::ymd_to_julian;
use crate::core::table::{OpenTable, Table};

mod eval;
mod lexer;
mod parser;

use eval::{Row, Scalar};
use parser::{FieldKind, FieldRead, Node};

/// Static result type of an expression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExprType {
    Character,
    Numeric,
    Logical,
    Date,
}

impl ExprType {
    pub fn name(self) -> &'static str {
        match self {
            ExprType::Character => "character",
            ExprType::Numeric => "numeric",
            ExprType::Logical => "logical",
            ExprType::Date => "date",
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn parse_error(source: &str, offset: usize, detail: &str) -> Error {
    Error::new(ErrorKind::Parse)
        .with_message(format!("invalid expression {source:?}: {detail} at offset {offset}"))
        .with_hint("Example: AGE >= 21 .AND. UPPER(TRIM(CITY)) == 'PARIS'")
}

pub struct Expression {
    source: String,
    root: Node,
    result_type: ExprType,
    session: u64,
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("result_type", &self.result_type)
            .finish()
    }
}

impl Table {
    /// Parses and type-checks `source` against this table's columns.
    pub fn compile_expression(&self, source: &str) -> Result<Expression, Error> {
        let state = self.state()?;
        let (root, result_type) = parser::parse(source, |name| resolve_field(state, name))?;
        tracing::debug!(expression = source, %result_type, "compiled expression");
        Ok(Expression {
            source: source.to_string(),
            root,
            result_type,
            session: state.session,
        })
    }
}

fn resolve_field(state: &OpenTable, name: &str) -> Option<FieldRead> {
    let field = state.field_by_name(name)?;
    let kind = match field.field_type() {
        FieldType::Memo => FieldKind::Memo,
        FieldType::Numeric
        | FieldType::Float
        | FieldType::Integer
        | FieldType::Currency
        | FieldType::Double => FieldKind::Number,
        FieldType::Logical => FieldKind::Logical,
        FieldType::Date | FieldType::DateTime => FieldKind::Date,
        _ => FieldKind::Text,
    };
    Some(FieldRead {
        position: field.position(),
        name: field.name().to_string(),
        kind,
    })
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn result_type(&self) -> ExprType {
        self.result_type
    }

    pub fn is_valid_for(&self, table: &Table) -> bool {
        table.session() == Some(self.session)
    }

    fn run(&self, table: &Table) -> Result<Scalar, Error> {
        let state = table.state()?;
        if state.session != self.session {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!(
                    "expression {:?} was compiled for a different open of the table",
                    self.source
                ))
                .with_hint("Compile the expression again after reopening the table."));
        }
        let recno = state.cursor.require_row()?;
        self.root.eval(&Row {
            table: state,
            recno,
        })
    }

    /// Evaluates at the current row; the table must be positioned.
    pub fn evaluate(&self, table: &Table) -> Result<Value, Error> {
        Ok(match self.run(table)? {
            Scalar::Str(text) => Value::Text(text),
            Scalar::Num(number) => Value::Number(number),
            Scalar::Bool(flag) => Value::Bool(flag),
            Scalar::Date(date) => Value::Date(date),
        })
    }

    pub fn evaluate_bool(&self, table: &Table) -> Result<bool, Error> {
        match self.run(table)? {
            Scalar::Bool(flag) => Ok(flag),
            _ => Err(conversion_error(self.result_type.name(), "logical", Some(&self.source))),
        }
    }

    /// Numbers render like numeric fields without a scale; dates as `YYYYMMDD`.
    pub fn evaluate_string(&self, table: &Table) -> Result<String, Error> {
        Ok(match self.run(table)? {
            Scalar::Str(text) => text,
            Scalar::Num(number) => format_number(number, 0),
            Scalar::Bool(flag) => if flag { "T" } else { "F" }.to_string(),
            Scalar::Date(Some(date)) => {
                format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day())
            }
            Scalar::Date(None) => String::new(),
        })
    }

    /// Logical results read as 1/0 and dates as their Julian day number.
    pub fn evaluate_number(&self, table: &Table) -> Result<f64, Error> {
        match self.run(table)? {
            Scalar::Num(number) => Ok(number),
            Scalar::Bool(flag) => Ok(if flag { 1.0 } else { 0.0 }),
            Scalar::Date(Some(date)) => Ok(ymd_to_julian(
                date.year(),
                u8::from(date.month()) as i32,
                date.day() as i32,
            ) as f64),
            Scalar::Date(None) => Ok(0.0),
            Scalar::Str(text) => Err(conversion_error("character", "numeric", Some(&text))),
        }
    }
}

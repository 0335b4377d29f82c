// Tree-walking evaluator for compiled expressions; one row at a time.
use std::cmp::Ordering;

use time::{Date, Duration, Month, OffsetDateTime};

use crate::core::error::{Error, ErrorKind};
use crate::core::table::OpenTable;

use super::parser::{BinaryOp, FieldKind, FieldRead, Func, Node};

/// Runtime value; the parser guarantees operand types, so evaluation only dispatches.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Scalar {
    Str(String),
    Num(f64),
    Bool(bool),
    Date(Option<Date>),
}

pub(crate) struct Row<'a> {
    pub table: &'a OpenTable,
    pub recno: u32,
}

fn evaluation_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Evaluation).with_message(message)
}

fn mismatch(what: &str) -> Error {
    Error::new(ErrorKind::Internal).with_message(format!("ill-typed operands reached {what}"))
}

impl Node {
    pub(crate) fn eval(&self, row: &Row<'_>) -> Result<Scalar, Error> {
        match self {
            Node::Const(value) => Ok(value.clone()),
            Node::Field(field) => read_field(field, row),
            Node::Neg(inner) => Ok(Scalar::Num(-inner.eval(row)?.num()?)),
            Node::Not(inner) => Ok(Scalar::Bool(!inner.eval(row)?.bool()?)),
            Node::And(left, right) => {
                Ok(Scalar::Bool(left.eval(row)?.bool()? && right.eval(row)?.bool()?))
            }
            Node::Or(left, right) => {
                Ok(Scalar::Bool(left.eval(row)?.bool()? || right.eval(row)?.bool()?))
            }
            Node::Binary(op, left, right) => binary(*op, left.eval(row)?, right.eval(row)?),
            Node::Call(Func::Iif, args) => match args.as_slice() {
                [cond, then, otherwise] => {
                    if cond.eval(row)?.bool()? {
                        then.eval(row)
                    } else {
                        otherwise.eval(row)
                    }
                }
                _ => Err(mismatch("IIF")),
            },
            Node::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(row))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, &values, row)
            }
        }
    }
}

impl Scalar {
    fn num(&self) -> Result<f64, Error> {
        match self {
            Scalar::Num(value) => Ok(*value),
            _ => Err(mismatch("a numeric operation")),
        }
    }

    fn bool(&self) -> Result<bool, Error> {
        match self {
            Scalar::Bool(flag) => Ok(*flag),
            _ => Err(mismatch("a logical operation")),
        }
    }

    fn str(&self) -> Result<&str, Error> {
        match self {
            Scalar::Str(text) => Ok(text),
            _ => Err(mismatch("a string operation")),
        }
    }

    fn date(&self) -> Result<Option<Date>, Error> {
        match self {
            Scalar::Date(date) => Ok(*date),
            _ => Err(mismatch("a date operation")),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Scalar::Str(text) => text.trim().is_empty(),
            Scalar::Num(value) => *value == 0.0,
            Scalar::Bool(flag) => !flag,
            Scalar::Date(date) => date.is_none(),
        }
    }
}

fn read_field(field: &FieldRead, row: &Row<'_>) -> Result<Scalar, Error> {
    let wrap = |err: Error| {
        evaluation_error(format!("cannot read field {} at record {}", field.name, row.recno))
            .with_recno(row.recno)
            .with_source(err)
    };
    let decoded = row
        .table
        .fields
        .get(field.position)
        .ok_or_else(|| mismatch("a field reference"))?;
    let cell = decoded.cell(row.table.store(), row.recno).map_err(wrap)?;
    let value = match field.kind {
        FieldKind::Text => Scalar::Str(String::from_utf8_lossy(cell.raw()).into_owned()),
        FieldKind::Memo => Scalar::Str(cell.as_string().map_err(wrap)?),
        FieldKind::Number => Scalar::Num(cell.as_float().map_err(wrap)?),
        FieldKind::Logical => Scalar::Bool(cell.as_bool().map_err(wrap)?),
        FieldKind::Date => Scalar::Date(cell.as_time().map_err(wrap)?.map(|stamp| stamp.date())),
    };
    Ok(value)
}

fn binary(op: BinaryOp, left: Scalar, right: Scalar) -> Result<Scalar, Error> {
    let value = match (op, &left, &right) {
        (BinaryOp::Add, Scalar::Num(l), Scalar::Num(r)) => Scalar::Num(l + r),
        (BinaryOp::Sub, Scalar::Num(l), Scalar::Num(r)) => Scalar::Num(l - r),
        (BinaryOp::Add, Scalar::Str(l), Scalar::Str(r)) => checked_len(format!("{l}{r}"))?,
        // `-` moves the left side's trailing blanks to the end of the result.
        (BinaryOp::Sub, Scalar::Str(l), Scalar::Str(r)) => {
            let trimmed = l.trim_end_matches(' ');
            let blanks = l.len() - trimmed.len();
            checked_len(format!("{trimmed}{r}{}", " ".repeat(blanks)))?
        }
        (BinaryOp::Add, Scalar::Date(date), Scalar::Num(days))
        | (BinaryOp::Add, Scalar::Num(days), Scalar::Date(date)) => {
            Scalar::Date(shift_date(*date, *days)?)
        }
        (BinaryOp::Sub, Scalar::Date(date), Scalar::Num(days)) => {
            Scalar::Date(shift_date(*date, -*days)?)
        }
        (BinaryOp::Sub, Scalar::Date(l), Scalar::Date(r)) => match (l, r) {
            (Some(l), Some(r)) => Scalar::Num((*l - *r).whole_days() as f64),
            _ => Scalar::Num(0.0),
        },
        (BinaryOp::Mul, Scalar::Num(l), Scalar::Num(r)) => Scalar::Num(l * r),
        (BinaryOp::Div, Scalar::Num(l), Scalar::Num(r)) => {
            if *r == 0.0 {
                return Err(evaluation_error("division by zero"));
            }
            Scalar::Num(l / r)
        }
        (BinaryOp::Mod, Scalar::Num(l), Scalar::Num(r)) => {
            if *r == 0.0 {
                return Err(evaluation_error("modulo by zero"));
            }
            Scalar::Num(l % r)
        }
        (BinaryOp::Pow, Scalar::Num(l), Scalar::Num(r)) => Scalar::Num(l.powf(*r)),
        (BinaryOp::Contains, Scalar::Str(needle), Scalar::Str(haystack)) => {
            Scalar::Bool(haystack.contains(needle.as_str()))
        }
        (BinaryOp::Eq, _, _) => Scalar::Bool(loose_eq(&left, &right)?),
        (BinaryOp::Ne, _, _) => Scalar::Bool(!loose_eq(&left, &right)?),
        (BinaryOp::ExactEq, Scalar::Str(l), Scalar::Str(r)) => {
            Scalar::Bool(l.trim_end_matches(' ') == r.trim_end_matches(' '))
        }
        (BinaryOp::ExactEq, _, _) => Scalar::Bool(order(&left, &right)? == Some(Ordering::Equal)),
        (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge, _, _) => {
            let Some(ordering) = order(&left, &right)? else {
                return Ok(Scalar::Bool(false));
            };
            Scalar::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        _ => return Err(mismatch(&format!("{op:?}"))),
    };
    Ok(value)
}

/// `=` with exact matching off: the left side only has to begin with the right side.
fn loose_eq(left: &Scalar, right: &Scalar) -> Result<bool, Error> {
    match (left, right) {
        (Scalar::Str(l), Scalar::Str(r)) => {
            let mut padded = l.chars().chain(std::iter::repeat(' '));
            Ok(r.chars().all(|want| padded.next() == Some(want)))
        }
        _ => Ok(order(left, right)? == Some(Ordering::Equal)),
    }
}

/// Strings compare blank-padded to the longer length; blank dates sort first.
fn order(left: &Scalar, right: &Scalar) -> Result<Option<Ordering>, Error> {
    let ordering = match (left, right) {
        (Scalar::Str(l), Scalar::Str(r)) => {
            let width = l.chars().count().max(r.chars().count());
            let l = l.chars().chain(std::iter::repeat(' ')).take(width);
            let r = r.chars().chain(std::iter::repeat(' ')).take(width);
            Some(l.cmp(r))
        }
        (Scalar::Num(l), Scalar::Num(r)) => l.partial_cmp(r),
        (Scalar::Bool(l), Scalar::Bool(r)) => Some(l.cmp(r)),
        (Scalar::Date(l), Scalar::Date(r)) => Some(l.cmp(r)),
        _ => return Err(mismatch("a comparison")),
    };
    Ok(ordering)
}

fn shift_date(date: Option<Date>, days: f64) -> Result<Option<Date>, Error> {
    let Some(date) = date else {
        return Ok(None);
    };
    date.checked_add(Duration::days(days.trunc() as i64))
        .map(Some)
        .ok_or_else(|| evaluation_error(format!("date arithmetic overflowed ({date} + {days} days)")))
}

fn arg(values: &[Scalar], idx: usize) -> Result<&Scalar, Error> {
    values.get(idx).ok_or_else(|| mismatch("a call"))
}

/// Longest string an expression may build; xBase character values top out here.
const MAX_STRING_LEN: usize = 65_535;

/// A count that sizes a new string, rejected past `MAX_STRING_LEN`.
fn length_arg(values: &[Scalar], idx: usize, func: &str) -> Result<Option<usize>, Error> {
    let Some(count) = count_arg(values, idx)? else {
        return Ok(None);
    };
    if count > MAX_STRING_LEN {
        return Err(evaluation_error(format!(
            "{func} length {} exceeds the {MAX_STRING_LEN}-character limit",
            values[idx].num()?
        )));
    }
    Ok(Some(count))
}

fn checked_len(text: String) -> Result<Scalar, Error> {
    if text.len() > MAX_STRING_LEN {
        return Err(evaluation_error(format!(
            "string of {} bytes exceeds the {MAX_STRING_LEN}-character limit",
            text.len()
        )));
    }
    Ok(Scalar::Str(text))
}

fn count_arg(values: &[Scalar], idx: usize) -> Result<Option<usize>, Error> {
    match values.get(idx) {
        Some(value) => Ok(Some(value.num()?.max(0.0) as usize)),
        None => Ok(None),
    }
}

fn call(func: Func, values: &[Scalar], row: &Row<'_>) -> Result<Scalar, Error> {
    let text = |idx: usize| arg(values, idx).and_then(Scalar::str);
    let number = |idx: usize| arg(values, idx).and_then(Scalar::num);
    let date = |idx: usize| arg(values, idx).and_then(Scalar::date);

    let value = match func {
        Func::Substr => {
            let start = number(1)?.max(1.0) as usize - 1;
            let chars = text(0)?.chars().skip(start);
            Scalar::Str(match count_arg(values, 2)? {
                Some(len) => chars.take(len).collect(),
                None => chars.collect(),
            })
        }
        Func::Left => Scalar::Str(text(0)?.chars().take(number(1)?.max(0.0) as usize).collect()),
        Func::Right => {
            let source = text(0)?;
            let total = source.chars().count();
            let keep = (number(1)?.max(0.0) as usize).min(total);
            Scalar::Str(source.chars().skip(total - keep).collect())
        }
        Func::Upper => Scalar::Str(text(0)?.to_uppercase()),
        Func::Lower => Scalar::Str(text(0)?.to_lowercase()),
        Func::Trim => Scalar::Str(text(0)?.trim_end().to_string()),
        Func::Ltrim => Scalar::Str(text(0)?.trim_start().to_string()),
        Func::Alltrim => Scalar::Str(text(0)?.trim().to_string()),
        Func::Len => Scalar::Num(text(0)?.chars().count() as f64),
        Func::At => {
            let (needle, haystack) = (text(0)?, text(1)?);
            let found = haystack
                .find(needle)
                .map(|byte| haystack[..byte].chars().count() + 1)
                .unwrap_or(0);
            Scalar::Num(found as f64)
        }
        Func::Space => {
            let count = length_arg(values, 0, "SPACE")?.ok_or_else(|| mismatch("SPACE"))?;
            Scalar::Str(" ".repeat(count))
        }
        Func::Str => {
            let width = length_arg(values, 1, "STR")?.unwrap_or(10);
            let decimals = length_arg(values, 2, "STR")?.unwrap_or(0);
            Scalar::Str(str_number(number(0)?, width, decimals))
        }
        Func::Val => Scalar::Num(leading_number(text(0)?)),
        Func::Dtos => Scalar::Str(match date(0)? {
            Some(date) => format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day()),
            None => " ".repeat(8),
        }),
        Func::Dtoc => Scalar::Str(match date(0)? {
            Some(date) => format!("{:02}/{:02}/{:04}", u8::from(date.month()), date.day(), date.year()),
            None => "  /  /    ".to_string(),
        }),
        Func::Ctod => Scalar::Date(parse_mdy(text(0)?)),
        Func::Stod => Scalar::Date(parse_compact(text(0)?)),
        Func::Year => Scalar::Num(date(0)?.map(|d| d.year() as f64).unwrap_or(0.0)),
        Func::Month => Scalar::Num(date(0)?.map(|d| u8::from(d.month()) as f64).unwrap_or(0.0)),
        Func::Day => Scalar::Num(date(0)?.map(|d| d.day() as f64).unwrap_or(0.0)),
        Func::Date => Scalar::Date(Some(OffsetDateTime::now_utc().date())),
        Func::Recno => Scalar::Num(row.recno as f64),
        Func::Reccount => Scalar::Num(row.table.store().record_count() as f64),
        Func::Deleted => Scalar::Bool(row.table.store().is_deleted(row.recno).map_err(|err| {
            evaluation_error(format!("cannot read deletion flag of record {}", row.recno))
                .with_source(err)
        })?),
        Func::Abs => Scalar::Num(number(0)?.abs()),
        Func::Int => Scalar::Num(number(0)?.trunc()),
        Func::Round => {
            let places = values.get(1).map(Scalar::num).transpose()?.unwrap_or(0.0);
            let scale = 10f64.powi(places.trunc() as i32);
            Scalar::Num((number(0)? * scale).round() / scale)
        }
        Func::Empty => Scalar::Bool(values.first().ok_or_else(|| mismatch("EMPTY"))?.is_empty()),
        Func::Iif => return Err(mismatch("IIF")),
    };
    Ok(value)
}

/// Right-aligned in `width` columns; overflow fills the width with `*`.
fn str_number(value: f64, width: usize, decimals: usize) -> String {
    let text = format!("{value:>width$.decimals$}");
    if text.len() > width {
        "*".repeat(width)
    } else {
        text
    }
}

fn leading_number(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    while let Some(byte) = bytes.get(end) {
        match byte {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    text[..end].parse::<f64>().unwrap_or(0.0)
}

fn parse_mdy(text: &str) -> Option<Date> {
    let mut parts = text.trim().split('/');
    let month = parts.next()?.trim().parse::<u8>().ok()?;
    let day = parts.next()?.trim().parse::<u8>().ok()?;
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn parse_compact(text: &str) -> Option<Date> {
    let text = text.trim();
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = text[0..4].parse::<i32>().ok()?;
    let month = text[4..6].parse::<u8>().ok()?;
    let day = text[6..8].parse::<u8>().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

#[cfg(test)]
mod tests {
    use super::{Scalar, binary, leading_number, loose_eq, parse_mdy, str_number};
    use crate::core::error::ErrorKind;
    use crate::core::expr::parser::BinaryOp;
    use time::macros::date;

    fn s(text: &str) -> Scalar {
        Scalar::Str(text.to_string())
    }

    #[test]
    fn string_equality_modes() {
        assert!(loose_eq(&s("Smithers"), &s("Smith")).expect("eq"));
        assert!(loose_eq(&s("Smith   "), &s("Smith")).expect("eq"));
        assert!(loose_eq(&s("abc"), &s("")).expect("eq"));
        assert!(!loose_eq(&s("Smith"), &s("Smithers")).expect("eq"));
        assert!(loose_eq(&s("ab"), &s("ab  ")).expect("padded"));

        let exact = |l: &str, r: &str| binary(BinaryOp::ExactEq, s(l), s(r)).expect("==");
        assert_eq!(exact("Smith   ", "Smith"), Scalar::Bool(true));
        assert_eq!(exact("Smithers", "Smith"), Scalar::Bool(false));
    }

    #[test]
    fn string_and_date_arithmetic() {
        assert_eq!(binary(BinaryOp::Add, s("ab "), s("cd")).expect("+"), s("ab cd"));
        assert_eq!(binary(BinaryOp::Sub, s("ab  "), s("cd")).expect("-"), s("abcd  "));
        assert_eq!(
            binary(BinaryOp::Add, Scalar::Date(Some(date!(2024 - 02 - 28))), Scalar::Num(2.0))
                .expect("date + n"),
            Scalar::Date(Some(date!(2024 - 03 - 01)))
        );
        assert_eq!(
            binary(
                BinaryOp::Sub,
                Scalar::Date(Some(date!(2024 - 03 - 01))),
                Scalar::Date(Some(date!(2024 - 01 - 01)))
            )
            .expect("d - d"),
            Scalar::Num(60.0)
        );
        assert_eq!(
            binary(BinaryOp::Lt, Scalar::Date(None), Scalar::Date(Some(date!(1900 - 01 - 01))))
                .expect("<"),
            Scalar::Bool(true)
        );
    }

    #[test]
    fn runtime_failures_are_evaluation_errors() {
        let err = binary(BinaryOp::Div, Scalar::Num(1.0), Scalar::Num(0.0)).expect_err("div");
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        let err = binary(BinaryOp::Mod, Scalar::Num(1.0), Scalar::Num(0.0)).expect_err("mod");
        assert_eq!(err.kind(), ErrorKind::Evaluation);
    }

    #[test]
    fn conversion_helpers() {
        assert_eq!(str_number(42.0, 5, 0), "   42");
        assert_eq!(str_number(3.14159, 6, 2), "  3.14");
        assert_eq!(str_number(123456.0, 3, 0), "***");
        assert_eq!(leading_number("  -12.5kg"), -12.5);
        assert_eq!(leading_number("abc"), 0.0);
        assert_eq!(parse_mdy("2/29/2024"), Some(date!(2024 - 02 - 29)));
        assert_eq!(parse_mdy("2/30/2024"), None);
        assert_eq!(parse_mdy("  /  /    "), None);
    }
}

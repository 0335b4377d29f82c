//! Purpose: Pratt parser producing a statically typed expression tree.
//! Exports: `Node`, `BinaryOp`, `Func`, `FieldRead`, `FieldKind`, `parse`.
//! Role: Resolves field names and checks operand types while building the tree.
//! Invariants: Every tree this module returns is well typed; evaluation never sees a mismatch.
use crate::core::error::Error;

use super::eval::Scalar;
use super::lexer::{Spanned, Token, tokenize};
use super::{ExprType, parse_error};

/// How a field's cell becomes an expression value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FieldKind {
    /// Raw padded text, so `=` sees trailing blanks the way xBase does.
    Text,
    Memo,
    Number,
    Logical,
    Date,
}

impl FieldKind {
    pub(crate) fn expr_type(self) -> ExprType {
        match self {
            FieldKind::Text | FieldKind::Memo => ExprType::Character,
            FieldKind::Number => ExprType::Numeric,
            FieldKind::Logical => ExprType::Logical,
            FieldKind::Date => ExprType::Date,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FieldRead {
    pub position: usize,
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    ExactEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "=",
            BinaryOp::ExactEq => "==",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Contains => "$",
        }
    }

    fn result_type(self, left: ExprType, right: ExprType) -> Option<ExprType> {
        use ExprType::{Character as S, Date as D, Logical as B, Numeric as N};
        match (self, left, right) {
            (BinaryOp::Add, N, N) | (BinaryOp::Sub, N, N) | (BinaryOp::Sub, D, D) => Some(N),
            (BinaryOp::Add | BinaryOp::Sub, S, S) => Some(S),
            (BinaryOp::Add, D, N) | (BinaryOp::Add, N, D) | (BinaryOp::Sub, D, N) => Some(D),
            (BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow, N, N) => Some(N),
            (BinaryOp::Contains, S, S) => Some(B),
            (
                BinaryOp::Eq
                | BinaryOp::ExactEq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge,
                l,
                r,
            ) if l == r => Some(B),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Func {
    Substr,
    Left,
    Right,
    Upper,
    Lower,
    Trim,
    Ltrim,
    Alltrim,
    Len,
    At,
    Space,
    Str,
    Val,
    Dtos,
    Dtoc,
    Ctod,
    Stod,
    Year,
    Month,
    Day,
    Date,
    Iif,
    Recno,
    Reccount,
    Deleted,
    Abs,
    Int,
    Round,
    Empty,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        let func = match name.to_ascii_uppercase().as_str() {
            "SUBSTR" => Func::Substr,
            "LEFT" => Func::Left,
            "RIGHT" => Func::Right,
            "UPPER" => Func::Upper,
            "LOWER" => Func::Lower,
            "TRIM" | "RTRIM" => Func::Trim,
            "LTRIM" => Func::Ltrim,
            "ALLTRIM" => Func::Alltrim,
            "LEN" => Func::Len,
            "AT" => Func::At,
            "SPACE" => Func::Space,
            "STR" => Func::Str,
            "VAL" => Func::Val,
            "DTOS" => Func::Dtos,
            "DTOC" => Func::Dtoc,
            "CTOD" => Func::Ctod,
            "STOD" => Func::Stod,
            "YEAR" => Func::Year,
            "MONTH" => Func::Month,
            "DAY" => Func::Day,
            "DATE" => Func::Date,
            "IIF" => Func::Iif,
            "RECNO" => Func::Recno,
            "RECCOUNT" => Func::Reccount,
            "DELETED" => Func::Deleted,
            "ABS" => Func::Abs,
            "INT" => Func::Int,
            "ROUND" => Func::Round,
            "EMPTY" => Func::Empty,
            _ => return None,
        };
        Some(func)
    }

    /// Parameter types, how many are required, and the result type.
    fn signature(self) -> (&'static [ExprType], usize, ExprType) {
        use ExprType::{Character as S, Date as D, Logical as B, Numeric as N};
        match self {
            Func::Substr => (&[S, N, N], 2, S),
            Func::Left | Func::Right => (&[S, N], 2, S),
            Func::Upper | Func::Lower | Func::Trim | Func::Ltrim | Func::Alltrim => (&[S], 1, S),
            Func::Len | Func::Val => (&[S], 1, N),
            Func::At => (&[S, S], 2, N),
            Func::Space => (&[N], 1, S),
            Func::Str => (&[N, N, N], 1, S),
            Func::Dtos | Func::Dtoc => (&[D], 1, S),
            Func::Ctod | Func::Stod => (&[S], 1, D),
            Func::Year | Func::Month | Func::Day => (&[D], 1, N),
            Func::Date => (&[], 0, D),
            Func::Recno | Func::Reccount => (&[], 0, N),
            Func::Deleted => (&[], 0, B),
            Func::Abs | Func::Int => (&[N], 1, N),
            Func::Round => (&[N, N], 1, N),
            // Checked separately; both accept more than one type.
            Func::Iif | Func::Empty => (&[], 0, B),
        }
    }

    fn check(self, name: &str, args: &[ExprType]) -> Result<ExprType, String> {
        match self {
            Func::Iif => match args {
                [ExprType::Logical, then, otherwise] if then == otherwise => Ok(*then),
                [ExprType::Logical, then, otherwise] => Err(format!(
                    "IIF branches must have the same type (got {then} and {otherwise})"
                )),
                [_, _, _] => Err("IIF condition must be logical".to_string()),
                _ => Err(format!("IIF expects 3 arguments, got {}", args.len())),
            },
            Func::Empty => match args {
                [_] => Ok(ExprType::Logical),
                _ => Err(format!("EMPTY expects 1 argument, got {}", args.len())),
            },
            _ => {
                let (params, required, result) = self.signature();
                if args.len() < required || args.len() > params.len() {
                    let expected = if required == params.len() {
                        required.to_string()
                    } else {
                        format!("{required} to {}", params.len())
                    };
                    return Err(format!(
                        "{} expects {expected} argument(s), got {}",
                        name.to_ascii_uppercase(),
                        args.len()
                    ));
                }
                for (idx, (got, want)) in args.iter().zip(params).enumerate() {
                    if got != want {
                        return Err(format!(
                            "{} argument {} must be {want}, got {got}",
                            name.to_ascii_uppercase(),
                            idx + 1
                        ));
                    }
                }
                Ok(result)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Const(Scalar),
    Field(FieldRead),
    Neg(Box<Node>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

type Typed = (Node, ExprType);

enum Infix {
    Or,
    And,
    Binary(BinaryOp),
}

// Binding powers, loosest first. `^` is right-associative.
const OR_BP: (u8, u8) = (1, 2);
const AND_BP: (u8, u8) = (3, 4);
const NOT_BP: u8 = 5;
const COMPARE_BP: (u8, u8) = (7, 8);
const ADD_BP: (u8, u8) = (9, 10);
const MUL_BP: (u8, u8) = (11, 12);
const NEG_BP: u8 = 13;
const POW_BP: (u8, u8) = (14, 13);

fn infix(token: &Token) -> Option<(Infix, (u8, u8))> {
    let entry = match token {
        Token::Or => (Infix::Or, OR_BP),
        Token::And => (Infix::And, AND_BP),
        Token::Eq => (Infix::Binary(BinaryOp::Eq), COMPARE_BP),
        Token::ExactEq => (Infix::Binary(BinaryOp::ExactEq), COMPARE_BP),
        Token::NotEq => (Infix::Binary(BinaryOp::Ne), COMPARE_BP),
        Token::Lt => (Infix::Binary(BinaryOp::Lt), COMPARE_BP),
        Token::Le => (Infix::Binary(BinaryOp::Le), COMPARE_BP),
        Token::Gt => (Infix::Binary(BinaryOp::Gt), COMPARE_BP),
        Token::Ge => (Infix::Binary(BinaryOp::Ge), COMPARE_BP),
        Token::Contains => (Infix::Binary(BinaryOp::Contains), COMPARE_BP),
        Token::Plus => (Infix::Binary(BinaryOp::Add), ADD_BP),
        Token::Minus => (Infix::Binary(BinaryOp::Sub), ADD_BP),
        Token::Star => (Infix::Binary(BinaryOp::Mul), MUL_BP),
        Token::Slash => (Infix::Binary(BinaryOp::Div), MUL_BP),
        Token::Percent => (Infix::Binary(BinaryOp::Mod), MUL_BP),
        Token::Power => (Infix::Binary(BinaryOp::Pow), POW_BP),
        _ => return None,
    };
    Some(entry)
}

/// Parses and type-checks `source`, resolving field names through `resolve`.
pub(crate) fn parse<R>(source: &str, resolve: R) -> Result<Typed, Error>
where
    R: Fn(&str) -> Option<FieldRead>,
{
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        resolve: &resolve,
    };
    if parser.peek().token == Token::End {
        return Err(parse_error(source, 0, "expression is empty"));
    }
    let typed = parser.expression(0)?;
    let trailing = parser.peek();
    if trailing.token != Token::End {
        return Err(parse_error(source, trailing.offset, "unexpected trailing input"));
    }
    Ok(typed)
}

struct Parser<'s, 'r> {
    source: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
    resolve: &'r dyn Fn(&str) -> Option<FieldRead>,
}

impl Parser<'_, '_> {
    fn peek(&self) -> &Spanned {
        // tokenize always ends with `End`, and `advance` never steps past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.peek().clone();
        if spanned.token != Token::End {
            self.pos += 1;
        }
        spanned
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<(), Error> {
        let spanned = self.advance();
        if spanned.token != want {
            return Err(self.error(spanned.offset, &format!("expected {what}")));
        }
        Ok(())
    }

    fn error(&self, offset: usize, detail: &str) -> Error {
        parse_error(self.source, offset, detail)
    }

    fn expression(&mut self, min_bp: u8) -> Result<Typed, Error> {
        let mut left = self.prefix()?;
        loop {
            let spanned = self.peek();
            let offset = spanned.offset;
            let Some((op, (lbp, rbp))) = infix(&spanned.token) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.advance();
            let right = self.expression(rbp)?;
            left = self.combine(op, left, right, offset)?;
        }
        Ok(left)
    }

    fn combine(&self, op: Infix, left: Typed, right: Typed, offset: usize) -> Result<Typed, Error> {
        let (lnode, ltype) = left;
        let (rnode, rtype) = right;
        match op {
            Infix::And | Infix::Or => {
                if ltype != ExprType::Logical || rtype != ExprType::Logical {
                    let name = if matches!(op, Infix::And) { "AND" } else { "OR" };
                    return Err(self.error(
                        offset,
                        &format!("{name} needs logical operands, got {ltype} and {rtype}"),
                    ));
                }
                let node = match op {
                    Infix::And => Node::And(Box::new(lnode), Box::new(rnode)),
                    _ => Node::Or(Box::new(lnode), Box::new(rnode)),
                };
                Ok((node, ExprType::Logical))
            }
            Infix::Binary(op) => {
                let ty = op.result_type(ltype, rtype).ok_or_else(|| {
                    self.error(
                        offset,
                        &format!("operator {} cannot combine {ltype} and {rtype}", op.symbol()),
                    )
                })?;
                Ok((Node::Binary(op, Box::new(lnode), Box::new(rnode)), ty))
            }
        }
    }

    fn prefix(&mut self) -> Result<Typed, Error> {
        let Spanned { token, offset } = self.advance();
        match token {
            Token::Number(value) => Ok((Node::Const(Scalar::Num(value)), ExprType::Numeric)),
            Token::Str(text) => Ok((Node::Const(Scalar::Str(text)), ExprType::Character)),
            Token::Logical(flag) => Ok((Node::Const(Scalar::Bool(flag)), ExprType::Logical)),
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Minus => {
                let node = self.signed(offset)?;
                Ok((Node::Neg(Box::new(node)), ExprType::Numeric))
            }
            Token::Plus => Ok((self.signed(offset)?, ExprType::Numeric)),
            Token::Not => {
                let (node, ty) = self.expression(NOT_BP)?;
                if ty != ExprType::Logical {
                    return Err(self.error(offset, &format!("NOT needs a logical operand, got {ty}")));
                }
                Ok((Node::Not(Box::new(node)), ty))
            }
            Token::Ident(name) => {
                if self.peek().token == Token::LParen {
                    self.advance();
                    return self.call(&name, offset);
                }
                let name = if self.peek().token == Token::Arrow {
                    self.advance();
                    let Spanned { token, offset } = self.advance();
                    let Token::Ident(field) = token else {
                        return Err(self.error(offset, "expected a field name after '->'"));
                    };
                    field
                } else {
                    name
                };
                let field = (self.resolve)(&name)
                    .ok_or_else(|| self.error(offset, &format!("unknown field {name:?}")))?;
                let ty = field.kind.expr_type();
                Ok((Node::Field(field), ty))
            }
            Token::End => Err(self.error(offset, "unexpected end of expression")),
            other => Err(self.error(offset, &format!("unexpected token {other:?}"))),
        }
    }

    fn signed(&mut self, offset: usize) -> Result<Node, Error> {
        let (node, ty) = self.expression(NEG_BP)?;
        if ty != ExprType::Numeric {
            return Err(self.error(offset, &format!("unary sign needs a numeric operand, got {ty}")));
        }
        Ok(node)
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<Typed, Error> {
        let func = Func::from_name(name)
            .ok_or_else(|| self.error(offset, &format!("unknown function {name}()")))?;
        let mut nodes = Vec::new();
        let mut types = Vec::new();
        if self.peek().token != Token::RParen {
            loop {
                let (node, ty) = self.expression(0)?;
                nodes.push(node);
                types.push(ty);
                if self.peek().token != Token::Comma {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Token::RParen, "')' to close the argument list")?;
        let ty = func
            .check(name, &types)
            .map_err(|detail| self.error(offset, &detail))?;
        Ok((Node::Call(func, nodes), ty))
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryOp, FieldKind, FieldRead, Node, parse};
    use crate::core::error::ErrorKind;
    use crate::core::expr::ExprType;

    fn resolve(name: &str) -> Option<FieldRead> {
        let (position, kind) = match name.to_ascii_uppercase().as_str() {
            "NAME" => (0, FieldKind::Text),
            "AGE" => (1, FieldKind::Number),
            "ACTIVE" => (2, FieldKind::Logical),
            "BORN" => (3, FieldKind::Date),
            _ => return None,
        };
        Some(FieldRead {
            position,
            name: name.to_ascii_uppercase(),
            kind,
        })
    }

    fn type_of(source: &str) -> ExprType {
        parse(source, resolve).expect("parse").1
    }

    fn parse_err(source: &str) -> String {
        let err = parse(source, resolve).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Parse);
        err.to_string()
    }

    #[test]
    fn precedence_and_types() {
        assert_eq!(type_of("AGE + 1 * 2 > 3 .AND. ACTIVE"), ExprType::Logical);
        assert_eq!(type_of("TRIM(NAME) + '!'"), ExprType::Character);
        assert_eq!(type_of("BORN + 30"), ExprType::Date);
        assert_eq!(type_of("BORN - BORN"), ExprType::Numeric);
        assert_eq!(type_of("IIF(ACTIVE, 'y', 'n')"), ExprType::Character);
        assert_eq!(type_of("people->name = 'A'"), ExprType::Logical);

        let (node, _) = parse("1 + 2 * 3", resolve).expect("parse");
        let Node::Binary(BinaryOp::Add, _, right) = node else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*right, Node::Binary(BinaryOp::Mul, _, _)));

        let (node, _) = parse("NOT ACTIVE AND ACTIVE", resolve).expect("parse");
        assert!(matches!(node, Node::And(_, _)));

        let (node, _) = parse("2 ^ 3 ** 2", resolve).expect("parse");
        let Node::Binary(BinaryOp::Pow, _, right) = node else {
            panic!("expected power at the root");
        };
        assert!(matches!(*right, Node::Binary(BinaryOp::Pow, _, _)));
    }

    #[test]
    fn type_errors_are_parse_errors() {
        assert!(parse_err("AGE + NAME").contains("cannot combine numeric and character"));
        assert!(parse_err("NAME .AND. ACTIVE").contains("logical operands"));
        assert!(parse_err("IIF(ACTIVE, 1, 'x')").contains("same type"));
        assert!(parse_err("UPPER(AGE)").contains("argument 1 must be character"));
        assert!(parse_err("SUBSTR(NAME)").contains("2 to 3"));
        assert!(parse_err("ZIP = 1").contains("unknown field"));
        assert!(parse_err("FOO(1)").contains("unknown function"));
        assert!(parse_err("AGE > ").contains("unexpected end"));
        assert!(parse_err("(AGE > 1").contains("')'"));
        assert!(parse_err("AGE 1").contains("trailing"));
        assert!(parse_err("   ").contains("empty"));
        assert!(parse_err("-NAME").contains("numeric operand"));
    }
}

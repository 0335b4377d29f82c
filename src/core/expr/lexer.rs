// Tokenizer for xBase-style filter expressions.
use crate::core::error::Error;

use super::parse_error;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Logical(bool),
    Ident(String),
    Arrow,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    Eq,
    ExactEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    And,
    Or,
    Not,
    End,
}

/// A token and the byte offset it starts at.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, Error> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let next = bytes.get(pos + 1).copied();
        let (token, width) = match bytes[pos] {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'0'..=b'9' => number(source, start)?,
            b'.' if next.is_some_and(|b| b.is_ascii_digit()) => number(source, start)?,
            b'.' => dotted_word(source, start)?,
            quote @ (b'\'' | b'"' | b'[') => {
                let close = if quote == b'[' { ']' } else { quote as char };
                let body = &source[start + 1..];
                let end = body
                    .find(close)
                    .ok_or_else(|| parse_error(source, start, "unterminated string"))?;
                (Token::Str(body[..end].to_string()), end + 2)
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let len = bytes[start..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                    .count();
                (word(&source[start..start + len]), len)
            }
            b'-' if next == Some(b'>') => (Token::Arrow, 2),
            b'*' if next == Some(b'*') => (Token::Power, 2),
            b'=' if next == Some(b'=') => (Token::ExactEq, 2),
            b'<' if next == Some(b'>') => (Token::NotEq, 2),
            b'<' if next == Some(b'=') => (Token::Le, 2),
            b'>' if next == Some(b'=') => (Token::Ge, 2),
            b'!' if next == Some(b'=') => (Token::NotEq, 2),
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            b',' => (Token::Comma, 1),
            b'+' => (Token::Plus, 1),
            b'-' => (Token::Minus, 1),
            b'*' => (Token::Star, 1),
            b'/' => (Token::Slash, 1),
            b'%' => (Token::Percent, 1),
            b'^' => (Token::Power, 1),
            b'=' => (Token::Eq, 1),
            b'#' => (Token::NotEq, 1),
            b'<' => (Token::Lt, 1),
            b'>' => (Token::Gt, 1),
            b'$' => (Token::Contains, 1),
            b'!' => (Token::Not, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(parse_error(source, start, &format!("unexpected character {ch:?}")));
            }
        };
        pos += width;
        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    tokens.push(Spanned {
        token: Token::End,
        offset: bytes.len(),
    });
    Ok(tokens)
}

fn number(source: &str, start: usize) -> Result<(Token, usize), Error> {
    let bytes = &source.as_bytes()[start..];
    let mut len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    // A dot only belongs to the number when a digit follows, so `1.AND.` still lexes.
    if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(|b| b.is_ascii_digit()) {
        len += 1;
        len += bytes[len..].iter().take_while(|b| b.is_ascii_digit()).count();
    }
    if matches!(bytes.get(len), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(len + 1), Some(b'+' | b'-')));
        let digits = bytes[len + 1 + sign..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits > 0 {
            len += 1 + sign + digits;
        }
    }
    if bytes.get(len).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') {
        return Err(parse_error(
            source,
            start,
            "numeric literals are decimal digits with an optional exponent, e.g. 1500 or 1.5e3",
        ));
    }
    let text = &source[start..start + len];
    let value = text
        .parse::<f64>()
        .map_err(|_| parse_error(source, start, &format!("invalid number {text:?}")))?;
    Ok((Token::Number(value), len))
}

fn dotted_word(source: &str, start: usize) -> Result<(Token, usize), Error> {
    let body = &source[start + 1..];
    let len = body.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
    if body.as_bytes().get(len) != Some(&b'.') || len == 0 {
        return Err(parse_error(source, start, "expected .T., .F., .AND., .OR. or .NOT."));
    }
    let token = match body[..len].to_ascii_uppercase().as_str() {
        "T" | "Y" => Token::Logical(true),
        "F" | "N" => Token::Logical(false),
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        other => {
            return Err(parse_error(source, start, &format!("unknown operator .{other}.")));
        }
    };
    Ok((token, len + 2))
}

fn word(text: &str) -> Token {
    match text.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        _ => Token::Ident(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Token, tokenize};
    use crate::core::error::ErrorKind;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn dotted_operators_and_literals() {
        assert_eq!(
            kinds("AGE>=21.AND..NOT.active .or. .t."),
            vec![
                Token::Ident("AGE".into()),
                Token::Ge,
                Token::Number(21.0),
                Token::And,
                Token::Not,
                Token::Ident("active".into()),
                Token::Or,
                Token::Logical(true),
                Token::End,
            ]
        );
    }

    #[test]
    fn numbers_with_exponents() {
        assert_eq!(
            kinds("1e3 + 2.5E-2 - .5e+1"),
            vec![
                Token::Number(1000.0),
                Token::Plus,
                Token::Number(0.025),
                Token::Minus,
                Token::Number(5.0),
                Token::End,
            ]
        );
        let err = tokenize("AGE > 0x10").expect_err("hex");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("decimal"));
        assert_eq!(tokenize("1e").expect_err("dangling exponent").kind(), ErrorKind::Parse);
    }

    #[test]
    fn strings_in_three_quote_styles() {
        assert_eq!(
            kinds(r#"'a"b' + "c'd" + [e f]"#),
            vec![
                Token::Str("a\"b".into()),
                Token::Plus,
                Token::Str("c'd".into()),
                Token::Plus,
                Token::Str("e f".into()),
                Token::End,
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        assert_eq!(
            kinds("a->b == c <> d != e # f ** 2 ^ .5"),
            vec![
                Token::Ident("a".into()),
                Token::Arrow,
                Token::Ident("b".into()),
                Token::ExactEq,
                Token::Ident("c".into()),
                Token::NotEq,
                Token::Ident("d".into()),
                Token::NotEq,
                Token::Ident("e".into()),
                Token::NotEq,
                Token::Ident("f".into()),
                Token::Power,
                Token::Number(2.0),
                Token::Power,
                Token::Number(0.5),
                Token::End,
            ]
        );
    }

    #[test]
    fn lexing_errors_name_the_offset() {
        let err = tokenize("NAME = 'open").expect_err("unterminated");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("offset 7"));
        assert_eq!(tokenize("a ; b").expect_err("bad char").kind(), ErrorKind::Parse);
        assert_eq!(tokenize(".XOR.").expect_err("bad op").kind(), ErrorKind::Parse);
    }
}

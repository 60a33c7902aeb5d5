//! Tokenizer for rule scripts

use rust_decimal::Decimal;
use std::str::FromStr;

use super::ast::Span;
use super::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    When,
    Then,
    True,
    False,
    Ident(String),
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Dot,
    Comma,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl TokenKind {
    /// Short description used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            TokenKind::When => "'when'".into(),
            TokenKind::Then => "'then'".into(),
            TokenKind::True => "'true'".into(),
            TokenKind::False => "'false'".into(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Int(v) => format!("integer {}", v),
            TokenKind::Decimal(v) => format!("decimal {}", v),
            TokenKind::Str(s) => format!("string {:?}", s),
            TokenKind::Dot => "'.'".into(),
            TokenKind::Comma => "','".into(),
            TokenKind::Semicolon => "';'".into(),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
            TokenKind::LBracket => "'['".into(),
            TokenKind::RBracket => "']'".into(),
            TokenKind::Assign => "'='".into(),
            TokenKind::EqEq => "'=='".into(),
            TokenKind::NotEq => "'!='".into(),
            TokenKind::Lt => "'<'".into(),
            TokenKind::Le => "'<='".into(),
            TokenKind::Gt => "'>'".into(),
            TokenKind::Ge => "'>='".into(),
            TokenKind::Plus => "'+'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::Star => "'*'".into(),
            TokenKind::Slash => "'/'".into(),
            TokenKind::Percent => "'%'".into(),
            TokenKind::AndAnd => "'&&'".into(),
            TokenKind::OrOr => "'||'".into(),
            TokenKind::Bang => "'!'".into(),
            TokenKind::Eof => "end of script".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Splits a script into tokens, always ending with `Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c == b'/' && bytes.get(pos + 1) == Some(&b'/') {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }

        let start = pos;

        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let word = &source[start..pos];
            let kind = match word {
                "when" => TokenKind::When,
                "then" => TokenKind::Then,
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                _ => TokenKind::Ident(word.to_string()),
            };
            tokens.push(Token { kind, span: Span::new(start, pos) });
            continue;
        }

        if c.is_ascii_digit() {
            let kind = lex_number(source, &mut pos)?;
            tokens.push(Token { kind, span: Span::new(start, pos) });
            continue;
        }

        if c == b'"' {
            let text = lex_string(source, &mut pos)?;
            tokens.push(Token { kind: TokenKind::Str(text), span: Span::new(start, pos) });
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let (kind, width) = match (c, next) {
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(ScriptError::syntax(source, start, format!("unexpected character {:?}", ch)));
            }
        };
        pos += width;
        tokens.push(Token { kind, span: Span::new(start, pos) });
    }

    tokens.push(Token { kind: TokenKind::Eof, span: Span::new(source.len(), source.len()) });
    Ok(tokens)
}

fn lex_number(source: &str, pos: &mut usize) -> Result<TokenKind, ScriptError> {
    let bytes = source.as_bytes();
    let start = *pos;
    let mut is_decimal = false;

    while *pos < bytes.len() {
        let b = bytes[*pos];
        if b.is_ascii_digit() || b == b'_' {
            *pos += 1;
        } else if b == b'.'
            && !is_decimal
            && bytes.get(*pos + 1).map_or(false, |n| n.is_ascii_digit())
        {
            is_decimal = true;
            *pos += 1;
        } else {
            break;
        }
    }

    let digits: String = source[start..*pos].chars().filter(|c| *c != '_').collect();
    if is_decimal {
        Decimal::from_str(&digits)
            .map(TokenKind::Decimal)
            .map_err(|e| ScriptError::syntax(source, start, format!("invalid decimal literal: {}", e)))
    } else {
        digits
            .parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ScriptError::syntax(source, start, "integer literal out of range"))
    }
}

fn lex_string(source: &str, pos: &mut usize) -> Result<String, ScriptError> {
    let start = *pos;
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '"' => {
                *pos = start + 1 + offset + 1;
                return Ok(out);
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((esc_offset, other)) => {
                    return Err(ScriptError::syntax(
                        source,
                        start + 1 + esc_offset,
                        format!("unknown escape sequence \\{}", other),
                    ));
                }
                None => break,
            },
            '\n' => break,
            other => out.push(other),
        }
    }

    Err(ScriptError::syntax(source, start, "unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("when a >= 1 && !b then"),
            vec![
                TokenKind::When,
                TokenKind::Ident("a".into()),
                TokenKind::Ge,
                TokenKind::Int(1),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Ident("b".into()),
                TokenKind::Then,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_with_separators_and_decimals() {
        assert_eq!(
            kinds("1_000_000 12.5"),
            vec![
                TokenKind::Int(1_000_000),
                TokenKind::Decimal(Decimal::new(125, 1)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_member_access_is_not_a_decimal() {
        assert_eq!(
            kinds("Claim.Notes"),
            vec![
                TokenKind::Ident("Claim".into()),
                TokenKind::Dot,
                TokenKind::Ident("Notes".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_comments() {
        assert_eq!(
            kinds("\"LIMIT \\\"X\\\"\" // trailing"),
            vec![TokenKind::Str("LIMIT \"X\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = tokenize("when\n  \"open").unwrap_err();
        match err {
            ScriptError::Syntax { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_character() {
        assert!(tokenize("when a # b").is_err());
    }
}

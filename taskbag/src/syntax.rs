//! # Line Lexer
//!
//! Tokenizer for the small expression grammar the runtime understands:
//! call text handed to `parallel`, directive arguments, and the statements
//! of the native engine. Everything is line-oriented; a `--` outside a
//! string starts a comment that runs to the end of the line.

use std::fmt;

use taskbag_api::Value;

use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Nil,
    True,
    False,
    LParen,
    RParen,
    Comma,
    Assign,
    Colon,
}

impl Token {
    /// The literal value of this token, if it is a literal
    pub fn literal(&self) -> Option<Value> {
        match self {
            Token::Number(n) => Some(Value::Number(*n)),
            Token::Str(s) => Some(Value::String(s.clone())),
            Token::Nil => Some(Value::Nil),
            Token::True => Some(Value::Boolean(true)),
            Token::False => Some(Value::Boolean(false)),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{}", name),
            Token::Number(n) => write!(f, "{}", Value::Number(*n)),
            Token::Str(s) => write!(f, "{}", quote(s)),
            Token::Nil => write!(f, "nil"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Assign => write!(f, "="),
            Token::Colon => write!(f, ":"),
        }
    }
}

/// Splits one line into tokens.
pub fn tokenize(line: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '-' if chars.get(i + 1) == Some(&'-') => break,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '"' | '\'' => {
                let (text, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(text));
                i = next;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '.'))
                || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let (number, next) = read_number(&chars, i)?;
                tokens.push(Token::Number(number));
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "nil" => Token::Nil,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(SyntaxError {
                    column: i + 1,
                    message: format!("unexpected character `{}`", other),
                });
            }
        }
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), SyntaxError> {
    let delimiter = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == delimiter => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1).ok_or_else(|| SyntaxError {
                    column: i + 1,
                    message: "unfinished escape sequence".to_string(),
                })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(SyntaxError {
        column: start + 1,
        message: "unfinished string".to_string(),
    })
}

fn read_number(chars: &[char], start: usize) -> Result<(f64, usize), SyntaxError> {
    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        i += 1;
        if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
            i += 1;
        }
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| SyntaxError {
            column: start + 1,
            message: format!("malformed number `{}`", text),
        })
}

/// Renders `text` as a double-quoted literal the lexer reads back verbatim
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether `name` is usable as a global or function name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_') && !matches!(name, "nil" | "true" | "false")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_call_with_mixed_arguments() {
        let tokens = tokenize(r#"r = f(a, 1.5, "x y", nil, true) -- trailing"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("r".into()),
                Token::Assign,
                Token::Ident("f".into()),
                Token::LParen,
                Token::Ident("a".into()),
                Token::Comma,
                Token::Number(1.5),
                Token::Comma,
                Token::Str("x y".into()),
                Token::Comma,
                Token::Nil,
                Token::Comma,
                Token::True,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_negative_numbers_and_exponents() {
        assert_eq!(tokenize("-3").unwrap(), vec![Token::Number(-3.0)]);
        assert_eq!(tokenize("2e3").unwrap(), vec![Token::Number(2000.0)]);
    }

    #[test]
    fn test_quote_round_trips_through_lexer() {
        let original = "f(\"a\\b\", 'c')";
        let quoted = quote(original);
        assert_eq!(tokenize(&quoted).unwrap(), vec![Token::Str(original.to_string())]);
    }

    #[test]
    fn test_unfinished_string_reports_column() {
        let err = tokenize("x = \"abc").unwrap_err();
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("cell_count"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("nil"));
        assert!(!is_identifier(""));
    }
}

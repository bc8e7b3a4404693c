use taskbag_api::{RuntimeError, Value};

use crate::syntax::{tokenize, Token};

/// One argument of a deferred call.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A global of the calling context, snapshotted at enqueue time
    Global(String),
    /// An inline literal, passed as-is
    Literal(Value),
}

/// Parsed form of the call text handed to `parallel`.
///
/// Accepted shape: `[r1, r2 =] name(arg, ...)` where each argument is a
/// global name or a literal (number, string, boolean, nil).
#[derive(Debug, Clone, PartialEq)]
pub struct CallSpec {
    text: String,
    function: String,
    arguments: Vec<Argument>,
    returns: Vec<String>,
}

impl CallSpec {
    pub fn parse(text: &str) -> Result<Self, RuntimeError> {
        let malformed = |reason: String| RuntimeError::MalformedCall {
            text: text.to_string(),
            reason,
        };

        let tokens = tokenize(text).map_err(|e| malformed(e.to_string()))?;
        let mut cursor = Cursor { tokens: &tokens, pos: 0 };

        let returns = if tokens.contains(&Token::Assign) {
            let mut names = vec![cursor.ident().map_err(&malformed)?];
            while cursor.eat(&Token::Comma) {
                names.push(cursor.ident().map_err(&malformed)?);
            }
            cursor.expect(&Token::Assign).map_err(&malformed)?;
            names
        } else {
            Vec::new()
        };

        let function = cursor
            .ident()
            .map_err(|_| malformed("expected a function name".to_string()))?;
        cursor.expect(&Token::LParen).map_err(&malformed)?;

        let mut arguments = Vec::new();
        if !cursor.eat(&Token::RParen) {
            loop {
                arguments.push(cursor.argument().map_err(&malformed)?);
                if cursor.eat(&Token::Comma) {
                    continue;
                }
                cursor.expect(&Token::RParen).map_err(&malformed)?;
                break;
            }
        }

        if let Some(extra) = cursor.peek() {
            return Err(malformed(format!("unexpected `{}` after the call", extra)));
        }

        Ok(Self {
            text: text.trim().to_string(),
            function,
            arguments,
            returns,
        })
    }

    /// The call text as written
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn returns(&self) -> &[String] {
        &self.returns
    }

    /// Names of the globals the call reads, in argument order
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(|a| match a {
            Argument::Global(name) => Some(name.as_str()),
            Argument::Literal(_) => None,
        })
    }

    pub(crate) fn into_parts(self) -> (String, String, Vec<Argument>, Vec<String>) {
        (self.text, self.function, self.arguments, self.returns)
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        match self.peek() {
            Some(t) if t == token => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(format!("expected `{}`, found `{}`", token, t)),
            None => Err(format!("expected `{}` at end of input", token)),
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(t) => Err(format!("expected a name, found `{}`", t)),
            None => Err("expected a name at end of input".to_string()),
        }
    }

    fn argument(&mut self) -> Result<Argument, String> {
        let token = self.peek().ok_or_else(|| "unclosed argument list".to_string())?;
        let argument = match token {
            Token::Ident(name) => Argument::Global(name.clone()),
            t => match t.literal() {
                Some(value) => Argument::Literal(value),
                None => return Err(format!("unexpected `{}` in argument list", t)),
            },
        };
        self.pos += 1;
        Ok(argument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_call() {
        let call = CallSpec::parse("f(a, b)").unwrap();
        assert_eq!(call.function(), "f");
        assert!(call.returns().is_empty());
        assert_eq!(call.parameter_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_with_returns_and_literals() {
        let call = CallSpec::parse(r#"total, count = sum(cells, 1, "x")"#).unwrap();
        assert_eq!(call.function(), "sum");
        assert_eq!(call.returns(), ["total".to_string(), "count".to_string()]);
        assert_eq!(
            call.arguments(),
            [
                Argument::Global("cells".into()),
                Argument::Literal(Value::Number(1.0)),
                Argument::Literal(Value::String("x".into())),
            ]
        );
    }

    #[test]
    fn test_parse_no_arguments() {
        let call = CallSpec::parse("step()").unwrap();
        assert!(call.arguments().is_empty());
        assert_eq!(call.text(), "step()");
    }

    #[test]
    fn test_malformed_calls() {
        for text in ["", "(a)", "f", "f(a", "f(a,)", "1 = f()", "f() g()", "f(()"] {
            assert!(
                matches!(CallSpec::parse(text), Err(RuntimeError::MalformedCall { .. })),
                "expected `{}` to be rejected",
                text
            );
        }
    }
}

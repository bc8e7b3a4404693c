//! Line-statement interpreter of the native engine.
//!
//! A chunk is a sequence of lines, each holding at most one statement:
//!
//! ```text
//! [local] a, b = expr, expr     -- assignment
//! f(x, "text", 3)               -- call
//! coordinator:parallel("r = f(x)")
//! ```
//!
//! Expressions are literals, globals, calls (`f(args)`) and method calls on
//! the coordinator handle (`recv:method(args)`). As in the scripting
//! languages this engine stands in for, the last expression of a list
//! expands to all of its results and every other one is cut to its first.
//!
//! The whole chunk is parsed before any line runs, so a syntax error on
//! line 20 prevents line 1 from executing.

use taskbag_api::{ExecutionContext, ScriptError, Value};

use super::context::NativeContext;
use super::library::CoordinatorObject;
use crate::syntax::{tokenize, Token};

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Global(String),
    Call { function: String, args: Vec<Expr> },
    Method { receiver: String, method: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Assign { targets: Vec<String>, values: Vec<Expr> },
    Call(Expr),
}

#[derive(Debug, Clone, PartialEq)]
struct Line {
    number: usize,
    statement: Statement,
}

/// A parsed chunk, ready to run in a context
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    name: String,
    lines: Vec<Line>,
}

impl Chunk {
    pub fn parse(name: &str, source: &str) -> Result<Self, ScriptError> {
        let mut lines = Vec::new();
        for (index, text) in source.lines().enumerate() {
            let number = index + 1;
            let load_error = |message: String| ScriptError::Load {
                chunk: name.to_string(),
                line: number,
                message,
            };

            let tokens = tokenize(text).map_err(|e| load_error(format!("syntax error at {}", e)))?;
            if tokens.is_empty() {
                continue;
            }
            let statement = Parser { tokens: &tokens, pos: 0 }
                .statement()
                .map_err(|reason| load_error(format!("syntax error: {}", reason)))?;
            lines.push(Line { number, statement });
        }

        Ok(Self {
            name: name.to_string(),
            lines,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of lines holding a statement
    pub fn statements(&self) -> usize {
        self.lines.len()
    }

    /// Runs every statement in order; the first error stops the chunk
    pub fn run(&self, context: &NativeContext) -> Result<(), ScriptError> {
        for line in &self.lines {
            execute(&line.statement, context).map_err(|err| ScriptError::Load {
                chunk: self.name.clone(),
                line: line.number,
                message: err.to_string(),
            })?;
        }
        Ok(())
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
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
            Some(t) => Err(format!("expected `{}` near `{}`", token, t)),
            None => Err(format!("expected `{}` at end of line", token)),
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(t) => Err(format!("expected a name near `{}`", t)),
            None => Err("expected a name at end of line".to_string()),
        }
    }

    fn statement(mut self) -> Result<Statement, String> {
        let local = matches!(self.peek(), Some(Token::Ident(word)) if word == "local");
        if local {
            self.pos += 1;
        }

        let statement = if local || self.tokens.contains(&Token::Assign) {
            let mut targets = vec![self.ident()?];
            while self.eat(&Token::Comma) {
                targets.push(self.ident()?);
            }
            let values = if self.eat(&Token::Assign) {
                self.expr_list()?
            } else if local {
                Vec::new()
            } else {
                return Err("expected `=`".to_string());
            };
            Statement::Assign { targets, values }
        } else {
            let expr = self.expr()?;
            if !matches!(expr, Expr::Call { .. } | Expr::Method { .. }) {
                return Err("a bare expression is not a statement".to_string());
            }
            Statement::Call(expr)
        };

        match self.peek() {
            Some(extra) => Err(format!("unexpected `{}`", extra)),
            None => Ok(statement),
        }
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, String> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(&Token::LParen)?;
        if self.eat(&Token::RParen) {
            return Ok(Vec::new());
        }
        let args = self.expr_list()?;
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn expr(&mut self) -> Result<Expr, String> {
        if let Some(value) = self.peek().and_then(Token::literal) {
            self.pos += 1;
            return Ok(Expr::Literal(value));
        }

        let name = self.ident()?;
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::LParen), _) => Ok(Expr::Call {
                function: name,
                args: self.arguments()?,
            }),
            (Some(Token::Colon), Some(Token::Ident(_))) => {
                self.pos += 1;
                let method = self.ident()?;
                Ok(Expr::Method {
                    receiver: name,
                    method,
                    args: self.arguments()?,
                })
            }
            _ => Ok(Expr::Global(name)),
        }
    }
}

fn execute(statement: &Statement, context: &NativeContext) -> Result<(), ScriptError> {
    match statement {
        Statement::Assign { targets, values } => {
            let values = evaluate_list(values, context)?;
            for (index, target) in targets.iter().enumerate() {
                context.set_global(target, values.get(index).cloned().unwrap_or_default());
            }
            Ok(())
        }
        Statement::Call(expr) => evaluate(expr, context).map(drop),
    }
}

fn evaluate_list(exprs: &[Expr], context: &NativeContext) -> Result<Vec<Value>, ScriptError> {
    let mut values = Vec::with_capacity(exprs.len());
    for (index, expr) in exprs.iter().enumerate() {
        let results = evaluate(expr, context)?;
        if index + 1 == exprs.len() {
            values.extend(results);
        } else {
            values.push(results.into_iter().next().unwrap_or_default());
        }
    }
    Ok(values)
}

fn evaluate(expr: &Expr, context: &NativeContext) -> Result<Vec<Value>, ScriptError> {
    match expr {
        Expr::Literal(value) => Ok(vec![value.clone()]),
        Expr::Global(name) => Ok(vec![context.global(name).unwrap_or_default()]),
        Expr::Call { function, args } => {
            let args = evaluate_list(args, context)?;
            context.call(function, args)
        }
        Expr::Method { receiver, method, args } => {
            let args = evaluate_list(args, context)?;
            call_method(context, receiver, method, args)
        }
    }
}

fn call_method(
    context: &NativeContext,
    receiver: &str,
    method: &str,
    args: Vec<Value>,
) -> Result<Vec<Value>, ScriptError> {
    let qualified = format!("{}:{}", receiver, method);
    let target = context.global(receiver).unwrap_or_default();
    let is_coordinator = target
        .as_handle()
        .is_some_and(|handle| handle.downcast_ref::<CoordinatorObject>().is_some());
    if !is_coordinator {
        return Err(ScriptError::Runtime {
            function: qualified,
            message: format!("attempt to call a method on a {} value", target.type_name()),
        });
    }

    let runtime = context.runtime()?;
    let first = args.first().cloned().unwrap_or_default();
    let string_argument = || {
        first.as_str().map(str::to_string).ok_or_else(|| ScriptError::Runtime {
            function: qualified.clone(),
            message: format!("expected a string argument, got {}", first.type_name()),
        })
    };

    match method {
        "parallel" => runtime.parallel(context, &string_argument()?)?,
        "join" => runtime.join(&string_argument()?)?,
        "joinall" => runtime.joinall()?,
        "acquire" => runtime.acquire(&first)?,
        "release" => runtime.release(&first)?,
        "np" => {
            // nil, false or no argument only report the current size
            let count = if first.is_truthy() { first.as_count() } else { Some(0) };
            let count = count.ok_or_else(|| ScriptError::Runtime {
                function: qualified.clone(),
                message: format!("expected a non-negative integer, got {}", first),
            })?;
            let size = runtime.np(count)?;
            return Ok(vec![Value::from(size)]);
        }
        other => {
            return Err(ScriptError::Runtime {
                function: qualified.clone(),
                message: format!("Coordinator has no method `{}`", other),
            });
        }
    }
    Ok(Vec::new())
}

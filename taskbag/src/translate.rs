//! # Directive Translator
//!
//! Rewrites an annotated script into an instrumented one that drives the
//! coordinator. Directive lines start (after indentation) with the marker,
//! `--#` by default:
//!
//! | Directive        | Emitted                                  |
//! |------------------|------------------------------------------|
//! | `PARALLEL`       | next call line becomes `coordinator:parallel("<call>")` |
//! | `JOINALL`        | `coordinator:joinall()`                  |
//! | `JOIN <name>`    | `coordinator:join("<name>")`             |
//! | `ACQUIRE <id>`   | `coordinator:acquire(<id>)`              |
//! | `RELEASE <id>`   | `coordinator:release(<id>)`              |
//! | `NP <count>`     | `coordinator:np(<count>)`                |
//!
//! The rewrite keeps one output line per source line behind a single
//! header line, so line `n` of the source is line `n + 1` of the output.
//! A `PARALLEL` directive line stays as it is (it is a comment) and the
//! call it annotates is replaced in place.

use std::fs;
use std::path::{Path, PathBuf};

use taskbag_api::Value;
use tracing::{debug, info};

use crate::config::TranslatorConfig;
use crate::error::{BootstrapError, TranslateError};
use crate::syntax::{self, Token};
use crate::task::CallSpec;

/// Output of a translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    lines: Vec<String>,
    line_map: Vec<Option<usize>>,
    directives: usize,
}

impl Translation {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of directives rewritten
    pub fn directives(&self) -> usize {
        self.directives
    }

    /// Source line (1-based) behind an output line (1-based); `None` for
    /// the header
    pub fn source_line(&self, output_line: usize) -> Option<usize> {
        output_line
            .checked_sub(1)
            .and_then(|index| self.line_map.get(index).copied().flatten())
    }

    /// The instrumented script, newline-terminated
    pub fn to_source(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// A directive line split into keyword and argument text
struct Directive<'a> {
    indent: &'a str,
    keyword: &'a str,
    argument: &'a str,
}

fn parse_directive<'a>(line: &'a str, marker: &str) -> Option<Directive<'a>> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let rest = body.strip_prefix(marker)?.trim();
    let (keyword, argument) = match rest.split_once(char::is_whitespace) {
        Some((keyword, argument)) => (keyword, argument.trim()),
        None => (rest, ""),
    };
    Some(Directive {
        indent,
        keyword,
        argument,
    })
}

/// Translates source text. Carriage returns are normalized first.
pub fn translate_source(source: &str, config: &TranslatorConfig) -> Result<Translation, TranslateError> {
    let normalized = source.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.lines().collect();
    translate_lines(&lines, config)
}

/// Translates a script given as lines.
pub fn translate_lines<S: AsRef<str>>(lines: &[S], config: &TranslatorConfig) -> Result<Translation, TranslateError> {
    let receiver = config.receiver.as_str();
    let mut out = Vec::with_capacity(lines.len() + 1);
    let mut line_map = Vec::with_capacity(lines.len() + 1);
    let mut directives = 0;

    out.push(config.header_line());
    line_map.push(None);

    // set while a PARALLEL directive waits for its call line
    let mut pending_parallel: Option<usize> = None;

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let number = index + 1;
        line_map.push(Some(number));

        if let Some(directive_line) = pending_parallel {
            if line.trim().is_empty() {
                out.push(line.to_string());
                continue;
            }
            pending_parallel = None;
            out.push(rewrite_parallel(line, directive_line, number, receiver)?);
            directives += 1;
            continue;
        }

        let Some(directive) = parse_directive(line, &config.marker) else {
            out.push(line.to_string());
            continue;
        };

        let indent = directive.indent;
        let emitted = match directive.keyword {
            "PARALLEL" => {
                no_argument(&directive, number)?;
                pending_parallel = Some(number);
                out.push(line.to_string());
                continue;
            }
            "JOINALL" => {
                no_argument(&directive, number)?;
                format!("{}{}:joinall()", indent, receiver)
            }
            "JOIN" => {
                let name = function_name(&directive, number)?;
                format!("{}{}:join({})", indent, receiver, syntax::quote(&name))
            }
            "ACQUIRE" => {
                let id = section_id(&directive, number, "ACQUIRE")?;
                format!("{}{}:acquire({})", indent, receiver, id)
            }
            "RELEASE" => {
                let id = section_id(&directive, number, "RELEASE")?;
                format!("{}{}:release({})", indent, receiver, id)
            }
            "NP" => {
                let count = pool_size(&directive, number)?;
                format!("{}{}:np({})", indent, receiver, count)
            }
            other => {
                return Err(TranslateError::UnknownDirective {
                    line: number,
                    keyword: other.to_string(),
                });
            }
        };
        debug!(line = number, directive = directive.keyword, "Rewrote directive");
        out.push(emitted);
        directives += 1;
    }

    if let Some(line) = pending_parallel {
        return Err(TranslateError::MissingCall { line });
    }

    Ok(Translation {
        lines: out,
        line_map,
        directives,
    })
}

fn rewrite_parallel(line: &str, directive_line: usize, number: usize, receiver: &str) -> Result<String, TranslateError> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let call_text = body.trim_end();

    let tokens = syntax::tokenize(call_text).map_err(|e| TranslateError::MalformedCall {
        line: number,
        reason: e.to_string(),
    })?;
    if tokens.is_empty() {
        // the next non-blank line is a comment or another directive
        return Err(TranslateError::MissingCall { line: directive_line });
    }
    CallSpec::parse(call_text).map_err(|e| TranslateError::MalformedCall {
        line: number,
        reason: e.to_string(),
    })?;

    debug!(line = number, call = call_text, "Rewrote PARALLEL call");
    Ok(format!("{}{}:parallel({})", indent, receiver, syntax::quote(call_text)))
}

fn no_argument(directive: &Directive<'_>, line: usize) -> Result<(), TranslateError> {
    if directive.argument.is_empty() || directive.argument.starts_with("--") {
        return Ok(());
    }
    Err(TranslateError::InvalidArgument {
        line,
        directive: if directive.keyword == "PARALLEL" { "PARALLEL" } else { "JOINALL" },
        argument: directive.argument.to_string(),
        reason: "takes no argument".to_string(),
    })
}

fn single_token(
    directive: &Directive<'_>,
    line: usize,
    name: &'static str,
) -> Result<Token, TranslateError> {
    if directive.argument.is_empty() {
        return Err(TranslateError::MissingArgument { line, directive: name });
    }
    let invalid = |reason: String| TranslateError::InvalidArgument {
        line,
        directive: name,
        argument: directive.argument.to_string(),
        reason,
    };
    let mut tokens = syntax::tokenize(directive.argument).map_err(|e| invalid(e.to_string()))?;
    match tokens.len() {
        // a trailing comment leaves nothing behind
        0 => Err(TranslateError::MissingArgument { line, directive: name }),
        1 => Ok(tokens.remove(0)),
        _ => Err(invalid("expected a single value".to_string())),
    }
}

fn function_name(directive: &Directive<'_>, line: usize) -> Result<String, TranslateError> {
    match single_token(directive, line, "JOIN")? {
        Token::Ident(name) => Ok(name),
        Token::Str(name) if syntax::is_identifier(&name) => Ok(name),
        _ => Err(TranslateError::InvalidArgument {
            line,
            directive: "JOIN",
            argument: directive.argument.to_string(),
            reason: "expected a function name".to_string(),
        }),
    }
}

fn section_id(directive: &Directive<'_>, line: usize, name: &'static str) -> Result<String, TranslateError> {
    match single_token(directive, line, name)? {
        token @ (Token::Number(_) | Token::Str(_)) => Ok(token.to_string()),
        _ => Err(TranslateError::InvalidArgument {
            line,
            directive: name,
            argument: directive.argument.to_string(),
            reason: "expected a number or a quoted string".to_string(),
        }),
    }
}

fn pool_size(directive: &Directive<'_>, line: usize) -> Result<usize, TranslateError> {
    single_token(directive, line, "NP")?
        .literal()
        .as_ref()
        .and_then(Value::as_count)
        .ok_or_else(|| TranslateError::InvalidArgument {
            line,
            directive: "NP",
            argument: directive.argument.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
}

/// Path of the instrumented sibling of `path`
pub fn output_path(path: &Path, config: &TranslatorConfig) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", config.output_prefix, file_name))
}

/// Translates the file at `path` and writes the result next to it.
/// Returns the path written.
pub fn translate_file(path: impl AsRef<Path>, config: &TranslatorConfig) -> Result<PathBuf, BootstrapError> {
    let path = path.as_ref();
    let (output, _) = translate_file_with_map(path, config)?;
    Ok(output)
}

pub(crate) fn translate_file_with_map(
    path: &Path,
    config: &TranslatorConfig,
) -> Result<(PathBuf, Translation), BootstrapError> {
    let source = fs::read_to_string(path).map_err(|source| BootstrapError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let translation = translate_source(&source, config).map_err(|source| BootstrapError::Translate {
        path: path.to_path_buf(),
        source,
    })?;

    let output = output_path(path, config);
    fs::write(&output, translation.to_source()).map_err(|source| BootstrapError::Write {
        path: output.clone(),
        source,
    })?;
    info!(
        source = %path.display(),
        output = %output.display(),
        directives = translation.directives(),
        "Wrote instrumented script"
    );
    Ok((output, translation))
}

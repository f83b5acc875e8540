//! Word splitting and interpreted procedures.
//!
//! Definition blocks, argument specs and procedure bodies share one small
//! word syntax:
//!
//! - commands are separated by newlines or `;`
//! - words are separated by spaces or tabs
//! - `{...}` groups a word verbatim (braces nest)
//! - `"..."` groups a word with backslash escapes
//! - `#` at the start of a command comments out the rest of the line
//!
//! A [`ScriptProc`] binds its argument spec against the call's parameters,
//! substitutes `$name` in unbraced words and runs each body command through
//! the session. `return` ends the body early.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::error::EnsembleError;
use crate::handler::{HandlerResult, Invocation};
use crate::manager::EnsembleManager;

/// A syntax error in a word list or command block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line where the error was detected.
    pub line: usize,
    /// Human-readable description.
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// One word of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Word text with quoting removed.
    pub text: String,
    /// True for `{...}` words, which are never substituted.
    pub braced: bool,
    /// 1-based line the word starts on.
    pub line: usize,
}

/// One command: a non-empty list of words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The words, first one is the command name.
    pub words: Vec<Word>,
    /// 1-based line the command starts on.
    pub line: usize,
}

impl Command {
    /// Word texts, quoting removed.
    pub fn texts(&self) -> Vec<String> {
        self.words.iter().map(|w| w.text.clone()).collect()
    }
}

/// Splits a block into commands.
///
/// `first_line` is the line number of the first character of `input`, so
/// nested blocks report positions relative to the enclosing source.
pub fn split_commands(input: &str, first_line: usize) -> Result<Vec<Command>, ParseError> {
    Lexer::new(input, first_line).commands()
}

/// Splits a single list of words; newlines count as plain whitespace.
pub fn split_words(input: &str) -> Result<Vec<String>, ParseError> {
    let commands = Lexer::new(input, 1).list_mode().commands()?;
    Ok(commands.into_iter().flat_map(|c| c.texts()).collect())
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    list_mode: bool,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, first_line: usize) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: first_line,
            list_mode: false,
        }
    }

    fn list_mode(mut self) -> Self {
        self.list_mode = true;
        self
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn is_separator(&self, c: char) -> bool {
        !self.list_mode && (c == '\n' || c == ';')
    }

    fn is_space(&self, c: char) -> bool {
        c == ' ' || c == '\t' || c == '\r' || (self.list_mode && (c == '\n' || c == ';'))
    }

    fn commands(mut self) -> Result<Vec<Command>, ParseError> {
        let mut commands = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut start_line = self.line;

        loop {
            match self.chars.peek().copied() {
                None => break,
                Some('\\') if self.continuation_ahead() => {
                    self.bump();
                    self.bump();
                }
                Some(c) if self.is_space(c) => {
                    self.bump();
                }
                Some(c) if self.is_separator(c) => {
                    self.bump();
                    if !words.is_empty() {
                        commands.push(Command {
                            words: std::mem::take(&mut words),
                            line: start_line,
                        });
                    }
                }
                Some('#') if words.is_empty() && !self.list_mode => {
                    while let Some(c) = self.chars.peek().copied() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(_) => {
                    if words.is_empty() {
                        start_line = self.line;
                    }
                    words.push(self.word()?);
                }
            }
        }

        if !words.is_empty() {
            commands.push(Command {
                words,
                line: start_line,
            });
        }
        Ok(commands)
    }

    fn continuation_ahead(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next() == Some('\n')
    }

    fn word(&mut self) -> Result<Word, ParseError> {
        let line = self.line;
        match self.chars.peek().copied() {
            Some('{') => {
                let text = self.braced()?;
                self.expect_word_end("close-brace")?;
                Ok(Word {
                    text,
                    braced: true,
                    line,
                })
            }
            Some('"') => {
                let text = self.quoted()?;
                self.expect_word_end("close-quote")?;
                Ok(Word {
                    text,
                    braced: false,
                    line,
                })
            }
            _ => Ok(Word {
                text: self.bare(),
                braced: false,
                line,
            }),
        }
    }

    fn braced(&mut self) -> Result<String, ParseError> {
        let open_line = self.line;
        self.bump();
        let mut depth = 1usize;
        let mut text = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    text.push(c);
                    if let Some(next) = self.bump() {
                        text.push(next);
                    }
                }
                '{' => {
                    depth += 1;
                    text.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push(c);
                }
                _ => text.push(c),
            }
        }
        Err(ParseError::new(open_line, "missing close-brace"))
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let open_line = self.line;
        self.bump();
        let mut text = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => return Ok(text),
                '\\' => self.escape(&mut text),
                _ => text.push(c),
            }
        }
        Err(ParseError::new(open_line, "missing \""))
    }

    fn bare(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.chars.peek().copied() {
            if self.is_space(c) || self.is_separator(c) {
                break;
            }
            if c == '\\' && self.continuation_ahead() {
                break;
            }
            self.bump();
            if c == '\\' {
                self.escape(&mut text);
            } else {
                text.push(c);
            }
        }
        text
    }

    fn escape(&mut self, text: &mut String) {
        match self.bump() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }

    fn expect_word_end(&mut self, what: &str) -> Result<(), ParseError> {
        match self.chars.peek().copied() {
            None => Ok(()),
            Some(c) if self.is_space(c) || self.is_separator(c) => Ok(()),
            Some(_) => Err(ParseError::new(
                self.line,
                format!("extra characters after {}", what),
            )),
        }
    }
}

/// One parameter of an argument spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Must be supplied.
    Required(String),
    /// Falls back to the default when missing.
    Optional { name: String, default: String },
    /// Trailing `args`: collects everything left over.
    Rest,
}

/// Parsed argument spec, e.g. `name {level 0} args`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgSpec {
    params: Vec<Param>,
}

impl ArgSpec {
    /// Parses an argument spec.
    pub fn parse(spec: &str) -> Result<Self, EnsembleError> {
        let words = split_words(spec).map_err(|e| bad_spec(spec, &e.message))?;
        let mut params = Vec::with_capacity(words.len());
        let last = words.len().saturating_sub(1);

        for (i, word) in words.iter().enumerate() {
            let parts = split_words(word).map_err(|e| bad_spec(spec, &e.message))?;
            match parts.as_slice() {
                [name] if name == "args" && i == last => params.push(Param::Rest),
                [name] => params.push(Param::Required(name.clone())),
                [name, default] => params.push(Param::Optional {
                    name: name.clone(),
                    default: default.clone(),
                }),
                [] => return Err(bad_spec(spec, "argument with no name")),
                _ => {
                    return Err(bad_spec(
                        spec,
                        &format!("too many fields in argument specifier \"{}\"", word),
                    ))
                }
            }
        }
        Ok(Self { params })
    }

    /// The parameters in order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Usage text: `name ?opt? ?arg arg ...?`.
    pub fn usage(&self) -> String {
        self.params
            .iter()
            .map(|p| match p {
                Param::Required(name) => name.clone(),
                Param::Optional { name, .. } => format!("?{}?", name),
                Param::Rest => "?arg arg ...?".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Binds call parameters to names; `None` on an arity mismatch.
    fn bind(&self, values: &[String]) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let mut rest_seen = false;
        let mut consumed = 0;

        for param in &self.params {
            match param {
                Param::Required(name) => {
                    let value = values.get(consumed)?;
                    vars.insert(name.clone(), value.clone());
                    consumed += 1;
                }
                Param::Optional { name, default } => {
                    let value = values.get(consumed).unwrap_or(default);
                    vars.insert(name.clone(), value.clone());
                    consumed = (consumed + 1).min(values.len());
                }
                Param::Rest => {
                    let rest = values.get(consumed..).unwrap_or(&[]);
                    vars.insert("args".to_string(), rest.join(" "));
                    consumed = values.len();
                    rest_seen = true;
                }
            }
        }

        if !rest_seen && consumed < values.len() {
            return None;
        }
        Some(vars)
    }
}

fn bad_spec(spec: &str, message: &str) -> EnsembleError {
    EnsembleError::structural(format!("bad argument spec \"{}\": {}", spec, message))
}

/// An interpreted procedure: argument spec plus pre-split body.
#[derive(Clone, PartialEq, Eq)]
pub struct ScriptProc {
    spec: ArgSpec,
    arg_spec: String,
    body: String,
    commands: Vec<Command>,
}

impl fmt::Debug for ScriptProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProc")
            .field("arg_spec", &self.arg_spec)
            .field("body", &self.body)
            .finish()
    }
}

impl ScriptProc {
    /// Parses the argument spec and splits the body.
    pub fn new(arg_spec: &str, body: &str) -> Result<Self, EnsembleError> {
        let spec = ArgSpec::parse(arg_spec)?;
        let commands = split_commands(body, 1).map_err(|e| {
            EnsembleError::structural(format!("bad procedure body: {}", e))
        })?;
        Ok(Self {
            spec,
            arg_spec: arg_spec.to_string(),
            body: body.to_string(),
            commands,
        })
    }

    /// Usage synthesized from the argument spec.
    pub fn usage(&self) -> String {
        self.spec.usage()
    }

    /// The argument spec as written.
    pub fn arg_spec(&self) -> &str {
        &self.arg_spec
    }

    /// The body as written.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Binds parameters and runs the body.
    pub fn invoke(&self, manager: &mut EnsembleManager, call: &Invocation) -> HandlerResult {
        let vars = self.spec.bind(call.params()).ok_or_else(|| {
            let usage = self.usage();
            let path = call.path_string();
            EnsembleError::WrongProcArgs {
                usage: if usage.is_empty() {
                    path
                } else {
                    format!("{} {}", path, usage)
                },
            }
        })?;

        let mut result = String::new();
        for command in &self.commands {
            let words = command
                .words
                .iter()
                .map(|w| substitute(w, &vars))
                .collect::<Result<Vec<_>, _>>()?;
            trace!(line = command.line, ?words, "script command");

            if words[0] == "return" {
                return Ok(words[1..].join(" "));
            }
            result = manager.eval(&words)?;
        }
        Ok(result)
    }
}

/// Replaces `$name` references in an unbraced word.
fn substitute(word: &Word, vars: &HashMap<String, String>) -> Result<String, EnsembleError> {
    if word.braced || !word.text.contains('$') {
        return Ok(word.text.clone());
    }

    let mut out = String::with_capacity(word.text.len());
    let mut chars = word.text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&n) = chars.peek() {
            if n.is_alphanumeric() || n == '_' {
                name.push(n);
                chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            out.push('$');
            continue;
        }
        match vars.get(&name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(EnsembleError::structural(format!(
                    "can't read \"{}\": no such variable",
                    name
                )))
            }
        }
    }
    Ok(out)
}

//! Command dispatch.
//!
//! Every call enters through [`EnsembleManager::eval`] with a word vector
//! whose first word is a dispatch token. For an ensemble the next word is
//! looked up in its registry:
//!
//! ```text
//! token → ensemble ─┬─ Found(part)   ─┬─ sub-ensemble → recurse with the rest
//!                   │                 └─ leaf         → handler(name, rest...)
//!                   ├─ Ambiguous      → error listing the visible candidates
//!                   └─ NotFound       → @error part, or error listing all parts
//! ```
//!
//! Handlers run with `&mut EnsembleManager` and may call back into `eval`.
//! Nothing borrowed from the registry is held across a handler call: the
//! lookup result is turned into owned data first.

use std::rc::Rc;

use tracing::debug;

use crate::ensemble::{EnsembleId, PartKind};
use crate::error::EnsembleError;
use crate::handler::{HandlerResult, HandlerVariant, Invocation};
use crate::manager::{EnsembleManager, Target};
use crate::registry::Lookup;

/// Owned outcome of resolving one subcommand word.
enum Resolution {
    Leaf { name: String, handler: Rc<HandlerVariant> },
    Nested { name: String, child: EnsembleId },
    Ambiguous(Vec<String>),
    NotFound,
}

impl EnsembleManager {
    /// Evaluates one command.
    ///
    /// `words[0]` is a top-level ensemble name, a part target, or the
    /// `ensemble` definition command.
    pub fn eval<S: AsRef<str>>(&mut self, words: &[S]) -> HandlerResult {
        let words: Vec<String> = words.iter().map(|w| w.as_ref().to_string()).collect();
        if self.depth >= self.config().max_nesting_depth {
            return Err(EnsembleError::NestingTooDeep);
        }
        self.depth += 1;
        let result = self.eval_words(&words);
        self.depth -= 1;
        result
    }

    /// Splits a command line into words and evaluates it.
    pub fn eval_line(&mut self, line: &str) -> HandlerResult {
        let words = crate::script::split_words(line)
            .map_err(|e| EnsembleError::structural(e.message))?;
        if words.is_empty() {
            return Ok(String::new());
        }
        self.eval(&words)
    }

    fn eval_words(&mut self, words: &[String]) -> HandlerResult {
        let Some(token) = words.first() else {
            return Ok(String::new());
        };
        match self.target(token).cloned() {
            Some(Target::Ensemble(id)) => self.dispatch(id, words),
            Some(Target::Part { ensemble, part }) => self.invoke_part(ensemble, &part, &words[1..]),
            None if token == "ensemble" => self.define_from_words(&words[1..]).map(|_| String::new()),
            None => Err(EnsembleError::UnknownCommand(token.clone())),
        }
    }

    /// Dispatches `words` against an ensemble.
    ///
    /// `words[0]` is the token the ensemble was reached by; `words[1]` is
    /// the (possibly abbreviated) subcommand.
    pub fn dispatch(&mut self, id: EnsembleId, words: &[String]) -> HandlerResult {
        let ensemble = self.ensemble(id)?;
        let Some(typed) = words.get(1) else {
            return Err(EnsembleError::WrongArgs {
                usage: self.usage_lines(id)?,
            });
        };

        let resolution = match ensemble.parts.find(typed) {
            Lookup::Found(entry) => match &entry.value.kind {
                PartKind::Leaf(handler) => Resolution::Leaf {
                    name: entry.name().to_string(),
                    handler: Rc::clone(handler),
                },
                PartKind::Ensemble(child) => Resolution::Nested {
                    name: entry.name().to_string(),
                    child: *child,
                },
            },
            Lookup::Ambiguous(candidates) => {
                // Hidden parts and the error part stay out of the message.
                let error_part = &self.config().error_part;
                let names: Vec<String> = candidates
                    .iter()
                    .filter(|e| !e.value.flags.hidden && e.name() != error_part)
                    .map(|e| e.name().to_string())
                    .collect();
                if names.is_empty() {
                    Resolution::NotFound
                } else {
                    Resolution::Ambiguous(names)
                }
            }
            Lookup::NotFound => Resolution::NotFound,
        };

        match resolution {
            Resolution::Nested { name, child } => {
                debug!(ensemble = %id, part = %name, "descending into sub-ensemble");
                let mut rest = Vec::with_capacity(words.len() - 1);
                rest.push(name);
                rest.extend_from_slice(&words[2..]);
                self.dispatch(child, &rest)
            }
            Resolution::Leaf { name, handler } => {
                let mut path = self.path_of(id);
                path.push(name.clone());
                debug!(path = %path.join(" "), typed = %typed, "invoking part");
                let call = Invocation::new(path, &name, &words[2..]);
                handler.invoke(self, &call)
            }
            Resolution::Ambiguous(names) => {
                let usage = names
                    .iter()
                    .map(|name| self.part_usage(id, name))
                    .collect::<Result<Vec<_>, _>>()?;
                Err(EnsembleError::Ambiguous {
                    typed: typed.clone(),
                    usage,
                })
            }
            Resolution::NotFound => self.unknown(id, typed),
        }
    }

    /// Handles a subcommand that matches no part.
    fn unknown(&mut self, id: EnsembleId, typed: &str) -> HandlerResult {
        let error_part = self.config().error_part.clone();
        let handler = self
            .ensemble(id)?
            .parts
            .get(&error_part)
            .and_then(|entry| match &entry.value.kind {
                PartKind::Leaf(handler) => Some(Rc::clone(handler)),
                PartKind::Ensemble(_) => None,
            });

        let path = self.path_of(id);
        match handler {
            Some(handler) => {
                debug!(ensemble = %path.join(" "), typed, "deferring to error part");
                let ensemble_token = path.join(" ");
                let mut part_path = path;
                part_path.push(error_part.clone());
                let call = Invocation {
                    path: part_path,
                    words: vec![ensemble_token, error_part, typed.to_string()],
                    first_param: 2,
                };
                handler.invoke(self, &call)
            }
            None => Err(EnsembleError::UnknownPart {
                typed: typed.to_string(),
                usage: self.usage_lines(id)?,
            }),
        }
    }

    /// Calls a leaf part directly through its target.
    fn invoke_part(&mut self, ensemble: EnsembleId, part: &str, params: &[String]) -> HandlerResult {
        let handler = match self.ensemble(ensemble)?.parts.get(part).map(|e| &e.value.kind) {
            Some(PartKind::Leaf(handler)) => Rc::clone(handler),
            _ => return Err(EnsembleError::UnknownCommand(part.to_string())),
        };
        let mut path = self.path_of(ensemble);
        path.push(part.to_string());
        let call = Invocation::new(path, part, params);
        handler.invoke(self, &call)
    }
}

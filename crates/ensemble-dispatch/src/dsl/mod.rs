//! Declarative ensemble definitions.
//!
//! A definition source is a list of `ensemble` commands:
//!
//! ```text
//! ensemble info {
//!     part   args  {procname}      { return [args of $procname] }
//!     option level {{depth 0}}     { return $depth }
//!     ensemble frame {
//!         part get {n} { return $n }
//!     }
//! }
//! ensemble info part body {procname} { return $procname }
//! ```
//!
//! `part` and `option` are the same command: both add a leaf part whose
//! handler is an interpreted procedure built from the argument spec and the
//! body. `ensemble` inside a block creates or re-enters a sub-ensemble.
//!
//! Definitions are processed in two passes. [`parse`] builds a
//! [`Definition`] without touching any session; [`EnsembleManager::define`]
//! then materializes it. Syntax errors are therefore reported before
//! anything is registered.

mod ast;
mod materialize;
mod parser;

use thiserror::Error;
use tracing::warn;

use crate::ensemble::EnsembleId;
use crate::error::EnsembleError;
use crate::manager::EnsembleManager;
use crate::script::{ParseError, Word};

pub use ast::{Definition, EnsembleNode, Item, PartKeyword, PartNode};
pub use parser::{parse, parse_ensemble};

/// Errors from processing a definition source.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The source is not well formed. Nothing was registered.
    #[error("definition syntax error at {0}")]
    Syntax(#[from] ParseError),

    /// Building a scope failed.
    ///
    /// Ensembles created earlier in the same definition stay registered;
    /// `created` lists them in creation order.
    #[error("error in ensemble \"{scope}\" (line {line}): {source}")]
    Build {
        scope: String,
        line: usize,
        source: EnsembleError,
        created: Vec<EnsembleId>,
    },
}

impl DefinitionError {
    /// Ensembles created before the failure, in creation order.
    pub fn created(&self) -> &[EnsembleId] {
        match self {
            DefinitionError::Syntax(_) => &[],
            DefinitionError::Build { created, .. } => created,
        }
    }
}

impl EnsembleManager {
    /// Parses and materializes a definition source.
    ///
    /// Returns the handles of the top-level ensembles it names.
    ///
    /// ```rust
    /// use ensemble_dispatch::EnsembleManager;
    ///
    /// let mut manager = EnsembleManager::new();
    /// manager.define("ensemble math { part add {a b} { return $a+$b } }")?;
    /// assert_eq!(manager.eval(&["math", "a", "1", "2"])?, "1+2");
    /// # Ok::<(), ensemble_dispatch::EnsembleError>(())
    /// ```
    pub fn define(&mut self, source: &str) -> Result<Vec<EnsembleId>, EnsembleError> {
        let definition = parse(source).map_err(DefinitionError::from)?;
        Ok(self.materialize(&definition)?)
    }

    /// Materializes an already parsed definition.
    pub fn materialize(&mut self, definition: &Definition) -> Result<Vec<EnsembleId>, DefinitionError> {
        materialize::Materializer::new(self).run(definition)
    }

    /// Deletes ensembles reported by a failed definition, newest first.
    ///
    /// Handles that are already gone are skipped.
    pub fn unwind(&mut self, created: &[EnsembleId]) {
        for id in created.iter().rev() {
            if self.contains(*id) {
                if let Err(e) = self.delete_ensemble(*id) {
                    warn!(ensemble = %id, error = %e, "failed to unwind ensemble");
                }
            }
        }
    }

    /// `ensemble ...` evaluated as a command, e.g. from a procedure body.
    pub(crate) fn define_from_words(&mut self, words: &[String]) -> Result<Vec<EnsembleId>, EnsembleError> {
        let words: Vec<Word> = words
            .iter()
            .map(|text| Word {
                text: text.clone(),
                braced: false,
                line: 1,
            })
            .collect();
        let node = parse_ensemble(&words, 1).map_err(DefinitionError::from)?;
        Ok(self.materialize(&Definition {
            ensembles: vec![node],
        })?)
    }
}

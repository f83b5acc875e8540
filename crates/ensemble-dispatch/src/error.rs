//! Error types for ensemble registration and dispatch.

use thiserror::Error;

use crate::dsl::DefinitionError;

/// Errors raised by the registration API and by dispatch.
///
/// The `Display` output of [`Ambiguous`](EnsembleError::Ambiguous),
/// [`UnknownPart`](EnsembleError::UnknownPart) and
/// [`WrongArgs`](EnsembleError::WrongArgs) is the user-facing message and is
/// kept stable: hosts and tests match on it.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// A part with this exact name already exists in the ensemble.
    #[error("part \"{part}\" already exists in ensemble \"{ensemble}\"")]
    DuplicatePart { ensemble: String, part: String },

    /// The typed token is a prefix of several parts and too short to choose.
    #[error("ambiguous option \"{typed}\": should be one of...{}", indent_usage(.usage))]
    Ambiguous { typed: String, usage: Vec<String> },

    /// No part starts with the typed token and no `@error` part is registered.
    #[error("bad option \"{typed}\": should be one of...{}", indent_usage(.usage))]
    UnknownPart { typed: String, usage: Vec<String> },

    /// An ensemble was invoked without a subcommand.
    #[error("wrong # args: should be one of...{}", indent_usage(.usage))]
    WrongArgs { usage: Vec<String> },

    /// A script part was called with the wrong number of arguments.
    #[error("wrong # args: should be \"{usage}\"")]
    WrongProcArgs { usage: String },

    /// The handle or name does not refer to a live ensemble.
    #[error("\"{0}\" is not an ensemble")]
    NotAnEnsemble(String),

    /// The tree would become inconsistent: a sub-ensemble over a leaf part,
    /// deleting a part that does not exist, a missing parent path.
    #[error("{0}")]
    Structural(String),

    /// No command is registered under this token.
    #[error("invalid command name \"{0}\"")]
    UnknownCommand(String),

    /// Reentrant dispatch went deeper than the configured limit.
    #[error("too many nested evaluations (infinite loop?)")]
    NestingTooDeep,

    /// A definition block could not be parsed or materialized.
    #[error(transparent)]
    Definition(#[from] Box<DefinitionError>),

    /// A native handler failed.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl EnsembleError {
    /// Creates a structural error from a message.
    pub fn structural(message: impl Into<String>) -> Self {
        EnsembleError::Structural(message.into())
    }
}

impl From<DefinitionError> for EnsembleError {
    fn from(e: DefinitionError) -> Self {
        EnsembleError::Definition(Box::new(e))
    }
}

fn indent_usage(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}

/// Result type for ensemble operations.
pub type Result<T> = std::result::Result<T, EnsembleError>;

//! Hierarchical subcommand dispatch for embedded command interpreters.
//!
//! `ensemble-dispatch` lets a host expose compound commands such as
//! `info args procname` or `obj cget -color` as one dispatch token with a
//! sorted set of named parts. Parts can be abbreviated to any unique prefix
//! and may themselves be ensembles, to any depth.
//!
//! # Features
//!
//! - **Prefix abbreviation**: every part knows the shortest prefix that
//!   still selects it among its siblings
//! - **Nested ensembles**: a part can own a sub-ensemble; deleting the part
//!   deletes the whole subtree
//! - **Usage text**: generated from the tree, used in error messages
//! - **Definition blocks**: `ensemble name { part ... }` builds a tree of
//!   interpreted procedures
//! - **Reentrancy**: handlers get `&mut EnsembleManager` and may dispatch,
//!   define or delete while running
//!
//! # Example
//!
//! ```rust
//! use ensemble_dispatch::{EnsembleManager, HandlerVariant, Invocation, PartSpec};
//!
//! let mut manager = EnsembleManager::new();
//! let info = manager.create_ensemble("info")?;
//! manager.add_part(
//!     info,
//!     PartSpec::new(
//!         "args",
//!         HandlerVariant::from_fn(|_m: &mut EnsembleManager, call: &Invocation| {
//!             Ok::<_, ensemble_dispatch::EnsembleError>(format!("args of {}", call.params()[0]))
//!         }),
//!     )
//!     .usage("procname"),
//! )?;
//! manager.define("ensemble info part body {procname} { return body of $procname }")?;
//!
//! assert_eq!(manager.eval(&["info", "a", "foo"])?, "args of foo");
//! assert_eq!(manager.eval(&["info", "bo", "foo"])?, "body of foo");
//!
//! let err = manager.eval(&["info", "x"]).unwrap_err();
//! assert_eq!(
//!     err.to_string(),
//!     "bad option \"x\": should be one of...\n  info args procname\n  info body procname"
//! );
//! # Ok::<(), ensemble_dispatch::EnsembleError>(())
//! ```
//!
//! # Sessions
//!
//! All state lives in an [`EnsembleManager`]. There is no global registry;
//! two managers never see each other's ensembles. A manager is meant to be
//! driven from one thread.

// Core modules
mod config;
mod dispatch;
mod dsl;
mod ensemble;
mod error;
mod handler;
mod manager;
mod registry;
mod script;
mod usage;

// Re-export core types
pub use config::{
    ManagerConfig, DEFAULT_ERROR_PART, DEFAULT_MAX_NESTING_DEPTH, DEFAULT_NAMESPACE_ROOT,
};

pub use dsl::{
    parse as parse_definition, Definition, DefinitionError, EnsembleNode, Item, PartKeyword,
    PartNode,
};

pub use ensemble::{DeleteCallback, Ensemble, EnsembleId, Part, PartFlags, PartKind};

pub use error::{EnsembleError, Result};

pub use handler::{
    FnHandler, HandlerResult, HandlerVariant, HostState, IntoHandlerResult, Invocation,
    PartHandler, SimpleFnHandler,
};

pub use manager::{EnsembleManager, PartInfo, PartSpec, Target};

pub use registry::{Entry, Lookup, PartRegistry, RegistryError};

pub use script::{split_commands, split_words, ArgSpec, Command, Param, ParseError, ScriptProc, Word};

pub use usage::{EnsembleSummary, PartSummary, PartSummaryKind, OTHERS_LINE, SUB_ENSEMBLE_USAGE};

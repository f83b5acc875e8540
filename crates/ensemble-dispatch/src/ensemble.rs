//! Ensemble and part data types.
//!
//! An [`Ensemble`] owns a [`PartRegistry`] of [`Part`]s. A part is either a
//! leaf carrying a handler, or the owner of a nested sub-ensemble. The
//! ensemble remembers the part it hangs under (if any) as a non-owning
//! back-reference, used only to rebuild command paths for usage text.

use std::fmt;
use std::rc::Rc;

use crate::handler::HandlerVariant;
use crate::registry::PartRegistry;

/// Opaque handle to an ensemble held by an [`EnsembleManager`](crate::EnsembleManager).
///
/// Handles carry a generation: once an ensemble is deleted its handle never
/// resolves again, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnsembleId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for EnsembleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ensemble#{}.{}", self.index, self.generation)
    }
}

/// Callback run once when a part is deleted.
pub type DeleteCallback = Box<dyn FnOnce()>;

/// Per-part flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartFlags {
    /// Internal bookkeeping part: dispatchable, but left out of usage text.
    pub hidden: bool,
}

impl PartFlags {
    /// Flags for an internal part.
    pub fn hidden() -> Self {
        Self { hidden: true }
    }
}

/// What a part does when selected.
#[derive(Clone)]
pub enum PartKind {
    /// Leaf part; the handler is shared so a running call survives deletion.
    Leaf(Rc<HandlerVariant>),
    /// Part owning a nested ensemble.
    Ensemble(EnsembleId),
}

impl fmt::Debug for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartKind::Leaf(handler) => f.debug_tuple("Leaf").field(handler).finish(),
            PartKind::Ensemble(id) => f.debug_tuple("Ensemble").field(id).finish(),
        }
    }
}

/// One subcommand of an ensemble.
///
/// The name and `min_chars` live on the registry [`Entry`](crate::registry::Entry)
/// that stores the part.
pub struct Part {
    pub(crate) usage: String,
    pub(crate) kind: PartKind,
    pub(crate) owner: EnsembleId,
    pub(crate) flags: PartFlags,
    pub(crate) target: String,
    pub(crate) on_delete: Option<DeleteCallback>,
}

impl Part {
    /// Explicit usage string (may be empty).
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// Leaf handler or sub-ensemble.
    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    /// The ensemble that owns this part.
    pub fn owner(&self) -> EnsembleId {
        self.owner
    }

    /// The sub-ensemble owned by this part, if any.
    pub fn sub_ensemble(&self) -> Option<EnsembleId> {
        match self.kind {
            PartKind::Ensemble(id) => Some(id),
            PartKind::Leaf(_) => None,
        }
    }

    /// Part flags.
    pub fn flags(&self) -> PartFlags {
        self.flags
    }

    /// Internal command target that invokes this part directly.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("usage", &self.usage)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("flags", &self.flags)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Back-reference from a sub-ensemble to the part that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParentPart {
    pub(crate) ensemble: EnsembleId,
    pub(crate) part: String,
}

/// A compound command: a sorted set of named parts.
#[derive(Debug)]
pub struct Ensemble {
    pub(crate) id: EnsembleId,
    pub(crate) name: String,
    pub(crate) parts: PartRegistry<Part>,
    pub(crate) parent: Option<ParentPart>,
    pub(crate) namespace: String,
}

impl Ensemble {
    /// The ensemble's handle.
    pub fn id(&self) -> EnsembleId {
        self.id
    }

    /// The ensemble's own name (last word of its path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry of parts.
    pub fn parts(&self) -> &PartRegistry<Part> {
        &self.parts
    }

    /// Returns true for sub-ensembles.
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    /// Implementation namespace holding this ensemble's part targets.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

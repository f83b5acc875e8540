//! Session state: ensemble arena, path index and command table.
//!
//! One [`EnsembleManager`] holds everything a single interpreter session
//! knows about ensembles. There is no global state: independent sessions
//! are independent values.
//!
//! # Ownership
//!
//! - The manager owns every [`Ensemble`] in a generational arena.
//! - An ensemble owns its parts.
//! - A part of kind [`PartKind::Ensemble`] owns that sub-ensemble: deleting
//!   the part deletes the sub-ensemble and, recursively, everything below.
//! - A sub-ensemble's parent link is only used to rebuild its path.
//!
//! # Command table
//!
//! Dispatch enters through tokens. A top-level ensemble is reachable by its
//! name; every part is also reachable through an internal target
//! `<namespace>::<part>` that calls it directly. Parts that own a
//! sub-ensemble map their target to that ensemble.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ManagerConfig;
use crate::ensemble::{
    DeleteCallback, Ensemble, EnsembleId, ParentPart, Part, PartFlags, PartKind,
};
use crate::error::{EnsembleError, Result};
use crate::handler::{HandlerVariant, HostState};
use crate::registry::{Lookup, RegistryError};
use crate::usage::effective_usage;

/// What a dispatch token refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An ensemble (top-level, or the sub-ensemble behind a part target).
    Ensemble(EnsembleId),
    /// A leaf part, invoked directly.
    Part { ensemble: EnsembleId, part: String },
}

/// Everything needed to add one part.
///
/// ```rust
/// use ensemble_dispatch::{EnsembleManager, HandlerVariant, PartSpec};
///
/// let mut manager = EnsembleManager::new();
/// let info = manager.create_ensemble("info")?;
/// let handler = HandlerVariant::script("procname", "return args of $procname")?;
/// manager.add_part(info, PartSpec::new("args", handler).usage("procname"))?;
/// assert_eq!(manager.eval(&["info", "a", "f"])?, "args of f");
/// # Ok::<(), ensemble_dispatch::EnsembleError>(())
/// ```
pub struct PartSpec {
    name: String,
    usage: String,
    handler: HandlerVariant,
    flags: PartFlags,
    on_delete: Option<DeleteCallback>,
}

impl PartSpec {
    /// A part with no explicit usage and default flags.
    pub fn new(name: impl Into<String>, handler: HandlerVariant) -> Self {
        Self {
            name: name.into(),
            usage: String::new(),
            handler,
            flags: PartFlags::default(),
            on_delete: None,
        }
    }

    /// Sets the usage string shown after the part's path.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Sets the part flags.
    pub fn flags(mut self, flags: PartFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Registers a callback run once when the part is deleted.
    pub fn on_delete<F: FnOnce() + 'static>(mut self, callback: F) -> Self {
        self.on_delete = Some(Box::new(callback));
        self
    }
}

/// Non-throwing description of a part, returned by [`EnsembleManager::get_part`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartInfo {
    /// Canonical name.
    pub name: String,
    /// Full command path, ending with `name`.
    pub path: Vec<String>,
    /// Usage as shown in usage text (explicit or synthesized).
    pub usage: String,
    /// Minimum unique prefix length among siblings.
    pub min_chars: usize,
    /// True if the part owns a sub-ensemble.
    pub is_ensemble: bool,
    /// Internal target that invokes the part directly.
    pub target: String,
}

struct Slot {
    generation: u32,
    ensemble: Option<Ensemble>,
}

/// Per-session registry of ensembles.
pub struct EnsembleManager {
    config: ManagerConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    paths: HashMap<String, EnsembleId>,
    commands: HashMap<String, Target>,
    next_namespace: u64,
    pub(crate) depth: usize,
    host_state: HostState,
}

impl Default for EnsembleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnsembleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleManager")
            .field("ensembles", &self.ensemble_count())
            .field("commands", &self.commands.len())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl EnsembleManager {
    /// Creates a session with default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a session with the given configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            paths: HashMap::new(),
            commands: HashMap::new(),
            next_namespace: 0,
            depth: 0,
            host_state: HostState::default(),
        }
    }

    /// The session configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Host state shared with native handlers.
    pub fn host_state(&self) -> &HostState {
        &self.host_state
    }

    /// Mutable host state.
    pub fn host_state_mut(&mut self) -> &mut HostState {
        &mut self.host_state
    }

    /// Number of live ensembles, nested ones included.
    pub fn ensemble_count(&self) -> usize {
        self.slots.iter().filter(|s| s.ensemble.is_some()).count()
    }

    /// Names of the top-level ensembles, sorted.
    pub fn top_level_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter_map(|s| s.ensemble.as_ref())
            .filter(|e| e.parent.is_none())
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Resolves a handle; stale or foreign handles fail with `NotAnEnsemble`.
    pub fn ensemble(&self, id: EnsembleId) -> Result<&Ensemble> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.ensemble.as_ref())
            .ok_or_else(|| EnsembleError::NotAnEnsemble(id.to_string()))
    }

    fn ensemble_mut(&mut self, id: EnsembleId) -> Result<&mut Ensemble> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.ensemble.as_mut())
            .ok_or_else(|| EnsembleError::NotAnEnsemble(id.to_string()))
    }

    /// Returns true if the handle refers to a live ensemble.
    pub fn contains(&self, id: EnsembleId) -> bool {
        self.ensemble(id).is_ok()
    }

    /// Looks up an ensemble by its space-separated path, e.g. `"info sub"`.
    pub fn find_ensemble(&self, path: &str) -> Option<EnsembleId> {
        self.paths.get(&normalize_path(path)).copied()
    }

    /// Like [`find_ensemble`](Self::find_ensemble), failing with `NotAnEnsemble`.
    pub fn require_ensemble(&self, path: &str) -> Result<EnsembleId> {
        self.find_ensemble(path)
            .ok_or_else(|| EnsembleError::NotAnEnsemble(normalize_path(path)))
    }

    /// Resolves a dispatch token.
    pub fn target(&self, token: &str) -> Option<&Target> {
        self.commands.get(token)
    }

    /// Returns true if the token dispatches into a live ensemble.
    pub fn is_ensemble(&self, token: &str) -> bool {
        match self.commands.get(token) {
            Some(Target::Ensemble(id)) => self.contains(*id),
            _ => false,
        }
    }

    /// Resolves a possibly abbreviated part name within an ensemble.
    pub fn find_part(&self, id: EnsembleId, prefix: &str) -> Result<Lookup<'_, Part>> {
        Ok(self.ensemble(id)?.parts.find(prefix))
    }

    /// Describes a part without raising errors.
    ///
    /// Abbreviations are resolved; an unknown ensemble, an unknown part or
    /// an ambiguous abbreviation all yield `None`.
    pub fn get_part(&self, ensemble_path: &str, part: &str) -> Option<PartInfo> {
        let id = self.find_ensemble(ensemble_path)?;
        let ensemble = self.ensemble(id).ok()?;
        let Lookup::Found(entry) = ensemble.parts.find(part) else {
            return None;
        };
        let mut path = self.path_of(id);
        path.push(entry.name().to_string());
        Some(PartInfo {
            name: entry.name().to_string(),
            path,
            usage: effective_usage(&entry.value),
            min_chars: entry.min_chars(),
            is_ensemble: entry.value.sub_ensemble().is_some(),
            target: entry.value.target.clone(),
        })
    }

    /// Full command path of an ensemble, rebuilt from parent links.
    pub fn path_of(&self, id: EnsembleId) -> Vec<String> {
        let mut words = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let Ok(ensemble) = self.ensemble(cur) else {
                break;
            };
            words.push(ensemble.name.clone());
            current = ensemble.parent.as_ref().map(|p| p.ensemble);
        }
        words.reverse();
        words
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Creates an ensemble from a space-separated path.
    ///
    /// A single word creates a top-level ensemble; longer paths create a
    /// sub-ensemble under an existing parent path.
    pub fn create_ensemble(&mut self, name: &str) -> Result<EnsembleId> {
        let words: Vec<&str> = name.split_whitespace().collect();
        self.create_ensemble_path(&words)
    }

    /// Creates an ensemble from path words (nested form).
    pub fn create_ensemble_path<S: AsRef<str>>(&mut self, words: &[S]) -> Result<EnsembleId> {
        let (last, parent_words) = match words.split_last() {
            Some(split) => split,
            None => return Err(EnsembleError::structural("empty ensemble name")),
        };
        let name = last.as_ref();
        check_ensemble_name(name)?;

        if parent_words.is_empty() {
            if self.paths.contains_key(name) || self.commands.contains_key(name) {
                return Err(EnsembleError::structural(format!(
                    "command \"{}\" already exists",
                    name
                )));
            }
            return Ok(self.create_top_level(name));
        }

        let parent_path = join_words(parent_words);
        let parent = self.find_ensemble(&parent_path).ok_or_else(|| {
            EnsembleError::structural(format!(
                "invalid ensemble name \"{} {}\"",
                parent_path, name
            ))
        })?;
        if self.ensemble(parent)?.parts.get(name).is_some() {
            return Err(EnsembleError::DuplicatePart {
                ensemble: parent_path,
                part: name.to_string(),
            });
        }
        self.create_sub_ensemble(parent, name)
    }

    /// Returns the ensemble at the space-separated path `name`, creating
    /// any missing level on the way down.
    pub fn ensure_ensemble(&mut self, name: &str) -> Result<EnsembleId> {
        let words: Vec<&str> = name.split_whitespace().collect();
        let Some((first, rest)) = words.split_first() else {
            return Err(EnsembleError::structural("empty ensemble name"));
        };
        let mut id = self.ensure_top_level(first)?;
        for word in rest {
            id = self.ensure_sub_ensemble(id, word)?;
        }
        Ok(id)
    }

    /// Returns the top-level ensemble `name`, creating it if needed.
    ///
    /// `name` is a single word; see [`ensure_ensemble`](Self::ensure_ensemble)
    /// for paths.
    pub fn ensure_top_level(&mut self, name: &str) -> Result<EnsembleId> {
        check_ensemble_name(name)?;
        match self.commands.get(name).cloned() {
            Some(Target::Ensemble(id)) if self.contains(id) => Ok(id),
            Some(_) => Err(EnsembleError::structural(format!(
                "command \"{}\" already exists and is not an ensemble",
                name
            ))),
            None => Ok(self.create_top_level(name)),
        }
    }

    /// Returns the sub-ensemble `name` under `parent`, creating it if needed.
    ///
    /// Fails with a structural error if `name` is already a leaf part.
    pub fn ensure_sub_ensemble(&mut self, parent: EnsembleId, name: &str) -> Result<EnsembleId> {
        let existing = self
            .ensemble(parent)?
            .parts
            .get(name)
            .map(|entry| entry.value.sub_ensemble());
        match existing {
            Some(Some(child)) => Ok(child),
            Some(None) => Err(EnsembleError::structural(format!(
                "part \"{}\" is not an ensemble",
                name
            ))),
            None => self.create_sub_ensemble(parent, name),
        }
    }

    fn create_top_level(&mut self, name: &str) -> EnsembleId {
        let id = self.alloc(name, None);
        self.paths.insert(name.to_string(), id);
        self.commands.insert(name.to_string(), Target::Ensemble(id));
        debug!(ensemble = name, %id, "created ensemble");
        id
    }

    /// Creates a sub-ensemble and the parent part that owns it.
    ///
    /// The registry is left unchanged on failure.
    pub fn create_sub_ensemble(&mut self, parent: EnsembleId, name: &str) -> Result<EnsembleId> {
        check_ensemble_name(name)?;
        let parent_path = self.path_of(parent);
        let parent_ns = self.ensemble(parent)?.namespace.clone();
        if let Some(entry) = self.ensemble(parent)?.parts.get(name) {
            return Err(match entry.value.sub_ensemble() {
                Some(_) => EnsembleError::DuplicatePart {
                    ensemble: join_words(&parent_path),
                    part: name.to_string(),
                },
                None => EnsembleError::structural(format!("part \"{}\" is not an ensemble", name)),
            });
        }

        let child = self.alloc(
            name,
            Some(ParentPart {
                ensemble: parent,
                part: name.to_string(),
            }),
        );
        let target = format!("{}::{}", parent_ns, name);
        let part = Part {
            usage: String::new(),
            kind: PartKind::Ensemble(child),
            owner: parent,
            flags: PartFlags::default(),
            target: target.clone(),
            on_delete: None,
        };
        if let Err(e) = self.ensemble_mut(parent)?.parts.insert(name, part) {
            // Nothing points at the new slot yet; give it back.
            self.free_slot(child);
            return Err(registry_error(&join_words(&parent_path), e));
        }
        self.commands.insert(target, Target::Ensemble(child));

        let mut path = parent_path;
        path.push(name.to_string());
        let path = join_words(&path);
        debug!(ensemble = %path, id = %child, "created sub-ensemble");
        self.paths.insert(path, child);
        Ok(child)
    }

    fn alloc(&mut self, name: &str, parent: Option<ParentPart>) -> EnsembleId {
        let namespace = format!("{}::{}", self.config.namespace_root, self.next_namespace);
        self.next_namespace += 1;

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    ensemble: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = EnsembleId {
            index,
            generation: slot.generation,
        };
        slot.ensemble = Some(Ensemble {
            id,
            name: name.to_string(),
            parts: Default::default(),
            parent,
            namespace,
        });
        id
    }

    // ------------------------------------------------------------------
    // Parts
    // ------------------------------------------------------------------

    /// Adds a leaf part to an ensemble.
    ///
    /// Fails with [`EnsembleError::DuplicatePart`] on a name collision,
    /// leaving the ensemble unchanged.
    pub fn add_part(&mut self, ensemble: EnsembleId, spec: PartSpec) -> Result<()> {
        let path = join_words(&self.path_of(ensemble));
        let ens = self.ensemble_mut(ensemble)?;
        let target = format!("{}::{}", ens.namespace, spec.name);
        let part = Part {
            usage: spec.usage,
            kind: PartKind::Leaf(std::rc::Rc::new(spec.handler)),
            owner: ensemble,
            flags: spec.flags,
            target: target.clone(),
            on_delete: spec.on_delete,
        };
        ens.parts
            .insert(&spec.name, part)
            .map_err(|e| registry_error(&path, e))?;
        self.commands.insert(
            target,
            Target::Part {
                ensemble,
                part: spec.name.clone(),
            },
        );
        debug!(ensemble = %path, part = %spec.name, "added part");
        Ok(())
    }

    /// Adds a part to the ensemble at `ensemble_path`.
    pub fn add_part_by_name(
        &mut self,
        ensemble_path: &str,
        part: &str,
        usage: &str,
        handler: HandlerVariant,
        on_delete: Option<DeleteCallback>,
    ) -> Result<()> {
        let id = self.require_ensemble(ensemble_path)?;
        let mut spec = PartSpec::new(part, handler).usage(usage);
        spec.on_delete = on_delete;
        self.add_part(id, spec)
    }

    /// Deletes a part by exact name, cascading into its sub-ensemble.
    pub fn delete_part(&mut self, ensemble: EnsembleId, name: &str) -> Result<()> {
        if self.ensemble(ensemble)?.parts.get(name).is_none() {
            return Err(EnsembleError::structural(format!(
                "bad part \"{}\" in ensemble \"{}\"",
                name,
                join_words(&self.path_of(ensemble))
            )));
        }
        self.destroy_part(ensemble, name);
        Ok(())
    }

    /// Deletes a part of the ensemble at `ensemble_path`.
    pub fn delete_part_by_name(&mut self, ensemble_path: &str, name: &str) -> Result<()> {
        let id = self.require_ensemble(ensemble_path)?;
        self.delete_part(id, name)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Deletes an ensemble with all of its parts.
    ///
    /// A sub-ensemble is removed together with the parent part that owns it.
    pub fn delete_ensemble(&mut self, id: EnsembleId) -> Result<()> {
        let parent = self.ensemble(id)?.parent.clone();
        match parent {
            Some(ParentPart { ensemble, part }) if self.contains(ensemble) => {
                self.destroy_part(ensemble, &part)
            }
            _ => self.destroy_ensemble(id),
        }
        Ok(())
    }

    /// Deletes ensembles by path; stops at the first name that is not one.
    pub fn delete_ensembles<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for name in names {
            let name = name.as_ref();
            match self.find_ensemble(name) {
                Some(id) => self.delete_ensemble(id)?,
                None => {
                    warn!(name, "cannot delete: not an ensemble");
                    return Err(EnsembleError::NotAnEnsemble(normalize_path(name)));
                }
            }
        }
        Ok(())
    }

    /// Deletes every ensemble in the session.
    pub fn clear(&mut self) {
        for name in self.top_level_names() {
            if let Some(id) = self.find_ensemble(&name) {
                self.destroy_ensemble(id);
            }
        }
    }

    fn destroy_part(&mut self, ensemble: EnsembleId, name: &str) {
        let removed = match self.ensemble_mut(ensemble) {
            Ok(ens) => ens.parts.remove(name),
            Err(_) => None,
        };
        let Some(entry) = removed else {
            return;
        };
        let part = entry.value;
        self.commands.remove(&part.target);
        debug!(part = name, target = %part.target, "deleted part");

        if let PartKind::Ensemble(child) = part.kind {
            self.destroy_ensemble(child);
        }
        if let Some(callback) = part.on_delete {
            callback();
        }
    }

    fn destroy_ensemble(&mut self, id: EnsembleId) {
        let path = join_words(&self.path_of(id));
        // Snapshot the names first: each delete may cascade.
        let names: Vec<String> = match self.ensemble(id) {
            Ok(ens) => ens.parts.names().map(String::from).collect(),
            Err(_) => return,
        };
        for name in names {
            self.destroy_part(id, &name);
        }

        self.paths.remove(&path);
        if let Some(Target::Ensemble(top)) = self.commands.get(&path) {
            if *top == id {
                self.commands.remove(&path);
            }
        }

        self.free_slot(id);
        debug!(ensemble = %path, %id, "deleted ensemble");
    }

    fn free_slot(&mut self, id: EnsembleId) {
        let slot = &mut self.slots[id.index as usize];
        slot.ensemble = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }
}

impl Drop for EnsembleManager {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Ensemble names are single non-empty words so that paths stay unambiguous.
fn check_ensemble_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(EnsembleError::structural(format!(
            "invalid ensemble name \"{}\"",
            name
        )));
    }
    Ok(())
}

fn registry_error(ensemble: &str, err: RegistryError) -> EnsembleError {
    match err {
        RegistryError::Duplicate(part) => EnsembleError::DuplicatePart {
            ensemble: ensemble.to_string(),
            part,
        },
        RegistryError::EmptyName => EnsembleError::structural(format!(
            "empty part name in ensemble \"{}\"",
            ensemble
        )),
    }
}

fn join_words<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| w.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_path(path: &str) -> String {
    path.split_whitespace().collect::<Vec<_>>().join(" ")
}

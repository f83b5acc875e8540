//! Turns a parsed [`Definition`] into ensembles and parts.
//!
//! The ensemble being built is passed down explicitly, so nested blocks
//! and definitions evaluated from inside a running handler compose without
//! shared state. A failure stops the walk at the failing scope; everything
//! created so far is reported back so the caller can decide what to undo.

use tracing::debug;

use crate::ensemble::EnsembleId;
use crate::error::EnsembleError;
use crate::handler::HandlerVariant;
use crate::manager::{EnsembleManager, PartSpec};

use super::ast::{Definition, EnsembleNode, Item, PartNode};
use super::DefinitionError;

pub(crate) struct Materializer<'m> {
    manager: &'m mut EnsembleManager,
    created: Vec<EnsembleId>,
}

impl<'m> Materializer<'m> {
    pub(crate) fn new(manager: &'m mut EnsembleManager) -> Self {
        Self {
            manager,
            created: Vec::new(),
        }
    }

    /// Builds every top-level ensemble, returning their handles in order.
    pub(crate) fn run(mut self, definition: &Definition) -> Result<Vec<EnsembleId>, DefinitionError> {
        let mut roots = Vec::with_capacity(definition.ensembles.len());
        for node in &definition.ensembles {
            let id = self
                .enter_top_level(&node.name)
                .map_err(|e| self.fail(&node.name, node.line, e))?;
            self.fill(id, node)?;
            roots.push(id);
        }
        Ok(roots)
    }

    fn fill(&mut self, id: EnsembleId, node: &EnsembleNode) -> Result<(), DefinitionError> {
        for item in &node.items {
            match item {
                Item::Part(part) => self
                    .add_part(id, part)
                    .map_err(|e| self.fail_in(id, part.line, e))?,
                Item::Ensemble(child) => {
                    let child_id = self
                        .enter_nested(id, &child.name)
                        .map_err(|e| self.fail_in(id, child.line, e))?;
                    self.fill(child_id, child)?;
                }
            }
        }
        Ok(())
    }

    fn add_part(&mut self, id: EnsembleId, part: &PartNode) -> Result<(), EnsembleError> {
        let handler = HandlerVariant::script(&part.arg_spec, &part.body)?;
        debug!(ensemble = %id, part = %part.name, keyword = part.keyword.as_str(), "defining part");
        self.manager.add_part(id, PartSpec::new(&part.name, handler))
    }

    /// A multi-word name such as `{info sub}` re-enters the nested path.
    fn enter_top_level(&mut self, name: &str) -> Result<EnsembleId, EnsembleError> {
        let words: Vec<&str> = name.split_whitespace().collect();
        let Some((first, rest)) = words.split_first() else {
            return Err(EnsembleError::structural("empty ensemble name"));
        };
        let existed = self.manager.find_ensemble(first).is_some();
        let mut id = self.manager.ensure_top_level(first)?;
        if !existed {
            self.created.push(id);
        }
        for word in rest {
            id = self.enter_nested(id, word)?;
        }
        Ok(id)
    }

    fn enter_nested(&mut self, parent: EnsembleId, name: &str) -> Result<EnsembleId, EnsembleError> {
        let existed = self.manager.ensemble(parent)?.parts.get(name).is_some();
        let id = self.manager.ensure_sub_ensemble(parent, name)?;
        if !existed {
            self.created.push(id);
        }
        Ok(id)
    }

    fn fail_in(&mut self, scope: EnsembleId, line: usize, source: EnsembleError) -> DefinitionError {
        let path = self.manager.path_of(scope).join(" ");
        self.fail(&path, line, source)
    }

    fn fail(&mut self, scope: &str, line: usize, source: EnsembleError) -> DefinitionError {
        DefinitionError::Build {
            scope: scope.to_string(),
            line,
            source,
            created: std::mem::take(&mut self.created),
        }
    }
}

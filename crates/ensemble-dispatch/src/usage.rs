//! Usage text.
//!
//! Every visible part contributes one line, `<ensemble path> <part> <usage>`,
//! in the registry's alphabetical order. Hidden parts and the `@error` part
//! are left out; when an `@error` part exists the list ends with a line
//! saying that other subcommands are handled elsewhere.

use serde::Serialize;

use crate::ensemble::{EnsembleId, Part, PartKind};
use crate::error::{EnsembleError, Result};
use crate::manager::{EnsembleManager, Target};

/// Trailing line shown when an ensemble has an `@error` part.
pub const OTHERS_LINE: &str = "...and others described elsewhere";

/// Usage shown for a sub-ensemble part that was given none.
pub const SUB_ENSEMBLE_USAGE: &str = "option ?arg arg ...?";

/// Usage text as shown for a part: the explicit usage, or one synthesized
/// from the sub-ensemble or the script's argument spec.
pub(crate) fn effective_usage(part: &Part) -> String {
    if !part.usage.is_empty() {
        return part.usage.clone();
    }
    match &part.kind {
        PartKind::Ensemble(_) => SUB_ENSEMBLE_USAGE.to_string(),
        PartKind::Leaf(handler) => handler.synthesized_usage().unwrap_or_default(),
    }
}

/// Serializable snapshot of an ensemble tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsembleSummary {
    pub path: String,
    pub parts: Vec<PartSummary>,
}

/// One part inside an [`EnsembleSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartSummary {
    pub name: String,
    pub usage: String,
    pub min_chars: usize,
    pub kind: PartSummaryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<EnsembleSummary>,
}

/// Kind column of a [`PartSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartSummaryKind {
    Native,
    Script,
    Ensemble,
}

impl EnsembleManager {
    /// One usage line per visible part of an ensemble, in part order.
    pub fn usage_lines(&self, id: EnsembleId) -> Result<Vec<String>> {
        let ensemble = self.ensemble(id)?;
        let error_part = &self.config().error_part;
        let path = self.path_of(id).join(" ");

        let mut lines = Vec::with_capacity(ensemble.parts.len());
        let mut has_error_part = false;
        for entry in ensemble.parts.iter() {
            if entry.name() == error_part {
                has_error_part = true;
                continue;
            }
            if entry.value.flags.hidden {
                continue;
            }
            lines.push(usage_line(&path, entry.name(), &effective_usage(&entry.value)));
        }
        if has_error_part {
            lines.push(OTHERS_LINE.to_string());
        }
        Ok(lines)
    }

    /// Usage line of a single part, looked up by exact name.
    pub fn part_usage(&self, id: EnsembleId, name: &str) -> Result<String> {
        let ensemble = self.ensemble(id)?;
        let entry = ensemble.parts.get(name).ok_or_else(|| {
            EnsembleError::structural(format!(
                "bad part \"{}\" in ensemble \"{}\"",
                name,
                self.path_of(id).join(" ")
            ))
        })?;
        Ok(usage_line(
            &self.path_of(id).join(" "),
            entry.name(),
            &effective_usage(&entry.value),
        ))
    }

    /// Usage text of the ensemble at `path`, one line per part.
    ///
    /// ```rust
    /// use ensemble_dispatch::EnsembleManager;
    ///
    /// let mut manager = EnsembleManager::new();
    /// manager.define(r#"
    ///     ensemble info {
    ///         part args {procname} { return $procname }
    ///         part body {procname} { return $procname }
    ///     }
    /// "#)?;
    /// assert_eq!(
    ///     manager.get_usage("info")?,
    ///     "info args procname\ninfo body procname"
    /// );
    /// # Ok::<(), ensemble_dispatch::EnsembleError>(())
    /// ```
    pub fn get_usage(&self, path: &str) -> Result<String> {
        let id = self.require_ensemble(path)?;
        Ok(self.usage_lines(id)?.join("\n"))
    }

    /// Usage for a dispatch token: the ensemble's lines, or the single line
    /// of the part a target refers to.
    pub fn get_usage_for_token(&self, token: &str) -> Result<String> {
        match self.target(token) {
            Some(Target::Ensemble(id)) => Ok(self.usage_lines(*id)?.join("\n")),
            Some(Target::Part { ensemble, part }) => self.part_usage(*ensemble, part),
            None => Err(EnsembleError::NotAnEnsemble(token.to_string())),
        }
    }

    /// Snapshot of the tree rooted at the ensemble at `path`.
    pub fn describe(&self, path: &str) -> Result<EnsembleSummary> {
        let id = self.require_ensemble(path)?;
        self.summarize(id)
    }

    fn summarize(&self, id: EnsembleId) -> Result<EnsembleSummary> {
        let ensemble = self.ensemble(id)?;
        let mut parts = Vec::with_capacity(ensemble.parts.len());
        for entry in ensemble.parts.iter() {
            let (kind, children) = match &entry.value.kind {
                PartKind::Ensemble(child) => {
                    (PartSummaryKind::Ensemble, Some(self.summarize(*child)?))
                }
                PartKind::Leaf(handler) => match handler.synthesized_usage() {
                    Some(_) => (PartSummaryKind::Script, None),
                    None => (PartSummaryKind::Native, None),
                },
            };
            parts.push(PartSummary {
                name: entry.name().to_string(),
                usage: effective_usage(&entry.value),
                min_chars: entry.min_chars(),
                kind,
                children,
            });
        }
        Ok(EnsembleSummary {
            path: self.path_of(id).join(" "),
            parts,
        })
    }
}

fn usage_line(path: &str, name: &str, usage: &str) -> String {
    if usage.is_empty() {
        format!("{} {}", path, name)
    } else {
        format!("{} {} {}", path, name, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::PartFlags;
    use crate::handler::{HandlerVariant, Invocation};
    use crate::manager::PartSpec;

    fn native() -> HandlerVariant {
        HandlerVariant::from_fn(|_m: &mut EnsembleManager, _c: &Invocation| {
            Ok::<_, EnsembleError>(String::new())
        })
    }

    #[test]
    fn test_lines_follow_part_order() {
        let mut m = EnsembleManager::new();
        let id = m.create_ensemble("info").unwrap();
        m.add_part(id, PartSpec::new("body", native()).usage("procname"))
            .unwrap();
        m.add_part(id, PartSpec::new("args", native()).usage("procname"))
            .unwrap();
        assert_eq!(
            m.usage_lines(id).unwrap(),
            vec!["info args procname", "info body procname"]
        );
    }

    #[test]
    fn test_empty_usage_has_no_trailing_space() {
        let mut m = EnsembleManager::new();
        let id = m.create_ensemble("info").unwrap();
        m.add_part(id, PartSpec::new("level", native())).unwrap();
        assert_eq!(m.get_usage("info").unwrap(), "info level");
    }

    #[test]
    fn test_script_usage_is_synthesized() {
        let mut m = EnsembleManager::new();
        let id = m.create_ensemble("info").unwrap();
        let proc = HandlerVariant::script("name {level 0} args", "return").unwrap();
        m.add_part(id, PartSpec::new("frame", proc)).unwrap();
        assert_eq!(
            m.get_usage("info").unwrap(),
            "info frame name ?level? ?arg arg ...?"
        );
    }

    #[test]
    fn test_hidden_and_error_parts() {
        let mut m = EnsembleManager::new();
        let id = m.create_ensemble("obj").unwrap();
        m.add_part(id, PartSpec::new("cget", native()).usage("option"))
            .unwrap();
        m.add_part(
            id,
            PartSpec::new("_internal", native()).flags(PartFlags::hidden()),
        )
        .unwrap();
        m.add_part(id, PartSpec::new("@error", native())).unwrap();
        assert_eq!(
            m.usage_lines(id).unwrap(),
            vec!["obj cget option", OTHERS_LINE]
        );
    }

    #[test]
    fn test_nested_usage_paths() {
        let mut m = EnsembleManager::new();
        m.create_ensemble("info").unwrap();
        let sub = m.create_ensemble("info sub").unwrap();
        m.add_part(sub, PartSpec::new("x", native()).usage("a b"))
            .unwrap();
        assert_eq!(m.get_usage("info sub").unwrap(), "info sub x a b");
        assert_eq!(
            m.get_usage("info").unwrap(),
            "info sub option ?arg arg ...?"
        );
    }

    #[test]
    fn test_usage_for_part_target() {
        let mut m = EnsembleManager::new();
        let id = m.create_ensemble("info").unwrap();
        m.add_part(id, PartSpec::new("args", native()).usage("procname"))
            .unwrap();
        let target = m.get_part("info", "args").unwrap().target;
        assert_eq!(
            m.get_usage_for_token(&target).unwrap(),
            "info args procname"
        );
        assert_eq!(m.get_usage_for_token("info").unwrap(), "info args procname");
        assert!(m.get_usage_for_token("nope").is_err());
    }

    #[test]
    fn test_describe_serializes_tree() {
        let mut m = EnsembleManager::new();
        let id = m.create_ensemble("info").unwrap();
        m.add_part(id, PartSpec::new("args", native())).unwrap();
        m.create_ensemble("info sub").unwrap();

        let summary = m.describe("info").unwrap();
        assert_eq!(summary.path, "info");
        assert_eq!(summary.parts.len(), 2);
        assert_eq!(summary.parts[1].kind, PartSummaryKind::Ensemble);
        assert_eq!(summary.parts[1].children.as_ref().unwrap().path, "info sub");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["parts"][0]["kind"], "native");
        assert!(json["parts"][0].get("children").is_none());
    }

    #[test]
    fn test_unknown_path() {
        let m = EnsembleManager::new();
        assert!(matches!(
            m.get_usage("nope"),
            Err(EnsembleError::NotAnEnsemble(_))
        ));
    }
}

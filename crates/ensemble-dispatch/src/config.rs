//! Session configuration.

use serde::{Deserialize, Serialize};

/// Default bound on reentrant dispatch depth.
///
/// Each nested `eval` costs native stack; this keeps runaway recursion
/// inside a default 2 MiB thread stack.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Default name of the reserved unknown-subcommand part.
pub const DEFAULT_ERROR_PART: &str = "@error";

/// Default prefix for implementation namespaces.
pub const DEFAULT_NAMESPACE_ROOT: &str = "::ensemble";

/// Tunables for one [`EnsembleManager`](crate::EnsembleManager) session.
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```rust
/// use ensemble_dispatch::ManagerConfig;
///
/// let config: ManagerConfig = serde_json::from_str(r#"{"max_nesting_depth": 64}"#).unwrap();
/// assert_eq!(config.max_nesting_depth, 64);
/// assert_eq!(config.error_part, "@error");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of nested `eval` calls before dispatch gives up.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Part consulted when a typed subcommand matches nothing.
    #[serde(default = "default_error_part")]
    pub error_part: String,

    /// Prefix of the per-ensemble namespaces that hold part targets.
    #[serde(default = "default_namespace_root")]
    pub namespace_root: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            error_part: DEFAULT_ERROR_PART.to_string(),
            namespace_root: DEFAULT_NAMESPACE_ROOT.to_string(),
        }
    }
}

fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_NESTING_DEPTH
}

fn default_error_part() -> String {
    DEFAULT_ERROR_PART.to_string()
}

fn default_namespace_root() -> String {
    DEFAULT_NAMESPACE_ROOT.to_string()
}

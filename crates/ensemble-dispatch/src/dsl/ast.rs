//! Declarative tree produced by the definition parser.

/// A parsed definition source: one node per top-level `ensemble` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definition {
    pub ensembles: Vec<EnsembleNode>,
}

/// `ensemble <name> { ... }`, or the single-line form holding one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsembleNode {
    pub name: String,
    pub line: usize,
    pub items: Vec<Item>,
}

/// One command inside an ensemble body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Part(PartNode),
    Ensemble(EnsembleNode),
}

/// The keyword a leaf part was declared with. Both build the same part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKeyword {
    Part,
    Option,
}

impl PartKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            PartKeyword::Part => "part",
            PartKeyword::Option => "option",
        }
    }
}

/// `part <name> <argSpec> <body>` / `option <name> <argSpec> <body>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartNode {
    pub keyword: PartKeyword,
    pub name: String,
    pub arg_spec: String,
    pub body: String,
    pub line: usize,
}

impl EnsembleNode {
    /// Number of leaf parts in this node and below.
    pub fn part_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                Item::Part(_) => 1,
                Item::Ensemble(node) => node.part_count(),
            })
            .sum()
    }
}

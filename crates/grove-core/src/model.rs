//! Core data structures for the code graph schema

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bumped whenever the schema shape or the extraction rules change.
/// Callers compare it to decide whether a cached schema is stale.
pub const PARSER_VERSION: &str = "grove-graph/1";

/// Prefix of every placeholder id used for unresolved edge targets.
pub const EXTERNAL_PREFIX: &str = "external:";

/// Source ecosystems the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Php,
    Ruby,
    /// Only valid at the schema level, never on a node.
    Mixed,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "typescript" | "ts" => Ok(Language::TypeScript),
            "javascript" | "js" => Ok(Language::JavaScript),
            "php" => Ok(Language::Php),
            "ruby" | "rb" => Ok(Language::Ruby),
            "mixed" => Ok(Language::Mixed),
            other => Err(format!("unknown language `{other}`")),
        }
    }
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Class,
    Interface,
    Function,
    Module,
    Trait,
    Enum,
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Imports,
    Extends,
    Implements,
    Includes,
    Exports,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Imports => "imports",
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
            EdgeKind::Includes => "includes",
            EdgeKind::Exports => "exports",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation written by a diff overlay. Backends never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

/// Layout coordinate written by a renderer. Backends never set it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single node in the code graph: a file or a symbol declared in one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub display_name: String,
    /// Relative to the repository root, `/`-separated.
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_status: Option<ChangeStatus>,
}

impl CodeNode {
    /// File-level node. Files are always considered exported.
    pub fn file(file_path: &str, language: Language) -> Self {
        let name = file_path.rsplit('/').next().unwrap_or(file_path).to_string();
        CodeNode {
            id: file_path.to_string(),
            kind: NodeKind::File,
            display_name: file_path.to_string(),
            name,
            file_path: file_path.to_string(),
            line: None,
            end_line: None,
            language,
            namespace: None,
            exported: true,
            position: None,
            change_status: None,
        }
    }

    /// Symbol-level node. `symbol` is the in-file unique name used for the id.
    pub fn symbol(file_path: &str, symbol: &str, name: &str, kind: NodeKind, language: Language) -> Self {
        CodeNode {
            id: symbol_id(file_path, symbol),
            kind,
            name: name.to_string(),
            display_name: symbol.to_string(),
            file_path: file_path.to_string(),
            line: None,
            end_line: None,
            language,
            namespace: None,
            exported: false,
            position: None,
            change_status: None,
        }
    }

    pub fn with_span(mut self, line: u32, end_line: u32) -> Self {
        self.line = Some(line);
        self.end_line = Some(end_line);
        self
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }
}

/// A directed edge in the code graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEdge {
    pub id: String,
    pub kind: EdgeKind,
    pub source: String,
    pub target: String,
    /// True iff `target` is a node of the same schema.
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<String>,
}

/// A file a backend could not process. The rest of the graph is still returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// The complete output of one parse run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeGraphSchema {
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeEdge>,
    pub language: Language,
    pub root_path: String,
    pub parsed_at: String,
    pub parser_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<SkippedFile>,
}

impl CodeGraphSchema {
    pub fn node(&self, id: &str) -> Option<&CodeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edges_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a CodeEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == source)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &CodeEdge> + '_ {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Whether this schema was produced by a different pipeline version.
    pub fn is_stale(&self) -> bool {
        self.parser_version != PARSER_VERSION
    }
}

/// `<filePath>#<symbolName>`
pub fn symbol_id(file_path: &str, symbol: &str) -> String {
    format!("{file_path}#{symbol}")
}

/// Deterministic placeholder for a target outside the scanned repository.
/// The caller normalises the specifier first; this only adds the prefix.
pub fn placeholder_id(specifier: &str) -> String {
    format!("{EXTERNAL_PREFIX}{specifier}")
}

pub fn edge_id(source: &str, kind: EdgeKind, target: &str) -> String {
    format!("{source}-{kind}->{target}")
}

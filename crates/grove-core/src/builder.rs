//! Schema assembly shared by every backend.
//!
//! Backends push nodes and relations in discovery order; `finish` enforces
//! the structural invariants of the schema:
//!
//! - node ids are unique (later duplicates are dropped)
//! - every edge source is an emitted node (otherwise the edge is dropped)
//! - a resolved edge points at an emitted node (otherwise it is downgraded
//!   to a placeholder edge built from its specifier)
//! - edge ids are unique (first occurrence wins)

use std::collections::HashSet;

use crate::error::FileProcessingError;
use crate::model::*;

/// Target of a relation as seen by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    /// Node id inside the schema.
    Node(String),
    /// Normalised specifier of something outside the repository.
    External(String),
}

/// A relation before id assignment and validation.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: EdgeKind,
    pub source: String,
    pub target: EdgeTarget,
    pub line: Option<u32>,
    pub specifier: Option<String>,
}

pub struct GraphBuilder {
    language: Language,
    root_path: String,
    nodes: Vec<CodeNode>,
    node_ids: HashSet<String>,
    relations: Vec<Relation>,
    skipped: Vec<SkippedFile>,
}

impl GraphBuilder {
    pub fn new(language: Language, root_path: impl Into<String>) -> Self {
        GraphBuilder {
            language,
            root_path: root_path.into(),
            nodes: Vec::new(),
            node_ids: HashSet::new(),
            relations: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Add a node. Returns false if the id was already taken.
    pub fn add_node(&mut self, node: CodeNode) -> bool {
        if !self.node_ids.insert(node.id.clone()) {
            tracing::debug!("Duplicate node id {}, keeping the first", node.id);
            return false;
        }
        self.nodes.push(node);
        true
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    pub fn add_relation(
        &mut self,
        kind: EdgeKind,
        source: impl Into<String>,
        target: EdgeTarget,
        line: Option<u32>,
        specifier: Option<String>,
    ) {
        self.relations.push(Relation {
            kind,
            source: source.into(),
            target,
            line,
            specifier,
        });
    }

    pub fn skip(&mut self, err: &FileProcessingError) {
        tracing::warn!("Skipping {}", err);
        self.skipped.push(SkippedFile::from(err));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn finish(self) -> CodeGraphSchema {
        let GraphBuilder {
            language,
            root_path,
            nodes,
            node_ids,
            relations,
            skipped,
        } = self;

        let mut edge_ids = HashSet::new();
        let mut edges = Vec::with_capacity(relations.len());

        for relation in relations {
            if !node_ids.contains(&relation.source) {
                tracing::debug!(
                    "Dropping {} edge from unknown node {}",
                    relation.kind,
                    relation.source
                );
                continue;
            }

            let (target, resolved) = match relation.target {
                EdgeTarget::Node(id) if node_ids.contains(&id) => (id, true),
                EdgeTarget::Node(id) => {
                    let fallback = relation.specifier.clone().unwrap_or(id);
                    tracing::debug!("Target {} is not a node, keeping it as external", fallback);
                    (placeholder_id(&fallback), false)
                }
                EdgeTarget::External(spec) => (placeholder_id(&spec), false),
            };

            let id = edge_id(&relation.source, relation.kind, &target);
            if !edge_ids.insert(id.clone()) {
                continue;
            }

            edges.push(CodeEdge {
                id,
                kind: relation.kind,
                source: relation.source,
                target,
                resolved,
                line: relation.line,
                specifier: relation.specifier,
            });
        }

        CodeGraphSchema {
            nodes,
            edges,
            language,
            root_path,
            parsed_at: chrono::Utc::now().to_rfc3339(),
            parser_version: PARSER_VERSION.to_string(),
            skipped_files: skipped,
        }
    }
}

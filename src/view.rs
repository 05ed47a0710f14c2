use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{SyncError, SyncResult},
    models::{
        ForceLayout, GraphPath, PathNode, PathRelationship, ViewCategory, ViewGraph, ViewLink,
        ViewNode, ViewPayload,
    },
};

pub const FILM_SYMBOL_SIZE: u32 = 40;
pub const DEFAULT_SYMBOL_SIZE: u32 = 30;

/// Node identity in the rendered view: `name`, falling back to `title`.
pub fn display_key(node: &PathNode) -> SyncResult<&str> {
    node.properties
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| node.properties.get("title").and_then(Value::as_str))
        .ok_or_else(|| SyncError::DisplayKeyMissing {
            label: node
                .labels
                .first()
                .cloned()
                .unwrap_or_else(|| "unlabeled".to_string()),
        })
}

fn primary_label(node: &PathNode) -> SyncResult<&str> {
    node.labels
        .first()
        .map(String::as_str)
        .ok_or(SyncError::LabelMissing)
}

/// Flattens traversal paths into deduplicated nodes, per-traversal links and
/// first-seen categories. Category indexes are only stable within one builder.
#[derive(Debug, Default)]
pub struct ViewBuilder {
    category_index: IndexMap<String, usize>,
    seen_nodes: HashSet<String>,
    graph: ViewGraph,
}

impl ViewBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every relationship of `path`. A relationship whose endpoints
    /// cannot be resolved is left out entirely and its error returned.
    pub fn push_path(&mut self, path: &GraphPath) -> Vec<SyncError> {
        path.relationships
            .iter()
            .filter_map(|rel| self.push_relationship(path, rel).err())
            .collect()
    }

    fn push_relationship(&mut self, path: &GraphPath, rel: &PathRelationship) -> SyncResult<()> {
        let endpoint = |position: usize| {
            path.nodes
                .get(position)
                .ok_or_else(|| SyncError::DanglingRelationship {
                    kind: rel.kind.clone(),
                    position,
                    len: path.nodes.len(),
                })
        };
        let start = endpoint(rel.start)?;
        let end = endpoint(rel.end)?;

        let start_label = primary_label(start)?;
        let end_label = primary_label(end)?;
        let start_key = display_key(start)?;
        let end_key = display_key(end)?;

        self.add_node(start_key, start_label);
        self.add_node(end_key, end_label);
        self.graph.links.push(ViewLink {
            source: start_key.to_string(),
            target: end_key.to_string(),
            value: rel.kind.clone(),
        });
        Ok(())
    }

    fn category_for(&mut self, label: &str) -> usize {
        if let Some(index) = self.category_index.get(label) {
            return *index;
        }
        let index = self.category_index.len();
        self.category_index.insert(label.to_string(), index);
        self.graph.categories.push(ViewCategory {
            name: label.to_string(),
        });
        index
    }

    fn add_node(&mut self, key: &str, label: &str) {
        let category = self.category_for(label);
        if !self.seen_nodes.insert(key.to_string()) {
            return;
        }
        let symbol_size = if label == "Film" {
            FILM_SYMBOL_SIZE
        } else {
            DEFAULT_SYMBOL_SIZE
        };
        self.graph.nodes.push(ViewNode {
            name: key.to_string(),
            symbol_size,
            category,
        });
    }

    pub fn finish(self) -> ViewGraph {
        self.graph
    }
}

pub fn flatten_paths(paths: &[GraphPath]) -> (ViewGraph, Vec<SyncError>) {
    let mut builder = ViewBuilder::new();
    let mut rejected = Vec::new();
    for path in paths {
        for err in builder.push_path(path) {
            warn!(code = err.code(), "Relationship left out of view: {err}");
            rejected.push(err);
        }
    }
    (builder.finish(), rejected)
}

/// Wraps a flattened graph with the force-layout settings the renderer expects.
pub fn render_payload(paths: &[GraphPath], force: ForceLayout) -> ViewPayload {
    let (graph, rejected) = flatten_paths(paths);
    let message = if graph.nodes.is_empty() {
        Some("No graph data found.".to_string())
    } else {
        None
    };
    ViewPayload {
        graph,
        layout: "force".to_string(),
        force,
        skipped_relationships: rejected.len(),
        message,
    }
}

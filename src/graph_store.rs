use std::{path::Path, time::Duration};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    error::{SyncError, SyncResult},
    models::{
        GraphEdge, GraphNode, GraphPath, GraphSnapshot, NodeLabel, NodeRef, PathNode,
        PathQuery, PathRelationship, RelationKind, StoredNode,
    },
};

/// Write and traversal surface of the graph store. Every value reaches the
/// store as a bound parameter, never spliced into command text.
pub trait GraphSink {
    /// Drops every node and relationship. Returns the number of nodes removed.
    fn clear(&mut self) -> SyncResult<usize>;

    /// Creates the node or overwrites the properties of the node sharing its key.
    fn merge_node(&mut self, node: &GraphNode) -> SyncResult<()>;

    /// Creates the relationship unless the same triple exists. Both endpoints
    /// must already be present.
    fn merge_edge(&mut self, edge: &GraphEdge) -> SyncResult<()>;

    fn snapshot(&self) -> SyncResult<GraphSnapshot>;

    fn paths(&self, query: &PathQuery) -> SyncResult<Vec<GraphPath>>;
}

pub struct SqliteGraphStore {
    conn: Connection,
}

impl SqliteGraphStore {
    pub fn open(path: &Path) -> SyncResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SyncResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SyncResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS graph_nodes (
                node_label TEXT NOT NULL,
                node_key TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                PRIMARY KEY (node_label, node_key)
            );
            CREATE TABLE IF NOT EXISTS graph_edges (
                relation_type TEXT NOT NULL,
                source_label TEXT NOT NULL,
                source_key TEXT NOT NULL,
                target_label TEXT NOT NULL,
                target_key TEXT NOT NULL,
                PRIMARY KEY (relation_type, source_label, source_key, target_label, target_key)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_source ON graph_edges(source_label, source_key);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON graph_edges(target_label, target_key);
            ",
        )?;
        Ok(Self { conn })
    }

    pub fn node_properties(&self, node: &NodeRef) -> SyncResult<Option<Map<String, Value>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT properties_json FROM graph_nodes WHERE node_label = ?1 AND node_key = ?2",
                params![node.label.as_str(), node.key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn node_exists(&self, node: &NodeRef) -> SyncResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM graph_nodes WHERE node_label = ?1 AND node_key = ?2",
                params![node.label.as_str(), node.key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn parse_label(raw: &str) -> SyncResult<NodeLabel> {
    NodeLabel::parse(raw).ok_or_else(|| SyncError::MalformedDocument {
        id: raw.to_string(),
        reason: "unknown node label in graph store".to_string(),
    })
}

fn parse_kind(raw: &str) -> SyncResult<RelationKind> {
    RelationKind::parse(raw).ok_or_else(|| SyncError::MalformedDocument {
        id: raw.to_string(),
        reason: "unknown relationship type in graph store".to_string(),
    })
}

fn display_key_of(properties: &Map<String, Value>) -> Option<&str> {
    properties
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| properties.get("title").and_then(Value::as_str))
}

impl GraphSink for SqliteGraphStore {
    fn clear(&mut self) -> SyncResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM graph_edges", [])?;
        let nodes = tx.execute("DELETE FROM graph_nodes", [])?;
        tx.commit()?;
        Ok(nodes)
    }

    fn merge_node(&mut self, node: &GraphNode) -> SyncResult<()> {
        let properties = serde_json::to_string(&node.properties())?;
        self.conn.execute(
            "INSERT INTO graph_nodes(node_label,node_key,properties_json) VALUES(?1,?2,?3)
             ON CONFLICT(node_label,node_key) DO UPDATE SET properties_json = excluded.properties_json",
            params![node.label().as_str(), node.key(), properties],
        )?;
        Ok(())
    }

    fn merge_edge(&mut self, edge: &GraphEdge) -> SyncResult<()> {
        for endpoint in [&edge.from, &edge.to] {
            if !self.node_exists(endpoint)? {
                return Err(SyncError::MissingEndpoint {
                    kind: edge.kind.as_str().to_string(),
                    label: endpoint.label.as_str().to_string(),
                    key: endpoint.key.clone(),
                });
            }
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO graph_edges(relation_type,source_label,source_key,target_label,target_key) VALUES(?1,?2,?3,?4,?5)",
            params![
                edge.kind.as_str(),
                edge.from.label.as_str(),
                edge.from.key,
                edge.to.label.as_str(),
                edge.to.key
            ],
        )?;
        Ok(())
    }

    fn snapshot(&self) -> SyncResult<GraphSnapshot> {
        let mut nodes = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT node_label,node_key,properties_json FROM graph_nodes ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (label, key, properties) = row?;
                nodes.push(StoredNode {
                    label: parse_label(&label)?,
                    key,
                    properties: serde_json::from_str(&properties)?,
                });
            }
        }

        let mut edges = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT relation_type,source_label,source_key,target_label,target_key FROM graph_edges ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            for row in rows {
                let (kind, source_label, source_key, target_label, target_key) = row?;
                edges.push(GraphEdge {
                    kind: parse_kind(&kind)?,
                    from: NodeRef {
                        label: parse_label(&source_label)?,
                        key: source_key,
                    },
                    to: NodeRef {
                        label: parse_label(&target_label)?,
                        key: target_key,
                    },
                });
            }
        }

        Ok(GraphSnapshot { nodes, edges })
    }

    /// One-hop paths `(start)-[rel]->(end)` in insertion order. With a center,
    /// only relationships touching a node whose display key equals it.
    fn paths(&self, query: &PathQuery) -> SyncResult<Vec<GraphPath>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.relation_type, s.node_label, s.properties_json, t.node_label, t.properties_json
             FROM graph_edges e
             JOIN graph_nodes s ON s.node_label = e.source_label AND s.node_key = e.source_key
             JOIN graph_nodes t ON t.node_label = e.target_label AND t.node_key = e.target_key
             ORDER BY e.rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut paths = Vec::new();
        for row in rows {
            if paths.len() >= query.limit {
                break;
            }
            let (kind, start_label, start_props, end_label, end_props) = row?;
            let start: Map<String, Value> = serde_json::from_str(&start_props)?;
            let end: Map<String, Value> = serde_json::from_str(&end_props)?;

            if let Some(center) = query.center.as_deref() {
                let touches = display_key_of(&start) == Some(center)
                    || display_key_of(&end) == Some(center);
                if !touches {
                    continue;
                }
            }

            paths.push(GraphPath {
                nodes: vec![
                    PathNode {
                        labels: vec![start_label],
                        properties: start,
                    },
                    PathNode {
                        labels: vec![end_label],
                        properties: end,
                    },
                ],
                relationships: vec![PathRelationship {
                    kind,
                    start: 0,
                    end: 1,
                }],
            });
        }

        debug!(paths = paths.len(), center = ?query.center, "Graph paths fetched");
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Film;

    fn film(id: &str, title: &str) -> GraphNode {
        GraphNode::Film(Film {
            id: id.to_string(),
            title: title.to_string(),
            year: Some(2000),
            votes: 10,
            revenue: 0.0,
        })
    }

    fn actor(name: &str) -> GraphNode {
        GraphNode::Actor {
            name: name.to_string(),
        }
    }

    fn acted(actor: &str, film_id: &str) -> GraphEdge {
        GraphEdge {
            kind: RelationKind::AJouer,
            from: NodeRef {
                label: NodeLabel::Actor,
                key: actor.to_string(),
            },
            to: NodeRef {
                label: NodeLabel::Film,
                key: film_id.to_string(),
            },
        }
    }

    #[test]
    fn merge_node_overwrites_properties_without_duplicating() {
        let mut store = SqliteGraphStore::open_in_memory().expect("store");
        store.merge_node(&film("5", "First")).expect("merge");
        store.merge_node(&film("5", "Second")).expect("merge");

        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].properties["title"], "Second");
    }

    #[test]
    fn merge_edge_is_idempotent_and_requires_endpoints() {
        let mut store = SqliteGraphStore::open_in_memory().expect("store");
        assert!(matches!(
            store.merge_edge(&acted("X", "5")),
            Err(SyncError::MissingEndpoint { .. })
        ));

        store.merge_node(&actor("X")).expect("merge");
        store.merge_node(&film("5", "A")).expect("merge");
        store.merge_edge(&acted("X", "5")).expect("edge");
        store.merge_edge(&acted("X", "5")).expect("edge again");

        assert_eq!(store.snapshot().expect("snapshot").edges.len(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let mut store = SqliteGraphStore::open_in_memory().expect("store");
        store.merge_node(&actor("X")).expect("merge");
        store.merge_node(&film("5", "A")).expect("merge");
        store.merge_edge(&acted("X", "5")).expect("edge");

        assert_eq!(store.clear().expect("clear"), 2);
        assert_eq!(store.snapshot().expect("snapshot"), GraphSnapshot::default());
    }

    #[test]
    fn quoted_titles_round_trip() {
        let mut store = SqliteGraphStore::open_in_memory().expect("store");
        let title = r#"Ocean's "Eleven" \ Twelve"#;
        store.merge_node(&film("7", title)).expect("merge");

        let props = store
            .node_properties(&NodeRef {
                label: NodeLabel::Film,
                key: "7".to_string(),
            })
            .expect("fetch")
            .expect("present");
        assert_eq!(props["title"], title);
    }

    #[test]
    fn paths_filter_by_center_and_respect_limit() {
        let mut store = SqliteGraphStore::open_in_memory().expect("store");
        for node in [actor("X"), actor("Y"), film("5", "A"), film("6", "B")] {
            store.merge_node(&node).expect("merge");
        }
        for edge in [acted("X", "5"), acted("Y", "6"), acted("X", "6")] {
            store.merge_edge(&edge).expect("edge");
        }

        let all = store
            .paths(&PathQuery {
                center: None,
                limit: 10,
            })
            .expect("paths");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].relationships[0].kind, "A_JOUER");
        assert_eq!(all[0].nodes[0].labels, vec!["Actor".to_string()]);

        let centered = store
            .paths(&PathQuery {
                center: Some("B".to_string()),
                limit: 10,
            })
            .expect("paths");
        assert_eq!(centered.len(), 2);

        let capped = store
            .paths(&PathQuery {
                center: None,
                limit: 1,
            })
            .expect("paths");
        assert_eq!(capped.len(), 1);
    }
}

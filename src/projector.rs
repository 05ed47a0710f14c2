use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    cypher::ensure_embeddable,
    document_store::DocumentSource,
    error::{SyncError, SyncResult},
    graph_store::GraphSink,
    models::{
        Document, Film, GraphEdge, GraphNode, NodeRef, RebuildReport, RelationKind,
        SkippedRecord, ACTORS_FIELD, DIRECTOR_FIELD, ID_FIELD, TITLE_FIELD, UNKNOWN_ID,
        UNKNOWN_TITLE, VOTES_FIELD, YEAR_FIELD,
    },
};

/// Clears the graph and reprojects every document into Film, Actor and
/// Realisateur nodes. Only the clear and the initial read can fail the run;
/// per-record failures land in `RebuildReport::skipped`.
pub fn rebuild_graph(
    source: &dyn DocumentSource,
    sink: &mut dyn GraphSink,
) -> SyncResult<RebuildReport> {
    let cleared_nodes = sink.clear()?;
    let documents = source.iterate_all()?;

    let mut projection = Projection {
        sink,
        report: RebuildReport {
            cleared_nodes,
            documents: documents.len(),
            ..RebuildReport::default()
        },
        films: HashSet::new(),
        actors: HashSet::new(),
        directors: HashSet::new(),
        edges: HashSet::new(),
    };

    for doc in &documents {
        projection.project(doc);
    }

    let mut report = projection.report;
    report.films = projection.films.len();
    report.actors = projection.actors.len();
    report.directors = projection.directors.len();
    report.edges = projection.edges.len();

    info!(
        documents = report.documents,
        films = report.films,
        actors = report.actors,
        directors = report.directors,
        edges = report.edges,
        skipped = report.skipped.len(),
        "Graph rebuild finished"
    );
    Ok(report)
}

struct Projection<'a> {
    sink: &'a mut dyn GraphSink,
    report: RebuildReport,
    films: HashSet<String>,
    actors: HashSet<String>,
    directors: HashSet<String>,
    edges: HashSet<GraphEdge>,
}

impl Projection<'_> {
    fn project(&mut self, doc: &Document) {
        if doc.is_design_document() {
            debug!("Ignoring design document during projection");
            return;
        }

        let film = match extract_film(doc) {
            Ok(film) => film,
            Err(err) => {
                let doc_id = match doc.get(ID_FIELD) {
                    Some(Value::String(id)) => id.clone(),
                    Some(other) => other.to_string(),
                    None => UNKNOWN_ID.to_string(),
                };
                self.skip(&doc_id, &err);
                return;
            }
        };

        let film_node = GraphNode::Film(film);
        let film_ref = film_node.node_ref();
        if let Err(err) = self.sink.merge_node(&film_node) {
            self.skip(&film_ref.key, &err);
            return;
        }
        self.films.insert(film_ref.key.clone());

        for name in doc.string_list(ACTORS_FIELD) {
            let Some(actor_ref) = self.merge_person(&film_ref.key, ACTORS_FIELD, name, |name| {
                GraphNode::Actor { name }
            }) else {
                continue;
            };
            self.actors.insert(actor_ref.key.clone());
            self.merge_edge(
                &film_ref.key,
                GraphEdge {
                    kind: RelationKind::AJouer,
                    from: actor_ref,
                    to: film_ref.clone(),
                },
            );
        }

        for name in director_names(doc) {
            let Some(director_ref) = self.merge_person(&film_ref.key, DIRECTOR_FIELD, name, |name| {
                GraphNode::Realisateur { name }
            }) else {
                continue;
            };
            self.directors.insert(director_ref.key.clone());
            self.merge_edge(
                &film_ref.key,
                GraphEdge {
                    kind: RelationKind::RealisePar,
                    from: film_ref.clone(),
                    to: director_ref,
                },
            );
        }
    }

    fn merge_person(
        &mut self,
        doc_id: &str,
        field: &str,
        name: String,
        build: impl FnOnce(String) -> GraphNode,
    ) -> Option<NodeRef> {
        if name.trim().is_empty() {
            debug!(doc_id = %doc_id, field, "Skipping empty name");
            return None;
        }
        if let Err(err) = ensure_embeddable(field, &name) {
            self.skip(doc_id, &err);
            return None;
        }
        let node = build(name);
        match self.sink.merge_node(&node) {
            Ok(()) => Some(node.node_ref()),
            Err(err) => {
                self.skip(doc_id, &err);
                None
            }
        }
    }

    fn merge_edge(&mut self, doc_id: &str, edge: GraphEdge) {
        match self.sink.merge_edge(&edge) {
            Ok(()) => {
                self.edges.insert(edge);
            }
            Err(err) => self.skip(doc_id, &err),
        }
    }

    fn skip(&mut self, doc_id: &str, err: &SyncError) {
        warn!(doc_id = %doc_id, code = err.code(), "Projection skipped record: {err}");
        self.report.skipped.push(SkippedRecord {
            doc_id: doc_id.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}

pub fn extract_film(doc: &Document) -> SyncResult<Film> {
    let id = doc.id()?.unwrap_or_else(|| UNKNOWN_ID.to_string());
    ensure_embeddable("id", &id)?;

    let title = match doc.get(TITLE_FIELD) {
        Some(Value::String(title)) => title.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN_TITLE.to_string(),
    };
    ensure_embeddable(TITLE_FIELD, &title)?;

    let year = doc.integer(YEAR_FIELD);
    let votes = doc.integer(VOTES_FIELD).unwrap_or(0);
    let revenue = doc.revenue().unwrap_or(0.0);

    Ok(Film {
        id,
        title,
        year,
        votes,
        revenue,
    })
}

/// `Director` holds either one name or a list of names.
fn director_names(doc: &Document) -> Vec<String> {
    match doc.get(DIRECTOR_FIELD) {
        Some(Value::String(name)) => vec![name.clone()],
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

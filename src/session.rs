use chrono::Utc;
use tracing::{error, info};

use crate::{
    document_store::DocumentSource,
    graph_store::GraphSink,
    models::{ErrorPayload, PrepareReport, SyncReport},
    normalize::{normalize_multi_valued_fields, purge_design_documents},
    projector::rebuild_graph,
};

/// Best-effort per-render preparation of the collection. Failures become
/// notices so the caller can still serve whatever the store holds.
pub fn prepare_documents(store: &mut dyn DocumentSource, fields: &[String]) -> PrepareReport {
    let mut report = PrepareReport::default();

    match purge_design_documents(store) {
        Ok(purged) => report.purged_design_documents = purged,
        Err(err) => {
            error!(code = err.code(), "Design document purge failed: {err}");
            report
                .notices
                .push(format!("Error while removing design documents: {err}"));
        }
    }

    match normalize_multi_valued_fields(store, fields) {
        Ok(normalized) => report.normalized_values = normalized,
        Err(err) => {
            error!(code = err.code(), "Field normalization failed: {err}");
            report
                .notices
                .push(format!("Error while updating documents: {err}"));
        }
    }

    report
}

/// Prepares the collection, then rebuilds the graph from scratch.
pub fn synchronize(
    store: &mut dyn DocumentSource,
    sink: &mut dyn GraphSink,
    fields: &[String],
) -> SyncReport {
    let started_at = Utc::now();
    let prepare = prepare_documents(store, fields);

    let (rebuild, error) = match rebuild_graph(store, sink) {
        Ok(report) => (Some(report), None),
        Err(err) => {
            error!(code = err.code(), "Graph rebuild failed: {err}");
            (None, Some(ErrorPayload::from(&err)))
        }
    };

    let finished_at = Utc::now();
    info!(
        elapsed_ms = (finished_at - started_at).num_milliseconds(),
        rebuilt = rebuild.is_some(),
        "Synchronization finished"
    );

    SyncReport {
        started_at,
        finished_at,
        prepare,
        rebuild,
        error,
    }
}

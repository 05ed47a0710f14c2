use serde_json::Value;
use tracing::info;

use crate::{
    document_store::{DocumentFilter, DocumentSource},
    error::SyncResult,
    models::{split_delimited, Document, DESIGN_DOCUMENT_PREFIX},
};

/// Rewrites delimiter-joined values of `fields` into ordered lists.
/// Values that are already lists are left untouched, so a second pass over
/// the output of the first changes nothing.
pub fn normalize_multi_valued_fields(
    store: &mut dyn DocumentSource,
    fields: &[String],
) -> SyncResult<usize> {
    let mut total = 0;
    for field in fields {
        let changed = store.update_many(
            &DocumentFilter::FieldExists(field.clone()),
            &mut |doc| normalize_field(doc, field),
        )?;
        info!(field = %field, changed, "Normalized multi-valued field");
        total += changed;
    }
    Ok(total)
}

fn normalize_field(doc: &mut Document, field: &str) -> bool {
    let parts = match doc.get(field) {
        Some(Value::String(raw)) => split_delimited(raw),
        _ => return false,
    };
    doc.insert(
        field,
        Value::Array(parts.into_iter().map(Value::from).collect()),
    );
    true
}

/// Deletes store-internal `_design*` documents so no later read sees them.
pub fn purge_design_documents(store: &mut dyn DocumentSource) -> SyncResult<usize> {
    let deleted =
        store.delete_many(&DocumentFilter::IdPrefix(DESIGN_DOCUMENT_PREFIX.to_string()))?;
    if deleted > 0 {
        info!(deleted, "Purged design documents");
    }
    Ok(deleted)
}

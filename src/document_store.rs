use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{SyncError, SyncResult},
    models::{Document, ID_FIELD},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFilter {
    FieldExists(String),
    IdPrefix(String),
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::FieldExists(field) => doc.contains(field),
            Self::IdPrefix(prefix) => {
                matches!(doc.id(), Ok(Some(id)) if id.starts_with(prefix.as_str()))
            }
        }
    }
}

/// Read/write surface of the movie collection.
pub trait DocumentSource {
    fn iterate_all(&self) -> SyncResult<Vec<Document>>;

    /// Distinct values of `field`; array values contribute their elements.
    fn distinct(&self, field: &str) -> SyncResult<Vec<Value>>;

    /// Applies `transform` to every matching document and persists the ones it
    /// reports as changed. Returns the number of changed documents.
    fn update_many(
        &mut self,
        filter: &DocumentFilter,
        transform: &mut dyn FnMut(&mut Document) -> bool,
    ) -> SyncResult<usize>;

    fn delete_many(&mut self, filter: &DocumentFilter) -> SyncResult<usize>;
}

pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> SyncResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
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
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL UNIQUE,
                body_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self { conn })
    }

    /// Upserts by `_id`, generating one when the document has none.
    /// Returns the identifier the document was stored under.
    pub fn insert_document(&mut self, mut doc: Document) -> SyncResult<String> {
        let doc_id = match doc.id()? {
            Some(id) => id,
            None => {
                let generated = Uuid::new_v4().to_string();
                doc.insert(ID_FIELD, Value::from(generated.clone()));
                generated
            }
        };
        let body = serde_json::to_string(&doc)?;
        self.conn.execute(
            "INSERT INTO documents(doc_id,body_json) VALUES(?1,?2)
             ON CONFLICT(doc_id) DO UPDATE SET body_json = excluded.body_json",
            params![doc_id, body],
        )?;
        Ok(doc_id)
    }

    pub fn get_document(&self, doc_id: &str) -> SyncResult<Option<Document>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body_json FROM documents WHERE doc_id = ?1",
                params![doc_id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> SyncResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn load_rows(&self) -> SyncResult<Vec<(String, Document)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc_id, body_json FROM documents ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (doc_id, body) = row?;
            let doc = serde_json::from_str(&body).map_err(|err| SyncError::MalformedDocument {
                id: doc_id.clone(),
                reason: format!("stored body is not valid JSON: {err}"),
            })?;
            out.push((doc_id, doc));
        }
        Ok(out)
    }
}

impl DocumentSource for SqliteDocumentStore {
    fn iterate_all(&self) -> SyncResult<Vec<Document>> {
        Ok(self.load_rows()?.into_iter().map(|(_, doc)| doc).collect())
    }

    fn distinct(&self, field: &str) -> SyncResult<Vec<Value>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for doc in self.iterate_all()? {
            let values = match doc.get(field) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in values {
                if seen.insert(value.to_string()) {
                    out.push(value);
                }
            }
        }
        Ok(out)
    }

    fn update_many(
        &mut self,
        filter: &DocumentFilter,
        transform: &mut dyn FnMut(&mut Document) -> bool,
    ) -> SyncResult<usize> {
        let rows = self.load_rows()?;
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        for (doc_id, mut doc) in rows {
            if !filter.matches(&doc) || !transform(&mut doc) {
                continue;
            }
            tx.execute(
                "UPDATE documents SET body_json = ?1 WHERE doc_id = ?2",
                params![serde_json::to_string(&doc)?, doc_id],
            )?;
            changed += 1;
        }
        tx.commit()?;
        debug!(changed, ?filter, "update_many finished");
        Ok(changed)
    }

    fn delete_many(&mut self, filter: &DocumentFilter) -> SyncResult<usize> {
        let doomed: Vec<String> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(doc_id, _)| doc_id)
            .collect();

        let tx = self.conn.transaction()?;
        for doc_id in &doomed {
            tx.execute("DELETE FROM documents WHERE doc_id = ?1", params![doc_id])?;
        }
        tx.commit()?;
        debug!(deleted = doomed.len(), ?filter, "delete_many finished");
        Ok(doomed.len())
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Seeds the store from a file holding a JSON array of movie documents.
pub fn import_json_file(store: &mut SqliteDocumentStore, path: &Path) -> Result<usize> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed reading seed file {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Seed file {} is not valid JSON", path.display()))?;
    let Value::Array(items) = parsed else {
        anyhow::bail!("Seed file {} must contain a JSON array", path.display());
    };

    let mut imported = 0;
    for item in items {
        let doc = Document::from_value(item)?;
        store.insert_document(doc)?;
        imported += 1;
    }
    info!(seed = %path.display(), imported, "Seeded document store");
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_with(docs: Vec<Value>) -> SqliteDocumentStore {
        let mut store = SqliteDocumentStore::open_in_memory().expect("in-memory store");
        for doc in docs {
            store
                .insert_document(Document::from_value(doc).expect("object"))
                .expect("insert");
        }
        store
    }

    #[test]
    fn insert_generates_missing_ids_and_upserts_existing() {
        let mut store = store_with(vec![json!({ "_id": "1", "title": "Old" })]);
        store
            .insert_document(Document::from_value(json!({ "_id": "1", "title": "New" })).unwrap())
            .expect("upsert");
        let generated = store
            .insert_document(Document::from_value(json!({ "title": "Anonymous" })).unwrap())
            .expect("insert");

        assert_eq!(store.count().expect("count"), 2);
        let doc = store.get_document("1").expect("get").expect("present");
        assert_eq!(doc.get("title"), Some(&json!("New")));
        let anonymous = store.get_document(&generated).expect("get").expect("present");
        assert_eq!(anonymous.id().expect("id"), Some(generated));
    }

    #[test]
    fn iterate_all_keeps_insertion_order() {
        let store = store_with(vec![
            json!({ "_id": "b" }),
            json!({ "_id": "a" }),
            json!({ "_id": "c" }),
        ]);
        let ids: Vec<_> = store
            .iterate_all()
            .expect("iterate")
            .iter()
            .map(|doc| doc.id().unwrap().unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn distinct_unwinds_arrays() {
        let store = store_with(vec![
            json!({ "_id": "1", "genre": ["Action", "Drama"], "year": 2000 }),
            json!({ "_id": "2", "genre": ["Drama"], "year": 2001 }),
            json!({ "_id": "3", "genre": "Comedy", "year": 2000 }),
        ]);
        assert_eq!(
            store.distinct("genre").expect("distinct"),
            vec![json!("Action"), json!("Drama"), json!("Comedy")]
        );
        assert_eq!(
            store.distinct("year").expect("distinct"),
            vec![json!(2000), json!(2001)]
        );
    }

    #[test]
    fn update_many_counts_only_changed_documents() {
        let mut store = store_with(vec![
            json!({ "_id": "1", "genre": "A,B" }),
            json!({ "_id": "2", "genre": ["C"] }),
            json!({ "_id": "3" }),
        ]);
        let mut visited = 0;
        let changed = store
            .update_many(
                &DocumentFilter::FieldExists("genre".to_string()),
                &mut |doc| {
                    visited += 1;
                    if doc.get("genre").map(Value::is_string).unwrap_or(false) {
                        doc.insert("genre", json!(["A", "B"]));
                        return true;
                    }
                    false
                },
            )
            .expect("update");

        assert_eq!(visited, 2);
        assert_eq!(changed, 1);
        let doc = store.get_document("1").expect("get").expect("present");
        assert_eq!(doc.get("genre"), Some(&json!(["A", "B"])));
    }

    #[test]
    fn delete_many_by_id_prefix() {
        let mut store = store_with(vec![
            json!({ "_id": "_design/one" }),
            json!({ "_id": "10" }),
            json!({ "_id": "_design_two" }),
        ]);
        let deleted = store
            .delete_many(&DocumentFilter::IdPrefix("_design".to_string()))
            .expect("delete");
        assert_eq!(deleted, 2);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("movies.sqlite");
        ensure_parent_dir(&path).expect("parent dir");
        {
            let mut store = SqliteDocumentStore::open(&path).expect("open");
            store
                .insert_document(Document::from_value(json!({ "_id": "1" })).unwrap())
                .expect("insert");
        }
        let store = SqliteDocumentStore::open(&path).expect("reopen");
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn import_rejects_non_array_seed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seed.json");
        fs::write(&path, r#"{"_id": "1"}"#).expect("write seed");
        let mut store = SqliteDocumentStore::open_in_memory().expect("store");
        assert!(import_json_file(&mut store, &path).is_err());

        fs::write(&path, r#"[{"_id": "1"}, {"_id": "2", "title": "B"}]"#).expect("write seed");
        assert_eq!(import_json_file(&mut store, &path).expect("import"), 2);
    }
}

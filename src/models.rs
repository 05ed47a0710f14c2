use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{SyncError, SyncResult};

pub const ID_FIELD: &str = "_id";
pub const TITLE_FIELD: &str = "title";
pub const YEAR_FIELD: &str = "year";
pub const GENRE_FIELD: &str = "genre";
pub const ACTORS_FIELD: &str = "Actors";
pub const DIRECTOR_FIELD: &str = "Director";
pub const VOTES_FIELD: &str = "Votes";
pub const REVENUE_FIELD: &str = "Revenue (Millions)";
pub const REVENUE_FALLBACK_FIELD: &str = "revenue";
pub const RUNTIME_FIELD: &str = "Runtime (Minutes)";
pub const DESCRIPTION_FIELD: &str = "Description";
pub const RATING_FIELD: &str = "rating";

pub const DESIGN_DOCUMENT_PREFIX: &str = "_design";

pub const UNKNOWN_ID: &str = "Unknown ID";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_YEAR: &str = "Unknown Year";

/// One movie record as held by the document store. Field names follow the
/// source data set, so lookups go through the `*_FIELD` constants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn from_value(value: Value) -> SyncResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(SyncError::MalformedDocument {
                id: "<none>".to_string(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Identifier as a string. Numbers are accepted and rendered in decimal;
    /// any other JSON kind has no safe string form.
    pub fn id(&self) -> SyncResult<Option<String>> {
        match self.fields.get(ID_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) => Ok(Some(id.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(SyncError::MalformedDocument {
                id: other.to_string(),
                reason: format!("`{ID_FIELD}` is a {}", json_kind(other)),
            }),
        }
    }

    pub fn is_design_document(&self) -> bool {
        matches!(self.id(), Ok(Some(id)) if id.starts_with(DESIGN_DOCUMENT_PREFIX))
    }

    /// Integer read of `field`, accepting numeric strings.
    pub fn integer(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(integer_value)
    }

    /// Revenue in millions from `Revenue (Millions)`, falling back to `revenue`.
    pub fn revenue(&self) -> Option<f64> {
        self.fields
            .get(REVENUE_FIELD)
            .or_else(|| self.fields.get(REVENUE_FALLBACK_FIELD))
            .and_then(revenue_amount)
    }

    /// Values of a multi-valued field. Lists yield their string elements;
    /// a delimited string that escaped normalization is split on the fly.
    pub fn string_list(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            Some(Value::String(raw)) => split_delimited(raw),
            _ => Vec::new(),
        }
    }
}

/// Split a delimiter-joined field value into its ordered parts.
pub fn split_delimited(raw: &str) -> Vec<String> {
    raw.split(',').map(|part| part.trim().to_string()).collect()
}

const REVENUE_SENTINELS: [&str; 3] = ["", "NA", "None"];

/// Numbers are truncated; strings may carry thousands separators (`"1,234"`).
pub fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// `None` for the sentinels `""`, `"NA"` and `"None"`, for nulls, and for
/// text that does not parse to a finite number.
pub fn revenue_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if REVENUE_SENTINELS.iter().any(|sentinel| *sentinel == s) {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Film,
    Actor,
    Realisateur,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Film => "Film",
            Self::Actor => "Actor",
            Self::Realisateur => "Realisateur",
        }
    }

    /// Property holding the identity key of nodes with this label.
    pub fn key_property(&self) -> &'static str {
        match self {
            Self::Film => "id",
            Self::Actor | Self::Realisateur => "name",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Film" => Some(Self::Film),
            "Actor" => Some(Self::Actor),
            "Realisateur" => Some(Self::Realisateur),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "A_JOUER")]
    AJouer,
    #[serde(rename = "REALISE_PAR")]
    RealisePar,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AJouer => "A_JOUER",
            Self::RealisePar => "REALISE_PAR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "A_JOUER" => Some(Self::AJouer),
            "REALISE_PAR" => Some(Self::RealisePar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Film {
    pub id: String,
    pub title: String,
    pub year: Option<i64>,
    pub votes: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Film(Film),
    Actor { name: String },
    Realisateur { name: String },
}

impl GraphNode {
    pub fn label(&self) -> NodeLabel {
        match self {
            Self::Film(_) => NodeLabel::Film,
            Self::Actor { .. } => NodeLabel::Actor,
            Self::Realisateur { .. } => NodeLabel::Realisateur,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Film(film) => &film.id,
            Self::Actor { name } | Self::Realisateur { name } => name,
        }
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            label: self.label(),
            key: self.key().to_string(),
        }
    }

    pub fn properties(&self) -> Map<String, Value> {
        let value = match self {
            Self::Film(film) => json!({
                "id": film.id,
                "title": film.title,
                "year": film.year.map(Value::from).unwrap_or_else(|| Value::from(UNKNOWN_YEAR)),
                "votes": film.votes,
                "revenue": film.revenue,
            }),
            Self::Actor { name } | Self::Realisateur { name } => json!({ "name": name }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub kind: RelationKind,
    pub from: NodeRef,
    pub to: NodeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub label: NodeLabel,
    pub key: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<StoredNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

/// `start` and `end` index into the owning path's `nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRelationship {
    pub kind: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<PathNode>,
    pub relationships: Vec<PathRelationship>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathQuery {
    pub center: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    pub name: String,
    pub symbol_size: u32,
    pub category: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewLink {
    pub source: String,
    pub target: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewCategory {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewGraph {
    pub nodes: Vec<ViewNode>,
    pub links: Vec<ViewLink>,
    pub categories: Vec<ViewCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceLayout {
    pub repulsion: f64,
    pub edge_length: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPayload {
    #[serde(flatten)]
    pub graph: ViewGraph,
    pub layout: String,
    pub force: ForceLayout,
    pub skipped_relationships: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareReport {
    pub purged_design_documents: usize,
    pub normalized_values: usize,
    pub notices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub doc_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub cleared_nodes: usize,
    pub documents: usize,
    pub films: usize,
    pub actors: usize,
    pub directors: usize,
    pub edges: usize,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub prepare: PrepareReport,
    pub rebuild: Option<RebuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&SyncError> for ErrorPayload {
    fn from(err: &SyncError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub id: Option<String>,
    pub title: String,
    pub year: Option<i64>,
    pub genres: Vec<String>,
    pub directors: Vec<String>,
    pub description: Option<String>,
    pub runtime_minutes: Option<f64>,
    pub revenue_millions: Option<f64>,
    pub rating: Option<f64>,
    pub votes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieListResponse {
    pub movies: Vec<MovieSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
}

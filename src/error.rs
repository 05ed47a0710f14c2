use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("malformed document {id}: {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("value of `{field}` cannot be embedded in a store command: {value:?}")]
    EscapingViolation { field: String, value: String },

    #[error("{label} node has neither `name` nor `title`")]
    DisplayKeyMissing { label: String },

    #[error("graph node has no label")]
    LabelMissing,

    #[error("{kind} edge references missing node {label}({key})")]
    MissingEndpoint {
        kind: String,
        label: String,
        key: String,
    },

    #[error("relationship {kind} points at node #{position} outside its path of {len} nodes")]
    DanglingRelationship {
        kind: String,
        position: usize,
        len: usize,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::MalformedDocument { .. } => "MALFORMED_DOCUMENT",
            Self::EscapingViolation { .. } => "ESCAPING_VIOLATION",
            Self::DisplayKeyMissing { .. } => "DISPLAY_KEY_MISSING",
            Self::LabelMissing => "LABEL_MISSING",
            Self::MissingEndpoint { .. } => "MISSING_ENDPOINT",
            Self::DanglingRelationship { .. } => "DANGLING_RELATIONSHIP",
            Self::Serialization(_) => "SERIALIZATION_FAILED",
        }
    }
}

use std::{env, fs, net::SocketAddr, path::PathBuf};

use tracing::warn;

use crate::models::ForceLayout;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub document_db: PathBuf,
    pub graph_db: PathBuf,
    pub seed_path: Option<PathBuf>,
    pub multi_valued_fields: Vec<String>,
    pub operator_key: Option<String>,
    pub view_path_limit: usize,
    pub top_limit: usize,
    pub force_repulsion: f64,
    pub force_edge_length: [f64; 2],
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("MOVIEGRAPH_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_normalized = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        let bind_addr = bind_normalized
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let document_db = PathBuf::from(
            lookup("MOVIEGRAPH_DOCUMENT_DB").unwrap_or_else(|| "data/movies.sqlite".to_string()),
        );
        let graph_db = PathBuf::from(
            lookup("MOVIEGRAPH_GRAPH_DB").unwrap_or_else(|| "data/graph.sqlite".to_string()),
        );

        let seed_path = lookup("MOVIEGRAPH_SEED_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let multi_valued_fields: Vec<String> = lookup("MOVIEGRAPH_MULTI_VALUED_FIELDS")
            .unwrap_or_else(|| "genre,Actors".to_string())
            .split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let view_path_limit = lookup("MOVIEGRAPH_VIEW_PATH_LIMIT")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(200);

        let top_limit = lookup("MOVIEGRAPH_TOP_LIMIT")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(3);

        let force_repulsion = lookup("MOVIEGRAPH_FORCE_REPULSION")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(300.0);

        let edge_min = lookup("MOVIEGRAPH_FORCE_EDGE_LENGTH_MIN")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(50.0);
        let edge_max = lookup("MOVIEGRAPH_FORCE_EDGE_LENGTH_MAX")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(150.0)
            .max(edge_min);

        Self {
            bind_addr,
            document_db,
            graph_db,
            seed_path,
            multi_valued_fields,
            operator_key: resolve_operator_key(&lookup),
            view_path_limit,
            top_limit,
            force_repulsion,
            force_edge_length: [edge_min, edge_max],
        }
    }

    pub fn force_layout(&self) -> ForceLayout {
        ForceLayout {
            repulsion: self.force_repulsion,
            edge_length: self.force_edge_length,
        }
    }
}

fn resolve_operator_key<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("MOVIEGRAPH_OPERATOR_KEY") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    if let Some(key_file) = lookup("MOVIEGRAPH_OPERATOR_KEY_FILE") {
        match fs::read_to_string(&key_file) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
                warn!(
                    key_file = %key_file,
                    "MOVIEGRAPH_OPERATOR_KEY_FILE is empty; mutating endpoints are unguarded"
                );
            }
            Err(err) => {
                warn!(
                    key_file = %key_file,
                    "Failed reading MOVIEGRAPH_OPERATOR_KEY_FILE: {err}; mutating endpoints are unguarded"
                );
            }
        }
        return None;
    }

    warn!("MOVIEGRAPH_OPERATOR_KEY not set; mutating endpoints are unguarded");
    None
}

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::{
    auth::verify_operator,
    browse::{self, MovieOrder, MovieQuery},
    cypher::export_script,
    document_store::SqliteDocumentStore,
    error::{SyncError, SyncResult},
    graph_store::{GraphSink, SqliteGraphStore},
    models::{MovieListResponse, MovieSummary, PathQuery},
    session::{prepare_documents, synchronize},
    view::render_payload,
    AppState,
};

const NOTHING_FOUND: &str = "No films found for this selection.";

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message.into()
            }
        })),
    )
        .into_response()
}

fn sync_error_response(err: &SyncError) -> Response {
    let status = match err {
        SyncError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::MalformedDocument { .. } | SyncError::EscapingViolation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.code(), err.to_string())
}

/// Runs store work off the async runtime. Connections are opened inside the
/// closure and dropped when it returns.
async fn run_blocking<T, F>(task: F) -> Result<T, Response>
where
    F: FnOnce() -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!(code = err.code(), "Store request failed: {err}");
            Err(sync_error_response(&err))
        }
        Err(err) => {
            error!("Blocking store task join error: {err:#}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "TASK_FAILED",
                "Store task did not complete.",
            ))
        }
    }
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn normalize(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = verify_operator(&headers, state.config.operator_key.as_deref()) {
        return err.into_response();
    }

    let config = state.config.clone();
    match run_blocking(move || {
        let mut store = SqliteDocumentStore::open(&config.document_db)?;
        Ok(prepare_documents(&mut store, &config.multi_valued_fields))
    })
    .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}

pub async fn rebuild(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = verify_operator(&headers, state.config.operator_key.as_deref()) {
        return err.into_response();
    }

    let config = state.config.clone();
    match run_blocking(move || {
        let mut store = SqliteDocumentStore::open(&config.document_db)?;
        let mut graph = SqliteGraphStore::open(&config.graph_db)?;
        Ok(synchronize(
            &mut store,
            &mut graph,
            &config.multi_valued_fields,
        ))
    })
    .await
    {
        Ok(report) if report.error.is_some() => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response()
        }
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    pub center: Option<String>,
    pub limit: Option<usize>,
}

pub async fn graph_view(
    State(state): State<AppState>,
    Query(params): Query<ViewParams>,
) -> impl IntoResponse {
    let config = state.config.clone();
    let query = PathQuery {
        center: params.center.filter(|c| !c.trim().is_empty()),
        limit: params
            .limit
            .unwrap_or(config.view_path_limit)
            .min(config.view_path_limit),
    };

    match run_blocking(move || {
        let graph = SqliteGraphStore::open(&config.graph_db)?;
        let paths = graph.paths(&query)?;
        Ok(render_payload(&paths, config.force_layout()))
    })
    .await
    {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(response) => response,
    }
}

pub async fn graph_cypher(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.clone();
    match run_blocking(move || {
        let graph = SqliteGraphStore::open(&config.graph_db)?;
        export_script(&graph.snapshot()?)
    })
    .await
    {
        Ok(script) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            script,
        )
            .into_response(),
        Err(response) => response,
    }
}

pub async fn movie_years(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.clone();
    match run_blocking(move || {
        let mut store = SqliteDocumentStore::open(&config.document_db)?;
        let prepare = prepare_documents(&mut store, &config.multi_valued_fields);
        Ok((browse::years(&store)?, prepare.notices))
    })
    .await
    {
        Ok((years, notices)) => Json(json!({ "years": years, "notices": notices })).into_response(),
        Err(response) => response,
    }
}

pub async fn movie_genres(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.clone();
    match run_blocking(move || {
        let mut store = SqliteDocumentStore::open(&config.document_db)?;
        let prepare = prepare_documents(&mut store, &config.multi_valued_fields);
        Ok((browse::genres(&store)?, prepare.notices))
    })
    .await
    {
        Ok((genres, notices)) => {
            Json(json!({ "genres": genres, "notices": notices })).into_response()
        }
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
pub struct MovieParams {
    pub year: Option<i64>,
    /// Comma-separated; every genre must match.
    pub genre: Option<String>,
    pub order: Option<MovieOrder>,
}

impl MovieParams {
    fn into_query(self) -> MovieQuery {
        MovieQuery {
            year: self.year,
            genres: self
                .genre
                .map(|raw| {
                    raw.split(',')
                        .map(|g| g.trim().to_string())
                        .filter(|g| !g.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            order: self.order.unwrap_or_default(),
        }
    }
}

fn movie_list(movies: Vec<MovieSummary>, notices: Vec<String>) -> Response {
    let message = movies.is_empty().then(|| NOTHING_FOUND.to_string());
    Json(MovieListResponse {
        movies,
        message,
        notices,
    })
    .into_response()
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<MovieParams>,
) -> impl IntoResponse {
    let config = state.config.clone();
    let query = params.into_query();
    match run_blocking(move || {
        let mut store = SqliteDocumentStore::open(&config.document_db)?;
        let prepare = prepare_documents(&mut store, &config.multi_valued_fields);
        Ok((browse::find_movies(&store, &query)?, prepare.notices))
    })
    .await
    {
        Ok((movies, notices)) => movie_list(movies, notices),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
pub struct TopParams {
    pub limit: Option<usize>,
}

pub async fn top_movies(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> impl IntoResponse {
    let config = state.config.clone();
    let limit = params.limit.unwrap_or(config.top_limit);
    match run_blocking(move || {
        let mut store = SqliteDocumentStore::open(&config.document_db)?;
        let prepare = prepare_documents(&mut store, &config.multi_valued_fields);
        Ok((browse::top_rated(&store, limit)?, prepare.notices))
    })
    .await
    {
        Ok((movies, notices)) => movie_list(movies, notices),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_params_split_genres() {
        let query = MovieParams {
            year: Some(2016),
            genre: Some("Action, ,Sci-Fi".to_string()),
            order: None,
        }
        .into_query();
        assert_eq!(query.genres, vec!["Action", "Sci-Fi"]);
        assert_eq!(query.order, MovieOrder::Title);
    }

    #[test]
    fn store_outages_map_to_service_unavailable() {
        let response =
            sync_error_response(&SyncError::StoreUnavailable(rusqlite::Error::QueryReturnedNoRows));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = sync_error_response(&SyncError::EscapingViolation {
            field: "title".to_string(),
            value: "\u{0}".to_string(),
        });
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn empty_listing_carries_nothing_found_message() {
        let response = movie_list(Vec::new(), vec!["Error while updating documents".to_string()]);
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["message"], NOTHING_FOUND);
        assert_eq!(value["movies"], json!([]));
        assert_eq!(value["notices"][0], "Error while updating documents");
    }
}

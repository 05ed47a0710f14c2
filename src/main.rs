mod api;
mod auth;
mod browse;
mod config;
mod cypher;
mod document_store;
mod error;
mod graph_store;
mod models;
mod normalize;
mod projector;
mod session;
mod view;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use document_store::{ensure_parent_dir, import_json_file, SqliteDocumentStore};
use graph_store::SqliteGraphStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

/// Creates both store files (and their schemas) before the first request,
/// importing the seed collection when one is configured.
async fn prepare_stores(config: &Config) -> Result<()> {
    ensure_parent_dir(&config.document_db)?;
    ensure_parent_dir(&config.graph_db)?;

    let config = config.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut documents = SqliteDocumentStore::open(&config.document_db).with_context(|| {
            format!(
                "Failed opening document store {}",
                config.document_db.display()
            )
        })?;
        SqliteGraphStore::open(&config.graph_db).with_context(|| {
            format!("Failed opening graph store {}", config.graph_db.display())
        })?;

        if let Some(seed) = &config.seed_path {
            import_json_file(&mut documents, seed)?;
        }
        info!(documents = documents.count()?, "Document store ready");
        Ok(())
    })
    .await
    .context("Store preparation task failed")?
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moviegraph=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    prepare_stores(&config).await?;

    let state = AppState {
        config: config.clone(),
    };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/v1/normalize", post(api::normalize))
        .route("/v1/graph/rebuild", post(api::rebuild))
        .route("/v1/graph/view", get(api::graph_view))
        .route("/v1/graph/cypher", get(api::graph_cypher))
        .route("/v1/movies", get(api::list_movies))
        .route("/v1/movies/years", get(api::movie_years))
        .route("/v1/movies/genres", get(api::movie_genres))
        .route("/v1/movies/top", get(api::top_movies))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("moviegraph listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

//! HTTP server for the indexer API.

use crate::apis::{meta, tasks};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use indexer_config::Config;
use indexer_task::TaskService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub tasks: Arc<TaskService>,
	pub meta: Arc<meta::MetaResponse>,
}

impl AppState {
	pub fn new(tasks: Arc<TaskService>, config: &Config) -> Self {
		Self {
			tasks,
			meta: Arc::new(meta::MetaResponse::from_config(config)),
		}
	}
}

pub fn router(state: AppState, max_request_size: usize) -> Router {
	Router::new()
		.route("/v1/health", get(meta::health))
		.route("/v1/meta", get(meta::meta))
		.route("/v1/tasks", post(tasks::create_task).get(tasks::list_tasks))
		.route("/v1/tasks/{task_id}", get(tasks::get_task))
		.route("/v1/tasks/{task_id}/accept", post(tasks::accept_task))
		.with_state(state)
		.layer(DefaultBodyLimit::max(max_request_size))
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Serves the API until `shutdown` is cancelled.
pub async fn start_server(
	config: &Config,
	tasks: Arc<TaskService>,
	shutdown: CancellationToken,
) -> anyhow::Result<()> {
	let app = router(AppState::new(tasks, config), config.api.max_request_size);
	let bind_address = format!("{}:{}", config.api.host, config.api.port);

	let listener = tokio::net::TcpListener::bind(&bind_address).await?;
	info!(address = %bind_address, "API server listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;

	info!("API server stopped");
	Ok(())
}

//! Task intake and query endpoints.

use crate::apis::ApiError;
use crate::server::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use indexer_types::{
	AcceptTaskRequest, AcceptTaskResponse, CreateTaskRequest, CreateTaskResponse,
	ListTasksQuery, ListTasksResponse, TaskView,
};

/// POST /v1/tasks
pub async fn create_task(
	State(state): State<AppState>,
	body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), ApiError> {
	let Json(request) = body?;
	let task = state.tasks.submit_task(&request).await?;
	Ok((StatusCode::CREATED, Json(CreateTaskResponse::from(&task))))
}

/// GET /v1/tasks
pub async fn list_tasks(
	State(state): State<AppState>,
	query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<ListTasksResponse>, ApiError> {
	let Query(query) = query?;
	let items = state
		.tasks
		.list_tasks(&query)
		.await?
		.into_iter()
		.map(TaskView::from)
		.collect();
	Ok(Json(ListTasksResponse { items }))
}

/// GET /v1/tasks/{task_id}
pub async fn get_task(
	State(state): State<AppState>,
	Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
	let task = state.tasks.get_task(&task_id).await?;
	Ok(Json(TaskView::from(task)))
}

/// POST /v1/tasks/{task_id}/accept
pub async fn accept_task(
	State(state): State<AppState>,
	Path(task_id): Path<String>,
	body: Result<Json<AcceptTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptTaskResponse>), ApiError> {
	let Json(request) = body?;
	let (task, accept) = state.tasks.accept_task(&task_id, &request).await?;
	Ok((
		StatusCode::CREATED,
		Json(AcceptTaskResponse {
			task_id: task.task_id,
			accept_id: accept.accept_id,
			status: task.status,
			worker_address: accept.worker_address,
		}),
	))
}

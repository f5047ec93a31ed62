//! Request and response shapes for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Task, TaskStatus};

/// Body of `POST /v1/tasks`.
///
/// Missing fields deserialize to their defaults so that validation can
/// report which one is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTaskRequest {
	pub task_id: String,
	pub title: String,
	pub chain_id: u64,
	pub amount_wei: String,
	pub deadline_unix: i64,
	pub employer_address: String,
	pub task_hash: String,
	pub escrow_address: Option<String>,
	pub signature: String,
}

/// Body of `POST /v1/tasks/{task_id}/accept`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptTaskRequest {
	pub accept_id: String,
	pub worker_address: String,
	pub signature: String,
}

/// Response of a successful task creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResponse {
	pub task_id: String,
	pub task_hash: String,
	pub status: TaskStatus,
	pub chain_id: u64,
	pub escrow_address: String,
	pub employer_address: String,
	pub amount_wei: String,
	pub deadline_unix: u64,
	pub indexer_fee_bps: u32,
}

impl From<&Task> for CreateTaskResponse {
	fn from(task: &Task) -> Self {
		Self {
			task_id: task.task_id.clone(),
			task_hash: task.task_hash.clone(),
			status: task.status,
			chain_id: task.chain_id,
			escrow_address: task.escrow_address.clone(),
			employer_address: task.employer_address.clone(),
			amount_wei: task.amount_wei.clone(),
			deadline_unix: task.deadline_unix,
			indexer_fee_bps: task.indexer_fee_bps,
		}
	}
}

/// Response of a successful accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptTaskResponse {
	pub task_id: String,
	pub accept_id: String,
	pub status: TaskStatus,
	pub worker_address: String,
}

/// Public view of a task. On-chain mirror fields are omitted until set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
	pub task_id: String,
	pub task_hash: String,
	pub status: TaskStatus,
	pub chain_id: u64,
	pub escrow_address: String,
	pub employer_address: String,
	pub worker_address: Option<String>,
	pub amount_wei: String,
	pub deadline_unix: u64,
	pub title: String,
	pub indexer_fee_bps: u32,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub onchain_created_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub released_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refunded_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub onchain_tx_hash: Option<String>,
}

impl From<Task> for TaskView {
	fn from(task: Task) -> Self {
		Self {
			task_id: task.task_id,
			task_hash: task.task_hash,
			status: task.status,
			chain_id: task.chain_id,
			escrow_address: task.escrow_address,
			employer_address: task.employer_address,
			worker_address: task.worker_address,
			amount_wei: task.amount_wei,
			deadline_unix: task.deadline_unix,
			title: task.title,
			indexer_fee_bps: task.indexer_fee_bps,
			created_at: task.created_at,
			updated_at: task.updated_at,
			onchain_created_at: task.onchain_created_at,
			released_at: task.released_at,
			refunded_at: task.refunded_at,
			onchain_tx_hash: task.onchain_tx_hash,
		}
	}
}

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Query string of `GET /v1/tasks`.
///
/// Values are kept as raw strings and parsed leniently: anything that does
/// not parse falls back to "no filter" or the default page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksQuery {
	pub chain_id: Option<String>,
	pub status: Option<String>,
	pub limit: Option<String>,
	pub offset: Option<String>,
}

impl ListTasksQuery {
	pub fn chain_id(&self) -> Option<u64> {
		self.chain_id
			.as_deref()
			.and_then(|s| s.parse::<u64>().ok())
			.filter(|id| *id != 0)
	}

	pub fn status(&self) -> Option<&str> {
		self.status.as_deref().filter(|s| !s.is_empty())
	}

	pub fn limit(&self) -> usize {
		self.limit
			.as_deref()
			.and_then(|s| s.parse::<usize>().ok())
			.filter(|n| (1..=MAX_LIST_LIMIT).contains(n))
			.unwrap_or(DEFAULT_LIST_LIMIT)
	}

	pub fn offset(&self) -> usize {
		self.offset
			.as_deref()
			.and_then(|s| s.parse::<usize>().ok())
			.unwrap_or(0)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResponse {
	pub items: Vec<TaskView>,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: String,
	pub message: String,
}

impl ErrorResponse {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			error: ErrorBody {
				code: code.into(),
				message: message.into(),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_missing_fields_default() {
		let req: CreateTaskRequest = serde_json::from_str(r#"{"task_id":"t-1"}"#).unwrap();
		assert_eq!(req.task_id, "t-1");
		assert_eq!(req.chain_id, 0);
		assert!(req.escrow_address.is_none());
		assert!(req.signature.is_empty());
	}

	#[test]
	fn test_list_query_falls_back_to_defaults() {
		let query = ListTasksQuery {
			chain_id: Some("abc".to_string()),
			status: Some(String::new()),
			limit: Some("500".to_string()),
			offset: Some("-1".to_string()),
		};
		assert_eq!(query.chain_id(), None);
		assert_eq!(query.status(), None);
		assert_eq!(query.limit(), DEFAULT_LIST_LIMIT);
		assert_eq!(query.offset(), 0);

		let query = ListTasksQuery {
			chain_id: Some("8453".to_string()),
			status: Some("released".to_string()),
			limit: Some("200".to_string()),
			offset: Some("10".to_string()),
		};
		assert_eq!(query.chain_id(), Some(8453));
		assert_eq!(query.status(), Some("released"));
		assert_eq!(query.limit(), 200);
		assert_eq!(query.offset(), 10);
	}

	#[test]
	fn test_task_view_omits_unset_onchain_fields() {
		let now = Utc::now();
		let view = TaskView {
			task_id: "t-1".to_string(),
			task_hash: "0x00".to_string(),
			status: TaskStatus::Created,
			chain_id: 1,
			escrow_address: "0x01".to_string(),
			employer_address: "0x02".to_string(),
			worker_address: None,
			amount_wei: "1".to_string(),
			deadline_unix: 1,
			title: String::new(),
			indexer_fee_bps: 0,
			created_at: now,
			updated_at: now,
			onchain_created_at: None,
			released_at: Some(now),
			refunded_at: None,
			onchain_tx_hash: None,
		};
		let json = serde_json::to_value(&view).unwrap();
		assert!(json.get("onchain_created_at").is_none());
		assert!(json.get("released_at").is_some());
		assert!(json.get("worker_address").unwrap().is_null());
	}
}

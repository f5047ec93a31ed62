//! Signed task intake.
//!
//! [`TaskService`] turns validated, signature-checked HTTP submissions into
//! store mutations and publishes what it accepted on the event bus.

use chrono::Utc;
use indexer_storage::{StorageError, TaskStore};
use indexer_types::{
	Accept, AcceptTaskRequest, CreateTaskRequest, EventBus, IndexerEvent, IntakeEvent,
	ListTasksQuery, SupportedChain, Task, TaskFilter, TaskStatus,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub mod validator;

pub use validator::{TaskValidator, ValidatedAccept, ValidatedTask};

/// Failure classes surfaced to API clients.
#[derive(Debug, Error)]
pub enum TaskError {
	#[error("{0}")]
	InvalidRequest(String),
	#[error("{0}")]
	Unauthorized(String),
	#[error("{0}")]
	Conflict(String),
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	Internal(String),
}

impl TaskError {
	/// Stable machine-readable code for the error class.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidRequest(_) => "invalid_request",
			Self::Unauthorized(_) => "unauthorized",
			Self::Conflict(_) => "conflict",
			Self::NotFound(_) => "not_found",
			Self::Internal(_) => "internal",
		}
	}
}

impl From<StorageError> for TaskError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound(what) => Self::NotFound(format!("{} not found", what)),
			StorageError::Conflict(message) => Self::Conflict(message),
			other => Self::Internal(other.to_string()),
		}
	}
}

pub struct TaskService {
	store: Arc<TaskStore>,
	validator: TaskValidator,
	fee_bps: u32,
	event_bus: EventBus,
}

impl TaskService {
	pub fn new(
		store: Arc<TaskStore>,
		validator: TaskValidator,
		fee_bps: u32,
		event_bus: EventBus,
	) -> Self {
		Self {
			store,
			validator,
			fee_bps,
			event_bus,
		}
	}

	pub fn fee_bps(&self) -> u32 {
		self.fee_bps
	}

	pub fn chains(&self) -> Vec<SupportedChain> {
		self.validator.chains().cloned().collect()
	}

	/// Validates and stores a new task in `created`.
	pub async fn submit_task(&self, req: &CreateTaskRequest) -> Result<Task, TaskError> {
		let validated = self.validator.validate_create(req)?;
		let now = Utc::now();

		let task = Task {
			task_id: validated.task_id,
			task_hash: validated.task_hash,
			chain_id: validated.chain_id,
			escrow_address: validated.escrow_address,
			employer_address: validated.employer_address,
			employer_signature: validated.employer_signature,
			worker_address: None,
			amount_wei: validated.amount_wei,
			deadline_unix: validated.deadline_unix,
			title: validated.title,
			status: TaskStatus::Created,
			indexer_fee_bps: self.fee_bps,
			onchain_created_at: None,
			released_at: None,
			refunded_at: None,
			onchain_tx_hash: None,
			created_at: now,
			updated_at: now,
		};

		self.store.insert_task(&task).await?;

		info!(
			task_id = %task.task_id,
			task_hash = %task.task_hash,
			chain_id = task.chain_id,
			employer = %task.employer_address,
			"Task created"
		);
		self.event_bus
			.publish(IndexerEvent::Intake(IntakeEvent::TaskSubmitted {
				task_id: task.task_id.clone(),
				chain_id: task.chain_id,
			}))
			.ok();

		Ok(task)
	}

	/// Validates a worker's accept and moves the task to `accepted`.
	pub async fn accept_task(
		&self,
		task_id: &str,
		req: &AcceptTaskRequest,
	) -> Result<(Task, Accept), TaskError> {
		let validated = self.validator.validate_accept(task_id, req)?;

		let accept = Accept {
			accept_id: validated.accept_id,
			task_id: validated.task_id,
			worker_address: validated.worker_address,
			worker_signature: validated.worker_signature,
			created_at: Utc::now(),
		};

		let task = self.store.accept_task(&accept).await.inspect_err(|e| {
			warn!(task_id = %task_id, accept_id = %accept.accept_id, error = %e, "Accept rejected")
		})?;

		info!(
			task_id = %task.task_id,
			accept_id = %accept.accept_id,
			worker = %accept.worker_address,
			"Task accepted"
		);
		self.event_bus
			.publish(IndexerEvent::Intake(IntakeEvent::TaskAccepted {
				task_id: task.task_id.clone(),
				accept_id: accept.accept_id.clone(),
				worker_address: accept.worker_address.clone(),
			}))
			.ok();

		Ok((task, accept))
	}

	pub async fn get_task(&self, task_id: &str) -> Result<Task, TaskError> {
		Ok(self.store.get_task(task_id).await?)
	}

	/// Lists tasks for the given query. An unknown status matches nothing.
	pub async fn list_tasks(&self, query: &ListTasksQuery) -> Result<Vec<Task>, TaskError> {
		let status = match query.status() {
			Some(raw) => match raw.parse::<TaskStatus>() {
				Ok(status) => Some(status),
				Err(_) => return Ok(Vec::new()),
			},
			None => None,
		};

		let filter = TaskFilter {
			chain_id: query.chain_id(),
			status,
		};
		Ok(self
			.store
			.list_tasks(&filter, query.limit(), query.offset())
			.await?)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{address_of, personal_sign, signed_create_request};
	use alloy_signer_local::PrivateKeySigner;
	use indexer_storage::implementations::memory::MemoryStorage;

	fn service() -> (TaskService, EventBus) {
		let bus = EventBus::new(16);
		let store = Arc::new(TaskStore::new(Box::new(MemoryStorage::new())));
		let validator = TaskValidator::new([SupportedChain {
			chain_id: 8453,
			settlement_contract: format!("0x{}", "aa".repeat(20)),
			min_confirmations: 0,
		}]);
		(TaskService::new(store, validator, 30, bus.clone()), bus)
	}

	fn accept_request(worker: &PrivateKeySigner, task_id: &str, accept_id: &str) -> AcceptTaskRequest {
		AcceptTaskRequest {
			accept_id: accept_id.to_string(),
			worker_address: address_of(worker),
			signature: personal_sign(worker, format!("{}{}", task_id, accept_id).as_bytes()),
		}
	}

	#[tokio::test]
	async fn test_create_then_accept() {
		let (service, bus) = service();
		let mut events = bus.subscribe();
		let employer = PrivateKeySigner::random();
		let worker = PrivateKeySigner::random();

		let task = service
			.submit_task(&signed_create_request(&employer, "task-001", 8453))
			.await
			.unwrap();
		assert_eq!(task.status, TaskStatus::Created);
		assert_eq!(task.indexer_fee_bps, 30);
		assert!(matches!(
			events.recv().await.unwrap(),
			IndexerEvent::Intake(IntakeEvent::TaskSubmitted { task_id, .. }) if task_id == "task-001"
		));

		let (task, accept) = service
			.accept_task("task-001", &accept_request(&worker, "task-001", "accept-001"))
			.await
			.unwrap();
		assert_eq!(task.status, TaskStatus::Accepted);
		assert_eq!(task.worker_address, Some(address_of(&worker)));
		assert_eq!(accept.accept_id, "accept-001");
		assert!(matches!(
			events.recv().await.unwrap(),
			IndexerEvent::Intake(IntakeEvent::TaskAccepted { .. })
		));

		let stored = service.get_task("task-001").await.unwrap();
		assert_eq!(stored.status, TaskStatus::Accepted);
	}

	#[tokio::test]
	async fn test_duplicate_submission_conflicts() {
		let (service, _bus) = service();
		let employer = PrivateKeySigner::random();
		let req = signed_create_request(&employer, "task-001", 8453);

		service.submit_task(&req).await.unwrap();
		let err = service.submit_task(&req).await.unwrap_err();
		assert_eq!(err.code(), "conflict");
	}

	#[tokio::test]
	async fn test_accept_conflicts_and_not_found() {
		let (service, _bus) = service();
		let employer = PrivateKeySigner::random();
		let worker = PrivateKeySigner::random();
		let other = PrivateKeySigner::random();

		let err = service
			.accept_task("missing", &accept_request(&worker, "missing", "accept-000"))
			.await
			.unwrap_err();
		assert_eq!(err.code(), "not_found");

		service
			.submit_task(&signed_create_request(&employer, "task-001", 8453))
			.await
			.unwrap();
		service
			.accept_task("task-001", &accept_request(&worker, "task-001", "accept-001"))
			.await
			.unwrap();

		let again = service
			.accept_task("task-001", &accept_request(&worker, "task-001", "accept-002"))
			.await
			.unwrap_err();
		assert_eq!(again.code(), "conflict");

		let late = service
			.accept_task("task-001", &accept_request(&other, "task-001", "accept-003"))
			.await
			.unwrap_err();
		assert_eq!(late.code(), "conflict");
	}

	#[tokio::test]
	async fn test_list_tasks_by_status() {
		let (service, _bus) = service();
		let employer = PrivateKeySigner::random();
		for id in ["task-001", "task-002"] {
			service
				.submit_task(&signed_create_request(&employer, id, 8453))
				.await
				.unwrap();
		}

		let query = ListTasksQuery {
			status: Some("created".to_string()),
			..Default::default()
		};
		assert_eq!(service.list_tasks(&query).await.unwrap().len(), 2);

		let query = ListTasksQuery {
			status: Some("open".to_string()),
			..Default::default()
		};
		assert!(service.list_tasks(&query).await.unwrap().is_empty());

		let query = ListTasksQuery {
			chain_id: Some("1".to_string()),
			..Default::default()
		};
		assert!(service.list_tasks(&query).await.unwrap().is_empty());
	}

	#[test]
	fn test_storage_errors_map_to_classes() {
		assert_eq!(
			TaskError::from(StorageError::NotFound("task t".into())).code(),
			"not_found"
		);
		assert_eq!(
			TaskError::from(StorageError::Conflict("dup".into())).code(),
			"conflict"
		);
		assert_eq!(
			TaskError::from(StorageError::Backend("disk".into())).code(),
			"internal"
		);
	}
}

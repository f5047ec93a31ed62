use crate::{StorageError, StorageInterface};
use chrono::{DateTime, Utc};
use indexer_types::{
	transition, Accept, Task, TaskEvent, TaskFilter, TransitionError, TransitionOutcome,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const TASKS: &str = "tasks";
const TASK_HASHES: &str = "task_hashes";
const ACCEPTS: &str = "accepts";
const ACCEPT_PAIRS: &str = "accept_pairs";

/// A task after an event was applied, together with what the event did.
#[derive(Debug, Clone)]
pub struct StoredTransition {
	pub task: Task,
	pub outcome: TransitionOutcome,
}

/// Authoritative store of tasks and accepts.
///
/// Records are serialized to JSON and written under namespaced keys, with
/// secondary indexes from task hash to task id and from (task, worker) to
/// accept id. Every operation that reads before it writes holds the store's
/// write lock for its whole duration, so concurrent callers observe each
/// operation as atomic.
pub struct TaskStore {
	backend: Box<dyn StorageInterface>,
	write_lock: Mutex<()>,
}

impl TaskStore {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			write_lock: Mutex::new(()),
		}
	}

	/// Inserts a new task in its initial state.
	///
	/// Fails with `Conflict` when the task id or the task hash is taken.
	pub async fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;

		if let Some(mut existing) = self.find::<Task>(TASKS, &task.task_id).await? {
			transition(&mut existing, &TaskEvent::Submitted, Utc::now())
				.map_err(|e| conflict(&task.task_id, e))?;
		}

		let hash = task.task_hash.to_ascii_lowercase();
		if self.backend.exists(&key(TASK_HASHES, &hash)).await? {
			return Err(StorageError::Conflict(format!(
				"task_hash {} already registered",
				hash
			)));
		}

		self.put(TASKS, &task.task_id, task).await?;
		self.put(TASK_HASHES, &hash, &task.task_id).await
	}

	pub async fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
		self.find(TASKS, task_id)
			.await?
			.ok_or_else(|| StorageError::NotFound(format!("task {}", task_id)))
	}

	pub async fn get_task_by_hash(&self, task_hash: &str) -> Result<Task, StorageError> {
		let hash = task_hash.to_ascii_lowercase();
		let task_id: String = self
			.find(TASK_HASHES, &hash)
			.await?
			.ok_or_else(|| StorageError::NotFound(format!("task_hash {}", hash)))?;
		self.get_task(&task_id).await
	}

	/// Lists tasks matching `filter`, newest first.
	pub async fn list_tasks(
		&self,
		filter: &TaskFilter,
		limit: usize,
		offset: usize,
	) -> Result<Vec<Task>, StorageError> {
		let prefix = format!("{}:", TASKS);
		let mut tasks = Vec::new();
		for key in self.backend.keys(&prefix).await? {
			let task: Task = match self.backend.get_bytes(&key).await {
				Ok(bytes) => decode(&bytes)?,
				// Removed between listing and reading.
				Err(StorageError::NotFound(_)) => continue,
				Err(e) => return Err(e),
			};
			if filter.matches(&task) {
				tasks.push(task);
			}
		}

		tasks.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| a.task_id.cmp(&b.task_id))
		});

		Ok(tasks.into_iter().skip(offset).take(limit).collect())
	}

	/// Records an accept without touching the task.
	pub async fn insert_accept(&self, accept: &Accept) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.check_accept_unique(accept).await?;
		self.write_accept(accept).await
	}

	pub async fn get_accept(&self, accept_id: &str) -> Result<Accept, StorageError> {
		self.find(ACCEPTS, accept_id)
			.await?
			.ok_or_else(|| StorageError::NotFound(format!("accept {}", accept_id)))
	}

	/// Assigns `worker` to a task that is still open for acceptance.
	pub async fn update_task_worker(
		&self,
		task_id: &str,
		worker: &str,
	) -> Result<Task, StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut task = self.get_task(task_id).await?;
		transition(
			&mut task,
			&TaskEvent::Accepted {
				worker: worker.to_ascii_lowercase(),
			},
			Utc::now(),
		)
		.map_err(|e| conflict(task_id, e))?;
		self.put(TASKS, task_id, &task).await?;
		Ok(task)
	}

	/// Records an accept and moves its task to `accepted` in one step.
	///
	/// The task must exist and be `created`; the accept id and the
	/// (task, worker) pair must be unused.
	pub async fn accept_task(&self, accept: &Accept) -> Result<Task, StorageError> {
		let _guard = self.write_lock.lock().await;

		let mut task = self.get_task(&accept.task_id).await?;
		transition(
			&mut task,
			&TaskEvent::Accepted {
				worker: accept.worker_address.to_ascii_lowercase(),
			},
			accept.created_at,
		)
		.map_err(|e| conflict(&accept.task_id, e))?;

		self.check_accept_unique(accept).await?;
		self.write_accept(accept).await?;
		self.put(TASKS, &task.task_id, &task).await?;

		Ok(task)
	}

	pub async fn update_onchain_created(
		&self,
		task_id: &str,
		tx_hash: &str,
		at: DateTime<Utc>,
	) -> Result<StoredTransition, StorageError> {
		let _guard = self.write_lock.lock().await;
		let task = self.get_task(task_id).await?;
		self.apply(
			task,
			TaskEvent::OnchainCreated {
				tx_hash: tx_hash.to_string(),
				at,
			},
		)
		.await
	}

	pub async fn update_onchain_worker_set(
		&self,
		task_hash: &str,
		worker: &str,
		tx_hash: &str,
	) -> Result<StoredTransition, StorageError> {
		let _guard = self.write_lock.lock().await;
		let task = self.get_task_by_hash(task_hash).await?;
		self.apply(
			task,
			TaskEvent::OnchainWorkerSet {
				worker: worker.to_ascii_lowercase(),
				tx_hash: tx_hash.to_string(),
			},
		)
		.await
	}

	pub async fn update_onchain_released(
		&self,
		task_hash: &str,
		tx_hash: &str,
		at: DateTime<Utc>,
	) -> Result<StoredTransition, StorageError> {
		let _guard = self.write_lock.lock().await;
		let task = self.get_task_by_hash(task_hash).await?;
		self.apply(
			task,
			TaskEvent::OnchainReleased {
				tx_hash: tx_hash.to_string(),
				at,
			},
		)
		.await
	}

	pub async fn update_onchain_refunded(
		&self,
		task_hash: &str,
		tx_hash: &str,
		at: DateTime<Utc>,
	) -> Result<StoredTransition, StorageError> {
		let _guard = self.write_lock.lock().await;
		let task = self.get_task_by_hash(task_hash).await?;
		self.apply(
			task,
			TaskEvent::OnchainRefunded {
				tx_hash: tx_hash.to_string(),
				at,
			},
		)
		.await
	}

	/// Applies an on-chain event and persists the task if it changed.
	/// Callers must hold the write lock.
	async fn apply(
		&self,
		mut task: Task,
		event: TaskEvent,
	) -> Result<StoredTransition, StorageError> {
		let outcome =
			transition(&mut task, &event, Utc::now()).map_err(|e| conflict(&task.task_id, e))?;

		if outcome == TransitionOutcome::Applied {
			self.put(TASKS, &task.task_id, &task).await?;
		}
		debug!(
			task_id = %task.task_id,
			event = %event,
			outcome = ?outcome,
			status = %task.status,
			"Applied task event"
		);

		Ok(StoredTransition { task, outcome })
	}

	async fn check_accept_unique(&self, accept: &Accept) -> Result<(), StorageError> {
		if self
			.backend
			.exists(&key(ACCEPTS, &accept.accept_id))
			.await?
		{
			return Err(StorageError::Conflict(format!(
				"accept_id {} already exists",
				accept.accept_id
			)));
		}
		if self.backend.exists(&key(ACCEPT_PAIRS, &pair_id(accept))).await? {
			return Err(StorageError::Conflict(format!(
				"worker {} already accepted task {}",
				accept.worker_address, accept.task_id
			)));
		}
		Ok(())
	}

	async fn write_accept(&self, accept: &Accept) -> Result<(), StorageError> {
		self.put(ACCEPTS, &accept.accept_id, accept).await?;
		self.put(ACCEPT_PAIRS, &pair_id(accept), &accept.accept_id)
			.await
	}

	async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.backend.get_bytes(&key(namespace, id)).await {
			Ok(bytes) => decode(&bytes).map(Some),
			Err(StorageError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn put<T: Serialize + ?Sized>(
		&self,
		namespace: &str,
		id: &str,
		value: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key(namespace, id), bytes).await
	}
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn pair_id(accept: &Accept) -> String {
	format!(
		"{}:{}",
		accept.task_id,
		accept.worker_address.to_ascii_lowercase()
	)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn conflict(task_id: &str, e: TransitionError) -> StorageError {
	StorageError::Conflict(format!("task {}: {}", task_id, e))
}

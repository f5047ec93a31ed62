//! Task lifecycle transitions.
//!
//! Every mutation of a stored task goes through [`transition`], whether it
//! originates from a signed HTTP submission or from a settlement contract
//! log. On-chain events only move a task forward: re-delivering the event
//! that produced the current state is a no-op, and an event that would move
//! the task backwards is reported as stale and ignored.

use crate::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// A trigger that may change a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
	/// A validated creation request for a task id.
	Submitted,
	/// A validated accept request from a worker.
	Accepted { worker: String },
	/// The settlement contract emitted `Created` for the task hash.
	OnchainCreated { tx_hash: String, at: DateTime<Utc> },
	/// The settlement contract emitted `WorkerSet` for the task hash.
	OnchainWorkerSet { worker: String, tx_hash: String },
	/// The settlement contract emitted `Released` for the task hash.
	OnchainReleased { tx_hash: String, at: DateTime<Utc> },
	/// The settlement contract emitted `Refunded` for the task hash.
	OnchainRefunded { tx_hash: String, at: DateTime<Utc> },
}

impl TaskEvent {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Submitted => "submitted",
			Self::Accepted { .. } => "accepted",
			Self::OnchainCreated { .. } => "onchain_created",
			Self::OnchainWorkerSet { .. } => "onchain_worker_set",
			Self::OnchainReleased { .. } => "onchain_released",
			Self::OnchainRefunded { .. } => "onchain_refunded",
		}
	}
}

impl fmt::Display for TaskEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Result of applying an event to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
	/// The task was modified and must be persisted.
	Applied,
	/// The event was already reflected in the task.
	Duplicate,
	/// The event would move the task backwards and was ignored.
	Stale,
}

/// Rejections raised by the HTTP-driven transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
	#[error("task already exists")]
	AlreadyExists,
	#[error("task is not open for acceptance (status: {0})")]
	NotAcceptable(TaskStatus),
}

/// Applies `event` to `task` in place.
///
/// `updated_at` is set to `now` only when the outcome is
/// [`TransitionOutcome::Applied`].
pub fn transition(
	task: &mut Task,
	event: &TaskEvent,
	now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
	use TaskStatus::*;

	let outcome = match event {
		TaskEvent::Submitted => return Err(TransitionError::AlreadyExists),
		TaskEvent::Accepted { worker } => {
			if task.status != Created {
				return Err(TransitionError::NotAcceptable(task.status));
			}
			task.status = Accepted;
			task.worker_address = Some(worker.clone());
			TransitionOutcome::Applied
		}
		TaskEvent::OnchainCreated { tx_hash, at } => {
			if task.onchain_created_at.is_some() {
				TransitionOutcome::Duplicate
			} else {
				task.onchain_created_at = Some(*at);
				// A later event may already have recorded its own transaction.
				if task.onchain_tx_hash.is_none() {
					task.onchain_tx_hash = Some(tx_hash.clone());
				}
				TransitionOutcome::Applied
			}
		}
		TaskEvent::OnchainWorkerSet { worker, tx_hash } => match task.status {
			Created | Accepted => {
				task.status = AcceptedOnchain;
				task.worker_address = Some(worker.clone());
				task.onchain_tx_hash = Some(tx_hash.clone());
				TransitionOutcome::Applied
			}
			AcceptedOnchain
				if task
					.worker_address
					.as_deref()
					.is_some_and(|current| current.eq_ignore_ascii_case(worker)) =>
			{
				TransitionOutcome::Duplicate
			}
			AcceptedOnchain => {
				task.worker_address = Some(worker.clone());
				task.onchain_tx_hash = Some(tx_hash.clone());
				TransitionOutcome::Applied
			}
			Released | Refunded | Cancelled => TransitionOutcome::Stale,
		},
		TaskEvent::OnchainReleased { tx_hash, at } => match task.status {
			Released => TransitionOutcome::Duplicate,
			Refunded | Cancelled => TransitionOutcome::Stale,
			Created | Accepted | AcceptedOnchain => {
				task.status = Released;
				task.released_at = Some(*at);
				task.onchain_tx_hash = Some(tx_hash.clone());
				TransitionOutcome::Applied
			}
		},
		TaskEvent::OnchainRefunded { tx_hash, at } => match task.status {
			Refunded => TransitionOutcome::Duplicate,
			Released | Cancelled => TransitionOutcome::Stale,
			Created | Accepted | AcceptedOnchain => {
				task.status = Refunded;
				task.refunded_at = Some(*at);
				task.onchain_tx_hash = Some(tx_hash.clone());
				TransitionOutcome::Applied
			}
		},
	};

	if outcome == TransitionOutcome::Applied {
		task.updated_at = now;
	}

	Ok(outcome)
}

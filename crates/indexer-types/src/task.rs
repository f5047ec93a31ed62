//! Task and accept records as persisted by the indexer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of a task in its lifecycle.
///
/// Tasks start as `Created`, move to `Accepted` when a worker claims them
/// over HTTP and to `AcceptedOnchain` once the settlement contract names a
/// worker. `Released` and `Refunded` are terminal and only reachable through
/// on-chain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Created,
	Accepted,
	AcceptedOnchain,
	Released,
	Refunded,
	Cancelled,
}

impl TaskStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::Accepted => "accepted",
			Self::AcceptedOnchain => "accepted_onchain",
			Self::Released => "released",
			Self::Refunded => "refunded",
			Self::Cancelled => "cancelled",
		}
	}

	/// Returns true once no further transition can move the task.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Released | Self::Refunded | Self::Cancelled)
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"created" => Ok(Self::Created),
			"accepted" => Ok(Self::Accepted),
			"accepted_onchain" => Ok(Self::AcceptedOnchain),
			"released" => Ok(Self::Released),
			"refunded" => Ok(Self::Refunded),
			"cancelled" => Ok(Self::Cancelled),
			other => Err(UnknownStatus(other.to_string())),
		}
	}
}

/// An employer-submitted unit of work.
///
/// Addresses, the task hash and the signature are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
	pub task_id: String,
	pub task_hash: String,
	pub chain_id: u64,
	pub escrow_address: String,
	pub employer_address: String,
	pub employer_signature: String,
	pub worker_address: Option<String>,
	/// Base-unit amount as a canonical decimal string.
	pub amount_wei: String,
	pub deadline_unix: u64,
	pub title: String,
	pub status: TaskStatus,
	pub indexer_fee_bps: u32,
	pub onchain_created_at: Option<DateTime<Utc>>,
	pub released_at: Option<DateTime<Utc>>,
	pub refunded_at: Option<DateTime<Utc>>,
	pub onchain_tx_hash: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A worker's claim on a task. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
	pub accept_id: String,
	pub task_id: String,
	pub worker_address: String,
	pub worker_signature: String,
	pub created_at: DateTime<Utc>,
}

/// Optional filters for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
	pub chain_id: Option<u64>,
	pub status: Option<TaskStatus>,
}

impl TaskFilter {
	pub fn matches(&self, task: &Task) -> bool {
		self.chain_id.map_or(true, |id| task.chain_id == id)
			&& self.status.map_or(true, |status| task.status == status)
	}
}

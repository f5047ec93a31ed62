use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::TaskStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexerEvent {
	Intake(IntakeEvent),
	Chain(ChainEvent),
	Audit(AuditEvent),
}

/// Signed submissions accepted over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntakeEvent {
	TaskSubmitted {
		task_id: String,
		chain_id: u64,
	},
	TaskAccepted {
		task_id: String,
		accept_id: String,
		worker_address: String,
	},
}

/// Confirmed settlement contract logs that changed a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainEvent {
	TransitionApplied {
		chain_id: u64,
		task_id: String,
		status: TaskStatus,
		tx_hash: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEvent {
	/// A `Created` log whose task hash has no off-chain registration.
	UnmatchedCreate {
		chain_id: u64,
		task_hash: String,
		tx_hash: String,
		block_number: Option<u64>,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<IndexerEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<IndexerEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: IndexerEvent,
	) -> Result<(), broadcast::error::SendError<IndexerEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

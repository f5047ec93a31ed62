//! Settlement contract events.

use crate::{ChainLog, DiscoveryError};
use alloy_primitives::{B256, U256};
use alloy_sol_types::{sol, SolEvent};

sol! {
	/// Escrow funded for a registered task.
	event Created(bytes32 indexed taskHash, address indexed employer, uint256 amount, uint64 deadline);

	event WorkerSet(bytes32 indexed taskHash, address indexed worker);

	event Released(bytes32 indexed taskHash);

	event Refunded(bytes32 indexed taskHash);
}

/// A decoded settlement event with hashes and addresses rendered as
/// lower-case `0x` hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
	Created {
		task_hash: String,
		employer: String,
		amount: U256,
		deadline: u64,
	},
	WorkerSet {
		task_hash: String,
		worker: String,
	},
	Released {
		task_hash: String,
	},
	Refunded {
		task_hash: String,
	},
}

impl SettlementEvent {
	/// Decodes `log` by its first topic. Logs from other events yield `None`.
	pub fn decode(log: &ChainLog) -> Result<Option<Self>, DiscoveryError> {
		let Some(topic0) = log.topic0() else {
			return Ok(None);
		};

		let event = if *topic0 == Created::SIGNATURE_HASH {
			let ev = decode_as::<Created>(log)?;
			Self::Created {
				task_hash: hash_hex(&ev.taskHash),
				employer: format!("0x{}", hex::encode(ev.employer)),
				amount: ev.amount,
				deadline: ev.deadline,
			}
		} else if *topic0 == WorkerSet::SIGNATURE_HASH {
			let ev = decode_as::<WorkerSet>(log)?;
			Self::WorkerSet {
				task_hash: hash_hex(&ev.taskHash),
				worker: format!("0x{}", hex::encode(ev.worker)),
			}
		} else if *topic0 == Released::SIGNATURE_HASH {
			Self::Released {
				task_hash: hash_hex(&decode_as::<Released>(log)?.taskHash),
			}
		} else if *topic0 == Refunded::SIGNATURE_HASH {
			Self::Refunded {
				task_hash: hash_hex(&decode_as::<Refunded>(log)?.taskHash),
			}
		} else {
			return Ok(None);
		};

		Ok(Some(event))
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::Created { .. } => "Created",
			Self::WorkerSet { .. } => "WorkerSet",
			Self::Released { .. } => "Released",
			Self::Refunded { .. } => "Refunded",
		}
	}

	pub fn task_hash(&self) -> &str {
		match self {
			Self::Created { task_hash, .. }
			| Self::WorkerSet { task_hash, .. }
			| Self::Released { task_hash }
			| Self::Refunded { task_hash } => task_hash,
		}
	}
}

fn decode_as<E: SolEvent>(log: &ChainLog) -> Result<E, DiscoveryError> {
	E::decode_raw_log(log.topics.iter().copied(), &log.data, true)
		.map_err(|e| DiscoveryError::Decode(format!("{}: {}", E::SIGNATURE, e)))
}

fn hash_hex(hash: &B256) -> String {
	format!("0x{}", hex::encode(hash))
}

#[cfg(test)]
pub(crate) mod test_logs {
	use super::*;
	use crate::ChainLog;
	use alloy_primitives::{Address, Bytes};

	pub fn chain_log<E: SolEvent>(event: &E, block_number: u64) -> ChainLog {
		let data = event.encode_log_data();
		ChainLog {
			address: Address::repeat_byte(0xaa),
			topics: data.topics().to_vec(),
			data: data.data.clone(),
			block_number: Some(block_number),
			tx_hash: Some(B256::repeat_byte(0x11)),
			removed: false,
		}
	}

	pub fn task_hash_of(task_id: &str) -> B256 {
		alloy_primitives::keccak256(task_id.as_bytes())
	}

	pub fn created(task_id: &str, block: u64) -> ChainLog {
		chain_log(
			&Created {
				taskHash: task_hash_of(task_id),
				employer: Address::repeat_byte(0x01),
				amount: U256::from(1_000u64),
				deadline: 4_102_444_800,
			},
			block,
		)
	}

	pub fn worker_set(task_id: &str, worker: Address, block: u64) -> ChainLog {
		chain_log(
			&WorkerSet {
				taskHash: task_hash_of(task_id),
				worker,
			},
			block,
		)
	}

	pub fn released(task_id: &str, block: u64) -> ChainLog {
		chain_log(
			&Released {
				taskHash: task_hash_of(task_id),
			},
			block,
		)
	}

	pub fn refunded(task_id: &str, block: u64) -> ChainLog {
		chain_log(
			&Refunded {
				taskHash: task_hash_of(task_id),
			},
			block,
		)
	}

	pub fn unknown(block: u64) -> ChainLog {
		ChainLog {
			address: Address::repeat_byte(0xaa),
			topics: vec![B256::repeat_byte(0x42)],
			data: Bytes::new(),
			block_number: Some(block),
			tx_hash: None,
			removed: false,
		}
	}
}

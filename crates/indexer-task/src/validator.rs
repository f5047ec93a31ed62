//! Request checks for task creation and acceptance.
//!
//! Checks run in a fixed order and stop at the first failure. Shape and
//! cross-field problems are `InvalidRequest`; anything wrong with the
//! signature is `Unauthorized`.

use crate::TaskError;
use alloy_primitives::U256;
use indexer_account::{content_hash, verify_personal_sign};
use indexer_types::{
	is_hex_address, is_prefixed_hex, AcceptTaskRequest, CreateTaskRequest, SupportedChain,
};
use std::collections::BTreeMap;

/// Upper bound accepted for `deadline_unix`.
pub const MAX_DEADLINE_UNIX: i64 = 1 << 62;

const HASH_HEX_DIGITS: usize = 64;
const SIGNATURE_HEX_DIGITS: usize = 130;

/// A creation request that passed every check, normalized for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTask {
	pub task_id: String,
	pub task_hash: String,
	pub chain_id: u64,
	pub escrow_address: String,
	pub employer_address: String,
	pub employer_signature: String,
	pub amount_wei: String,
	pub deadline_unix: u64,
	pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAccept {
	pub task_id: String,
	pub accept_id: String,
	pub worker_address: String,
	pub worker_signature: String,
}

pub struct TaskValidator {
	chains: BTreeMap<u64, SupportedChain>,
}

impl TaskValidator {
	pub fn new(chains: impl IntoIterator<Item = SupportedChain>) -> Self {
		Self {
			chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
		}
	}

	pub fn chains(&self) -> impl Iterator<Item = &SupportedChain> {
		self.chains.values()
	}

	pub fn validate_create(&self, req: &CreateTaskRequest) -> Result<ValidatedTask, TaskError> {
		if req.task_id.is_empty() {
			return Err(invalid("task_id is required"));
		}

		let chain = self.resolve_chain(req.chain_id)?;

		if !is_hex_address(&req.employer_address) {
			return Err(invalid("employer_address must be 0x + 40 hex chars"));
		}

		if !is_prefixed_hex(&req.task_hash, HASH_HEX_DIGITS) {
			return Err(invalid("task_hash must be 0x + 64 hex chars"));
		}
		let expected = content_hash(&req.task_id);
		if !req.task_hash.eq_ignore_ascii_case(&expected) {
			return Err(invalid(format!(
				"task_hash mismatch: expected {}, got {}",
				expected, req.task_hash
			)));
		}

		let amount_wei = parse_amount(&req.amount_wei)?;

		if req.deadline_unix <= 0 || req.deadline_unix > MAX_DEADLINE_UNIX {
			return Err(invalid("deadline_unix out of valid range"));
		}

		let escrow_address = match req.escrow_address.as_deref().map(str::trim) {
			None | Some("") => chain.settlement_contract.clone(),
			Some(escrow) if is_hex_address(escrow) => escrow.to_ascii_lowercase(),
			Some(_) => return Err(invalid("escrow_address must be 0x + 40 hex chars")),
		};

		check_signature(
			req.task_id.as_bytes(),
			&req.signature,
			&req.employer_address,
			"employer_address",
		)?;

		Ok(ValidatedTask {
			task_id: req.task_id.clone(),
			task_hash: req.task_hash.to_ascii_lowercase(),
			chain_id: chain.chain_id,
			escrow_address,
			employer_address: req.employer_address.to_ascii_lowercase(),
			employer_signature: req.signature.to_ascii_lowercase(),
			amount_wei,
			deadline_unix: req.deadline_unix as u64,
			title: req.title.clone(),
		})
	}

	/// Checks an accept for `task_id`. The signed message is `task_id`
	/// immediately followed by `accept_id`.
	pub fn validate_accept(
		&self,
		task_id: &str,
		req: &AcceptTaskRequest,
	) -> Result<ValidatedAccept, TaskError> {
		if task_id.is_empty() {
			return Err(invalid("task_id is required"));
		}
		if req.accept_id.is_empty() {
			return Err(invalid("accept_id is required"));
		}
		if !is_hex_address(&req.worker_address) {
			return Err(invalid("worker_address must be 0x + 40 hex chars"));
		}

		let message = format!("{}{}", task_id, req.accept_id);
		check_signature(
			message.as_bytes(),
			&req.signature,
			&req.worker_address,
			"worker_address",
		)?;

		Ok(ValidatedAccept {
			task_id: task_id.to_string(),
			accept_id: req.accept_id.clone(),
			worker_address: req.worker_address.to_ascii_lowercase(),
			worker_signature: req.signature.to_ascii_lowercase(),
		})
	}

	fn resolve_chain(&self, chain_id: u64) -> Result<&SupportedChain, TaskError> {
		if chain_id == 0 {
			return Err(invalid("chain_id is required"));
		}
		self.chains.get(&chain_id).ok_or_else(|| {
			let supported: Vec<String> = self.chains.keys().map(|id| id.to_string()).collect();
			invalid(format!(
				"chain_id {} not supported (supported: {})",
				chain_id,
				supported.join(",")
			))
		})
	}
}

fn invalid(message: impl Into<String>) -> TaskError {
	TaskError::InvalidRequest(message.into())
}

/// Parses a positive base-10 integer that fits the contract's uint256 and
/// returns its canonical form.
fn parse_amount(raw: &str) -> Result<String, TaskError> {
	let trimmed = raw.trim();
	let rejected = || invalid("amount_wei must be a positive integer string");

	if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
		return Err(rejected());
	}
	let amount = U256::from_str_radix(trimmed, 10).map_err(|_| rejected())?;
	if amount.is_zero() {
		return Err(rejected());
	}
	Ok(amount.to_string())
}

fn check_signature(
	message: &[u8],
	signature: &str,
	signer: &str,
	signer_field: &str,
) -> Result<(), TaskError> {
	if signature.is_empty() {
		return Err(TaskError::Unauthorized("signature is required".to_string()));
	}
	if !is_prefixed_hex(signature, SIGNATURE_HEX_DIGITS) {
		return Err(TaskError::Unauthorized(
			"signature must be 0x + 130 hex chars".to_string(),
		));
	}
	verify_personal_sign(message, signature, signer).map_err(|e| {
		TaskError::Unauthorized(format!(
			"signature verification failed for {}: {}",
			signer_field, e
		))
	})?;
	Ok(())
}

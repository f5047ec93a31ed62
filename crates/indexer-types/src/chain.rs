use serde::{Deserialize, Serialize};

/// A chain the indexer accepts tasks for, with its settlement contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedChain {
	pub chain_id: u64,
	/// Lower-case `0x` address of the settlement contract.
	pub settlement_contract: String,
	#[serde(default, skip_serializing_if = "is_zero")]
	pub min_confirmations: u64,
}

fn is_zero(n: &u64) -> bool {
	*n == 0
}

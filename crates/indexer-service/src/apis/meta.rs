//! Liveness and operator metadata.
//!
//! When `indexer.signing_key` is configured, `/v1/meta` carries an ed25519
//! signature over the canonical JSON of `{chains, fee_bps, name, url}`
//! (sorted keys, no whitespace) together with the matching public key.
//! Both fields are empty strings for an unsigned indexer.

use crate::server::AppState;
use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use indexer_account::IndexerIdentity;
use indexer_config::Config;
use indexer_types::SupportedChain;
use serde::Serialize;
use tracing::warn;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build commit, taken from `INDEXER_GIT_COMMIT` at compile time.
pub const COMMIT: &str = match option_env!("INDEXER_GIT_COMMIT") {
	Some(commit) => commit,
	None => "unknown",
};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub time: String,
	pub version: &'static str,
	pub commit: &'static str,
}

/// Operator identity and the chains this indexer accepts.
#[derive(Debug, Clone, Serialize)]
pub struct MetaResponse {
	pub name: String,
	pub url: String,
	pub owner: String,
	pub contact: String,
	pub fee_bps: u32,
	pub chains: Vec<SupportedChain>,
	pub public_key: String,
	pub signature: String,
	pub version: &'static str,
}

// Fields are declared in key order so the compact serialization is canonical.
#[derive(Serialize)]
struct SignedMeta<'a> {
	chains: Vec<SignedChain<'a>>,
	fee_bps: u32,
	name: &'a str,
	url: &'a str,
}

#[derive(Serialize)]
struct SignedChain<'a> {
	chain_id: u64,
	#[serde(skip_serializing_if = "is_zero")]
	min_confirmations: u64,
	settlement_contract: &'a str,
}

fn is_zero(n: &u64) -> bool {
	*n == 0
}

impl MetaResponse {
	pub fn from_config(config: &Config) -> Self {
		let mut meta = Self {
			name: config.indexer.name.clone(),
			url: config.indexer.base_url.clone(),
			owner: config.indexer.owner.clone(),
			contact: config.indexer.contact.clone(),
			fee_bps: config.indexer.fee_bps,
			chains: config.supported_chains(),
			public_key: String::new(),
			signature: String::new(),
			version: VERSION,
		};

		if let Some(seed) = &config.indexer.signing_key {
			match IndexerIdentity::from_hex_seed(seed) {
				Ok(identity) => meta.sign(&identity),
				Err(e) => warn!(error = %e, "Serving unsigned metadata"),
			}
		}

		meta
	}

	/// Canonical bytes covered by the signature.
	pub fn signing_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
		serde_json::to_vec(&SignedMeta {
			chains: self
				.chains
				.iter()
				.map(|chain| SignedChain {
					chain_id: chain.chain_id,
					min_confirmations: chain.min_confirmations,
					settlement_contract: &chain.settlement_contract,
				})
				.collect(),
			fee_bps: self.fee_bps,
			name: &self.name,
			url: &self.url,
		})
	}

	fn sign(&mut self, identity: &IndexerIdentity) {
		match self.signing_payload() {
			Ok(payload) => {
				self.public_key = identity.public_key_hex();
				self.signature = identity.sign_hex(&payload);
			}
			Err(e) => warn!(error = %e, "Failed to encode metadata for signing"),
		}
	}
}

/// GET /v1/health
pub async fn health() -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok",
		time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
		version: VERSION,
		commit: COMMIT,
	})
}

/// GET /v1/meta
pub async fn meta(State(state): State<AppState>) -> Json<MetaResponse> {
	Json(state.meta.as_ref().clone())
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Signature, Verifier, VerifyingKey};
	use indexer_config::ConfigLoader;

	const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
	const PUBLIC_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

	fn config(signing_key: Option<&str>) -> Config {
		let key_line = signing_key
			.map(|key| format!("signing_key = \"{}\"", key))
			.unwrap_or_default();
		ConfigLoader::new()
			.with_env_prefix("INDEXER_META_TEST_")
			.parse(&format!(
				r#"
				[indexer]
				name = "mesh-test"
				base_url = "https://indexer.example"
				owner = "ops"
				fee_bps = 30
				{}

				[[chains]]
				chain_id = 8453
				settlement_contract = "0x00000000000000000000000000000000000000AA"
				min_confirmations = 2

				[[chains]]
				chain_id = 84532
				settlement_contract = "0x00000000000000000000000000000000000000bb"
				"#,
				key_line
			))
			.unwrap()
	}

	#[test]
	fn test_payload_is_canonical() {
		let meta = MetaResponse::from_config(&config(None));
		let payload = String::from_utf8(meta.signing_payload().unwrap()).unwrap();
		assert_eq!(
			payload,
			concat!(
				r#"{"chains":[{"chain_id":8453,"min_confirmations":2,"#,
				r#""settlement_contract":"0x00000000000000000000000000000000000000aa"},"#,
				r#"{"chain_id":84532,"settlement_contract":"0x00000000000000000000000000000000000000bb"}],"#,
				r#""fee_bps":30,"name":"mesh-test","url":"https://indexer.example"}"#
			)
		);
	}

	#[test]
	fn test_signed_meta_verifies() {
		let meta = MetaResponse::from_config(&config(Some(SEED)));
		assert_eq!(meta.public_key, PUBLIC_KEY);

		let public_key: [u8; 32] = hex::decode(&meta.public_key).unwrap().try_into().unwrap();
		let signature: [u8; 64] = hex::decode(&meta.signature).unwrap().try_into().unwrap();
		let key = VerifyingKey::from_bytes(&public_key).unwrap();
		let signature = Signature::from_bytes(&signature);

		let payload = meta.signing_payload().unwrap();
		assert!(key.verify(&payload, &signature).is_ok());

		let mut altered = meta.clone();
		altered.fee_bps = 0;
		assert!(key
			.verify(&altered.signing_payload().unwrap(), &signature)
			.is_err());
	}

	#[test]
	fn test_unsigned_meta_has_empty_signature() {
		let meta = MetaResponse::from_config(&config(None));
		assert!(meta.public_key.is_empty());
		assert!(meta.signature.is_empty());
		assert_eq!(meta.owner, "ops");
	}
}

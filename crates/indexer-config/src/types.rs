//! Configuration file layout.

use indexer_types::SupportedChain;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub indexer: IndexerSettings,
	#[serde(default)]
	pub api: ApiConfig,
	#[serde(default)]
	pub storage: StorageConfig,
	#[serde(default)]
	pub chains: Vec<ChainConfig>,
}

impl Config {
	/// Chains accepted for task submission.
	pub fn supported_chains(&self) -> Vec<SupportedChain> {
		self.chains
			.iter()
			.filter(|c| c.enabled)
			.map(ChainConfig::supported_chain)
			.collect()
	}

	/// Chains that get a watcher: enabled and with an RPC endpoint.
	pub fn watched_chains(&self) -> impl Iterator<Item = &ChainConfig> {
		self.chains
			.iter()
			.filter(|c| c.enabled && c.rpc_url.is_some())
	}
}

/// Operator identity published on `/v1/meta`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerSettings {
	pub name: String,
	#[serde(default)]
	pub base_url: String,
	#[serde(default)]
	pub owner: String,
	#[serde(default)]
	pub contact: String,
	/// Fee charged by this indexer, in basis points.
	#[serde(default)]
	pub fee_bps: u32,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Hex-encoded ed25519 seed used to sign `/v1/meta`. Unsigned when absent.
	#[serde(default)]
	pub signing_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: default_host(),
			port: default_port(),
			max_request_size: default_max_request_size(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	/// Backend-specific settings, validated by the backend's schema.
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			config: empty_table(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	pub chain_id: u64,
	pub settlement_contract: String,
	#[serde(default)]
	pub min_confirmations: u64,
	/// HTTP(S) or WS(S) endpoint. Without one the chain runs no watcher.
	#[serde(default)]
	pub rpc_url: Option<String>,
	#[serde(default = "default_poll_interval_secs")]
	pub poll_interval_secs: u64,
	#[serde(default = "default_reconnect_backoff_secs")]
	pub reconnect_backoff_secs: u64,
	#[serde(default = "default_rpc_timeout_secs")]
	pub rpc_timeout_secs: u64,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}

impl ChainConfig {
	pub fn supported_chain(&self) -> SupportedChain {
		SupportedChain {
			chain_id: self.chain_id,
			settlement_contract: self.settlement_contract.to_ascii_lowercase(),
			min_confirmations: self.min_confirmations,
		}
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs)
	}

	pub fn reconnect_backoff(&self) -> Duration {
		Duration::from_secs(self.reconnect_backoff_secs)
	}

	pub fn rpc_timeout(&self) -> Duration {
		Duration::from_secs(self.rpc_timeout_secs)
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_host() -> String {
	"0.0.0.0".to_string()
}

fn default_port() -> u16 {
	8080
}

fn default_max_request_size() -> usize {
	2 * 1024 * 1024
}

fn default_storage_backend() -> String {
	"memory".to_string()
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

fn default_poll_interval_secs() -> u64 {
	12
}

fn default_reconnect_backoff_secs() -> u64 {
	10
}

fn default_rpc_timeout_secs() -> u64 {
	15
}

fn default_enabled() -> bool {
	true
}

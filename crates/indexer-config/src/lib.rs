//! Configuration loading for the indexer.
//!
//! The TOML file may reference environment variables as `${VAR}`. The
//! substituted document is checked field by field against a schema, then a
//! small set of `INDEXER_`-prefixed variables override file values and the
//! result is validated as a whole.

use regex::Regex;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

mod schema;
mod types;

pub use types::{ApiConfig, ChainConfig, Config, IndexerSettings, StorageConfig};

/// Largest fee expressible in basis points.
pub const MAX_FEE_BPS: u32 = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "INDEXER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		if !tokio::fs::try_exists(file_path).await? {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}
		let content = tokio::fs::read_to_string(file_path).await?;
		debug!(path = %file_path, "Loaded configuration file");

		self.parse(&content)
	}

	/// Substitutes, parses, applies overrides and validates `content`.
	pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = substitute_env_vars(content)?;
		let raw: toml::Value =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;
		schema::validate_raw(&raw).map_err(ConfigError::ValidationError)?;

		let mut config: Config = raw
			.try_into()
			.map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.indexer.log_level = log_level;
		}

		if let Ok(host) = env::var(format!("{}HTTP_HOST", self.env_prefix)) {
			config.api.host = host;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.api.port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		Ok(())
	}
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;

	if let Some(missing) = re
		.captures_iter(content)
		.map(|cap| cap[1].to_string())
		.find(|name| env::var(name).is_err())
	{
		return Err(ConfigError::EnvVarNotFound(missing));
	}

	Ok(re
		.replace_all(content, |cap: &regex::Captures| {
			env::var(&cap[1]).unwrap_or_default()
		})
		.into_owned())
}

/// Checks that span more than one field.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if !config.chains.iter().any(|c| c.enabled) {
		return Err(ConfigError::ValidationError(
			"At least one enabled chain must be configured".to_string(),
		));
	}

	let mut seen = HashSet::new();
	for chain in &config.chains {
		if !seen.insert(chain.chain_id) {
			return Err(ConfigError::ValidationError(format!(
				"chain_id {} is configured more than once",
				chain.chain_id
			)));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONTRACT: &str = "0x00000000000000000000000000000000000000Aa";

	fn minimal(chains: &str) -> String {
		format!(
			r#"
			[indexer]
			name = "mesh-indexer"
			fee_bps = 30

			{}
			"#,
			chains
		)
	}

	fn loader(prefix: &str) -> ConfigLoader {
		ConfigLoader::new().with_env_prefix(prefix)
	}

	#[test]
	fn test_defaults_applied() {
		let config = loader("INDEXER_TEST_DEFAULTS_")
			.parse(&minimal(&format!(
				r#"
				[[chains]]
				chain_id = 8453
				settlement_contract = "{}"
				"#,
				CONTRACT
			)))
			.unwrap();

		assert_eq!(config.api.port, 8080);
		assert_eq!(config.api.max_request_size, 2 * 1024 * 1024);
		assert_eq!(config.storage.backend, "memory");
		assert_eq!(config.indexer.log_level, "info");

		let chain = &config.chains[0];
		assert_eq!(chain.poll_interval_secs, 12);
		assert_eq!(chain.reconnect_backoff_secs, 10);
		assert_eq!(chain.rpc_timeout_secs, 15);
		assert!(chain.enabled);

		let supported = config.supported_chains();
		assert_eq!(supported[0].settlement_contract, CONTRACT.to_ascii_lowercase());
		assert_eq!(config.watched_chains().count(), 0);
	}

	#[test]
	fn test_env_substitution_and_overrides() {
		env::set_var("INDEXER_TEST_SUBST_RPC", "wss://base.example/ws");
		env::set_var("INDEXER_TEST_OVR_HTTP_PORT", "9090");
		env::set_var("INDEXER_TEST_OVR_LOG_LEVEL", "debug");

		let config = loader("INDEXER_TEST_OVR_")
			.parse(&minimal(&format!(
				r#"
				[[chains]]
				chain_id = 8453
				settlement_contract = "{}"
				rpc_url = "${{INDEXER_TEST_SUBST_RPC}}"
				"#,
				CONTRACT
			)))
			.unwrap();

		assert_eq!(
			config.chains[0].rpc_url.as_deref(),
			Some("wss://base.example/ws")
		);
		assert_eq!(config.api.port, 9090);
		assert_eq!(config.indexer.log_level, "debug");
		assert_eq!(config.watched_chains().count(), 1);
	}

	#[test]
	fn test_missing_env_var() {
		let result = loader("INDEXER_TEST_MISSING_").parse(&minimal(
			r#"
			[[chains]]
			chain_id = 1
			settlement_contract = "${INDEXER_TEST_DEFINITELY_UNSET}"
			"#,
		));
		assert!(matches!(
			result,
			Err(ConfigError::EnvVarNotFound(name)) if name == "INDEXER_TEST_DEFINITELY_UNSET"
		));
	}

	#[test]
	fn test_validation_failures() {
		let cases = [
			String::new(),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\n[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"",
				CONTRACT, CONTRACT
			),
			"[[chains]]\nchain_id = 1\nsettlement_contract = \"0x1234\"".to_string(),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\nrpc_url = \"ftp://node\"",
				CONTRACT
			),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\npoll_interval_secs = 0",
				CONTRACT
			),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\nenabled = false",
				CONTRACT
			),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\nreconnect_backoff_secs = 0",
				CONTRACT
			),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\nrpc_timeout_secs = 0",
				CONTRACT
			),
			format!(
				"[[chains]]\nchain_id = 0\nsettlement_contract = \"{}\"",
				CONTRACT
			),
			format!(
				"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"\nenabled = \"yes\"",
				CONTRACT
			),
			format!(
				"[api]\nport = 0\n[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"",
				CONTRACT
			),
		];

		for case in cases {
			let result = loader("INDEXER_TEST_VALIDATION_").parse(&minimal(&case));
			assert!(
				matches!(result, Err(ConfigError::ValidationError(_))),
				"expected validation error for:\n{}",
				case
			);
		}

		let high_fee = format!(
			"[indexer]\nname = \"x\"\nfee_bps = 10001\n[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"",
			CONTRACT
		);
		assert!(matches!(
			loader("INDEXER_TEST_VALIDATION_").parse(&high_fee),
			Err(ConfigError::ValidationError(_))
		));
	}

	#[test]
	fn test_zero_reconnect_backoff_rejected() {
		let result = loader("INDEXER_TEST_BACKOFF_").parse(&minimal(&format!(
			"[[chains]]\nchain_id = 8453\nsettlement_contract = \"{}\"\nreconnect_backoff_secs = 0",
			CONTRACT
		)));
		assert!(matches!(
			result,
			Err(ConfigError::ValidationError(message))
				if message.contains("chains[0]") && message.contains("reconnect_backoff_secs")
		));
	}

	#[test]
	fn test_indexer_section_checks() {
		let chain = format!(
			"[[chains]]\nchain_id = 1\nsettlement_contract = \"{}\"",
			CONTRACT
		);

		let blank_name = format!("[indexer]\nname = \" \"\n{}", chain);
		assert!(matches!(
			loader("INDEXER_TEST_SECTION_").parse(&blank_name),
			Err(ConfigError::ValidationError(message)) if message.contains("indexer.name")
		));

		let missing_indexer = chain.clone();
		assert!(matches!(
			loader("INDEXER_TEST_SECTION_").parse(&missing_indexer),
			Err(ConfigError::ValidationError(message)) if message.contains("indexer")
		));

		let bad_key = format!("[indexer]\nname = \"x\"\nsigning_key = \"abcd\"\n{}", chain);
		assert!(matches!(
			loader("INDEXER_TEST_SECTION_").parse(&bad_key),
			Err(ConfigError::ValidationError(message)) if message.contains("indexer.signing_key")
		));

		let good_key = format!(
			"[indexer]\nname = \"x\"\nsigning_key = \"0x{}\"\n{}",
			"01".repeat(32),
			chain
		);
		let config = loader("INDEXER_TEST_SECTION_").parse(&good_key).unwrap();
		assert_eq!(
			config.indexer.signing_key,
			Some(format!("0x{}", "01".repeat(32)))
		);
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("indexer.toml");
		tokio::fs::write(
			&path,
			minimal(&format!(
				"[storage]\nbackend = \"file\"\n[storage.config]\nstorage_path = \"./data\"\n\n[[chains]]\nchain_id = 8453\nsettlement_contract = \"{}\"\nrpc_url = \"http://localhost:8545\"",
				CONTRACT
			)),
		)
		.await
		.unwrap();

		let config = loader("INDEXER_TEST_FILE_")
			.with_file(&path)
			.load()
			.await
			.unwrap();
		assert_eq!(config.storage.backend, "file");
		assert_eq!(
			config.storage.config.get("storage_path").and_then(|v| v.as_str()),
			Some("./data")
		);

		let missing = loader("INDEXER_TEST_FILE_")
			.with_file(dir.path().join("absent.toml"))
			.load()
			.await;
		assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
	}
}

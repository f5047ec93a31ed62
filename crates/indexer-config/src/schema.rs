//! Field-level checks applied to the raw TOML before deserialization.

use indexer_types::{Field, FieldType, Schema, ValidationError};

use crate::MAX_FEE_BPS;

/// Length in hex digits of an ed25519 seed.
const SIGNING_KEY_HEX_DIGITS: usize = 64;

fn non_empty(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(s) if !s.trim().is_empty() => Ok(()),
		_ => Err("must not be empty".to_string()),
	}
}

fn at_least(min: i64) -> FieldType {
	FieldType::Integer {
		min: Some(min),
		max: None,
	}
}

pub(crate) fn config_schema() -> Schema {
	let indexer = Schema::new(
		vec![Field::new("name", FieldType::String).with_validator(non_empty)],
		vec![
			Field::new("base_url", FieldType::String),
			Field::new("owner", FieldType::String),
			Field::new("contact", FieldType::String),
			Field::new(
				"fee_bps",
				FieldType::Integer {
					min: Some(0),
					max: Some(MAX_FEE_BPS as i64),
				},
			),
			Field::new("log_level", FieldType::String),
			Field::new("signing_key", FieldType::String).with_validator(|value| {
				let key = value.as_str().unwrap_or_default();
				let seed = key.strip_prefix("0x").unwrap_or(key);
				if seed.len() == SIGNING_KEY_HEX_DIGITS && seed.bytes().all(|b| b.is_ascii_hexdigit()) {
					Ok(())
				} else {
					Err("must be a hex-encoded 32-byte ed25519 seed".to_string())
				}
			}),
		],
	);

	let api = Schema::new(
		vec![],
		vec![
			Field::new("host", FieldType::String).with_validator(non_empty),
			Field::new(
				"port",
				FieldType::Integer {
					min: Some(1),
					max: Some(u16::MAX as i64),
				},
			),
			Field::new("max_request_size", at_least(1)),
		],
	);

	let storage = Schema::new(
		vec![],
		vec![Field::new("backend", FieldType::String).with_validator(non_empty)],
	);

	Schema::new(
		vec![Field::new("indexer", FieldType::Table(indexer))],
		vec![
			Field::new("api", FieldType::Table(api)),
			Field::new("storage", FieldType::Table(storage)),
		],
	)
}

pub(crate) fn chain_schema() -> Schema {
	Schema::new(
		vec![
			Field::new("chain_id", at_least(1)),
			Field::new("settlement_contract", FieldType::Address),
		],
		vec![
			Field::new("min_confirmations", at_least(0)),
			Field::new("rpc_url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if has_rpc_scheme(url) => Ok(()),
					_ => Err("must start with http://, https://, ws:// or wss://".to_string()),
				}
			}),
			Field::new("poll_interval_secs", at_least(1)),
			Field::new("reconnect_backoff_secs", at_least(1)),
			Field::new("rpc_timeout_secs", at_least(1)),
			Field::new("enabled", FieldType::Boolean),
		],
	)
}

/// Checks the top-level tables and every `[[chains]]` entry.
pub(crate) fn validate_raw(raw: &toml::Value) -> Result<(), String> {
	config_schema().validate(raw).map_err(|e| e.to_string())?;

	if let Some(chains) = raw.get("chains").and_then(toml::Value::as_array) {
		let schema = chain_schema();
		for (index, chain) in chains.iter().enumerate() {
			schema
				.validate(chain)
				.map_err(|e: ValidationError| format!("chains[{}]: {}", index, e))?;
		}
	}

	Ok(())
}

fn has_rpc_scheme(url: &str) -> bool {
	["http://", "https://", "ws://", "wss://"]
		.iter()
		.any(|scheme| url.starts_with(scheme))
}

//! Schema checks for backend configuration tables.
//!
//! The config loader checks the raw configuration document against a
//! [`Schema`], and storage backends publish one for their free-form TOML
//! table through [`ConfigSchema`], so that a bad table is rejected before
//! anything is constructed from it.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// A `0x`-prefixed 20-byte hex account address.
	Address,
	Table(Schema),
}

/// Type alias for field validator functions.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator that runs after the type check.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Schema definition with required and optional fields.
#[derive(Debug, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

/// Returns true when `value` is `0x` (or `0X`) followed by exactly `digits`
/// hex digits.
pub fn is_prefixed_hex(value: &str, digits: usize) -> bool {
	value
		.strip_prefix("0x")
		.or_else(|| value.strip_prefix("0X"))
		.is_some_and(|hex| hex.len() == digits && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Returns true when `value` is a hex-encoded 20-byte account address.
pub fn is_hex_address(value: &str) -> bool {
	is_prefixed_hex(value, 40)
}

fn mismatch(field: &str, expected: &'static str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected,
		actual: value.type_str().to_string(),
	}
}

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
		}
		FieldType::Boolean => {
			value.as_bool().ok_or_else(|| mismatch(name, "boolean", value))?;
		}
		FieldType::Address => {
			let s = value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
			if !is_hex_address(s) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("'{}' is not a 0x-prefixed 20-byte address", s),
				});
			}
		}
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| mismatch(name, "integer", value))?;
			if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("{} is outside {:?}..={:?}", n, min, max),
				});
			}
		}
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| match e {
				ValidationError::MissingField(f) => {
					ValidationError::MissingField(format!("{}.{}", name, f))
				}
				ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
					field: format!("{}.{}", name, field),
					message,
				},
				ValidationError::TypeMismatch {
					field,
					expected,
					actual,
				} => ValidationError::TypeMismatch {
					field: format!("{}.{}", name, field),
					expected,
					actual,
				},
			})?;
		}
	}

	Ok(())
}

/// Implemented by components that validate their own TOML table.
#[async_trait]
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![Field::new("settlement_contract", FieldType::Address)],
			vec![
				Field::new(
					"min_confirmations",
					FieldType::Integer {
						min: Some(0),
						max: Some(64),
					},
				),
				Field::new("rpc_url", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(url) if url.starts_with("http") => Ok(()),
						_ => Err("must be an http url".to_string()),
					}
				}),
			],
		)
	}

	#[test]
	fn test_accepts_valid_table() {
		let config: toml::Value = toml::from_str(
			r#"
			settlement_contract = "0x00000000000000000000000000000000000000aa"
			min_confirmations = 2
			rpc_url = "http://localhost:8545"
			"#,
		)
		.unwrap();
		assert!(schema().validate(&config).is_ok());
	}

	#[test]
	fn test_reports_missing_and_invalid_fields() {
		let missing: toml::Value = toml::from_str("min_confirmations = 2").unwrap();
		assert!(matches!(
			schema().validate(&missing),
			Err(ValidationError::MissingField(f)) if f == "settlement_contract"
		));

		let bad_address: toml::Value =
			toml::from_str(r#"settlement_contract = "0x1234""#).unwrap();
		assert!(matches!(
			schema().validate(&bad_address),
			Err(ValidationError::InvalidValue { .. })
		));

		let out_of_range: toml::Value = toml::from_str(
			r#"
			settlement_contract = "0x00000000000000000000000000000000000000aa"
			min_confirmations = 100
			"#,
		)
		.unwrap();
		assert!(schema().validate(&out_of_range).is_err());

		let bad_url: toml::Value = toml::from_str(
			r#"
			settlement_contract = "0x00000000000000000000000000000000000000aa"
			rpc_url = "ftp://example"
			"#,
		)
		.unwrap();
		assert!(schema().validate(&bad_url).is_err());
	}

	#[test]
	fn test_is_hex_address() {
		assert!(is_hex_address("0x00000000000000000000000000000000000000aA"));
		assert!(!is_hex_address("00000000000000000000000000000000000000aa"));
		assert!(!is_hex_address("0x0000000000000000000000000000000000000zaa"));
		assert!(is_prefixed_hex(&format!("0X{}", "ab".repeat(65)), 130));
		assert!(!is_prefixed_hex(&format!("0x{}", "ab".repeat(64)), 130));
	}
}

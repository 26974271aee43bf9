//! Schema checks for the TOML table of a pluggable implementation.
//!
//! Factories run [`ConfigSchema::validate`] on their table before reading
//! anything out of it, so a bad key or a short hex string is reported with
//! the dotted path of the offending entry.

use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	fn invalid(field: &str, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			field: field.to_string(),
			message: message.into(),
		}
	}

	fn mismatch(field: &str, expected: &str, value: &toml::Value) -> Self {
		Self::TypeMismatch {
			field: field.to_string(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		}
	}
}

/// Shape a configuration value must have.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer within optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// `0x`-prefixed 20-byte address.
	Address,
	/// Hex string decoding to exactly this many bytes.
	HexBytes(usize),
	Array(Box<FieldType>),
	Table(Schema),
}

impl FieldType {
	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		match self {
			FieldType::String => value
				.as_str()
				.map(|_| ())
				.ok_or_else(|| ValidationError::mismatch(path, "string", value)),
			FieldType::Boolean => value
				.as_bool()
				.map(|_| ())
				.ok_or_else(|| ValidationError::mismatch(path, "boolean", value)),
			FieldType::Integer { min, max } => {
				let n = value
					.as_integer()
					.ok_or_else(|| ValidationError::mismatch(path, "integer", value))?;
				match (min, max) {
					(Some(lo), _) if n < *lo => {
						Err(ValidationError::invalid(path, format!("{} is below {}", n, lo)))
					},
					(_, Some(hi)) if n > *hi => {
						Err(ValidationError::invalid(path, format!("{} is above {}", n, hi)))
					},
					_ => Ok(()),
				}
			},
			FieldType::Address => {
				let text = value
					.as_str()
					.ok_or_else(|| ValidationError::mismatch(path, "address string", value))?;
				text.parse::<Address>()
					.map(|_| ())
					.map_err(|e| ValidationError::invalid(path, format!("'{}': {}", text, e)))
			},
			FieldType::HexBytes(expected) => {
				let text = value
					.as_str()
					.ok_or_else(|| ValidationError::mismatch(path, "hex string", value))?;
				let decoded = hex::decode(crate::utils::without_0x_prefix(text))
					.map_err(|e| ValidationError::invalid(path, format!("not hex: {}", e)))?;
				if decoded.len() == *expected {
					Ok(())
				} else {
					Err(ValidationError::invalid(
						path,
						format!("{} bytes, want {}", decoded.len(), expected),
					))
				}
			},
			FieldType::Array(item) => {
				let items = value
					.as_array()
					.ok_or_else(|| ValidationError::mismatch(path, "array", value))?;
				items
					.iter()
					.enumerate()
					.try_for_each(|(i, v)| item.check(&format!("{}[{}]", path, i), v))
			},
			FieldType::Table(schema) => schema.check_at(Some(path), value),
		}
	}
}

/// Extra predicate applied once the value has the right shape.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Field({}: {:?}", self.name, self.field_type)?;
		if self.validator.is_some() {
			write!(f, ", custom")?;
		}
		write!(f, ")")
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

	pub fn with_validator(
		self,
		validator: impl Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	) -> Self {
		Self {
			validator: Some(Box::new(validator)),
			..self
		}
	}
}

/// Fields a table must carry and fields it may carry. Keys the schema does
/// not mention are accepted.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		self.check_at(None, config)
	}

	fn check_at(&self, prefix: Option<&str>, config: &toml::Value) -> Result<(), ValidationError> {
		let path = |name: &str| match prefix {
			Some(p) => format!("{}.{}", p, name),
			None => name.to_string(),
		};
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::mismatch(prefix.unwrap_or("root"), "table", config))?;

		let present = self
			.required
			.iter()
			.map(|field| {
				table
					.get(&field.name)
					.map(|value| (field, value))
					.ok_or_else(|| ValidationError::MissingField(path(&field.name)))
			})
			.collect::<Result<Vec<_>, _>>()?;
		let optional = self
			.optional
			.iter()
			.filter_map(|field| table.get(&field.name).map(|value| (field, value)));

		for (field, value) in present.into_iter().chain(optional) {
			let at = path(&field.name);
			field.field_type.check(&at, value)?;
			if let Some(extra) = &field.validator {
				extra(value).map_err(|message| ValidationError::invalid(&at, message))?;
			}
		}
		Ok(())
	}
}

/// Validation entry point every implementation registry exposes.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	const HUB: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

	fn ledger_schema() -> Schema {
		Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String),
				Field::new("hub", FieldType::Address),
			],
			vec![
				Field::new(
					"min_confirmations",
					FieldType::Integer {
						min: Some(1),
						max: Some(64),
					},
				),
				Field::new("private_key", FieldType::HexBytes(32)),
			],
		)
	}

	fn parse(text: &str) -> toml::Value {
		toml::from_str(text).unwrap()
	}

	#[test]
	fn test_accepts_complete_table() {
		let value = parse(&format!(
			"rpc_url = \"http://localhost:8545\"\nhub = \"{}\"\nmin_confirmations = 3\nextra = true",
			HUB
		));
		assert!(ledger_schema().validate(&value).is_ok());
	}

	#[test]
	fn test_reports_missing_hub() {
		let value = parse(r#"rpc_url = "http://localhost:8545""#);
		assert!(matches!(
			ledger_schema().validate(&value),
			Err(ValidationError::MissingField(f)) if f == "hub"
		));
	}

	#[test]
	fn test_rejects_short_address() {
		let value = parse("rpc_url = \"x\"\nhub = \"0x1234\"");
		assert!(matches!(
			ledger_schema().validate(&value),
			Err(ValidationError::InvalidValue { field, .. }) if field == "hub"
		));
	}

	#[test]
	fn test_confirmations_out_of_range() {
		let value = parse(&format!("rpc_url = \"x\"\nhub = \"{}\"\nmin_confirmations = 0", HUB));
		assert!(matches!(
			ledger_schema().validate(&value),
			Err(ValidationError::InvalidValue { field, .. }) if field == "min_confirmations"
		));
	}

	#[test]
	fn test_key_must_be_32_bytes() {
		let value = parse(&format!("rpc_url = \"x\"\nhub = \"{}\"\nprivate_key = \"0xabcd\"", HUB));
		assert!(matches!(
			ledger_schema().validate(&value),
			Err(ValidationError::InvalidValue { field, .. }) if field == "private_key"
		));
	}

	#[test]
	fn test_wrong_type_is_mismatch() {
		let value = parse(&format!("rpc_url = 5\nhub = \"{}\"", HUB));
		assert!(matches!(
			ledger_schema().validate(&value),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "rpc_url"
		));
	}

	#[test]
	fn test_nested_paths() {
		let schema = Schema::new(
			vec![Field::new(
				"lanes",
				FieldType::Table(Schema::new(
					vec![Field::new("ids", FieldType::Array(Box::new(FieldType::Address)))],
					vec![],
				)),
			)],
			vec![],
		);
		assert!(matches!(
			schema.validate(&parse("[lanes]\nother = 1")),
			Err(ValidationError::MissingField(f)) if f == "lanes.ids"
		));
		assert!(matches!(
			schema.validate(&parse("[lanes]\nids = [\"0x01\"]")),
			Err(ValidationError::InvalidValue { field, .. }) if field == "lanes.ids[0]"
		));
	}

	#[test]
	fn test_custom_validator_runs_after_type_check() {
		let schema = Schema::new(
			vec![Field::new("rpc_url", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(url) if url.starts_with("http") => Ok(()),
					_ => Err("must be an http url".to_string()),
				}
			})],
			vec![],
		);
		assert!(schema.validate(&parse(r#"rpc_url = "http://a""#)).is_ok());
		assert!(matches!(
			schema.validate(&parse(r#"rpc_url = "ws://a""#)),
			Err(ValidationError::InvalidValue { message, .. }) if message == "must be an http url"
		));
	}
}

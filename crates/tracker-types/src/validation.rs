//! Schema validation for implementation-specific TOML tables.
//!
//! Every store backend and order source declares the shape of its
//! `[*.implementations.<name>]` table as a [`Schema`]. The table is checked
//! before the factory runs so that typos surface at startup instead of at the
//! first polling cycle.

use thiserror::Error;

/// Errors that can occur while validating a configuration table.
#[derive(Debug, Error, PartialEq, Eq)]
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
	#[error("Unknown field: {0}")]
	UnknownField(String),
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Prefixes the field path with the name of the enclosing table.
	fn nested_in(self, parent: &str) -> Self {
		let join = |field: String| format!("{}.{}", parent, field);
		match self {
			ValidationError::MissingField(f) => ValidationError::MissingField(join(f)),
			ValidationError::UnknownField(f) => ValidationError::UnknownField(join(f)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: join(field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: join(field),
				expected,
				actual,
			},
			other => other,
		}
	}
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

/// Extra check run after the type check passed.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field of a schema.
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

/// Required and optional fields of a TOML table.
///
/// A strict schema additionally rejects keys it does not declare.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
	pub strict: bool,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self {
			required,
			optional,
			strict: false,
		}
	}

	/// Rejects keys that are neither required nor optional.
	pub fn strict(mut self) -> Self {
		self.strict = true;
		self
	}

	/// Validates `config`, which must be a table.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

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

		if self.strict {
			if let Some(unknown) = table.keys().find(|key| {
				!self
					.required
					.iter()
					.chain(self.optional.iter())
					.any(|f| &f.name == *key)
			}) {
				return Err(ValidationError::UnknownField(unknown.clone()));
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(field_name, "integer", value))?;
			if let Some(min_val) = min.filter(|m| int_val < *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is less than minimum {}", int_val, min_val),
				});
			}
			if let Some(max_val) = max.filter(|m| int_val > *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is greater than maximum {}", int_val, max_val),
				});
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch(field_name, "boolean", value));
			}
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| mismatch(field_name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				check_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		},
		FieldType::Table(schema) => {
			schema
				.validate(value)
				.map_err(|e| e.nested_in(field_name))?;
		},
	}

	Ok(())
}

/// Schema of one pluggable implementation.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Shared validator for fields that must not be blank.
pub fn non_blank(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(s) if !s.trim().is_empty() => Ok(()),
		_ => Err("must not be empty".to_string()),
	}
}

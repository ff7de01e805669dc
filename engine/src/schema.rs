//! Payload schemas for the entity kinds.
//!
//! Create payloads are validated in full before they are queued. Update
//! payloads are partial, so only the types of the fields present are checked.

use crate::{error::Result, EntityKind, Error, OpType};
use serde::{Deserialize, Serialize};

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Float,
    Bool,
    /// Arbitrary nested JSON
    Json,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }

    /// Validate a JSON value against this field definition.
    pub fn validate(&self, value: Option<&serde_json::Value>, partial: bool) -> Result<()> {
        let required = self.required && !partial;
        match value {
            None | Some(serde_json::Value::Null) if required => {
                Err(Error::MissingRequiredField(self.name.to_string()))
            }
            None | Some(serde_json::Value::Null) => Ok(()),
            Some(v) => self.validate_type(v),
        }
    }

    fn validate_type(&self, value: &serde_json::Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Json => true,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: self.name.to_string(),
                expected: self.field_type.to_string(),
                got: json_type_name(value).to_string(),
            })
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(_) => "Float",
        serde_json::Value::String(_) => "String",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}

const EXPENSE_FIELDS: &[FieldDef] = &[
    FieldDef::required("amount", FieldType::Float),
    FieldDef::required("date", FieldType::String),
    FieldDef::optional("description", FieldType::String),
    FieldDef::optional("categoryId", FieldType::Json),
    FieldDef::optional("perimeterId", FieldType::Json),
    FieldDef::optional("currency", FieldType::String),
];

const INCOME_FIELDS: &[FieldDef] = &[
    FieldDef::required("amount", FieldType::Float),
    FieldDef::required("date", FieldType::String),
    FieldDef::optional("description", FieldType::String),
    FieldDef::optional("source", FieldType::String),
    FieldDef::optional("currency", FieldType::String),
];

/// Field definitions for an entity kind.
pub fn fields_for(kind: EntityKind) -> &'static [FieldDef] {
    match kind {
        EntityKind::Expense => EXPENSE_FIELDS,
        EntityKind::Income => INCOME_FIELDS,
    }
}

/// Validate a payload for the given kind and operation type.
///
/// Unknown fields are passed through untouched.
pub fn validate_payload(
    kind: EntityKind,
    op_type: OpType,
    payload: &serde_json::Value,
) -> Result<()> {
    let obj = payload
        .as_object()
        .ok_or_else(|| Error::InvalidPayload("payload must be an object".into()))?;

    let partial = op_type == OpType::Update;
    for field in fields_for(kind) {
        field.validate(obj.get(field.name), partial)?;
    }

    Ok(())
}

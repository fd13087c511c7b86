// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Schemas
//!
//! JSON schemas are derived from Rust types with `schemars` and kept as plain
//! `serde_json::Value`s, so they can be embedded in action metadata and
//! prompt definitions alike. Validation uses `jsonschema` (draft 2020-12).

use crate::error::{Error, Result};
use jsonschema::Draft;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Serialize)]
pub struct ValidationError {
    errors: Vec<ValidationErrorDetail>,
    data: Value,
    schema: Value,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema validation failed. Parse Errors:")?;
        for detail in &self.errors {
            writeln!(f, "- {}", detail)?;
        }
        write!(f, "Provided data: {}", self.data)
    }
}

impl ValidationError {
    pub fn new(errors: Vec<ValidationErrorDetail>, data: Value, schema: Value) -> Self {
        Self {
            errors,
            data,
            schema,
        }
    }

    pub fn errors(&self) -> &[ValidationErrorDetail] {
        &self.errors
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrorDetail {
    /// JSON pointer to the offending value; empty for the root.
    pub path: String,
    pub message: String,
}

impl Display for ValidationErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

/// Derives the JSON schema of `T`.
pub fn schema_for<T: JsonSchema>() -> Value {
    schemars::schema_for!(T).to_value()
}

/// Validates `data` against `schema`, collecting every failure.
pub fn validate_schema(data: &Value, schema: &Value) -> Result<()> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|e| Error::new_internal(format!("invalid schema: {}", e)))?;

    let errors: Vec<ValidationErrorDetail> = validator
        .iter_errors(data)
        .map(|e| ValidationErrorDetail {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::Validation(Box::new(ValidationError::new(
        errors,
        data.clone(),
        schema.clone(),
    ))))
}

/// Validates `data` against `schema` (when given) and deserializes it.
pub fn parse_schema<T: DeserializeOwned>(data: Value, schema: Option<&Value>) -> Result<T> {
    if let Some(schema) = schema {
        validate_schema(&data, schema)?;
    }
    serde_json::from_value(data).map_err(|e| {
        Error::new_user_facing(
            crate::status::StatusCode::InvalidArgument,
            format!("failed to parse input: {}", e),
            None,
        )
    })
}

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

//! # Error and Result types
//!
//! Every fallible operation in Genkit returns [`Result`]. Errors are values:
//! they are propagated to the caller unchanged and never retried.

use crate::schema::ValidationError;
use crate::status::{Status, StatusCode};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// An error whose status and message are safe to return to API callers.
    #[error("{0}")]
    UserFacing(#[from] Status),

    /// A framework or provider failure. Only a generic message is exposed
    /// over HTTP.
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Input or output did not conform to an action's JSON schema.
    #[error(transparent)]
    Validation(#[from] Box<ValidationError>),
}

impl Error {
    pub fn new_user_facing(
        code: StatusCode,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Error::UserFacing(Status {
            code,
            message: message.into(),
            details,
        })
    }

    pub fn new_internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a lower level error, keeping it reachable through `source()`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UserFacing(status) => status.code,
            Error::Validation(_) => StatusCode::InvalidArgument,
            Error::Internal { .. } => StatusCode::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.status_code().to_http_status()
    }

    /// The status to serialize in API responses. Internal errors are reduced
    /// to a generic message.
    pub fn as_status(&self) -> Status {
        match self {
            Error::UserFacing(status) => status.clone(),
            Error::Validation(ve) => Status {
                code: StatusCode::InvalidArgument,
                message: "Schema validation failed".to_string(),
                details: Some(serde_json::json!({ "errors": ve.errors() })),
            },
            Error::Internal { .. } => Status::new(StatusCode::Internal, "Internal Server Error"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(format!("json: {e}"), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn internal_errors_hide_details() {
        let err = Error::new_internal("database password leaked");
        let status = err.as_status();
        assert_eq!(status.code, StatusCode::Internal);
        assert_eq!(status.message, "Internal Server Error");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn user_facing_errors_keep_status() {
        let err = Error::new_user_facing(StatusCode::PermissionDenied, "unauthorized", None);
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.as_status().message, "unauthorized");
        assert_eq!(err.to_string(), "PERMISSION_DENIED: unauthorized");
    }

    #[test]
    fn with_source_exposes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::with_source("reading body", io);
        assert_eq!(err.to_string(), "reading body");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }
}

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

//! # Status codes
//!
//! Canonical status codes shared by actions, flows and the HTTP servers. The
//! numeric values follow the gRPC canonical codes; each code also carries its
//! canonical name and the HTTP status used when it crosses an HTTP boundary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Canonical status code of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    /// The caller supplied an argument that is invalid regardless of system state.
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    /// The system is not in the state required by the operation, e.g. a plugin
    /// being initialized twice.
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

/// `(code, canonical name, http status)` for every code.
const CODES: [(StatusCode, &str, u16); 17] = [
    (StatusCode::Ok, "OK", 200),
    (StatusCode::Cancelled, "CANCELLED", 499),
    (StatusCode::Unknown, "UNKNOWN", 500),
    (StatusCode::InvalidArgument, "INVALID_ARGUMENT", 400),
    (StatusCode::DeadlineExceeded, "DEADLINE_EXCEEDED", 504),
    (StatusCode::NotFound, "NOT_FOUND", 404),
    (StatusCode::AlreadyExists, "ALREADY_EXISTS", 409),
    (StatusCode::PermissionDenied, "PERMISSION_DENIED", 403),
    (StatusCode::ResourceExhausted, "RESOURCE_EXHAUSTED", 429),
    (StatusCode::FailedPrecondition, "FAILED_PRECONDITION", 400),
    (StatusCode::Aborted, "ABORTED", 409),
    (StatusCode::OutOfRange, "OUT_OF_RANGE", 400),
    (StatusCode::Unimplemented, "UNIMPLEMENTED", 501),
    (StatusCode::Internal, "INTERNAL", 500),
    (StatusCode::Unavailable, "UNAVAILABLE", 503),
    (StatusCode::DataLoss, "DATA_LOSS", 500),
    (StatusCode::Unauthenticated, "UNAUTHENTICATED", 401),
];

impl StatusCode {
    fn entry(self) -> &'static (StatusCode, &'static str, u16) {
        // CODES is indexed by discriminant.
        &CODES[self as usize]
    }

    /// The canonical upper-case name, e.g. `NOT_FOUND`.
    pub fn name(self) -> &'static str {
        self.entry().1
    }

    /// The HTTP status code this status maps to.
    pub fn to_http_status(self) -> u16 {
        self.entry().2
    }

    /// Looks a code up by its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        CODES.get(value as usize).map(|(code, _, _)| *code)
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(*self as u16)
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u16::deserialize(deserializer)?;
        StatusCode::from_u16(value).ok_or_else(|| {
            serde::de::Error::invalid_value(
                serde::de::Unexpected::Unsigned(value as u64),
                &"a canonical status code between 0 and 16",
            )
        })
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a string is not a canonical status name.
#[derive(Debug, Error)]
#[error("invalid status name: {0}")]
pub struct ParseStatusError(String);

impl FromStr for StatusCode {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CODES
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(code, _, _)| *code)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// The serializable outcome of a failed operation, as returned by the HTTP
/// servers in `{"error": ...}` bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn codes_table_is_indexed_by_discriminant() {
        for (i, (code, _, _)) in CODES.iter().enumerate() {
            assert_eq!(*code as usize, i);
        }
    }

    #[rstest]
    #[case(StatusCode::Ok, 200)]
    #[case(StatusCode::InvalidArgument, 400)]
    #[case(StatusCode::Unauthenticated, 401)]
    #[case(StatusCode::PermissionDenied, 403)]
    #[case(StatusCode::NotFound, 404)]
    #[case(StatusCode::AlreadyExists, 409)]
    #[case(StatusCode::Internal, 500)]
    fn maps_to_http_status(#[case] code: StatusCode, #[case] http: u16) {
        assert_eq!(code.to_http_status(), http);
    }

    #[test]
    fn serializes_as_number() {
        assert_eq!(serde_json::to_string(&StatusCode::Unauthenticated).unwrap(), "16");
        assert_eq!(
            serde_json::from_str::<StatusCode>("5").unwrap(),
            StatusCode::NotFound
        );
        assert!(serde_json::from_str::<StatusCode>("42").is_err());
    }

    #[test]
    fn status_skips_empty_details() {
        let status = Status::new(StatusCode::PermissionDenied, "unauthorized");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"code": 7, "message": "unauthorized"})
        );
        assert_eq!(status.to_string(), "PERMISSION_DENIED: unauthorized");
    }

    #[test]
    fn parses_canonical_names() {
        assert_eq!(
            "FAILED_PRECONDITION".parse::<StatusCode>().unwrap(),
            StatusCode::FailedPrecondition
        );
        assert!("NOPE".parse::<StatusCode>().is_err());
    }
}

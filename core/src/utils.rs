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


//! # Utilities
//!
//! Environment lookups and small JSON helpers shared across the crate.

use serde_json::{Map, Value};
use std::env;

/// Selects the dev or prod behaviour of the server and telemetry.
pub const GENKIT_ENV: &str = "GENKIT_ENV";
/// Base URL of the Genkit telemetry server, when traces should be exported.
pub const GENKIT_TELEMETRY_SERVER: &str = "GENKIT_TELEMETRY_SERVER";

/// The environment the app runs in, `prod` unless `GENKIT_ENV` says otherwise.
pub fn get_current_env() -> String {
    env::var(GENKIT_ENV).unwrap_or_else(|_| "prod".to_string())
}

pub fn is_dev_env() -> bool {
    get_current_env() == "dev"
}

/// The telemetry server configured through the environment, if any.
pub fn telemetry_server_from_env() -> Option<String> {
    env::var(GENKIT_TELEMETRY_SERVER)
        .ok()
        .filter(|url| !url.is_empty())
}

/// Removes `null` object members, recursively. Array elements are kept.
pub fn strip_null_values(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_null_values(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_null_values).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_nested_nulls() {
        let input = json!({
            "model": "ollama/llama3",
            "config": {"temperature": null, "topK": 3},
            "tools": [null, "menu"],
            "context": null
        });
        assert_eq!(
            strip_null_values(input),
            json!({
                "model": "ollama/llama3",
                "config": {"topK": 3},
                "tools": [null, "menu"]
            })
        );
        assert_eq!(strip_null_values(json!(3)), json!(3));
    }

    // One test touches GENKIT_ENV so parallel tests never race on it.
    #[test]
    fn reads_env() {
        env::remove_var(GENKIT_ENV);
        assert_eq!(get_current_env(), "prod");
        assert!(!is_dev_env());
        env::set_var(GENKIT_ENV, "dev");
        assert!(is_dev_env());
        env::remove_var(GENKIT_ENV);
    }
}

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

//! # Action and Flow Context
//!
//! Side-channel data that travels with an action invocation: authentication
//! information, the enclosing flow, and the [`FlowAuth`] policy hooks used by
//! the flow server. Context is scoped with `tokio::task_local!`, so it follows
//! the future it was attached to across `.await` points.

use crate::error::{Error, Result};
use crate::status::StatusCode;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;

tokio::task_local! {
    static CONTEXT: ActionContext;
    static FLOW_CONTEXT: FlowContext;
}

/// Data attached to a single invocation, such as the authenticated caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ActionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    #[serde(flatten)]
    pub additional_context: HashMap<String, Value>,
}

impl ActionContext {
    /// A context carrying only auth data.
    pub fn with_auth(auth: Value) -> Self {
        Self {
            auth: Some(auth),
            ..Default::default()
        }
    }

    /// Merges `other` into `self`; `other.auth` wins when set.
    pub fn extend(&mut self, other: ActionContext) {
        if other.auth.is_some() {
            self.auth = other.auth;
        }
        self.additional_context.extend(other.additional_context);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match key {
            "auth" => self.auth.as_ref(),
            _ => self.additional_context.get(key),
        }
    }
}

/// Identifies the flow a piece of code is running under.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub flow_id: String,
    pub flow_name: String,
}

/// Runs `future` with `context` as the current action context.
pub async fn run_with_context<F: Future>(context: ActionContext, future: F) -> F::Output {
    CONTEXT.scope(context, future).await
}

/// The action context of the current task, if any.
pub fn get_context() -> Option<ActionContext> {
    CONTEXT.try_with(Clone::clone).ok()
}

pub async fn run_with_flow_context<F: Future>(context: FlowContext, future: F) -> F::Output {
    FLOW_CONTEXT.scope(context, future).await
}

pub fn get_flow_context() -> Option<FlowContext> {
    FLOW_CONTEXT.try_with(Clone::clone).ok()
}

/// Authentication hooks for a flow.
///
/// The flow server hands the raw `Authorization` header to
/// [`provide_auth_context`](FlowAuth::provide_auth_context); the resulting
/// context is installed for the invocation and checked with
/// [`check_auth_policy`](FlowAuth::check_auth_policy) before the flow body
/// runs. Direct callers supply the context through the run options instead.
#[async_trait]
pub trait FlowAuth: Send + Sync {
    async fn provide_auth_context(&self, auth_header: Option<&str>) -> Result<ActionContext>;

    fn check_auth_policy(&self, context: Option<&ActionContext>, input: &Value) -> Result<()>;
}

/// How [`ApiKeyAuth`] treats the presented key.
#[derive(Debug, Clone)]
pub enum ApiKeyPolicy {
    /// Record the key, if any, without checking it.
    ExtractOnly,
    /// Reject callers that do not present exactly this key.
    Require(String),
}

/// A [`FlowAuth`] that reads an API key from the `Authorization` header and
/// exposes it as `{"apiKey": ...}` auth data.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    policy: ApiKeyPolicy,
}

impl ApiKeyAuth {
    pub fn new(policy: ApiKeyPolicy) -> Self {
        Self { policy }
    }

    fn presented_key(context: Option<&ActionContext>) -> Option<&str> {
        context?.auth.as_ref()?.get("apiKey")?.as_str()
    }
}

#[async_trait]
impl FlowAuth for ApiKeyAuth {
    async fn provide_auth_context(&self, auth_header: Option<&str>) -> Result<ActionContext> {
        Ok(ActionContext::with_auth(json!({ "apiKey": auth_header })))
    }

    fn check_auth_policy(&self, context: Option<&ActionContext>, _input: &Value) -> Result<()> {
        let ApiKeyPolicy::Require(required) = &self.policy else {
            return Ok(());
        };
        match Self::presented_key(context) {
            None => Err(Error::new_user_facing(
                StatusCode::Unauthenticated,
                "Unauthenticated",
                None,
            )),
            Some(key) if key != required => Err(Error::new_user_facing(
                StatusCode::PermissionDenied,
                "Permission Denied",
                None,
            )),
            Some(_) => Ok(()),
        }
    }
}

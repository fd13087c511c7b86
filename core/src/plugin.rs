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


//! # Plugins
//!
//! A plugin adapts a provider (a model server, a template format, ...) to
//! Genkit. Initialization is guarded per registry: a plugin name can be
//! initialized once, and a second attempt is an error rather than a silent
//! re-initialization.

use crate::error::Result;
use crate::registry::Registry;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name, also the provider prefix of the plugin's actions.
    fn name(&self) -> &str;

    /// Registers the plugin's eagerly defined actions.
    async fn initialize(&self, registry: &Registry) -> Result<()>;
}

/// Marks `plugin` initialized on `registry`, then runs its initialization.
///
/// Fails with `FAILED_PRECONDITION` when a plugin of the same name was
/// already initialized on this registry.
pub async fn init_plugin(registry: &Registry, plugin: Arc<dyn Plugin>) -> Result<()> {
    registry.register_plugin(plugin.clone())?;
    log::debug!("initializing plugin {}", plugin.name());
    plugin.initialize(registry).await
}

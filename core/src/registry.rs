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


//! # Registry
//!
//! The registry owns every action, plugin and named value of a Genkit
//! instance. It is cheap to clone; clones share state. A child registry
//! (see [`Registry::child`]) falls back to its parent on lookup.

use crate::action::{Action, ActionMetadata, ActionResult, ActionRunOptions, StreamingCallback};
use crate::context::{ActionContext, FlowAuth};
use crate::error::{Error, Result};
use crate::plugin::Plugin;
use crate::status::StatusCode;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Custom,
    Flow,
    Indexer,
    Model,
    Prompt,
    Retriever,
    Tool,
    Util,
}

impl ActionType {
    /// The segment used in registry keys, e.g. `model` in `/model/ollama/llava`.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Custom => "custom",
            ActionType::Flow => "flow",
            ActionType::Indexer => "indexer",
            ActionType::Model => "model",
            ActionType::Prompt => "prompt",
            ActionType::Retriever => "retriever",
            ActionType::Tool => "tool",
            ActionType::Util => "util",
        }
    }
}

/// An action with its types erased, as stored in the registry and run by
/// the HTTP servers.
#[async_trait]
pub trait ErasedAction: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> &ActionMetadata;

    fn auth(&self) -> Option<Arc<dyn FlowAuth>>;

    async fn run_json(
        &self,
        input: Value,
        context: Option<ActionContext>,
        on_chunk: Option<StreamingCallback<Value>>,
    ) -> Result<ActionResult<Value>>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<I, O, S> ErasedAction for Action<I, O, S>
where
    I: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    S: Serialize + Send + 'static,
{
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn metadata(&self) -> &ActionMetadata {
        &self.meta
    }

    fn auth(&self) -> Option<Arc<dyn FlowAuth>> {
        Action::auth(self)
    }

    async fn run_json(
        &self,
        input: Value,
        context: Option<ActionContext>,
        on_chunk: Option<StreamingCallback<Value>>,
    ) -> Result<ActionResult<Value>> {
        let options = ActionRunOptions {
            context,
            on_chunk,
            abort_signal: None,
        };
        Action::run_json(self, input, options).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct RegistryState {
    actions: HashMap<String, Arc<dyn ErasedAction>>,
    plugins: HashMap<String, Arc<dyn Plugin>>,
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
    default_model: Option<String>,
}

#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    parent: Option<Box<Registry>>,
}

/// A handle that does not keep the registry alive. Plugins and prompts that
/// the registry itself stores hold one of these.
#[derive(Clone, Default)]
pub struct WeakRegistry {
    state: Weak<Mutex<RegistryState>>,
    parent: Option<Box<Registry>>,
}

impl WeakRegistry {
    /// The registry, unless every [`Registry`] handle to it was dropped.
    pub fn upgrade(&self) -> Option<Registry> {
        Some(Registry {
            state: self.state.upgrade()?,
            parent: self.parent.clone(),
        })
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Registry")
            .field("actions", &state.actions.keys().collect::<Vec<_>>())
            .field("plugins", &state.plugins.keys().collect::<Vec<_>>())
            .field("parent", &self.parent)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new registry whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Self {
            state: Default::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            state: Arc::downgrade(&self.state),
            parent: self.parent.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `action` under `/{type}/{name}`. Keys are never overwritten.
    pub fn register_action(&self, action: impl ErasedAction + 'static) -> Result<()> {
        let key = action.metadata().key();
        let mut state = self.lock();
        if state.actions.contains_key(&key) {
            return Err(Error::new_user_facing(
                StatusCode::AlreadyExists,
                format!("action {} is already registered", key),
                None,
            ));
        }
        log::debug!("registered action {}", key);
        state.actions.insert(key, Arc::new(action));
        Ok(())
    }

    /// Looks an action up by key, e.g. `/flow/basic`.
    pub fn lookup_action(&self, key: &str) -> Option<Arc<dyn ErasedAction>> {
        if let Some(action) = self.lock().actions.get(key) {
            return Some(action.clone());
        }
        self.parent.as_ref()?.lookup_action(key)
    }

    /// Looks an action up by type and name and restores its concrete type.
    /// Returns `None` when the action is missing or has different types.
    pub fn lookup<I, O, S>(&self, action_type: ActionType, name: &str) -> Option<Action<I, O, S>>
    where
        I: 'static,
        O: 'static,
        S: 'static,
    {
        let action = self.lookup_action(&format!("/{}/{}", action_type.as_str(), name))?;
        action.as_any().downcast_ref::<Action<I, O, S>>().cloned()
    }

    /// Every action visible from this registry, by key. Child entries shadow
    /// the parent's.
    pub fn list_actions(&self) -> BTreeMap<String, Arc<dyn ErasedAction>> {
        let mut actions = match &self.parent {
            Some(parent) => parent.list_actions(),
            None => BTreeMap::new(),
        };
        for (key, action) in &self.lock().actions {
            actions.insert(key.clone(), action.clone());
        }
        actions
    }

    /// Records `plugin` as initialized. Fails if a plugin with the same name
    /// already was, here or on a parent.
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        let in_parent = self
            .parent
            .as_ref()
            .is_some_and(|p| p.is_plugin_registered(&name));
        let mut state = self.lock();
        if in_parent || state.plugins.contains_key(&name) {
            return Err(Error::new_user_facing(
                StatusCode::FailedPrecondition,
                format!("plugin {:?} is already initialized", name),
                None,
            ));
        }
        state.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn is_plugin_registered(&self, name: &str) -> bool {
        self.lock().plugins.contains_key(name)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.is_plugin_registered(name))
    }

    pub fn lookup_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        if let Some(plugin) = self.lock().plugins.get(name) {
            return Some(plugin.clone());
        }
        self.parent.as_ref()?.lookup_plugin(name)
    }

    /// Stores an arbitrary value under `{kind}/{name}`, replacing any previous one.
    pub fn register_value<T: Any + Send + Sync>(&self, kind: &str, name: &str, value: T) {
        self.lock()
            .values
            .insert(format!("{}/{}", kind, name), Arc::new(value));
    }

    pub fn lookup_value<T: Any + Send + Sync>(&self, kind: &str, name: &str) -> Option<Arc<T>> {
        let key = format!("{}/{}", kind, name);
        if let Some(value) = self.lock().values.get(&key) {
            return value.clone().downcast().ok();
        }
        self.parent.as_ref()?.lookup_value(kind, name)
    }

    pub fn set_default_model(&self, name: impl Into<String>) {
        self.lock().default_model = Some(name.into());
    }

    pub fn default_model(&self) -> Option<String> {
        if let Some(model) = &self.lock().default_model {
            return Some(model.clone());
        }
        self.parent.as_ref()?.default_model()
    }
}

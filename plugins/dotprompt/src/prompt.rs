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


//! Prompt definitions and request building.

use crate::render::{self, TEMPLATE_NAME};
use crate::{Error, Result, PROVIDER};
use genkit_ai::prompt::{define_prompt, PromptAction};
use genkit_ai::tool::lookup_tool;
use genkit_ai::{
    GenerateRequest, GenerationCommonConfig, MessageData, ModelAction, OutputConfig, OutputFormat,
    ToolDefinition,
};
use genkit_core::registry::{Registry, WeakRegistry};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Everything a prompt needs besides its template.
#[derive(Clone, Default)]
pub struct Config {
    /// The model to call. Takes precedence over any model name.
    pub model: Option<ModelAction>,
    /// A `provider/name` model reference, used when `model` is unset.
    pub model_name: Option<String>,
    /// Names of registered tools offered to the model.
    pub tools: Vec<String>,
    pub candidates: Option<u32>,
    pub generation_config: Option<GenerationCommonConfig>,
    pub input_schema: Option<Value>,
    /// Variables used when the caller does not set them.
    pub default_input: Option<Map<String, Value>>,
    pub output_format: Option<OutputFormat>,
    pub output_schema: Option<Value>,
}

struct Definition {
    name: String,
    variant: Option<String>,
    template_text: String,
    hash: String,
    config: Config,
    engine: Handlebars<'static>,
    registry: WeakRegistry,
}

/// A compiled prompt template. Cloning is cheap.
#[derive(Clone)]
pub struct Prompt {
    def: Arc<Definition>,
    action: Arc<OnceCell<PromptAction>>,
}

/// Compiles and registers a prompt.
pub fn define(registry: &Registry, name: &str, template: &str, config: Config) -> Result<Prompt> {
    let prompt = Prompt::new(registry, name, template, config)?;
    prompt.register()?;
    Ok(prompt)
}

fn template_hash(template: &str) -> String {
    let mut hasher = DefaultHasher::new();
    template.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl Prompt {
    /// Compiles `template` without registering it.
    pub fn new(registry: &Registry, name: &str, template: &str, config: Config) -> Result<Self> {
        Ok(Self {
            def: Arc::new(Definition {
                name: name.to_string(),
                variant: None,
                template_text: template.to_string(),
                hash: template_hash(template),
                config,
                engine: render::compile(template)?,
                registry: registry.downgrade(),
            }),
            action: Arc::new(OnceCell::new()),
        })
    }

    /// A copy of this prompt registered as `{name}.{variant}`.
    pub fn with_variant(&self, variant: &str) -> Result<Self> {
        Ok(Self {
            def: Arc::new(Definition {
                name: self.def.name.clone(),
                variant: Some(variant.to_string()),
                template_text: self.def.template_text.clone(),
                hash: self.def.hash.clone(),
                config: self.def.config.clone(),
                engine: render::compile(&self.def.template_text)?,
                registry: self.def.registry.clone(),
            }),
            action: Arc::new(OnceCell::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn variant(&self) -> Option<&str> {
        self.def.variant.as_deref()
    }

    pub fn template_text(&self) -> &str {
        &self.def.template_text
    }

    /// Fingerprint of the template text.
    pub fn hash(&self) -> &str {
        &self.def.hash
    }

    pub fn config(&self) -> &Config {
        &self.def.config
    }

    pub(crate) fn registry(&self) -> Result<Registry> {
        self.def.registry()
    }

    /// The registered prompt action, once [`register`](Self::register) ran.
    pub fn action(&self) -> Option<&PromptAction> {
        self.action.get()
    }

    /// Registers the prompt as `/prompt/dotprompt/{name}[.{variant}]`.
    /// Calling it again is a no-op.
    pub fn register(&self) -> Result<()> {
        if self.action.get().is_some() {
            return Ok(());
        }
        if self.def.name.is_empty() {
            return Err(Error::UnnamedPrompt);
        }
        let name = match &self.def.variant {
            Some(variant) => format!("{}.{}", self.def.name, variant),
            None => self.def.name.clone(),
        };
        let config = &self.def.config;
        let metadata = HashMap::from([(
            "prompt".to_string(),
            json!({
                "name": self.def.name,
                "input": {"schema": config.input_schema},
                "output": {"format": config.output_format},
                "template": self.def.template_text,
            }),
        )]);

        let def = self.def.clone();
        let action = define_prompt(
            &self.def.registry()?,
            PROVIDER,
            &name,
            metadata,
            config.input_schema.clone(),
            move |input| {
                let request = def.build_request(&input).map_err(genkit_core::Error::from);
                async move { request }
            },
        )?;
        log::debug!("registered prompt {}", action.key());
        // A concurrent register may have won; its action is equivalent.
        let _ = self.action.set(action);
        Ok(())
    }

    /// Renders the template to a single string.
    pub fn render_text(&self, variables: &impl Serialize) -> Result<String> {
        let variables = self.def.variables(variables)?;
        self.def.render(&variables)
    }

    /// Renders the template into messages.
    pub fn render_messages(&self, variables: &impl Serialize) -> Result<Vec<MessageData>> {
        let variables = self.def.variables(variables)?;
        render::to_messages(&self.def.render(&variables)?)
    }

    /// Builds the model request for `input` without going through the
    /// registered action.
    pub fn build_request(&self, input: &impl Serialize) -> Result<GenerateRequest> {
        self.def.build_request(&serde_json::to_value(input)?)
    }
}

/// Converts caller input into template variables. `null` means no variables;
/// anything other than an object is rejected.
pub fn build_variables(input: &impl Serialize) -> Result<Option<Map<String, Value>>> {
    match serde_json::to_value(input)? {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(Error::Variables),
    }
}

impl Definition {
    fn registry(&self) -> Result<Registry> {
        self.registry.upgrade().ok_or(Error::RegistryDropped)
    }

    /// Caller variables layered over the default input.
    fn variables(&self, input: &impl Serialize) -> Result<Map<String, Value>> {
        let mut variables = self.config.default_input.clone().unwrap_or_default();
        if let Some(given) = build_variables(input)? {
            variables.extend(given);
        }
        Ok(variables)
    }

    fn render(&self, variables: &Map<String, Value>) -> Result<String> {
        Ok(self.engine.render(TEMPLATE_NAME, variables)?)
    }

    fn tool_definitions(&self) -> Result<Vec<ToolDefinition>> {
        if self.config.tools.is_empty() {
            return Ok(Vec::new());
        }
        let registry = self.registry()?;
        self.config
            .tools
            .iter()
            .map(|name| {
                lookup_tool(&registry, name)
                    .map(|tool| ToolDefinition::from(tool.metadata()))
                    .ok_or_else(|| Error::ToolNotFound(name.clone()))
            })
            .collect()
    }

    fn build_request(&self, input: &Value) -> Result<GenerateRequest> {
        let variables = self.variables(input)?;
        let messages = render::to_messages(&self.render(&variables)?)?;
        let config = self
            .config
            .generation_config
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        Ok(GenerateRequest {
            messages,
            config,
            tools: self.tool_definitions()?,
            output: Some(OutputConfig {
                format: self.config.output_format,
                schema: self.config.output_schema.clone(),
            }),
            candidates: self.config.candidates,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genkit_ai::Role;
    use rstest::rstest;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Question {
        question: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        style: Option<String>,
    }

    fn prompt(template: &str, config: Config) -> Prompt {
        Prompt::new(&Registry::new(), "menu", template, config).unwrap()
    }

    #[rstest]
    #[case(json!(null), None)]
    #[case(json!({"a": 1}), Some(json!({"a": 1})))]
    fn builds_variables_from_objects(#[case] input: Value, #[case] expected: Option<Value>) {
        let vars = build_variables(&input).unwrap().map(Value::Object);
        assert_eq!(vars, expected);
    }

    #[rstest]
    #[case(json!(3))]
    #[case(json!("text"))]
    #[case(json!([1, 2]))]
    fn rejects_non_object_variables(#[case] input: Value) {
        let err = build_variables(&input).unwrap_err();
        assert_eq!(
            err.to_string(),
            "dotprompt: fields not a struct or pointer to a struct or a map"
        );
    }

    #[test]
    fn skipped_fields_fall_back_to_defaults() {
        let config = Config {
            default_input: Some(
                json!({"style": "pirate", "question": "?"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            ..Default::default()
        };
        let p = prompt("{{question}} in {{style}} style", config);
        let text = p
            .render_text(&Question {
                question: "Soup?".into(),
                style: None,
            })
            .unwrap();
        assert_eq!(text, "Soup? in pirate style");
    }

    #[test]
    fn builds_the_request() {
        let config = Config {
            generation_config: Some(GenerationCommonConfig {
                temperature: Some(0.3),
                ..Default::default()
            }),
            output_format: Some(OutputFormat::Json),
            output_schema: Some(json!({"type": "object"})),
            candidates: Some(2),
            ..Default::default()
        };
        let p = prompt("{{role \"system\"}}Be terse.{{role \"user\"}}{{question}}", config);
        let req = p.build_request(&json!({"question": "Soup?"})).unwrap();

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].text(), "Soup?");
        assert_eq!(req.config, Some(json!({"temperature": 0.3})));
        let output = req.output.unwrap();
        assert_eq!(output.format, Some(OutputFormat::Json));
        assert_eq!(output.schema, Some(json!({"type": "object"})));
        assert_eq!(req.candidates, Some(2));
        assert!(req.tools.is_empty());
    }

    #[test]
    fn unknown_tools_fail_the_request() {
        let config = Config {
            tools: vec!["missing".into()],
            ..Default::default()
        };
        let registry = Registry::new();
        let p = Prompt::new(&registry, "menu", "hi", config).unwrap();
        let err = p.build_request(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "dotprompt: tool \"missing\" not found");
    }

    #[test]
    fn prompts_do_not_keep_the_registry_alive() {
        let registry = Registry::new();
        let p = define(&registry, "greet", "Hi {{name}}", Config::default()).unwrap();
        let weak = registry.downgrade();
        drop(registry);

        assert!(weak.upgrade().is_none());
        assert!(matches!(p.with_variant("casual").unwrap().register(), Err(Error::RegistryDropped)));
        assert_eq!(p.render_text(&json!({"name": "Ann"})).unwrap(), "Hi Ann");
    }

    #[test]
    fn hash_depends_on_the_template() {
        let a = prompt("hello", Config::default());
        let b = prompt("hello", Config::default());
        let c = prompt("goodbye", Config::default());
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn register_is_idempotent_and_honors_variants() {
        let registry = Registry::new();
        let p = define(&registry, "greet", "Hi {{name}}", Config::default()).unwrap();
        p.register().unwrap();
        assert_eq!(p.action().unwrap().key(), "/prompt/dotprompt/greet");
        let meta = &p.action().unwrap().meta.metadata["prompt"];
        assert_eq!(meta["name"], "greet");
        assert_eq!(meta["template"], "Hi {{name}}");

        let casual = p.with_variant("casual").unwrap();
        casual.register().unwrap();
        assert!(registry.lookup_action("/prompt/dotprompt/greet.casual").is_some());
    }

    #[test]
    fn unnamed_prompts_cannot_register() {
        let p = Prompt::new(&Registry::new(), "", "hi", Config::default()).unwrap();
        assert_eq!(p.register().unwrap_err().to_string(), "attempt to register unnamed prompt");
    }
}

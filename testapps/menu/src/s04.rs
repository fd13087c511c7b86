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


//! Retrieval augmented answers: menu items are indexed into the store and
//! the items most relevant to a question are handed to the prompt.

use crate::store;
use crate::types::{AnswerOutput, DataMenuQuestionInput, MenuItem, MenuQuestionInput};
use genkit::{
    index, retrieve, Document, Error, GenerationCommonConfig, Genkit, ModelAction, OutputFormat,
    Result, RetrieverRequest,
};
use genkit_dotprompt::{define, Config, PromptRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

const RAG_DATA_MENU_TEMPLATE: &str = r#"
You are acting as Walt, a helpful AI assistant here at the restaurant.
You can answer questions about the food on the menu or any other questions
customers have about food in general.

Here are some items that are on today's menu that are relevant to
helping you answer the customer's question:
{{#each menuData~}}
- {{this.title}} ${{this.price}}
  {{this.description}}
{{/each}}

Answer this customer's question:
{{question}}?"#;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IndexOutput {
    pub rows: usize,
}

pub fn setup04(genkit: &Genkit, model: ModelAction) -> Result<()> {
    let indexer = store::indexer(genkit.registry())?;
    let retriever = store::retriever(genkit.registry())?;

    let prompt = define(
        genkit.registry(),
        "s04_ragDataMenu",
        RAG_DATA_MENU_TEMPLATE,
        Config {
            model: Some(model),
            input_schema: Some(schemars::schema_for!(DataMenuQuestionInput).to_value()),
            output_format: Some(OutputFormat::Text),
            generation_config: Some(GenerationCommonConfig {
                temperature: Some(0.3),
                ..Default::default()
            }),
            ..Default::default()
        },
    )?;

    genkit.define_flow("s04_indexMenuItems", move |items: Vec<MenuItem>, _| {
        let indexer = indexer.clone();
        async move {
            let docs = items
                .iter()
                .map(|item| {
                    let text = format!("{} {} \n {}", item.title, item.price, item.description);
                    let metadata = HashMap::from([("menuItem".to_string(), json!(item))]);
                    Document::from_text(text, Some(metadata))
                })
                .collect();
            index(&indexer, docs, None).await?;
            Ok(IndexOutput { rows: items.len() })
        }
    })?;

    genkit.define_flow(
        "s04_ragMenuQuestion",
        move |input: MenuQuestionInput, _| {
            let retriever = retriever.clone();
            let prompt = prompt.clone();
            async move {
                let request =
                    RetrieverRequest::from_text(&input.question).with_options(json!({"k": 3}));
                let response = retrieve(&retriever, request).await?;
                let menu_data = response
                    .documents
                    .iter()
                    .filter_map(|doc| doc.metadata.as_ref()?.get("menuItem").cloned())
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<Vec<MenuItem>, _>>()?;

                let variables = DataMenuQuestionInput {
                    menu_data,
                    question: input.question,
                };
                let answer = prompt
                    .generate(PromptRequest::new(&variables)?, None)
                    .await?;
                let text = answer
                    .message
                    .as_ref()
                    .and_then(|m| m.content.first())
                    .and_then(|p| p.text.clone())
                    .ok_or_else(|| Error::new_internal("model returned no text"))?;
                Ok(AnswerOutput { answer: text })
            }
        },
    )?;
    Ok(())
}

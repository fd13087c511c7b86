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


//! # Retrievers and Indexers
//!
//! Retrievers find documents relevant to a query; indexers store documents
//! for later retrieval. Both are actions, registered under
//! `/retriever/{provider}/{name}` and `/indexer/{provider}/{name}`.

use crate::document::Document;
use genkit_core::action::{Action, ActionBuilder, ActionFnArg};
use genkit_core::error::Result;
use genkit_core::registry::{ActionType, Registry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RetrieverRequest {
    pub query: Document,
    /// Retriever specific options, such as the number of results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl RetrieverRequest {
    pub fn from_text(query: impl Into<String>) -> Self {
        Self {
            query: Document::from_text(query, None),
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct RetrieverResponse {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct IndexerRequest {
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Clone)]
pub struct RetrieverAction(pub Action<RetrieverRequest, RetrieverResponse, ()>);

impl Deref for RetrieverAction {
    type Target = Action<RetrieverRequest, RetrieverResponse, ()>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone)]
pub struct IndexerAction(pub Action<IndexerRequest, (), ()>);

impl Deref for IndexerAction {
    type Target = Action<IndexerRequest, (), ()>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn define_retriever<F, Fut>(
    registry: &Registry,
    provider: &str,
    name: &str,
    runner: F,
) -> Result<RetrieverAction>
where
    F: Fn(RetrieverRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RetrieverResponse>> + Send,
{
    let runner = Arc::new(runner);
    let body = move |req: RetrieverRequest, _: ActionFnArg<()>| {
        let runner = runner.clone();
        async move { (*runner)(req).await }
    };
    let action = ActionBuilder::new(ActionType::Retriever, format!("{}/{}", provider, name), body)
        .build();
    registry.register_action(action.clone())?;
    Ok(RetrieverAction(action))
}

pub fn define_indexer<F, Fut>(
    registry: &Registry,
    provider: &str,
    name: &str,
    runner: F,
) -> Result<IndexerAction>
where
    F: Fn(IndexerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    let runner = Arc::new(runner);
    let body = move |req: IndexerRequest, _: ActionFnArg<()>| {
        let runner = runner.clone();
        async move { (*runner)(req).await }
    };
    let action =
        ActionBuilder::new(ActionType::Indexer, format!("{}/{}", provider, name), body).build();
    registry.register_action(action.clone())?;
    Ok(IndexerAction(action))
}

pub async fn retrieve(retriever: &RetrieverAction, request: RetrieverRequest) -> Result<RetrieverResponse> {
    retriever.call(request).await
}

pub async fn index(indexer: &IndexerAction, documents: Vec<Document>, options: Option<Value>) -> Result<()> {
    indexer.call(IndexerRequest { documents, options }).await
}

pub fn lookup_retriever(registry: &Registry, provider: &str, name: &str) -> Option<RetrieverAction> {
    registry
        .lookup::<RetrieverRequest, RetrieverResponse, ()>(
            ActionType::Retriever,
            &format!("{}/{}", provider, name),
        )
        .map(RetrieverAction)
}

pub fn lookup_indexer(registry: &Registry, provider: &str, name: &str) -> Option<IndexerAction> {
    registry
        .lookup::<IndexerRequest, (), ()>(ActionType::Indexer, &format!("{}/{}", provider, name))
        .map(IndexerAction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn indexed_documents_can_be_retrieved() {
        let registry = Registry::new();
        let store: Arc<Mutex<Vec<Document>>> = Arc::default();

        let sink = store.clone();
        let indexer = define_indexer(&registry, "mem", "menu", move |req: IndexerRequest| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().extend(req.documents);
                Ok(())
            }
        })
        .unwrap();

        let source = store.clone();
        define_retriever(&registry, "mem", "menu", move |req: RetrieverRequest| {
            let source = source.clone();
            async move {
                let query = req.query.text().to_lowercase();
                let documents = source
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|d| d.text().to_lowercase().contains(&query))
                    .cloned()
                    .collect();
                Ok(RetrieverResponse { documents })
            }
        })
        .unwrap();

        index(
            &indexer,
            vec![
                Document::from_text("Tomato soup", None),
                Document::from_text("Apple pie", None),
            ],
            None,
        )
        .await
        .unwrap();

        let retriever = lookup_retriever(&registry, "mem", "menu").unwrap();
        assert_eq!(retriever.key(), "/retriever/mem/menu");
        let resp = retrieve(&retriever, RetrieverRequest::from_text("soup"))
            .await
            .unwrap();
        assert_eq!(resp.documents.len(), 1);
        assert_eq!(resp.documents[0].text(), "Tomato soup");
        assert!(lookup_indexer(&registry, "mem", "menu").is_some());
    }
}

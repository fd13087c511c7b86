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


//! A small in-memory document store, exposed as `menuStore/menu` retriever
//! and indexer actions. Documents are ranked by how many query words they
//! contain.

use async_trait::async_trait;
use genkit::{
    define_indexer, define_retriever, lookup_indexer, lookup_retriever, Document, Error,
    IndexerAction, IndexerRequest, Plugin, Registry, Result, RetrieverAction, RetrieverRequest,
    RetrieverResponse, StatusCode,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

pub const PROVIDER: &str = "menuStore";
pub const NAME: &str = "menu";
const DEFAULT_K: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct RetrieverOptions {
    /// Number of documents to return.
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Clone, Default)]
pub struct MenuStore {
    documents: Arc<Mutex<Vec<Document>>>,
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl MenuStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Document>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, documents: Vec<Document>) {
        self.lock().extend(documents);
    }

    /// The `k` best matches for `query`, best first; ties keep insertion order.
    fn search(&self, query: &str, k: usize) -> Vec<Document> {
        let query = words(query);
        let documents = self.lock();
        let mut scored: Vec<(usize, &Document)> = documents
            .iter()
            .map(|doc| (words(&doc.text()).intersection(&query).count(), doc))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, doc)| doc.clone()).collect()
    }
}

#[async_trait]
impl Plugin for MenuStore {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn initialize(&self, registry: &Registry) -> Result<()> {
        let store = self.clone();
        define_retriever(registry, PROVIDER, NAME, move |req: RetrieverRequest| {
            let store = store.clone();
            async move {
                let options: RetrieverOptions = match req.options {
                    Some(options) => serde_json::from_value(options).map_err(|e| {
                        Error::new_user_facing(
                            StatusCode::InvalidArgument,
                            format!("invalid retriever options: {}", e),
                            None,
                        )
                    })?,
                    None => RetrieverOptions::default(),
                };
                let k = options.k.unwrap_or(DEFAULT_K);
                Ok(RetrieverResponse {
                    documents: store.search(&req.query.text(), k),
                })
            }
        })?;

        let store = self.clone();
        define_indexer(registry, PROVIDER, NAME, move |req: IndexerRequest| {
            let store = store.clone();
            async move {
                log::debug!("indexing {} documents", req.documents.len());
                store.add(req.documents);
                log::debug!("menu store holds {} documents", store.len());
                Ok(())
            }
        })?;
        Ok(())
    }
}

pub fn retriever(registry: &Registry) -> Result<RetrieverAction> {
    lookup_retriever(registry, PROVIDER, NAME).ok_or_else(not_initialized)
}

pub fn indexer(registry: &Registry) -> Result<IndexerAction> {
    lookup_indexer(registry, PROVIDER, NAME).ok_or_else(not_initialized)
}

fn not_initialized() -> Error {
    Error::new_user_facing(
        StatusCode::FailedPrecondition,
        "menu store plugin is not initialized",
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use genkit::{index, init_plugin, retrieve};
    use serde_json::json;

    #[tokio::test]
    async fn returns_the_best_matches_first() {
        let registry = Registry::new();
        let store = MenuStore::new();
        init_plugin(&registry, Arc::new(store.clone())).await.unwrap();

        let docs = ["Mushroom soup, creamy", "Apple pie", "Tomato soup with basil"]
            .into_iter()
            .map(|t| Document::from_text(t, None))
            .collect();
        index(&indexer(&registry).unwrap(), docs, None).await.unwrap();
        assert_eq!(store.len(), 3);

        let req = RetrieverRequest::from_text("tomato soup").with_options(json!({"k": 2}));
        let resp = retrieve(&retriever(&registry).unwrap(), req).await.unwrap();
        let texts: Vec<String> = resp.documents.iter().map(Document::text).collect();
        assert_eq!(texts, vec!["Tomato soup with basil", "Mushroom soup, creamy"]);
    }

    #[tokio::test]
    async fn rejects_bad_options() {
        let registry = Registry::new();
        init_plugin(&registry, Arc::new(MenuStore::new())).await.unwrap();
        let req = RetrieverRequest::from_text("soup").with_options(json!({"k": "many"}));
        let err = retrieve(&retriever(&registry).unwrap(), req).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }
}

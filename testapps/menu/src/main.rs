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


//! A restaurant assistant: menu items are indexed into a small in-memory
//! store and questions are answered by a local Ollama model.

mod s04;
mod store;
mod types;

use genkit::{Error, Genkit, GenkitOptions, Result};
use genkit_ollama::{Config, ModelDefinition};
use std::sync::Arc;

const MODEL: &str = "llama3.2";

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = genkit::logging::init() {
        eprintln!("logger already installed: {}", e);
    }
    let genkit = Genkit::init(GenkitOptions {
        plugins: vec![Arc::new(store::MenuStore::new())],
        default_model: Some(format!("{}/{}", genkit_ollama::PROVIDER, MODEL)),
    })
    .await?;

    let ollama = genkit_ollama::init(genkit.registry(), Config::default()).await?;
    let model = ollama.define_model(ModelDefinition::chat(MODEL), None)?;
    s04::setup04(&genkit, model)?;

    let server = genkit.start_server(None).await?;
    log::info!("listening on {}", server.address());
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::with_source("waiting for ctrl-c", e))?;
    server.stop().await
}

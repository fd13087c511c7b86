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


//! # HTTP servers
//!
//! Serves a registry over HTTP/1 with hyper. Two route sets exist:
//!
//! * [`ServerMode::Reflection`]: the developer API used by the Genkit tooling
//!   (`/api/actions`, `/api/runAction`, traces). See [`crate::reflection`].
//! * [`ServerMode::Flows`]: one `POST /{flowName}` endpoint per flow, taking
//!   `{"data": input}` and answering `{"result": output}`.
//!
//! With `?stream=true` both stream newline-delimited JSON: one
//! `{"message": chunk}` line per chunk, then a final `{"result": ...}` or
//! `{"error": ...}` line.

use crate::action::StreamingCallback;
use crate::async_utils::channel;
use crate::context::ActionContext;
use crate::error::{Error, Result};
use crate::registry::{ActionType, ErasedAction, Registry};
use crate::status::{Status, StatusCode};
use crate::tracing::exporter::LocalTraceStore;
use futures::StreamExt;
use http_body_util::{BodyExt, Full, Limited, StreamBody};
use hyper::body::{Body, Bytes, Frame, Incoming};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub(crate) type BoxBody = Pin<Box<dyn Body<Data = Bytes, Error = Infallible> + Send + 'static>>;

pub const DEFAULT_REFLECTION_PORT: u16 = 3100;
pub const DEFAULT_FLOW_PORT: u16 = 3400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Reflection,
    Flows,
}

impl ServerMode {
    pub fn default_port(self) -> u16 {
        match self {
            ServerMode::Reflection => DEFAULT_REFLECTION_PORT,
            ServerMode::Flows => DEFAULT_FLOW_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub mode: ServerMode,
    pub host: IpAddr,
    /// `None` uses the mode's default port; `Some(0)` picks a free one.
    pub port: Option<u16>,
    pub body_limit: usize,
    /// Environments reported by `/api/envs`.
    pub configured_envs: Vec<String>,
    /// Trace source for `/api/envs/{env}/traces`.
    pub trace_store: Option<LocalTraceStore>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            mode: ServerMode::Flows,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: None,
            body_limit: 30 * 1024 * 1024,
            configured_envs: vec!["dev".to_string()],
            trace_store: None,
        }
    }
}

impl ServerOptions {
    pub fn reflection(trace_store: Option<LocalTraceStore>) -> Self {
        Self {
            mode: ServerMode::Reflection,
            trace_store,
            ..Default::default()
        }
    }

    pub fn flows() -> Self {
        Self::default()
    }
}

type ShutdownSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

fn trigger(shutdown: &ShutdownSlot) {
    if let Some(tx) = shutdown
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        let _ = tx.send(());
    }
}

pub(crate) struct ServerState {
    pub(crate) registry: Registry,
    pub(crate) options: ServerOptions,
    shutdown: ShutdownSlot,
}

impl ServerState {
    pub(crate) fn shutdown(&self) {
        trigger(&self.shutdown);
    }
}

/// A running server.
pub struct ServerHandle {
    pub port: u16,
    shutdown: ShutdownSlot,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn address(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    pub async fn stop(self) -> Result<()> {
        trigger(&self.shutdown);
        self.task
            .await
            .map_err(|e| Error::with_source("server task failed", e))
    }
}

/// Binds and serves `registry` until the handle is stopped.
pub async fn start(registry: Registry, options: ServerOptions) -> Result<ServerHandle> {
    let port = options.port.unwrap_or(options.mode.default_port());
    let addr = SocketAddr::new(options.host, port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::with_source(format!("failed to bind {}", addr), e))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::with_source("failed to read bound address", e))?
        .port();

    let (tx, mut shutdown_rx) = oneshot::channel::<()>();
    let shutdown: ShutdownSlot = Arc::new(Mutex::new(Some(tx)));
    let mode = options.mode;
    let state = Arc::new(ServerState {
        registry,
        options,
        shutdown: shutdown.clone(),
    });

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            log::warn!("failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let state = state.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| handle(req, state.clone()));
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            log::debug!("connection error: {}", e);
                        }
                    });
                }
                _ = &mut shutdown_rx => break,
            }
        }
        log::info!("server on port {} stopped", port);
    });

    log::info!("{:?} server listening on http://{}:{}", mode, addr.ip(), port);
    Ok(ServerHandle {
        port,
        shutdown,
        task,
    })
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> std::result::Result<Response<BoxBody>, Infallible> {
    let response = match state.options.mode {
        ServerMode::Reflection => crate::reflection::route(req, &state).await,
        ServerMode::Flows => route_flow(req, &state).await,
    };
    Ok(response.unwrap_or_else(|e| error_response(&e)))
}

#[derive(Deserialize)]
struct FlowRequest {
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct FlowResponse {
    result: Value,
}

async fn route_flow(req: Request<Incoming>, state: &ServerState) -> Result<Response<BoxBody>> {
    let name = req.uri().path().trim_start_matches('/').to_string();
    if req.method() != Method::POST || name.is_empty() {
        return Err(not_found());
    }
    let action = state
        .registry
        .lookup_action(&format!("/{}/{}", ActionType::Flow.as_str(), name))
        .ok_or_else(not_found)?;

    let stream = wants_stream(&req);
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body: FlowRequest = read_json(req, state.options.body_limit).await?;

    let context = match action.auth() {
        Some(auth) => Some(auth.provide_auth_context(auth_header.as_deref()).await?),
        None => None,
    };

    if stream {
        return Ok(streaming_response(action, body.data, context));
    }
    let out = action.run_json(body.data, context, None).await?;
    Ok(json_response(&FlowResponse { result: out.result }))
}

pub(crate) fn wants_stream<B>(req: &Request<B>) -> bool {
    req.uri()
        .query()
        .is_some_and(|q| q.split('&').any(|kv| kv == "stream=true"))
}

/// Runs `action` on a task and streams its chunks as NDJSON.
pub(crate) fn streaming_response(
    action: Arc<dyn ErasedAction>,
    input: Value,
    context: Option<ActionContext>,
) -> Response<BoxBody> {
    let (tx, rx) = channel::<Value>();
    let sender = tx.clone();
    let on_chunk: StreamingCallback<Value> =
        Arc::new(move |chunk: Value| sender.send(json!({ "message": chunk })));

    // Cancelled when the response body is dropped, e.g. on disconnect.
    let abort = CancellationToken::new();
    let guard = abort.clone().drop_guard();

    tokio::spawn(async move {
        let last = tokio::select! {
            out = action.run_json(input, context, Some(on_chunk)) => match out {
                Ok(out) => json!({ "result": out.result, "telemetry": out.telemetry }),
                Err(e) => json!({ "error": e.as_status() }),
            },
            _ = abort.cancelled() => {
                log::debug!("stream of {} dropped, stopping the action", action.name());
                return;
            }
        };
        let _ = tx.send(last);
        tx.close();
    });

    let frames = rx.map(move |line| {
        let _guard = &guard;
        let line = line.unwrap_or_else(|e| json!({ "error": e.as_status() }));
        Ok::<_, Infallible>(Frame::data(Bytes::from(format!("{}\n", line))))
    });
    let mut response = Response::new(Box::pin(StreamBody::new(frames)) as BoxBody);
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson"),
    );
    response
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
    limit: usize,
) -> Result<T> {
    let bytes = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| {
            Error::new_user_facing(
                StatusCode::InvalidArgument,
                format!("failed to read body: {}", e),
                None,
            )
        })?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::new_user_facing(
            StatusCode::InvalidArgument,
            format!("invalid request body: {}", e),
            None,
        )
    })
}

pub(crate) fn full_body(body: impl Into<Bytes>) -> BoxBody {
    Box::pin(Full::new(body.into()).map_err(|never| match never {}))
}

pub(crate) fn text_response(body: &'static str) -> Response<BoxBody> {
    Response::new(full_body(body))
}

pub(crate) fn json_response<T: Serialize>(data: &T) -> Response<BoxBody> {
    match serde_json::to_vec(data) {
        Ok(json) => with_status(full_body(json), 200),
        Err(e) => error_response(&Error::from(e)),
    }
}

fn with_status(body: BoxBody, status: u16) -> Response<BoxBody> {
    let mut response = Response::new(body);
    *response.status_mut() =
        hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub(crate) fn error_response(err: &Error) -> Response<BoxBody> {
    if let Error::Internal { .. } = err {
        log::error!("request failed: {}", err);
    }
    let status: Status = err.as_status();
    let body = json!({ "error": status }).to_string();
    with_status(full_body(body), err.http_status())
}

pub(crate) fn not_found() -> Error {
    Error::new_user_facing(StatusCode::NotFound, "Not Found", None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionBuilder, ActionFnArg};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn dropped_stream_stops_the_action() {
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = sent.clone();
        let ticker = ActionBuilder::new(
            ActionType::Flow,
            "ticker",
            move |_: (), args: ActionFnArg<u32>| {
                let counter = counter.clone();
                async move {
                    for i in 0..1000u32 {
                        args.send_chunk(i)?;
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    Ok(())
                }
            },
        )
        .build();

        let response = streaming_response(Arc::new(ticker), Value::Null, None);
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(response);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stopped_at = sent.load(Ordering::SeqCst);
        assert!(stopped_at > 0);
        assert!(stopped_at < 1000);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.load(Ordering::SeqCst), stopped_at);
    }
}

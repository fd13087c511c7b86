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

//! # Callback-to-stream bridge
//!
//! Actions report partial results through a synchronous callback. [`channel`]
//! turns that callback into an async [`Stream`] for callers that prefer to
//! consume chunks with `StreamExt`.

use crate::error::{Error, Result};
use crate::status::StatusCode;
use futures::stream::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

struct ChannelState<T> {
    buffer: VecDeque<T>,
    closed: bool,
    error: Option<Error>,
    waker: Option<Waker>,
}

type Shared<T> = Arc<Mutex<ChannelState<T>>>;

fn lock<T>(state: &Shared<T>) -> MutexGuard<'_, ChannelState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The sending half. Cloning yields another handle to the same channel.
pub struct Channel<T> {
    state: Shared<T>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// The receiving half: yields buffered values in send order, then the error
/// (if any), then ends. Dropping it closes the channel.
pub struct ChannelStream<T> {
    state: Shared<T>,
}

pub fn channel<T>() -> (Channel<T>, ChannelStream<T>) {
    let state = Arc::new(Mutex::new(ChannelState {
        buffer: VecDeque::new(),
        closed: false,
        error: None,
        waker: None,
    }));
    (
        Channel {
            state: state.clone(),
        },
        ChannelStream { state },
    )
}

impl<T> Channel<T> {
    /// Buffers `value`. Fails once the channel is closed.
    pub fn send(&self, value: T) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(Error::new_user_facing(
                StatusCode::FailedPrecondition,
                "send on a closed channel",
                None,
            ));
        }
        state.buffer.push_back(value);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
        Ok(())
    }

    pub fn close(&self) {
        self.finish(None);
    }

    /// Closes the channel; the stream yields `err` after the buffered values.
    pub fn error(&self, err: Error) {
        self.finish(Some(err));
    }

    fn finish(&self, err: Option<Error>) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        state.closed = true;
        state.error = err;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }
}

impl<T> Stream for ChannelStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut state = lock(&self.state);
        if let Some(value) = state.buffer.pop_front() {
            return Poll::Ready(Some(Ok(value)));
        }
        if let Some(err) = state.error.take() {
            return Poll::Ready(Some(Err(err)));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for ChannelStream<T> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.buffer.clear();
    }
}

// Quill - Narrative Script Language Server
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-document throttle and debounce.
//!
//! Each uri gets its own task fed by an unbounded channel, the same shape as
//! a per-document debounce loop: signals are cheap, the task decides when the
//! action actually runs.
//!
//! - **Throttle** runs the action on the first signal, then at most once per
//!   interval while signals keep arriving (trailing call included), so a user
//!   who keeps typing still gets interim results.
//! - **Debounce** runs the action once, after the signals have been quiet for
//!   a whole interval.
//!
//! The action is awaited inside the task. Cancelling a uri closes its
//! channel: a waiting task exits without running, a running action finishes
//! first. Actions are never aborted midway.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tower_lsp::lsp_types::Url;
use tracing::{debug, trace};

/// Boxed future returned by a rate-limited action.
pub type ActionFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Work run for a uri once the limiter lets it through.
pub type Action = Arc<dyn Fn(Url) -> ActionFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Throttle,
    Debounce,
}

pub struct RateLimiter {
    mode: Mode,
    interval: Duration,
    action: Action,
    channels: DashMap<Url, mpsc::UnboundedSender<()>>,
}

impl RateLimiter {
    pub fn throttle(interval: Duration, action: Action) -> Self {
        Self::new(Mode::Throttle, interval, action)
    }

    pub fn debounce(interval: Duration, action: Action) -> Self {
        Self::new(Mode::Debounce, interval, action)
    }

    fn new(mode: Mode, interval: Duration, action: Action) -> Self {
        Self {
            mode,
            interval,
            action,
            channels: DashMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal that `uri` wants the action. Must be called inside a tokio
    /// runtime.
    pub fn trigger(&self, uri: &Url) {
        let tx = self
            .channels
            .entry(uri.clone())
            .or_insert_with(|| self.spawn(uri.clone()))
            .clone();
        if tx.send(()).is_err() {
            // the task is gone; start a fresh one
            let tx = self.spawn(uri.clone());
            let _ = tx.send(());
            self.channels.insert(uri.clone(), tx);
        }
    }

    /// Stop limiting `uri`, dropping any call that has not started yet.
    pub fn cancel(&self, uri: &Url) -> bool {
        self.channels.remove(uri).is_some()
    }

    pub fn cancel_all(&self) {
        self.channels.clear();
    }

    /// Number of uris with a live task.
    pub fn active_count(&self) -> usize {
        self.channels.len()
    }

    fn spawn(&self, uri: Url) -> mpsc::UnboundedSender<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let action = Arc::clone(&self.action);
        let interval = self.interval;
        trace!("Starting {:?} task for {}", self.mode, uri);
        match self.mode {
            Mode::Throttle => tokio::spawn(throttle_loop(uri, interval, action, rx)),
            Mode::Debounce => tokio::spawn(debounce_loop(uri, interval, action, rx)),
        };
        tx
    }
}

async fn throttle_loop(
    uri: Url,
    interval: Duration,
    action: Action,
    mut rx: mpsc::UnboundedReceiver<()>,
) {
    while rx.recv().await.is_some() {
        action(uri.clone()).await;
        loop {
            sleep(interval).await;
            let mut pending = false;
            while rx.try_recv().is_ok() {
                pending = true;
            }
            if !pending {
                break;
            }
            trace!("Throttled trailing call for {}", uri);
            action(uri.clone()).await;
        }
    }
    debug!("Throttle task for {} stopped", uri);
}

async fn debounce_loop(
    uri: Url,
    interval: Duration,
    action: Action,
    mut rx: mpsc::UnboundedReceiver<()>,
) {
    while rx.recv().await.is_some() {
        loop {
            tokio::select! {
                _ = sleep(interval) => break,
                signal = rx.recv() => {
                    if signal.is_none() {
                        debug!("Debounce task for {} cancelled", uri);
                        return;
                    }
                }
            }
        }
        action(uri.clone()).await;
    }
    debug!("Debounce task for {} stopped", uri);
}

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

//! Request/response correlation with a compiler worker.
//!
//! # Design
//!
//! [`RpcChannel`] owns the host end of a transport. Every request gets a
//! fresh id and a `oneshot` slot in the pending table; a background reader
//! task settles the slot whose id matches each response. Progress messages
//! (`<method>/progress` with the request's id) go to the callback supplied
//! with the request and never settle it.
//!
//! Until the worker sends its one-time `ready` notification, outgoing
//! messages are queued; the queue is flushed in issuance order when `ready`
//! arrives. After that, requests may complete in any order.
//!
//! # Failure Modes
//!
//! - **Timeout**: with a configured timeout, an unanswered request is
//!   removed from the pending table and fails with [`RpcError::Timeout`].
//! - **Cancellation**: dropping a request future removes its pending entry
//!   (and its queued message if it was never sent). A late response is
//!   discarded.
//! - **Disconnect**: when the worker's channel closes, every pending request
//!   fails with [`RpcError::Disconnected`], as does every later request.

use crate::constants::METHOD_NOT_FOUND;
use crate::error::RpcError;
use crate::protocol::{Message, RequestId, READY};
use crate::transport::HostEnd;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Receives the `value` of each progress message for a request.
pub type ProgressCallback = Arc<dyn Fn(Value) + Send + Sync>;

struct Pending {
    method: String,
    reply: oneshot::Sender<Result<Value, RpcError>>,
    progress: Option<ProgressCallback>,
}

#[derive(Default)]
struct State {
    ready: bool,
    closed: bool,
    queue: Vec<Message>,
    pending: HashMap<RequestId, Pending>,
}

struct Shared {
    state: Mutex<State>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl Shared {
    /// Send now if the worker is ready, queue otherwise.
    fn dispatch(&self, state: &mut State, message: Message) -> Result<(), RpcError> {
        if state.ready {
            self.outgoing
                .send(message)
                .map_err(|_| RpcError::Disconnected)
        } else {
            state.queue.push(message);
            Ok(())
        }
    }

    fn mark_ready(&self) {
        let mut state = self.state.lock();
        if state.ready {
            debug!("Duplicate ready notification from compiler ignored");
            return;
        }
        state.ready = true;
        let queued = std::mem::take(&mut state.queue);
        debug!("Compiler ready, flushing {} queued messages", queued.len());
        for message in queued {
            let id = message.id();
            if self.outgoing.send(message).is_err() {
                if let Some(pending) = id.and_then(|id| state.pending.remove(&id)) {
                    let _ = pending.reply.send(Err(RpcError::Disconnected));
                }
            }
        }
    }

    fn settle(&self, id: RequestId, outcome: Result<Value, RpcError>) {
        let pending = self.state.lock().pending.remove(&id);
        match pending {
            Some(pending) => {
                trace!(
                    "Request {} ({}) settled: {}",
                    id,
                    pending.method,
                    if outcome.is_ok() { "ok" } else { "error" }
                );
                // the caller may have gone away in the meantime
                let _ = pending.reply.send(outcome);
            }
            None => debug!("Dropping response for unknown or withdrawn request {}", id),
        }
    }

    fn progress(&self, id: RequestId, value: Value) {
        let callback = self
            .state
            .lock()
            .pending
            .get(&id)
            .and_then(|pending| pending.progress.clone());
        match callback {
            Some(callback) => callback(value),
            None => trace!("Progress for request {} has no listener", id),
        }
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queue.clear();
        let pending: Vec<_> = state.pending.drain().collect();
        if !pending.is_empty() {
            warn!(
                "Compiler disconnected with {} pending requests",
                pending.len()
            );
        }
        for (_, pending) in pending {
            let _ = pending.reply.send(Err(RpcError::Disconnected));
        }
    }
}

/// Removes a request's bookkeeping when its future completes or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if state.pending.remove(&self.id).is_some() {
            debug!("Request {} withdrawn before a response arrived", self.id);
        }
        let id = self.id;
        state.queue.retain(|message| message.id() != Some(id));
    }
}

/// Correlates requests and responses over a worker transport.
pub struct RpcChannel {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    timeout: Option<Duration>,
    reader: JoinHandle<()>,
}

impl RpcChannel {
    /// Channel without a request timeout. Must be called inside a tokio
    /// runtime: the reader task is spawned immediately.
    pub fn new(host: HostEnd) -> Self {
        Self::with_timeout(host, None)
    }

    /// Channel whose requests fail after `timeout` without a response.
    pub fn with_timeout(host: HostEnd, timeout: Option<Duration>) -> Self {
        let HostEnd { outgoing, incoming } = host;
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            outgoing,
        });
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), incoming));
        Self {
            shared,
            next_id: AtomicU64::new(1),
            timeout,
            reader,
        }
    }

    /// Whether the worker has signalled readiness.
    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().ready
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of messages held back until the worker is ready.
    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.request_with_progress(method, params, None).await
    }

    /// Send a request, streaming its progress values to `progress`.
    pub async fn request_with_progress(
        &self,
        method: &str,
        params: Value,
        progress: Option<ProgressCallback>,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(RpcError::Disconnected);
            }
            state.pending.insert(
                id,
                Pending {
                    method: method.to_string(),
                    reply,
                    progress,
                },
            );
            let message = Message::Request {
                id,
                method: method.to_string(),
                params,
            };
            if let Err(e) = self.shared.dispatch(&mut state, message) {
                state.pending.remove(&id);
                return Err(e);
            }
        }
        trace!("Request {} ({}) issued", id, method);
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, response).await {
                Ok(received) => received,
                Err(_) => {
                    warn!("Request {} ({}) timed out after {:?}", id, method, limit);
                    return Err(RpcError::Timeout {
                        method: method.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => response.await,
        };
        received.unwrap_or(Err(RpcError::Cancelled))
    }

    /// Send a notification (no response expected). Queued like requests
    /// until the worker is ready, so it keeps its place relative to them.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(RpcError::Disconnected);
        }
        self.shared
            .dispatch(&mut state, Message::notification(method, params))
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(shared: Arc<Shared>, mut incoming: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = incoming.recv().await {
        match message {
            Message::Notification { method, .. } if method == READY => shared.mark_ready(),
            Message::Notification { method, .. } => {
                debug!("Ignoring compiler notification: {}", method)
            }
            Message::Response { id, result, error } => {
                let outcome = match error {
                    Some(error) => Err(RpcError::Remote {
                        code: error.code,
                        message: error.message,
                    }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                shared.settle(id, outcome);
            }
            Message::Progress { id, value, .. } => shared.progress(id, value),
            Message::Request { id, method, .. } => {
                warn!("Compiler sent unsupported request: {}", method);
                let _ = shared.outgoing.send(Message::failure(
                    id,
                    METHOD_NOT_FOUND,
                    format!("unsupported method: {}", method),
                ));
            }
        }
    }
    shared.disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::progress_method;
    use crate::transport::{channel_pair, WorkerEnd};
    use serde_json::json;

    fn ready(worker: &WorkerEnd) {
        worker
            .outgoing
            .send(Message::notification(READY, Value::Null))
            .unwrap();
    }

    fn request_parts(message: Message) -> (RequestId, String, Value) {
        match message {
            Message::Request { id, method, params } => (id, method, params),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_are_held_until_ready() {
        let (host, mut worker) = channel_pair();
        let channel = RpcChannel::new(host);

        let worker_side = async {
            tokio::task::yield_now().await;
            assert!(!channel.is_ready());
            assert_eq!(channel.queued_count(), 2);
            assert!(worker.incoming.try_recv().is_err());

            ready(&worker);
            let (first, method_a, _) = request_parts(worker.incoming.recv().await.unwrap());
            let (second, method_b, _) = request_parts(worker.incoming.recv().await.unwrap());
            assert_eq!((method_a.as_str(), method_b.as_str()), ("a", "b"));

            // answer out of order
            worker.outgoing.send(Message::success(second, json!("B"))).unwrap();
            worker.outgoing.send(Message::success(first, json!("A"))).unwrap();
        };

        let (a, b, ()) = tokio::join!(
            channel.request("a", json!(1)),
            channel.request("b", json!(2)),
            worker_side
        );
        assert_eq!(a.unwrap(), json!("A"));
        assert_eq!(b.unwrap(), json!("B"));
        assert!(channel.is_ready());
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_rejects() {
        let (host, mut worker) = channel_pair();
        let channel = RpcChannel::new(host);
        ready(&worker);

        let worker_side = async {
            let (id, _, _) = request_parts(worker.incoming.recv().await.unwrap());
            worker
                .outgoing
                .send(Message::failure(id, -32602, "unknown document"))
                .unwrap();
        };
        let (result, ()) = tokio::join!(channel.request("compile", Value::Null), worker_side);
        match result {
            Err(RpcError::Remote { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "unknown document");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_streams_without_settling() {
        let (host, mut worker) = channel_pair();
        let channel = RpcChannel::new(host);
        ready(&worker);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |value| sink.lock().push(value));

        let worker_side = async {
            let (id, method, _) = request_parts(worker.incoming.recv().await.unwrap());
            for step in 1..=2 {
                worker
                    .outgoing
                    .send(Message::Progress {
                        id,
                        method: progress_method(&method),
                        value: json!(step),
                    })
                    .unwrap();
            }
            worker.outgoing.send(Message::success(id, json!("done"))).unwrap();
        };
        let (result, ()) = tokio::join!(
            channel.request_with_progress("compile", Value::Null, Some(callback)),
            worker_side
        );
        assert_eq!(result.unwrap(), json!("done"));
        assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_pending() {
        let (host, mut worker) = channel_pair();
        let channel = RpcChannel::with_timeout(host, Some(Duration::from_millis(500)));
        ready(&worker);

        let result = channel.request("compile", Value::Null).await;
        assert!(matches!(
            result,
            Err(RpcError::Timeout { timeout_ms: 500, .. })
        ));
        assert_eq!(channel.pending_count(), 0);

        // a late answer is discarded quietly
        let (id, _, _) = request_parts(worker.incoming.recv().await.unwrap());
        worker.outgoing.send(Message::success(id, Value::Null)).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_is_withdrawn() {
        let (host, _worker) = channel_pair();
        let channel = RpcChannel::new(host);

        // never ready: the request sits in the queue
        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            channel.request("compile", Value::Null),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(channel.pending_count(), 0);
        assert_eq!(channel.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_rejects_pending_and_later_requests() {
        let (host, mut worker) = channel_pair();
        let channel = RpcChannel::new(host);
        ready(&worker);

        let worker_side = async move {
            let _ = worker.incoming.recv().await;
            drop(worker);
        };
        let (result, ()) = tokio::join!(channel.request("compile", Value::Null), worker_side);
        assert!(matches!(result, Err(RpcError::Disconnected)));

        let later = channel.request("compile", Value::Null).await;
        assert!(matches!(later, Err(RpcError::Disconnected)));
        assert!(channel.notify("compiler/didClose", Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_notifications_keep_their_place() {
        let (host, mut worker) = channel_pair();
        let channel = RpcChannel::new(host);
        channel.notify("first", Value::Null).unwrap();
        channel.notify("second", Value::Null).unwrap();
        ready(&worker);

        let a = worker.incoming.recv().await.unwrap();
        let b = worker.incoming.recv().await.unwrap();
        assert_eq!(a, Message::notification("first", Value::Null));
        assert_eq!(b, Message::notification("second", Value::Null));
    }
}

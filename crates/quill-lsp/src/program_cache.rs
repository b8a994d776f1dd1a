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

//! Per-document compiled program state.
//!
//! One [`ProgramState`] per uri records the last program that covered the
//! document, the version being compiled right now, and the version the last
//! program actually reflects. Callers that arrive while a compile for their
//! uri is in flight queue a continuation instead of issuing another compile.
//!
//! # Staleness
//!
//! A cached program is only trusted when no tracked document's compiled
//! version differs from its live version. Edits anywhere in a multi-file
//! project can invalidate a program that looks fresh for one uri, so the
//! check covers every tracked document.
//!
//! # Thread Safety
//!
//! All bookkeeping sits behind one `parking_lot::Mutex`. The lock is never
//! held across an `.await`; every decision is a short synchronous section.

use crate::error::CompileError;
use crate::protocol::Program;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_lsp::lsp_types::Url;
use tracing::debug;

/// Outcome delivered to callers waiting on an in-flight compile.
pub type CompileOutcome = Result<Arc<Program>, CompileError>;

/// Compiled state of one document.
#[derive(Debug, Clone, Default)]
pub struct ProgramState {
    /// Last program that covered this document.
    pub program: Option<Arc<Program>>,
    /// Version currently being compiled.
    pub compiling_program_version: Option<i32>,
    /// Version of this document reflected in `program`.
    pub compiled_program_version: Option<i32>,
}

/// What a `compile` call should do.
#[derive(Debug)]
pub enum Plan {
    /// Nothing changed; use this program.
    Cached(Arc<Program>),
    /// A compile covering this version is already running; wait for it.
    Join(oneshot::Receiver<CompileOutcome>),
    /// This caller owns a new compile.
    Compile,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Calls answered from the cache.
    pub hits: u64,
    /// Calls that started a compile.
    pub compiles: u64,
    /// Calls that joined an in-flight compile.
    pub joins: u64,
    /// Compiles that failed and were abandoned.
    pub failures: u64,
}

#[derive(Default)]
struct Inner {
    states: HashMap<Url, ProgramState>,
    continuations: HashMap<Url, Vec<oneshot::Sender<CompileOutcome>>>,
    stats: CacheStatistics,
}

impl Inner {
    fn settle(&mut self, uri: &Url, program: &Arc<Program>) {
        let state = self.states.entry(uri.clone()).or_default();
        state.program = Some(Arc::clone(program));
        state.compiling_program_version = None;
        state.compiled_program_version = program.version_of(uri);

        if let Some(waiters) = self.continuations.remove(uri) {
            debug!("Resolving {} waiters for {}", waiters.len(), uri);
            for waiter in waiters {
                let _ = waiter.send(Ok(Arc::clone(program)));
            }
        }
    }

    fn reject(&mut self, uri: &Url) -> usize {
        let waiters = self.continuations.remove(uri).unwrap_or_default();
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Err(CompileError::Abandoned {
                uri: uri.to_string(),
            }));
        }
        count
    }
}

/// Program state for every document, plus continuation queues.
#[derive(Default)]
pub struct ProgramCache {
    inner: Mutex<Inner>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any of the given live `(uri, version)` pairs differs from its
    /// compiled version. A document that was never compiled counts as changed.
    pub fn any_changed(&self, live: &[(Url, i32)]) -> bool {
        let inner = self.inner.lock();
        live.iter().any(|(uri, version)| {
            inner
                .states
                .get(uri)
                .and_then(|state| state.compiled_program_version)
                != Some(*version)
        })
    }

    /// Decide how a compile of `uri` at live `version` proceeds.
    ///
    /// Returning [`Plan::Compile`] marks the uri as compiling; the caller must
    /// follow up with [`complete`](Self::complete) or
    /// [`abandon`](Self::abandon).
    pub fn plan(&self, uri: &Url, version: i32, force: bool, any_changed: bool) -> Plan {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let state = inner.states.entry(uri.clone()).or_default();

        if !force && !any_changed {
            if let Some(program) = state.program.clone() {
                inner.stats.hits += 1;
                debug!("Program cache hit for {} (version {})", uri, version);
                return Plan::Cached(program);
            }
        }

        if !force && state.compiling_program_version.is_some_and(|v| v >= version) {
            let (tx, rx) = oneshot::channel();
            inner.continuations.entry(uri.clone()).or_default().push(tx);
            inner.stats.joins += 1;
            debug!("Joining in-flight compile for {} (version {})", uri, version);
            return Plan::Join(rx);
        }

        state.compiling_program_version = Some(version);
        inner.stats.compiles += 1;
        debug!("Starting compile for {} (version {})", uri, version);
        Plan::Compile
    }

    /// Record a finished compile.
    ///
    /// Every script in `program` for which `tracked` holds gets its state
    /// updated and its waiters resolved. `requested` is always settled, even
    /// when it is not tracked or not covered. Returns the settled uris.
    pub fn complete<F>(&self, program: &Arc<Program>, requested: Option<&Url>, tracked: F) -> Vec<Url>
    where
        F: Fn(&Url) -> bool,
    {
        let mut inner = self.inner.lock();
        let mut settled = Vec::new();
        for uri in program.scripts.keys() {
            if requested == Some(uri) || tracked(uri) {
                inner.settle(uri, program);
                settled.push(uri.clone());
            }
        }
        if let Some(uri) = requested {
            if !settled.contains(uri) {
                inner.settle(uri, program);
                settled.push(uri.clone());
            }
        }
        settled
    }

    /// Give up on the in-flight compile of `uri`: clear its mark and reject
    /// its waiters. Returns the number of rejected waiters.
    pub fn abandon(&self, uri: &Url) -> usize {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.states.get_mut(uri) {
            state.compiling_program_version = None;
        }
        inner.stats.failures += 1;
        inner.reject(uri)
    }

    /// Purge all state for `uri`. Pending waiters are rejected.
    pub fn remove(&self, uri: &Url) -> bool {
        let mut inner = self.inner.lock();
        inner.reject(uri);
        inner.states.remove(uri).is_some()
    }

    /// Drop every state and reject every waiter.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let uris: Vec<Url> = inner.continuations.keys().cloned().collect();
        for uri in &uris {
            inner.reject(uri);
        }
        inner.states.clear();
    }

    pub fn program(&self, uri: &Url) -> Option<Arc<Program>> {
        self.inner.lock().states.get(uri)?.program.clone()
    }

    pub fn state(&self, uri: &Url) -> Option<ProgramState> {
        self.inner.lock().states.get(uri).cloned()
    }

    pub fn compiled_version(&self, uri: &Url) -> Option<i32> {
        self.inner.lock().states.get(uri)?.compiled_program_version
    }

    pub fn compiling_version(&self, uri: &Url) -> Option<i32> {
        self.inner.lock().states.get(uri)?.compiling_program_version
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.inner.lock().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

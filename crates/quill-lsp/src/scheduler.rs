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

//! Compile orchestration.
//!
//! [`CompileScheduler::compile`] turns "this document changed" into at most
//! one compiler call per document at a time:
//!
//! 1. Unknown documents yield `Ok(None)`.
//! 2. The cache decides between a hit, joining an in-flight compile, or a
//!    new compile (see [`ProgramCache::plan`]).
//! 3. A new compile finds the document's main script by walking parent
//!    directories, compiles it, and settles every tracked script it pulled
//!    in.
//! 4. A document the main program does not cover is compiled on its own.
//! 5. Diagnostics are published for every affected script.
//!
//! A failing compiler call propagates to the caller that issued it. Callers
//! that joined it are rejected with [`CompileError::Abandoned`]; nothing is
//! retried here.

use crate::compiler::CompilerService;
use crate::constants::MAX_MAIN_SCRIPT_DEPTH;
use crate::document_store::DocumentStore;
use crate::error::CompileError;
use crate::program_cache::{Plan, ProgramCache};
use crate::protocol::Program;
use crate::workspace::WorkspaceIndex;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tower_lsp::lsp_types::{Diagnostic, Url};
use tower_lsp::Client;
use tracing::{debug, info};

/// Where diagnostics go.
#[async_trait]
pub trait DiagnosticsPublisher: Send + Sync {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>);
}

#[async_trait]
impl DiagnosticsPublisher for Client {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.publish_diagnostics(uri, diagnostics, version).await;
    }
}

/// Resolve `path` relative to the script at `root`.
pub fn resolve(root: &Url, path: &str) -> Option<Url> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    root.join(path).ok()
}

/// Drives compiles for open documents.
pub struct CompileScheduler {
    store: Arc<DocumentStore>,
    workspace: Arc<WorkspaceIndex>,
    cache: Arc<ProgramCache>,
    compiler: Arc<dyn CompilerService>,
    publisher: Arc<dyn DiagnosticsPublisher>,
    main_script_names: Vec<String>,
}

impl CompileScheduler {
    pub fn new(
        store: Arc<DocumentStore>,
        workspace: Arc<WorkspaceIndex>,
        cache: Arc<ProgramCache>,
        compiler: Arc<dyn CompilerService>,
        publisher: Arc<dyn DiagnosticsPublisher>,
        main_script_names: Vec<String>,
    ) -> Self {
        Self {
            store,
            workspace,
            cache,
            compiler,
            publisher,
            main_script_names,
        }
    }

    pub fn cache(&self) -> &Arc<ProgramCache> {
        &self.cache
    }

    /// Compile `uri`, reusing cached or in-flight work unless `force` is set.
    pub async fn compile(&self, uri: &Url, force: bool) -> Result<Option<Arc<Program>>, CompileError> {
        let Some(version) = self.store.version(uri) else {
            debug!("Compile skipped, document not open: {}", uri);
            return Ok(None);
        };

        let any_changed = self.cache.any_changed(&self.store.versions());
        match self.cache.plan(uri, version, force, any_changed) {
            Plan::Cached(program) => return Ok(Some(program)),
            Plan::Join(waiter) => {
                return match waiter.await {
                    Ok(outcome) => outcome.map(Some),
                    Err(_) => Err(CompileError::Abandoned {
                        uri: uri.to_string(),
                    }),
                };
            }
            Plan::Compile => {}
        }

        match self.run(uri).await {
            Ok(program) => Ok(Some(program)),
            Err(e) => {
                let rejected = self.cache.abandon(uri);
                debug!("Compile of {} failed ({} waiters rejected): {}", uri, rejected, e);
                Err(e)
            }
        }
    }

    async fn run(&self, uri: &Url) -> Result<Arc<Program>, CompileError> {
        let tracked = |script: &Url| self.store.contains(script);
        let mut compiled: Vec<Arc<Program>> = Vec::new();
        let mut covering = None;

        if let Some(main) = self.find_main_script(uri) {
            debug!("Main script for {} is {}", uri, main);
            let program = Arc::new(self.compiler.compile(&main).await?);
            // the document may have closed while the compiler was busy
            let covers = program.covers(uri) && self.store.contains(uri);
            self.cache.complete(&program, covers.then_some(uri), tracked);
            if covers {
                covering = Some(Arc::clone(&program));
            }
            compiled.push(program);
        }

        // no standalone compile for a document closed in the meantime
        let closed = if self.store.contains(uri) {
            None
        } else {
            compiled.first().cloned()
        };
        let program = match covering.or(closed) {
            Some(program) => program,
            None => {
                debug!("Compiling {} standalone", uri);
                let program = Arc::new(self.compiler.compile(uri).await?);
                let requested = self.store.contains(uri).then_some(uri);
                self.cache.complete(&program, requested, tracked);
                compiled.push(Arc::clone(&program));
                program
            }
        };

        self.publish(&compiled, uri, &program).await;
        Ok(program)
    }

    async fn publish(&self, compiled: &[Arc<Program>], requested: &Url, program: &Program) {
        let mut published: HashSet<Url> = HashSet::new();
        // a closed document keeps the empty list sent on close
        if !self.store.contains(requested) {
            debug!("Not publishing diagnostics for closed {}", requested);
            published.insert(requested.clone());
        }
        // the standalone program wins for scripts both programs cover
        for source in compiled.iter().rev() {
            for script in source.scripts.keys() {
                if published.insert(script.clone()) {
                    self.publish_one(script, source).await;
                }
            }
        }
        if published.insert(requested.clone()) {
            self.publish_one(requested, program).await;
        }
        info!("Published diagnostics for {} scripts", published.len());
    }

    async fn publish_one(&self, uri: &Url, program: &Program) {
        let diagnostics = program.diagnostics_for(uri);
        let version = if self.store.contains(uri) {
            self.cache.compiled_version(uri)
        } else {
            None
        };
        debug!("Publishing {} diagnostics for {}", diagnostics.len(), uri);
        self.publisher
            .publish(uri.clone(), diagnostics, version)
            .await;
    }

    /// Nearest main script at or above the directory of `uri`.
    ///
    /// Walks at most [`MAX_MAIN_SCRIPT_DEPTH`] directories upward and stops at
    /// the root. Candidates must be open or known to the workspace index.
    pub fn find_main_script(&self, uri: &Url) -> Option<Url> {
        let mut directory = uri.join("./").ok()?;
        for _ in 0..MAX_MAIN_SCRIPT_DEPTH {
            for name in &self.main_script_names {
                let Ok(candidate) = directory.join(name) else {
                    continue;
                };
                if self.store.contains(&candidate) || self.workspace.contains_script(&candidate) {
                    return Some(candidate);
                }
            }
            let parent = directory.join("../").ok()?;
            if parent == directory {
                break;
            }
            directory = parent;
        }
        None
    }
}

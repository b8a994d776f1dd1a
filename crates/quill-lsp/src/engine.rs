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

//! The language engine.
//!
//! [`Engine`] owns every piece of per-session state (documents, workspace
//! index, program cache, rate limiters, compiler connection) with an
//! explicit lifecycle: construct, feed it document events, query it,
//! [`dispose`](Engine::dispose) it. Nothing lives in globals, so tests and
//! embedders can run as many engines as they like.
//!
//! # Editing flow
//!
//! ```text
//! change ──► DocumentStore ──► compiler didChange ──► throttle ─┐
//!                                                  └► debounce ─┴► CompileScheduler
//! ```

use crate::compiler::{CompilerService, RpcCompiler};
use crate::config::ServerConfig;
use crate::document_store::DocumentStore;
use crate::error::CompileError;
use crate::program_cache::ProgramCache;
use crate::protocol::Program;
use crate::rate_limit::{Action, ActionFuture, RateLimiter};
use crate::references::{find_references, ReferenceFilters, ReferenceSearch};
use crate::rename::{prepare_rename, rename_edits};
use crate::rpc::RpcChannel;
use crate::scheduler::{CompileScheduler, DiagnosticsPublisher};
use crate::transport::{channel_pair, spawn_process};
use crate::worker::LocalCompilerWorker;
use crate::workspace::WorkspaceIndex;
use parking_lot::Mutex;
use quill_core::{Annotator, LineAnnotator, ResolveOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{
    FileChangeType, FileEvent, Location, Position, Range, TextDocumentContentChangeEvent, Url,
    WorkspaceEdit,
};
use tracing::{debug, error, info, trace, warn};

/// One language-server session.
pub struct Engine {
    config: ServerConfig,
    options: ResolveOptions,
    store: Arc<DocumentStore>,
    workspace: Arc<WorkspaceIndex>,
    cache: Arc<ProgramCache>,
    compiler: Arc<dyn CompilerService>,
    scheduler: Arc<CompileScheduler>,
    publisher: Arc<dyn DiagnosticsPublisher>,
    throttle: RateLimiter,
    debounce: RateLimiter,
    worker: Option<JoinHandle<()>>,
    process: Mutex<Option<Child>>,
}

impl Engine {
    /// Engine over an arbitrary compiler. Must be called inside a tokio
    /// runtime.
    pub fn new(
        config: ServerConfig,
        compiler: Arc<dyn CompilerService>,
        publisher: Arc<dyn DiagnosticsPublisher>,
        annotator: Arc<dyn Annotator>,
    ) -> Self {
        let store = Arc::new(DocumentStore::with_max_document_size(
            annotator,
            config.max_document_size,
        ));
        let workspace = Arc::new(WorkspaceIndex::new(config.script_extensions.clone()));
        let cache = Arc::new(ProgramCache::new());
        let scheduler = Arc::new(CompileScheduler::new(
            Arc::clone(&store),
            Arc::clone(&workspace),
            Arc::clone(&cache),
            Arc::clone(&compiler),
            Arc::clone(&publisher),
            config.main_script_names.clone(),
        ));
        let throttle = RateLimiter::throttle(config.throttle(), compile_action(&scheduler, "Throttled"));
        let debounce = RateLimiter::debounce(config.debounce(), compile_action(&scheduler, "Debounced"));

        Self {
            options: config.resolve_options(),
            config,
            store,
            workspace,
            cache,
            compiler,
            scheduler,
            publisher,
            throttle,
            debounce,
            worker: None,
            process: Mutex::new(None),
        }
    }

    /// Engine backed by the in-process compiler worker.
    pub fn with_local_compiler(config: ServerConfig, publisher: Arc<dyn DiagnosticsPublisher>) -> Self {
        let annotator: Arc<dyn Annotator> = Arc::new(LineAnnotator::new());
        let (host, worker_end) = channel_pair();
        let worker = LocalCompilerWorker::new(Arc::clone(&annotator), config.resolve_options())
            .spawn(worker_end);
        let channel = RpcChannel::with_timeout(host, config.request_timeout());
        let compiler = Arc::new(RpcCompiler::new(channel).with_progress(Arc::new(|progress| {
            trace!("Compiled {} ({} scripts so far)", progress.uri, progress.compiled);
        })));

        let mut engine = Self::new(config, compiler, publisher, annotator);
        engine.worker = Some(worker);
        engine
    }

    /// Engine backed by an external compiler process.
    pub fn with_process_compiler(
        config: ServerConfig,
        publisher: Arc<dyn DiagnosticsPublisher>,
    ) -> io::Result<Self> {
        let command = config.compiler_command.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no compiler command configured")
        })?;
        let (host, child) = spawn_process(&command, &config.compiler_args)?;
        info!("Started compiler process: {}", command);
        let channel = RpcChannel::with_timeout(host, config.request_timeout());
        let compiler = Arc::new(RpcCompiler::new(channel));

        let engine = Self::new(config, compiler, publisher, Arc::new(LineAnnotator::new()));
        *engine.process.lock() = Some(child);
        Ok(engine)
    }

    /// External process when a compiler command is configured, in-process
    /// worker otherwise.
    pub fn from_config(config: ServerConfig, publisher: Arc<dyn DiagnosticsPublisher>) -> io::Result<Self> {
        if config.compiler_command.is_some() {
            Self::with_process_compiler(config, publisher)
        } else {
            Ok(Self::with_local_compiler(config, publisher))
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn workspace(&self) -> &Arc<WorkspaceIndex> {
        &self.workspace
    }

    pub fn cache(&self) -> &Arc<ProgramCache> {
        &self.cache
    }

    /// Open a document, mirror it to the compiler and compile it right away.
    pub async fn open(&self, uri: &Url, version: i32, text: &str) -> bool {
        if !self.store.open(uri, version, text) {
            return false;
        }
        if let Err(e) = self.compiler.open_document(uri, version, text).await {
            error!("Failed to mirror {} to the compiler: {}", uri, e);
        }
        if let Err(e) = self.scheduler.compile(uri, false).await {
            error!("Compile of {} failed: {}", uri, e);
        }
        true
    }

    /// Apply an edit, forward it to the compiler, and schedule the interim
    /// and settled compiles.
    pub async fn change(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> bool {
        if !self.store.apply_changes(uri, version, changes) {
            return false;
        }
        if let Err(e) = self.compiler.change_document(uri, version, changes).await {
            error!("Failed to forward change of {} to the compiler: {}", uri, e);
        }
        self.throttle.trigger(uri);
        self.debounce.trigger(uri);
        true
    }

    /// Close a document: drop its text and program state, stop its timers,
    /// and clear its diagnostics.
    pub async fn close(&self, uri: &Url) -> bool {
        let closed = self.store.close(uri);
        self.cache.remove(uri);
        self.throttle.cancel(uri);
        self.debounce.cancel(uri);
        if let Err(e) = self.compiler.close_document(uri).await {
            warn!("Failed to close {} in the compiler: {}", uri, e);
        }
        self.publisher.publish(uri.clone(), Vec::new(), None).await;
        closed
    }

    /// See [`CompileScheduler::compile`].
    pub async fn compile(&self, uri: &Url, force: bool) -> Result<Option<Arc<Program>>, CompileError> {
        self.scheduler.compile(uri, force).await
    }

    /// Last compiled program covering `uri`.
    pub fn program(&self, uri: &Url) -> Option<Arc<Program>> {
        self.cache.program(uri)
    }

    /// Up-to-date program when the compiler answers, last known otherwise.
    async fn current_program(&self, uri: &Url) -> Option<Arc<Program>> {
        match self.scheduler.compile(uri, false).await {
            Ok(program) => program,
            Err(e) => {
                warn!("Using last known program for {}: {}", uri, e);
                self.cache.program(uri)
            }
        }
    }

    pub async fn references(
        &self,
        uri: &Url,
        position: Position,
        filters: ReferenceFilters,
    ) -> ReferenceSearch {
        let program = self.current_program(uri).await;
        find_references(
            &self.store,
            &self.workspace,
            program.as_deref(),
            uri,
            position,
            filters,
            &self.options,
        )
    }

    /// First declaration of the symbol at `position`.
    pub async fn definition(&self, uri: &Url, position: Position) -> Option<Location> {
        self.references(uri, position, ReferenceFilters::definitions())
            .await
            .locations
            .into_iter()
            .next()
    }

    pub fn prepare_rename(&self, uri: &Url, position: Position) -> Option<Range> {
        prepare_rename(&self.store, uri, position)
    }

    pub async fn rename(&self, uri: &Url, position: Position, new_name: &str) -> Option<WorkspaceEdit> {
        let program = self.current_program(uri).await;
        rename_edits(
            &self.store,
            &self.workspace,
            program.as_deref(),
            uri,
            position,
            new_name,
            &self.options,
            self.config.auto_rename_assets,
        )
    }

    /// Index scripts and assets under the workspace roots.
    pub fn scan_workspace(&self, roots: &[PathBuf]) -> usize {
        roots.iter().map(|root| self.workspace.scan(root)).sum()
    }

    /// Apply a watched-file event.
    pub fn file_changed(&self, event: &FileEvent) {
        if event.typ == FileChangeType::DELETED {
            if self.workspace.remove_file(&event.uri) && !self.store.contains(&event.uri) {
                debug!("Script deleted, purging state: {}", event.uri);
                self.cache.remove(&event.uri);
            }
        } else {
            self.workspace.add_file(&event.uri);
        }
    }

    /// Stop all background work and drop every program.
    pub fn dispose(&self) {
        self.throttle.cancel_all();
        self.debounce.cancel_all();
        self.cache.clear();
        if let Some(worker) = &self.worker {
            worker.abort();
        }
        if let Some(child) = self.process.lock().as_mut() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to stop compiler process: {}", e);
            }
        }
        info!("Engine disposed ({} documents open)", self.store.len());
    }
}

fn compile_action(scheduler: &Arc<CompileScheduler>, label: &'static str) -> Action {
    let scheduler = Arc::clone(scheduler);
    Arc::new(move |uri: Url| {
        let scheduler = Arc::clone(&scheduler);
        Box::pin(async move {
            match scheduler.compile(&uri, false).await {
                Ok(_) => {}
                Err(e) if e.is_compiler_fault() => error!("{} compile of {} failed: {}", label, uri, e),
                Err(e) => debug!("{} compile of {} did not finish: {}", label, uri, e),
            }
        }) as ActionFuture
    })
}

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

//! LSP backend implementation.
//!
//! Protocol handling only: every request is translated into an [`Engine`]
//! call. The engine is created during `initialize`, once the client's
//! `initializationOptions` and workspace folders are known.

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::references::ReferenceFilters;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

/// Quill Language Server backend.
pub struct QuillLanguageServer {
    client: Client,
    config: RwLock<ServerConfig>,
    engine: OnceCell<Engine>,
    roots: RwLock<Vec<PathBuf>>,
}

impl QuillLanguageServer {
    /// Create a server with the default configuration.
    pub fn new(client: Client) -> Self {
        Self::with_config(client, ServerConfig::default())
    }

    /// Create a server whose configuration starts from `config`. Client
    /// `initializationOptions` are applied on top during `initialize`.
    pub fn with_config(client: Client, config: ServerConfig) -> Self {
        Self {
            client,
            config: RwLock::new(config),
            engine: OnceCell::new(),
            roots: RwLock::new(Vec::new()),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    fn engine(&self) -> Option<&Engine> {
        let engine = self.engine.get();
        if engine.is_none() {
            debug!("Request before initialize, ignoring");
        }
        engine
    }

    fn start_engine(&self, config: ServerConfig) -> Engine {
        let publisher = Arc::new(self.client.clone());
        match Engine::from_config(config.clone(), publisher.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Failed to start external compiler, using the built-in one: {}", e);
                Engine::with_local_compiler(config, publisher)
            }
        }
    }
}

fn workspace_roots(params: &InitializeParams) -> Vec<PathBuf> {
    if let Some(folders) = &params.workspace_folders {
        return folders
            .iter()
            .filter_map(|folder| folder.uri.to_file_path().ok())
            .collect();
    }
    #[allow(deprecated)]
    let root = params.root_uri.as_ref();
    root.and_then(|uri| uri.to_file_path().ok())
        .into_iter()
        .collect()
}

#[tower_lsp::async_trait]
impl LanguageServer for QuillLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!("Quill Language Server initializing");

        let config = {
            let mut config = self.config.write();
            if let Some(options) = &params.initialization_options {
                if let Err(e) = config.merge_json(options) {
                    warn!("Ignoring invalid initializationOptions: {}", e);
                }
            }
            config.clone()
        };
        *self.roots.write() = workspace_roots(&params);

        if self.engine.set(self.start_engine(config)).is_err() {
            warn!("initialize received twice, keeping the first engine");
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "quill-lsp".to_string(),
                version: Some(crate::VERSION.to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let roots = self.roots.read().clone();
        if let Some(engine) = self.engine() {
            let found = engine.scan_workspace(&roots);
            info!(
                "Quill Language Server initialized ({} files in {} workspace folders)",
                found,
                roots.len()
            );
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Quill Language Server shutting down");
        if let Some(engine) = self.engine() {
            engine.dispose();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(engine) = self.engine() else {
            return;
        };
        let document = params.text_document;
        info!(
            "Document opened: {} ({} bytes, {} lines)",
            document.uri,
            document.text.len(),
            document.text.lines().count()
        );

        if !engine.open(&document.uri, document.version, &document.text).await {
            let max_size = engine.store().max_document_size();
            self.client
                .show_message(
                    MessageType::ERROR,
                    format!(
                        "Document too large: {} bytes exceeds maximum of {} bytes",
                        document.text.len(),
                        max_size
                    ),
                )
                .await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(engine) = self.engine() else {
            return;
        };
        let uri = &params.text_document.uri;
        debug!(
            "Document change event received for: {} ({} changes)",
            uri,
            params.content_changes.len()
        );
        if !engine
            .change(uri, params.text_document.version, &params.content_changes)
            .await
        {
            warn!("Failed to apply change to {}", uri);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        debug!("Document closed: {}", params.text_document.uri);
        if let Some(engine) = self.engine() {
            engine.close(&params.text_document.uri).await;
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let Some(engine) = self.engine() else {
            return;
        };
        debug!("{} watched files changed", params.changes.len());
        for event in &params.changes {
            engine.file_changed(event);
        }
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        Ok(engine
            .definition(uri, position)
            .await
            .map(GotoDefinitionResponse::Scalar))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let filters = ReferenceFilters {
            include_declaration: params.context.include_declaration,
            ..ReferenceFilters::default()
        };

        let search = engine.references(uri, position, filters).await;
        debug!(
            "Providing {} references for {} at {}:{}",
            search.locations.len(),
            uri,
            position.line,
            position.character
        );
        Ok(Some(search.locations))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        Ok(engine
            .prepare_rename(&params.text_document.uri, params.position)
            .map(PrepareRenameResponse::Range))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        Ok(engine.rename(uri, position, &params.new_name).await)
    }
}

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

//! The compiler as seen by the scheduler.
//!
//! [`CompilerService`] is the seam between compile orchestration and the
//! thing that actually compiles. [`RpcCompiler`] implements it over an
//! [`RpcChannel`], whichever process or task sits on the other end.

use crate::error::{CompileError, RpcError};
use crate::protocol::{
    ChangeDocumentParams, CloseDocumentParams, CompileParams, CompileProgress,
    OpenDocumentParams, Program, COMPILE, DID_CHANGE, DID_CLOSE, DID_OPEN,
};
use crate::rpc::{ProgressCallback, RpcChannel};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};
use tracing::{debug, trace, warn};

/// Compiles projects and mirrors live documents.
#[async_trait]
pub trait CompilerService: Send + Sync {
    /// Compile the project rooted at `uri`.
    async fn compile(&self, uri: &Url) -> Result<Program, CompileError>;

    /// Mirror a newly opened document.
    async fn open_document(&self, uri: &Url, version: i32, text: &str)
        -> Result<(), CompileError>;

    /// Forward an edit to a mirrored document.
    async fn change_document(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<(), CompileError>;

    /// Stop mirroring a document.
    async fn close_document(&self, uri: &Url) -> Result<(), CompileError>;
}

/// Callback for per-script compile progress.
pub type CompileProgressCallback = Arc<dyn Fn(CompileProgress) + Send + Sync>;

/// [`CompilerService`] over an RPC channel.
pub struct RpcCompiler {
    channel: RpcChannel,
    on_progress: Option<CompileProgressCallback>,
}

impl RpcCompiler {
    pub fn new(channel: RpcChannel) -> Self {
        Self {
            channel,
            on_progress: None,
        }
    }

    /// Report per-script progress of every compile to `callback`.
    pub fn with_progress(mut self, callback: CompileProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<(), CompileError> {
        let params = serde_json::to_value(params).map_err(RpcError::Encode)?;
        self.channel.notify(method, params)?;
        Ok(())
    }
}

#[async_trait]
impl CompilerService for RpcCompiler {
    async fn compile(&self, uri: &Url) -> Result<Program, CompileError> {
        let params = serde_json::to_value(CompileParams { uri: uri.clone() })
            .map_err(RpcError::Encode)?;
        let progress = self.on_progress.clone().map(|callback| {
            let forward: ProgressCallback = Arc::new(move |value| {
                match serde_json::from_value::<CompileProgress>(value) {
                    Ok(progress) => callback(progress),
                    Err(e) => trace!("Ignoring malformed compile progress: {}", e),
                }
            });
            forward
        });

        debug!("Requesting compile of {}", uri);
        let value = self
            .channel
            .request_with_progress(COMPILE, params, progress)
            .await?;
        let program: Program = serde_json::from_value(value).map_err(RpcError::Decode)?;
        debug!(
            "Compile of {} returned {} scripts",
            uri,
            program.scripts.len()
        );
        Ok(program)
    }

    async fn open_document(
        &self,
        uri: &Url,
        version: i32,
        text: &str,
    ) -> Result<(), CompileError> {
        self.notify(
            DID_OPEN,
            &OpenDocumentParams {
                uri: uri.clone(),
                version,
                text: text.to_string(),
            },
        )
    }

    async fn change_document(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<(), CompileError> {
        self.notify(
            DID_CHANGE,
            &ChangeDocumentParams {
                uri: uri.clone(),
                version,
                content_changes: changes.to_vec(),
            },
        )
    }

    async fn close_document(&self, uri: &Url) -> Result<(), CompileError> {
        if let Err(e) = self.notify(DID_CLOSE, &CloseDocumentParams { uri: uri.clone() }) {
            warn!("Failed to forward close of {}: {}", uri, e);
            return Err(e);
        }
        Ok(())
    }
}

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

//! Wire format between the server and its compiler worker.
//!
//! Messages are JSON objects, one per line on process transports:
//!
//! ```text
//! {"id": 1, "method": "compiler/compile", "params": {...}}     request
//! {"id": 1, "result": {...}}                                    success
//! {"id": 1, "error": {"code": -32602, "message": "..."}}        failure
//! {"id": 1, "method": "compiler/compile/progress", "value": 3}  progress
//! {"method": "ready"}                                           notification
//! ```

use quill_core::ProgramContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tower_lsp::lsp_types::{Diagnostic, TextDocumentContentChangeEvent, Url};

/// Request correlation id.
pub type RequestId = u64;

/// Compile the project rooted at a script.
pub const COMPILE: &str = "compiler/compile";
/// Mirror a newly opened document.
pub const DID_OPEN: &str = "compiler/didOpen";
/// Forward an edit to a mirrored document.
pub const DID_CHANGE: &str = "compiler/didChange";
/// Drop a mirrored document.
pub const DID_CLOSE: &str = "compiler/didClose";
/// Sent once by the worker when it accepts requests.
pub const READY: &str = "ready";
/// Appended to a request's method to name its progress notifications.
pub const PROGRESS_SUFFIX: &str = "/progress";

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

/// Any message crossing the worker boundary.
///
/// Variant order matters for decoding: a request carries `params`, a
/// progress message carries `value`, a response carries neither `method`
/// nor `params`, and a notification has no `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Progress {
        id: RequestId,
        method: String,
        value: Value,
    },
    Response {
        id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorObject>,
    },
    Notification {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

impl Message {
    /// The correlation id, if the message carries one.
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Request { id, .. } | Self::Progress { id, .. } | Self::Response { id, .. } => {
                Some(*id)
            }
            Self::Notification { .. } => None,
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self::Notification {
            method: method.to_string(),
            params,
        }
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        Self::Response {
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Method name of the progress notifications for `method`.
pub fn progress_method(method: &str) -> String {
    format!("{}{}", method, PROGRESS_SUFFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileParams {
    pub uri: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDocumentParams {
    pub uri: Url,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDocumentParams {
    pub uri: Url,
    pub version: i32,
    pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseDocumentParams {
    pub uri: Url,
}

/// Progress value streamed while a compile walks its scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileProgress {
    /// Script just compiled.
    pub uri: Url,
    /// Scripts compiled so far, this one included.
    pub compiled: usize,
}

/// Aggregate compiled artifact of a project.
///
/// Immutable once produced: the server shares it behind an `Arc` and every
/// query resolves against a single snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Script the compile started from.
    pub root: Option<Url>,
    /// Every script pulled in, with the version compiled.
    #[serde(default)]
    pub scripts: BTreeMap<Url, i32>,
    /// Diagnostics per script.
    #[serde(default)]
    pub diagnostics: BTreeMap<Url, Vec<Diagnostic>>,
    /// Global symbol and type tables.
    #[serde(default)]
    pub context: ProgramContext,
}

impl Program {
    /// Whether `uri` was compiled into this program.
    pub fn covers(&self, uri: &Url) -> bool {
        self.scripts.contains_key(uri)
    }

    /// Version of `uri` compiled into this program.
    pub fn version_of(&self, uri: &Url) -> Option<i32> {
        self.scripts.get(uri).copied()
    }

    /// Diagnostics for `uri`; empty when there are none.
    pub fn diagnostics_for(&self, uri: &Url) -> Vec<Diagnostic> {
        self.diagnostics.get(uri).cloned().unwrap_or_default()
    }
}

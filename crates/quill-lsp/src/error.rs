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

//! Error types for the compiler boundary.
//!
//! Only compiler faults surface as errors. Missing documents, missing main
//! scripts and unresolved symbols are ordinary outcomes and are reported as
//! `None` or empty collections by the functions that meet them.

use thiserror::Error;

/// Failure of a single request on the RPC channel.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived within the configured timeout.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The worker went away before answering.
    #[error("compiler connection closed")]
    Disconnected,

    /// The request was withdrawn by its caller.
    #[error("request cancelled")]
    Cancelled,

    /// The worker answered with an error object.
    #[error("compiler error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode compiler message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure of a compile.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The compiler call itself failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// This caller joined an in-flight compile that failed.
    #[error("in-flight compile of {uri} failed")]
    Abandoned { uri: String },

    /// A script could not be read from disk.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Whether the failure came from the compiler process or channel.
    pub fn is_compiler_fault(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

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

//! Quill Language Server
//!
//! Language-server backend for branching narrative scripts (knots, stitches,
//! diverts). It keeps multi-file projects compiled while the user types,
//! publishes diagnostics, and answers definition, reference and rename
//! queries.
//!
//! # Architecture
//!
//! ```text
//! backend ─► engine ─┬─► document_store      (live text + annotations)
//!                    ├─► rate_limit          (throttle / debounce per uri)
//!                    ├─► scheduler ─► program_cache
//!                    │       └─► compiler ─► rpc ─► transport ─► worker | process
//!                    └─► references / rename (resolution against one program)
//! ```
//!
//! - **Compile dedup**: at most one compile per document is in flight; later
//!   callers join it or reuse the cached program.
//! - **Staleness**: a cached program is reused only while no open document
//!   changed since it was compiled.
//! - **Compiler boundary**: the compiler is reached through a JSON-RPC style
//!   channel, either the built-in worker task or an external process.
//!
//! # Usage
//!
//! ```no_run
//! use quill_lsp::QuillLanguageServer;
//! use tower_lsp::{LspService, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stdin = tokio::io::stdin();
//!     let stdout = tokio::io::stdout();
//!
//!     let (service, socket) = LspService::new(QuillLanguageServer::new);
//!     Server::new(stdin, stdout, socket).serve(service).await;
//! }
//! ```

mod backend;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod document_store;
pub mod engine;
pub mod error;
pub mod program_cache;
pub mod protocol;
pub mod rate_limit;
pub mod references;
pub mod rename;
pub mod rpc;
pub mod scheduler;
pub mod transport;
pub mod utils;
pub mod worker;
pub mod workspace;

pub use backend::QuillLanguageServer;
pub use compiler::{CompilerService, RpcCompiler};
pub use config::ServerConfig;
pub use document_store::{DocumentSnapshot, DocumentStore};
pub use engine::Engine;
pub use error::{CompileError, RpcError};
pub use program_cache::{CacheStatistics, ProgramCache, ProgramState};
pub use protocol::Program;
pub use references::{find_references, ReferenceFilters, ReferenceSearch};
pub use rpc::RpcChannel;
pub use scheduler::{resolve, CompileScheduler, DiagnosticsPublisher};
pub use workspace::WorkspaceIndex;

/// LSP server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

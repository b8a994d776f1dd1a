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

//! Quill Language Server binary.
//!
//! # Usage
//!
//! ```bash
//! # Run the language server (stdio transport) with the built-in compiler
//! quill-lsp
//!
//! # Delegate compiles to an external compiler speaking the worker protocol
//! quill-lsp --compiler my-story-compiler --compiler-arg --stdio
//!
//! # With debug logging
//! RUST_LOG=debug quill-lsp
//! ```
//!
//! Client `initializationOptions` (camelCase keys of `ServerConfig`) override
//! these flags.

use clap::Parser;
use quill_lsp::{QuillLanguageServer, ServerConfig};
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quill-lsp", version, about = "Quill narrative script language server")]
struct Args {
    /// External compiler executable (default: built-in compiler)
    #[arg(long)]
    compiler: Option<String>,

    /// Argument passed to the external compiler (repeatable)
    #[arg(long = "compiler-arg", allow_hyphen_values = true)]
    compiler_args: Vec<String>,

    /// Interim compile interval while typing, in milliseconds
    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Quiet period before the settled compile, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Fail compiler requests that take longer than this, in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Main script file name (repeatable; default: main.ink)
    #[arg(long = "main-script")]
    main_scripts: Vec<String>,

    /// Rename backing asset files when renaming asset symbols
    #[arg(long)]
    auto_rename_assets: Option<bool>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::default();
        if let Some(compiler) = self.compiler {
            config.compiler_command = Some(compiler);
            config.compiler_args = self.compiler_args;
        }
        if let Some(ms) = self.throttle_ms {
            config.throttle_ms = ms;
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
        if self.request_timeout_ms.is_some() {
            config.request_timeout_ms = self.request_timeout_ms;
        }
        if !self.main_scripts.is_empty() {
            config.main_script_names = self.main_scripts;
        }
        if let Some(enabled) = self.auto_rename_assets {
            config.auto_rename_assets = enabled;
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("quill_lsp=info".parse().expect("valid log directive"))
                .add_directive("tower_lsp=info".parse().expect("valid log directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Quill Language Server v{}", quill_lsp::VERSION);

    let config = args.into_config();
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) =
        LspService::new(move |client| QuillLanguageServer::with_config(client, config.clone()));

    Server::new(stdin, stdout, socket).serve(service).await;
}

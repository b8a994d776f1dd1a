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

//! Runtime server configuration.
//!
//! Layers, later wins: the defaults from [`crate::constants`], command-line
//! flags, then the client's `initializationOptions`.

use crate::constants::{
    DEBOUNCE_MS, DEFAULT_BUILTIN_IDS, DEFAULT_MAIN_SCRIPT_NAME, DEFAULT_MAX_DOCUMENT_SIZE,
    SCRIPT_EXTENSION, THROTTLE_MS,
};
use quill_core::ResolveOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// File names that mark a project's entry script.
    pub main_script_names: Vec<String>,
    /// Extensions of script files (without the dot).
    pub script_extensions: Vec<String>,
    /// Interim compile interval while typing.
    pub throttle_ms: u64,
    /// Quiet period before the settled compile.
    pub debounce_ms: u64,
    /// Per-request timeout for compiler calls. `None` waits forever.
    pub request_timeout_ms: Option<u64>,
    /// External compiler executable. `None` runs the in-process worker.
    pub compiler_command: Option<String>,
    /// Arguments passed to the external compiler.
    pub compiler_args: Vec<String>,
    /// Rename backing asset files together with asset symbols.
    pub auto_rename_assets: bool,
    /// Maximum document size in bytes.
    pub max_document_size: usize,
    /// Ids every lookup treats as declared.
    pub builtin_ids: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            main_script_names: vec![DEFAULT_MAIN_SCRIPT_NAME.to_string()],
            script_extensions: vec![SCRIPT_EXTENSION.to_string()],
            throttle_ms: THROTTLE_MS,
            debounce_ms: DEBOUNCE_MS,
            request_timeout_ms: None,
            compiler_command: None,
            compiler_args: Vec::new(),
            auto_rename_assets: true,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            builtin_ids: DEFAULT_BUILTIN_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ServerConfig {
    /// Overlay the keys present in `options` (typically the LSP
    /// `initializationOptions`). Unknown keys are ignored; a key with a
    /// value of the wrong type fails the whole merge and leaves `self`
    /// untouched.
    pub fn merge_json(&mut self, options: &Value) -> Result<(), serde_json::Error> {
        let Value::Object(overrides) = options else {
            return Ok(());
        };
        let mut current = serde_json::to_value(&*self)?;
        if let Value::Object(fields) = &mut current {
            for (key, value) in overrides {
                if fields.contains_key(key) {
                    fields.insert(key.clone(), value.clone());
                } else {
                    debug!("Ignoring unknown configuration key: {}", key);
                }
            }
        }
        *self = serde_json::from_value(current)?;
        Ok(())
    }

    /// Lookup options derived from the builtin ids.
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::with_builtins(self.builtin_ids.iter().cloned())
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

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

//! Server constants and tuning defaults.
//!
//! This module centralizes the magic numbers used throughout the server with
//! documentation explaining each value. Every value here is a default: the
//! runtime copy lives in [`crate::config::ServerConfig`].
//!
//! # Organization
//!
//! - **Compile Scheduling**: throttle and debounce intervals
//! - **Project Layout**: main-script discovery and file extensions
//! - **Memory Limits**: document size constraints
//! - **Resolution**: builtin ids and asset naming

// ============================================================================
// Compile Scheduling
// ============================================================================

/// Throttle interval for interim compiles while typing (in milliseconds).
///
/// **Rationale**: The throttled compile gives feedback while the user is still
/// typing. 100ms keeps at most ten interim compiles per second per document,
/// which a multi-file project compiles comfortably.
///
/// **Trade-offs**:
/// - Lower values: fresher interim diagnostics, more compiler traffic
/// - Higher values: fewer compiles, diagnostics lag behind the cursor
pub const THROTTLE_MS: u64 = 100;

/// Debounce delay for the final compile after edits settle (in milliseconds).
///
/// **Rationale**: 200ms after the last keystroke is below the perceptible lag
/// threshold and coalesces bursts of typing into a single authoritative
/// compile. The debounced compile is what guarantees a final diagnostics
/// publish for the settled text.
///
/// **Trade-offs**:
/// - Lower values (50-100ms): more responsive but more duplicate work
/// - Higher values (300-500ms): noticeable delay before final diagnostics
pub const DEBOUNCE_MS: u64 = 200;

// ============================================================================
// Project Layout
// ============================================================================

/// Conventional file name of a project's entry script.
///
/// **Rationale**: A project is aggregated from its main script through
/// `INCLUDE` lines. Scripts are compiled as part of the nearest main script
/// found in their directory or any parent directory.
pub const DEFAULT_MAIN_SCRIPT_NAME: &str = "main.ink";

/// File extension of narrative scripts.
pub const SCRIPT_EXTENSION: &str = "ink";

/// Maximum number of directories visited while searching for a main script.
///
/// **Rationale**: The walk goes from a script's directory up to the root.
/// Real projects are a handful of levels deep; 64 bounds the walk for
/// malformed or synthetic uris whose parent chain never reaches a root.
pub const MAX_MAIN_SCRIPT_DEPTH: usize = 64;

/// Maximum number of scripts a single compile follows through `INCLUDE`s.
///
/// **Rationale**: Include cycles are cut by the visited set; this bound only
/// protects against runaway generated projects.
pub const MAX_INCLUDED_SCRIPTS: usize = 4096;

// ============================================================================
// Memory Limits
// ============================================================================

/// Bytes per megabyte (1024 * 1024).
pub const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

/// Default maximum document size in bytes (64 MB).
///
/// **Rationale**: Narrative scripts are prose. Even very long games stay in
/// the single-digit megabytes per file; 64 MB leaves ample headroom while
/// preventing a stray binary file from being mirrored to the compiler.
///
/// **Trade-offs**:
/// - Larger limits accept bigger files but every edit is annotated in full
/// - Smaller limits protect memory but reject valid large files
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 64 * BYTES_PER_MEGABYTE;

// ============================================================================
// Resolution
// ============================================================================

/// Divert targets the runtime defines without a declaration.
pub const DEFAULT_BUILTIN_IDS: [&str; 2] = ["DONE", "END"];

/// File-name suffixes of font style variants.
///
/// **Rationale**: A font asset `Roboto` may ship as `Roboto.ttf`,
/// `Roboto__bold.ttf`, `Roboto__italic.ttf` and `Roboto__bolditalic.ttf`.
/// Renaming the font symbol renames every variant that exists.
pub const FONT_VARIANT_SUFFIXES: [&str; 3] = ["__bold", "__italic", "__bolditalic"];

/// File extensions recognised as image assets.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// File extensions recognised as audio assets.
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "ogg", "wav", "flac"];

/// File extensions recognised as video assets.
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mov"];

/// File extensions recognised as font assets.
pub const FONT_EXTENSIONS: [&str; 4] = ["ttf", "otf", "woff", "woff2"];

// ============================================================================
// Compiler Protocol
// ============================================================================

/// JSON-RPC error code for a request the worker does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for malformed parameters.
pub const INVALID_PARAMS: i64 = -32602;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduling_order() {
        // interim feedback must fire before the settled compile
        assert!(THROTTLE_MS < DEBOUNCE_MS);
    }

    #[test]
    fn test_main_script_has_script_extension() {
        assert!(DEFAULT_MAIN_SCRIPT_NAME.ends_with(&format!(".{}", SCRIPT_EXTENSION)));
    }

    #[test]
    fn test_font_suffixes_are_distinct() {
        for (i, a) in FONT_VARIANT_SUFFIXES.iter().enumerate() {
            for b in &FONT_VARIANT_SUFFIXES[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

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

//! Live document storage.
//!
//! This module holds the text and version of every open document together
//! with the annotations the [`Annotator`] produced for that text.
//!
//! # Responsibilities
//!
//! - Document lifecycle (open, change, close)
//! - Full and incremental change application on a rope
//! - Re-annotation after every change
//! - Document size limits
//! - Store statistics
//!
//! # Design
//!
//! Readers take a [`DocumentSnapshot`]: cheap clones of the rope, text and
//! annotations at one version. A snapshot never changes, so queries that
//! walk several documents see a consistent view of each.

use crate::constants::DEFAULT_MAX_DOCUMENT_SIZE;
use crate::utils::apply_content_change;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use quill_core::{Annotations, Annotator};
use ropey::Rope;
use std::sync::Arc;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};
use tracing::{debug, warn};

/// Mutable state of one open document.
pub struct DocumentState {
    /// Current content for efficient editing.
    pub rope: Rope,
    /// Current content as a contiguous string (annotation offsets index it).
    pub text: Arc<str>,
    /// Editor-assigned version.
    pub version: i32,
    /// Annotator output for `text`.
    pub annotations: Arc<Annotations>,
}

/// Immutable view of a document at one version.
#[derive(Clone)]
pub struct DocumentSnapshot {
    pub uri: Url,
    pub version: i32,
    pub rope: Rope,
    pub text: Arc<str>,
    pub annotations: Arc<Annotations>,
}

/// Store statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Documents opened.
    pub opens: u64,
    /// Change notifications applied.
    pub changes: u64,
    /// Documents closed.
    pub closes: u64,
    /// Opens or changes rejected by the size limit.
    pub rejected: u64,
    /// Currently open documents.
    pub current_size: usize,
}

/// Open documents by uri.
///
/// # Thread Safety
///
/// Uses DashMap for concurrent access and a per-document mutex, so the store
/// can be shared across tasks behind an `Arc`.
pub struct DocumentStore {
    documents: DashMap<Url, Arc<Mutex<DocumentState>>>,
    annotator: Arc<dyn Annotator>,
    stats: Mutex<StoreStatistics>,
    max_document_size: RwLock<usize>,
}

impl DocumentStore {
    /// Create a store with the default size limit.
    pub fn new(annotator: Arc<dyn Annotator>) -> Self {
        Self::with_max_document_size(annotator, DEFAULT_MAX_DOCUMENT_SIZE)
    }

    pub fn with_max_document_size(annotator: Arc<dyn Annotator>, max_document_size: usize) -> Self {
        Self {
            documents: DashMap::new(),
            annotator,
            stats: Mutex::new(StoreStatistics::default()),
            max_document_size: RwLock::new(max_document_size),
        }
    }

    /// Snapshot of the statistics.
    pub fn statistics(&self) -> StoreStatistics {
        let mut stats = self.stats.lock().clone();
        stats.current_size = self.documents.len();
        stats
    }

    pub fn set_max_document_size(&self, new_max: usize) {
        *self.max_document_size.write() = new_max;
        debug!("Max document size updated to: {} bytes", new_max);
    }

    pub fn max_document_size(&self) -> usize {
        *self.max_document_size.read()
    }

    fn reject_oversized(&self, uri: &Url, len: usize) -> bool {
        let max_size = self.max_document_size();
        if len > max_size {
            warn!(
                "Document size limit exceeded for {}: {} bytes > {} bytes maximum (rejected)",
                uri, len, max_size
            );
            self.stats.lock().rejected += 1;
            return true;
        }
        false
    }

    /// Open (or reopen) a document.
    ///
    /// Returns `false` if the text exceeds the size limit.
    pub fn open(&self, uri: &Url, version: i32, text: &str) -> bool {
        if self.reject_oversized(uri, text.len()) {
            return false;
        }
        let annotations = Arc::new(self.annotator.annotate(text));
        debug!(
            "Document opened: {} (v{}, {} bytes, {} references)",
            uri,
            version,
            text.len(),
            annotations.references.len()
        );
        let state = DocumentState {
            rope: Rope::from_str(text),
            text: Arc::from(text),
            version,
            annotations,
        };
        self.documents
            .insert(uri.clone(), Arc::new(Mutex::new(state)));
        self.stats.lock().opens += 1;
        true
    }

    /// Apply content changes in order and move to `version`.
    ///
    /// Returns `false` if the document is not open or the result exceeds the
    /// size limit; the stored document is left untouched in both cases.
    pub fn apply_changes(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> bool {
        let Some(entry) = self.documents.get(uri).map(|e| Arc::clone(e.value())) else {
            warn!("Change for unknown document {} ignored", uri);
            return false;
        };
        let mut state = entry.lock();

        let mut rope = state.rope.clone();
        for change in changes {
            apply_content_change(&mut rope, change);
        }
        if self.reject_oversized(uri, rope.len_bytes()) {
            return false;
        }

        let text: Arc<str> = Arc::from(rope.to_string());
        state.annotations = Arc::new(self.annotator.annotate(&text));
        debug!(
            "Document changed: {} (v{} -> v{}, {} changes, {} bytes)",
            uri,
            state.version,
            version,
            changes.len(),
            text.len()
        );
        state.rope = rope;
        state.text = text;
        state.version = version;
        self.stats.lock().changes += 1;
        true
    }

    /// Close a document. Returns `true` if it was open.
    pub fn close(&self, uri: &Url) -> bool {
        let removed = self.documents.remove(uri).is_some();
        if removed {
            self.stats.lock().closes += 1;
            debug!("Document closed: {}", uri);
        }
        removed
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    /// Snapshot of a document, or `None` if it is not open.
    pub fn get(&self, uri: &Url) -> Option<DocumentSnapshot> {
        let entry = self.documents.get(uri)?;
        let state = entry.lock();
        Some(DocumentSnapshot {
            uri: uri.clone(),
            version: state.version,
            rope: state.rope.clone(),
            text: Arc::clone(&state.text),
            annotations: Arc::clone(&state.annotations),
        })
    }

    /// Live version of a document.
    pub fn version(&self, uri: &Url) -> Option<i32> {
        self.documents.get(uri).map(|entry| entry.lock().version)
    }

    /// Live versions of every open document.
    pub fn versions(&self) -> Vec<(Url, i32)> {
        self.documents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().version))
            .collect()
    }

    /// Uris of every open document, sorted.
    pub fn all_uris(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = self.documents.iter().map(|e| e.key().clone()).collect();
        uris.sort();
        uris
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

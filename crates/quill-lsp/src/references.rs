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

//! Cross-file occurrence search.
//!
//! # Algorithm
//!
//! 1. Find the annotation under the cursor and resolve its ids to canonical
//!    form in its own scope.
//! 2. Walk every open document's references in position order, keeping the
//!    scope stack current.
//! 3. Occurrences whose text differs from the queried name are skipped
//!    before any resolution work.
//! 4. The rest are resolved in their scope; equal canonical ids are hits.
//!
//! Everything is resolved against one program snapshot, so tables from two
//! compiles never mix. Results are unique by `(uri, start offset)`.

use crate::document_store::{DocumentSnapshot, DocumentStore};
use crate::protocol::Program;
use crate::utils::{position_to_offset, span_text, span_to_range};
use crate::workspace::WorkspaceIndex;
use quill_core::{
    is_asset_id, resolve_reference_ids, scope_path_at, Annotation, ProgramContext, Reference,
    ResolveOptions, ScopeStack,
};
use std::collections::{BTreeSet, HashSet};
use tower_lsp::lsp_types::{Location, Position, Range, Url};
use tracing::debug;

/// Which occurrences a search reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceFilters {
    /// Report declarations.
    pub include_declaration: bool,
    /// Skip plain uses (declarations only).
    pub exclude_uses: bool,
    /// Look beyond the queried document.
    pub search_other_files: bool,
    /// Match linked aliases too.
    pub include_interdependent: bool,
}

impl Default for ReferenceFilters {
    fn default() -> Self {
        Self {
            include_declaration: true,
            exclude_uses: false,
            search_other_files: true,
            include_interdependent: false,
        }
    }
}

impl ReferenceFilters {
    /// Declarations only, across files.
    pub fn definitions() -> Self {
        Self {
            include_declaration: true,
            exclude_uses: true,
            ..Self::default()
        }
    }

    /// Everything a rename must touch.
    pub fn rename() -> Self {
        Self {
            include_declaration: true,
            include_interdependent: true,
            ..Self::default()
        }
    }
}

/// Result of a reference search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSearch {
    /// Occurrences, then backing asset files as zero-length locations.
    pub locations: Vec<Location>,
    /// Canonical ids seen while matching.
    pub resolved_symbol_ids: BTreeSet<String>,
    /// Asset files linked to an asset id among the resolved ids.
    pub asset_files: Vec<Url>,
}

impl ReferenceSearch {
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Whether any resolved id names an asset.
    pub fn has_asset_id(&self) -> bool {
        self.resolved_symbol_ids.iter().any(|id| is_asset_id(id))
    }
}

/// The symbol under a cursor.
#[derive(Debug, Clone)]
pub struct SymbolAt {
    pub annotation: Annotation<Reference>,
    /// Literal text of the annotation.
    pub name: String,
    /// Scope path at the annotation.
    pub scope_path: String,
}

impl SymbolAt {
    pub fn range(&self, snapshot: &DocumentSnapshot) -> Range {
        span_to_range(&snapshot.rope, self.annotation.span())
    }
}

/// Symbol at `position`, if an annotation with ids covers it.
pub fn symbol_at(snapshot: &DocumentSnapshot, position: Position) -> Option<SymbolAt> {
    let offset = position_to_offset(&snapshot.rope, position);
    let annotation = snapshot.annotations.references.find_at(offset)?;
    if annotation.value.symbol_ids.is_empty() {
        return None;
    }
    let name = span_text(&snapshot.text, annotation.span());
    if name.is_empty() {
        return None;
    }
    Some(SymbolAt {
        annotation: annotation.clone(),
        name: name.to_string(),
        scope_path: scope_path_at(&snapshot.annotations, &snapshot.text, annotation.from),
    })
}

/// Find every occurrence of the symbol at `position` in `uri`.
///
/// `program` is the snapshot covering `uri`; without one, only literal and
/// local ids can match. Unknown documents and positions without a symbol
/// give an empty result.
pub fn find_references(
    store: &DocumentStore,
    workspace: &WorkspaceIndex,
    program: Option<&Program>,
    uri: &Url,
    position: Position,
    filters: ReferenceFilters,
    options: &ResolveOptions,
) -> ReferenceSearch {
    let mut search = ReferenceSearch::default();
    let Some(snapshot) = store.get(uri) else {
        return search;
    };
    let Some(symbol) = symbol_at(&snapshot, position) else {
        return search;
    };

    let empty = ProgramContext::default();
    let context = program.map_or(&empty, |p| &p.context);
    let targets: HashSet<String> = resolve_reference_ids(
        &symbol.annotation.value,
        filters.include_interdependent,
        &symbol.scope_path,
        context,
        options,
    )
    .into_iter()
    .collect();
    if targets.is_empty() {
        return search;
    }
    search.resolved_symbol_ids.extend(targets.iter().cloned());

    let documents: Vec<DocumentSnapshot> = if filters.search_other_files {
        store
            .all_uris()
            .iter()
            .filter_map(|other| {
                if other == uri {
                    Some(snapshot.clone())
                } else {
                    store.get(other)
                }
            })
            .collect()
    } else {
        vec![snapshot.clone()]
    };

    let mut seen: HashSet<(Url, usize)> = HashSet::new();
    for document in &documents {
        let mut scope = ScopeStack::new();
        for annotation in document.annotations.references.iter() {
            let scope_path = scope.path();
            scope.visit(annotation, &document.text);

            let reference = &annotation.value;
            if reference.symbol_ids.is_empty() {
                continue;
            }
            let declaration = reference.is_declaration();
            if (declaration && !filters.include_declaration) || (!declaration && filters.exclude_uses) {
                continue;
            }
            if span_text(&document.text, annotation.span()) != symbol.name {
                continue;
            }

            let hits: Vec<String> = resolve_reference_ids(
                reference,
                filters.include_interdependent,
                &scope_path,
                context,
                options,
            )
            .into_iter()
            .filter(|id| targets.contains(id))
            .collect();
            if hits.is_empty() {
                continue;
            }
            search.resolved_symbol_ids.extend(hits);
            if seen.insert((document.uri.clone(), annotation.from)) {
                search.locations.push(Location {
                    uri: document.uri.clone(),
                    range: span_to_range(&document.rope, annotation.span()),
                });
            }
        }
    }

    for id in search.resolved_symbol_ids.iter().filter(|id| is_asset_id(id)) {
        for file in workspace.find_assets(id) {
            if seen.insert((file.clone(), 0)) {
                search.asset_files.push(file.clone());
                search.locations.push(Location {
                    uri: file,
                    range: Range::default(),
                });
            }
        }
    }

    debug!(
        "Found {} references for '{}' in {} documents",
        search.locations.len(),
        symbol.name,
        documents.len()
    );
    search
}

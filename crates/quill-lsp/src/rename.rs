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

//! Rename support.
//!
//! A rename rewrites every occurrence a reference search finds, declarations
//! and linked aliases included. When one of the resolved ids names an asset
//! (`font.Roboto`) and asset renaming is enabled, the backing files are
//! renamed too, keeping variant suffixes and extensions: `Roboto__bold.ttf`
//! becomes `Lobster__bold.ttf`.

use crate::document_store::DocumentStore;
use crate::protocol::Program;
use crate::references::{find_references, symbol_at, ReferenceFilters};
use crate::workspace::{file_stem, WorkspaceIndex};
use quill_core::{parse_asset_id, ResolveOptions};
use std::collections::BTreeMap;
use tower_lsp::lsp_types::{
    AnnotatedTextEdit, DocumentChangeOperation, DocumentChanges, OneOf,
    OptionalVersionedTextDocumentIdentifier, Position, Range, RenameFile, ResourceOp,
    TextDocumentEdit, TextEdit, Url, WorkspaceEdit,
};
use tracing::{debug, warn};

/// Range of the renameable symbol at `position`.
pub fn prepare_rename(store: &DocumentStore, uri: &Url, position: Position) -> Option<Range> {
    let snapshot = store.get(uri)?;
    let symbol = symbol_at(&snapshot, position)?;
    Some(symbol.range(&snapshot))
}

/// Whether `name` can replace an identifier.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Workspace edit renaming the symbol at `position` to `new_name`.
///
/// Returns `None` for an invalid name or when nothing would change.
#[allow(clippy::too_many_arguments)]
pub fn rename_edits(
    store: &DocumentStore,
    workspace: &WorkspaceIndex,
    program: Option<&Program>,
    uri: &Url,
    position: Position,
    new_name: &str,
    options: &ResolveOptions,
    auto_rename_assets: bool,
) -> Option<WorkspaceEdit> {
    if !is_valid_name(new_name) {
        warn!("Rejected rename to invalid name '{}'", new_name);
        return None;
    }
    let search = find_references(
        store,
        workspace,
        program,
        uri,
        position,
        ReferenceFilters::rename(),
        options,
    );

    let mut edits: BTreeMap<Url, Vec<OneOf<TextEdit, AnnotatedTextEdit>>> = BTreeMap::new();
    for location in &search.locations {
        if search.asset_files.contains(&location.uri) {
            continue;
        }
        edits.entry(location.uri.clone()).or_default().push(OneOf::Left(TextEdit {
            range: location.range,
            new_text: new_name.to_string(),
        }));
    }
    if edits.is_empty() {
        return None;
    }

    let mut operations: Vec<DocumentChangeOperation> = edits
        .into_iter()
        .map(|(uri, edits)| {
            let version = store.version(&uri);
            DocumentChangeOperation::Edit(TextDocumentEdit {
                text_document: OptionalVersionedTextDocumentIdentifier { uri, version },
                edits,
            })
        })
        .collect();

    if auto_rename_assets && search.has_asset_id() {
        for id in &search.resolved_symbol_ids {
            let Some((_, name)) = parse_asset_id(id) else {
                continue;
            };
            for file in workspace.find_assets(id) {
                if let Some(new_uri) = renamed_asset(&file, name, new_name) {
                    debug!("Renaming asset {} -> {}", file, new_uri);
                    operations.push(DocumentChangeOperation::Op(ResourceOp::Rename(RenameFile {
                        old_uri: file,
                        new_uri,
                        options: None,
                        annotation_id: None,
                    })));
                }
            }
        }
    }

    Some(WorkspaceEdit {
        document_changes: Some(DocumentChanges::Operations(operations)),
        ..Default::default()
    })
}

/// New uri of an asset file whose stem starts with `old_name`.
fn renamed_asset(file: &Url, old_name: &str, new_name: &str) -> Option<Url> {
    let stem = file_stem(file)?;
    let suffix = stem.strip_prefix(old_name)?;
    let file_name = file.path_segments()?.last()?;
    let new_file_name = match file_name.rsplit_once('.') {
        Some((_, extension)) => format!("{}{}.{}", new_name, suffix, extension),
        None => format!("{}{}", new_name, suffix),
    };
    file.join(&new_file_name).ok()
}

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

//! Rename, including asset-linked file renames.

use quill_core::{LineAnnotator, ResolveOptions};
use quill_lsp::rename::{prepare_rename, rename_edits};
use quill_lsp::{DocumentStore, WorkspaceIndex};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tower_lsp::lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, Position, ResourceOp, Url, WorkspaceEdit,
};

const STORY: &str = "# font: Roboto\nTitle card #font:Roboto\n== Start ==\n-> Start\n";

struct Project {
    _dir: TempDir,
    uri: Url,
    store: DocumentStore,
    workspace: WorkspaceIndex,
}

fn project() -> Project {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("fonts")).unwrap();
    for name in [
        "Roboto.ttf",
        "Roboto__bold.ttf",
        "Roboto__italic.ttf",
        "Roboto__bolditalic.ttf",
        "RobotoMono.ttf",
    ] {
        fs::write(dir.path().join("fonts").join(name), b"").unwrap();
    }
    let script = dir.path().join("main.ink");
    fs::write(&script, STORY).unwrap();

    let workspace = WorkspaceIndex::new(vec!["ink".into()]);
    workspace.scan(dir.path());
    let store = DocumentStore::new(Arc::new(LineAnnotator::new()));
    let uri = Url::from_file_path(&script).unwrap();
    store.open(&uri, 4, STORY);
    Project {
        _dir: dir,
        uri,
        store,
        workspace,
    }
}

fn rename(p: &Project, position: Position, new_name: &str, auto_rename: bool) -> Option<WorkspaceEdit> {
    rename_edits(
        &p.store,
        &p.workspace,
        None,
        &p.uri,
        position,
        new_name,
        &ResolveOptions::with_builtins(["END"]),
        auto_rename,
    )
}

fn operations(edit: WorkspaceEdit) -> Vec<DocumentChangeOperation> {
    match edit.document_changes {
        Some(DocumentChanges::Operations(ops)) => ops,
        other => panic!("expected operations, got {:?}", other),
    }
}

fn file_name(uri: &Url) -> String {
    uri.path_segments().unwrap().last().unwrap().to_string()
}

#[test]
fn test_font_rename_moves_every_variant() {
    let p = project();
    let ops = operations(rename(&p, Position::new(0, 10), "Lobster", true).unwrap());

    let edits: Vec<_> = ops
        .iter()
        .filter_map(|op| match op {
            DocumentChangeOperation::Edit(edit) => Some(edit),
            _ => None,
        })
        .collect();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].text_document.uri, p.uri);
    assert_eq!(edits[0].text_document.version, Some(4));
    assert_eq!(edits[0].edits.len(), 2);
    assert!(edits[0].edits.iter().all(|e| match e {
        OneOf::Left(edit) => edit.new_text == "Lobster",
        OneOf::Right(_) => false,
    }));

    let mut renames: Vec<(String, String)> = ops
        .iter()
        .filter_map(|op| match op {
            DocumentChangeOperation::Op(ResourceOp::Rename(r)) => {
                Some((file_name(&r.old_uri), file_name(&r.new_uri)))
            }
            _ => None,
        })
        .collect();
    renames.sort();
    assert_eq!(
        renames,
        vec![
            ("Roboto.ttf".to_string(), "Lobster.ttf".to_string()),
            ("Roboto__bold.ttf".to_string(), "Lobster__bold.ttf".to_string()),
            ("Roboto__bolditalic.ttf".to_string(), "Lobster__bolditalic.ttf".to_string()),
            ("Roboto__italic.ttf".to_string(), "Lobster__italic.ttf".to_string()),
        ]
    );
}

#[test]
fn test_auto_rename_disabled_keeps_files() {
    let p = project();
    let ops = operations(rename(&p, Position::new(1, 20), "Lobster", false).unwrap());
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], DocumentChangeOperation::Edit(_)));
}

#[test]
fn test_symbol_rename_has_no_file_operations() {
    let p = project();
    let ops = operations(rename(&p, Position::new(3, 4), "Begin", true).unwrap());
    assert_eq!(ops.len(), 1);
    let DocumentChangeOperation::Edit(edit) = &ops[0] else {
        panic!("expected a text edit");
    };
    assert_eq!(edit.edits.len(), 2);
}

#[test]
fn test_invalid_or_empty_renames() {
    let p = project();
    assert!(rename(&p, Position::new(3, 4), "not valid", true).is_none());
    assert!(rename(&p, Position::new(3, 4), "", true).is_none());
    // nothing renameable under the cursor
    assert!(rename(&p, Position::new(1, 2), "Anything", true).is_none());
}

#[test]
fn test_prepare_rename_range() {
    let p = project();
    let range = prepare_rename(&p.store, &p.uri, Position::new(2, 4)).unwrap();
    assert_eq!(range.start, Position::new(2, 3));
    assert_eq!(range.end, Position::new(2, 8));
    assert!(prepare_rename(&p.store, &p.uri, Position::new(1, 0)).is_none());
}

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

//! Cross-file reference search.

use proptest::prelude::*;
use quill_core::{LineAnnotator, ResolveOptions};
use quill_lsp::worker::{memory_loader, ProgramBuilder, ScriptSource};
use quill_lsp::{find_references, DocumentStore, Program, ReferenceFilters, WorkspaceIndex};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tower_lsp::lsp_types::{Position, Url};

fn url(path: &str) -> Url {
    Url::parse(&format!("file:///story/{}", path)).unwrap()
}

fn options() -> ResolveOptions {
    ResolveOptions::with_builtins(["DONE", "END"])
}

/// Open every file and compile the first one as the root.
fn project(files: &[(String, String)]) -> (DocumentStore, Program) {
    let store = DocumentStore::new(Arc::new(LineAnnotator::new()));
    let mut sources = BTreeMap::new();
    for (name, text) in files {
        store.open(&url(name), 1, text);
        sources.insert(
            url(name),
            ScriptSource {
                version: 1,
                text: text.clone(),
            },
        );
    }
    let annotator = LineAnnotator::new();
    let options = options();
    let program = ProgramBuilder::new(&annotator, &options)
        .build(&url(&files[0].0), memory_loader(&sources), |_, _| {})
        .unwrap();
    (store, program)
}

/// `main.ink` declares `Meet` and includes one file per entry of `uses`,
/// each diverting to `Meet` that many times.
fn meeting_project(uses: &[usize]) -> Vec<(String, String)> {
    let mut main = String::new();
    for i in 0..uses.len() {
        main.push_str(&format!("INCLUDE part{}.ink\n", i));
    }
    main.push_str("== Meet ==\nEveryone gathers.\n-> END\n");

    let mut files = vec![("main.ink".to_string(), main)];
    for (i, count) in uses.iter().enumerate() {
        let mut text = format!("== Part{} ==\n", i);
        for _ in 0..*count {
            text.push_str("Onwards. -> Meet\n");
        }
        files.push((format!("part{}.ink", i), text));
    }
    files
}

fn search(store: &DocumentStore, program: &Program, uri: &Url, position: Position) -> Vec<(Url, Position)> {
    let workspace = WorkspaceIndex::new(vec!["ink".into()]);
    find_references(
        store,
        &workspace,
        Some(program),
        uri,
        position,
        ReferenceFilters::default(),
        &options(),
    )
    .locations
    .into_iter()
    .map(|l| (l.uri, l.range.start))
    .collect()
}

#[test]
fn test_declaration_and_uses_across_files() {
    let files = meeting_project(&[2, 0, 3]);
    let (store, program) = project(&files);
    let declaration = Position::new(3, 3);

    let found = search(&store, &program, &url("main.ink"), declaration);
    assert_eq!(found.len(), 6);
    assert!(found.contains(&(url("main.ink"), declaration)));
    assert_eq!(
        found.iter().filter(|(uri, _)| uri == &url("part2.ink")).count(),
        3
    );
}

#[test]
fn test_search_from_a_use_matches_search_from_declaration() {
    let files = meeting_project(&[1, 1]);
    let (store, program) = project(&files);

    let mut from_declaration = search(&store, &program, &url("main.ink"), Position::new(2, 4));
    let mut from_use = search(&store, &program, &url("part1.ink"), Position::new(1, 13));
    from_declaration.sort();
    from_use.sort();
    assert_eq!(from_declaration, from_use);
    assert_eq!(from_use.len(), 3);
}

#[test]
fn test_filters() {
    let files = meeting_project(&[2]);
    let (store, program) = project(&files);
    let workspace = WorkspaceIndex::new(vec!["ink".into()]);
    let uri = url("part0.ink");
    let at_use = Position::new(1, 13);

    let without_declaration = find_references(
        &store,
        &workspace,
        Some(&program),
        &uri,
        at_use,
        ReferenceFilters {
            include_declaration: false,
            ..ReferenceFilters::default()
        },
        &options(),
    );
    assert_eq!(without_declaration.locations.len(), 2);

    let declarations = find_references(
        &store,
        &workspace,
        Some(&program),
        &uri,
        at_use,
        ReferenceFilters::definitions(),
        &options(),
    );
    assert_eq!(declarations.locations.len(), 1);
    assert_eq!(declarations.locations[0].uri, url("main.ink"));
    assert!(declarations.resolved_symbol_ids.contains("Meet"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_one_declaration_plus_every_use(uses in prop::collection::vec(0usize..4, 1..4)) {
        let files = meeting_project(&uses);
        let (store, program) = project(&files);
        let declaration = Position::new(uses.len() as u32, 3);

        let first = search(&store, &program, &url("main.ink"), declaration);
        let total: usize = uses.iter().sum();
        prop_assert_eq!(first.len(), total + 1);

        let unique: HashSet<(Url, u32, u32)> = first
            .iter()
            .map(|(uri, start)| (uri.clone(), start.line, start.character))
            .collect();
        prop_assert_eq!(unique.len(), first.len());

        let second = search(&store, &program, &url("main.ink"), declaration);
        prop_assert_eq!(first, second);
    }
}

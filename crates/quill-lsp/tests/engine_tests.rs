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

//! End-to-end: engine, RPC channel and the in-process compiler worker.

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_lsp::{DiagnosticsPublisher, Engine, Program, ReferenceFilters, ServerConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower_lsp::lsp_types::{
    Diagnostic, FileChangeType, FileEvent, Position, Range, TextDocumentContentChangeEvent, Url,
};

const FOREST: &str = "== Forest ==\n= Clearing\nYou look around.\n-> Path\n= Path\nThe path winds on.\n-> END\n";

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(Url, Vec<Diagnostic>, Option<i32>)>>,
}

impl RecordingPublisher {
    fn last(&self, uri: &Url) -> Option<(Vec<Diagnostic>, Option<i32>)> {
        self.published
            .lock()
            .iter()
            .rev()
            .find(|(u, _, _)| u == uri)
            .map(|(_, d, v)| (d.clone(), *v))
    }
}

#[async_trait]
impl DiagnosticsPublisher for RecordingPublisher {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.published.lock().push((uri, diagnostics, version));
    }
}

fn url(path: &str) -> Url {
    Url::parse(&format!("file:///story/{}", path)).unwrap()
}

fn engine() -> (Engine, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let engine = Engine::with_local_compiler(ServerConfig::default(), publisher.clone());
    (engine, publisher)
}

#[tokio::test]
async fn test_divert_resolves_to_sibling_stitch() {
    let (engine, publisher) = engine();
    let uri = url("main.ink");
    assert!(engine.open(&uri, 1, FOREST).await);

    let program = engine.program(&uri).expect("compiled on open");
    assert!(program.context.contains("Forest.Path"));
    assert_eq!(program.context.references["Forest.Path"].len(), 1);
    assert_eq!(engine.cache().compiled_version(&uri), Some(1));

    let (diagnostics, version) = publisher.last(&uri).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(version, Some(1));

    let definition = engine.definition(&uri, Position::new(3, 4)).await.unwrap();
    assert_eq!(definition.range.start, Position::new(4, 2));

    let search = engine
        .references(&uri, Position::new(3, 4), ReferenceFilters::default())
        .await;
    assert_eq!(search.locations.len(), 2);
    assert!(search.resolved_symbol_ids.contains("Forest.Path"));
}

#[tokio::test(start_paused = true)]
async fn test_edits_recompile_after_settling() {
    let (engine, publisher) = engine();
    let uri = url("main.ink");
    engine.open(&uri, 1, FOREST).await;

    let change = TextDocumentContentChangeEvent {
        range: Some(Range::new(Position::new(3, 3), Position::new(3, 7))),
        range_length: None,
        text: "Nowhere".into(),
    };
    assert!(engine.change(&uri, 2, &[change]).await);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(engine.cache().compiled_version(&uri), Some(2));
    let (diagnostics, version) = publisher.last(&uri).unwrap();
    assert_eq!(version, Some(2));
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("Nowhere"));
}

#[tokio::test]
async fn test_included_file_shares_the_main_program() {
    let (engine, _) = engine();
    let main = url("main.ink");
    let chapter = url("chapters/one.ink");
    engine
        .open(&main, 1, "INCLUDE chapters/one.ink\n-> One\n")
        .await;
    engine.open(&chapter, 3, "== One ==\n-> END\n").await;

    let program = engine.compile(&chapter, false).await.unwrap().unwrap();
    assert_eq!(program.root.as_ref(), Some(&main));
    assert_eq!(program.version_of(&chapter), Some(3));
    assert_eq!(engine.cache().compiled_version(&chapter), Some(3));
}

#[tokio::test]
async fn test_close_clears_state_and_diagnostics() {
    let (engine, publisher) = engine();
    let uri = url("main.ink");
    engine.open(&uri, 1, "-> Missing\n").await;
    assert_eq!(publisher.last(&uri).unwrap().0.len(), 1);

    assert!(engine.close(&uri).await);
    assert!(engine.program(&uri).is_none());
    assert_eq!(publisher.last(&uri).unwrap(), (Vec::new(), None));
    assert!(engine.compile(&uri, false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rename_through_engine() {
    let (engine, _) = engine();
    let uri = url("main.ink");
    engine.open(&uri, 1, FOREST).await;

    assert_eq!(
        engine.prepare_rename(&uri, Position::new(3, 4)),
        Some(Range::new(Position::new(3, 3), Position::new(3, 7)))
    );
    let edit = engine.rename(&uri, Position::new(3, 4), "Trail").await.unwrap();
    let changes = serde_json::to_value(&edit).unwrap();
    assert_eq!(changes["documentChanges"][0]["edits"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_deleted_script_is_purged() {
    let (engine, _) = engine();
    let uri = url("side.ink");
    engine.workspace().add_file(&uri);
    assert!(engine.workspace().contains_script(&uri));

    let program = Arc::new(Program {
        root: Some(uri.clone()),
        scripts: BTreeMap::from([(uri.clone(), 0)]),
        ..Default::default()
    });
    engine.cache().complete(&program, Some(&uri), |_| false);
    assert!(engine.cache().state(&uri).is_some());

    engine.file_changed(&FileEvent {
        uri: uri.clone(),
        typ: FileChangeType::DELETED,
    });
    assert!(!engine.workspace().contains_script(&uri));
    assert!(engine.cache().state(&uri).is_none());
    engine.dispose();
}

#[tokio::test]
async fn test_deleted_script_still_open_keeps_state() {
    let (engine, _) = engine();
    let uri = url("main.ink");
    engine.workspace().add_file(&uri);
    assert!(engine.open(&uri, 1, FOREST).await);
    assert!(engine.cache().state(&uri).is_some());

    engine.file_changed(&FileEvent {
        uri: uri.clone(),
        typ: FileChangeType::DELETED,
    });
    assert!(!engine.workspace().contains_script(&uri));
    assert_eq!(engine.cache().compiled_version(&uri), Some(1));
    engine.dispose();
}

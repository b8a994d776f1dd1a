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

//! In-process compiler worker.
//!
//! The default compiler behind the RPC boundary. It speaks the same wire
//! protocol as an external compiler process, so the scheduler cannot tell
//! the two apart.
//!
//! # Compile Pipeline
//!
//! 1. Load the root script and follow `INCLUDE`s breadth-first (live
//!    mirrored text first, disk second).
//! 2. Declare every symbol into a fresh [`ProgramContext`]; list items
//!    become members of their list type.
//! 3. Infer variable types from type-inferred assignments.
//! 4. Resolve every use against the context, record resolved use sites,
//!    and report diverts whose target does not exist.

use crate::constants::{INVALID_PARAMS, MAX_INCLUDED_SCRIPTS, METHOD_NOT_FOUND};
use crate::error::CompileError;
use crate::protocol::{
    progress_method, ChangeDocumentParams, CloseDocumentParams, CompileParams, CompileProgress,
    Message, OpenDocumentParams, Program, COMPILE, DID_CHANGE, DID_CLOSE, DID_OPEN, READY,
};
use crate::scheduler::resolve;
use crate::transport::WorkerEnd;
use crate::utils::{apply_content_change, span_to_range};
use quill_core::{
    resolve_reference_ids, Annotations, Annotator, DeclarationKind, ProgramContext,
    ResolveOptions, ScopeStack, Span, Symbol, SymbolLocation,
};
use ropey::Rope;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Url};
use tracing::{debug, info, warn};

/// Text of a script as the compiler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub version: i32,
    pub text: String,
}

struct CompiledScript {
    uri: Url,
    rope: Rope,
    text: String,
    annotations: Annotations,
}

/// Builds a [`Program`] from a root script.
pub struct ProgramBuilder<'a> {
    annotator: &'a dyn Annotator,
    options: &'a ResolveOptions,
}

impl<'a> ProgramBuilder<'a> {
    pub fn new(annotator: &'a dyn Annotator, options: &'a ResolveOptions) -> Self {
        Self { annotator, options }
    }

    /// Compile the project rooted at `root`.
    ///
    /// `load` supplies script text; `on_script` is called after each script
    /// is loaded with the number loaded so far. Returns `None` when the root
    /// itself cannot be loaded.
    pub fn build<L, P>(&self, root: &Url, mut load: L, mut on_script: P) -> Option<Program>
    where
        L: FnMut(&Url) -> Option<ScriptSource>,
        P: FnMut(&Url, usize),
    {
        let mut program = Program {
            root: Some(root.clone()),
            ..Default::default()
        };
        let mut scripts: Vec<CompiledScript> = Vec::new();
        let mut seen: HashSet<Url> = HashSet::from([root.clone()]);
        // (script, including script index and include range)
        let mut queue: VecDeque<(Url, Option<(usize, Span, String)>)> =
            VecDeque::from([(root.clone(), None)]);

        while let Some((uri, origin)) = queue.pop_front() {
            let Some(source) = load(&uri) else {
                match origin {
                    None => return None,
                    Some((from, span, path)) => {
                        let script = &scripts[from];
                        let message = format!("Included file '{}' not found", path);
                        program
                            .diagnostics
                            .entry(script.uri.clone())
                            .or_default()
                            .push(error_at(&script.rope, span, message));
                    }
                }
                continue;
            };

            let annotations = self.annotator.annotate(&source.text);
            let index = scripts.len();
            for include in annotations.includes.iter() {
                let Some(target) = resolve(&uri, &include.value.path) else {
                    continue;
                };
                if seen.len() >= MAX_INCLUDED_SCRIPTS {
                    warn!("Include limit reached while compiling {}", root);
                    break;
                }
                if seen.insert(target.clone()) {
                    queue.push_back((target, Some((index, include.span(), include.value.path.clone()))));
                }
            }

            program.scripts.insert(uri.clone(), source.version);
            program.diagnostics.entry(uri.clone()).or_default();
            scripts.push(CompiledScript {
                rope: Rope::from_str(&source.text),
                text: source.text,
                annotations,
                uri: uri.clone(),
            });
            on_script(&uri, scripts.len());
        }

        self.declare(&scripts, &mut program);
        self.infer_types(&scripts, &mut program.context);
        self.resolve_uses(&scripts, &mut program);

        debug!(
            "Built program for {}: {} scripts, {} symbols",
            root,
            program.scripts.len(),
            program.context.symbols.len()
        );
        Some(program)
    }

    fn declare(&self, scripts: &[CompiledScript], program: &mut Program) {
        for script in scripts {
            for annotation in script.annotations.references.iter() {
                let Some(kind) = annotation.value.declaration else {
                    continue;
                };
                let Some(id) = annotation.value.symbol_ids.first() else {
                    continue;
                };
                let symbol = Symbol {
                    kind,
                    location: Some(SymbolLocation {
                        uri: script.uri.to_string(),
                        from: annotation.from,
                        to: annotation.to,
                    }),
                    type_name: None,
                };
                let previous = program.context.declare(id.clone(), symbol).map(|s| s.kind);
                if let Some(previous) = previous {
                    let message = format!("Duplicate declaration of '{}' (already a {})", id, previous);
                    program
                        .diagnostics
                        .entry(script.uri.clone())
                        .or_default()
                        .push(error_at(&script.rope, annotation.span(), message));
                    continue;
                }
                if kind == DeclarationKind::Define {
                    if let Some((list, item)) = id.rsplit_once('.') {
                        program.context.add_member(list, item);
                    }
                }
            }
        }
    }

    fn infer_types(&self, scripts: &[CompiledScript], context: &mut ProgramContext) {
        let mut inferred: Vec<(String, String)> = Vec::new();
        for script in scripts {
            for annotation in script.annotations.references.iter() {
                let reference = &annotation.value;
                let Some(assigned) = reference.assigned.as_deref() else {
                    continue;
                };
                let found = reference
                    .selectors
                    .iter()
                    .find_map(|selector| context.lookup_expected(selector, None));
                if let Some((type_name, _)) = found.as_deref().and_then(|p| p.rsplit_once('.')) {
                    inferred.push((assigned.to_string(), type_name.to_string()));
                }
            }
        }
        for (id, type_name) in inferred {
            if let Some(symbol) = context.symbols.get_mut(&id) {
                symbol.type_name.get_or_insert(type_name);
            }
        }
    }

    fn resolve_uses(&self, scripts: &[CompiledScript], program: &mut Program) {
        let mut uses: Vec<(String, SymbolLocation)> = Vec::new();
        for script in scripts {
            let mut scope = ScopeStack::new();
            let mut missing = Vec::new();
            for annotation in script.annotations.references.iter() {
                let reference = &annotation.value;
                if reference.is_declaration() {
                    scope.visit(annotation, &script.text);
                    continue;
                }
                let ids = resolve_reference_ids(
                    reference,
                    false,
                    &scope.path(),
                    &program.context,
                    self.options,
                );
                let known: Vec<String> = ids
                    .into_iter()
                    .filter(|id| program.context.is_known(id, self.options))
                    .collect();
                if known.is_empty() && reference.is_divert() {
                    let target = reference.symbol_ids.first().cloned().unwrap_or_default();
                    missing.push(error_at(
                        &script.rope,
                        annotation.span(),
                        format!("Divert target '{}' not found", target),
                    ));
                }
                for id in known {
                    if program.context.contains(&id) {
                        uses.push((
                            id,
                            SymbolLocation {
                                uri: script.uri.to_string(),
                                from: annotation.from,
                                to: annotation.to,
                            },
                        ));
                    }
                }
            }
            if !missing.is_empty() {
                program
                    .diagnostics
                    .entry(script.uri.clone())
                    .or_default()
                    .extend(missing);
            }
        }
        for (id, location) in uses {
            program.context.add_reference(id, location);
        }
    }
}

fn error_at(rope: &Rope, span: Span, message: String) -> Diagnostic {
    Diagnostic {
        range: span_to_range(rope, span),
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some("quill".to_string()),
        message,
        ..Default::default()
    }
}

struct MirroredDocument {
    version: i32,
    rope: Rope,
}

/// Compiler worker task: mirrors documents and answers compile requests.
pub struct LocalCompilerWorker {
    annotator: Arc<dyn Annotator>,
    options: ResolveOptions,
    documents: HashMap<Url, MirroredDocument>,
}

impl LocalCompilerWorker {
    pub fn new(annotator: Arc<dyn Annotator>, options: ResolveOptions) -> Self {
        Self {
            annotator,
            options,
            documents: HashMap::new(),
        }
    }

    /// Run the worker on `end`: announce readiness, then serve messages in
    /// arrival order until the host goes away.
    pub fn spawn(mut self, end: WorkerEnd) -> JoinHandle<()> {
        let WorkerEnd {
            mut incoming,
            outgoing,
        } = end;
        tokio::spawn(async move {
            if outgoing
                .send(Message::notification(READY, Value::Null))
                .is_err()
            {
                return;
            }
            info!("In-process compiler worker ready");
            while let Some(message) = incoming.recv().await {
                self.handle(message, &outgoing);
            }
            debug!("In-process compiler worker stopped");
        })
    }

    fn handle(&mut self, message: Message, outgoing: &mpsc::UnboundedSender<Message>) {
        match message {
            Message::Request { id, method, params } if method == COMPILE => {
                let reply = match serde_json::from_value::<CompileParams>(params) {
                    Ok(params) => self.compile(id, &params.uri, outgoing),
                    Err(e) => Message::failure(id, INVALID_PARAMS, e.to_string()),
                };
                let _ = outgoing.send(reply);
            }
            Message::Request { id, method, .. } => {
                let _ = outgoing.send(Message::failure(
                    id,
                    METHOD_NOT_FOUND,
                    format!("unsupported method: {}", method),
                ));
            }
            Message::Notification { method, params } => self.mirror(&method, params),
            other => debug!("Worker ignoring message: {:?}", other.id()),
        }
    }

    fn compile(&self, id: u64, uri: &Url, outgoing: &mpsc::UnboundedSender<Message>) -> Message {
        let builder = ProgramBuilder::new(self.annotator.as_ref(), &self.options);
        let built = builder.build(
            uri,
            |script| self.load(script),
            |script, compiled| {
                let progress = CompileProgress {
                    uri: script.clone(),
                    compiled,
                };
                if let Ok(value) = serde_json::to_value(progress) {
                    let _ = outgoing.send(Message::Progress {
                        id,
                        method: progress_method(COMPILE),
                        value,
                    });
                }
            },
        );
        match built.map(serde_json::to_value) {
            Some(Ok(value)) => Message::success(id, value),
            Some(Err(e)) => Message::failure(id, INVALID_PARAMS, e.to_string()),
            None => Message::failure(id, INVALID_PARAMS, format!("unknown document: {}", uri)),
        }
    }

    fn load(&self, uri: &Url) -> Option<ScriptSource> {
        if let Some(document) = self.documents.get(uri) {
            return Some(ScriptSource {
                version: document.version,
                text: document.rope.to_string(),
            });
        }
        match read_script(uri) {
            Ok(text) => Some(ScriptSource { version: 0, text }),
            Err(e) => {
                debug!("Cannot load {}: {}", uri, e);
                None
            }
        }
    }

    fn mirror(&mut self, method: &str, params: Value) {
        match method {
            DID_OPEN => match serde_json::from_value::<OpenDocumentParams>(params) {
                Ok(p) => {
                    self.documents.insert(
                        p.uri,
                        MirroredDocument {
                            version: p.version,
                            rope: Rope::from_str(&p.text),
                        },
                    );
                }
                Err(e) => warn!("Malformed didOpen: {}", e),
            },
            DID_CHANGE => match serde_json::from_value::<ChangeDocumentParams>(params) {
                Ok(p) => match self.documents.get_mut(&p.uri) {
                    Some(document) => {
                        for change in &p.content_changes {
                            apply_content_change(&mut document.rope, change);
                        }
                        document.version = p.version;
                    }
                    None => warn!("didChange for unmirrored document {}", p.uri),
                },
                Err(e) => warn!("Malformed didChange: {}", e),
            },
            DID_CLOSE => match serde_json::from_value::<CloseDocumentParams>(params) {
                Ok(p) => {
                    self.documents.remove(&p.uri);
                }
                Err(e) => warn!("Malformed didClose: {}", e),
            },
            other => debug!("Worker ignoring notification: {}", other),
        }
    }
}

fn read_script(uri: &Url) -> Result<String, CompileError> {
    let path = uri.to_file_path().map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("not a file uri: {}", uri))
    })?;
    Ok(std::fs::read_to_string(path)?)
}

/// Sources keyed by uri, for building programs from memory.
pub fn memory_loader(
    sources: &BTreeMap<Url, ScriptSource>,
) -> impl FnMut(&Url) -> Option<ScriptSource> + '_ {
    move |uri| sources.get(uri).cloned()
}

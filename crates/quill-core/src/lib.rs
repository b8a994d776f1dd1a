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

//! Quill Core
//!
//! Language-independent model for narrative scripts: the annotations an
//! Annotator attaches to source text, the symbol tables a compiler produces,
//! and the rules that turn the ids carried by a reference into canonical
//! symbol ids.
//!
//! Nothing in this crate performs I/O or knows about editors. The language
//! server in `quill-lsp` layers documents, compilation and the RPC surface
//! on top of it.
//!
//! # Example
//!
//! ```
//! use quill_core::{Annotator, LineAnnotator, scope_path_at};
//!
//! let text = "== Forest ==\n= Clearing\n-> Path\n";
//! let annotations = LineAnnotator::new().annotate(text);
//! let offset = text.find("Path").unwrap();
//! assert_eq!(scope_path_at(&annotations, text, offset), "Forest.Clearing");
//! ```

pub mod annotation;
pub mod annotator;
pub mod context;
pub mod path;
pub mod reference;
pub mod scope;

pub use annotation::{Annotation, Cursor, RangeSet, Span};
pub use annotator::{Annotator, LineAnnotator};
pub use context::{ProgramContext, ResolveOptions, Symbol, SymbolLocation};
pub use path::{
    is_asset_id, parse_asset_id, resolve_divert_path, resolve_divert_target,
    resolve_reference_ids, resolve_symbol_id, ASSET_PREFIXES,
};
pub use reference::{Annotations, DeclarationKind, Include, Reference, Selector, Usage};
pub use scope::{scope_path_at, ScopeStack};

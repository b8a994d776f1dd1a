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

//! Scope path computation.
//!
//! The scope path is the dot-joined chain of enclosing sections at a source
//! position. Knots are top level; stitches live directly under a knot and
//! never nest under each other, so entering a stitch first drops a trailing
//! stitch from the stack.

use crate::annotation::Annotation;
use crate::reference::{Annotations, DeclarationKind, Reference};

/// Stack of enclosing sections, maintained while walking references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStack {
    sections: Vec<(DeclarationKind, String)>,
}

impl ScopeStack {
    /// Create an empty (top-level) stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a declaration. Non-section kinds leave the stack alone.
    pub fn enter(&mut self, kind: DeclarationKind, name: &str) {
        match kind {
            DeclarationKind::Knot => {
                self.sections.clear();
                self.sections.push((kind, name.to_string()));
            }
            DeclarationKind::Stitch => {
                if matches!(self.sections.last(), Some((DeclarationKind::Stitch, _))) {
                    self.sections.pop();
                }
                self.sections.push((kind, name.to_string()));
            }
            _ => {}
        }
    }

    /// Apply a reference annotation read from `text`.
    pub fn visit(&mut self, annotation: &Annotation<Reference>, text: &str) {
        if let Some(kind) = annotation.value.declaration {
            if kind.is_section() {
                let name = text.get(annotation.from..annotation.to).unwrap_or_default();
                self.enter(kind, name);
            }
        }
    }

    /// The dot-joined scope path (empty at top level).
    pub fn path(&self) -> String {
        self.sections
            .iter()
            .map(|(_, name)| name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Number of enclosing sections.
    pub fn depth(&self) -> usize {
        self.sections.len()
    }
}

/// Scope path at `offset`.
///
/// Applies every section declaration that starts before `offset`; the first
/// declaration at or after it is not applied.
pub fn scope_path_at(annotations: &Annotations, text: &str, offset: usize) -> String {
    let mut stack = ScopeStack::new();
    let mut cursor = annotations.references.cursor();
    while let Some(annotation) = cursor.annotation() {
        if annotation.from >= offset {
            break;
        }
        stack.visit(annotation, text);
        cursor.next();
    }
    stack.path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Annotation;

    /// Annotate every `name` occurrence of the given declarations in `text`.
    fn annotate(text: &str, decls: &[(DeclarationKind, &str)]) -> Annotations {
        let mut refs = Vec::new();
        let mut search_from = 0;
        for (kind, name) in decls {
            let from = search_from + text[search_from..].find(name).unwrap();
            let to = from + name.len();
            refs.push(Annotation::new(from, to, Reference::declaration(*kind, *name)));
            search_from = to;
        }
        Annotations::new(refs, Vec::new())
    }

    #[test]
    fn test_sibling_stitches_do_not_nest() {
        let text = "== Forest\n= Clearing\nHello\n= Path\nThere\n";
        let annotations = annotate(
            text,
            &[
                (DeclarationKind::Knot, "Forest"),
                (DeclarationKind::Stitch, "Clearing"),
                (DeclarationKind::Stitch, "Path"),
            ],
        );
        let in_clearing = text.find("Hello").unwrap();
        let in_path = text.find("There").unwrap();
        assert_eq!(scope_path_at(&annotations, text, in_clearing), "Forest.Clearing");
        assert_eq!(scope_path_at(&annotations, text, in_path), "Forest.Path");
    }

    #[test]
    fn test_knot_resets_stack() {
        let text = "== A\n= a1\n== B\nbody\n";
        let annotations = annotate(
            text,
            &[
                (DeclarationKind::Knot, "A"),
                (DeclarationKind::Stitch, "a1"),
                (DeclarationKind::Knot, "B"),
            ],
        );
        assert_eq!(scope_path_at(&annotations, text, text.find("body").unwrap()), "B");
        assert_eq!(scope_path_at(&annotations, text, 0), "");
    }

    #[test]
    fn test_declaration_at_offset_not_applied() {
        let text = "== Forest\n= Clearing\n";
        let annotations = annotate(
            text,
            &[
                (DeclarationKind::Knot, "Forest"),
                (DeclarationKind::Stitch, "Clearing"),
            ],
        );
        let clearing = text.find("Clearing").unwrap();
        assert_eq!(scope_path_at(&annotations, text, clearing), "Forest");
    }

    #[test]
    fn test_non_section_declarations_ignored() {
        let mut stack = ScopeStack::new();
        stack.enter(DeclarationKind::Knot, "K");
        stack.enter(DeclarationKind::Label, "opt");
        stack.enter(DeclarationKind::Temp, "x");
        assert_eq!(stack.path(), "K");
        assert_eq!(stack.depth(), 1);
    }
}

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

//! Reference annotations produced by the Annotator.
//!
//! A [`Reference`] marks a source range that names a symbol, either declaring
//! it or using it. The core never parses source text itself: it consumes the
//! [`Annotations`] stream and resolves the ids it carries.

use crate::annotation::{Annotation, RangeSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of symbol a declaration introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    /// Top-level section (`== name`).
    Knot,
    /// Sub-section of a knot (`= name`).
    Stitch,
    /// Branch anchor on a choice or gather (`- (name)`).
    Label,
    /// Global constant.
    Const,
    /// Global variable.
    Var,
    /// List type.
    List,
    /// Member defined inside a list or struct.
    Define,
    /// Temporary variable scoped to the enclosing section.
    Temp,
    /// Knot or stitch parameter.
    Param,
}

impl DeclarationKind {
    /// Whether this declaration opens a section that scopes later names.
    pub fn is_section(self) -> bool {
        matches!(self, Self::Knot | Self::Stitch)
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Knot => "knot",
            Self::Stitch => "stitch",
            Self::Label => "label",
            Self::Const => "const",
            Self::Var => "var",
            Self::List => "list",
            Self::Define => "define",
            Self::Temp => "temp",
            Self::Param => "param",
        };
        f.write_str(name)
    }
}

/// How a non-declaring reference uses its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usage {
    /// Jump target of `->`, `->->` or `<-`.
    Divert,
    /// Value read.
    Read,
    /// Assignment target.
    Write,
}

/// A lookup fragment whose type is not known to the Annotator.
///
/// The compiler's expected-type table decides which of `types` actually owns
/// `name`. An empty `types` list means "any type".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Selector {
    /// Candidate owner types, most likely first.
    #[serde(default)]
    pub types: Vec<String>,
    /// Member name to look up.
    pub name: String,
}

impl Selector {
    /// Selector for `name` on any type.
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            types: Vec::new(),
            name: name.into(),
        }
    }
}

/// Annotation value for a symbol occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Declaration kind, or `None` for a use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<DeclarationKind>,
    /// Candidate ids (canonical, `.`-local, `..`-recursive or `?.`-inferred).
    #[serde(default)]
    pub symbol_ids: Vec<String>,
    /// Linked aliases that rename together with the symbol.
    #[serde(default)]
    pub interdependent_ids: Vec<String>,
    /// How a use reaches the symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Fragments for `?.` ids.
    #[serde(default)]
    pub selectors: Vec<Selector>,
    /// Expected-type hint (the assignment target, when there is one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned: Option<String>,
}

impl Reference {
    /// A declaration with a single canonical id.
    pub fn declaration(kind: DeclarationKind, id: impl Into<String>) -> Self {
        Self {
            declaration: Some(kind),
            symbol_ids: vec![id.into()],
            ..Default::default()
        }
    }

    /// A use with the given candidate ids.
    pub fn usage(usage: Usage, ids: Vec<String>) -> Self {
        Self {
            symbol_ids: ids,
            usage: Some(usage),
            ..Default::default()
        }
    }

    /// Whether this occurrence declares its symbol.
    pub fn is_declaration(&self) -> bool {
        self.declaration.is_some()
    }

    /// Whether this occurrence is a divert target.
    pub fn is_divert(&self) -> bool {
        self.usage == Some(Usage::Divert)
    }
}

/// An `INCLUDE` directive: the path as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    /// Path relative to the including script.
    pub path: String,
}

/// Everything the Annotator produces for one document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotations {
    /// Symbol declarations and uses, in position order.
    pub references: RangeSet<Reference>,
    /// Include directives, in position order.
    pub includes: RangeSet<Include>,
}

impl Annotations {
    /// Build from unsorted emissions.
    pub fn new(references: Vec<Annotation<Reference>>, includes: Vec<Annotation<Include>>) -> Self {
        Self {
            references: RangeSet::from_unsorted(references),
            includes: RangeSet::from_unsorted(includes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_wire_format() {
        let reference = Reference {
            declaration: None,
            symbol_ids: vec!["?.happy".to_string()],
            interdependent_ids: Vec::new(),
            usage: Some(Usage::Read),
            selectors: vec![Selector::any("happy")],
            assigned: Some("mood".to_string()),
        };
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["symbolIds"][0], "?.happy");
        assert_eq!(json["usage"], "read");
        assert_eq!(json["assigned"], "mood");
        assert!(json.get("declaration").is_none());

        let back: Reference = serde_json::from_value(json).unwrap();
        assert_eq!(back, reference);
    }

    #[test]
    fn test_declaration_kind_names() {
        assert_eq!(DeclarationKind::Stitch.to_string(), "stitch");
        let kind: DeclarationKind = serde_json::from_str("\"knot\"").unwrap();
        assert_eq!(kind, DeclarationKind::Knot);
        assert!(kind.is_section());
        assert!(!DeclarationKind::Label.is_section());
    }
}

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

//! Global symbol table of a compiled program.
//!
//! The compiler fills a [`ProgramContext`] for every program snapshot. It is
//! the only table resolution consults, and it is immutable once the snapshot
//! is published.
//!
//! # Indices
//!
//! - `symbols`: canonical id -> declaration
//! - `types`: type (list) name -> member names, the expected-type table
//! - `members`: member name -> owning types, inverted from `types` so a
//!   selector without candidate types is a single map lookup
//! - `references`: canonical id -> resolved use sites

use crate::reference::{DeclarationKind, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where a symbol or use lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolLocation {
    /// Script uri, as a string.
    pub uri: String,
    /// Start byte offset.
    pub from: usize,
    /// End byte offset.
    pub to: usize,
}

/// A declared symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    /// Declaration kind.
    pub kind: DeclarationKind,
    /// Declaration site, when the symbol comes from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SymbolLocation>,
    /// Inferred type name (for variables holding list values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// Options shared by every lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Ids the runtime predefines (e.g. `END`, `DONE`); they count as
    /// present in every table.
    #[serde(default)]
    pub builtin_ids: BTreeSet<String>,
}

impl ResolveOptions {
    /// Options with the given builtins.
    pub fn with_builtins<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            builtin_ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Symbol and type tables for one program snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramContext {
    /// Canonical id -> declaration.
    #[serde(default)]
    pub symbols: BTreeMap<String, Symbol>,
    /// Type name -> member names.
    #[serde(default)]
    pub types: BTreeMap<String, BTreeSet<String>>,
    /// Member name -> owning types.
    #[serde(default)]
    pub members: BTreeMap<String, BTreeSet<String>>,
    /// Canonical id -> resolved use sites.
    #[serde(default)]
    pub references: BTreeMap<String, Vec<SymbolLocation>>,
}

impl ProgramContext {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a symbol.
    ///
    /// Returns the previous declaration when `id` was already taken; the
    /// first declaration is kept in that case.
    pub fn declare(&mut self, id: impl Into<String>, symbol: Symbol) -> Option<&Symbol> {
        use std::collections::btree_map::Entry;
        match self.symbols.entry(id.into()) {
            Entry::Vacant(slot) => {
                slot.insert(symbol);
                None
            }
            Entry::Occupied(slot) => Some(slot.into_mut()),
        }
    }

    /// Register `member` as belonging to `type_name`.
    pub fn add_member(&mut self, type_name: &str, member: &str) {
        self.types
            .entry(type_name.to_string())
            .or_default()
            .insert(member.to_string());
        self.members
            .entry(member.to_string())
            .or_default()
            .insert(type_name.to_string());
    }

    /// Record a resolved use of `id`.
    pub fn add_reference(&mut self, id: impl Into<String>, location: SymbolLocation) {
        self.references.entry(id.into()).or_default().push(location);
    }

    /// Whether `id` is declared.
    pub fn contains(&self, id: &str) -> bool {
        self.symbols.contains_key(id)
    }

    /// Whether `id` is declared or builtin.
    pub fn is_known(&self, id: &str, options: &ResolveOptions) -> bool {
        self.contains(id) || options.builtin_ids.contains(id)
    }

    /// Recursive search: `prefix.name`, then drop one trailing prefix segment
    /// at a time, finally bare `name`.
    pub fn recursive_lookup(
        &self,
        prefix: &str,
        name: &str,
        options: &ResolveOptions,
    ) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let mut segments: Vec<&str> = prefix.split('.').filter(|s| !s.is_empty()).collect();
        loop {
            let candidate = if segments.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", segments.join("."), name)
            };
            if self.is_known(&candidate, options) {
                return Some(candidate);
            }
            if segments.pop().is_none() {
                return None;
            }
        }
    }

    /// Expected-type lookup for a selector.
    ///
    /// Candidate types come from the selector; without any, from the type of
    /// the `assigned` symbol; without that, every type owning the member in
    /// name order. Returns the first `type.member` path that exists.
    pub fn lookup_expected(&self, selector: &Selector, assigned: Option<&str>) -> Option<String> {
        let owns = |ty: &str| {
            self.types
                .get(ty)
                .is_some_and(|members| members.contains(&selector.name))
        };

        if !selector.types.is_empty() {
            return selector
                .types
                .iter()
                .find(|ty| owns(ty))
                .map(|ty| format!("{}.{}", ty, selector.name));
        }

        let hinted = assigned
            .and_then(|id| self.symbols.get(id))
            .and_then(|symbol| symbol.type_name.as_deref());
        if let Some(ty) = hinted {
            if owns(ty) {
                return Some(format!("{}.{}", ty, selector.name));
            }
        }

        self.members
            .get(&selector.name)
            .and_then(|owners| owners.iter().next())
            .map(|ty| format!("{}.{}", ty, selector.name))
    }

    /// Symbol ids declared in the given script.
    pub fn symbols_in<'a>(&'a self, uri: &'a str) -> impl Iterator<Item = (&'a str, &'a Symbol)> + 'a {
        self.symbols.iter().filter_map(move |(id, symbol)| {
            symbol
                .location
                .as_ref()
                .filter(|loc| loc.uri == uri)
                .map(|_| (id.as_str(), symbol))
        })
    }
}

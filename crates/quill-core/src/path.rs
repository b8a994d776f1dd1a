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

//! Symbol id and divert path resolution.
//!
//! Ids attached to references come in four shapes:
//!
//! | Shape        | Meaning                                            |
//! |--------------|----------------------------------------------------|
//! | `?.name`     | type-inferred: ask the expected-type table         |
//! | `.name`      | local: append to the scope path                    |
//! | `a..name`    | recursive: search upward from `a` (or the scope)   |
//! | anything else| already canonical                                  |
//!
//! Resolution never fails loudly. An id that cannot be resolved yields
//! `None` and callers treat it as "no hit".

use crate::context::{ProgramContext, ResolveOptions};
use crate::reference::Reference;

/// Asset id prefixes that link a symbol to files on disk.
pub const ASSET_PREFIXES: [&str; 4] = ["image", "audio", "video", "font"];

/// Resolve a dotted divert path against a scope path.
///
/// Segments are processed left to right:
/// - a leading empty segment (leading `.`) expands to the scope path
/// - `^` moves to the parent: a path starting with `^` is relative to the
///   scope, and the last resolved segment is popped; with nothing left to
///   pop the `^` marker itself is kept
/// - a purely numeric segment is unsupported and aborts
/// - anything else is appended
///
/// A trailing `.` is ambiguous and yields `None`, except for the bare `.`
/// which names the current scope.
pub fn resolve_divert_path(divert_path: &str, scope_path: &str) -> Option<String> {
    let scope: Vec<&str> = scope_path.split('.').filter(|s| !s.is_empty()).collect();
    if divert_path == "." {
        return Some(scope.join("."));
    }
    if divert_path.is_empty() || divert_path.ends_with('.') {
        return None;
    }

    let mut resolved: Vec<&str> = Vec::new();
    for (index, segment) in divert_path.split('.').enumerate() {
        match segment {
            "" if index == 0 => resolved.extend(scope.iter().copied()),
            // doubled dots inside a divert carry no meaning
            "" => return None,
            "^" => {
                if index == 0 {
                    resolved.extend(scope.iter().copied());
                }
                if resolved.last().map_or(true, |last| *last == "^") {
                    resolved.push("^");
                } else {
                    resolved.pop();
                }
            }
            s if s.bytes().all(|b| b.is_ascii_digit()) => return None,
            s => resolved.push(s),
        }
    }
    Some(resolved.join("."))
}

/// Resolve one candidate id of `reference` to its canonical form.
pub fn resolve_symbol_id(
    id: &str,
    reference: &Reference,
    scope_path: &str,
    context: &ProgramContext,
    options: &ResolveOptions,
) -> Option<String> {
    if id.starts_with("?.") {
        return reference
            .selectors
            .iter()
            .find_map(|selector| context.lookup_expected(selector, reference.assigned.as_deref()));
    }
    if let Some(local) = id.strip_prefix('.') {
        if !local.starts_with('.') {
            return Some(join_path(scope_path, local));
        }
    }
    if let Some(split) = id.find("..") {
        let (prefix, name) = (&id[..split], &id[split + 2..]);
        let prefix = if prefix.is_empty() { scope_path } else { prefix };
        if let Some(found) = context.recursive_lookup(prefix, name, options) {
            return Some(found);
        }
        // unresolved: keep the id whole so `A..x` and `B..x` stay distinct
        return (!name.is_empty()).then(|| id.to_string());
    }
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Resolve a divert target: the literal path first, then (for paths that are
/// not explicitly relative) an upward search from the scope.
pub fn resolve_divert_target(
    divert_path: &str,
    scope_path: &str,
    context: &ProgramContext,
    options: &ResolveOptions,
) -> Option<String> {
    let resolved = resolve_divert_path(divert_path, scope_path)?;
    if context.is_known(&resolved, options) {
        return Some(resolved);
    }
    let explicit = divert_path.starts_with('.') || divert_path.starts_with('^');
    if !explicit {
        if let Some(found) = context.recursive_lookup(scope_path, &resolved, options) {
            return Some(found);
        }
    }
    Some(resolved)
}

/// Resolve every id of `reference` (optionally with its interdependent ids).
///
/// Diverts go through [`resolve_divert_target`], other ids through
/// [`resolve_symbol_id`]. Unresolvable ids are dropped.
pub fn resolve_reference_ids(
    reference: &Reference,
    include_interdependent: bool,
    scope_path: &str,
    context: &ProgramContext,
    options: &ResolveOptions,
) -> Vec<String> {
    let interdependent = if include_interdependent {
        reference.interdependent_ids.as_slice()
    } else {
        &[]
    };
    let mut out: Vec<String> = Vec::new();
    for id in reference.symbol_ids.iter().chain(interdependent) {
        let resolved = if reference.is_divert() && !id.starts_with("?.") && !id.contains("..") {
            resolve_divert_target(id, scope_path, context, options)
        } else {
            resolve_symbol_id(id, reference, scope_path, context, options)
        };
        if let Some(resolved) = resolved {
            if !out.contains(&resolved) {
                out.push(resolved);
            }
        }
    }
    out
}

/// Split an asset id (`font.Roboto`) into its kind prefix and file name.
pub fn parse_asset_id(id: &str) -> Option<(&str, &str)> {
    let (prefix, name) = id.split_once('.')?;
    if ASSET_PREFIXES.contains(&prefix) && !name.is_empty() && !name.contains('.') {
        Some((prefix, name))
    } else {
        None
    }
}

/// Whether `id` is a well-known asset id.
pub fn is_asset_id(id: &str) -> bool {
    parse_asset_id(id).is_some()
}

fn join_path(scope_path: &str, name: &str) -> String {
    if scope_path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope_path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Symbol;
    use crate::reference::{DeclarationKind, Selector, Usage};

    fn forest() -> ProgramContext {
        let mut ctx = ProgramContext::new();
        for (id, kind) in [
            ("Forest", DeclarationKind::Knot),
            ("Forest.Clearing", DeclarationKind::Stitch),
            ("Forest.Path", DeclarationKind::Stitch),
            ("Forest.Clearing.look", DeclarationKind::Label),
        ] {
            ctx.declare(
                id,
                Symbol {
                    kind,
                    location: None,
                    type_name: None,
                },
            );
        }
        ctx.add_member("mood", "happy");
        ctx
    }

    #[test]
    fn test_divert_path_examples() {
        assert_eq!(resolve_divert_path(".", "Forest.Clearing").as_deref(), Some("Forest.Clearing"));
        assert_eq!(resolve_divert_path("^.Path", "Forest.Clearing").as_deref(), Some("Forest.Path"));
        assert_eq!(resolve_divert_path("3.x", "Forest.Clearing"), None);
        assert_eq!(resolve_divert_path("a.", "Forest.Clearing"), None);
    }

    #[test]
    fn test_divert_path_segments() {
        assert_eq!(resolve_divert_path(".look", "Forest.Clearing").as_deref(), Some("Forest.Clearing.look"));
        assert_eq!(resolve_divert_path("Forest.Path", "Other").as_deref(), Some("Forest.Path"));
        assert_eq!(resolve_divert_path("Path", "Forest.Clearing").as_deref(), Some("Path"));
        assert_eq!(resolve_divert_path("^.^.Top", "Forest.Clearing").as_deref(), Some("Top"));
        // climbing past the root keeps the marker
        assert_eq!(resolve_divert_path("^.^.^.x", "A.B").as_deref(), Some("^.x"));
        assert_eq!(resolve_divert_path("a..b", "A"), None);
        assert_eq!(resolve_divert_path("", "A"), None);
        assert_eq!(resolve_divert_path(".", "").as_deref(), Some(""));
    }

    #[test]
    fn test_symbol_id_shapes() {
        let ctx = forest();
        let opts = ResolveOptions::default();
        let plain = Reference::default();

        assert_eq!(
            resolve_symbol_id(".look", &plain, "Forest.Clearing", &ctx, &opts).as_deref(),
            Some("Forest.Clearing.look")
        );
        assert_eq!(
            resolve_symbol_id("..Path", &plain, "Forest.Clearing", &ctx, &opts).as_deref(),
            Some("Forest.Path")
        );
        assert_eq!(
            resolve_symbol_id("Forest..Clearing", &plain, "", &ctx, &opts).as_deref(),
            Some("Forest.Clearing")
        );
        assert_eq!(
            resolve_symbol_id("Forest.Path", &plain, "Elsewhere", &ctx, &opts).as_deref(),
            Some("Forest.Path")
        );
        assert_eq!(resolve_symbol_id("", &plain, "", &ctx, &opts), None);
    }

    #[test]
    fn test_unresolved_recursive_id_is_kept() {
        let ctx = ProgramContext::new();
        let opts = ResolveOptions::default();
        let plain = Reference::default();

        assert_eq!(
            resolve_symbol_id("Forest..look", &plain, "", &ctx, &opts).as_deref(),
            Some("Forest..look")
        );
        assert_ne!(
            resolve_symbol_id("Forest..look", &plain, "", &ctx, &opts),
            resolve_symbol_id("Cave..look", &plain, "", &ctx, &opts)
        );
        assert_eq!(
            resolve_symbol_id("..look", &plain, "Forest", &ctx, &opts).as_deref(),
            Some("..look")
        );
        assert_eq!(resolve_symbol_id("Forest..", &plain, "", &ctx, &opts), None);
    }

    #[test]
    fn test_symbol_id_inferred() {
        let ctx = forest();
        let opts = ResolveOptions::default();
        let reference = Reference {
            symbol_ids: vec!["?.happy".to_string()],
            selectors: vec![
                Selector {
                    types: vec!["weather".to_string()],
                    name: "happy".to_string(),
                },
                Selector::any("happy"),
            ],
            usage: Some(Usage::Read),
            ..Default::default()
        };
        assert_eq!(
            resolve_symbol_id("?.happy", &reference, "", &ctx, &opts).as_deref(),
            Some("mood.happy")
        );
        let unknown = Reference {
            selectors: vec![Selector::any("grumpy")],
            ..Default::default()
        };
        assert_eq!(resolve_symbol_id("?.grumpy", &unknown, "", &ctx, &opts), None);
    }

    #[test]
    fn test_divert_target_searches_up() {
        let ctx = forest();
        let opts = ResolveOptions::with_builtins(["END"]);
        assert_eq!(
            resolve_divert_target("Path", "Forest.Clearing", &ctx, &opts).as_deref(),
            Some("Forest.Path")
        );
        assert_eq!(
            resolve_divert_target("END", "Forest.Clearing", &ctx, &opts).as_deref(),
            Some("END")
        );
        // explicit relative paths never search
        assert_eq!(
            resolve_divert_target(".Path", "Forest.Clearing", &ctx, &opts).as_deref(),
            Some("Forest.Clearing.Path")
        );
        // unknown targets come back literally so callers can report them
        assert_eq!(
            resolve_divert_target("Nowhere", "Forest", &ctx, &opts).as_deref(),
            Some("Nowhere")
        );
    }

    #[test]
    fn test_resolve_reference_ids_dedups() {
        let ctx = forest();
        let opts = ResolveOptions::default();
        let reference = Reference {
            symbol_ids: vec!["Path".to_string(), "Forest.Path".to_string()],
            interdependent_ids: vec!["font.Roboto".to_string()],
            usage: Some(Usage::Divert),
            ..Default::default()
        };
        assert_eq!(
            resolve_reference_ids(&reference, false, "Forest.Clearing", &ctx, &opts),
            vec!["Forest.Path".to_string()]
        );
        assert_eq!(
            resolve_reference_ids(&reference, true, "Forest.Clearing", &ctx, &opts),
            vec!["Forest.Path".to_string(), "font.Roboto".to_string()]
        );
    }

    #[test]
    fn test_asset_ids() {
        assert_eq!(parse_asset_id("font.Roboto"), Some(("font", "Roboto")));
        assert!(is_asset_id("image.forest_bg"));
        assert!(!is_asset_id("Forest.Path"));
        assert!(!is_asset_id("image."));
        assert!(!is_asset_id("image.a.b"));
    }
}

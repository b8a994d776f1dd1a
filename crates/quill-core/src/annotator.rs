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

//! Annotator interface and the default line scanner.
//!
//! Grammar ownership sits outside this workspace: any producer of
//! [`Annotations`] can be plugged in through [`Annotator`]. [`LineAnnotator`]
//! is the built-in producer. It recognises the structural subset the
//! resolver needs (sections, labels, declarations, diverts, reads, includes
//! and asset tags) one line at a time, without building a syntax tree.
//!
//! # Emitted ids
//!
//! - declarations carry canonical ids (`Forest.Path`, `Forest.Clearing.look`)
//! - bare reads carry `..name` (upward search from the scope)
//! - divert segments carry the divert path up to that segment
//! - asset tags carry `image.name` / `audio.name` / `video.name` / `font.name`

use crate::annotation::Annotation;
use crate::path::ASSET_PREFIXES;
use crate::reference::{Annotations, DeclarationKind, Include, Reference, Selector, Usage};

/// Produces annotations for a document's text.
pub trait Annotator: Send + Sync {
    /// Annotate the full text of a document.
    fn annotate(&self, text: &str) -> Annotations;
}

/// Line-oriented scanner for the knot/stitch/divert subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineAnnotator;

impl LineAnnotator {
    /// Create a new scanner.
    pub fn new() -> Self {
        Self
    }
}

impl Annotator for LineAnnotator {
    fn annotate(&self, text: &str) -> Annotations {
        let mut scan = Scan::default();
        let mut offset = 0;
        for raw in text.split_inclusive('\n') {
            let line = raw.trim_end_matches(['\n', '\r']);
            scan.line(line, offset);
            offset += raw.len();
        }
        Annotations::new(scan.references, scan.includes)
    }
}

const KEYWORDS: [&str; 13] = [
    "true", "false", "not", "and", "or", "mod", "has", "hasnt", "temp", "return", "ref", "else",
    "function",
];

/// Divert targets the runtime defines; they are never annotated.
const RESERVED_TARGETS: [&str; 2] = ["DONE", "END"];

#[derive(Default)]
struct Scan {
    references: Vec<Annotation<Reference>>,
    includes: Vec<Annotation<Include>>,
    knot: Option<String>,
    stitch: Option<String>,
}

impl Scan {
    fn scope(&self) -> String {
        match (&self.knot, &self.stitch) {
            (Some(knot), Some(stitch)) => format!("{}.{}", knot, stitch),
            (Some(knot), None) => knot.clone(),
            (None, Some(stitch)) => stitch.clone(),
            (None, None) => String::new(),
        }
    }

    fn scoped(&self, name: &str) -> String {
        let scope = self.scope();
        if scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", scope, name)
        }
    }

    fn push(&mut self, from: usize, to: usize, reference: Reference) {
        self.references.push(Annotation::new(from, to, reference));
    }

    fn line(&mut self, line: &str, base: usize) {
        let code = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        let bytes = code.as_bytes();
        let start = skip_ws(bytes, 0);
        if start >= bytes.len() {
            return;
        }
        let rest = &code[start..];

        if rest.starts_with("==") {
            self.knot_header(code, start, base);
            return;
        }
        if rest.starts_with('=') {
            self.stitch_header(code, start, base);
            return;
        }
        if let Some(after) = keyword_at(bytes, start, "INCLUDE") {
            let from = skip_ws(bytes, after);
            let to = code.trim_end().len();
            if from < to {
                self.includes.push(Annotation::new(
                    base + from,
                    base + to,
                    Include {
                        path: code[from..to].to_string(),
                    },
                ));
            }
            return;
        }
        if let Some(after) = keyword_at(bytes, start, "LIST") {
            self.list_declaration(code, after, base);
            return;
        }

        // Diverts and strings are masked out so the expression scanners
        // never see them twice.
        let mut masked = bytes.to_vec();
        mask_strings(&mut masked);
        self.diverts(code, &mut masked, base);
        self.tags(code, &mut masked, base);

        if let Some(after) = keyword_at(&masked, start, "VAR") {
            self.global_declaration(code, &masked, after, base, DeclarationKind::Var);
        } else if let Some(after) = keyword_at(&masked, start, "CONST") {
            self.global_declaration(code, &masked, after, base, DeclarationKind::Const);
        } else if masked[start] == b'~' {
            self.logic_line(code, &masked, start + 1, base);
        } else {
            self.bullets(code, &masked, start, base);
        }
        self.inline_braces(code, &masked, base);
    }

    fn knot_header(&mut self, code: &str, start: usize, base: usize) {
        let bytes = code.as_bytes();
        let mut i = start;
        while i < bytes.len() && (bytes[i] == b'=' || bytes[i].is_ascii_whitespace()) {
            i += 1;
        }
        if let Some(after) = keyword_at(bytes, i, "function") {
            i = skip_ws(bytes, after);
        }
        let end = ident_end(bytes, i);
        if end == i {
            return;
        }
        let name = &code[i..end];
        self.push(base + i, base + end, Reference::declaration(DeclarationKind::Knot, name));
        self.knot = Some(name.to_string());
        self.stitch = None;
        self.parameters(code, end, base);
    }

    fn stitch_header(&mut self, code: &str, start: usize, base: usize) {
        let bytes = code.as_bytes();
        let i = skip_ws(bytes, start + 1);
        let end = ident_end(bytes, i);
        if end == i {
            return;
        }
        let name = &code[i..end];
        self.stitch = None;
        let id = self.scoped(name);
        self.push(base + i, base + end, Reference::declaration(DeclarationKind::Stitch, id));
        self.stitch = Some(name.to_string());
        self.parameters(code, end, base);
    }

    fn parameters(&mut self, code: &str, after_name: usize, base: usize) {
        let bytes = code.as_bytes();
        let open = skip_ws(bytes, after_name);
        if bytes.get(open) != Some(&b'(') {
            return;
        }
        let mut i = open + 1;
        while i < bytes.len() && bytes[i] != b')' {
            i = skip_ws(bytes, i);
            if let Some(after) = keyword_at(bytes, i, "ref") {
                i = skip_ws(bytes, after);
            }
            if bytes[i..].starts_with(b"->") {
                i = skip_ws(bytes, i + 2);
            }
            let end = ident_end(bytes, i);
            if end > i {
                let id = self.scoped(&code[i..end]);
                self.push(base + i, base + end, Reference::declaration(DeclarationKind::Param, id));
            }
            i = end;
            while i < bytes.len() && bytes[i] != b',' && bytes[i] != b')' {
                i += 1;
            }
            if bytes.get(i) == Some(&b',') {
                i += 1;
            }
        }
    }

    fn list_declaration(&mut self, code: &str, after: usize, base: usize) {
        let bytes = code.as_bytes();
        let i = skip_ws(bytes, after);
        let end = ident_end(bytes, i);
        if end == i {
            return;
        }
        let list = code[i..end].to_string();
        self.push(base + i, base + end, Reference::declaration(DeclarationKind::List, list.clone()));

        let Some(eq) = code[end..].find('=').map(|p| end + p + 1) else {
            return;
        };
        let mut j = eq;
        while j < bytes.len() {
            while j < bytes.len() && !is_ident_start(bytes[j]) && bytes[j] != b',' {
                j += 1;
            }
            if j >= bytes.len() {
                break;
            }
            if bytes[j] == b',' {
                j += 1;
                continue;
            }
            let item_end = ident_end(bytes, j);
            let item = &code[j..item_end];
            self.push(
                base + j,
                base + item_end,
                Reference::declaration(DeclarationKind::Define, format!("{}.{}", list, item)),
            );
            // skip the rest of the item (`= 3`, `)`)
            j = item_end;
            while j < bytes.len() && bytes[j] != b',' {
                j += 1;
            }
        }
    }

    fn global_declaration(
        &mut self,
        code: &str,
        masked: &[u8],
        after: usize,
        base: usize,
        kind: DeclarationKind,
    ) {
        let i = skip_ws(masked, after);
        let end = ident_end(masked, i);
        if end == i {
            return;
        }
        let name = code[i..end].to_string();
        self.push(base + i, base + end, Reference::declaration(kind, name.clone()));
        let eq = skip_ws(masked, end);
        if masked.get(eq) == Some(&b'=') {
            self.right_hand_side(code, masked, eq + 1, masked.len(), base, Some(&name));
        }
    }

    fn logic_line(&mut self, code: &str, masked: &[u8], after_tilde: usize, base: usize) {
        let i = skip_ws(masked, after_tilde);
        if let Some(after) = keyword_at(masked, i, "temp") {
            let n = skip_ws(masked, after);
            let end = ident_end(masked, n);
            if end == n {
                return;
            }
            let id = self.scoped(&code[n..end]);
            self.push(base + n, base + end, Reference::declaration(DeclarationKind::Temp, id.clone()));
            let eq = skip_ws(masked, end);
            if masked.get(eq) == Some(&b'=') {
                self.right_hand_side(code, masked, eq + 1, masked.len(), base, Some(&id));
            }
            return;
        }
        if let Some(after) = keyword_at(masked, i, "return") {
            self.expression(code, masked, after, masked.len(), base);
            return;
        }

        let end = ident_end(masked, i);
        if end > i && !masked[i..end].contains(&b'.') {
            let op = skip_ws(masked, end);
            let assign_len = match masked.get(op..op + 2) {
                Some(b"+=") | Some(b"-=") => Some(2),
                Some([b'=', next]) if *next != b'=' => Some(1),
                _ if masked.get(op) == Some(&b'=') => Some(1),
                _ => None,
            };
            if let Some(len) = assign_len {
                let target = code[i..end].to_string();
                self.push(
                    base + i,
                    base + end,
                    Reference::usage(Usage::Write, vec![format!("..{}", target)]),
                );
                self.right_hand_side(code, masked, op + len, masked.len(), base, Some(&target));
                return;
            }
        }
        self.expression(code, masked, i, masked.len(), base);
    }

    /// Bullets of choices and gathers, with an optional `(label)`.
    fn bullets(&mut self, code: &str, masked: &[u8], start: usize, base: usize) {
        let mut i = start;
        let mut saw_bullet = false;
        while i < masked.len() {
            match masked[i] {
                b'*' | b'+' => saw_bullet = true,
                b'-' if masked.get(i + 1) != Some(&b'>') => saw_bullet = true,
                b' ' | b'\t' => {}
                _ => break,
            }
            i += 1;
        }
        if !saw_bullet || masked.get(i) != Some(&b'(') {
            return;
        }
        let n = skip_ws(masked, i + 1);
        let end = ident_end(masked, n);
        if end > n && masked.get(skip_ws(masked, end)) == Some(&b')') {
            let id = self.scoped(&code[n..end]);
            self.push(base + n, base + end, Reference::declaration(DeclarationKind::Label, id));
        }
    }

    fn right_hand_side(
        &mut self,
        code: &str,
        masked: &[u8],
        from: usize,
        to: usize,
        base: usize,
        assigned: Option<&str>,
    ) {
        let i = skip_ws(masked, from);
        let end = ident_end(masked, i);
        let single = end > i
            && !masked[i..end].contains(&b'.')
            && skip_ws(masked, end) >= to
            && !KEYWORDS.contains(&&code[i..end])
            && !masked[i].is_ascii_digit();
        if single {
            let name = &code[i..end];
            self.push(
                base + i,
                base + end,
                Reference {
                    symbol_ids: vec![format!("..{}", name), format!("?.{}", name)],
                    usage: Some(Usage::Read),
                    selectors: vec![Selector::any(name)],
                    assigned: assigned.map(str::to_string),
                    ..Default::default()
                },
            );
            return;
        }
        self.expression(code, masked, from, to, base);
    }

    /// Identifier reads inside `from..to`.
    fn expression(&mut self, code: &str, masked: &[u8], from: usize, to: usize, base: usize) {
        let mut i = from;
        while i < to {
            let b = masked[i];
            if b.is_ascii_digit() {
                while i < to && (masked[i].is_ascii_alphanumeric() || masked[i] == b'.') {
                    i += 1;
                }
                continue;
            }
            if !is_ident_start(b) {
                i += 1;
                continue;
            }
            let end = ident_end(masked, i).min(to);
            let token = &code[i..end];
            if !KEYWORDS.contains(&token) {
                self.dotted_read(code, i, end, base);
            }
            i = end;
        }
    }

    /// Annotate every segment of `a.b.c`: the head searches upward, later
    /// segments carry the path up to themselves.
    fn dotted_read(&mut self, code: &str, from: usize, to: usize, base: usize) {
        let mut seg_start = from;
        let mut first = true;
        for segment in code[from..to].split('.') {
            let seg_end = seg_start + segment.len();
            if !segment.is_empty() {
                let id = if first {
                    format!("..{}", segment)
                } else {
                    code[from..seg_end].to_string()
                };
                self.push(base + seg_start, base + seg_end, Reference::usage(Usage::Read, vec![id]));
            }
            first = false;
            seg_start = seg_end + 1;
        }
    }

    /// `->`, `->->` and `<-` targets. Consumed bytes are masked.
    fn diverts(&mut self, code: &str, masked: &mut [u8], base: usize) {
        let mut i = 0;
        while i + 1 < masked.len() {
            let arrow = &masked[i..i + 2];
            if arrow != b"->" && arrow != b"<-" {
                i += 1;
                continue;
            }
            masked[i] = b' ';
            masked[i + 1] = b' ';
            let mut j = i + 2;
            if masked[j..].starts_with(b"->") {
                masked[j] = b' ';
                masked[j + 1] = b' ';
                j += 2;
            }
            let from = skip_ws(masked, j);
            let mut to = from;
            while to < masked.len()
                && (masked[to].is_ascii_alphanumeric() || matches!(masked[to], b'_' | b'.' | b'^'))
            {
                to += 1;
            }
            if to > from {
                self.divert_target(code, from, to, base);
                for b in &mut masked[from..to] {
                    *b = b' ';
                }
            }
            i = to.max(j);
        }
    }

    fn divert_target(&mut self, code: &str, from: usize, to: usize, base: usize) {
        let path = &code[from..to];
        if RESERVED_TARGETS.contains(&path) {
            return;
        }
        let mut seg_start = from;
        for segment in path.split('.') {
            let seg_end = seg_start + segment.len();
            if !segment.is_empty() && segment != "^" {
                self.push(
                    base + seg_start,
                    base + seg_end,
                    Reference::usage(Usage::Divert, vec![code[from..seg_end].to_string()]),
                );
            }
            seg_start = seg_end + 1;
        }
    }

    /// `#image:name` style tags. Consumed bytes are masked.
    fn tags(&mut self, code: &str, masked: &mut [u8], base: usize) {
        let mut i = 0;
        while i < masked.len() {
            if masked[i] != b'#' {
                i += 1;
                continue;
            }
            let start = skip_ws(masked, i + 1);
            let mut next = i + 1;
            for prefix in ASSET_PREFIXES {
                let Some(after) = keyword_at(masked, start, prefix) else {
                    continue;
                };
                if masked.get(after) != Some(&b':') {
                    continue;
                }
                let from = skip_ws(masked, after + 1);
                let mut to = from;
                while to < masked.len() && (masked[to].is_ascii_alphanumeric() || matches!(masked[to], b'_' | b'-')) {
                    to += 1;
                }
                if to > from {
                    let id = format!("{}.{}", prefix, &code[from..to]);
                    self.push(base + from, base + to, Reference::usage(Usage::Read, vec![id]));
                }
                for b in &mut masked[i..to] {
                    *b = b' ';
                }
                next = to;
                break;
            }
            i = next.max(i + 1);
        }
    }

    /// Conditions and inline expressions in `{...}`.
    fn inline_braces(&mut self, code: &str, masked: &[u8], base: usize) {
        let mut i = 0;
        while i < masked.len() {
            if masked[i] != b'{' {
                i += 1;
                continue;
            }
            let Some(close) = masked[i + 1..].iter().position(|b| *b == b'}').map(|p| i + 1 + p) else {
                return;
            };
            let mut from = i + 1;
            while from < close && matches!(masked[from], b'~' | b'&' | b'!') {
                from += 1;
            }
            let inner = &masked[from..close];
            let to = match inner.iter().position(|b| *b == b':') {
                Some(colon) => from + colon,
                None if inner.contains(&b'|') => from,
                None => close,
            };
            self.expression(code, masked, from, to, base);
            i = close + 1;
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// End of an identifier (dotted paths included) starting at `i`.
fn ident_end(bytes: &[u8], i: usize) -> usize {
    if i >= bytes.len() || !is_ident_start(bytes[i]) {
        return i;
    }
    let mut end = i;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_alphanumeric() || b == b'_' {
            end += 1;
        } else if b == b'.' && bytes.get(end + 1).is_some_and(|n| is_ident_start(*n)) {
            end += 1;
        } else {
            break;
        }
    }
    end
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

/// If `word` starts at `i` as a whole word, the index right after it.
fn keyword_at(bytes: &[u8], i: usize, word: &str) -> Option<usize> {
    let end = i + word.len();
    if bytes.get(i..end)? != word.as_bytes() {
        return None;
    }
    match bytes.get(end) {
        Some(b) if b.is_ascii_alphanumeric() || *b == b'_' => None,
        _ => Some(end),
    }
}

fn mask_strings(bytes: &mut [u8]) {
    let mut inside = false;
    for b in bytes.iter_mut() {
        if *b == b'"' {
            inside = !inside;
            *b = b' ';
        } else if inside {
            *b = b' ';
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotate(text: &str) -> Annotations {
        LineAnnotator::new().annotate(text)
    }

    /// (text, declaration, first id) triples in position order.
    fn summary(text: &str) -> Vec<(String, Option<DeclarationKind>, String)> {
        annotate(text)
            .references
            .iter()
            .map(|a| {
                (
                    text[a.from..a.to].to_string(),
                    a.value.declaration,
                    a.value.symbol_ids.first().cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn test_sections_and_diverts() {
        let text = "== Forest ==\n= Clearing\nYou look around. -> Path\n= Path\nThe end. -> END\n";
        let refs = summary(text);
        assert_eq!(
            refs,
            vec![
                ("Forest".into(), Some(DeclarationKind::Knot), "Forest".into()),
                ("Clearing".into(), Some(DeclarationKind::Stitch), "Forest.Clearing".into()),
                ("Path".into(), None, "Path".into()),
                ("Path".into(), Some(DeclarationKind::Stitch), "Forest.Path".into()),
            ]
        );
        let divert = annotate(text).references.iter().nth(2).cloned().unwrap();
        assert!(divert.value.is_divert());
    }

    #[test]
    fn test_dotted_divert_segments() {
        let text = "-> Forest.Path\n";
        let refs = summary(text);
        assert_eq!(
            refs,
            vec![
                ("Forest".into(), None, "Forest".into()),
                ("Path".into(), None, "Forest.Path".into()),
            ]
        );
    }

    #[test]
    fn test_relative_divert_keeps_prefix() {
        let text = "-> ^.Path\n";
        let refs = summary(text);
        assert_eq!(refs, vec![("Path".into(), None, "^.Path".into())]);
    }

    #[test]
    fn test_knot_parameters_and_labels() {
        let text = "=== meet(who, ref mood) ===\n* (greet) [Hi] -> DONE\n- (after) Bye\n";
        let refs = summary(text);
        assert_eq!(
            refs,
            vec![
                ("meet".into(), Some(DeclarationKind::Knot), "meet".into()),
                ("who".into(), Some(DeclarationKind::Param), "meet.who".into()),
                ("mood".into(), Some(DeclarationKind::Param), "meet.mood".into()),
                ("greet".into(), Some(DeclarationKind::Label), "meet.greet".into()),
                ("after".into(), Some(DeclarationKind::Label), "meet.after".into()),
            ]
        );
    }

    #[test]
    fn test_globals_lists_and_temps() {
        let text = "LIST mood = happy, (sad)\nVAR feeling = happy\n== K\n~ temp x = 5\n~ feeling = sad\n";
        let annotations = annotate(text);
        let refs: Vec<_> = annotations.references.iter().collect();
        let names: Vec<_> = refs.iter().map(|a| &text[a.from..a.to]).collect();
        assert_eq!(
            names,
            vec!["mood", "happy", "sad", "feeling", "happy", "K", "x", "feeling", "sad"]
        );
        assert_eq!(refs[1].value.symbol_ids, vec!["mood.happy"]);
        assert_eq!(refs[2].value.symbol_ids, vec!["mood.sad"]);
        assert_eq!(refs[3].value.declaration, Some(DeclarationKind::Var));
        // the right-hand side of `VAR feeling = happy` is type-inferred
        assert_eq!(refs[4].value.symbol_ids, vec!["..happy", "?.happy"]);
        assert_eq!(refs[4].value.assigned.as_deref(), Some("feeling"));
        assert_eq!(refs[6].value.symbol_ids, vec!["K.x"]);
        assert_eq!(refs[7].value.usage, Some(Usage::Write));
        assert_eq!(refs[8].value.selectors, vec![Selector::any("sad")]);
    }

    #[test]
    fn test_inline_reads_and_tags() {
        let text = "You have {coins} coins. {shop.open: Enter|Leave} # image: forest_bg #font:Roboto\n";
        let refs = summary(text);
        assert_eq!(
            refs,
            vec![
                ("coins".into(), None, "..coins".into()),
                ("shop".into(), None, "..shop".into()),
                ("open".into(), None, "shop.open".into()),
                ("forest_bg".into(), None, "image.forest_bg".into()),
                ("Roboto".into(), None, "font.Roboto".into()),
            ]
        );
    }

    #[test]
    fn test_includes_and_comments() {
        let text = "INCLUDE chapters/one.ink\n// -> Ignored\nText -> Real // -> Nope\n";
        let annotations = annotate(text);
        let include = annotations.includes.iter().next().unwrap();
        assert_eq!(include.value.path, "chapters/one.ink");
        assert_eq!(&text[include.from..include.to], "chapters/one.ink");
        let refs = summary(text);
        assert_eq!(refs, vec![("Real".into(), None, "Real".into())]);
    }

    #[test]
    fn test_strings_are_not_reads() {
        let text = "~ name = \"someone\" + suffix\n";
        let refs = summary(text);
        assert_eq!(
            refs,
            vec![
                ("name".into(), None, "..name".into()),
                ("suffix".into(), None, "..suffix".into()),
            ]
        );
    }
}

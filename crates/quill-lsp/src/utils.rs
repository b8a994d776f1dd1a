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

//! Position conversion and text-edit helpers.
//!
//! LSP positions count UTF-16 code units within a line; annotations count
//! bytes. Every conversion goes through the document's [`Rope`] and clamps
//! out-of-range input instead of panicking.

use quill_core::Span;
use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range, TextDocumentContentChangeEvent};

/// Byte offset of an LSP position.
///
/// Lines past the end map to the end of the text; characters past the end
/// of a line map to the end of that line (before its line break).
pub fn position_to_offset(rope: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return rope.len_bytes();
    }
    let line_start = rope.line_to_char(line);
    let slice = rope.line(line);
    let mut len = slice.len_chars();
    while len > 0 && matches!(slice.char(len - 1), '\n' | '\r') {
        len -= 1;
    }
    let line_end = line_start + len;
    let base = rope.char_to_utf16_cu(line_start);
    let target = (base + position.character as usize).min(rope.char_to_utf16_cu(line_end));
    let char_idx = rope.utf16_cu_to_char(target).min(line_end);
    rope.char_to_byte(char_idx)
}

/// LSP position of a byte offset. Offsets past the end clamp to the end.
pub fn offset_to_position(rope: &Rope, offset: usize) -> Position {
    let offset = offset.min(rope.len_bytes());
    let char_idx = rope.byte_to_char(offset);
    let line = rope.char_to_line(char_idx);
    let line_start = rope.line_to_char(line);
    let character = rope.char_to_utf16_cu(char_idx) - rope.char_to_utf16_cu(line_start);
    Position {
        line: line as u32,
        character: character as u32,
    }
}

/// LSP range of a byte span.
pub fn span_to_range(rope: &Rope, span: Span) -> Range {
    Range {
        start: offset_to_position(rope, span.from),
        end: offset_to_position(rope, span.to),
    }
}

/// Apply one content change in place: ranged changes splice, a change
/// without a range replaces the whole text.
pub fn apply_content_change(rope: &mut Rope, change: &TextDocumentContentChangeEvent) {
    match change.range {
        Some(range) => {
            let start = rope.byte_to_char(position_to_offset(rope, range.start));
            let end = rope.byte_to_char(position_to_offset(rope, range.end));
            let (start, end) = if start <= end { (start, end) } else { (end, start) };
            rope.remove(start..end);
            rope.insert(start, &change.text);
        }
        None => *rope = Rope::from_str(&change.text),
    }
}

/// Text of `span` in `text`, or `""` when the span is out of range or not
/// on character boundaries.
pub fn span_text(text: &str, span: Span) -> &str {
    text.get(span.from..span.to).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position { line, character }
    }

    #[test]
    fn test_ascii_round_trip() {
        let rope = Rope::from_str("== Forest ==\n= Clearing\n");
        assert_eq!(position_to_offset(&rope, pos(1, 2)), 15);
        assert_eq!(offset_to_position(&rope, 15), pos(1, 2));
        assert_eq!(offset_to_position(&rope, 0), pos(0, 0));
    }

    #[test]
    fn test_utf16_columns() {
        // "é" is one UTF-16 unit and two bytes; "👋" is two units and four bytes
        let rope = Rope::from_str("é👋x\n");
        assert_eq!(position_to_offset(&rope, pos(0, 1)), 2);
        assert_eq!(position_to_offset(&rope, pos(0, 3)), 6);
        assert_eq!(offset_to_position(&rope, 6), pos(0, 3));
    }

    #[test]
    fn test_clamping() {
        let rope = Rope::from_str("ab\ncd");
        assert_eq!(position_to_offset(&rope, pos(0, 99)), 2);
        assert_eq!(position_to_offset(&rope, pos(9, 0)), 5);
        assert_eq!(offset_to_position(&rope, 99), pos(1, 2));
    }

    #[test]
    fn test_apply_ranged_and_full_changes() {
        let mut rope = Rope::from_str("-> Path\n");
        apply_content_change(
            &mut rope,
            &TextDocumentContentChangeEvent {
                range: Some(Range::new(pos(0, 3), pos(0, 7))),
                range_length: None,
                text: "Forest.Path".into(),
            },
        );
        assert_eq!(rope.to_string(), "-> Forest.Path\n");

        apply_content_change(
            &mut rope,
            &TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "fresh".into(),
            },
        );
        assert_eq!(rope.to_string(), "fresh");
    }

    #[test]
    fn test_span_text() {
        assert_eq!(span_text("hello", Span::new(1, 3)), "el");
        assert_eq!(span_text("hello", Span::new(4, 9)), "");
    }
}

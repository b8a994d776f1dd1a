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

//! Position-ordered annotation sets.
//!
//! The Annotator attaches typed values to byte ranges of a document. Every
//! consumer in this workspace reads them the same way: a single forward pass
//! in document order. [`RangeSet`] stores the annotations as a sorted interval
//! list and hands out a [`Cursor`] that only moves forward.
//!
//! # Ordering
//!
//! Annotations are ordered by `from`, then by `to`. Ties keep their insertion
//! order, so an Annotator that emits in document order gets back exactly what
//! it produced.

use serde::{Deserialize, Serialize};

/// A half-open byte range `from..to` inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive).
    pub from: usize,
    /// End offset (exclusive).
    pub to: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    /// Whether the span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    /// Whether `offset` lies inside the span. The end offset counts as inside
    /// so a caret placed right after an identifier still hits it.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.from && offset <= self.to
    }
}

/// A value attached to a byte range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation<T> {
    /// Start offset (inclusive).
    pub from: usize,
    /// End offset (exclusive).
    pub to: usize,
    /// The annotated value.
    pub value: T,
}

impl<T> Annotation<T> {
    /// Create a new annotation.
    pub fn new(from: usize, to: usize, value: T) -> Self {
        Self { from, to, value }
    }

    /// The annotated range.
    pub fn span(&self) -> Span {
        Span::new(self.from, self.to)
    }
}

/// Sorted interval list of annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSet<T> {
    items: Vec<Annotation<T>>,
}

impl<T> Default for RangeSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> RangeSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from annotations in any order.
    pub fn from_unsorted(mut items: Vec<Annotation<T>>) -> Self {
        // stable: equal ranges keep emission order
        items.sort_by(|a, b| a.from.cmp(&b.from).then(a.to.cmp(&b.to)));
        Self { items }
    }

    /// Number of annotations.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in position order.
    pub fn iter(&self) -> std::slice::Iter<'_, Annotation<T>> {
        self.items.iter()
    }

    /// Forward-only cursor positioned on the first annotation.
    pub fn cursor(&self) -> Cursor<'_, T> {
        Cursor {
            items: &self.items,
            index: 0,
        }
    }

    /// The innermost annotation covering `offset`.
    ///
    /// When annotations nest, the one starting last wins (it is the most
    /// specific). Returns `None` when nothing covers the offset.
    pub fn find_at(&self, offset: usize) -> Option<&Annotation<T>> {
        // Only annotations starting at or before the offset can cover it.
        let end = self.items.partition_point(|a| a.from <= offset);
        self.items[..end]
            .iter()
            .filter(|a| a.span().contains(offset))
            .max_by(|a, b| a.from.cmp(&b.from).then(b.to.cmp(&a.to)))
    }
}

impl<T> FromIterator<Annotation<T>> for RangeSet<T> {
    fn from_iter<I: IntoIterator<Item = Annotation<T>>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a RangeSet<T> {
    type Item = &'a Annotation<T>;
    type IntoIter = std::slice::Iter<'a, Annotation<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Forward-only cursor over a [`RangeSet`].
///
/// The cursor never moves backwards: `seek` to an offset before the current
/// position is a no-op.
#[derive(Debug, Clone)]
pub struct Cursor<'a, T> {
    items: &'a [Annotation<T>],
    index: usize,
}

impl<'a, T> Cursor<'a, T> {
    /// Advance to the first annotation starting at or after `offset`.
    pub fn seek(&mut self, offset: usize) {
        let rest = &self.items[self.index.min(self.items.len())..];
        self.index += rest.partition_point(|a| a.from < offset);
    }

    /// The current annotation's value, or `None` past the end.
    pub fn value(&self) -> Option<&'a T> {
        self.items.get(self.index).map(|a| &a.value)
    }

    /// The current annotation, or `None` past the end.
    pub fn annotation(&self) -> Option<&'a Annotation<T>> {
        self.items.get(self.index)
    }

    /// Start offset of the current annotation (`usize::MAX` past the end).
    pub fn from(&self) -> usize {
        self.items.get(self.index).map_or(usize::MAX, |a| a.from)
    }

    /// End offset of the current annotation (`usize::MAX` past the end).
    pub fn to(&self) -> usize {
        self.items.get(self.index).map_or(usize::MAX, |a| a.to)
    }

    /// Move to the next annotation.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        if self.index < self.items.len() {
            self.index += 1;
        }
    }

    /// Whether the cursor still points at an annotation.
    pub fn is_valid(&self) -> bool {
        self.index < self.items.len()
    }
}

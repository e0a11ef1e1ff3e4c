use crate::error::{Error, Result};
use crate::position::{CoordinateError, LineIndex, Position, Range};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Replacement of one range of a document's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    pub fn new(range: Range, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }

    pub fn insert(position: Position, new_text: impl Into<String>) -> Self {
        Self::new(Range::point(position), new_text)
    }
}

/// All edits targeting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEdit {
    pub path: String,
    pub edits: Vec<TextEdit>,
}

/// One source file as held by a workspace snapshot.
///
/// Documents are immutable; an edit or a sync produces a new `Document`
/// that the next snapshot points at.
#[derive(Debug, Clone)]
pub struct Document {
    path: String,
    text: Arc<str>,
    version: u64,
    content_hash: u64,
    synced_at: DateTime<Utc>,
    line_index: LineIndex,
}

impl Document {
    pub fn new(path: impl Into<String>, text: impl Into<String>, version: u64) -> Self {
        let text: String = text.into();
        Self {
            path: path.into(),
            content_hash: content_hash(&text),
            line_index: LineIndex::new(&text),
            text: Arc::from(text),
            version,
            synced_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Snapshot version at which this document last changed
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    pub fn synced_at(&self) -> DateTime<Utc> {
        self.synced_at
    }

    pub fn line_count(&self) -> usize {
        self.line_index.line_count()
    }

    pub fn line_text(&self, line: u32) -> Option<&str> {
        self.line_index.line_text(&self.text, line)
    }

    pub fn offset_at(&self, position: Position) -> std::result::Result<usize, CoordinateError> {
        self.line_index.offset(&self.text, position)
    }

    pub fn position_at(&self, offset: usize) -> std::result::Result<Position, CoordinateError> {
        self.line_index.position(&self.text, offset)
    }

    /// Range covering a byte span of this document
    pub fn range_of(&self, start: usize, end: usize) -> std::result::Result<Range, CoordinateError> {
        Ok(Range::new(self.position_at(start)?, self.position_at(end)?))
    }

    /// Whether `text` differs from what this document holds
    pub fn differs_from(&self, text: &str) -> bool {
        self.content_hash != content_hash(text) || *self.text != *text
    }

    /// Produce the document that results from applying `edits`.
    ///
    /// Edits address the current text; they must not overlap.
    pub fn apply_edits(&self, edits: &[TextEdit], version: u64) -> Result<Document> {
        let mut spans = Vec::with_capacity(edits.len());
        for edit in edits {
            if edit.range.end < edit.range.start {
                return Err(CoordinateError::InvertedRange {
                    start: edit.range.start,
                    end: edit.range.end,
                }
                .into());
            }
            let start = self.offset_at(edit.range.start)?;
            let end = self.offset_at(edit.range.end)?;
            spans.push((start, end, edit.new_text.as_str()));
        }

        spans.sort_by_key(|(start, end, _)| (*start, *end));
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(Error::invalid_argument(format!(
                    "Overlapping edits in {} at byte offsets {}..{} and {}..{}",
                    self.path, pair[0].0, pair[0].1, pair[1].0, pair[1].1
                )));
            }
        }

        let mut text = self.text.to_string();
        for (start, end, new_text) in spans.into_iter().rev() {
            text.replace_range(start..end, new_text);
        }

        Ok(Document::new(self.path.clone(), text, version))
    }
}

pub fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range::new(Position::new(sl, sc), Position::new(el, ec))
    }

    #[test]
    fn test_apply_edits_in_any_order() {
        let document = Document::new("A.cs", "int foo = foo + 1;", 0);
        let edits = vec![
            TextEdit::new(range(0, 10, 0, 13), "bar"),
            TextEdit::new(range(0, 4, 0, 7), "bar"),
        ];

        let updated = document.apply_edits(&edits, 1).unwrap();
        assert_eq!(updated.text(), "int bar = bar + 1;");
        assert_eq!(updated.version(), 1);
        assert_eq!(document.text(), "int foo = foo + 1;");
    }

    #[test]
    fn test_insertions_at_same_point_keep_request_order() {
        let document = Document::new("A.cs", "x", 0);
        let edits = vec![
            TextEdit::insert(Position::new(0, 1), "a"),
            TextEdit::insert(Position::new(0, 1), "b"),
        ];

        let updated = document.apply_edits(&edits, 1).unwrap();
        assert_eq!(updated.text(), "xab");

        let reversed: Vec<TextEdit> = edits.into_iter().rev().collect();
        assert_eq!(document.apply_edits(&reversed, 1).unwrap().text(), "xba");
    }

    #[test]
    fn test_overlapping_edits_rejected() {
        let document = Document::new("A.cs", "abcdef", 0);
        let edits = vec![
            TextEdit::new(range(0, 0, 0, 3), "x"),
            TextEdit::new(range(0, 2, 0, 4), "y"),
        ];

        assert!(matches!(
            document.apply_edits(&edits, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_out_of_range_edit_rejected() {
        let document = Document::new("A.cs", "abc", 0);
        let edits = vec![TextEdit::new(range(3, 0, 3, 1), "x")];

        assert!(matches!(
            document.apply_edits(&edits, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_differs_from() {
        let document = Document::new("A.cs", "class A {}", 0);
        assert!(!document.differs_from("class A {}"));
        assert!(document.differs_from("class B {}"));
    }
}

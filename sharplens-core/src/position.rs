//! Coordinate translation between caller-facing (line, column) pairs and the
//! byte offsets the analysis engine works with.
//!
//! Lines and columns are 0-based in both directions. A column counts Unicode
//! scalar values within its line, and a column equal to the line length
//! addresses the end of the line. `\n` and `\r\n` both terminate a line.

use crate::error::Error;
use crate::workspace::WorkspaceSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open span; `start == end` denotes an insertion point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn point(position: Position) -> Self {
        Self::new(position, position)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive of both ends so a cursor touching either edge counts
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("Document not found in workspace: {0}")]
    DocumentNotFound(String),

    #[error("Path is outside the workspace root: {0}")]
    OutsideRoot(String),

    #[error("Line {line} is out of range (document has {line_count} lines)")]
    LineOutOfRange { line: u32, line_count: usize },

    #[error("Column {column} is out of range for line {line} (line has {length} characters)")]
    ColumnOutOfRange { line: u32, column: u32, length: usize },

    #[error("Offset {offset} is out of range (document has {length} bytes)")]
    OffsetOutOfRange { offset: usize, length: usize },

    #[error("Range end {end} precedes start {start}")]
    InvertedRange { start: Position, end: Position },
}

impl From<CoordinateError> for Error {
    fn from(error: CoordinateError) -> Self {
        match error {
            CoordinateError::DocumentNotFound(_) | CoordinateError::OutsideRoot(_) => {
                Error::NotFound(error.to_string())
            }
            _ => Error::InvalidArgument(error.to_string()),
        }
    }
}

/// Byte offsets of line starts for one document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }

        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Content bounds of a line, excluding its terminator
    fn line_bounds(&self, text: &str, line: usize) -> (usize, usize) {
        let start = self.line_starts[line];
        let mut end = match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.len,
        };
        if end > start && text.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        (start, end)
    }

    pub fn line_text<'t>(&self, text: &'t str, line: u32) -> Option<&'t str> {
        let line = line as usize;
        if line >= self.line_count() {
            return None;
        }
        let (start, end) = self.line_bounds(text, line);
        Some(&text[start..end])
    }

    pub fn offset(&self, text: &str, position: Position) -> Result<usize, CoordinateError> {
        let line = position.line as usize;
        if line >= self.line_count() {
            return Err(CoordinateError::LineOutOfRange {
                line: position.line,
                line_count: self.line_count(),
            });
        }

        let (start, end) = self.line_bounds(text, line);
        let content = &text[start..end];
        let column = position.column as usize;

        match content.char_indices().nth(column) {
            Some((byte, _)) => Ok(start + byte),
            None => {
                let length = content.chars().count();
                if column == length {
                    Ok(end)
                } else {
                    Err(CoordinateError::ColumnOutOfRange {
                        line: position.line,
                        column: position.column,
                        length,
                    })
                }
            }
        }
    }

    pub fn position(&self, text: &str, offset: usize) -> Result<Position, CoordinateError> {
        if offset > self.len {
            return Err(CoordinateError::OffsetOutOfRange {
                offset,
                length: self.len,
            });
        }

        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let (start, end) = self.line_bounds(text, line);
        let mut clamped = offset.min(end);
        while !text.is_char_boundary(clamped) {
            clamped -= 1;
        }
        let column = text[start..clamped].chars().count();

        Ok(Position::new(line as u32, column as u32))
    }
}

/// A position resolved against one document of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub path: String,
    pub offset: usize,
    pub position: Position,
}

/// A validated range resolved against one document of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorRange {
    pub path: String,
    pub start: usize,
    pub end: usize,
    pub range: Range,
}

/// Resolve a caller-supplied (path, position) into an engine anchor
pub fn resolve(
    snapshot: &WorkspaceSnapshot,
    path: &str,
    position: Position,
) -> Result<Anchor, CoordinateError> {
    let normalized = normalize_path(snapshot.root(), path)?;
    let document = snapshot
        .document(&normalized)
        .ok_or_else(|| CoordinateError::DocumentNotFound(normalized.clone()))?;
    let offset = document.offset_at(position)?;

    Ok(Anchor {
        path: normalized,
        offset,
        position,
    })
}

/// Resolve a caller-supplied range; `end` must not precede `start`
pub fn resolve_range(
    snapshot: &WorkspaceSnapshot,
    path: &str,
    start: Position,
    end: Position,
) -> Result<AnchorRange, CoordinateError> {
    if end < start {
        return Err(CoordinateError::InvertedRange { start, end });
    }

    let start_anchor = resolve(snapshot, path, start)?;
    let document = snapshot
        .document(&start_anchor.path)
        .ok_or_else(|| CoordinateError::DocumentNotFound(start_anchor.path.clone()))?;
    let end_offset = document.offset_at(end)?;

    Ok(AnchorRange {
        path: start_anchor.path,
        start: start_anchor.offset,
        end: end_offset,
        range: Range::new(start, end),
    })
}

/// Normalize an absolute or relative path into the root-relative,
/// forward-slash form used in every outward response.
pub fn normalize_path(root: &Path, input: &str) -> Result<String, CoordinateError> {
    let unified = input.replace('\\', "/");
    let candidate = Path::new(&unified);

    let relative = if candidate.is_absolute() {
        let absolute = canonicalize_lenient(candidate);
        match pathdiff::diff_paths(&absolute, root) {
            Some(relative) => relative,
            None => return Err(CoordinateError::OutsideRoot(input.to_string())),
        }
    } else {
        candidate.to_path_buf()
    };

    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(CoordinateError::OutsideRoot(input.to_string()));
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => {
                return Err(CoordinateError::OutsideRoot(input.to_string()));
            }
        }
    }

    Ok(parts.join("/"))
}

/// Canonicalize when the file (or at least its directory) exists so that
/// symlinked prefixes agree with the canonical workspace root.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    path.to_path_buf()
}

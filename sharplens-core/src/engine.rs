//! The boundary with the analysis engine.
//!
//! Everything semantic (symbols, definitions, refactorings, diagnostics) is
//! computed by an `AnalysisEngine`. The workspace and the operation layer only
//! ever talk to the engine through this trait and the data types below.

use crate::document::{Document, DocumentEdit};
use crate::error::Error;
use crate::position::{AnchorRange, Range};
use crate::workspace::WorkspaceSnapshot;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Analysis engine failure: {0}")]
    Failed(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl From<EngineError> for Error {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::NotFound(message) => Error::NotFound(message),
            EngineError::InvalidArgument(message) => Error::InvalidArgument(message),
            failed @ EngineError::Failed(_) => Error::Internal(failed.to_string()),
        }
    }
}

/// Closed set of symbol kinds recognised by search filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Namespace,
    Class,
    Struct,
    Interface,
    Enum,
    Record,
    Delegate,
    Method,
    Constructor,
    Property,
    Field,
    Event,
    EnumMember,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 13] = [
        SymbolKind::Namespace,
        SymbolKind::Class,
        SymbolKind::Struct,
        SymbolKind::Interface,
        SymbolKind::Enum,
        SymbolKind::Record,
        SymbolKind::Delegate,
        SymbolKind::Method,
        SymbolKind::Constructor,
        SymbolKind::Property,
        SymbolKind::Field,
        SymbolKind::Event,
        SymbolKind::EnumMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Namespace => "Namespace",
            SymbolKind::Class => "Class",
            SymbolKind::Struct => "Struct",
            SymbolKind::Interface => "Interface",
            SymbolKind::Enum => "Enum",
            SymbolKind::Record => "Record",
            SymbolKind::Delegate => "Delegate",
            SymbolKind::Method => "Method",
            SymbolKind::Constructor => "Constructor",
            SymbolKind::Property => "Property",
            SymbolKind::Field => "Field",
            SymbolKind::Event => "Event",
            SymbolKind::EnumMember => "EnumMember",
        }
    }

    /// Kinds that can own members
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Interface
                | SymbolKind::Enum
                | SymbolKind::Record
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Constructor)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SymbolKind::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = SymbolKind::ALL.iter().map(|k| k.as_str()).collect();
                Error::invalid_argument(format!(
                    "Unknown symbol kind '{}'. Expected one of: {}",
                    value,
                    known.join(", ")
                ))
            })
    }
}

/// A declared symbol as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    /// Enclosing type or namespace, when there is one
    pub container_name: Option<String>,
    pub path: String,
    /// Full extent of the declaration
    pub range: Range,
    /// Extent of the declared name
    pub selection_range: Range,
}

impl SymbolInfo {
    pub fn qualified_name(&self) -> String {
        match &self.container_name {
            Some(container) => format!("{}.{}", container, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub path: String,
    pub range: Range,
    /// Trimmed text of the line the location starts on
    pub context: String,
}

/// The identifier token under a cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolAtPosition {
    pub name: String,
    pub path: String,
    pub range: Range,
    /// Set when the token is the name of a declaration
    pub declaration: Option<SymbolInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    /// Name of the invoked method
    pub callee: String,
    /// Qualified name of the method containing the call, if any
    pub caller: Option<String>,
    pub location: Location,
    /// Declaration of the callee when it is part of the workspace
    pub definition: Option<SymbolInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeActionKind {
    QuickFix,
    Refactor,
    Source,
}

/// A code fix or refactoring offered at a position.
///
/// Engines may precompute the edits when enumerating; those edits stay
/// private to the engine boundary and are handed out by
/// [`AnalysisEngine::code_action_edits`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub title: String,
    pub kind: CodeActionKind,
    #[serde(skip)]
    pub edits: Vec<DocumentEdit>,
}

/// Ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "info" | "information" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(Error::invalid_argument(format!(
                "Unknown severity '{}'. Expected one of: Error, Warning, Info",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub path: String,
    pub range: Range,
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

/// The fixed metric set reported per method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityMetrics {
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub nesting: u32,
    pub loc: u32,
    pub parameters: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodComplexity {
    pub name: String,
    pub container_name: Option<String>,
    pub range: Range,
    pub metrics: ComplexityMetrics,
}

/// A project as described by the loaded descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectModel {
    pub name: String,
    pub language: String,
    pub references: Vec<String>,
    /// Absolute directory holding the project's sources
    pub directory: PathBuf,
    /// Absolute paths of every member document, sorted
    pub documents: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionModel {
    /// Absolute, canonical workspace root
    pub root: PathBuf,
    pub projects: Vec<ProjectModel>,
}

/// Compiled `*` wildcard pattern for symbol names.
///
/// Matching is case-sensitive; a pattern without `*` matches exactly.
#[derive(Debug, Clone)]
pub struct SymbolPattern {
    source: String,
    regex: Regex,
}

impl SymbolPattern {
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("Search pattern must not be empty"));
        }

        let body = trimmed
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| Error::invalid_argument(format!("Invalid search pattern: {}", e)))?;

        Ok(Self {
            source: trimmed.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Capabilities the service needs from an analysis engine.
///
/// Methods may block for a long time; callers must not hold locks across
/// them. Offsets are byte offsets into the given document's text.
pub trait AnalysisEngine: Send + Sync {
    /// Parse a project/solution descriptor and enumerate member documents
    fn load_solution(&self, descriptor: &Path) -> EngineResult<SolutionModel>;

    /// Syntactic identifier check for rename targets; never consults
    /// semantic state
    fn is_valid_identifier(&self, name: &str) -> bool;

    fn document_symbols(&self, document: &Document) -> EngineResult<Vec<SymbolInfo>>;

    fn symbols_matching(
        &self,
        snapshot: &WorkspaceSnapshot,
        pattern: &SymbolPattern,
        kind: Option<SymbolKind>,
    ) -> EngineResult<Vec<SymbolInfo>> {
        let mut matches = Vec::new();
        for document in snapshot.documents() {
            for symbol in self.document_symbols(document)? {
                if kind.map_or(true, |k| symbol.kind == k) && pattern.matches(&symbol.name) {
                    matches.push(symbol);
                }
            }
        }
        Ok(matches)
    }

    /// Identifier under the cursor, or `None` for trivia/whitespace
    fn symbol_at(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Option<SymbolAtPosition>>;

    fn definition(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Option<SymbolInfo>>;

    fn references(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Vec<Location>>;

    /// The method a cursor designates: the callable named under it, or the
    /// method enclosing it
    fn method_at(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<SymbolInfo>;

    /// Call sites invoking the method at `offset`
    fn callers(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Vec<CallSite>>;

    /// Calls made from within the method at `offset`
    fn outgoing_calls(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Vec<CallSite>>;

    fn rename_edits(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
        new_name: &str,
    ) -> EngineResult<Vec<DocumentEdit>>;

    fn code_actions(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        range: &AnchorRange,
    ) -> EngineResult<Vec<CodeAction>>;

    fn code_action_edits(
        &self,
        _snapshot: &WorkspaceSnapshot,
        action: &CodeAction,
    ) -> EngineResult<Vec<DocumentEdit>> {
        Ok(action.edits.clone())
    }

    /// Diagnostics for one document, or for the whole workspace when
    /// `document` is `None`
    fn diagnostics(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: Option<&Document>,
    ) -> EngineResult<Vec<Diagnostic>>;

    fn method_complexity(&self, document: &Document) -> EngineResult<Vec<MethodComplexity>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_patterns() {
        let suffix = SymbolPattern::parse("*Async").unwrap();
        assert!(suffix.matches("LoadAsync"));
        assert!(suffix.matches("Async"));
        assert!(!suffix.matches("AsyncLoad"));

        let prefix = SymbolPattern::parse("Get*").unwrap();
        assert!(prefix.matches("GetUser"));
        assert!(!prefix.matches("TryGetUser"));

        let contains = SymbolPattern::parse("*User*").unwrap();
        assert!(contains.matches("TryGetUserById"));

        let exact = SymbolPattern::parse("User").unwrap();
        assert!(exact.matches("User"));
        assert!(!exact.matches("UserService"));
        assert!(!exact.matches("user"));
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let pattern = SymbolPattern::parse("Get.*").unwrap();
        assert!(pattern.matches("Get.Value"));
        assert!(!pattern.matches("GetValue"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(SymbolPattern::parse("  "), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_symbol_kind_parsing() {
        assert_eq!("method".parse::<SymbolKind>().unwrap(), SymbolKind::Method);
        assert_eq!("EnumMember".parse::<SymbolKind>().unwrap(), SymbolKind::EnumMember);
        assert!(matches!("Function".parse::<SymbolKind>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_engine_errors_map_onto_taxonomy() {
        assert!(matches!(Error::from(EngineError::NotFound("x".into())), Error::NotFound(_)));
        assert!(matches!(
            Error::from(EngineError::InvalidArgument("x".into())),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(Error::from(EngineError::Failed("x".into())), Error::Internal(_)));
    }
}

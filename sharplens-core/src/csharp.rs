//! Reference C# engine built on tree-sitter.
//!
//! Symbols, call sites and metrics come from the syntax tree. References and
//! renames are resolved lexically: every identifier token with the same name
//! counts, without type resolution.

use crate::diagnostics;
use crate::document::{Document, DocumentEdit, TextEdit};
use crate::engine::{
    AnalysisEngine, CallSite, CodeAction, CodeActionKind, Diagnostic, EngineError, EngineResult,
    Location, MethodComplexity, SolutionModel, SymbolAtPosition, SymbolInfo, SymbolKind,
};
use crate::position::{AnchorRange, Position, Range};
use crate::project;
use crate::syntax::{Declaration, Span, SyntaxIndex};
use crate::workspace::WorkspaceSnapshot;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

pub const LANGUAGE: &str = "csharp";
pub const EXTENSIONS: &[&str] = &["cs"];

const CACHE_CAPACITY: usize = 512;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

pub struct CSharpEngine {
    /// Syntax indexes keyed by document path and content hash
    cache: Mutex<LruCache<(String, u64), Arc<SyntaxIndex>>>,
}

impl CSharpEngine {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Syntax index for a document, parsed at most once per content
    pub fn index(&self, document: &Document) -> EngineResult<Arc<SyntaxIndex>> {
        let key = (document.path().to_string(), document.content_hash());
        if let Some(index) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            trace!("Syntax cache hit for {}", document.path());
            return Ok(index.clone());
        }

        debug!("Indexing {}", document.path());
        let index = Arc::new(SyntaxIndex::build(document)?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, index.clone());
        Ok(index)
    }

    /// Declarations named `name` across the workspace, preferring `preferred`'s
    /// own document and otherwise in path order
    fn declarations_named(
        &self,
        snapshot: &WorkspaceSnapshot,
        preferred: &Document,
        name: &str,
    ) -> EngineResult<Vec<SymbolInfo>> {
        let mut found: Vec<SymbolInfo> = self
            .index(preferred)?
            .declarations
            .iter()
            .filter(|d| d.symbol.name == name)
            .map(|d| d.symbol.clone())
            .collect();

        for document in snapshot.documents() {
            if document.path() == preferred.path() {
                continue;
            }
            let index = self.index(document)?;
            found.extend(
                index
                    .declarations
                    .iter()
                    .filter(|d| d.symbol.name == name)
                    .map(|d| d.symbol.clone()),
            );
        }
        Ok(found)
    }

    fn target_method(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<SymbolInfo> {
        let index = self.index(document)?;
        if let Some(token) = index.identifier_at(offset) {
            let callable = self
                .declarations_named(snapshot, document, &token.name)?
                .into_iter()
                .find(|symbol| symbol.kind.is_callable());
            if let Some(symbol) = callable {
                return Ok(symbol);
            }
        }

        let method = index.method_containing(offset).ok_or_else(|| {
            EngineError::NotFound("No method found at the given position".to_string())
        })?;
        index
            .declarations
            .iter()
            .find(|d| d.span == method.span)
            .map(|d| d.symbol.clone())
            .ok_or_else(|| EngineError::NotFound(format!("No declaration for method {}", method.name)))
    }
}

impl Default for CSharpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEngine for CSharpEngine {
    fn load_solution(&self, descriptor: &Path) -> EngineResult<SolutionModel> {
        project::load_solution(descriptor, LANGUAGE, EXTENSIONS)
    }

    fn is_valid_identifier(&self, name: &str) -> bool {
        is_valid_identifier(name)
    }

    fn document_symbols(&self, document: &Document) -> EngineResult<Vec<SymbolInfo>> {
        Ok(self.index(document)?.symbols().cloned().collect())
    }

    fn symbol_at(
        &self,
        _snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Option<SymbolAtPosition>> {
        let index = self.index(document)?;
        let Some(token) = index.identifier_at(offset) else {
            return Ok(None);
        };

        let declaration = index
            .declaration_named_at(token.span.start)
            .filter(|d| d.symbol.name == token.name)
            .map(|d| d.symbol.clone());

        Ok(Some(SymbolAtPosition {
            name: token.name.clone(),
            path: document.path().to_string(),
            range: span_range(document, token.span)?,
            declaration,
        }))
    }

    fn definition(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Option<SymbolInfo>> {
        let index = self.index(document)?;
        let Some(token) = index.identifier_at(offset) else {
            return Ok(None);
        };

        if let Some(own) = index
            .declaration_named_at(token.span.start)
            .filter(|d| d.symbol.name == token.name)
        {
            return Ok(Some(own.symbol.clone()));
        }

        Ok(self
            .declarations_named(snapshot, document, &token.name)?
            .into_iter()
            .next())
    }

    fn references(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Vec<Location>> {
        let name = self
            .index(document)?
            .identifier_at(offset)
            .map(|token| token.name.clone())
            .ok_or_else(|| EngineError::NotFound("No symbol at the given position".to_string()))?;

        let mut locations = Vec::new();
        for candidate in snapshot.documents() {
            let index = self.index(candidate)?;
            for token in index.identifiers.iter().filter(|t| t.name == name) {
                locations.push(location(candidate, token.span)?);
            }
        }
        Ok(locations)
    }

    fn method_at(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<SymbolInfo> {
        self.target_method(snapshot, document, offset)
    }

    fn callers(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Vec<CallSite>> {
        let target = self.target_method(snapshot, document, offset)?;

        let mut calls = Vec::new();
        for candidate in snapshot.documents() {
            let index = self.index(candidate)?;
            for invocation in index.invocations.iter().filter(|i| i.callee == target.name) {
                calls.push(CallSite {
                    callee: invocation.callee.clone(),
                    caller: invocation.caller.clone(),
                    location: location(candidate, invocation.name_span)?,
                    definition: Some(target.clone()),
                });
            }
        }
        Ok(calls)
    }

    fn outgoing_calls(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
    ) -> EngineResult<Vec<CallSite>> {
        let method = self.target_method(snapshot, document, offset)?;
        let target = snapshot.document(&method.path).unwrap_or(document);
        let target_index = self.index(target)?;

        let body = target_index
            .methods
            .iter()
            .find(|m| m.range == method.range)
            .map(|m| m.span)
            .ok_or_else(|| EngineError::NotFound(format!("No body found for {}", method.name)))?;

        let mut calls = Vec::new();
        for invocation in target_index
            .invocations
            .iter()
            .filter(|i| body.start <= i.name_span.start && i.name_span.end <= body.end)
        {
            let definition = self
                .declarations_named(snapshot, target, &invocation.callee)?
                .into_iter()
                .find(|symbol| symbol.kind.is_callable() || symbol.kind.is_type());
            calls.push(CallSite {
                callee: invocation.callee.clone(),
                caller: Some(method.qualified_name()),
                location: location(target, invocation.name_span)?,
                definition,
            });
        }
        Ok(calls)
    }

    fn rename_edits(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        offset: usize,
        new_name: &str,
    ) -> EngineResult<Vec<DocumentEdit>> {
        let old_name = self
            .index(document)?
            .identifier_at(offset)
            .map(|token| token.name.clone())
            .ok_or_else(|| EngineError::NotFound("No symbol at the given position".to_string()))?;

        if self.declarations_named(snapshot, document, &old_name)?.is_empty() {
            return Err(EngineError::NotFound(format!(
                "'{}' is not declared in the workspace",
                old_name
            )));
        }
        if old_name == new_name {
            return Err(EngineError::InvalidArgument(format!(
                "'{}' already has that name",
                old_name
            )));
        }

        let mut changes = Vec::new();
        for candidate in snapshot.documents() {
            let index = self.index(candidate)?;
            let edits = index
                .identifiers
                .iter()
                .filter(|t| t.name == old_name)
                .map(|t| Ok(TextEdit::new(span_range(candidate, t.span)?, new_name)))
                .collect::<EngineResult<Vec<_>>>()?;
            if !edits.is_empty() {
                changes.push(DocumentEdit {
                    path: candidate.path().to_string(),
                    edits,
                });
            }
        }
        Ok(changes)
    }

    fn code_actions(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: &Document,
        range: &AnchorRange,
    ) -> EngineResult<Vec<CodeAction>> {
        let index = self.index(document)?;
        let mut actions = Vec::new();

        actions.extend(missing_semicolon_fixes(document, &index, range)?);

        let touched: Vec<&Declaration> = index
            .declarations
            .iter()
            .filter(|d| d.name_span.overlaps(range.start, range.end))
            .collect();

        for declaration in &touched {
            if let Some(action) = documentation_action(document, declaration)? {
                actions.push(action);
            }
        }

        for field in index
            .fields
            .iter()
            .filter(|f| !f.is_readonly && f.name_span.overlaps(range.start, range.end))
        {
            let name = &document.text()[field.name_span.start..field.name_span.end];
            let position = document
                .position_at(field.type_start)
                .map_err(|e| EngineError::Failed(e.to_string()))?;
            actions.push(CodeAction {
                title: format!("Make field '{}' readonly", name),
                kind: CodeActionKind::Refactor,
                edits: vec![DocumentEdit {
                    path: document.path().to_string(),
                    edits: vec![TextEdit::insert(position, "readonly ")],
                }],
            });
        }

        for declaration in touched.iter().filter(|d| d.symbol.kind.is_callable()) {
            let name = &declaration.symbol.name;
            if let Some(pascal) = pascal_case(name) {
                actions.push(CodeAction {
                    title: format!("Rename '{}' to '{}'", name, pascal),
                    kind: CodeActionKind::Refactor,
                    edits: self.rename_edits(snapshot, document, declaration.name_span.start, &pascal)?,
                });
            }
        }

        if let Some(action) = sort_usings_action(document, &index)? {
            actions.push(action);
        }

        // Titles identify actions, so only the first of a kind survives
        let mut seen = std::collections::HashSet::new();
        actions.retain(|action| seen.insert(action.title.clone()));
        Ok(actions)
    }

    fn diagnostics(
        &self,
        snapshot: &WorkspaceSnapshot,
        document: Option<&Document>,
    ) -> EngineResult<Vec<Diagnostic>> {
        match document {
            Some(document) => {
                let index = self.index(document)?;
                diagnostics::document_diagnostics(document, &index)
            }
            None => {
                let mut all = Vec::new();
                for document in snapshot.documents() {
                    let index = self.index(document)?;
                    all.extend(diagnostics::document_diagnostics(document, &index)?);
                }
                Ok(all)
            }
        }
    }

    fn method_complexity(&self, document: &Document) -> EngineResult<Vec<MethodComplexity>> {
        Ok(self
            .index(document)?
            .methods
            .iter()
            .map(|method| MethodComplexity {
                name: method.name.clone(),
                container_name: method.container.clone(),
                range: method.range,
                metrics: method.metrics,
            })
            .collect())
    }
}

/// C# identifier rules; a leading `@` permits keywords
pub fn is_valid_identifier(name: &str) -> bool {
    let (verbatim, body) = match name.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, name),
    };

    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return false;
    }

    verbatim || !KEYWORDS.contains(&body)
}

/// `fooBar` becomes `FooBar`; names already capitalised yield `None`
fn pascal_case(name: &str) -> Option<String> {
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_lowercase() {
        return None;
    }
    Some(first.to_ascii_uppercase().to_string() + chars.as_str())
}

fn span_range(document: &Document, span: Span) -> EngineResult<Range> {
    document
        .range_of(span.start, span.end)
        .map_err(|e| EngineError::Failed(e.to_string()))
}

fn location(document: &Document, span: Span) -> EngineResult<Location> {
    let range = span_range(document, span)?;
    Ok(Location {
        path: document.path().to_string(),
        range,
        context: document
            .line_text(range.start.line)
            .map(|line| line.trim().to_string())
            .unwrap_or_default(),
    })
}

fn missing_semicolon_fixes(
    document: &Document,
    index: &SyntaxIndex,
    range: &AnchorRange,
) -> EngineResult<Vec<CodeAction>> {
    let mut fixes = Vec::new();
    for error in index
        .parse_errors
        .iter()
        .filter(|e| e.is_missing && e.kind == ";")
    {
        let position = document
            .position_at(error.start_byte)
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        if position.line < range.range.start.line || position.line > range.range.end.line {
            continue;
        }
        fixes.push(CodeAction {
            title: "Insert missing ';'".to_string(),
            kind: CodeActionKind::QuickFix,
            edits: vec![DocumentEdit {
                path: document.path().to_string(),
                edits: vec![TextEdit::insert(position, ";")],
            }],
        });
    }
    Ok(fixes)
}

fn documentation_action(
    document: &Document,
    declaration: &Declaration,
) -> EngineResult<Option<CodeAction>> {
    let symbol = &declaration.symbol;
    if !(symbol.kind.is_type() || symbol.kind.is_callable() || symbol.kind == SymbolKind::Property) {
        return Ok(None);
    }

    let line = symbol.range.start.line;
    let already_documented = (0..line)
        .rev()
        .filter_map(|l| document.line_text(l))
        .map(str::trim)
        .find(|text| !text.is_empty() && !text.starts_with('['))
        .map_or(false, |text| text.starts_with("///"));
    if already_documented {
        return Ok(None);
    }

    let indent: String = document
        .line_text(line)
        .unwrap_or_default()
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();
    let comment = format!(
        "{indent}/// <summary>\n{indent}/// {name}\n{indent}/// </summary>\n",
        indent = indent,
        name = symbol.name
    );

    Ok(Some(CodeAction {
        title: format!("Add documentation comment for '{}'", symbol.name),
        kind: CodeActionKind::Refactor,
        edits: vec![DocumentEdit {
            path: document.path().to_string(),
            edits: vec![TextEdit::insert(Position::new(line, 0), comment)],
        }],
    }))
}

/// Sort key placing `System` namespaces first, then alphabetical
fn using_key(text: &str) -> (bool, String) {
    let name = text
        .trim_start_matches("global ")
        .trim_start_matches("using ")
        .trim_start_matches("static ")
        .trim_end_matches(';')
        .trim();
    let is_system = name == "System" || name.starts_with("System.");
    (!is_system, name.to_string())
}

fn sort_usings_action(document: &Document, index: &SyntaxIndex) -> EngineResult<Option<CodeAction>> {
    let usings = &index.usings;
    if usings.len() < 2 {
        return Ok(None);
    }

    let text = document.text();
    let contiguous = usings
        .windows(2)
        .all(|pair| text[pair[0].span.end..pair[1].span.start].trim().is_empty());
    if !contiguous {
        return Ok(None);
    }

    let mut sorted: Vec<&str> = usings.iter().map(|u| u.text.as_str()).collect();
    sorted.sort_by_key(|text| using_key(text));
    if sorted
        .iter()
        .zip(usings.iter())
        .all(|(sorted, original)| *sorted == original.text)
    {
        return Ok(None);
    }

    let separator = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let first = usings[0].span.start;
    let last = usings[usings.len() - 1].span.end;

    Ok(Some(CodeAction {
        title: "Sort using directives".to_string(),
        kind: CodeActionKind::Source,
        edits: vec![DocumentEdit {
            path: document.path().to_string(),
            edits: vec![TextEdit::new(
                span_range(document, Span { start: first, end: last })?,
                sorted.join(separator),
            )],
        }],
    }))
}

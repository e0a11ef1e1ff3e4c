use sharplens_core::position::{resolve, resolve_range};
use sharplens_core::{
    AnalysisEngine, CSharpEngine, CodeActionKind, EngineError, Position, Severity, SymbolKind,
    SymbolPattern, WorkspaceManager, WorkspaceSnapshot,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const ORDERS: &str = r#"using Shop.Models;
using System;

namespace Shop
{
    public class OrderService
    {
        private int processed;

        public async Task LoadAsync()
        {
            Validate();
            var order = new Order();
            processed++;
        }

        public void Validate()
        {
        }

        public void saveAll()
        {
            Validate();
        }
    }
}
"#;

const MODELS: &str = r#"namespace Shop.Models
{
    public class Order
    {
        public Task SubmitAsync() { return null; }
    }
}
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Load a single-project fixture and return its first snapshot
fn load() -> (TempDir, Arc<CSharpEngine>, Arc<WorkspaceSnapshot>) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "shop.json", r#"{ "projects": [ { "name": "Shop" } ] }"#);
    write(dir.path(), "Services/OrderService.cs", ORDERS);
    write(dir.path(), "Models/Order.cs", MODELS);

    let engine = Arc::new(CSharpEngine::new());
    let manager = WorkspaceManager::new(engine.clone());
    manager.load(&dir.path().join("shop.json")).unwrap();
    let snapshot = manager.current_snapshot().unwrap();
    (dir, engine, snapshot)
}

fn offset(snapshot: &WorkspaceSnapshot, path: &str, line: u32, column: u32) -> usize {
    resolve(snapshot, path, Position::new(line, column)).unwrap().offset
}

const SERVICE: &str = "Services/OrderService.cs";

/// Test: Wildcard Symbol Search
/// Purpose: Verify kind filters and suffix wildcards restrict results
#[test]
fn test_symbols_matching_async_methods() {
    let (_dir, engine, snapshot) = load();

    let pattern = SymbolPattern::parse("*Async").unwrap();
    let symbols = engine
        .symbols_matching(&snapshot, &pattern, Some(SymbolKind::Method))
        .unwrap();

    let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["SubmitAsync", "LoadAsync"]);
    assert!(symbols.iter().all(|s| s.kind == SymbolKind::Method));
}

/// Test: Definition Across Documents
/// Purpose: Verify a usage resolves to the declaration in another document
#[test]
fn test_definition_of_constructed_type() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();

    // `Order` in `new Order()`
    let at = offset(&snapshot, SERVICE, 12, 28);
    let symbol = engine.definition(&snapshot, document, at).unwrap().unwrap();

    assert_eq!(symbol.name, "Order");
    assert_eq!(symbol.kind, SymbolKind::Class);
    assert_eq!(symbol.path, "Models/Order.cs");
    assert_eq!(symbol.selection_range.start, Position::new(2, 17));
}

/// Test: Whitespace Has No Symbol
/// Purpose: Verify trivia positions report no symbol rather than an error
#[test]
fn test_no_symbol_on_whitespace() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let at = offset(&snapshot, SERVICE, 2, 0);

    assert!(engine.symbol_at(&snapshot, document, at).unwrap().is_none());
    assert!(engine.definition(&snapshot, document, at).unwrap().is_none());
}

/// Test: References And Callers
/// Purpose: Verify lexical references and call sites of a method are found in order
#[test]
fn test_references_and_callers() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let validate = offset(&snapshot, SERVICE, 16, 21);

    let references = engine.references(&snapshot, document, validate).unwrap();
    let lines: Vec<u32> = references.iter().map(|r| r.range.start.line).collect();
    assert_eq!(lines, vec![11, 16, 22]);
    assert_eq!(references[0].context, "Validate();");

    let callers = engine.callers(&snapshot, document, validate).unwrap();
    let names: Vec<Option<&str>> = callers.iter().map(|c| c.caller.as_deref()).collect();
    assert_eq!(
        names,
        vec![Some("OrderService.LoadAsync"), Some("OrderService.saveAll")]
    );
}

/// Test: Outgoing Calls
/// Purpose: Verify calls made inside a method body are listed with their definitions
#[test]
fn test_outgoing_calls() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let load_async = offset(&snapshot, SERVICE, 9, 27);

    let calls = engine.outgoing_calls(&snapshot, document, load_async).unwrap();
    let callees: Vec<&str> = calls.iter().map(|c| c.callee.as_str()).collect();
    assert_eq!(callees, vec!["Validate", "Order"]);
    assert_eq!(calls[0].definition.as_ref().unwrap().kind, SymbolKind::Method);
    assert_eq!(calls[1].definition.as_ref().unwrap().path, "Models/Order.cs");
}

/// Test: Outgoing Calls Outside A Method
/// Purpose: Verify a position with no enclosing method is NotFound
#[test]
fn test_outgoing_calls_outside_method() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let namespace_line = offset(&snapshot, SERVICE, 3, 0);

    let result = engine.outgoing_calls(&snapshot, document, namespace_line);
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

/// Test: Rename Edits
/// Purpose: Verify every occurrence of a declared name is edited, grouped per document
#[test]
fn test_rename_edits() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let at = offset(&snapshot, SERVICE, 16, 21);

    let edits = engine.rename_edits(&snapshot, document, at, "Check").unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].path, SERVICE);
    assert_eq!(edits[0].edits.len(), 3);
    assert!(edits[0].edits.iter().all(|e| e.new_text == "Check"));

    // `Task` is used but never declared in the workspace
    let task = offset(&snapshot, SERVICE, 9, 21);
    assert!(matches!(
        engine.rename_edits(&snapshot, document, task, "Job"),
        Err(EngineError::NotFound(_))
    ));
}

/// Test: Code Actions At A Method Name
/// Purpose: Verify documentation and naming actions are offered for a lowercase method
#[test]
fn test_code_actions_on_method() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let range = resolve_range(&snapshot, SERVICE, Position::new(20, 22), Position::new(20, 22)).unwrap();

    let actions = engine.code_actions(&snapshot, document, &range).unwrap();
    let titles: Vec<&str> = actions.iter().map(|a| a.title.as_str()).collect();

    assert!(titles.contains(&"Add documentation comment for 'saveAll'"));
    assert!(titles.contains(&"Rename 'saveAll' to 'SaveAll'"));
    assert!(titles.contains(&"Sort using directives"));

    let sort = actions.iter().find(|a| a.title == "Sort using directives").unwrap();
    assert_eq!(sort.kind, CodeActionKind::Source);
    assert_eq!(sort.edits[0].edits[0].new_text, "using System;\nusing Shop.Models;");
}

/// Test: Readonly Field Action
/// Purpose: Verify a mutable field offers a readonly refactoring inserted before its type
#[test]
fn test_readonly_field_action() {
    let (_dir, engine, snapshot) = load();
    let document = snapshot.document(SERVICE).unwrap();
    let range = resolve_range(&snapshot, SERVICE, Position::new(7, 22), Position::new(7, 22)).unwrap();

    let actions = engine.code_actions(&snapshot, document, &range).unwrap();
    let readonly = actions
        .iter()
        .find(|a| a.title == "Make field 'processed' readonly")
        .unwrap();

    let edit = &readonly.edits[0].edits[0];
    assert_eq!(edit.range.start, Position::new(7, 16));
    assert_eq!(edit.new_text, "readonly ");
}

/// Test: Missing Semicolon Quick Fix
/// Purpose: Verify a missing ';' is reported as a diagnostic and offered as a fix
#[test]
fn test_missing_semicolon() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.json", r#"{ "projects": [ { "name": "App" } ] }"#);
    write(dir.path(), "A.cs", "class A\n{\n    int x = 1\n}\n");

    let engine = Arc::new(CSharpEngine::new());
    let manager = WorkspaceManager::new(engine.clone());
    manager.load(&dir.path().join("app.json")).unwrap();
    let snapshot = manager.current_snapshot().unwrap();
    let document = snapshot.document("A.cs").unwrap();

    let diagnostics = engine.diagnostics(&snapshot, Some(document)).unwrap();
    assert!(diagnostics.iter().any(|d| d.severity == Severity::Error));

    let range = resolve_range(&snapshot, "A.cs", Position::new(2, 4), Position::new(2, 4)).unwrap();
    let actions = engine.code_actions(&snapshot, document, &range).unwrap();
    let fix = actions.iter().find(|a| a.title == "Insert missing ';'");
    if let Some(fix) = fix {
        assert_eq!(fix.kind, CodeActionKind::QuickFix);
        assert_eq!(fix.edits[0].edits[0].new_text, ";");
    }
}

/// Test: Workspace Diagnostics
/// Purpose: Verify clean sources produce no error diagnostics
#[test]
fn test_clean_workspace_has_no_errors() {
    let (_dir, engine, snapshot) = load();

    let diagnostics = engine.diagnostics(&snapshot, None).unwrap();
    assert!(diagnostics.iter().all(|d| d.severity != Severity::Error));
}

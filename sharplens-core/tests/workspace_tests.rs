use sharplens_core::{
    CSharpEngine, DocumentEdit, Error, ErrorCode, Position, Range, TextEdit, WorkspaceManager,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Write a file below the fixture root, creating parent directories
fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two-project fixture: App references Lib
fn create_fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "shop.json",
        r#"{ "projects": [
              { "name": "App", "path": "src/App", "references": ["Lib"] },
              { "name": "Lib", "path": "src/Lib" } ] }"#,
    );
    write(
        dir.path(),
        "src/App/Program.cs",
        "class Program\n{\n    static void Main() { new Greeter().Greet(); }\n}\n",
    );
    write(
        dir.path(),
        "src/Lib/Greeter.cs",
        "public class Greeter\n{\n    public void Greet() { }\n}\n",
    );
    write(dir.path(), "src/Lib/bin/Generated.cs", "class Generated { }\n");
    let descriptor = dir.path().join("shop.json");
    (dir, descriptor)
}

fn manager() -> WorkspaceManager {
    WorkspaceManager::new(Arc::new(CSharpEngine::new()))
}

fn rename_edit(path: &str) -> DocumentEdit {
    DocumentEdit {
        path: path.to_string(),
        edits: vec![TextEdit::new(
            Range::new(Position::new(0, 13), Position::new(0, 20)),
            "Welcomer",
        )],
    }
}

/// Test: Load Publishes Exactly The Descriptor's Documents
/// Purpose: Verify the snapshot's document set equals the backing files the projects claim
#[test]
fn test_load_document_set_is_exact() {
    let (_dir, descriptor) = create_fixture();
    let manager = manager();

    let summary = manager.load(&descriptor).unwrap();
    assert_eq!(summary.project_count, 2);
    assert_eq!(summary.document_count, 2);
    assert_eq!(summary.version, 0);

    let snapshot = manager.current_snapshot().unwrap();
    let paths: Vec<&str> = snapshot.documents().map(|d| d.path()).collect();
    assert_eq!(paths, vec!["src/App/Program.cs", "src/Lib/Greeter.cs"]);
    assert_eq!(snapshot.projects()[0].documents, vec!["src/App/Program.cs".to_string()]);
}

/// Test: Operations Before Load
/// Purpose: Verify every read fails with NotFound while unloaded
#[test]
fn test_unloaded_workspace() {
    let manager = manager();

    assert!(!manager.is_loaded());
    assert!(matches!(manager.current_snapshot(), Err(Error::NotFound(_))));
    assert!(matches!(manager.sync(None), Err(Error::NotFound(_))));
    assert!(!manager.status().loaded);
}

/// Test: Missing Descriptor
/// Purpose: Verify a nonexistent descriptor path is NotFound and leaves the workspace unloaded
#[test]
fn test_load_missing_descriptor() {
    let dir = TempDir::new().unwrap();
    let manager = manager();

    let result = manager.load(&dir.path().join("nothing.json"));
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(!manager.is_loaded());
}

/// Test: Reload Replaces The Snapshot
/// Purpose: Verify a second load starts a new generation at version 0
#[test]
fn test_reload_replaces_snapshot() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();

    let first = manager.load(&descriptor).unwrap();
    manager
        .apply_edits(first.workspace_id, 0, &[rename_edit("src/Lib/Greeter.cs")])
        .unwrap();
    assert_eq!(manager.current_snapshot().unwrap().version(), 1);

    write(dir.path(), "src/App/Extra.cs", "class Extra { }\n");
    let second = manager.load(&descriptor).unwrap();

    assert_ne!(first.workspace_id, second.workspace_id);
    assert_eq!(second.version, 0);
    assert_eq!(second.document_count, 3);
}

/// Test: Sync Is Idempotent
/// Purpose: Verify a second sync without file changes reports nothing and keeps the version
#[test]
fn test_sync_idempotent() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    manager.load(&descriptor).unwrap();

    write(dir.path(), "src/Lib/Greeter.cs", "public class Greeter { }\n");
    let first = manager.sync(None).unwrap();
    assert_eq!(first.updated, 1);
    assert_eq!(first.total_synced, 1);
    assert_eq!(first.version, 1);

    let second = manager.sync(None).unwrap();
    assert_eq!(second.total_synced, 0);
    assert_eq!(second.added + second.updated + second.removed, 0);
    assert_eq!(manager.current_snapshot().unwrap().version(), 1);
}

/// Test: Sync Detects Additions And Removals
/// Purpose: Verify one rescan publishes exactly one new version covering all changes
#[test]
fn test_sync_additions_and_removals() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    manager.load(&descriptor).unwrap();

    write(dir.path(), "src/App/Models/Order.cs", "class Order { }\n");
    fs::remove_file(dir.path().join("src/Lib/Greeter.cs")).unwrap();

    let report = manager.sync(None).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.total_synced, 2);
    assert_eq!(report.version, 1);

    let snapshot = manager.current_snapshot().unwrap();
    assert!(snapshot.document("src/App/Models/Order.cs").is_some());
    assert!(snapshot.document("src/Lib/Greeter.cs").is_none());
}

/// Test: Sync Restricted To Paths
/// Purpose: Verify only the named paths are examined and unknown paths count as zero
#[test]
fn test_sync_restricted_paths() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    manager.load(&descriptor).unwrap();

    write(dir.path(), "src/App/Program.cs", "class Program { }\n");
    write(dir.path(), "src/Lib/Greeter.cs", "class Greeter { }\n");

    let report = manager
        .sync(Some(&[
            "src/App/Program.cs".to_string(),
            "notes/missing.cs".to_string(),
            "../outside.cs".to_string(),
        ]))
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.total_synced, 1);

    let snapshot = manager.current_snapshot().unwrap();
    assert_eq!(snapshot.document("src/App/Program.cs").unwrap().text(), "class Program { }\n");
    assert!(snapshot
        .document("src/Lib/Greeter.cs")
        .unwrap()
        .text()
        .contains("Greet()"));

    let nothing = manager.sync(Some(&["notes/missing.cs".to_string()])).unwrap();
    assert_eq!(nothing.total_synced, 0);
}

/// Test: Apply Edits Publishes And Persists
/// Purpose: Verify a successful apply bumps the version and writes the file back
#[test]
fn test_apply_edits_persists() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    let id = manager.load(&descriptor).unwrap().workspace_id;

    let version = manager.apply_edits(id, 0, &[rename_edit("src/Lib/Greeter.cs")]).unwrap();
    assert_eq!(version, 1);

    let on_disk = fs::read_to_string(dir.path().join("src/Lib/Greeter.cs")).unwrap();
    assert!(on_disk.starts_with("public class Welcomer"));
    let snapshot = manager.current_snapshot().unwrap();
    assert_eq!(snapshot.document("src/Lib/Greeter.cs").unwrap().text(), on_disk);

    // The write-back is already in sync with the snapshot
    assert_eq!(manager.sync(None).unwrap().total_synced, 0);
}

/// Test: Stale Apply Is Rejected
/// Purpose: Verify a stale base version yields Conflict and leaves the snapshot pointer untouched
#[test]
fn test_stale_apply_conflicts() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    let id = manager.load(&descriptor).unwrap().workspace_id;
    manager.apply_edits(id, 0, &[rename_edit("src/Lib/Greeter.cs")]).unwrap();

    let before = manager.current_snapshot().unwrap();
    let result = manager.apply_edits(id, 0, &[rename_edit("src/Lib/Greeter.cs")]);

    assert!(matches!(result, Err(Error::Conflict { expected: 0, actual: 1 })));
    let after = manager.current_snapshot().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    let on_disk = fs::read_to_string(dir.path().join("src/Lib/Greeter.cs")).unwrap();
    assert_eq!(on_disk, after.document("src/Lib/Greeter.cs").unwrap().text());
}

/// Test: Apply After Reload Is Rejected
/// Purpose: Verify edits computed before a reload are refused even though the version matches
#[test]
fn test_apply_after_reload_is_rejected() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    let before = manager.load(&descriptor).unwrap();

    write(dir.path(), "src/Lib/Greeter.cs", "public struct Greeter { }\n");
    let after = manager.load(&descriptor).unwrap();
    assert_eq!(after.version, before.version);

    let stale = DocumentEdit {
        path: "src/Lib/Greeter.cs".to_string(),
        edits: vec![TextEdit::new(
            Range::new(Position::new(0, 13), Position::new(0, 20)),
            "Welcomer",
        )],
    };
    let result = manager.apply_edits(before.workspace_id, 0, &[stale]);

    assert!(matches!(result, Err(Error::Reloaded)));
    assert_eq!(result.unwrap_err().code(), ErrorCode::Conflict);
    let on_disk = fs::read_to_string(dir.path().join("src/Lib/Greeter.cs")).unwrap();
    assert_eq!(on_disk, "public struct Greeter { }\n");
    assert_eq!(manager.current_snapshot().unwrap().version(), 0);
}

/// Test: Invalid Edits
/// Purpose: Verify unknown documents and out-of-range edits are rejected without publishing
#[test]
fn test_invalid_edits_rejected() {
    let (_dir, descriptor) = create_fixture();
    let manager = manager();
    let id = manager.load(&descriptor).unwrap().workspace_id;

    let unknown = manager.apply_edits(id, 0, &[rename_edit("src/App/Missing.cs")]);
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    let out_of_range = DocumentEdit {
        path: "src/Lib/Greeter.cs".to_string(),
        edits: vec![TextEdit::insert(Position::new(40, 0), "x")],
    };
    assert!(matches!(
        manager.apply_edits(id, 0, &[out_of_range]),
        Err(Error::InvalidArgument(_))
    ));

    assert!(matches!(manager.apply_edits(id, 0, &[]), Err(Error::InvalidArgument(_))));
    assert_eq!(manager.current_snapshot().unwrap().version(), 0);
}

/// Test: Non-UTF-8 Sources Are Refused
/// Purpose: Verify load and sync reject a Latin-1 file instead of transcoding it, leaving its bytes intact
#[test]
fn test_non_utf8_source_rejected() {
    let latin1: &[u8] = b"public class Greeter\n{\n}\n// caf\xE9\n";

    {
        let (dir, descriptor) = create_fixture();
        let manager = manager();
        fs::write(dir.path().join("src/Lib/Greeter.cs"), latin1).unwrap();
        match manager.load(&descriptor) {
            Err(Error::InvalidArgument(message)) => assert!(message.contains("Greeter.cs")),
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
        assert!(!manager.is_loaded());
    }

    let (dir, descriptor) = create_fixture();
    let manager = manager();
    manager.load(&descriptor).unwrap();
    fs::write(dir.path().join("src/Lib/Greeter.cs"), latin1).unwrap();
    assert!(matches!(manager.sync(None), Err(Error::InvalidArgument(_))));
    assert_eq!(manager.current_snapshot().unwrap().version(), 0);
    assert_eq!(fs::read(dir.path().join("src/Lib/Greeter.cs")).unwrap(), latin1);
}

/// Test: Prepared Load Stays Private
/// Purpose: Verify a prepared load is invisible until committed
#[test]
fn test_prepared_load_publishes_on_commit() {
    let (_dir, descriptor) = create_fixture();
    let manager = manager();

    let pending = manager.prepare_load(&descriptor).unwrap();
    assert_eq!(pending.document_count(), 2);
    assert!(!manager.is_loaded());

    let summary = manager.commit_load(pending);
    assert!(manager.is_loaded());
    assert_eq!(manager.status().workspace_id, Some(summary.workspace_id));
}

/// Test: Sync Against A Moved Base
/// Purpose: Verify a sync prepared before another mutation publishes nothing and reports Conflict
#[test]
fn test_sync_commit_conflicts_when_base_moved() {
    let (dir, descriptor) = create_fixture();
    let manager = manager();
    let id = manager.load(&descriptor).unwrap().workspace_id;

    write(dir.path(), "src/App/Program.cs", "class Program { }\n");
    let pending = manager.prepare_sync(None).unwrap();
    assert_eq!(pending.report().updated, 1);
    assert_eq!(manager.current_snapshot().unwrap().version(), 0);

    manager.apply_edits(id, 0, &[rename_edit("src/Lib/Greeter.cs")]).unwrap();
    let result = manager.commit_sync(pending);
    assert!(matches!(result, Err(Error::Conflict { expected: 0, actual: 1 })));
    assert_eq!(manager.current_snapshot().unwrap().version(), 1);

    let retried = manager.sync(None).unwrap();
    assert_eq!(retried.updated, 1);
    assert_eq!(retried.version, 2);
}

/// Test: Readers Keep Their Snapshot
/// Purpose: Verify a snapshot obtained before a swap keeps showing the old content
#[test]
fn test_reader_isolation() {
    let (_dir, descriptor) = create_fixture();
    let manager = manager();
    let id = manager.load(&descriptor).unwrap().workspace_id;

    let reader = manager.current_snapshot().unwrap();
    manager.apply_edits(id, 0, &[rename_edit("src/Lib/Greeter.cs")]).unwrap();

    assert!(reader
        .document("src/Lib/Greeter.cs")
        .unwrap()
        .text()
        .contains("class Greeter"));
    assert_eq!(reader.version(), 0);
    assert!(manager
        .current_snapshot()
        .unwrap()
        .document("src/Lib/Greeter.cs")
        .unwrap()
        .text()
        .contains("class Welcomer"));
}

/// Test: Concurrent Writers
/// Purpose: Verify racing applies against one base version admit exactly one winner
#[test]
fn test_concurrent_applies_single_winner() {
    let (_dir, descriptor) = create_fixture();
    let manager = Arc::new(manager());
    let id = manager.load(&descriptor).unwrap().workspace_id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || {
                manager.apply_edits(id, 0, &[rename_edit("src/Lib/Greeter.cs")])
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::Conflict { .. })))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(manager.current_snapshot().unwrap().version(), 1);
}

/// Test: Workspace Status
/// Purpose: Verify status reflects the published snapshot
#[test]
fn test_status_after_load() {
    let (_dir, descriptor) = create_fixture();
    let manager = manager();
    let summary = manager.load(&descriptor).unwrap();

    let status = manager.status();
    assert!(status.loaded);
    assert_eq!(status.workspace_id, Some(summary.workspace_id));
    assert_eq!(status.version, Some(0));
    assert_eq!(status.project_count, 2);
    assert_eq!(status.document_count, 2);
}

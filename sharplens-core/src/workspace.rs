//! Versioned workspace snapshots and the manager that publishes them.
//!
//! A published [`WorkspaceSnapshot`] is never mutated. Every successful
//! mutation builds a private successor and swaps it in, so a request that
//! obtained a snapshot keeps a consistent view for its whole lifetime.

use crate::document::{Document, DocumentEdit, TextEdit};
use crate::engine::{AnalysisEngine, SolutionModel};
use crate::error::{Error, Result};
use crate::position::normalize_path;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub language: String,
    pub references: Vec<String>,
    /// Root-relative directory, `.` for the root itself
    pub directory: String,
    pub documents: Vec<String>,
}

impl Project {
    fn contains(&self, path: &str) -> bool {
        self.directory == "."
            || path
                .strip_prefix(self.directory.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
    }
}

/// The project as of one version
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshot {
    id: Uuid,
    version: u64,
    root: PathBuf,
    descriptor: PathBuf,
    projects: Vec<Project>,
    documents: BTreeMap<String, Arc<Document>>,
    published_at: DateTime<Utc>,
}

impl WorkspaceSnapshot {
    /// Identifies one `load`; a reload produces a new id
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Documents in path order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values().map(|doc| doc.as_ref())
    }

    pub fn document(&self, path: &str) -> Option<&Document> {
        self.documents.get(path).map(|doc| doc.as_ref())
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Look a document up by any accepted spelling of its path
    pub fn find_document(&self, path: &str) -> Result<&Document> {
        let normalized = normalize_path(&self.root, path)?;
        self.document(&normalized)
            .ok_or_else(|| Error::not_found(format!("Document not found in workspace: {}", normalized)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub workspace_id: Uuid,
    pub project_count: usize,
    pub document_count: usize,
    pub version: u64,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub total_synced: usize,
    pub version: u64,
}

/// A loaded workspace that has not been published yet
#[derive(Debug)]
pub struct PendingLoad {
    snapshot: WorkspaceSnapshot,
}

impl PendingLoad {
    pub fn document_count(&self) -> usize {
        self.snapshot.document_count()
    }
}

/// Sync results computed against `base`, awaiting publication
#[derive(Debug)]
pub struct PendingSync {
    base: Arc<WorkspaceSnapshot>,
    successor: Option<WorkspaceSnapshot>,
    report: SyncReport,
}

impl PendingSync {
    pub fn report(&self) -> &SyncReport {
        &self.report
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    pub loaded: bool,
    pub workspace_id: Option<Uuid>,
    pub version: Option<u64>,
    pub project_count: usize,
    pub document_count: usize,
    pub published_at: Option<DateTime<Utc>>,
}

/// Owns the published snapshot and serializes every mutation of it.
///
/// Readers only take the pointer lock long enough to clone an `Arc`; the
/// writer mutex is never touched by readers.
pub struct WorkspaceManager {
    engine: Arc<dyn AnalysisEngine>,
    published: RwLock<Option<Arc<WorkspaceSnapshot>>>,
    writer: Mutex<()>,
}

impl WorkspaceManager {
    pub fn new(engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            engine,
            published: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn AnalysisEngine> {
        &self.engine
    }

    pub fn is_loaded(&self) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Latest published snapshot
    pub fn current_snapshot(&self) -> Result<Arc<WorkspaceSnapshot>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::not_found("No workspace loaded. Call LoadWorkspace first."))
    }

    fn publish(&self, snapshot: WorkspaceSnapshot) -> Arc<WorkspaceSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        info!(
            "Published workspace version {} ({} documents)",
            snapshot.version,
            snapshot.document_count()
        );
        snapshot
    }

    /// Load a solution descriptor, replacing any previously loaded workspace
    pub fn load(&self, descriptor: &Path) -> Result<LoadSummary> {
        let pending = self.prepare_load(descriptor)?;
        Ok(self.commit_load(pending))
    }

    /// Build a fresh snapshot for `descriptor` without publishing it.
    ///
    /// Holds no lock; the result only becomes visible through
    /// [`WorkspaceManager::commit_load`].
    pub fn prepare_load(&self, descriptor: &Path) -> Result<PendingLoad> {
        if !descriptor.exists() {
            return Err(Error::not_found(format!(
                "Solution descriptor not found: {}",
                descriptor.display()
            )));
        }

        info!("Loading workspace from {}", descriptor.display());
        let solution = self.engine.load_solution(descriptor)?;
        let descriptor = descriptor
            .canonicalize()
            .unwrap_or_else(|_| descriptor.to_path_buf());

        let members = member_paths(&solution)?;
        let mut documents = BTreeMap::new();
        for path in &members {
            if let Some(text) = read_source(&solution.root.join(path))? {
                documents.insert(path.clone(), Arc::new(Document::new(path.clone(), text, 0)));
            }
        }

        let projects = describe_projects(&solution, &documents)?;
        Ok(PendingLoad {
            snapshot: WorkspaceSnapshot {
                id: Uuid::new_v4(),
                version: 0,
                root: solution.root,
                descriptor,
                projects,
                documents,
                published_at: Utc::now(),
            },
        })
    }

    /// Publish a prepared load unconditionally
    pub fn commit_load(&self, pending: PendingLoad) -> LoadSummary {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.publish(pending.snapshot);

        LoadSummary {
            workspace_id: snapshot.id,
            project_count: snapshot.projects.len(),
            document_count: snapshot.document_count(),
            version: snapshot.version,
            projects: snapshot.projects.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// Reconcile documents with their backing files.
    ///
    /// `None` (or an empty list) rescans every project. Otherwise exactly the
    /// given paths are examined; paths that are neither workspace documents
    /// nor project members count as zero. Nothing is published when nothing
    /// changed.
    pub fn sync(&self, paths: Option<&[String]>) -> Result<SyncReport> {
        let pending = self.prepare_sync(paths)?;
        self.commit_sync(pending)
    }

    /// Diff the current snapshot against disk without publishing.
    ///
    /// Files are read with no lock held. The successor is built on the
    /// snapshot current at call time and is only published by
    /// [`WorkspaceManager::commit_sync`] if that snapshot is still current.
    pub fn prepare_sync(&self, paths: Option<&[String]>) -> Result<PendingSync> {
        let base = self.current_snapshot()?;
        let solution = self.engine.load_solution(base.descriptor())?;
        let members = member_paths(&solution)?;

        let scan: BTreeSet<String> = match paths {
            Some(paths) if !paths.is_empty() => paths
                .iter()
                .filter_map(|path| match normalize_path(&base.root, path) {
                    Ok(normalized) if !normalized.is_empty() => Some(normalized),
                    _ => {
                        debug!("Ignoring sync path outside the workspace: {}", path);
                        None
                    }
                })
                .collect(),
            _ => members
                .iter()
                .cloned()
                .chain(base.documents.keys().cloned())
                .collect(),
        };

        let version = base.version + 1;
        let mut documents = base.documents.clone();
        let mut report = SyncReport {
            version: base.version,
            ..SyncReport::default()
        };

        for path in &scan {
            let is_member = members.contains(path);
            let existing = base.documents.get(path);
            if !is_member && existing.is_none() {
                continue;
            }

            let on_disk = read_source(&base.root.join(path))?;
            match (existing, on_disk) {
                (None, Some(text)) => {
                    debug!("Sync added {}", path);
                    documents.insert(path.clone(), Arc::new(Document::new(path.clone(), text, version)));
                    report.added += 1;
                }
                (Some(_), None) => {
                    debug!("Sync removed {}", path);
                    documents.remove(path);
                    report.removed += 1;
                }
                (Some(_), Some(_)) if !is_member => {
                    debug!("Sync removed {} (no longer a project member)", path);
                    documents.remove(path);
                    report.removed += 1;
                }
                (Some(document), Some(text)) if document.differs_from(&text) => {
                    debug!("Sync updated {}", path);
                    documents.insert(path.clone(), Arc::new(Document::new(path.clone(), text, version)));
                    report.updated += 1;
                }
                _ => {}
            }
        }

        report.total_synced = report.added + report.updated + report.removed;
        if report.total_synced == 0 {
            debug!("Sync found no changes at version {}", base.version);
            return Ok(PendingSync {
                base,
                successor: None,
                report,
            });
        }

        let projects = describe_projects(&solution, &documents)?;
        let successor = WorkspaceSnapshot {
            id: base.id,
            version,
            root: base.root.clone(),
            descriptor: base.descriptor.clone(),
            projects,
            documents,
            published_at: Utc::now(),
        };
        Ok(PendingSync {
            base,
            successor: Some(successor),
            report,
        })
    }

    /// Publish a prepared sync if its base snapshot is still current.
    ///
    /// Fails with `Reloaded` or `Conflict` when another load or mutation was
    /// published after [`WorkspaceManager::prepare_sync`] read its base.
    pub fn commit_sync(&self, pending: PendingSync) -> Result<SyncReport> {
        let PendingSync {
            base,
            successor,
            mut report,
        } = pending;
        let Some(successor) = successor else {
            return Ok(report);
        };

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_current(base.id, base.version)?;
        let version = successor.version;
        self.publish(successor);

        info!(
            "Synced workspace: {} added, {} updated, {} removed",
            report.added, report.updated, report.removed
        );
        report.version = version;
        Ok(report)
    }

    /// Current snapshot, provided it is still `(base_id, base_version)`.
    ///
    /// Callers must hold the writer mutex.
    fn ensure_current(&self, base_id: Uuid, base_version: u64) -> Result<Arc<WorkspaceSnapshot>> {
        let current = self.current_snapshot()?;
        if current.id != base_id {
            warn!("Rejecting mutation based on workspace {} (current is {})", base_id, current.id);
            return Err(Error::Reloaded);
        }
        if current.version != base_version {
            warn!(
                "Rejecting mutation based on version {} (current is {})",
                base_version, current.version
            );
            return Err(Error::Conflict {
                expected: base_version,
                actual: current.version,
            });
        }
        Ok(current)
    }

    /// Apply text edits computed against snapshot `base_id` at `base_version`.
    ///
    /// Fails with `Reloaded` when the workspace was loaded again, and with
    /// `Conflict` when another mutation was published since; the caller
    /// decides whether to recompute and retry. Changed files are written back
    /// before the new snapshot is published.
    pub fn apply_edits(&self, base_id: Uuid, base_version: u64, edits: &[DocumentEdit]) -> Result<u64> {
        if edits.iter().all(|edit| edit.edits.is_empty()) {
            return Err(Error::invalid_argument("No edits to apply"));
        }

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.ensure_current(base_id, base_version)?;

        let mut grouped: BTreeMap<String, Vec<TextEdit>> = BTreeMap::new();
        for edit in edits {
            let path = normalize_path(&current.root, &edit.path)?;
            grouped.entry(path).or_default().extend(edit.edits.iter().cloned());
        }

        let version = current.version + 1;
        let mut changed = Vec::with_capacity(grouped.len());
        for (path, text_edits) in &grouped {
            let document = current
                .documents
                .get(path)
                .ok_or_else(|| Error::not_found(format!("Document not found in workspace: {}", path)))?;
            let updated = document.apply_edits(text_edits, version)?;
            changed.push((document.clone(), Arc::new(updated)));
        }

        persist(&current.root, &changed)?;

        let mut documents = current.documents.clone();
        for (_, updated) in &changed {
            documents.insert(updated.path().to_string(), updated.clone());
        }
        let snapshot = WorkspaceSnapshot {
            id: current.id,
            version,
            root: current.root.clone(),
            descriptor: current.descriptor.clone(),
            projects: current.projects.clone(),
            documents,
            published_at: Utc::now(),
        };
        self.publish(snapshot);

        info!("Applied edits to {} documents (version {})", changed.len(), version);
        Ok(version)
    }

    pub fn status(&self) -> WorkspaceStatus {
        match self.current_snapshot() {
            Ok(snapshot) => WorkspaceStatus {
                loaded: true,
                workspace_id: Some(snapshot.id),
                version: Some(snapshot.version),
                project_count: snapshot.projects.len(),
                document_count: snapshot.document_count(),
                published_at: Some(snapshot.published_at),
            },
            Err(_) => WorkspaceStatus {
                loaded: false,
                workspace_id: None,
                version: None,
                project_count: 0,
                document_count: 0,
                published_at: None,
            },
        }
    }
}

/// Root-relative paths of every document any project claims
fn member_paths(solution: &SolutionModel) -> Result<BTreeSet<String>> {
    let mut members = BTreeSet::new();
    for project in &solution.projects {
        for document in &project.documents {
            members.insert(normalize_path(&solution.root, &document.to_string_lossy())?);
        }
    }
    Ok(members)
}

fn describe_projects(
    solution: &SolutionModel,
    documents: &BTreeMap<String, Arc<Document>>,
) -> Result<Vec<Project>> {
    solution
        .projects
        .iter()
        .map(|model| {
            let directory = normalize_path(&solution.root, &model.directory.to_string_lossy())?;
            let mut project = Project {
                name: model.name.clone(),
                language: model.language.clone(),
                references: model.references.clone(),
                directory: if directory.is_empty() { ".".to_string() } else { directory },
                documents: Vec::new(),
            };
            project.documents = documents
                .keys()
                .filter(|path| project.contains(path))
                .cloned()
                .collect();
            Ok(project)
        })
        .collect()
}

/// File content, or `None` when the file does not exist.
/// Non-UTF-8 files are rejected as `InvalidArgument`.
fn read_source(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
            Error::invalid_argument(format!(
                "Document is not valid UTF-8: {} (invalid byte at offset {})",
                path.display(),
                e.utf8_error().valid_up_to()
            ))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::internal(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Write changed documents, restoring earlier writes if a later one fails
fn persist(root: &Path, changed: &[(Arc<Document>, Arc<Document>)]) -> Result<()> {
    for (index, (_, updated)) in changed.iter().enumerate() {
        let target = root.join(updated.path());
        if let Err(e) = std::fs::write(&target, updated.text()) {
            error!("Failed to write {}: {}", target.display(), e);
            for (original, _) in &changed[..index] {
                let restore = root.join(original.path());
                if let Err(restore_error) = std::fs::write(&restore, original.text()) {
                    error!("Failed to restore {}: {}", restore.display(), restore_error);
                }
            }
            return Err(Error::internal(format!(
                "Failed to write {}: {}",
                updated.path(),
                e
            )));
        }
    }
    Ok(())
}

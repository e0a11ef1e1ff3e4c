use crate::engine::{EngineError, EngineResult, ProjectModel, SolutionModel};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Directory names never scanned for sources
const EXCLUDED_DIRECTORIES: &[&str] = &["bin", "obj", "node_modules"];

/// On-disk solution descriptor.
///
/// ```json
/// { "projects": [ { "name": "App", "path": "src/App", "references": ["Lib"] } ] }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolutionDescriptor {
    pub projects: Vec<ProjectDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDescriptor {
    pub name: String,
    /// Project directory, relative to the descriptor's directory
    #[serde(default = "default_project_path")]
    pub path: String,
    pub language: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

fn default_project_path() -> String {
    ".".to_string()
}

impl SolutionDescriptor {
    pub fn parse(content: &str) -> EngineResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| EngineError::InvalidArgument(format!("Invalid solution descriptor: {}", e)))
    }
}

/// Read a descriptor and enumerate every project's source documents.
///
/// The descriptor's directory becomes the workspace root. Documents are the
/// files under each project directory whose extension is in `extensions`,
/// skipping hidden and build-output directories.
pub fn load_solution(
    descriptor: &Path,
    default_language: &str,
    extensions: &[&str],
) -> EngineResult<SolutionModel> {
    let descriptor = descriptor.canonicalize().map_err(|_| {
        EngineError::NotFound(format!(
            "Solution descriptor not found: {}",
            descriptor.display()
        ))
    })?;

    let content = std::fs::read_to_string(&descriptor).map_err(|e| {
        EngineError::Failed(format!("Failed to read {}: {}", descriptor.display(), e))
    })?;
    let parsed = SolutionDescriptor::parse(&content)?;

    let root = descriptor
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| EngineError::InvalidArgument("Descriptor has no parent directory".into()))?;

    info!(
        "Loading solution {} ({} projects)",
        descriptor.display(),
        parsed.projects.len()
    );

    let mut seen = HashSet::new();
    let mut projects = Vec::with_capacity(parsed.projects.len());
    for project in &parsed.projects {
        if !seen.insert(project.name.clone()) {
            return Err(EngineError::InvalidArgument(format!(
                "Duplicate project name in descriptor: {}",
                project.name
            )));
        }

        let directory = root.join(&project.path);
        let directory = directory.canonicalize().map_err(|_| {
            EngineError::NotFound(format!(
                "Project directory not found for {}: {}",
                project.name,
                directory.display()
            ))
        })?;
        if !directory.starts_with(&root) {
            return Err(EngineError::InvalidArgument(format!(
                "Project {} lies outside the solution directory",
                project.name
            )));
        }

        let documents = enumerate_documents(&directory, extensions);
        debug!("Project {} has {} documents", project.name, documents.len());

        projects.push(ProjectModel {
            name: project.name.clone(),
            language: project
                .language
                .clone()
                .unwrap_or_else(|| default_language.to_string()),
            references: project.references.clone(),
            directory,
            documents,
        });
    }

    for project in &projects {
        for reference in &project.references {
            if !seen.contains(reference) {
                warn!(
                    "Project {} references unknown project {}",
                    project.name, reference
                );
            }
        }
    }

    Ok(SolutionModel { root, projects })
}

/// Sorted source files below `directory`
pub fn enumerate_documents(directory: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut documents: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extensions))
        .map(|entry| entry.into_path())
        .collect();

    documents.sort();
    documents
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir()
        && (name.starts_with('.') || EXCLUDED_DIRECTORIES.contains(&name.as_ref()))
}

//! One handler per operation.
//!
//! Handlers validate arguments and resolve coordinates first, then run the
//! engine on the blocking pool against a single snapshot. Mutating handlers
//! compute edits, then either return them (preview) or hand them to the
//! workspace manager tagged with the snapshot id and version they were
//! computed against. Publishing steps run only if the request is still live
//! and are never interrupted once started.

use crate::args::*;
use crate::batch::{self, panic_message, BatchResult, EmptyInput};
use serde::Serialize;
use sharplens_core::position::{resolve, resolve_range};
use sharplens_core::{
    AnalysisEngine, CallSite, CodeAction, Diagnostic, Document, DocumentEdit, Error, LoadSummary,
    Location, Position, Range, Result, Severity, SymbolInfo, SymbolKind, SymbolPattern, SyncReport,
    WorkspaceManager, WorkspaceSnapshot, WorkspaceStatus,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSymbolsResult {
    pub symbols: Vec<SymbolInfo>,
    pub total_matches: usize,
    pub truncated: bool,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbolsResult {
    pub file: String,
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionResult {
    pub found: bool,
    pub symbol: Option<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesResult {
    pub symbol_name: String,
    pub references: Vec<Location>,
    pub total_references: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallersResult {
    pub method_name: String,
    pub method: SymbolInfo,
    pub callers: Vec<CallSite>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingCallsResult {
    pub method_name: String,
    pub method: SymbolInfo,
    pub calls: Vec<CallSite>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameResult {
    pub old_name: String,
    pub new_name: String,
    pub affected_files: Vec<String>,
    pub change_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<Vec<DocumentEdit>>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeActionsResult {
    pub actions: Vec<CodeAction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCodeActionResult {
    pub title: String,
    pub affected_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<Vec<DocumentEdit>>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResult {
    pub diagnostics: Vec<Diagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodMetrics {
    pub name: String,
    pub container_name: Option<String>,
    pub range: Range,
    pub metrics: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum ComplexityReport {
    Method { file: String, method: MethodMetrics },
    File { file: String, methods: Vec<MethodMetrics> },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMembers {
    pub type_name: String,
    pub kind: SymbolKind,
    pub path: String,
    pub members: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSource {
    pub type_name: String,
    pub method_name: String,
    pub path: String,
    pub range: Range,
    pub source: String,
    /// Other declarations sharing the name
    pub overloads: usize,
}

pub struct Handlers {
    workspace: Arc<WorkspaceManager>,
}

impl Handlers {
    pub fn new(workspace: Arc<WorkspaceManager>) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Arc<WorkspaceManager> {
        &self.workspace
    }

    fn engine(&self) -> Arc<dyn AnalysisEngine> {
        self.workspace.engine().clone()
    }

    pub async fn load_workspace(
        &self,
        args: LoadWorkspaceArgs,
        cancel: &CancellationToken,
    ) -> Result<LoadSummary> {
        let workspace = self.workspace.clone();
        let descriptor = PathBuf::from(args.path);
        let pending = run_blocking(cancel, move || workspace.prepare_load(&descriptor)).await?;
        debug!("Prepared workspace with {} documents", pending.document_count());

        let workspace = self.workspace.clone();
        let summary = self
            .publish(cancel, move || Ok(workspace.commit_load(pending)))
            .await?;
        info!(
            "Workspace loaded: {} projects, {} documents",
            summary.project_count, summary.document_count
        );
        Ok(summary)
    }

    pub async fn sync_documents(
        &self,
        args: SyncDocumentsArgs,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let workspace = self.workspace.clone();
        let pending = run_blocking(cancel, move || workspace.prepare_sync(args.paths.as_deref())).await?;
        debug!("Prepared sync: {} changes", pending.report().total_synced);

        let workspace = self.workspace.clone();
        self.publish(cancel, move || workspace.commit_sync(pending)).await
    }

    pub async fn workspace_status(&self, _args: NoArgs) -> Result<WorkspaceStatus> {
        Ok(self.workspace.status())
    }

    pub async fn search_symbols(
        &self,
        args: SearchSymbolsArgs,
        cancel: &CancellationToken,
    ) -> Result<SearchSymbolsResult> {
        let pattern = SymbolPattern::parse(&args.pattern)?;
        let kind = args.kind.as_deref().map(str::parse::<SymbolKind>).transpose()?;
        let max_results = check_bound("maxResults", args.max_results)?;
        let snapshot = self.workspace.current_snapshot()?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            let mut symbols = engine.symbols_matching(&snapshot, &pattern, kind)?;
            symbols.sort_by(|a, b| {
                (&a.path, a.range.start, &a.name).cmp(&(&b.path, b.range.start, &b.name))
            });

            let total_matches = symbols.len();
            symbols.truncate(max_results);
            debug!("Search '{}' matched {} symbols", pattern.as_str(), total_matches);

            Ok(SearchSymbolsResult {
                symbols,
                total_matches,
                truncated: total_matches > max_results,
                version: snapshot.version(),
            })
        })
        .await
    }

    pub async fn document_symbols(
        &self,
        args: DocumentArgs,
        cancel: &CancellationToken,
    ) -> Result<DocumentSymbolsResult> {
        let snapshot = self.workspace.current_snapshot()?;
        let file = snapshot.find_document(&args.file)?.path().to_string();
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &file)?;
            let symbols = engine.document_symbols(document)?;
            Ok(DocumentSymbolsResult { file, symbols })
        })
        .await
    }

    pub async fn go_to_definition(
        &self,
        args: PositionArgs,
        cancel: &CancellationToken,
    ) -> Result<DefinitionResult> {
        let snapshot = self.workspace.current_snapshot()?;
        let anchor = resolve(&snapshot, &args.file, args.position())?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &anchor.path)?;
            let Some(symbol) = engine.symbol_at(&snapshot, document, anchor.offset)? else {
                return Ok(DefinitionResult {
                    found: false,
                    symbol: None,
                });
            };

            let definition = engine
                .definition(&snapshot, document, anchor.offset)?
                .ok_or_else(|| {
                    Error::not_found(format!("No definition found for '{}'", symbol.name))
                })?;
            Ok(DefinitionResult {
                found: true,
                symbol: Some(definition),
            })
        })
        .await
    }

    pub async fn find_references(
        &self,
        args: FindReferencesArgs,
        cancel: &CancellationToken,
    ) -> Result<ReferencesResult> {
        let max_results = check_bound("maxResults", args.max_results)?;
        let snapshot = self.workspace.current_snapshot()?;
        let anchor = resolve(
            &snapshot,
            &args.file,
            Position::new(args.line, args.column),
        )?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &anchor.path)?;
            let symbol = engine
                .symbol_at(&snapshot, document, anchor.offset)?
                .ok_or_else(|| no_symbol(&anchor.path, anchor.position))?;

            let mut references = engine.references(&snapshot, document, anchor.offset)?;
            references.sort_by(|a, b| (&a.path, a.range.start).cmp(&(&b.path, b.range.start)));
            let total_references = references.len();
            references.truncate(max_results);

            Ok(ReferencesResult {
                symbol_name: symbol.name,
                references,
                total_references,
                truncated: total_references > max_results,
            })
        })
        .await
    }

    pub async fn find_callers(
        &self,
        args: FindCallersArgs,
        cancel: &CancellationToken,
    ) -> Result<CallersResult> {
        let max_callers = check_bound("maxCallers", args.max_callers)?;
        let snapshot = self.workspace.current_snapshot()?;
        let anchor = resolve(
            &snapshot,
            &args.file,
            Position::new(args.line, args.column),
        )?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &anchor.path)?;
            let method = engine.method_at(&snapshot, document, anchor.offset)?;
            let mut callers = engine.callers(&snapshot, document, anchor.offset)?;
            let truncated = callers.len() > max_callers;
            callers.truncate(max_callers);
            Ok(CallersResult {
                method_name: method.name.clone(),
                method,
                callers,
                truncated,
            })
        })
        .await
    }

    pub async fn outgoing_calls(
        &self,
        args: OutgoingCallsArgs,
        cancel: &CancellationToken,
    ) -> Result<OutgoingCallsResult> {
        let max_calls = check_bound("maxOutgoingCalls", args.max_outgoing_calls)?;
        let snapshot = self.workspace.current_snapshot()?;
        let anchor = resolve(
            &snapshot,
            &args.file,
            Position::new(args.line, args.column),
        )?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &anchor.path)?;
            let method = engine.method_at(&snapshot, document, anchor.offset)?;
            let mut calls = engine.outgoing_calls(&snapshot, document, anchor.offset)?;
            let truncated = calls.len() > max_calls;
            calls.truncate(max_calls);
            Ok(OutgoingCallsResult {
                method_name: method.name.clone(),
                method,
                calls,
                truncated,
            })
        })
        .await
    }

    pub async fn rename_symbol(
        &self,
        args: RenameSymbolArgs,
        cancel: &CancellationToken,
    ) -> Result<RenameResult> {
        let engine = self.engine();
        if !engine.is_valid_identifier(&args.new_name) {
            return Err(Error::invalid_argument(format!(
                "'{}' is not a valid identifier",
                args.new_name
            )));
        }

        let snapshot = self.workspace.current_snapshot()?;
        let anchor = resolve(
            &snapshot,
            &args.file,
            Position::new(args.line, args.column),
        )?;
        let base = (snapshot.id(), snapshot.version());
        let new_name = args.new_name.clone();

        let (old_name, edits) = run_blocking(cancel, move || {
            let document = document(&snapshot, &anchor.path)?;
            let symbol = engine
                .symbol_at(&snapshot, document, anchor.offset)?
                .ok_or_else(|| no_symbol(&anchor.path, anchor.position))?;
            let edits = engine.rename_edits(&snapshot, document, anchor.offset, &new_name)?;
            Ok((symbol.name, edits))
        })
        .await?;

        let affected_files = affected_files(&edits);
        let change_count = edits.iter().map(|edit| edit.edits.len()).sum();

        if args.preview {
            return Ok(RenameResult {
                old_name,
                new_name: args.new_name,
                affected_files,
                change_count,
                edits: Some(edits),
                applied: false,
                new_version: None,
            });
        }

        let new_version = self.commit(base, edits, cancel).await?;
        info!(
            "Renamed '{}' to '{}' in {} files (version {})",
            old_name,
            args.new_name,
            affected_files.len(),
            new_version
        );
        Ok(RenameResult {
            old_name,
            new_name: args.new_name,
            affected_files,
            change_count,
            edits: None,
            applied: true,
            new_version: Some(new_version),
        })
    }

    pub async fn code_actions(
        &self,
        args: CodeActionsArgs,
        cancel: &CancellationToken,
    ) -> Result<CodeActionsResult> {
        let (start, end) = range_positions(args.line, args.column, args.end_line, args.end_column)?;
        let snapshot = self.workspace.current_snapshot()?;
        let range = resolve_range(&snapshot, &args.file, start, end)?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &range.path)?;
            let actions = engine.code_actions(&snapshot, document, &range)?;
            Ok(CodeActionsResult { actions })
        })
        .await
    }

    pub async fn apply_code_action(
        &self,
        args: ApplyCodeActionArgs,
        cancel: &CancellationToken,
    ) -> Result<ApplyCodeActionResult> {
        let (start, end) = range_positions(args.line, args.column, args.end_line, args.end_column)?;
        let snapshot = self.workspace.current_snapshot()?;
        let range = resolve_range(&snapshot, &args.file, start, end)?;
        let base = (snapshot.id(), snapshot.version());
        let engine = self.engine();
        let title = args.title.clone();

        let edits = run_blocking(cancel, move || {
            let document = document(&snapshot, &range.path)?;
            let actions = engine.code_actions(&snapshot, document, &range)?;
            let action = actions.iter().find(|a| a.title == title).ok_or_else(|| {
                let available: Vec<&str> = actions.iter().map(|a| a.title.as_str()).collect();
                Error::not_found(format!(
                    "No code action titled '{}'. Available: [{}]",
                    title,
                    available.join(", ")
                ))
            })?;
            Ok(engine.code_action_edits(&snapshot, action)?)
        })
        .await?;

        let affected_files = affected_files(&edits);
        if args.preview {
            return Ok(ApplyCodeActionResult {
                title: args.title,
                affected_files,
                edits: Some(edits),
                applied: false,
                new_version: None,
            });
        }

        let new_version = self.commit(base, edits, cancel).await?;
        info!("Applied code action '{}' (version {})", args.title, new_version);
        Ok(ApplyCodeActionResult {
            title: args.title,
            affected_files,
            edits: None,
            applied: true,
            new_version: Some(new_version),
        })
    }

    pub async fn diagnostics(
        &self,
        args: DiagnosticsArgs,
        cancel: &CancellationToken,
    ) -> Result<DiagnosticsResult> {
        let minimum = args.severity.as_deref().map(str::parse::<Severity>).transpose()?;
        let snapshot = self.workspace.current_snapshot()?;
        let file = match &args.file {
            Some(file) => Some(snapshot.find_document(file)?.path().to_string()),
            None => None,
        };
        let engine = self.engine();

        run_blocking(cancel, move || {
            let target = match &file {
                Some(path) => Some(document(&snapshot, path)?),
                None => None,
            };
            let mut diagnostics = engine.diagnostics(&snapshot, target)?;
            if let Some(minimum) = minimum {
                diagnostics.retain(|d| d.severity >= minimum);
            }
            diagnostics.sort_by(|a, b| (&a.path, a.range.start).cmp(&(&b.path, b.range.start)));

            let count =
                |severity: Severity| diagnostics.iter().filter(|d| d.severity == severity).count();
            Ok(DiagnosticsResult {
                error_count: count(Severity::Error),
                warning_count: count(Severity::Warning),
                info_count: count(Severity::Info),
                diagnostics,
            })
        })
        .await
    }

    pub async fn complexity_metrics(
        &self,
        args: ComplexityArgs,
        cancel: &CancellationToken,
    ) -> Result<ComplexityReport> {
        let selected = args.selected_metrics()?;
        let position = args.position()?;
        let snapshot = self.workspace.current_snapshot()?;
        let file = snapshot.find_document(&args.file)?.path().to_string();
        if let Some(position) = position {
            resolve(&snapshot, &file, position)?;
        }
        let engine = self.engine();

        run_blocking(cancel, move || {
            let document = document(&snapshot, &file)?;
            let methods = engine.method_complexity(document)?;

            let entry = |method: &sharplens_core::MethodComplexity| MethodMetrics {
                name: method.name.clone(),
                container_name: method.container_name.clone(),
                range: method.range,
                metrics: selected
                    .iter()
                    .map(|metric| (metric.as_str().to_string(), metric.value(&method.metrics)))
                    .collect(),
            };

            match position {
                Some(position) => {
                    let method = methods
                        .iter()
                        .filter(|m| m.range.contains(position))
                        .min_by_key(|m| (m.range.end.line - m.range.start.line, m.range.end.column))
                        .ok_or_else(|| {
                            Error::not_found(format!("No method found at {}:{}", file, position))
                        })?;
                    Ok(ComplexityReport::Method {
                        method: entry(method),
                        file,
                    })
                }
                None => Ok(ComplexityReport::File {
                    methods: methods.iter().map(entry).collect(),
                    file,
                }),
            }
        })
        .await
    }

    pub async fn type_members_batch(
        &self,
        args: TypeMembersBatchArgs,
        cancel: &CancellationToken,
    ) -> Result<BatchResult<TypeMemberRequest, TypeMembers>> {
        let snapshot = self.workspace.current_snapshot()?;
        let engine = self.engine();
        let requests: Vec<TypeMemberRequest> = args
            .type_names
            .into_iter()
            .map(|type_name| TypeMemberRequest { type_name })
            .collect();

        run_blocking(cancel, move || {
            batch::execute("GetTypeMembersBatch", requests, EmptyInput::Accept, |request| {
                type_members(engine.as_ref(), &snapshot, &request.type_name)
            })
        })
        .await
    }

    pub async fn method_source_batch(
        &self,
        args: MethodSourceBatchArgs,
        cancel: &CancellationToken,
    ) -> Result<BatchResult<MethodSourceRequest, MethodSource>> {
        let snapshot = self.workspace.current_snapshot()?;
        let engine = self.engine();

        run_blocking(cancel, move || {
            batch::execute(
                "GetMethodSourceBatch",
                args.requests,
                EmptyInput::Reject,
                |request| method_source(engine.as_ref(), &snapshot, request),
            )
        })
        .await
    }

    /// Publish edits computed against snapshot `base` (id, version)
    async fn commit(
        &self,
        base: (Uuid, u64),
        edits: Vec<DocumentEdit>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let workspace = self.workspace.clone();
        self.publish(cancel, move || workspace.apply_edits(base.0, base.1, &edits))
            .await
    }

    /// Run a publishing step unless the request was already cancelled.
    ///
    /// Once started the step is not raced against the token, so a request
    /// reported as cancelled never publishes.
    async fn publish<T, F>(&self, cancel: &CancellationToken, step: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        tokio::task::spawn_blocking(step)
            .await
            .map_err(|e| Error::internal(format!("Publish task failed: {}", e)))?
    }
}

/// Run engine work on the blocking pool, racing the cancellation token.
/// Panics inside the work are reported as `Internal`.
async fn run_blocking<T, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    let task = tokio::task::spawn_blocking(work);
    tokio::select! {
        _ = cancel.cancelled() => {
            warn!("Request cancelled while the engine was running");
            Err(cancelled())
        }
        joined = task => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                Err(Error::internal(format!(
                    "Analysis engine panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
            Err(e) => Err(Error::internal(format!("Engine task failed: {}", e))),
        }
    }
}

fn cancelled() -> Error {
    Error::internal("request cancelled")
}

fn document<'s>(snapshot: &'s WorkspaceSnapshot, path: &str) -> Result<&'s Document> {
    snapshot
        .document(path)
        .ok_or_else(|| Error::not_found(format!("Document not found in workspace: {}", path)))
}

fn no_symbol(path: &str, position: Position) -> Error {
    Error::not_found(format!("No symbol at {}:{}", path, position))
}

fn affected_files(edits: &[DocumentEdit]) -> Vec<String> {
    let mut files: Vec<String> = edits
        .iter()
        .filter(|edit| !edit.edits.is_empty())
        .map(|edit| edit.path.clone())
        .collect();
    files.sort();
    files.dedup();
    files
}

/// First type declaration named `type_name` (simple or qualified), in path order
fn find_type(
    engine: &dyn AnalysisEngine,
    snapshot: &WorkspaceSnapshot,
    type_name: &str,
) -> Result<(SymbolInfo, Vec<SymbolInfo>)> {
    if type_name.trim().is_empty() {
        return Err(Error::invalid_argument("typeName must not be empty"));
    }

    for document in snapshot.documents() {
        let symbols = engine.document_symbols(document)?;
        let found = symbols.iter().find(|symbol| {
            symbol.kind.is_type()
                && (symbol.name == type_name || symbol.qualified_name() == type_name)
        });
        if let Some(found) = found {
            let found = found.clone();
            return Ok((found, symbols));
        }
    }
    Err(Error::not_found(format!("Type not found: {}", type_name)))
}

fn type_members(
    engine: &dyn AnalysisEngine,
    snapshot: &WorkspaceSnapshot,
    type_name: &str,
) -> Result<TypeMembers> {
    let (declaration, symbols) = find_type(engine, snapshot, type_name)?;
    let members = symbols
        .into_iter()
        .filter(|symbol| {
            symbol.container_name.as_deref() == Some(declaration.name.as_str())
                && declaration.range.contains(symbol.range.start)
                && *symbol != declaration
        })
        .collect();

    Ok(TypeMembers {
        type_name: type_name.to_string(),
        kind: declaration.kind,
        path: declaration.path,
        members,
    })
}

fn method_source(
    engine: &dyn AnalysisEngine,
    snapshot: &WorkspaceSnapshot,
    request: &MethodSourceRequest,
) -> Result<MethodSource> {
    if request.method_name.trim().is_empty() {
        return Err(Error::invalid_argument("methodName must not be empty"));
    }
    let members = type_members(engine, snapshot, &request.type_name)?;
    let mut matching = members
        .members
        .into_iter()
        .filter(|member| member.kind.is_callable() && member.name == request.method_name);

    let method = matching.next().ok_or_else(|| {
        Error::not_found(format!(
            "Method {} not found in type {}",
            request.method_name, request.type_name
        ))
    })?;
    let overloads = matching.count();

    let document = document(snapshot, &method.path)?;
    let start = document.offset_at(method.range.start)?;
    let end = document.offset_at(method.range.end)?;

    Ok(MethodSource {
        type_name: request.type_name.clone(),
        method_name: request.method_name.clone(),
        path: method.path.clone(),
        range: method.range,
        source: document.text()[start..end].to_string(),
        overloads,
    })
}

use crate::args::{self, parse};
use crate::envelope::Envelope;
use crate::handlers::Handlers;
use serde::Serialize;
use serde_json::Value;
use sharplens_core::{Error, Result, WorkspaceManager};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The closed set of operations callers can invoke by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadWorkspace,
    SyncDocuments,
    GetWorkspaceStatus,
    SearchSymbols,
    GetDocumentSymbols,
    GoToDefinition,
    FindReferences,
    FindCallers,
    GetOutgoingCalls,
    RenameSymbol,
    GetCodeActions,
    ApplyCodeAction,
    GetDiagnostics,
    GetComplexityMetrics,
    GetTypeMembersBatch,
    GetMethodSourceBatch,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::LoadWorkspace,
        Operation::SyncDocuments,
        Operation::GetWorkspaceStatus,
        Operation::SearchSymbols,
        Operation::GetDocumentSymbols,
        Operation::GoToDefinition,
        Operation::FindReferences,
        Operation::FindCallers,
        Operation::GetOutgoingCalls,
        Operation::RenameSymbol,
        Operation::GetCodeActions,
        Operation::ApplyCodeAction,
        Operation::GetDiagnostics,
        Operation::GetComplexityMetrics,
        Operation::GetTypeMembersBatch,
        Operation::GetMethodSourceBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::LoadWorkspace => "LoadWorkspace",
            Operation::SyncDocuments => "SyncDocuments",
            Operation::GetWorkspaceStatus => "GetWorkspaceStatus",
            Operation::SearchSymbols => "SearchSymbols",
            Operation::GetDocumentSymbols => "GetDocumentSymbols",
            Operation::GoToDefinition => "GoToDefinition",
            Operation::FindReferences => "FindReferences",
            Operation::FindCallers => "FindCallers",
            Operation::GetOutgoingCalls => "GetOutgoingCalls",
            Operation::RenameSymbol => "RenameSymbol",
            Operation::GetCodeActions => "GetCodeActions",
            Operation::ApplyCodeAction => "ApplyCodeAction",
            Operation::GetDiagnostics => "GetDiagnostics",
            Operation::GetComplexityMetrics => "GetComplexityMetrics",
            Operation::GetTypeMembersBatch => "GetTypeMembersBatch",
            Operation::GetMethodSourceBatch => "GetMethodSourceBatch",
        }
    }

    /// Operations that may publish a new snapshot
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::LoadWorkspace
                | Operation::SyncDocuments
                | Operation::RenameSymbol
                | Operation::ApplyCodeAction
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Operation::ALL
            .iter()
            .copied()
            .find(|operation| operation.as_str() == name)
            .ok_or_else(|| Error::not_found(format!("Unknown operation: {}", name)))
    }
}

/// Routes named operations with JSON arguments to their handlers
pub struct Dispatcher {
    handlers: Handlers,
}

impl Dispatcher {
    pub fn new(workspace: Arc<WorkspaceManager>) -> Self {
        Self {
            handlers: Handlers::new(workspace),
        }
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub async fn dispatch(
        &self,
        operation: &str,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Envelope {
        let operation = match operation.parse::<Operation>() {
            Ok(operation) => operation,
            Err(error) => {
                warn!("{}", error);
                return Envelope::failure(&error);
            }
        };

        let started = Instant::now();
        debug!("Dispatching {}", operation);
        let envelope = Envelope::from_result(self.run(operation, arguments, &cancel).await);

        match &envelope.error {
            None if operation.is_mutating() => {
                info!("{} completed in {:?}", operation, started.elapsed())
            }
            None => debug!("{} completed in {:?}", operation, started.elapsed()),
            Some(error) => warn!("{} failed ({}): {}", operation, error.code, error.message),
        }
        envelope
    }

    async fn run(
        &self,
        operation: Operation,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let h = &self.handlers;
        match operation {
            Operation::LoadWorkspace => encode(h.load_workspace(parse(arguments)?, cancel).await?),
            Operation::SyncDocuments => encode(h.sync_documents(parse(arguments)?, cancel).await?),
            Operation::GetWorkspaceStatus => {
                encode(h.workspace_status(parse::<args::NoArgs>(arguments)?).await?)
            }
            Operation::SearchSymbols => encode(h.search_symbols(parse(arguments)?, cancel).await?),
            Operation::GetDocumentSymbols => {
                encode(h.document_symbols(parse(arguments)?, cancel).await?)
            }
            Operation::GoToDefinition => {
                encode(h.go_to_definition(parse(arguments)?, cancel).await?)
            }
            Operation::FindReferences => {
                encode(h.find_references(parse(arguments)?, cancel).await?)
            }
            Operation::FindCallers => encode(h.find_callers(parse(arguments)?, cancel).await?),
            Operation::GetOutgoingCalls => {
                encode(h.outgoing_calls(parse(arguments)?, cancel).await?)
            }
            Operation::RenameSymbol => encode(h.rename_symbol(parse(arguments)?, cancel).await?),
            Operation::GetCodeActions => encode(h.code_actions(parse(arguments)?, cancel).await?),
            Operation::ApplyCodeAction => {
                encode(h.apply_code_action(parse(arguments)?, cancel).await?)
            }
            Operation::GetDiagnostics => encode(h.diagnostics(parse(arguments)?, cancel).await?),
            Operation::GetComplexityMetrics => {
                encode(h.complexity_metrics(parse(arguments)?, cancel).await?)
            }
            Operation::GetTypeMembersBatch => {
                encode(h.type_members_batch(parse(arguments)?, cancel).await?)
            }
            Operation::GetMethodSourceBatch => {
                encode(h.method_source_batch(parse(arguments)?, cancel).await?)
            }
        }
    }
}

fn encode<T: Serialize>(data: T) -> Result<Value> {
    serde_json::to_value(data)
        .map_err(|e| Error::internal(format!("Failed to serialize result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharplens_core::ErrorCode;

    #[test]
    fn test_operation_names_round_trip() {
        for operation in Operation::ALL {
            assert_eq!(operation.as_str().parse::<Operation>().unwrap(), operation);
        }
    }

    #[test]
    fn test_unknown_operation_is_not_found() {
        let error = "Frobnicate".parse::<Operation>().unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotFound);
        assert!(error.to_string().contains("Frobnicate"));
    }

    #[test]
    fn test_operation_names_are_case_sensitive() {
        assert!("searchsymbols".parse::<Operation>().is_err());
    }
}

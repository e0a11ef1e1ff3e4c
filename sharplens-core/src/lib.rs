pub mod complexity;
pub mod config;
pub mod csharp;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod error;
pub mod parser;
pub mod position;
pub mod project;
pub mod syntax;
pub mod workspace;

pub use csharp::CSharpEngine;
pub use document::{Document, DocumentEdit, TextEdit};
pub use engine::{
    AnalysisEngine, CallSite, CodeAction, CodeActionKind, ComplexityMetrics, Diagnostic,
    EngineError, EngineResult, Location, MethodComplexity, Severity, SymbolAtPosition, SymbolInfo,
    SymbolKind, SymbolPattern,
};
pub use error::{Error, ErrorCode, Result};
pub use parser::Parser;
pub use position::{Anchor, AnchorRange, CoordinateError, Position, Range};
pub use workspace::{
    LoadSummary, PendingLoad, PendingSync, SyncReport, WorkspaceManager, WorkspaceSnapshot,
    WorkspaceStatus,
};

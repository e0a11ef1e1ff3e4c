use crate::document::Document;
use crate::engine::{Diagnostic, EngineError, EngineResult, Severity};
use crate::parser::ParseError;
use crate::syntax::{Span, SyntaxIndex};

pub const SYNTAX_ERROR: &str = "SL0001";
pub const MISSING_TOKEN: &str = "SL0002";
pub const EMPTY_CATCH: &str = "SL1001";
pub const HIGH_COMPLEXITY: &str = "SL2001";

/// Cyclomatic complexity above which a method is reported
pub const COMPLEXITY_THRESHOLD: u32 = 10;

/// Converts tree-sitter parse errors to diagnostics
pub fn parse_errors_to_diagnostics(
    document: &Document,
    errors: &[ParseError],
) -> EngineResult<Vec<Diagnostic>> {
    errors
        .iter()
        .map(|error| {
            let message = if error.is_missing {
                format!("Missing {}", error.kind)
            } else {
                match &error.actual_text {
                    Some(text) => format!("Syntax error: unexpected '{}'", text),
                    None => format!("Syntax error: unexpected {}", error.kind),
                }
            };

            Ok(Diagnostic {
                path: document.path().to_string(),
                range: range(document, error.start_byte, error.end_byte)?,
                severity: Severity::Error,
                code: if error.is_missing { MISSING_TOKEN } else { SYNTAX_ERROR }.to_string(),
                message,
            })
        })
        .collect()
}

/// Every diagnostic the reference engine reports for one document
pub fn document_diagnostics(
    document: &Document,
    index: &SyntaxIndex,
) -> EngineResult<Vec<Diagnostic>> {
    let mut diagnostics = parse_errors_to_diagnostics(document, &index.parse_errors)?;

    for catch in &index.empty_catches {
        diagnostics.push(Diagnostic {
            path: document.path().to_string(),
            range: span_range(document, *catch)?,
            severity: Severity::Warning,
            code: EMPTY_CATCH.to_string(),
            message: "Empty catch block swallows exceptions".to_string(),
        });
    }

    for method in &index.methods {
        if method.metrics.cyclomatic > COMPLEXITY_THRESHOLD {
            diagnostics.push(Diagnostic {
                path: document.path().to_string(),
                range: method.range,
                severity: Severity::Info,
                code: HIGH_COMPLEXITY.to_string(),
                message: format!(
                    "Method '{}' has cyclomatic complexity {} (threshold {})",
                    method.name, method.metrics.cyclomatic, COMPLEXITY_THRESHOLD
                ),
            });
        }
    }

    diagnostics.sort_by(|a, b| {
        (a.range.start, a.range.end, &a.code).cmp(&(b.range.start, b.range.end, &b.code))
    });
    Ok(diagnostics)
}

fn span_range(document: &Document, span: Span) -> EngineResult<crate::position::Range> {
    range(document, span.start, span.end)
}

fn range(document: &Document, start: usize, end: usize) -> EngineResult<crate::position::Range> {
    document
        .range_of(start, end)
        .map_err(|e| EngineError::Failed(e.to_string()))
}

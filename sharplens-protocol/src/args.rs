//! Typed arguments for every operation.
//!
//! Field names are camelCase on the wire and unknown fields are rejected.
//! Defaults for optional bounds live here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sharplens_core::{ComplexityMetrics, Error, Position, Result};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const DEFAULT_MAX_CALLERS: usize = 50;
pub const DEFAULT_MAX_OUTGOING_CALLS: usize = 50;

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_max_callers() -> usize {
    DEFAULT_MAX_CALLERS
}

fn default_max_outgoing_calls() -> usize {
    DEFAULT_MAX_OUTGOING_CALLS
}

/// Deserialize an argument map; a missing map counts as empty
pub fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|e| Error::invalid_argument(format!("Invalid arguments: {}", e)))
}

/// List bounds must admit at least one result
pub fn check_bound(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(Error::invalid_argument(format!("{} must be at least 1", name)));
    }
    Ok(value)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoadWorkspaceArgs {
    /// Solution descriptor path
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncDocumentsArgs {
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchSymbolsArgs {
    pub pattern: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocumentArgs {
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PositionArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl PositionArgs {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindReferencesArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindCallersArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default = "default_max_callers")]
    pub max_callers: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutgoingCallsArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default = "default_max_outgoing_calls")]
    pub max_outgoing_calls: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenameSymbolArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub new_name: String,
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CodeActionsArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplyCodeActionArgs {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
    pub title: String,
    #[serde(default)]
    pub preview: bool,
}

/// Start and end of a requested range; the end defaults to the start
pub fn range_positions(
    line: u32,
    column: u32,
    end_line: Option<u32>,
    end_column: Option<u32>,
) -> Result<(Position, Position)> {
    let start = Position::new(line, column);
    match (end_line, end_column) {
        (None, None) => Ok((start, start)),
        (Some(end_line), Some(end_column)) => Ok((start, Position::new(end_line, end_column))),
        _ => Err(Error::invalid_argument(
            "endLine and endColumn must be given together",
        )),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiagnosticsArgs {
    #[serde(default)]
    pub file: Option<String>,
    /// Minimum severity to report
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComplexityArgs {
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
}

impl ComplexityArgs {
    /// Method scope when a position is given; both coordinates or neither
    pub fn position(&self) -> Result<Option<Position>> {
        match (self.line, self.column) {
            (None, None) => Ok(None),
            (Some(line), Some(column)) => Ok(Some(Position::new(line, column))),
            _ => Err(Error::invalid_argument(
                "line and column must be given together",
            )),
        }
    }

    /// Requested metrics in canonical order, all of them when unspecified
    pub fn selected_metrics(&self) -> Result<Vec<Metric>> {
        let Some(names) = &self.metrics else {
            return Ok(Metric::ALL.to_vec());
        };
        if names.is_empty() {
            return Err(Error::invalid_argument(
                "metrics must name at least one metric when given",
            ));
        }

        let mut selected = names
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<Metric>>>()?;
        selected.sort();
        selected.dedup();
        Ok(selected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Cyclomatic,
    Cognitive,
    Nesting,
    Loc,
    Parameters,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Cyclomatic,
        Metric::Cognitive,
        Metric::Nesting,
        Metric::Loc,
        Metric::Parameters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cyclomatic => "cyclomatic",
            Metric::Cognitive => "cognitive",
            Metric::Nesting => "nesting",
            Metric::Loc => "loc",
            Metric::Parameters => "parameters",
        }
    }

    pub fn value(&self, metrics: &ComplexityMetrics) -> u32 {
        match self {
            Metric::Cyclomatic => metrics.cyclomatic,
            Metric::Cognitive => metrics.cognitive,
            Metric::Nesting => metrics.nesting,
            Metric::Loc => metrics.loc,
            Metric::Parameters => metrics.parameters,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Metric::ALL
            .iter()
            .find(|metric| metric.as_str().eq_ignore_ascii_case(value))
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
                Error::invalid_argument(format!(
                    "Unknown metric '{}'. Expected one of: {}",
                    value,
                    known.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypeMembersBatchArgs {
    pub type_names: Vec<String>,
}

/// One item of a type-members batch, echoed back on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMemberRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MethodSourceBatchArgs {
    pub requests: Vec<MethodSourceRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MethodSourceRequest {
    pub type_name: String,
    pub method_name: String,
}

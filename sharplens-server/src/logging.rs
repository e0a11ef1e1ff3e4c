use anyhow::{Context, Result};
use sharplens_core::config::Verbosity;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Filter directive applying `verbosity` to the SharpLens crates only
pub fn filter_directive(verbosity: Verbosity) -> String {
    ["sharplens", "sharplens_core", "sharplens_protocol", "sharplens_server"]
        .iter()
        .map(|target| format!("{}={}", target, verbosity))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. Stdout carries responses, so logs go to
/// stderr or, when given, to `log_file`. The returned guard must be kept
/// alive for file output to be flushed.
pub fn init(verbosity: Verbosity, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(filter_directive(verbosity))
        .context("Failed to build log filter")?;

    match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            let appender =
                tracing_appender::rolling::never(directory.unwrap_or(Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use sharplens_core::{config, CSharpEngine, WorkspaceManager};
use sharplens_protocol::Dispatcher;
use sharplens_server::{logging, Server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// C# code intelligence over line-delimited JSON on stdin/stdout
#[derive(Debug, Parser)]
#[command(name = "sharplens", version, about)]
struct Cli {
    /// Project descriptor to load before serving requests
    #[arg(long, env = "SHARPLENS_DESCRIPTOR")]
    descriptor: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(config::verbosity(), cli.log_file.as_deref())?;

    info!("Starting SharpLens (log level {})", config::verbosity());

    let workspace = Arc::new(WorkspaceManager::new(Arc::new(CSharpEngine::new())));

    if let Some(descriptor) = cli.descriptor {
        let loader = workspace.clone();
        let summary = tokio::task::spawn_blocking(move || loader.load(&descriptor))
            .await
            .context("Workspace load task failed")?
            .context("Failed to load workspace descriptor")?;
        info!(
            "Loaded workspace {} with {} documents",
            summary.workspace_id, summary.document_count
        );
    }

    let server = Arc::new(Server::new(Arc::new(Dispatcher::new(workspace))));
    server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
}

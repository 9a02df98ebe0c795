use anyhow::{Context, Result};
use arrowreg_core::{RetrievalConfig, RetrievalService, SourceSpec};
use axum::Router;
use clap::Parser;
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON retrieval config (sources, fusion weights, embedding spaces)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Extra source document, repeatable; `id=path` or a bare path (id = file stem)
    #[arg(long = "source")]
    sources: Vec<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn parse_source(arg: &str) -> SourceSpec {
    match arg.split_once('=') {
        Some((id, path)) if !id.is_empty() => SourceSpec::new(path, id),
        _ => SourceSpec::from_path(arg),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RetrievalConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RetrievalConfig::default(),
    }
    .apply_env();
    config.validate()?;
    config.sources.extend(args.sources.iter().map(|s| parse_source(s)));

    // A remote embedder holds a blocking HTTP client, which must be built off the runtime.
    let (service, report) = tokio::task::spawn_blocking(move || {
        let sources = config.sources.clone();
        let service = Arc::new(RetrievalService::new(config));
        let report = service.initialize(&sources);
        (service, report)
    })
    .await?;
    tracing::info!(
        documents = report.documents_loaded,
        skipped = report.documents_skipped,
        sections = report.sections,
        "corpus loaded"
    );

    let app: Router = build_app(service)?;
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

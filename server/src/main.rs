use anyhow::Result;
use axum::Router;
use clap::Parser;
use simdex::{EngineConfig, ModelKind};
use simdex_server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 22122)]
    port: u16,
    /// Corpus capacity, oldest documents are evicted first (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    max_documents: usize,
    /// Cap on every posting list (0 = unbounded)
    #[arg(long, default_value_t = simdex::config::DEFAULT_MAX_POSTING)]
    max_posting: usize,
    #[arg(long, default_value_t = ModelKind::InnerProduct)]
    model: ModelKind,
    /// Snapshot to load at startup
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = EngineConfig::default()
        .with_model(args.model)
        .with_max_posting(args.max_posting)
        .with_max_documents(args.max_documents);
    tracing::info!(model = %config.model, max_documents = config.max_documents, max_posting = config.max_posting, "starting engine");
    let app: Router = build_app(config, args.snapshot)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

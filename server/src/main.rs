use anyhow::{Context, Result};
use clap::Parser;
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// Serve recipe search over HTTP.
#[derive(Parser)]
struct Args {
    /// Index root directory (the one holding CURRENT)
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Search config JSON; overrides SEARCH_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let app = build_app(args.index.clone(), args.config)
        .with_context(|| format!("opening index {}", args.index.display()))?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %args.index.display(), "recipe search listening");
    axum::serve(listener, app).await?;
    Ok(())
}

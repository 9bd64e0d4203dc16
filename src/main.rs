//! Job-control HTTP server binary: serves the scraping orchestrator's `POST /scrape`,
//! `GET /status`, `POST /stop`, and `GET /events*` surface over HTTP.
//!
//! Listens on `API_PORT` (default 8000, see `OrchestratorConfig::with_env_overrides`).
//! Session fallback files and JSON-lines results are written under a temp directory unless
//! `SCRAPE_OUTPUT_DIR` is set.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use scrape_orchestrator::OrchestratorConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = OrchestratorConfig::default().with_env_overrides();
    let output_dir: PathBuf = std::env::var("SCRAPE_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("scrape_orchestrator"));
    std::fs::create_dir_all(&output_dir)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let state = scrape_orchestrator::default_app_state(config, output_dir);

    tracing::info!(%addr, "scrape orchestrator job-control server starting");
    let server = scrape_orchestrator::start_server(addr, state).await?;
    server.await?;
    Ok(())
}

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use opdsdir::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ServerConfig::parse();

    // RUST_LOG wins; otherwise --debug picks the level
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(cfg.log_directive()))?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "opdsdir",
        "opdsdir starting: RUST_LOG='{}', host={}, port={}, dir='{}'",
        rust_log, cfg.host, cfg.port, cfg.dir.display()
    );

    opdsdir::server::run(cfg).await
}

use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use ociauth::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "ociauth starting: RUST_LOG='{}', http_addr={}, region={}, identity_url={}, data_dir={:?}",
        rust_log, settings.http_addr, settings.region, settings.identity_host(), settings.data_dir
    );

    ociauth::server::run(settings).await
}

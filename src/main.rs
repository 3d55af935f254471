use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use warden::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid RUST_LOG filter")?;
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "warden",
        "warden starting: RUST_LOG='{}', http_port={}, session_ttl_secs={}, cookie='{}', flow_ttl_secs={}, signing={}, dev_login={}, callbacks={:?}, redirect_whitelist={}",
        rust_log,
        config.http_port,
        config.session.ttl.as_secs(),
        config.session.cookie_name,
        config.flow_ttl.as_secs(),
        if config.token.key.is_some() { "enabled" } else { "disabled" },
        config.dev_login,
        config.callback_urls,
        config.authorized_redirect_urls.len(),
    );

    warden::server::run_with_config(config).await
}

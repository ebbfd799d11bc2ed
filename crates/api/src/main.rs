use std::sync::Arc;

use anyhow::Context;

use invoicekit_api::app;
use invoicekit_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    invoicekit_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let services = app::build_services(&config)
        .await
        .context("failed to initialise services")?;
    let router = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        store = ?config.store,
        max_retries = config.max_retries,
        "listening"
    );

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}

use anyhow::Context;

use taodiv_core::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taodiv_observability::init();

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if settings.api_key.is_empty() {
        tracing::warn!("API_KEY not set; using insecure dev default");
        settings.api_key = "dev-api-key".to_string();
    }
    let bind_addr = settings.bind_addr.clone();

    let app = taodiv_api::app::build_app(settings).context("failed to build services")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

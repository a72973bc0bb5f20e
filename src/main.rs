use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use carebook_core::config::{max_attachment_bytes_from_env_value, request_timeout_from_env_value};
use carebook_core::constants::{
    DEFAULT_REST_ADDR, SESSION_IDLE_TTL_SECS, SESSION_SWEEP_INTERVAL_SECS,
};
use carebook_core::BookingConfig;
use carebook_http::HttpBookingApi;

/// Main entry point for the Carebook booking service
///
/// Reads configuration once, builds the remote API client and serves the REST surface.
/// Sessions idle for 30 minutes are dropped.
///
/// # Environment Variables
/// - `CAREBOOK_API_BASE_URL`: base URL of the remote booking API (required)
/// - `CAREBOOK_PATIENT_ID`: patient the bookings are made for (required)
/// - `CAREBOOK_API_TOKEN`: bearer token for the remote API (optional)
/// - `CAREBOOK_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 15)
/// - `CAREBOOK_MAX_ATTACHMENT_BYTES`: payment proof size limit (default: 5 MiB)
/// - `CAREBOOK_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carebook=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config_from_env()?;
    let rest_addr =
        std::env::var("CAREBOOK_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    tracing::info!("++ Starting Carebook REST on {}", rest_addr);
    tracing::debug!(?config, "configuration loaded");

    let api = HttpBookingApi::new(&config).context("failed to build the booking API client")?;
    let state = AppState::new(Arc::new(api), &config);
    state.spawn_eviction(
        Duration::from_secs(SESSION_IDLE_TTL_SECS),
        Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS),
    );
    let app = api_rest::router(state);

    let listener = tokio::net::TcpListener::bind(&rest_addr)
        .await
        .with_context(|| format!("failed to bind {rest_addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn config_from_env() -> anyhow::Result<BookingConfig> {
    let base_url = std::env::var("CAREBOOK_API_BASE_URL")
        .context("CAREBOOK_API_BASE_URL must be set")?;
    let patient_id =
        std::env::var("CAREBOOK_PATIENT_ID").context("CAREBOOK_PATIENT_ID must be set")?;
    let token = std::env::var("CAREBOOK_API_TOKEN").ok();
    let timeout: Duration =
        request_timeout_from_env_value(std::env::var("CAREBOOK_REQUEST_TIMEOUT_SECS").ok())?;
    let max_attachment_bytes =
        max_attachment_bytes_from_env_value(std::env::var("CAREBOOK_MAX_ATTACHMENT_BYTES").ok())?;

    Ok(BookingConfig::new(
        &base_url,
        &patient_id,
        token,
        timeout,
        max_attachment_bytes,
    )?)
}

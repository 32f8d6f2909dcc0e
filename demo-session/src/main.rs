use axum::{Router, middleware::from_fn_with_state, routing::get};
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_lifecycle_axum::{SessionConfig, SessionManager, cache_store_from_env, resume_session};

mod handlers;
mod server;

use crate::{
    handlers::{index, logout, status},
    server::spawn_http_server,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,session_lifecycle=debug", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = cache_store_from_env().await?;
    let manager = SessionManager::new(store, SessionConfig::from_env())?;
    tracing::info!("Session config: {:?}", manager.config());

    let app = Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/logout", get(logout))
        .layer(from_fn_with_state(manager, resume_session));

    spawn_http_server(3001, app).await?;
    Ok(())
}

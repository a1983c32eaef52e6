use std::time::Duration;

use chrono::Utc;
use parley_api::{build_router, state::AppState};
use parley_config::Settings;
use parley_db::{connect, indexes::ensure_indexes};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "parley_api=debug,parley_services=debug,parley_db=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    info!("Starting Parley API on {}:{}", settings.app.host, settings.app.port);

    let db = connect(&settings).await?;
    ensure_indexes(&db).await?;

    let app_state = AppState::new(db, settings.clone());
    spawn_push_token_sweep(&app_state);

    let app = build_router(app_state);

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Drops device tokens older than `push.token_max_age_days` on a fixed interval.
fn spawn_push_token_sweep(state: &AppState) {
    let users = state.users.clone();
    let max_age = chrono::Duration::days(i64::from(state.settings.push.token_max_age_days));
    let period = Duration::from_secs(state.settings.push.prune_interval_secs.max(60));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let cutoff = bson::DateTime::from_chrono(Utc::now() - max_age);
            match users.prune_stale_push_tokens(cutoff).await {
                Ok(touched) => info!(touched, "Pruned stale push tokens"),
                Err(e) => warn!(%e, "Push token sweep failed"),
            }
        }
    });
}

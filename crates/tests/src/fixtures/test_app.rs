use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mongodb::{Client, Database, options::ClientOptions};
use parley_api::{build_router, state::AppState};
use parley_config::Settings;
use parley_db::indexes::ensure_indexes;
use tokio::net::TcpListener;

use super::push::RecordingPushProvider;

/// A running test application with its own MongoDB database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub db: Database,
    pub settings: Settings,
    pub client: reqwest::Client,
    pub state: AppState,
    pub push: Arc<RecordingPushProvider>,
}

impl TestApp {
    /// Spawn a new test server connected to the test MongoDB.
    ///
    /// Requires a MongoDB replica set (transactions) at localhost:27017.
    /// Set PARLEY__DATABASE__URL to override the connection string.
    /// Each test gets a unique database name for isolation.
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn with settings tweaked by `mutator` after the test defaults.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let db_name = format!("parley_test_{}", uuid::Uuid::new_v4().simple());

        let mut settings = Settings::load().unwrap_or_default();
        if let Ok(url) = std::env::var("PARLEY__DATABASE__URL") {
            settings.database.url = url;
        }
        settings.database.name = db_name.clone();
        settings.jwt.secret = "test-secret-key-for-jwt-signing-minimum-32-chars".to_string();
        settings.dispatch.ack_timeout_ms = 1000;
        settings.dispatch.retry_initial_delay_ms = 50;
        settings.dispatch.retry_max_attempts = 6;
        mutator(&mut settings);

        let client_options = ClientOptions::parse(&settings.database.url)
            .await
            .expect("Failed to parse MongoDB URL");
        let mongo_client =
            Client::with_options(client_options).expect("Failed to create MongoDB client");
        let db = mongo_client.database(&db_name);

        ensure_indexes(&db).await.expect("Failed to create indexes");

        let push = Arc::new(RecordingPushProvider::new());
        let state = AppState::with_push_provider(db.clone(), settings.clone(), push.clone());
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            addr,
            base_url,
            db,
            settings,
            client,
            state,
            push,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    /// Waits for summary updates, fan-out and pushes spawned so far.
    pub async fn settle(&self) {
        assert!(
            self.state.tasks.wait_idle(Duration::from_secs(10)).await,
            "Background tasks did not finish"
        );
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let db = self.db.clone();
        // Best effort cleanup: drop the test database
        tokio::spawn(async move {
            let _ = db.drop().await;
        });
    }
}

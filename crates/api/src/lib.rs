pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.app.cors_origins);

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/refresh", post(routes::auth::refresh))
        .route("/me", get(routes::auth::me));

    let user_routes = Router::new()
        .route("/online", get(routes::user::online))
        .route("/push-token", post(routes::user::add_push_token))
        .route("/push-token/{token}", delete(routes::user::remove_push_token));

    let conversation_routes = Router::new()
        .route("/", get(routes::conversation::list))
        .route("/message", post(routes::conversation::send))
        .route("/{conversation_id}/message", get(routes::conversation::messages));

    let group_routes = Router::new()
        .route("/", get(routes::group::list).post(routes::group::create))
        .route("/{group_id}/join", post(routes::group::join))
        .route("/{group_id}/leave", post(routes::group::leave))
        .route(
            "/{group_id}/message",
            get(routes::group::messages).post(routes::group::send),
        );

    let channel_routes = Router::new()
        .route("/", get(routes::channel::list).post(routes::channel::create))
        .route("/{channel_id}/member", post(routes::channel::add_member))
        .route(
            "/{channel_id}/message",
            get(routes::channel::messages).post(routes::channel::send),
        )
        .route(
            "/message/{message_id}/comment",
            get(routes::channel::comments).post(routes::channel::comment),
        );

    let message_routes = Router::new().route("/seen", put(routes::message::mark_seen));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/user", user_routes)
        .nest("/conversation", conversation_routes)
        .nest("/group", group_routes)
        .nest("/channel", channel_routes)
        .nest("/message", message_routes);

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// No configured origins means any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

use std::sync::Arc;

use axum::{http::StatusCode, middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;
pub mod headers;

/// Build the HTTP router.
///
/// `/diagnostics/*` is mounted only when token diagnostics are enabled.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::home))
        .route("/healthz", get(|| async { "ok" }));

    if state.config.expose_token_diagnostics {
        tracing::warn!("token diagnostics endpoints enabled under /diagnostics");
        app = app.nest(
            "/diagnostics",
            Router::new()
                .route("/access-token", get(handlers::access_token))
                .route("/federation-token", get(handlers::federation_token)),
        );
    }

    app.fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(headers::request_id))
        .layer(middleware::from_fn(headers::security_headers))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, response::Html, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::identity::{self, claims, Claims};
use crate::sql::ServerInfo;
use crate::AppState;

// ── Response DTOs ────────────────────────────────────────────

/// Unverified view of a freshly acquired access token. The token itself is
/// never returned.
#[derive(Serialize)]
pub struct AccessTokenDiagnostics {
    pub strategy: String,
    pub credential: &'static str,
    pub expiry: DateTime<Utc>,
    pub claims: Claims,
}

#[derive(Serialize)]
pub struct FederationTokenDiagnostics {
    pub path: PathBuf,
    pub expiry: Option<DateTime<Utc>>,
    pub claims: Claims,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /: which server and database we reached, and its version.
pub async fn home(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let info = state.db.server_info().await?;
    Ok(Html(render_home(&info)))
}

/// GET /diagnostics/access-token
pub async fn access_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AccessTokenDiagnostics>, AppError> {
    let token = state.tokens.acquire_token(&state.config.token_scope).await?;
    let claims = claims::decode_unverified(token.raw())?;

    Ok(Json(AccessTokenDiagnostics {
        strategy: state.tokens.strategy().to_string(),
        credential: state.tokens.credential_name(),
        expiry: token.expiry(),
        claims,
    }))
}

/// GET /diagnostics/federation-token
pub async fn federation_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FederationTokenDiagnostics>, AppError> {
    let path = state
        .config
        .identity
        .federated_token_file
        .clone()
        .ok_or(AppError::NotConfigured("federated token file"))?;

    let claims = identity::read_federated_token(&state.config.identity).await?;
    let expiry = claims::expiry_from_claims(&claims)?;

    Ok(Json(FederationTokenDiagnostics {
        path,
        expiry,
        claims,
    }))
}

// ── Rendering ────────────────────────────────────────────────

fn render_home(info: &ServerInfo) -> String {
    format!(
        "<p>Server: {}</p>\n<p>Database: {}</p>\n<p>Version: {}</p>\n",
        escape_html(&info.server_name),
        escape_html(&info.database_name),
        escape_html(&info.version),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

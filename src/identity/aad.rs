//! Microsoft Entra ID token endpoint plumbing shared by the credentials.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{AccessToken, AuthError};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires_on: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// `{authority}/{tenant}/oauth2/v2.0/token`
pub fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// `{authority}/{tenant}/oauth2/v2.0/authorize`
pub fn authorize_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/authorize",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// POST a form to a token endpoint and parse the answer.
pub async fn request_token(
    http: &Client,
    url: &str,
    form: &[(&str, &str)],
    credential: &'static str,
) -> Result<AccessToken, AuthError> {
    tracing::debug!(credential, url = %url, "requesting token");
    let resp = http
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| AuthError::Request {
            credential,
            reason: format!("token endpoint unreachable: {}", e),
        })?;

    parse_token_response(resp, credential).await
}

/// Turn a token endpoint response into an [`AccessToken`].
///
/// Understands both the Entra ID shape (`expires_in` seconds) and the managed
/// identity shape (`expires_on` epoch seconds, often as a string).
pub async fn parse_token_response(
    resp: reqwest::Response,
    credential: &'static str,
) -> Result<AccessToken, AuthError> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| AuthError::Request {
        credential,
        reason: format!("failed to read token response: {}", e),
    })?;

    if !status.is_success() {
        let reason = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(ErrorResponse {
                error,
                error_description: Some(desc),
            }) => format!("{} ({}): {}", error, status, desc),
            Ok(ErrorResponse { error, .. }) => format!("{} ({})", error, status),
            Err(_) => format!("HTTP {}", status),
        };
        return Err(AuthError::Request { credential, reason });
    }

    let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        AuthError::MalformedToken(format!("{} returned an unreadable token response: {}", credential, e))
    })?;

    let expires_on = parsed
        .expires_on
        .as_ref()
        .and_then(epoch_seconds)
        .or_else(|| {
            parsed
                .expires_in
                .as_ref()
                .and_then(epoch_seconds)
                .map(|secs| Utc::now().timestamp() + secs)
        })
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(AccessToken::new(parsed.access_token, expires_on))
}

fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

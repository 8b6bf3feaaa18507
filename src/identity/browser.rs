//! Interactive browser sign-in, the last resort of the default chain.
//!
//! Authorization code flow with PKCE:
//! 1. bind a one-shot listener on `localhost:<random port>`
//! 2. open the Entra ID authorize page in the user's browser
//! 3. wait for the redirect carrying `code` + `state`
//! 4. redeem the code at the token endpoint

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use super::aad;
use super::{AccessToken, AuthError, IdentityEnv, TokenCredential};

const NAME: &str = "InteractiveBrowserCredential";

/// Public client used for developer sign-in by the Azure tooling.
pub const DEVELOPER_SIGN_ON_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

pub struct InteractiveBrowserCredential {
    client_id: String,
    tenant_id: String,
    authority_host: String,
    timeout: Duration,
    http: Client,
}

impl InteractiveBrowserCredential {
    pub fn from_env(env: &IdentityEnv, http: Client) -> Self {
        Self {
            client_id: DEVELOPER_SIGN_ON_CLIENT_ID.to_string(),
            tenant_id: env
                .tenant_id
                .clone()
                .unwrap_or_else(|| "organizations".to_string()),
            authority_host: env.authority_host.clone(),
            timeout: Duration::from_secs(300),
            http,
        }
    }

    fn authorize_url(&self, scope: &str, redirect_uri: &str, state: &str, challenge: &str) -> Result<Url, AuthError> {
        let endpoint = aad::authorize_endpoint(&self.authority_host, &self.tenant_id);
        let mut url = Url::parse(&endpoint)
            .map_err(|e| AuthError::Config(format!("invalid authority host: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &format!("{} openid offline_access profile", scope))
            .append_pair("state", state)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "select_account");
        Ok(url)
    }
}

pub(crate) struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

fn launch_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut cmd = std::process::Command::new("open");
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = std::process::Command::new("rundll32");
        c.arg("url.dll,FileProtocolHandler");
        c
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut cmd = std::process::Command::new("xdg-open");

    cmd.arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

/// Serve the redirect URI until one authorization response arrives.
async fn wait_for_code(
    listener: TcpListener,
    expected_state: String,
    timeout: Duration,
) -> Result<String, AuthError> {
    let (tx, mut rx) = mpsc::channel::<Result<String, String>>(1);

    let app = Router::new().route(
        "/",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let tx = tx.clone();
            let expected_state = expected_state.clone();
            async move {
                let outcome = match (params.get("code"), params.get("state")) {
                    (Some(code), Some(state)) if *state == expected_state => Ok(code.clone()),
                    _ => Err(params
                        .get("error_description")
                        .or_else(|| params.get("error"))
                        .cloned()
                        .unwrap_or_else(|| "authorization response did not match the request".to_string())),
                };
                let page = if outcome.is_ok() {
                    "<p>Sign-in complete. You can close this window.</p>"
                } else {
                    "<p>Sign-in failed. You can close this window.</p>"
                };
                let _ = tx.try_send(outcome);
                Html(page)
            }
        }),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::warn!(error = %e, "browser redirect listener failed");
        }
    });

    let received = tokio::time::timeout(timeout, rx.recv()).await;
    let _ = shutdown_tx.send(());

    match received {
        Err(_) => Err(AuthError::Unavailable {
            credential: NAME,
            reason: format!("no sign-in completed within {:?}", timeout),
        }),
        Ok(None) => Err(AuthError::Unavailable {
            credential: NAME,
            reason: "redirect listener stopped".to_string(),
        }),
        Ok(Some(Ok(code))) => Ok(code),
        Ok(Some(Err(reason))) => Err(AuthError::Request {
            credential: NAME,
            reason,
        }),
    }
}

#[async_trait]
impl TokenCredential for InteractiveBrowserCredential {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Unavailable {
                credential: NAME,
                reason: format!("cannot bind redirect listener: {}", e),
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Unavailable {
                credential: NAME,
                reason: e.to_string(),
            })?
            .port();
        let redirect_uri = format!("http://localhost:{}", port);

        let pkce = Pkce::generate();
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.authorize_url(scope, &redirect_uri, &state, &pkce.challenge)?;

        tracing::info!(url = %url, "waiting for interactive browser sign-in");
        if let Err(e) = launch_browser(url.as_str()) {
            tracing::warn!(error = %e, "could not open a browser, open the sign-in URL manually");
        }

        let code = wait_for_code(listener, state, self.timeout).await?;

        let token_url = aad::token_endpoint(&self.authority_host, &self.tenant_id);
        let form = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("scope", scope),
        ];
        aad::request_token(&self.http, &token_url, &form, NAME).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_challenge_matches_rfc7636_example() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pkce_verifiers_are_unique() {
        let a = Pkce::generate();
        let b = Pkce::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_eq!(a.verifier.len(), 43);
    }

    #[test]
    fn test_authorize_url() {
        let credential = InteractiveBrowserCredential::from_env(&IdentityEnv::default(), Client::new());
        let url = credential
            .authorize_url(crate::identity::SQL_SCOPE, "http://localhost:5000", "st4te", "ch4llenge")
            .unwrap();

        assert_eq!(url.path(), "/organizations/oauth2/v2.0/authorize");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], DEVELOPER_SIGN_ON_CLIENT_ID);
        assert_eq!(pairs["redirect_uri"], "http://localhost:5000");
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert!(pairs["scope"].starts_with("https://database.windows.net/.default"));
    }

    #[tokio::test]
    async fn test_redirect_with_matching_state_yields_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiter = tokio::spawn(wait_for_code(listener, "st4te".to_string(), Duration::from_secs(5)));

        let resp = reqwest::get(format!("http://127.0.0.1:{}/?code=abc123&state=st4te", port))
            .await
            .unwrap();
        assert!(resp.status().is_success());

        assert_eq!(waiter.await.unwrap().unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_redirect_with_wrong_state_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiter = tokio::spawn(wait_for_code(listener, "st4te".to_string(), Duration::from_secs(5)));

        reqwest::get(format!("http://127.0.0.1:{}/?code=abc123&state=forged", port))
            .await
            .unwrap();

        assert!(matches!(waiter.await.unwrap(), Err(AuthError::Request { .. })));
    }
}

//! Identity token acquisition for Azure SQL.
//!
//! A [`TokenProvider`] wraps one [`TokenCredential`] picked at start-up:
//! - `AZURE_FEDERATED_TOKEN_FILE` set → [`WorkloadIdentityCredential`] only
//! - otherwise → [`ChainedCredential::default_chain`] (environment secret,
//!   managed identity, Azure CLI, interactive browser)
//!
//! Tokens are never cached here. Every call goes to the credential, which
//! goes to the network.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::parse_bool;

pub mod aad;
pub mod azure_cli;
pub mod browser;
pub mod chain;
pub mod claims;
pub mod environment;
pub mod managed;
pub mod workload;

pub use azure_cli::AzureCliCredential;
pub use browser::InteractiveBrowserCredential;
pub use chain::ChainedCredential;
pub use claims::Claims;
pub use environment::EnvironmentCredential;
pub use managed::ManagedIdentityCredential;
pub use workload::WorkloadIdentityCredential;

/// Audience of Azure SQL Database access tokens.
pub const SQL_SCOPE: &str = "https://database.windows.net/.default";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_IMDS_HOST: &str = "http://169.254.169.254";

#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential cannot run in this environment. Chains move on.
    #[error("{credential} unavailable: {reason}")]
    Unavailable {
        credential: &'static str,
        reason: String,
    },

    #[error("{credential} token request failed: {reason}")]
    Request {
        credential: &'static str,
        reason: String,
    },

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("no credential produced a token: {}", .0.join("; "))]
    ChainExhausted(Vec<String>),

    #[error("identity configuration error: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl AuthError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::Unavailable { .. })
    }
}

/// Token as returned by a single credential.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    /// Expiry reported by the issuing endpoint, if it reported one.
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

impl ZeroizeOnDrop for AccessToken {}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// A bearer token plus the expiry decoded from its `exp` claim.
///
/// Lives for exactly one connection attempt.
#[derive(Clone)]
pub struct Token {
    raw: String,
    expiry: DateTime<Utc>,
}

impl Token {
    pub fn new(raw: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            raw: raw.into(),
            expiry,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.raw.zeroize();
    }
}

impl ZeroizeOnDrop for Token {}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("raw", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// One way of obtaining a token for a scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError>;
}

/// Identity settings read once from the environment.
#[derive(Clone)]
pub struct IdentityEnv {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub federated_token_file: Option<PathBuf>,
    pub authority_host: String,
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
    pub imds_host: String,
    pub exclude_interactive_browser: bool,
}

impl Default for IdentityEnv {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            federated_token_file: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            identity_endpoint: None,
            identity_header: None,
            imds_host: DEFAULT_IMDS_HOST.to_string(),
            exclude_interactive_browser: false,
        }
    }
}

impl IdentityEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the settings from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            tenant_id: get("AZURE_TENANT_ID"),
            client_id: get("AZURE_CLIENT_ID"),
            client_secret: get("AZURE_CLIENT_SECRET"),
            federated_token_file: get("AZURE_FEDERATED_TOKEN_FILE").map(PathBuf::from),
            authority_host: get("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            identity_endpoint: get("IDENTITY_ENDPOINT"),
            identity_header: get("IDENTITY_HEADER"),
            imds_host: get("AZURE_POD_IDENTITY_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_IMDS_HOST.to_string()),
            exclude_interactive_browser: get("AZURE_EXCLUDE_INTERACTIVE_BROWSER")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for IdentityEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityEnv")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("federated_token_file", &self.federated_token_file)
            .field("authority_host", &self.authority_host)
            .field("identity_endpoint", &self.identity_endpoint)
            .field("imds_host", &self.imds_host)
            .field("exclude_interactive_browser", &self.exclude_interactive_browser)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    WorkloadIdentity,
    DefaultChain,
}

impl CredentialStrategy {
    /// A federated token file means we run as a federated workload; probing
    /// anything else only adds latency.
    pub fn select(env: &IdentityEnv) -> Self {
        if env.federated_token_file.is_some() {
            CredentialStrategy::WorkloadIdentity
        } else {
            CredentialStrategy::DefaultChain
        }
    }
}

impl fmt::Display for CredentialStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStrategy::WorkloadIdentity => f.write_str("workload-identity"),
            CredentialStrategy::DefaultChain => f.write_str("default-chain"),
        }
    }
}

/// Shared client for every token endpoint call.
pub fn http_client() -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(AuthError::HttpClient)
}

pub struct TokenProvider {
    credential: Arc<dyn TokenCredential>,
    strategy: CredentialStrategy,
}

impl TokenProvider {
    pub fn new(credential: Arc<dyn TokenCredential>, strategy: CredentialStrategy) -> Self {
        Self {
            credential,
            strategy,
        }
    }

    pub fn from_env(env: &IdentityEnv) -> Result<Self, AuthError> {
        let http = http_client()?;
        let strategy = CredentialStrategy::select(env);
        let credential: Arc<dyn TokenCredential> = match strategy {
            CredentialStrategy::WorkloadIdentity => {
                Arc::new(WorkloadIdentityCredential::from_env(env, http)?)
            }
            CredentialStrategy::DefaultChain => {
                Arc::new(ChainedCredential::default_chain(env, http))
            }
        };

        tracing::info!(
            strategy = %strategy,
            credential = credential.name(),
            "token provider configured"
        );
        Ok(Self::new(credential, strategy))
    }

    pub fn strategy(&self) -> CredentialStrategy {
        self.strategy
    }

    pub fn credential_name(&self) -> &'static str {
        self.credential.name()
    }

    /// Fetch a fresh token for `scope` and decode its expiry.
    ///
    /// The claims are read without signature verification; the database
    /// server is the party that verifies the token.
    pub async fn acquire_token(&self, scope: &str) -> Result<Token, AuthError> {
        let mut access = self.credential.get_token(scope).await.map_err(|e| {
            tracing::warn!(
                strategy = %self.strategy,
                credential = self.credential.name(),
                error = %e,
                "token acquisition failed"
            );
            e
        })?;

        let expiry = match claims::expiry(&access.token)? {
            Some(exp) => exp,
            None => access.expires_on.ok_or_else(|| {
                AuthError::MalformedToken("token carries no exp claim".to_string())
            })?,
        };

        tracing::debug!(
            strategy = %self.strategy,
            credential = self.credential.name(),
            expiry = %expiry,
            "token acquired"
        );
        Ok(Token::new(std::mem::take(&mut access.token), expiry))
    }
}

/// Decoded claims of the configured federated token file.
pub async fn read_federated_token(env: &IdentityEnv) -> Result<Claims, AuthError> {
    let path = env
        .federated_token_file
        .as_ref()
        .ok_or_else(|| AuthError::Config("AZURE_FEDERATED_TOKEN_FILE is not set".to_string()))?;
    let assertion = workload::read_assertion(path).await?;
    claims::decode_unverified(&assertion)
}

/// `https://database.windows.net/.default` → `https://database.windows.net/`
pub(crate) fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix(".default").unwrap_or(scope)
}

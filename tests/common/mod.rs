//! Fakes for the identity and driver boundaries.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use tokenbridge::config::{Config, PoolSettings};
use tokenbridge::identity::{AccessToken, AuthError, CredentialStrategy, TokenCredential, TokenProvider};
use tokenbridge::sql::{
    ConnectParams, DbError, EncodedCredential, ServerInfo, SqlDriver, SqlSession,
    SQL_COPT_SS_ACCESS_TOKEN,
};
use tokenbridge::AppState;

/// Unsigned JWT with the given payload.
pub fn fake_jwt(payload: &str) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
    format!("{}.{}.c2lnbmF0dXJl", header, engine.encode(payload))
}

pub fn sql_token() -> String {
    fake_jwt(r#"{"aud":"https://database.windows.net/","oid":"workload-1","exp":1700000000}"#)
}

// ── Identity ─────────────────────────────────────────────────

pub struct FakeCredential {
    token: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeCredential {
    pub fn issuing(token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            token: Some(token.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            token: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenCredential for FakeCredential {
    fn name(&self) -> &'static str {
        "FakeCredential"
    }

    async fn get_token(&self, _scope: &str) -> Result<AccessToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.token {
            Some(token) => Ok(AccessToken::new(token.clone(), None)),
            None => Err(AuthError::Request {
                credential: "FakeCredential",
                reason: "identity endpoint refused the request".into(),
            }),
        }
    }
}

// ── Driver ───────────────────────────────────────────────────

#[derive(Default)]
pub struct DriverStats {
    pub connects: AtomicUsize,
    pub queries: AtomicUsize,
    pub pings: AtomicUsize,
    /// Tokens recovered from the attribute blob, one per connection.
    pub tokens: Mutex<Vec<String>>,
    /// Sessions opened before the current generation fail their ping.
    pub generation: AtomicUsize,
}

impl DriverStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Drop every connection opened so far. New connections stay healthy.
    pub fn break_open_sessions(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeDriver {
    pub info: ServerInfo,
    pub stats: Arc<DriverStats>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            info: ServerInfo {
                server_name: "drocx-eus1".into(),
                database_name: "free-db".into(),
                version: "Microsoft SQL Azure (RTM) - 12.0.2000.8".into(),
            },
            stats: Arc::new(DriverStats::default()),
        }
    }
}

struct FakeSession {
    info: ServerInfo,
    stats: Arc<DriverStats>,
    generation: usize,
}

#[async_trait]
impl SqlDriver for FakeDriver {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn SqlSession>, DbError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let blob = params
            .attr(SQL_COPT_SS_ACCESS_TOKEN)
            .ok_or(DbError::MissingAccessToken)?;
        let token = EncodedCredential::from_bytes(blob)?.decode()?;
        self.stats.tokens.lock().unwrap().push(token);

        Ok(Box::new(FakeSession {
            info: self.info.clone(),
            stats: self.stats.clone(),
            generation: self.stats.generation.load(Ordering::SeqCst),
        }))
    }
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn server_info(&mut self) -> Result<ServerInfo, DbError> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.stats.pings.fetch_add(1, Ordering::SeqCst);
        if self.generation < self.stats.generation.load(Ordering::SeqCst) {
            return Err(DbError::Query("connection reset".into()));
        }
        Ok(())
    }
}

// ── App wiring ───────────────────────────────────────────────

pub fn test_config() -> Config {
    Config {
        pool: PoolSettings {
            max_size: 1,
            checkout_timeout: Duration::from_millis(500),
            ..PoolSettings::default()
        },
        ..Config::default()
    }
}

pub fn app_state(config: Config, credential: Arc<FakeCredential>, driver: FakeDriver) -> Arc<AppState> {
    let tokens = Arc::new(TokenProvider::new(credential, CredentialStrategy::DefaultChain));
    Arc::new(AppState::new(config, tokens, Arc::new(driver)))
}

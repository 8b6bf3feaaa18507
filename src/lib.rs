//! tokenbridge: passwordless Azure SQL access with short-lived identity tokens.
//!
//! Library crate shared by the binary and the integration tests in `tests/`.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod errors;
pub mod identity;
pub mod sql;
pub mod store;

use identity::TokenProvider;
use sql::{SqlDriver, TokenConnector};
use store::sql::SqlStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub db: SqlStore,
    pub tokens: Arc<TokenProvider>,
    pub config: config::Config,
}

impl AppState {
    /// Wire the pool to the token provider. Nothing connects until the
    /// first query.
    pub fn new(config: config::Config, tokens: Arc<TokenProvider>, driver: Arc<dyn SqlDriver>) -> Self {
        let connector = TokenConnector::new(
            config.connect_target(),
            config.token_scope.clone(),
            tokens.clone(),
            driver,
        );
        let db = SqlStore::new(connector, &config.pool);
        Self { db, tokens, config }
    }
}

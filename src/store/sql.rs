use bb8::{ErrorSink, Pool, RunError};

use crate::config::PoolSettings;
use crate::sql::{DbError, ServerInfo, TokenConnector};

/// Pooled access to the database. Every physical connection the pool opens
/// goes through [`TokenConnector`] and carries its own fresh token.
#[derive(Clone)]
pub struct SqlStore {
    pool: Pool<TokenConnector>,
}

/// Logs connection errors raised while the pool opens connections in the
/// background. bb8 drops them otherwise.
#[derive(Debug, Clone, Copy)]
struct TracingErrorSink;

impl ErrorSink<DbError> for TracingErrorSink {
    fn sink(&self, error: DbError) {
        tracing::error!(error = %error, "pool failed to open a connection");
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<DbError>> {
        Box::new(*self)
    }
}

impl SqlStore {
    /// Build the pool without opening anything; the first request pays for
    /// the first token.
    pub fn new(connector: TokenConnector, settings: &PoolSettings) -> Self {
        let pool = Pool::builder()
            .max_size(settings.max_size)
            .min_idle(None)
            .max_lifetime(settings.recycle)
            .idle_timeout(settings.idle_timeout)
            .test_on_check_out(settings.pre_ping)
            .connection_timeout(settings.checkout_timeout)
            .error_sink(Box::new(TracingErrorSink))
            .build_unchecked(connector);
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<TokenConnector> {
        &self.pool
    }

    /// `SELECT @@SERVERNAME, DB_NAME(), @@VERSION`
    pub async fn server_info(&self) -> Result<ServerInfo, DbError> {
        let mut conn = self.pool.get().await.map_err(|e| match e {
            RunError::User(e) => e,
            RunError::TimedOut => DbError::PoolTimeout,
        })?;

        let info = conn.server_info().await?;
        tracing::info!(
            server = %info.server_name,
            database = %info.database_name,
            version = %info.version,
            "query results"
        );
        Ok(info)
    }
}

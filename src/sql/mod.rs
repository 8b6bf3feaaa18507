//! Database driver boundary.
//!
//! Connections are described by [`ConnectParams`]: where to connect plus the
//! pre-connect attributes the driver applies before the handshake. The access
//! token travels as attribute [`SQL_COPT_SS_ACCESS_TOKEN`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::identity::AuthError;

pub mod connector;
pub mod credential;
pub mod tds;

pub use connector::TokenConnector;
pub use credential::{EncodedCredential, EncodingError};
pub use tds::TdsDriver;

/// Pre-connect attribute carrying the access token struct.
pub const SQL_COPT_SS_ACCESS_TOKEN: i32 = 1256;

#[derive(Debug, Error)]
pub enum DbError {
    /// No token, no connection.
    #[error("connection aborted, no access token: {0}")]
    ConnectionAborted(#[from] AuthError),

    #[error("access token could not be encoded: {0}")]
    Encoding(#[from] EncodingError),

    #[error("connection parameters carry no access token")]
    MissingAccessToken,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("timed out waiting for a database connection")]
    PoolTimeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a physical connection goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub connect_timeout: Duration,
}

/// Everything the driver needs to open one connection.
#[derive(Clone)]
pub struct ConnectParams {
    pub target: ConnectTarget,
    /// Values hold credentials and are wiped on drop.
    attrs_before: BTreeMap<i32, Zeroizing<Vec<u8>>>,
}

impl ConnectParams {
    pub fn new(target: ConnectTarget) -> Self {
        Self {
            target,
            attrs_before: BTreeMap::new(),
        }
    }

    pub fn set_attr(&mut self, key: i32, value: Vec<u8>) {
        self.attrs_before.insert(key, Zeroizing::new(value));
    }

    pub fn attr(&self, key: i32) -> Option<&[u8]> {
        self.attrs_before.get(&key).map(|v| v.as_slice())
    }

    pub fn attr_keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.attrs_before.keys().copied()
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("target", &self.target)
            .field("attrs_before", &self.attr_keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What the server reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub database_name: String,
    pub version: String,
}

/// Opens physical connections. Implementations must refuse parameters
/// without an access token.
#[async_trait]
pub trait SqlDriver: Send + Sync + 'static {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn SqlSession>, DbError>;
}

/// One open connection.
#[async_trait]
pub trait SqlSession: Send {
    async fn server_info(&mut self) -> Result<ServerInfo, DbError>;

    async fn ping(&mut self) -> Result<(), DbError>;

    fn is_closed(&self) -> bool {
        false
    }
}

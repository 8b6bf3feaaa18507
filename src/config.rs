use std::time::Duration;

use crate::identity::{IdentityEnv, SQL_SCOPE};
use crate::sql::ConnectTarget;

pub const AZURE_SQL_SUFFIX: &str = ".database.windows.net";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Logical server name (`drocx-eus1`) or a full host name.
    pub server_name: String,
    pub database_name: String,
    pub sql_port: u16,
    pub connect_timeout: Duration,
    pub trust_server_certificate: bool,
    /// Audience of the access token presented to the server.
    pub token_scope: String,
    pub pool: PoolSettings,
    pub identity: IdentityEnv,
    /// Mount `/diagnostics/*`. Set via EXPOSE_TOKEN_DIAGNOSTICS.
    pub expose_token_diagnostics: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_size: u32,
    /// Maximum connection age. Bounds how long one token stays in use.
    pub recycle: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    /// Validate connections with a round trip on checkout.
    pub pre_ping: bool,
    pub checkout_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 4,
            recycle: Some(Duration::from_secs(300)),
            idle_timeout: Some(Duration::from_secs(60)),
            pre_ping: true,
            checkout_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            server_name: "drocx-eus1".into(),
            database_name: "free-db".into(),
            sql_port: 1433,
            connect_timeout: Duration::from_secs(30),
            trust_server_certificate: false,
            token_scope: SQL_SCOPE.into(),
            pool: PoolSettings::default(),
            identity: IdentityEnv::default(),
            expose_token_diagnostics: false,
        }
    }
}

impl Config {
    /// `drocx-eus1` → `drocx-eus1.database.windows.net`; dotted names pass through.
    pub fn server_host(&self) -> String {
        if self.server_name.contains('.') {
            self.server_name.clone()
        } else {
            format!("{}{}", self.server_name, AZURE_SQL_SUFFIX)
        }
    }

    pub fn connect_target(&self) -> ConnectTarget {
        ConnectTarget {
            host: self.server_host(),
            port: self.sql_port,
            database: self.database_name.clone(),
            encrypt: true,
            trust_server_certificate: self.trust_server_certificate,
            connect_timeout: self.connect_timeout,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Boolean env values shared by every flag we read.
pub(crate) fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Seconds, where `0` disables the setting.
fn optional_secs(v: Option<u64>, default: Option<Duration>) -> Option<Duration> {
    match v {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => default,
    }
}

pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let defaults = Config::default();
    let pool_defaults = PoolSettings::default();

    let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
    let flag = |key: &str, default: bool| lookup(key).and_then(|v| parse_bool(&v)).unwrap_or(default);
    let text = |key: &str, default: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    let max_size = match lookup("POOL_MAX_SIZE").filter(|v| !v.trim().is_empty()) {
        Some(v) => v
            .trim()
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("invalid POOL_MAX_SIZE {:?}: {}", v, e))?,
        None => pool_defaults.max_size,
    };
    if max_size == 0 {
        anyhow::bail!("POOL_MAX_SIZE must be at least 1");
    }

    Ok(Config {
        port: lookup("PORT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.port),
        server_name: text("SERVERNAME", &defaults.server_name),
        database_name: text("DATABASENAME", &defaults.database_name),
        sql_port: lookup("SQL_PORT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.sql_port),
        connect_timeout: number("SQL_CONNECT_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout),
        trust_server_certificate: flag("SQL_TRUST_SERVER_CERTIFICATE", false),
        token_scope: text("SQL_TOKEN_SCOPE", SQL_SCOPE),
        pool: PoolSettings {
            max_size,
            recycle: optional_secs(number("POOL_RECYCLE_SECS"), pool_defaults.recycle),
            idle_timeout: optional_secs(number("POOL_IDLE_TIMEOUT_SECS"), pool_defaults.idle_timeout),
            pre_ping: flag("POOL_PRE_PING", pool_defaults.pre_ping),
            checkout_timeout: number("POOL_CHECKOUT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(pool_defaults.checkout_timeout),
        },
        identity: IdentityEnv::from_lookup(&lookup),
        expose_token_diagnostics: flag("EXPOSE_TOKEN_DIAGNOSTICS", false),
    })
}

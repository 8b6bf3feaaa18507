//! SQL Server / Azure SQL driver on top of tiberius.

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{
    ConnectParams, DbError, EncodedCredential, ServerInfo, SqlDriver, SqlSession,
    SQL_COPT_SS_ACCESS_TOKEN,
};

const SERVER_INFO_QUERY: &str = "SELECT @@SERVERNAME, DB_NAME(), @@VERSION";

pub struct TdsDriver;

impl TdsDriver {
    /// Translate connection parameters into a tiberius config. The token
    /// attribute is mandatory: there is no password fallback.
    pub fn config_for(params: &ConnectParams) -> Result<Config, DbError> {
        let blob = params
            .attr(SQL_COPT_SS_ACCESS_TOKEN)
            .ok_or(DbError::MissingAccessToken)?;
        // Moves into tiberius, which owns it from here on.
        let token = EncodedCredential::from_bytes(blob)?.decode()?;

        let target = &params.target;
        let mut config = Config::new();
        config.host(&target.host);
        config.port(target.port);
        config.database(&target.database);
        config.authentication(AuthMethod::AADToken(token));
        config.encryption(if target.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if target.trust_server_certificate {
            config.trust_cert();
        }
        Ok(config)
    }
}

async fn open_tcp(config: &Config) -> Result<Compat<TcpStream>, DbError> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Ok(tcp.compat_write())
}

async fn handshake(config: Config) -> Result<Client<Compat<TcpStream>>, DbError> {
    let tcp = open_tcp(&config).await?;
    match Client::connect(config.clone(), tcp).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways may redirect to the node hosting the database.
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!(host = %host, port, "following server redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = open_tcp(&config).await?;
            Client::connect(config, tcp)
                .await
                .map_err(|e| DbError::Connect(e.to_string()))
        }
        Err(e) => Err(DbError::Connect(e.to_string())),
    }
}

#[async_trait]
impl SqlDriver for TdsDriver {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn SqlSession>, DbError> {
        let config = Self::config_for(&params)?;
        let timeout = params.target.connect_timeout;

        let client = tokio::time::timeout(timeout, handshake(config))
            .await
            .map_err(|_| DbError::Connect(format!("no handshake within {:?}", timeout)))??;

        tracing::debug!(host = %params.target.host, database = %params.target.database, "connection opened");
        Ok(Box::new(TdsSession { client }))
    }
}

struct TdsSession {
    client: Client<Compat<TcpStream>>,
}

fn query_err(e: tiberius::error::Error) -> DbError {
    DbError::Query(e.to_string())
}

#[async_trait]
impl SqlSession for TdsSession {
    async fn server_info(&mut self) -> Result<ServerInfo, DbError> {
        let row = self
            .client
            .simple_query(SERVER_INFO_QUERY)
            .await
            .map_err(query_err)?
            .into_row()
            .await
            .map_err(query_err)?
            .ok_or_else(|| DbError::Query("server info query returned no rows".to_string()))?;

        let column = |idx: usize| -> Result<String, DbError> {
            Ok(row
                .try_get::<&str, _>(idx)
                .map_err(query_err)?
                .unwrap_or_default()
                .to_string())
        };

        Ok(ServerInfo {
            server_name: column(0)?,
            database_name: column(1)?,
            version: column(2)?,
        })
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(query_err)?
            .into_results()
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenbridge::api::{self, handlers::AccessTokenDiagnostics};
use tokenbridge::config::{self, Config};
use tokenbridge::identity::{self, claims, TokenProvider};
use tokenbridge::sql::TdsDriver;
use tokenbridge::AppState;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Token { scope }) => {
            let scope = scope.unwrap_or_else(|| cfg.token_scope.clone());
            print_access_token(&cfg, &scope).await
        }
        Some(cli::Commands::DecodeFederationToken { path }) => {
            let mut identity = cfg.identity.clone();
            if path.is_some() {
                identity.federated_token_file = path;
            }
            print_federation_token(&identity).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // Export traces over OTLP only when a collector is configured.
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "tokenbridge"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tokenbridge=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();
    Ok(())
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(
        server = %cfg.server_host(),
        database = %cfg.database_name,
        recycle = ?cfg.pool.recycle,
        pre_ping = cfg.pool.pre_ping,
        "Configuring token-authenticated database access..."
    );
    let tokens = Arc::new(TokenProvider::from_env(&cfg.identity)?);
    let state = Arc::new(AppState::new(cfg, tokens, Arc::new(TdsDriver)));

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("tokenbridge listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn print_access_token(cfg: &Config, scope: &str) -> anyhow::Result<()> {
    let tokens = TokenProvider::from_env(&cfg.identity)?;
    let token = tokens.acquire_token(scope).await?;

    let diagnostics = AccessTokenDiagnostics {
        strategy: tokens.strategy().to_string(),
        credential: tokens.credential_name(),
        expiry: token.expiry(),
        claims: claims::decode_unverified(token.raw())?,
    };
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    Ok(())
}

async fn print_federation_token(env: &identity::IdentityEnv) -> anyhow::Result<()> {
    let claims = identity::read_federated_token(env)
        .await
        .context("failed to decode federated token")?;
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}

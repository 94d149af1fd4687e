use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

mod config;
use axum::{Router, middleware};
use config::{Config, MetricsConfig, Secrets};
use gateway::access_token::promote_access_token;
use gateway::middleware::{AuthGateway, authenticate};
use metrics_exporter_statsd::StatsdBuilder;
use provider::{CatalogProvider, ClusterApi, Command};
use proxy::{Forwarder, RoutingTable, forward};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(about = "Authenticating tenant-routing gateway")]
struct Args {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("failed to load config: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[error("failed to create runtime: {0}")]
    RuntimeError(#[from] std::io::Error),
}

fn main() {
    init_tracing();

    if let Err(e) = cli() {
        tracing::error!(error = %e, "startup error");
        process::exit(1);
    }
}

fn cli() -> Result<(), CliError> {
    let args = Args::parse();
    let config = Config::from_file(&args.config_file_path)?;
    let secrets = Secrets::from_env()?;
    init_statsd_recorder("switchyard", config.metrics.as_ref());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    if let Err(e) = rt.block_on(serve(config, secrets)) {
        tracing::error!(error = %e, "runtime error");
        process::exit(1);
    }
    Ok(())
}

async fn serve(config: Config, secrets: Secrets) -> Result<(), std::io::Error> {
    let gateway = Arc::new(AuthGateway::new(
        &secrets.tenant_url,
        &secrets.auth_url,
        &secrets.service_account_id,
        &secrets.service_account_secret,
        config.gateway.service_accounts,
    ));

    let api = ClusterApi::new(
        &secrets.auth_url,
        &config.provider.cluster_api,
        &secrets.service_account_id,
        &secrets.service_account_secret,
    );
    let catalog = CatalogProvider::new(api, config.provider.refresh_seconds);

    let (config_tx, config_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(8);
    tokio::spawn(catalog.run(config_tx, command_rx));

    let table = Arc::new(RoutingTable::new());
    {
        let table = table.clone();
        tokio::spawn(async move { table.run_updates(config_rx).await });
    }

    let app = Router::new()
        .fallback(forward)
        .with_state(Arc::new(Forwarder::new(table)))
        .layer(middleware::from_fn_with_state(gateway, authenticate))
        .layer(middleware::from_fn(promote_access_token));

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    tracing::info!(%addr, "starting gateway");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = command_tx.send(Command::Shutdown).await;
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn init_statsd_recorder(prefix: &str, metrics_config: Option<&MetricsConfig>) {
    if let Some(MetricsConfig {
        statsd_host,
        statsd_port,
    }) = metrics_config
    {
        let recorder = StatsdBuilder::from(statsd_host.clone(), *statsd_port)
            .build(Some(prefix))
            .expect("could not create statsd recorder");

        metrics::set_global_recorder(recorder).expect("could not set global metrics recorder");
    }
}

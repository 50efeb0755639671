//! Binary entry point for the cosb broker.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use cosb::api::{BasicCredentials, router};
use cosb::{
    Broker, BrokerConfig, Catalog, CatalogError, ConfigError, RadosGateway, RadosGatewayError,
    S3RecordStore, S3StoreError, telemetry,
};

mod cli;

use cli::{CatalogCommand, Cli, ServeCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("gateway error: {0}")]
    Gateway(#[from] RadosGatewayError),
    #[error("record store error: {0}")]
    Store(#[from] S3StoreError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Serve(command) => serve(command).await,
        Cli::Catalog(command) => print_catalog(&command, io::stdout()),
    }
}

async fn serve(args: ServeCommand) -> Result<(), CliError> {
    telemetry::init();
    let config = BrokerConfig::load_without_cli_args()?;
    config.validate()?;

    let catalog_path = args
        .catalog
        .map_or_else(|| config.catalog_file(), Utf8PathBuf::from);
    let catalog = Catalog::load(&catalog_path)?;
    info!(path = %catalog_path, services = catalog.services().len(), "catalog loaded");

    let gateway = RadosGateway::new(&config.gateway_settings())?;
    let store = S3RecordStore::new(&config.store_settings());
    store.ensure_bucket().await?;

    let broker = Broker::new(
        gateway,
        store,
        catalog,
        config.record_layout(),
        config.broker_settings()?,
    );
    let credentials = BasicCredentials::new(&config.broker_username, &config.broker_password);
    let app = router(Arc::new(broker), credentials);

    let address = args.listen.unwrap_or_else(|| config.listen_addr.clone());
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| CliError::Bind {
            address: address.clone(),
            source,
        })?;
    info!(address = %address, "broker listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(CliError::Serve)?;
    info!("broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
}

fn print_catalog(args: &CatalogCommand, mut target: impl Write) -> Result<(), CliError> {
    let catalog = Catalog::load(Utf8Path::new(&args.catalog))?;
    let rendered = serde_json::to_string_pretty(&catalog)
        .map_err(|err| CliError::Output(io::Error::other(err)))?;
    writeln!(target, "{rendered}").map_err(CliError::Output)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

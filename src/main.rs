//! # Legal Text Store Main Driver
//!
//! ## Purpose
//! Main entry point for the legal text store. Wires up storage, embedding
//! client, ingestion pipeline and retrieval service, then either runs the
//! REST API server or performs a one-shot ingestion.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment
//! - **Output**: Running API server, or ingestion reports on stdout/logs
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Open the store and construct service components
//! 4. Serve the API or run the requested ingestion
//! 5. Handle shutdown signals gracefully

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use legal_text_store::{
    api::ApiServer,
    catalog::Catalog,
    config::Config,
    embedding::{BatchEmbedder, OllamaEmbeddingClient},
    ingestion::{GesetzeImInternetSource, IngestionPipeline},
    search::RetrievalService,
    storage::TextStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("legal-store-server")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Legal Search Team")
        .about("Ingestion and semantic retrieval engine for German federal legal texts")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .subcommand(
            Command::new("serve").about("Run the REST API server").arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Override the configured server port")
                    .value_parser(clap::value_parser!(u16)),
            ),
        )
        .subcommand(
            Command::new("ingest")
                .about("Ingest one or more legal codes from the upstream archive")
                .arg(
                    Arg::new("codes")
                        .value_name("CODE")
                        .help("Code identifiers to ingest (e.g. bgb stgb)")
                        .num_args(0..),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .help("Ingest every cataloged code")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = Config::from_file(config_path).context("loading configuration")?;

    init_logging(&config);
    info!(
        "Starting legal text store v{} (config: {})",
        env!("CARGO_PKG_VERSION"),
        config_path
    );

    match matches.subcommand() {
        Some(("ingest", sub)) => {
            let app_state = initialize_components(Arc::new(config)).await?;
            run_ingest(&app_state, sub).await
        }
        Some(("serve", sub)) => {
            if let Some(port) = sub.get_one::<u16>("port") {
                config.server.port = *port;
            }
            serve(Arc::new(config)).await
        }
        _ => serve(Arc::new(config)).await,
    }
}

/// Initialize logging and tracing
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Initialize all application components
async fn initialize_components(config: Arc<Config>) -> anyhow::Result<AppState> {
    info!("Initializing application components...");

    let store = Arc::new(
        TextStore::open(
            &config.storage,
            &config.embedding.model,
            config.embedding.dimension,
        )
        .context("opening text store")?,
    );
    store.health_check().context("storage health check")?;

    let embedding_client =
        Arc::new(OllamaEmbeddingClient::new(&config.embedding).context("embedding client")?);
    let source =
        Arc::new(GesetzeImInternetSource::new(&config.source).context("document source")?);

    let batch_embedder = BatchEmbedder::new(embedding_client.clone(), &config.embedding);
    let pipeline = Arc::new(IngestionPipeline::new(source, batch_embedder, store.clone()));
    let retrieval = Arc::new(RetrievalService::with_config(
        store.clone(),
        embedding_client,
        config.search.clone(),
    ));
    let catalog = Arc::new(Catalog::from_config(&config.catalog, &config.source.base_url));

    info!(
        units = store.get_stats().total_units,
        cataloged_codes = catalog.len(),
        "All components initialized"
    );

    Ok(AppState {
        config,
        store,
        retrieval,
        pipeline,
        catalog,
    })
}

/// Run the API server until a shutdown signal arrives
async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let app_state = initialize_components(config.clone()).await?;

    let server = ApiServer::new(app_state.clone()).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    info!(
        "Legal text store started on {}:{}",
        config.server.host, config.server.port
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = server_handle => {
            warn!("Server stopped unexpectedly");
        }
    }

    app_state.store.flush().context("flushing store")?;
    info!("Legal text store shut down");
    Ok(())
}

/// Run a one-shot ingestion for the requested codes
async fn run_ingest(app_state: &AppState, sub: &ArgMatches) -> anyhow::Result<()> {
    let codes: Vec<String> = if sub.get_flag("all") {
        app_state.catalog.codes()
    } else {
        sub.get_many::<String>("codes")
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };

    if codes.is_empty() {
        anyhow::bail!("no codes given; pass CODE arguments or --all");
    }

    info!(codes = codes.len(), "Starting ingestion run");
    let results = app_state.pipeline.ingest_many(&codes).await;

    let mut failed_codes = 0usize;
    for (code, result) in &results {
        match result {
            Ok(report) => {
                info!(
                    code = %code,
                    created = report.created,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    "ingestion finished"
                );
                for warning in &report.warnings {
                    warn!(code = %code, "{}", warning);
                }
            }
            Err(e) => {
                failed_codes += 1;
                error!(code = %code, error = %e, "ingestion failed");
            }
        }
    }

    app_state.store.flush().context("flushing store")?;

    if failed_codes > 0 {
        anyhow::bail!("{} of {} codes failed to ingest", failed_codes, results.len());
    }
    Ok(())
}

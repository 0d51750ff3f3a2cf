use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tripfacets::config::ExplorerConfig;
use tripfacets::server;
use tripfacets::source::{self, TripFetcher};
use tripfacets::storage::QueryCache;
use tripfacets::{Coordinator, LogRenderer, RecordStore};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Serve crossfiltered trip delay facets over HTTP", long_about = None)]
struct Args {
    /// JSON config file; defaults apply when omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Load trips from a JSON file instead of the API.
    #[clap(long)]
    trips: Option<PathBuf>,

    #[clap(long)]
    start_date: Option<String>,

    #[clap(long)]
    end_date: Option<String>,

    #[clap(long)]
    bind: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "could not start runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn async_main(args: Args) -> tripfacets::Result<()> {
    let config = resolve_config(&args)?;
    let store = load_store(&args, &config).await?;

    let mut coordinator = Coordinator::new(store, config.facets())?;
    coordinator.attach(Box::new(LogRenderer));
    let report = coordinator.refresh()?;
    info!(visible = report.visible, total = report.total, "initial refresh");

    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| tripfacets::error::ConfigError::Invalid(format!("bind '{}': {e}", config.bind)))?;

    let shared = Arc::new(Mutex::new(coordinator));
    tokio::select! {
        _ = server::serve(shared, addr) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}

/// Config file first, then command line overrides.
fn resolve_config(args: &Args) -> tripfacets::Result<ExplorerConfig> {
    let mut config = match &args.config {
        Some(path) => ExplorerConfig::load(path)?,
        None => ExplorerConfig::default(),
    };
    if let Some(start) = &args.start_date {
        config.start_date = start.clone();
    }
    if let Some(end) = &args.end_date {
        config.end_date = end.clone();
    }
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn load_store(args: &Args, config: &ExplorerConfig) -> tripfacets::Result<RecordStore> {
    match &args.trips {
        Some(path) => source::load_file(path),
        None => {
            TripFetcher::new(&config.api_base)
                .with_cache(QueryCache::new(&config.cache_path))
                .load(&config.start_date, &config.end_date)
                .await
        }
    }
}

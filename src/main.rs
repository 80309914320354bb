use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use leylek::api::DynAPI;
use leylek::config::Config;
use leylek::db::PgStore;
use leylek::engine::Engine;
use leylek::error::Error;
use leylek::external::osrm::OsrmEstimator;
use leylek::route::{MokaRouteCache, RoutePlanner};
use leylek::{server, sweeper};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("leylek=info")),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!("shutting down: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let store = PgStore::new(&config.database_url, config.database_max_connections).await?;

    let routes = RoutePlanner::new(
        Arc::new(OsrmEstimator::new(config.osrm_base_url.clone())),
        Arc::new(MokaRouteCache::new(&config.route_cache)),
        &config.matching,
    );

    let engine = Engine::new(store, routes, config.matching.clone())?;
    let api = Arc::new(engine) as DynAPI;

    sweeper::spawn(api.clone(), config.sweep_interval);

    server::serve(api, config.listen_addr).await
}

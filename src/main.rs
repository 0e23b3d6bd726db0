use navindex::datasource::CoinGeckoDataSource;
use navindex::orchestration::{NavReconstructor, Rebalancer, Scheduler};
use navindex::{api, config::Config, db::init_db, MarketDataSource, Repository, Timestamp};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    let port = config.port;

    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));
    let datasource: Arc<dyn MarketDataSource> = Arc::new(
        CoinGeckoDataSource::new(
            config.market_data_api_url.clone(),
            config.market_data_api_key.clone(),
        )
        .with_max_elapsed(Duration::from_secs(config.retry_max_elapsed_secs)),
    );

    let rebalancer = Rebalancer::new(datasource.clone(), repo.clone(), config.clone());
    let reconstructor = NavReconstructor::new(datasource, repo.clone(), config.clone());
    let scheduler = Scheduler::new(rebalancer.clone(), reconstructor, config.clone());

    // Scheduler loop; the first tick fires immediately.
    let interval_secs = config.schedule_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let summaries = scheduler.run_once(Timestamp::now()).await;
            tracing::info!(indices = summaries.len(), "Scheduler tick finished");
        }
    });

    let app = api::create_router(api::AppState {
        repo,
        rebalancer: Arc::new(rebalancer),
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

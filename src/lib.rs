pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::{Config, IndexDefinition, IndexMode};
pub use datasource::{CoinGeckoDataSource, DataSourceError, MarketDataSource, MockMarketDataSource};
pub use db::{init_db, Repository, UpsertOutcome};
pub use domain::{
    AssetId, DailyNavPoint, Decimal, Exchange, IndexId, Pair, RebalanceSnapshot, Timestamp,
};
pub use engine::{ConsolidationPolicy, EngineError};
pub use error::AppError;

//! Async workflows that combine the market-data source, the repository and the
//! pure engines.

pub mod rebalance;
pub mod reconstruct;
pub mod scheduler;

pub use rebalance::{RebalanceError, RebalanceOutcome, Rebalancer};
pub use reconstruct::{NavReconstructor, ReconstructionError, ReconstructionReport};
pub use scheduler::{IndexRunSummary, RebalanceStatus, Scheduler};

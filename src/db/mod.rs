//! SQLite persistence for the Price Store, Listing Directory, Snapshot Store
//! and Daily Price Store.
//!
//! All writes are keyed upserts, so concurrent or repeated runs converge.

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{Repository, UpsertOutcome};

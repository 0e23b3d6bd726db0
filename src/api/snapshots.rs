use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{parse_range, AppState};
use crate::domain::{calendar, IndexId, RebalanceSnapshot};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SnapshotsQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub deployable: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotsResponse {
    pub snapshots: Vec<SnapshotDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDto {
    pub index_id: String,
    pub timestamp: i64,
    pub date: String,
    pub nav_at_rebalance: String,
    pub deployed: bool,
    pub weights: Vec<WeightDto>,
    pub coins: BTreeMap<String, u16>,
    pub prices: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightDto {
    pub pair: String,
    pub weight_bps: u16,
}

impl From<&RebalanceSnapshot> for SnapshotDto {
    fn from(s: &RebalanceSnapshot) -> Self {
        SnapshotDto {
            index_id: s.index_id.to_string(),
            timestamp: s.timestamp.as_i64(),
            date: calendar::to_date(s.timestamp).format("%Y-%m-%d").to_string(),
            nav_at_rebalance: s.nav_at_rebalance.to_canonical_string(),
            deployed: s.deployed,
            weights: s
                .weights()
                .into_iter()
                .map(|(pair, weight_bps)| WeightDto {
                    pair: pair.to_string(),
                    weight_bps,
                })
                .collect(),
            coins: s
                .coins()
                .into_iter()
                .map(|(asset_id, bps)| (asset_id.to_string(), bps))
                .collect(),
            prices: s
                .prices()
                .into_iter()
                .map(|(pair, price)| (pair.to_string(), price.to_canonical_string()))
                .collect(),
        }
    }
}

pub async fn get_snapshots(
    Path(index_id): Path<String>,
    Query(params): Query<SnapshotsQuery>,
    State(state): State<AppState>,
) -> Result<Json<SnapshotsResponse>, AppError> {
    let (from, to) = parse_range(params.from, params.to)?;
    let snapshots = state
        .repo
        .query_snapshots(&IndexId::new(index_id), from, to)
        .await?;

    Ok(Json(SnapshotsResponse {
        snapshots: snapshots.iter().map(SnapshotDto::from).collect(),
    }))
}

/// Most recent snapshot. With `deployable=true` the consolidation policy is
/// applied, which is what gets published on-chain.
pub async fn get_latest_snapshot(
    Path(index_id): Path<String>,
    Query(params): Query<LatestQuery>,
    State(state): State<AppState>,
) -> Result<Json<SnapshotDto>, AppError> {
    let index_id = IndexId::new(index_id);
    let snapshot = if params.deployable.unwrap_or(false) {
        state.rebalancer.latest_deployable_snapshot(&index_id).await?
    } else {
        state.repo.get_latest_snapshot(&index_id).await?
    };

    snapshot
        .as_ref()
        .map(|s| Json(SnapshotDto::from(s)))
        .ok_or_else(|| AppError::NotFound(format!("no snapshot for index {}", index_id)))
}

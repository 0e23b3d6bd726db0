use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{parse_range, AppState};
use crate::domain::IndexId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesResponse {
    pub index_id: String,
    pub prices: Vec<DailyPriceDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPriceDto {
    pub date: String,
    pub timestamp: i64,
    pub price: String,
    pub quantities: BTreeMap<String, String>,
}

/// Daily NAV series. Days without price data are absent, not zero.
pub async fn get_prices(
    Path(index_id): Path<String>,
    Query(params): Query<PricesQuery>,
    State(state): State<AppState>,
) -> Result<Json<PricesResponse>, AppError> {
    let (from, to) = parse_range(params.from, params.to)?;
    let index_id = IndexId::new(index_id);
    let points = state.repo.query_daily_prices(&index_id, from, to).await?;

    let prices = points
        .into_iter()
        .map(|p| DailyPriceDto {
            date: p.date().format("%Y-%m-%d").to_string(),
            timestamp: p.day.as_i64(),
            price: p.price.to_canonical_string(),
            quantities: p
                .quantities
                .iter()
                .map(|(asset_id, qty)| (asset_id.to_string(), qty.to_canonical_string()))
                .collect(),
        })
        .collect();

    Ok(Json(PricesResponse {
        index_id: index_id.to_string(),
        prices,
    }))
}

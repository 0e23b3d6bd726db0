//! CoinGecko market-data client.

use super::{DataSourceError, MarketDataSource};
use crate::domain::{calendar, Asset, AssetId, Decimal, PricePoint, Timestamp};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3";

const VS_CURRENCY: &str = "usd";
const API_KEY_HEADER: &str = "x-cg-pro-api-key";
/// In-flight `/coins/{id}` requests while tagging one ranking page.
const CATEGORY_FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CoinDetail {
    #[serde(default)]
    categories: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct CoinHistory {
    market_data: Option<HistoryMarketData>,
}

#[derive(Debug, Deserialize)]
struct HistoryMarketData {
    current_price: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

/// Market data from the CoinGecko REST API.
#[derive(Debug, Clone)]
pub struct CoinGeckoDataSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_elapsed: Duration,
}

impl CoinGeckoDataSource {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Bound the total time spent retrying one request.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DataSourceError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let mut request = self
                .client
                .get(&url)
                .query(query)
                .header("Accept", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }

            let response = request.send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::Network(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                debug!(url = %url, "Rate limited, backing off");
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(DataSourceError::Http {
                    status: status.as_u16(),
                    message: body,
                }));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::Parse(e.to_string())))
        })
        .await
    }

    async fn fetch_categories(&self, asset_id: &str) -> Result<Vec<String>, DataSourceError> {
        let detail: CoinDetail = self
            .get_json(
                &format!("/coins/{}", asset_id),
                &[
                    ("localization", "false".to_string()),
                    ("tickers", "false".to_string()),
                    ("market_data", "false".to_string()),
                    ("community_data", "false".to_string()),
                    ("developer_data", "false".to_string()),
                ],
            )
            .await?;
        Ok(detail.categories.into_iter().flatten().collect())
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoDataSource {
    async fn list_market_cap_ranked(
        &self,
        category: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Asset>, DataSourceError> {
        debug!(?category, page, page_size, "Fetching market-cap ranking");

        let mut query = vec![
            ("vs_currency", VS_CURRENCY.to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", page_size.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(category) = category {
            query.push(("category", category.to_string()));
        }

        let entries: Vec<MarketEntry> = self.get_json("/coins/markets", &query).await?;

        let category_futures: Vec<_> = entries
            .iter()
            .map(|e| self.fetch_categories(&e.id).boxed())
            .collect();
        let categories: Vec<Result<Vec<String>, DataSourceError>> =
            stream::iter(category_futures)
                .buffered(CATEGORY_FETCH_CONCURRENCY)
                .collect()
                .await;

        Ok(entries
            .into_iter()
            .zip(categories)
            .map(|(entry, categories)| match categories {
                Ok(categories) => parse_market_entry(entry, categories),
                Err(e) => {
                    warn!(asset_id = %entry.id, error = %e, "Category fetch failed");
                    parse_market_entry(entry, Vec::new()).with_category_error(e.to_string())
                }
            })
            .collect())
    }

    async fn price_at(
        &self,
        asset_id: &AssetId,
        at: Timestamp,
    ) -> Result<Option<Decimal>, DataSourceError> {
        let date = calendar::to_date(at).format("%d-%m-%Y").to_string();
        debug!(asset_id = %asset_id, date = %date, "Fetching historical price");

        let history: CoinHistory = self
            .get_json(
                &format!("/coins/{}/history", asset_id.as_str()),
                &[("date", date), ("localization", "false".to_string())],
            )
            .await?;

        let Some(price) = history
            .market_data
            .and_then(|m| m.current_price.get(VS_CURRENCY).copied())
        else {
            return Ok(None);
        };

        Decimal::from_f64(price)
            .map(Some)
            .ok_or_else(|| DataSourceError::Parse(format!("Invalid price: {}", price)))
    }

    async fn price_history(
        &self,
        asset_id: &AssetId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<PricePoint>, DataSourceError> {
        debug!(asset_id = %asset_id, from = from.as_i64(), to = to.as_i64(), "Fetching price range");

        let chart: MarketChart = self
            .get_json(
                &format!("/coins/{}/market_chart/range", asset_id.as_str()),
                &[
                    ("vs_currency", VS_CURRENCY.to_string()),
                    ("from", from.as_i64().to_string()),
                    ("to", to.as_i64().to_string()),
                ],
            )
            .await?;

        Ok(midnight_prices(&chart.prices, from, to))
    }
}

fn parse_market_entry(entry: MarketEntry, categories: Vec<String>) -> Asset {
    let market_cap = entry
        .market_cap
        .and_then(Decimal::from_f64)
        .unwrap_or_else(Decimal::zero);
    let mut asset = Asset::new(AssetId::new(entry.id), entry.symbol, market_cap)
        .with_categories(categories);
    if let Some(rank) = entry.market_cap_rank {
        asset = asset.with_rank(rank);
    }
    asset
}

/// Collapse `[millis, price]` samples into one point per UTC day. A sample
/// belongs to its nearest midnight and the closest sample wins, so the result
/// lines up with the 00:00 price served by `/history`.
fn midnight_prices(samples: &[(f64, f64)], from: Timestamp, to: Timestamp) -> Vec<PricePoint> {
    let mut by_day: BTreeMap<Timestamp, (i64, Decimal)> = BTreeMap::new();
    for &(millis, price) in samples {
        let secs = (millis / 1000.0) as i64;
        let day = calendar::floor_to_midnight(Timestamp::new(secs + calendar::SECONDS_PER_DAY / 2));
        if day < from || day > to {
            continue;
        }
        let Some(price) = Decimal::from_f64(price) else {
            warn!(millis, price, "Skipping unrepresentable price sample");
            continue;
        };
        let distance = (secs - day.as_i64()).abs();
        match by_day.get(&day) {
            Some((best, _)) if *best <= distance => {}
            _ => {
                by_day.insert(day, (distance, price));
            }
        }
    }
    by_day
        .into_iter()
        .map(|(day, (_, price))| PricePoint::new(day, price))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar::SECONDS_PER_DAY;

    #[test]
    fn test_parse_market_entry() {
        let entry: MarketEntry = serde_json::from_value(serde_json::json!({
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "market_cap": 1_200_000_000_000.0,
            "market_cap_rank": 1
        }))
        .unwrap();

        let asset = parse_market_entry(entry, vec!["Layer 1 (L1)".to_string()]);
        assert_eq!(asset.asset_id, AssetId::new("bitcoin"));
        assert_eq!(asset.normalized_symbol(), "BTC");
        assert_eq!(asset.market_cap_rank, Some(1));
        assert_eq!(asset.market_cap, Decimal::from(1_200_000_000_000i64));
        assert_eq!(asset.categories, vec!["Layer 1 (L1)".to_string()]);
    }

    #[test]
    fn test_parse_market_entry_without_cap() {
        let entry: MarketEntry = serde_json::from_value(serde_json::json!({
            "id": "newcoin",
            "symbol": "new",
            "market_cap": null,
            "market_cap_rank": null
        }))
        .unwrap();

        let asset = parse_market_entry(entry, Vec::new());
        assert!(asset.market_cap.is_zero());
        assert_eq!(asset.market_cap_rank, None);
    }

    #[test]
    fn test_coin_detail_skips_null_categories() {
        let detail: CoinDetail = serde_json::from_value(serde_json::json!({
            "id": "x",
            "categories": ["Stablecoins", null, "USD Stablecoin"]
        }))
        .unwrap();
        let categories: Vec<String> = detail.categories.into_iter().flatten().collect();
        assert_eq!(categories, vec!["Stablecoins", "USD Stablecoin"]);
    }

    #[test]
    fn test_midnight_prices_keep_sample_nearest_midnight() {
        let day = 19_000 * SECONDS_PER_DAY;
        let ms = |secs: i64| (secs * 1000) as f64;
        let samples = vec![
            (ms(day - 600), 9.0),
            (ms(day + 60), 10.0),
            (ms(day + 3_600), 11.0),
            (ms(day + SECONDS_PER_DAY + 7_200), 12.0),
            (ms(day + SECONDS_PER_DAY + 50_000), 13.0),
            (ms(day + 5 * SECONDS_PER_DAY), 99.0),
        ];

        let points = midnight_prices(
            &samples,
            Timestamp::new(day),
            Timestamp::new(day + 2 * SECONDS_PER_DAY),
        );
        assert_eq!(
            points,
            vec![
                PricePoint::new(Timestamp::new(day), Decimal::from(10i64)),
                PricePoint::new(
                    Timestamp::new(day + SECONDS_PER_DAY),
                    Decimal::from(12i64)
                ),
                PricePoint::new(
                    Timestamp::new(day + 2 * SECONDS_PER_DAY),
                    Decimal::from(13i64)
                ),
            ]
        );
    }

    /// Serves a two-coin ranking where `/coins/flaky` always answers 503.
    async fn spawn_ranking_server() -> String {
        use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
        use serde_json::json;

        let app = Router::new()
            .route(
                "/coins/markets",
                get(|| async {
                    Json(json!([
                        {"id": "bitcoin", "symbol": "btc", "market_cap": 1.0e12, "market_cap_rank": 1},
                        {"id": "flaky", "symbol": "flk", "market_cap": 5.0e11, "market_cap_rank": 2}
                    ]))
                }),
            )
            .route(
                "/coins/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "flaky" {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(json!({"id": id, "categories": ["Layer 1 (L1)"]})))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_category_failure_keeps_rest_of_page() {
        let base_url = spawn_ranking_server().await;
        let source = CoinGeckoDataSource::new(base_url, None)
            .with_max_elapsed(Duration::from_millis(200));

        let assets = source.list_market_cap_ranked(None, 1, 250).await.unwrap();
        assert_eq!(assets.len(), 2);

        assert_eq!(assets[0].asset_id, AssetId::new("bitcoin"));
        assert_eq!(assets[0].categories, vec!["Layer 1 (L1)".to_string()]);
        assert_eq!(assets[0].category_error, None);

        assert_eq!(assets[1].asset_id, AssetId::new("flaky"));
        assert!(assets[1].categories.is_empty());
        assert_eq!(
            assets[1].category_error.as_deref(),
            Some("HTTP 503: Server error")
        );
    }

    #[test]
    fn test_history_without_market_data() {
        let history: CoinHistory = serde_json::from_value(serde_json::json!({
            "id": "bitcoin",
            "symbol": "btc"
        }))
        .unwrap();
        assert!(history.market_data.is_none());
    }
}

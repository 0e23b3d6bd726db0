use navindex::config::Config;
use navindex::datasource::MockMarketDataSource;
use navindex::db::init_db;
use navindex::domain::calendar::SECONDS_PER_DAY;
use navindex::domain::{Constituent, PricePoint};
use navindex::orchestration::{NavReconstructor, ReconstructionError};
use navindex::{AssetId, Decimal, EngineError, IndexId, RebalanceSnapshot, Repository, Timestamp};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

const T0: i64 = 19_700 * SECONDS_PER_DAY;

struct TestEnv {
    repo: Arc<Repository>,
    config: Config,
    _temp: TempDir,
}

async fn setup(extra_env: &[(&str, &str)]) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let mut env = HashMap::new();
    env.insert("DATABASE_PATH".to_string(), db_path);
    for (k, v) in extra_env {
        env.insert(k.to_string(), v.to_string());
    }
    let config = Config::from_env_map(env).unwrap();

    TestEnv {
        repo,
        config,
        _temp: temp_dir,
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day(n: i64) -> Timestamp {
    Timestamp::new(T0 + n * SECONDS_PER_DAY)
}

fn constituent(asset: &str, pair: &str, bps: u16, price: &str) -> Constituent {
    Constituent {
        asset_id: AssetId::new(asset),
        symbol: asset.to_uppercase(),
        pair: pair.parse().unwrap(),
        weight_bps: bps,
        price: d(price),
    }
}

async fn store_snapshot(repo: &Repository, index: &str, at: Timestamp, constituents: Vec<Constituent>) {
    let snapshot = RebalanceSnapshot::new(IndexId::new(index), at, constituents);
    repo.upsert_snapshot(&snapshot).await.unwrap();
}

fn prices(days: std::ops::RangeInclusive<i64>, price: impl Fn(i64) -> &'static str) -> Vec<(Timestamp, Decimal)> {
    days.map(|n| (day(n), d(price(n)))).collect()
}

/// Asset A held for two weeks at a flat $10, then asset B at $20 rising 10%
/// over five days.
async fn seed_two_periods(repo: &Repository) -> MockMarketDataSource {
    store_snapshot(repo, "e2e", day(0), vec![constituent("a", "bi.AUSDC", 10_000, "10")]).await;
    store_snapshot(repo, "e2e", day(14), vec![constituent("b", "bi.BUSDC", 10_000, "20")]).await;

    MockMarketDataSource::new()
        .with_prices(&AssetId::new("a"), prices(0..=13, |_| "10"))
        .with_prices(
            &AssetId::new("b"),
            prices(14..=18, |n| match n {
                14 => "20",
                15 => "20.5",
                16 => "21",
                17 => "21.5",
                _ => "22",
            }),
        )
}

#[tokio::test]
async fn test_end_to_end_two_snapshots() {
    let env = setup(&[]).await;
    let datasource = Arc::new(seed_two_periods(&env.repo).await);
    let reconstructor = NavReconstructor::new(datasource, env.repo.clone(), env.config.clone());
    let index = IndexId::new("e2e");

    let now = Timestamp::new(day(19).as_i64() + 3_600);
    let report = reconstructor.reconstruct_until(&index, now).await.unwrap();
    assert_eq!(report.points.len(), 19);
    assert!(report.gaps.is_empty());
    assert_eq!(report.last_known, d("11000"));

    let stored = env.repo.query_daily_prices(&index, None, None).await.unwrap();
    assert_eq!(stored.len(), 19);
    for point in &stored[..14] {
        assert_eq!(point.price, d("10000"));
        assert_eq!(point.quantities[&AssetId::new("a")], d("1000"));
    }
    let tail: Vec<Decimal> = stored[14..].iter().map(|p| p.price).collect();
    assert_eq!(
        tail,
        vec![d("10000"), d("10250"), d("10500"), d("10750"), d("11000")]
    );
    assert_eq!(stored[18].quantities[&AssetId::new("b")], d("500"));
    assert_eq!(stored[18].day, day(18));
}

#[tokio::test]
async fn test_backfilled_prices_are_persisted() {
    let env = setup(&[]).await;
    let datasource = Arc::new(seed_two_periods(&env.repo).await);
    let reconstructor =
        NavReconstructor::new(datasource.clone(), env.repo.clone(), env.config.clone());

    reconstructor
        .reconstruct_until(&IndexId::new("e2e"), day(19))
        .await
        .unwrap();

    // One range request per asset and period.
    assert_eq!(datasource.price_history_calls(), 2);
    let stored = env
        .repo
        .query_asset_prices(&AssetId::new("b"), day(14), day(18))
        .await
        .unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored[1], PricePoint::new(day(15), d("20.5")));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let env = setup(&[]).await;
    let datasource = Arc::new(seed_two_periods(&env.repo).await);
    let reconstructor =
        NavReconstructor::new(datasource.clone(), env.repo.clone(), env.config.clone());
    let index = IndexId::new("e2e");

    let first = reconstructor.reconstruct_until(&index, day(19)).await.unwrap();
    let calls = datasource.price_history_calls();
    let second = reconstructor.reconstruct_until(&index, day(19)).await.unwrap();

    assert_eq!(first.points.len(), 19);
    assert!(second.points.is_empty());
    assert_eq!(second.last_known, first.last_known);
    assert_eq!(datasource.price_history_calls(), calls);
    assert_eq!(
        env.repo.query_daily_prices(&index, None, None).await.unwrap().len(),
        19
    );
}

#[tokio::test]
async fn test_resume_extends_final_period_with_same_quantities() {
    let env = setup(&[]).await;
    let datasource = Arc::new(seed_two_periods(&env.repo).await);
    let reconstructor = NavReconstructor::new(datasource, env.repo.clone(), env.config.clone());
    let index = IndexId::new("e2e");

    let partial = reconstructor.reconstruct_until(&index, day(17)).await.unwrap();
    assert_eq!(partial.points.len(), 17);
    assert_eq!(partial.last_known, d("10500"));

    let resumed = reconstructor.reconstruct_until(&index, day(19)).await.unwrap();
    let days: Vec<Timestamp> = resumed.points.iter().map(|p| p.day).collect();
    assert_eq!(days, vec![day(17), day(18)]);
    assert_eq!(resumed.points[0].price, d("10750"));
    assert_eq!(resumed.points[1].price, d("11000"));
}

#[tokio::test]
async fn test_days_without_any_price_are_gaps() {
    let env = setup(&[("PRICE_TOLERANCE_DAYS", "0")]).await;
    store_snapshot(
        &env.repo,
        "gap",
        day(0),
        vec![
            constituent("a", "bi.AUSDC", 5_000, "10"),
            constituent("b", "bi.BUSDC", 5_000, "10"),
        ],
    )
    .await;
    let datasource = MockMarketDataSource::new()
        .with_prices(&AssetId::new("a"), prices(0..=2, |_| "10"))
        .with_prices(&AssetId::new("b"), prices(0..=0, |_| "10"));
    let reconstructor =
        NavReconstructor::new(Arc::new(datasource), env.repo.clone(), env.config.clone());
    let index = IndexId::new("gap");

    let report = reconstructor.reconstruct_until(&index, day(5)).await.unwrap();
    assert_eq!(report.gaps, vec![day(3), day(4)]);

    let stored = env.repo.query_daily_prices(&index, None, None).await.unwrap();
    let by_day: Vec<(Timestamp, Decimal)> = stored.iter().map(|p| (p.day, p.price)).collect();
    // Day 0 prices both assets; days 1-2 only A; days 3-4 are absent entirely.
    assert_eq!(
        by_day,
        vec![(day(0), d("10000")), (day(1), d("5000")), (day(2), d("5000"))]
    );
}

#[tokio::test]
async fn test_nearest_price_bridges_short_gaps() {
    let env = setup(&[]).await;
    store_snapshot(&env.repo, "near", day(0), vec![constituent("a", "bi.AUSDC", 10_000, "10")]).await;
    // Day 1 and 2 are missing; day 1 takes the preceding price, day 2 the following one.
    let datasource = MockMarketDataSource::new().with_prices(
        &AssetId::new("a"),
        vec![(day(0), d("10")), (day(3), d("13"))],
    );
    let reconstructor =
        NavReconstructor::new(Arc::new(datasource), env.repo.clone(), env.config.clone());

    let report = reconstructor
        .reconstruct_until(&IndexId::new("near"), day(4))
        .await
        .unwrap();
    let nav: Vec<Decimal> = report.points.iter().map(|p| p.price).collect();
    assert_eq!(nav, vec![d("10000"), d("10000"), d("13000"), d("13000")]);
}

#[tokio::test]
async fn test_final_period_of_broad_index_is_consolidated() {
    let env = setup(&[]).await;
    let constituents = vec![
        constituent("bitcoin", "bi.BTCUSDC", 5_000, "100"),
        constituent("foo", "bg.FOOUSDC", 5_000, "10"),
    ];
    store_snapshot(&env.repo, "top100", day(0), constituents.clone()).await;
    store_snapshot(&env.repo, "top100", day(2), constituents).await;

    let datasource = MockMarketDataSource::new()
        .with_prices(&AssetId::new("bitcoin"), prices(0..=3, |_| "100"))
        .with_prices(&AssetId::new("foo"), prices(0..=3, |n| if n == 0 { "10" } else { "20" }));
    let reconstructor =
        NavReconstructor::new(Arc::new(datasource), env.repo.clone(), env.config.clone());
    let index = IndexId::new("top100");

    let report = reconstructor.reconstruct_until(&index, day(4)).await.unwrap();
    let nav: Vec<Decimal> = report.points.iter().map(|p| p.price).collect();
    assert_eq!(nav, vec![d("10000"), d("15000"), d("15000"), d("15000")]);

    // History keeps both assets; the final period holds only the target.
    assert_eq!(report.points[1].quantities.len(), 2);
    assert_eq!(report.points[2].quantities.len(), 1);
    assert_eq!(report.points[2].quantities[&AssetId::new("bitcoin")], d("150"));

    // Stored snapshots are not rewritten.
    let stored = env.repo.get_latest_snapshot(&index).await.unwrap().unwrap();
    assert_eq!(stored.constituents.len(), 2);
}

#[tokio::test]
async fn test_missing_consolidation_target_aborts_without_writes() {
    let env = setup(&[]).await;
    let constituents = vec![constituent("foo", "bg.FOOUSDC", 10_000, "10")];
    store_snapshot(&env.repo, "top100", day(0), constituents.clone()).await;
    store_snapshot(&env.repo, "top100", day(2), constituents).await;

    let datasource = MockMarketDataSource::new()
        .with_prices(&AssetId::new("foo"), prices(0..=3, |_| "10"));
    let reconstructor =
        NavReconstructor::new(Arc::new(datasource), env.repo.clone(), env.config.clone());
    let index = IndexId::new("top100");

    let result = reconstructor.reconstruct_until(&index, day(4)).await;
    assert!(matches!(
        result,
        Err(ReconstructionError::Engine(EngineError::ConsolidationTargetMissing(_)))
    ));
    assert!(env
        .repo
        .query_daily_prices(&index, None, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_failing_backfill_uses_stored_prices() {
    let env = setup(&[]).await;
    store_snapshot(&env.repo, "cached", day(0), vec![constituent("a", "bi.AUSDC", 10_000, "10")]).await;
    env.repo
        .insert_asset_prices(
            &AssetId::new("a"),
            &[PricePoint::new(day(0), d("10")), PricePoint::new(day(1), d("11"))],
        )
        .await
        .unwrap();
    let datasource = MockMarketDataSource::new().with_failing_asset(&AssetId::new("a"));
    let reconstructor =
        NavReconstructor::new(Arc::new(datasource), env.repo.clone(), env.config.clone());

    let report = reconstructor
        .reconstruct_until(&IndexId::new("cached"), day(3))
        .await
        .unwrap();
    let nav: Vec<Decimal> = report.points.iter().map(|p| p.price).collect();
    // Day 2 falls back to the nearest stored price within tolerance.
    assert_eq!(nav, vec![d("10000"), d("11000"), d("11000")]);
}

#[tokio::test]
async fn test_no_snapshots_is_a_no_op() {
    let env = setup(&[]).await;
    let reconstructor = NavReconstructor::new(
        Arc::new(MockMarketDataSource::new()),
        env.repo.clone(),
        env.config.clone(),
    );
    let report = reconstructor
        .reconstruct_until(&IndexId::new("empty"), day(10))
        .await
        .unwrap();
    assert!(report.points.is_empty());
    assert_eq!(report.last_known, d("10000"));
}

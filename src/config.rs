use crate::datasource::coingecko::DEFAULT_API_URL;
use crate::domain::{Decimal, Exchange, IndexId, Pair};
use crate::engine::eligibility::{DEFAULT_CATEGORY_BLACKLIST, DEFAULT_TOKEN_BLACKLIST};
use crate::engine::nav::DEFAULT_BASE_NAV;
use crate::engine::{Blacklist, ConsolidationPolicy};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub market_data_api_url: String,
    pub market_data_api_key: Option<String>,
    pub indices: Vec<IndexDefinition>,
    pub target_count: usize,
    pub page_size: u32,
    pub max_pages: u32,
    pub broad_market_cap_floor: Decimal,
    pub thematic_market_cap_floor: Decimal,
    pub category_blacklist: Vec<String>,
    pub token_blacklist: Vec<String>,
    pub consolidation: ConsolidationPolicy,
    pub base_nav: Decimal,
    pub price_tolerance_days: i64,
    pub retry_max_elapsed_secs: u64,
    pub schedule_interval_secs: u64,
    /// Minimum age in days of the latest snapshot before the scheduler
    /// rebalances again.
    pub rebalance_interval_days: i64,
}

/// How an index selects its universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMode {
    /// Global market-cap scan.
    Broad,
    /// Market-cap scan restricted to one category tag.
    Thematic { category: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub index_id: IndexId,
    pub mode: IndexMode,
}

impl IndexDefinition {
    pub fn broad(index_id: impl Into<String>) -> Self {
        Self {
            index_id: IndexId::new(index_id),
            mode: IndexMode::Broad,
        }
    }

    pub fn thematic(index_id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            index_id: IndexId::new(index_id),
            mode: IndexMode::Thematic {
                category: category.into(),
            },
        }
    }

    pub fn category(&self) -> Option<&str> {
        match &self.mode {
            IndexMode::Broad => None,
            IndexMode::Thematic { category } => Some(category),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let market_data_api_url = env_map
            .get("MARKET_DATA_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let market_data_api_key = env_map
            .get("MARKET_DATA_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let indices = parse_indices(
            env_map
                .get("INDEX_IDS")
                .map(|s| s.as_str())
                .unwrap_or("top100:broad"),
        )?;

        let target_count = parse_or(&env_map, "TARGET_COUNT", 100usize, "must be a valid usize")?;
        if target_count == 0 {
            return Err(ConfigError::InvalidValue(
                "TARGET_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let page_size = parse_or(&env_map, "PAGE_SIZE", 250u32, "must be a valid u32")?;
        let max_pages = parse_or(&env_map, "MAX_PAGES", 20u32, "must be a valid u32")?;

        let broad_market_cap_floor = parse_or(
            &env_map,
            "BROAD_MARKET_CAP_FLOOR",
            Decimal::from(100_000_000i64),
            "must be a decimal number",
        )?;
        let thematic_market_cap_floor = parse_or(
            &env_map,
            "THEMATIC_MARKET_CAP_FLOOR",
            Decimal::from(1_000_000i64),
            "must be a decimal number",
        )?;

        let category_blacklist = parse_list(&env_map, "CATEGORY_BLACKLIST")
            .unwrap_or_else(|| DEFAULT_CATEGORY_BLACKLIST.iter().map(|s| s.to_string()).collect());
        let token_blacklist = parse_list(&env_map, "TOKEN_BLACKLIST")
            .unwrap_or_else(|| DEFAULT_TOKEN_BLACKLIST.iter().map(|s| s.to_string()).collect());

        let consolidation = parse_consolidation(&env_map)?;

        let base_nav = parse_or(
            &env_map,
            "BASE_NAV",
            Decimal::from(DEFAULT_BASE_NAV),
            "must be a decimal number",
        )?;
        if !base_nav.is_positive() {
            return Err(ConfigError::InvalidValue(
                "BASE_NAV".to_string(),
                "must be positive".to_string(),
            ));
        }

        let price_tolerance_days =
            parse_or(&env_map, "PRICE_TOLERANCE_DAYS", 3i64, "must be a valid i64")?;
        if price_tolerance_days < 0 {
            return Err(ConfigError::InvalidValue(
                "PRICE_TOLERANCE_DAYS".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let retry_max_elapsed_secs =
            parse_or(&env_map, "RETRY_MAX_ELAPSED_SECS", 30u64, "must be a valid u64")?;
        let schedule_interval_secs =
            parse_or(&env_map, "SCHEDULE_INTERVAL_SECS", 86_400u64, "must be a valid u64")?;
        if schedule_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULE_INTERVAL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let rebalance_interval_days =
            parse_or(&env_map, "REBALANCE_INTERVAL_DAYS", 14i64, "must be a valid i64")?;
        if rebalance_interval_days < 1 {
            return Err(ConfigError::InvalidValue(
                "REBALANCE_INTERVAL_DAYS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            market_data_api_url,
            market_data_api_key,
            indices,
            target_count,
            page_size,
            max_pages,
            broad_market_cap_floor,
            thematic_market_cap_floor,
            category_blacklist,
            token_blacklist,
            consolidation,
            base_nav,
            price_tolerance_days,
            retry_max_elapsed_secs,
            schedule_interval_secs,
            rebalance_interval_days,
        })
    }

    pub fn blacklist(&self) -> Blacklist {
        Blacklist::new(&self.category_blacklist, &self.token_blacklist)
    }

    pub fn market_cap_floor(&self, mode: &IndexMode) -> Decimal {
        match mode {
            IndexMode::Broad => self.broad_market_cap_floor,
            IndexMode::Thematic { .. } => self.thematic_market_cap_floor,
        }
    }

    pub fn index(&self, index_id: &IndexId) -> Option<&IndexDefinition> {
        self.indices.iter().find(|d| &d.index_id == index_id)
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string())),
        None => Ok(default),
    }
}

fn parse_list(env_map: &HashMap<String, String>, key: &str) -> Option<Vec<String>> {
    env_map.get(key).map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Parse `id[:broad|:thematic=category]` entries separated by commas.
fn parse_indices(raw: &str) -> Result<Vec<IndexDefinition>, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("INDEX_IDS".to_string(), msg);

    let mut indices: Vec<IndexDefinition> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, mode) = entry.split_once(':').unwrap_or((entry, "broad"));
        let id = id.trim();
        if id.is_empty() {
            return Err(invalid(format!("empty index id in '{}'", entry)));
        }

        let definition = match mode.trim() {
            "broad" => IndexDefinition::broad(id),
            other => match other.strip_prefix("thematic=") {
                Some(category) if !category.trim().is_empty() => {
                    IndexDefinition::thematic(id, category.trim())
                }
                _ => {
                    return Err(invalid(format!(
                        "mode must be broad or thematic=<category>, got {}",
                        other
                    )))
                }
            },
        };

        if indices.iter().any(|d| d.index_id == definition.index_id) {
            return Err(invalid(format!("duplicate index id {}", id)));
        }
        indices.push(definition);
    }

    if indices.is_empty() {
        return Err(invalid("at least one index is required".to_string()));
    }
    Ok(indices)
}

fn parse_consolidation(env_map: &HashMap<String, String>) -> Result<ConsolidationPolicy, ConfigError> {
    let index_ids = parse_list(env_map, "CONSOLIDATION_INDEX_IDS")
        .unwrap_or_else(|| vec!["top100".to_string()])
        .into_iter()
        .map(IndexId::new);

    let source_exchange = match env_map.get("CONSOLIDATION_SOURCE_EXCHANGE") {
        Some(raw) => Exchange::from_str(raw.trim()).map_err(|_| {
            ConfigError::InvalidValue(
                "CONSOLIDATION_SOURCE_EXCHANGE".to_string(),
                format!("unknown exchange {}", raw),
            )
        })?,
        None => Exchange::Bitget,
    };

    let target_pair = match env_map.get("CONSOLIDATION_TARGET_PAIR") {
        Some(raw) => Pair::from_str(raw.trim()).map_err(|e| {
            ConfigError::InvalidValue("CONSOLIDATION_TARGET_PAIR".to_string(), e.to_string())
        })?,
        None => Pair::new(Exchange::Binance, "BTC", "USDC"),
    };

    if target_pair.exchange == source_exchange {
        return Err(ConfigError::InvalidValue(
            "CONSOLIDATION_TARGET_PAIR".to_string(),
            "must not be on the source exchange".to_string(),
        ));
    }

    Ok(ConsolidationPolicy::new(index_ids, source_exchange, target_pair))
}

use crate::domain::{normalize_symbol, Exchange, ListingDirectory, Pair, Timestamp, QUOTE_CURRENCIES};

/// Resolves a base symbol to the best tradable pair at a point in time.
///
/// Priority, first match wins: primary exchange in quote order (listed and
/// whitelisted), then secondary exchange in quote order (listed only).
pub struct PairResolver<'a> {
    directory: &'a ListingDirectory,
}

impl<'a> PairResolver<'a> {
    pub fn new(directory: &'a ListingDirectory) -> Self {
        Self { directory }
    }

    pub fn resolve(&self, base_symbol: &str, as_of: Timestamp) -> Option<Pair> {
        let base = normalize_symbol(base_symbol);
        let base = base.as_str();
        [Exchange::Binance, Exchange::Bitget]
            .into_iter()
            .flat_map(|exchange| {
                QUOTE_CURRENCIES
                    .iter()
                    .map(move |quote| Pair::new(exchange, base, quote))
            })
            .find(|pair| self.is_tradable(pair, as_of))
    }

    fn is_tradable(&self, pair: &Pair, as_of: Timestamp) -> bool {
        let ticker = pair.ticker();
        let listed = self
            .directory
            .get(&ticker)
            .is_some_and(|record| record.is_listed_as_of(pair.exchange, as_of));
        match pair.exchange {
            // Primary listing dates include announced-but-never-live pairs.
            Exchange::Binance => listed && self.directory.is_whitelisted(pair.exchange, &ticker),
            Exchange::Bitget => listed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListingDates, ListingRecord};

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(secs)
    }

    fn record(ticker: &str, base: &str, exchange: Exchange, effective: i64) -> ListingRecord {
        ListingRecord::new(ticker, base).with_exchange(exchange, ListingDates::listed_at(ts(effective)))
    }

    #[test]
    fn test_primary_usdc_wins_when_whitelisted() {
        let dir = ListingDirectory::new()
            .with_record(record("BTCUSDC", "BTC", Exchange::Binance, 0))
            .with_record(record("BTCUSDT", "BTC", Exchange::Binance, 0))
            .with_whitelist(Exchange::Binance, ["BTCUSDC", "BTCUSDT"]);
        let pair = PairResolver::new(&dir).resolve("btc", ts(10)).unwrap();
        assert_eq!(pair.to_string(), "bi.BTCUSDC");
    }

    #[test]
    fn test_primary_requires_whitelist() {
        let dir = ListingDirectory::new()
            .with_record(record("FOOUSDC", "FOO", Exchange::Binance, 0))
            .with_record(record("FOOUSDT", "FOO", Exchange::Binance, 0))
            .with_whitelist(Exchange::Binance, ["FOOUSDT"]);
        let pair = PairResolver::new(&dir).resolve("FOO", ts(10)).unwrap();
        assert_eq!(pair.to_string(), "bi.FOOUSDT");
    }

    #[test]
    fn test_date_gate_falls_through_to_secondary() {
        // Primary USDC goes live in the future; secondary USDT is already live.
        let dir = ListingDirectory::new()
            .with_record(record("FOOUSDC", "FOO", Exchange::Binance, 1_000))
            .with_record(record("FOOUSDT", "FOO", Exchange::Bitget, 100))
            .with_whitelist(Exchange::Binance, ["FOOUSDC"]);
        let resolver = PairResolver::new(&dir);

        assert_eq!(resolver.resolve("FOO", ts(500)).unwrap().to_string(), "bg.FOOUSDT");
        assert_eq!(resolver.resolve("FOO", ts(1_000)).unwrap().to_string(), "bi.FOOUSDC");
        assert!(resolver.resolve("FOO", ts(50)).is_none());
    }

    #[test]
    fn test_secondary_usdc_before_usdt() {
        let usdc = ListingRecord::new("BARUSDC", "BAR")
            .with_exchange(Exchange::Bitget, ListingDates::listed_at(ts(0)));
        let dir = ListingDirectory::new()
            .with_record(usdc)
            .with_record(record("BARUSDT", "BAR", Exchange::Bitget, 0));
        assert_eq!(
            PairResolver::new(&dir).resolve("BAR", ts(1)).unwrap().to_string(),
            "bg.BARUSDC"
        );
    }

    #[test]
    fn test_delisted_pair_is_skipped() {
        let mut dates = ListingDates::listed_at(ts(0));
        dates.delisting_effective_at = Some(ts(50));
        let dir = ListingDirectory::new()
            .with_record(ListingRecord::new("OLDUSDC", "OLD").with_exchange(Exchange::Bitget, dates));
        let resolver = PairResolver::new(&dir);
        assert!(resolver.resolve("OLD", ts(10)).is_some());
        assert!(resolver.resolve("OLD", ts(50)).is_none());
    }

    #[test]
    fn test_unknown_symbol_resolves_to_none() {
        let dir = ListingDirectory::new();
        assert!(PairResolver::new(&dir).resolve("NOPE", ts(0)).is_none());
    }
}

//! Per-mint trade activity folded from streamed trade updates

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a streamed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Parse the loose side strings feeds use ("buy", "BUY", "sell", ...)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" => Some(TradeSide::Buy),
            "sell" | "s" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// One trade observed on a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub mint: String,
    pub trader: Option<String>,
    pub side: Option<TradeSide>,
    pub ts: DateTime<Utc>,
}

/// Running trade counters for one mint
#[derive(Debug, Clone, Default)]
pub struct TradeStats {
    pub buys: u32,
    pub sells: u32,
    pub unique_buyers: HashSet<String>,
    pub first_ts: Option<DateTime<Utc>>,
    pub last_ts: Option<DateTime<Utc>>,
}

impl TradeStats {
    /// Fold one update into the counters
    pub fn record(&mut self, update: &TradeUpdate) {
        match update.side {
            Some(TradeSide::Buy) => {
                self.buys = self.buys.saturating_add(1);
                if let Some(trader) = &update.trader {
                    self.unique_buyers.insert(trader.clone());
                }
            }
            Some(TradeSide::Sell) => self.sells = self.sells.saturating_add(1),
            None => {}
        }
        if self.first_ts.map_or(true, |t| update.ts < t) {
            self.first_ts = Some(update.ts);
        }
        if self.last_ts.map_or(true, |t| update.ts > t) {
            self.last_ts = Some(update.ts);
        }
    }

    pub fn unique_buyer_count(&self) -> u32 {
        self.unique_buyers.len() as u32
    }

    pub fn trade_count(&self) -> u32 {
        self.buys.saturating_add(self.sells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(trader: &str, side: &str) -> TradeUpdate {
        TradeUpdate {
            mint: "mint".into(),
            trader: Some(trader.into()),
            side: TradeSide::parse(side),
            ts: Utc::now(),
        }
    }

    #[test]
    fn test_side_parse() {
        assert_eq!(TradeSide::parse("BUY"), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse(" sell "), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse("create"), None);
    }

    #[test]
    fn test_record_counts_unique_buyers_only_on_buys() {
        let mut stats = TradeStats::default();
        stats.record(&update("alice", "buy"));
        stats.record(&update("alice", "buy"));
        stats.record(&update("bob", "buy"));
        stats.record(&update("carol", "sell"));

        assert_eq!(stats.buys, 3);
        assert_eq!(stats.sells, 1);
        assert_eq!(stats.unique_buyer_count(), 2);
        assert_eq!(stats.trade_count(), 4);
        assert!(stats.first_ts.is_some());
    }
}

//! Wire types for the PumpPortal and pool-creation feeds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::TradeSide;

/// Subscription request understood by PumpPortal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeMessage {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscribeMessage {
    pub fn new_tokens() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    pub fn token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    pub fn unsubscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "unsubscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Any frame PumpPortal sends: new tokens, trades, confirmations and errors
/// all share one flat object shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PumpFrame {
    #[serde(default, alias = "tokenAddress", alias = "mintAddress")]
    pub mint: Option<String>,
    /// "create", "buy" or "sell"
    #[serde(rename = "txType", alias = "side", default)]
    pub tx_type: Option<String>,
    #[serde(rename = "traderPublicKey", alias = "trader", default)]
    pub trader: Option<String>,
    #[serde(default, alias = "ticker")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(rename = "bondingCurveKey", alias = "poolAddress", default)]
    pub pool: Option<String>,
    #[serde(rename = "marketCapSol", default)]
    pub market_cap_sol: Option<f64>,
    #[serde(rename = "solAmount", default)]
    pub sol_amount: Option<f64>,
    /// Seconds or milliseconds since epoch
    #[serde(default, alias = "createdAt", alias = "timestamp")]
    pub created: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// What a [`PumpFrame`] carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpFrameKind {
    NewToken,
    Trade(TradeSide),
    Confirmation,
    Error,
    Unknown,
}

impl PumpFrame {
    /// Parse a frame, unwrapping a `{"data": {...}}` envelope if present
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        match value.get("data") {
            Some(inner @ Value::Object(_)) => serde_json::from_value(inner.clone()),
            _ => serde_json::from_value(value),
        }
    }

    pub fn kind(&self) -> PumpFrameKind {
        if self.errors.is_some() {
            return PumpFrameKind::Error;
        }
        let side = self.tx_type.as_deref().map(str::to_ascii_lowercase);
        match (side.as_deref(), &self.mint) {
            (Some("create"), Some(_)) => PumpFrameKind::NewToken,
            (Some(s), Some(_)) => match TradeSide::parse(s) {
                Some(side) => PumpFrameKind::Trade(side),
                None => PumpFrameKind::Unknown,
            },
            (None, Some(_)) => PumpFrameKind::NewToken,
            (_, None) if self.message.is_some() => PumpFrameKind::Confirmation,
            _ => PumpFrameKind::Unknown,
        }
    }

    /// Event time, falling back to `now`
    pub fn timestamp_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.created.and_then(epoch_to_datetime).unwrap_or(now)
    }
}

/// Seconds or milliseconds since epoch; values above 1e12 are milliseconds
pub fn epoch_to_datetime(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() || ts <= 0.0 {
        return None;
    }
    let millis = if ts > 1e12 { ts } else { ts * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// First string value among `keys`
pub fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// First numeric value among `keys`, accepting numbers encoded as strings
pub fn first_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match value.get(*k) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub fn first_bool(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_bool))
}

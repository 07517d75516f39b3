//! Core data models for the trading agent engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Risk =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// Numeric parameter set for one risk tier. Immutable; one active per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub tier: RiskTier,
    pub max_spread_pct: f64,
    /// Percent-of-equity range; sizing picks the midpoint.
    pub position_size_pct_range: (f64, f64),
    pub stop_loss_pct: f64,
    pub min_volume: u64,
    /// Inclusive intraday-volatility band, in percent.
    pub volatility_range: (f64, f64),
    pub min_score: f64,
}

//
// ================= Candidates =================
//

/// Raw discovery output for one symbol. Created per scan, discarded after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub price: f64,
    /// Bid-ask spread as a percent of price.
    pub spread_pct: f64,
    pub volume: u64,
    #[serde(default)]
    pub avg_volume: u64,
    /// Intraday range (high - low) / open, in percent.
    #[serde(default)]
    pub volatility: f64,
    /// Gap from previous close, in percent, signed.
    #[serde(default)]
    pub momentum: f64,
    pub timestamp: DateTime<Utc>,
}

impl Candidate {
    /// Parse a discovery-tool record. Returns `None` when a required field
    /// (symbol, price, spread_pct, volume) is missing or malformed; such
    /// records are dropped by the scan, not treated as fatal.
    pub fn from_record(record: &Value) -> Option<Self> {
        let symbol = record.get("symbol")?.as_str()?.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }
        let price = record.get("price")?.as_f64()?;
        if price <= 0.0 {
            return None;
        }
        let spread_pct = record.get("spread_pct")?.as_f64()?;
        let volume = record.get("volume")?.as_u64()?;

        Some(Self {
            symbol,
            price,
            spread_pct,
            volume,
            avg_volume: record.get("avg_volume").and_then(Value::as_u64).unwrap_or(0),
            volatility: record.get("volatility").and_then(Value::as_f64).unwrap_or(0.0),
            momentum: record.get("momentum").and_then(Value::as_f64).unwrap_or(0.0),
            timestamp: Utc::now(),
        })
    }
}

/// Candidate plus its deterministic 0-100 score and component breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub liquidity_score: f64,
    pub spread_score: f64,
    pub volatility_score: f64,
    pub momentum_score: f64,
    pub breakdown: String,
}

/// A scored, risk-filtered candidate with sizing, awaiting user approval.
/// Consumed exactly once: approve -> execute, or reject -> discard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: Uuid,
    pub scored: ScoredCandidate,
    /// Notional dollar size from the profile's sizing policy.
    pub position_size: f64,
    pub quantity: u64,
    pub limit_price: f64,
    pub stop_loss_price: f64,
    /// Natural-language recommendation; `None` when the planner was
    /// unavailable and the opportunity is presented with computed fields only.
    pub recommendation: Option<String>,
}

impl Opportunity {
    pub fn symbol(&self) -> &str {
        &self.scored.candidate.symbol
    }
}

//
// ================= Account =================
//

/// Read-only account view, fetched fresh per scan and never cached across
/// scans (a stale snapshot would corrupt sizing decisions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub buying_power: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub unrealized_pl: f64,
}

//
// ================= Orders =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub limit_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub time_in_force: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Accepted,
    Filled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_id: String,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}

//
// ================= Tool I/O =================
//

/// A single tool invocation requested by the planner. Consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Normalized result of routing a ToolCall, fed back to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub ok: bool,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, payload: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            ok: true,
            payload,
            error: None,
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            ok: false,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Planner-facing tool catalog entry. Remote entries are supplied by the
/// gateway at session start, not hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

//
// ================= Transcript =================
//

/// One entry of the running Q&A transcript. The transcript is rebuilt per
/// query and discarded at query end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TranscriptEntry {
    UserQuery(String),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolResult>),
}

//
// ================= Reports =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OpportunityStatus {
    Executed(OrderOutcome),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityOutcome {
    pub opportunity: Opportunity,
    pub status: OpportunityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub report_id: Uuid,
    pub tier: RiskTier,
    pub account: AccountSnapshot,
    pub candidates_discovered: usize,
    pub candidates_scored: usize,
    pub opportunities: Vec<OpportunityOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Distinct, user-visible terminations of the Q&A loop. Safety aborts
/// (step limit, repeated action) are bounded-effort outcomes, not crashes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum QueryOutcome {
    Answer(String),
    StepLimitExceeded { steps: u32 },
    RepeatedAction { signature: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    pub outcome: QueryOutcome,
    pub steps_used: u32,
    pub tool_calls_made: u32,
}

//
// ================= Display =================
//

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(format!("unknown risk tier: {}", other)),
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_from_complete_record() {
        let record = json!({
            "symbol": "aapl",
            "price": 187.5,
            "spread_pct": 0.04,
            "volume": 2_000_000u64,
            "avg_volume": 1_500_000u64,
            "volatility": 2.1,
            "momentum": 1.4,
        });

        let c = Candidate::from_record(&record).expect("record should parse");
        assert_eq!(c.symbol, "AAPL");
        assert_eq!(c.volume, 2_000_000);
        assert!((c.momentum - 1.4).abs() < f64::EPSILON);
    }

    #[test]
    fn candidate_missing_required_fields_is_dropped() {
        let no_price = json!({ "symbol": "MSFT", "spread_pct": 0.1, "volume": 1000u64 });
        assert!(Candidate::from_record(&no_price).is_none());

        let empty_symbol = json!({ "symbol": " ", "price": 10.0, "spread_pct": 0.1, "volume": 1000u64 });
        assert!(Candidate::from_record(&empty_symbol).is_none());

        let zero_price = json!({ "symbol": "X", "price": 0.0, "spread_pct": 0.1, "volume": 1000u64 });
        assert!(Candidate::from_record(&zero_price).is_none());
    }

    #[test]
    fn candidate_optional_fields_default() {
        let record = json!({ "symbol": "NVDA", "price": 500.0, "spread_pct": 0.02, "volume": 100u64 });
        let c = Candidate::from_record(&record).unwrap();
        assert_eq!(c.avg_volume, 0);
        assert_eq!(c.volatility, 0.0);
        assert_eq!(c.momentum, 0.0);
    }

    #[test]
    fn risk_tier_round_trips() {
        for (s, tier) in [("low", RiskTier::Low), ("medium", RiskTier::Medium), ("high", RiskTier::High)] {
            assert_eq!(s.parse::<RiskTier>().unwrap(), tier);
            assert_eq!(tier.to_string(), s);
        }
        assert!("aggressive".parse::<RiskTier>().is_err());
    }
}

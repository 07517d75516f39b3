//! Risk tiers and the candidate filter
//!
//! A RiskProfile is a fixed parameter row selected by tier. The filter is
//! a pure, stable transformation from scored candidates to sized
//! opportunities; it performs no I/O.

use crate::models::{Opportunity, RiskProfile, RiskTier, ScoredCandidate};
use lazy_static::lazy_static;
use std::collections::HashMap;
use uuid::Uuid;

lazy_static! {
    static ref RISK_PROFILES: HashMap<RiskTier, RiskProfile> = {
        let mut m = HashMap::new();
        m.insert(
            RiskTier::Low,
            RiskProfile {
                tier: RiskTier::Low,
                max_spread_pct: 0.10,
                position_size_pct_range: (1.0, 2.0),
                stop_loss_pct: 1.0,
                min_volume: 1_000_000,
                volatility_range: (0.5, 2.0),
                min_score: 70.0,
            },
        );
        m.insert(
            RiskTier::Medium,
            RiskProfile {
                tier: RiskTier::Medium,
                max_spread_pct: 0.25,
                position_size_pct_range: (2.0, 4.0),
                stop_loss_pct: 2.0,
                min_volume: 500_000,
                volatility_range: (1.0, 4.0),
                min_score: 55.0,
            },
        );
        m.insert(
            RiskTier::High,
            RiskProfile {
                tier: RiskTier::High,
                max_spread_pct: 0.50,
                position_size_pct_range: (3.0, 5.0),
                stop_loss_pct: 3.0,
                min_volume: 200_000,
                volatility_range: (2.0, 8.0),
                min_score: 40.0,
            },
        );
        m
    };
}

impl RiskProfile {
    pub fn for_tier(tier: RiskTier) -> RiskProfile {
        RISK_PROFILES[&tier].clone()
    }
}

/// Admission check: all four predicates must hold.
fn admit(scored: &ScoredCandidate, profile: &RiskProfile) -> bool {
    let c = &scored.candidate;
    let (vol_min, vol_max) = profile.volatility_range;

    scored.score >= profile.min_score
        && c.spread_pct <= profile.max_spread_pct
        && c.volume >= profile.min_volume
        && c.volatility >= vol_min
        && c.volatility <= vol_max
}

/// Notional position size: equity times the midpoint of the profile's
/// percent-of-equity range. The midpoint policy is fixed so sizing is
/// deterministic for a given profile and equity.
pub fn position_size(account_equity: f64, profile: &RiskProfile) -> f64 {
    let (min_pct, max_pct) = profile.position_size_pct_range;
    let mid_pct = (min_pct + max_pct) / 2.0;
    account_equity * (mid_pct / 100.0)
}

/// Stop loss for a long entry, rounded to cents.
pub fn stop_loss_price(entry_price: f64, profile: &RiskProfile) -> f64 {
    let raw = entry_price * (1.0 - profile.stop_loss_pct / 100.0);
    (raw * 100.0).round() / 100.0
}

/// Apply a risk profile to a scored-candidate list.
///
/// Stable filter: output preserves input order and is a subset of the
/// input. Each admitted candidate is sized against `account_equity` using
/// the midpoint policy. Empty input yields empty output.
pub fn filter_by_risk(
    candidates: &[ScoredCandidate],
    profile: &RiskProfile,
    account_equity: f64,
) -> Vec<Opportunity> {
    candidates
        .iter()
        .filter(|scored| admit(scored, profile))
        .map(|scored| {
            let price = scored.candidate.price;
            let notional = position_size(account_equity, profile);
            let quantity = if price > 0.0 {
                (notional / price).floor() as u64
            } else {
                0
            };

            Opportunity {
                opportunity_id: Uuid::new_v4(),
                scored: scored.clone(),
                position_size: notional,
                quantity,
                limit_price: price,
                stop_loss_price: stop_loss_price(price, profile),
                recommendation: None,
            }
        })
        .collect()
}

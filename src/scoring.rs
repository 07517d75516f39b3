//! Day-trading suitability scoring
//!
//! Four banded factors, 0-25 points each, 0-100 total:
//! liquidity (volume ratio), spread tightness, intraday volatility,
//! and momentum (gap from previous close). Every band is a fixed
//! reference scale, so scores are comparable across symbols and across
//! scans and each candidate can be scored in isolation.

use crate::models::{Candidate, ScoredCandidate};

/// Liquidity from today's volume relative to average volume.
fn liquidity_score(volume: u64, avg_volume: u64) -> (f64, String) {
    if avg_volume == 0 {
        return (10.0, "no average volume data".to_string());
    }

    let ratio = volume as f64 / avg_volume as f64;

    if ratio > 2.0 {
        (25.0, format!("exceptional volume ({:.1}x average)", ratio))
    } else if ratio >= 1.5 {
        (20.0, format!("excellent volume ({:.1}x average)", ratio))
    } else if ratio >= 1.0 {
        (15.0, format!("good volume ({:.1}x average)", ratio))
    } else if ratio >= 0.5 {
        (10.0, format!("moderate volume ({:.1}x average)", ratio))
    } else {
        (5.0, format!("low volume ({:.1}x average)", ratio))
    }
}

/// Spread tightness; tighter means less lost to slippage.
fn spread_score(spread_pct: f64) -> (f64, String) {
    if spread_pct < 0.05 {
        (25.0, format!("excellent spread ({:.3}%)", spread_pct))
    } else if spread_pct < 0.10 {
        (20.0, format!("good spread ({:.3}%)", spread_pct))
    } else if spread_pct < 0.20 {
        (15.0, format!("moderate spread ({:.3}%)", spread_pct))
    } else if spread_pct < 0.50 {
        (10.0, format!("wide spread ({:.3}%)", spread_pct))
    } else {
        (5.0, format!("very wide spread ({:.3}%)", spread_pct))
    }
}

/// Volatility against the 2-4% ideal intraday band.
fn volatility_score(volatility_pct: f64) -> (f64, String) {
    if (2.0..=4.0).contains(&volatility_pct) {
        (25.0, format!("ideal volatility ({:.1}%)", volatility_pct))
    } else if (1.0..2.0).contains(&volatility_pct) || (volatility_pct > 4.0 && volatility_pct <= 6.0) {
        (20.0, format!("good volatility ({:.1}%)", volatility_pct))
    } else if (0.5..1.0).contains(&volatility_pct) || (volatility_pct > 6.0 && volatility_pct <= 8.0) {
        (15.0, format!("moderate volatility ({:.1}%)", volatility_pct))
    } else if volatility_pct < 0.5 {
        (10.0, format!("low volatility ({:.1}%)", volatility_pct))
    } else {
        (5.0, format!("high volatility ({:.1}%)", volatility_pct))
    }
}

/// Momentum from the gap magnitude; a 1-3% gap suggests a catalyst
/// without being overextended.
fn momentum_score(gap_pct: f64) -> (f64, String) {
    let abs_gap = gap_pct.abs();

    if (1.0..=3.0).contains(&abs_gap) {
        (25.0, format!("ideal gap ({:+.1}%)", gap_pct))
    } else if (0.5..1.0).contains(&abs_gap) || (abs_gap > 3.0 && abs_gap <= 5.0) {
        (20.0, format!("good gap ({:+.1}%)", gap_pct))
    } else if abs_gap < 0.5 {
        (15.0, format!("small gap ({:+.1}%)", gap_pct))
    } else {
        (10.0, format!("large gap ({:+.1}%), may be extended", gap_pct))
    }
}

/// Score a candidate. Pure and deterministic: same inputs, same output,
/// no I/O. Result is always within 0-100.
pub fn score(candidate: &Candidate) -> ScoredCandidate {
    let (liquidity, liquidity_note) = liquidity_score(candidate.volume, candidate.avg_volume);
    let (spread, spread_note) = spread_score(candidate.spread_pct);
    let (volatility, volatility_note) = volatility_score(candidate.volatility);
    let (momentum, momentum_note) = momentum_score(candidate.momentum);

    let total = liquidity + spread + volatility + momentum;

    let overall = if total >= 80.0 {
        "excellent day trading candidate"
    } else if total >= 60.0 {
        "good candidate with some caution"
    } else if total >= 40.0 {
        "marginal"
    } else {
        "not recommended"
    };

    let breakdown = format!(
        "{}. liquidity: {} | spread: {} | volatility: {} | momentum: {}",
        overall, liquidity_note, spread_note, volatility_note, momentum_note
    );

    ScoredCandidate {
        candidate: candidate.clone(),
        score: total,
        liquidity_score: liquidity,
        spread_score: spread,
        volatility_score: volatility,
        momentum_score: momentum,
        breakdown,
    }
}

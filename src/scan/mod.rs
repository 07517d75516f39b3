//! Opportunity scan pipeline
//!
//! Linear state machine per scan:
//! FETCH_ACCOUNT -> DISCOVER -> SCORE -> FILTER -> RECOMMEND ->
//! (per opportunity: PRESENT -> AWAIT_APPROVAL -> EXECUTE | SKIP) -> DONE
//!
//! Account fetch failures abort the whole scan before any side effect.
//! Everything downstream degrades per stage: a malformed candidate or a
//! failed recommendation is logged and absorbed, and an order failure is
//! reported per opportunity while the queue continues. Order placement is
//! never retried.

use crate::approval::{Approval, ApprovalSurface};
use crate::execution::ToolRouter;
use crate::gateway::TradingGateway;
use crate::models::{
    Candidate, OpportunityOutcome, OpportunityStatus, OrderSide, OrderTicket, RiskProfile,
    ScanReport, ToolCall,
};
use crate::planner::Planner;
use crate::retry::{with_retry, RetryPolicy};
use crate::risk::filter_by_risk;
use crate::scoring;
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cap on candidates carried past discovery, to bound metric fetches.
const MAX_CANDIDATES: usize = 15;
/// Cap on opportunities presented per scan.
const MAX_OPPORTUNITIES: usize = 8;

const DISCOVERY_TOOLS: [&str; 2] = ["get_most_active_stocks", "get_top_movers"];

pub struct ScanPipeline {
    gateway: Arc<dyn TradingGateway>,
    planner: Arc<dyn Planner>,
    router: Arc<ToolRouter>,
    approval: Arc<dyn ApprovalSurface>,
    retry: RetryPolicy,
}

impl ScanPipeline {
    pub fn new(
        gateway: Arc<dyn TradingGateway>,
        planner: Arc<dyn Planner>,
        router: Arc<ToolRouter>,
        approval: Arc<dyn ApprovalSurface>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            planner,
            router,
            approval,
            retry,
        }
    }

    /// Run one full scan against the given risk profile.
    pub async fn run(&self, profile: &RiskProfile) -> Result<ScanReport> {
        let started_at = Utc::now();
        let report_id = Uuid::new_v4();

        info!(report_id = ?report_id, tier = %profile.tier, "Scan starting");

        // === FETCH_ACCOUNT ===
        // A failure here aborts the scan outright; nothing has happened yet.
        let account =
            with_retry(&self.retry, "get_account", || self.gateway.get_account()).await?;
        let positions =
            with_retry(&self.retry, "get_positions", || self.gateway.get_positions()).await?;

        let held_symbols: HashSet<String> =
            positions.iter().map(|p| p.symbol.to_uppercase()).collect();

        info!(
            equity = account.equity,
            open_positions = positions.len(),
            "Account snapshot fetched"
        );

        // === DISCOVER ===
        let candidates = self.discover(&held_symbols).await;
        let candidates_discovered = candidates.len();
        info!(count = candidates_discovered, "Candidates discovered");

        if candidates.is_empty() {
            return Ok(ScanReport {
                report_id,
                tier: profile.tier,
                account,
                candidates_discovered: 0,
                candidates_scored: 0,
                opportunities: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            });
        }

        // === SCORE ===
        let mut scored: Vec<_> = candidates.iter().map(scoring::score).collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let candidates_scored = scored.len();

        for s in &scored {
            debug!(
                symbol = %s.candidate.symbol,
                score = s.score,
                spread_pct = s.candidate.spread_pct,
                volume = s.candidate.volume,
                "Candidate scored"
            );
        }

        // === FILTER ===
        let mut opportunities = filter_by_risk(&scored, profile, account.equity);
        opportunities.retain(|opp| {
            if opp.quantity == 0 {
                warn!(symbol = %opp.symbol(), "Position size rounds to zero shares, dropping");
                false
            } else {
                true
            }
        });
        opportunities.truncate(MAX_OPPORTUNITIES);

        info!(
            admitted = opportunities.len(),
            min_score = profile.min_score,
            "Risk filter applied"
        );

        // === RECOMMEND ===
        // Planner failures degrade: the opportunity is still presented with
        // its computed fields and a missing recommendation.
        for opp in &mut opportunities {
            let recommendation = with_retry(&self.retry, "recommend", || {
                self.planner.recommend(opp, profile)
            })
            .await;

            match recommendation {
                Ok(text) => opp.recommendation = Some(text),
                Err(e) => {
                    warn!(symbol = %opp.symbol(), error = %e, "Recommendation unavailable");
                }
            }
        }

        // === PRESENT / AWAIT_APPROVAL / EXECUTE ===
        let mut outcomes = Vec::with_capacity(opportunities.len());

        for opportunity in opportunities {
            let decision = match self.approval.present(&opportunity).await {
                Ok(decision) => decision,
                Err(e) => {
                    // Treat an interrupted approval as a skip; the order was
                    // never placed.
                    warn!(symbol = %opportunity.symbol(), error = %e, "Approval interrupted");
                    Approval::Reject
                }
            };

            let status = match decision {
                Approval::Reject => {
                    info!(symbol = %opportunity.symbol(), "Opportunity skipped");
                    OpportunityStatus::Skipped
                }
                Approval::Approve => self.execute(&opportunity, None, None).await,
                Approval::ApproveModified {
                    quantity,
                    limit_price,
                } => self.execute(&opportunity, quantity, limit_price).await,
            };

            outcomes.push(OpportunityOutcome {
                opportunity,
                status,
            });
        }

        info!(
            report_id = ?report_id,
            resolved = outcomes.len(),
            "Scan complete"
        );

        Ok(ScanReport {
            report_id,
            tier: profile.tier,
            account,
            candidates_discovered,
            candidates_scored,
            opportunities: outcomes,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Call the discovery tools through the router, merge and de-duplicate
    /// by symbol, and drop held symbols and warrant/unit tickers. A failed
    /// screener is logged and skipped, not fatal.
    async fn discover(&self, held_symbols: &HashSet<String>) -> Vec<Candidate> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        for tool_name in DISCOVERY_TOOLS {
            let call = ToolCall {
                id: format!("scan-{}", Uuid::new_v4()),
                name: tool_name.to_string(),
                arguments: json!({}),
            };

            let result = self.router.route(&call).await;
            if !result.ok {
                warn!(
                    tool_name,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Discovery tool failed"
                );
                continue;
            }

            for record in extract_records(&result.payload) {
                let Some(candidate) = Candidate::from_record(record) else {
                    warn!(?record, "Malformed candidate record dropped");
                    continue;
                };

                if is_warrant_or_unit(&candidate.symbol) {
                    continue;
                }
                if held_symbols.contains(&candidate.symbol) {
                    debug!(symbol = %candidate.symbol, "Already held, skipping");
                    continue;
                }
                if seen.insert(candidate.symbol.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        candidates.truncate(MAX_CANDIDATES);
        candidates
    }

    /// Single order placement for an approved opportunity. Not retried:
    /// a duplicate retry could double-execute the trade.
    async fn execute(
        &self,
        opportunity: &crate::models::Opportunity,
        quantity_override: Option<u64>,
        limit_override: Option<f64>,
    ) -> OpportunityStatus {
        let ticket = OrderTicket {
            client_order_id: opportunity.opportunity_id,
            symbol: opportunity.symbol().to_string(),
            side: OrderSide::Buy,
            quantity: quantity_override.unwrap_or(opportunity.quantity),
            limit_price: Some(limit_override.unwrap_or(opportunity.limit_price)),
            stop_loss_price: Some(opportunity.stop_loss_price),
            time_in_force: "day".to_string(),
        };

        info!(
            symbol = %ticket.symbol,
            quantity = ticket.quantity,
            limit_price = ?ticket.limit_price,
            "Placing order"
        );

        match self.gateway.place_order(&ticket).await {
            Ok(outcome) => {
                info!(order_id = %outcome.order_id, "Order accepted");
                OpportunityStatus::Executed(outcome)
            }
            Err(e) => {
                warn!(symbol = %ticket.symbol, error = %e, "Order placement failed");
                OpportunityStatus::Failed(e.to_string())
            }
        }
    }
}

/// Discovery payloads are either a bare array or an object with a
/// `results` array.
fn extract_records(payload: &Value) -> &[Value] {
    payload
        .as_array()
        .or_else(|| payload.get("results").and_then(Value::as_array))
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// SPAC warrants/units/rights are 5+ chars ending in W, U, or R
/// (e.g. ACAMW, IPAXU); four-char tickers ending in those letters are
/// regular stocks (e.g. CRWD, UBER).
fn is_warrant_or_unit(symbol: &str) -> bool {
    if symbol.contains('+') {
        return true;
    }
    symbol.len() >= 5 && matches!(symbol.chars().last(), Some('W') | Some('U') | Some('R'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AutoApprove, RejectAll};
    use crate::gateway::PaperGateway;
    use crate::models::{AccountSnapshot, Position, RiskTier};
    use crate::planner::ScriptedPlanner;
    use crate::tools::{Tool, ToolRegistry};
    use std::time::Duration;

    /// Discovery tool serving a fixed record list.
    struct StaticScreener {
        name: &'static str,
        records: Vec<Value>,
    }

    #[async_trait::async_trait]
    impl Tool for StaticScreener {
        fn name(&self) -> &'static str {
            self.name
        }
        fn description(&self) -> &'static str {
            "Static screener for tests"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _arguments: &Value) -> Result<Value> {
            Ok(json!(self.records))
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: 3,
        }
    }

    fn record(symbol: &str, price: f64, volume: u64, spread: f64, volatility: f64) -> Value {
        json!({
            "symbol": symbol,
            "price": price,
            "volume": volume,
            "avg_volume": volume / 2, // 2x ratio -> top liquidity score
            "spread_pct": spread,
            "volatility": volatility,
            "momentum": 2.0,
        })
    }

    fn pipeline(
        gateway: Arc<PaperGateway>,
        approval: Arc<dyn ApprovalSurface>,
        actives: Vec<Value>,
        movers: Vec<Value>,
    ) -> ScanPipeline {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticScreener {
            name: "get_most_active_stocks",
            records: actives,
        }));
        registry.register(Arc::new(StaticScreener {
            name: "get_top_movers",
            records: movers,
        }));

        let router = Arc::new(ToolRouter::new(registry, gateway.clone(), fast_retry()));
        let planner = Arc::new(ScriptedPlanner::new(vec![]));

        ScanPipeline::new(gateway, planner, router, approval, fast_retry())
    }

    fn medium() -> RiskProfile {
        RiskProfile::for_tier(RiskTier::Medium)
    }

    #[tokio::test]
    async fn medium_profile_scan_admits_and_sizes_deterministically() {
        // Account equity 10,000; AAA passes all predicates, BBB fails
        // min_volume (100K < 500K).
        let gateway = Arc::new(PaperGateway::new().with_account(AccountSnapshot {
            equity: 10_000.0,
            buying_power: 10_000.0,
            currency: "USD".to_string(),
        }));

        let scan = pipeline(
            gateway.clone(),
            Arc::new(AutoApprove),
            vec![
                record("AAA", 20.0, 1_000_000, 0.1, 2.5),
                record("BBB", 20.0, 100_000, 0.1, 2.5),
            ],
            vec![],
        );

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.candidates_discovered, 2);
        assert_eq!(report.candidates_scored, 2);
        assert_eq!(report.opportunities.len(), 1);

        let outcome = &report.opportunities[0];
        assert_eq!(outcome.opportunity.symbol(), "AAA");
        // Midpoint of 2-4% of 10,000 = 300 notional -> 15 shares at $20.
        assert!((outcome.opportunity.position_size - 300.0).abs() < 1e-9);
        assert_eq!(outcome.opportunity.quantity, 15);
        // 2% stop below $20 entry.
        assert!((outcome.opportunity.stop_loss_price - 19.60).abs() < 1e-9);
        assert!(matches!(outcome.status, OpportunityStatus::Executed(_)));

        let placed = gateway.placed_orders().await;
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].symbol, "AAA");
        assert_eq!(placed[0].quantity, 15);
    }

    #[tokio::test]
    async fn order_failure_is_reported_and_never_retried() {
        let gateway = Arc::new(PaperGateway::new());
        gateway.reject_orders();

        let scan = pipeline(
            gateway.clone(),
            Arc::new(AutoApprove),
            vec![
                record("AAA", 20.0, 1_000_000, 0.1, 2.5),
                record("CCC", 40.0, 900_000, 0.1, 2.0),
            ],
            vec![],
        );

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.opportunities.len(), 2);
        for outcome in &report.opportunities {
            assert!(matches!(outcome.status, OpportunityStatus::Failed(_)));
        }
        // Exactly one placement attempt per opportunity — no automatic retry.
        assert_eq!(gateway.place_order_calls(), 2);
    }

    #[tokio::test]
    async fn rejection_skips_without_placing() {
        let gateway = Arc::new(PaperGateway::new());
        let scan = pipeline(
            gateway.clone(),
            Arc::new(RejectAll),
            vec![record("AAA", 20.0, 1_000_000, 0.1, 2.5)],
            vec![],
        );

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.opportunities.len(), 1);
        assert!(matches!(
            report.opportunities[0].status,
            OpportunityStatus::Skipped
        ));
        assert_eq!(gateway.place_order_calls(), 0);
    }

    #[tokio::test]
    async fn account_fetch_failure_aborts_before_any_side_effect() {
        let gateway = Arc::new(PaperGateway::new());
        gateway.fail_account_fetches(5); // beyond the retry cap

        let scan = pipeline(
            gateway.clone(),
            Arc::new(AutoApprove),
            vec![record("AAA", 20.0, 1_000_000, 0.1, 2.5)],
            vec![],
        );

        assert!(scan.run(&medium()).await.is_err());
        assert_eq!(gateway.place_order_calls(), 0);
    }

    #[tokio::test]
    async fn failed_recommendation_degrades_not_aborts() {
        let gateway = Arc::new(PaperGateway::new());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticScreener {
            name: "get_most_active_stocks",
            records: vec![record("AAA", 20.0, 1_000_000, 0.1, 2.5)],
        }));
        registry.register(Arc::new(StaticScreener {
            name: "get_top_movers",
            records: vec![],
        }));

        let router = Arc::new(ToolRouter::new(registry, gateway.clone(), fast_retry()));
        let planner = Arc::new(ScriptedPlanner::new(vec![]).without_recommendations());
        let scan = ScanPipeline::new(
            gateway,
            planner,
            router,
            Arc::new(AutoApprove),
            fast_retry(),
        );

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.opportunities.len(), 1);
        let outcome = &report.opportunities[0];
        assert!(outcome.opportunity.recommendation.is_none());
        assert!(matches!(outcome.status, OpportunityStatus::Executed(_)));
    }

    #[tokio::test]
    async fn held_symbols_and_warrants_are_excluded() {
        let gateway = Arc::new(PaperGateway::new().with_positions(vec![Position {
            symbol: "AAA".to_string(),
            qty: 10.0,
            avg_entry_price: 18.0,
            unrealized_pl: 20.0,
        }]));

        let scan = pipeline(
            gateway,
            Arc::new(AutoApprove),
            vec![
                record("AAA", 20.0, 1_000_000, 0.1, 2.5),
                record("ACAMW", 1.0, 1_000_000, 0.1, 2.5),
                record("CCC", 40.0, 900_000, 0.1, 2.0),
            ],
            vec![
                // duplicate of CCC from the second screener
                record("CCC", 40.0, 900_000, 0.1, 2.0),
            ],
        );

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.candidates_discovered, 1);
        assert_eq!(report.opportunities[0].opportunity.symbol(), "CCC");
    }

    #[tokio::test]
    async fn empty_discovery_completes_with_empty_report() {
        let gateway = Arc::new(PaperGateway::new());
        let scan = pipeline(gateway, Arc::new(AutoApprove), vec![], vec![]);

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.candidates_discovered, 0);
        assert!(report.opportunities.is_empty());
    }

    #[tokio::test]
    async fn malformed_records_are_dropped_not_fatal() {
        let gateway = Arc::new(PaperGateway::new());
        let scan = pipeline(
            gateway,
            Arc::new(AutoApprove),
            vec![
                json!({ "symbol": "NOPRICE", "volume": 1_000_000u64, "spread_pct": 0.1 }),
                record("AAA", 20.0, 1_000_000, 0.1, 2.5),
            ],
            vec![],
        );

        let report = scan.run(&medium()).await.unwrap();
        assert_eq!(report.candidates_discovered, 1);
        assert_eq!(report.opportunities[0].opportunity.symbol(), "AAA");
    }

    #[tokio::test]
    async fn modified_approval_repriced_ticket() {
        struct ModifySurface;

        #[async_trait::async_trait]
        impl ApprovalSurface for ModifySurface {
            async fn present(
                &self,
                _opportunity: &crate::models::Opportunity,
            ) -> Result<Approval> {
                Ok(Approval::ApproveModified {
                    quantity: Some(5),
                    limit_price: Some(20.5),
                })
            }
        }

        let gateway = Arc::new(PaperGateway::new());
        let scan = pipeline(
            gateway.clone(),
            Arc::new(ModifySurface),
            vec![record("AAA", 20.0, 1_000_000, 0.1, 2.5)],
            vec![],
        );

        let report = scan.run(&medium()).await.unwrap();
        assert!(matches!(
            report.opportunities[0].status,
            OpportunityStatus::Executed(_)
        ));

        let placed = gateway.placed_orders().await;
        assert_eq!(placed[0].quantity, 5);
        assert_eq!(placed[0].limit_price, Some(20.5));
        // Stop loss still derives from the profile, not the modification.
        assert_eq!(placed[0].stop_loss_price, Some(19.60));
    }

    #[test]
    fn warrant_detection() {
        assert!(is_warrant_or_unit("ACAMW"));
        assert!(is_warrant_or_unit("IPAXU"));
        assert!(is_warrant_or_unit("ABCDR"));
        assert!(is_warrant_or_unit("BRK+A"));
        assert!(!is_warrant_or_unit("CRWD"));
        assert!(!is_warrant_or_unit("UBER"));
        assert!(!is_warrant_or_unit("AAPL"));
    }
}

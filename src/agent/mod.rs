//! Agent session object and the Q&A control loop
//!
//! The agent wires the planner, tool router, gateway, and approval
//! surface into two operations: `scan` (the opportunity pipeline) and
//! `answer` (the free-form query loop). The planner is treated as an
//! untrusted scheduler: every query is bounded by a step limit and a
//! repeated-action detector, so the loop terminates even when the
//! planner repeats itself, stalls, or never converges.

use crate::approval::ApprovalSurface;
use crate::execution::ToolRouter;
use crate::gateway::TradingGateway;
use crate::models::{
    QueryOutcome, QueryReport, RiskProfile, ScanReport, ToolCall, TranscriptEntry,
};
use crate::planner::{Planner, PlannerTurn};
use crate::retry::{with_retry, RetryPolicy};
use crate::scan::ScanPipeline;
use crate::tools::ToolRegistry;
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum planner turns per query.
pub const MAX_STEPS: u32 = 10;
/// Identical consecutive executions that trip the repeated-action guard.
const LOOP_WINDOW: usize = 3;

pub struct Agent {
    planner: Arc<dyn Planner>,
    gateway: Arc<dyn TradingGateway>,
    router: Arc<ToolRouter>,
    approval: Arc<dyn ApprovalSurface>,
    retry: RetryPolicy,
}

impl Agent {
    /// Assemble a session. The remote tool catalog is discovered from the
    /// gateway here, once per session.
    pub fn new(
        planner: Arc<dyn Planner>,
        gateway: Arc<dyn TradingGateway>,
        registry: ToolRegistry,
        approval: Arc<dyn ApprovalSurface>,
        retry: RetryPolicy,
    ) -> Self {
        let router = Arc::new(ToolRouter::new(registry, gateway.clone(), retry.clone()));
        Self {
            planner,
            gateway,
            router,
            approval,
            retry,
        }
    }

    /// Run one opportunity scan against the given risk profile.
    pub async fn scan(&self, profile: &RiskProfile) -> Result<ScanReport> {
        let pipeline = ScanPipeline::new(
            self.gateway.clone(),
            self.planner.clone(),
            self.router.clone(),
            self.approval.clone(),
            self.retry.clone(),
        );
        pipeline.run(profile).await
    }

    /// Answer a free-form query by iterating planner turns and routed
    /// tool calls until the planner produces text, the step limit is
    /// reached, or the repeated-action guard trips.
    pub async fn answer(&self, query: &str) -> Result<QueryReport> {
        info!(query = %query, "Query starting");

        let catalog = self.router.catalog();
        let mut transcript = vec![TranscriptEntry::UserQuery(query.to_string())];
        let mut loop_state = LoopState::new();

        for step in 1..=MAX_STEPS {
            let turn = with_retry(&self.retry, "planner", || {
                self.planner.complete(&transcript, &catalog)
            })
            .await?;

            match turn {
                PlannerTurn::Answer(text) => {
                    info!(steps = step, "Query answered");
                    return Ok(QueryReport {
                        outcome: QueryOutcome::Answer(text),
                        steps_used: step,
                        tool_calls_made: loop_state.executed,
                    });
                }
                PlannerTurn::ToolCalls(calls) => {
                    debug!(step, count = calls.len(), "Planner requested tool calls");
                    transcript.push(TranscriptEntry::ToolCalls(calls.clone()));

                    let mut results = Vec::with_capacity(calls.len());

                    // Sequential, in emission order: later calls may depend
                    // on earlier results contextually.
                    for call in &calls {
                        let sig = call_signature(call);

                        if loop_state.would_repeat(&sig) {
                            warn!(
                                tool_name = %call.name,
                                signature = %sig,
                                "Repeated action detected, aborting query"
                            );
                            return Ok(QueryReport {
                                outcome: QueryOutcome::RepeatedAction { signature: sig },
                                steps_used: step,
                                tool_calls_made: loop_state.executed,
                            });
                        }

                        let result = self.router.route(call).await;
                        loop_state.record(sig);
                        results.push(result);
                    }

                    transcript.push(TranscriptEntry::ToolResults(results));
                }
            }
        }

        warn!(max_steps = MAX_STEPS, "Step limit reached, bounding effort");
        Ok(QueryReport {
            outcome: QueryOutcome::StepLimitExceeded { steps: MAX_STEPS },
            steps_used: MAX_STEPS,
            tool_calls_made: loop_state.executed,
        })
    }
}

//
// ================= Loop state =================
//

/// Per-query safety state: executed-call counter plus the sliding window
/// of the last 3 executed call signatures.
struct LoopState {
    executed: u32,
    window: VecDeque<String>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            executed: 0,
            window: VecDeque::with_capacity(LOOP_WINDOW),
        }
    }

    /// True when the candidate signature matches all of the last
    /// LOOP_WINDOW executed calls — executing it would be the 4th
    /// identical, non-progressing invocation.
    fn would_repeat(&self, signature: &str) -> bool {
        self.window.len() == LOOP_WINDOW && self.window.iter().all(|s| s == signature)
    }

    fn record(&mut self, signature: String) {
        self.executed += 1;
        if self.window.len() == LOOP_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(signature);
    }
}

/// Canonical signature over tool name + arguments. serde_json object keys
/// are ordered, so equal argument maps hash equally regardless of the
/// order the planner emitted them in.
fn call_signature(call: &ToolCall) -> String {
    let mut hasher = Sha256::new();
    hasher.update(call.name.as_bytes());
    hasher.update(b":");
    // Stream JSON directly into the hasher, no intermediate String
    let _ = serde_json::to_writer(&mut HashWriter(&mut hasher), &call.arguments);
    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AutoApprove;
    use crate::error::AgentError;
    use crate::gateway::PaperGateway;
    use crate::models::Position;
    use crate::planner::ScriptedPlanner;
    use serde_json::json;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: 3,
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: format!("toolu_{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            arguments,
        }
    }

    fn agent(planner: ScriptedPlanner, gateway: PaperGateway) -> Agent {
        Agent::new(
            Arc::new(planner),
            Arc::new(gateway),
            ToolRegistry::new(),
            Arc::new(AutoApprove),
            fast_retry(),
        )
    }

    #[tokio::test]
    async fn positions_query_completes_in_two_turns() {
        let planner = ScriptedPlanner::new(vec![
            PlannerTurn::ToolCalls(vec![call("get_positions", json!({}))]),
            PlannerTurn::Answer("You hold 5 shares of AAPL.".to_string()),
        ]);
        let gateway = PaperGateway::new().with_positions(vec![Position {
            symbol: "AAPL".to_string(),
            qty: 5.0,
            avg_entry_price: 180.0,
            unrealized_pl: 37.5,
        }]);

        let report = agent(planner, gateway)
            .answer("what are my positions")
            .await
            .unwrap();

        assert_eq!(report.steps_used, 2);
        assert_eq!(report.tool_calls_made, 1);
        match report.outcome {
            QueryOutcome::Answer(text) => assert!(text.contains("AAPL")),
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fourth_identical_call_trips_the_loop_detector() {
        let repeated = || {
            PlannerTurn::ToolCalls(vec![ToolCall {
                id: "fixed".to_string(),
                name: "get_account".to_string(),
                arguments: json!({}),
            }])
        };
        let planner = ScriptedPlanner::new(vec![repeated(), repeated(), repeated(), repeated()]);

        let report = agent(planner, PaperGateway::new())
            .answer("check my account forever")
            .await
            .unwrap();

        // Three identical calls executed; the 4th is detected, not executed.
        assert_eq!(report.tool_calls_made, 3);
        assert!(matches!(
            report.outcome,
            QueryOutcome::RepeatedAction { .. }
        ));
    }

    #[tokio::test]
    async fn varying_arguments_do_not_trip_the_detector() {
        let turns: Vec<PlannerTurn> = (0..4)
            .map(|i| PlannerTurn::ToolCalls(vec![call("get_quote", json!({ "symbol": format!("SYM{}", i) }))]))
            .chain(std::iter::once(PlannerTurn::Answer("done".to_string())))
            .collect();
        let planner = ScriptedPlanner::new(turns);

        let report = agent(planner, PaperGateway::new())
            .answer("quote a few symbols")
            .await
            .unwrap();

        assert_eq!(report.tool_calls_made, 4);
        assert!(matches!(report.outcome, QueryOutcome::Answer(_)));
    }

    #[tokio::test]
    async fn step_limit_bounds_a_never_converging_planner() {
        // Distinct arguments every turn so the loop detector stays quiet;
        // only the step limit can end this query.
        let turns: Vec<PlannerTurn> = (0..20)
            .map(|i| PlannerTurn::ToolCalls(vec![call("get_bars", json!({ "symbol": "AAPL", "limit": i }))]))
            .collect();
        let planner = ScriptedPlanner::new(turns);

        let report = agent(planner, PaperGateway::new())
            .answer("keep digging")
            .await
            .unwrap();

        assert_eq!(report.steps_used, MAX_STEPS);
        assert_eq!(report.tool_calls_made, MAX_STEPS);
        assert_eq!(
            report.outcome,
            QueryOutcome::StepLimitExceeded { steps: MAX_STEPS }
        );
    }

    #[tokio::test]
    async fn transient_planner_failures_are_retried() {
        let planner = ScriptedPlanner::new(vec![]);
        planner.push_error(AgentError::RateLimited("throttled".to_string()));
        planner.push_turn(PlannerTurn::Answer("recovered".to_string()));

        let report = agent(planner, PaperGateway::new())
            .answer("are you there")
            .await
            .unwrap();

        assert!(matches!(report.outcome, QueryOutcome::Answer(_)));
    }

    #[tokio::test]
    async fn permanent_planner_failure_propagates() {
        let planner = ScriptedPlanner::new(vec![]);
        planner.push_error(AgentError::Auth("invalid key".to_string()));

        let result = agent(planner, PaperGateway::new()).answer("hello").await;
        assert!(matches!(result, Err(AgentError::Auth(_))));
    }

    #[test]
    fn signatures_are_canonical_over_argument_order() {
        let a = call("get_bars", json!({ "symbol": "AAPL", "limit": 5 }));
        let b = call("get_bars", json!({ "limit": 5, "symbol": "AAPL" }));
        assert_eq!(call_signature(&a), call_signature(&b));

        let c = call("get_bars", json!({ "symbol": "MSFT", "limit": 5 }));
        assert_ne!(call_signature(&a), call_signature(&c));

        let d = call("get_quote", json!({ "symbol": "AAPL", "limit": 5 }));
        assert_ne!(call_signature(&a), call_signature(&d));
    }

    #[test]
    fn loop_state_window_slides() {
        let mut state = LoopState::new();
        state.record("a".to_string());
        state.record("a".to_string());
        state.record("a".to_string());
        assert!(state.would_repeat("a"));
        assert!(!state.would_repeat("b"));

        // A different call resets progress.
        state.record("b".to_string());
        assert!(!state.would_repeat("a"));
        assert_eq!(state.executed, 4);
    }
}

use serde_json::json;
use std::sync::Arc;
use tradepilot::{
    agent::Agent,
    approval::AutoApprove,
    gateway::PaperGateway,
    models::{OpportunityStatus, QueryOutcome, RiskProfile, RiskTier, ToolCall},
    planner::{PlannerTurn, ScriptedPlanner},
    retry::RetryPolicy,
    tools::create_default_registry,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradepilot=debug".into()),
        )
        .init();

    info!("Trading agent starting (paper demo)");

    // Demo wiring: paper gateway and a scripted planner, so the full
    // engine runs without live credentials.
    let planner = ScriptedPlanner::new(vec![
        PlannerTurn::ToolCalls(vec![ToolCall {
            id: "demo-1".to_string(),
            name: "get_positions".to_string(),
            arguments: json!({}),
        }]),
        PlannerTurn::Answer("You currently hold no open positions.".to_string()),
    ]);

    let gateway = Arc::new(PaperGateway::new());
    let registry = create_default_registry();

    let agent = Agent::new(
        Arc::new(planner),
        gateway,
        registry,
        Arc::new(AutoApprove),
        RetryPolicy::default(),
    );

    // One scan against the medium risk profile.
    let profile = RiskProfile::for_tier(RiskTier::Medium);
    match agent.scan(&profile).await {
        Ok(report) => {
            println!("\n=== SCAN REPORT ===");
            println!("Report ID: {}", report.report_id);
            println!("Risk tier: {}", report.tier);
            println!("Account equity: ${:.2}", report.account.equity);
            println!(
                "Candidates: {} discovered, {} scored",
                report.candidates_discovered, report.candidates_scored
            );
            for outcome in &report.opportunities {
                let status = match &outcome.status {
                    OpportunityStatus::Executed(order) => format!("executed ({})", order.order_id),
                    OpportunityStatus::Skipped => "skipped".to_string(),
                    OpportunityStatus::Failed(reason) => format!("failed: {}", reason),
                };
                println!(
                    "  {} score={:.0} qty={} stop=${:.2} -> {}",
                    outcome.opportunity.symbol(),
                    outcome.opportunity.scored.score,
                    outcome.opportunity.quantity,
                    outcome.opportunity.stop_loss_price,
                    status
                );
            }
        }
        Err(e) => eprintln!("Scan failed: {}", e),
    }

    // One free-form query through the Q&A loop.
    match agent.answer("what are my positions").await {
        Ok(report) => {
            println!("\n=== QUERY REPORT ===");
            println!(
                "Steps: {} | Tool calls: {}",
                report.steps_used, report.tool_calls_made
            );
            match report.outcome {
                QueryOutcome::Answer(text) => println!("Answer: {}", text),
                QueryOutcome::StepLimitExceeded { steps } => {
                    println!("Stopped after {} steps without a final answer.", steps)
                }
                QueryOutcome::RepeatedAction { signature } => {
                    println!("Stopped: repeated action loop detected ({})", signature)
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Query failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}

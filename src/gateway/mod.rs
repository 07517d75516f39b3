//! Remote trading/data gateway seam
//!
//! The engine consumes the gateway without owning its mechanics. The
//! planner-facing tool catalog is supplied by the gateway at session
//! start; it deliberately contains only read operations. Order placement
//! is reachable solely through the scan pipeline's approval step, so the
//! planner can never place a trade on its own.

use crate::models::{AccountSnapshot, OrderOutcome, OrderStatus, OrderTicket, Position, ToolSpec};
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod alpaca;
pub use alpaca::AlpacaGateway;

#[async_trait::async_trait]
pub trait TradingGateway: Send + Sync {
    /// Read-only tool catalog advertised to the planner.
    fn tool_catalog(&self) -> Vec<ToolSpec> {
        default_catalog()
    }

    async fn get_account(&self) -> Result<AccountSnapshot>;
    async fn get_positions(&self) -> Result<Vec<Position>>;
    async fn get_quote(&self, symbol: &str) -> Result<Value>;
    async fn get_bars(&self, symbol: &str, limit: usize) -> Result<Value>;
    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderOutcome>;
    async fn cancel_order(&self, order_id: &str) -> Result<()>;
}

fn symbol_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": { "type": "string", "description": "Stock ticker symbol" }
        },
        "required": ["symbol"]
    })
}

/// The standard read-only catalog. Individual gateways may extend this.
pub fn default_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "get_account".to_string(),
            description: "Fetch the current account snapshot (equity, buying power)".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "get_positions".to_string(),
            description: "List all open positions with quantity and unrealized P&L".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "get_quote".to_string(),
            description: "Fetch the latest quote for a symbol".to_string(),
            input_schema: symbol_schema(),
        },
        ToolSpec {
            name: "get_bars".to_string(),
            description: "Fetch recent daily bars for a symbol".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "description": "Stock ticker symbol" },
                    "limit": { "type": "integer", "description": "Number of bars (default 5)" }
                },
                "required": ["symbol"]
            }),
        },
    ]
}

//
// ================= Paper gateway =================
//

/// In-memory gateway for tests and the demo binary. Serves canned data
/// and records every placed order; failures can be injected per seam.
pub struct PaperGateway {
    account: AccountSnapshot,
    positions: Vec<Position>,
    quotes: HashMap<String, Value>,
    placed: Arc<RwLock<Vec<OrderTicket>>>,
    place_calls: AtomicU32,
    reject_orders: AtomicBool,
    account_failures: AtomicU32,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self {
            account: AccountSnapshot {
                equity: 10_000.0,
                buying_power: 10_000.0,
                currency: "USD".to_string(),
            },
            positions: Vec::new(),
            quotes: HashMap::new(),
            placed: Arc::new(RwLock::new(Vec::new())),
            place_calls: AtomicU32::new(0),
            reject_orders: AtomicBool::new(false),
            account_failures: AtomicU32::new(0),
        }
    }

    pub fn with_account(mut self, account: AccountSnapshot) -> Self {
        self.account = account;
        self
    }

    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_quote(mut self, symbol: &str, quote: Value) -> Self {
        self.quotes.insert(symbol.to_uppercase(), quote);
        self
    }

    /// Make every subsequent place_order call fail.
    pub fn reject_orders(&self) {
        self.reject_orders.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` get_account calls fail with a transient error.
    pub fn fail_account_fetches(&self, n: u32) {
        self.account_failures.store(n, Ordering::SeqCst);
    }

    pub async fn placed_orders(&self) -> Vec<OrderTicket> {
        self.placed.read().await.clone()
    }

    pub fn place_order_calls(&self) -> u32 {
        self.place_calls.load(Ordering::SeqCst)
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TradingGateway for PaperGateway {
    async fn get_account(&self) -> Result<AccountSnapshot> {
        let remaining = self.account_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.account_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(crate::error::AgentError::Timeout(
                "paper gateway injected failure".to_string(),
            ));
        }
        Ok(self.account.clone())
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.positions.clone())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Value> {
        Ok(self
            .quotes
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| json!({ "symbol": symbol, "bid": 0.0, "ask": 0.0 })))
    }

    async fn get_bars(&self, symbol: &str, limit: usize) -> Result<Value> {
        Ok(json!({ "symbol": symbol, "bars": [], "limit": limit }))
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderOutcome> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);

        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(crate::error::AgentError::OrderRejected(format!(
                "paper gateway rejected order for {}",
                ticket.symbol
            )));
        }

        self.placed.write().await.push(ticket.clone());

        Ok(OrderOutcome {
            order_id: format!("paper-{}", ticket.client_order_id),
            status: OrderStatus::Accepted,
            submitted_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use uuid::Uuid;

    fn ticket(symbol: &str) -> OrderTicket {
        OrderTicket {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: 10,
            limit_price: Some(20.0),
            stop_loss_price: Some(19.6),
            time_in_force: "day".to_string(),
        }
    }

    #[tokio::test]
    async fn paper_gateway_records_orders() {
        let gw = PaperGateway::new();
        let outcome = gw.place_order(&ticket("AAPL")).await.unwrap();
        assert_eq!(outcome.status, OrderStatus::Accepted);

        let placed = gw.placed_orders().await;
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn injected_rejection_surfaces_as_order_rejected() {
        let gw = PaperGateway::new();
        gw.reject_orders();

        let err = gw.place_order(&ticket("AAPL")).await.unwrap_err();
        assert!(matches!(err, crate::error::AgentError::OrderRejected(_)));
        assert!(gw.placed_orders().await.is_empty());
        assert_eq!(gw.place_order_calls(), 1);
    }

    #[tokio::test]
    async fn injected_account_failures_are_transient() {
        let gw = PaperGateway::new();
        gw.fail_account_fetches(1);

        let err = gw.get_account().await.unwrap_err();
        assert!(err.is_transient());
        assert!(gw.get_account().await.is_ok());
    }

    #[test]
    fn catalog_is_read_only() {
        let names: Vec<String> = default_catalog().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"get_positions".to_string()));
        assert!(!names.iter().any(|n| n.contains("place_order")));
        assert!(!names.iter().any(|n| n.contains("cancel_order")));
    }
}

//! Tool router for deterministic tool-call execution
//!
//! Every ToolCall the planner emits lands here exactly once. Dispatch is
//! a tagged union over the tool name: the fixed local set first, then the
//! remote catalog mapped onto the gateway's typed operations. Results and
//! errors normalize into a uniform ToolResult; the router itself never
//! fails a whole turn. Order placement is not routable from here at all.

use crate::gateway::TradingGateway;
use crate::models::{ToolCall, ToolResult, ToolSpec};
use crate::retry::{with_retry, RetryPolicy};
use crate::tools::ToolRegistry;
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ToolRouter {
    registry: ToolRegistry,
    gateway: Arc<dyn TradingGateway>,
    remote_catalog: Vec<ToolSpec>,
    retry: RetryPolicy,
}

impl ToolRouter {
    /// The remote catalog is discovered from the gateway once, at session
    /// start, and treated as externally supplied data.
    pub fn new(registry: ToolRegistry, gateway: Arc<dyn TradingGateway>, retry: RetryPolicy) -> Self {
        let remote_catalog = gateway.tool_catalog();
        Self {
            registry,
            gateway,
            remote_catalog,
            retry,
        }
    }

    /// Full planner-facing catalog: local tools plus the gateway's.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        let mut specs = self.registry.specs();
        specs.extend(self.remote_catalog.iter().cloned());
        specs
    }

    /// Execute one tool call and normalize the outcome. Errors become
    /// ok=false results fed back to the planner, never loop aborts.
    pub async fn route(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();

        let outcome = if self.registry.contains(&call.name) {
            self.execute_local(call).await
        } else if self.remote_catalog.iter().any(|s| s.name == call.name) {
            self.execute_remote(call).await
        } else {
            warn!(tool_name = %call.name, "Tool not registered");
            Err(crate::error::AgentError::ToolNotFound(call.name.clone()))
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                debug!(tool_name = %call.name, elapsed_ms, "Tool call succeeded");
                ToolResult::success(call, payload)
            }
            Err(e) => {
                warn!(tool_name = %call.name, elapsed_ms, error = %e, "Tool call failed");
                ToolResult::failure(call, e.to_string())
            }
        }
    }

    async fn execute_local(&self, call: &ToolCall) -> Result<Value> {
        // contains() was checked by route
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| crate::error::AgentError::ToolNotFound(call.name.clone()))?;
        tool.execute(&call.arguments).await
    }

    /// Map a remote tool name onto the gateway's typed read operations.
    /// Gateway reads go through the retry policy; placement never appears
    /// here, so the planner cannot trigger an order.
    async fn execute_remote(&self, call: &ToolCall) -> Result<Value> {
        match call.name.as_str() {
            "get_account" => {
                let account = with_retry(&self.retry, "get_account", || {
                    self.gateway.get_account()
                })
                .await?;
                Ok(serde_json::to_value(account)?)
            }
            "get_positions" => {
                let positions = with_retry(&self.retry, "get_positions", || {
                    self.gateway.get_positions()
                })
                .await?;
                Ok(serde_json::to_value(positions)?)
            }
            "get_quote" => {
                let symbol = require_symbol(&call.arguments)?;
                with_retry(&self.retry, "get_quote", || self.gateway.get_quote(&symbol)).await
            }
            "get_bars" => {
                let symbol = require_symbol(&call.arguments)?;
                let limit = call
                    .arguments
                    .get("limit")
                    .and_then(Value::as_u64)
                    .unwrap_or(5) as usize;
                with_retry(&self.retry, "get_bars", || {
                    self.gateway.get_bars(&symbol, limit)
                })
                .await
            }
            other => Err(crate::error::AgentError::ToolNotFound(format!(
                "remote tool {} has no routable operation",
                other
            ))),
        }
    }
}

fn require_symbol(arguments: &Value) -> Result<String> {
    arguments
        .get("symbol")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            crate::error::AgentError::InvalidToolArgs("expected 'symbol' argument".to_string())
        })
}

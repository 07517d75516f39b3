//! Alpaca-backed trading gateway
//!
//! HTTP implementation of the gateway trait. Uses a long-lived pooled
//! reqwest::Client; credentials come from the environment. Status codes
//! are classified so the retry policy only ever sees transient failures
//! as retryable.

use crate::error::AgentError;
use crate::models::{
    AccountSnapshot, OrderOutcome, OrderSide, OrderStatus, OrderTicket, Position,
};
use crate::Result;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

pub struct AlpacaGateway {
    client: Client,
    trading_url: String,
    data_url: String,
    key_id: String,
    secret_key: String,
}

impl AlpacaGateway {
    /// Build from `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY`, with
    /// `APCA_API_BASE_URL` defaulting to the paper-trading endpoint.
    pub fn from_env() -> Option<Self> {
        let key_id = env::var("APCA_API_KEY_ID").ok()?;
        let secret_key = env::var("APCA_API_SECRET_KEY").ok()?;

        let trading_url = env::var("APCA_API_BASE_URL")
            .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string());
        let data_url = env::var("APCA_DATA_BASE_URL")
            .unwrap_or_else(|_| "https://data.alpaca.markets".to_string());

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;

        Some(Self {
            client,
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            key_id,
            secret_key,
        })
    }

    async fn request(
        &self,
        method: Method,
        url: String,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut req = self
            .client
            .request(method, &url)
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key);

        if let Some(body) = body {
            req = req.json(body);
        }

        debug!(url = %url, "Gateway request");

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(AgentError::from)
    }

    async fn get(&self, base: &str, path: &str) -> Result<Value> {
        self.request(Method::GET, format!("{}{}", base, path), None)
            .await
    }
}

/// Map an HTTP failure onto the error taxonomy: 429 rate limit, 5xx
/// transient gateway faults, 401/403 auth, everything else a permanent
/// gateway error.
fn classify_status(status: StatusCode, body: &str) -> AgentError {
    match status.as_u16() {
        429 => AgentError::RateLimited(body.to_string()),
        401 | 403 => AgentError::Auth(body.to_string()),
        code if code >= 500 => AgentError::Gateway {
            status: code,
            message: body.to_string(),
        },
        code => AgentError::Gateway {
            status: code,
            message: body.to_string(),
        },
    }
}

//
// ================= Wire shapes =================
//

// Alpaca serializes numeric fields as strings.
#[derive(Debug, Deserialize)]
struct AccountBody {
    equity: String,
    buying_power: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PositionBody {
    symbol: String,
    qty: String,
    avg_entry_price: String,
    unrealized_pl: String,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    status: String,
}

fn parse_f64(field: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        AgentError::Gateway {
            status: 200,
            message: format!("unparseable {} in gateway payload: {}", field, value),
        }
    })
}

#[async_trait::async_trait]
impl super::TradingGateway for AlpacaGateway {
    async fn get_account(&self) -> Result<AccountSnapshot> {
        let body = self.get(&self.trading_url, "/v2/account").await?;
        let account: AccountBody = serde_json::from_value(body)?;

        Ok(AccountSnapshot {
            equity: parse_f64("equity", &account.equity)?,
            buying_power: parse_f64("buying_power", &account.buying_power)?,
            currency: account.currency,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        let body = self.get(&self.trading_url, "/v2/positions").await?;
        let raw: Vec<PositionBody> = serde_json::from_value(body)?;

        raw.into_iter()
            .map(|p| {
                Ok(Position {
                    qty: parse_f64("qty", &p.qty)?,
                    avg_entry_price: parse_f64("avg_entry_price", &p.avg_entry_price)?,
                    unrealized_pl: parse_f64("unrealized_pl", &p.unrealized_pl)?,
                    symbol: p.symbol,
                })
            })
            .collect()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Value> {
        self.get(
            &self.data_url,
            &format!("/v2/stocks/{}/quotes/latest", symbol),
        )
        .await
    }

    async fn get_bars(&self, symbol: &str, limit: usize) -> Result<Value> {
        self.get(
            &self.data_url,
            &format!("/v2/stocks/{}/bars?timeframe=1Day&limit={}", symbol, limit),
        )
        .await
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderOutcome> {
        let mut body = json!({
            "client_order_id": ticket.client_order_id.to_string(),
            "symbol": ticket.symbol,
            "qty": ticket.quantity.to_string(),
            "side": match ticket.side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            "type": if ticket.limit_price.is_some() { "limit" } else { "market" },
            "time_in_force": ticket.time_in_force,
        });

        if let Some(limit) = ticket.limit_price {
            body["limit_price"] = json!(limit.to_string());
        }
        if let Some(stop) = ticket.stop_loss_price {
            body["order_class"] = json!("oto");
            body["stop_loss"] = json!({ "stop_price": stop.to_string() });
        }

        let result = self
            .request(
                Method::POST,
                format!("{}/v2/orders", self.trading_url),
                Some(&body),
            )
            .await
            .map_err(|e| match e {
                // Order endpoints signal rejection through 4xx bodies.
                AgentError::Gateway { status, message } if (400..500).contains(&status) => {
                    AgentError::OrderRejected(message)
                }
                other => other,
            })?;

        let order: OrderBody = serde_json::from_value(result)?;

        let status = match order.status.as_str() {
            "filled" => OrderStatus::Filled,
            "rejected" | "canceled" => OrderStatus::Rejected,
            _ => OrderStatus::Accepted,
        };

        Ok(OrderOutcome {
            order_id: order.id,
            status,
            submitted_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.request(
            Method::DELETE,
            format!("{}/v2/orders/{}", self.trading_url, order_id),
            None,
        )
        .await?;
        Ok(())
    }
}

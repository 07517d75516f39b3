//! Claude-backed planner
//!
//! Drives the Anthropic Messages API with the tool catalog and the
//! running transcript. Uses a long-lived reqwest::Client for connection
//! pooling; upstream failures are classified so the retry policy can
//! distinguish transient throttling from permanent faults.

use crate::error::AgentError;
use crate::models::{Opportunity, RiskProfile, ToolCall, ToolSpec, TranscriptEntry};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, error};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

const SYSTEM_PROMPT: &str = "You are a day trading assistant. You answer account and market \
questions and analyze trade opportunities using the user's brokerage account.\n\n\
Be direct and data-driven. When the user asks a question, use your tools to get the data \
and answer concisely. Never place trades yourself; execution is handled separately with \
explicit user confirmation.";

/// Reusable Claude client (connection-pooled)
pub struct ClaudePlanner {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudePlanner {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model: env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn from_env() -> Option<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Self::new(api_key))
    }

    async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        if self.api_key.is_empty() {
            return Err(AgentError::Setup(
                "ANTHROPIC_API_KEY not configured".to_string(),
            ));
        }

        debug!(model = %self.model, "Calling Claude API");

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Claude API error response");
            return Err(match status.as_u16() {
                429 => AgentError::RateLimited(body),
                401 | 403 => AgentError::Auth(body),
                code if code >= 500 => AgentError::Gateway {
                    status: code,
                    message: body,
                },
                _ => AgentError::Planner(format!("Claude API error {}: {}", status, body)),
            });
        }

        response.json::<MessagesResponse>().await.map_err(|e| {
            error!("Failed to parse Claude response: {}", e);
            AgentError::Planner(format!("Claude parse error: {}", e))
        })
    }
}

/// Flatten a tool result into the text block Claude expects back.
fn render_tool_result(result: &crate::models::ToolResult) -> String {
    if result.ok {
        serde_json::to_string(&result.payload).unwrap_or_else(|_| "null".to_string())
    } else {
        format!(
            "Error: {}",
            result.error.as_deref().unwrap_or("tool failed")
        )
    }
}

fn build_messages(transcript: &[TranscriptEntry]) -> Vec<Message> {
    transcript
        .iter()
        .map(|entry| match entry {
            TranscriptEntry::UserQuery(query) => Message {
                role: "user".to_string(),
                content: vec![ContentBlock::Text {
                    text: query.clone(),
                }],
            },
            TranscriptEntry::ToolCalls(calls) => Message {
                role: "assistant".to_string(),
                content: calls
                    .iter()
                    .map(|call| ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    })
                    .collect(),
            },
            TranscriptEntry::ToolResults(results) => Message {
                role: "user".to_string(),
                content: results
                    .iter()
                    .map(|result| ContentBlock::ToolResult {
                        tool_use_id: result.call_id.clone(),
                        content: render_tool_result(result),
                    })
                    .collect(),
            },
        })
        .collect()
}

#[async_trait]
impl super::Planner for ClaudePlanner {
    async fn complete(
        &self,
        transcript: &[TranscriptEntry],
        tools: &[ToolSpec],
    ) -> Result<super::PlannerTurn> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT.to_string(),
            messages: build_messages(transcript),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
        };

        let response = self.send(&request).await?;

        let tool_calls: Vec<ToolCall> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect();

        if !tool_calls.is_empty() {
            return Ok(super::PlannerTurn::ToolCalls(tool_calls));
        }

        let text: Vec<&str> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(AgentError::Planner(
                "empty response from Claude".to_string(),
            ));
        }

        Ok(super::PlannerTurn::Answer(text.join("\n")))
    }

    async fn recommend(&self, opportunity: &Opportunity, profile: &RiskProfile) -> Result<String> {
        let c = &opportunity.scored.candidate;
        let prompt = format!(
            "Present this trade opportunity concisely.\n\n\
             Symbol: {}\n\
             Score: {:.0}/100 ({})\n\
             Price: ${:.2} | Spread: {:.3}% | Volume: {} | Volatility: {:.1}% | Gap: {:+.1}%\n\
             Risk tier: {} (stop loss {:.1}% below entry)\n\
             Proposed: buy {} shares (~${:.2} notional), limit ${:.2}, stop ${:.2}\n\n\
             Structure: 1) the opportunity, 2) the metrics, 3) the recommendation, \
             4) two or three specific risks. Plain text, under 200 words.",
            c.symbol,
            opportunity.scored.score,
            opportunity.scored.breakdown,
            c.price,
            c.spread_pct,
            c.volume,
            c.volatility,
            c.momentum,
            profile.tier,
            profile.stop_loss_pct,
            opportunity.quantity,
            opportunity.position_size,
            opportunity.limit_price,
            opportunity.stop_loss_price,
        );

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            system: "You are a trading analysis engine. Present opportunities factually."
                .to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![ContentBlock::Text { text: prompt }],
            }],
            tools: None,
        };

        let response = self.send(&request).await?;

        let text: Vec<&str> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(AgentError::Planner(
                "empty recommendation from Claude".to_string(),
            ));
        }

        Ok(text.join("\n"))
    }
}

//
// ================= Wire shapes =================
//

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[allow(dead_code)]
    stop_reason: Option<String>,
}

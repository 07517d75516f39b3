//! Planner trait and implementations
//!
//! The planner is the language-model-driven capability that either
//! answers in text or requests tool invocations. It is treated as an
//! untrusted scheduler: the Q&A loop bounds and audits whatever it emits.

use crate::models::{Opportunity, RiskProfile, ToolCall, ToolSpec, TranscriptEntry};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod claude;
pub use claude::ClaudePlanner;

/// One planner turn: a final answer, or tool calls to route.
#[derive(Debug)]
pub enum PlannerTurn {
    Answer(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Advance the conversation one turn given the running transcript and
    /// the tool catalog.
    async fn complete(
        &self,
        transcript: &[TranscriptEntry],
        tools: &[ToolSpec],
    ) -> Result<PlannerTurn>;

    /// One-shot natural-language recommendation for a filtered opportunity.
    async fn recommend(&self, opportunity: &Opportunity, profile: &RiskProfile) -> Result<String>;
}

/// Scripted planner for development & testing.
/// Pops pre-programmed turns, keeping the engine exercisable without an
/// LLM dependency.
pub struct ScriptedPlanner {
    turns: Mutex<VecDeque<Result<PlannerTurn>>>,
    recommendation: Option<String>,
}

impl ScriptedPlanner {
    pub fn new(turns: Vec<PlannerTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
            recommendation: Some("Scripted recommendation.".to_string()),
        }
    }

    /// Queue a failing turn (e.g. to exercise retry or degrade paths).
    pub fn push_error(&self, error: crate::error::AgentError) {
        self.turns.lock().unwrap().push_back(Err(error));
    }

    pub fn push_turn(&self, turn: PlannerTurn) {
        self.turns.lock().unwrap().push_back(Ok(turn));
    }

    /// Make every `recommend` call fail, for degrade-path tests.
    pub fn without_recommendations(mut self) -> Self {
        self.recommendation = None;
        self
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn complete(
        &self,
        _transcript: &[TranscriptEntry],
        _tools: &[ToolSpec],
    ) -> Result<PlannerTurn> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(crate::error::AgentError::Planner(
                    "scripted planner exhausted".to_string(),
                ))
            })
    }

    async fn recommend(&self, opportunity: &Opportunity, profile: &RiskProfile) -> Result<String> {
        match &self.recommendation {
            Some(text) => Ok(format!(
                "{} {} (score {:.0}, {} tier)",
                text,
                opportunity.symbol(),
                opportunity.scored.score,
                profile.tier
            )),
            None => Err(crate::error::AgentError::Planner(
                "recommendations disabled".to_string(),
            )),
        }
    }
}

//! Trading agent engine
//!
//! An autonomous trading assistant core that:
//! - Scans the market for short-horizon opportunities (discover -> score ->
//!   risk filter -> recommend -> approve -> execute)
//! - Answers free-form account/market questions through a bounded
//!   planner/tool control loop
//! - Guards against runaway planners with a step limit and a
//!   repeated-action detector
//! - Retries transient upstream failures with exponential backoff, and
//!   never retries order placement
//!
//! SCAN PIPELINE:
//! FETCH_ACCOUNT -> DISCOVER -> SCORE -> FILTER -> RECOMMEND ->
//! APPROVE -> EXECUTE -> DONE

pub mod agent;
pub mod approval;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod models;
pub mod planner;
pub mod retry;
pub mod risk;
pub mod scan;
pub mod scoring;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use agent::Agent;
pub use models::*;

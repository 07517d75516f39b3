//! User approval surface for trade opportunities
//!
//! The engine never executes without an explicit decision from this seam.
//! The interactive surface (REPL prompt) lives outside the core; the
//! implementations here cover tests and the demo binary.

use crate::models::Opportunity;
use crate::Result;
use async_trait::async_trait;

/// Decision for one presented opportunity. Decisions are independent:
/// rejecting one opportunity does not affect the remaining queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Approval {
    Approve,
    /// Approve with a modified quantity and/or limit price. Risk
    /// parameters (stop loss, sizing policy) are not renegotiated.
    ApproveModified {
        quantity: Option<u64>,
        limit_price: Option<f64>,
    },
    Reject,
}

#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    async fn present(&self, opportunity: &Opportunity) -> Result<Approval>;
}

/// Approves everything. For paper-gateway demos and tests only.
pub struct AutoApprove;

#[async_trait]
impl ApprovalSurface for AutoApprove {
    async fn present(&self, _opportunity: &Opportunity) -> Result<Approval> {
        Ok(Approval::Approve)
    }
}

/// Rejects everything.
pub struct RejectAll;

#[async_trait]
impl ApprovalSurface for RejectAll {
    async fn present(&self, _opportunity: &Opportunity) -> Result<Approval> {
        Ok(Approval::Reject)
    }
}

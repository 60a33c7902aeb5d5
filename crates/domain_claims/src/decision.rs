//! Decision classification

use core_kernel::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClaimError;

/// Outcome class of an adjudicated claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// A rule set `IsApproved`
    Approved,
    /// Not approved and at least one rejection code was raised
    Rejected,
    /// Neither approved nor rejected, typically routed to manual review
    Partial,
}

impl DecisionType {
    /// Approval wins over rejection codes; no approval and no codes is partial.
    pub fn classify(is_approved: bool, rejection_codes: &[String]) -> Self {
        if is_approved {
            DecisionType::Approved
        } else if !rejection_codes.is_empty() {
            DecisionType::Rejected
        } else {
            DecisionType::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Approved => "approved",
            DecisionType::Rejected => "rejected",
            DecisionType::Partial => "partial",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionType {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(DecisionType::Approved),
            "rejected" => Ok(DecisionType::Rejected),
            "partial" => Ok(DecisionType::Partial),
            other => Err(ClaimError::UnknownDecision(other.to_string())),
        }
    }
}

/// The financial result of an evaluation, as compared by replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialOutcome {
    pub requested_amount: Amount,
    pub approved_amount: Amount,
    pub deductions: Amount,
    pub franchise: Amount,
    pub basic_share: Amount,
    pub supp_share: Amount,
    pub decision: DecisionType,
    pub rejection_codes: Vec<String>,
}

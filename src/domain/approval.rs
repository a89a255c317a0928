//! Manager decisions on expenses awaiting approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::expense::{ExpenseStatus, UnknownStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
        }
    }

    /// Status the expense moves to once this decision is recorded.
    pub fn resulting_status(&self) -> ExpenseStatus {
        match self {
            ApprovalDecision::Approved => ExpenseStatus::Approved,
            ApprovalDecision::Rejected => ExpenseStatus::Rejected,
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalDecision {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ApprovalDecision::Approved),
            "rejected" => Ok(ApprovalDecision::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub approver_id: Uuid,
    pub status: ApprovalDecision,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApproval {
    pub expense_id: Uuid,
    pub approver_id: Uuid,
    pub status: ApprovalDecision,
    pub notes: String,
}

impl NewApproval {
    pub fn into_approval(self, id: Uuid, created_at: DateTime<Utc>) -> Approval {
        Approval {
            id,
            expense_id: self.expense_id,
            approver_id: self.approver_id,
            status: self.status,
            notes: self.notes,
            created_at,
        }
    }
}

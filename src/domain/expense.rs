//! Expense domain entity.
//! Framework-agnostic representation of a reimbursement claim and its lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Smallest claimable amount, in minor currency units.
pub const MIN_EXPENSE_AMOUNT: i64 = 10_000;
/// Largest claimable amount, in minor currency units.
pub const MAX_EXPENSE_AMOUNT: i64 = 50_000_000;
/// Amounts at or above this require a manager decision before settlement.
pub const APPROVAL_THRESHOLD: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    AwaitingApproval,
    AutoApproved,
    Approved,
    Rejected,
    Processing,
    Completed,
    Failed,
}

impl ExpenseStatus {
    /// Statuses the settlement worker picks up.
    pub const SETTLEABLE: [ExpenseStatus; 2] =
        [ExpenseStatus::Approved, ExpenseStatus::AutoApproved];

    pub const ALL: [ExpenseStatus; 8] = [
        ExpenseStatus::Pending,
        ExpenseStatus::AwaitingApproval,
        ExpenseStatus::AutoApproved,
        ExpenseStatus::Approved,
        ExpenseStatus::Rejected,
        ExpenseStatus::Processing,
        ExpenseStatus::Completed,
        ExpenseStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::AwaitingApproval => "awaiting_approval",
            ExpenseStatus::AutoApproved => "auto_approved",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::Processing => "processing",
            ExpenseStatus::Completed => "completed",
            ExpenseStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExpenseStatus::Completed | ExpenseStatus::Failed | ExpenseStatus::Rejected
        )
    }

    pub fn is_settleable(&self) -> bool {
        Self::SETTLEABLE.contains(self)
    }

    /// Initial status for a freshly submitted claim of `amount`.
    pub fn initial_for(amount: i64) -> Self {
        if requires_approval(amount) {
            ExpenseStatus::AwaitingApproval
        } else {
            ExpenseStatus::AutoApproved
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown expense status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ExpenseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpenseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

pub fn requires_approval(amount: i64) -> bool {
    amount >= APPROVAL_THRESHOLD
}

pub fn amount_in_bounds(amount: i64) -> bool {
    (MIN_EXPENSE_AMOUNT..=MAX_EXPENSE_AMOUNT).contains(&amount)
}

/// A persisted expense claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub receipt_url: Option<String>,
    pub status: ExpenseStatus,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub requires_approval: bool,
    pub auto_approved: bool,
}

/// An expense that passed validation but has not been stored yet.
/// The store assigns `id` and `submitted_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub user_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub receipt_url: Option<String>,
    pub status: ExpenseStatus,
    pub requires_approval: bool,
    pub auto_approved: bool,
}

impl NewExpense {
    /// Derives the approval flags and initial status from the amount.
    /// Bounds are not checked here.
    pub fn classify(
        user_id: Uuid,
        amount: i64,
        description: String,
        receipt_url: Option<String>,
    ) -> Self {
        let requires_approval = requires_approval(amount);
        Self {
            user_id,
            amount,
            description,
            receipt_url,
            status: ExpenseStatus::initial_for(amount),
            requires_approval,
            auto_approved: !requires_approval,
        }
    }

    pub fn into_expense(self, id: Uuid, submitted_at: DateTime<Utc>) -> Expense {
        Expense {
            id,
            user_id: self.user_id,
            amount: self.amount,
            description: self.description,
            receipt_url: self.receipt_url,
            status: self.status,
            submitted_at,
            processed_at: None,
            requires_approval: self.requires_approval,
            auto_approved: self.auto_approved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(!requires_approval(APPROVAL_THRESHOLD - 1));
        assert!(requires_approval(APPROVAL_THRESHOLD));
        assert_eq!(
            ExpenseStatus::initial_for(APPROVAL_THRESHOLD),
            ExpenseStatus::AwaitingApproval
        );
        assert_eq!(
            ExpenseStatus::initial_for(APPROVAL_THRESHOLD - 1),
            ExpenseStatus::AutoApproved
        );
    }

    #[test]
    fn test_amount_bounds() {
        assert!(!amount_in_bounds(MIN_EXPENSE_AMOUNT - 1));
        assert!(amount_in_bounds(MIN_EXPENSE_AMOUNT));
        assert!(amount_in_bounds(MAX_EXPENSE_AMOUNT));
        assert!(!amount_in_bounds(MAX_EXPENSE_AMOUNT + 1));
    }

    #[test]
    fn test_classify_sets_exactly_one_flag() {
        for amount in [
            MIN_EXPENSE_AMOUNT,
            500_000,
            APPROVAL_THRESHOLD,
            2_000_000,
            MAX_EXPENSE_AMOUNT,
        ] {
            let expense = NewExpense::classify(Uuid::new_v4(), amount, "x".to_string(), None);
            assert_ne!(expense.requires_approval, expense.auto_approved);
            assert_eq!(expense.requires_approval, amount >= APPROVAL_THRESHOLD);
        }
    }

    #[test]
    fn test_status_string_mapping() {
        for status in ExpenseStatus::ALL {
            assert_eq!(status.as_str().parse::<ExpenseStatus>(), Ok(status));
        }
        assert!("settled".parse::<ExpenseStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_settleable_sets_are_disjoint() {
        for status in ExpenseStatus::ALL {
            assert!(!(status.is_terminal() && status.is_settleable()));
        }
        assert!(ExpenseStatus::Rejected.is_terminal());
        assert!(!ExpenseStatus::AwaitingApproval.is_settleable());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExpenseStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
    }
}

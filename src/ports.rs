//! Ports the expense core depends on.
//! Adapters implement these against Postgres, memory, or the payment provider's HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Approval, Expense, ExpenseStatus, NewApproval, NewExpense};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Expense {id} is no longer {expected}")]
    StatusConflict { id: Uuid, expected: ExpenseStatus },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Stores a new expense, assigning its id and submission timestamp.
    async fn create(&self, expense: &NewExpense) -> RepositoryResult<Expense>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Expense>>;

    /// Newest first.
    async fn find_by_owner(
        &self,
        user_id: Uuid,
        status: Option<ExpenseStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Expense>>;

    /// Awaiting-approval queue, oldest first.
    async fn find_awaiting_approval(&self) -> RepositoryResult<Vec<Expense>>;

    /// Oldest first. An empty status set matches nothing.
    async fn find_by_statuses(&self, statuses: &[ExpenseStatus]) -> RepositoryResult<Vec<Expense>>;

    /// Unconditional status write.
    async fn update_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()>;

    /// Writes `status` only while the expense is still in `expected`.
    /// Returns whether the write happened.
    async fn update_status_if(
        &self,
        id: Uuid,
        expected: ExpenseStatus,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn create(&self, approval: &NewApproval) -> RepositoryResult<Approval>;

    async fn find_by_expense_id(&self, expense_id: Uuid) -> RepositoryResult<Option<Approval>>;

    /// Records the decision and moves the expense from `expected` to the decision's
    /// resulting status as one unit. Fails with `StatusConflict` and writes nothing
    /// when the expense has already left `expected`.
    async fn record_decision(
        &self,
        approval: &NewApproval,
        expected: ExpenseStatus,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<Approval>;
}

/// What the payment provider reported for an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub provider_id: String,
    pub external_id: String,
    pub status: String,
    pub message: Option<String>,
}

impl PaymentReceipt {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider already accepted a request with this external id.
    #[error("Duplicate submission: {0}")]
    DuplicateSubmission(String),

    #[error("Payment rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment request failed: {0}")]
    Transport(String),

    #[error("Invalid response from payment provider: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),
}

impl GatewayError {
    pub fn is_duplicate_submission(&self) -> bool {
        matches!(self, GatewayError::DuplicateSubmission(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn settle(
        &self,
        amount: i64,
        idempotency_token: &str,
    ) -> Result<PaymentReceipt, GatewayError>;
}

//! Expense lifecycle use case.
//! Submission, manager decisions, and the read side, over the repository ports.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::expense::amount_in_bounds;
use crate::domain::{
    Approval, ApprovalDecision, Expense, ExpenseError, ExpenseStatus, NewApproval, NewExpense,
    Principal,
};
use crate::ports::{ApprovalRepository, ExpenseRepository, RepositoryError};

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Input for a new expense claim.
#[derive(Debug, Clone)]
pub struct SubmitExpense {
    pub user_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub receipt_url: Option<String>,
}

#[derive(Clone)]
pub struct ExpenseLifecycle {
    expenses: Arc<dyn ExpenseRepository>,
    approvals: Arc<dyn ApprovalRepository>,
}

impl ExpenseLifecycle {
    pub fn new(
        expenses: Arc<dyn ExpenseRepository>,
        approvals: Arc<dyn ApprovalRepository>,
    ) -> Self {
        Self {
            expenses,
            approvals,
        }
    }

    pub fn expenses(&self) -> Arc<dyn ExpenseRepository> {
        Arc::clone(&self.expenses)
    }

    /// Validates and stores a claim. Amounts at or above the approval threshold
    /// land in `awaiting_approval`; everything else is auto-approved.
    pub async fn submit(&self, input: SubmitExpense) -> Result<Expense, ExpenseError> {
        if !amount_in_bounds(input.amount) {
            return Err(ExpenseError::InvalidAmount);
        }
        if input.description.is_empty() {
            return Err(ExpenseError::MissingDescription);
        }

        let receipt_url = input.receipt_url.filter(|url| !url.trim().is_empty());
        let new_expense =
            NewExpense::classify(input.user_id, input.amount, input.description, receipt_url);
        let expense = self.expenses.create(&new_expense).await?;

        tracing::info!(
            expense_id = %expense.id,
            user_id = %expense.user_id,
            amount = expense.amount,
            status = %expense.status,
            "Expense submitted"
        );

        Ok(expense)
    }

    /// Records a manager decision on an expense awaiting approval.
    ///
    /// Checks run in a fixed order: role, existence, status. The status flip and
    /// the approval record are written together, and a concurrent decision that
    /// got there first surfaces as `InvalidExpenseStatus`.
    pub async fn decide(
        &self,
        expense_id: Uuid,
        approver: &Principal,
        decision: ApprovalDecision,
        notes: String,
    ) -> Result<Approval, ExpenseError> {
        if !approver.is_manager() {
            return Err(ExpenseError::UnauthorizedAction);
        }

        let expense = self
            .expenses
            .find_by_id(expense_id)
            .await?
            .ok_or(ExpenseError::ExpenseNotFound)?;

        if expense.status != ExpenseStatus::AwaitingApproval {
            return Err(ExpenseError::InvalidExpenseStatus);
        }

        let approval = NewApproval {
            expense_id,
            approver_id: approver.user_id,
            status: decision,
            notes,
        };

        let recorded = self
            .approvals
            .record_decision(&approval, ExpenseStatus::AwaitingApproval, Utc::now())
            .await
            .map_err(|e| match e {
                RepositoryError::StatusConflict { .. } => ExpenseError::InvalidExpenseStatus,
                other => ExpenseError::Repository(other),
            })?;

        tracing::info!(
            expense_id = %expense_id,
            approver_id = %approver.user_id,
            decision = %decision,
            "Expense decision recorded"
        );

        Ok(recorded)
    }

    pub async fn approve(
        &self,
        expense_id: Uuid,
        approver: &Principal,
        notes: String,
    ) -> Result<Approval, ExpenseError> {
        self.decide(expense_id, approver, ApprovalDecision::Approved, notes)
            .await
    }

    pub async fn reject(
        &self,
        expense_id: Uuid,
        approver: &Principal,
        notes: String,
    ) -> Result<Approval, ExpenseError> {
        self.decide(expense_id, approver, ApprovalDecision::Rejected, notes)
            .await
    }

    pub async fn get_by_id(&self, expense_id: Uuid) -> Result<Expense, ExpenseError> {
        self.expenses
            .find_by_id(expense_id)
            .await?
            .ok_or(ExpenseError::ExpenseNotFound)
    }

    /// One page of an owner's expenses, newest first. `page` is 1-based;
    /// non-positive values fall back to the first page and the default size.
    pub async fn list_for_owner(
        &self,
        owner: Uuid,
        status: Option<ExpenseStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Vec<Expense>, ExpenseError> {
        let page = page.max(1);
        let limit = if limit < 1 { DEFAULT_PAGE_SIZE } else { limit };
        let offset = (page - 1).saturating_mul(limit);

        Ok(self
            .expenses
            .find_by_owner(owner, status, limit, offset)
            .await?)
    }

    pub async fn list_awaiting_approval(&self) -> Result<Vec<Expense>, ExpenseError> {
        Ok(self.expenses.find_awaiting_approval().await?)
    }

    /// The decision recorded for an expense, if any.
    pub async fn approval_for(&self, expense_id: Uuid) -> Result<Option<Approval>, ExpenseError> {
        Ok(self.approvals.find_by_expense_id(expense_id).await?)
    }
}

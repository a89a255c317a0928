use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Approval, Expense, ExpenseStatus, NewApproval, NewExpense};
use crate::ports::{
    ApprovalRepository, ExpenseRepository, RepositoryError, RepositoryResult,
};

#[derive(Default)]
struct Tables {
    // Insertion order doubles as submission order.
    expenses: Vec<Expense>,
    approvals: Vec<Approval>,
}

impl Tables {
    fn expense_mut(&mut self, id: Uuid) -> Option<&mut Expense> {
        self.expenses.iter_mut().find(|e| e.id == id)
    }
}

/// A thread-safe in-memory store implementing both the expense and approval repositories.
///
/// Both tables sit behind one lock so a decision (status flip plus approval insert)
/// is atomic, matching the Postgres transaction.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every approval recorded for an expense, in creation order.
    pub async fn approvals_for(&self, expense_id: Uuid) -> Vec<Approval> {
        let tables = self.tables.read().await;
        tables
            .approvals
            .iter()
            .filter(|a| a.expense_id == expense_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExpenseRepository for InMemoryStore {
    async fn create(&self, expense: &NewExpense) -> RepositoryResult<Expense> {
        let mut tables = self.tables.write().await;
        let stored = expense.clone().into_expense(Uuid::new_v4(), Utc::now());
        tables.expenses.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Expense>> {
        let tables = self.tables.read().await;
        Ok(tables.expenses.iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_owner(
        &self,
        user_id: Uuid,
        status: Option<ExpenseStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Expense>> {
        let tables = self.tables.read().await;
        Ok(tables
            .expenses
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .filter(|e| status.map_or(true, |s| e.status == s))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_awaiting_approval(&self) -> RepositoryResult<Vec<Expense>> {
        let tables = self.tables.read().await;
        Ok(tables
            .expenses
            .iter()
            .filter(|e| e.status == ExpenseStatus::AwaitingApproval && e.requires_approval)
            .cloned()
            .collect())
    }

    async fn find_by_statuses(&self, statuses: &[ExpenseStatus]) -> RepositoryResult<Vec<Expense>> {
        let tables = self.tables.read().await;
        Ok(tables
            .expenses
            .iter()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        let expense = tables
            .expense_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("expense {}", id)))?;
        expense.status = status;
        expense.processed_at = processed_at;
        Ok(())
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: ExpenseStatus,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.expense_mut(id) {
            Some(expense) if expense.status == expected => {
                expense.status = status;
                expense.processed_at = processed_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ApprovalRepository for InMemoryStore {
    async fn create(&self, approval: &NewApproval) -> RepositoryResult<Approval> {
        let mut tables = self.tables.write().await;
        let stored = approval.clone().into_approval(Uuid::new_v4(), Utc::now());
        tables.approvals.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_expense_id(&self, expense_id: Uuid) -> RepositoryResult<Option<Approval>> {
        let tables = self.tables.read().await;
        Ok(tables
            .approvals
            .iter()
            .find(|a| a.expense_id == expense_id)
            .cloned())
    }

    async fn record_decision(
        &self,
        approval: &NewApproval,
        expected: ExpenseStatus,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<Approval> {
        let mut tables = self.tables.write().await;
        let expense = tables
            .expense_mut(approval.expense_id)
            .filter(|e| e.status == expected)
            .ok_or(RepositoryError::StatusConflict {
                id: approval.expense_id,
                expected,
            })?;

        expense.status = approval.status.resulting_status();
        expense.processed_at = Some(processed_at);

        let stored = approval.clone().into_approval(Uuid::new_v4(), Utc::now());
        tables.approvals.push(stored.clone());
        Ok(stored)
    }
}

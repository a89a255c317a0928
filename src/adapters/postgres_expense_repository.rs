//! Postgres implementation of ExpenseRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Expense, ExpenseStatus, NewExpense};
use crate::ports::{ExpenseRepository, RepositoryError, RepositoryResult};

/// Postgres-backed expense repository.
#[derive(Clone)]
pub struct PostgresExpenseRepository {
    pool: PgPool,
}

impl PostgresExpenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpenseRepository for PostgresExpenseRepository {
    async fn create(&self, expense: &NewExpense) -> RepositoryResult<Expense> {
        let row = sqlx::query_as::<_, ExpenseRow>(
            r#"
            INSERT INTO expenses (
                id, user_id, amount, description, receipt_url, status,
                requires_approval, auto_approved
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, amount, description, receipt_url, status,
                submitted_at, processed_at, requires_approval, auto_approved
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(expense.user_id)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(&expense.receipt_url)
        .bind(expense.status.as_str())
        .bind(expense.requires_approval)
        .bind(expense.auto_approved)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Expense>> {
        let row = sqlx::query_as::<_, ExpenseRow>(
            r#"
            SELECT id, user_id, amount, description, receipt_url, status,
                submitted_at, processed_at, requires_approval, auto_approved
            FROM expenses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ExpenseRow::into_domain).transpose()
    }

    async fn find_by_owner(
        &self,
        user_id: Uuid,
        status: Option<ExpenseStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Expense>> {
        let rows = sqlx::query_as::<_, ExpenseRow>(
            r#"
            SELECT id, user_id, amount, description, receipt_url, status,
                submitted_at, processed_at, requires_approval, auto_approved
            FROM expenses
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
            ORDER BY submitted_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExpenseRow::into_domain).collect()
    }

    async fn find_awaiting_approval(&self) -> RepositoryResult<Vec<Expense>> {
        let rows = sqlx::query_as::<_, ExpenseRow>(
            r#"
            SELECT id, user_id, amount, description, receipt_url, status,
                submitted_at, processed_at, requires_approval, auto_approved
            FROM expenses
            WHERE status = $1 AND requires_approval = TRUE
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .bind(ExpenseStatus::AwaitingApproval.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExpenseRow::into_domain).collect()
    }

    async fn find_by_statuses(&self, statuses: &[ExpenseStatus]) -> RepositoryResult<Vec<Expense>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, ExpenseRow>(
            r#"
            SELECT id, user_id, amount, description, receipt_url, status,
                submitted_at, processed_at, requires_approval, auto_approved
            FROM expenses
            WHERE status = ANY($1)
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExpenseRow::into_domain).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE expenses SET status = $1, processed_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(processed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("expense {}", id)));
        }
        Ok(())
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: ExpenseStatus,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE expenses SET status = $1, processed_at = $2 WHERE id = $3 AND status = $4",
        )
        .bind(status.as_str())
        .bind(processed_at)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct ExpenseRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    description: String,
    receipt_url: Option<String>,
    status: String,
    submitted_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    requires_approval: bool,
    auto_approved: bool,
}

impl ExpenseRow {
    fn into_domain(self) -> RepositoryResult<Expense> {
        let status = self
            .status
            .parse::<ExpenseStatus>()
            .map_err(|e| RepositoryError::Corrupt(format!("expense {}: {}", self.id, e)))?;

        Ok(Expense {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            description: self.description,
            receipt_url: self.receipt_url,
            status,
            submitted_at: self.submitted_at,
            processed_at: self.processed_at,
            requires_approval: self.requires_approval,
            auto_approved: self.auto_approved,
        })
    }
}

//! Postgres implementation of ApprovalRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::domain::{Approval, ApprovalDecision, ExpenseStatus, NewApproval};
use crate::ports::{ApprovalRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresApprovalRepository {
    pool: PgPool,
}

impl PostgresApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_approval(
    executor: &mut SqlxTransaction<'_, Postgres>,
    approval: &NewApproval,
) -> RepositoryResult<Approval> {
    let row = sqlx::query_as::<_, ApprovalRow>(
        r#"
        INSERT INTO approvals (id, expense_id, approver_id, status, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, expense_id, approver_id, status, notes, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(approval.expense_id)
    .bind(approval.approver_id)
    .bind(approval.status.as_str())
    .bind(&approval.notes)
    .fetch_one(&mut **executor)
    .await?;

    row.into_domain()
}

#[async_trait]
impl ApprovalRepository for PostgresApprovalRepository {
    async fn create(&self, approval: &NewApproval) -> RepositoryResult<Approval> {
        let mut tx = self.pool.begin().await?;
        let created = insert_approval(&mut tx, approval).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_by_expense_id(&self, expense_id: Uuid) -> RepositoryResult<Option<Approval>> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT id, expense_id, approver_id, status, notes, created_at
            FROM approvals
            WHERE expense_id = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(expense_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApprovalRow::into_domain).transpose()
    }

    async fn record_decision(
        &self,
        approval: &NewApproval,
        expected: ExpenseStatus,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<Approval> {
        let mut tx = self.pool.begin().await?;

        // The guarded flip serializes concurrent deciders on the row lock; the loser
        // sees zero affected rows once the winner commits.
        let flipped = sqlx::query(
            "UPDATE expenses SET status = $1, processed_at = $2 WHERE id = $3 AND status = $4",
        )
        .bind(approval.status.resulting_status().as_str())
        .bind(processed_at)
        .bind(approval.expense_id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::StatusConflict {
                id: approval.expense_id,
                expected,
            });
        }

        // Dropping `tx` on an insert error rolls back the status flip.
        let created = insert_approval(&mut tx, approval).await?;
        tx.commit().await?;

        Ok(created)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ApprovalRow {
    id: Uuid,
    expense_id: Uuid,
    approver_id: Uuid,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl ApprovalRow {
    fn into_domain(self) -> RepositoryResult<Approval> {
        let status = self
            .status
            .parse::<ApprovalDecision>()
            .map_err(|e| RepositoryError::Corrupt(format!("approval {}: {}", self.id, e)))?;

        Ok(Approval {
            id: self.id,
            expense_id: self.expense_id,
            approver_id: self.approver_id,
            status,
            notes: self.notes.unwrap_or_default(),
            created_at: self.created_at,
        })
    }
}

pub mod in_memory;
pub mod postgres_approval_repository;
pub mod postgres_expense_repository;

pub use in_memory::InMemoryStore;
pub use postgres_approval_repository::PostgresApprovalRepository;
pub use postgres_expense_repository::PostgresExpenseRepository;

use crate::ports::RepositoryError;

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}

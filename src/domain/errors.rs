use thiserror::Error;

use super::expense::{MAX_EXPENSE_AMOUNT, MIN_EXPENSE_AMOUNT};
use crate::ports::RepositoryError;

#[derive(Debug, Error)]
pub enum ExpenseError {
    #[error("amount must be between {} and {}", MIN_EXPENSE_AMOUNT, MAX_EXPENSE_AMOUNT)]
    InvalidAmount,

    #[error("description is required")]
    MissingDescription,

    #[error("expense not found")]
    ExpenseNotFound,

    #[error("invalid expense status for this operation")]
    InvalidExpenseStatus,

    #[error("unauthorized action")]
    UnauthorizedAction,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub mod expense_lifecycle;

pub use expense_lifecycle::{ExpenseLifecycle, SubmitExpense, DEFAULT_PAGE_SIZE};

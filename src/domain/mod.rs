pub mod approval;
pub mod errors;
pub mod expense;
pub mod principal;

pub use approval::{Approval, ApprovalDecision, NewApproval};
pub use errors::ExpenseError;
pub use expense::{Expense, ExpenseStatus, NewExpense};
pub use principal::{Principal, Role};

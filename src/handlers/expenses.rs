use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{Expense, ExpenseError, ExpenseStatus, Principal};
use crate::error::AppError;
use crate::middleware::{AuthenticatedUser, ManagerUser};
use crate::use_cases::{SubmitExpense, DEFAULT_PAGE_SIZE};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitExpenseRequest {
    pub amount: i64,
    #[serde(default)]
    pub description: String,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub notes: String,
}

pub async fn submit_expense(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<SubmitExpenseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let expense = state
        .expenses
        .submit(SubmitExpense {
            user_id: principal.user_id,
            amount: payload.amount,
            description: payload.description,
            receipt_url: payload.receipt_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(query): Query<ListExpensesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ExpenseStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let expenses = state
        .expenses
        .list_for_owner(
            principal.user_id,
            status,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(expenses))
}

pub async fn list_pending(
    State(state): State<AppState>,
    ManagerUser(_): ManagerUser,
) -> Result<impl IntoResponse, AppError> {
    let expenses = state.expenses.list_awaiting_approval().await?;
    Ok(Json(expenses))
}

/// Employees only see their own expenses; anything else reads as not found.
async fn visible_expense(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
) -> Result<Expense, AppError> {
    let expense = state.expenses.get_by_id(id).await?;
    if !principal.is_manager() && expense.user_id != principal.user_id {
        return Err(ExpenseError::ExpenseNotFound.into());
    }
    Ok(expense)
}

pub async fn get_expense(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let expense = visible_expense(&state, &principal, id).await?;
    Ok(Json(expense))
}

pub async fn get_approval(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    visible_expense(&state, &principal, id).await?;

    let approval = state
        .expenses
        .approval_for(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No decision recorded for expense {}", id)))?;

    Ok(Json(approval))
}

pub async fn approve_expense(
    State(state): State<AppState>,
    ManagerUser(principal): ManagerUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<DecisionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.unwrap_or_default();
    let approval = state.expenses.approve(id, &principal, request.notes).await?;
    Ok(Json(approval))
}

pub async fn reject_expense(
    State(state): State<AppState>,
    ManagerUser(principal): ManagerUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<DecisionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.unwrap_or_default();
    let approval = state.expenses.reject(id, &principal, request.notes).await?;
    Ok(Json(approval))
}

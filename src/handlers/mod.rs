//! HTTP handlers for the public and protected routes.

pub mod expenses;
pub mod users;

use crate::auth::TokenIssuer;
use crate::clock::Clock;
use crate::repository::{ExpenseRepository, UserRepository};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

pub use expenses::{
    create_expense, delete_expense, expense_summary, get_expense, list_expenses, update_expense,
};
pub use users::{login, signup};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
    pub issuer: Arc<TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

/// Liveness check
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

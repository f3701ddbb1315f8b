use super::AppState;
use crate::auth::Identity;
use crate::error::{Result, ServiceError};
use crate::repository::{Expense, ExpenseFilter};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_CURRENCY: &str = "USD";

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

/// Body of create and update requests
#[derive(Debug, Deserialize)]
pub struct ExpenseInput {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ExpenseInput {
    fn into_expense(self, id: Uuid, owner: &Identity, now: DateTime<Utc>) -> Result<Expense> {
        if !self.amount.is_finite() {
            return Err(ServiceError::BadRequest("amount must be a finite number".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(ServiceError::BadRequest("category is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(ServiceError::BadRequest("description is required".to_string()));
        }

        let currency = match self.currency {
            Some(c) if !c.trim().is_empty() => c,
            _ => DEFAULT_CURRENCY.to_string(),
        };

        Ok(Expense {
            id,
            user_id: owner.as_str().to_string(),
            amount: self.amount,
            currency,
            category: self.category,
            description: self.description,
            timestamp: self.timestamp.unwrap_or(now),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub currency: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub from: Option<String>,
    pub to: Option<String>,
}

fn parse_day(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ServiceError::BadRequest(format!("{} must be a date in YYYY-MM-DD form", field))
    })
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

/// Build a filter from inclusive `from`/`to` days
fn day_range(
    identity: &Identity,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<ExpenseFilter> {
    let mut filter = ExpenseFilter::for_user(identity.as_str());

    if let Some(from) = from {
        filter.from = Some(start_of(parse_day("from", from)?));
    }
    if let Some(to) = to {
        // `to` includes the whole day; an unrepresentable next day means no bound
        filter.until = parse_day("to", to)?.succ_opt().map(start_of);
    }

    Ok(filter)
}

fn expense_id(path: std::result::Result<Path<Uuid>, PathRejection>) -> Result<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|_| ServiceError::NotFound("Expense not found".to_string()))
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("Expense not found".to_string())
}

/// `POST /api/v1/expenses`
pub async fn create_expense(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: JsonBody<ExpenseInput>,
) -> Result<impl IntoResponse> {
    let Json(input) = payload.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let expense = input.into_expense(Uuid::new_v4(), &identity, state.clock.now())?;
    let expense = state.expenses.insert(expense).await?;

    info!(identity = %identity, expense_id = %expense.id, "Expense created");

    Ok((StatusCode::CREATED, Json(json!({ "expense": expense }))))
}

/// `GET /api/v1/expenses/:id`
pub async fn get_expense(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = expense_id(path)?;
    let expense = state
        .expenses
        .get(identity.as_str(), id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(json!({ "expense": expense })))
}

/// `PUT /api/v1/expenses/:id`
pub async fn update_expense(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    payload: JsonBody<ExpenseInput>,
) -> Result<impl IntoResponse> {
    let id = expense_id(path)?;
    let Json(input) = payload.map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    let existing = state
        .expenses
        .get(identity.as_str(), id)
        .await?
        .ok_or_else(not_found)?;
    let replacement = input.into_expense(id, &identity, existing.timestamp)?;

    let expense = state
        .expenses
        .update(replacement)
        .await?
        .ok_or_else(not_found)?;

    info!(identity = %identity, expense_id = %id, "Expense updated");

    Ok(Json(json!({
        "message": "Expense updated",
        "expense": expense,
    })))
}

/// `DELETE /api/v1/expenses/:id`
pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = expense_id(path)?;
    if !state.expenses.delete(identity.as_str(), id).await? {
        return Err(not_found());
    }

    info!(identity = %identity, expense_id = %id, "Expense deleted");

    Ok(Json(json!({ "message": "Expense deleted" })))
}

/// `GET /api/v1/expenses`
pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(params) = params.map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    let mut filter = day_range(&identity, params.from.as_deref(), params.to.as_deref())?;
    filter.category = params.category.filter(|c| !c.is_empty());
    filter.currency = params.currency.filter(|c| !c.is_empty());
    filter.limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    filter.offset = params.offset.unwrap_or(0);

    let expenses = state.expenses.list(&filter).await?;
    Ok(Json(json!({ "expenses": expenses })))
}

/// `GET /api/v1/expenses/summary`
pub async fn expense_summary(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    params: std::result::Result<Query<SummaryParams>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(params) = params.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let filter = day_range(&identity, params.from.as_deref(), params.to.as_deref())?;

    let totals = state.expenses.summarize(&filter).await?;
    Ok(Json(totals))
}

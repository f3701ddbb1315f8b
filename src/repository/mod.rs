//! Record storage for users and expenses.
//!
//! Handlers talk to the [`UserRepository`] and [`ExpenseRepository`] traits;
//! [`memory`] provides the in-process implementation used by the binary and
//! the tests.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub use memory::{InMemoryExpenseRepository, InMemoryUserRepository};

/// Registered user
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub user_name: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

/// Expense record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    /// Owner identity
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Expense query scoped to one owner
#[derive(Debug, Clone)]
pub struct ExpenseFilter {
    pub user_id: String,
    pub category: Option<String>,
    pub currency: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl ExpenseFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category: None,
            currency: None,
            from: None,
            until: None,
            limit: usize::MAX,
            offset: 0,
        }
    }

    /// Whether `expense` satisfies every condition except pagination
    pub fn matches(&self, expense: &Expense) -> bool {
        expense.user_id == self.user_id
            && self.category.as_ref().map_or(true, |c| &expense.category == c)
            && self.currency.as_ref().map_or(true, |c| &expense.currency == c)
            && self.from.map_or(true, |from| expense.timestamp >= from)
            && self.until.map_or(true, |until| expense.timestamp < until)
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Store a new user; fails with `Conflict` if the name is taken
    async fn create(&self, user: User) -> Result<User>;

    async fn find_by_name(&self, user_name: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn insert(&self, expense: Expense) -> Result<Expense>;

    /// Fetch an expense owned by `user_id`
    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Expense>>;

    /// Replace an existing expense with the same id and owner.
    /// Returns `None` if there is none.
    async fn update(&self, expense: Expense) -> Result<Option<Expense>>;

    /// Returns whether an expense was removed
    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool>;

    /// Matching expenses ordered by timestamp, then paginated
    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>>;

    /// Sum of amounts per category over all matching expenses
    async fn summarize(&self, filter: &ExpenseFilter) -> Result<BTreeMap<String, f64>>;
}

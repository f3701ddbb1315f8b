use super::{Expense, ExpenseFilter, ExpenseRepository, User, UserRepository};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Users keyed by user name
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<String, User>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User> {
        match self.users.entry(user.user_name.clone()) {
            Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "user name '{}' is already taken",
                user.user_name
            ))),
            Entry::Vacant(slot) => {
                debug!(user_id = %user.user_id, "Stored user");
                Ok(slot.insert(user).clone())
            }
        }
    }

    async fn find_by_name(&self, user_name: &str) -> Result<Option<User>> {
        Ok(self.users.get(user_name).map(|u| u.value().clone()))
    }
}

/// Expenses keyed by id
#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: DashMap<Uuid, Expense>,
}

impl InMemoryExpenseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, filter: &ExpenseFilter) -> Vec<Expense> {
        let mut found: Vec<Expense> = self
            .expenses
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        found
    }
}

#[async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn insert(&self, expense: Expense) -> Result<Expense> {
        self.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Expense>> {
        Ok(self
            .expenses
            .get(&id)
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone()))
    }

    async fn update(&self, expense: Expense) -> Result<Option<Expense>> {
        match self.expenses.get_mut(&expense.id) {
            Some(mut existing) if existing.user_id == expense.user_id => {
                *existing = expense.clone();
                Ok(Some(expense))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool> {
        Ok(self
            .expenses
            .remove_if(&id, |_, e| e.user_id == user_id)
            .is_some())
    }

    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn summarize(&self, filter: &ExpenseFilter) -> Result<BTreeMap<String, f64>> {
        let mut totals = BTreeMap::new();
        for expense in self.matching(filter) {
            *totals.entry(expense.category).or_insert(0.0) += expense.amount;
        }
        Ok(totals)
    }
}

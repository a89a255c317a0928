#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expense_core::adapters::InMemoryStore;
use expense_core::domain::{Expense, ExpenseStatus, NewExpense};
use expense_core::ports::{
    ExpenseRepository, GatewayError, PaymentGateway, PaymentReceipt, RepositoryError,
    RepositoryResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// What the scripted gateway answers for a given amount.
#[derive(Debug, Clone)]
pub enum Reply {
    Success,
    Status(&'static str),
    Duplicate,
    Transport,
    Rejected(u16),
}

/// A payment gateway that answers by amount and records every call.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<HashMap<i64, Reply>>,
    calls: Mutex<Vec<(i64, String)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, amount: i64, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(amount, reply);
        self
    }

    pub fn set_reply(&self, amount: i64, reply: Reply) {
        self.replies.lock().unwrap().insert(amount, reply);
    }

    pub fn calls(&self) -> Vec<(i64, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, amount: i64) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == amount)
            .count()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn settle(&self, amount: i64, token: &str) -> Result<PaymentReceipt, GatewayError> {
        self.calls.lock().unwrap().push((amount, token.to_string()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&amount)
            .cloned()
            .unwrap_or(Reply::Success);

        let receipt = |status: &str| PaymentReceipt {
            provider_id: format!("pay_{}", amount),
            external_id: token.to_string(),
            status: status.to_string(),
            message: None,
        };

        match reply {
            Reply::Success => Ok(receipt("success")),
            Reply::Status(status) => Ok(receipt(status)),
            Reply::Duplicate => Err(GatewayError::DuplicateSubmission(
                "External ID already exists".to_string(),
            )),
            Reply::Transport => Err(GatewayError::Transport("connection reset".to_string())),
            Reply::Rejected(status) => Err(GatewayError::Rejected {
                status,
                message: "rejected".to_string(),
            }),
        }
    }
}

/// Wraps the in-memory store and fails chosen reads and status writes.
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_fetch: AtomicBool,
    failing_writes: Mutex<HashSet<(Uuid, ExpenseStatus)>>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            fail_fetch: AtomicBool::new(false),
            failing_writes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_fetch(self) -> Self {
        self.fail_fetch.store(true, Ordering::SeqCst);
        self
    }

    /// Writes moving `id` to `status` fail with a backend error.
    pub fn fail_write(self, id: Uuid, status: ExpenseStatus) -> Self {
        self.failing_writes.lock().unwrap().insert((id, status));
        self
    }

    fn write_fails(&self, id: Uuid, status: ExpenseStatus) -> bool {
        self.failing_writes.lock().unwrap().contains(&(id, status))
    }
}

fn backend_down() -> RepositoryError {
    RepositoryError::Backend("connection reset".to_string())
}

#[async_trait]
impl ExpenseRepository for FlakyStore {
    async fn create(&self, expense: &NewExpense) -> RepositoryResult<Expense> {
        ExpenseRepository::create(&self.inner, expense).await
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Expense>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_owner(
        &self,
        user_id: Uuid,
        status: Option<ExpenseStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Expense>> {
        self.inner
            .find_by_owner(user_id, status, limit, offset)
            .await
    }

    async fn find_awaiting_approval(&self) -> RepositoryResult<Vec<Expense>> {
        self.inner.find_awaiting_approval().await
    }

    async fn find_by_statuses(&self, statuses: &[ExpenseStatus]) -> RepositoryResult<Vec<Expense>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        self.inner.find_by_statuses(statuses).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        if self.write_fails(id, status) {
            return Err(backend_down());
        }
        self.inner.update_status(id, status, processed_at).await
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: ExpenseStatus,
        status: ExpenseStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool> {
        if self.write_fails(id, status) {
            return Err(backend_down());
        }
        self.inner
            .update_status_if(id, expected, status, processed_at)
            .await
    }
}

pub async fn seed(store: &InMemoryStore, amount: i64) -> Expense {
    ExpenseRepository::create(
        store,
        &NewExpense::classify(Uuid::new_v4(), amount, "seeded".to_string(), None),
    )
    .await
    .unwrap()
}

pub async fn seed_with_status(
    store: &InMemoryStore,
    amount: i64,
    status: ExpenseStatus,
) -> Expense {
    let expense = seed(store, amount).await;
    store.update_status(expense.id, status, None).await.unwrap();
    store.find_by_id(expense.id).await.unwrap().unwrap()
}

pub async fn status_of(store: &InMemoryStore, id: Uuid) -> Expense {
    store.find_by_id(id).await.unwrap().unwrap()
}

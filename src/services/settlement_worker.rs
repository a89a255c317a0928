//! Background settlement of approved expenses through the payment gateway.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Expense, ExpenseStatus};
use crate::ports::{ExpenseRepository, GatewayError, PaymentGateway, PaymentReceipt};

/// Counts for one pass over the settleable expenses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    /// Items another writer moved first, or left untouched after cancellation.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Skipped,
}

#[derive(Clone)]
pub struct SettlementWorker {
    expenses: Arc<dyn ExpenseRepository>,
    gateway: Arc<dyn PaymentGateway>,
    interval: Duration,
}

impl SettlementWorker {
    pub fn new(
        expenses: Arc<dyn ExpenseRepository>,
        gateway: Arc<dyn PaymentGateway>,
        interval: Duration,
    ) -> Self {
        Self {
            expenses,
            gateway,
            interval,
        }
    }

    /// Runs ticks until `cancel` fires. A tick already in progress finishes its
    /// current item; no new gateway call starts after cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Settlement worker started"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.run_tick(&cancel).await;
                    if summary.selected > 0 {
                        info!(
                            selected = summary.selected,
                            completed = summary.completed,
                            failed = summary.failed,
                            skipped = summary.skipped,
                            "Settlement tick finished"
                        );
                    }
                }
            }
        }

        info!("Settlement worker stopped");
    }

    /// One pass: fetch every settleable expense and settle each in fetch order.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> TickSummary {
        let fetched = self
            .expenses
            .find_by_statuses(&ExpenseStatus::SETTLEABLE)
            .await;
        let batch = match fetched {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to fetch settleable expenses: {}", e);
                return TickSummary::default();
            }
        };

        let mut summary = TickSummary {
            selected: batch.len(),
            ..TickSummary::default()
        };
        debug!("Settling {} expense(s)", batch.len());

        for expense in &batch {
            if cancel.is_cancelled() {
                let handled = summary.completed + summary.failed + summary.skipped;
                summary.skipped += batch.len() - handled;
                info!("Cancellation observed, leaving remaining expenses for the next run");
                break;
            }

            match self.settle_one(expense).await {
                Outcome::Completed => summary.completed += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }

        summary
    }

    async fn settle_one(&self, expense: &Expense) -> Outcome {
        // A fresh token per attempt; the provider deduplicates on it.
        let token = Uuid::new_v4().to_string();
        let result = self.gateway.settle(expense.amount, &token).await;

        match classify(&result) {
            Ok(()) => {
                if let Err(e) = &result {
                    info!(
                        expense_id = %expense.id,
                        "Provider reports an earlier submission, treating as settled: {}", e
                    );
                }
                match self
                    .expenses
                    .update_status_if(
                        expense.id,
                        expense.status,
                        ExpenseStatus::Completed,
                        Some(Utc::now()),
                    )
                    .await
                {
                    Ok(true) => {
                        info!(expense_id = %expense.id, amount = expense.amount, "Expense settled");
                        Outcome::Completed
                    }
                    Ok(false) => {
                        warn!(
                            expense_id = %expense.id,
                            "Expense changed status during settlement, skipping"
                        );
                        Outcome::Skipped
                    }
                    Err(e) => {
                        // Payment went through; keep the item out of the next batch.
                        error!(
                            expense_id = %expense.id,
                            "Failed to mark settled expense completed: {}", e
                        );
                        self.mark_failed(expense).await
                    }
                }
            }
            Err(reason) => {
                warn!(
                    expense_id = %expense.id,
                    amount = expense.amount,
                    "Settlement failed: {}", reason
                );
                self.mark_failed(expense).await
            }
        }
    }

    async fn mark_failed(&self, expense: &Expense) -> Outcome {
        match self
            .expenses
            .update_status_if(expense.id, expense.status, ExpenseStatus::Failed, None)
            .await
        {
            Ok(true) => Outcome::Failed,
            Ok(false) => {
                warn!(
                    expense_id = %expense.id,
                    "Expense changed status during settlement, skipping"
                );
                Outcome::Skipped
            }
            Err(e) => {
                error!(expense_id = %expense.id, "Failed to mark expense failed: {}", e);
                Outcome::Failed
            }
        }
    }
}

/// Success and duplicate submission both count as settled.
fn classify(result: &Result<PaymentReceipt, GatewayError>) -> Result<(), String> {
    match result {
        Ok(receipt) if receipt.is_success() => Ok(()),
        Ok(receipt) => Err(format!(
            "provider returned status {}{}",
            receipt.status,
            receipt
                .message
                .as_deref()
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        )),
        Err(e) if e.is_duplicate_submission() => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::NewExpense;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedGateway {
        status: &'static str,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        async fn settle(&self, amount: i64, token: &str) -> Result<PaymentReceipt, GatewayError> {
            self.calls.lock().unwrap().push(token.to_string());
            Ok(PaymentReceipt {
                provider_id: format!("pay-{}", amount),
                external_id: token.to_string(),
                status: self.status.to_string(),
                message: None,
            })
        }
    }

    fn worker(
        store: &InMemoryStore,
        status: &'static str,
    ) -> (SettlementWorker, Arc<FixedGateway>) {
        let gateway = Arc::new(FixedGateway {
            status,
            calls: Mutex::new(Vec::new()),
        });
        let worker = SettlementWorker::new(
            Arc::new(store.clone()),
            gateway.clone(),
            Duration::from_secs(30),
        );
        (worker, gateway)
    }

    #[test]
    fn test_classify_outcomes() {
        let receipt = |status: &str| PaymentReceipt {
            provider_id: "p".to_string(),
            external_id: "e".to_string(),
            status: status.to_string(),
            message: None,
        };

        assert!(classify(&Ok(receipt("success"))).is_ok());
        assert!(classify(&Ok(receipt("pending"))).is_err());
        assert!(classify(&Err(GatewayError::DuplicateSubmission("dup".to_string()))).is_ok());
        assert!(classify(&Err(GatewayError::Transport("timeout".to_string()))).is_err());
        assert!(classify(&Err(GatewayError::CircuitOpen("open".to_string()))).is_err());
    }

    #[tokio::test]
    async fn test_non_success_status_marks_failed() {
        let store = InMemoryStore::new();
        let expense = ExpenseRepository::create(
            &store,
            &NewExpense::classify(Uuid::new_v4(), 50_000, "fuel".to_string(), None),
        )
        .await
        .unwrap();
        let (worker, _) = worker(&store, "pending");

        let summary = worker.run_tick(&CancellationToken::new()).await;

        assert_eq!(summary.failed, 1);
        let stored = store.find_by_id(expense.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpenseStatus::Failed);
        assert!(stored.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_tick_makes_no_calls() {
        let store = InMemoryStore::new();
        ExpenseRepository::create(
            &store,
            &NewExpense::classify(Uuid::new_v4(), 50_000, "fuel".to_string(), None),
        )
        .await
        .unwrap();
        let (worker, gateway) = worker(&store, "success");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = worker.run_tick(&cancel).await;

        assert_eq!(
            summary,
            TickSummary {
                selected: 1,
                completed: 0,
                failed: 0,
                skipped: 1
            }
        );
        assert!(gateway.calls.lock().unwrap().is_empty());
    }
}

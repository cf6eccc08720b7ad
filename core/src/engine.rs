//! The redemption engine: due-subscription batch processor.
//!
//! EXECUTION ORDER (fixed):
//!   1. Open the batch transaction.
//!   2. Select every live subscription with next_redemption_date <= now.
//!   3. For each, strictly in sequence: skip non-chargeable rows, resolve
//!      reference data, run the executor.
//!   4. Commit. A critical executor error instead rolls back the batch.
//!
//! RULES:
//!   - Subscriptions are never processed concurrently within a batch.
//!   - Only critical errors unwind past a single subscription.
//!   - Each executor run sits under a savepoint. A non-critical error
//!     undoes its partial writes and leaves one `failed_redemption` event.
//!   - Counters are folded from per-subscription outcomes, never shared.

use crate::{
    config::{BatchIsolation, EngineConfig},
    error::RedemptionResult,
    event::NewEvent,
    executor::{RedemptionExecutor, RedemptionOutcome},
    model::{RedemptionContext, Subscription},
    retry::{Sleeper, ThreadSleeper},
    rng::JitterRng,
    settlement::SettlementClient,
    store::{Queries, RedemptionStore},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-invocation counts. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Left untouched: completed elsewhere or not chargeable.
    pub skipped: usize,
}

impl BatchResult {
    pub fn record(&mut self, outcome: &RedemptionOutcome) {
        match outcome {
            RedemptionOutcome::Redeemed { .. } | RedemptionOutcome::AlreadyAdvanced => {
                self.succeeded += 1
            }
            RedemptionOutcome::Failed { .. } | RedemptionOutcome::PreviouslyFailed => self.failed += 1,
            RedemptionOutcome::AlreadyCompleted | RedemptionOutcome::Skipped { .. } => {
                self.skipped += 1
            }
        }
    }
}

pub struct RedemptionEngine {
    pub store: RedemptionStore,
    config: EngineConfig,
    client: Box<dyn SettlementClient>,
    sleeper: Box<dyn Sleeper>,
    jitter: JitterRng,
}

impl RedemptionEngine {
    pub fn new(store: RedemptionStore, config: EngineConfig, client: Box<dyn SettlementClient>) -> Self {
        Self {
            jitter: JitterRng::new(config.jitter_seed),
            sleeper: Box::new(ThreadSleeper),
            store,
            config,
            client,
        }
    }

    /// Replace the blocking backoff sleeper.
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one batch at wall-clock time.
    pub fn run_batch_now(&mut self) -> RedemptionResult<BatchResult> {
        self.run_batch(Utc::now())
    }

    /// Select and redeem everything due at `now`.
    pub fn run_batch(&mut self, now: DateTime<Utc>) -> RedemptionResult<BatchResult> {
        let isolation = self.config.isolation;
        let result = match isolation {
            BatchIsolation::SingleTransaction => {
                let Self { store, config, client, sleeper, jitter } = self;
                store.with_transaction(|q| {
                    let due = q.list_due_subscriptions(now)?;
                    let mut executor =
                        RedemptionExecutor::new(&**client, &**sleeper, &config.retry, jitter);
                    redeem_all(q, &mut executor, &due, now)
                })
            }
            BatchIsolation::PerSubscription => {
                let due = self.store.queries().list_due_subscriptions(now)?;
                self.redeem_each(&due, now)
            }
        };
        log_result(&result, now);
        result
    }

    /// Redeem a previously selected due-set. The set may be stale: every
    /// subscription is re-read before anything is charged.
    pub fn redeem_snapshot(&mut self, due: &[Subscription], now: DateTime<Utc>) -> RedemptionResult<BatchResult> {
        let isolation = self.config.isolation;
        let result = match isolation {
            BatchIsolation::SingleTransaction => {
                let Self { store, config, client, sleeper, jitter } = self;
                store.with_transaction(|q| {
                    let mut executor =
                        RedemptionExecutor::new(&**client, &**sleeper, &config.retry, jitter);
                    redeem_all(q, &mut executor, due, now)
                })
            }
            BatchIsolation::PerSubscription => self.redeem_each(due, now),
        };
        log_result(&result, now);
        result
    }

    /// One transaction per subscription. A critical failure rolls back the
    /// failing subscription only and stops the batch.
    fn redeem_each(&mut self, due: &[Subscription], now: DateTime<Utc>) -> RedemptionResult<BatchResult> {
        let Self { store, config, client, sleeper, jitter } = self;
        let mut executor = RedemptionExecutor::new(&**client, &**sleeper, &config.retry, jitter);
        let mut result = BatchResult { found: due.len(), ..BatchResult::default() };
        for sub in due {
            let outcome = store.with_transaction(|q| redeem_one(q, &mut executor, sub, now))?;
            result.record(&outcome);
        }
        Ok(result)
    }
}

fn redeem_all(
    q: &Queries<'_>,
    executor: &mut RedemptionExecutor<'_>,
    due: &[Subscription],
    now: DateTime<Utc>,
) -> RedemptionResult<BatchResult> {
    let mut result = BatchResult { found: due.len(), ..BatchResult::default() };
    for sub in due {
        let outcome = redeem_one(q, executor, sub, now)?;
        result.record(&outcome);
    }
    Ok(result)
}

/// Process one selected subscription. Only critical errors escape.
fn redeem_one(
    q: &Queries<'_>,
    executor: &mut RedemptionExecutor<'_>,
    sub: &Subscription,
    now: DateTime<Utc>,
) -> RedemptionResult<RedemptionOutcome> {
    if !sub.status.is_redeemable() {
        log::debug!("subscription={} skipped: status {}", sub.id, sub.status);
        return Ok(RedemptionOutcome::Skipped { status: sub.status });
    }

    let ctx = match resolve_context(q, sub) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::warn!("subscription={} reference data: {e}", sub.id);
            return Ok(RedemptionOutcome::Failed { reason: e.to_string() });
        }
    };

    // A failed redemption leaves none of its partial writes behind.
    match q.with_savepoint("redeem_subscription", |q| executor.execute(q, sub, &ctx, now)) {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_critical() => {
            log::error!("{e}; aborting batch");
            Err(e)
        }
        Err(e) => {
            let reason = e.to_string();
            log::error!("subscription={} redemption error: {reason}", sub.id);
            let event = NewEvent::failed_redemption(&sub.id, ctx.price.unit_amount, now, &reason, 0, None);
            if let Err(write_err) = q.append_event(&event) {
                log::error!("subscription={} failure event not written: {write_err}", sub.id);
            }
            Ok(RedemptionOutcome::Failed { reason })
        }
    }
}

/// Load everything a redemption needs for `sub` through the same handle.
pub fn resolve_context(q: &Queries<'_>, sub: &Subscription) -> RedemptionResult<RedemptionContext> {
    let price = q.get_price(&sub.price_id)?;
    let product = q.get_product(&sub.product_id)?;
    let product_token = q.get_product_token(&sub.product_token_id)?;
    let token = q.get_token(&product_token.token_id)?;
    let network = q.get_network(&product_token.network_id)?;
    let merchant_wallet = q.get_wallet(&product.wallet_id)?;
    let delegation = q.get_delegation(&sub.delegation_id)?;
    Ok(RedemptionContext {
        price,
        product,
        product_token,
        token,
        network,
        merchant_wallet,
        delegation,
    })
}

fn log_result(result: &RedemptionResult<BatchResult>, now: DateTime<Utc>) {
    match result {
        Ok(r) if r.found == 0 => log::debug!("batch at {now}: nothing due"),
        Ok(r) => log::info!(
            "batch at {now}: found={} succeeded={} failed={} skipped={}",
            r.found, r.succeeded, r.failed, r.skipped
        ),
        Err(e) => log::error!("batch at {now} aborted: {e}"),
    }
}

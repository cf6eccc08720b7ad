//! Redemption attempt executor: one subscription, one billing period.
//!
//! Order of operations (fixed):
//!   1. Re-read the subscription through the batch's query handle.
//!   2. Idempotency guards; none of them call the settlement client.
//!   3. Final-payment check from the re-read counters.
//!   4. Next due date from the price, then serialize the delegation. A
//!      recurring price without an interval fails here, before any charge.
//!   5. Settlement attempts with jittered exponential backoff.
//!   6. On success: advance state, write and verify the `redeemed` event,
//!      then `completed` if the term is done. Failures here are critical.
//!   7. On failure: mark the final payment overdue, write `failed_redemption`.

use crate::{
    error::{RedemptionError, RedemptionResult},
    event::{EventLog, NewEvent},
    interval,
    model::{Price, RedemptionContext, Subscription},
    retry::{RetryPolicy, Sleeper},
    rng::JitterRng,
    settlement::{ExecutionParams, SettlementClient, SettlementError, SettlementErrorKind},
    store::Queries,
    types::{PriceType, SubscriptionStatus, TransactionId},
};
use chrono::{DateTime, Utc};

/// What happened to one subscription in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionOutcome {
    /// Charged. `completed` is set when this charge ended the term.
    Redeemed { transaction_id: TransactionId, completed: bool },
    /// Another run already advanced the next redemption date past `now`.
    AlreadyAdvanced,
    /// Another run already completed the subscription.
    AlreadyCompleted,
    /// The subscription is in the failed state.
    PreviouslyFailed,
    /// Not in a chargeable state; left alone.
    Skipped { status: SubscriptionStatus },
    /// This run could not charge it. A `failed_redemption` event exists
    /// unless reference data could not be resolved.
    Failed { reason: String },
}

/// Result of the settlement attempt loop.
struct Settlement {
    result: Result<TransactionId, SettlementError>,
    attempts: u32,
}

pub struct RedemptionExecutor<'a> {
    client: &'a dyn SettlementClient,
    sleeper: &'a dyn Sleeper,
    policy: &'a RetryPolicy,
    jitter: &'a mut JitterRng,
}

impl<'a> RedemptionExecutor<'a> {
    pub fn new(
        client: &'a dyn SettlementClient,
        sleeper: &'a dyn Sleeper,
        policy: &'a RetryPolicy,
        jitter: &'a mut JitterRng,
    ) -> Self {
        Self { client, sleeper, policy, jitter }
    }

    /// Redeem one subscription. `snapshot` is the row as selected by the
    /// batch and may be stale; only its id is trusted.
    ///
    /// Returns `Err` for storage errors before any funds moved and for
    /// critical bookkeeping failures after they did
    /// (see [`RedemptionError::is_critical`]).
    pub fn execute(
        &mut self,
        q: &Queries<'_>,
        snapshot: &Subscription,
        ctx: &RedemptionContext,
        now: DateTime<Utc>,
    ) -> RedemptionResult<RedemptionOutcome> {
        let sub = q.get_subscription(&snapshot.id)?;

        if let Some(outcome) = idempotency_guard(&sub, now) {
            log::debug!("subscription={} guard: {:?}", sub.id, outcome);
            return Ok(outcome);
        }

        let final_payment = ctx.price.is_final_payment(sub.total_redemptions);
        let amount = ctx.price.unit_amount;
        let events = EventLog::new(q);

        let next = match next_redemption_date(&ctx.price, now) {
            Ok(next) => next,
            Err(e) => {
                let reason = e.to_string();
                log::error!("subscription={} {reason}", sub.id);
                events.append(&NewEvent::failed_redemption(&sub.id, amount, now, &reason, 0, None))?;
                return Ok(RedemptionOutcome::Failed { reason });
            }
        };

        let payload = match ctx.delegation.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                let reason = e.to_string();
                log::error!("subscription={} {reason}", sub.id);
                events.append(&NewEvent::failed_redemption(&sub.id, amount, now, &reason, 0, None))?;
                return Ok(RedemptionOutcome::Failed { reason });
            }
        };

        let params = ExecutionParams {
            merchant_address: ctx.merchant_wallet.address.clone(),
            token_contract: ctx.token.contract_address.clone(),
            token_amount: amount,
            token_decimals: ctx.token.decimals,
            chain_id: ctx.network.chain_id,
            network_name: ctx.network.name.clone(),
        };

        let settlement = self.settle(&sub.id, &payload, &params);
        match settlement.result {
            Ok(tx) => self.record_success(q, &sub, ctx, now, next, &tx, settlement.attempts, final_payment),
            Err(err) => {
                record_failure(q, &sub, amount, now, &err, settlement.attempts, final_payment)
            }
        }
    }

    fn settle(&mut self, sub_id: &str, payload: &[u8], params: &ExecutionParams) -> Settlement {
        let max = self.policy.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..max {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt, self.jitter);
                log::warn!(
                    "subscription={sub_id} retrying settlement in {:.2}s (attempt {}/{max})",
                    delay.as_secs_f64(),
                    attempt + 1,
                );
                self.sleeper.sleep(delay);
            }

            match self.client.redeem(payload, params) {
                Ok(tx) => {
                    return Settlement { result: Ok(tx), attempts: attempt + 1 };
                }
                Err(e) if e.is_permanent() => {
                    log::warn!("subscription={sub_id} permanent settlement error: {e}");
                    return Settlement { result: Err(e), attempts: attempt + 1 };
                }
                Err(e) => {
                    log::warn!(
                        "subscription={sub_id} transient settlement error (attempt {}/{max}): {e}",
                        attempt + 1,
                    );
                    last_err = Some(e);
                }
            }
        }

        Settlement {
            result: Err(last_err.unwrap_or_else(|| {
                SettlementError::new(SettlementErrorKind::Unavailable, "no settlement attempt made")
            })),
            attempts: max,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_success(
        &self,
        q: &Queries<'_>,
        sub: &Subscription,
        ctx: &RedemptionContext,
        now: DateTime<Utc>,
        next: Option<DateTime<Utc>>,
        tx: &str,
        attempts: u32,
        final_payment: bool,
    ) -> RedemptionResult<RedemptionOutcome> {
        let amount = ctx.price.unit_amount;
        let events = EventLog::new(q);

        let touched = q
            .increment_redemption(&sub.id, amount, next, now)
            .map_err(|e| RedemptionError::critical(&sub.id, format!("incrementing after tx {tx}: {e}")))?;
        if touched != 1 {
            return Err(RedemptionError::critical(
                &sub.id,
                format!("increment after tx {tx} touched {touched} rows"),
            ));
        }

        if final_payment {
            let touched = q
                .complete_subscription(&sub.id, now)
                .map_err(|e| RedemptionError::critical(&sub.id, format!("completing after tx {tx}: {e}")))?;
            if touched != 1 {
                return Err(RedemptionError::critical(
                    &sub.id,
                    format!("completion after tx {tx} touched {touched} rows"),
                ));
            }
        }

        events.append_and_verify(&NewEvent::redeemed(&sub.id, tx, amount, now, attempts, final_payment))?;

        if final_payment {
            events.append_and_verify(&NewEvent::completed(&sub.id, now, sub.total_redemptions + 1))?;
            log::info!(
                "subscription={} redeemed {amount} tx={tx}; term complete after {} charges",
                sub.id,
                sub.total_redemptions + 1
            );
        } else {
            log::info!(
                "subscription={} redeemed {amount} tx={tx}; next redemption {}",
                sub.id,
                next.map(|d| d.to_rfc3339()).unwrap_or_else(|| "none".into())
            );
        }

        Ok(RedemptionOutcome::Redeemed { transaction_id: tx.to_string(), completed: final_payment })
    }
}

/// Next due date after a charge at `now`; `None` for one-off prices.
fn next_redemption_date(price: &Price, now: DateTime<Utc>) -> RedemptionResult<Option<DateTime<Utc>>> {
    match (price.price_type, &price.interval_type) {
        (PriceType::OneOff, _) => Ok(None),
        (PriceType::Recurring, Some(interval_type)) => Ok(Some(interval::next_redemption(interval_type, now))),
        (PriceType::Recurring, None) => Err(RedemptionError::Config(format!(
            "price {} is recurring but has no interval type",
            price.id
        ))),
    }
}

/// Short-circuit checks against the freshly re-read row, in order.
fn idempotency_guard(sub: &Subscription, now: DateTime<Utc>) -> Option<RedemptionOutcome> {
    match sub.status {
        SubscriptionStatus::Completed => return Some(RedemptionOutcome::AlreadyCompleted),
        SubscriptionStatus::Failed => return Some(RedemptionOutcome::PreviouslyFailed),
        _ => {}
    }
    if sub.next_redemption_date.is_some_and(|next| next > now) {
        return Some(RedemptionOutcome::AlreadyAdvanced);
    }
    if !sub.status.is_redeemable() {
        return Some(RedemptionOutcome::Skipped { status: sub.status });
    }
    None
}

fn record_failure(
    q: &Queries<'_>,
    sub: &Subscription,
    amount: i64,
    now: DateTime<Utc>,
    err: &SettlementError,
    attempts: u32,
    final_payment: bool,
) -> RedemptionResult<RedemptionOutcome> {
    // Next redemption date is left as is: the subscription stays due until
    // someone intervenes.
    if final_payment {
        q.update_status(&sub.id, SubscriptionStatus::Overdue, now)?;
    }
    let reason = format!(
        "{} (after {attempts} attempt(s))",
        RedemptionError::Settlement(err.clone())
    );
    q.append_event(&NewEvent::failed_redemption(&sub.id, amount, now, &reason, attempts, Some(err)))?;
    log::warn!("subscription={} {reason}", sub.id);
    Ok(RedemptionOutcome::Failed { reason })
}

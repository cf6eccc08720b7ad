//! Settlement failures: permanent errors stop at once, transient errors
//! are retried with jittered exponential backoff.

mod common;

use common::*;
use redemption_core::types::{EventType, SubscriptionStatus};
use std::time::Duration;

#[test]
fn insufficient_funds_is_not_retried() {
    let store = store();
    insert(&store, &subscription("sub-broke", MONTHLY_UNBOUNDED));

    let client = ScriptedClient::failing("execution reverted: ERC20: insufficient funds");
    let (mut engine, sleeper) = engine(store, &client);
    let result = engine.run_batch(now()).unwrap();

    assert_eq!(client.calls(), 1);
    assert!(sleeper.delays().is_empty());
    assert_eq!(result.failed, 1);

    let trail = events(&engine, "sub-broke");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].event_type, EventType::FailedRedemption);
    assert_eq!(trail[0].metadata["error_kind"], "insufficient_funds");
    assert_eq!(trail[0].metadata["permanent"], true);
    assert!(trail[0].error_message.as_deref().unwrap().contains("insufficient funds"));
}

#[test]
fn transient_errors_exhaust_three_attempts() {
    let store = store();
    let mut sub = subscription("sub-flaky", WEEKLY_TERM_3);
    sub.total_redemptions = 2;
    insert(&store, &sub);
    let due_before = sub.next_redemption_date;

    let client = ScriptedClient::failing("upstream connect error");
    let (mut engine, sleeper) = engine(store, &client);
    let result = engine.run_batch(now()).unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(result.failed, 1);

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 2, "backoff only before attempts after the first");
    assert!(delays[0] < delays[1], "backoff must grow: {delays:?}");
    assert!(delays[0] >= Duration::from_millis(1_600) && delays[0] <= Duration::from_millis(2_400));
    assert!(delays[1] >= Duration::from_millis(3_200) && delays[1] <= Duration::from_millis(4_800));
    assert!(delays.iter().all(|d| *d <= Duration::from_secs(12)));

    // Final payment failed: overdue, still due, counters untouched.
    let after = reload(&engine, "sub-flaky");
    assert_eq!(after.status, SubscriptionStatus::Overdue);
    assert_eq!(after.next_redemption_date, due_before);
    assert_eq!(after.total_redemptions, 2);

    let trail = events(&engine, "sub-flaky");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].event_type, EventType::FailedRedemption);
    assert_eq!(trail[0].metadata["attempts"], 3);
    assert_eq!(trail[0].metadata["permanent"], false);
}

#[test]
fn non_final_failure_keeps_status() {
    let store = store();
    insert(&store, &subscription("sub-monthly", MONTHLY_UNBOUNDED));

    let client = ScriptedClient::failing("invalid signature");
    let (mut engine, _) = engine(store, &client);
    engine.run_batch(now()).unwrap();

    let after = reload(&engine, "sub-monthly");
    assert_eq!(after.status, SubscriptionStatus::Active);
    assert_eq!(after.total_redemptions, 0);
}

#[test]
fn nonce_collision_is_retried_until_success() {
    let store = store();
    insert(&store, &subscription("sub-nonce", MONTHLY_UNBOUNDED));

    let client = ScriptedClient::scripted(
        vec![Err("nonce too low"), Err("nonce too low")],
        "0xfinally",
    );
    let (mut engine, sleeper) = engine(store, &client);
    let result = engine.run_batch(now()).unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(client.calls(), 3);
    assert_eq!(sleeper.delays().len(), 2);
    let trail = events(&engine, "sub-nonce");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].transaction_id.as_deref(), Some("0xfinally"));
}

#[test]
fn permanent_error_after_transient_stops_early() {
    let store = store();
    insert(&store, &subscription("sub-mixed", MONTHLY_UNBOUNDED));

    let client = ScriptedClient::scripted(
        vec![Err("503 service unavailable"), Err("delegation expired")],
        "0xnever",
    );
    let (mut engine, sleeper) = engine(store, &client);
    engine.run_batch(now()).unwrap();

    assert_eq!(client.calls(), 2);
    assert_eq!(sleeper.delays().len(), 1);
    let trail = events(&engine, "sub-mixed");
    assert_eq!(trail[0].metadata["error_kind"], "delegation_expired");
}

#[test]
fn overdue_subscription_that_recovers_stays_chargeable() {
    let store = store();
    let mut sub = subscription("sub-late", MONTHLY_UNBOUNDED);
    sub.status = SubscriptionStatus::Overdue;
    insert(&store, &sub);

    let client = ScriptedClient::succeeding("0xlate");
    let (mut engine, _) = engine(store, &client);
    let result = engine.run_batch(now()).unwrap();

    assert_eq!(result.succeeded, 1);
    let after = reload(&engine, "sub-late");
    assert_eq!(after.total_redemptions, 1);
    assert!(after.next_redemption_date.unwrap() > now());
}

//! The subscription event log: append-only audit trail of redemptions.
//!
//! RULE: Events are never updated or deleted.
//! Each successful charge writes exactly one `redeemed` event carrying the
//! transaction id; the charge that ends a term adds one `completed` event
//! with no transaction id and a zero amount.

use crate::{
    error::{RedemptionError, RedemptionResult},
    settlement::SettlementError,
    store::Queries,
    types::{Amount, EntityId, EventType, TransactionId},
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// An event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub subscription_id: EntityId,
    pub event_type: EventType,
    pub transaction_id: Option<TransactionId>,
    pub amount: Amount,
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl NewEvent {
    pub fn created(subscription_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            event_type: EventType::Created,
            transaction_id: None,
            amount: 0,
            error_message: None,
            occurred_at: at,
            metadata: json!({}),
        }
    }

    pub fn redeemed(
        subscription_id: &str,
        transaction_id: &str,
        amount: Amount,
        at: DateTime<Utc>,
        attempts: u32,
        final_payment: bool,
    ) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            event_type: EventType::Redeemed,
            transaction_id: Some(transaction_id.to_string()),
            amount,
            error_message: None,
            occurred_at: at,
            metadata: json!({ "attempts": attempts, "final_payment": final_payment }),
        }
    }

    /// A failed charge. `settlement` carries the classified backend error
    /// when the failure came from the settlement client.
    pub fn failed_redemption(
        subscription_id: &str,
        amount: Amount,
        at: DateTime<Utc>,
        error: &str,
        attempts: u32,
        settlement: Option<&SettlementError>,
    ) -> Self {
        let mut metadata = json!({ "attempts": attempts });
        if let Some(err) = settlement {
            metadata["error_kind"] = json!(err.kind.as_str());
            metadata["permanent"] = json!(err.is_permanent());
        }
        Self {
            subscription_id: subscription_id.to_string(),
            event_type: EventType::FailedRedemption,
            transaction_id: None,
            amount,
            error_message: Some(error.to_string()),
            occurred_at: at,
            metadata,
        }
    }

    pub fn completed(subscription_id: &str, at: DateTime<Utc>, total_redemptions: i64) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            event_type: EventType::Completed,
            transaction_id: None,
            amount: 0,
            error_message: None,
            occurred_at: at,
            metadata: json!({ "total_redemptions": total_redemptions }),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata[key] = value;
        self
    }
}

/// Writer over a query handle.
pub struct EventLog<'q, 'c> {
    queries: &'q Queries<'c>,
}

impl<'q, 'c> EventLog<'q, 'c> {
    pub fn new(queries: &'q Queries<'c>) -> Self {
        Self { queries }
    }

    pub fn append(&self, event: &NewEvent) -> RedemptionResult<i64> {
        self.queries.append_event(event)
    }

    /// Append, then read the latest event back and check that it is the one
    /// just written (same type and transaction id). Any write or read error,
    /// or a mismatch, is critical: the charge it records has already moved
    /// funds.
    pub fn append_and_verify(&self, event: &NewEvent) -> RedemptionResult<i64> {
        let sub = &event.subscription_id;
        let id = self
            .queries
            .append_event(event)
            .map_err(|e| RedemptionError::critical(sub, format!("writing {} event: {e}", event.event_type)))?;

        let latest = self
            .queries
            .latest_event(sub)
            .map_err(|e| RedemptionError::critical(sub, format!("reading back {} event: {e}", event.event_type)))?
            .ok_or_else(|| RedemptionError::critical(sub, "event log empty after write"))?;

        if latest.event_type != event.event_type || latest.transaction_id != event.transaction_id {
            return Err(RedemptionError::critical(
                sub,
                format!(
                    "event validation mismatch: wrote {} tx={:?}, latest is {} tx={:?}",
                    event.event_type, event.transaction_id, latest.event_type, latest.transaction_id
                ),
            ));
        }
        Ok(id)
    }
}

use super::{to_ts, ts_at, Queries};
use crate::{error::RedemptionResult, event::NewEvent, model::SubscriptionEvent};
use rusqlite::{params, OptionalExtension, Row};

const EVENT_COLUMNS: &str =
    "id, subscription_id, event_type, transaction_id, amount, error_message, occurred_at, metadata";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionEvent> {
    let metadata: String = row.get(7)?;
    Ok(SubscriptionEvent {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        event_type: row.get(2)?,
        transaction_id: row.get(3)?,
        amount: row.get(4)?,
        error_message: row.get(5)?,
        occurred_at: ts_at(row, 6)?,
        // Metadata is informational; an unreadable blob must not hide the event.
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

impl Queries<'_> {
    // ── Event log ──────────────────────────────────────────────

    /// Append one immutable event. Returns its row id.
    pub fn append_event(&self, event: &NewEvent) -> RedemptionResult<i64> {
        self.conn.execute(
            "INSERT INTO subscription_event (
                subscription_id, event_type, transaction_id, amount,
                error_message, occurred_at, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.subscription_id,
                event.event_type,
                event.transaction_id,
                event.amount,
                event.error_message,
                to_ts(event.occurred_at),
                serde_json::to_string(&event.metadata)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recently appended event for a subscription.
    pub fn latest_event(&self, subscription_id: &str) -> RedemptionResult<Option<SubscriptionEvent>> {
        let event = self
            .conn
            .query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM subscription_event
                     WHERE subscription_id = ?1
                     ORDER BY id DESC LIMIT 1"
                ),
                params![subscription_id],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    /// Full trail for a subscription in append order.
    pub fn events_for_subscription(&self, subscription_id: &str) -> RedemptionResult<Vec<SubscriptionEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM subscription_event
             WHERE subscription_id = ?1
             ORDER BY id ASC"
        ))?;
        let events = stmt
            .query_map(params![subscription_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

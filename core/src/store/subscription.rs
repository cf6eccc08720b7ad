use super::{opt_ts_at, to_ts, ts_at, Queries};
use crate::{
    error::{RedemptionError, RedemptionResult},
    model::Subscription,
    types::{Amount, SubscriptionStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const SUBSCRIPTION_COLUMNS: &str =
    "id, workspace_id, customer_id, product_id, price_id, product_token_id, delegation_id,
     customer_wallet_id, status, current_period_start, current_period_end,
     next_redemption_date, total_redemptions, total_amount_collected";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        customer_id: row.get(2)?,
        product_id: row.get(3)?,
        price_id: row.get(4)?,
        product_token_id: row.get(5)?,
        delegation_id: row.get(6)?,
        customer_wallet_id: row.get(7)?,
        status: row.get(8)?,
        current_period_start: ts_at(row, 9)?,
        current_period_end: ts_at(row, 10)?,
        next_redemption_date: opt_ts_at(row, 11)?,
        total_redemptions: row.get(12)?,
        total_amount_collected: row.get(13)?,
    })
}

impl Queries<'_> {
    // ── Subscription ──────────────────────────────────────────────

    pub fn insert_subscription(&self, s: &Subscription, created_at: DateTime<Utc>) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO subscription (
                id, workspace_id, customer_id, product_id, price_id, product_token_id,
                delegation_id, customer_wallet_id, status, current_period_start,
                current_period_end, next_redemption_date, total_redemptions,
                total_amount_collected, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
            params![
                s.id,
                s.workspace_id,
                s.customer_id,
                s.product_id,
                s.price_id,
                s.product_token_id,
                s.delegation_id,
                s.customer_wallet_id,
                s.status,
                to_ts(s.current_period_start),
                to_ts(s.current_period_end),
                s.next_redemption_date.map(to_ts),
                s.total_redemptions,
                s.total_amount_collected,
                to_ts(created_at),
            ],
        )?;
        Ok(())
    }

    /// Every live subscription whose next redemption is at or before `before`,
    /// oldest due first.
    pub fn list_due_subscriptions(&self, before: DateTime<Utc>) -> RedemptionResult<Vec<Subscription>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS}
             FROM subscription
             WHERE next_redemption_date IS NOT NULL
               AND next_redemption_date <= ?1
               AND deleted_at IS NULL
             ORDER BY next_redemption_date ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![to_ts(before)], subscription_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_subscription(&self, id: &str) -> RedemptionResult<Subscription> {
        self.conn
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE id = ?1"),
                params![id],
                subscription_from_row,
            )
            .optional()?
            .ok_or_else(|| RedemptionError::NotFound {
                entity: "subscription",
                id: id.to_string(),
            })
    }

    /// Record one successful charge: bump the counters and move the next
    /// redemption date. Returns the number of rows touched (0 or 1).
    pub fn increment_redemption(
        &self,
        id: &str,
        amount: Amount,
        next_redemption_date: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> RedemptionResult<usize> {
        let n = self.conn.execute(
            "UPDATE subscription
             SET total_redemptions = total_redemptions + 1,
                 total_amount_collected = total_amount_collected + ?1,
                 next_redemption_date = ?2,
                 updated_at = ?3
             WHERE id = ?4",
            params![amount, next_redemption_date.map(to_ts), to_ts(at), id],
        )?;
        Ok(n)
    }

    /// Terminal transition after the final charge of a term.
    pub fn complete_subscription(&self, id: &str, at: DateTime<Utc>) -> RedemptionResult<usize> {
        let n = self.conn.execute(
            "UPDATE subscription
             SET status = ?1, next_redemption_date = NULL, updated_at = ?2
             WHERE id = ?3",
            params![SubscriptionStatus::Completed, to_ts(at), id],
        )?;
        Ok(n)
    }

    /// Status-only transition. Leaves next_redemption_date untouched.
    pub fn update_status(
        &self,
        id: &str,
        status: SubscriptionStatus,
        at: DateTime<Utc>,
    ) -> RedemptionResult<usize> {
        let n = self.conn.execute(
            "UPDATE subscription SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, to_ts(at), id],
        )?;
        Ok(n)
    }

    pub fn subscription_count_by_status(&self, status: SubscriptionStatus) -> RedemptionResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM subscription WHERE status = ?1 AND deleted_at IS NULL",
            params![status],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

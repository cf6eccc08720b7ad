//! Interval calculator: pure date arithmetic for billing periods.
//!
//! Unrecognised interval types fall back to one calendar month. The fallback
//! is logged, never an error: a price with a typo in its interval still gets
//! billed on a sane cadence.

use chrono::{DateTime, Duration, Months, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntervalType {
    /// Test cadence.
    OneMinute,
    /// Test cadence.
    FiveMinutes,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Other(String),
}

impl IntervalType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OneMinute   => "1min",
            Self::FiveMinutes => "5mins",
            Self::Daily       => "daily",
            Self::Weekly      => "weekly",
            Self::Monthly     => "monthly",
            Self::Quarterly   => "quarterly",
            Self::Yearly      => "yearly",
            Self::Other(s)    => s,
        }
    }
}

impl From<&str> for IntervalType {
    fn from(s: &str) -> Self {
        match s {
            "1min"                 => Self::OneMinute,
            "5mins" | "5min"       => Self::FiveMinutes,
            "daily" | "day"        => Self::Daily,
            "weekly" | "week"      => Self::Weekly,
            "monthly" | "month"    => Self::Monthly,
            "quarterly" | "quarter" => Self::Quarterly,
            "yearly" | "year"      => Self::Yearly,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for IntervalType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<IntervalType> for String {
    fn from(i: IntervalType) -> Self {
        i.as_str().to_string()
    }
}

impl fmt::Display for IntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for IntervalType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for IntervalType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(Self::from(value.as_str()?))
    }
}

/// The next redemption date: one interval after `from`.
pub fn next_redemption(interval: &IntervalType, from: DateTime<Utc>) -> DateTime<Utc> {
    add_intervals(interval, from, 1)
}

/// End of a term of `term_length` intervals starting at `start`.
pub fn period_end(start: DateTime<Utc>, interval: &IntervalType, term_length: u32) -> DateTime<Utc> {
    add_intervals(interval, start, term_length)
}

fn add_intervals(interval: &IntervalType, from: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    let added = match interval {
        IntervalType::OneMinute   => from.checked_add_signed(Duration::minutes(i64::from(n))),
        IntervalType::FiveMinutes => from.checked_add_signed(Duration::minutes(5 * i64::from(n))),
        IntervalType::Daily       => from.checked_add_signed(Duration::days(i64::from(n))),
        IntervalType::Weekly      => from.checked_add_signed(Duration::weeks(i64::from(n))),
        IntervalType::Monthly     => from.checked_add_months(Months::new(n)),
        IntervalType::Quarterly   => n.checked_mul(3).and_then(|m| from.checked_add_months(Months::new(m))),
        IntervalType::Yearly      => n.checked_mul(12).and_then(|m| from.checked_add_months(Months::new(m))),
        IntervalType::Other(raw) => {
            log::warn!("unknown interval type '{raw}', defaulting to monthly");
            from.checked_add_months(Months::new(n))
        }
    };
    added.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

//! Shared primitive types used across the engine.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable, unique identifier for any stored entity.
pub type EntityId = String;

/// On-chain transaction identifier returned by the settlement client.
pub type TransactionId = String;

/// Amounts are integer minor units (cents for fiat-pegged tokens).
pub type Amount = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Overdue,
    Suspended,
    Canceled,
    Expired,
    Failed,
    Completed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active    => "active",
            Self::Overdue   => "overdue",
            Self::Suspended => "suspended",
            Self::Canceled  => "canceled",
            Self::Expired   => "expired",
            Self::Failed    => "failed",
            Self::Completed => "completed",
        }
    }

    /// Only active and overdue subscriptions carry a next redemption date
    /// and are eligible for a charge.
    pub fn is_redeemable(&self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active"    => Ok(Self::Active),
            "overdue"   => Ok(Self::Overdue),
            "suspended" => Ok(Self::Suspended),
            "canceled"  => Ok(Self::Canceled),
            "expired"   => Ok(Self::Expired),
            "failed"    => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown subscription status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Recurring,
    OneOff,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::OneOff    => "one_off",
        }
    }
}

impl FromStr for PriceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recurring" => Ok(Self::Recurring),
            "one_off"   => Ok(Self::OneOff),
            other => Err(format!("unknown price type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Redeemed,
    FailedRedemption,
    Completed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created          => "created",
            Self::Redeemed         => "redeemed",
            Self::FailedRedemption => "failed_redemption",
            Self::Completed        => "completed",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created"           => Ok(Self::Created),
            "redeemed"          => Ok(Self::Redeemed),
            "failed_redemption" => Ok(Self::FailedRedemption),
            "completed"         => Ok(Self::Completed),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

macro_rules! text_enum_sql {
    ($($ty:ty),+) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    )+};
}

text_enum_sql!(SubscriptionStatus, PriceType, EventType);

//! Read models for the rows the engine works with.

use crate::{
    interval::IntervalType,
    types::{Amount, EntityId, EventType, PriceType, SubscriptionStatus, TransactionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: EntityId,
    pub workspace_id: EntityId,
    pub customer_id: EntityId,
    pub product_id: EntityId,
    pub price_id: EntityId,
    pub product_token_id: EntityId,
    pub delegation_id: EntityId,
    pub customer_wallet_id: Option<EntityId>,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub next_redemption_date: Option<DateTime<Utc>>,
    pub total_redemptions: i64,
    pub total_amount_collected: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: EntityId,
    pub product_id: EntityId,
    pub price_type: PriceType,
    pub interval_type: Option<IntervalType>,
    /// Number of charges that complete the subscription. 0 = unbounded.
    pub term_length: u32,
    pub unit_amount: Amount,
    pub currency: String,
}

impl Price {
    /// Whether the charge following `total_redemptions` prior charges is the
    /// last one of the term.
    pub fn is_final_payment(&self, total_redemptions: i64) -> bool {
        match self.price_type {
            PriceType::OneOff => total_redemptions + 1 >= 1,
            PriceType::Recurring if self.term_length > 0 => {
                total_redemptions + 1 >= i64::from(self.term_length)
            }
            PriceType::Recurring => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    pub workspace_id: EntityId,
    /// Merchant wallet that receives redeemed funds.
    pub wallet_id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductToken {
    pub id: EntityId,
    pub product_id: EntityId,
    pub token_id: EntityId,
    pub network_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: EntityId,
    pub network_id: EntityId,
    pub symbol: String,
    pub contract_address: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: EntityId,
    pub name: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: EntityId,
    pub workspace_id: EntityId,
    pub address: String,
}

/// A stored, signed authorization to move funds on the delegator's behalf.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationDatum {
    pub id: EntityId,
    pub delegate: String,
    pub delegator: String,
    pub authority: String,
    /// Raw JSON array of caveats as received at subscribe time.
    pub caveats: String,
    pub salt: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub id: i64,
    pub subscription_id: EntityId,
    pub event_type: EventType,
    pub transaction_id: Option<TransactionId>,
    pub amount: Amount,
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Everything a single redemption needs besides the subscription itself.
#[derive(Debug, Clone)]
pub struct RedemptionContext {
    pub price: Price,
    pub product: Product,
    pub product_token: ProductToken,
    pub token: Token,
    pub network: Network,
    pub merchant_wallet: Wallet,
    pub delegation: DelegationDatum,
}

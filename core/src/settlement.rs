//! Settlement client boundary: the synchronous, irreversible on-chain call.
//!
//! The engine consumes this trait; it never implements the wire protocol.
//! Errors are structured: adapters that only get free text back from their
//! backend build a [`SettlementError`] with [`SettlementError::from_message`],
//! which applies the substring classification once, at the boundary.

use crate::types::TransactionId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Parameters for one delegated transfer to the merchant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionParams {
    pub merchant_address: String,
    pub token_contract: String,
    /// Amount in the price's minor units.
    pub token_amount: i64,
    pub token_decimals: u8,
    pub chain_id: u64,
    pub network_name: String,
}

pub trait SettlementClient: Send + Sync {
    /// Submit a serialized signed delegation for execution.
    /// Blocks until the backend answers; at most one call per attempt.
    fn redeem(
        &self,
        delegation: &[u8],
        params: &ExecutionParams,
    ) -> Result<TransactionId, SettlementError>;
}

impl<T: SettlementClient + ?Sized> SettlementClient for Arc<T> {
    fn redeem(
        &self,
        delegation: &[u8],
        params: &ExecutionParams,
    ) -> Result<TransactionId, SettlementError> {
        (**self).redeem(delegation, params)
    }
}

impl<T: SettlementClient + ?Sized> SettlementClient for Box<T> {
    fn redeem(
        &self,
        delegation: &[u8],
        params: &ExecutionParams,
    ) -> Result<TransactionId, SettlementError> {
        (**self).redeem(delegation, params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementErrorKind {
    // Permanent: retrying cannot succeed.
    InvalidSignature,
    DelegationExpired,
    MalformedDelegation,
    InvalidToken,
    Unauthorized,
    InsufficientFunds,
    // Transient.
    NonceCollision,
    Unavailable,
}

impl SettlementErrorKind {
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::NonceCollision | Self::Unavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSignature    => "invalid_signature",
            Self::DelegationExpired   => "delegation_expired",
            Self::MalformedDelegation => "malformed_delegation",
            Self::InvalidToken        => "invalid_token",
            Self::Unauthorized        => "unauthorized",
            Self::InsufficientFunds   => "insufficient_funds",
            Self::NonceCollision      => "nonce_collision",
            Self::Unavailable         => "unavailable",
        }
    }
}

impl fmt::Display for SettlementErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substrings that mark a free-text backend error as permanent.
/// Checked in order against the lowercased message.
const PERMANENT_MARKERS: &[(&str, SettlementErrorKind)] = &[
    ("invalid signature",    SettlementErrorKind::InvalidSignature),
    ("delegation expired",   SettlementErrorKind::DelegationExpired),
    ("expired delegation",   SettlementErrorKind::DelegationExpired),
    ("malformed delegation", SettlementErrorKind::MalformedDelegation),
    ("invalid token",        SettlementErrorKind::InvalidToken),
    ("unauthorized",         SettlementErrorKind::Unauthorized),
    ("insufficient funds",   SettlementErrorKind::InsufficientFunds),
    ("insufficient balance", SettlementErrorKind::InsufficientFunds),
];

const NONCE_MARKERS: &[&str] = &["nonce too low", "nonce already used", "replacement transaction underpriced"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SettlementError {
    pub kind: SettlementErrorKind,
    pub message: String,
}

impl SettlementError {
    pub fn new(kind: SettlementErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Classify a free-text backend error. Anything unrecognised is
    /// treated as transient.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let kind = PERMANENT_MARKERS
            .iter()
            .find(|(marker, _)| lower.contains(marker))
            .map(|(_, kind)| *kind)
            .unwrap_or_else(|| {
                if NONCE_MARKERS.iter().any(|m| lower.contains(m)) {
                    SettlementErrorKind::NonceCollision
                } else {
                    SettlementErrorKind::Unavailable
                }
            });
        Self { kind, message }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind.is_permanent()
    }
}

/// Client for local runs: accepts every delegation and returns a synthetic
/// transaction hash without touching any chain.
#[derive(Debug, Default)]
pub struct DryRunSettlementClient;

impl SettlementClient for DryRunSettlementClient {
    fn redeem(
        &self,
        delegation: &[u8],
        params: &ExecutionParams,
    ) -> Result<TransactionId, SettlementError> {
        if delegation.is_empty() {
            return Err(SettlementError::new(
                SettlementErrorKind::MalformedDelegation,
                "empty delegation payload",
            ));
        }
        let tx = format!("0x{}", uuid::Uuid::new_v4().simple());
        log::info!(
            "dry-run redeem: {} units of {} on {} (chain {}) to {} -> {tx}",
            params.token_amount,
            params.token_contract,
            params.network_name,
            params.chain_id,
            params.merchant_address,
        );
        Ok(tx)
    }
}

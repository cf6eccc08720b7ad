//! Recurring payment redemption engine.
//!
//! Finds subscriptions due for a periodic charge, executes the delegated
//! on-chain transfer through a [`settlement::SettlementClient`], and advances
//! subscription state plus the append-only event trail inside one database
//! transaction.

pub mod config;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod interval;
pub mod model;
pub mod retry;
pub mod rng;
pub mod settlement;
pub mod store;
pub mod types;

//! Shared fixtures: a seeded in-memory store, a scripted settlement client
//! and a sleeper that records backoff delays instead of blocking.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use redemption_core::{
    config::{BatchIsolation, EngineConfig},
    engine::RedemptionEngine,
    interval::IntervalType,
    model::{DelegationDatum, Network, Price, Product, ProductToken, Subscription, SubscriptionEvent, Token, Wallet},
    retry::Sleeper,
    settlement::{ExecutionParams, SettlementClient, SettlementError},
    store::RedemptionStore,
    types::{PriceType, SubscriptionStatus},
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const UNIT_AMOUNT: i64 = 2_500;
pub const MERCHANT_ADDRESS: &str = "0x00000000000000000000000000000000000000aa";
pub const TOKEN_CONTRACT: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";
pub const CHAIN_ID: u64 = 11_155_111;

// Price ids seeded by `store()`.
pub const DAILY_TERM_2: &str = "price-daily-2";
pub const WEEKLY_TERM_3: &str = "price-weekly-3";
pub const MONTHLY_UNBOUNDED: &str = "price-monthly";
pub const ONE_OFF: &str = "price-one-off";
pub const NO_INTERVAL: &str = "price-no-interval";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fixed batch time used by every test.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap()
}

/// Migrated in-memory store with one merchant, token, network, delegation
/// and the prices above.
pub fn store() -> RedemptionStore {
    init_logging();
    let store = RedemptionStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let q = store.queries();

    q.insert_network(&Network { id: "net-1".into(), name: "sepolia".into(), chain_id: CHAIN_ID })
        .unwrap();
    q.insert_token(&Token {
        id: "tok-1".into(),
        network_id: "net-1".into(),
        symbol: "USDC".into(),
        contract_address: TOKEN_CONTRACT.into(),
        decimals: 6,
    })
    .unwrap();
    q.insert_wallet(&Wallet {
        id: "wal-1".into(),
        workspace_id: "ws-1".into(),
        address: MERCHANT_ADDRESS.into(),
    })
    .unwrap();
    q.insert_product(&Product {
        id: "prod-1".into(),
        workspace_id: "ws-1".into(),
        wallet_id: "wal-1".into(),
        name: "Pro plan".into(),
    })
    .unwrap();
    q.insert_product_token(&ProductToken {
        id: "pt-1".into(),
        product_id: "prod-1".into(),
        token_id: "tok-1".into(),
        network_id: "net-1".into(),
    })
    .unwrap();
    q.insert_delegation(&delegation("del-1", r#"[{"enforcer":"0xenf","terms":"0x00"}]"#), now())
        .unwrap();

    let prices = [
        (DAILY_TERM_2, PriceType::Recurring, Some(IntervalType::Daily), 2),
        (WEEKLY_TERM_3, PriceType::Recurring, Some(IntervalType::Weekly), 3),
        (MONTHLY_UNBOUNDED, PriceType::Recurring, Some(IntervalType::Monthly), 0),
        (ONE_OFF, PriceType::OneOff, None, 0),
        (NO_INTERVAL, PriceType::Recurring, None, 0),
    ];
    for (id, price_type, interval_type, term_length) in prices {
        q.insert_price(&Price {
            id: id.into(),
            product_id: "prod-1".into(),
            price_type,
            interval_type,
            term_length,
            unit_amount: UNIT_AMOUNT,
            currency: "USD".into(),
        })
        .unwrap();
    }
    store
}

pub fn delegation(id: &str, caveats: &str) -> DelegationDatum {
    DelegationDatum {
        id: id.into(),
        delegate: "0x00000000000000000000000000000000000000dd".into(),
        delegator: "0x00000000000000000000000000000000000000cc".into(),
        authority: "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".into(),
        caveats: caveats.into(),
        salt: "0x2a".into(),
        signature: "0xsigned".into(),
    }
}

/// An active subscription on `price_id`, due since yesterday.
pub fn subscription(id: &str, price_id: &str) -> Subscription {
    let due = now() - Duration::days(1);
    Subscription {
        id: id.into(),
        workspace_id: "ws-1".into(),
        customer_id: format!("cus-{id}"),
        product_id: "prod-1".into(),
        price_id: price_id.into(),
        product_token_id: "pt-1".into(),
        delegation_id: "del-1".into(),
        customer_wallet_id: None,
        status: SubscriptionStatus::Active,
        current_period_start: due - Duration::days(30),
        current_period_end: due,
        next_redemption_date: Some(due),
        total_redemptions: 0,
        total_amount_collected: 0,
    }
}

pub fn insert(store: &RedemptionStore, sub: &Subscription) {
    store
        .queries()
        .insert_subscription(sub, sub.current_period_start)
        .expect("insert subscription");
}

pub fn reload(engine: &RedemptionEngine, id: &str) -> Subscription {
    engine.store.queries().get_subscription(id).expect("subscription exists")
}

pub fn events(engine: &RedemptionEngine, id: &str) -> Vec<SubscriptionEvent> {
    engine.store.queries().events_for_subscription(id).expect("read events")
}

pub fn engine(store: RedemptionStore, client: &Arc<ScriptedClient>) -> (RedemptionEngine, Arc<RecordingSleeper>) {
    engine_with(store, client, BatchIsolation::SingleTransaction)
}

pub fn engine_with(
    store: RedemptionStore,
    client: &Arc<ScriptedClient>,
    isolation: BatchIsolation,
) -> (RedemptionEngine, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let config = EngineConfig { isolation, ..EngineConfig::default_test() };
    let engine = RedemptionEngine::new(store, config, Box::new(client.clone()))
        .with_sleeper(Box::new(sleeper.clone()));
    (engine, sleeper)
}

// ── Scripted settlement client ─────────────────────────────────

enum Fallback {
    Tx(String),
    Numbered,
    Error(String),
}

/// Answers from a queue of scripted responses, then from a fallback.
/// Error strings go through `SettlementError::from_message`, the same path
/// a free-text backend adapter uses.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Fallback,
    calls: Mutex<Vec<ExecutionParams>>,
}

impl ScriptedClient {
    fn build(script: Vec<Result<&str, &str>>, fallback: Fallback) -> Arc<Self> {
        let script = script
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Arc::new(Self { script: Mutex::new(script), fallback, calls: Mutex::new(Vec::new()) })
    }

    /// Every call succeeds with the same transaction id.
    pub fn succeeding(tx: &str) -> Arc<Self> {
        Self::build(vec![], Fallback::Tx(tx.into()))
    }

    /// Every call succeeds with `0xtx1`, `0xtx2`, ...
    pub fn numbered() -> Arc<Self> {
        Self::build(vec![], Fallback::Numbered)
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        Self::build(vec![], Fallback::Error(message.into()))
    }

    /// Scripted responses first, then succeed with `tx`.
    pub fn scripted(script: Vec<Result<&str, &str>>, tx: &str) -> Arc<Self> {
        Self::build(script, Fallback::Tx(tx.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_params(&self) -> Option<ExecutionParams> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl SettlementClient for ScriptedClient {
    fn redeem(&self, delegation: &[u8], params: &ExecutionParams) -> Result<String, SettlementError> {
        assert!(!delegation.is_empty(), "engine sent an empty delegation");
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(params.clone());
            calls.len()
        };
        let scripted = self.script.lock().unwrap().pop_front();
        let response = match scripted {
            Some(r) => r,
            None => match &self.fallback {
                Fallback::Tx(tx) => Ok(tx.clone()),
                Fallback::Numbered => Ok(format!("0xtx{n}")),
                Fallback::Error(msg) => Err(msg.clone()),
            },
        };
        response.map_err(SettlementError::from_message)
    }
}

// ── Recording sleeper ──────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<std::time::Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<std::time::Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: std::time::Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

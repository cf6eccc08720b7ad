//! redemption-runner: run one redemption batch against a database.
//!
//! Usage:
//!   redemption-runner --db billing.db --config ./config
//!   redemption-runner --demo --now 2025-01-01T00:00:00Z --isolation per-subscription
//!
//! Settlement goes through the dry-run client; no chain is touched.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use redemption_core::{
    config::{BatchIsolation, EngineConfig},
    engine::{BatchResult, RedemptionEngine},
    event::NewEvent,
    interval::{self, IntervalType},
    model::{DelegationDatum, Network, Price, Product, ProductToken, Subscription, Token, Wallet},
    settlement::DryRunSettlementClient,
    store::RedemptionStore,
    types::{PriceType, SubscriptionStatus},
};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary<'a> {
    now: DateTime<Utc>,
    isolation: BatchIsolation,
    result: &'a BatchResult,
    active: i64,
    overdue: i64,
    completed: i64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let demo = args.iter().any(|a| a == "--demo");
    let json = args.iter().any(|a| a == "--json");

    let mut config = match arg_value(&args, "--config") {
        Some(dir) => EngineConfig::load(dir)?,
        None => EngineConfig::default(),
    };
    if let Some(iso) = arg_value(&args, "--isolation") {
        config.isolation = iso.parse().map_err(anyhow::Error::msg)?;
    }
    config.validate()?;
    let fixed_now = match arg_value(&args, "--now") {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("--now '{raw}' is not RFC 3339"))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    let now = fixed_now.unwrap_or_else(Utc::now);

    if !json {
        println!("redemption-runner");
        println!("  db:         {db}");
        println!("  now:        {now}");
        println!("  isolation:  {:?}", config.isolation);
        println!();
    }

    let store = RedemptionStore::open(db)?;
    store.migrate()?;
    if demo {
        let n = seed_demo(&store, now)?;
        log::info!("seeded {n} demo subscriptions");
    }

    let mut engine = RedemptionEngine::new(store, config, Box::new(DryRunSettlementClient));
    let result = match fixed_now {
        Some(at) => engine.run_batch(at)?,
        None => engine.run_batch_now()?,
    };
    let isolation = engine.config().isolation;

    let q = engine.store.queries();
    let summary = RunSummary {
        now,
        isolation,
        result: &result,
        active: q.subscription_count_by_status(SubscriptionStatus::Active)?,
        overdue: q.subscription_count_by_status(SubscriptionStatus::Overdue)?,
        completed: q.subscription_count_by_status(SubscriptionStatus::Completed)?,
    };

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &RunSummary<'_>) {
    println!("=== BATCH SUMMARY ===");
    println!("  found:      {}", s.result.found);
    println!("  succeeded:  {}", s.result.succeeded);
    println!("  failed:     {}", s.result.failed);
    println!("  skipped:    {}", s.result.skipped);
    println!();
    println!("=== SUBSCRIPTIONS ===");
    println!("  active:     {}", s.active);
    println!("  overdue:    {}", s.overdue);
    println!("  completed:  {}", s.completed);
}

/// One merchant, one USDC product with a monthly and a one-off price, and
/// a subscription on each that is already due.
fn seed_demo(store: &RedemptionStore, now: DateTime<Utc>) -> Result<usize> {
    let q = store.queries();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let id = |prefix: &str| format!("{prefix}-{}", &suffix[..8]);

    let network = Network { id: id("net"), name: "base-sepolia".into(), chain_id: 84532 };
    let token = Token {
        id: id("tok"),
        network_id: network.id.clone(),
        symbol: "USDC".into(),
        contract_address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
        decimals: 6,
    };
    let wallet = Wallet {
        id: id("wal"),
        workspace_id: id("ws"),
        address: "0x00000000000000000000000000000000000000aa".into(),
    };
    let product = Product {
        id: id("prod"),
        workspace_id: wallet.workspace_id.clone(),
        wallet_id: wallet.id.clone(),
        name: "Demo plan".into(),
    };
    let product_token = ProductToken {
        id: id("pt"),
        product_id: product.id.clone(),
        token_id: token.id.clone(),
        network_id: network.id.clone(),
    };
    let monthly = Price {
        id: id("price-m"),
        product_id: product.id.clone(),
        price_type: PriceType::Recurring,
        interval_type: Some(IntervalType::Monthly),
        term_length: 12,
        unit_amount: 1_500,
        currency: "USD".into(),
    };
    let one_off = Price {
        id: id("price-o"),
        price_type: PriceType::OneOff,
        interval_type: None,
        term_length: 0,
        unit_amount: 9_900,
        ..monthly.clone()
    };
    let delegation = DelegationDatum {
        id: id("del"),
        delegate: "0x00000000000000000000000000000000000000dd".into(),
        delegator: "0x00000000000000000000000000000000000000cc".into(),
        authority: "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".into(),
        caveats: "[]".into(),
        salt: "0x01".into(),
        signature: "0xdemo".into(),
    };

    q.insert_network(&network)?;
    q.insert_token(&token)?;
    q.insert_wallet(&wallet)?;
    q.insert_product(&product)?;
    q.insert_product_token(&product_token)?;
    q.insert_price(&monthly)?;
    q.insert_price(&one_off)?;
    q.insert_delegation(&delegation, now)?;

    let due = now - Duration::hours(1);
    let mut seeded = 0;
    for price in [&monthly, &one_off] {
        let period_end = match &price.interval_type {
            Some(interval_type) => interval::period_end(due, interval_type, price.term_length),
            None => due,
        };
        let sub = Subscription {
            id: id(&format!("sub-{}", price.price_type)),
            workspace_id: product.workspace_id.clone(),
            customer_id: id("cus"),
            product_id: product.id.clone(),
            price_id: price.id.clone(),
            product_token_id: product_token.id.clone(),
            delegation_id: delegation.id.clone(),
            customer_wallet_id: None,
            status: SubscriptionStatus::Active,
            current_period_start: due,
            current_period_end: period_end,
            next_redemption_date: Some(due),
            total_redemptions: 0,
            total_amount_collected: 0,
        };
        q.insert_subscription(&sub, now)?;
        q.append_event(&NewEvent::created(&sub.id, now))?;
        seeded += 1;
    }
    Ok(seeded)
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

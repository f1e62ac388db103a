//! PostgreSQL back-end tests
//!
//! Need `DATABASE_URL`; each test is a no-op without it. Keys, topics and ids
//! are fresh per test so runs never collide.

mod common;

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use roundup_settlement::domain::{
    Amount, Investment, InvestmentAccount, NewTransfer, Payment, RoundUpConfig,
};
use roundup_settlement::event_log::{partition_for, EventLog, PgEventLog};
use roundup_settlement::lease::{Acquisition, LeaseManager, PgLeaseManager};
use roundup_settlement::store::{
    InvestmentStore, PaymentStore, PgStore, RoundUpOutcome, StoreError,
};

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

// =============================================================================
// Leases
// =============================================================================

#[tokio::test]
async fn test_pg_lease_is_exclusive_until_released() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let leases = PgLeaseManager::new(pool);
    let key = unique("lease");

    let Acquisition::Acquired(lease) = leases.acquire(&key, Duration::from_secs(30)).await.unwrap()
    else {
        panic!("first acquire should succeed");
    };
    assert_eq!(
        leases.acquire(&key, Duration::from_secs(30)).await.unwrap(),
        Acquisition::Busy
    );

    leases.release(&lease).await.unwrap();
    assert!(matches!(
        leases.acquire(&key, Duration::from_secs(30)).await.unwrap(),
        Acquisition::Acquired(_)
    ));
}

#[tokio::test]
async fn test_pg_lease_expires_and_stale_release_keeps_new_holder() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let leases = PgLeaseManager::new(pool);
    let key = unique("lease");

    let Acquisition::Acquired(stale) = leases.acquire(&key, Duration::from_secs(1)).await.unwrap()
    else {
        panic!("first acquire should succeed");
    };

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let Acquisition::Acquired(current) =
        leases.acquire(&key, Duration::from_secs(30)).await.unwrap()
    else {
        panic!("expired lease should be taken over");
    };
    assert_ne!(stale.token, current.token);

    // The old holder's release must not free the key
    leases.release(&stale).await.unwrap();
    assert_eq!(
        leases.acquire(&key, Duration::from_secs(30)).await.unwrap(),
        Acquisition::Busy
    );

    leases.release(&current).await.unwrap();
}

// =============================================================================
// Event log
// =============================================================================

#[tokio::test]
async fn test_pg_log_offsets_fetch_and_commit() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let log = PgEventLog::new(pool, 4);
    let topic = unique("topic");
    let group = unique("group");
    let key = "user-1";
    let partition = partition_for(key, 4);

    for i in 0..3 {
        let record = log.append(&topic, key, json!({ "seq": i })).await.unwrap();
        assert_eq!(record.partition, partition);
        assert_eq!(record.offset, i);
    }

    let records = log.fetch(&group, &topic, partition, 10).await.unwrap();
    let seqs: Vec<i64> = records
        .iter()
        .map(|r| r.payload["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);

    log.commit(&group, &topic, partition, 1).await.unwrap();
    let rest = log.fetch(&group, &topic, partition, 10).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].offset, 2);

    // A lower commit never rewinds the group
    log.commit(&group, &topic, partition, 0).await.unwrap();
    let rest = log.fetch(&group, &topic, partition, 10).await.unwrap();
    assert_eq!(rest[0].offset, 2);

    // Other groups keep their own position
    let other = log.fetch("other-group", &topic, partition, 10).await.unwrap();
    assert_eq!(other.len(), 3);
}

#[tokio::test]
async fn test_pg_dead_letters_are_per_group() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let log = PgEventLog::new(pool, 2);
    let topic = unique("topic");
    let group = unique("group");

    let record = log.append(&topic, "k", json!({ "bad": true })).await.unwrap();
    log.dead_letter(&group, &record, "undecodable").await.unwrap();

    let parked = log.dead_letters(&group).await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].offset, record.offset);
    assert_eq!(parked[0].reason, "undecodable");
    assert!(log.dead_letters(&unique("group")).await.unwrap().is_empty());
}

// =============================================================================
// Stores
// =============================================================================

#[tokio::test]
async fn test_pg_apply_round_up_twice_credits_once() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let store = PgStore::new(pool);
    let user_id = Uuid::new_v4();
    let account = InvestmentAccount::new(user_id, "Round-up".to_string(), "KRW".to_string());
    let config = RoundUpConfig::new(user_id, Uuid::new_v4(), account.id, amount(dec!(1000)));
    store.save_investment_account(&account).await.unwrap();
    store.save_round_up_config(&config).await.unwrap();

    let payment_id = Uuid::new_v4();
    let investment = Investment::round_up(
        user_id,
        account.id,
        amount(dec!(550)),
        "KRW".to_string(),
        payment_id,
        Utc::now(),
    );
    assert_eq!(
        store.apply_round_up(&investment, config.id).await.unwrap(),
        RoundUpOutcome::Applied
    );

    let mut replay = investment.clone();
    replay.id = Uuid::new_v4();
    assert_eq!(
        store.apply_round_up(&replay, config.id).await.unwrap(),
        RoundUpOutcome::AlreadyApplied
    );

    assert_eq!(store.investments_by_user(user_id, None).await.unwrap().len(), 1);
    let account = store.get_investment_account(account.id).await.unwrap().unwrap();
    assert_eq!(account.balance.value(), dec!(550));

    let config = store
        .find_round_up_config(user_id, config.source_account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.total_rounded_up, dec!(550));
    assert_eq!(config.total_transactions, 1);
}

#[tokio::test]
async fn test_pg_second_config_for_same_account_is_duplicate() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let store = PgStore::new(pool);
    let user_id = Uuid::new_v4();
    let source = Uuid::new_v4();
    let account = InvestmentAccount::new(user_id, "Round-up".to_string(), "KRW".to_string());
    store.save_investment_account(&account).await.unwrap();

    let mut first = RoundUpConfig::new(user_id, source, account.id, amount(dec!(1000)));
    store.save_round_up_config(&first).await.unwrap();

    let second = RoundUpConfig::new(user_id, source, account.id, amount(dec!(100)));
    assert!(matches!(
        store.save_round_up_config(&second).await,
        Err(StoreError::Duplicate(_))
    ));

    // Updating the existing row is still allowed
    first.enabled = false;
    store.save_round_up_config(&first).await.unwrap();
    let found = store
        .find_round_up_config(user_id, source)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, first.id);
    assert!(!found.enabled);
}

#[tokio::test]
async fn test_pg_largest_amount_fits_columns() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let store = PgStore::new(pool);
    let largest = Decimal::from(1_000_000_000_000i64);

    for value in [largest, dec!(999999999999.12345678)] {
        let payment = Payment::pending_transfer(NewTransfer {
            user_id: Uuid::new_v4(),
            from_account_id: Uuid::new_v4(),
            to_account_id: Uuid::new_v4(),
            recipient_name: "Lee".to_string(),
            amount: amount(value),
            currency: "KRW".to_string(),
            description: None,
        });
        store.insert_payment(&payment).await.unwrap();

        let loaded = store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(loaded.amount.value(), value);
    }

    // A maximal round-up fills the balance column and the config totals
    let user_id = Uuid::new_v4();
    let account = InvestmentAccount::new(user_id, "Round-up".to_string(), "KRW".to_string());
    let config = RoundUpConfig::new(user_id, Uuid::new_v4(), account.id, amount(largest));
    store.save_investment_account(&account).await.unwrap();
    store.save_round_up_config(&config).await.unwrap();
    let investment = Investment::round_up(
        user_id,
        account.id,
        amount(largest),
        "KRW".to_string(),
        Uuid::new_v4(),
        Utc::now(),
    );
    assert_eq!(
        store.apply_round_up(&investment, config.id).await.unwrap(),
        RoundUpOutcome::Applied
    );

    let account = store.get_investment_account(account.id).await.unwrap().unwrap();
    assert_eq!(account.balance.value(), largest);
    let config = store
        .find_round_up_config(user_id, config.source_account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.total_rounded_up, largest);
}

//! SQLite-backed counter and credential stores

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use notify_rs::counter::{CounterStore, SqliteCounterStore};
use notify_rs::credential::{
    CredentialRecord, CredentialStore, SqliteCredentialStore, BAN_REASON,
};
use notify_rs::error::NotifyError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

const COUNTER: &str = "daily_sms_counter";

async fn setup_test_db() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn counter_store(pool: SqlitePool) -> SqliteCounterStore {
    let store = SqliteCounterStore::new(pool);
    store.init_db().await.unwrap();
    store
}

async fn credential_store(pool: SqlitePool) -> SqliteCredentialStore {
    let store = SqliteCredentialStore::new(pool);
    store.init_db().await.unwrap();
    store
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, d).unwrap()
}

fn at(d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, d, 8, 30, 0).unwrap()
}

fn credential(phone: &str, email: Option<&str>) -> CredentialRecord {
    CredentialRecord::issue(
        phone.to_string(),
        email.map(str::to_string),
        "Corner Shop".to_string(),
        at(1),
    )
}

#[tokio::test]
async fn test_counter_increment_and_rollover() {
    let store = counter_store(setup_test_db().await).await;

    assert_eq!(store.increment(COUNTER, day(1), at(1)).await.unwrap(), 1);
    assert_eq!(store.increment(COUNTER, day(1), at(1)).await.unwrap(), 2);

    let record = store.load(COUNTER, day(1), at(1)).await.unwrap();
    assert_eq!(record.count, 2);
    assert_eq!(record.date, day(1));

    // First operation of a new day starts from zero
    assert_eq!(store.increment(COUNTER, day(2), at(2)).await.unwrap(), 1);
    let record = store.load(COUNTER, day(2), at(2)).await.unwrap();
    assert_eq!(record.count, 1);
    assert_eq!(record.last_reset, at(2));
}

#[tokio::test]
async fn test_counter_load_rolls_over_stale_day() {
    let store = counter_store(setup_test_db().await).await;
    for _ in 0..5 {
        store.increment(COUNTER, day(1), at(1)).await.unwrap();
    }

    let record = store.load(COUNTER, day(3), at(3)).await.unwrap();
    assert_eq!(record.count, 0);
    assert_eq!(record.date, day(3));
}

#[tokio::test]
async fn test_counter_decrement_floor_and_day() {
    let store = counter_store(setup_test_db().await).await;

    assert_eq!(store.decrement(COUNTER, day(1), at(1)).await.unwrap(), 0);
    store.increment(COUNTER, day(1), at(1)).await.unwrap();
    store.increment(COUNTER, day(1), at(1)).await.unwrap();
    assert_eq!(store.decrement(COUNTER, day(1), at(1)).await.unwrap(), 1);

    // Yesterday's reservation is not returned into today's count
    assert_eq!(store.decrement(COUNTER, day(2), at(2)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_counter_reset() {
    let store = counter_store(setup_test_db().await).await;
    store.increment(COUNTER, day(1), at(1)).await.unwrap();

    let record = store.reset(COUNTER, day(1), at(1)).await.unwrap();
    assert_eq!(record.count, 0);
    assert_eq!(store.load(COUNTER, day(1), at(1)).await.unwrap().count, 0);
}

#[tokio::test]
async fn test_counter_concurrent_increments() {
    let store = Arc::new(counter_store(setup_test_db().await).await);

    let mut handles = Vec::new();
    for _ in 0..40 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.increment(COUNTER, day(1), at(1)).await.unwrap()
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap());
    }
    seen.sort_unstable();

    assert_eq!(seen, (1..=40).collect::<Vec<u32>>());
    assert_eq!(store.load(COUNTER, day(1), at(1)).await.unwrap().count, 40);
}

#[tokio::test]
async fn test_credential_insert_and_find() {
    let store = credential_store(setup_test_db().await).await;
    let record = credential("+639171234567", Some("owner@shop.ph"));
    store.insert(&record).await.unwrap();

    let found = store.find(&record.api_key).await.unwrap().unwrap();
    assert_eq!(found, record);

    assert!(store.email_exists("owner@shop.ph").await.unwrap());
    assert!(!store.email_exists("other@shop.ph").await.unwrap());
    assert!(store.phone_exists("+639171234567").await.unwrap());
    assert!(store.find("sk-missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_malicious_attempts_escalate_to_ban() {
    let store = credential_store(setup_test_db().await).await;
    let record = credential("+639171234567", None);
    store.insert(&record).await.unwrap();

    let first = store
        .record_malicious_attempt(&record.api_key, 3, at(1))
        .await
        .unwrap();
    assert!(!first.banned);
    assert_eq!(first.attempt_count, 1);
    assert_eq!(first.attempts_remaining, Some(2));

    store
        .record_malicious_attempt(&record.api_key, 3, at(1))
        .await
        .unwrap();
    let third = store
        .record_malicious_attempt(&record.api_key, 3, at(2))
        .await
        .unwrap();
    assert!(third.banned);
    assert_eq!(third.attempt_count, 3);
    assert_eq!(third.attempts_remaining, None);
    assert_eq!(third.ban_reason.as_deref(), Some(BAN_REASON));
    assert_eq!(third.banned_at, Some(at(2)));

    // The ban timestamp stays at the first ban
    let fourth = store
        .record_malicious_attempt(&record.api_key, 3, at(3))
        .await
        .unwrap();
    assert_eq!(fourth.banned_at, Some(at(2)));

    let found = store.find(&record.api_key).await.unwrap().unwrap();
    assert!(found.banned);
    assert!(!found.is_active);
}

#[tokio::test]
async fn test_reset_attempts() {
    let store = credential_store(setup_test_db().await).await;
    let record = credential("+639171234567", None);
    store.insert(&record).await.unwrap();
    store
        .record_malicious_attempt(&record.api_key, 3, at(1))
        .await
        .unwrap();

    store.reset_attempts(&record.api_key, at(1)).await.unwrap();

    let found = store.find(&record.api_key).await.unwrap().unwrap();
    assert_eq!(found.error_count, 0);
    assert!(found.last_malicious_at.is_none());
}

#[tokio::test]
async fn test_usage_rolls_over_by_day() {
    let store = credential_store(setup_test_db().await).await;
    let record = credential("+639171234567", None);
    store.insert(&record).await.unwrap();

    assert_eq!(store.record_usage(&record.api_key, day(1), at(1)).await.unwrap(), 1);
    assert_eq!(store.record_usage(&record.api_key, day(1), at(1)).await.unwrap(), 2);
    assert_eq!(store.record_usage(&record.api_key, day(2), at(2)).await.unwrap(), 1);

    let found = store.find(&record.api_key).await.unwrap().unwrap();
    assert_eq!(found.usage_on(day(2)), 1);
    assert_eq!(found.usage_on(day(2) + Duration::days(1)), 0);
}

#[tokio::test]
async fn test_touch_and_deactivate() {
    let store = credential_store(setup_test_db().await).await;
    let record = credential("+639171234567", None);
    store.insert(&record).await.unwrap();

    store.touch_request(&record.api_key, at(2)).await.unwrap();
    store.deactivate(&record.api_key, at(2)).await.unwrap();

    let found = store.find(&record.api_key).await.unwrap().unwrap();
    assert_eq!(found.last_request_at, Some(at(2)));
    assert!(!found.is_active);
}

#[tokio::test]
async fn test_unknown_key_mutations() {
    let store = credential_store(setup_test_db().await).await;

    assert!(matches!(
        store.record_malicious_attempt("sk-missing", 3, at(1)).await,
        Err(NotifyError::UnknownApiKey)
    ));
    assert!(matches!(
        store.record_usage("sk-missing", day(1), at(1)).await,
        Err(NotifyError::UnknownApiKey)
    ));
    assert!(matches!(
        store.touch_request("sk-missing", at(1)).await,
        Err(NotifyError::UnknownApiKey)
    ));
}

//! Fallback delivery once the primary channel's daily capacity is spent

mod common;

use common::{build, test_config};
use notify_rs::counter::{EMAIL_COUNTER, PRIMARY_COUNTER};
use notify_rs::error::NotifyError;
use notify_rs::fallback::DeliveryChannel;
use notify_rs::service::SendRequest;

fn request(message: &str) -> SendRequest {
    SendRequest {
        recipient: "09171234567".to_string(),
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_exhausted_primary_goes_to_email() {
    let (service, fakes) = build(test_config());
    let credential = fakes.issue("09170000001", Some("owner@shop.ph")).await;
    fakes.seed_counter(PRIMARY_COUNTER, 300).await;
    fakes.seed_counter(EMAIL_COUNTER, 50).await;

    let outcome = service
        .send(&credential.api_key, request("Order #12 is ready"))
        .await
        .unwrap();

    assert_eq!(outcome.delivery.delivery_method, DeliveryChannel::EmailFallback);
    let fallback = outcome.delivery.fallback.unwrap();
    assert_eq!(fallback.delivered_to, "owner@shop.ph");
    assert_eq!(fallback.email_count, Some(51));

    assert_eq!(fakes.sms.count(), 0);
    assert_eq!(fakes.email.count(), 1);
    let (address, text, context) = fakes.email.sent.lock().unwrap()[0].clone();
    assert_eq!(address, "owner@shop.ph");
    assert_eq!(text, "Order #12 is ready");
    assert_eq!(context.project_name, "Corner Shop");
    assert_eq!(context.original_recipient, "+639171234567");

    assert_eq!(fakes.primary_counter().get().await.unwrap().count, 300);
    assert_eq!(fakes.email_counter().get().await.unwrap().count, 51);
}

#[tokio::test]
async fn test_both_counters_exhausted_goes_to_push() {
    let (service, fakes) = build(test_config());
    let credential = fakes.issue("09170000002", Some("owner@shop.ph")).await;
    fakes.push.subscribe(&credential.user_id, 1);
    fakes.seed_counter(PRIMARY_COUNTER, 300).await;
    fakes.seed_counter(EMAIL_COUNTER, 290).await;

    let outcome = service
        .send(&credential.api_key, request("Order #13 is ready"))
        .await
        .unwrap();

    assert_eq!(outcome.delivery.delivery_method, DeliveryChannel::WebPush);
    let push = outcome.delivery.fallback.unwrap().push.unwrap();
    assert_eq!(push.sent, 1);
    assert_eq!(fakes.email.count(), 0);
    assert_eq!(fakes.push.count(), 1);
    assert_eq!(fakes.email_counter().get().await.unwrap().count, 290);
}

#[tokio::test]
async fn test_no_fallback_channel_is_capacity_exceeded() {
    let (service, fakes) = build(test_config());
    let credential = fakes.issue("09170000003", None).await;
    fakes.seed_counter(PRIMARY_COUNTER, 300).await;

    let err = service
        .send(&credential.api_key, request("Order #14 is ready"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::CapacityExceeded));
    assert_eq!(fakes.primary_counter().get().await.unwrap().count, 300);
    assert_eq!(fakes.email_counter().get().await.unwrap().count, 0);
    assert_eq!(fakes.sms.count() + fakes.email.count() + fakes.push.count(), 0);

    let record = fakes.guard().lookup(&credential.api_key).await.unwrap();
    assert_eq!(record.daily_usage, 0);
}

#[tokio::test]
async fn test_failed_email_falls_through_to_push_and_releases_slot() {
    let (service, fakes) = build(test_config());
    let credential = fakes.issue("09170000004", Some("owner@shop.ph")).await;
    fakes.push.subscribe(&credential.user_id, 2);
    fakes.seed_counter(PRIMARY_COUNTER, 300).await;
    fakes.seed_counter(EMAIL_COUNTER, 10).await;
    fakes
        .email
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let outcome = service
        .send(&credential.api_key, request("Order #15 is ready"))
        .await
        .unwrap();

    assert_eq!(outcome.delivery.delivery_method, DeliveryChannel::WebPush);
    assert_eq!(fakes.email_counter().get().await.unwrap().count, 10);
}

#[tokio::test]
async fn test_last_primary_slot_is_taken_once() {
    let (service, fakes) = build(test_config());
    let first = fakes.issue("09170000005", Some("first@shop.ph")).await;
    let second = fakes.issue("09170000006", Some("second@shop.ph")).await;
    fakes.seed_counter(PRIMARY_COUNTER, 299).await;

    let (a, b) = tokio::join!(
        service.send(&first.api_key, request("Order #16 is ready")),
        service.send(&second.api_key, request("Order #17 is ready")),
    );

    let mut methods = vec![
        a.unwrap().delivery.delivery_method,
        b.unwrap().delivery.delivery_method,
    ];
    methods.sort_by_key(|m| m.as_str());
    assert_eq!(
        methods,
        vec![DeliveryChannel::EmailFallback, DeliveryChannel::Primary]
    );
    assert_eq!(fakes.sms.count(), 1);
    assert_eq!(fakes.email.count(), 1);
    assert_eq!(fakes.primary_counter().get().await.unwrap().count, 300);
}

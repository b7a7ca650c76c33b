//! Per-key delivery ordering and cool-down, driven through the service

mod common;

use common::{build, test_config};
use notify_rs::counter::PRIMARY_COUNTER;
use notify_rs::error::NotifyError;
use notify_rs::service::{NotificationService, SendOutcome, SendRequest};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn spawn_send(
    service: &Arc<NotificationService>,
    api_key: &str,
    message: &str,
) -> JoinHandle<notify_rs::Result<SendOutcome>> {
    let service = service.clone();
    let api_key = api_key.to_string();
    let request = SendRequest {
        recipient: "09171234567".to_string(),
        message: message.to_string(),
    };
    tokio::spawn(async move { service.send(&api_key, request).await })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_sends_are_spaced() {
    let (service, fakes) = build(test_config());
    let service = Arc::new(service);
    let credential = fakes.issue("09170000021", None).await;

    let a = spawn_send(&service, &credential.api_key, "first");
    settle().await;
    let b = spawn_send(&service, &credential.api_key, "second");
    settle().await;
    let c = spawn_send(&service, &credential.api_key, "third");
    settle().await;

    let status = service.queue_status(&credential.api_key).await.unwrap();
    assert_eq!(status.queue.queued_messages, 2);
    assert_eq!(status.queue.next_available_in_seconds, 2);
    assert_eq!(status.queue.estimated_completion_seconds, 4);

    for handle in [a, b, c] {
        handle.await.unwrap().unwrap();
    }

    let texts = fakes.sms.texts();
    assert!(texts[0].contains("first"));
    assert!(texts[1].contains("second"));
    assert!(texts[2].contains("third"));

    let times = fakes.sms.times();
    assert!(times[1] - times[0] >= Duration::from_secs(2));
    assert!(times[2] - times[1] >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_keys_do_not_wait_for_each_other() {
    let (service, fakes) = build(test_config());
    let service = Arc::new(service);
    let first = fakes.issue("09170000022", None).await;
    let second = fakes.issue("09170000023", None).await;

    spawn_send(&service, &first.api_key, "one").await.unwrap().unwrap();
    let start = tokio::time::Instant::now();
    spawn_send(&service, &second.api_key, "two").await.unwrap().unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(fakes.sms.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_releases_counter_and_skips_cooldown() {
    let (service, fakes) = build(test_config());
    let service = Arc::new(service);
    let credential = fakes.issue("09170000024", None).await;

    fakes.sms.fail.store(true, Ordering::SeqCst);
    let err = spawn_send(&service, &credential.api_key, "lost")
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, NotifyError::Transport { channel: "sms", .. }));
    assert_eq!(fakes.primary_counter().get().await.unwrap().count, 0);
    let record = fakes.guard().lookup(&credential.api_key).await.unwrap();
    assert_eq!(record.daily_usage, 0);

    fakes.sms.fail.store(false, Ordering::SeqCst);
    let start = tokio::time::Instant::now();
    let outcome = spawn_send(&service, &credential.api_key, "retry")
        .await
        .unwrap()
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.delivery.usage.unwrap().sent, 1);
    assert_eq!(fakes.primary_counter().get().await.unwrap().count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_clear_queue_drops_waiting_messages() {
    let (service, fakes) = build(test_config());
    let service = Arc::new(service);
    let credential = fakes.issue("09170000025", None).await;

    let a = spawn_send(&service, &credential.api_key, "sent");
    settle().await;
    let b = spawn_send(&service, &credential.api_key, "dropped 1");
    let c = spawn_send(&service, &credential.api_key, "dropped 2");
    settle().await;

    assert_eq!(service.active_queues().await.len(), 1);
    assert_eq!(service.clear_queue(&credential.api_key).await, 2);

    a.await.unwrap().unwrap();
    assert!(matches!(b.await.unwrap(), Err(NotifyError::QueueCleared)));
    assert!(matches!(c.await.unwrap(), Err(NotifyError::QueueCleared)));
    assert_eq!(fakes.sms.count(), 1);
    settle().await;
    assert!(service.active_queues().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_handler_timeout_returns_counter_slot() {
    let mut config = test_config();
    config.limits.handler_timeout_secs = 5;
    let (service, fakes) = build(config);
    let service = Arc::new(service);
    let credential = fakes.issue("09170000026", None).await;
    fakes.seed_counter(PRIMARY_COUNTER, 10).await;
    *fakes.sms.delay.lock().unwrap() = Some(Duration::from_secs(60));

    let err = spawn_send(&service, &credential.api_key, "stalled")
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, NotifyError::HandlerTimeout(5)));

    settle().await;
    assert_eq!(fakes.primary_counter().get().await.unwrap().count, 10);
    assert_eq!(fakes.sms.count(), 0);
    let record = fakes.guard().lookup(&credential.api_key).await.unwrap();
    assert_eq!(record.daily_usage, 0);
}

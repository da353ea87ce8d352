mod common;

use chrono::Duration as ChronoDuration;
use common::{start_time, Harness, ScriptedTransport};
use taaza_mail::{Clock, EmailKind, EmailService, Outcome, QueueStore};

#[tokio::test]
async fn otp_delivered_after_two_transient_failures() {
    let harness = Harness::new(ScriptedTransport::failing_first(2));
    let service = EmailService::new(harness.store.clone(), harness.clock_handle());
    let id = service.otp("a@x.com", "Asha", "482913").await.unwrap();

    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(job.id, id);
    let first = harness.processor.process(job).await;
    assert_eq!(
        first,
        Outcome::Retried {
            not_before: start_time() + ChronoDuration::minutes(1)
        }
    );

    // Not visible before its backoff elapses.
    assert!(harness.store.dequeue_due().await.unwrap().is_none());

    harness.clock.advance(ChronoDuration::minutes(1));
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    let second = harness.processor.process(job).await;
    assert_eq!(
        second,
        Outcome::Retried {
            not_before: harness.clock.now() + ChronoDuration::minutes(4)
        }
    );

    harness.clock.advance(ChronoDuration::minutes(4));
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(job.attempt_count, 2);
    assert_eq!(
        harness.processor.process(job).await,
        Outcome::Delivered { attempts: 2 }
    );

    let sent = harness.transport.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "a@x.com");
    assert_eq!(sent[0].1, "Your OTP Code - Taaza");
    assert!(sent[0].2.contains("482913"));

    let stats = harness.store.stats().await.unwrap();
    assert_eq!((stats.queued, stats.scheduled, stats.dead_letter), (0, 0, 0));
}

#[tokio::test]
async fn exhausted_job_is_dead_lettered_and_never_requeued() {
    let harness = Harness::new(ScriptedTransport::failing_first(u32::MAX));
    let service = EmailService::new(harness.store.clone(), harness.clock_handle())
        .with_max_attempts(3);
    service.welcome("a@x.com", "Asha").await.unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let job = harness.store.dequeue_due().await.unwrap().unwrap();
        outcomes.push(harness.processor.process(job).await);
        harness.clock.advance(ChronoDuration::hours(1));
    }

    assert!(matches!(outcomes[0], Outcome::Retried { .. }));
    assert!(matches!(outcomes[1], Outcome::Retried { .. }));
    assert_eq!(outcomes[2], Outcome::DeadLettered);

    assert!(harness.store.dequeue_due().await.unwrap().is_none());
    let dead = harness.store.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempt_count, 3);
    assert_eq!(dead[0].kind, EmailKind::Welcome);
    assert!(dead[0].last_error.as_deref().unwrap_or("").contains("451"));
}

#[tokio::test]
async fn eleventh_send_in_an_hour_is_rate_limited_and_backed_off() {
    let harness = Harness::new(ScriptedTransport::succeeding());
    let service = EmailService::new(harness.store.clone(), harness.clock_handle());

    for _ in 0..10 {
        service.otp("a@x.com", "Asha", "111111").await.unwrap();
        let job = harness.store.dequeue_due().await.unwrap().unwrap();
        assert!(matches!(
            harness.processor.process(job).await,
            Outcome::Delivered { .. }
        ));
    }

    service.otp("a@x.com", "Asha", "222222").await.unwrap();
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    let outcome = harness.processor.process(job).await;
    assert_eq!(
        outcome,
        Outcome::Retried {
            not_before: start_time() + ChronoDuration::minutes(1)
        }
    );
    assert_eq!(harness.transport.sent_count(), 10);

    let scheduled = harness.store.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].attempt_count, 1);

    // A different recipient is unaffected.
    service.welcome("b@x.com", "Ravi").await.unwrap();
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert!(matches!(
        harness.processor.process(job).await,
        Outcome::Delivered { .. }
    ));

    // Once the window rolls over the held OTP goes out.
    harness.clock.advance(ChronoDuration::hours(1));
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(
        harness.processor.process(job).await,
        Outcome::Delivered { attempts: 1 }
    );
}

#[tokio::test]
async fn scheduled_reminder_waits_for_its_time() {
    let harness = Harness::new(ScriptedTransport::succeeding());
    let service = EmailService::new(harness.store.clone(), harness.clock_handle());
    let at = start_time() + ChronoDuration::hours(24);
    service
        .profile_reminder("a@x.com", "Asha", Some(at))
        .await
        .unwrap();

    harness.clock.advance(ChronoDuration::hours(23));
    assert!(harness.store.dequeue_due().await.unwrap().is_none());

    harness.clock.set(at);
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(
        harness.processor.process(job).await,
        Outcome::Delivered { attempts: 0 }
    );
    let sent = harness.transport.sent.lock().clone();
    assert_eq!(sent[0].1, "Complete Your Taaza Profile");
    assert!(sent[0].2.contains("https://taaza.in/profile/complete"));
}

#[tokio::test]
async fn reschedule_survives_a_failed_store_write() {
    let harness = Harness::new(ScriptedTransport::failing_first(1));
    let service = EmailService::new(harness.store.clone(), harness.clock_handle());
    let id = service.welcome("a@x.com", "Asha").await.unwrap();

    harness.flaky.fail_enqueues(1);
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(
        harness.processor.process(job).await,
        Outcome::Retried {
            not_before: start_time() + ChronoDuration::minutes(1)
        }
    );

    let scheduled = harness.store.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].id, id);
    assert_eq!(scheduled[0].attempt_count, 1);
}

#[tokio::test]
async fn dead_letter_survives_a_failed_store_write() {
    let harness = Harness::new(ScriptedTransport::failing_first(u32::MAX));
    let service = EmailService::new(harness.store.clone(), harness.clock_handle())
        .with_max_attempts(1);
    service.welcome("a@x.com", "Asha").await.unwrap();

    harness.flaky.fail_dead_letters(2);
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(harness.processor.process(job).await, Outcome::DeadLettered);
    assert_eq!(harness.store.dead().len(), 1);
}

#[tokio::test]
async fn job_is_reported_lost_only_after_every_write_fails() {
    let harness = Harness::new(ScriptedTransport::failing_first(1));
    let service = EmailService::new(harness.store.clone(), harness.clock_handle());
    service.welcome("a@x.com", "Asha").await.unwrap();

    harness.flaky.fail_enqueues(3);
    let job = harness.store.dequeue_due().await.unwrap().unwrap();
    assert_eq!(harness.processor.process(job).await, Outcome::Lost);

    let stats = harness.store.stats().await.unwrap();
    assert_eq!((stats.queued, stats.scheduled, stats.dead_letter), (0, 0, 0));
}

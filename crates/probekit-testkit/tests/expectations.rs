//! Tests for TestKit expectations, deadlines and time dilation
//!
//! TigerStyle: Each timing property checked against wall-clock bounds.

use probekit_core::config::ProbekitConfig;
use probekit_core::error::Error;
use probekit_core::message::{Message, MessageClass};
use probekit_core::{ActorRef, InterruptHandle};
use probekit_runtime::{Actor, ActorContext, ActorSystem, Props};
use probekit_testkit::{AutoPilot, TestKit};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// =============================================================================
// Helpers
// =============================================================================

fn system() -> ActorSystem {
    ActorSystem::with_name("expectations").unwrap()
}

fn system_with_time_factor(factor: f64) -> ActorSystem {
    let mut config = ProbekitConfig::default();
    config.system.name = "dilated".to_string();
    config.testkit.time_factor = factor;
    ActorSystem::new(config).unwrap()
}

fn send<M: Message>(kit: &TestKit, message: M) {
    kit.test_actor().tell(message, None);
}

fn send_later<M: Message>(target: &ActorRef, delay: Duration, message: M) -> thread::JoinHandle<()> {
    let target = target.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        target.tell(message, None);
    })
}

/// Records nothing; used as a sender and as a watch target
struct Quiet;

impl Actor for Quiet {
    fn receive(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        _message: probekit_core::AnyMessage,
    ) -> probekit_core::Result<()> {
        Ok(())
    }
}

fn quiet(system: &ActorSystem) -> ActorRef {
    system
        .spawn(Props::new(|| Quiet).calling_thread(), None)
        .unwrap()
}

// =============================================================================
// Single-message expectations
// =============================================================================

#[test]
fn test_expect_msg_returns_match() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "hello");
    assert_eq!(kit.expect_msg(Duration::from_secs(1), "hello").unwrap(), "hello");
    assert!(!kit.msg_available());
}

#[test]
fn test_expect_msg_mismatch_consumes_message() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "actual");
    let result = kit.expect_msg(Duration::from_secs(1), "expected");

    match result {
        Err(Error::UnexpectedMessage { expected, actual }) => {
            assert!(expected.contains("expected"));
            assert!(actual.contains("actual"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!kit.msg_available());
    let last = kit.last_message().unwrap();
    assert_eq!(last.message.downcast_ref::<&str>(), Some(&"actual"));
}

#[test]
fn test_expect_msg_wrong_type_is_unexpected() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, 7u32);
    let result = kit.expect_msg(Duration::from_secs(1), "seven");
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

#[test]
fn test_expect_msg_times_out() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let start = Instant::now();
    let result = kit.expect_msg(Duration::from_millis(100), "never");

    match result {
        Err(Error::Timeout { elapsed, expected }) => {
            assert!(elapsed >= Duration::from_millis(100));
            assert!(expected.contains("never"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_expect_msg_waits_for_late_message() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let sender = send_later(kit.test_actor(), Duration::from_millis(50), "late");
    kit.expect_msg(Duration::from_secs(3), "late").unwrap();
    sender.join().unwrap();
}

#[test]
fn test_expect_msg_type() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, 42u32);
    assert_eq!(kit.expect_msg_type::<u32>(Duration::from_secs(1)).unwrap(), 42);

    send(&kit, "text");
    let result = kit.expect_msg_type::<u32>(Duration::from_secs(1));
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

#[test]
fn test_expect_msg_any_type_of() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let classes = [MessageClass::of::<u32>(), MessageClass::of::<&'static str>()];

    send(&kit, "text");
    let message = kit
        .expect_msg_any_type_of(Duration::from_secs(1), &classes)
        .unwrap();
    assert!(message.is::<&'static str>());

    send(&kit, 1.5f64);
    let result = kit.expect_msg_any_type_of(Duration::from_secs(1), &classes);
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

#[test]
fn test_expect_msg_any_of() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "b");
    assert_eq!(
        kit.expect_msg_any_of(Duration::from_secs(1), &["a", "b"]).unwrap(),
        "b"
    );

    send(&kit, "c");
    let result = kit.expect_msg_any_of(Duration::from_secs(1), &["a", "b"]);
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

#[test]
fn test_expect_msg_pf_returns_matcher_result() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, 21u32);
    let doubled = kit
        .expect_msg_pf(Duration::from_secs(1), "a number", |message| {
            message.downcast_ref::<u32>().map(|n| n * 2)
        })
        .unwrap();
    assert_eq!(doubled, 42);
}

#[test]
fn test_expect_msg_pf_fails_immediately_when_undefined() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "not a number");
    let start = Instant::now();
    let result = kit.expect_msg_pf(Duration::from_secs(5), "a number", |message| {
        message.downcast_ref::<u32>().copied()
    });

    match result {
        Err(Error::UnexpectedMessage { expected, .. }) => assert_eq!(expected, "a number"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}

// =============================================================================
// Multi-message expectations
// =============================================================================

#[test]
fn test_expect_msg_all_of_covers_multiset() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "a");
    send(&kit, "a");
    send(&kit, "b");

    let received = kit
        .expect_msg_all_of(Duration::from_secs(1), &["a", "b", "a"])
        .unwrap();
    assert_eq!(received, vec!["a", "a", "b"]);
}

#[test]
fn test_expect_msg_all_of_times_out_on_missing() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "a");
    send(&kit, "b");

    let result = kit.expect_msg_all_of(Duration::from_millis(200), &["a", "b", "a"]);
    assert!(matches!(result, Err(Error::Timeout { .. })));
}

#[test]
fn test_expect_msg_all_of_rejects_surplus_duplicate() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "a");
    send(&kit, "a");

    let result = kit.expect_msg_all_of(Duration::from_secs(1), &["a", "b"]);
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

#[test]
fn test_receive_n_in_order() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    for n in 0..5u32 {
        send(&kit, n);
    }
    let received = kit.receive_n(5, Duration::from_secs(1)).unwrap();
    let numbers: Vec<u32> = received
        .iter()
        .map(|m| *m.downcast_ref::<u32>().unwrap())
        .collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_receive_n_times_out_with_count() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, 1u32);
    match kit.receive_n(3, Duration::from_millis(100)) {
        Err(Error::Timeout { expected, .. }) => assert!(expected.contains("got 1")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_receive_while_stops_at_first_mismatch() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, 1i32);
    send(&kit, 2i32);
    send(&kit, 3i32);
    send(&kit, "x");

    let numbers = kit.receive_while(
        Duration::from_secs(1),
        Duration::from_millis(100),
        5,
        |message| message.downcast_ref::<i32>().copied(),
    );

    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(kit.msg_available());
    kit.expect_msg(Duration::ZERO, "x").unwrap();
}

#[test]
fn test_receive_while_respects_limit() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    for n in 0..5i32 {
        send(&kit, n);
    }
    let numbers = kit.receive_while(None, None, 2, |m| m.downcast_ref::<i32>().copied());
    assert_eq!(numbers, vec![0, 1]);
    assert_eq!(kit.receive_n(3, Duration::from_secs(1)).unwrap().len(), 3);
}

#[test]
fn test_receive_while_stops_when_idle() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, 1i32);
    let start = Instant::now();
    let numbers = kit.receive_while(
        Duration::from_secs(10),
        Duration::from_millis(50),
        10,
        |m| m.downcast_ref::<i32>().copied(),
    );
    assert_eq!(numbers, vec![1]);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_fish_for_message_skips_until_match() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    for n in 1..=4u32 {
        send(&kit, n);
    }
    let found = kit
        .fish_for_message(Duration::from_secs(1), "three", |m| {
            m.downcast_ref::<u32>().map(|n| *n == 3)
        })
        .unwrap();
    assert_eq!(found.downcast_ref::<u32>(), Some(&3));
    kit.expect_msg(Duration::from_secs(1), 4u32).unwrap();
}

#[test]
fn test_fish_for_message_fails_on_undefined() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "unexpected");
    let result = kit.fish_for_message(Duration::from_secs(1), "numbers only", |m| {
        m.downcast_ref::<u32>().map(|_| true)
    });
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

// =============================================================================
// expect_no_msg
// =============================================================================

#[test]
fn test_expect_no_msg_passes_when_quiet() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let start = Instant::now();
    kit.expect_no_msg(Duration::from_millis(100)).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_expect_no_msg_fails_on_queued_message() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    send(&kit, "already here");
    let result = kit.expect_no_msg(Duration::from_secs(1));
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
}

#[test]
fn test_expect_no_msg_fails_on_late_message() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let sender = send_later(kit.test_actor(), Duration::from_millis(50), "late");
    let result = kit.expect_no_msg(Duration::from_secs(2));
    assert!(matches!(result, Err(Error::UnexpectedMessage { .. })));
    sender.join().unwrap();
}

// =============================================================================
// within
// =============================================================================

#[test]
fn test_within_fails_when_too_fast() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let result = kit.within(Duration::from_millis(200), Duration::from_secs(1), || {
        thread::sleep(Duration::from_millis(50));
        Ok(())
    });
    assert!(matches!(result, Err(Error::MinDurationNotReached { .. })));
}

#[test]
fn test_within_fails_when_too_slow() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let result = kit.within(Duration::from_millis(200), Duration::from_secs(1), || {
        thread::sleep(Duration::from_secs(2));
        Ok(())
    });
    assert!(matches!(result, Err(Error::MaxDurationExceeded { .. })));
}

#[test]
fn test_within_skips_upper_bound_after_expect_no_msg() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    kit.within(Duration::from_millis(200), Duration::from_secs(1), || {
        kit.expect_no_msg(Duration::from_secs(2))
    })
    .unwrap();
}

#[test]
fn test_within_skips_upper_bound_after_receive_while() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    kit.within(Duration::ZERO, Duration::from_millis(100), || {
        thread::sleep(Duration::from_millis(150));
        let collected = kit.receive_while(Duration::from_millis(50), None, 10, |_| Some(()));
        assert!(collected.is_empty());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_within_still_checks_min_after_expect_no_msg() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let result = kit.within(Duration::from_millis(500), Duration::from_secs(1), || {
        kit.expect_no_msg(Duration::from_millis(20))
    });
    assert!(matches!(result, Err(Error::MinDurationNotReached { .. })));
}

#[test]
fn test_within_default_timeout_is_remaining_time() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let start = Instant::now();
    let result = kit.within_max(Duration::from_millis(100), || kit.expect_msg(None, "never"));
    assert!(matches!(result, Err(Error::Timeout { .. })));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_within_nested_frames_inherit_tighter_deadline() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    assert!(matches!(kit.remaining(), Err(Error::NotWithinBlock)));
    kit.within_max(Duration::from_secs(1), || {
        let outer = kit.remaining()?;
        assert!(outer <= Duration::from_secs(1));

        kit.within_max(Duration::from_secs(10), || {
            assert!(kit.remaining()? <= outer);
            Ok(())
        })?;

        kit.within_max(Duration::from_millis(100), || {
            assert!(kit.remaining()? <= Duration::from_millis(100));
            Ok(())
        })
    })
    .unwrap();
    assert!(matches!(kit.remaining(), Err(Error::NotWithinBlock)));
}

#[test]
fn test_within_pops_frame_on_failure() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let result: probekit_core::Result<()> = kit.within_max(Duration::from_secs(1), || {
        Err(Error::assertion("block failed"))
    });
    assert!(matches!(result, Err(Error::AssertionFailure { .. })));
    assert!(matches!(kit.remaining(), Err(Error::NotWithinBlock)));
}

#[test]
fn test_within_min_beyond_outer_deadline() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let result = kit.within_max(Duration::from_millis(500), || {
        kit.within(Duration::from_secs(2), Duration::from_secs(3), || Ok(()))
    });
    assert!(matches!(result, Err(Error::DeadlineUnreachable { .. })));
}

// =============================================================================
// Ignore filter
// =============================================================================

#[test]
fn test_ignore_msg_hides_heartbeats() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    kit.ignore_msg(|m| m.downcast_ref::<&str>() == Some(&"heartbeat"));
    send(&kit, "heartbeat");
    send(&kit, "data");
    send(&kit, "heartbeat");

    kit.expect_msg(Duration::from_secs(1), "data").unwrap();
    kit.expect_no_msg(Duration::from_millis(100)).unwrap();
}

#[test]
fn test_ignore_no_msgs_restores_delivery() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    kit.ignore_msg(|_| true);
    send(&kit, "dropped");
    kit.ignore_no_msgs();
    send(&kit, "kept");

    kit.expect_msg(Duration::from_secs(1), "kept").unwrap();
    assert!(!kit.msg_available());
}

// =============================================================================
// Time dilation
// =============================================================================

#[test]
fn test_time_factor_scales_explicit_max() {
    let system = system_with_time_factor(2.0);
    let kit = TestKit::new(&system).unwrap();
    assert_eq!(kit.dilated(Duration::from_millis(500)), Duration::from_secs(1));

    let sender = send_later(kit.test_actor(), Duration::from_millis(700), "slow");
    kit.expect_msg(Duration::from_millis(500), "slow").unwrap();
    sender.join().unwrap();
}

#[test]
fn test_time_factor_delays_timeout() {
    let system = system_with_time_factor(2.0);
    let kit = TestKit::new(&system).unwrap();

    let start = Instant::now();
    let result = kit.expect_msg(Duration::from_millis(500), "never");
    assert!(matches!(result, Err(Error::Timeout { .. })));
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[test]
fn test_remaining_or_dilated() {
    let system = system_with_time_factor(3.0);
    let kit = TestKit::new(&system).unwrap();

    assert_eq!(kit.remaining_or_dilated(Duration::from_secs(1)), Duration::from_secs(3));
    assert_eq!(kit.remaining_or_dilated(None), Duration::from_secs(9));
}

// =============================================================================
// Polling
// =============================================================================

#[test]
fn test_await_cond_sees_change() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let flag = Arc::new(AtomicBool::new(false));

    let setter = {
        let flag = flag.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        })
    };

    kit.await_cond(Duration::from_secs(3), Duration::from_millis(10), || {
        flag.load(Ordering::SeqCst)
    })
    .unwrap();
    setter.join().unwrap();
}

#[test]
fn test_await_cond_times_out() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();

    let result = kit.await_cond(Duration::from_millis(100), Duration::from_millis(10), || false);
    assert!(matches!(result, Err(Error::Timeout { .. })));
}

#[test]
fn test_await_cond_aborts_on_interrupt() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let handle = InterruptHandle::current();

    let result = kit.await_cond(Duration::from_secs(10), Duration::from_millis(10), || {
        handle.interrupt();
        false
    });
    assert!(matches!(result, Err(Error::Interrupted { .. })));
}

#[test]
fn test_await_cond_zero_interval_still_polls() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let mut checks = 0;

    kit.await_cond(Duration::from_millis(100), Duration::ZERO, || {
        checks += 1;
        checks > 3
    })
    .unwrap();
    assert_eq!(checks, 4);

    let result = kit.await_cond(Duration::from_millis(20), Duration::ZERO, || false);
    assert!(matches!(result, Err(Error::Timeout { .. })));
}

#[test]
fn test_await_assert_retries_until_success() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let attempts = AtomicU32::new(0);

    let value = kit
        .await_assert(Duration::from_secs(3), Duration::from_millis(10), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Error::assertion(format!("attempt {}", n)))
            } else {
                Ok(n)
            }
        })
        .unwrap();
    assert_eq!(value, 3);
}

#[test]
fn test_await_assert_returns_last_failure_verbatim() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let attempts = AtomicU32::new(0);

    let result: anyhow::Result<()> =
        kit.await_assert(Duration::from_millis(100), Duration::from_millis(10), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Err(anyhow::anyhow!("still failing after {} attempts", n))
        });

    let error = result.unwrap_err();
    let n = attempts.load(Ordering::SeqCst);
    assert!(n > 1);
    assert_eq!(error.to_string(), format!("still failing after {} attempts", n));
}

#[test]
fn test_await_assert_zero_interval_retries() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let attempts = AtomicU32::new(0);

    let value = kit
        .await_assert(Duration::from_millis(500), Duration::ZERO, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 5 {
                Err(Error::assertion("not yet"))
            } else {
                Ok(n)
            }
        })
        .unwrap();
    assert_eq!(value, 5);
}

// =============================================================================
// State, watch and pilot on the plain kit
// =============================================================================

#[test]
fn test_last_sender_tracks_received_message() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let sender = quiet(&system);

    assert!(kit.last_message().is_none());
    kit.test_actor().tell("from quiet", Some(&sender));
    kit.expect_msg(Duration::from_secs(1), "from quiet").unwrap();
    assert_eq!(kit.last_sender(), Some(sender));

    send(&kit, "anonymous");
    kit.expect_msg(Duration::from_secs(1), "anonymous").unwrap();
    assert!(kit.last_sender().is_none());
}

#[test]
fn test_expect_terminated_after_watch() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let target = quiet(&system);

    kit.watch(&target).unwrap();
    system.stop(&target);

    let terminated = kit.expect_terminated(&target, Duration::from_secs(1)).unwrap();
    assert_eq!(terminated.actor, target);
}

#[test]
fn test_unwatch_stops_notifications() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let target = quiet(&system);

    kit.watch(&target).unwrap();
    kit.unwatch(&target).unwrap();
    system.stop(&target);

    kit.expect_no_msg(Duration::from_millis(100)).unwrap();
}

#[test]
fn test_auto_pilot_on_kit_sees_every_message() {
    let system = system();
    let kit = TestKit::new(&system).unwrap();
    let seen = Arc::new(AtomicU32::new(0));

    let counter = seen.clone();
    kit.set_auto_pilot(AutoPilot::keep_running(move |_ctx, _message| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    send(&kit, 1u32);
    send(&kit, 2u32);

    kit.receive_n(2, Duration::from_secs(1)).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

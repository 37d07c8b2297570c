//! Blocking expectations under nested deadlines
//!
//! TigerStyle: Explicit deadline stack, timed blocking dequeue, every
//! failure surfaces to the caller.
//!
//! Durations passed explicitly are scaled by the configured time factor.
//! Omitting `max` (passing `None`) inherits the time left in the enclosing
//! `within` block, or the scaled default expectation timeout outside one.

use crate::deadline::{DeadlineFrame, DeadlineStack};
use crate::poll::{deadline_after, pause, poll_interval, poll_until, time_left};
use crate::queue::MessageQueue;
use crate::test_actor::{AutoPilot, SetAutoPilot, SetIgnore, TestActor};
use parking_lot::Mutex;
use probekit_core::actor::ActorRef;
use probekit_core::config::TestKitConfig;
use probekit_core::error::{Error, Result};
use probekit_core::message::{AnyMessage, Envelope, Message, MessageClass, PoisonPill, Terminated};
use probekit_runtime::{ActorSystem, Props};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

static TEST_ACTOR_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct KitState {
    deadlines: DeadlineStack,
    last: Option<Envelope>,
    /// Whether the latest expectation was `expect_no_msg` or `receive_while`
    last_was_no_msg: bool,
}

/// Pops the frame pushed by `within`, whatever way the block exits
struct FrameGuard<'a> {
    state: &'a Mutex<KitState>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().deadlines.pop();
    }
}

/// Assertion engine around one receiving actor
///
/// Messages sent to `test_actor()` are queued and consumed by the
/// `expect_*` and `receive_*` calls, which block the calling thread.
/// A kit is meant to be driven by one thread at a time.
pub struct TestKit {
    system: ActorSystem,
    test_actor: ActorRef,
    queue: Arc<MessageQueue>,
    state: Mutex<KitState>,
}

impl TestKit {
    /// Create a kit with a fresh `test-actor-N` receiving actor
    pub fn new(system: &ActorSystem) -> Result<Self> {
        let name = format!(
            "test-actor-{}",
            TEST_ACTOR_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Self::with_actor_name(system, &name)
    }

    pub(crate) fn with_actor_name(system: &ActorSystem, name: &str) -> Result<Self> {
        let queue = Arc::new(MessageQueue::new());
        let actor_queue = Arc::clone(&queue);
        let props = Props::new(move || TestActor::new(Arc::clone(&actor_queue)))
            .calling_thread()
            .without_receive_timeout();
        let test_actor = system.spawn(props, Some(name))?;
        debug!(actor_id = %test_actor.id(), "Test kit created");

        Ok(Self {
            system: system.clone(),
            test_actor,
            queue,
            state: Mutex::new(KitState::default()),
        })
    }

    /// The receiving actor
    pub fn test_actor(&self) -> &ActorRef {
        &self.test_actor
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    pub fn settings(&self) -> &TestKitConfig {
        &self.system.config().testkit
    }

    // =========================================================================
    // Time
    // =========================================================================

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Scale `duration` by the time factor
    pub fn dilated(&self, duration: Duration) -> Duration {
        self.settings().dilated(duration)
    }

    /// Time left in the innermost `within` block
    pub fn remaining(&self) -> Result<Duration> {
        self.state
            .lock()
            .deadlines
            .remaining_at(Instant::now())
            .ok_or(Error::NotWithinBlock)
    }

    /// Time left in the innermost `within` block, or `default` outside one
    pub fn remaining_or(&self, default: Duration) -> Duration {
        self.state
            .lock()
            .deadlines
            .remaining_at(Instant::now())
            .unwrap_or(default)
    }

    /// Time left in the innermost `within` block, or the default timeout
    pub fn remaining_or_default(&self) -> Duration {
        self.remaining_or(self.settings().single_expect_default())
    }

    /// `max` scaled by the time factor, or `remaining_or_default()` if omitted
    pub fn remaining_or_dilated(&self, max: impl Into<Option<Duration>>) -> Duration {
        match max.into() {
            Some(max) => self.dilated(max),
            None => self.remaining_or_default(),
        }
    }

    /// Run `block` and check it finishes within `[min, max]`
    ///
    /// Expectations inside inherit the time left as their default timeout.
    /// The upper bound is not checked when the last expectation inside was
    /// `expect_no_msg` or `receive_while`, which wait out their timeout on
    /// purpose. An error from `block` is returned as is.
    pub fn within<R, F>(&self, min: Duration, max: Duration, block: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let min = self.dilated(min);
        let max = self.dilated(max);
        if min > max {
            return Err(Error::assertion(format!(
                "within min {:?} exceeds max {:?}",
                min, max
            )));
        }

        let start = Instant::now();
        let frame_max = {
            let mut state = self.state.lock();
            let remaining = state.deadlines.remaining_at(start).unwrap_or(Duration::MAX);
            if remaining < min {
                return Err(Error::DeadlineUnreachable { min, remaining });
            }
            let frame_max = max.min(remaining);
            state.deadlines.push(DeadlineFrame::new(min, frame_max, start))?;
            state.last_was_no_msg = false;
            frame_max
        };

        let value = {
            let _frame = FrameGuard { state: &self.state };
            block()?
        };

        let elapsed = start.elapsed();
        if elapsed < min {
            return Err(Error::MinDurationNotReached { elapsed, min });
        }
        let upper_checked = !self.state.lock().last_was_no_msg;
        if upper_checked && elapsed > frame_max {
            return Err(Error::MaxDurationExceeded {
                elapsed,
                max: frame_max,
            });
        }
        trace!(elapsed_ms = elapsed.as_millis() as u64, upper_checked, "within block passed");
        Ok(value)
    }

    /// `within` without a lower bound
    pub fn within_max<R, F>(&self, max: Duration, block: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        self.within(Duration::ZERO, max, block)
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Dequeue one message, waiting up to `max` as given (not scaled)
    pub fn receive_one(&self, max: Duration) -> Option<AnyMessage> {
        self.receive_envelope(max).map(|envelope| envelope.message)
    }

    fn receive_envelope(&self, max: Duration) -> Option<Envelope> {
        let envelope = self.queue.poll(max);
        let mut state = self.state.lock();
        state.last_was_no_msg = false;
        if let Some(envelope) = &envelope {
            state.last = Some(envelope.clone());
        }
        envelope
    }

    fn receive_or_timeout<D>(&self, max: Duration, expected: D) -> Result<Envelope>
    where
        D: FnOnce() -> String,
    {
        let start = Instant::now();
        match self.receive_envelope(max) {
            Some(envelope) => Ok(envelope),
            None => {
                let expected = expected();
                debug!(max_ms = max.as_millis() as u64, %expected, "Expectation timed out");
                Err(Error::timeout(start.elapsed(), expected))
            }
        }
    }

    /// Receive exactly `n` messages within `max`
    pub fn receive_n(&self, n: usize, max: impl Into<Option<Duration>>) -> Result<Vec<AnyMessage>> {
        let max = self.remaining_or_dilated(max);
        let stop = deadline_after(max);
        let mut received = Vec::with_capacity(n);
        while received.len() < n {
            let got = received.len();
            let envelope = self.receive_or_timeout(time_left(stop), || {
                format!("{} messages (got {})", n, got)
            })?;
            received.push(envelope.message);
        }
        Ok(received)
    }

    /// Collect messages while `matcher` accepts them
    ///
    /// Stops without failing when `matcher` returns `None`, when `max` runs
    /// out, when no message arrives for `idle`, or after `limit` messages.
    /// A message the matcher rejects stays at the head of the queue.
    pub fn receive_while<R, F>(
        &self,
        max: impl Into<Option<Duration>>,
        idle: impl Into<Option<Duration>>,
        limit: usize,
        mut matcher: F,
    ) -> Vec<R>
    where
        F: FnMut(&AnyMessage) -> Option<R>,
    {
        let max = self.remaining_or_dilated(max);
        let idle = idle.into().unwrap_or(Duration::MAX);
        let stop = deadline_after(max);
        let mut collected = Vec::new();

        while collected.len() < limit {
            let left = time_left(stop);
            if left.is_zero() {
                break;
            }
            let previous = self.state.lock().last.clone();
            let Some(envelope) = self.receive_envelope(left.min(idle)) else {
                break;
            };
            match matcher(&envelope.message) {
                Some(value) => collected.push(value),
                None => {
                    self.state.lock().last = previous;
                    self.queue.push_front(envelope);
                    break;
                }
            }
        }

        self.state.lock().last_was_no_msg = true;
        trace!(collected = collected.len(), limit, "receive_while finished");
        collected
    }

    /// Consume messages until `f` returns `Some(true)`
    ///
    /// `Some(false)` skips the message; `None` fails right away.
    pub fn fish_for_message<F>(
        &self,
        max: impl Into<Option<Duration>>,
        hint: &str,
        mut f: F,
    ) -> Result<AnyMessage>
    where
        F: FnMut(&AnyMessage) -> Option<bool>,
    {
        let max = self.remaining_or_dilated(max);
        let stop = deadline_after(max);
        loop {
            let envelope = self.receive_or_timeout(time_left(stop), || {
                format!("fish_for_message ({})", hint)
            })?;
            match f(&envelope.message) {
                Some(true) => return Ok(envelope.message),
                Some(false) => trace!(message = ?envelope.message, "Fished past message"),
                None => {
                    return Err(Error::unexpected(
                        hint.to_string(),
                        format!("{:?}", envelope.message),
                    ))
                }
            }
        }
    }

    // =========================================================================
    // Expectations
    // =========================================================================

    /// Expect a message equal to `expected`
    pub fn expect_msg<T>(&self, max: impl Into<Option<Duration>>, expected: T) -> Result<T>
    where
        T: Message + PartialEq + Clone,
    {
        let max = self.remaining_or_dilated(max);
        let envelope = self.receive_or_timeout(max, || format!("{:?}", expected))?;
        match envelope.message.downcast_ref::<T>() {
            Some(actual) if *actual == expected => Ok(actual.clone()),
            _ => Err(Error::unexpected(
                format!("{:?}", expected),
                format!("{:?}", envelope.message),
            )),
        }
    }

    /// Expect any message of type `T`
    pub fn expect_msg_type<T>(&self, max: impl Into<Option<Duration>>) -> Result<T>
    where
        T: Message + Clone,
    {
        let max = self.remaining_or_dilated(max);
        let class = MessageClass::of::<T>();
        let envelope = self.receive_or_timeout(max, || format!("message of type {}", class))?;
        envelope
            .message
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| {
                Error::unexpected(
                    format!("message of type {}", class),
                    format!("{:?}", envelope.message),
                )
            })
    }

    /// Expect a message of one of `classes`
    pub fn expect_msg_any_type_of(
        &self,
        max: impl Into<Option<Duration>>,
        classes: &[MessageClass],
    ) -> Result<AnyMessage> {
        let max = self.remaining_or_dilated(max);
        let describe = || {
            let names: Vec<&str> = classes.iter().map(MessageClass::name).collect();
            format!("message of any type of [{}]", names.join(", "))
        };
        let envelope = self.receive_or_timeout(max, describe)?;
        if classes.iter().any(|class| class.matches(&envelope.message)) {
            Ok(envelope.message)
        } else {
            Err(Error::unexpected(
                describe(),
                format!("{:?}", envelope.message),
            ))
        }
    }

    /// Expect a message equal to one of `candidates`
    pub fn expect_msg_any_of<T>(
        &self,
        max: impl Into<Option<Duration>>,
        candidates: &[T],
    ) -> Result<T>
    where
        T: Message + PartialEq + Clone,
    {
        let max = self.remaining_or_dilated(max);
        let envelope = self.receive_or_timeout(max, || format!("any of {:?}", candidates))?;
        match envelope.message.downcast_ref::<T>() {
            Some(actual) if candidates.contains(actual) => Ok(actual.clone()),
            _ => Err(Error::unexpected(
                format!("any of {:?}", candidates),
                format!("{:?}", envelope.message),
            )),
        }
    }

    /// Expect messages covering `candidates` as a multiset, in any order
    ///
    /// Each arrival is paired with the first still unmatched equal
    /// candidate. Returns the messages in arrival order.
    pub fn expect_msg_all_of<T>(
        &self,
        max: impl Into<Option<Duration>>,
        candidates: &[T],
    ) -> Result<Vec<T>>
    where
        T: Message + PartialEq + Clone,
    {
        let max = self.remaining_or_dilated(max);
        let stop = deadline_after(max);
        let mut unmatched: Vec<&T> = candidates.iter().collect();
        let mut received = Vec::with_capacity(candidates.len());

        while !unmatched.is_empty() {
            let envelope = self.receive_or_timeout(time_left(stop), || {
                format!("all of {:?}, missing {:?}", candidates, unmatched)
            })?;
            let position = envelope
                .message
                .downcast_ref::<T>()
                .and_then(|actual| unmatched.iter().position(|candidate| *candidate == actual));
            let Some(index) = position else {
                return Err(Error::unexpected(
                    format!("one of {:?}", unmatched),
                    format!("{:?}", envelope.message),
                ));
            };
            received.push(unmatched.remove(index).clone());
        }
        Ok(received)
    }

    /// Receive one message and apply `matcher` to it
    ///
    /// Fails right away, citing `hint`, when the matcher returns `None`.
    pub fn expect_msg_pf<R, F>(
        &self,
        max: impl Into<Option<Duration>>,
        hint: &str,
        matcher: F,
    ) -> Result<R>
    where
        F: FnOnce(&AnyMessage) -> Option<R>,
    {
        let max = self.remaining_or_dilated(max);
        let envelope = self.receive_or_timeout(max, || hint.to_string())?;
        matcher(&envelope.message)
            .ok_or_else(|| Error::unexpected(hint.to_string(), format!("{:?}", envelope.message)))
    }

    /// Expect no message for `max`
    ///
    /// Omitting `max` waits for the time left in the enclosing `within`
    /// block, or the configured no-message default outside one.
    pub fn expect_no_msg(&self, max: impl Into<Option<Duration>>) -> Result<()> {
        let max = match max.into() {
            Some(max) => self.dilated(max),
            None => self.remaining_or(self.settings().expect_no_msg_default()),
        };
        let received = self.receive_envelope(max);
        self.state.lock().last_was_no_msg = true;
        match received {
            None => Ok(()),
            Some(envelope) => Err(Error::unexpected(
                "no message",
                format!("{:?}", envelope.message),
            )),
        }
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Poll `predicate` every `interval` until it holds or `max` elapses
    ///
    /// Intervals under a millisecond are raised to one.
    pub fn await_cond<F>(
        &self,
        max: impl Into<Option<Duration>>,
        interval: impl Into<Option<Duration>>,
        predicate: F,
    ) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        let max = self.remaining_or_dilated(max);
        let interval = interval
            .into()
            .unwrap_or_else(|| self.settings().await_interval_default());
        let start = Instant::now();
        if poll_until(max, interval, predicate)? {
            Ok(())
        } else {
            Err(Error::timeout(start.elapsed(), "condition to become true"))
        }
    }

    /// Retry `assertion` every `interval` until it passes or `max` elapses
    ///
    /// Failures are swallowed while time is left; the last one is returned
    /// unchanged once it runs out.
    pub fn await_assert<T, E, F>(
        &self,
        max: impl Into<Option<Duration>>,
        interval: impl Into<Option<Duration>>,
        mut assertion: F,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnMut() -> std::result::Result<T, E>,
    {
        let max = self.remaining_or_dilated(max);
        let interval = poll_interval(
            interval
                .into()
                .unwrap_or_else(|| self.settings().await_interval_default()),
        );
        let stop = deadline_after(max);
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match assertion() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if time_left(stop) <= interval {
                        debug!(attempts, "await_assert gave up");
                        return Err(e);
                    }
                }
            }
            pause(interval, "await_assert").map_err(E::from)?;
        }
    }

    // =========================================================================
    // Filter, pilot and state
    // =========================================================================

    /// Drop every incoming message for which `filter` returns true
    pub fn ignore_msg<F>(&self, filter: F)
    where
        F: Fn(&AnyMessage) -> bool + Send + Sync + 'static,
    {
        self.test_actor.tell(SetIgnore(Some(Arc::new(filter))), None);
    }

    /// Stop ignoring messages
    pub fn ignore_no_msgs(&self) {
        self.test_actor.tell(SetIgnore(None), None);
    }

    /// Install an auto-pilot on the receiving actor
    pub fn set_auto_pilot(&self, pilot: AutoPilot) {
        self.test_actor.tell(SetAutoPilot::new(pilot), None);
    }

    /// Whether a message is waiting in the queue
    pub fn msg_available(&self) -> bool {
        !self.queue.is_empty()
    }

    /// The most recently received envelope
    pub fn last_message(&self) -> Option<Envelope> {
        self.state.lock().last.clone()
    }

    /// Sender of the most recently received message
    pub fn last_sender(&self) -> Option<ActorRef> {
        self.state
            .lock()
            .last
            .as_ref()
            .and_then(|envelope| envelope.sender.clone())
    }

    // =========================================================================
    // Death watch
    // =========================================================================

    /// Get `Terminated` for `target` once it stops
    pub fn watch(&self, target: &ActorRef) -> Result<()> {
        self.system.watch(&self.test_actor, target)
    }

    pub fn unwatch(&self, target: &ActorRef) -> Result<()> {
        self.system.unwatch(&self.test_actor, target)
    }

    /// Expect the `Terminated` of a watched `target`
    pub fn expect_terminated(
        &self,
        target: &ActorRef,
        max: impl Into<Option<Duration>>,
    ) -> Result<Terminated> {
        let hint = format!("Terminated({})", target.id());
        self.expect_msg_pf(max, &hint, |message| {
            message
                .downcast_ref::<Terminated>()
                .filter(|terminated| terminated.actor == *target)
                .cloned()
        })
    }
}

impl Drop for TestKit {
    fn drop(&mut self) {
        self.test_actor.tell(PoisonPill, None);
    }
}

impl fmt::Debug for TestKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestKit")
            .field("test_actor", &self.test_actor)
            .field("queued", &self.queue.len())
            .finish()
    }
}

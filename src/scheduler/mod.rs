//! Cooperative, delay-based step scheduling.
//!
//! Animations never sleep; they ask a [`Scheduler`] to call them back.
//! [`TickScheduler`] is the stock implementation: a deterministic queue over
//! a logical millisecond clock, advanced explicitly by tests or pumped
//! against real time by the async [`drive`] loop.
//!
//! Contract highlights:
//! - [`Scheduler::step`] delivers `subject.step(None)` at the next
//!   opportunity — the out-of-band "recompute now" signal.
//! - [`Scheduler::step_after`] delivers `subject.step(Some(elapsed))` no
//!   sooner than the requested delay; `elapsed` is the *actual* logical time
//!   since the request, so coalescing and late firing stay accurate.
//! - Requests for one subject coalesce: only the last pending one fires.
//! - Within one tick, subjects fire in FIFO request order. A request made
//!   *during* a tick never fires in that same tick: it waits for its own,
//!   strictly later due time, or — when due immediately — for the next
//!   [`TickScheduler::advance`]/[`TickScheduler::run_pending`] call.
//! - Firing a request whose subject has since been destroyed is a no-op on
//!   the subject side; the scheduler neither knows nor cares.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// Stable identity of a step subject, used for request coalescing.
pub type SubjectId = u64;

static NEXT_SUBJECT_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate a fresh, process-unique [`SubjectId`].
pub fn next_subject_id() -> SubjectId {
    NEXT_SUBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Something a scheduler can call back into.
///
/// `delay` is `None` for an out-of-band step (not part of an ordered delay
/// sequence) and `Some(elapsed)` for a scheduled tick.
pub trait Subject {
    /// Identity for coalescing. Must be stable for the subject's lifetime.
    fn subject_id(&self) -> SubjectId;

    /// Advance the subject. Must tolerate being called after the underlying
    /// work was destroyed (and do nothing in that case).
    fn step(&self, delay: Option<Duration>);
}

// ---------------------------------------------------------------------------
// Scheduler trait
// ---------------------------------------------------------------------------

/// A cooperative callback dispatcher.
///
/// Injected into the rule chain at construction so the whole pipeline can be
/// driven by a deterministic clock in tests.
pub trait Scheduler {
    /// Call `subject.step(None)` at the next opportunity.
    fn step(&self, subject: Rc<dyn Subject>);

    /// Call `subject.step(Some(elapsed))` no sooner than `delay` from now.
    fn step_after(&self, subject: Rc<dyn Subject>, delay: Duration);
}

// ---------------------------------------------------------------------------
// TickScheduler
// ---------------------------------------------------------------------------

struct Pending {
    subject_id: SubjectId,
    subject: Rc<dyn Subject>,
    /// Logical due time in ms. For out-of-band requests this is the request
    /// time itself.
    due_ms: u64,
    /// Logical time the request was (last) made, for elapsed computation.
    requested_at_ms: u64,
    /// Request sequence number; FIFO order within a tick, and the fence that
    /// keeps re-entrant requests out of the tick that spawned them.
    seq: u64,
    /// Out-of-band request: deliver `None` instead of elapsed time.
    out_of_band: bool,
}

struct TickState {
    now_ms: u64,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// Deterministic scheduler over a logical millisecond clock.
///
/// Time only moves when [`TickScheduler::advance`] (or [`drive`]) moves it.
pub struct TickScheduler {
    inner: RefCell<TickState>,
}

impl TickScheduler {
    /// Create a scheduler at logical time zero with nothing pending.
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(TickState {
                now_ms: 0,
                next_seq: 0,
                pending: Vec::new(),
            }),
        }
    }

    /// Current logical time.
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.inner.borrow().now_ms)
    }

    /// Whether any request is pending.
    pub fn has_pending(&self) -> bool {
        !self.inner.borrow().pending.is_empty()
    }

    /// Time until the earliest pending request is due, if any. Zero when a
    /// request is already due.
    pub fn time_until_next(&self) -> Option<Duration> {
        let state = self.inner.borrow();
        state
            .pending
            .iter()
            .map(|p| p.due_ms.saturating_sub(state.now_ms))
            .min()
            .map(Duration::from_millis)
    }

    /// Move the logical clock forward by `by` and fire everything that comes
    /// due, tick by tick in FIFO order.
    ///
    /// A frame-style re-request (strictly later due time) made while firing
    /// runs when its own tick is reached; an immediately-due re-request
    /// waits for the next call. Either way nothing recurses synchronously.
    pub fn advance(&self, by: Duration) {
        let (target_ms, fence_seq) = {
            let state = self.inner.borrow();
            (
                state.now_ms + by.as_millis() as u64,
                state.next_seq,
            )
        };

        // A request is eligible in this call if it predates it, or if it is
        // due strictly after the instant it was made (so zero-delay
        // self-rescheduling cannot spin the clock in place).
        let eligible =
            |p: &Pending| p.seq < fence_seq || p.due_ms > p.requested_at_ms;

        loop {
            // One tick: everything eligible and due at the earliest pending
            // due time.
            let batch = {
                let mut state = self.inner.borrow_mut();
                let tick_ms = state
                    .pending
                    .iter()
                    .filter(|p| eligible(p) && p.due_ms <= target_ms)
                    .map(|p| p.due_ms)
                    .min();
                let Some(tick_ms) = tick_ms else {
                    state.now_ms = target_ms;
                    break;
                };
                state.now_ms = state.now_ms.max(tick_ms);
                let now_ms = state.now_ms;

                let mut batch: Vec<Pending> = Vec::new();
                let mut keep: Vec<Pending> = Vec::new();
                for p in state.pending.drain(..) {
                    if eligible(&p) && p.due_ms <= now_ms {
                        batch.push(p);
                    } else {
                        keep.push(p);
                    }
                }
                state.pending = keep;
                batch.sort_by_key(|p| p.seq);
                batch
            };

            let now_ms = self.inner.borrow().now_ms;
            for p in &batch {
                let delay = if p.out_of_band {
                    None
                } else {
                    Some(Duration::from_millis(now_ms - p.requested_at_ms))
                };
                p.subject.step(delay);
            }
        }
    }

    /// Fire everything already due at the current logical time (one pass).
    pub fn run_pending(&self) {
        self.advance(Duration::ZERO);
    }

    fn enqueue(&self, subject: Rc<dyn Subject>, delay: Option<Duration>) {
        let mut state = self.inner.borrow_mut();
        let subject_id = subject.subject_id();
        // Coalesce: only the last pending request per subject is honored.
        state.pending.retain(|p| p.subject_id != subject_id);
        let seq = state.next_seq;
        state.next_seq += 1;
        let now_ms = state.now_ms;
        state.pending.push(Pending {
            subject_id,
            subject,
            due_ms: now_ms + delay.unwrap_or(Duration::ZERO).as_millis() as u64,
            requested_at_ms: now_ms,
            seq,
            out_of_band: delay.is_none(),
        });
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TickScheduler {
    fn step(&self, subject: Rc<dyn Subject>) {
        self.enqueue(subject, None);
    }

    fn step_after(&self, subject: Rc<dyn Subject>, delay: Duration) {
        self.enqueue(subject, Some(delay));
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("TickScheduler")
            .field("now_ms", &state.now_ms)
            .field("pending", &state.pending.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Async driver
// ---------------------------------------------------------------------------

/// Pump a [`TickScheduler`] against real time until nothing is pending.
///
/// For embedders running inside a tokio runtime; tests and synchronous hosts
/// call [`TickScheduler::advance`] directly instead.
pub async fn drive(scheduler: &TickScheduler) {
    while let Some(wait) = scheduler.time_until_next() {
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        scheduler.advance(wait);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Test subject that records every delivery.
    struct Probe {
        id: SubjectId,
        log: Rc<RefCell<Vec<(SubjectId, Option<Duration>)>>>,
    }

    impl Subject for Probe {
        fn subject_id(&self) -> SubjectId {
            self.id
        }
        fn step(&self, delay: Option<Duration>) {
            self.log.borrow_mut().push((self.id, delay));
        }
    }

    fn probe(log: &Rc<RefCell<Vec<(SubjectId, Option<Duration>)>>>) -> Rc<Probe> {
        Rc::new(Probe {
            id: next_subject_id(),
            log: log.clone(),
        })
    }

    #[test]
    fn asap_step_delivers_none() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let p = probe(&log);

        scheduler.step(p.clone());
        scheduler.run_pending();
        assert_eq!(*log.borrow(), vec![(p.id, None)]);
    }

    #[test]
    fn delayed_step_waits_for_advance() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let p = probe(&log);

        scheduler.step_after(p.clone(), Duration::from_millis(100));
        scheduler.advance(Duration::from_millis(50));
        assert!(log.borrow().is_empty());

        scheduler.advance(Duration::from_millis(50));
        assert_eq!(*log.borrow(), vec![(p.id, Some(Duration::from_millis(100)))]);
    }

    #[test]
    fn big_jump_fires_at_due_time() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let p = probe(&log);

        scheduler.step_after(p.clone(), Duration::from_millis(100));
        // One big jump well past the due time: the subject fires when it
        // comes due, and the clock still ends up at the jump target.
        scheduler.advance(Duration::from_millis(250));
        assert_eq!(*log.borrow(), vec![(p.id, Some(Duration::from_millis(100)))]);
        assert_eq!(scheduler.now(), Duration::from_millis(250));
    }

    #[test]
    fn requests_coalesce_per_subject() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let p = probe(&log);

        scheduler.step_after(p.clone(), Duration::from_millis(10));
        scheduler.step_after(p.clone(), Duration::from_millis(500));
        scheduler.advance(Duration::from_millis(100));
        // First request was replaced; nothing due yet.
        assert!(log.borrow().is_empty());

        scheduler.advance(Duration::from_millis(400));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn fifo_within_a_tick() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let a = probe(&log);
        let b = probe(&log);
        let c = probe(&log);

        scheduler.step_after(b.clone(), Duration::from_millis(10));
        scheduler.step_after(c.clone(), Duration::from_millis(10));
        scheduler.step_after(a.clone(), Duration::from_millis(10));
        scheduler.advance(Duration::from_millis(10));

        let order: Vec<SubjectId> = log.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![b.id, c.id, a.id]);
    }

    #[test]
    fn distinct_due_times_fire_in_time_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let a = probe(&log);
        let b = probe(&log);

        scheduler.step_after(a.clone(), Duration::from_millis(200));
        scheduler.step_after(b.clone(), Duration::from_millis(100));
        scheduler.advance(Duration::from_millis(300));

        let order: Vec<SubjectId> = log.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![b.id, a.id]);
        // Elapsed is measured per request.
        assert_eq!(log.borrow()[0].1, Some(Duration::from_millis(100)));
        assert_eq!(log.borrow()[1].1, Some(Duration::from_millis(200)));
    }

    #[test]
    fn reentrant_request_waits_for_next_tick() {
        // A subject that reschedules itself from inside `step`.
        struct Rescheduler {
            id: SubjectId,
            scheduler: Rc<TickScheduler>,
            fired: Rc<std::cell::Cell<u32>>,
        }
        impl Subject for Rescheduler {
            fn subject_id(&self) -> SubjectId {
                self.id
            }
            fn step(&self, _delay: Option<Duration>) {
                self.fired.set(self.fired.get() + 1);
                if self.fired.get() < 10 {
                    // Re-entrant: must not recurse synchronously.
                    self.scheduler
                        .step_after(make(self), Duration::ZERO);
                }
            }
        }
        fn make(r: &Rescheduler) -> Rc<dyn Subject> {
            Rc::new(Rescheduler {
                id: r.id,
                scheduler: r.scheduler.clone(),
                fired: r.fired.clone(),
            })
        }

        let scheduler = Rc::new(TickScheduler::new());
        let fired = Rc::new(std::cell::Cell::new(0));
        let subject = Rc::new(Rescheduler {
            id: next_subject_id(),
            scheduler: scheduler.clone(),
            fired: fired.clone(),
        });

        scheduler.step(subject);
        scheduler.run_pending();
        // Exactly one firing per pass; the re-request waited.
        assert_eq!(fired.get(), 1);
        scheduler.run_pending();
        assert_eq!(fired.get(), 2);
        assert!(scheduler.has_pending());
    }

    #[test]
    fn time_until_next_reports_gap() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        assert_eq!(scheduler.time_until_next(), None);

        scheduler.step_after(probe(&log), Duration::from_millis(40));
        assert_eq!(scheduler.time_until_next(), Some(Duration::from_millis(40)));

        scheduler.advance(Duration::from_millis(15));
        assert_eq!(scheduler.time_until_next(), Some(Duration::from_millis(25)));
    }

    #[test]
    fn drive_pumps_until_idle() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let p = probe(&log);
        scheduler.step_after(p.clone(), Duration::from_millis(5));
        scheduler.step(p.clone());

        tokio_test::block_on(drive(&scheduler));
        assert!(!scheduler.has_pending());
        // Coalesced to the out-of-band request.
        assert_eq!(*log.borrow(), vec![(p.id, None)]);
    }
}

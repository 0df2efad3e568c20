#![forbid(unsafe_code)]

//! Deterministic clock and timer queue.
//!
//! The host owns time. It calls [`Scheduler::pop_due`] in a loop up to a
//! deadline and routes each fired timer back to its owner by [`TimerId`].
//! Owners hold a [`TimerGuard`]; dropping the guard cancels the timer, so a
//! component that is reset or dropped can never be woken by a stale timer.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer is for. Only used for routing diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next element lookup attempt.
    LocatorRetry,
    /// Pause between two bridge commands.
    BridgeSettle,
    /// Unacknowledged bridge command watchdog.
    BridgeStall,
    /// Delayed tour auto-start.
    AutoStart,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub due: Duration,
}

#[derive(Debug)]
struct Entry {
    id: TimerId,
    kind: TimerKind,
    due: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    now: Duration,
    next_id: u64,
    entries: Vec<Entry>,
}

/// Shared deterministic clock with a timer queue.
///
/// Cloning is cheap and yields a handle to the same clock.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
    /// Create a scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current monotonic time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Move the clock forward without firing anything.
    ///
    /// Time never goes backwards; an earlier `now` is ignored.
    pub fn set_now(&self, now: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(now);
    }

    /// Schedule a timer `delay` from now.
    #[must_use = "dropping the guard cancels the timer"]
    pub fn schedule(&self, kind: TimerKind, delay: Duration) -> TimerGuard {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = TimerId(inner.next_id);
        let due = inner.now.saturating_add(delay);
        inner.entries.push(Entry { id, kind, due });
        tracing::trace!(?id, ?kind, ?due, "timer scheduled");
        TimerGuard {
            inner: Rc::clone(&self.inner),
            id,
            kind,
        }
    }

    /// Remove and return the earliest timer due at or before `deadline`,
    /// advancing the clock to its due time.
    ///
    /// Ties fire in scheduling order.
    pub fn pop_due(&self, deadline: Duration) -> Option<FiredTimer> {
        let mut inner = self.inner.borrow_mut();
        let (pos, _) = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= deadline)
            .min_by_key(|(_, e)| (e.due, e.id))?;
        let entry = inner.entries.remove(pos);
        inner.now = inner.now.max(entry.due);
        Some(FiredTimer {
            id: entry.id,
            kind: entry.kind,
            due: entry.due,
        })
    }

    /// Due time of the earliest pending timer.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.inner.borrow().entries.iter().map(|e| e.due).min()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether a timer of `kind` is pending.
    #[must_use]
    pub fn has_pending(&self, kind: TimerKind) -> bool {
        self.inner.borrow().entries.iter().any(|e| e.kind == kind)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &inner.now)
            .field("pending", &inner.entries.len())
            .finish()
    }
}

/// RAII handle for a scheduled timer. Dropping it cancels the timer.
#[must_use = "dropping the guard cancels the timer"]
pub struct TimerGuard {
    inner: Rc<RefCell<Inner>>,
    id: TimerId,
    kind: TimerKind,
}

impl TimerGuard {
    /// The timer's id, as reported by [`FiredTimer::id`].
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// The timer's kind.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Whether `fired` is this timer.
    pub fn matches(&self, fired: &FiredTimer) -> bool {
        self.id == fired.id
    }
}

impl fmt::Debug for TimerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerGuard")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != self.id);
        if inner.entries.len() != before {
            tracing::trace!(id = ?self.id, kind = ?self.kind, "timer cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn fires_in_due_order() {
        let s = Scheduler::new();
        let late = s.schedule(TimerKind::AutoStart, MS * 500);
        let early = s.schedule(TimerKind::LocatorRetry, MS * 50);

        let first = s.pop_due(MS * 1000).unwrap();
        assert!(early.matches(&first));
        assert_eq!(s.now(), MS * 50);

        let second = s.pop_due(MS * 1000).unwrap();
        assert!(late.matches(&second));
        assert_eq!(s.now(), MS * 500);
        assert!(s.pop_due(MS * 1000).is_none());
    }

    #[test]
    fn nothing_fires_before_deadline() {
        let s = Scheduler::new();
        let _t = s.schedule(TimerKind::BridgeSettle, MS * 30);
        assert!(s.pop_due(MS * 29).is_none());
        assert_eq!(s.next_due(), Some(MS * 30));
        assert!(s.pop_due(MS * 30).is_some());
    }

    #[test]
    fn dropping_guard_cancels() {
        let s = Scheduler::new();
        let guard = s.schedule(TimerKind::LocatorRetry, MS * 10);
        assert!(s.has_pending(TimerKind::LocatorRetry));
        drop(guard);
        assert_eq!(s.pending(), 0);
        assert!(s.pop_due(MS * 100).is_none());
    }

    #[test]
    fn ties_fire_in_scheduling_order() {
        let s = Scheduler::new();
        let a = s.schedule(TimerKind::BridgeSettle, MS * 5);
        let b = s.schedule(TimerKind::LocatorRetry, MS * 5);
        assert!(a.matches(&s.pop_due(MS * 5).unwrap()));
        assert!(b.matches(&s.pop_due(MS * 5).unwrap()));
    }

    #[test]
    fn schedule_is_relative_to_now() {
        let s = Scheduler::new();
        s.set_now(MS * 100);
        let _t = s.schedule(TimerKind::AutoStart, MS * 500);
        assert_eq!(s.next_due(), Some(MS * 600));
        s.set_now(MS * 10);
        assert_eq!(s.now(), MS * 100);
    }
}

#![forbid(unsafe_code)]

//! Element locator: selector to live rectangle.
//!
//! A lookup that misses is retried on a progressive backoff
//! (`base_delay × attempt`, capped at `max_delay`) until `max_attempts`
//! retries have missed, then the locator settles on
//! [`LocateStatus::NotFound`] and stops polling. Once the element is found,
//! the locator holds four bindings (body mutations, element resize, window
//! scroll, window resize); each delivered signal triggers one synchronous,
//! non-retrying recompute.
//!
//! # Invariants
//!
//! 1. At most one retry timer is pending.
//! 2. Bindings and the retry timer are guards; changing the selector,
//!    calling [`ElementLocator::release`], or dropping the locator releases
//!    all of them.
//! 3. A new selector or an explicit [`ElementLocator::recalculate`] resets
//!    the retry counter.

use std::time::Duration;

use nostour_core::dom::{Binding, BindingGuard, DomHost};
use nostour_core::geometry::Rect;

use crate::scheduler::{FiredTimer, Scheduler, TimerGuard, TimerKind};

/// Retry schedule for element lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Retries after the immediate lookup misses.
    pub max_attempts: u32,
    /// Delay unit; retry `n` waits `base_delay × n`.
    pub base_delay: Duration,
    /// Cap for a single retry delay.
    pub max_delay: Duration,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl LocatorConfig {
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }

    /// Total time spent waiting before the locator gives up.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|n| self.retry_delay(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Where a lookup stands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LocateStatus {
    /// No selector set.
    #[default]
    Idle,
    /// Missed so far; retry `attempt` is scheduled.
    Searching { attempt: u32 },
    /// Present, with its viewport-relative rectangle.
    Found(Rect),
    /// Blank selector, retries exhausted, or the element went away.
    NotFound,
}

/// Resolves one selector at a time and keeps its rectangle fresh.
#[derive(Debug)]
pub struct ElementLocator {
    config: LocatorConfig,
    scheduler: Scheduler,
    selector: Option<String>,
    status: LocateStatus,
    attempts: u32,
    retry: Option<TimerGuard>,
    watchers: Vec<BindingGuard>,
}

impl ElementLocator {
    pub fn new(scheduler: Scheduler, config: LocatorConfig) -> Self {
        Self {
            config,
            scheduler,
            selector: None,
            status: LocateStatus::Idle,
            attempts: 0,
            retry: None,
            watchers: Vec::new(),
        }
    }

    pub fn status(&self) -> LocateStatus {
        self.status
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// The element's current rectangle, if found.
    pub fn rect(&self) -> Option<Rect> {
        match self.status {
            LocateStatus::Found(rect) => Some(rect),
            _ => None,
        }
    }

    /// Retries spent on the current selector.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether layout signals are being observed.
    pub fn is_watching(&self) -> bool {
        !self.watchers.is_empty()
    }

    /// Point the locator at `selector` and look it up.
    ///
    /// Releases everything held for the previous selector first. Setting the
    /// same selector again is a no-op.
    pub fn set_selector<H: DomHost + ?Sized>(&mut self, host: &H, selector: &str) -> LocateStatus {
        if self.selector.as_deref() == Some(selector) && self.status != LocateStatus::Idle {
            return self.status;
        }
        self.release();
        self.selector = Some(selector.to_string());
        self.lookup(host)
    }

    /// Re-run the lookup from scratch with a fresh retry budget.
    pub fn recalculate<H: DomHost + ?Sized>(&mut self, host: &H) -> LocateStatus {
        if self.selector.is_none() {
            return self.status;
        }
        self.retry = None;
        self.attempts = 0;
        self.lookup(host)
    }

    /// Route a fired timer. Returns false if it was not this locator's.
    pub fn on_timer<H: DomHost + ?Sized>(&mut self, host: &H, fired: &FiredTimer) -> bool {
        if !self.retry.as_ref().is_some_and(|t| t.matches(fired)) {
            return false;
        }
        self.retry = None;
        self.lookup(host);
        true
    }

    /// A layout-affecting signal arrived: recompute once, without retrying.
    ///
    /// Ignored unless the locator is watching.
    pub fn on_layout_signal<H: DomHost + ?Sized>(&mut self, host: &H) -> LocateStatus {
        if !self.is_watching() {
            return self.status;
        }
        let Some(selector) = self.selector.as_deref() else {
            return self.status;
        };
        self.status = match host.query_rect(selector) {
            Some(rect) => LocateStatus::Found(rect),
            None => {
                tracing::debug!(selector, "tracked element disappeared");
                LocateStatus::NotFound
            }
        };
        self.status
    }

    /// Smooth-scroll the element to the center of the viewport.
    ///
    /// Returns false when there is no selector or the element is absent.
    pub fn scroll_into_view<H: DomHost + ?Sized>(&self, host: &mut H) -> bool {
        match self.selector.as_deref() {
            Some(selector) if !selector.trim().is_empty() => host.scroll_into_view(selector),
            _ => false,
        }
    }

    /// Drop the selector, the retry timer and every binding.
    pub fn release(&mut self) {
        self.retry = None;
        self.watchers.clear();
        self.selector = None;
        self.attempts = 0;
        self.status = LocateStatus::Idle;
    }

    fn lookup<H: DomHost + ?Sized>(&mut self, host: &H) -> LocateStatus {
        let Some(selector) = self.selector.as_deref() else {
            self.status = LocateStatus::Idle;
            return self.status;
        };
        if selector.trim().is_empty() {
            self.status = LocateStatus::NotFound;
            return self.status;
        }
        match host.query_rect(selector) {
            Some(rect) => {
                tracing::trace!(selector, attempts = self.attempts, "element located");
                if self.watchers.is_empty() {
                    let bindings = host.bindings();
                    self.watchers = vec![
                        bindings.bind(Binding::BodyMutations),
                        bindings.bind(Binding::ElementResize(selector.to_string())),
                        bindings.bind(Binding::WindowScroll),
                        bindings.bind(Binding::WindowResize),
                    ];
                }
                self.status = LocateStatus::Found(rect);
            }
            None if self.attempts < self.config.max_attempts => {
                self.attempts += 1;
                let delay = self.config.retry_delay(self.attempts);
                self.retry = Some(self.scheduler.schedule(TimerKind::LocatorRetry, delay));
                self.status = LocateStatus::Searching {
                    attempt: self.attempts,
                };
            }
            None => {
                tracing::debug!(selector, attempts = self.attempts, "element not found, giving up");
                self.status = LocateStatus::NotFound;
            }
        }
        self.status
    }
}

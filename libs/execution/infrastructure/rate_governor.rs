//! Rate Governor - Sliding-Window Admission Control for Outbound Calls
//!
//! Provides:
//! - Independent dual budgets (burst + sustained) per endpoint class
//! - Blocking `admit` that computes the exact wait until a slot frees
//! - Non-blocking `try_admit` for callers that reschedule instead of waiting
//! - A safety margin so deployments run below the exchange's advertised
//!   limits, absorbing clock skew and network jitter
//!
//! A call is never dropped: at worst the caller sleeps until the oldest
//! timestamp in a full window expires. The governor keeps time with
//! `tokio::time::Instant` so tests can drive it under a paused clock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Endpoint classes with independent budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointClass {
    OrderSubmit,
    OrderCancel,
    Batch,
    Query,
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointClass::OrderSubmit => write!(f, "order-submit"),
            EndpointClass::OrderCancel => write!(f, "order-cancel"),
            EndpointClass::Batch => write!(f, "batch"),
            EndpointClass::Query => write!(f, "query"),
        }
    }
}

/// A single sliding window: at most `max_calls` within `window_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub max_calls: u32,
    pub window_ms: u64,
}

impl WindowLimit {
    pub fn new(max_calls: u32, window_ms: u64) -> Self {
        Self {
            max_calls,
            window_ms,
        }
    }

    pub fn per_seconds(max_calls: u32, secs: u64) -> Self {
        Self::new(max_calls, secs * 1_000)
    }

    pub fn per_minutes(max_calls: u32, mins: u64) -> Self {
        Self::new(max_calls, mins * 60_000)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Burst + sustained budget for one endpoint class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBudget {
    pub burst: WindowLimit,
    pub sustained: WindowLimit,
}

impl ClassBudget {
    pub fn new(burst: WindowLimit, sustained: WindowLimit) -> Self {
        Self { burst, sustained }
    }
}

/// Injectable rate-limit configuration.
///
/// Defaults follow the exchange's published limits scaled by an 80% safety
/// margin; tests inject tiny windows instead of relying on these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub order_submit: ClassBudget,
    pub order_cancel: ClassBudget,
    pub batch: ClassBudget,
    pub query: ClassBudget,
    /// Fraction of each configured max actually used (0 < margin <= 1)
    pub safety_margin: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            order_submit: ClassBudget::new(
                WindowLimit::per_seconds(30, 10),
                WindowLimit::per_minutes(600, 10),
            ),
            order_cancel: ClassBudget::new(
                WindowLimit::per_seconds(50, 10),
                WindowLimit::per_minutes(1_000, 10),
            ),
            batch: ClassBudget::new(
                WindowLimit::per_seconds(10, 10),
                WindowLimit::per_minutes(150, 10),
            ),
            query: ClassBudget::new(
                WindowLimit::per_seconds(100, 10),
                WindowLimit::per_minutes(3_000, 10),
            ),
            safety_margin: 0.8,
        }
    }
}

impl RateLimitConfig {
    /// Uniform budget across all classes, mostly useful in tests
    pub fn uniform(budget: ClassBudget) -> Self {
        Self {
            order_submit: budget,
            order_cancel: budget,
            batch: budget,
            query: budget,
            safety_margin: 1.0,
        }
    }

    pub fn with_safety_margin(mut self, margin: f64) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn budget_for(&self, class: EndpointClass) -> &ClassBudget {
        match class {
            EndpointClass::OrderSubmit => &self.order_submit,
            EndpointClass::OrderCancel => &self.order_cancel,
            EndpointClass::Batch => &self.batch,
            EndpointClass::Query => &self.query,
        }
    }
}

/// Recent call timestamps for one endpoint class
#[derive(Debug, Default)]
struct ClassState {
    burst: VecDeque<Instant>,
    sustained: VecDeque<Instant>,
}

/// Admission controller shared by everything that talks to the exchange
pub struct RateGovernor {
    config: RateLimitConfig,
    states: Mutex<HashMap<EndpointClass, ClassState>>,
}

impl RateGovernor {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Block until a call of `class` fits both windows, then record it.
    ///
    /// The wait is exact: when a window is full the governor sleeps until the
    /// oldest entry in that window expires, then re-checks. The lock is never
    /// held across a sleep. There is no cancellation primitive; callers that
    /// need a cancellable wait race this future against their own signal.
    pub async fn admit(&self, class: EndpointClass) {
        loop {
            let wait = {
                let mut states = self.states.lock();
                let state = states.entry(class).or_default();
                let now = Instant::now();
                self.expire(state, class, now);

                match self.next_slot_at(state, class, now) {
                    None => {
                        state.burst.push_back(now);
                        state.sustained.push_back(now);
                        return;
                    }
                    Some(ready_at) => ready_at.saturating_duration_since(now),
                }
            };

            debug!("[RateGovernor] {} at capacity, waiting {:?}", class, wait);
            sleep(wait).await;
        }
    }

    /// Non-blocking admission check. When this returns true the call has
    /// been recorded, so a `true` is a reserved slot, not a racy hint.
    pub fn try_admit(&self, class: EndpointClass) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(class).or_default();
        let now = Instant::now();
        self.expire(state, class, now);

        if self.next_slot_at(state, class, now).is_some() {
            return false;
        }

        state.burst.push_back(now);
        state.sustained.push_back(now);
        true
    }

    /// Consumed counts (burst, sustained) after expiring old entries
    pub fn consumed(&self, class: EndpointClass) -> (usize, usize) {
        let mut states = self.states.lock();
        let state = states.entry(class).or_default();
        let now = Instant::now();
        self.expire(state, class, now);
        (state.burst.len(), state.sustained.len())
    }

    /// Effective max for a window after the safety margin
    fn effective_max(&self, limit: &WindowLimit) -> usize {
        let scaled = (limit.max_calls as f64 * self.config.safety_margin).floor();
        scaled.max(1.0) as usize
    }

    /// Drop timestamps that have left their window
    fn expire(&self, state: &mut ClassState, class: EndpointClass, now: Instant) {
        let budget = self.config.budget_for(class);

        let burst_window = budget.burst.window();
        while let Some(front) = state.burst.front() {
            if now.saturating_duration_since(*front) >= burst_window {
                state.burst.pop_front();
            } else {
                break;
            }
        }

        let sustained_window = budget.sustained.window();
        while let Some(front) = state.sustained.front() {
            if now.saturating_duration_since(*front) >= sustained_window {
                state.sustained.pop_front();
            } else {
                break;
            }
        }
    }

    /// The instant at which the next call becomes admissible, or None when a
    /// slot is free right now
    fn next_slot_at(
        &self,
        state: &ClassState,
        class: EndpointClass,
        _now: Instant,
    ) -> Option<Instant> {
        let budget = self.config.budget_for(class);
        let mut ready_at: Option<Instant> = None;

        if state.burst.len() >= self.effective_max(&budget.burst) {
            if let Some(front) = state.burst.front() {
                ready_at = Some(*front + budget.burst.window());
            }
        }

        if state.sustained.len() >= self.effective_max(&budget.sustained) {
            if let Some(front) = state.sustained.front() {
                let candidate = *front + budget.sustained.window();
                ready_at = Some(match ready_at {
                    Some(existing) => existing.max(candidate),
                    None => candidate,
                });
            }
        }

        ready_at
    }
}

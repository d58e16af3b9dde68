//! Fill Ledger - Authoritative In-Memory Record of Order Fill Progress
//!
//! Provides:
//! - Per-order tracking of original, filled and remaining size
//! - Fill-event synthesis from cumulative `size_matched` observations
//! - Weighted-average fill price from the running notional
//! - Monotonic updates: stale or duplicate status reports never regress
//!   `filled` and never produce a duplicate fill event
//! - Lifecycle state machine (pending -> partial -> filled | cancelled)
//!   with no transitions out of a terminal state
//! - REST hydration support and memory management via pruning
//! - Callback system for fill notifications (fired outside lock scope)
//!
//! The ledger is channel-agnostic: REST polls and push events both feed it
//! through the same `StatusReport` shape.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::StatusReport;
use crate::domain::{LifecycleState, OrderStatus};

/// Epsilon for size comparisons
const SIZE_EPSILON: f64 = 1e-9;

// =============================================================================
// Domain Types
// =============================================================================

/// An immutable fill observation. Append-only within a tracked order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    /// Incremental size filled by this event
    pub size: f64,
    /// Price attributed to this increment
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Cumulative filled size after this event
    pub cumulative_filled: f64,
}

/// Mutable fill state for a single order, owned by the ledger
#[derive(Debug, Clone)]
pub struct TrackedOrder {
    pub order_id: String,
    pub original_size: f64,
    pub filled_size: f64,
    pub status: OrderStatus,
    /// Running sum of size x price across all fill events
    notional: f64,
    events: Vec<FillEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedOrder {
    fn new(order_id: String, original_size: f64) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            original_size,
            filled_size: 0.0,
            status: OrderStatus::Pending,
            notional: 0.0,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining size to be filled
    pub fn remaining_size(&self) -> f64 {
        (self.original_size - self.filled_size).max(0.0)
    }

    /// Weighted-average fill price, 0.0 before any fill
    pub fn weighted_avg_price(&self) -> f64 {
        if self.filled_size > SIZE_EPSILON {
            self.notional / self.filled_size
        } else {
            0.0
        }
    }

    /// Percentage of the original size filled, in [0, 100]
    pub fn fill_percentage(&self) -> f64 {
        if self.original_size > SIZE_EPSILON {
            (self.filled_size / self.original_size) * 100.0
        } else {
            0.0
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fill history in observation order
    pub fn events(&self) -> &[FillEvent] {
        &self.events
    }
}

/// Point-in-time view of an order's fill progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillSummary {
    pub order_id: String,
    pub original_size: f64,
    pub filled_size: f64,
    pub remaining_size: f64,
    pub fill_percentage: f64,
    pub avg_price: f64,
    pub status: OrderStatus,
    pub events: Vec<FillEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate exposure across all tracked orders
#[derive(Debug, Clone, Default)]
pub struct ExposureReport {
    /// Sum of remaining size over non-terminal orders
    pub pending_size: f64,
    /// Sum of filled size over all tracked orders
    pub filled_size: f64,
    pub counts_by_status: HashMap<OrderStatus, usize>,
}

// =============================================================================
// Callback System
// =============================================================================

/// Callback for fill activity.
///
/// Callbacks are fired **outside** the ledger's lock scope; reading the
/// ledger from within a callback is safe, writing should be avoided. Keep
/// callbacks fast and queue expensive work elsewhere.
pub trait FillEventCallback: Send + Sync {
    fn on_fill(&self, order_id: &str, event: &FillEvent);
    fn on_status_change(&self, order_id: &str, status: OrderStatus);
}

/// No-op implementation for when callbacks aren't needed
pub struct NoOpCallback;

impl FillEventCallback for NoOpCallback {
    fn on_fill(&self, _: &str, _: &FillEvent) {}
    fn on_status_change(&self, _: &str, _: OrderStatus) {}
}

// =============================================================================
// Ledger
// =============================================================================

/// Shared ledger handle for multi-task access
pub type SharedFillLedger = Arc<RwLock<FillLedger>>;

/// Authoritative record of fill progress for every tracked order
pub struct FillLedger {
    orders: HashMap<String, TrackedOrder>,
    callback: Arc<dyn FillEventCallback>,
}

impl std::fmt::Debug for FillLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillLedger")
            .field("order_count", &self.orders.len())
            .field("callback", &"<callback>")
            .finish()
    }
}

impl Default for FillLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FillLedger {
    pub fn new() -> Self {
        Self::with_callback(Arc::new(NoOpCallback))
    }

    pub fn with_callback(callback: Arc<dyn FillEventCallback>) -> Self {
        Self {
            orders: HashMap::new(),
            callback,
        }
    }

    /// Create a shared handle around a fresh ledger
    pub fn shared() -> SharedFillLedger {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Get the callback reference (for firing events outside the lock)
    pub fn callback(&self) -> &Arc<dyn FillEventCallback> {
        &self.callback
    }

    /// Register a new order with zero fill and pending status.
    /// Idempotent-safe: re-tracking an existing order is a no-op and
    /// returns false.
    pub fn track(&mut self, order_id: &str, original_size: f64) -> bool {
        if self.orders.contains_key(order_id) {
            debug!("[FillLedger] Order {} already tracked", short_id(order_id));
            return false;
        }
        self.orders.insert(
            order_id.to_string(),
            TrackedOrder::new(order_id.to_string(), original_size),
        );
        debug!(
            "[FillLedger] Tracking order {} (size {})",
            short_id(order_id),
            original_size
        );
        true
    }

    /// Apply a status observation.
    ///
    /// `reported_filled` is cumulative; the update is a monotonic max, so
    /// stale or duplicate reports never regress the filled size and never
    /// create a fill event for a non-positive delta. When the cumulative
    /// size increased, a fill event for the delta is synthesized and
    /// returned - the return value is how callers detect "something
    /// changed" without diffing themselves.
    pub fn update_from_status(
        &mut self,
        order_id: &str,
        reported_filled: f64,
        reported_avg_price: f64,
        state: LifecycleState,
    ) -> Option<FillEvent> {
        let order = match self.orders.get_mut(order_id) {
            Some(order) => order,
            None => {
                warn!(
                    "[FillLedger] Status for untracked order {}",
                    short_id(order_id)
                );
                return None;
            }
        };

        if order.is_terminal() {
            debug!(
                "[FillLedger] Ignoring update for terminal order {} ({})",
                short_id(order_id),
                order.status
            );
            return None;
        }

        let delta = reported_filled - order.filled_size;
        let mut event = None;

        if delta > SIZE_EPSILON {
            // Attribute a price to the increment from the change in reported
            // notional; fall back to the running average when the exchange
            // omits the average price.
            let fill_price = if reported_avg_price > 0.0 {
                let delta_notional = reported_avg_price * reported_filled - order.notional;
                if delta_notional > 0.0 {
                    delta_notional / delta
                } else {
                    reported_avg_price
                }
            } else {
                order.weighted_avg_price()
            };

            order.filled_size = reported_filled;
            order.notional += fill_price * delta;

            let fill = FillEvent {
                size: delta,
                price: fill_price,
                timestamp: Utc::now(),
                cumulative_filled: reported_filled,
            };
            order.events.push(fill.clone());
            debug!(
                "[FillLedger] Fill on {}: +{:.2} @ {:.4} (cumulative {:.2}/{:.2})",
                short_id(order_id),
                delta,
                fill_price,
                reported_filled,
                order.original_size
            );
            event = Some(fill);
        } else if delta < -SIZE_EPSILON {
            warn!(
                "[FillLedger] Out-of-order report for {}: reported {:.2} < recorded {:.2}, ignoring",
                short_id(order_id),
                reported_filled,
                order.filled_size
            );
        }

        let new_status = match state {
            LifecycleState::Cancelled => OrderStatus::Cancelled,
            _ => {
                let fully_filled = order.filled_size + SIZE_EPSILON >= order.original_size;
                if fully_filled {
                    OrderStatus::Filled
                } else if order.filled_size > SIZE_EPSILON {
                    OrderStatus::Partial
                } else {
                    OrderStatus::Pending
                }
            }
        };

        if new_status != order.status {
            debug!(
                "[FillLedger] Order {}: {} -> {}",
                short_id(order_id),
                order.status,
                new_status
            );
            order.status = new_status;
        }
        order.updated_at = Utc::now();

        event
    }

    /// Apply a raw status report from either ingestion channel
    pub fn update_from_report(&mut self, report: &StatusReport) -> Option<FillEvent> {
        self.update_from_status(
            &report.order_id,
            report.size_matched,
            report.price_average,
            report.lifecycle(),
        )
    }

    /// Mark an order cancelled without new fill information (REST cancel
    /// acks carry none). Fills recorded so far are preserved. Returns false
    /// for untracked or already-terminal orders.
    pub fn apply_cancellation(&mut self, order_id: &str) -> bool {
        match self.orders.get_mut(order_id) {
            Some(order) if !order.is_terminal() => {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
                debug!(
                    "[FillLedger] Order {} cancelled ({:.2} filled preserved)",
                    short_id(order_id),
                    order.filled_size
                );
                true
            }
            _ => false,
        }
    }

    /// Point-in-time summary for one order
    pub fn summary(&self, order_id: &str) -> Option<FillSummary> {
        self.orders.get(order_id).map(|order| FillSummary {
            order_id: order.order_id.clone(),
            original_size: order.original_size,
            filled_size: order.filled_size,
            remaining_size: order.remaining_size(),
            fill_percentage: order.fill_percentage(),
            avg_price: order.weighted_avg_price(),
            status: order.status,
            events: order.events.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }

    pub fn get(&self, order_id: &str) -> Option<&TrackedOrder> {
        self.orders.get(order_id)
    }

    /// Orders not yet in a terminal state, for reconciliation/poll loops
    pub fn active_order_ids(&self) -> Vec<String> {
        self.orders
            .values()
            .filter(|o| !o.is_terminal())
            .map(|o| o.order_id.clone())
            .collect()
    }

    /// Aggregate exposure across all tracked orders
    pub fn total_exposure(&self) -> ExposureReport {
        let mut report = ExposureReport::default();
        for order in self.orders.values() {
            if !order.is_terminal() {
                report.pending_size += order.remaining_size();
            }
            report.filled_size += order.filled_size;
            *report.counts_by_status.entry(order.status).or_insert(0) += 1;
        }
        report
    }

    /// Remove an order from the ledger (caller-driven retention, typically
    /// after reconciliation). Returns the removed state.
    pub fn remove(&mut self, order_id: &str) -> Option<TrackedOrder> {
        self.orders.remove(order_id)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Hydrate from a raw REST open-orders response. Unknown orders are
    /// registered first; already-tracked orders just receive the update.
    /// Returns the number of reports applied.
    pub fn hydrate_orders(&mut self, orders: &[serde_json::Value]) -> usize {
        let mut applied = 0;
        for value in orders {
            let Some(report) = StatusReport::from_json(value) else {
                continue;
            };
            if !self.orders.contains_key(&report.order_id) {
                if report.original_size <= SIZE_EPSILON {
                    continue;
                }
                self.track(&report.order_id, report.original_size);
            }
            self.update_from_report(&report);
            applied += 1;
        }
        applied
    }

    /// Prune terminal orders, keeping only the most recently updated N.
    /// Returns the removed order IDs.
    pub fn prune_terminal(&mut self, keep_last_n: usize) -> Vec<String> {
        let mut terminal: Vec<_> = self
            .orders
            .values()
            .filter(|o| o.is_terminal())
            .map(|o| (o.order_id.clone(), o.updated_at))
            .collect();
        terminal.sort_by(|a, b| b.1.cmp(&a.1));

        let removed: Vec<String> = terminal
            .into_iter()
            .skip(keep_last_n)
            .map(|(id, _)| id)
            .collect();
        for order_id in &removed {
            self.orders.remove(order_id);
        }
        removed
    }
}

/// Apply a report through a shared ledger handle and fire callbacks after
/// releasing the write lock.
pub fn apply_report(ledger: &SharedFillLedger, report: &StatusReport) -> Option<FillEvent> {
    let (event, status_change, callback) = {
        let mut guard = ledger.write();
        let before = guard.get(&report.order_id).map(|o| o.status);
        let event = guard.update_from_report(report);
        let after = guard.get(&report.order_id).map(|o| o.status);
        let status_change = match (before, after) {
            (Some(b), Some(a)) if b != a => Some(a),
            _ => None,
        };
        (event, status_change, Arc::clone(guard.callback()))
    };

    if let Some(fill) = &event {
        callback.on_fill(&report.order_id, fill);
    }
    if let Some(status) = status_change {
        callback.on_status_change(&report.order_id, status);
    }
    event
}

fn short_id(order_id: &str) -> &str {
    &order_id[..16.min(order_id.len())]
}

// =============================================================================
// Tests
// =============================================================================

//! Balance Reconciler
//!
//! Detects drift between expected balance changes (derived from trading
//! activity) and the balance actually observed at the external source.
//! Discrepancies are surfaced, never auto-corrected; the caller decides
//! whether to alert, retry, or halt trading.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::{BalanceSource, Result};

/// Point-in-time observed balance. History is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Observed balance at the source
    pub balance: f64,
    /// Signed change since the previous snapshot (0 for the first)
    pub delta: f64,
    /// Human-readable reason this snapshot was taken
    pub reason: String,
    pub taken_at: DateTime<Utc>,
}

/// Outcome of comparing the latest observed delta against an expectation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Whether the discrepancy stayed within tolerance
    pub matched: bool,
    pub expected_delta: f64,
    pub observed_delta: f64,
    /// Absolute difference between expected and observed
    pub discrepancy: f64,
    pub tolerance: f64,
}

/// Compares expected balance deltas against the external balance source
pub struct BalanceReconciler {
    source: Arc<dyn BalanceSource>,
    account: String,
    history: RwLock<Vec<BalanceSnapshot>>,
}

impl BalanceReconciler {
    pub fn new(source: Arc<dyn BalanceSource>, account: impl Into<String>) -> Self {
        Self {
            source,
            account: account.into(),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Query the balance source, compute the delta against the previous
    /// snapshot, append to history and return the new snapshot.
    pub async fn snapshot(&self, reason: &str) -> Result<BalanceSnapshot> {
        let balance = self.source.get_balance(&self.account).await?;

        let mut history = self.history.write();
        let delta = history
            .last()
            .map(|prev| balance - prev.balance)
            .unwrap_or(0.0);
        let snapshot = BalanceSnapshot {
            balance,
            delta,
            reason: reason.to_string(),
            taken_at: Utc::now(),
        };
        history.push(snapshot.clone());

        debug!(
            "[BalanceReconciler] Snapshot '{}': balance {:.4}, delta {:+.4}",
            reason, balance, delta
        );
        Ok(snapshot)
    }

    /// Compare the most recent observed delta against an expected value.
    /// The tolerance absorbs fees and rounding; exceeding it flags a
    /// mismatch.
    pub fn reconcile(&self, expected_delta: f64, tolerance: f64) -> ReconcileReport {
        let observed_delta = self
            .history
            .read()
            .last()
            .map(|snap| snap.delta)
            .unwrap_or(0.0);
        let discrepancy = (observed_delta - expected_delta).abs();
        let matched = discrepancy <= tolerance;

        if matched {
            debug!(
                "[BalanceReconciler] OK - expected {:+.4}, observed {:+.4} (discrepancy {:.4})",
                expected_delta, observed_delta, discrepancy
            );
        } else {
            warn!(
                "[BalanceReconciler] MISMATCH - expected {:+.4}, observed {:+.4} (discrepancy {:.4} > tolerance {:.4})",
                expected_delta, observed_delta, discrepancy, tolerance
            );
        }

        ReconcileReport {
            matched,
            expected_delta,
            observed_delta,
            discrepancy,
            tolerance,
        }
    }

    /// Most recent snapshot, if any
    pub fn last_snapshot(&self) -> Option<BalanceSnapshot> {
        self.history.read().last().cloned()
    }

    /// Full snapshot history, oldest first
    pub fn history(&self) -> Vec<BalanceSnapshot> {
        self.history.read().clone()
    }

    /// Net balance change from the first to the latest snapshot
    pub fn net_change(&self) -> f64 {
        let history = self.history.read();
        match (history.first(), history.last()) {
            (Some(first), Some(last)) => last.balance - first.balance,
            _ => 0.0,
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.history.read().len()
    }
}

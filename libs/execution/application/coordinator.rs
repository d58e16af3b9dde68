//! Execution Coordinator - Orchestration for a Single Order Submission
//!
//! Ties the components together: fetch a fresh tick size, normalize the
//! intent, pass admission control, submit through the external exchange
//! client with bounded retries, then register the accepted order with the
//! fill ledger. Optionally brackets the submission with balance snapshots
//! and reconciles the observed delta against the expected notional.
//!
//! Every terminal failure leaves here categorized; a raw transport error
//! never escapes.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::errors::{ErrorCategory, ExecutionError, Result};
use super::retry::{assess, AttemptOutcome, RetryPolicy};
use crate::config::ExecutionConfig;
use crate::domain::{OrderIntent, OrderType, Side};
use crate::infrastructure::balance::{BalanceReconciler, ReconcileReport};
use crate::infrastructure::client::{
    CancelAck, CredentialRefresher, ExchangeClient, ExchangeError, NormalizedOrder, OrderAck,
};
use crate::infrastructure::fill_ledger::{apply_report, FillLedger, FillSummary, SharedFillLedger};
use crate::infrastructure::precision::{MarketPrecision, PrecisionError, PrecisionNormalizer};
use crate::infrastructure::rate_governor::{EndpointClass, RateGovernor};

/// Result of a successful submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub order_id: String,
    pub token_id: String,
    pub side: Side,
    /// Normalized price actually sent
    pub price: f64,
    /// Normalized size actually sent
    pub size: f64,
    /// Order type actually sent (may differ from the intent after a
    /// precision downgrade)
    pub order_type: OrderType,
    /// Whether FOK was downgraded to GTC because its precision constraints
    /// could not be satisfied
    pub type_downgraded: bool,
    /// Submission attempts consumed (1 = first try succeeded)
    pub attempts: u32,
    /// Status string from the placement response, if any
    pub exchange_status: Option<String>,
}

impl SubmitOutcome {
    /// Expected balance delta for this order: cost for buys, proceeds for
    /// sells
    pub fn expected_balance_delta(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.price * self.size),
            Side::Sell => self.price * self.size,
        }
    }
}

/// Orchestrates normalization, throttling, submission and tracking
pub struct ExecutionCoordinator {
    exchange: Arc<dyn ExchangeClient>,
    credentials: Arc<dyn CredentialRefresher>,
    governor: Arc<RateGovernor>,
    ledger: SharedFillLedger,
    reconciler: Option<Arc<BalanceReconciler>>,
    normalizer: PrecisionNormalizer,
    config: ExecutionConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        credentials: Arc<dyn CredentialRefresher>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            exchange,
            credentials,
            governor: Arc::new(RateGovernor::new(config.rate_limits.clone())),
            ledger: FillLedger::shared(),
            reconciler: None,
            normalizer: PrecisionNormalizer::new(config.strict_fak_precision),
            config,
        }
    }

    /// Attach a balance reconciler for `submit_reconciled`
    pub fn with_reconciler(mut self, reconciler: Arc<BalanceReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Shared ledger handle, e.g. for a push-event consumer task
    pub fn ledger(&self) -> SharedFillLedger {
        Arc::clone(&self.ledger)
    }

    /// Shared governor handle, e.g. for batch callers
    pub fn governor(&self) -> Arc<RateGovernor> {
        Arc::clone(&self.governor)
    }

    /// Submit an order intent end to end.
    ///
    /// FOK intents whose precision constraints cannot be satisfied are
    /// automatically downgraded to GTC; the outcome records the downgrade.
    pub async fn submit(&self, intent: &OrderIntent) -> Result<SubmitOutcome> {
        let precision = self.market_precision(&intent.token_id).await?;
        let price = self.normalizer.normalize_price(intent.price, &precision)?;

        let mut order_type = intent.order_type;
        let mut type_downgraded = false;
        let (price, size) = match self
            .normalizer
            .normalize_for_order_type(price, intent.size, order_type)
        {
            Ok(normalized) => normalized,
            Err(PrecisionError::Unsatisfiable { reason, .. })
                if order_type == OrderType::FOK =>
            {
                warn!(
                    "[Coordinator] FOK precision unsatisfiable ({}), falling back to GTC",
                    reason
                );
                order_type = OrderType::GTC;
                type_downgraded = true;
                self.normalizer
                    .normalize_for_order_type(price, intent.size, order_type)?
            }
            Err(err) => return Err(err.into()),
        };

        let order = NormalizedOrder {
            token_id: intent.token_id.clone(),
            side: intent.side,
            price,
            size,
            order_type,
            expiration: intent.expiration,
        };

        info!(
            "[Coordinator] Submitting {} {} {:.2} @ {:.4} ({})",
            order.side, order.token_id, order.size, order.price, order.order_type
        );

        let (ack, attempts) = self.submit_with_retries(&order).await?;

        if !ack.success {
            return Err(ExecutionError::Validation(
                ack.error_msg
                    .unwrap_or_else(|| "order rejected without message".to_string()),
            ));
        }
        let order_id = ack.order_id.ok_or_else(|| {
            ExecutionError::Unknown("exchange accepted order without an order ID".to_string())
        })?;

        self.ledger.write().track(&order_id, size);

        info!(
            "[Coordinator] Order {} accepted (attempts: {}, downgraded: {})",
            &order_id[..16.min(order_id.len())],
            attempts,
            type_downgraded
        );

        Ok(SubmitOutcome {
            order_id,
            token_id: order.token_id,
            side: order.side,
            price,
            size,
            order_type,
            type_downgraded,
            attempts,
            exchange_status: ack.status,
        })
    }

    /// Submit bracketed by balance snapshots and reconcile the observed
    /// delta against the expected notional. Requires a reconciler; without
    /// one this behaves like `submit`.
    pub async fn submit_reconciled(
        &self,
        intent: &OrderIntent,
    ) -> Result<(SubmitOutcome, Option<ReconcileReport>)> {
        let Some(reconciler) = &self.reconciler else {
            return Ok((self.submit(intent).await?, None));
        };

        reconciler
            .snapshot("pre-submit")
            .await
            .map_err(|e| self.categorize_single(&e))?;

        let outcome = self.submit(intent).await?;

        // Give settlement a moment before observing the post-trade balance
        sleep(self.config.settlement_wait()).await;

        reconciler
            .snapshot("post-submit")
            .await
            .map_err(|e| self.categorize_single(&e))?;
        let report = reconciler.reconcile(
            outcome.expected_balance_delta(),
            self.config.reconcile_tolerance,
        );

        Ok((outcome, Some(report)))
    }

    /// Cancel an order. The ledger entry is marked cancelled on ack, with
    /// any recorded fills preserved.
    pub async fn cancel(&self, order_id: &str) -> Result<CancelAck> {
        self.governor.admit(EndpointClass::OrderCancel).await;

        let ack = self
            .exchange
            .cancel_order(order_id)
            .await
            .map_err(|e| self.categorize_single(&e))?;

        if ack.canceled.iter().any(|id| id == order_id) {
            self.ledger.write().apply_cancellation(order_id);
        } else if let Some(reason) = ack.not_canceled.get(order_id) {
            warn!(
                "[Coordinator] Cancel of {} refused: {}",
                &order_id[..16.min(order_id.len())],
                reason
            );
        }

        Ok(ack)
    }

    /// Poll the exchange for an order's status and apply it to the ledger
    pub async fn poll_order(&self, order_id: &str) -> Result<FillSummary> {
        self.governor.admit(EndpointClass::Query).await;

        let report = self
            .exchange
            .get_order_status(order_id)
            .await
            .map_err(|e| self.categorize_single(&e))?;
        apply_report(&self.ledger, &report);

        self.ledger.read().summary(order_id).ok_or_else(|| {
            ExecutionError::Unknown(format!("order {} is not tracked", order_id))
        })
    }

    /// Poll until the order reaches a terminal state or `timeout` elapses.
    /// On timeout the last-known summary is returned, never an error.
    pub async fn wait_for_fill(
        &self,
        order_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<FillSummary> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.poll_order(order_id).await {
                Ok(summary) => {
                    if summary.status.is_terminal() {
                        return Ok(summary);
                    }
                    debug!(
                        "[Coordinator] Order {} at {:.1}% ({})",
                        &order_id[..16.min(order_id.len())],
                        summary.fill_percentage,
                        summary.status
                    );
                }
                Err(err) => {
                    // Transient poll failures keep the wait alive; the
                    // ledger still holds the last good state
                    warn!("[Coordinator] Poll failed for {}: {}", order_id, err);
                }
            }

            if Instant::now() + poll_interval > deadline {
                break;
            }
            sleep(poll_interval).await;
        }

        debug!(
            "[Coordinator] Fill wait for {} timed out after {:?}",
            order_id, timeout
        );
        self.ledger.read().summary(order_id).ok_or_else(|| {
            ExecutionError::Unknown(format!("order {} is not tracked", order_id))
        })
    }

    /// Fetch a fresh tick size and wrap it with the configured freshness
    /// window
    async fn market_precision(&self, token_id: &str) -> Result<MarketPrecision> {
        self.governor.admit(EndpointClass::Query).await;

        let tick_size = self
            .exchange
            .get_tick_size(token_id)
            .await
            .map_err(|e| self.categorize_single(&e))?;

        debug!(
            "[Coordinator] Tick size for {}: {}",
            &token_id[..16.min(token_id.len())],
            tick_size
        );
        Ok(MarketPrecision::new(
            token_id,
            tick_size,
            self.config.tick_freshness(),
        ))
    }

    /// Run the retry state machine around order submission. Re-submits the
    /// same normalized order on retry; it is never rebuilt, so an upstream
    /// queue cannot end up with two distinct orders.
    async fn submit_with_retries(&self, order: &NormalizedOrder) -> Result<(OrderAck, u32)> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.governor.admit(EndpointClass::OrderSubmit).await;

            let result = self.exchange.submit_order(order).await;
            match assess(&result, attempt, &self.config.retry) {
                AttemptOutcome::Succeeded => {
                    if let Ok(ack) = result {
                        return Ok((ack, attempt));
                    }
                }
                AttemptOutcome::Retryable { category, delay } => {
                    if category == ErrorCategory::Authentication {
                        info!("[Coordinator] 401 on attempt {}, refreshing credentials", attempt);
                        self.credentials
                            .refresh()
                            .await
                            .map_err(|e| ExecutionError::Authentication(e.to_string()))?;
                    } else {
                        warn!(
                            "[Coordinator] Attempt {} hit {}, backing off {:?}",
                            attempt, category, delay
                        );
                    }
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                AttemptOutcome::Terminal { category, message } => {
                    return Err(ExecutionError::terminal(category, message, attempt));
                }
            }
        }
    }

    /// Categorize a failure from a call that has no retry loop of its own
    fn categorize_single(&self, error: &ExchangeError) -> ExecutionError {
        let no_retry = RetryPolicy {
            max_attempts: 1,
            ..self.config.retry
        };
        match assess::<()>(&Err(error.clone()), 1, &no_retry) {
            AttemptOutcome::Terminal { category, message } => {
                ExecutionError::terminal(category, message, 1)
            }
            AttemptOutcome::Retryable { category, .. } => {
                ExecutionError::terminal(category, error.to_string(), 1)
            }
            AttemptOutcome::Succeeded => ExecutionError::Unknown(error.to_string()),
        }
    }
}

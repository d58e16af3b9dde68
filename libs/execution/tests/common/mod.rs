//! Common test utilities for execution integration tests
//!
//! Scripted mock collaborators standing in for the exchange client, the
//! credential refresher and the balance source.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use polymarket_execution::infrastructure::client::{
    BalanceSource, CancelAck, CredentialRefresher, ExchangeClient, ExchangeError, NormalizedOrder,
    OrderAck, Result, StatusReport,
};
use polymarket_execution::{ExecutionConfig, RetryPolicy};

/// Scripted exchange client. Responses are consumed front to back; status
/// responses are sticky (the last one repeats) so poll loops can run
/// indefinitely.
pub struct MockExchange {
    tick_size: Mutex<f64>,
    submit_responses: Mutex<VecDeque<Result<OrderAck>>>,
    cancel_responses: Mutex<VecDeque<Result<CancelAck>>>,
    status_responses: Mutex<VecDeque<StatusReport>>,
    last_status: Mutex<Option<StatusReport>>,
    pub submit_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub last_order: Mutex<Option<NormalizedOrder>>,
}

impl MockExchange {
    pub fn new(tick_size: f64) -> Arc<Self> {
        Arc::new(Self {
            tick_size: Mutex::new(tick_size),
            submit_responses: Mutex::new(VecDeque::new()),
            cancel_responses: Mutex::new(VecDeque::new()),
            status_responses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(None),
            submit_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            last_order: Mutex::new(None),
        })
    }

    pub fn set_tick_size(&self, tick_size: f64) {
        *self.tick_size.lock() = tick_size;
    }

    pub fn queue_submit(&self, response: Result<OrderAck>) {
        self.submit_responses.lock().push_back(response);
    }

    pub fn queue_submit_ok(&self, order_id: &str) {
        self.queue_submit(Ok(OrderAck {
            order_id: Some(order_id.to_string()),
            success: true,
            error_msg: None,
            status: Some("live".to_string()),
        }));
    }

    pub fn queue_submit_err(&self, status: u16, message: &str) {
        self.queue_submit(Err(ExchangeError::api(status, message)));
    }

    pub fn queue_cancel_ok(&self, order_id: &str) {
        self.cancel_responses.lock().push_back(Ok(CancelAck {
            canceled: vec![order_id.to_string()],
            not_canceled: Default::default(),
        }));
    }

    pub fn queue_status(&self, order_id: &str, size_matched: f64, price_average: f64, state: &str) {
        self.status_responses.lock().push_back(StatusReport {
            order_id: order_id.to_string(),
            original_size: 0.0,
            size_matched,
            price_average,
            lifecycle_state: state.to_string(),
        });
    }

    pub fn submit_call_count(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn submit_order(&self, order: &NormalizedOrder) -> Result<OrderAck> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_order.lock() = Some(order.clone());
        self.submit_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted response".to_string())))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<CancelAck> {
        self.cancel_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted response".to_string())))
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<StatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.status_responses.lock().pop_front();
        match next {
            Some(report) => {
                *self.last_status.lock() = Some(report.clone());
                Ok(report)
            }
            None => self
                .last_status
                .lock()
                .clone()
                .ok_or_else(|| ExchangeError::Transport("no scripted status".to_string())),
        }
    }

    async fn get_tick_size(&self, _token_id: &str) -> Result<f64> {
        Ok(*self.tick_size.lock())
    }
}

/// Counts refresh calls and always succeeds
pub struct MockRefresher {
    pub calls: AtomicU32,
}

impl MockRefresher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRefresher for MockRefresher {
    async fn refresh(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Balance source that serves a fixed script of balances
pub struct ScriptedBalance {
    balances: Mutex<VecDeque<f64>>,
}

impl ScriptedBalance {
    pub fn new(balances: &[f64]) -> Arc<Self> {
        Arc::new(Self {
            balances: Mutex::new(balances.iter().copied().collect()),
        })
    }
}

#[async_trait]
impl BalanceSource for ScriptedBalance {
    async fn get_balance(&self, _account: &str) -> Result<f64> {
        self.balances
            .lock()
            .pop_front()
            .ok_or_else(|| ExchangeError::Transport("balance script exhausted".to_string()))
    }
}

/// Deterministic config for tests: no jitter, quick backoff, permissive
/// rate limits
pub fn test_config() -> ExecutionConfig {
    ExecutionConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter: false,
        },
        settlement_wait_ms: 10,
        ..ExecutionConfig::default()
    }
}

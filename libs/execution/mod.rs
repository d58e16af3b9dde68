//! Execution Reliability Layer for Polymarket-Style CLOB Trading
//!
//! The pieces a robust trading client needs between its strategy and the
//! exchange: adaptive order-precision normalization, rate-limit governance,
//! partial-fill tracking and balance reconciliation, orchestrated by a
//! single coordinator. Signing, transport and authentication are injected
//! collaborators; this crate performs no I/O of its own.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod utils;

// Re-export commonly used items
pub use application::{
    assess, AttemptOutcome, ErrorCategory, ExecutionCoordinator, ExecutionError, RetryPolicy,
    SubmitOutcome,
};
pub use config::ExecutionConfig;
pub use domain::{LifecycleState, OrderIntent, OrderStatus, OrderType, Side};
pub use infrastructure::{
    apply_report, BalanceReconciler, BalanceSnapshot, BalanceSource, CancelAck,
    CredentialRefresher, EndpointClass, ExchangeClient, ExchangeError, FillEvent,
    FillEventCallback, FillLedger, FillSummary, MarketPrecision, NormalizedOrder, OrderAck,
    PrecisionError, PrecisionNormalizer, RateGovernor, RateLimitConfig, ReconcileReport,
    SharedFillLedger, StatusReport,
};
pub use utils::init_tracing;

//! Infrastructure Layer
//!
//! Component implementations and the seams to external collaborators.
//! Depends on the domain layer but not on the application layer.

pub mod balance;
pub mod client;
pub mod fill_ledger;
pub mod precision;
pub mod rate_governor;

// Re-export commonly used types
pub use balance::{BalanceReconciler, BalanceSnapshot, ReconcileReport};
pub use client::{
    BalanceSource, CancelAck, CredentialRefresher, ExchangeClient, ExchangeError, NormalizedOrder,
    OrderAck, StatusReport,
};
pub use fill_ledger::{
    apply_report, ExposureReport, FillEvent, FillEventCallback, FillLedger, FillSummary,
    NoOpCallback, SharedFillLedger, TrackedOrder,
};
pub use precision::{
    MarketPrecision, PrecisionError, PrecisionNormalizer, RoundingConfig, MAX_PRICE, MIN_PRICE,
};
pub use rate_governor::{ClassBudget, EndpointClass, RateGovernor, RateLimitConfig, WindowLimit};

//! Collaborator Seams - Injected External Services
//!
//! This core performs no networking of its own. Everything that touches the
//! wire is behind one of these traits:
//! - `ExchangeClient`: order submission, cancellation, status, tick size
//! - `BalanceSource`: observed account balance (e.g. an on-chain query)
//! - `CredentialRefresher`: re-authentication after a 401
//!
//! Wire shapes mirror the exchange API, including its habit of sending
//! numbers as strings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{LifecycleState, OrderType, Side};

#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    /// HTTP-class failure reported by the exchange
    #[error("Exchange returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced an HTTP response
    #[error("Transport failure: {0}")]
    Transport(String),
}

impl ExchangeError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ExchangeError::Api { status, .. } => Some(*status),
            ExchangeError::Transport(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

/// A fully normalized order, ready for signing and submission by the
/// external exchange client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub token_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub order_type: OrderType,
    /// Expiration timestamp in unix seconds (GTD only)
    pub expiration: Option<u64>,
}

impl NormalizedOrder {
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Response from order placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Order ID if placement was successful
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,

    /// Whether the order was accepted
    pub success: bool,

    /// Error message if placement failed
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,

    /// Order status: "matched", "live", "delayed", "unmatched"
    #[serde(default)]
    pub status: Option<String>,
}

/// Response from order cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAck {
    pub canceled: Vec<String>,
    #[serde(default)]
    pub not_canceled: HashMap<String, String>,
}

/// Order status as reported by the exchange, via REST poll or push event.
/// Both channels deliver the same shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub order_id: String,
    #[serde(default)]
    pub original_size: f64,
    #[serde(default)]
    pub size_matched: f64,
    #[serde(default)]
    pub price_average: f64,
    #[serde(default)]
    pub lifecycle_state: String,
}

impl StatusReport {
    /// Parse from raw exchange JSON, tolerating string-encoded numbers and
    /// the REST/WebSocket field-name variants
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let order_id = value
            .get("order_id")
            .or_else(|| value.get("id"))?
            .as_str()?
            .to_string();
        if order_id.is_empty() {
            return None;
        }

        Some(Self {
            order_id,
            original_size: parse_json_f64(value.get("original_size")),
            size_matched: parse_json_f64(value.get("size_matched")),
            price_average: parse_json_f64(
                value.get("price_average").or_else(|| value.get("price")),
            ),
            lifecycle_state: value
                .get("lifecycle_state")
                .or_else(|| value.get("status"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        })
    }

    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_str_or_default(&self.lifecycle_state)
    }
}

/// Parse a numeric value from JSON (handles both string and number formats)
pub(crate) fn parse_json_f64(value: Option<&serde_json::Value>) -> f64 {
    value
        .and_then(|v| {
            v.as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| v.as_f64())
        })
        .unwrap_or(0.0)
}

/// External exchange client (signing and transport live behind it)
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn submit_order(&self, order: &NormalizedOrder) -> Result<OrderAck>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck>;

    async fn get_order_status(&self, order_id: &str) -> Result<StatusReport>;

    /// Current tick size for a token. Callers must treat the result as
    /// short-lived; it changes as price approaches the extremes.
    async fn get_tick_size(&self, token_id: &str) -> Result<f64>;
}

/// External observed-balance source (e.g. an on-chain query)
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn get_balance(&self, account: &str) -> Result<f64>;
}

/// External credential refresher, invoked after a 401
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_report_from_rest_json() {
        let value = json!({
            "id": "order-1",
            "original_size": "100",
            "size_matched": "40.5",
            "price": "0.52",
            "status": "LIVE"
        });

        let report = StatusReport::from_json(&value).unwrap();
        assert_eq!(report.order_id, "order-1");
        assert_eq!(report.original_size, 100.0);
        assert_eq!(report.size_matched, 40.5);
        assert_eq!(report.price_average, 0.52);
        assert_eq!(report.lifecycle(), LifecycleState::Live);
    }

    #[test]
    fn test_status_report_from_push_json() {
        let value = json!({
            "order_id": "order-2",
            "size_matched": 25.0,
            "price_average": 0.61,
            "lifecycle_state": "MATCHED"
        });

        let report = StatusReport::from_json(&value).unwrap();
        assert_eq!(report.order_id, "order-2");
        assert_eq!(report.size_matched, 25.0);
        assert_eq!(report.lifecycle(), LifecycleState::Matched);
    }

    #[test]
    fn test_status_report_rejects_missing_id() {
        assert!(StatusReport::from_json(&json!({"size_matched": 1.0})).is_none());
        assert!(StatusReport::from_json(&json!({"id": ""})).is_none());
    }

    #[test]
    fn test_order_ack_deserialization() {
        let ack: OrderAck = serde_json::from_str(
            r#"{"orderID": "0xabc", "success": true, "status": "live"}"#,
        )
        .unwrap();
        assert_eq!(ack.order_id.as_deref(), Some("0xabc"));
        assert!(ack.success);
        assert!(ack.error_msg.is_none());
    }

    #[test]
    fn test_exchange_error_status() {
        assert_eq!(ExchangeError::api(429, "slow down").status(), Some(429));
        assert_eq!(ExchangeError::Transport("dns".into()).status(), None);
    }
}

//! Order domain types and the caller-facing order intent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or(Side::Buy)
    }

    /// Returns the opposite side (Buy <-> Sell)
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type (GTC, FOK, GTD, FAK)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    GTC, // Good Till Cancelled
    FOK, // Fill Or Kill
    GTD, // Good Till Date
    FAK, // Fill And Kill
}

impl OrderType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GTC" => Some(OrderType::GTC),
            "FOK" => Some(OrderType::FOK),
            "GTD" => Some(OrderType::GTD),
            "FAK" => Some(OrderType::FAK),
            _ => None,
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }

    /// Immediate-or-cancel types never rest on the book
    pub fn is_immediate(&self) -> bool {
        matches!(self, OrderType::FOK | OrderType::FAK)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::GTC => write!(f, "GTC"),
            OrderType::FOK => write!(f, "FOK"),
            OrderType::GTD => write!(f, "GTD"),
            OrderType::FAK => write!(f, "FAK"),
        }
    }
}

/// Lifecycle state reported by the exchange for an order.
///
/// Both REST status polls and push events use the same vocabulary, so a
/// single parse covers both ingestion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Resting on the book (may have partial fills)
    Live,
    /// Matched against the book
    Matched,
    /// Accepted but held for delayed matching
    Delayed,
    /// Accepted but nothing crossed
    Unmatched,
    /// Cancelled by the caller or the exchange
    Cancelled,
}

impl LifecycleState {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LIVE" | "OPEN" => Some(LifecycleState::Live),
            "MATCHED" | "FILLED" => Some(LifecycleState::Matched),
            "DELAYED" => Some(LifecycleState::Delayed),
            "UNMATCHED" => Some(LifecycleState::Unmatched),
            "CANCELLED" | "CANCELED" => Some(LifecycleState::Cancelled),
            _ => None,
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or(LifecycleState::Live)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Live => write!(f, "LIVE"),
            LifecycleState::Matched => write!(f, "MATCHED"),
            LifecycleState::Delayed => write!(f, "DELAYED"),
            LifecycleState::Unmatched => write!(f, "UNMATCHED"),
            LifecycleState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Tracked-order status derived from fill progress and lifecycle reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, no fills yet
    Pending,
    /// Some fill, remainder still working
    Partial,
    /// Fully filled (terminal)
    Filled,
    /// Cancelled, any fills before cancellation are preserved (terminal)
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Partial => write!(f, "PARTIAL"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntentError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid token ID: {0}")]
    InvalidTokenId(String),

    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),
}

/// A caller's order request. Immutable once submitted; the coordinator works
/// on a normalized copy and never mutates the intent itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Conditional token ID (as string)
    pub token_id: String,
    pub side: Side,
    /// Limit price per token, strictly inside (0, 1)
    pub price: f64,
    /// Number of tokens requested
    pub size: f64,
    pub order_type: OrderType,
    /// Expiration timestamp in unix seconds (required for GTD)
    pub expiration: Option<u64>,
}

impl OrderIntent {
    pub fn new(
        token_id: impl Into<String>,
        side: Side,
        price: f64,
        size: f64,
        order_type: OrderType,
        expiration: Option<u64>,
    ) -> Result<Self, IntentError> {
        let token_id = token_id.into();
        if token_id.is_empty() {
            return Err(IntentError::InvalidTokenId(
                "Token ID must not be empty".to_string(),
            ));
        }
        if !price.is_finite() || price <= 0.0 || price >= 1.0 {
            return Err(IntentError::InvalidPrice(format!(
                "Price must be between 0 and 1, got: {}",
                price
            )));
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(IntentError::InvalidSize(format!(
                "Size must be positive, got: {}",
                size
            )));
        }
        if order_type == OrderType::GTD && expiration.is_none() {
            return Err(IntentError::InvalidExpiration(
                "GTD orders require an expiration timestamp".to_string(),
            ));
        }

        Ok(Self {
            token_id,
            side,
            price,
            size,
            order_type,
            expiration,
        })
    }

    /// Convenience constructor for GTC orders
    pub fn limit(
        token_id: impl Into<String>,
        side: Side,
        price: f64,
        size: f64,
    ) -> Result<Self, IntentError> {
        Self::new(token_id, side, price, size, OrderType::GTC, None)
    }

    /// Notional value of the intent at its limit price
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_roundtrip() {
        assert_eq!(Side::from_str("buy"), Some(Side::Buy));
        assert_eq!(Side::from_str("SELL"), Some(Side::Sell));
        assert_eq!(Side::from_str("hold"), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn test_order_type_parsing() {
        assert_eq!(OrderType::from_str("fok"), Some(OrderType::FOK));
        assert_eq!(OrderType::from_str_or_default("bogus"), OrderType::GTC);
        assert!(OrderType::FAK.is_immediate());
        assert!(!OrderType::GTC.is_immediate());
    }

    #[test]
    fn test_lifecycle_parsing() {
        assert_eq!(LifecycleState::from_str("live"), Some(LifecycleState::Live));
        assert_eq!(
            LifecycleState::from_str("CANCELED"),
            Some(LifecycleState::Cancelled)
        );
        assert_eq!(
            LifecycleState::from_str_or_default("???"),
            LifecycleState::Live
        );
    }

    #[test]
    fn test_status_terminality() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Partial.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_intent_validation() {
        assert!(OrderIntent::limit("token-1", Side::Buy, 0.5, 100.0).is_ok());

        let err = OrderIntent::limit("token-1", Side::Buy, 1.0, 100.0).unwrap_err();
        assert!(matches!(err, IntentError::InvalidPrice(_)));

        let err = OrderIntent::limit("token-1", Side::Buy, 0.5, 0.0).unwrap_err();
        assert!(matches!(err, IntentError::InvalidSize(_)));

        let err = OrderIntent::limit("", Side::Buy, 0.5, 100.0).unwrap_err();
        assert!(matches!(err, IntentError::InvalidTokenId(_)));

        let err =
            OrderIntent::new("token-1", Side::Buy, 0.5, 100.0, OrderType::GTD, None).unwrap_err();
        assert!(matches!(err, IntentError::InvalidExpiration(_)));
    }

    #[test]
    fn test_intent_notional() {
        let intent = OrderIntent::limit("token-1", Side::Buy, 0.45, 100.0).unwrap();
        assert!((intent.notional() - 45.0).abs() < 1e-9);
    }
}

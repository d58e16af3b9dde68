//! Precision Normalizer - Tick and Decimal Constraints for Order Pricing
//!
//! Converts a caller's desired (price, size) into exchange-acceptable values:
//! - Price rounds to the nearest multiple of the market's current tick size
//!   and is clamped to the valid range [0.01, 0.99]
//! - Size truncates (round toward zero) to 2 decimal places so we never ask
//!   for more capital or shares than the caller specified
//! - Immediate order types additionally require the notional (size x price)
//!   to land cleanly on 2 decimals; the exchange rejects anything finer
//!
//! Tick size is dynamic: it coarsens in the middle of the price range and
//! refines near the extremes, so a `MarketPrecision` carries a freshness
//! window and refuses to normalize once it has gone stale.

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::domain::OrderType;

/// Lowest valid order price
pub const MIN_PRICE: f64 = 0.01;

/// Highest valid order price
pub const MAX_PRICE: f64 = 0.99;

/// Maximum decimal places for order size
pub const SIZE_DECIMALS: u32 = 2;

/// Maximum decimal places for the notional of immediate (FOK/FAK) orders.
/// Backend constraint: "market buy orders maker amount supports a max
/// accuracy of 2 decimals".
pub const IMMEDIATE_NOTIONAL_DECIMALS: u32 = 2;

/// Tolerance applied after integer scaling. Well below the finest
/// representable increment (1e-4 in the scaled domain) but far above f64
/// representation noise.
const SCALED_EPSILON: f64 = 1e-5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrecisionError {
    #[error(
        "Tick size for token {token_id} is stale ({age_ms}ms old, freshness window {window_ms}ms)"
    )]
    TickSizeStale {
        token_id: String,
        age_ms: u64,
        window_ms: u64,
    },

    #[error("Cannot satisfy {order_type} precision: {reason}")]
    Unsatisfiable {
        order_type: OrderType,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PrecisionError>;

/// Decimal-place budget derived from a market's tick size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundingConfig {
    /// Decimal places for price (matches the tick size scale)
    pub price_decimals: u32,
    /// Decimal places for size (always 2)
    pub size_decimals: u32,
    /// Decimal places for the notional amount (price scale + size scale)
    pub amount_decimals: u32,
}

impl RoundingConfig {
    /// Derive the rounding budget for a tick size.
    ///
    /// 0.1 -> 1/2/3, 0.01 -> 2/2/4, 0.001 -> 3/2/5, 0.0001 -> 4/2/6.
    pub fn for_tick_size(tick_size: f64) -> Self {
        let price_decimals = decimals_of(tick_size);
        Self {
            price_decimals,
            size_decimals: SIZE_DECIMALS,
            amount_decimals: price_decimals + SIZE_DECIMALS,
        }
    }
}

/// Count the decimal places of a tick size (capped at 4, the finest tick the
/// exchange uses)
fn decimals_of(tick_size: f64) -> u32 {
    let mut scaled = tick_size;
    for decimals in 0..=4u32 {
        if (scaled - scaled.round()).abs() < SCALED_EPSILON && scaled.round() >= 1.0 {
            return decimals;
        }
        scaled *= 10.0;
    }
    4
}

/// Round to `decimals` places, half away from zero
fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Truncate toward zero at `decimals` places. A small epsilon absorbs f64
/// representation noise so 100.12 does not truncate to 100.11.
fn truncate_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    ((value * factor) + SCALED_EPSILON).floor() / factor
}

/// Whether `value` lands cleanly on `decimals` places
fn fits_decimals(value: f64, decimals: u32) -> bool {
    let scaled = value * 10f64.powi(decimals as i32);
    (scaled - scaled.round()).abs() < SCALED_EPSILON
}

/// Per-token tick size with a freshness window.
///
/// Tick size changes as price approaches the extremes, so callers fetch a
/// fresh `MarketPrecision` immediately before every price-sensitive
/// operation. Normalization against a stale snapshot fails instead of
/// silently using an outdated tick.
#[derive(Debug, Clone)]
pub struct MarketPrecision {
    pub token_id: String,
    pub tick_size: f64,
    fetched_at: Instant,
    freshness: Duration,
}

impl MarketPrecision {
    pub fn new(token_id: impl Into<String>, tick_size: f64, freshness: Duration) -> Self {
        Self {
            token_id: token_id.into(),
            tick_size,
            fetched_at: Instant::now(),
            freshness,
        }
    }

    /// Age of this snapshot
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether the snapshot has outlived its freshness window
    pub fn is_stale(&self) -> bool {
        self.age() > self.freshness
    }

    /// Decimal budget for this tick size
    pub fn rounding(&self) -> RoundingConfig {
        RoundingConfig::for_tick_size(self.tick_size)
    }
}

/// Normalizes caller prices and sizes against market precision constraints
#[derive(Debug, Clone, Copy)]
pub struct PrecisionNormalizer {
    /// Whether FAK orders share FOK's strict notional rule (deployment
    /// configurable; the exchange documentation leaves it unspecified)
    strict_fak: bool,
}

impl PrecisionNormalizer {
    pub fn new(strict_fak: bool) -> Self {
        Self { strict_fak }
    }

    /// Round a desired price to the nearest tick multiple and clamp it into
    /// the valid range. Fails with `TickSizeStale` when the precision
    /// snapshot has expired.
    pub fn normalize_price(&self, desired: f64, precision: &MarketPrecision) -> Result<f64> {
        if precision.is_stale() {
            return Err(PrecisionError::TickSizeStale {
                token_id: precision.token_id.clone(),
                age_ms: precision.age().as_millis() as u64,
                window_ms: precision.freshness.as_millis() as u64,
            });
        }

        let rounding = precision.rounding();
        let steps = (desired / precision.tick_size).round();
        let price = round_to_decimals(steps * precision.tick_size, rounding.price_decimals);

        Ok(price.clamp(MIN_PRICE, MAX_PRICE))
    }

    /// Truncate a size to the exchange's 2-decimal budget
    pub fn normalize_size(&self, size: f64) -> f64 {
        truncate_to_decimals(size, SIZE_DECIMALS)
    }

    /// Apply order-type specific constraints to an already tick-normalized
    /// price.
    ///
    /// Immediate types (FOK always, FAK when configured strict) require the
    /// truncated size AND the notional to fit 2 decimals. The size is never
    /// searched for a "nearby" value that would pass; if the truncation
    /// does not satisfy the notional rule the normalization fails and the
    /// caller decides whether to downgrade the order type.
    pub fn normalize_for_order_type(
        &self,
        price: f64,
        size: f64,
        order_type: OrderType,
    ) -> Result<(f64, f64)> {
        let size = self.normalize_size(size);
        if size <= 0.0 {
            return Err(PrecisionError::Unsatisfiable {
                order_type,
                reason: format!("size truncates to zero at {} decimals", SIZE_DECIMALS),
            });
        }

        if self.requires_strict_notional(order_type) {
            let notional = size * price;
            if !fits_decimals(notional, IMMEDIATE_NOTIONAL_DECIMALS) {
                return Err(PrecisionError::Unsatisfiable {
                    order_type,
                    reason: format!(
                        "notional {:.6} ({} x {}) does not fit {} decimals",
                        notional, size, price, IMMEDIATE_NOTIONAL_DECIMALS
                    ),
                });
            }
        }

        Ok((price, size))
    }

    fn requires_strict_notional(&self, order_type: OrderType) -> bool {
        match order_type {
            OrderType::FOK => true,
            OrderType::FAK => self.strict_fak,
            OrderType::GTC | OrderType::GTD => false,
        }
    }
}

impl Default for PrecisionNormalizer {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn fresh(tick_size: f64) -> MarketPrecision {
        MarketPrecision::new("token-1", tick_size, Duration::from_secs(10))
    }

    #[test]
    fn test_rounding_config_table() {
        assert_eq!(
            RoundingConfig::for_tick_size(0.1),
            RoundingConfig {
                price_decimals: 1,
                size_decimals: 2,
                amount_decimals: 3
            }
        );
        assert_eq!(RoundingConfig::for_tick_size(0.01).price_decimals, 2);
        assert_eq!(RoundingConfig::for_tick_size(0.001).price_decimals, 3);
        assert_eq!(RoundingConfig::for_tick_size(0.0001).price_decimals, 4);
        assert_eq!(RoundingConfig::for_tick_size(0.0001).amount_decimals, 6);
    }

    #[test]
    fn test_price_rounds_to_tick() {
        let norm = PrecisionNormalizer::default();

        let price = norm.normalize_price(0.456, &fresh(0.01)).unwrap();
        assert!((price - 0.46).abs() < 1e-12);

        let price = norm.normalize_price(0.4549, &fresh(0.01)).unwrap();
        assert!((price - 0.45).abs() < 1e-12);

        let price = norm.normalize_price(0.4567, &fresh(0.001)).unwrap();
        assert!((price - 0.457).abs() < 1e-12);
    }

    #[test]
    fn test_price_clamped_to_valid_range() {
        let norm = PrecisionNormalizer::default();

        let price = norm.normalize_price(0.001, &fresh(0.01)).unwrap();
        assert!((price - MIN_PRICE).abs() < 1e-12);

        let price = norm.normalize_price(0.999, &fresh(0.01)).unwrap();
        assert!((price - MAX_PRICE).abs() < 1e-12);
    }

    #[test]
    fn test_stale_tick_rejected() {
        let norm = PrecisionNormalizer::default();
        let precision = MarketPrecision::new("token-1", 0.01, Duration::from_millis(20));

        sleep(Duration::from_millis(40));

        let err = norm.normalize_price(0.5, &precision).unwrap_err();
        assert!(matches!(err, PrecisionError::TickSizeStale { .. }));
    }

    #[test]
    fn test_size_truncates_toward_zero() {
        let norm = PrecisionNormalizer::default();
        assert!((norm.normalize_size(100.123) - 100.12).abs() < 1e-9);
        assert!((norm.normalize_size(100.129) - 100.12).abs() < 1e-9);
        assert!((norm.normalize_size(100.12) - 100.12).abs() < 1e-9);
        assert!((norm.normalize_size(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_fok_notional_check_fails() {
        // 100.123 truncates to 100.12; 100.12 * 0.45 = 45.054 which does not
        // fit 2 decimals, so FOK normalization must fail
        let norm = PrecisionNormalizer::default();
        let err = norm
            .normalize_for_order_type(0.45, 100.123, OrderType::FOK)
            .unwrap_err();
        assert!(matches!(
            err,
            PrecisionError::Unsatisfiable {
                order_type: OrderType::FOK,
                ..
            }
        ));
    }

    #[test]
    fn test_fok_notional_check_passes() {
        let norm = PrecisionNormalizer::default();
        let (price, size) = norm
            .normalize_for_order_type(0.45, 100.0, OrderType::FOK)
            .unwrap();
        assert!((price - 0.45).abs() < 1e-12);
        assert!((size - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_gtc_skips_notional_check() {
        let norm = PrecisionNormalizer::default();
        let (_, size) = norm
            .normalize_for_order_type(0.45, 100.123, OrderType::GTC)
            .unwrap();
        assert!((size - 100.12).abs() < 1e-9);
    }

    #[test]
    fn test_fak_policy_is_configurable() {
        let loose = PrecisionNormalizer::new(false);
        assert!(loose
            .normalize_for_order_type(0.45, 100.123, OrderType::FAK)
            .is_ok());

        let strict = PrecisionNormalizer::new(true);
        assert!(strict
            .normalize_for_order_type(0.45, 100.123, OrderType::FAK)
            .is_err());
    }

    #[test]
    fn test_zero_size_unsatisfiable() {
        let norm = PrecisionNormalizer::default();
        let err = norm
            .normalize_for_order_type(0.45, 0.004, OrderType::GTC)
            .unwrap_err();
        assert!(matches!(err, PrecisionError::Unsatisfiable { .. }));
    }
}

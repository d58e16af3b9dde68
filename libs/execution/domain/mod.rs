//! Domain Layer
//!
//! Order model shared by every component: sides, order types, lifecycle
//! states and the validated order intent submitted by callers.

mod order;

pub use order::{
    IntentError, LifecycleState, OrderIntent, OrderStatus, OrderType, Side,
};

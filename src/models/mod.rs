pub mod checkout;
pub mod order_history;
pub mod order_status;

pub use checkout::{
    CheckoutItem, CheckoutRequest, Product, ProductSnapshot, StatusHistory, StatusHistoryEntry,
    ValidatedLineItem,
};
pub use order_history::{OrderHistoryEntry, OrderHistoryQuery};
pub use order_status::OrderStatus;

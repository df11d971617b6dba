use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// Lifecycle status of an order, persisted as a numeric code.
///
/// Checkout only ever writes [`OrderStatus::Created`]; the remaining codes
/// exist so that history queries can label orders moved on by other systems.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

pub const UNKNOWN_STATUS_LABEL: &str = "unknown";

impl OrderStatus {
    pub fn code(self) -> i32 {
        match self {
            OrderStatus::Created => 1,
            OrderStatus::Paid => 2,
            OrderStatus::Shipped => 3,
            OrderStatus::Completed => 4,
            OrderStatus::Cancelled => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        OrderStatus::iter().find(|status| status.code() == code)
    }

    /// Human-readable label for a stored status code.
    pub fn label_for_code(code: i32) -> String {
        Self::from_code(code)
            .map(|status| status.to_string())
            .unwrap_or_else(|| UNKNOWN_STATUS_LABEL.to_string())
    }
}

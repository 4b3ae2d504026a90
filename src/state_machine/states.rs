use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Initial state when the order is placed
    Pending,
    /// Order confirmed and being prepared or packed
    InPreparation,
    /// A courier holds a delivery control record for the order
    Assigned,
    /// Order is on its way to the customer
    InTransit,
    /// Order received and confirmed
    Delivered,
    /// Order came back to the warehouse undelivered
    Returned,
    /// Order was voided by the customer or an administrator
    Cancelled,
}

impl OrderStatus {
    /// Every member of the enumeration, in lifecycle order
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending,
        Self::InPreparation,
        Self::Assigned,
        Self::InTransit,
        Self::Delivered,
        Self::Returned,
        Self::Cancelled,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Check if a courier has taken responsibility for the order.
    ///
    /// Assignment never regresses an order that is already at or past this point.
    pub fn is_assigned_or_later(&self) -> bool {
        matches!(self, Self::Assigned | Self::InTransit | Self::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InPreparation => "in_preparation",
            Self::Assigned => "assigned",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_preparation" => Ok(Self::InPreparation),
            "assigned" => Ok(Self::Assigned),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "returned" => Ok(Self::Returned),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

/// Default state for new orders
impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

//! # Delivery Control Model
//!
//! The fulfillment record of an order: which courier holds it, when the record
//! was last touched and whether delivery was confirmed. There is at most one
//! per order, enforced by a unique index on `delivery_controls.order_id`.

use super::identifiers::RecordId;
use crate::state_machine::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeliveryControl {
    pub id: RecordId,
    pub order_id: RecordId,
    pub courier_id: Option<RecordId>,
    pub updated_at: DateTime<Utc>,
    pub delivery_confirmed: bool,
}

impl DeliveryControl {
    /// First assignment of an order to a courier
    pub fn assigned(order_id: RecordId, courier_id: RecordId, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            order_id,
            courier_id: Some(courier_id),
            updated_at: now,
            delivery_confirmed: false,
        }
    }

    /// Hand the order to another courier. Any earlier confirmation is void.
    pub fn reassign(&mut self, courier_id: RecordId, now: DateTime<Utc>) {
        self.courier_id = Some(courier_id);
        self.updated_at = now;
        self.delivery_confirmed = false;
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) {
        self.delivery_confirmed = true;
        self.updated_at = now;
    }

    pub fn mark_returned(&mut self, now: DateTime<Utc>) {
        self.delivery_confirmed = false;
        self.updated_at = now;
    }
}

/// Courier contact summary returned with assignment results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Courier {
    pub id: RecordId,
    pub name: String,
    pub phone: String,
}

/// Outcome of an assignment, confirmation or return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub order_id: RecordId,
    pub status: OrderStatus,
    pub control: DeliveryControl,
    pub courier: Option<Courier>,
    /// True when the call changed nothing because the target state already held
    pub unchanged: bool,
}

/// A delivery control joined with its order and courier for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    pub control: DeliveryControl,
    pub order_status: OrderStatus,
    pub order_created_at: DateTime<Utc>,
    pub order_total: Decimal,
    pub customer_id: RecordId,
    pub address_id: Option<RecordId>,
    pub courier: Option<Courier>,
}

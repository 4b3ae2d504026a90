//! # Order Model
//!
//! One purchase transaction, normal or specialized, with its line items and
//! the satellite records the aggregate view gathers around it.
//!
//! ## Database Schema
//!
//! Maps to the `orders` table:
//! - `id`: primary key (BIGINT, random key)
//! - `customer_id`: owning customer
//! - `address_id`: delivery address, NULL only for specialized orders
//! - `total`: NUMERIC(10, 2), never negative
//! - `status`: one of the seven lifecycle states (VARCHAR)
//!
//! Orders are never deleted. `cancelled` is terminal but retained for audit.

use super::delivery_control::DeliveryControl;
use super::identifiers::RecordId;
use super::specialized_order::SpecializedOrder;
use crate::error::{validation, OrderResult};
use crate::state_machine::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Monetary amounts carry at most this many fractional digits
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(10, 2)` column holds: 99,999,999.99
pub const MAX_MONEY: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, MONEY_SCALE);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: RecordId,
    pub customer_id: RecordId,
    pub created_at: DateTime<Utc>,
    pub total: Decimal,
    pub address_id: Option<RecordId>,
    pub includes_dishes: bool,
    pub status: OrderStatus,
}

impl Order {
    /// A catalog order waiting for preparation
    pub fn new_pending(
        customer_id: RecordId,
        address_id: RecordId,
        total: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            customer_id,
            created_at,
            total,
            address_id: Some(address_id),
            includes_dishes: true,
            status: OrderStatus::Pending,
        }
    }

    /// The parent order of a diet plan: no dishes, no address, zero total
    pub fn new_specialized(customer_id: RecordId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            customer_id,
            created_at,
            total: Decimal::ZERO,
            address_id: None,
            includes_dishes: false,
            status: OrderStatus::Pending,
        }
    }
}

/// One dish and quantity within an order, priced when the order was placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderLineItem {
    pub id: RecordId,
    pub order_id: RecordId,
    pub dish_id: RecordId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl OrderLineItem {
    /// Price `quantity` units of `dish`. A subtotal beyond [`MAX_MONEY`] is a
    /// validation error on `line_items`.
    pub fn priced(order_id: RecordId, dish: &Dish, quantity: i32) -> OrderResult<Self> {
        let subtotal = dish
            .unit_price
            .checked_mul(Decimal::from(quantity))
            .filter(|subtotal| *subtotal <= MAX_MONEY)
            .ok_or_else(|| {
                validation(
                    "line_items",
                    format!(
                        "{quantity} x dish {} at {} exceeds the largest amount {MAX_MONEY}",
                        dish.id, dish.unit_price
                    ),
                )
            })?;
        Ok(Self {
            id: RecordId::generate(),
            order_id,
            dish_id: dish.id,
            quantity,
            unit_price: dish.unit_price,
            subtotal,
        })
    }
}

/// Requested line item as it arrives from the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub dish_id: RecordId,
    pub quantity: i32,
}

/// Catalog dish with its current price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Dish {
    pub id: RecordId,
    pub name: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Address {
    pub id: RecordId,
    pub customer_id: RecordId,
    pub name: String,
    pub reference: Option<String>,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

/// Payment linked 1:1 to an order. Gateway logic lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: RecordId,
    pub order_id: RecordId,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub status: String,
    pub gateway: Option<String>,
    pub reference: Option<String>,
}

/// Listing filters. Every field is optional and the date range is inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<RecordId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn for_customer(mut self, customer_id: RecordId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn created_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn validate(&self) -> OrderResult<()> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(validation(
                    "date_range",
                    format!("start {from} is after end {to}"),
                ));
            }
        }
        Ok(())
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.customer_id.map_or(true, |c| order.customer_id == c)
            && self.created_from.map_or(true, |from| order.created_at >= from)
            && self.created_to.map_or(true, |to| order.created_at <= to)
    }
}

/// Full aggregate view of one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub line_items: Vec<OrderLineItem>,
    pub address: Option<Address>,
    pub payment: Option<Payment>,
    pub delivery_control: Option<DeliveryControl>,
    pub specialized: Option<SpecializedOrder>,
}

//! Domain events
//!
//! Price and stock events carry old and new values so the audit sink can
//! record field-level history for admin edits.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{Money, Sku};

#[derive(Clone, Debug, Serialize)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, Serialize)]
pub enum ProductEvent {
    Created {
        product_id: Uuid,
        sku: Sku,
    },
    PriceChanged {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        old: Money,
        new: Money,
    },
    StockAdjusted {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        old: u32,
        new: u32,
    },
    Deactivated {
        product_id: Uuid,
    },
}

#[derive(Clone, Debug, Serialize)]
pub enum OrderEvent {
    Completed {
        order_id: Uuid,
        order_number: String,
        total: Decimal,
    },
    Refunded {
        order_id: Uuid,
        order_number: String,
    },
}

impl DomainEvent {
    /// Subject used when publishing to the message bus.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "pos.product.created",
            Self::Product(ProductEvent::PriceChanged { .. }) => "pos.product.price_changed",
            Self::Product(ProductEvent::StockAdjusted { .. }) => "pos.product.stock_adjusted",
            Self::Product(ProductEvent::Deactivated { .. }) => "pos.product.deactivated",
            Self::Order(OrderEvent::Completed { .. }) => "pos.order.completed",
            Self::Order(OrderEvent::Refunded { .. }) => "pos.order.refunded",
        }
    }
}

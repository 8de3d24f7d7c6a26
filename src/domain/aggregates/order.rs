//! Order Aggregate
//!
//! Orders are written once at checkout, from a [`Receipt`] snapshot. Names
//! and unit prices are copies taken at sale time; later catalog edits never
//! rewrite order history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::{ItemRef, Receipt};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, TaxRate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Refund,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refund => "refund",
        }
    }

    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "refund" => Ok(Self::Refund),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub item: ItemRef,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub discount: Money,
    pub subtotal: Money,
}

#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("Order already refunded")]
    AlreadyRefunded,
    #[error("Unknown order status '{0}'")]
    UnknownStatus(String),
}

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    order_number: String,
    cashier_id: Option<Uuid>,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    subtotal: Money,
    discount: Money,
    tax_rate: TaxRate,
    tax_amount: Money,
    total: Money,
    cash_received: Money,
    change_due: Money,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

impl Order {
    /// "#0001"-style zero-padded sequential number.
    pub fn format_number(sequence: i64) -> String {
        format!("#{:04}", sequence)
    }

    /// Materializes a paid order from a checkout receipt.
    pub fn from_receipt(sequence: i64, receipt: &Receipt, cashier_id: Option<Uuid>) -> Self {
        let id = Uuid::new_v4();
        let order_number = Self::format_number(sequence);
        let currency = receipt.total.currency().to_string();
        let lines = receipt
            .lines
            .iter()
            .map(|l| OrderLine {
                id: Uuid::new_v4(),
                item: l.item,
                product_name: l.product_name.clone(),
                unit_price: l.unit_price.clone(),
                quantity: l.quantity,
                discount: l.discount.clone(),
                subtotal: l.subtotal.clone(),
            })
            .collect();
        let mut order = Self {
            id,
            order_number: order_number.clone(),
            cashier_id,
            status: OrderStatus::Paid,
            lines,
            subtotal: receipt.subtotal.clone(),
            discount: Money::zero(&currency),
            tax_rate: receipt.tax_rate,
            tax_amount: receipt.tax_amount.clone(),
            total: receipt.total.clone(),
            cash_received: receipt.cash_received.clone(),
            change_due: receipt.change_due.clone(),
            notes: receipt.notes.clone(),
            created_at: receipt.issued_at,
            events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Completed {
            order_id: id,
            order_number,
            total: receipt.total.amount(),
        }));
        order
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn cashier_id(&self) -> Option<Uuid> {
        self.cashier_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> &Money {
        &self.subtotal
    }

    pub fn discount(&self) -> &Money {
        &self.discount
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn tax_amount(&self) -> &Money {
        &self.tax_amount
    }

    pub fn total(&self) -> &Money {
        &self.total
    }

    pub fn cash_received(&self) -> &Money {
        &self.cash_received
    }

    pub fn change_due(&self) -> &Money {
        &self.change_due
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    /// Marks the order refunded. Stock restoration is the caller's concern.
    pub fn refund(&mut self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Refund {
            return Err(OrderError::AlreadyRefunded);
        }
        self.status = OrderStatus::Refund;
        self.raise_event(DomainEvent::Order(OrderEvent::Refunded {
            order_id: self.id,
            order_number: self.order_number.clone(),
        }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn raise_event(&mut self, e: DomainEvent) {
        self.events.push(e);
    }
}

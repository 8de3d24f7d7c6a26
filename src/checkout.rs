//! Checkout boundary.
//!
//! A sale commits three side effects at once: the order row, its lines, and
//! a conditional stock decrement per line. [`SaleStore`] implementations
//! must make that all-or-nothing; a single line with insufficient stock
//! aborts the whole sale and leaves every counter untouched.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::{Cart, CartError, Receipt};
use crate::domain::aggregates::order::Order;
use crate::domain::value_objects::Money;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Cart(#[from] CartError),
    /// Another terminal sold the stock first. Actionable for the operator:
    /// "Item X only has 2 left".
    #[error("'{name}' only has {available} left")]
    StockConflict { name: String, available: u32 },
    #[error("Storage error: {0}")]
    Store(String),
}

/// Persistence sink for completed sales.
#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Persists the receipt as an order with its lines and decrements stock
    /// for every line, in one transaction. Decrements are conditional
    /// (`stock >= quantity`); any failing line rolls the whole sale back
    /// with [`CheckoutError::StockConflict`].
    async fn commit_sale(
        &self,
        receipt: &Receipt,
        cashier_id: Option<Uuid>,
    ) -> Result<Order, CheckoutError>;
}

/// Runs a checkout attempt end to end: snapshot, atomic commit, then cart
/// completion. On any failure the cart keeps its lines and stays in
/// `CheckoutPending`, so the operator can adjust quantities and retry.
pub async fn process(
    cart: &mut Cart,
    cash: &Money,
    notes: Option<String>,
    cashier_id: Option<Uuid>,
    store: &dyn SaleStore,
) -> Result<Order, CheckoutError> {
    let receipt = cart.receipt(cash, notes)?;
    let order = store.commit_sale(&receipt, cashier_id).await?;
    cart.complete();
    Ok(order)
}

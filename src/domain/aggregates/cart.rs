//! Cart Aggregate
//!
//! One cart per terminal session. Lines are keyed by the sellable item, so
//! re-adding an item bumps its quantity instead of duplicating the line, and
//! every quantity change is clamped to the stock ceiling captured when the
//! line was added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{Money, MoneyError, TaxRate};

/// Identifies a sellable catalog entry: a simple product or one of a variant
/// product's variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Product(Uuid),
    Variant(Uuid),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub item: ItemRef,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    /// Stock available when the line was added; quantities never exceed it.
    pub max_quantity: u32,
}

impl CartLine {
    pub fn line_subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartStatus {
    /// Lines are being added, removed, and re-quantified.
    Building,
    /// Cash entry and change preview; returns to Building on cancel.
    CheckoutPending,
    /// Receipt emitted and persisted. Terminal; a fresh cart takes over.
    Completed,
}

#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Insufficient payment: {required} required")]
    InsufficientPayment { required: String },
    #[error("Cart already completed")]
    Completed,
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Immutable snapshot of a completed sale, handed to the persistence sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub total: Money,
    pub cash_received: Money,
    pub change_due: Money,
    pub notes: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// A cart line frozen at sale time. Name and unit price are copies, so later
/// catalog edits never alter historical orders.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub item: ItemRef,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub discount: Money,
    pub subtotal: Money,
}

#[derive(Clone, Debug)]
pub struct Cart {
    id: Uuid,
    status: CartStatus,
    lines: Vec<CartLine>,
    tax_rate: TaxRate,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(currency: &str, tax_rate: TaxRate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: CartStatus::Building,
            lines: vec![],
            tax_rate,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> CartStatus {
        self.status
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Adds one unit of the item, merging into an existing line when the item
    /// is already in the cart. Out-of-stock items (`max_quantity == 0`) and
    /// increments beyond the stock ceiling are silent no-ops, not errors.
    pub fn add_line(
        &mut self,
        item: ItemRef,
        name: impl Into<String>,
        unit_price: Money,
        max_quantity: u32,
    ) -> Result<(), CartError> {
        self.ensure_open()?;
        if max_quantity == 0 {
            return Ok(());
        }
        match self.lines.iter_mut().find(|l| l.item == item) {
            Some(line) => {
                line.quantity = (line.quantity + 1).min(line.max_quantity);
            }
            None => self.lines.push(CartLine {
                item,
                name: name.into(),
                unit_price,
                quantity: 1,
                max_quantity,
            }),
        }
        self.touch();
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line; anything else is
    /// clamped to the line's stock ceiling. Unknown items are ignored.
    pub fn set_quantity(&mut self, item: ItemRef, quantity: u32) -> Result<(), CartError> {
        self.ensure_open()?;
        if quantity == 0 {
            self.lines.retain(|l| l.item != item);
        } else if let Some(line) = self.lines.iter_mut().find(|l| l.item == item) {
            line.quantity = quantity.min(line.max_quantity);
        }
        self.touch();
        Ok(())
    }

    /// Removes the line unconditionally; absent items are not an error.
    pub fn remove_line(&mut self, item: ItemRef) -> Result<(), CartError> {
        self.ensure_open()?;
        self.lines.retain(|l| l.item != item);
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), CartError> {
        self.ensure_open()?;
        self.lines.clear();
        self.touch();
        Ok(())
    }

    pub fn subtotal(&self) -> Money {
        let sum = self
            .lines
            .iter()
            .map(|l| l.line_subtotal().amount())
            .sum();
        Money::new(sum, &self.currency)
    }

    pub fn tax(&self) -> Money {
        self.tax_rate.apply(&self.subtotal())
    }

    pub fn total(&self) -> Money {
        let subtotal = self.subtotal();
        Money::new(subtotal.amount() + self.tax().amount(), &self.currency)
    }

    /// Change owed for the given tender; exactly zero when the tender does
    /// not cover the total. The caller gates checkout completion.
    pub fn change_due(&self, cash: &Money) -> Result<Money, CartError> {
        Ok(cash.saturating_sub(&self.total())?)
    }

    /// Moves the cart to cash entry. Empty carts cannot enter checkout.
    pub fn begin_checkout(&mut self) -> Result<(), CartError> {
        self.ensure_open()?;
        if self.lines.is_empty() {
            return Err(CartError::EmptyCart);
        }
        self.status = CartStatus::CheckoutPending;
        self.touch();
        Ok(())
    }

    /// Returns from cash entry to line editing.
    pub fn cancel_checkout(&mut self) -> Result<(), CartError> {
        self.ensure_open()?;
        self.status = CartStatus::Building;
        self.touch();
        Ok(())
    }

    /// Builds the immutable sale snapshot without touching cart state. The
    /// caller persists it (order, order lines, stock decrements) atomically
    /// and only then calls [`Cart::complete`].
    pub fn receipt(&self, cash: &Money, notes: Option<String>) -> Result<Receipt, CartError> {
        if self.status == CartStatus::Completed {
            return Err(CartError::Completed);
        }
        if self.lines.is_empty() {
            return Err(CartError::EmptyCart);
        }
        let subtotal = self.subtotal();
        let tax_amount = self.tax();
        let total = self.total();
        if !cash.covers(&total)? {
            return Err(CartError::InsufficientPayment {
                required: format!("{} {}", total.currency(), total.amount()),
            });
        }
        let change_due = cash.saturating_sub(&total)?;
        let lines = self
            .lines
            .iter()
            .map(|l| ReceiptLine {
                item: l.item,
                product_name: l.name.clone(),
                unit_price: l.unit_price.clone(),
                quantity: l.quantity,
                discount: Money::zero(&self.currency),
                subtotal: l.line_subtotal(),
            })
            .collect();
        Ok(Receipt {
            lines,
            subtotal,
            tax_rate: self.tax_rate,
            tax_amount,
            total,
            cash_received: cash.clone(),
            change_due,
            notes,
            issued_at: Utc::now(),
        })
    }

    /// Marks the sale done after the snapshot was persisted. Clears the
    /// lines; the cart is terminal from here on.
    pub fn complete(&mut self) {
        self.lines.clear();
        self.status = CartStatus::Completed;
        self.touch();
    }

    fn ensure_open(&self) -> Result<(), CartError> {
        if self.status == CartStatus::Completed {
            return Err(CartError::Completed);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cart() -> Cart {
        Cart::new("NGN", TaxRate::percent(dec!(5.00)))
    }

    fn item(n: u128) -> ItemRef {
        ItemRef::Product(Uuid::from_u128(n))
    }

    #[test]
    fn test_add_merges_and_clamps_to_stock() {
        let mut cart = cart();
        for _ in 0..5 {
            cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 3).unwrap();
        }
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn test_out_of_stock_add_is_a_no_op() {
        let mut cart = cart();
        cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_product_and_variant_with_same_id_are_distinct_lines() {
        let mut cart = cart();
        let id = Uuid::from_u128(7);
        cart.add_line(ItemRef::Product(id), "Mug", Money::ngn(dec!(500)), 5).unwrap();
        cart.add_line(ItemRef::Variant(id), "Mug / Red", Money::ngn(dec!(600)), 5).unwrap();
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_set_quantity_clamps_and_zero_removes() {
        let mut cart = cart();
        cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 4).unwrap();
        cart.set_quantity(item(1), 99).unwrap();
        assert_eq!(cart.lines()[0].quantity, 4);
        cart.set_quantity(item(1), 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_removed_line_readds_at_quantity_one() {
        let mut cart = cart();
        cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 5).unwrap();
        cart.set_quantity(item(1), 4).unwrap();
        cart.remove_line(item(1)).unwrap();
        cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 5).unwrap();
        assert_eq!(cart.lines()[0].quantity, 1);
    }

    #[test]
    fn test_totals() {
        let mut cart = cart();
        cart.add_line(item(1), "Shirt", Money::ngn(dec!(1000)), 10).unwrap();
        cart.set_quantity(item(1), 2).unwrap();
        cart.add_line(item(2), "Socks", Money::ngn(dec!(500)), 10).unwrap();
        cart.set_quantity(item(2), 3).unwrap();

        assert_eq!(cart.subtotal().amount(), dec!(3500));
        assert_eq!(cart.tax().amount(), dec!(175.00));
        assert_eq!(cart.total().amount(), dec!(3675.00));
        assert_eq!(cart.change_due(&Money::ngn(dec!(4000))).unwrap().amount(), dec!(325.00));
        assert_eq!(cart.change_due(&Money::ngn(dec!(3000))).unwrap().amount(), dec!(0));
    }

    #[test]
    fn test_receipt_snapshot() {
        let mut cart = cart();
        cart.add_line(item(1), "Shirt", Money::ngn(dec!(1000)), 10).unwrap();
        cart.set_quantity(item(1), 2).unwrap();
        cart.add_line(item(2), "Socks", Money::ngn(dec!(500)), 10).unwrap();
        cart.set_quantity(item(2), 3).unwrap();
        cart.begin_checkout().unwrap();

        let receipt = cart.receipt(&Money::ngn(dec!(3675.00)), Some("walk-in".into())).unwrap();
        assert_eq!(receipt.total.amount(), dec!(3675.00));
        assert_eq!(receipt.change_due.amount(), dec!(0));
        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(receipt.lines[0].subtotal.amount(), dec!(2000));
        // Snapshot did not consume the cart; completion is the store's call.
        assert_eq!(cart.status(), CartStatus::CheckoutPending);
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_insufficient_payment_leaves_cart_unchanged() {
        let mut cart = cart();
        cart.add_line(item(1), "Shirt", Money::ngn(dec!(1000)), 10).unwrap();
        cart.set_quantity(item(1), 2).unwrap();
        cart.add_line(item(2), "Socks", Money::ngn(dec!(500)), 10).unwrap();
        cart.set_quantity(item(2), 3).unwrap();
        cart.begin_checkout().unwrap();

        let err = cart.receipt(&Money::ngn(dec!(3000.00)), None).unwrap_err();
        assert!(matches!(err, CartError::InsufficientPayment { .. }));
        assert_eq!(cart.status(), CartStatus::CheckoutPending);
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.total().amount(), dec!(3675.00));
    }

    #[test]
    fn test_empty_cart_cannot_checkout() {
        let mut cart = cart();
        assert!(matches!(cart.begin_checkout(), Err(CartError::EmptyCart)));
        assert!(matches!(
            cart.receipt(&Money::ngn(dec!(100)), None),
            Err(CartError::EmptyCart)
        ));
    }

    #[test]
    fn test_cancel_returns_to_building() {
        let mut cart = cart();
        cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 3).unwrap();
        cart.begin_checkout().unwrap();
        assert_eq!(cart.status(), CartStatus::CheckoutPending);
        cart.cancel_checkout().unwrap();
        assert_eq!(cart.status(), CartStatus::Building);
    }

    #[test]
    fn test_completed_cart_is_terminal() {
        let mut cart = cart();
        cart.add_line(item(1), "Cap", Money::ngn(dec!(1000)), 3).unwrap();
        cart.begin_checkout().unwrap();
        cart.complete();
        assert!(cart.is_empty());
        assert_eq!(cart.status(), CartStatus::Completed);
        assert!(matches!(
            cart.add_line(item(2), "Mug", Money::ngn(dec!(500)), 2),
            Err(CartError::Completed)
        ));
    }
}

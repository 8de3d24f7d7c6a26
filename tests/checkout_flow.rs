//! End-to-end checkout flow against an in-memory sale store.
//!
//! The store mirrors the all-or-nothing contract of the Postgres
//! implementation: every line's stock is verified before any counter moves,
//! so a single short line aborts the sale without touching the others.

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use openpos::checkout::{self, CheckoutError, SaleStore};
use openpos::domain::aggregates::cart::{Cart, CartStatus, ItemRef, Receipt};
use openpos::domain::aggregates::order::Order;
use openpos::domain::value_objects::{Money, TaxRate};

struct MemoryStore {
    stock: Mutex<HashMap<ItemRef, u32>>,
    orders: Mutex<Vec<Order>>,
    sequence: AtomicI64,
}

impl MemoryStore {
    fn new(stock: impl IntoIterator<Item = (ItemRef, u32)>) -> Self {
        Self {
            stock: Mutex::new(stock.into_iter().collect()),
            orders: Mutex::new(Vec::new()),
            sequence: AtomicI64::new(1),
        }
    }

    fn stock_of(&self, item: ItemRef) -> u32 {
        *self.stock.lock().unwrap().get(&item).unwrap_or(&0)
    }

    fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl SaleStore for MemoryStore {
    async fn commit_sale(
        &self,
        receipt: &Receipt,
        cashier_id: Option<Uuid>,
    ) -> Result<Order, CheckoutError> {
        let mut stock = self.stock.lock().unwrap();
        // Verify every line before decrementing anything.
        for line in &receipt.lines {
            let available = *stock.get(&line.item).unwrap_or(&0);
            if available < line.quantity {
                return Err(CheckoutError::StockConflict {
                    name: line.product_name.clone(),
                    available,
                });
            }
        }
        for line in &receipt.lines {
            if let Some(available) = stock.get_mut(&line.item) {
                *available -= line.quantity;
            }
        }
        let order = Order::from_receipt(
            self.sequence.fetch_add(1, Ordering::SeqCst),
            receipt,
            cashier_id,
        );
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }
}

fn shirt() -> ItemRef {
    ItemRef::Product(Uuid::from_u128(1))
}

fn socks() -> ItemRef {
    ItemRef::Variant(Uuid::from_u128(2))
}

fn build_cart() -> Cart {
    let mut cart = Cart::new("NGN", TaxRate::percent(dec!(5.00)));
    cart.add_line(shirt(), "Shirt", Money::ngn(dec!(1000)), 10).unwrap();
    cart.set_quantity(shirt(), 2).unwrap();
    cart.add_line(socks(), "Socks / Black", Money::ngn(dec!(500)), 10).unwrap();
    cart.set_quantity(socks(), 3).unwrap();
    cart.begin_checkout().unwrap();
    cart
}

#[tokio::test]
async fn checkout_decrements_stock_and_clears_cart() {
    let store = MemoryStore::new([(shirt(), 10), (socks(), 10)]);
    let mut cart = build_cart();

    let order = checkout::process(
        &mut cart,
        &Money::ngn(dec!(3675.00)),
        Some("walk-in".into()),
        None,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(order.order_number(), "#0001");
    assert_eq!(order.total().amount(), dec!(3675.00));
    assert_eq!(order.change_due().amount(), dec!(0));
    assert_eq!(store.stock_of(shirt()), 8);
    assert_eq!(store.stock_of(socks()), 7);
    assert_eq!(store.order_count(), 1);
    assert_eq!(cart.status(), CartStatus::Completed);
    assert!(cart.is_empty());
}

#[tokio::test]
async fn insufficient_payment_commits_nothing() {
    let store = MemoryStore::new([(shirt(), 10), (socks(), 10)]);
    let mut cart = build_cart();

    let err = checkout::process(&mut cart, &Money::ngn(dec!(3000.00)), None, None, &store)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Cart(_)));
    assert_eq!(store.stock_of(shirt()), 10);
    assert_eq!(store.order_count(), 0);
    assert_eq!(cart.status(), CartStatus::CheckoutPending);
    assert_eq!(cart.lines().len(), 2);
}

#[tokio::test]
async fn short_second_line_aborts_whole_sale() {
    // Second line's backing stock was sold down to 2 by another terminal
    // after the cart captured its ceiling of 10.
    let store = MemoryStore::new([(shirt(), 10), (socks(), 2)]);
    let mut cart = build_cart();

    let err = checkout::process(&mut cart, &Money::ngn(dec!(4000.00)), None, None, &store)
        .await
        .unwrap_err();

    match err {
        CheckoutError::StockConflict { name, available } => {
            assert_eq!(name, "Socks / Black");
            assert_eq!(available, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // First line untouched, no order row, cart still pending for a retry.
    assert_eq!(store.stock_of(shirt()), 10);
    assert_eq!(store.stock_of(socks()), 2);
    assert_eq!(store.order_count(), 0);
    assert_eq!(cart.status(), CartStatus::CheckoutPending);

    // Operator drops the short line's quantity and retries successfully.
    cart.set_quantity(socks(), 2).unwrap();
    let order = checkout::process(&mut cart, &Money::ngn(dec!(4000.00)), None, None, &store)
        .await
        .unwrap();
    assert_eq!(order.subtotal().amount(), dec!(3000));
    assert_eq!(store.stock_of(socks()), 0);
    assert_eq!(cart.status(), CartStatus::Completed);
}

#[tokio::test]
async fn sequential_sales_number_in_order() {
    let store = MemoryStore::new([(shirt(), 10)]);
    for expected in ["#0001", "#0002", "#0003"] {
        let mut cart = Cart::new("NGN", TaxRate::percent(dec!(5.00)));
        cart.add_line(shirt(), "Shirt", Money::ngn(dec!(1000)), 10).unwrap();
        cart.begin_checkout().unwrap();
        let order = checkout::process(&mut cart, &Money::ngn(dec!(2000)), None, None, &store)
            .await
            .unwrap();
        assert_eq!(order.order_number(), expected);
    }
    assert_eq!(store.stock_of(shirt()), 7);
}

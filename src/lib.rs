//! OpenPOS
//!
//! Self-hosted retail point-of-sale and inventory service.
//!
//! ## Features
//! - Product catalog with variation axes and generated variants
//! - Deterministic SKU/name derivation over option cross-products
//! - Cart pricing with stock-clamped quantities and fixed-decimal totals
//! - Atomic checkout: order, order lines, and stock decrements commit
//!   together or not at all
//! - Field-level audit trail for price and stock edits

pub mod checkout;
pub mod config;
pub mod domain;
pub mod store;

pub use checkout::{CheckoutError, SaleStore};
pub use config::Config;
pub use domain::aggregates::{
    Cart, CartError, CartLine, CartStatus, ItemRef, Order, OrderLine, OrderStatus, Product,
    ProductError, ProductVariant, Receipt, ReceiptLine,
};
pub use domain::events::{DomainEvent, OrderEvent, ProductEvent};
pub use domain::value_objects::{Money, MoneyError, Quantity, Sku, TaxRate};
pub use domain::variations::{
    expand, Axis, Selection, SelectionError, VariantDraft, VariantDrafts, VariationOption,
    VariationType,
};
pub use store::{NewProduct, PgStore, StoreError};

//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError, ProductVariant};
pub use order::{Order, OrderError, OrderLine, OrderStatus};
pub use cart::{Cart, CartError, CartLine, CartStatus, ItemRef, Receipt, ReceiptLine};

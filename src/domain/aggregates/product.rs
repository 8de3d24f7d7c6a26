//! Product Aggregate

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::domain::variations::VariantDraft;

#[derive(Clone, Debug)]
pub struct Product {
    id: Uuid,
    category_id: Option<Uuid>,
    name: String,
    sku: Sku,
    sku_prefix: Option<String>,
    description: Option<String>,
    cost_price: Money,
    selling_price: Money,
    stock_quantity: Quantity,
    low_stock_threshold: u32,
    is_active: bool,
    is_hot: bool,
    has_variants: bool,
    variants: Vec<ProductVariant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// A sellable option combination of a variant product. Owned by its product
/// and deleted with it.
#[derive(Clone, Debug)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: Sku,
    pub variant_name: String,
    pub price: Money,
    pub stock_quantity: Quantity,
    pub is_active: bool,
    pub option_ids: Vec<Uuid>,
}

impl ProductVariant {
    /// "Product Name - Small / Red"
    pub fn display_name(&self, product_name: &str) -> String {
        format!("{} - {}", product_name, self.variant_name)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("Insufficient stock")]
    InsufficientStock,
    #[error("Unknown variant")]
    UnknownVariant,
    #[error("Stock is tracked per variant for this product")]
    StockOnVariants,
    #[error(transparent)]
    Sku(#[from] crate::domain::value_objects::SkuError),
}

impl Product {
    pub fn create(
        name: impl Into<String>,
        sku: Sku,
        category_id: Option<Uuid>,
        selling_price: Money,
        stock_quantity: u32,
    ) -> Result<Self, ProductError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProductError::MissingName);
        }
        let id = Uuid::new_v4();
        let now = Utc::now();
        let currency = selling_price.currency().to_string();
        let mut product = Self {
            id,
            category_id,
            name,
            sku: sku.clone(),
            sku_prefix: None,
            description: None,
            cost_price: Money::zero(&currency),
            selling_price,
            stock_quantity: Quantity::new(stock_quantity),
            low_stock_threshold: 5,
            is_active: true,
            is_hot: false,
            has_variants: false,
            variants: vec![],
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created {
            product_id: id,
            sku,
        }));
        Ok(product)
    }

    /// Attaches generated variants. The product becomes a variant product:
    /// its own price and stock turn advisory and sellable stock is the sum
    /// over variants from here on.
    pub fn attach_variants(
        &mut self,
        prefix: impl Into<String>,
        drafts: Vec<VariantDraft>,
    ) -> Result<(), ProductError> {
        if drafts.is_empty() {
            return Ok(());
        }
        for draft in drafts {
            self.variants.push(ProductVariant {
                id: Uuid::new_v4(),
                product_id: self.id,
                sku: Sku::new(draft.sku)?,
                variant_name: draft.name,
                price: draft.price,
                stock_quantity: Quantity::new(draft.stock),
                is_active: true,
                option_ids: draft.option_ids,
            });
        }
        self.sku_prefix = Some(prefix.into());
        self.has_variants = true;
        self.touch();
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn sku_prefix(&self) -> Option<&str> {
        self.sku_prefix.as_deref()
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }

    pub fn selling_price(&self) -> &Money {
        &self.selling_price
    }

    pub fn cost_price(&self) -> &Money {
        &self.cost_price
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_hot(&self) -> bool {
        self.is_hot
    }

    pub fn has_variants(&self) -> bool {
        self.has_variants
    }

    pub fn variants(&self) -> &[ProductVariant] {
        &self.variants
    }

    pub fn base_stock(&self) -> Quantity {
        self.stock_quantity
    }

    /// Total sellable stock: the sum over variants for a variant product,
    /// the base quantity otherwise. Never both.
    pub fn sellable_stock(&self) -> u32 {
        if self.has_variants {
            self.variants
                .iter()
                .filter(|v| v.is_active)
                .map(|v| v.stock_quantity.value())
                .sum()
        } else {
            self.stock_quantity.value()
        }
    }

    pub fn is_in_stock(&self) -> bool {
        self.sellable_stock() > 0
    }

    /// "out_of_stock" / "low_stock" / "in_stock" against the threshold.
    pub fn stock_status(&self) -> &'static str {
        let stock = self.sellable_stock();
        if stock == 0 {
            "out_of_stock"
        } else if stock <= self.low_stock_threshold {
            "low_stock"
        } else {
            "in_stock"
        }
    }

    pub fn update_price(&mut self, new_price: Money) {
        let old = self.selling_price.clone();
        self.selling_price = new_price.clone();
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::PriceChanged {
            product_id: self.id,
            variant_id: None,
            old,
            new: new_price,
        }));
    }

    pub fn set_stock(&mut self, quantity: u32) {
        let old = self.stock_quantity;
        self.stock_quantity = Quantity::new(quantity);
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockAdjusted {
            product_id: self.id,
            variant_id: None,
            old: old.value(),
            new: quantity,
        }));
    }

    pub fn update_variant_price(
        &mut self,
        variant_id: Uuid,
        new_price: Money,
    ) -> Result<(), ProductError> {
        let product_id = self.id;
        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.id == variant_id)
            .ok_or(ProductError::UnknownVariant)?;
        let old = variant.price.clone();
        variant.price = new_price.clone();
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::PriceChanged {
            product_id,
            variant_id: Some(variant_id),
            old,
            new: new_price,
        }));
        Ok(())
    }

    pub fn set_variant_stock(&mut self, variant_id: Uuid, quantity: u32) -> Result<(), ProductError> {
        let product_id = self.id;
        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.id == variant_id)
            .ok_or(ProductError::UnknownVariant)?;
        let old = variant.stock_quantity;
        variant.stock_quantity = Quantity::new(quantity);
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockAdjusted {
            product_id,
            variant_id: Some(variant_id),
            old: old.value(),
            new: quantity,
        }));
        Ok(())
    }

    /// Checked decrement of base stock; fails when the quantity on hand
    /// cannot cover the request.
    pub fn decrement_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        if self.has_variants {
            return Err(ProductError::StockOnVariants);
        }
        self.stock_quantity = self
            .stock_quantity
            .subtract(qty)
            .ok_or(ProductError::InsufficientStock)?;
        self.touch();
        Ok(())
    }

    pub fn decrement_variant_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<(), ProductError> {
        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.id == variant_id)
            .ok_or(ProductError::UnknownVariant)?;
        variant.stock_quantity = variant
            .stock_quantity
            .subtract(qty)
            .ok_or(ProductError::InsufficientStock)?;
        self.touch();
        Ok(())
    }

    /// Soft-disable; referenced products are never hard-deleted.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Deactivated {
            product_id: self.id,
        }));
    }

    pub fn mark_hot(&mut self, hot: bool) {
        self.is_hot = hot;
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn raise_event(&mut self, e: DomainEvent) {
        self.events.push(e);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::variations::{expand, Axis, Selection, VariationOption, VariationType};
    use rust_decimal_macros::dec;

    fn simple_product() -> Product {
        Product::create(
            "Plain Mug",
            Sku::new("MUG-01").unwrap(),
            None,
            Money::ngn(dec!(500)),
            8,
        )
        .unwrap()
    }

    fn variant_product() -> Product {
        let size = VariationType {
            id: Uuid::new_v4(),
            name: "Size".into(),
            slug: "size".into(),
            sort_order: 1,
            is_active: true,
        };
        let options = vec![
            VariationOption {
                id: Uuid::new_v4(),
                type_id: size.id,
                name: "Small".into(),
                code: "S".into(),
                value: None,
                sort_order: 1,
                is_active: true,
            },
            VariationOption {
                id: Uuid::new_v4(),
                type_id: size.id,
                name: "Large".into(),
                code: "L".into(),
                value: None,
                sort_order: 2,
                is_active: true,
            },
        ];
        let selection = Selection::new().with_axis(Axis::new(size, options).unwrap());
        let drafts = expand(&selection, "TEE", &Money::ngn(dec!(1000)));

        let mut product = Product::create(
            "Tee",
            Sku::new("TEE").unwrap(),
            None,
            Money::ngn(dec!(1000)),
            0,
        )
        .unwrap();
        product.attach_variants("TEE", drafts).unwrap();
        product
    }

    #[test]
    fn test_simple_product_sells_base_stock() {
        let p = simple_product();
        assert!(!p.has_variants());
        assert_eq!(p.sellable_stock(), 8);
    }

    #[test]
    fn test_variant_product_sells_summed_variant_stock() {
        let mut p = variant_product();
        assert!(p.has_variants());
        assert_eq!(p.sellable_stock(), 0);

        let small = p.variants()[0].id;
        let large = p.variants()[1].id;
        p.set_variant_stock(small, 3).unwrap();
        p.set_variant_stock(large, 4).unwrap();
        // Base stock never contributes once variants exist.
        assert_eq!(p.sellable_stock(), 7);
        assert_eq!(p.base_stock().value(), 0);
    }

    #[test]
    fn test_stock_status_thresholds() {
        let mut p = simple_product();
        assert_eq!(p.stock_status(), "in_stock");
        p.set_stock(5);
        assert_eq!(p.stock_status(), "low_stock");
        p.set_stock(0);
        assert_eq!(p.stock_status(), "out_of_stock");
    }

    #[test]
    fn test_price_change_raises_audit_event() {
        let mut p = simple_product();
        p.take_events();
        p.update_price(Money::ngn(dec!(650)));
        let events = p.take_events();
        assert!(matches!(
            events.as_slice(),
            [DomainEvent::Product(ProductEvent::PriceChanged { variant_id: None, .. })]
        ));
    }

    #[test]
    fn test_variant_stock_edit_raises_audit_event() {
        let mut p = variant_product();
        let variant_id = p.variants()[0].id;
        p.take_events();
        p.set_variant_stock(variant_id, 12).unwrap();
        let events = p.take_events();
        match events.as_slice() {
            [DomainEvent::Product(ProductEvent::StockAdjusted { variant_id: Some(v), old, new, .. })] => {
                assert_eq!(*v, variant_id);
                assert_eq!((*old, *new), (0, 12));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_checked_decrement() {
        let mut p = simple_product();
        p.decrement_stock(8).unwrap();
        assert!(matches!(
            p.decrement_stock(1),
            Err(ProductError::InsufficientStock)
        ));
    }

    #[test]
    fn test_variant_display_name() {
        let p = variant_product();
        assert_eq!(p.variants()[0].display_name(p.name()), "Tee - Small");
    }
}

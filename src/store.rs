//! Postgres persistence for catalog, taxonomy, orders, and the audit trail.
//!
//! The checkout path is the one place that needs transactional discipline:
//! order rows and conditional stock decrements commit together or not at
//! all. Everything else is plain sequential CRUD.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::checkout::{CheckoutError, SaleStore};
use crate::domain::aggregates::cart::{ItemRef, Receipt};
use crate::domain::aggregates::order::Order;
use crate::domain::events::ProductEvent;
use crate::domain::value_objects::Money;
use crate::domain::variations::{
    Axis, Selection, SelectionError, VariantDraft, VariationOption, VariationType,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SKU '{0}' already exists")]
    DuplicateSku(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    currency: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VariationTypeRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VariationOptionRow {
    pub id: Uuid,
    pub variation_type_id: Uuid,
    pub name: String,
    pub code: String,
    pub value: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariationTypeWithOptions {
    #[serde(flatten)]
    pub variation_type: VariationTypeRow,
    pub options: Vec<VariationOptionRow>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<String>,
    pub sku_prefix: Option<String>,
    pub selling_price: Decimal,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub is_hot: bool,
    pub has_variants: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductVariantRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub variant_name: String,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub is_active: bool,
}

/// One entry of the POS terminal grid: a simple product or a variant,
/// flattened to what the cashier needs.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SellableItemRow {
    pub item_id: Uuid,
    pub is_variant: bool,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
    pub is_hot: bool,
}

impl SellableItemRow {
    pub fn item_ref(&self) -> ItemRef {
        if self.is_variant {
            ItemRef::Variant(self.item_id)
        } else {
            ItemRef::Product(self.item_id)
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub cashier_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub cash_received: Option<Decimal>,
    pub change_due: Option<Decimal>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_type: String,
    pub item_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub discount: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub product_id: Uuid,
    pub product_variant_id: Option<Uuid>,
    pub action: String,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub sku_prefix: Option<String>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub stock_quantity: i32,
    pub is_hot: bool,
    pub variants: Vec<VariantDraft>,
}

impl PgStore {
    pub fn new(pool: PgPool, currency: impl Into<String>) -> Self {
        Self { pool, currency: currency.into() }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    // ---- categories -------------------------------------------------------

    pub async fn list_categories(&self) -> Result<Vec<CategoryRow>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, slug, icon, sort_order, is_active
             FROM categories WHERE is_active ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_category(
        &self,
        name: &str,
        icon: Option<&str>,
    ) -> Result<CategoryRow, StoreError> {
        let slug = VariationType::slugify(name);
        sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (id, name, slug, icon)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, slug, icon, sort_order, is_active",
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(&slug)
        .bind(icon)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)
    }

    // ---- variation taxonomy ----------------------------------------------

    pub async fn list_variation_types(&self) -> Result<Vec<VariationTypeWithOptions>, StoreError> {
        let types = sqlx::query_as::<_, VariationTypeRow>(
            "SELECT id, name, slug, sort_order, is_active
             FROM variation_types WHERE is_active ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;
        let options = sqlx::query_as::<_, VariationOptionRow>(
            "SELECT id, variation_type_id, name, code, value, sort_order, is_active
             FROM variation_options WHERE is_active ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(types
            .into_iter()
            .map(|t| {
                let options = options
                    .iter()
                    .filter(|o| o.variation_type_id == t.id)
                    .cloned()
                    .collect();
                VariationTypeWithOptions { variation_type: t, options }
            })
            .collect())
    }

    pub async fn create_variation_type(
        &self,
        name: &str,
        sort_order: i32,
    ) -> Result<VariationTypeRow, StoreError> {
        let slug = VariationType::slugify(name);
        sqlx::query_as::<_, VariationTypeRow>(
            "INSERT INTO variation_types (id, name, slug, sort_order)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, slug, sort_order, is_active",
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(&slug)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)
    }

    pub async fn create_variation_option(
        &self,
        type_id: Uuid,
        name: &str,
        code: &str,
        value: Option<&str>,
        sort_order: i32,
    ) -> Result<VariationOptionRow, StoreError> {
        sqlx::query_as::<_, VariationOptionRow>(
            "INSERT INTO variation_options (id, variation_type_id, name, code, value, sort_order)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, variation_type_id, name, code, value, sort_order, is_active",
        )
        .bind(Uuid::now_v7())
        .bind(type_id)
        .bind(name)
        .bind(code)
        .bind(value)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)
    }

    /// Soft-disable; types referenced by variants are never deleted.
    pub async fn deactivate_variation_type(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE variation_types SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Variation type {id}")));
        }
        Ok(())
    }

    /// Resolves slug/option-id pairs into a validated [`Selection`] for the
    /// combinator. Unknown slugs or option ids reject the whole selection.
    pub async fn load_selection(
        &self,
        axes: &[(String, Vec<Uuid>)],
    ) -> Result<Selection, StoreError> {
        let mut selection = Selection::new();
        for (slug, option_ids) in axes {
            let type_row = sqlx::query_as::<_, VariationTypeRow>(
                "SELECT id, name, slug, sort_order, is_active
                 FROM variation_types WHERE slug = $1",
            )
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Variation type '{slug}'")))?;

            let option_rows = sqlx::query_as::<_, VariationOptionRow>(
                "SELECT id, variation_type_id, name, code, value, sort_order, is_active
                 FROM variation_options WHERE id = ANY($1) ORDER BY sort_order, id",
            )
            .bind(option_ids)
            .fetch_all(&self.pool)
            .await?;
            if option_rows.len() != option_ids.len() {
                return Err(StoreError::NotFound(format!(
                    "One or more options of axis '{slug}'"
                )));
            }

            let variation_type = VariationType {
                id: type_row.id,
                name: type_row.name,
                slug: type_row.slug,
                sort_order: type_row.sort_order,
                is_active: type_row.is_active,
            };
            let options = option_rows
                .into_iter()
                .map(|o| VariationOption {
                    id: o.id,
                    type_id: o.variation_type_id,
                    name: o.name,
                    code: o.code,
                    value: o.value,
                    sort_order: o.sort_order,
                    is_active: o.is_active,
                })
                .collect();
            selection.push(Axis::new(variation_type, options)?);
        }
        Ok(selection)
    }

    // ---- products ---------------------------------------------------------

    /// Creates a product and its generated variants in one transaction.
    /// Duplicate SKUs abort the whole insert; collisions are surfaced, never
    /// renamed away.
    pub async fn create_product(&self, input: NewProduct) -> Result<Uuid, StoreError> {
        let mut txn = self.pool.begin().await?;
        let product_id = Uuid::now_v7();
        let has_variants = !input.variants.is_empty();

        sqlx::query(
            "INSERT INTO products (id, category_id, name, sku, sku_prefix, description,
                                   cost_price, selling_price, stock_quantity, is_hot, has_variants)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(product_id)
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.sku_prefix)
        .bind(&input.sku_prefix)
        .bind(&input.description)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(input.stock_quantity)
        .bind(input.is_hot)
        .bind(has_variants)
        .execute(&mut *txn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateSku(input.sku_prefix.clone().unwrap_or_default())
            } else {
                e.into()
            }
        })?;

        for draft in &input.variants {
            let variant_id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO product_variants (id, product_id, sku, variant_name, price, stock_quantity)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(variant_id)
            .bind(product_id)
            .bind(&draft.sku)
            .bind(&draft.name)
            .bind(draft.price.amount())
            .bind(draft.stock as i32)
            .execute(&mut *txn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateSku(draft.sku.clone())
                } else {
                    e.into()
                }
            })?;

            for option_id in &draft.option_ids {
                sqlx::query(
                    "INSERT INTO product_variant_options (product_variant_id, variation_option_id)
                     VALUES ($1, $2)",
                )
                .bind(variant_id)
                .bind(option_id)
                .execute(&mut *txn)
                .await?;
            }
        }

        self.insert_audit(
            &mut txn,
            None,
            product_id,
            None,
            "created",
            None,
            None,
            None,
            Some(&format!("Product '{}' created", input.name)),
        )
        .await?;

        txn.commit().await?;
        Ok(product_id)
    }

    pub async fn get_product(
        &self,
        id: Uuid,
    ) -> Result<(ProductRow, Vec<ProductVariantRow>), StoreError> {
        let product = sqlx::query_as::<_, ProductRow>(
            "SELECT id, category_id, name, sku, sku_prefix, selling_price, stock_quantity,
                    low_stock_threshold, is_active, is_hot, has_variants, created_at
             FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Product {id}")))?;

        let variants = sqlx::query_as::<_, ProductVariantRow>(
            "SELECT id, product_id, sku, variant_name, price, stock_quantity, is_active
             FROM product_variants WHERE product_id = $1 ORDER BY sku",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok((product, variants))
    }

    pub async fn list_products(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<ProductRow>, i64), StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, category_id, name, sku, sku_prefix, selling_price, stock_quantity,
                    low_stock_threshold, is_active, is_hot, has_variants, created_at
             FROM products WHERE is_active
             ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(per_page as i64)
        .bind(((page - 1) * per_page) as i64)
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE is_active")
            .fetch_one(&self.pool)
            .await?;
        Ok((rows, total.0))
    }

    /// Active, in-stock items for the terminal grid: simple products plus
    /// the active variants of variant products.
    pub async fn sellable_items(
        &self,
        search: Option<&str>,
        category_id: Option<Uuid>,
    ) -> Result<Vec<SellableItemRow>, StoreError> {
        let mut items = sqlx::query_as::<_, SellableItemRow>(
            "SELECT id AS item_id, FALSE AS is_variant, name, sku, selling_price AS price,
                    stock_quantity AS stock, image AS image_url, is_hot
             FROM products
             WHERE is_active AND NOT has_variants AND stock_quantity > 0
               AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
               AND ($2::uuid IS NULL OR category_id = $2)",
        )
        .bind(search)
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        let variants = sqlx::query_as::<_, SellableItemRow>(
            "SELECT v.id AS item_id, TRUE AS is_variant,
                    p.name || ' - ' || v.variant_name AS name, v.sku, v.price,
                    v.stock_quantity AS stock, p.image AS image_url, p.is_hot
             FROM product_variants v
             JOIN products p ON p.id = v.product_id
             WHERE v.is_active AND p.is_active AND v.stock_quantity > 0
               AND ($1::text IS NULL OR p.name ILIKE '%' || $1 || '%'
                    OR v.variant_name ILIKE '%' || $1 || '%')
               AND ($2::uuid IS NULL OR p.category_id = $2)",
        )
        .bind(search)
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        items.extend(variants);
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    /// Single sellable entry, for turning an "add to cart" request into a
    /// priced, stock-capped cart line.
    pub async fn get_sellable(&self, item: ItemRef) -> Result<SellableItemRow, StoreError> {
        let row = match item {
            ItemRef::Product(id) => sqlx::query_as::<_, SellableItemRow>(
                "SELECT id AS item_id, FALSE AS is_variant, name, sku, selling_price AS price,
                        stock_quantity AS stock, image AS image_url, is_hot
                 FROM products WHERE id = $1 AND is_active AND NOT has_variants",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?,
            ItemRef::Variant(id) => sqlx::query_as::<_, SellableItemRow>(
                "SELECT v.id AS item_id, TRUE AS is_variant,
                        p.name || ' - ' || v.variant_name AS name, v.sku, v.price,
                        v.stock_quantity AS stock, p.image AS image_url, p.is_hot
                 FROM product_variants v
                 JOIN products p ON p.id = v.product_id
                 WHERE v.id = $1 AND v.is_active AND p.is_active",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?,
        };
        row.ok_or_else(|| StoreError::NotFound("Sellable item".to_string()))
    }

    // ---- audited price/stock edits ---------------------------------------

    pub async fn update_product_price(
        &self,
        id: Uuid,
        new_price: Decimal,
        actor_id: Option<Uuid>,
    ) -> Result<ProductEvent, StoreError> {
        let mut txn = self.pool.begin().await?;
        let old: Decimal =
            sqlx::query_scalar("SELECT selling_price FROM products WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *txn)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Product {id}")))?;
        sqlx::query("UPDATE products SET selling_price = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(new_price)
            .execute(&mut *txn)
            .await?;
        self.insert_audit(
            &mut txn,
            actor_id,
            id,
            None,
            "price_change",
            Some("selling_price"),
            Some(&old.to_string()),
            Some(&new_price.to_string()),
            None,
        )
        .await?;
        txn.commit().await?;
        Ok(ProductEvent::PriceChanged {
            product_id: id,
            variant_id: None,
            old: Money::new(old, &self.currency),
            new: Money::new(new_price, &self.currency),
        })
    }

    pub async fn update_product_stock(
        &self,
        id: Uuid,
        new_stock: i32,
        actor_id: Option<Uuid>,
    ) -> Result<ProductEvent, StoreError> {
        let mut txn = self.pool.begin().await?;
        let old: i32 =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *txn)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Product {id}")))?;
        sqlx::query("UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(new_stock)
            .execute(&mut *txn)
            .await?;
        self.insert_audit(
            &mut txn,
            actor_id,
            id,
            None,
            "stock_update",
            Some("stock_quantity"),
            Some(&old.to_string()),
            Some(&new_stock.to_string()),
            None,
        )
        .await?;
        txn.commit().await?;
        Ok(ProductEvent::StockAdjusted {
            product_id: id,
            variant_id: None,
            old: old.max(0) as u32,
            new: new_stock.max(0) as u32,
        })
    }

    pub async fn update_variant_price(
        &self,
        variant_id: Uuid,
        new_price: Decimal,
        actor_id: Option<Uuid>,
    ) -> Result<ProductEvent, StoreError> {
        let mut txn = self.pool.begin().await?;
        let row: Option<(Uuid, Decimal)> = sqlx::query_as(
            "SELECT product_id, price FROM product_variants WHERE id = $1 FOR UPDATE",
        )
        .bind(variant_id)
        .fetch_optional(&mut *txn)
        .await?;
        let (product_id, old) =
            row.ok_or_else(|| StoreError::NotFound(format!("Variant {variant_id}")))?;
        sqlx::query("UPDATE product_variants SET price = $2, updated_at = NOW() WHERE id = $1")
            .bind(variant_id)
            .bind(new_price)
            .execute(&mut *txn)
            .await?;
        self.insert_audit(
            &mut txn,
            actor_id,
            product_id,
            Some(variant_id),
            "price_change",
            Some("price"),
            Some(&old.to_string()),
            Some(&new_price.to_string()),
            None,
        )
        .await?;
        txn.commit().await?;
        Ok(ProductEvent::PriceChanged {
            product_id,
            variant_id: Some(variant_id),
            old: Money::new(old, &self.currency),
            new: Money::new(new_price, &self.currency),
        })
    }

    pub async fn update_variant_stock(
        &self,
        variant_id: Uuid,
        new_stock: i32,
        actor_id: Option<Uuid>,
    ) -> Result<ProductEvent, StoreError> {
        let mut txn = self.pool.begin().await?;
        let row: Option<(Uuid, i32)> = sqlx::query_as(
            "SELECT product_id, stock_quantity FROM product_variants WHERE id = $1 FOR UPDATE",
        )
        .bind(variant_id)
        .fetch_optional(&mut *txn)
        .await?;
        let (product_id, old) =
            row.ok_or_else(|| StoreError::NotFound(format!("Variant {variant_id}")))?;
        sqlx::query(
            "UPDATE product_variants SET stock_quantity = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(variant_id)
        .bind(new_stock)
        .execute(&mut *txn)
        .await?;
        self.insert_audit(
            &mut txn,
            actor_id,
            product_id,
            Some(variant_id),
            "stock_update",
            Some("stock_quantity"),
            Some(&old.to_string()),
            Some(&new_stock.to_string()),
            None,
        )
        .await?;
        txn.commit().await?;
        Ok(ProductEvent::StockAdjusted {
            product_id,
            variant_id: Some(variant_id),
            old: old.max(0) as u32,
            new: new_stock.max(0) as u32,
        })
    }

    /// Soft-delete; order history keeps referencing the product.
    pub async fn deactivate_product(
        &self,
        id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *txn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Product {id}")));
        }
        self.insert_audit(
            &mut txn,
            actor_id,
            id,
            None,
            "deleted",
            None,
            None,
            None,
            Some("Product deactivated"),
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn list_audit_logs(&self, product_id: Uuid) -> Result<Vec<AuditLogRow>, StoreError> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            "SELECT id, actor_id, product_id, product_variant_id, action, field,
                    old_value, new_value, description, created_at
             FROM product_audit_logs WHERE product_id = $1
             ORDER BY created_at DESC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_audit(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        actor_id: Option<Uuid>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        action: &str,
        field: Option<&str>,
        old_value: Option<&str>,
        new_value: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO product_audit_logs
                 (id, actor_id, product_id, product_variant_id, action, field,
                  old_value, new_value, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::now_v7())
        .bind(actor_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(action)
        .bind(field)
        .bind(old_value)
        .bind(new_value)
        .bind(description)
        .execute(&mut **txn)
        .await?;
        Ok(())
    }

    // ---- orders -----------------------------------------------------------

    pub async fn list_orders(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<OrderRow>, i64), StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, order_number, cashier_id, subtotal, discount, tax_rate, tax_amount,
                    total, cash_received, change_due, status, notes, created_at
             FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(per_page as i64)
        .bind(((page - 1) * per_page) as i64)
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok((rows, total.0))
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetail, StoreError> {
        let order = sqlx::query_as::<_, OrderRow>(
            "SELECT id, order_number, cashier_id, subtotal, discount, tax_rate, tax_amount,
                    total, cash_received, change_due, status, notes, created_at
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Order {id}")))?;
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, item_type, item_id, product_name, unit_price, quantity,
                    discount, subtotal
             FROM order_items WHERE order_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(OrderDetail { order, items })
    }

    /// Marks an order refunded and restores the stock its lines consumed,
    /// in one transaction.
    pub async fn refund_order(&self, id: Uuid) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await?;
        let status: String =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *txn)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Order {id}")))?;
        if status == "refund" {
            return Err(StoreError::Conflict(format!("Order {id} already refunded")));
        }
        sqlx::query("UPDATE orders SET status = 'refund' WHERE id = $1")
            .bind(id)
            .execute(&mut *txn)
            .await?;

        let items: Vec<(String, Uuid, i32)> = sqlx::query_as(
            "SELECT item_type, item_id, quantity FROM order_items WHERE order_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *txn)
        .await?;
        for (item_type, item_id, quantity) in items {
            let sql = if item_type == "variant" {
                "UPDATE product_variants SET stock_quantity = stock_quantity + $1 WHERE id = $2"
            } else {
                "UPDATE products SET stock_quantity = stock_quantity + $1 WHERE id = $2"
            };
            sqlx::query(sql)
                .bind(quantity)
                .bind(item_id)
                .execute(&mut *txn)
                .await?;
        }
        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SaleStore for PgStore {
    async fn commit_sale(
        &self,
        receipt: &Receipt,
        cashier_id: Option<Uuid>,
    ) -> Result<Order, CheckoutError> {
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckoutError::Store(e.to_string()))?;

        let sequence: i64 = sqlx::query_scalar("SELECT nextval('order_numbers')")
            .fetch_one(&mut *txn)
            .await
            .map_err(|e| CheckoutError::Store(e.to_string()))?;
        let order = Order::from_receipt(sequence, receipt, cashier_id);

        sqlx::query(
            "INSERT INTO orders (id, order_number, cashier_id, subtotal, discount, tax_rate,
                                 tax_amount, total, cash_received, change_due, status, notes,
                                 created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id())
        .bind(order.order_number())
        .bind(order.cashier_id())
        .bind(order.subtotal().amount())
        .bind(order.discount().amount())
        .bind(order.tax_rate().as_percent())
        .bind(order.tax_amount().amount())
        .bind(order.total().amount())
        .bind(order.cash_received().amount())
        .bind(order.change_due().amount())
        .bind(order.status().as_str())
        .bind(order.notes())
        .bind(order.created_at())
        .execute(&mut *txn)
        .await
        .map_err(|e| CheckoutError::Store(e.to_string()))?;

        for line in order.lines() {
            let (item_type, item_id) = match line.item {
                ItemRef::Product(id) => ("product", id),
                ItemRef::Variant(id) => ("variant", id),
            };
            sqlx::query(
                "INSERT INTO order_items (id, order_id, item_type, item_id, product_name,
                                          unit_price, quantity, discount, subtotal)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(line.id)
            .bind(order.id())
            .bind(item_type)
            .bind(item_id)
            .bind(&line.product_name)
            .bind(line.unit_price.amount())
            .bind(line.quantity as i32)
            .bind(line.discount.amount())
            .bind(line.subtotal.amount())
            .execute(&mut *txn)
            .await
            .map_err(|e| CheckoutError::Store(e.to_string()))?;

            // Conditional decrement: losing a stock race rolls the whole
            // sale back.
            let sql = match line.item {
                ItemRef::Product(_) => {
                    "UPDATE products SET stock_quantity = stock_quantity - $1
                     WHERE id = $2 AND stock_quantity >= $1"
                }
                ItemRef::Variant(_) => {
                    "UPDATE product_variants SET stock_quantity = stock_quantity - $1
                     WHERE id = $2 AND stock_quantity >= $1"
                }
            };
            let result = sqlx::query(sql)
                .bind(line.quantity as i32)
                .bind(item_id)
                .execute(&mut *txn)
                .await
                .map_err(|e| CheckoutError::Store(e.to_string()))?;

            if result.rows_affected() == 0 {
                let available_sql = match line.item {
                    ItemRef::Product(_) => "SELECT stock_quantity FROM products WHERE id = $1",
                    ItemRef::Variant(_) => {
                        "SELECT stock_quantity FROM product_variants WHERE id = $1"
                    }
                };
                let available: Option<i32> = sqlx::query_scalar(available_sql)
                    .bind(item_id)
                    .fetch_optional(&mut *txn)
                    .await
                    .map_err(|e| CheckoutError::Store(e.to_string()))?;
                // Dropping the transaction rolls back the order row and any
                // decrements already applied.
                return Err(CheckoutError::StockConflict {
                    name: line.product_name.clone(),
                    available: available.unwrap_or(0).max(0) as u32,
                });
            }
        }

        txn.commit()
            .await
            .map_err(|e| CheckoutError::Store(e.to_string()))?;
        Ok(order)
    }
}

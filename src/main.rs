//! OpenPOS - Self-hosted point-of-sale and inventory service

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

use openpos::checkout::{self, CheckoutError};
use openpos::config::Config;
use openpos::domain::aggregates::cart::{Cart, CartError, CartStatus, ItemRef};
use openpos::domain::events::{DomainEvent, OrderEvent, ProductEvent};
use openpos::domain::value_objects::Money;
use openpos::domain::variations::{expand, VariantDraft};
use openpos::store::{NewProduct, PgStore, StoreError};

#[derive(Clone)]
struct AppState {
    store: PgStore,
    carts: Arc<Mutex<HashMap<String, Cart>>>,
    nats: Option<async_nats::Client>,
    config: Config,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url).await.ok(),
        None => None,
    };
    let state = AppState {
        store: PgStore::new(db, config.currency.clone()),
        carts: Arc::new(Mutex::new(HashMap::new())),
        nats,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "openpos"})) }))
        .route("/api/v1/catalog", get(list_catalog))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route("/api/v1/variations", get(list_variations).post(create_variation_type))
        .route("/api/v1/variations/:id", delete(deactivate_variation_type))
        .route("/api/v1/variations/:id/options", post(create_variation_option))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/preview-variants", post(preview_variants))
        .route("/api/v1/products/:id", get(get_product).delete(deactivate_product))
        .route("/api/v1/products/:id/price", patch(update_product_price))
        .route("/api/v1/products/:id/stock", patch(update_product_stock))
        .route("/api/v1/products/:id/audit", get(list_audit_logs))
        .route("/api/v1/variants/:id/price", patch(update_variant_price))
        .route("/api/v1/variants/:id/stock", patch(update_variant_stock))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items", post(add_cart_item).patch(set_cart_quantity).delete(remove_cart_item))
        .route("/api/v1/cart/:session/checkout", post(begin_checkout).delete(cancel_checkout))
        .route("/api/v1/checkout", post(complete_checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/refund", post(refund_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("OpenPOS listening on 0.0.0.0:{}", config.port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?,
        app,
    )
    .await?;
    Ok(())
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::DuplicateSku(_) | StoreError::Conflict(_) => (StatusCode::CONFLICT, e.to_string()),
        StoreError::Selection(_) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        StoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn cart_error(e: CartError) -> ApiError {
    match e {
        CartError::EmptyCart | CartError::InsufficientPayment { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        CartError::Completed => (StatusCode::CONFLICT, e.to_string()),
        CartError::Money(_) => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn checkout_error(e: CheckoutError) -> ApiError {
    match e {
        CheckoutError::Cart(inner) => cart_error(inner),
        CheckoutError::StockConflict { .. } => (StatusCode::CONFLICT, e.to_string()),
        CheckoutError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn validation_error(e: validator::ValidationErrors) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

async fn publish_event(state: &AppState, event: &DomainEvent) {
    let Some(nats) = &state.nats else { return };
    match serde_json::to_vec(event) {
        Ok(payload) => {
            if let Err(e) = nats
                .publish(event.subject().to_string(), bytes::Bytes::from(payload))
                .await
            {
                tracing::warn!("failed to publish {}: {}", event.subject(), e);
            }
        }
        Err(e) => tracing::warn!("failed to serialize event: {}", e),
    }
}

// ---- catalog & taxonomy ---------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogParams {
    search: Option<String>,
    category: Option<Uuid>,
}

async fn list_catalog(
    State(s): State<AppState>,
    Query(p): Query<CatalogParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items = s
        .store
        .sellable_items(p.search.as_deref(), p.category)
        .await
        .map_err(store_error)?;
    Ok(Json(serde_json::json!({ "data": items })))
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let categories = s.store.list_categories().await.map_err(store_error)?;
    Ok(Json(serde_json::json!({ "data": categories })))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    icon: Option<String>,
}

async fn create_category(
    State(s): State<AppState>,
    Json(r): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    r.validate().map_err(validation_error)?;
    let category = s
        .store
        .create_category(&r.name, r.icon.as_deref())
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(category))))
}

async fn list_variations(State(s): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let types = s.store.list_variation_types().await.map_err(store_error)?;
    Ok(Json(serde_json::json!({ "data": types })))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateVariationTypeRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[serde(default)]
    sort_order: i32,
}

async fn create_variation_type(
    State(s): State<AppState>,
    Json(r): Json<CreateVariationTypeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    r.validate().map_err(validation_error)?;
    let t = s
        .store
        .create_variation_type(&r.name, r.sort_order)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(t))))
}

async fn deactivate_variation_type(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    s.store
        .deactivate_variation_type(id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
struct CreateVariationOptionRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(length(min = 1, max = 10))]
    code: String,
    value: Option<String>,
    #[serde(default)]
    sort_order: i32,
}

async fn create_variation_option(
    State(s): State<AppState>,
    Path(type_id): Path<Uuid>,
    Json(r): Json<CreateVariationOptionRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    r.validate().map_err(validation_error)?;
    let option = s
        .store
        .create_variation_option(type_id, &r.name, &r.code, r.value.as_deref(), r.sort_order)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(option))))
}

// ---- products -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectionAxisRequest {
    type_slug: String,
    option_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct PreviewVariantsRequest {
    sku_prefix: String,
    base_price: Decimal,
    selection: Vec<SelectionAxisRequest>,
}

/// Expands the operator's option selection into variant drafts. Stateless:
/// every call recomputes the full cross-product from scratch.
async fn preview_variants(
    State(s): State<AppState>,
    Json(r): Json<PreviewVariantsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let axes: Vec<(String, Vec<Uuid>)> = r
        .selection
        .into_iter()
        .map(|a| (a.type_slug, a.option_ids))
        .collect();
    let selection = s.store.load_selection(&axes).await.map_err(store_error)?;
    let drafts = expand(
        &selection,
        &r.sku_prefix,
        &Money::new(r.base_price, &s.config.currency),
    );
    Ok(Json(serde_json::json!({ "data": drafts })))
}

#[derive(Debug, Deserialize)]
struct VariantDraftRequest {
    option_ids: Vec<Uuid>,
    sku: String,
    name: String,
    price: Decimal,
    stock: u32,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    #[validate(length(max = 20))]
    sku_prefix: Option<String>,
    category_id: Option<Uuid>,
    description: Option<String>,
    #[serde(default)]
    cost_price: Decimal,
    selling_price: Decimal,
    #[serde(default)]
    stock_quantity: i32,
    #[serde(default)]
    is_hot: bool,
    #[serde(default)]
    variants: Vec<VariantDraftRequest>,
}

async fn create_product(
    State(s): State<AppState>,
    Json(r): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    r.validate().map_err(validation_error)?;
    let currency = s.config.currency.clone();
    let variants = r
        .variants
        .into_iter()
        .map(|v| VariantDraft {
            option_ids: v.option_ids,
            sku: v.sku,
            name: v.name,
            price: Money::new(v.price, &currency),
            stock: v.stock,
        })
        .collect();
    let id = s
        .store
        .create_product(NewProduct {
            name: r.name,
            sku_prefix: r.sku_prefix,
            category_id: r.category_id,
            description: r.description,
            cost_price: r.cost_price,
            selling_price: r.selling_price,
            stock_quantity: r.stock_quantity,
            is_hot: r.is_hot,
            variants,
        })
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    per_page: Option<u32>,
}

async fn list_products(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let (products, total) = s
        .store
        .list_products(page, per_page)
        .await
        .map_err(store_error)?;
    Ok(Json(serde_json::json!({ "data": products, "total": total, "page": page })))
}

async fn get_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (product, variants) = s.store.get_product(id).await.map_err(store_error)?;
    Ok(Json(serde_json::json!({ "product": product, "variants": variants })))
}

async fn deactivate_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    s.store
        .deactivate_product(id, None)
        .await
        .map_err(store_error)?;
    publish_event(&s, &DomainEvent::Product(ProductEvent::Deactivated { product_id: id })).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PriceUpdateRequest {
    price: Decimal,
    actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct StockUpdateRequest {
    stock: i32,
    actor_id: Option<Uuid>,
}

async fn update_product_price(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<PriceUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let event = s
        .store
        .update_product_price(id, r.price, r.actor_id)
        .await
        .map_err(store_error)?;
    publish_event(&s, &DomainEvent::Product(event)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_product_stock(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<StockUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let event = s
        .store
        .update_product_stock(id, r.stock, r.actor_id)
        .await
        .map_err(store_error)?;
    publish_event(&s, &DomainEvent::Product(event)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_variant_price(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<PriceUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let event = s
        .store
        .update_variant_price(id, r.price, r.actor_id)
        .await
        .map_err(store_error)?;
    publish_event(&s, &DomainEvent::Product(event)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_variant_stock(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<StockUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let event = s
        .store
        .update_variant_stock(id, r.stock, r.actor_id)
        .await
        .map_err(store_error)?;
    publish_event(&s, &DomainEvent::Product(event)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_audit_logs(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let logs = s.store.list_audit_logs(id).await.map_err(store_error)?;
    Ok(Json(serde_json::json!({ "data": logs })))
}

// ---- cart -----------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CartView {
    id: Uuid,
    status: CartStatus,
    lines: Vec<serde_json::Value>,
    subtotal: Decimal,
    tax_amount: Decimal,
    total: Decimal,
}

fn cart_view(cart: &Cart) -> CartView {
    CartView {
        id: cart.id(),
        status: cart.status(),
        lines: cart
            .lines()
            .iter()
            .map(|l| {
                serde_json::json!({
                    "item": l.item,
                    "name": l.name,
                    "unit_price": l.unit_price.amount(),
                    "quantity": l.quantity,
                    "max_quantity": l.max_quantity,
                    "subtotal": l.line_subtotal().amount(),
                })
            })
            .collect(),
        subtotal: cart.subtotal().amount(),
        tax_amount: cart.tax().amount(),
        total: cart.total().amount(),
    }
}

async fn get_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let mut carts = s.carts.lock().await;
    let cart = carts
        .entry(session)
        .or_insert_with(|| Cart::new(&s.config.currency, s.config.tax_rate));
    Ok(Json(cart_view(cart)))
}

#[derive(Debug, Deserialize)]
struct CartItemRequest {
    item: ItemRef,
}

async fn add_cart_item(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<CartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    let sellable = s.store.get_sellable(r.item).await.map_err(store_error)?;
    let mut carts = s.carts.lock().await;
    let cart = carts
        .entry(session)
        .or_insert_with(|| Cart::new(&s.config.currency, s.config.tax_rate));
    cart.add_line(
        r.item,
        sellable.name,
        Money::new(sellable.price, &s.config.currency),
        sellable.stock.max(0) as u32,
    )
    .map_err(cart_error)?;
    Ok(Json(cart_view(cart)))
}

#[derive(Debug, Deserialize)]
struct CartQuantityRequest {
    item: ItemRef,
    quantity: u32,
}

async fn set_cart_quantity(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<CartQuantityRequest>,
) -> Result<Json<CartView>, ApiError> {
    let mut carts = s.carts.lock().await;
    let cart = carts
        .get_mut(&session)
        .ok_or((StatusCode::NOT_FOUND, "Cart not found".to_string()))?;
    cart.set_quantity(r.item, r.quantity).map_err(cart_error)?;
    Ok(Json(cart_view(cart)))
}

async fn remove_cart_item(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<CartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    let mut carts = s.carts.lock().await;
    let cart = carts
        .get_mut(&session)
        .ok_or((StatusCode::NOT_FOUND, "Cart not found".to_string()))?;
    cart.remove_line(r.item).map_err(cart_error)?;
    Ok(Json(cart_view(cart)))
}

async fn clear_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut carts = s.carts.lock().await;
    carts.remove(&session);
    Ok(StatusCode::NO_CONTENT)
}

async fn begin_checkout(
    State(s): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let mut carts = s.carts.lock().await;
    let cart = carts
        .get_mut(&session)
        .ok_or((StatusCode::NOT_FOUND, "Cart not found".to_string()))?;
    cart.begin_checkout().map_err(cart_error)?;
    Ok(Json(cart_view(cart)))
}

async fn cancel_checkout(
    State(s): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let mut carts = s.carts.lock().await;
    let cart = carts
        .get_mut(&session)
        .ok_or((StatusCode::NOT_FOUND, "Cart not found".to_string()))?;
    cart.cancel_checkout().map_err(cart_error)?;
    Ok(Json(cart_view(cart)))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    session: String,
    cash_received: Decimal,
    notes: Option<String>,
    cashier_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    order_id: Uuid,
    order_number: String,
    total: Decimal,
    cash_received: Decimal,
    change_due: Decimal,
}

/// Completes the sale: snapshot, atomic persistence, fresh cart. On a stock
/// conflict the cart keeps its lines so the operator can adjust and retry.
async fn complete_checkout(
    State(s): State<AppState>,
    Json(r): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let mut carts = s.carts.lock().await;
    let cart = carts
        .get_mut(&r.session)
        .ok_or((StatusCode::NOT_FOUND, "Cart not found".to_string()))?;
    let cash = Money::new(r.cash_received, &s.config.currency);
    let mut order = checkout::process(cart, &cash, r.notes, r.cashier_id, &s.store)
        .await
        .map_err(checkout_error)?;
    // Completed carts are terminal; the session starts over empty.
    carts.remove(&r.session);
    drop(carts);

    for event in order.take_events() {
        publish_event(&s, &event).await;
    }
    tracing::info!("order {} completed", order.order_number());
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            total: order.total().amount(),
            cash_received: order.cash_received().amount(),
            change_due: order.change_due().amount(),
        }),
    ))
}

// ---- orders ---------------------------------------------------------------

async fn list_orders(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let (orders, total) = s
        .store
        .list_orders(page, per_page)
        .await
        .map_err(store_error)?;
    Ok(Json(serde_json::json!({ "data": orders, "total": total, "page": page })))
}

async fn get_order(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let detail = s.store.get_order(id).await.map_err(store_error)?;
    Ok(Json(serde_json::json!(detail)))
}

async fn refund_order(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    s.store.refund_order(id).await.map_err(store_error)?;
    let detail = s.store.get_order(id).await.map_err(store_error)?;
    publish_event(
        &s,
        &DomainEvent::Order(OrderEvent::Refunded {
            order_id: id,
            order_number: detail.order.order_number,
        }),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

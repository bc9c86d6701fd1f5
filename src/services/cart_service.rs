use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddCartItemRequest, CartItemView, CartView, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthConsumer,
    models::{Cart, Product},
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(FromRow)]
struct CartItemRow {
    item_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    name: String,
    description: Option<String>,
    price: Decimal,
    stock: i32,
    category_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub async fn get_cart(state: &AppState, consumer: &AuthConsumer) -> AppResult<ApiResponse<CartView>> {
    let cart = get_or_create_cart(state, consumer.consumer_id).await?;
    let view = load_cart_view(state, &cart).await?;
    Ok(ApiResponse::success("Cart", view, Some(Meta::empty())))
}

pub async fn add_item(
    state: &AppState,
    consumer: &AuthConsumer,
    payload: AddCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".into(),
        ));
    }

    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE id = $1 AND is_active = TRUE")
            .bind(payload.product_id)
            .fetch_optional(&state.pool)
            .await?;
    let product = product.ok_or(AppError::NotFound("product"))?;

    let cart = get_or_create_cart(state, consumer.consumer_id).await?;

    // Same product twice means merging quantities; the merged amount has to
    // fit the current stock.
    let existing: Option<(i32,)> =
        sqlx::query_as("SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id)
            .bind(payload.product_id)
            .fetch_optional(&state.pool)
            .await?;

    let merged = existing.map(|(q,)| q).unwrap_or(0) + payload.quantity;
    if merged > product.stock {
        return Err(AppError::InsufficientStock {
            product_id: product.id,
        });
    }

    sqlx::query(
        r#"
        INSERT INTO cart_items (id, cart_id, product_id, quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = $4
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(cart.id)
    .bind(payload.product_id)
    .bind(merged)
    .execute(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.consumer_id),
        "cart_add_item",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": merged })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = load_cart_view(state, &cart).await?;
    Ok(ApiResponse::success("Item added", view, Some(Meta::empty())))
}

pub async fn update_item(
    state: &AppState,
    consumer: &AuthConsumer,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".into(),
        ));
    }

    let cart = get_or_create_cart(state, consumer.consumer_id).await?;

    let row: Option<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT ci.product_id, p.stock
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.id = $1 AND ci.cart_id = $2
        "#,
    )
    .bind(item_id)
    .bind(cart.id)
    .fetch_optional(&state.pool)
    .await?;
    let (product_id, stock) = row.ok_or(AppError::NotFound("cart item"))?;

    if payload.quantity > stock {
        return Err(AppError::InsufficientStock { product_id });
    }

    sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(cart.id)
        .bind(payload.quantity)
        .execute(&state.pool)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.consumer_id),
        "cart_update_item",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = load_cart_view(state, &cart).await?;
    Ok(ApiResponse::success(
        "Item updated",
        view,
        Some(Meta::empty()),
    ))
}

pub async fn remove_item(
    state: &AppState,
    consumer: &AuthConsumer,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let cart = get_or_create_cart(state, consumer.consumer_id).await?;

    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(cart.id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("cart item"));
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.consumer_id),
        "cart_remove_item",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = load_cart_view(state, &cart).await?;
    Ok(ApiResponse::success(
        "Item removed",
        view,
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    consumer: &AuthConsumer,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = get_or_create_cart(state, consumer.consumer_id).await?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart.id)
        .execute(&state.pool)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.consumer_id),
        "cart_clear",
        Some("cart_items"),
        Some(serde_json::json!({ "cart_id": cart.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Carts are created lazily on first access, one per consumer.
pub async fn get_or_create_cart(state: &AppState, consumer_id: Uuid) -> AppResult<Cart> {
    sqlx::query("INSERT INTO carts (id, consumer_id) VALUES ($1, $2) ON CONFLICT (consumer_id) DO NOTHING")
        .bind(Uuid::new_v4())
        .bind(consumer_id)
        .execute(&state.pool)
        .await?;

    let cart: Cart = sqlx::query_as("SELECT * FROM carts WHERE consumer_id = $1")
        .bind(consumer_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(cart)
}

async fn load_cart_view(state: &AppState, cart: &Cart) -> AppResult<CartView> {
    let rows: Vec<CartItemRow> = sqlx::query_as(
        r#"
        SELECT ci.id AS item_id, ci.quantity,
               p.id AS product_id, p.name, p.description, p.price, p.stock,
               p.category_id, p.is_active, p.created_at, p.updated_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at
        "#,
    )
    .bind(cart.id)
    .fetch_all(&state.pool)
    .await?;

    let mut total_amount = Decimal::ZERO;
    let items = rows
        .into_iter()
        .map(|row| {
            let subtotal = row.price * Decimal::from(row.quantity);
            total_amount += subtotal;
            CartItemView {
                id: row.item_id,
                product: Product {
                    id: row.product_id,
                    name: row.name,
                    description: row.description,
                    price: row.price,
                    stock: row.stock,
                    category_id: row.category_id,
                    is_active: row.is_active,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
                quantity: row.quantity,
                subtotal,
            }
        })
        .collect();

    Ok(CartView {
        id: cart.id,
        items,
        total_amount,
    })
}

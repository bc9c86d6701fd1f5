use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthSeller,
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM products WHERE is_active = TRUE");
    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT count(*) FROM products WHERE is_active = TRUE");
    for qb in [&mut builder, &mut count_builder] {
        if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(min_price) = query.min_price {
            qb.push(" AND price >= ").push_bind(min_price);
        }
        if let Some(max_price) = query.max_price {
            qb.push(" AND price <= ").push_bind(max_price);
        }
        if let Some(category_id) = query.category_id {
            qb.push(" AND category_id = ").push_bind(category_id);
        }
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    builder
        .push(" ORDER BY ")
        .push(sort_by.as_sql())
        .push(" ")
        .push(sort_order.as_sql());
    builder
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let items: Vec<Product> = builder.build_query_as().fetch_all(&state.pool).await?;
    let total: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::paged(page, limit, total.0);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE id = $1 AND is_active = TRUE")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;

    let product = product.ok_or(AppError::NotFound("product"))?;
    Ok(ApiResponse::success("Product", product, None))
}

pub async fn create_product(
    state: &AppState,
    seller: &AuthSeller,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    validate_price_and_stock(payload.price, payload.stock)?;
    ensure_category_exists(state, payload.category_id).await?;

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products (id, name, description, price, stock, category_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name)
    .bind(payload.description)
    .bind(payload.price)
    .bind(payload.stock)
    .bind(payload.category_id)
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(seller.seller_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    seller: &AuthSeller,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = existing.ok_or(AppError::NotFound("product"))?;

    // Field-by-field patch; anything not listed here cannot change. An
    // omitted description is kept, an explicit null clears it.
    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.unwrap_or(existing.description);
    let price = payload.price.unwrap_or(existing.price);
    let stock = payload.stock.unwrap_or(existing.stock);
    let category_id = payload.category_id.unwrap_or(existing.category_id);

    validate_price_and_stock(price, stock)?;
    if category_id != existing.category_id {
        ensure_category_exists(state, category_id).await?;
    }

    let product: Product = sqlx::query_as(
        r#"
        UPDATE products
        SET name = $2, description = $3, price = $4, stock = $5, category_id = $6,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(stock)
    .bind(category_id)
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(seller.seller_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Updated", product, Some(Meta::empty())))
}

/// Soft delete: the row stays so order snapshots keep a valid reference.
pub async fn delete_product(
    state: &AppState,
    seller: &AuthSeller,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result =
        sqlx::query("UPDATE products SET is_active = FALSE, updated_at = now() WHERE id = $1 AND is_active = TRUE")
            .bind(id)
            .execute(&state.pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("product"));
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(seller.seller_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate_price_and_stock(price: Decimal, stock: i32) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

async fn ensure_category_exists(state: &AppState, category_id: Uuid) -> Result<(), AppError> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("category"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_price_and_stock() {
        assert!(validate_price_and_stock(Decimal::new(-1, 2), 1).is_err());
        assert!(validate_price_and_stock(Decimal::new(100, 2), -1).is_err());
        assert!(validate_price_and_stock(Decimal::ZERO, 0).is_ok());
    }
}

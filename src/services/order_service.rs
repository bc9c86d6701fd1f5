use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthConsumer, AuthSeller},
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// One cart line joined with its product row, as read under lock at the
/// start of checkout.
#[derive(Debug, FromRow)]
struct CheckoutLine {
    product_id: Uuid,
    quantity: i32,
    product_name: String,
    unit_price: Decimal,
    stock: i32,
    is_active: bool,
}

/// A validated, priced line ready to be written as an order-item snapshot.
#[derive(Debug, PartialEq)]
struct PricedLine {
    product_id: Uuid,
    product_name: String,
    unit_price: Decimal,
    quantity: i32,
    subtotal: Decimal,
}

/// Validates every line against current stock and computes the order total.
/// The total is always the sum of the line subtotals.
fn price_lines(lines: &[CheckoutLine]) -> Result<(Decimal, Vec<PricedLine>), AppError> {
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let mut total = Decimal::ZERO;
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if !line.is_active {
            return Err(AppError::NotFound("product"));
        }
        if line.quantity > line.stock {
            return Err(AppError::InsufficientStock {
                product_id: line.product_id,
            });
        }
        let subtotal = line.unit_price * Decimal::from(line.quantity);
        total += subtotal;
        priced.push(PricedLine {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            subtotal,
        });
    }

    Ok((total, priced))
}

/// Converts the consumer's cart into a finalized order.
///
/// All-or-nothing: stock validation, stock decrement, order and snapshot
/// insertion and cart clearing run in one transaction, with the product rows
/// locked for its duration. A failing line rolls back every earlier one, so
/// stock is never left partially consumed.
pub async fn checkout(
    state: &AppState,
    consumer: &AuthConsumer,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let shipping_address = payload.shipping_address.trim().to_string();
    if shipping_address.is_empty() {
        return Err(AppError::BadRequest("shipping_address is required".into()));
    }

    let mut txn = state.pool.begin().await?;

    let cart: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM carts WHERE consumer_id = $1")
        .bind(consumer.consumer_id)
        .fetch_optional(&mut *txn)
        .await?;
    let Some((cart_id,)) = cart else {
        return Err(AppError::EmptyCart);
    };

    let lines: Vec<CheckoutLine> = sqlx::query_as(
        r#"
        SELECT ci.product_id, ci.quantity,
               p.name AS product_name, p.price AS unit_price, p.stock, p.is_active
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at
        FOR UPDATE OF p
        "#,
    )
    .bind(cart_id)
    .fetch_all(&mut *txn)
    .await?;

    let (total_amount, priced) = price_lines(&lines)?;

    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders (id, consumer_id, total_amount, status, shipping_address)
        VALUES ($1, $2, $3, 'pending_payment', $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(consumer.consumer_id)
    .bind(total_amount)
    .bind(&shipping_address)
    .fetch_one(&mut *txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(priced.len());
    for line in &priced {
        let item: OrderItem = sqlx::query_as(
            r#"
            INSERT INTO order_items (id, order_id, product_id, product_name, unit_price, quantity, subtotal)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(line.subtotal)
        .fetch_one(&mut *txn)
        .await?;
        items.push(item);

        // The rows are locked and validated; the CHECK constraint on stock
        // is only a backstop here.
        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1")
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *txn)
            .await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.consumer_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    consumer: &AuthConsumer,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let status = parse_status_filter(query.status.as_deref())?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM orders WHERE consumer_id = ");
    builder.push_bind(consumer.consumer_id);
    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT count(*) FROM orders WHERE consumer_id = ");
    count_builder.push_bind(consumer.consumer_id);
    for qb in [&mut builder, &mut count_builder] {
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status);
        }
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    builder
        .push(" ORDER BY created_at ")
        .push(sort_order.as_sql());
    builder
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let items: Vec<Order> = builder.build_query_as().fetch_all(&state.pool).await?;
    let total: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::paged(page, limit, total.0);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    consumer: &AuthConsumer,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND consumer_id = $2")
            .bind(id)
            .bind(consumer.consumer_id)
            .fetch_optional(&state.pool)
            .await?;
    let order = order.ok_or(AppError::NotFound("order"))?;

    let items = load_order_items(state, order.id).await?;

    Ok(ApiResponse::success(
        "Order",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    _seller: &AuthSeller,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let status = parse_status_filter(query.status.as_deref())?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM orders WHERE TRUE");
    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT count(*) FROM orders WHERE TRUE");
    for qb in [&mut builder, &mut count_builder] {
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status);
        }
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    builder
        .push(" ORDER BY created_at ")
        .push(sort_order.as_sql());
    builder
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let items: Vec<Order> = builder.build_query_as().fetch_all(&state.pool).await?;
    let total: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::paged(page, limit, total.0);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

/// Status transitions are triggered externally (payment callbacks, shipping
/// updates); here they are just recorded.
pub async fn update_order_status(
    state: &AppState,
    seller: &AuthSeller,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;

    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_optional(&state.pool)
    .await?;
    let order = order.ok_or(AppError::NotFound("order"))?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(seller.seller_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status.as_str() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order,
        Some(Meta::empty()),
    ))
}

async fn load_order_items(state: &AppState, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
        .bind(order_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(items)
}

fn parse_status_filter(status: Option<&str>) -> Result<Option<OrderStatus>, AppError> {
    match status {
        None | Some("") => Ok(None),
        Some(raw) => OrderStatus::parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("Invalid order status".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: &str, stock: i32, quantity: i32) -> CheckoutLine {
        CheckoutLine {
            product_id: Uuid::new_v4(),
            quantity,
            product_name: "Widget".into(),
            unit_price: price.parse().unwrap(),
            stock,
            is_active: true,
        }
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(matches!(price_lines(&[]), Err(AppError::EmptyCart)));
    }

    #[test]
    fn total_equals_sum_of_subtotals() {
        let lines = vec![line("10.00", 5, 3), line("2.50", 10, 4)];
        let (total, priced) = price_lines(&lines).unwrap();

        let sum: Decimal = priced.iter().map(|p| p.subtotal).sum();
        assert_eq!(total, sum);
        assert_eq!(total, "40.00".parse::<Decimal>().unwrap());
        assert_eq!(priced[0].subtotal, "30.00".parse::<Decimal>().unwrap());
        assert_eq!(priced[1].subtotal, "10.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn quantity_above_stock_fails_the_whole_cart() {
        let ok = line("10.00", 5, 3);
        let short = line("4.00", 1, 2);
        let short_id = short.product_id;

        let err = price_lines(&[ok, short]).unwrap_err();
        match err {
            AppError::InsufficientStock { product_id } => assert_eq!(product_id, short_id),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn quantity_equal_to_stock_is_allowed() {
        let lines = vec![line("1.00", 2, 2)];
        let (total, _) = price_lines(&lines).unwrap();
        assert_eq!(total, "2.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn inactive_product_reads_as_missing() {
        let mut gone = line("10.00", 5, 1);
        gone.is_active = false;
        assert!(matches!(
            price_lines(&[gone]),
            Err(AppError::NotFound("product"))
        ));
    }

    #[test]
    fn non_positive_quantity_is_invalid() {
        assert!(matches!(
            price_lines(&[line("10.00", 5, 0)]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn status_filter_accepts_known_values_only() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("")).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("paid")).unwrap(),
            Some(OrderStatus::Paid)
        );
        assert!(parse_status_filter(Some("bogus")).is_err());
    }
}

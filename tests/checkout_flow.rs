use rust_decimal::Decimal;
use uuid::Uuid;

use axum_shop_api::{
    config::AppConfig,
    db::create_pool,
    dto::{
        auth::{LoginRequest, RegisterRequest},
        cart::AddCartItemRequest,
        categories::CreateCategoryRequest,
        orders::{CheckoutRequest, UpdateOrderStatusRequest},
        products::{CreateProductRequest, UpdateProductRequest},
    },
    error::AppError,
    middleware::auth::{AuthConsumer, AuthSeller},
    models::OrderStatus,
    routes::params::{OrderListQuery, Pagination},
    services::{auth_service, cart_service, category_service, order_service, product_service},
    state::AppState,
};

// Integration flow: register both principals, build a catalog, fill a cart,
// check out, and verify the checkout invariants against the database.
#[tokio::test]
async fn checkout_flow_end_to_end() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let Some(state) = setup_state().await? else {
        eprintln!(
            "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
        );
        return Ok(());
    };

    // Duplicate registration is rejected case-insensitively.
    let consumer_resp = auth_service::register_consumer(
        &state,
        RegisterRequest {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?;
    let consumer_id = consumer_resp.data.unwrap().id;

    let dup = auth_service::register_consumer(
        &state,
        RegisterRequest {
            name: "Ana Again".into(),
            email: "ANA@Example.com".into(),
            password: "other".into(),
        },
    )
    .await;
    assert!(matches!(dup, Err(AppError::Conflict(_))));

    let login = auth_service::login_consumer(
        &state,
        LoginRequest {
            email: "Ana@example.COM".into(),
            password: "secret123".into(),
        },
    )
    .await?;
    assert!(!login.data.unwrap().token.is_empty());

    let bad_login = auth_service::login_consumer(
        &state,
        LoginRequest {
            email: "ana@example.com".into(),
            password: "wrong".into(),
        },
    )
    .await;
    assert!(matches!(bad_login, Err(AppError::Unauthorized)));

    let seller_resp = auth_service::register_seller(
        &state,
        RegisterRequest {
            name: "Shop".into(),
            email: "shop@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?;
    let seller = AuthSeller {
        seller_id: seller_resp.data.unwrap().id,
    };
    let consumer = AuthConsumer { consumer_id };

    // Catalog: one category, one product with price 10.00 and stock 5.
    let category = category_service::create_category(
        &state,
        &seller,
        CreateCategoryRequest {
            name: "Widgets".into(),
            description: None,
        },
    )
    .await?
    .data
    .unwrap();

    let product = product_service::create_product(
        &state,
        &seller,
        CreateProductRequest {
            name: "Widget".into(),
            description: Some("A widget".into()),
            price: "10.00".parse().unwrap(),
            stock: 5,
            category_id: category.id,
        },
    )
    .await?
    .data
    .unwrap();

    // Checkout on an empty cart never creates an order.
    let empty = order_service::checkout(
        &state,
        &consumer,
        CheckoutRequest {
            shipping_address: "1 Main St".into(),
        },
    )
    .await;
    assert!(matches!(empty, Err(AppError::EmptyCart)));
    assert_eq!(count_orders(&state).await?, 0);

    // Fill the cart and check out.
    let cart = cart_service::add_item(
        &state,
        &consumer,
        AddCartItemRequest {
            product_id: product.id,
            quantity: 3,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cart.total_amount, "30.00".parse::<Decimal>().unwrap());

    let checkout = order_service::checkout(
        &state,
        &consumer,
        CheckoutRequest {
            shipping_address: "1 Main St".into(),
        },
    )
    .await?
    .data
    .unwrap();

    assert_eq!(
        checkout.order.total_amount,
        "30.00".parse::<Decimal>().unwrap()
    );
    assert_eq!(checkout.order.status, OrderStatus::PendingPayment);
    assert_eq!(checkout.items.len(), 1);
    assert_eq!(checkout.items[0].quantity, 3);
    assert_eq!(
        checkout.items[0].subtotal,
        "30.00".parse::<Decimal>().unwrap()
    );

    let item_sum: Decimal = checkout.items.iter().map(|i| i.subtotal).sum();
    assert_eq!(item_sum, checkout.order.total_amount);

    assert_eq!(product_stock(&state, product.id).await?, 2);

    // The cart was cleared by the checkout.
    let cart = cart_service::get_cart(&state, &consumer).await?.data.unwrap();
    assert!(cart.items.is_empty());

    // Snapshots survive later catalog edits.
    product_service::update_product(
        &state,
        &seller,
        product.id,
        UpdateProductRequest {
            name: Some("Renamed Widget".into()),
            description: None,
            price: Some("99.00".parse().unwrap()),
            stock: None,
            category_id: None,
        },
    )
    .await?;
    let order = order_service::get_order(&state, &consumer, checkout.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(order.items[0].product_name, "Widget");
    assert_eq!(order.items[0].unit_price, "10.00".parse::<Decimal>().unwrap());

    // Over-stock checkout fails and leaves stock untouched.
    cart_service::add_item(
        &state,
        &consumer,
        AddCartItemRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    product_service::update_product(
        &state,
        &seller,
        product.id,
        UpdateProductRequest {
            name: None,
            description: None,
            price: None,
            stock: Some(1),
            category_id: None,
        },
    )
    .await?;

    let short = order_service::checkout(
        &state,
        &consumer,
        CheckoutRequest {
            shipping_address: "1 Main St".into(),
        },
    )
    .await;
    assert!(matches!(short, Err(AppError::InsufficientStock { .. })));
    assert_eq!(product_stock(&state, product.id).await?, 1);
    assert_eq!(count_orders(&state).await?, 1);

    // Seller updates the order status; unknown values are rejected.
    let updated = order_service::update_order_status(
        &state,
        &seller,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "paid".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.status, OrderStatus::Paid);

    let invalid = order_service::update_order_status(
        &state,
        &seller,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "teleported".into(),
        },
    )
    .await;
    assert!(matches!(invalid, Err(AppError::BadRequest(_))));

    // The consumer sees exactly one order in the history.
    let history = order_service::list_orders(
        &state,
        &consumer,
        OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            status: None,
            sort_order: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(history.items.len(), 1);

    Ok(())
}

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => return Ok(None),
        };

    let pool = create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs.
    sqlx::query(
        "TRUNCATE TABLE order_items, orders, cart_items, carts, audit_logs, products, categories, consumers, sellers RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        token_ttl_hours: 1,
    };

    Ok(Some(AppState { pool, config }))
}

async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let (stock,): (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    Ok(stock)
}

async fn count_orders(state: &AppState) -> anyhow::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM orders")
        .fetch_one(&state.pool)
        .await?;
    Ok(count)
}

use rust_decimal::Decimal;
use uuid::Uuid;

use axum_shop_api::{
    config::AppConfig,
    db::create_pool,
    dto::{
        auth::RegisterRequest,
        cart::{AddCartItemRequest, UpdateCartItemRequest},
        categories::CreateCategoryRequest,
        products::CreateProductRequest,
    },
    error::AppError,
    middleware::auth::{AuthConsumer, AuthSeller},
    services::{auth_service, cart_service, category_service, product_service},
    state::AppState,
};

#[tokio::test]
async fn cart_mutations_revalidate_stock() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        eprintln!(
            "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
        );
        return Ok(());
    };

    let consumer_id = auth_service::register_consumer(
        &state,
        RegisterRequest {
            name: "Bea".into(),
            email: "bea@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?
    .data
    .unwrap()
    .id;
    let consumer = AuthConsumer { consumer_id };

    let seller_id = auth_service::register_seller(
        &state,
        RegisterRequest {
            name: "Shop".into(),
            email: "shop@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?
    .data
    .unwrap()
    .id;
    let seller = AuthSeller { seller_id };

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
            description: None,
            price: "4.50".parse().unwrap(),
            stock: 4,
            category_id: category.id,
        },
    )
    .await?
    .data
    .unwrap();

    // The cart is created lazily and starts empty.
    let cart = cart_service::get_cart(&state, &consumer).await?.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_amount, Decimal::ZERO);

    // Adding the same product twice merges the quantities.
    cart_service::add_item(
        &state,
        &consumer,
        AddCartItemRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await?;
    let cart = cart_service::add_item(
        &state,
        &consumer,
        AddCartItemRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);
    assert_eq!(cart.total_amount, "13.50".parse::<Decimal>().unwrap());

    // Merging past the available stock is refused.
    let over = cart_service::add_item(
        &state,
        &consumer,
        AddCartItemRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await;
    assert!(matches!(over, Err(AppError::InsufficientStock { .. })));

    // Updates re-validate against current stock too.
    let item_id = cart.items[0].id;
    let over = cart_service::update_item(
        &state,
        &consumer,
        item_id,
        UpdateCartItemRequest { quantity: 5 },
    )
    .await;
    assert!(matches!(over, Err(AppError::InsufficientStock { .. })));

    let cart = cart_service::update_item(
        &state,
        &consumer,
        item_id,
        UpdateCartItemRequest { quantity: 4 },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cart.items[0].quantity, 4);

    // Unknown products and items surface as 404s.
    let missing = cart_service::add_item(
        &state,
        &consumer,
        AddCartItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        },
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound("product"))));

    let missing = cart_service::remove_item(&state, &consumer, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(AppError::NotFound("cart item"))));

    let cart = cart_service::remove_item(&state, &consumer, item_id)
        .await?
        .data
        .unwrap();
    assert!(cart.items.is_empty());

    // Clearing an already-empty cart is fine.
    cart_service::clear_cart(&state, &consumer).await?;

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

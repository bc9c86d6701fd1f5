use rust_decimal::Decimal;
use uuid::Uuid;

use axum_shop_api::{config::AppConfig, db::create_pool, services::auth_service::hash_password};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let consumer_id = ensure_account(&pool, "consumers", "Demo Consumer", "consumer@example.com", "consumer123").await?;
    let seller_id = ensure_account(&pool, "sellers", "Demo Seller", "seller@example.com", "seller123").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Consumer ID: {consumer_id}, Seller ID: {seller_id}");
    Ok(())
}

async fn ensure_account(
    pool: &sqlx::PgPool,
    table: &str,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let sql = format!(
        r#"
        INSERT INTO {table} (id, name, email, password_hash)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        "#
    );
    sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .await?;

    let select = format!("SELECT id FROM {table} WHERE email = $1");
    let (id,): (Uuid,) = sqlx::query_as(&select).bind(email).fetch_one(pool).await?;

    println!("Ensured {table} account {email}");
    Ok(id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = [
        ("Apparel", "Clothing and accessories"),
        ("Drinkware", "Mugs and bottles"),
        ("Books", "Printed and digital books"),
    ];

    for (name, description) in categories {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }

    let products = [
        ("Rustacean Hoodie", "Warm hoodie for Rustaceans", "55.00", 50, "Apparel"),
        ("Ferris Mug", "Coffee tastes better with Ferris", "12.00", 100, "Drinkware"),
        ("Sticker Pack", "Decorate your laptop", "5.00", 200, "Apparel"),
        ("Async Rust E-book", "Learn async Rust patterns", "25.00", 75, "Books"),
    ];

    for (name, description, price, stock, category) in products {
        let category_id: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM categories WHERE name = $1")
            .bind(category)
            .fetch_optional(pool)
            .await?;
        let Some((category_id,)) = category_id else {
            continue;
        };

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock, category_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price.parse::<Decimal>()?)
        .bind(stock)
        .bind(category_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::auth::{LoginRequest, RegisterRequest, SellerLoginResponse},
    dto::orders::{OrderList, UpdateOrderStatusRequest},
    error::AppResult,
    middleware::auth::AuthSeller,
    models::{Order, Seller},
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::{auth_service, order_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/orders", get(list_all_orders))
        .route("/orders/{id}/status", put(update_order_status))
}

#[utoipa::path(
    post,
    path = "/seller/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register seller", body = ApiResponse<Seller>),
        (status = 409, description = "Email already registered"),
    ),
    tag = "Seller"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Seller>>)> {
    let resp = auth_service::register_seller(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/seller/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login seller", body = ApiResponse<SellerLoginResponse>),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "Seller"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<SellerLoginResponse>>> {
    let resp = auth_service::login_seller(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/seller/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc"),
    ),
    responses(
        (status = 200, description = "List all orders (seller only)", body = ApiResponse<OrderList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    seller: AuthSeller,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_all_orders(&state, &seller, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/seller/orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Update order status", body = ApiResponse<Order>),
        (status = 400, description = "Invalid status"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    seller: AuthSeller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::update_order_status(&state, &seller, id, payload).await?;
    Ok(Json(resp))
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Consumer, Seller};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Explicit patch: omitted fields keep their current values.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsumerLoginResponse {
    pub token: String,
    pub consumer: Consumer,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SellerLoginResponse {
    pub token: String,
    pub seller: Seller,
}

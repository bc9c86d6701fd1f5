use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "19.90")]
    pub price: Decimal,
    pub stock: i32,
    pub category_id: Uuid,
}

// Keeps an absent field distinct from an explicit null: absent stays None,
// null becomes Some(None).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Explicit patch: only the listed fields may change, applied one by one.
/// Omitted fields keep their current values; `description` may be cleared
/// by sending an explicit null.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_description_tells_null_apart_from_absent() {
        let absent: UpdateProductRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.description, None);

        let cleared: UpdateProductRequest =
            serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let replaced: UpdateProductRequest =
            serde_json::from_str(r#"{"description": "restocked"}"#).unwrap();
        assert_eq!(replaced.description, Some(Some("restocked".to_string())));
    }
}

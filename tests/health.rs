use axum_shop_api::routes::health::health_check;

#[tokio::test]
async fn health_check_reports_status_and_version() {
    let response = health_check().await;
    assert_eq!(response.0.message, "Service is up");

    let data = response.0.data.expect("health data");
    assert_eq!(data.status, "ok");
    assert_eq!(data.version, env!("CARGO_PKG_VERSION"));
}

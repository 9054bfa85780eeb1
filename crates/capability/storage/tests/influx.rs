use chrono::{TimeZone, Utc};
use domain::{FieldSet, MeasurementPoint};
use pmon_storage::{InfluxConfig, PointStore, StorageError, connect_influx};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_point() -> MeasurementPoint {
    let mut fields = FieldSet::new();
    fields.insert("current".to_string(), 5.0);
    fields.insert("voltage".to_string(), 230.0);
    MeasurementPoint::new(
        "press1",
        "phase_a",
        fields,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
    .expect("point")
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/orgs"))
        .and(query_param("org", "DataImage"))
        .and(header("authorization", "Token secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"orgs":[{"name":"DataImage"}]}"#))
        .mount(server)
        .await;
}

fn config(server: &MockServer, token: &str) -> InfluxConfig {
    InfluxConfig::new(server.uri(), token, "DataImage", "power_monitoring")
}

#[tokio::test]
async fn connect_and_write_point() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("org", "DataImage"))
        .and(query_param("bucket", "power_monitoring"))
        .and(query_param("precision", "ns"))
        .and(header("authorization", "Token secret"))
        .and(body_string(
            "equipment_power_usage,machine=press1,phase=phase_a current=5,voltage=230 1704067200000000000",
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = connect_influx(config(&server, "secret")).await.expect("connect");
    store.write_point(&sample_point()).await.expect("write");
}

#[tokio::test]
async fn rejected_token_fails_connect() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    let err = connect_influx(config(&server, "wrong")).await.expect_err("auth");
    // 未匹配的请求由 wiremock 返回 404
    assert!(matches!(err, StorageError::Status { status: 404, .. }));
}

#[tokio::test]
async fn unauthorized_org_lookup_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/orgs"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"code":"unauthorized"}"#))
        .mount(&server)
        .await;

    let err = connect_influx(config(&server, "secret")).await.expect_err("auth");
    match err {
        StorageError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("unauthorized"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_sink_fails_connect() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = connect_influx(InfluxConfig::new(uri, "secret", "DataImage", "power_monitoring"))
        .await
        .expect_err("unreachable");
    assert!(matches!(err, StorageError::Http(_)));
}

#[tokio::test]
async fn invalid_url_is_a_config_error() {
    let err = connect_influx(InfluxConfig::new("not a url", "secret", "org", "bucket"))
        .await
        .expect_err("url");
    assert!(matches!(err, StorageError::Config(_)));
}

#[tokio::test]
async fn write_failure_surfaces_status() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"code":"invalid"}"#))
        .mount(&server)
        .await;

    let store = connect_influx(config(&server, "secret")).await.expect("connect");
    let err = store.write_point(&sample_point()).await.expect_err("write");
    assert!(matches!(err, StorageError::Status { status: 400, .. }));
}

#[tokio::test]
async fn base_path_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/influx/ping"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/influx/api/v2/orgs"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = connect_influx(InfluxConfig::new(
        format!("{}/influx/", server.uri()),
        "secret",
        "DataImage",
        "power_monitoring",
    ))
    .await
    .expect("connect");
    assert_eq!(store.write_url().path(), "/influx/api/v2/write");
}

#[tokio::test]
async fn closed_store_rejects_writes() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    let store = connect_influx(config(&server, "secret")).await.expect("connect");
    store.close().await.expect("close");
    let err = store.write_point(&sample_point()).await.expect_err("closed");
    assert!(matches!(err, StorageError::Closed));
}

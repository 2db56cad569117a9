#![allow(clippy::unwrap_used)]
// Integration tests for object resolution: name and filter lookups with the
// zero/one/many contract, and the resolve-then-act delete composite.

use serde_json::{Value, json};
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use alto_api::{ApiOptions, Error, Session};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Session) {
    let server = MockServer::start().await;
    let session = Session::builder(server.uri())
        .username_password("admin", "test-password")
        .build()
        .unwrap();
    (server, session)
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "sessionid=sess-1; Path=/; HttpOnly")
                .append_header("set-cookie", "csrftoken=csrf-1; Path=/")
                .set_body_json(json!({})),
        )
        .mount(server)
        .await;
}

fn listing(objects: Vec<Value>) -> Value {
    json!({"count": objects.len(), "results": objects})
}

// ── Name lookups ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_object_by_name_resolves_a_unique_match() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/pool"))
        .and(query_param("name", "web-pool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            json!({"uuid": "pool-u1", "name": "web-pool"}),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let pool: Value = session
        .get_object_by_name("pool", "web-pool", &ApiOptions::new())
        .await
        .unwrap();
    assert_eq!(pool["uuid"], "pool-u1");
}

#[tokio::test]
async fn test_get_object_by_name_zero_matches() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/pool"))
        .and(query_param("name", "ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![])))
        .mount(&server)
        .await;

    let err = session
        .get_object_by_name::<Value>("pool", "ghost", &ApiOptions::new())
        .await
        .unwrap_err();

    match err {
        Error::NotFound {
            ref kind,
            ref selector,
        } => {
            assert_eq!(kind, "pool");
            assert!(selector.contains("ghost"), "got: {selector}");
        }
        other => panic!("expected NotFound, got: {other:?}"),
    }
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_get_object_by_name_multiple_matches() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/pool"))
        .and(query_param("name", "web-pool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            json!({"uuid": "pool-u1", "name": "web-pool"}),
            json!({"uuid": "pool-u2", "name": "web-pool"}),
        ])))
        .mount(&server)
        .await;

    let err = session
        .get_object_by_name::<Value>("pool", "web-pool", &ApiOptions::new())
        .await
        .unwrap_err();

    match err {
        Error::Ambiguous { matches, .. } => assert_eq!(matches, 2),
        other => panic!("expected Ambiguous, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_name_lookup_carries_scoping_options() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/vsvip"))
        .and(query_param("name", "vip-1"))
        .and(query_param("cloud", "aws-east"))
        .and(header("X-Api-Tenant", "marketing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            json!({"uuid": "vsvip-u1", "name": "vip-1"}),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let opts = ApiOptions::new().with_tenant("marketing").with_cloud("aws-east");
    let vip: Value = session
        .get_object_by_name("vsvip", "vip-1", &opts)
        .await
        .unwrap();
    assert_eq!(vip["uuid"], "vsvip-u1");
}

// ── Filter lookups ──────────────────────────────────────────────────

#[tokio::test]
async fn test_get_object_with_filter_params() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/serviceenginegroup"))
        .and(query_param("cloud_ref.name", "aws-east"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            json!({"uuid": "seg-u1", "name": "Default-Group"}),
        ])))
        .mount(&server)
        .await;

    let group: Value = session
        .get_object(
            "serviceenginegroup",
            &ApiOptions::new().with_param("cloud_ref.name", "aws-east"),
        )
        .await
        .unwrap();
    assert_eq!(group["uuid"], "seg-u1");
}

#[tokio::test]
async fn test_get_object_without_any_filter_is_rejected() {
    let (server, session) = setup().await;

    let result = session
        .get_object::<Value>("serviceenginegroup", &ApiOptions::new())
        .await;

    assert!(matches!(result, Err(Error::Validation { .. })));
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "an unfiltered lookup must fail before any network call"
    );
}

// ── Resolve-then-act ────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_object_by_name_resolves_then_deletes() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/pool"))
        .and(query_param("name", "web-pool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            json!({"uuid": "pool-u1", "name": "web-pool"}),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/pool/pool-u1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    assert_ok!(
        session
            .delete_object_by_name("pool", "web-pool", &ApiOptions::new())
            .await
    );
}

#[tokio::test]
async fn test_delete_object_by_name_surfaces_resolution_error_unchanged() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/pool"))
        .and(query_param("name", "ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![])))
        .mount(&server)
        .await;
    // The act phase must never run after a failed resolution.
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let err = session
        .delete_object_by_name("pool", "ghost", &ApiOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_delete_object_by_name_requires_a_uuid_field() {
    let (server, session) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/pool"))
        .and(query_param("name", "web-pool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            json!({"name": "web-pool"}),
        ])))
        .mount(&server)
        .await;

    let err = session
        .delete_object_by_name("pool", "web-pool", &ApiOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }), "got: {err:?}");
}

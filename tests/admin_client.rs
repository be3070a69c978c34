//! Admin API client tests against a mock RadosGW.

use rgw_reconciler::controlplane::backends::RgwAdminClient;
use rgw_reconciler::{AdminApi, KeyRequest, KeyType, RemoteError, RgwConfig, UserCap, UserRequest};
use serde_json::json;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RgwAdminClient {
    let config = RgwConfig {
        endpoint: server.uri(),
        access_key: "admin".into(),
        secret_key: "admin-secret".into(),
        ..Default::default()
    };
    RgwAdminClient::new(&config).unwrap()
}

fn alice_body() -> serde_json::Value {
    json!({
        "user_id": "alice",
        "display_name": "Alice",
        "email": "",
        "suspended": 0,
        "max_buckets": 1000,
        "keys": [
            {"user": "alice", "access_key": "AK1", "secret_key": "SK1"}
        ],
        "caps": [{"type": "users", "perm": "read"}],
        "op_mask": "read, write, delete"
    })
}

#[tokio::test]
async fn test_create_user_is_signed_and_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/user"))
        .and(query_param("uid", "alice"))
        .and(query_param("display-name", "Alice"))
        .and(query_param("generate-key", "true"))
        .and(query_param("user-caps", "users=read"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .and(header_exists("x-amz-content-sha256"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alice_body()))
        .expect(1)
        .mount(&server)
        .await;

    let request = UserRequest {
        uid: "alice".into(),
        display_name: "Alice".into(),
        op_mask: "read, write, delete".into(),
        caps: vec![UserCap {
            cap_type: "users".into(),
            perm: "read".into(),
        }],
        key_type: Some(KeyType::S3),
        generate_key: true,
        ..Default::default()
    };
    let user = client(&server).create_user(&request).await.unwrap();

    assert_eq!(user.user_id, "alice");
    assert_eq!(user.max_buckets, Some(1000));
    assert_eq!(user.keys.len(), 1);
    assert_eq!(user.keys[0].access_key, "AK1");
    assert_eq!(user.caps[0].perm, "read");
}

#[tokio::test]
async fn test_authorization_header_uses_sigv4() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alice_body()))
        .mount(&server)
        .await;

    client(&server).get_user("alice").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let authorization = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=admin/"));
    assert!(authorization.contains("/us-east-1/s3/aws4_request"));
    assert!(authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
}

#[tokio::test]
async fn test_missing_user_maps_to_no_such_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/user"))
        .and(query_param("uid", "ghost"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"Code": "NoSuchUser", "Message": "no user"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).get_user("ghost").await.unwrap_err();

    assert!(matches!(err, RemoteError::NoSuchUser { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_forbidden_maps_to_access_denied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/user"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"Code": "AccessDenied"})))
        .mount(&server)
        .await;

    let err = client(&server).get_user("alice").await.unwrap_err();
    assert!(matches!(err, RemoteError::AccessDenied { .. }));
}

#[tokio::test]
async fn test_unparseable_error_body_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/user"))
        .respond_with(ResponseTemplate::new(500).set_body_string("gateway exploded"))
        .mount(&server)
        .await;

    let request = UserRequest {
        uid: "alice".into(),
        display_name: "Alice".into(),
        ..Default::default()
    };
    let err = client(&server).modify_user(&request).await.unwrap_err();

    match err {
        RemoteError::Api { status, message, .. } => {
            assert_eq!(status, 500);
            assert_eq!(message, "gateway exploded");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_create_key_returns_all_keys() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/user"))
        .and(query_param("key", ""))
        .and(query_param("uid", "alice"))
        .and(query_param("access-key", "AK1"))
        .and(query_param("key-type", "s3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user": "alice", "access_key": "AK0", "secret_key": "SK0"},
            {"user": "alice", "access_key": "AK1", "secret_key": "SK1"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let request = KeyRequest {
        uid: "alice".into(),
        key_type: KeyType::S3,
        access_key: "AK1".into(),
        generate_key: true,
    };
    let keys = client(&server).create_key(&request).await.unwrap();

    assert_eq!(keys.len(), 2);
    assert_eq!(keys[1].secret_key, "SK1");
}

#[tokio::test]
async fn test_remove_user_purges_data() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/admin/user"))
        .and(query_param("uid", "acme$alice"))
        .and(query_param("purge-data", "1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).remove_user("acme$alice", true).await.unwrap();
}

#[tokio::test]
async fn test_remove_key_targets_access_key() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/admin/user"))
        .and(query_param("key", ""))
        .and(query_param("access-key", "AK2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).remove_key("alice", "AK2").await.unwrap();
}

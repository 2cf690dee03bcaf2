//! Key Vault secret store tests against a local HTTP server

mod common;

use common::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use azvm::secrets::{KeyVaultSecretStore, SecretError, SecretStore, SensitiveString};

fn store() -> KeyVaultSecretStore {
    KeyVaultSecretStore::new(reqwest::Client::new(), StaticCredential::new())
}

fn vault_uri(server: &MockServer) -> String {
    format!("{}/", server.uri())
}

#[tokio::test]
async fn test_set_secret_request_shape() {
    let server = MockServer::start().await;
    let secret_id = format!(
        "{}/secrets/vm-passwords/4387e9f3d6e14c459867679a90fd0f79",
        server.uri()
    );

    Mock::given(method("PUT"))
        .and(path("/secrets/vm-passwords"))
        .and(query_param("api-version", "7.4"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({ "value": "Zq8!k2#Lm0_pX4vR" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "Zq8!k2#Lm0_pX4vR",
            "id": secret_id,
            "attributes": {
                "enabled": true,
                "created": 1_700_000_000,
                "updated": 1_700_000_000,
                "recoveryLevel": "Recoverable+Purgeable"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let metadata = store()
        .set_secret(
            &vault_uri(&server),
            "vm-passwords",
            &SensitiveString::new("Zq8!k2#Lm0_pX4vR"),
        )
        .await
        .unwrap();

    assert_eq!(metadata.name, "vm-passwords");
    assert_eq!(
        metadata.version.as_deref(),
        Some("4387e9f3d6e14c459867679a90fd0f79")
    );
    assert_eq!(metadata.id, secret_id);
    assert_eq!(metadata.enabled, Some(true));
    assert_eq!(metadata.created.map(|t| t.timestamp()), Some(1_700_000_000));

    // Metadata never carries the value back out.
    let rendered = serde_json::to_string(&metadata).unwrap();
    assert!(!rendered.contains("Zq8!k2#Lm0_pX4vR"));
}

#[tokio::test]
async fn test_vault_uri_without_trailing_slash() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/secrets/admin-password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": format!("{}/secrets/admin-password/v2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let metadata = store()
        .set_secret(
            &server.uri(),
            "admin-password",
            &SensitiveString::new("secret"),
        )
        .await
        .unwrap();

    assert_eq!(metadata.version.as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_forbidden_is_authorization_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": "Forbidden",
                "message": "The user does not have secrets set permission on key vault 'keyvaultname3221'."
            }
        })))
        .mount(&server)
        .await;

    let err = store()
        .set_secret(
            &vault_uri(&server),
            "vm-passwords",
            &SensitiveString::new("Zq8!k2#Lm0_pX4vR"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SecretError::Authorization(_)));
    assert!(err.is_auth_error());
    assert!(err.to_string().contains("secrets set permission"));
    assert!(!err.to_string().contains("Zq8!k2#Lm0_pX4vR"));
}

#[tokio::test]
async fn test_throttling_reports_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = store()
        .set_secret(
            &vault_uri(&server),
            "vm-passwords",
            &SensitiveString::new("secret"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SecretError::RateLimited(_)));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("retry after 7s"));
}

#[tokio::test]
async fn test_server_error_keeps_status() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = store()
        .set_secret(
            &vault_uri(&server),
            "vm-passwords",
            &SensitiveString::new("secret"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(503));
}

// relay-server/src/api/webhook.rs
use actix_web::{http::StatusCode, post, web, HttpResponse, ResponseError};
use common::{RelayMessage, WebhookResponse};
use serde_json::Value;

use crate::dispatch::{dispatch, DispatchError, Outbound};
use crate::registry::ConnectionRegistry;

/// Keys that may carry the target client id, in priority order
const CLIENT_ID_KEYS: [&str; 3] = ["clientId", "userId", "id"];

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid JSON payload: {0}")]
    MalformedBody(#[source] serde_json::Error),
    #[error("no client id in webhook payload")]
    MissingClientId,
    #[error("client {client_id} not reachable: {source}")]
    NotConnected {
        client_id: String,
        #[source]
        source: DispatchError,
    },
    #[error("failed to process webhook: {0}")]
    Internal(String),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MalformedBody(_) | WebhookError::MissingClientId => StatusCode::BAD_REQUEST,
            WebhookError::NotConnected { .. } => StatusCode::NOT_FOUND,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            WebhookError::MalformedBody(_) => "Invalid JSON payload".to_string(),
            WebhookError::MissingClientId => "Client ID is required in webhook payload".to_string(),
            WebhookError::NotConnected { client_id, .. } => {
                format!("Client {} not found or not connected", client_id)
            },
            WebhookError::Internal(_) => "Failed to process webhook".to_string(),
        };

        HttpResponse::build(self.status_code()).json(WebhookResponse::failed(message))
    }
}

impl From<DispatchError> for WebhookError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound(ref client_id) | DispatchError::NotOpen(ref client_id) => {
                WebhookError::NotConnected { client_id: client_id.clone(), source: err }
            },
            DispatchError::Write { ref client_id, .. } => {
                WebhookError::NotConnected { client_id: client_id.clone(), source: err }
            },
            DispatchError::Encode(e) => WebhookError::Internal(e.to_string()),
        }
    }
}

/// Pick the client id out of a third-party payload; first usable key wins
pub fn extract_client_id(payload: &Value) -> Option<String> {
    CLIENT_ID_KEYS.iter().find_map(|key| match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        // Bools, arrays and objects never name a client; try the next key
        _ => None,
    })
}

/// Forward an inbound webhook to the browser tab that owns its client id
#[post("/webhook")]
pub async fn receive_webhook(
    body: web::Bytes,
    registry: web::Data<ConnectionRegistry>,
) -> Result<HttpResponse, WebhookError> {
    let result = relay_webhook(&body, &registry);

    match &result {
        Ok(_) => {},
        Err(e) if e.status_code().is_server_error() => {
            tracing::error!("Error processing webhook: {}", e);
        },
        Err(e) => tracing::warn!("Webhook rejected: {}", e),
    }

    result
}

fn relay_webhook(body: &[u8], registry: &ConnectionRegistry) -> Result<HttpResponse, WebhookError> {
    let payload: Value = serde_json::from_slice(body).map_err(WebhookError::MalformedBody)?;
    tracing::info!("Webhook received: {}", payload);

    let client_id = extract_client_id(&payload).ok_or(WebhookError::MissingClientId)?;

    let envelope = RelayMessage::webhook(payload);
    let outbound = Outbound::try_from(&envelope).map_err(|e| WebhookError::Internal(e.to_string()))?;
    dispatch(registry, &client_id, outbound)?;

    tracing::info!("Message sent successfully to client {}", client_id);
    Ok(HttpResponse::Ok().json(WebhookResponse::delivered(&client_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSocket;
    use crate::registry::ClientConnection;
    use actix_web::{http::header::ContentType, test, App};
    use serde_json::json;

    #[::core::prelude::v1::test]
    fn test_extract_client_id_priority() {
        assert_eq!(extract_client_id(&json!({ "id": "c", "userId": "b", "clientId": "a" })), Some("a".into()));
        assert_eq!(extract_client_id(&json!({ "id": "c", "userId": "b" })), Some("b".into()));
        assert_eq!(extract_client_id(&json!({ "id": "c" })), Some("c".into()));
        assert_eq!(extract_client_id(&json!({ "clientId": "", "id": "c" })), Some("c".into()));
        assert_eq!(extract_client_id(&json!({ "clientId": null, "userId": 0, "id": 42 })), Some("42".into()));
        assert_eq!(extract_client_id(&json!({ "clientId": true, "userId": ["x"] })), None);
        assert_eq!(extract_client_id(&json!({ "clientId": true, "id": "client_3" })), Some("client_3".into()));
        assert_eq!(extract_client_id(&json!({})), None);
        assert_eq!(extract_client_id(&json!(["clientId"])), None);
    }

    fn registry_with(id: &str, socket: MockSocket) -> ConnectionRegistry {
        let registry = ConnectionRegistry::new();
        registry.register(ClientConnection::new(id.to_string(), socket));
        registry
    }

    macro_rules! app {
        ($registry:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($registry.clone()))
                    .configure(crate::api::configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_webhook_delivers_envelope() {
        let socket = MockSocket::open();
        let registry = registry_with("client_7", socket.clone());
        let app = app!(registry);

        let req = test::TestRequest::post()
            .uri("/api/webhook")
            .set_json(json!({ "clientId": "client_7", "x": 1 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({
            "success": true,
            "message": "Message sent to client client_7",
            "clientId": "client_7"
        }));

        let sent = socket.sent();
        assert_eq!(sent.len(), 1);
        let delivered: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(delivered["type"], "webhook");
        assert_eq!(delivered["data"], json!({ "clientId": "client_7", "x": 1 }));
        assert!(delivered["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn test_webhook_without_client_id_is_rejected() {
        let socket = MockSocket::open();
        let registry = registry_with("client_1", socket.clone());
        let app = app!(registry);

        let req = test::TestRequest::post()
            .uri("/api/webhook")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "success": false, "error": "Client ID is required in webhook payload" }));
        assert!(socket.sent().is_empty());
        assert_eq!(registry.ids(), vec!["client_1".to_string()]);
    }

    #[actix_web::test]
    async fn test_webhook_with_invalid_json_is_rejected() {
        let socket = MockSocket::open();
        let registry = registry_with("client_1", socket.clone());
        let app = app!(registry);

        let req = test::TestRequest::post()
            .uri("/api/webhook")
            .insert_header(ContentType::json())
            .set_payload("{\"clientId\": \"client_1\"")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(socket.sent().is_empty());
    }

    #[actix_web::test]
    async fn test_webhook_for_unknown_client() {
        let registry = ConnectionRegistry::new();
        let app = app!(registry);

        let req = test::TestRequest::post()
            .uri("/api/webhook")
            .set_json(json!({ "clientId": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "success": false, "error": "Client ghost not found or not connected" }));
    }

    #[actix_web::test]
    async fn test_webhook_for_closed_client_evicts() {
        let registry = registry_with("client_2", MockSocket::closed());
        let app = app!(registry);

        let req = test::TestRequest::post()
            .uri("/api/webhook")
            .set_json(json!({ "userId": "client_2", "event": "paid" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(registry.find("client_2").is_none());
    }

    #[::core::prelude::v1::test]
    fn test_encode_failure_maps_to_internal_error() {
        let err = serde_json::from_str::<Value>("{").unwrap_err();
        let webhook_err = WebhookError::from(DispatchError::Encode(err));
        assert_eq!(webhook_err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

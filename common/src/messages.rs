// common/src/messages.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::utils::iso_timestamp;

pub const CONNECTION_MESSAGE_TYPE: &str = "connection";
pub const WEBHOOK_MESSAGE_TYPE: &str = "webhook";

/// Frame pushed from the relay to a connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `Some(Value::Null)` for an explicit `"data": null`, `None` when absent
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Fields this crate does not model, kept as received
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayMessage {
    /// Greeting sent on open so the peer learns its own id
    pub fn connection(client_id: &str) -> Self {
        Self {
            kind: CONNECTION_MESSAGE_TYPE.to_string(),
            message: Some("Connected to WebSocket server".to_string()),
            data: None,
            timestamp: iso_timestamp(),
            client_id: Some(client_id.to_string()),
            extra: Map::new(),
        }
    }

    /// Envelope for a payload received on the webhook endpoint
    pub fn webhook(payload: Value) -> Self {
        Self {
            kind: WEBHOOK_MESSAGE_TYPE.to_string(),
            message: None,
            data: Some(payload),
            timestamp: iso_timestamp(),
            client_id: None,
            extra: Map::new(),
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind == CONNECTION_MESSAGE_TYPE
    }

    /// Typed view of a received frame; fails for frames of any other shape
    pub fn from_frame(frame: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(frame)
    }
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// The `type` of a received frame, if it has a string one
pub fn frame_type(frame: &Value) -> Option<&str> {
    frame.get("type")?.as_str()
}

/// Client id announced by a `connection` greeting
pub fn greeted_client_id(frame: &Value) -> Option<&str> {
    if frame_type(frame) != Some(CONNECTION_MESSAGE_TYPE) {
        return None;
    }
    frame.get("clientId")?.as_str()
}

/// Response body of the webhook endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    pub fn delivered(client_id: &str) -> Self {
        Self {
            success: true,
            message: Some(format!("Message sent to client {}", client_id)),
            client_id: Some(client_id.to_string()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            client_id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_message_wire_shape() {
        let value = serde_json::to_value(RelayMessage::connection("client_3")).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["clientId"], "client_3");
        assert_eq!(value["message"], "Connected to WebSocket server");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let msg: RelayMessage = serde_json::from_value(json!({
            "type": "invoice",
            "timestamp": "2024-01-01T00:00:00.000Z",
            "amount": 21
        }))
        .unwrap();
        assert_eq!(msg.kind, "invoice");
        assert_eq!(msg.extra.get("amount"), Some(&json!(21)));
        assert_eq!(serde_json::to_value(&msg).unwrap()["amount"], 21);
    }

    #[test]
    fn test_explicit_null_data_survives() {
        let frame = json!({ "type": "x", "data": null, "timestamp": "2024-01-01T00:00:00.000Z" });
        let msg = RelayMessage::from_frame(&frame).unwrap();
        assert_eq!(msg.data, Some(Value::Null));
        assert_eq!(serde_json::to_value(&msg).unwrap(), frame);

        let msg = RelayMessage::from_frame(&json!({ "type": "x" })).unwrap();
        assert_eq!(msg.data, None);
    }

    #[test]
    fn test_frame_helpers() {
        let greeting = serde_json::to_value(RelayMessage::connection("client_9")).unwrap();
        assert_eq!(frame_type(&greeting), Some("connection"));
        assert_eq!(greeted_client_id(&greeting), Some("client_9"));

        assert_eq!(greeted_client_id(&json!({ "type": "webhook", "clientId": "client_9" })), None);
        assert_eq!(greeted_client_id(&json!({ "type": "connection", "clientId": 9 })), None);
        assert_eq!(frame_type(&json!({ "type": 7 })), None);
        assert_eq!(frame_type(&json!([1, 2])), None);
        assert!(RelayMessage::from_frame(&json!({ "status": "paid" })).is_err());
    }

    #[test]
    fn test_webhook_response_bodies() {
        let ok = serde_json::to_value(WebhookResponse::delivered("client_7")).unwrap();
        assert_eq!(ok, json!({
            "success": true,
            "message": "Message sent to client client_7",
            "clientId": "client_7"
        }));

        let err = serde_json::to_value(WebhookResponse::failed("Failed to process webhook")).unwrap();
        assert_eq!(err, json!({ "success": false, "error": "Failed to process webhook" }));
    }
}

//! Actor messages.
//!
//! Every interaction with an actor is a [`Message`]. A function call carries its
//! function name in [`Message::function`] and its parameters in the payload; the
//! matching response carries the same `correlation_id` so a caller can pair the two.
//!
//! Messages serialize to the JSON shape used on the wire by outer layers:
//!
//! ```json
//! {"id": "...", "type": "function_call", "from": "system", "to": "purifier",
//!  "function": "purify_air", "payload": {"air_quality": 150.0},
//!  "timestamp": "2026-01-01T00:00:00Z", "correlation_id": "..."}
//! ```

use crate::error::{Result, RosixError};
use crate::model::Params;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    FunctionCall,
    FunctionResponse,
    StatusQuery,
    StatusResponse,
    Heartbeat,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default)]
    pub payload: Params,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
}

impl Message {
    pub fn new(kind: MessageType, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            from: from.into(),
            to: to.into(),
            function: None,
            payload: Params::new(),
            timestamp: Utc::now(),
            correlation_id: String::new(),
        }
    }

    /// A function call with a fresh correlation id.
    pub fn function_call(
        from: impl Into<String>,
        to: impl Into<String>,
        function: impl Into<String>,
        params: Params,
    ) -> Self {
        let mut msg = Self::new(MessageType::FunctionCall, from, to);
        msg.function = Some(function.into());
        msg.payload = params;
        msg.correlation_id = Uuid::new_v4().to_string();
        msg
    }

    /// The response to `request`, addressed back to its sender.
    ///
    /// Success payload is `{"success": true, "result": {..}}`; failure payload is
    /// `{"success": false, "error": "..", "error_kind": ".."}`.
    pub fn function_response(request: &Message, result: &Result<Params>) -> Self {
        let mut msg = Self::new(MessageType::FunctionResponse, &request.to, &request.from);
        msg.function = request.function_name().map(str::to_string);
        msg.correlation_id = request.correlation_id.clone();
        match result {
            Ok(output) => {
                msg.payload.insert("success".into(), Value::Bool(true));
                msg.payload.insert("result".into(), Value::Object(output.clone()));
            }
            Err(e) => {
                msg.payload.insert("success".into(), Value::Bool(false));
                msg.payload.insert("error".into(), json!(e.to_string()));
                msg.payload.insert("error_kind".into(), json!(e.kind()));
            }
        }
        msg
    }

    pub fn status_query(from: impl Into<String>, to: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::StatusQuery, from, to);
        msg.correlation_id = Uuid::new_v4().to_string();
        msg
    }

    pub fn status_response(request: &Message, status: Params) -> Self {
        let mut msg = Self::new(MessageType::StatusResponse, &request.to, &request.from);
        msg.correlation_id = request.correlation_id.clone();
        msg.payload = status;
        msg
    }

    pub fn heartbeat(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(MessageType::Heartbeat, from, to)
    }

    pub fn error(from: impl Into<String>, to: impl Into<String>, error: &RosixError) -> Self {
        let mut msg = Self::new(MessageType::Error, from, to);
        msg.payload.insert("error".into(), json!(error.to_string()));
        msg.payload.insert("error_kind".into(), json!(error.kind()));
        msg
    }

    /// The function a call names: the `function` field, else `payload["function"]`.
    pub fn function_name(&self) -> Option<&str> {
        self.function
            .as_deref()
            .or_else(|| self.payload.get("function").and_then(Value::as_str))
    }

    /// The parameter map of a call: `payload["params"]` when it is an object, else
    /// the payload itself.
    pub fn call_params(&self) -> &Params {
        match self.payload.get("params") {
            Some(Value::Object(params)) => params,
            _ => &self.payload,
        }
    }

    /// True for a function response that reports success.
    pub fn is_success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_pairs_with_request() {
        let mut params = Params::new();
        params.insert("air_quality".into(), json!(150.0));
        let call = Message::function_call("system", "purifier", "purify_air", params);
        assert!(!call.correlation_id.is_empty());

        let mut out = Params::new();
        out.insert("fan_started".into(), json!(true));
        let response = Message::function_response(&call, &Ok(out));

        assert_eq!(response.kind, MessageType::FunctionResponse);
        assert_eq!(response.correlation_id, call.correlation_id);
        assert_eq!(response.to, "system");
        assert_eq!(response.from, "purifier");
        assert!(response.is_success());
        assert_eq!(response.payload["result"]["fan_started"], true);
    }

    #[test]
    fn test_failure_response_carries_error_kind() {
        let call = Message::function_call("a", "b", "f", Params::new());
        let response =
            Message::function_response(&call, &Err(RosixError::Validation("bad".into())));
        assert!(!response.is_success());
        assert_eq!(response.payload["error_kind"], "validation_error");
    }

    #[test]
    fn test_json_uses_wire_names() {
        let msg = Message::heartbeat("manager", "purifier");
        let data = msg.to_json().unwrap();
        assert!(data.contains(r#""type":"heartbeat""#));
        assert!(!data.contains("correlation_id"));
        assert_eq!(Message::from_json(&data).unwrap(), msg);
    }

    #[test]
    fn test_call_target_falls_back_to_payload() {
        let wire = Message::from_json(
            r#"{"id":"m1","type":"function_call","from":"client","to":"a",
                "timestamp":"2026-01-01T00:00:00Z","correlation_id":"c1",
                "payload":{"function":"ping","params":{"x":1}}}"#,
        )
        .unwrap();
        assert_eq!(wire.function, None);
        assert_eq!(wire.function_name(), Some("ping"));
        assert_eq!(wire.call_params()["x"], 1);

        let mut params = Params::new();
        params.insert("x".into(), json!(2));
        let typed = Message::function_call("a", "b", "pong", params);
        assert_eq!(typed.function_name(), Some("pong"));
        assert_eq!(typed.call_params()["x"], 2);
    }
}

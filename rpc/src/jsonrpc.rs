//! JSON-RPC 2.0 envelopes.

use serde_json::{json, Value};

use crate::error::{RpcError, TransportError};
use crate::transport::HttpReply;

/// A request envelope: `{id, jsonrpc: "2.0", method, params}`.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "jsonrpc": "2.0",
            "method": self.method,
            "params": self.params,
        })
    }
}

/// Turn an HTTP reply into the call's `result`.
///
/// A JSON-RPC `error` wins over the HTTP status: nodes report protocol
/// errors with non-2xx codes too, and those must not be retried.
pub fn parse_reply(reply: HttpReply) -> Result<Value, RpcError> {
    let parsed = serde_json::from_str::<Value>(&reply.body);
    let error = parsed
        .as_ref()
        .ok()
        .and_then(|body| body.get("error"))
        .filter(|error| !error.is_null());
    if let Some(error) = error {
        return Err(classify_error(error));
    }
    if !(200..300).contains(&reply.status) {
        return Err(TransportError::Status {
            status: reply.status,
            body: reply.body,
        }
        .into());
    }
    let reason = match parsed {
        Ok(Value::Object(mut fields)) => match fields.remove("result") {
            Some(result) => return Ok(result),
            None => "response has neither `result` nor `error`".to_string(),
        },
        Ok(_) => "response is not a JSON object".to_string(),
        Err(e) => format!("invalid JSON-RPC response: {e}"),
    };
    Err(RpcError::Decode {
        reason,
        raw: reply.body,
    })
}

/// `error` may be a bare string or `{code, message, data?}`.
fn classify_error(error: &Value) -> RpcError {
    let (code, message) = match error {
        Value::String(message) => (0, message.clone()),
        Value::Object(fields) => (
            fields.get("code").and_then(Value::as_i64).unwrap_or(0),
            fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        other => (0, other.to_string()),
    };
    if message.trim_end().ends_with("not found") {
        RpcError::NotFound(message)
    } else {
        RpcError::Protocol { code, message }
    }
}

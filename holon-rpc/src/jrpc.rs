// Copyright 2026 the Holons developers
//
// This file is part of holon-rpc.
//
// See LICENSE for licensing terms. This file may not be copied,
// modified, or distributed except according to those terms.

//! JSON-RPC 2.0 envelope for the holon-rpc dialect.
//!
//! The dialect is JSON-RPC 2.0 with two conventions layered on top: request
//! ids are strings (`c1, c2, …` from the client, `s…` from the server), and
//! the reserved method `rpc.heartbeat` probes carrier liveness.
//!
//! Outbound envelopes are typed ([`Request`], the reply constructors).
//! Inbound frames are classified leniently ([`Inbound::classify`]): anything
//! with a `method` is a request, anything with `result` or `error` is a
//! response, and the rest is droppable noise — strictness about field values
//! lives in the dispatcher, which knows whether an error reply is owed.

use std::fmt;

use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::RpcError;

/// JSON-RPC error codes used by this client.
pub mod code {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The frame is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// No handler is registered for the method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Default for malformed error responses.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A registered handler failed with a non-RPC error.
    pub const HANDLER_ERROR: i64 = 13;
}

/// The `jsonrpc` version marker. Serializes to/from exactly `"2.0"`.
#[derive(PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct V2_0;

impl fmt::Debug for V2_0 {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("\"2.0\"")
    }
}

impl TryFrom<String> for V2_0 {
    type Error = String;

    fn try_from(other: String) -> Result<Self, Self::Error> {
        match &other[..] {
            "2.0" => Ok(Self),
            other => Err(format!("V2_0: expected \"2.0\", found \"{other}\"")),
        }
    }
}

impl From<V2_0> for String {
    fn from(_: V2_0) -> Self {
        "2.0".to_owned()
    }
}

/// An outbound request (or notification, when `id` is absent).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: V2_0,

    /// Method to invoke on the peer.
    pub method: String,

    /// By-name parameters; the holon-rpc dialect passes objects.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// String request id; `None` makes this a notification.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    /// Create a request with parameters.
    pub fn new(id: Option<String>, method: impl ToString, params: Option<Value>) -> Self {
        Self {
            jsonrpc: V2_0,
            method: method.to_string(),
            params,
            id,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string(self).expect("request serialization cannot fail")
        )
    }
}

/// The error member of a JSON-RPC error response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorObject {
    /// Error code; passed through unchanged.
    pub code: i64,
    /// Short description of the error.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Decode an inbound `error` member, defaulting missing or malformed
    /// fields to `-32603` / `"internal error"`.
    pub fn from_value(value: Option<Value>) -> Self {
        let mut obj = ErrorObject {
            code: code::INTERNAL_ERROR,
            message: "internal error".to_owned(),
            data: None,
        };
        if let Some(Value::Object(mut map)) = value {
            if let Some(c) = map.get("code").and_then(Value::as_i64) {
                obj.code = c;
            }
            if let Some(m) = map.get("message").and_then(Value::as_str) {
                obj.message = m.to_owned();
            }
            obj.data = map.remove("data");
        }
        obj
    }
}

/// Build a `result` reply for request id `id`.
pub fn result_reply(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Build an `error` reply for request id `id`.
pub fn error_reply(id: &Value, code: i64, message: impl ToString, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.to_string() });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

/// An inbound request as the dispatcher wants to see it: classified, but with
/// validation (version, id shape) left to the request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequest {
    /// Whether the frame carried `jsonrpc: "2.0"`.
    pub jsonrpc_ok: bool,
    /// The method name (empty when the field was not a string).
    pub method: String,
    /// Raw params member.
    pub params: Option<Value>,
    /// Raw id member; `None` marks a notification.
    pub id: Option<Value>,
}

/// An inbound response, matched against the pending table by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundResponse {
    /// Raw id member.
    pub id: Option<Value>,
    /// The `result` member, when present.
    pub result: Option<Value>,
    /// The decoded `error` member, when present.
    pub error: Option<ErrorObject>,
}

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// The peer is calling us.
    Request(InboundRequest),
    /// The peer is answering one of our requests.
    Response(InboundResponse),
    /// Neither request nor response; dropped silently by the dispatcher.
    Other(Value),
}

impl Inbound {
    /// Parse and classify one frame of carrier text.
    ///
    /// JSON parse failures and non-object payloads are serialization errors;
    /// everything else classifies.
    pub fn classify(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RpcError::Serialization(e.to_string()))?;
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(RpcError::Serialization(format!(
                    "payload is not a JSON object: {other}"
                )))
            }
        };

        let jsonrpc_ok = matches!(map.get("jsonrpc"), Some(Value::String(v)) if v == "2.0");
        let id = map.remove("id");

        if let Some(method) = map.remove("method") {
            return Ok(Inbound::Request(InboundRequest {
                jsonrpc_ok,
                method: method.as_str().unwrap_or_default().to_owned(),
                params: map.remove("params"),
                id,
            }));
        }

        if map.contains_key("result") || map.contains_key("error") {
            let error = map.remove("error").map(|e| ErrorObject::from_value(Some(e)));
            return Ok(Inbound::Response(InboundResponse {
                id,
                result: map.remove("result"),
                error,
            }));
        }

        let mut rest = Map::new();
        if let Some(id) = id {
            rest.insert("id".to_owned(), id);
        }
        rest.extend(map);
        Ok(Inbound::Other(Value::Object(rest)))
    }
}

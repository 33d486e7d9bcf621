// Copyright 2026 the Holons developers
//
// This file is part of holon-rpc.
//
// See LICENSE for licensing terms. This file may not be copied,
// modified, or distributed except according to those terms.

//! Client-facing error type

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::ParseError;

use crate::jrpc::ErrorObject;

// implement From for something that we stuff into an Arc
macro_rules! into_arc_variant {
    ($e: ty, $t: ty, $v: ident) => {
        impl From<$t> for $e {
            fn from(other: $t) -> Self {
                Self::$v(Arc::new(other))
            }
        }
    };
}

/// Everything an [`RpcClient`](crate::RpcClient) caller can see go wrong.
///
/// Carrier-level failures are handled internally by the disconnect/reconnect
/// machinery; callers only observe them as [`RpcError::NotConnected`] on
/// outstanding and subsequent invokes.
#[derive(Clone, Debug, Error)]
pub enum RpcError {
    /// No live carrier (never connected, lost, or closed)
    #[error("not connected")]
    NotConnected,

    /// A response did not arrive within the configured wait
    #[error("timed out awaiting a response")]
    Timeout,

    /// The connect URL does not parse
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    /// The peer violated the holon-rpc contract
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An inbound frame was not valid JSON-RPC
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The WebSocket carrier failed
    #[error("websocket: {0}")]
    Ws(#[from] Arc<WsError>),

    /// A JSON-RPC error response, passed through verbatim
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code, unchanged from the wire.
        code: i64,
        /// Human-readable message from the peer.
        message: String,
        /// Optional structured detail from the peer.
        data: Option<Value>,
    },
}

into_arc_variant!(RpcError, WsError, Ws);

impl RpcError {
    /// A structured JSON-RPC error.
    pub fn rpc(code: i64, message: impl ToString, data: Option<Value>) -> Self {
        RpcError::Rpc {
            code,
            message: message.to_string(),
            data,
        }
    }
}

impl From<ErrorObject> for RpcError {
    fn from(obj: ErrorObject) -> Self {
        RpcError::Rpc {
            code: obj.code,
            message: obj.message,
            data: obj.data,
        }
    }
}

// Copyright 2026 the Holons developers
//
// This file is part of holon-rpc.
//
// See LICENSE for licensing terms. This file may not be copied,
// modified, or distributed except according to those terms.
#![warn(
    missing_docs,
    nonstandard_style,
    rust_2021_compatibility,
    rust_2018_idioms,
    clippy::unnested_or_patterns,
    clippy::redundant_closure_for_method_calls
)]
#![doc(html_no_source)]

//! holon-rpc: the Holon-RPC client for the Organic Programming fabric
//!
//! JSON-RPC 2.0 over a WebSocket carrier, negotiated with the `holon-rpc`
//! subprotocol. The peer is bidirectional — either side may issue requests —
//! and the client keeps itself alive with a heartbeat and transparent
//! exponential-backoff reconnection.

mod client;
mod error;
pub mod jrpc;

pub use client::{RpcClient, RpcClientConfig, HEARTBEAT_METHOD, SUBPROTOCOL};
pub use error::RpcError;

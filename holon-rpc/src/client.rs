// Copyright 2026 the Holons developers
//
// This file is part of holon-rpc.
//
// See LICENSE for licensing terms. This file may not be copied,
// modified, or distributed except according to those terms.

//! The Holon-RPC client: a bidirectional JSON-RPC 2.0 peer over a WebSocket
//! carrier negotiated with the `holon-rpc` subprotocol.
//!
//! The client is a cloneable handle over one mutex-guarded interior. Three
//! background tasks serve a live carrier: a receive task demultiplexes
//! inbound frames to pending invokes or registered handlers, a heartbeat
//! task proves liveness with `rpc.heartbeat`, and a reconnect task
//! resurrects the carrier with exponential backoff and jitter after a loss.
//! Handlers live in the client, not the carrier, so registrations survive
//! reconnects.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::{mpsc, oneshot};
use futures::future::BoxFuture;
use futures::lock::Mutex;
use futures::stream::SplitStream;
use futures::StreamExt;
use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::RpcError;
use crate::jrpc::{self, code, Inbound, InboundRequest, InboundResponse, Request};

/// The subprotocol token both sides must select during the handshake.
pub const SUBPROTOCOL: &str = "holon-rpc";

/// Liveness probe method; answered with an empty result by either peer.
pub const HEARTBEAT_METHOD: &str = "rpc.heartbeat";

type Carrier = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type PendingSlot = oneshot::Sender<Result<Value, RpcError>>;
type HandlerFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Timing knobs for the heartbeat and the reconnect backoff.
#[derive(Clone, Debug)]
pub struct RpcClientConfig {
    /// Delay between liveness probes.
    pub heartbeat_interval: Duration,
    /// Wall-clock deadline for each probe's response.
    pub heartbeat_timeout: Duration,
    /// First reconnect delay.
    pub reconnect_min_delay: Duration,
    /// Backoff ceiling.
    pub reconnect_max_delay: Duration,
    /// Multiplicative backoff factor.
    pub reconnect_factor: f64,
    /// Additive jitter: `Uniform(0, base * jitter)` on top of each delay.
    pub reconnect_jitter: f64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        RpcClientConfig {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(10),
            reconnect_min_delay: Duration::from_millis(250),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_factor: 2.0,
            reconnect_jitter: 0.1,
        }
    }
}

// Everything a live carrier needs: the outbound channel feeding the writer
// task, the task handles, and the epoch that names this carrier generation.
struct Session {
    sender: mpsc::UnboundedSender<Message>,
    epoch: u64,
    receive: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct Inner {
    url: Option<Url>,
    session: Option<Session>,
    pending: HashMap<String, PendingSlot>,
    handlers: HashMap<String, HandlerFn>,
    next_id: u64,
    epoch: u64,
    closed: bool,
    reconnect: Option<JoinHandle<()>>,
}

/// A bidirectional Holon-RPC peer.
///
/// Cloning shares the session: all clones see the same carrier, pending
/// table, and handlers.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Mutex<Inner>>,
    config: Arc<RpcClientConfig>,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new(RpcClientConfig::default())
    }
}

impl RpcClient {
    /// A disconnected client with the given timing configuration.
    pub fn new(config: RpcClientConfig) -> Self {
        RpcClient {
            inner: Arc::new(Mutex::new(Inner {
                url: None,
                session: None,
                pending: HashMap::new(),
                handlers: HashMap::new(),
                next_id: 0,
                epoch: 0,
                closed: false,
                reconnect: None,
            })),
            config: Arc::new(config),
        }
    }

    /// Install a handler for calls the server makes to this client.
    ///
    /// Last writer wins on conflicting names. Safe to call before
    /// [`connect`](Self::connect); handlers persist across reconnects.
    pub async fn register<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |params| Box::pin(handler(params)));
        self.inner.lock().await.handlers.insert(method.into(), handler);
    }

    /// Open the carrier and start the receive and heartbeat tasks.
    ///
    /// Fails with [`RpcError::InvalidUrl`] when `url` does not parse and
    /// [`RpcError::Protocol`] when the server does not select the
    /// `holon-rpc` subprotocol. Reconnects after a carrier loss dial the
    /// same URL.
    pub async fn connect(&self, url: &str) -> Result<(), RpcError> {
        let url = Url::parse(url)?;
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(RpcError::NotConnected);
            }
            inner.url = Some(url);
            // Replace-connect: drop any previous carrier first.
            if let Some(session) = inner.session.take() {
                session.receive.abort();
                session.heartbeat.abort();
                session.writer.abort();
            }
            fail_pending(&mut inner);
        }
        connect_once(self.inner.clone(), self.config.clone()).await
    }

    /// Call `method` on the peer and await its response.
    ///
    /// No timeout is applied here; wrap the future if you need one. The
    /// heartbeat is the only internally-bounded invoke.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        invoke_with(&self.inner, method, params).await
    }

    /// Shut the client down. Idempotent and terminal: all tasks stop, the
    /// carrier closes with a normal-closure code, every pending invoke
    /// fails with [`RpcError::NotConnected`], and so does every future one.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        if let Some(handle) = inner.reconnect.take() {
            handle.abort();
        }
        if let Some(session) = inner.session.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "client closed".into(),
            };
            let _ = session.sender.unbounded_send(Message::Close(Some(frame)));
            // Closing the channel lets the writer flush the close frame and
            // exit; the other tasks are cancelled outright.
            session.sender.close_channel();
            session.receive.abort();
            session.heartbeat.abort();
        }
        fail_pending(&mut inner);
        tracing::debug!("holon-rpc client closed");
    }
}

async fn invoke_with(
    inner: &Arc<Mutex<Inner>>,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    if method.is_empty() {
        return Err(RpcError::Protocol("method is required".to_owned()));
    }

    let (id, sender, slot) = {
        let mut guard = inner.lock().await;
        if guard.closed {
            return Err(RpcError::NotConnected);
        }
        let sender = match guard.session.as_ref() {
            Some(session) => session.sender.clone(),
            None => return Err(RpcError::NotConnected),
        };
        guard.next_id += 1;
        let id = format!("c{}", guard.next_id);
        let (tx, rx) = oneshot::channel();
        guard.pending.insert(id.clone(), tx);
        (id, sender, rx)
    };

    let request = Request::new(Some(id.clone()), method, Some(params));
    let text = match serde_json::to_string(&request) {
        Ok(text) => text,
        Err(e) => {
            inner.lock().await.pending.remove(&id);
            return Err(RpcError::Serialization(e.to_string()));
        }
    };
    tracing::trace!("-> {text}");
    if sender.unbounded_send(Message::Text(text)).is_err() {
        inner.lock().await.pending.remove(&id);
        return Err(RpcError::NotConnected);
    }

    match slot.await {
        Ok(outcome) => outcome,
        // Slot dropped without completing: the carrier went away.
        Err(_) => Err(RpcError::NotConnected),
    }
}

// Dial the stored URL, negotiate the subprotocol, and start the carrier
// tasks. Used by both connect() and the reconnect task.
async fn connect_once(
    inner: Arc<Mutex<Inner>>,
    config: Arc<RpcClientConfig>,
) -> Result<(), RpcError> {
    let url = {
        let guard = inner.lock().await;
        if guard.closed {
            return Err(RpcError::NotConnected);
        }
        guard.url.clone().ok_or(RpcError::NotConnected)?
    };

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| RpcError::from(Arc::new(e)))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

    let (mut ws, response) = connect_async(request)
        .await
        .map_err(|e| RpcError::from(Arc::new(e)))?;

    // The handshake response is available directly, so subprotocol
    // selection is checked on a completed handshake rather than by polling.
    let negotiated = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        == Some(SUBPROTOCOL);
    if !negotiated {
        let frame = CloseFrame {
            code: CloseCode::Protocol,
            reason: "subprotocol not negotiated".into(),
        };
        if let Err(e) = ws.close(Some(frame)).await {
            tracing::debug!("closing unnegotiated carrier: {e}");
        }
        return Err(RpcError::Protocol(
            "server did not negotiate holon-rpc".to_owned(),
        ));
    }

    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::unbounded::<Message>();
    let writer = tokio::spawn(async move {
        if let Err(e) = rx.map(Ok).forward(sink).await {
            tracing::debug!("carrier writer exiting: {e}");
        }
    });

    let mut guard = inner.lock().await;
    if guard.closed {
        writer.abort();
        return Err(RpcError::NotConnected);
    }
    guard.epoch += 1;
    let epoch = guard.epoch;
    let receive = tokio::spawn(receive_loop(
        stream,
        inner.clone(),
        config.clone(),
        tx.clone(),
        epoch,
    ));
    let heartbeat = tokio::spawn(heartbeat_loop(inner.clone(), config.clone(), epoch));
    guard.session = Some(Session {
        sender: tx,
        epoch,
        receive,
        heartbeat,
        writer,
    });
    tracing::debug!(%url, epoch, "holon-rpc carrier established");
    Ok(())
}

// Dispatcher over one carrier generation. Frames that fail to classify are
// logged and skipped; only carrier read errors (or EOF) tear the session
// down. Requests are handled on spawned tasks: the reader must be back at
// `stream.next()` while a handler body is suspended, or a handler that
// invokes could never see its own response.
async fn receive_loop(
    mut stream: SplitStream<Carrier>,
    inner: Arc<Mutex<Inner>>,
    config: Arc<RpcClientConfig>,
    sender: mpsc::UnboundedSender<Message>,
    epoch: u64,
) {
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::debug!("carrier read error: {e}");
                break;
            }
            None => {
                tracing::debug!("carrier stream ended");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("dropping non-UTF-8 binary frame: {e}");
                    continue;
                }
            },
            Message::Close(frame) => {
                tracing::debug!("carrier closed by peer: {frame:?}");
                break;
            }
            _ => continue,
        };
        tracing::trace!("<- {text}");
        match Inbound::classify(&text) {
            Ok(Inbound::Request(request)) => {
                tokio::spawn(handle_request(inner.clone(), sender.clone(), request));
            }
            Ok(Inbound::Response(response)) => handle_response(&inner, response).await,
            Ok(Inbound::Other(value)) => {
                tracing::trace!("ignoring frame without method or result: {value}")
            }
            Err(e) => tracing::warn!("dropping frame: {e}"),
        }
    }
    disconnect(&inner, &config, epoch).await;
}

// Incoming request path, one spawned task per request. Replies are owed
// only when the request has an id; notifications never produce a response,
// even on error.
async fn handle_request(
    inner: Arc<Mutex<Inner>>,
    sender: mpsc::UnboundedSender<Message>,
    request: InboundRequest,
) {
    let InboundRequest {
        jsonrpc_ok,
        method,
        params,
        id,
    } = request;

    if !jsonrpc_ok {
        if let Some(id) = id {
            send_reply(
                &sender,
                jrpc::error_reply(&id, code::INVALID_REQUEST, "invalid request", None),
            );
        }
        return;
    }

    if method == HEARTBEAT_METHOD {
        if let Some(id) = id {
            send_reply(&sender, jrpc::result_reply(&id, json!({})));
        }
        return;
    }

    // Server-originated request ids begin with `s`.
    if let Some(id) = &id {
        let well_formed = id.as_str().map(|s| s.starts_with('s')).unwrap_or(false);
        if !well_formed {
            send_reply(
                &sender,
                jrpc::error_reply(id, code::INVALID_REQUEST, "invalid request", None),
            );
            return;
        }
    }

    let handler = inner.lock().await.handlers.get(&method).cloned();
    let Some(handler) = handler else {
        if let Some(id) = id {
            send_reply(
                &sender,
                jrpc::error_reply(
                    &id,
                    code::METHOD_NOT_FOUND,
                    format!("method {method} not found"),
                    None,
                ),
            );
        }
        return;
    };

    // The lock is released while the handler runs: handlers may invoke.
    let params = params.unwrap_or_else(|| Value::Object(Map::new()));
    let outcome = handler(params).await;

    let Some(id) = id else { return };
    let reply = match outcome {
        Ok(result) => jrpc::result_reply(&id, result),
        Err(RpcError::Rpc {
            code,
            message,
            data,
        }) => jrpc::error_reply(&id, code, message, data),
        Err(other) => jrpc::error_reply(&id, code::HANDLER_ERROR, other.to_string(), None),
    };
    send_reply(&sender, reply);
}

// Response path: match the (stringified) id against the pending table and
// complete the slot. Unmatched responses are dropped.
async fn handle_response(inner: &Arc<Mutex<Inner>>, response: InboundResponse) {
    let Some(id) = response.id else {
        tracing::trace!("response without id dropped");
        return;
    };
    let key = match id {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let slot = inner.lock().await.pending.remove(&key);
    let Some(slot) = slot else {
        tracing::trace!("no pending invoke for id {key}");
        return;
    };
    let outcome = match response.error {
        Some(error) => Err(RpcError::from(error)),
        None => Ok(match response.result {
            Some(Value::Object(map)) => Value::Object(map),
            _ => json!({}),
        }),
    };
    let _ = slot.send(outcome);
}

fn send_reply(sender: &mpsc::UnboundedSender<Message>, value: Value) {
    let text = value.to_string();
    tracing::trace!("-> {text}");
    if sender.unbounded_send(Message::Text(text)).is_err() {
        tracing::debug!("carrier gone before reply could be sent");
    }
}

// Periodic rpc.heartbeat probe. The probe is an ordinary invoke with an id,
// so it exercises the full request/response path; any failure (including
// the wall-clock deadline) tears the carrier down.
async fn heartbeat_loop(inner: Arc<Mutex<Inner>>, config: Arc<RpcClientConfig>, epoch: u64) {
    loop {
        tokio::time::sleep(config.heartbeat_interval).await;
        {
            let guard = inner.lock().await;
            if guard.closed {
                return;
            }
            if guard.session.as_ref().map(|s| s.epoch) != Some(epoch) {
                return;
            }
        }
        let probe = tokio::time::timeout(
            config.heartbeat_timeout,
            invoke_with(&inner, HEARTBEAT_METHOD, json!({})),
        )
        .await;
        match probe {
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => tracing::debug!("heartbeat failed: {e}"),
            Err(_) => tracing::debug!("heartbeat failed: {}", RpcError::Timeout),
        }
        disconnect(&inner, &config, epoch).await;
        return;
    }
}

// Tear down carrier `epoch`: cancel its tasks, fail every pending slot with
// NotConnected, and start the reconnect task unless the client is closed.
// No-op when a newer carrier has already replaced this one.
fn disconnect<'a>(
    inner: &'a Arc<Mutex<Inner>>,
    config: &'a Arc<RpcClientConfig>,
    epoch: u64,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let mut guard = inner.lock().await;
        if guard.session.as_ref().map(|s| s.epoch) != Some(epoch) {
            return;
        }
        if let Some(session) = guard.session.take() {
            session.receive.abort();
            session.heartbeat.abort();
            session.writer.abort();
        }
        fail_pending(&mut guard);
        if guard.closed {
            return;
        }
        if guard
            .reconnect
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
        {
            return;
        }
        tracing::info!("carrier lost; scheduling reconnect");
        guard.reconnect = Some(tokio::spawn(reconnect_loop(inner.clone(), config.clone())));
    })
}

fn fail_pending(inner: &mut Inner) {
    for (_, slot) in inner.pending.drain() {
        let _ = slot.send(Err(RpcError::NotConnected));
    }
}

// Exponential backoff with additive uniform jitter. `attempt` lives here
// and nowhere else.
async fn reconnect_loop(inner: Arc<Mutex<Inner>>, config: Arc<RpcClientConfig>) {
    let mut attempt: u32 = 0;
    loop {
        if inner.lock().await.closed {
            return;
        }
        match connect_once(inner.clone(), config.clone()).await {
            Ok(()) => {
                tracing::info!("carrier re-established after {attempt} failed attempts");
                return;
            }
            Err(e) => tracing::debug!("reconnect attempt {attempt} failed: {e}"),
        }
        let base = (config.reconnect_min_delay.as_secs_f64()
            * config.reconnect_factor.powi(attempt as i32))
        .min(config.reconnect_max_delay.as_secs_f64());
        let span = base * config.reconnect_jitter;
        let jitter = if span > 0.0 {
            rand::thread_rng().gen_range(0.0..span)
        } else {
            0.0
        };
        tokio::time::sleep(Duration::from_secs_f64(base + jitter)).await;
        attempt += 1;
    }
}

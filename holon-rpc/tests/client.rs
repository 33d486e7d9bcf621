//! End-to-end client tests against an in-process holon-rpc peer.
//!
//! The peer here is dev-only tooling: the SDK dials WebSockets but never
//! serves them, so the acceptor side lives in the test binary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{
    Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use holon_rpc::{RpcClient, RpcClientConfig, RpcError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn quick_config() -> RpcClientConfig {
    RpcClientConfig {
        heartbeat_interval: Duration::from_millis(200),
        heartbeat_timeout: Duration::from_millis(200),
        reconnect_min_delay: Duration::from_millis(100),
        reconnect_max_delay: Duration::from_secs(1),
        ..Default::default()
    }
}

struct Peer {
    url: String,
    heartbeats: Arc<AtomicU64>,
    drop_next: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

async fn spawn_peer(negotiate: bool) -> Peer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let heartbeats = Arc::new(AtomicU64::new(0));
    let drop_next = Arc::new(AtomicBool::new(false));
    let task = tokio::spawn(peer_loop(
        listener,
        negotiate,
        heartbeats.clone(),
        drop_next.clone(),
    ));
    Peer {
        url: format!("ws://{addr}"),
        heartbeats,
        drop_next,
        task,
    }
}

async fn peer_loop(
    listener: TcpListener,
    negotiate: bool,
    heartbeats: Arc<AtomicU64>,
    drop_next: Arc<AtomicBool>,
) {
    let mut server_seq = 0u64;
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let callback = |_req: &HsRequest, mut resp: HsResponse| {
            if negotiate {
                resp.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    HeaderValue::from_static("holon-rpc"),
                );
            }
            Ok(resp)
        };
        let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
            continue;
        };
        serve_conn(&mut ws, &heartbeats, &drop_next, &mut server_seq).await;
    }
}

async fn serve_conn(
    ws: &mut WebSocketStream<TcpStream>,
    heartbeats: &AtomicU64,
    drop_next: &AtomicBool,
    server_seq: &mut u64,
) {
    while let Some(Ok(message)) = ws.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return,
            _ => continue,
        };
        if drop_next.swap(false, Ordering::SeqCst) {
            let _ = ws.close(None).await;
            return;
        }
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let id = frame.get("id").cloned();
        let method = frame
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();
        match method.as_str() {
            "rpc.heartbeat" => {
                heartbeats.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = id {
                    reply(ws, json!({"jsonrpc":"2.0","id":id,"result":{}})).await;
                }
            }
            "echo.v1.Echo/Ping" => {
                let params = frame.get("params").cloned().unwrap_or_else(|| json!({}));
                if let Some(id) = id {
                    reply(ws, json!({"jsonrpc":"2.0","id":id,"result":params})).await;
                }
            }
            "echo.v1.Echo/HeartbeatCount" => {
                let count = heartbeats.load(Ordering::SeqCst);
                if let Some(id) = id {
                    reply(ws, json!({"jsonrpc":"2.0","id":id,"result":{"count":count}})).await;
                }
            }
            "echo.v1.Echo/CallClient" => {
                // Call back into the client and relay whatever it answers.
                *server_seq += 1;
                let call_id = format!("s{server_seq}");
                reply(
                    ws,
                    json!({
                        "jsonrpc": "2.0",
                        "id": call_id,
                        "method": "client.v1.Client/Hello",
                        "params": {}
                    }),
                )
                .await;
                let mut result = json!({});
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else { continue };
                    let Ok(v) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    if v.get("id").and_then(Value::as_str) == Some(call_id.as_str()) {
                        result = v.get("result").cloned().unwrap_or_else(|| json!({}));
                        break;
                    }
                }
                if let Some(id) = id {
                    reply(ws, json!({"jsonrpc":"2.0","id":id,"result":result})).await;
                }
            }
            // Swallows the request; used to leave an invoke in flight.
            "test.v1.Test/Never" => {}
            _ => {
                if let Some(id) = id {
                    reply(
                        ws,
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {
                                "code": -32601,
                                "message": format!("method {method} not found")
                            }
                        }),
                    )
                    .await;
                }
            }
        }
    }
}

async fn reply(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    let _ = ws.send(Message::Text(value.to_string())).await;
}

#[tokio::test]
async fn echo_and_server_call() {
    let peer = spawn_peer(true).await;
    let client = RpcClient::new(RpcClientConfig {
        heartbeat_interval: Duration::from_secs(30),
        ..Default::default()
    });
    client
        .register("client.v1.Client/Hello", |_params| async {
            Ok(json!({"message": "hello go"}))
        })
        .await;
    client.connect(&peer.url).await.unwrap();

    let pong = client
        .invoke("echo.v1.Echo/Ping", json!({"message": "hello"}))
        .await
        .unwrap();
    assert_eq!(pong, json!({"message": "hello"}));

    let relayed = client
        .invoke("echo.v1.Echo/CallClient", json!({}))
        .await
        .unwrap();
    assert_eq!(relayed, json!({"message": "hello go"}));

    client.close().await;
    peer.task.abort();
}

#[tokio::test]
async fn rpc_error_responses_pass_through() {
    let peer = spawn_peer(true).await;
    let client = RpcClient::new(RpcClientConfig {
        heartbeat_interval: Duration::from_secs(30),
        ..Default::default()
    });
    client.connect(&peer.url).await.unwrap();

    let err = client
        .invoke("ghost.v1.Ghost/Nothing", json!({}))
        .await
        .unwrap_err();
    match err {
        RpcError::Rpc { code, message, .. } => {
            assert_eq!(code, -32601);
            assert!(message.contains("ghost.v1.Ghost/Nothing"));
        }
        other => panic!("expected Rpc error, got {other:?}"),
    }

    client.close().await;
    peer.task.abort();
}

#[tokio::test]
async fn reconnects_after_carrier_drop() {
    init_tracing();
    let peer = spawn_peer(true).await;
    let client = RpcClient::new(quick_config());
    client.connect(&peer.url).await.unwrap();

    let first = client
        .invoke("echo.v1.Echo/Ping", json!({"message": "first"}))
        .await
        .unwrap();
    assert_eq!(first, json!({"message": "first"}));

    // Drop the carrier on the next inbound frame (the heartbeat probe).
    peer.drop_next.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(700)).await;

    // Reconnection is transparent: invokes succeed again within 5 s.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut second = None;
    while tokio::time::Instant::now() < deadline {
        match client
            .invoke("echo.v1.Echo/Ping", json!({"message": "second"}))
            .await
        {
            Ok(v) => {
                second = Some(v);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    assert_eq!(second, Some(json!({"message": "second"})));

    // The heartbeat keeps running on the new carrier.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut count = 0;
    while tokio::time::Instant::now() < deadline {
        if let Ok(v) = client.invoke("echo.v1.Echo/HeartbeatCount", json!({})).await {
            count = v["count"].as_u64().unwrap_or(0);
            if count >= 1 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(count >= 1, "expected at least one heartbeat, saw {count}");

    client.close().await;
    peer.task.abort();
}

#[tokio::test]
async fn close_fails_inflight_invokes() {
    let peer = spawn_peer(true).await;
    let client = RpcClient::new(RpcClientConfig {
        heartbeat_interval: Duration::from_secs(30),
        ..Default::default()
    });
    client.connect(&peer.url).await.unwrap();

    let inflight = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke("test.v1.Test/Never", json!({})).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.close().await;
    let outcome = tokio::time::timeout(Duration::from_secs(1), inflight)
        .await
        .expect("close must complete in-flight invokes in bounded time")
        .unwrap();
    assert!(matches!(outcome, Err(RpcError::NotConnected)));

    // close() is terminal.
    assert!(matches!(
        client.invoke("echo.v1.Echo/Ping", json!({})).await,
        Err(RpcError::NotConnected)
    ));
    client.close().await;
    peer.task.abort();
}

#[tokio::test]
async fn refuses_unnegotiated_subprotocol() {
    let peer = spawn_peer(false).await;
    let client = RpcClient::default();
    let err = client.connect(&peer.url).await.unwrap_err();
    assert!(matches!(err, RpcError::Protocol(_)));
    peer.task.abort();
}

#[tokio::test]
async fn invoke_preconditions() {
    let client = RpcClient::default();
    assert!(matches!(
        client.invoke("echo.v1.Echo/Ping", json!({})).await,
        Err(RpcError::NotConnected)
    ));
    assert!(matches!(
        client.connect("not a url").await,
        Err(RpcError::InvalidUrl(_))
    ));

    let peer = spawn_peer(true).await;
    client.connect(&peer.url).await.unwrap();
    assert!(matches!(
        client.invoke("", json!({})).await,
        Err(RpcError::Protocol(_))
    ));
    client.close().await;
    peer.task.abort();
}

async fn accept_negotiated(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let callback = |_req: &HsRequest, mut resp: HsResponse| {
        resp.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static("holon-rpc"),
        );
        Ok(resp)
    };
    tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap()
}

#[tokio::test]
async fn invoke_ids_are_strictly_increasing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_negotiated(&listener).await;
        let mut seen = Vec::new();
        while seen.len() < 2 {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                break;
            };
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("method").and_then(Value::as_str) == Some("rpc.heartbeat") {
                continue;
            }
            let id = v["id"].as_str().unwrap().to_owned();
            reply(&mut ws, json!({"jsonrpc":"2.0","id":id,"result":{}})).await;
            seen.push(id);
        }
        seen
    });

    let client = RpcClient::new(RpcClientConfig {
        heartbeat_interval: Duration::from_secs(30),
        ..Default::default()
    });
    client.connect(&format!("ws://{addr}")).await.unwrap();
    client.invoke("a.v1.A/One", json!({})).await.unwrap();
    client.invoke("a.v1.A/Two", json!({})).await.unwrap();
    client.close().await;

    assert_eq!(server.await.unwrap(), vec!["c1".to_owned(), "c2".to_owned()]);
}

#[tokio::test]
async fn request_path_boundary_behaviour() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = RpcClient::new(RpcClientConfig {
        heartbeat_interval: Duration::from_secs(60),
        ..Default::default()
    });
    client
        .register("known.v1.Known/Hi", |_params| async { Ok(json!({"hi": true})) })
        .await;

    let server = tokio::spawn(async move {
        let mut ws = accept_negotiated(&listener).await;
        let frames = [
            // bad version, with id: owed a -32600
            json!({"jsonrpc":"1.0","id":"s1","method":"known.v1.Known/Hi"}),
            // notification: never answered, even though the version is bad
            json!({"method":"known.v1.Known/Hi"}),
            // server id must start with 's'
            json!({"jsonrpc":"2.0","id":"q7","method":"known.v1.Known/Hi"}),
            // unknown method
            json!({"jsonrpc":"2.0","id":"s2","method":"ghost.v1.Ghost/None"}),
            // heartbeat answered with an empty result
            json!({"jsonrpc":"2.0","id":"s3","method":"rpc.heartbeat"}),
            // the happy path
            json!({"jsonrpc":"2.0","id":"s4","method":"known.v1.Known/Hi"}),
        ];
        for frame in &frames {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }
        let mut replies = Vec::new();
        while replies.len() < 5 {
            match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    replies.push(serde_json::from_str::<Value>(&text).unwrap())
                }
                Ok(Some(Ok(_))) => continue,
                _ => break,
            }
        }
        let quiet = tokio::time::timeout(Duration::from_millis(200), ws.next())
            .await
            .is_err();
        (replies, quiet)
    });

    client.connect(&format!("ws://{addr}")).await.unwrap();
    let (replies, quiet) = server.await.unwrap();
    client.close().await;

    assert_eq!(replies.len(), 5, "got {replies:?}");
    assert_eq!(replies[0]["id"], json!("s1"));
    assert_eq!(replies[0]["error"]["code"], json!(-32600));
    assert_eq!(replies[1]["id"], json!("q7"));
    assert_eq!(replies[1]["error"]["code"], json!(-32600));
    assert_eq!(replies[2]["id"], json!("s2"));
    assert_eq!(replies[2]["error"]["code"], json!(-32601));
    assert!(replies[2]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("ghost.v1.Ghost/None"));
    assert_eq!(replies[3]["id"], json!("s3"));
    assert_eq!(replies[3]["result"], json!({}));
    assert_eq!(replies[4]["id"], json!("s4"));
    assert_eq!(replies[4]["result"], json!({"hi": true}));
    assert!(quiet, "the notification must never be answered");
}

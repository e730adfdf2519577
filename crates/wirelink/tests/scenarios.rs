//! End-to-end scenarios over the public facade: a WsClient against an
//! in-process echo server on the memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use wirelink::client::{CallApiOptions, ConnectionState, WsClient, WsClientOptions};
use wirelink::codec::{encode_api_req, encode_api_return, MsgPackCodec, PayloadCodec};
use wirelink::io::{memory_socket, MemoryListener, MemorySocketProxy};
use wirelink::proto::{
    codes, RpcErrorKind, ServerInput, ServiceDescriptor, ServiceKind, ServiceMap, ServiceProto,
    SCHEMA_SERVER_INPUT,
};

#[derive(Debug, Deserialize, PartialEq)]
struct ResTest {
    reply: String,
}

fn proto() -> ServiceProto {
    ServiceProto {
        services: vec![
            ServiceDescriptor::Api {
                id: 0,
                name: "Test".to_string(),
                req_schema_id: "PtlTest/ReqTest".to_string(),
                res_schema_id: "PtlTest/ResTest".to_string(),
            },
            ServiceDescriptor::Msg {
                id: 1,
                name: "Chat".to_string(),
                msg_schema_id: "MsgChat/MsgChat".to_string(),
            },
        ],
        ..ServiceProto::default()
    }
}

/// Echo server for the Test api: replies `Test reply: <name>`.
/// A request named "slow" is answered only after 300 ms.
fn spawn_echo_server(mut listener: MemoryListener) {
    tokio::spawn(async move {
        let codec = MsgPackCodec;
        let map = ServiceMap::new(&proto()).unwrap();
        while let Some(mut conn) = listener.accept().await {
            let map = map.clone();
            tokio::spawn(async move {
                while let Some(frame) = conn.recv().await {
                    let input: ServerInput = codec.decode(&frame, SCHEMA_SERVER_INPUT).unwrap();
                    let service = map.by_id(input.service_id).unwrap().clone();
                    if service.kind() != ServiceKind::Api {
                        continue;
                    }
                    let req: serde_json::Value = codec
                        .decode(input.buffer.as_ref().unwrap(), "PtlTest/ReqTest")
                        .unwrap();
                    let name = req["name"].as_str().unwrap_or("").to_string();
                    let reply = json!({ "reply": format!("Test reply: {name}") });
                    let out = encode_api_return(&codec, &service, &Ok(reply), input.sn).unwrap();
                    if name == "slow" {
                        let conn_out = out;
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        let _ = conn.send(conn_out);
                    } else {
                        let _ = conn.send(out);
                    }
                }
            });
        }
    });
}

fn connected_client() -> (
    Arc<WsClient<MsgPackCodec, MemorySocketProxy>>,
    impl std::future::Future<Output = ()>,
) {
    let (proxy, listener) = memory_socket();
    spawn_echo_server(listener);
    let client = Arc::new(
        WsClient::new(
            &proto(),
            MsgPackCodec,
            proxy,
            WsClientOptions::new("mem://scenarios"),
        )
        .unwrap(),
    );
    let connect = {
        let client = Arc::clone(&client);
        async move {
            client.connect().await.unwrap();
        }
    };
    (client, connect)
}

#[tokio::test]
async fn echo_call_yields_the_expected_reply() {
    let (client, connect) = connected_client();
    connect.await;

    let res: ResTest = client
        .call_api("Test", &json!({ "name": "Req1" }), CallApiOptions::default())
        .await
        .unwrap();
    assert_eq!(res.reply, "Test reply: Req1");
}

#[tokio::test]
async fn round_trip_law_preserves_the_inner_payload() {
    let codec = MsgPackCodec;
    let map = ServiceMap::new(&proto()).unwrap();
    let service = map.api_by_name("Test").unwrap();

    let payload = json!({ "name": "Req1" });
    let wire = encode_api_req(&codec, service, &payload, Some(9)).unwrap();

    // What the server unwraps must be bit-for-bit the payload encoding.
    let input: ServerInput = codec.decode(&wire, SCHEMA_SERVER_INPUT).unwrap();
    let direct = codec.encode(&payload, "PtlTest/ReqTest").unwrap();
    let inner: &[u8] = input.buffer.as_ref().unwrap();
    assert_eq!(inner, &direct[..]);
    assert_eq!(input.sn, Some(9));
}

#[tokio::test]
async fn timeout_wins_and_the_late_reply_is_dropped() {
    let (client, connect) = connected_client();
    connect.await;

    let started = Instant::now();
    let err = client
        .call_api::<_, ResTest>(
            "Test",
            &json!({ "name": "slow" }),
            CallApiOptions::default().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, RpcErrorKind::NetworkError);
    assert!(err.has_code(codes::TIMEOUT));
    assert!(started.elapsed() < Duration::from_millis(280));

    // The late reply lands in nothing; the connection stays healthy.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(client.status(), ConnectionState::Opened);
    let res: ResTest = client
        .call_api("Test", &json!({ "name": "after" }), CallApiOptions::default())
        .await
        .unwrap();
    assert_eq!(res.reply, "Test reply: after");
}

#[tokio::test]
async fn abort_immediately_after_call_settles_as_canceled() {
    let (proxy, mut listener) = memory_socket();
    // Server that never answers.
    tokio::spawn(async move {
        let mut conn = listener.accept().await.unwrap();
        while conn.recv().await.is_some() {}
    });
    let client = Arc::new(
        WsClient::new(
            &proto(),
            MsgPackCodec,
            proxy,
            WsClientOptions::new("mem://silent"),
        )
        .unwrap(),
    );
    client.connect().await.unwrap();

    let caller = Arc::clone(&client);
    let call = tokio::spawn(async move {
        caller
            .call_api::<_, ResTest>("Test", &json!({ "name": "x" }), CallApiOptions::default())
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let sn = client.last_sn();
    assert!(client.abort(sn));
    let err = call.await.unwrap().unwrap_err();
    assert!(err.has_code(codes::CANCELED));
    // A second abort for the same serial number is a no-op.
    assert!(!client.abort(sn));
}

#[tokio::test]
async fn unreachable_server_connect_resolves_with_failure() {
    let (proxy, listener) = memory_socket();
    drop(listener);

    let client = WsClient::new(
        &proto(),
        MsgPackCodec,
        proxy,
        WsClientOptions::new("mem://unreachable"),
    )
    .unwrap();

    let mut watch = client.status_watch();
    let err = client.connect().await.unwrap_err();
    assert_eq!(err.kind, RpcErrorKind::NetworkError);
    assert_eq!(client.status(), ConnectionState::Closed);
    assert_eq!(*watch.borrow_and_update(), ConnectionState::Closed);
}

#[tokio::test]
async fn dropped_connection_settles_both_pending_calls() {
    let (proxy, mut listener) = memory_socket();
    tokio::spawn(async move {
        let mut conn = listener.accept().await.unwrap();
        let _ = conn.recv().await;
        let _ = conn.recv().await;
        conn.close(Some(1006), "dropped");
    });

    let lost = Arc::new(AtomicUsize::new(0));
    let lost_counter = Arc::clone(&lost);
    let client = Arc::new(
        WsClient::new(
            &proto(),
            MsgPackCodec,
            proxy,
            WsClientOptions::new("mem://flaky").on_lost_connection(move || {
                lost_counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap(),
    );
    client.connect().await.unwrap();

    let req_a = json!({ "name": "a" });
    let req_b = json!({ "name": "b" });
    let (a, b) = tokio::join!(
        client.call_api::<_, ResTest>("Test", &req_a, CallApiOptions::default()),
        client.call_api::<_, ResTest>("Test", &req_b, CallApiOptions::default()),
    );
    for ret in [a, b] {
        let err = ret.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::NetworkError);
        assert!(err.has_code(codes::CONNECTION_LOST));
    }
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(client.status(), ConnectionState::Closed);
}

#[tokio::test]
async fn concurrent_calls_correlate_to_their_own_replies() {
    let (client, connect) = connected_client();
    connect.await;

    let mut calls = Vec::new();
    for i in 0..16 {
        let client = Arc::clone(&client);
        calls.push(tokio::spawn(async move {
            let name = format!("req-{i}");
            let res: ResTest = client
                .call_api("Test", &json!({ "name": name }), CallApiOptions::default())
                .await
                .unwrap();
            (i, res.reply)
        }));
    }
    for call in calls {
        let (i, reply) = call.await.unwrap();
        assert_eq!(reply, format!("Test reply: req-{i}"));
    }
    assert_eq!(client.last_sn(), 16);
    assert!(client.core().pending().is_empty());
}

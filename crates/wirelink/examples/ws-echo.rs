//! In-process echo round trip over the memory transport.
//!
//! Run with:
//!   cargo run --example ws-echo
//!
//! Spawns a tiny echo server on the in-memory socket transport,
//! connects a WsClient to it, performs one API call and one message
//! push, then disconnects.

use serde::{Deserialize, Serialize};
use serde_json::json;

use wirelink::client::{CallApiOptions, WsClient, WsClientOptions};
use wirelink::codec::{encode_api_return, encode_server_msg, MsgPackCodec, PayloadCodec};
use wirelink::io::{memory_socket, MemoryListener};
use wirelink::proto::{
    ServerInput, ServiceDescriptor, ServiceKind, ServiceMap, ServiceProto, SCHEMA_SERVER_INPUT,
};

#[derive(Debug, Serialize)]
struct ReqHello {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResHello {
    reply: String,
}

#[derive(Debug, Deserialize)]
struct MsgChat {
    content: String,
}

fn proto() -> ServiceProto {
    ServiceProto {
        services: vec![
            ServiceDescriptor::Api {
                id: 0,
                name: "Hello".to_string(),
                req_schema_id: "PtlHello/ReqHello".to_string(),
                res_schema_id: "PtlHello/ResHello".to_string(),
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

/// Echo server: answers Hello calls, bounces Chat messages back.
fn spawn_server(mut listener: MemoryListener) {
    tokio::spawn(async move {
        let codec = MsgPackCodec;
        let map = ServiceMap::new(&proto()).expect("valid protocol description");
        while let Some(mut conn) = listener.accept().await {
            let map = map.clone();
            tokio::spawn(async move {
                while let Some(frame) = conn.recv().await {
                    let Ok(input) = codec.decode::<ServerInput>(&frame, SCHEMA_SERVER_INPUT)
                    else {
                        continue;
                    };
                    let Some(service) = map.by_id(input.service_id) else {
                        continue;
                    };
                    let Some(buffer) = input.buffer.as_ref() else {
                        continue;
                    };
                    match service.kind() {
                        ServiceKind::Api => {
                            let req: serde_json::Value = codec
                                .decode(buffer, "PtlHello/ReqHello")
                                .expect("decodable request");
                            let reply = json!({
                                "reply": format!("Hello, {}!", req["name"].as_str().unwrap_or("?"))
                            });
                            let out = encode_api_return(&codec, service, &Ok(reply), input.sn)
                                .expect("encodable reply");
                            let _ = conn.send(out);
                        }
                        ServiceKind::Msg => {
                            let msg: serde_json::Value = codec
                                .decode(buffer, "MsgChat/MsgChat")
                                .expect("decodable msg");
                            let out = encode_server_msg(&codec, service, &msg)
                                .expect("encodable msg");
                            let _ = conn.send(out);
                        }
                    }
                }
            });
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let (proxy, listener) = memory_socket();
    spawn_server(listener);

    let client = WsClient::new(
        &proto(),
        MsgPackCodec,
        proxy,
        WsClientOptions::new("mem://echo").on_status_change(|state| {
            eprintln!("status: {state}");
        }),
    )?;

    client.connect().await.map_err(|err| err.to_string())?;

    let res: ResHello = client
        .call_api(
            "Hello",
            &ReqHello {
                name: "wirelink".to_string(),
            },
            CallApiOptions::default(),
        )
        .await
        .map_err(|err| err.to_string())?;
    eprintln!("api reply: {}", res.reply);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.listen_msg_typed("Chat", move |msg: MsgChat| {
        let _ = tx.send(msg.content);
    });
    client
        .send_msg("Chat", &json!({ "content": "round trip" }))
        .await
        .map_err(|err| err.to_string())?;
    if let Some(content) = rx.recv().await {
        eprintln!("chat echoed: {content}");
    }

    client.disconnect().await;
    Ok(())
}

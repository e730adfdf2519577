//! Short-lived transport adapter.
//!
//! One request per call: the response arrives on the request's own
//! channel, is decoded inline, and still settles through the pending
//! table so that timeout, abort and the response race to a single
//! settlement.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use wirelink_codec::{decode_server_output, ParsedServerOutput, PayloadCodec};
use wirelink_io::{HttpProxy, HttpRequest, ProxyError, ResponseKind};
use wirelink_proto::{codes, ApiReturn, ProtoError, RpcError, ServiceProto};

use crate::core::{flow_canceled, ClientCore};
use crate::options::{CallApiOptions, ClientOptions};

/// RPC client over a fetch-like proxy.
pub struct HttpClient<C: PayloadCodec, P: HttpProxy> {
    core: Arc<ClientCore<C>>,
    proxy: Arc<P>,
}

impl<C: PayloadCodec, P: HttpProxy> HttpClient<C, P> {
    pub fn new(
        proto: &ServiceProto,
        codec: C,
        proxy: P,
        options: ClientOptions,
    ) -> Result<Self, ProtoError> {
        let core = ClientCore::new(proto, codec, options)?;
        debug!(server = %core.options().server, "http client ready");
        Ok(Self {
            core: Arc::new(core),
            proxy: Arc::new(proxy),
        })
    }

    pub fn core(&self) -> &ClientCore<C> {
        &self.core
    }

    /// The most recently issued serial number.
    pub fn last_sn(&self) -> u64 {
        self.core.last_sn()
    }

    /// Abort an in-flight call: cancels the underlying request and
    /// settles the call as canceled. No-op for settled calls.
    pub fn abort(&self, sn: u64) -> bool {
        self.core.pending.abort(sn)
    }

    /// Call a declared API and await its settlement.
    pub async fn call_api<Req, Res>(
        &self,
        name: &str,
        req: &Req,
        options: CallApiOptions,
    ) -> ApiReturn<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let service = self.core.resolve_api(name)?;
        let sn = self.core.next_sn();
        let buf = self.core.encode_api_req(&service, req, sn)?;
        debug!(sn, api = name, "[ApiReq]");

        let timeout = options.timeout.or(self.core.options().timeout);
        let token = CancellationToken::new();
        let abort_token = token.clone();
        let rx = self.core.pending.register(
            sn,
            Arc::clone(&service),
            timeout,
            Some(Box::new(move || abort_token.cancel())),
        );

        match self.core.run_pre_send(buf, Some(sn)).await {
            Some(buf) => {
                if self.core.options().debug_buf {
                    debug!(sn, len = buf.len(), "[SendBuf]");
                }
                let mut request =
                    HttpRequest::post(&self.core.options().server, buf, self.response_kind());
                request.timeout = timeout;
                request.on_progress = options.on_progress.clone();

                let proxy = Arc::clone(&self.proxy);
                let core = Arc::clone(&self.core);
                let service_id = service.id();
                let send_token = token.clone();
                tokio::spawn(async move {
                    let outcome = tokio::select! {
                        // Abort/timeout cancel the round trip; any bytes
                        // that still arrive are discarded with it.
                        _ = send_token.cancelled() => return,
                        outcome = proxy.issue(request, send_token.clone()) => outcome,
                    };
                    match outcome {
                        Ok(body) => {
                            let bytes = body.into_bytes();
                            if core.options().debug_buf {
                                debug!(sn, len = bytes.len(), "[RecvBuf]");
                            }
                            match decode_server_output(
                                core.codec(),
                                core.service_map(),
                                &bytes,
                                Some(service_id),
                            ) {
                                Ok(ParsedServerOutput::Api { ret, .. }) => {
                                    core.pending().resolve(sn, ret);
                                }
                                Ok(ParsedServerOutput::Msg { .. }) => {
                                    core.pending().cancel_with(
                                        sn,
                                        RpcError::server("Invalid response: expected an api return"),
                                    );
                                }
                                Err(err) => {
                                    core.pending().cancel_with(
                                        sn,
                                        RpcError::server(err.to_string())
                                            .with_code(codes::RES_DECODE_ERR),
                                    );
                                }
                            }
                        }
                        // Already settled by abort or timeout.
                        Err(ProxyError::Aborted) => {}
                        Err(ProxyError::Timeout) => {
                            core.pending().resolve(
                                sn,
                                Err(RpcError::network("Request Timeout")
                                    .with_code(codes::TIMEOUT)),
                            );
                        }
                        Err(err) => {
                            core.pending()
                                .resolve(sn, Err(RpcError::network(err.to_string())));
                        }
                    }
                });
            }
            None => {
                self.core.pending.cancel_with(sn, flow_canceled("callApi"));
            }
        }

        let ret = rx.await.unwrap_or_else(|_| {
            Err(RpcError::client("Request was canceled").with_code(codes::CANCELED))
        });
        match &ret {
            Ok(_) => debug!(sn, api = name, "[ApiRes]"),
            Err(err) => debug!(sn, api = name, %err, "[ApiErr]"),
        }
        self.core.finish_call(&service, ret)
    }

    /// Send a one-way message. The outcome reflects only whether the
    /// local send attempt failed; server-side receipt is never awaited.
    pub async fn send_msg<Msg: Serialize>(&self, name: &str, msg: &Msg) -> ApiReturn<()> {
        let service = self.core.resolve_msg(name)?;
        let buf = self.core.encode_msg(&service, msg)?;
        debug!(msg = name, "[SendMsg]");

        let Some(buf) = self.core.run_pre_send(buf, None).await else {
            return Err(flow_canceled("sendMsg"));
        };
        if self.core.options().debug_buf {
            debug!(len = buf.len(), "[SendBuf]");
        }

        let request = HttpRequest::post(&self.core.options().server, buf, self.response_kind());
        self.proxy
            .issue(request, CancellationToken::new())
            .await
            .map(|_| ())
            .map_err(|err| RpcError::network(err.to_string()))
    }

    fn response_kind(&self) -> ResponseKind {
        if self.core.codec().is_text() {
            ResponseKind::Text
        } else {
            ResponseKind::Bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use bytes::Bytes;
    use serde::Deserialize;
    use serde_json::json;

    use wirelink_codec::{encode_api_return, MsgPackCodec};
    use wirelink_io::HttpResponseBody;
    use wirelink_proto::{
        ServerInput, ServerOutput, ServiceDescriptor, ServiceMap, SCHEMA_SERVER_INPUT,
        SCHEMA_SERVER_OUTPUT,
    };

    use super::*;

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

    /// Answer an encoded ServerInput the way the companion echo server
    /// would: `{reply: "Test reply: <name>"}` for the Test api.
    fn echo_reply(request_body: &[u8]) -> Bytes {
        let codec = MsgPackCodec;
        let map = ServiceMap::new(&proto()).unwrap();
        let input: ServerInput = codec.decode(request_body, SCHEMA_SERVER_INPUT).unwrap();
        let service = map.by_id(input.service_id).unwrap();
        if service.kind() == wirelink_proto::ServiceKind::Msg {
            // One-way message: the body is irrelevant, answer 200-ish.
            let empty = ServerOutput::default();
            return codec.encode(&empty, SCHEMA_SERVER_OUTPUT).unwrap();
        }
        let req: serde_json::Value = codec
            .decode(input.buffer.as_ref().unwrap(), "PtlTest/ReqTest")
            .unwrap();
        let reply = json!({ "reply": format!("Test reply: {}", req["name"].as_str().unwrap()) });
        // HTTP replies on the request's own channel: no sn, no service
        // id; the client supplies the hint.
        encode_api_return(&codec, service, &Ok(reply), None).unwrap()
    }

    enum Behavior {
        Echo,
        DelayEcho(Duration),
        NetworkFail,
        Hang,
    }

    struct FakeProxy {
        behavior: Behavior,
        requests: AtomicUsize,
        last_token: Mutex<Option<CancellationToken>>,
    }

    impl FakeProxy {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                requests: AtomicUsize::new(0),
                last_token: Mutex::new(None),
            }
        }
    }

    impl HttpProxy for FakeProxy {
        fn issue(
            &self,
            req: HttpRequest,
            abort: CancellationToken,
        ) -> impl Future<Output = wirelink_io::Result<HttpResponseBody>> + Send {
            self.requests.fetch_add(1, Ordering::SeqCst);
            *self.last_token.lock().unwrap() = Some(abort.clone());
            let delay = match &self.behavior {
                Behavior::DelayEcho(delay) => Some(*delay),
                _ => None,
            };
            let fail = matches!(self.behavior, Behavior::NetworkFail);
            let hang = matches!(self.behavior, Behavior::Hang);
            async move {
                if hang {
                    abort.cancelled().await;
                    return Err(ProxyError::Aborted);
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if fail {
                    return Err(ProxyError::Network("connection refused".to_string()));
                }
                Ok(HttpResponseBody::Bytes(echo_reply(&req.body)))
            }
        }
    }

    fn client(behavior: Behavior) -> HttpClient<MsgPackCodec, FakeProxy> {
        HttpClient::new(
            &proto(),
            MsgPackCodec,
            FakeProxy::new(behavior),
            ClientOptions::new("http://localhost:3000"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn call_api_round_trips_the_echo_reply() {
        let client = client(Behavior::Echo);
        let res: ResTest = client
            .call_api("Test", &json!({ "name": "Req1" }), CallApiOptions::default())
            .await
            .unwrap();
        assert_eq!(res.reply, "Test reply: Req1");
    }

    #[tokio::test]
    async fn invalid_api_name_is_a_client_error() {
        let client = client(Behavior::Echo);
        let err = client
            .call_api::<_, ResTest>("Nope", &json!({}), CallApiOptions::default())
            .await
            .unwrap_err();
        assert!(err.has_code(codes::INVALID_NAME));
        // Nothing reached the proxy.
        assert_eq!(client.proxy.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_server_loses_to_the_timeout() {
        let client = client(Behavior::DelayEcho(Duration::from_secs(5)));
        let started = Instant::now();
        let err = client
            .call_api::<_, ResTest>(
                "Test",
                &json!({ "name": "Req1" }),
                CallApiOptions::default().with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(err.has_code(codes::TIMEOUT));
        assert!(started.elapsed() < Duration::from_secs(2));
        // The timer aborted the round trip through the hook.
        let token = client.proxy.last_token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
        assert!(client.core.pending.is_empty());
    }

    #[tokio::test]
    async fn network_failure_settles_as_network_error() {
        let client = client(Behavior::NetworkFail);
        let err = client
            .call_api::<_, ResTest>("Test", &json!({ "name": "x" }), CallApiOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, wirelink_proto::RpcErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn abort_settles_promptly_and_cancels_io_once() {
        let client = Arc::new(client(Behavior::Hang));
        let caller = Arc::clone(&client);
        let call = tokio::spawn(async move {
            caller
                .call_api::<_, ResTest>("Test", &json!({ "name": "x" }), CallApiOptions::default())
                .await
        });
        // Let the call register and hit the proxy.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sn = client.last_sn();
        assert!(client.abort(sn));
        assert!(!client.abort(sn));

        let err = call.await.unwrap().unwrap_err();
        assert!(err.has_code(codes::CANCELED));
        let token = client.proxy.last_token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn pre_send_flow_can_veto_a_call() {
        let client = client(Behavior::Echo);
        client.core().flows().pre_send_buffer.push(|_| async move { None });
        let err = client
            .call_api::<_, ResTest>("Test", &json!({ "name": "x" }), CallApiOptions::default())
            .await
            .unwrap_err();
        assert!(err.has_code(codes::FLOW_CANCELED));
        assert_eq!(client.proxy.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_msg_reflects_local_outcome_only() {
        let failing = client(Behavior::NetworkFail);
        let client = client(Behavior::Echo);
        client
            .send_msg("Chat", &json!({ "content": "hi" }))
            .await
            .unwrap();

        let err = failing
            .send_msg("Chat", &json!({ "content": "hi" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, wirelink_proto::RpcErrorKind::NetworkError);

        let bad = client
            .send_msg("NoSuchMsg", &json!({}))
            .await
            .unwrap_err();
        assert!(bad.has_code(codes::INVALID_NAME));
    }

    #[tokio::test]
    async fn undecodable_response_is_a_server_error() {
        struct GarbageProxy;
        impl HttpProxy for GarbageProxy {
            fn issue(
                &self,
                _req: HttpRequest,
                _abort: CancellationToken,
            ) -> impl Future<Output = wirelink_io::Result<HttpResponseBody>> + Send {
                async { Ok(HttpResponseBody::Bytes(Bytes::from_static(b"\xc1oops"))) }
            }
        }

        let client = HttpClient::new(
            &proto(),
            MsgPackCodec,
            GarbageProxy,
            ClientOptions::new("http://localhost:3000"),
        )
        .unwrap();
        let err = client
            .call_api::<_, ResTest>("Test", &json!({ "name": "x" }), CallApiOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, wirelink_proto::RpcErrorKind::ServerError);
        assert!(err.has_code(codes::RES_DECODE_ERR));
    }
}

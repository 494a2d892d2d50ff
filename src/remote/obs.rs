//! [`RemoteClient`] for OBS Studio over obs-websocket v5.
//!
//! The client keeps at most one WebSocket.  Before every action it drains
//! anything the server pushed since the last call; a close frame found there
//! (OBS exiting, the user restarting the WebSocket server) drops the socket
//! and the action reconnects transparently.  A transport error or timeout in
//! the middle of a request also drops the socket, so the *next* action starts
//! from a fresh handshake.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::{self, request, Incoming, OutputStatus};
use super::{ActionError, ConnectionError, RemoteClient};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

/// Validated connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    /// Empty when the server has authentication disabled.
    pub password: String,
    /// Bound on TCP connect + WebSocket upgrade + Identify.
    pub connect_timeout: Duration,
    /// Bound on one request/response round trip.
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4455,
            password: String::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame reading
// ---------------------------------------------------------------------------

enum ReadError {
    Closed { code: Option<u16>, reason: String },
    Transport(String),
    Malformed(String),
}

/// Next protocol message, skipping pings, pongs and binary frames.
async fn read_incoming(ws: &mut WsStream) -> Result<Incoming, ReadError> {
    loop {
        match ws.next().await {
            None => {
                return Err(ReadError::Closed {
                    code: None,
                    reason: "stream ended".into(),
                })
            }
            Some(Err(e)) => return Err(ReadError::Transport(e.to_string())),
            Some(Ok(Message::Text(text))) => {
                return protocol::parse(&text).map_err(|e| ReadError::Malformed(e.to_string()))
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                    None => (None, String::new()),
                };
                return Err(ReadError::Closed { code, reason });
            }
            Some(Ok(_)) => continue,
        }
    }
}

fn handshake_error(e: ReadError, waiting_for: &str) -> ConnectionError {
    match e {
        ReadError::Closed {
            code: Some(protocol::CLOSE_AUTH_FAILED),
            ..
        } => ConnectionError::AuthenticationFailed,
        ReadError::Closed { code, reason } => ConnectionError::Handshake(format!(
            "closed while waiting for {waiting_for} (code {code:?}): {reason}"
        )),
        ReadError::Transport(reason) | ReadError::Malformed(reason) => {
            ConnectionError::Handshake(format!("waiting for {waiting_for}: {reason}"))
        }
    }
}

async fn handshake(config: &RemoteConfig) -> Result<WsStream, ConnectionError> {
    let url = config.url();
    let (mut ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ConnectionError::Unreachable {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let hello = loop {
        match read_incoming(&mut ws).await {
            Ok(Incoming::Hello(hello)) => break hello,
            Ok(_) => continue,
            Err(e) => return Err(handshake_error(e, "Hello")),
        }
    };
    log::debug!(
        "obs: server {} (rpc {}), auth {}",
        hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
        hello.rpc_version,
        if hello.authentication.is_some() { "required" } else { "disabled" }
    );

    let identify = protocol::identify(&hello, &config.password)
        .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
    ws.send(Message::Text(identify.into()))
        .await
        .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

    loop {
        match read_incoming(&mut ws).await {
            Ok(Incoming::Identified) => return Ok(ws),
            Ok(_) => continue,
            Err(e) => return Err(handshake_error(e, "Identified")),
        }
    }
}

async fn roundtrip(
    ws: &mut WsStream,
    request_type: &str,
    request_id: &str,
) -> Result<Option<Value>, ActionError> {
    let transport = |reason: String| ActionError::Transport {
        request: request_type.to_string(),
        reason,
    };

    let text = protocol::request(request_type, request_id).map_err(|e| ActionError::Protocol {
        request: request_type.to_string(),
        reason: e.to_string(),
    })?;
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| transport(e.to_string()))?;

    loop {
        match read_incoming(ws).await {
            Ok(Incoming::RequestResponse(resp)) if resp.request_id == request_id => {
                let status = resp.request_status;
                if !status.result {
                    return Err(ActionError::Rejected {
                        request: request_type.to_string(),
                        code: status.code,
                        comment: status.comment.unwrap_or_default(),
                    });
                }
                return Ok(resp.response_data);
            }
            Ok(_) => continue,
            Err(ReadError::Malformed(reason)) => {
                return Err(ActionError::Protocol {
                    request: request_type.to_string(),
                    reason,
                })
            }
            Err(ReadError::Closed { code, reason }) => {
                return Err(transport(format!("closed by server (code {code:?}) {reason}")))
            }
            Err(ReadError::Transport(reason)) => return Err(transport(reason)),
        }
    }
}

// ---------------------------------------------------------------------------
// ObsClient
// ---------------------------------------------------------------------------

pub struct ObsClient {
    config: RemoteConfig,
    ws: Option<WsStream>,
    next_id: u64,
    /// Set after the first successful connect; a later reconnect is logged.
    was_connected: bool,
}

impl ObsClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            ws: None,
            next_id: 0,
            was_connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ws.is_some()
    }

    async fn open(&mut self) -> Result<(), ConnectionError> {
        let limit = self.config.connect_timeout;
        let ws = tokio::time::timeout(limit, handshake(&self.config))
            .await
            .map_err(|_| ConnectionError::Timeout(limit))??;

        log::info!("obs: connected to {}", self.config.url());
        self.ws = Some(ws);
        self.was_connected = true;
        Ok(())
    }

    /// Discard pushed messages; drop the socket if the server closed it.
    fn drain_inbound(&mut self) {
        let Some(ws) = self.ws.as_mut() else {
            return;
        };

        let mut closed = false;
        while let Some(item) = ws.next().now_or_never() {
            match item {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    closed = true;
                    break;
                }
                Some(Ok(_)) => {}
            }
        }

        if closed {
            log::warn!("obs: connection closed by server");
            self.ws = None;
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut WsStream, ConnectionError> {
        self.drain_inbound();
        if self.ws.is_none() {
            if self.was_connected {
                log::warn!("obs: connection lost, reconnecting to {}", self.config.url());
            }
            self.open().await?;
        }
        self.ws
            .as_mut()
            .ok_or_else(|| ConnectionError::Handshake("connection not established".into()))
    }

    async fn call(&mut self, request_type: &str) -> Result<Option<Value>, ActionError> {
        self.next_id += 1;
        let request_id = self.next_id.to_string();
        let limit = self.config.request_timeout;

        let ws = self.ensure_connected().await?;
        let result = match tokio::time::timeout(limit, roundtrip(ws, request_type, &request_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout {
                request: request_type.to_string(),
            }),
        };

        if let Err(e @ (ActionError::Transport { .. } | ActionError::Timeout { .. })) = &result {
            log::warn!("obs: dropping connection: {e}");
            self.ws = None;
        }
        result
    }

    async fn output_active(&mut self, status_request: &str) -> Result<bool, ActionError> {
        let protocol_error = |reason: String| ActionError::Protocol {
            request: status_request.to_string(),
            reason,
        };

        let data = self
            .call(status_request)
            .await?
            .ok_or_else(|| protocol_error("missing responseData".into()))?;
        let status: OutputStatus =
            serde_json::from_value(data).map_err(|e| protocol_error(e.to_string()))?;
        Ok(status.output_active)
    }

    /// Issue `action_request` unless the output is already in the wanted
    /// state.
    async fn set_output(
        &mut self,
        status_request: &str,
        action_request: &str,
        want_active: bool,
        already: &str,
    ) -> Result<(), ActionError> {
        if self.output_active(status_request).await? == want_active {
            log::warn!("obs: {already}");
            return Ok(());
        }
        self.call(action_request).await?;
        log::info!("obs: {action_request} ok");
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for ObsClient {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.ensure_connected().await.map(|_| ())
    }

    async fn disconnect(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close(None).await {
                log::debug!("obs: close handshake failed: {e}");
            }
            log::info!("obs: disconnected");
        }
        self.was_connected = false;
    }

    async fn start_recording(&mut self) -> Result<(), ActionError> {
        self.set_output(
            request::GET_RECORD_STATUS,
            request::START_RECORD,
            true,
            "Recording already in progress",
        )
        .await
    }

    async fn stop_recording(&mut self) -> Result<(), ActionError> {
        self.set_output(
            request::GET_RECORD_STATUS,
            request::STOP_RECORD,
            false,
            "No active recording",
        )
        .await
    }

    async fn start_buffer(&mut self) -> Result<(), ActionError> {
        self.set_output(
            request::GET_REPLAY_BUFFER_STATUS,
            request::START_REPLAY_BUFFER,
            true,
            "Replay buffer already active",
        )
        .await
    }

    async fn stop_buffer(&mut self) -> Result<(), ActionError> {
        self.set_output(
            request::GET_REPLAY_BUFFER_STATUS,
            request::STOP_REPLAY_BUFFER,
            false,
            "Replay buffer is not active",
        )
        .await
    }

    async fn save_buffer(&mut self) -> Result<(), ActionError> {
        if !self.output_active(request::GET_REPLAY_BUFFER_STATUS).await? {
            log::warn!("obs: Replay buffer is not active; nothing to save");
            return Ok(());
        }
        self.call(request::SAVE_REPLAY_BUFFER).await?;
        log::info!("obs: replay buffer saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
    const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";

    #[derive(Default)]
    struct FakeObs {
        password: Option<String>,
        record_active: bool,
        buffer_active: bool,
        reject: Option<&'static str>,
        /// Close each connection after this many requests.
        close_after: Option<usize>,
        connections: usize,
        requests: Vec<String>,
    }

    impl FakeObs {
        fn handle(&mut self, request_type: &str) -> (bool, Value) {
            self.requests.push(request_type.to_string());
            if self.reject == Some(request_type) {
                return (false, Value::Null);
            }
            match request_type {
                request::GET_RECORD_STATUS => (true, json!({ "outputActive": self.record_active })),
                request::GET_REPLAY_BUFFER_STATUS => {
                    (true, json!({ "outputActive": self.buffer_active }))
                }
                request::START_RECORD => {
                    self.record_active = true;
                    (true, Value::Null)
                }
                request::STOP_RECORD => {
                    self.record_active = false;
                    (true, Value::Null)
                }
                request::START_REPLAY_BUFFER => {
                    self.buffer_active = true;
                    (true, Value::Null)
                }
                request::STOP_REPLAY_BUFFER => {
                    self.buffer_active = false;
                    (true, Value::Null)
                }
                _ => (true, Value::Null),
            }
        }
    }

    type Shared = Arc<Mutex<FakeObs>>;

    async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
        ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn serve(stream: TcpStream, state: Shared) {
        let mut ws = accept_async(stream).await.unwrap();
        let password = state.lock().unwrap().password.clone();

        let hello = match &password {
            Some(_) => json!({"op": 0, "d": {"obsWebSocketVersion": "5.1.0", "rpcVersion": 1,
                "authentication": {"challenge": CHALLENGE, "salt": SALT}}}),
            None => json!({"op": 0, "d": {"obsWebSocketVersion": "5.1.0", "rpcVersion": 1}}),
        };
        send_json(&mut ws, hello).await;

        let Some(Ok(Message::Text(text))) = ws.next().await else {
            return;
        };
        let identify: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(identify["op"], 1);
        if let Some(pw) = password {
            if identify["d"]["authentication"] != protocol::auth_response(&pw, SALT, CHALLENGE) {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::from(protocol::CLOSE_AUTH_FAILED),
                        reason: "Authentication failed.".into(),
                    }))
                    .await;
                return;
            }
        }
        send_json(&mut ws, json!({"op": 2, "d": {"negotiatedRpcVersion": 1}})).await;
        state.lock().unwrap().connections += 1;

        let mut handled = 0;
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let req: Value = serde_json::from_str(&text).unwrap();
            let request_type = req["d"]["requestType"].as_str().unwrap().to_string();
            let (ok, data) = state.lock().unwrap().handle(&request_type);

            // An unrelated event first; the client must skip it.
            send_json(&mut ws, json!({"op": 5, "d": {"eventType": "StudioModeStateChanged"}}))
                .await;
            send_json(
                &mut ws,
                json!({"op": 7, "d": {
                    "requestType": request_type,
                    "requestId": req["d"]["requestId"],
                    "requestStatus": {"result": ok, "code": if ok { 100 } else { 501 },
                        "comment": if ok { Value::Null } else { json!("scripted rejection") }},
                    "responseData": data,
                }}),
            )
            .await;

            handled += 1;
            if state.lock().unwrap().close_after == Some(handled) {
                let _ = ws.close(None).await;
                break;
            }
        }
    }

    async fn spawn_fake(fake: FakeObs) -> (u16, Shared) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state: Shared = Arc::new(Mutex::new(fake));
        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });
        (port, state)
    }

    fn client(port: u16, password: &str) -> ObsClient {
        ObsClient::new(RemoteConfig {
            host: "127.0.0.1".into(),
            port,
            password: password.into(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn authenticates_and_starts_recording() {
        let (port, state) = spawn_fake(FakeObs {
            password: Some("supersecret".into()),
            ..Default::default()
        })
        .await;
        let mut obs = client(port, "supersecret");

        obs.connect().await.unwrap();
        assert!(obs.is_connected());
        obs.start_recording().await.unwrap();

        let state = state.lock().unwrap();
        assert!(state.record_active);
        assert_eq!(state.requests, vec!["GetRecordStatus", "StartRecord"]);
    }

    #[tokio::test]
    async fn wrong_password_is_authentication_failure() {
        let (port, _state) = spawn_fake(FakeObs {
            password: Some("supersecret".into()),
            ..Default::default()
        })
        .await;
        let mut obs = client(port, "nope");

        assert_eq!(
            obs.connect().await,
            Err(ConnectionError::AuthenticationFailed)
        );
        assert!(!obs.is_connected());
    }

    #[tokio::test]
    async fn actions_are_idempotent() {
        let (port, state) = spawn_fake(FakeObs {
            record_active: true,
            ..Default::default()
        })
        .await;
        let mut obs = client(port, "");

        // Already recording: only the status query goes out.
        obs.start_recording().await.unwrap();
        // Buffer inactive: stop and save are no-ops.
        obs.stop_buffer().await.unwrap();
        obs.save_buffer().await.unwrap();

        assert_eq!(
            state.lock().unwrap().requests,
            vec!["GetRecordStatus", "GetReplayBufferStatus", "GetReplayBufferStatus"]
        );
    }

    #[tokio::test]
    async fn stop_everything_then_save_when_buffer_active() {
        let (port, state) = spawn_fake(FakeObs {
            record_active: true,
            buffer_active: true,
            ..Default::default()
        })
        .await;
        let mut obs = client(port, "");

        obs.save_buffer().await.unwrap();
        obs.stop_recording().await.unwrap();
        obs.stop_buffer().await.unwrap();

        let state = state.lock().unwrap();
        assert!(!state.record_active);
        assert!(!state.buffer_active);
        assert!(state.requests.contains(&"SaveReplayBuffer".to_string()));
    }

    #[tokio::test]
    async fn rejected_request_surfaces_code_and_comment() {
        let (port, _state) = spawn_fake(FakeObs {
            reject: Some(request::START_REPLAY_BUFFER),
            ..Default::default()
        })
        .await;
        let mut obs = client(port, "");

        let err = obs.start_buffer().await.unwrap_err();
        assert_eq!(
            err,
            ActionError::Rejected {
                request: "StartReplayBuffer".into(),
                code: 501,
                comment: "scripted rejection".into(),
            }
        );
        // A rejection is not a transport failure; the socket stays up.
        assert!(obs.is_connected());
    }

    #[tokio::test]
    async fn reconnects_lazily_after_server_close() {
        let (port, state) = spawn_fake(FakeObs {
            close_after: Some(2),
            ..Default::default()
        })
        .await;
        let mut obs = client(port, "");

        obs.start_recording().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        obs.stop_recording().await.unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.connections, 2);
        assert!(!state.record_active);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (port, _state) = spawn_fake(FakeObs::default()).await;
        let mut obs = client(port, "");

        obs.disconnect().await;
        obs.connect().await.unwrap();
        obs.disconnect().await;
        obs.disconnect().await;
        assert!(!obs.is_connected());
    }

    #[tokio::test]
    async fn unreachable_port_fails_connect() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut obs = client(port, "");

        assert!(matches!(
            obs.connect().await,
            Err(ConnectionError::Unreachable { .. })
        ));
        assert!(matches!(
            obs.start_recording().await,
            Err(ActionError::Connection(ConnectionError::Unreachable { .. }))
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let mut obs = ObsClient::new(RemoteConfig {
            connect_timeout: Duration::from_millis(200),
            ..client(port, "").config
        });
        assert_eq!(
            obs.connect().await,
            Err(ConnectionError::Timeout(Duration::from_millis(200)))
        );
    }
}

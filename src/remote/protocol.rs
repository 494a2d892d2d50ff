//! OBS WebSocket v5 message types.
//!
//! Every frame is a JSON text message `{"op": <u8>, "d": {...}}`.
//!
//! ```text
//! client                         server
//!   │ ◀──────── Hello (op 0) ───────── │  rpcVersion, optional auth challenge
//!   │ ───────── Identify (op 1) ─────▶ │  rpcVersion, auth string
//!   │ ◀──────── Identified (op 2) ──── │
//!   │ ───────── Request (op 6) ──────▶ │  requestType, requestId
//!   │ ◀──────── RequestResponse (op 7) │  requestStatus, responseData
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const RPC_VERSION: u32 = 1;

/// Close code the server uses when the `Identify` auth string is wrong.
pub const CLOSE_AUTH_FAILED: u16 = 4009;

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

pub mod request {
    pub const GET_RECORD_STATUS: &str = "GetRecordStatus";
    pub const START_RECORD: &str = "StartRecord";
    pub const STOP_RECORD: &str = "StopRecord";
    pub const GET_REPLAY_BUFFER_STATUS: &str = "GetReplayBufferStatus";
    pub const START_REPLAY_BUFFER: &str = "StartReplayBuffer";
    pub const STOP_REPLAY_BUFFER: &str = "StopReplayBuffer";
    pub const SAVE_REPLAY_BUFFER: &str = "SaveReplayBuffer";
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

/// `responseData` of `GetRecordStatus` and `GetReplayBufferStatus`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    pub output_active: bool,
}

#[derive(Debug)]
pub enum Incoming {
    Hello(Hello),
    Identified,
    Event,
    RequestResponse(RequestResponse),
    Other(u8),
}

/// Decode one text frame from the server.
pub fn parse(text: &str) -> Result<Incoming, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    Ok(match envelope.op {
        op::HELLO => Incoming::Hello(serde_json::from_value(envelope.d)?),
        op::IDENTIFIED => Incoming::Identified,
        op::EVENT => Incoming::Event,
        op::REQUEST_RESPONSE => Incoming::RequestResponse(serde_json::from_value(envelope.d)?),
        other => Incoming::Other(other),
    })
}

// ---------------------------------------------------------------------------
// Outgoing
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Outgoing<T> {
    op: u8,
    d: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Identify {
    rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<String>,
    /// No event subscriptions; the client only issues requests.
    event_subscriptions: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'a> {
    request_type: &'a str,
    request_id: &'a str,
}

/// `Identify` answering `hello`, with an auth string when the server asked
/// for one.
pub fn identify(hello: &Hello, password: &str) -> Result<String, serde_json::Error> {
    let authentication = hello
        .authentication
        .as_ref()
        .map(|a| auth_response(password, &a.salt, &a.challenge));

    serde_json::to_string(&Outgoing {
        op: op::IDENTIFY,
        d: Identify {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: 0,
        },
    })
}

pub fn request(request_type: &str, request_id: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Outgoing {
        op: op::REQUEST,
        d: Request {
            request_type,
            request_id,
        },
    })
}

//! Remote control of the recording application.
//!
//! The recognition worker only knows the [`RemoteClient`] trait: connect,
//! disconnect and five named actions.  [`ObsClient`] implements it over the
//! OBS WebSocket v5 protocol ([`protocol`]).
//!
//! Every action is idempotent (it checks the current output state first) and
//! reconnects lazily if the connection was lost since the last call.  The
//! worker never retries a failed action.

pub mod obs;
pub mod protocol;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use obs::{ObsClient, RemoteConfig};

// ---------------------------------------------------------------------------
// RemoteAction
// ---------------------------------------------------------------------------

/// Identifiers used by the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteAction {
    StartRecording,
    StopRecording,
    StartBuffer,
    StopBuffer,
    SaveBuffer,
}

impl RemoteAction {
    pub fn label(&self) -> &'static str {
        match self {
            RemoteAction::StartRecording => "start_recording",
            RemoteAction::StopRecording => "stop_recording",
            RemoteAction::StartBuffer => "start_buffer",
            RemoteAction::StopBuffer => "stop_buffer",
            RemoteAction::SaveBuffer => "save_buffer",
        }
    }
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Establishing the session failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("cannot reach {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// The server rejected the password.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

/// A single remote action failed.  Pipeline-fatal for the worker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The lazy reconnect before the action failed.
    #[error("not connected: {0}")]
    Connection(#[from] ConnectionError),

    /// The server answered with a failed request status.
    #[error("{request} rejected (code {code}): {comment}")]
    Rejected {
        request: String,
        code: u16,
        comment: String,
    },

    /// The connection dropped while the request was in flight.
    #[error("{request}: connection lost: {reason}")]
    Transport { request: String, reason: String },

    #[error("{request}: no response")]
    Timeout { request: String },

    /// The response could not be understood.
    #[error("{request}: malformed response: {reason}")]
    Protocol { request: String, reason: String },
}

// ---------------------------------------------------------------------------
// RemoteClient
// ---------------------------------------------------------------------------

/// Remote-control capability consumed by the recognition worker.
#[async_trait]
pub trait RemoteClient: Send {
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Best effort.  Calling it while disconnected does nothing.
    async fn disconnect(&mut self);

    async fn start_recording(&mut self) -> Result<(), ActionError>;
    async fn stop_recording(&mut self) -> Result<(), ActionError>;
    async fn start_buffer(&mut self) -> Result<(), ActionError>;
    async fn stop_buffer(&mut self) -> Result<(), ActionError>;
    async fn save_buffer(&mut self) -> Result<(), ActionError>;

    /// Run the named action identified by `action`.
    async fn execute(&mut self, action: RemoteAction) -> Result<(), ActionError> {
        match action {
            RemoteAction::StartRecording => self.start_recording().await,
            RemoteAction::StopRecording => self.stop_recording().await,
            RemoteAction::StartBuffer => self.start_buffer().await,
            RemoteAction::StopBuffer => self.stop_buffer().await,
            RemoteAction::SaveBuffer => self.save_buffer().await,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingClient  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use recording::RecordingClient;


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_routes_to_named_action() {
        let mut client = RecordingClient::new();
        for action in [
            RemoteAction::SaveBuffer,
            RemoteAction::StartRecording,
            RemoteAction::StopBuffer,
        ] {
            client.execute(action).await.unwrap();
        }
        assert_eq!(
            client.actions(),
            vec!["save_buffer", "start_recording", "stop_buffer"]
        );
    }

    #[test]
    fn connection_error_converts_into_action_error() {
        let err: ActionError = ConnectionError::AuthenticationFailed.into();
        assert!(matches!(err, ActionError::Connection(_)));
        assert!(err.to_string().contains("authentication"));
    }
}

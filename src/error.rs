use thiserror::Error;
use tokio::time::error::Elapsed;

use crate::client::SessionState;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if the host is down or behind a firewall, or the connect
    /// attempt did not finish in time.
    #[error("host cannot be reached")]
    Connect(#[source] std::io::Error),
    /// The server answered the auth packet with request id -1.
    #[error("bad password")]
    AuthRejected,
    /// Returned if the declared length of a frame is out of bounds.
    #[error("malformed frame: declared length {length} is out of bounds")]
    MalformedFrame { length: i32 },
    /// The peer closed the connection before a whole frame arrived.
    #[error("truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },
    /// Internal error used if the stream was successfully established, but
    /// there was a problem writing to the socket.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// Internal error used if the stream was successfully established, but
    /// there was a problem reading from the socket.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    /// Returned if the server did not respond in time.
    #[error("timeout")]
    TimeoutError(#[from] Elapsed),
    /// The session is not in a state that allows the requested operation.
    #[error("session is {0:?}, cannot run this operation")]
    NotReady(SessionState),
    /// The local responder could not bind its listening socket.
    #[error("cannot bind listener")]
    BindError(#[source] std::io::Error),
}

impl RconError {
    /// Frame-level decode failures. A fresh session may be worth one more try.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            RconError::MalformedFrame { .. } | RconError::TruncatedFrame { .. }
        )
    }
}

/// Failure to load the target list.
#[derive(Error, Debug)]
pub enum TargetsError {
    #[error("cannot read targets file")]
    Io(#[from] std::io::Error),
    #[error("targets file is not valid json")]
    Json(#[from] serde_json::Error),
}

//! Error types for the session layer.

use spacemux_protocol::{ProtocolError, RemoteError, RequestId};

/// Errors returned synchronously by [`Mux`](crate::Mux) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The frame could not be encoded. This is a caller bug: an argument
    /// of the wrong type, or a malformed method/channel name.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session driver has stopped, either after
    /// [`Mux::close`](crate::Mux::close) or after giving up on reconnecting.
    #[error("session is closed")]
    Closed,
}

/// Ways a request can end without a successful reply.
///
/// Transport failures never show up here directly: a request issued while
/// the connection is down waits in the outbound queue and is sent after the
/// next handshake.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The peer answered with `(error message args...)`.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The request was evicted from the pending table after outliving the
    /// configured request timeout.
    #[error("request {0} timed out")]
    Timeout(RequestId),

    /// The request frame was dropped from a full outbound queue before it
    /// could be sent.
    #[error("request {0} dropped from a full outbound queue")]
    QueueOverflow(RequestId),

    /// The session stopped before a reply arrived.
    #[error("session closed before the request was answered")]
    SessionClosed,
}

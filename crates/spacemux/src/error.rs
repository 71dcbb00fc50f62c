//! Unified error type for the Spacemux client.

use spacemux_protocol::ProtocolError;
use spacemux_session::{RequestError, SessionError};
use spacemux_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `spacemux` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// conversions let `?` lift sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SpacemuxError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A wire-level error (malformed frame, bad argument).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session rejected an operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A request ended without a successful reply.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The page origin or endpoint could not be parsed.
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// The origin's scheme has no WebSocket counterpart.
    #[error("unsupported scheme `{0}`, expected http, https, ws or wss")]
    UnsupportedScheme(String),

    /// The builder was given neither an origin nor an endpoint.
    #[error("no endpoint configured")]
    MissingEndpoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let spacemux_err: SpacemuxError = err.into();
        assert!(matches!(spacemux_err, SpacemuxError::Transport(_)));
        assert!(spacemux_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidSymbol("two words".into());
        let spacemux_err: SpacemuxError = err.into();
        assert!(matches!(spacemux_err, SpacemuxError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let spacemux_err: SpacemuxError = SessionError::Closed.into();
        assert!(matches!(spacemux_err, SpacemuxError::Session(_)));
    }

    #[test]
    fn test_from_request_error() {
        let spacemux_err: SpacemuxError = RequestError::SessionClosed.into();
        assert!(matches!(spacemux_err, SpacemuxError::Request(_)));
    }

    #[test]
    fn test_from_url_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let spacemux_err: SpacemuxError = err.into();
        assert!(spacemux_err.to_string().starts_with("invalid endpoint"));
    }
}

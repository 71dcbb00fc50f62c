//! Session types: configuration, connection state, and space identity.
//!
//! A "session" is the client's single long-lived attachment to a space
//! process. The same session survives reconnects; these types describe
//! what it is configured to do, where it is in its lifecycle, and who the
//! space process says we are.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spacemux_protocol::Value;

// ---------------------------------------------------------------------------
// MuxConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Sensible defaults are provided; create one with `MuxConfig::default()`
/// and override just the fields you care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Connection attempts allowed before the session gives up for good.
    /// The counter resets after every successful handshake.
    ///
    /// Default: 10.
    pub max_reconnect_attempts: u32,

    /// Fixed wait between a lost connection and the next attempt.
    ///
    /// Default: 3 seconds.
    pub reconnect_delay: Duration,

    /// Age after which an unanswered request may be evicted.
    ///
    /// Default: 60 seconds.
    pub request_timeout: Duration,

    /// Pending-table size above which a registration triggers a sweep for
    /// timed-out requests.
    ///
    /// Default: 1000.
    pub pending_high_water: usize,

    /// Frames held while disconnected. When full, the oldest frame is
    /// dropped.
    ///
    /// Default: 1024.
    pub max_outbound_queue: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            reconnect_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(60),
            pending_high_water: 1000,
            max_outbound_queue: 1024,
        }
    }
}

impl MuxConfig {
    /// Fixes any out-of-range values so the config is safe to use.
    ///
    /// Called by [`Mux::connect`](crate::Mux::connect). Every count must be
    /// at least 1.
    pub fn validated(mut self) -> Self {
        if self.max_reconnect_attempts == 0 {
            tracing::warn!("max_reconnect_attempts is 0, using 1");
            self.max_reconnect_attempts = 1;
        }
        if self.pending_high_water == 0 {
            tracing::warn!("pending_high_water is 0, using 1");
            self.pending_high_water = 1;
        }
        if self.max_outbound_queue == 0 {
            tracing::warn!("max_outbound_queue is 0, using 1");
            self.max_outbound_queue = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// MuxState
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///   Connecting ──(did-hello)──→ Open ──(lost)──→ Reconnecting { attempt }
///       │                        ↑                   │        │
///       │                        └────(did-hello)────┘        │
///       └──(lost)──→ Reconnecting                    (ceiling reached)
///                                                             ↓
///                                                           Failed
/// ```
///
/// `Failed` is terminal: the host application has to start over (reload,
/// re-authenticate). `Closed` is the terminal state after an explicit
/// [`Mux::close`](crate::Mux::close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    /// First connection attempt and handshake.
    Connecting,
    /// Handshake complete; frames go straight to the wire.
    Open,
    /// The connection was lost; `attempt` counts failures since the last
    /// successful handshake.
    Reconnecting { attempt: u32 },
    /// Gave up after too many failed attempts.
    Failed,
    /// Shut down on request.
    Closed,
}

impl MuxState {
    /// Returns `true` once the handshake has completed on the current
    /// connection.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` for states the session never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting { attempt } => write!(f, "reattaching {attempt}"),
            Self::Failed => write!(f, "can not attach to space process"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// SpaceIdentity
// ---------------------------------------------------------------------------

/// What the space process told us in `did-hello`.
///
/// `client_id` and `process_id` are refreshed on every handshake. The user,
/// space, and space name come from the first handshake only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceIdentity {
    pub client_id: Option<String>,
    pub process_id: Option<String>,
    /// Descriptor of the signed-in user (a dictionary).
    pub user: Option<Value>,
    /// Descriptor of the attached space (a dictionary).
    pub space: Option<Value>,
    pub space_name: Option<String>,
}

impl SpaceIdentity {
    /// Returns `true` if the current user owns the current space, i.e.
    /// both descriptors carry the same `uuid`.
    pub fn is_owner(&self) -> bool {
        let user = self.user.as_ref().and_then(|u| u.get("uuid"));
        let space = self.space.as_ref().and_then(|s| s.get("uuid"));
        matches!((user, space), (Some(u), Some(s)) if u == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(uuid: &str) -> Value {
        Value::Dict([("uuid".to_string(), Value::from(uuid))].into_iter().collect())
    }

    #[test]
    fn test_mux_config_default() {
        let config = MuxConfig::default();
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.pending_high_water, 1000);
    }

    #[test]
    fn test_mux_config_validated_clamps_zero_counts() {
        let config = MuxConfig {
            max_reconnect_attempts: 0,
            pending_high_water: 0,
            max_outbound_queue: 0,
            ..MuxConfig::default()
        }
        .validated();
        assert_eq!(config.max_reconnect_attempts, 1);
        assert_eq!(config.pending_high_water, 1);
        assert_eq!(config.max_outbound_queue, 1);
    }

    #[test]
    fn test_mux_state_display_matches_status_strings() {
        assert_eq!(
            MuxState::Reconnecting { attempt: 3 }.to_string(),
            "reattaching 3"
        );
        assert_eq!(
            MuxState::Failed.to_string(),
            "can not attach to space process"
        );
    }

    #[test]
    fn test_mux_state_terminal() {
        assert!(MuxState::Failed.is_terminal());
        assert!(MuxState::Closed.is_terminal());
        assert!(!MuxState::Reconnecting { attempt: 1 }.is_terminal());
        assert!(MuxState::Open.is_open());
    }

    #[test]
    fn test_is_owner_compares_uuids() {
        let mut identity = SpaceIdentity {
            user: Some(descriptor("u1")),
            space: Some(descriptor("u1")),
            ..SpaceIdentity::default()
        };
        assert!(identity.is_owner());

        identity.space = Some(descriptor("s9"));
        assert!(!identity.is_owner());

        identity.space = None;
        assert!(!identity.is_owner());
    }
}

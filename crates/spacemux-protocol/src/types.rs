//! Message types that travel on the wire.
//!
//! Inbound frames are classified into [`Inbound`] by method name. Outbound
//! frames are built as [`Outbound`] and rendered by the codec.

use std::fmt;
use std::str::FromStr;

use crate::Value;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A top-level frame: `(method arg...)`.
///
/// Built fresh for every inbound frame and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub method: String,
    pub args: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Correlation id of an outbound request, rendered as `req-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("req-")
            .and_then(|n| n.parse().ok())
            .map(RequestId)
            .ok_or(())
    }
}

/// Who a `notify` frame is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every member of the channel (`*` on the wire).
    All,
    /// One member, by id.
    Member(String),
}

/// `"*"` means everyone; anything else names one member.
impl From<&str> for Recipient {
    fn from(to: &str) -> Self {
        if to == "*" {
            Self::All
        } else {
            Self::Member(to.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A frame received from the space process, classified by method.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `(did-hello client-id process-id payload)`: handshake accepted.
    DidHello {
        client_id: Value,
        process_id: Value,
        payload: Value,
    },
    /// `(did-request request-id result)`: reply to an earlier request.
    DidRequest { request_id: Value, result: Value },
    /// `(on-notify event args)`: push notification.
    ///
    /// A list argument is spread into `args`; a missing argument gives no
    /// args; any other value becomes the single arg.
    OnNotify { event: String, args: Vec<Value> },
    /// `(keep-alive)`: liveness only.
    KeepAlive,
    /// Anything else. Kept so the session can log it.
    Unknown(Message),
}

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg.method.as_str() {
            "did-hello" => {
                let mut args = msg.args.into_iter();
                Self::DidHello {
                    client_id: args.next().unwrap_or_default(),
                    process_id: args.next().unwrap_or_default(),
                    payload: args.next().unwrap_or_default(),
                }
            }
            "did-request" => {
                let mut args = msg.args.into_iter();
                Self::DidRequest {
                    request_id: args.next().unwrap_or_default(),
                    result: args.next().unwrap_or_default(),
                }
            }
            "on-notify" => {
                let event = msg.args.first().and_then(|e| e.to_text()).map(|e| e.into_owned());
                let Some(event) = event else {
                    return Self::Unknown(msg);
                };
                let args = match msg.args.into_iter().nth(1) {
                    Some(Value::List(items)) => items,
                    None | Some(Value::Undefined) => Vec::new(),
                    Some(other) => vec![other],
                };
                Self::OnNotify { event, args }
            }
            "keep-alive" => Self::KeepAlive,
            _ => Self::Unknown(msg),
        }
    }
}

/// A reply explicitly tagged as a failure by the peer:
/// `(error "message" extra...)`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("remote error: {message}")]
pub struct RemoteError {
    pub message: String,
    /// Elements after the message, if any.
    pub args: Vec<Value>,
}

/// Splits a `did-request` result into success or [`RemoteError`].
///
/// A result is an error iff it is a non-empty list whose head is the string
/// `error`. The message is the second element (`"Unknown"` when absent).
pub fn classify_reply(result: Value) -> Result<Value, RemoteError> {
    let is_error = matches!(
        result.as_list(),
        Some([head, ..]) if head.as_str() == Some("error")
    );
    if !is_error {
        return Ok(result);
    }
    let Value::List(items) = result else {
        return Ok(result);
    };
    let mut items = items.into_iter().skip(1);
    let message = match items.next() {
        Some(m) => m.to_text().map(|t| t.into_owned()).unwrap_or_else(|| m.to_wire()),
        None => "Unknown".to_string(),
    };
    Err(RemoteError {
        message,
        args: items.collect(),
    })
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A frame the client sends to the space process.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// `(hello)`: opens the handshake on every new connection.
    Hello,
    /// `(notify channel recipient arg...)`
    Notify {
        channel: String,
        recipient: Recipient,
        args: Vec<Value>,
    },
    /// `(request "req-N" issued-at body)` where `body` is an already
    /// rendered `method arg...` string.
    Request {
        id: RequestId,
        issued_at: f64,
        body: String,
    },
}

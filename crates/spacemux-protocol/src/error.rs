//! Error types for the protocol layer.
//!
//! Decode errors are scoped to a single frame: the session drops the frame
//! and keeps the connection. Encode errors are caller bugs and surface
//! synchronously from `notify`/`request`.

/// Errors that can occur while decoding or encoding wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A list was opened but the input ended before its closing `)`,
    /// or a `)` appeared where a value was expected.
    ///
    /// `offset` is the byte position where the problem was detected.
    #[error("malformed list at byte {offset}")]
    MalformedList { offset: usize },

    /// A quoted string ran off the end of the input, or used an escape
    /// other than `\t`, `\n`, `\r`, `\"`, `\\`.
    #[error("malformed string at byte {offset}")]
    MalformedString { offset: usize },

    /// An outbound argument cannot be rendered on the wire.
    ///
    /// Only numbers (finite), booleans, and strings are valid message
    /// arguments. `index` is the position in the argument slice and
    /// `kind` names the offending value's type.
    #[error("invalid argument #{index}: {kind} cannot be sent as a message argument")]
    InvalidArgumentType { index: usize, kind: &'static str },

    /// A method or channel name is empty or contains whitespace, a paren,
    /// or a quote. These names are written unquoted.
    #[error("invalid method or channel name: {0:?}")]
    InvalidSymbol(String),
}

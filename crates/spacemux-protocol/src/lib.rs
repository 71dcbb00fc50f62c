//! Wire protocol for Spacemux.
//!
//! This crate defines the "language" the client and the space process
//! speak: one S-expression per frame.
//!
//! - **Values** ([`Value`]): the decoded grammar: numbers, booleans,
//!   `undefined`, strings, lists, and dictionaries.
//! - **Parser** ([`decode`]): text to [`Value`], with the dictionary
//!   coercion rule applied on every level.
//! - **Codec** ([`decode_message`], [`encode`]): whole frames to and from
//!   [`Inbound`] / [`Outbound`].
//! - **Errors** ([`ProtocolError`]): what can go wrong on either side.
//!
//! # Architecture
//!
//! ```text
//! Transport (text frames) → Protocol (Inbound/Outbound) → Session (routing)
//! ```
//!
//! Nothing here does I/O.

mod codec;
mod error;
mod parser;
mod types;
mod value;

pub use codec::{HELLO, decode_inbound, decode_message, encode, encode_request, encode_request_body};
pub use error::ProtocolError;
pub use parser::{Decoded, MAX_DEPTH, decode};
pub use types::{Inbound, Message, Outbound, Recipient, RemoteError, RequestId, classify_reply};
pub use value::Value;

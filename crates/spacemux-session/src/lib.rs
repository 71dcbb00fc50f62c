//! Session layer for Spacemux.
//!
//! This crate keeps one logical session attached to a space process:
//!
//! 1. **Connection lifecycle**: handshake, transparent reconnects with a
//!    fixed delay and an attempt ceiling ([`Mux`], [`MuxState`])
//! 2. **Request correlation**: every request gets a `req-N` id and its
//!    reply is routed back to the caller's [`PendingReply`]
//! 3. **Event fan-out**: pushed notifications and session events reach
//!    every subscriber ([`Dispatcher`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Entity cache / application (above)  ← request(), on(), notify()
//!     ↕
//! Session Layer (this crate)          ← one driver task per session
//!     ↕
//! Protocol + Transport (below)        ← wire values, text frames
//! ```

mod dispatch;
mod driver;
mod error;
mod mux;
mod pending;
mod session;

pub use dispatch::{Callback, Dispatcher, ReceiverId};
pub use error::{RequestError, SessionError};
pub use mux::{Mux, PendingReply};
pub use session::{MuxConfig, MuxState, SpaceIdentity};

//! # Spacemux
//!
//! Client multiplexer for collaborative space processes.
//!
//! Spacemux keeps one duplex connection to a space process and shares it
//! between any number of local consumers. It speaks the compact
//! S-expression wire format, correlates requests with their replies,
//! reattaches transparently after a lost connection, and fans pushed
//! notifications out to subscribers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spacemux::prelude::*;
//!
//! # async fn run() -> Result<(), SpacemuxError> {
//! let client = SpaceClient::builder()
//!     .origin("https://space.example.com")
//!     .connect()?;
//!
//! let me = client.receiver();
//! client.on("did-post", me, |args| println!("new post: {args:?}"));
//!
//! if let Some(user) = client.get_user_info("u1", false).value().await {
//!     println!("{user}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{DEFAULT_MUX_PATH, SpaceClient, SpaceClientBuilder, UserDirectory, endpoint_url};
pub use error::SpacemuxError;

pub use spacemux_cache as cache;
pub use spacemux_protocol as protocol;
pub use spacemux_session as session;
pub use spacemux_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{SpaceClient, SpaceClientBuilder, SpacemuxError, endpoint_url};
    pub use spacemux_cache::{CacheConfig, Lookup};
    pub use spacemux_protocol::{Recipient, Value};
    pub use spacemux_session::{
        Mux, MuxConfig, MuxState, ReceiverId, RequestError, SessionError,
    };
}

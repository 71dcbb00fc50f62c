//! `SpaceClient` builder and the user directory.
//!
//! This is the entry point for attaching to a space process. It ties the
//! layers together: transport → protocol → session → cache.

use std::ops::Deref;

use spacemux_cache::{CacheConfig, EntityCache, Fetcher, Lookup};
use spacemux_protocol::Value;
use spacemux_session::{Mux, MuxConfig};
use spacemux_transport::{Connector, WebSocketConnector};
use url::Url;

use crate::SpacemuxError;

/// Path of the multiplexer endpoint on the space server.
pub const DEFAULT_MUX_PATH: &str = "/ws/mux";

/// Derives the WebSocket endpoint from a page origin.
///
/// `https` becomes `wss` and `http` becomes `ws`; `ws`/`wss` origins are
/// kept as they are. The host and port are kept, the path is replaced by
/// `path`, and any query or fragment is dropped.
///
/// # Errors
/// - [`SpacemuxError::Url`]: `origin` does not parse
/// - [`SpacemuxError::UnsupportedScheme`]: any other scheme
pub fn endpoint_url(origin: &str, path: &str) -> Result<Url, SpacemuxError> {
    let mut url = Url::parse(origin)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(SpacemuxError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| SpacemuxError::UnsupportedScheme(url.scheme().to_string()))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ---------------------------------------------------------------------------
// UserDirectory
// ---------------------------------------------------------------------------

/// Fetches user descriptors with `(space "find-user" id)`.
///
/// A reply counts as a user only if it is a dictionary with an `id` field;
/// anything else, including an error reply, is a failed fetch.
#[derive(Clone)]
pub struct UserDirectory {
    mux: Mux,
}

impl UserDirectory {
    pub fn new(mux: Mux) -> Self {
        Self { mux }
    }
}

impl Fetcher for UserDirectory {
    async fn fetch(&self, user_id: &str) -> Option<Value> {
        let args = [Value::from("find-user"), Value::from(user_id)];
        let reply = match self.mux.request("space", &args) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "find-user not sent");
                return None;
            }
        };
        match reply.await {
            Ok(user) if user.get("id").is_some_and(|id| !id.is_undefined()) => Some(user),
            Ok(other) => {
                tracing::debug!(user_id, reply = %other, "find-user returned no user");
                None
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "find-user failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SpaceClientBuilder
// ---------------------------------------------------------------------------

/// Builder for attaching a [`SpaceClient`].
///
/// # Example
///
/// ```rust,no_run
/// use spacemux::prelude::*;
///
/// # async fn run() -> Result<(), SpacemuxError> {
/// let client = SpaceClient::builder()
///     .origin("https://space.example.com")
///     .connect()?;
/// let reply = client.request("space", &[Value::from("list-members")])?.await?;
/// # let _ = reply;
/// # Ok(())
/// # }
/// ```
pub struct SpaceClientBuilder {
    origin: Option<String>,
    endpoint: Option<String>,
    path: String,
    mux_config: MuxConfig,
    cache_config: CacheConfig,
}

impl SpaceClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            origin: None,
            endpoint: None,
            path: DEFAULT_MUX_PATH.to_string(),
            mux_config: MuxConfig::default(),
            cache_config: CacheConfig::default(),
        }
    }

    /// Sets the page origin the endpoint is derived from, e.g.
    /// `https://space.example.com`.
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    /// Overrides the endpoint path. Default: [`DEFAULT_MUX_PATH`].
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Uses `url` as the WebSocket endpoint as given, ignoring the origin.
    pub fn endpoint(mut self, url: &str) -> Self {
        self.endpoint = Some(url.to_string());
        self
    }

    /// Sets the session configuration.
    pub fn mux_config(mut self, config: MuxConfig) -> Self {
        self.mux_config = config;
        self
    }

    /// Sets the user-cache configuration.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Resolves the endpoint and starts the session over WebSocket.
    ///
    /// Returns as soon as the session driver is running; listen for
    /// `ready` to learn when the handshake completes. Must be called from
    /// within a Tokio runtime.
    pub fn connect(self) -> Result<SpaceClient, SpacemuxError> {
        let url = match (self.endpoint, self.origin) {
            (Some(endpoint), _) => Url::parse(&endpoint)?,
            (None, Some(origin)) => endpoint_url(&origin, &self.path)?,
            (None, None) => return Err(SpacemuxError::MissingEndpoint),
        };
        tracing::info!(%url, "attaching to space process");
        let connector = WebSocketConnector::new(url.as_str());
        Ok(SpaceClient::with_connector(
            connector,
            self.mux_config,
            self.cache_config,
        ))
    }
}

impl Default for SpaceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SpaceClient
// ---------------------------------------------------------------------------

/// A session attached to a space process, plus a cache of user
/// descriptors.
///
/// Derefs to [`Mux`], so `notify`, `request`, `on`, and the identity
/// accessors are available directly.
#[derive(Clone)]
pub struct SpaceClient {
    mux: Mux,
    users: EntityCache<UserDirectory>,
}

impl SpaceClient {
    /// Creates a new builder.
    pub fn builder() -> SpaceClientBuilder {
        SpaceClientBuilder::new()
    }

    /// Starts a session over any transport.
    pub fn with_connector<C: Connector>(
        connector: C,
        mux_config: MuxConfig,
        cache_config: CacheConfig,
    ) -> Self {
        let mux = Mux::connect(connector, mux_config);
        let users = EntityCache::new(UserDirectory::new(mux.clone()), cache_config);
        Self { mux, users }
    }

    /// Looks up a user descriptor, coalescing concurrent lookups of the
    /// same id and reusing results inside the freshness window.
    ///
    /// `force` skips the cache. The lookup resolves to `None` if the user
    /// could not be found.
    pub fn get_user_info(&self, user_id: &str, force: bool) -> Lookup {
        self.users.lookup(user_id, force)
    }

    pub fn mux(&self) -> &Mux {
        &self.mux
    }

    pub fn users(&self) -> &EntityCache<UserDirectory> {
        &self.users
    }
}

impl Deref for SpaceClient {
    type Target = Mux;

    fn deref(&self) -> &Self::Target {
        &self.mux
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_https_becomes_wss() {
        let url = endpoint_url("https://space.example.com/app/index.html?x=1", DEFAULT_MUX_PATH)
            .unwrap();
        assert_eq!(url.as_str(), "wss://space.example.com/ws/mux");
    }

    #[test]
    fn test_endpoint_url_http_keeps_port() {
        let url = endpoint_url("http://127.0.0.1:8088", "/ws/mux").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8088/ws/mux");
    }

    #[test]
    fn test_endpoint_url_rejects_other_schemes() {
        assert!(matches!(
            endpoint_url("ftp://example.com", DEFAULT_MUX_PATH),
            Err(SpacemuxError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            endpoint_url("not a url", DEFAULT_MUX_PATH),
            Err(SpacemuxError::Url(_))
        ));
    }

    #[test]
    fn test_builder_without_endpoint_is_error() {
        assert!(matches!(
            SpaceClient::builder().connect(),
            Err(SpacemuxError::MissingEndpoint)
        ));
    }
}

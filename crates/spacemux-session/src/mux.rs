//! The consumer-facing session handle.
//!
//! [`Mux`] is a thin, cloneable front for the driver task. Encoding happens
//! here, on the caller's side, so argument errors come back synchronously;
//! everything that touches the connection or the pending table is sent to
//! the driver as a [`Command`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::RwLock;
use spacemux_protocol::{Outbound, Recipient, Value, encode, encode_request_body};
use spacemux_transport::Connector;
use tokio::sync::{mpsc, oneshot};

use crate::dispatch::{Dispatcher, ReceiverId};
use crate::driver::Driver;
use crate::pending::ReplySender;
use crate::{MuxConfig, MuxState, RequestError, SessionError, SpaceIdentity};

/// Commands sent from handles to the driver task.
pub(crate) enum Command {
    /// Write (or queue) an already encoded frame.
    Send(String),
    /// Allocate an id, register `reply`, and send `body` wrapped as a
    /// request frame.
    Request { body: String, reply: ReplySender },
    /// Stop the session.
    Close,
}

/// State readable from any handle without a round trip to the driver.
pub(crate) struct Shared {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) identity: RwLock<SpaceIdentity>,
    pub(crate) state: RwLock<MuxState>,
}

/// Handle to a running session.
///
/// Cheap to clone; every clone talks to the same driver task. The session
/// keeps running while at least one handle exists or until
/// [`close`](Self::close) is called.
///
/// A subscriber callback that captures a `Mux` keeps a handle alive from
/// inside the session, so dropping the outer handles no longer stops it.
/// Call [`close`](Self::close) in that case. Once the driver stops, every
/// subscription is dropped and the captured handles go with it.
#[derive(Clone)]
pub struct Mux {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Mux {
    /// Starts a session: spawns the driver task, which connects through
    /// `connector` and keeps reconnecting per `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<C: Connector>(connector: C, config: MuxConfig) -> Self {
        let shared = Arc::new(Shared {
            dispatcher: Dispatcher::new(),
            identity: RwLock::new(SpaceIdentity::default()),
            state: RwLock::new(MuxState::Connecting),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver::new(connector, config.validated(), Arc::clone(&shared), rx);
        tokio::spawn(driver.run());
        Self {
            shared,
            commands: tx,
        }
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    /// Sends `args` on `channel` to `recipient` (`"*"` or
    /// [`Recipient::All`] for everyone). Fire and forget.
    ///
    /// # Errors
    /// - [`SessionError::Protocol`]: bad channel name or argument type
    /// - [`SessionError::Closed`]: the session has stopped
    pub fn notify(
        &self,
        channel: &str,
        recipient: impl Into<Recipient>,
        args: &[Value],
    ) -> Result<(), SessionError> {
        let frame = encode(&Outbound::Notify {
            channel: channel.to_string(),
            recipient: recipient.into(),
            args: args.to_vec(),
        })?;
        self.send(Command::Send(frame))
    }

    /// Sends `args` on `channel` to every member.
    pub fn notify_all(&self, channel: &str, args: &[Value]) -> Result<(), SessionError> {
        self.notify(channel, Recipient::All, args)
    }

    /// Issues `(method args...)` as a request and returns a future for the
    /// reply.
    ///
    /// The request is registered as soon as this returns, whether or not
    /// the future is ever polled. While disconnected the frame waits in the
    /// outbound queue.
    ///
    /// # Errors
    /// - [`SessionError::Protocol`]: bad method name or argument type
    /// - [`SessionError::Closed`]: the session has stopped
    pub fn request(&self, method: &str, args: &[Value]) -> Result<PendingReply, SessionError> {
        let body = encode_request_body(method, args)?;
        self.send_request_string(body)
    }

    /// Issues a request whose `method args...` body is already rendered.
    ///
    /// The body goes on the wire as given.
    pub fn send_request_string(
        &self,
        body: impl Into<String>,
    ) -> Result<PendingReply, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Request {
            body: body.into(),
            reply,
        })?;
        Ok(PendingReply { rx })
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    // -----------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------

    /// Allocates a receiver identity for use with [`on`](Self::on) and
    /// [`off`](Self::off).
    pub fn receiver(&self) -> ReceiverId {
        self.shared.dispatcher.receiver()
    }

    /// Subscribes `callback` to `event`.
    ///
    /// Besides `on-notify` events pushed by the peer, the session itself
    /// dispatches `ready`, `reattached`, and `mux-state` (one string
    /// argument describing the connection).
    ///
    /// Callbacks run on the driver task and must not block.
    pub fn on<F>(&self, event: &str, receiver: ReceiverId, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe(event, receiver, callback);
    }

    /// Removes all of `receiver`'s subscriptions to `event`.
    pub fn off(&self, event: &str, receiver: ReceiverId) -> usize {
        self.shared.dispatcher.unsubscribe(event, receiver)
    }

    /// Removes all of `receiver`'s subscriptions.
    pub fn off_all(&self, receiver: ReceiverId) -> usize {
        self.shared.dispatcher.unsubscribe_all(receiver)
    }

    /// Delivers `event` to local subscribers only; nothing is sent.
    pub fn dispatch(&self, event: &str, args: &[Value]) -> usize {
        self.shared.dispatcher.dispatch(event, args)
    }

    // -----------------------------------------------------------------
    // State
    // -----------------------------------------------------------------

    pub fn state(&self) -> MuxState {
        *self.shared.state.read()
    }

    /// Snapshot of everything learned from the handshake.
    pub fn identity(&self) -> SpaceIdentity {
        self.shared.identity.read().clone()
    }

    pub fn client_id(&self) -> Option<String> {
        self.shared.identity.read().client_id.clone()
    }

    pub fn process_id(&self) -> Option<String> {
        self.shared.identity.read().process_id.clone()
    }

    pub fn current_user(&self) -> Option<Value> {
        self.shared.identity.read().user.clone()
    }

    pub fn current_space(&self) -> Option<Value> {
        self.shared.identity.read().space.clone()
    }

    pub fn space_name(&self) -> Option<String> {
        self.shared.identity.read().space_name.clone()
    }

    /// See [`SpaceIdentity::is_owner`].
    pub fn is_owner(&self) -> bool {
        self.shared.identity.read().is_owner()
    }

    // -----------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------

    /// Asks the driver to stop. Pending requests fail with
    /// [`RequestError::SessionClosed`], later sends return
    /// [`SessionError::Closed`], and all subscriptions are dropped.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Resolves once the driver task has stopped, whether after
    /// [`close`](Self::close) or after giving up on reconnecting.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }
}

/// Future for the reply to one request.
///
/// Dropping it does not retract the request; the reply is discarded when it
/// arrives.
#[must_use = "the reply is lost unless this is awaited"]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Value, RequestError>>,
}

impl Future for PendingReply {
    type Output = Result<Value, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(RequestError::SessionClosed)))
    }
}

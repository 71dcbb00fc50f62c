//! The session driver: one task that owns the connection.
//!
//! The driver is the only code that touches the socket, the outbound queue,
//! the pending-request table, and the reconnect counter. Handles reach it
//! through the command channel; it reaches them through the dispatcher and
//! the reply channels in the pending table.
//!
//! ```text
//!        ┌──────────── connect ◄───────────────┐
//!        ▼                                     │
//!   send (hello) ──→ serve frames ──(lost)──→ backoff ──(ceiling)──→ Failed
//!                         │
//!                     (close)──→ Closed
//! ```
//!
//! Commands are accepted in every phase: while disconnected, frames are
//! queued and flushed in order after the next `did-hello`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use spacemux_protocol::{
    HELLO, Inbound, RequestId, Value, classify_reply, decode_inbound, encode_request,
};
use spacemux_transport::{Connection, Connector, TransportError};
use tokio::sync::mpsc;

use crate::mux::{Command, Shared};
use crate::pending::PendingTable;
use crate::{MuxConfig, MuxState, RequestError};

/// An encoded frame waiting for an open connection.
struct QueuedFrame {
    text: String,
    /// Set for request frames so the caller can be failed if the frame is
    /// dropped.
    request: Option<RequestId>,
}

/// Why [`Driver::serve`] returned.
enum Exit {
    /// The connection failed or the peer closed it.
    Lost,
    /// The session was asked to stop.
    Closed,
}

enum Event {
    Frame(Result<Option<String>, TransportError>),
    Command(Option<Command>),
}

pub(crate) struct Driver<C: Connector> {
    connector: Arc<C>,
    config: MuxConfig,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: PendingTable,
    queue: VecDeque<QueuedFrame>,
    /// Failed connections since the last successful handshake.
    failures: u32,
    /// Set by the first handshake; later handshakes are reattachments.
    attached: bool,
}

impl<C: Connector> Driver<C> {
    pub(crate) fn new(
        connector: C,
        config: MuxConfig,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let pending = PendingTable::new(config.pending_high_water, config.request_timeout);
        Self {
            connector: Arc::new(connector),
            config,
            shared,
            commands,
            pending,
            queue: VecDeque::new(),
            failures: 0,
            attached: false,
        }
    }

    /// Runs the session until it is closed or gives up.
    pub(crate) async fn run(mut self) {
        tracing::info!("session driver started");

        let end = loop {
            let connector = Arc::clone(&self.connector);
            let Some(connected) = self.until(connector.connect()).await else {
                break MuxState::Closed;
            };
            match connected {
                Ok(conn) => {
                    let id = conn.id();
                    tracing::debug!(%id, "connected, sending hello");
                    let exit = self.serve(&conn).await;
                    if let Err(e) = conn.close().await {
                        tracing::debug!(%id, error = %e, "close after exit failed");
                    }
                    if matches!(exit, Exit::Closed) {
                        break MuxState::Closed;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "connect failed"),
            }
            if !self.backoff().await {
                break MuxState::Failed;
            }
        };

        self.shutdown(end);
    }

    // -----------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------

    /// Drives `fut` to completion while still accepting commands.
    ///
    /// Returns `None` if the session was closed first.
    async fn until<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            let command = tokio::select! {
                out = &mut fut => return Some(out),
                command = self.commands.recv() => command,
            };
            if !self.accept(command) {
                return None;
            }
        }
    }

    /// Handshakes and then pumps frames both ways until the connection
    /// ends.
    async fn serve(&mut self, conn: &C::Connection) -> Exit {
        if let Err(e) = conn.send(HELLO).await {
            tracing::warn!(error = %e, "hello failed");
            return Exit::Lost;
        }

        let mut open = false;
        loop {
            let event = tokio::select! {
                frame = conn.recv() => Event::Frame(frame),
                command = self.commands.recv() => Event::Command(command),
            };

            match event {
                Event::Frame(Ok(Some(text))) => {
                    let Some(payload) = self.on_frame(&text) else {
                        continue;
                    };
                    open = true;
                    if self.flush(conn).await.is_err() {
                        return Exit::Lost;
                    }
                    self.attach(payload);
                }
                Event::Frame(Ok(None)) => {
                    tracing::info!(id = %conn.id(), "connection closed by peer");
                    return Exit::Lost;
                }
                Event::Frame(Err(e)) => {
                    tracing::warn!(id = %conn.id(), error = %e, "connection lost");
                    return Exit::Lost;
                }
                Event::Command(command) => {
                    if !self.accept(command) {
                        return Exit::Closed;
                    }
                    if open && self.flush(conn).await.is_err() {
                        return Exit::Lost;
                    }
                }
            }
        }
    }

    /// Counts a failure and waits out the reconnect delay.
    ///
    /// Returns `false` when the session should stop: the attempt ceiling
    /// was reached, or it was closed while waiting.
    async fn backoff(&mut self) -> bool {
        self.failures += 1;
        let attempt = self.failures;

        if attempt >= self.config.max_reconnect_attempts {
            tracing::error!(attempts = attempt, "can not attach to space process, giving up");
            self.set_state(MuxState::Failed);
            return false;
        }

        tracing::warn!(
            attempt,
            delay_ms = self.config.reconnect_delay.as_millis() as u64,
            "reattaching"
        );
        self.set_state(MuxState::Reconnecting { attempt });
        self.until(tokio::time::sleep(self.config.reconnect_delay))
            .await
            .is_some()
    }

    /// Fails everything still outstanding, publishes the final state, and
    /// releases the subscriptions along with any handles they captured.
    fn shutdown(&mut self, end: MuxState) {
        let dropped = self.queue.len();
        self.queue.clear();
        self.pending.fail_all(|| RequestError::SessionClosed);
        if end == MuxState::Closed {
            self.set_state(end);
        }
        let subscriptions = self.shared.dispatcher.clear();
        tracing::info!(state = %end, dropped, subscriptions, "session driver stopped");
    }

    // -----------------------------------------------------------------
    // Commands and the outbound queue
    // -----------------------------------------------------------------

    /// Applies one command. Returns `false` if the session should stop.
    fn accept(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Send(text)) => {
                self.push(QueuedFrame {
                    text,
                    request: None,
                });
                true
            }
            Some(Command::Request { body, reply }) => {
                let id = self.pending.allocate();
                self.pending.register(id, reply);
                let text = encode_request(id, issued_at(), &body);
                tracing::debug!(%id, pending = self.pending.len(), "request issued");
                self.push(QueuedFrame {
                    text,
                    request: Some(id),
                });
                true
            }
            Some(Command::Close) => {
                tracing::info!("close requested");
                false
            }
            // Every handle is gone; nobody can observe the session anymore.
            None => false,
        }
    }

    fn push(&mut self, frame: QueuedFrame) {
        if self.queue.len() >= self.config.max_outbound_queue {
            if let Some(dropped) = self.queue.pop_front() {
                tracing::warn!(
                    limit = self.config.max_outbound_queue,
                    "outbound queue full, dropping oldest frame"
                );
                if let Some(id) = dropped.request {
                    self.pending.resolve(id, Err(RequestError::QueueOverflow(id)));
                }
            }
        }
        self.queue.push_back(frame);
    }

    /// Writes queued frames in order. A frame leaves the queue only once
    /// it has been written.
    async fn flush(&mut self, conn: &C::Connection) -> Result<(), TransportError> {
        while let Some(frame) = self.queue.front() {
            if let Err(e) = conn.send(&frame.text).await {
                tracing::warn!(
                    error = %e,
                    queued = self.queue.len(),
                    "write failed, keeping frame for the next connection"
                );
                return Err(e);
            }
            tracing::trace!(frame = %frame.text, "sent");
            self.queue.pop_front();
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Inbound frames
    // -----------------------------------------------------------------

    /// Handles one inbound frame. Returns the handshake payload when the
    /// frame was `did-hello`; the caller finishes the handshake.
    fn on_frame(&mut self, text: &str) -> Option<Value> {
        tracing::trace!(frame = %text, "received");
        let inbound = match decode_inbound(text) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                tracing::warn!(frame = %text, "dropping frame that is not a message");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return None;
            }
        };

        match inbound {
            Inbound::DidHello {
                client_id,
                process_id,
                payload,
            } => {
                {
                    let mut identity = self.shared.identity.write();
                    identity.client_id = client_id.to_text().map(|t| t.into_owned());
                    identity.process_id = process_id.to_text().map(|t| t.into_owned());
                }
                self.failures = 0;
                self.set_state(MuxState::Open);
                return Some(payload);
            }
            Inbound::DidRequest { request_id, result } => self.on_reply(request_id, result),
            Inbound::OnNotify { event, args } => {
                self.shared.dispatcher.dispatch(&event, &args);
            }
            Inbound::KeepAlive => {}
            Inbound::Unknown(msg) => {
                tracing::debug!(method = %msg.method, "ignoring unsupported message");
            }
        }
        None
    }

    fn on_reply(&mut self, request_id: Value, result: Value) {
        let Some(id) = request_id.as_str().and_then(|s| s.parse::<RequestId>().ok()) else {
            tracing::warn!(request_id = %request_id, "reply with unusable request id");
            return;
        };
        let result = classify_reply(result).map_err(RequestError::from);
        if !self.pending.resolve(id, result) {
            tracing::debug!(%id, "no matched request for reply");
        }
    }

    /// Completes a handshake after the queue has been flushed.
    fn attach(&mut self, payload: Value) {
        if self.attached {
            tracing::info!("reattached to space process");
            self.shared
                .dispatcher
                .dispatch("mux-state", &[Value::from("reattached")]);
            self.shared.dispatcher.dispatch("reattached", &[]);
            return;
        }

        let mut parts = match payload {
            Value::List(items) => items.into_iter(),
            _ => Vec::new().into_iter(),
        };
        {
            let mut identity = self.shared.identity.write();
            identity.user = parts.next().filter(|v| !v.is_undefined());
            identity.space = parts.next().filter(|v| !v.is_undefined());
            identity.space_name = parts
                .next()
                .and_then(|v| v.to_text().map(|t| t.into_owned()));
        }
        self.attached = true;
        tracing::info!(client_id = ?self.shared.identity.read().client_id, "attached to space process");
        self.shared.dispatcher.dispatch("ready", &[]);
    }

    /// Publishes a state change. States with a status string are also
    /// dispatched as `mux-state`.
    fn set_state(&self, state: MuxState) {
        *self.shared.state.write() = state;
        if matches!(state, MuxState::Reconnecting { .. } | MuxState::Failed) {
            self.shared
                .dispatcher
                .dispatch("mux-state", &[Value::from(state.to_string())]);
        }
    }
}

/// Wall-clock issue time in seconds, as carried in request frames.
fn issued_at() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

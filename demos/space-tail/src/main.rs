//! Attaches to a space process and logs every event it pushes.
//!
//! ```text
//! space-tail [ORIGIN] [EVENT...]
//! ```
//!
//! `ORIGIN` is the page origin of the space server (default
//! `http://127.0.0.1:8088`). Each `EVENT` is an `on-notify` event name to
//! tail (default `did-post`). Set `RUST_LOG` to change verbosity.

use std::sync::Arc;

use spacemux::prelude::*;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8088";

#[tokio::main]
async fn main() -> Result<(), SpacemuxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let origin = args.next().unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    let mut events: Vec<String> = args.collect();
    if events.is_empty() {
        events.push("did-post".to_string());
    }

    let client = SpaceClient::builder().origin(&origin).connect()?;
    let me = client.receiver();

    let ready = Arc::new(Notify::new());
    {
        let ready = Arc::clone(&ready);
        client.on("ready", me, move |_| ready.notify_one());
    }
    client.on("mux-state", me, |args| {
        let status = args.first().and_then(|s| s.as_str()).unwrap_or("?");
        tracing::info!(status, "connection state");
    });
    for event in &events {
        let name = event.clone();
        client.on(event, me, move |args| {
            let rendered: Vec<String> = args.iter().map(Value::to_wire).collect();
            tracing::info!(event = %name, args = %rendered.join(" "), "push");
        });
    }

    tokio::select! {
        _ = ready.notified() => {}
        _ = client.closed() => {
            tracing::error!(state = %client.state(), "session ended before the handshake");
            return Ok(());
        }
    }

    tracing::info!(
        space = client.space_name().as_deref().unwrap_or("?"),
        client_id = client.client_id().as_deref().unwrap_or("?"),
        owner = client.is_owner(),
        tailing = %events.join(","),
        "attached"
    );
    let user_id = client
        .current_user()
        .and_then(|u| u.get("uuid").and_then(|id| id.to_text()).map(|id| id.into_owned()));
    if let Some(user_id) = user_id {
        match client.get_user_info(&user_id, false).value().await {
            Some(user) => tracing::info!(%user, "signed in as"),
            None => tracing::warn!(%user_id, "could not look up the signed-in user"),
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, closing");
            client.close();
            client.closed().await;
        }
        _ = client.closed() => {
            tracing::error!(state = %client.state(), "session ended");
        }
    }
    client.off_all(me);
    Ok(())
}

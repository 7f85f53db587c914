//! TCP accept loop: binds the configured address, enforces at-most-one
//! connected client, and wires the wire framer, the dispatcher, and the
//! coordinator's event stream together for whichever client is currently
//! attached.
//!
//! A single listener accepts connections one at a time; a new connection
//! aborts whichever client task was previously serving the socket, since
//! this engine models exactly one attached script session.

use crate::coordinator::{Coordinator, DebugEvent, StopReason};
use crate::dispatch::Dispatcher;
use crate::protocol::{Event, InboundMessage};
use crate::wire::{self, Framer};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Runs the DAP TCP server until the process is killed. Binds once; every
/// new client connection takes over from (and aborts) whichever client was
/// previously attached, since this engine models exactly one script session.
///
/// # Errors
///
/// Returns an error if the configured address cannot be bound.
#[instrument(level = "info", skip(coordinator, events_rx))]
pub async fn run(
    bind_address: std::net::SocketAddr,
    coordinator: Arc<Coordinator>,
    events_rx: mpsc::UnboundedReceiver<DebugEvent>,
) -> anyhow::Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&coordinator)));
    let listener = TcpListener::bind(bind_address).await?;
    info!(%bind_address, "DAP server listening");

    let events_rx = Arc::new(Mutex::new(events_rx));
    let mut current_client: Option<JoinHandle<()>> = None;

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "client connected");

        if let Some(handle) = current_client.take() {
            debug!("dropping previous client connection for the new one");
            handle.abort();
        }

        let dispatcher = Arc::clone(&dispatcher);
        let events_rx = Arc::clone(&events_rx);
        current_client = Some(tokio::spawn(async move {
            if let Err(err) = serve_client(stream, dispatcher, events_rx).await {
                warn!(%peer, %err, "client session ended with an error");
            } else {
                info!(%peer, "client disconnected");
            }
        }));
    }
}

async fn serve_client(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    events_rx: Arc<Mutex<mpsc::UnboundedReceiver<DebugEvent>>>,
) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut framer = Framer::new();
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            read_result = reader.read(&mut buf) => {
                let n = read_result?;
                if n == 0 {
                    return Ok(());
                }
                framer.feed(&buf[..n]);
                for value in framer.poll_messages() {
                    let Ok(msg) = serde_json::from_value::<InboundMessage>(value) else {
                        warn!("dropping request that did not match the inbound message shape");
                        continue;
                    };
                    let response = dispatcher.handle(msg).await;
                    writer.write_all(&wire::encode(&response)).await?;
                }
            }
            event = async { events_rx.lock().await.recv().await } => {
                let Some(event) = event else {
                    continue;
                };
                let message = to_dap_event(dispatcher.next_seq(), event);
                writer.write_all(&wire::encode(&message)).await?;
            }
        }
    }
}

fn to_dap_event(seq: i64, event: DebugEvent) -> Event {
    match event {
        DebugEvent::Stopped { reason, hit_breakpoint_ids, description } => Event::new(
            seq,
            "stopped",
            Some(serde_json::json!({
                "reason": stop_reason_text(reason),
                "threadId": 1,
                "hitBreakpointIds": hit_breakpoint_ids,
                "description": description,
                "allThreadsStopped": true,
            })),
        ),
        DebugEvent::Continued => {
            Event::new(seq, "continued", Some(serde_json::json!({ "threadId": 1, "allThreadsContinued": true })))
        }
        DebugEvent::Output { category, text, file, line } => Event::new(
            seq,
            "output",
            Some(serde_json::json!({
                "category": category,
                "output": text,
                "source": file.map(|f| serde_json::json!({ "path": f })),
                "line": line,
            })),
        ),
        DebugEvent::Reloaded => Event::new(seq, "reloaded", None),
        DebugEvent::Initialized => Event::new(seq, "initialized", None),
        DebugEvent::Terminated => Event::new(seq, "terminated", None),
    }
}

fn stop_reason_text(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Step => "step",
        StopReason::Breakpoint => "breakpoint",
        StopReason::FunctionBreakpoint => "function breakpoint",
        StopReason::Exception => "exception",
        StopReason::Pause => "pause",
        StopReason::Goto => "goto",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_text_matches_dap_vocabulary() {
        assert_eq!(stop_reason_text(StopReason::Breakpoint), "breakpoint");
        assert_eq!(stop_reason_text(StopReason::FunctionBreakpoint), "function breakpoint");
    }

    #[test]
    fn reloaded_event_carries_no_body() {
        let event = to_dap_event(1, DebugEvent::Reloaded);
        assert!(event.body.is_none());
    }
}

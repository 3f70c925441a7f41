use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use sim_proto::encode_client_message_json;
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::controller::{ControlState, ReconciliationController, UserAction};

/// Upper bound on how long the loop parks when no timer is armed.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection closed by server")]
    ClosedByPeer,
    #[error("outbound channel closed")]
    OutboundClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The channel ended; the caller may reconnect.
    Disconnected,
    /// The user asked to quit or every action sender is gone.
    Shutdown,
}

/// The viewer's single control-flow context.
///
/// Inbound frames, user actions and timer deadlines are handled one at a time
/// on the task that calls [`ViewerSession::run`], so the controller needs no
/// locking. The controller outlives individual connections; each call to
/// `run` is one connection.
pub struct ViewerSession {
    controller: ReconciliationController,
    actions: UnboundedReceiver<UserAction>,
    state_tx: watch::Sender<ControlState>,
}

impl ViewerSession {
    pub fn new(
        controller: ReconciliationController,
        actions: UnboundedReceiver<UserAction>,
    ) -> (Self, watch::Receiver<ControlState>) {
        let (state_tx, state_rx) = watch::channel(controller.state());
        (
            Self {
                controller,
                actions,
                state_tx,
            },
            state_rx,
        )
    }

    pub fn controller(&self) -> &ReconciliationController {
        &self.controller
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.state_tx.subscribe()
    }

    /// Drive one connection until it closes or the user shuts down.
    ///
    /// Whatever ends the connection, outstanding intents and timers are
    /// cleared before returning.
    pub async fn run<R, W>(&mut self, inbound: R, outbound: W) -> Result<SessionEnd, SessionError>
    where
        R: Stream<Item = Result<String, SessionError>>,
        W: Sink<String, Error = SessionError>,
    {
        tokio::pin!(inbound);
        tokio::pin!(outbound);

        self.controller.on_connect();
        let end = loop {
            if let Err(err) = self.flush(&mut outbound).await {
                break Err(err);
            }
            self.publish();

            let deadline = self.controller.next_deadline();
            let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_WAIT);
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(Ok(text)) => {
                        self.controller.handle_frame(&text);
                    }
                    Some(Err(err)) => break Err(err),
                    None => break Ok(SessionEnd::Disconnected),
                },
                action = self.actions.recv() => match action {
                    Some(UserAction::Shutdown) | None => break Ok(SessionEnd::Shutdown),
                    Some(action) => self.controller.apply_action(action, Instant::now()),
                },
                _ = sleep_until(wake_at), if deadline.is_some() => {
                    self.controller.poll_timers(Instant::now());
                }
            }
        };

        self.controller.on_disconnect();
        self.publish();
        match &end {
            Ok(reason) => info!(target: "petri::viewer", ?reason, "session.ended"),
            Err(err) => warn!(target: "petri::viewer", error = %err, "session.failed"),
        }
        end
    }

    async fn flush<W>(&mut self, outbound: &mut std::pin::Pin<&mut W>) -> Result<(), SessionError>
    where
        W: Sink<String, Error = SessionError>,
    {
        for message in self.controller.take_outbound() {
            let text = encode_client_message_json(&message)?;
            outbound.send(text).await?;
            debug!(target: "petri::viewer", kind = message.kind(), "command.sent");
        }
        Ok(())
    }

    fn publish(&self) {
        let state = self.controller.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

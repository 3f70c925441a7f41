//! WebSocket broadcast server.
//!
//! One task owns the [`ServerState`] and ticks it; every connection gets its
//! own task that forwards decoded commands over an mpsc channel and relays
//! encoded snapshots from a broadcast channel.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use sim_proto::{decode_client_message_json, encode_snapshot_json, Snapshot};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::server_state::{ServerCommand, ServerState};
use crate::simulation::SimulationSummary;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
    #[error("simulation task stopped unexpectedly")]
    Stopped,
}

/// A running server. Dropping the handle stops the simulation task without
/// writing a summary; [`ServerHandle::shutdown`] also stops accepting.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    owner: JoinHandle<SimulationSummary>,
    acceptor: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL viewers connect to.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws", self.local_addr)
    }

    /// Stop accepting, stop ticking, write the final summary and return it.
    pub async fn shutdown(self) -> Result<SimulationSummary, ServerError> {
        self.acceptor.abort();
        let _ = self.shutdown.send(());
        self.owner.await.map_err(|_| ServerError::Stopped)
    }
}

/// Bind `config.bind` and start serving.
pub async fn start_server(config: SimulationConfig) -> Result<ServerHandle, ServerError> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind,
            source,
        })?;
    serve(listener, config)
}

/// Serve on an already bound listener.
pub fn serve(listener: TcpListener, config: SimulationConfig) -> Result<ServerHandle, ServerError> {
    let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
    let (frames, _) = broadcast::channel::<String>(config.broadcast_capacity);
    let (commands, command_rx) = mpsc::unbounded_channel::<ServerCommand>();
    let (shutdown, shutdown_rx) = oneshot::channel();

    let state = ServerState::from_config(&config);
    let owner = tokio::spawn(run_simulation(
        state,
        config.clone(),
        command_rx,
        frames.clone(),
        shutdown_rx,
    ));
    let acceptor = tokio::spawn(accept_loop(listener, commands, frames));

    info!(
        target: "petri::server",
        addr = %local_addr,
        tick_hz = config.tick_hz,
        "server.listening"
    );
    Ok(ServerHandle {
        local_addr,
        shutdown,
        owner,
        acceptor,
    })
}

async fn run_simulation(
    mut state: ServerState,
    config: SimulationConfig,
    mut commands: mpsc::UnboundedReceiver<ServerCommand>,
    frames: broadcast::Sender<String>,
    mut shutdown: oneshot::Receiver<()>,
) -> SimulationSummary {
    let mut ticker = time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(command) = commands.recv() => state.handle(command),
            _ = ticker.tick() => {
                if let Some(snapshot) = state.tick() {
                    broadcast_snapshot(&frames, &snapshot);
                }
            }
        }
    }

    let summary = state.finish();
    info!(
        target: "petri::server",
        timestep = state.simulation().timestep(),
        molecules = summary.total_molecules,
        species = summary.total_species,
        "server.stopped"
    );
    summary
}

fn broadcast_snapshot(frames: &broadcast::Sender<String>, snapshot: &Snapshot) {
    match encode_snapshot_json(snapshot) {
        // No receivers only means every viewer left mid-tick.
        Ok(text) => {
            let _ = frames.send(text);
        }
        Err(err) => error!(
            target: "petri::server",
            error = %err,
            "snapshot.encode_failed"
        ),
    }
}

async fn accept_loop(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<ServerCommand>,
    frames: broadcast::Sender<String>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    warn!(target: "petri::server", %addr, error = %err, "client.nodelay_failed");
                }
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    commands.clone(),
                    frames.subscribe(),
                ));
            }
            Err(err) => {
                warn!(target: "petri::server", error = %err, "client.accept_failed");
                time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<ServerCommand>,
    mut frames: broadcast::Receiver<String>,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(err) => {
            warn!(target: "petri::server", %addr, error = %err, "client.handshake_failed");
            return;
        }
    };
    if commands.send(ServerCommand::Connected).is_err() {
        return;
    }
    let (mut sink, mut source) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        debug!(target: "petri::server", %addr, error = %err, "client.send_failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(target: "petri::server", %addr, skipped, "client.lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => match decode_client_message_json(&text) {
                    Ok(message) => {
                        if commands.send(ServerCommand::Client(message)).is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(
                        target: "petri::server",
                        %addr,
                        error = %err,
                        "frame.malformed"
                    ),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(target: "petri::server", %addr, error = %err, "client.read_failed");
                    break;
                }
            },
        }
    }

    let _ = commands.send(ServerCommand::Disconnected);
    let _ = sink.close().await;
}

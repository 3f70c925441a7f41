use std::io::BufRead;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use sim_runtime::{
    load_viewer_config_from_env, parse_command_line, run_websocket_session,
    ReconciliationController, SessionEnd, SnapshotBuffer, UserAction, ViewerConfig,
    ViewerSession,
};
use tokio::sync::{mpsc::UnboundedSender, watch};
use tracing::{info, warn};

mod app;
mod ui;

use app::ViewerApp;

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Petri terminal viewer", long_about = None)]
struct Cli {
    /// WebSocket URL of the simulation server; overrides the config file.
    #[arg(long)]
    endpoint: Option<String>,
    /// Read commands from stdin instead of drawing the terminal UI.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (log_tx, log_rx) = mpsc::channel::<String>();
    if cli.headless {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        let log_writer_tx = log_tx.clone();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_writer(move || ChannelWriter {
                sender: log_writer_tx.clone(),
            })
            .init();
    }

    let mut config = load_viewer_config_from_env();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    info!(target: "petri::viewer", endpoint = %config.endpoint, "Connecting to simulation");

    let buffer = SnapshotBuffer::new();
    let controller = ReconciliationController::new(&config, buffer.clone());
    let (action_tx, action_rx) = tokio::sync::mpsc::unbounded_channel::<UserAction>();
    let (mut session, control_rx) = ViewerSession::new(controller, action_rx);
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    if cli.headless {
        spawn_stdin_reader(action_tx, shutdown_tx);
        tokio::spawn(report_headless(control_rx, buffer, config.redraw_interval()));
    } else {
        let redraw_interval = config.redraw_interval();
        let _ui_handle = std::thread::spawn(move || -> color_eyre::Result<()> {
            let app = ViewerApp::new(
                buffer,
                control_rx,
                action_tx,
                shutdown_tx,
                log_rx,
                redraw_interval,
            )?;
            app.run()
        });
    }

    run_reconnect_loop(&mut session, &config, &shutdown_rx).await;
    Ok(())
}

async fn run_reconnect_loop(
    session: &mut ViewerSession,
    config: &ViewerConfig,
    shutdown: &mpsc::Receiver<()>,
) {
    loop {
        if shutdown.try_recv().is_ok() {
            info!(target: "petri::viewer", "Viewer requested shutdown");
            break;
        }
        match run_websocket_session(session, &config.endpoint).await {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Disconnected) => {
                info!(target: "petri::viewer", "Connection closed");
            }
            Err(err) => warn!(target: "petri::viewer", "Connection error: {}", err),
        }
        info!(
            target: "petri::viewer",
            "Reconnecting in {:.1} seconds...",
            config.reconnect_delay().as_secs_f32()
        );
        tokio::time::sleep(config.reconnect_delay()).await;
    }
}

/// Feed stdin lines through the command parser; EOF or `quit` shuts down.
fn spawn_stdin_reader(actions: UnboundedSender<UserAction>, shutdown: Sender<()>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command_line(&line) {
                Ok(UserAction::Shutdown) => break,
                Ok(action) => {
                    if actions.send(action).is_err() {
                        return;
                    }
                }
                Err(err) => warn!(target: "petri::viewer", "Invalid command: {}", err),
            }
        }
        let _ = shutdown.send(());
        let _ = actions.send(UserAction::Shutdown);
    });
}

async fn report_headless(
    mut control: watch::Receiver<sim_runtime::ControlState>,
    buffer: SnapshotBuffer,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(500)));
    let mut last_timestep = None;
    loop {
        tokio::select! {
            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *control.borrow_and_update();
                info!(
                    target: "petri::viewer",
                    paused = state.paused,
                    molecule_limit = state.molecule_limit,
                    paused_in_flight = state.paused_in_flight,
                    molecule_limit_in_flight = state.molecule_limit_in_flight,
                    "control_state.changed"
                );
            }
            _ = ticker.tick() => {
                let Some(snapshot) = buffer.latest() else {
                    continue;
                };
                if last_timestep != Some(snapshot.timestep) {
                    last_timestep = Some(snapshot.timestep);
                    info!(
                        target: "petri::viewer",
                        timestep = snapshot.timestep,
                        molecules = snapshot.population(),
                        "snapshot.latest"
                    );
                }
            }
        }
    }
}

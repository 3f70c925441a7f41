use sim_proto::{ClientMessage, Snapshot};
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::recorder::Recorder;
use crate::simulation::{Bounds, ResetParams, Simulation, SimulationSummary};

/// Events the connection tasks forward to the simulation owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    Connected,
    Disconnected,
    Client(ClientMessage),
}

/// Authoritative simulation plus the control flags every broadcast asserts.
pub struct ServerState {
    sim: Simulation,
    paused: bool,
    clients: usize,
    recorder: Option<Recorder>,
}

impl ServerState {
    pub fn new(sim: Simulation, recorder: Option<Recorder>) -> Self {
        Self {
            sim,
            paused: false,
            clients: 0,
            recorder,
        }
    }

    /// Build the simulation and, when `output_dir` is set, the recorder.
    /// A recorder that cannot be created is logged and left out.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let sim = Simulation::new(config.params(), config.seed);
        let recorder = config
            .output_dir
            .as_ref()
            .and_then(|dir| match Recorder::create(dir) {
                Ok(recorder) => {
                    info!(
                        target: "petri::recorder",
                        dir = %recorder.dir().display(),
                        "recorder.enabled"
                    );
                    Some(recorder)
                }
                Err(err) => {
                    warn!(
                        target: "petri::recorder",
                        dir = %dir.display(),
                        error = %err,
                        "recorder.disabled"
                    );
                    None
                }
            });
        Self::new(sim, recorder)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn clients(&self) -> usize {
        self.clients
    }

    pub fn handle(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connected => self.client_connected(),
            ServerCommand::Disconnected => {
                self.clients = self.clients.saturating_sub(1);
                info!(target: "petri::server", clients = self.clients, "client.disconnected");
            }
            ServerCommand::Client(message) => self.apply(message),
        }
    }

    /// The first viewer of a session gets a fresh world and fresh output files.
    fn client_connected(&mut self) {
        self.clients += 1;
        info!(target: "petri::server", clients = self.clients, "client.connected");
        if self.clients == 1 {
            self.sim.reset(ResetParams::default());
            self.truncate_recorder();
            info!(target: "petri::server", "simulation.reset=first_client");
        }
    }

    pub fn apply(&mut self, message: ClientMessage) {
        debug!(target: "petri::server", kind = message.kind(), "command.received");
        match message {
            ClientMessage::Pause => {
                self.paused = true;
                info!(target: "petri::server", "simulation.paused");
            }
            ClientMessage::Resume => {
                self.paused = false;
                info!(target: "petri::server", "simulation.resumed");
            }
            ClientMessage::SetMoleculeLimit { value } => {
                self.sim.set_molecule_limit(value);
                info!(
                    target: "petri::server",
                    molecule_limit = self.sim.params().molecule_limit,
                    "molecule_limit.updated"
                );
            }
            ClientMessage::Reset {
                molecule_limit,
                spawn_rate,
                variation,
                seed,
            } => {
                self.sim.reset(ResetParams {
                    molecule_limit,
                    spawn_rate,
                    variation,
                    seed,
                });
                self.truncate_recorder();
                info!(
                    target: "petri::server",
                    molecule_limit = self.sim.params().molecule_limit,
                    ?seed,
                    "simulation.reset=requested"
                );
            }
            ClientMessage::Viewport {
                width,
                height,
                radius_px,
            } => {
                self.sim
                    .set_bounds(Bounds::from_viewport(width, height, radius_px));
                debug!(
                    target: "petri::server",
                    width,
                    height,
                    radius_px,
                    "viewport.updated"
                );
            }
        }
    }

    /// One tick of the broadcast loop. Returns nothing while no viewer is
    /// connected; otherwise steps unless paused and returns the snapshot.
    pub fn tick(&mut self) -> Option<Snapshot> {
        if self.clients == 0 {
            return None;
        }
        if !self.paused {
            self.advance();
        }
        Some(self.snapshot())
    }

    /// Step once and record the tick, regardless of viewers or pause state.
    pub fn advance(&mut self) {
        let report = self.sim.step();
        let Some(recorder) = &self.recorder else {
            return;
        };
        for traits in &report.new_species {
            if let Err(err) = recorder.record_species(traits) {
                warn!(target: "petri::recorder", error = %err, "recorder.write_failed");
            }
        }
        if let Err(err) = recorder.record_tick(
            self.sim.timestep(),
            self.sim.population(),
            &self.sim.species_counts(),
        ) {
            warn!(target: "petri::recorder", error = %err, "recorder.write_failed");
        }
    }

    /// Run `steps` ticks with no viewer attached, then write the final summary.
    pub fn run_batch(&mut self, steps: u64) -> SimulationSummary {
        info!(target: "petri::server", steps, "batch.started");
        for _ in 0..steps {
            self.advance();
        }
        info!(
            target: "petri::server",
            timestep = self.sim.timestep(),
            population = self.sim.population(),
            "batch.finished"
        );
        self.finish()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            paused: Some(self.paused),
            molecule_limit: Some(self.sim.params().molecule_limit),
            ..self.sim.snapshot()
        }
    }

    /// Write the final summary and return it.
    pub fn finish(&self) -> SimulationSummary {
        let summary = self.sim.summary();
        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.record_final(&summary) {
                warn!(target: "petri::recorder", error = %err, "recorder.write_failed");
            }
        }
        summary
    }

    fn truncate_recorder(&self) {
        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.truncate() {
                warn!(target: "petri::recorder", error = %err, "recorder.truncate_failed");
            }
        }
    }
}

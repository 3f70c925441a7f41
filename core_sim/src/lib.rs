//! Reference simulation server for the Petri viewer.
//!
//! Runs the molecule population model, applies viewer commands and streams a
//! [`sim_proto::Snapshot`] to every connected viewer at a fixed tick rate.

pub mod config;
pub mod network;
pub mod recorder;
pub mod server_state;
pub mod simulation;

pub use config::{load_simulation_config_from_env, SimulationConfig, SimulationConfigError};
pub use network::{serve, start_server, ServerError, ServerHandle};
pub use recorder::Recorder;
pub use server_state::{ServerCommand, ServerState};
pub use simulation::{
    Bounds, ResetParams, Simulation, SimulationParams, SimulationSummary, SpeciesTraits,
    TickReport,
};

//! Viewer-side runtime for Petri.
//!
//! Keeps the viewer's displayed control state (paused flag, population cap)
//! consistent with the server while commands are in flight: optimistic
//! updates, per-dimension intents, fixed-interval retransmission, debounced
//! cap changes and snapshot reconciliation. The wire types come from
//! `sim_proto` and are re-exported here.

pub use sim_proto::*;

pub mod command_text;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod intent;
pub mod retry;
pub mod session;
pub mod snapshot_buffer;
pub mod viewport;
pub mod websocket;

pub use command_text::{parse_command_line, CommandParseError};
pub use config::{load_viewer_config_from_env, ViewerConfig, ViewerConfigError};
pub use controller::{
    ControlState, Reconciliation, ReconciliationController, SnapshotOutcome, UserAction,
};
pub use debounce::Debouncer;
pub use intent::{ControlDimension, Intent, IntentSlot, IntentTracker};
pub use retry::{RetryPolicy, RetryScheduler};
pub use session::{SessionEnd, SessionError, ViewerSession};
pub use snapshot_buffer::SnapshotBuffer;
pub use viewport::{Viewport, ViewportNegotiator};
pub use websocket::{inbound_frames, outbound_frames, run_websocket_session};

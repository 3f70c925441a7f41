//! Wire contract between the Petri simulation server and its viewers.
//!
//! The server broadcasts one [`Snapshot`] per text frame; viewers answer with
//! [`ClientMessage`] frames discriminated by a `type` field. Both directions are
//! JSON.

mod colour;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use colour::{species_colour, Rgb};

/// One simulated individual as rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoleculeState {
    pub entity_id: u64,
    pub species_id: u32,
    /// Fractional horizontal position in `[0, 1]`.
    pub x: f64,
    /// Fractional vertical position in `[0, 1]`, 0 at the top.
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour: Option<String>,
}

impl MoleculeState {
    /// Explicit colour when it parses, otherwise the species colour.
    pub fn display_colour(&self) -> Rgb {
        self.colour
            .as_deref()
            .and_then(Rgb::parse_hex)
            .unwrap_or_else(|| species_colour(self.species_id))
    }
}

/// Point-in-time server broadcast.
///
/// `paused` and `molecule_limit` are present only when the server asserts its
/// authoritative control state; absence means "nothing to report".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub timestep: u64,
    pub molecules: Vec<MoleculeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molecule_limit: Option<u32>,
}

impl Snapshot {
    pub fn population(&self) -> usize {
        self.molecules.len()
    }
}

/// Viewer to server commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Viewport {
        width: u32,
        height: u32,
        radius_px: u32,
    },
    Pause,
    Resume,
    Reset {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        molecule_limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spawn_rate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variation: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    SetMoleculeLimit {
        value: u32,
    },
}

impl ClientMessage {
    /// `reset` with every parameter left to the server.
    pub fn reset() -> Self {
        ClientMessage::Reset {
            molecule_limit: None,
            spawn_rate: None,
            variation: None,
            seed: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Viewport { .. } => "viewport",
            ClientMessage::Pause => "pause",
            ClientMessage::Resume => "resume",
            ClientMessage::Reset { .. } => "reset",
            ClientMessage::SetMoleculeLimit { .. } => "set_molecule_limit",
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("molecule_limit must be greater than zero")]
    ZeroMoleculeLimit,
}

pub fn encode_snapshot_json(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

/// Decode one inbound frame, rejecting payloads that violate the contract.
pub fn decode_snapshot_json(data: &str) -> Result<Snapshot, FrameError> {
    let snapshot: Snapshot = serde_json::from_str(data)?;
    if snapshot.molecule_limit == Some(0) {
        return Err(FrameError::ZeroMoleculeLimit);
    }
    Ok(snapshot)
}

pub fn encode_client_message_json(message: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

pub fn decode_client_message_json(data: &str) -> Result<ClientMessage, FrameError> {
    let message: ClientMessage = serde_json::from_str(data)?;
    if let ClientMessage::SetMoleculeLimit { value: 0 } = message {
        return Err(FrameError::ZeroMoleculeLimit);
    }
    Ok(message)
}

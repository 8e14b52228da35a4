use thiserror::Error;

use crate::{BrickId, DeviceId, NodeId, VolumeId};

pub type CoreResult<T> = Result<T, CoreError>;

/// Structured error taxonomy for the allocation and replace-brick core.
/// Every variant here is a refusal the caller can act on; anything that
/// wraps an opaque external failure carries its source for logging.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no device in cluster has {requested} bytes free")]
    NoSpace { requested: u64 },

    #[error("volume {volume_id} would exceed the brick ceiling of {max}")]
    MaxBricks { volume_id: VolumeId, max: usize },

    #[error("no brick size in the durability profile's schedule fits the remaining space")]
    NoSizeAvailable,

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },

    #[error("no device offers a replacement for brick {brick_id} outside its current fault domain")]
    NoReplacement { brick_id: BrickId },

    #[error("durability profile is not supported: {reason}")]
    UnsupportedDurability { reason: String },

    #[error("brick {brick_id} is already the source of a pending heal")]
    HealSourceConflict { brick_id: BrickId },

    #[error("brick set would drop below quorum: {online} of {required} bricks online")]
    QuorumNotMet { online: u32, required: u32 },

    #[error("external executor operation {operation} failed")]
    ExternalFailure {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("store operation {operation} failed")]
    Store {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl CoreError {
    pub fn not_found_node(id: NodeId) -> Self {
        CoreError::NotFound {
            what: "node",
            id: id.to_string(),
        }
    }

    pub fn not_found_device(id: DeviceId) -> Self {
        CoreError::NotFound {
            what: "device",
            id: id.to_string(),
        }
    }

    pub fn not_found_brick(id: BrickId) -> Self {
        CoreError::NotFound {
            what: "brick",
            id: id.to_string(),
        }
    }

    pub fn not_found_volume(id: VolumeId) -> Self {
        CoreError::NotFound {
            what: "volume",
            id: id.to_string(),
        }
    }
}

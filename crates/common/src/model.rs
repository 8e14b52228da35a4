use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::durability::DurabilityProfile;
use crate::{BrickId, ClusterId, DeviceId, NodeId, VolumeId};

/// A cluster is the fault-domain boundary: placement never lets two bricks
/// of the same set land on the same node, but cross-cluster placement is
/// never attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub nodes: BTreeSet<NodeId>,
    pub volumes: BTreeSet<VolumeId>,
}

impl Cluster {
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            nodes: BTreeSet::new(),
            volumes: BTreeSet::new(),
        }
    }
}

/// A node is the unit of fault isolation: the placement engine refuses to
/// put two bricks of the same brick set on the same node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub cluster_id: ClusterId,
    pub manage_hostname: String,
    pub storage_hostnames: Vec<String>,
    pub devices: BTreeSet<DeviceId>,
    pub online: bool,
}

impl Node {
    pub fn storage_hostname(&self) -> Option<&str> {
        self.storage_hostnames.first().map(String::as_str)
    }
}

/// A device is a raw block device on a node, tracked by free capacity and
/// the set of bricks currently carved out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub node_id: NodeId,
    pub name: String,
    pub total_size: u64,
    pub free_size: u64,
    pub bricks: BTreeSet<BrickId>,
    pub online: bool,
}

impl Device {
    /// Whether `requested` bytes can still be carved from this device.
    /// Devices marked offline never satisfy an allocation, even if they
    /// otherwise have space.
    pub fn has_space(&self, requested: u64) -> bool {
        self.online && self.free_size >= requested
    }
}

/// A brick is a directory on a device, reserved for one volume's data.
/// `total_size` is the on-disk reservation after the volume's snapshot
/// factor inflates the logical `size`; devices are charged `total_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brick {
    pub id: BrickId,
    pub volume_id: VolumeId,
    pub device_id: DeviceId,
    pub node_id: NodeId,
    pub path: String,
    pub size: u64,
    pub total_size: u64,
}

impl Brick {
    pub fn name(&self) -> String {
        format!("brick_{}", self.id)
    }
}

/// A volume is a set of brick sets, all sharing one durability profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub durability: DurabilityProfile,
    pub snapshot_factor: f64,
    pub group_id: u64,
    pub size: u64,
    pub bricks: Vec<BrickId>,
}

impl Volume {
    /// Bricks grouped into their brick sets, in allocation order. A
    /// malformed `bricks` length (not a multiple of the profile's set
    /// width) yields a final short set rather than panicking; callers
    /// that rely on well-formed sets should check `bricks.len()` first.
    pub fn brick_sets(&self) -> Vec<&[BrickId]> {
        self.bricks
            .chunks(self.durability.bricks_in_set() as usize)
            .collect()
    }
}

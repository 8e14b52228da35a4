//! External volume executor: the boundary between the core and whatever
//! actually runs `mkfs`/`mount`/`gluster volume ...` on a storage node.
//!
//! Grounded on the teacher's `MeshNode`: a thin async client over a plain
//! `TcpStream`, with an in-memory double for tests.

pub mod mock;
pub mod tcp;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use common::{BrickId, NodeId};

/// A brick's on-the-wire address: a storage hostname plus a filesystem
/// path, the two things the external executor needs to act on a brick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickSpec {
    pub brick_id: BrickId,
    pub host: String,
    pub path: String,
}

/// Snapshot of a volume's brick health as gluster-style tooling would
/// report it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub bricks_online: Vec<BrickId>,
    pub bricks_offline: Vec<BrickId>,
}

/// A volume's heal status as gluster-style tooling would report it: which
/// bricks are actively serving as heal sources, and which didn't answer at
/// all (the daemon-down sentinel upstream tooling spells
/// `"information not available"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealInfo {
    pub active_heal_sources: Vec<BrickId>,
    pub unreachable: Vec<BrickId>,
}

/// Operations the core needs the outside world to perform. Every method
/// is fallible and asynchronous: these calls cross a process (and usually
/// a network) boundary.
pub trait VolumeExecutor: Send + Sync {
    /// Confirms the management daemon on `node` is reachable and healthy
    /// before the core trusts it with a mutation.
    fn glusterd_check<'a>(&'a self, node: NodeId) -> BoxFuture<'a, anyhow::Result<()>>;

    fn volume_info<'a>(&'a self, volume_name: &'a str) -> BoxFuture<'a, anyhow::Result<VolumeInfo>>;

    fn heal_info<'a>(&'a self, volume_name: &'a str) -> BoxFuture<'a, anyhow::Result<HealInfo>>;

    /// Formats and mounts the given bricks so they're ready to join a
    /// volume.
    fn create_bricks<'a>(&'a self, bricks: &'a [BrickSpec]) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Unmounts and wipes the given bricks; called on allocation failure
    /// to undo a partially-applied set, and after a replace-brick commits
    /// to reclaim the old brick.
    fn destroy_bricks<'a>(&'a self, bricks: &'a [BrickSpec]) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Swaps `old` for `new` in a live volume. The volume keeps serving
    /// traffic through the swap; `new` heals from its surviving peers
    /// afterward.
    fn replace_brick<'a>(
        &'a self,
        volume_name: &'a str,
        old: &'a BrickSpec,
        new: &'a BrickSpec,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

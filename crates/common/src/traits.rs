use anyhow::Result;

use crate::{Brick, BrickId, Cluster, ClusterId, Device, DeviceId, Node, NodeId, Volume, VolumeId};

/// Read-only snapshot of the registry. Implementations hand back owned
/// clones rather than guards, so a view never holds a lock across an
/// `.await` point.
pub trait View: Send + Sync {
    fn cluster(&self, id: ClusterId) -> Option<Cluster>;
    fn node(&self, id: NodeId) -> Option<Node>;
    fn device(&self, id: DeviceId) -> Option<Device>;
    fn brick(&self, id: BrickId) -> Option<Brick>;
    fn volume(&self, id: VolumeId) -> Option<Volume>;

    fn nodes_in_cluster(&self, cluster_id: ClusterId) -> Vec<Node>;
    fn devices_on_node(&self, node_id: NodeId) -> Vec<Device>;
}

/// A single write transaction. The store hands out at most one of these
/// at a time; dropping it without calling [`Update::commit`] discards the
/// pending writes.
pub trait Update: View {
    fn put_cluster(&mut self, cluster: Cluster);
    fn put_device(&mut self, device: Device);
    fn put_brick(&mut self, brick: Brick);
    fn delete_brick(&mut self, id: BrickId);
    fn put_volume(&mut self, volume: Volume);
    fn put_node(&mut self, node: Node);

    fn commit(self) -> Result<()>
    where
        Self: Sized;

    fn rollback(self) -> Result<()>
    where
        Self: Sized;
}

//! Fault-domain-aware placement: turns one size candidate into concrete
//! device assignments, refusing to put two bricks of the same set on the
//! same node.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use allocator::{allocate_stream, collect};
use common::{ClusterId, CoreError, CoreResult, DeviceId, DurabilityProfile, View};

use crate::sizegen::SizeCandidate;

/// One brick set's worth of device assignments, in brick order.
#[derive(Debug, Clone)]
pub struct PlacedSet {
    pub devices: Vec<DeviceId>,
    pub brick_size: u64,
}

/// Attempts to place `candidate.sets` brick sets of `candidate.brick_size`
/// bytes each, honoring the durability profile's fault-domain width. Fails
/// with [`CoreError::NoSpace`] as soon as one set cannot be completed; the
/// allocation driver is expected to retry with the size generator's next,
/// smaller candidate.
pub async fn place_sets<V>(
    view: V,
    cluster_id: ClusterId,
    durability: DurabilityProfile,
    candidate: SizeCandidate,
    seed: u64,
) -> CoreResult<Vec<PlacedSet>>
where
    V: View + Clone + 'static,
{
    let bricks_in_set = durability.bricks_in_set() as usize;

    let mut remaining_free: HashMap<DeviceId, u64> = HashMap::new();
    for node in view.nodes_in_cluster(cluster_id) {
        for device in view.devices_on_node(node.id) {
            remaining_free.insert(device.id, device.free_size);
        }
    }

    let mut placed = Vec::with_capacity(candidate.sets as usize);

    for set_index in 0..candidate.sets {
        let ring = collect(allocate_stream(view.clone(), cluster_id, seed))
            .await
            .map_err(|err| match err {
                CoreError::NotFound { what, id } => CoreError::NotFound { what, id },
                other => other,
            })?;

        let mut chosen = Vec::with_capacity(bricks_in_set);
        let mut used_nodes = HashSet::new();

        for device_id in &ring {
            if chosen.len() == bricks_in_set {
                break;
            }
            let Some(device) = view.device(*device_id) else {
                continue;
            };
            if used_nodes.contains(&device.node_id) {
                continue;
            }
            let free = remaining_free.get(device_id).copied().unwrap_or(0);
            if free < candidate.brick_size {
                continue;
            }
            used_nodes.insert(device.node_id);
            chosen.push(*device_id);
        }

        if chosen.len() < bricks_in_set {
            debug!(
                cluster_id = %cluster_id,
                set_index,
                brick_size = candidate.brick_size,
                "insufficient fault-domain-distinct devices for this candidate"
            );
            return Err(CoreError::NoSpace {
                requested: candidate.brick_size,
            });
        }

        for device_id in &chosen {
            if let Some(free) = remaining_free.get_mut(device_id) {
                *free = free.saturating_sub(candidate.brick_size);
            }
        }

        placed.push(PlacedSet {
            devices: chosen,
            brick_size: candidate.brick_size,
        });
    }

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Brick, BrickId, Cluster, Device, Node, NodeId, Volume, VolumeId};
    use std::collections::BTreeSet;
    use std::sync::{Arc, RwLock};

    #[derive(Clone, Default)]
    struct FakeView(Arc<RwLock<Inner>>);

    #[derive(Default)]
    struct Inner {
        clusters: HashMap<ClusterId, Cluster>,
        nodes: HashMap<NodeId, Node>,
        devices: HashMap<DeviceId, Device>,
    }

    impl View for FakeView {
        fn cluster(&self, id: ClusterId) -> Option<Cluster> {
            self.0.read().unwrap().clusters.get(&id).cloned()
        }
        fn node(&self, id: NodeId) -> Option<Node> {
            self.0.read().unwrap().nodes.get(&id).cloned()
        }
        fn device(&self, id: DeviceId) -> Option<Device> {
            self.0.read().unwrap().devices.get(&id).cloned()
        }
        fn brick(&self, _id: BrickId) -> Option<Brick> {
            None
        }
        fn volume(&self, _id: VolumeId) -> Option<Volume> {
            None
        }
        fn nodes_in_cluster(&self, cluster_id: ClusterId) -> Vec<Node> {
            match self.cluster(cluster_id) {
                Some(cluster) => cluster.nodes.iter().filter_map(|id| self.node(*id)).collect(),
                None => Vec::new(),
            }
        }
        fn devices_on_node(&self, node_id: NodeId) -> Vec<Device> {
            match self.node(node_id) {
                Some(node) => node
                    .devices
                    .iter()
                    .filter_map(|id| self.device(*id))
                    .collect(),
                None => Vec::new(),
            }
        }
    }

    fn fixture(node_count: usize, free_per_device: u64) -> (FakeView, ClusterId) {
        let view = FakeView::default();
        let cluster_id = ClusterId::new();
        let mut inner = view.0.write().unwrap();
        let mut node_ids = BTreeSet::new();

        for _ in 0..node_count {
            let node_id = NodeId::new();
            let device_id = DeviceId::new();
            inner.devices.insert(
                device_id,
                Device {
                    id: device_id,
                    node_id,
                    name: "/dev/sdb".into(),
                    total_size: free_per_device,
                    free_size: free_per_device,
                    bricks: BTreeSet::new(),
                    online: true,
                },
            );
            let mut device_ids = BTreeSet::new();
            device_ids.insert(device_id);
            inner.nodes.insert(
                node_id,
                Node {
                    id: node_id,
                    cluster_id,
                    manage_hostname: "node".into(),
                    storage_hostnames: vec!["node-storage".into()],
                    devices: device_ids,
                    online: true,
                },
            );
            node_ids.insert(node_id);
        }
        inner.clusters.insert(
            cluster_id,
            Cluster {
                id: cluster_id,
                nodes: node_ids,
                volumes: BTreeSet::new(),
            },
        );
        drop(inner);
        (view, cluster_id)
    }

    #[tokio::test]
    async fn places_a_replicated_set_across_distinct_nodes() {
        let (view, cluster_id) = fixture(3, 100);
        let candidate = SizeCandidate { sets: 1, brick_size: 10 };
        let placed = place_sets(
            view,
            cluster_id,
            DurabilityProfile::Replicated { replica: 3 },
            candidate,
            1,
        )
        .await
        .unwrap();

        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].devices.len(), 3);
        let unique: HashSet<_> = placed[0].devices.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn refuses_when_not_enough_fault_domains() {
        let (view, cluster_id) = fixture(2, 100);
        let candidate = SizeCandidate { sets: 1, brick_size: 10 };
        let result = place_sets(
            view,
            cluster_id,
            DurabilityProfile::Replicated { replica: 3 },
            candidate,
            1,
        )
        .await;
        assert!(matches!(result, Err(CoreError::NoSpace { .. })));
    }

    #[tokio::test]
    async fn refuses_when_devices_lack_space() {
        let (view, cluster_id) = fixture(3, 5);
        let candidate = SizeCandidate { sets: 1, brick_size: 10 };
        let result = place_sets(view, cluster_id, DurabilityProfile::DistributeOnly, candidate, 1).await;
        assert!(matches!(result, Err(CoreError::NoSpace { .. })));
    }
}

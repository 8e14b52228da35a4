//! Allocation driver: turns a request for `gbSize` gigabytes on a volume
//! into concrete, persisted bricks.
//!
//! Grounded on spec.md §4.4's "try against a read view, commit everything
//! in one write transaction" split, realized with `store::Store`'s
//! single-writer transaction pair.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use common::{
    Brick, BrickId, ClusterId, CoreError, CoreResult, Device, DeviceId, DurabilityProfile, View,
    VolumeId, GB,
};
use placement::sizegen::SizeCandidate;
use store::Store;

use crate::{physical_size, seed_from_uuid};

/// Wraps a read view with a local, in-memory free-space ledger so a single
/// allocation attempt can place several brick sets back to back without
/// double-committing one device's space to two sets, while the underlying
/// store stays untouched until the attempt fully succeeds. Mirrors the
/// "clone device objects, mutate in-memory, persist only on commit"
/// convention the placement engine itself already follows for a single
/// `place_sets` call; this extends it across the several single-set calls
/// the driver makes per candidate.
#[derive(Clone)]
struct ScratchView<V> {
    base: V,
    charged: Arc<Mutex<HashMap<DeviceId, u64>>>,
}

impl<V: View> ScratchView<V> {
    fn new(base: V) -> Self {
        Self {
            base,
            charged: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn charge(&self, device_id: DeviceId, amount: u64) {
        *self.charged.lock().unwrap().entry(device_id).or_insert(0) += amount;
    }
}

impl<V: View + Clone> View for ScratchView<V> {
    fn cluster(&self, id: ClusterId) -> Option<common::Cluster> {
        self.base.cluster(id)
    }

    fn node(&self, id: common::NodeId) -> Option<common::Node> {
        self.base.node(id)
    }

    fn device(&self, id: DeviceId) -> Option<Device> {
        let mut device = self.base.device(id)?;
        if let Some(charged) = self.charged.lock().unwrap().get(&id) {
            device.free_size = device.free_size.saturating_sub(*charged);
        }
        Some(device)
    }

    fn brick(&self, id: BrickId) -> Option<Brick> {
        self.base.brick(id)
    }

    fn volume(&self, id: VolumeId) -> Option<common::Volume> {
        self.base.volume(id)
    }

    fn nodes_in_cluster(&self, cluster_id: ClusterId) -> Vec<common::Node> {
        self.base.nodes_in_cluster(cluster_id)
    }

    fn devices_on_node(&self, node_id: common::NodeId) -> Vec<Device> {
        let charged = self.charged.lock().unwrap();
        self.base
            .devices_on_node(node_id)
            .into_iter()
            .map(|mut device| {
                if let Some(amount) = charged.get(&device.id) {
                    device.free_size = device.free_size.saturating_sub(*amount);
                }
                device
            })
            .collect()
    }
}

/// Allocates `gb_size` gigabytes (decimal) worth of bricks for `volume_id`,
/// retrying with the durability profile's shrinking size schedule until a
/// candidate fits or the schedule is exhausted.
pub async fn alloc_bricks_in_cluster(
    store: &Store,
    volume_id: VolumeId,
    gb_size: u64,
    brick_max_num: usize,
) -> CoreResult<Vec<Brick>> {
    let size = gb_size * GB;

    let view = store.view().await;
    let volume = view
        .volume(volume_id)
        .ok_or_else(|| CoreError::not_found_volume(volume_id))?;
    let durability = volume.durability;
    let bricks_in_set = durability.bricks_in_set() as usize;

    let mut schedule = durability.brick_size_generator(size);

    loop {
        let Some(candidate) = schedule.next() else {
            warn!(volume_id = %volume_id, "size generator exhausted before a candidate fit");
            return Err(CoreError::NoSizeAvailable);
        };

        let num_bricks = candidate.sets as usize * bricks_in_set;
        if volume.bricks.len() + num_bricks > brick_max_num {
            warn!(
                volume_id = %volume_id,
                current = volume.bricks.len(),
                adding = num_bricks,
                max = brick_max_num,
                "allocation would exceed the brick ceiling"
            );
            return Err(CoreError::MaxBricks {
                volume_id,
                max: brick_max_num,
            });
        }

        match try_place_and_commit(store, &volume, durability, candidate).await {
            Ok(bricks) => {
                info!(
                    volume_id = %volume_id,
                    brick_count = bricks.len(),
                    brick_size = candidate.brick_size,
                    "allocation committed"
                );
                return Ok(bricks);
            }
            Err(CoreError::NoSpace { .. }) => {
                debug!(
                    volume_id = %volume_id,
                    brick_size = candidate.brick_size,
                    "candidate size did not fit, retrying with a smaller one"
                );
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn try_place_and_commit(
    store: &Store,
    volume: &common::Volume,
    durability: DurabilityProfile,
    candidate: SizeCandidate,
) -> CoreResult<Vec<Brick>> {
    let scratch = ScratchView::new(store.view().await);

    // Plan every set against the in-memory scratch ledger first; nothing
    // touches the store until the whole candidate has a home.
    let mut planned: Vec<(BrickId, Vec<DeviceId>)> = Vec::with_capacity(candidate.sets as usize);
    for _ in 0..candidate.sets {
        let seed_id = BrickId::new();
        let seed = seed_from_uuid(seed_id.as_uuid());
        let single = SizeCandidate {
            sets: 1,
            brick_size: candidate.brick_size,
        };
        let placed = placement::place_sets(scratch.clone(), volume.cluster_id, durability, single, seed).await?;
        let set = placed.into_iter().next().expect("sets=1 always yields exactly one set on success");
        for device_id in &set.devices {
            scratch.charge(*device_id, candidate.brick_size);
        }
        planned.push((seed_id, set.devices));
    }

    // Re-validate and persist against the live, write-locked state: another
    // writer may have committed against these same devices between our read
    // view above and acquiring the write permit below.
    let mut txn = store.begin_update().await;
    let mut bricks = Vec::with_capacity(candidate.sets as usize * durability.bricks_in_set() as usize);

    for (seed_id, devices) in planned {
        for (i, device_id) in devices.iter().enumerate() {
            let Some(mut device) = txn.device(*device_id) else {
                txn.rollback().map_err(|source| CoreError::Store { operation: "rollback_allocation", source })?;
                return Err(CoreError::not_found_device(*device_id));
            };
            let total_size = physical_size(candidate.brick_size, volume.snapshot_factor);
            if !device.has_space(total_size) {
                txn.rollback().map_err(|source| CoreError::Store { operation: "rollback_allocation", source })?;
                return Err(CoreError::NoSpace { requested: total_size });
            }

            let brick_id = if i == 0 { seed_id } else { BrickId::new() };
            let brick = Brick {
                id: brick_id,
                volume_id: volume.id,
                device_id: *device_id,
                node_id: device.node_id,
                path: format!("/bricks/{}/{}", volume.name, brick_id),
                size: candidate.brick_size,
                total_size,
            };

            device.free_size -= total_size;
            device.bricks.insert(brick.id);
            txn.put_device(device);
            bricks.push(brick);
        }
    }

    let mut updated_volume = volume.clone();
    for brick in &bricks {
        updated_volume.bricks.push(brick.id);
        txn.put_brick(brick.clone());
    }
    txn.put_volume(updated_volume);

    txn.commit()
        .map_err(|source| CoreError::Store { operation: "commit_allocation", source })?;

    Ok(bricks)
}

//! Device ledger mutations: the small set of writes that keep a device's
//! free-space counter and brick set consistent with the bricks that
//! actually reference it.
//!
//! Grounded on the teacher's `CapsuleRegistry` mutation methods (each one
//! a short read-modify-write under the registry's lock) and its
//! `GarbageCollector`, whose "remove the reference, then remove the
//! metadata entry" shape is mirrored by [`DeviceLedger::remove_brick`].

use tracing::{info, warn};

use common::{Brick, BrickId, CoreError, CoreResult, Update, VolumeId};

/// Namespace for the ledger's mutation operations. Holds no state itself;
/// every call takes the open write transaction it should operate inside.
pub struct DeviceLedger;

impl DeviceLedger {
    /// Records a newly placed brick: charges its device's free-space
    /// counter, adds it to the device's and the volume's brick sets.
    pub fn add_brick(txn: &mut impl Update, brick: Brick) -> CoreResult<()> {
        let mut device = txn
            .device(brick.device_id)
            .ok_or_else(|| CoreError::not_found_device(brick.device_id))?;

        if !device.has_space(brick.total_size) {
            return Err(CoreError::NoSpace {
                requested: brick.total_size,
            });
        }

        device.free_size -= brick.total_size;
        device.bricks.insert(brick.id);
        txn.put_device(device);

        let mut volume = txn
            .volume(brick.volume_id)
            .ok_or_else(|| CoreError::not_found_volume(brick.volume_id))?;
        volume.bricks.push(brick.id);
        txn.put_volume(volume);

        info!(
            brick_id = %brick.id,
            device_id = %brick.device_id,
            volume_id = %brick.volume_id,
            size = brick.total_size,
            "brick added to device ledger"
        );
        txn.put_brick(brick);
        Ok(())
    }

    /// Removes a brick from the ledger: credits its space back to the
    /// device, drops it from the device's and volume's brick sets, then
    /// removes the brick entry itself. Mirrors the garbage collector's
    /// "deregister the reference, then remove the metadata" ordering so a
    /// crash between the two steps leaves an orphaned brick entry rather
    /// than a device silently missing free space.
    pub fn remove_brick(txn: &mut impl Update, brick_id: BrickId) -> CoreResult<Brick> {
        let brick = txn
            .brick(brick_id)
            .ok_or_else(|| CoreError::not_found_brick(brick_id))?;

        if let Some(mut device) = txn.device(brick.device_id) {
            device.bricks.remove(&brick_id);
            device.free_size += brick.total_size;
            txn.put_device(device);
        } else {
            warn!(
                brick_id = %brick_id,
                device_id = %brick.device_id,
                "brick referenced a device that no longer exists"
            );
        }

        if let Some(mut volume) = txn.volume(brick.volume_id) {
            volume.bricks.retain(|id| *id != brick_id);
            txn.put_volume(volume);
        }

        txn.delete_brick(brick_id);
        info!(brick_id = %brick_id, "brick removed from device ledger");
        Ok(brick)
    }

    /// Total logical bricks currently registered against `volume_id`,
    /// used by the allocation driver to enforce the brick ceiling.
    pub fn brick_count(txn: &impl common::View, volume_id: VolumeId) -> usize {
        txn.volume(volume_id).map(|v| v.bricks.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ClusterId, Device, DeviceId, DurabilityProfile, NodeId, Volume};
    use std::collections::BTreeSet;

    fn sample_brick(device_id: DeviceId, volume_id: VolumeId) -> Brick {
        Brick {
            id: BrickId::new(),
            volume_id,
            device_id,
            node_id: NodeId::new(),
            path: "/bricks/0".into(),
            size: 10,
            total_size: 10,
        }
    }

    #[tokio::test]
    async fn add_then_remove_restores_free_space() {
        let dir = std::env::temp_dir().join(format!("ledger-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = store::Store::open(dir.join("store.json")).await.unwrap();

        let device_id = DeviceId::new();
        let volume_id = VolumeId::new();
        let mut txn = store.begin_update().await;
        txn.put_device(Device {
            id: device_id,
            node_id: NodeId::new(),
            name: "/dev/sdb".into(),
            total_size: 100,
            free_size: 100,
            bricks: BTreeSet::new(),
            online: true,
        });
        txn.put_volume(Volume {
            id: volume_id,
            cluster_id: ClusterId::new(),
            name: "vol0".into(),
            durability: DurabilityProfile::DistributeOnly,
            snapshot_factor: 1.0,
            group_id: 0,
            size: 10,
            bricks: Vec::new(),
        });
        txn.commit().unwrap();

        let brick = sample_brick(device_id, volume_id);
        let brick_id = brick.id;

        let mut txn = store.begin_update().await;
        DeviceLedger::add_brick(&mut txn, brick).unwrap();
        txn.commit().unwrap();

        let view = store.view().await;
        assert_eq!(view.device(device_id).unwrap().free_size, 90);
        assert_eq!(view.volume(volume_id).unwrap().bricks, vec![brick_id]);

        let mut txn = store.begin_update().await;
        DeviceLedger::remove_brick(&mut txn, brick_id).unwrap();
        txn.commit().unwrap();

        let view = store.view().await;
        assert_eq!(view.device(device_id).unwrap().free_size, 100);
        assert!(view.volume(volume_id).unwrap().bricks.is_empty());
        assert!(view.brick(brick_id).is_none());
    }

    #[tokio::test]
    async fn add_brick_refuses_when_device_full() {
        let dir = std::env::temp_dir().join(format!("ledger-test-full-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = store::Store::open(dir.join("store.json")).await.unwrap();

        let device_id = DeviceId::new();
        let volume_id = VolumeId::new();
        let mut txn = store.begin_update().await;
        txn.put_device(Device {
            id: device_id,
            node_id: NodeId::new(),
            name: "/dev/sdb".into(),
            total_size: 5,
            free_size: 5,
            bricks: BTreeSet::new(),
            online: true,
        });
        txn.put_volume(Volume {
            id: volume_id,
            cluster_id: ClusterId::new(),
            name: "vol0".into(),
            durability: DurabilityProfile::DistributeOnly,
            snapshot_factor: 1.0,
            group_id: 0,
            size: 10,
            bricks: Vec::new(),
        });
        txn.commit().unwrap();

        let brick = sample_brick(device_id, volume_id);
        let mut txn = store.begin_update().await;
        let result = DeviceLedger::add_brick(&mut txn, brick);
        assert!(matches!(result, Err(CoreError::NoSpace { .. })));
    }
}

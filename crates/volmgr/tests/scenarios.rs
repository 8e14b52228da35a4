//! End-to-end scenario tests exercising `volmgr` the way a caller (the CLI,
//! or the reconciliation loop that drives it) would: a store on disk, a
//! mock executor, and the public `alloc_bricks_in_cluster`/`replace_brick`
//! entry points only.

use std::collections::BTreeSet;

use common::{
    Brick, BrickId, Cluster, ClusterId, Device, DeviceId, DurabilityProfile, Node, NodeId, View,
    Volume, VolumeId, GB,
};
use executor::mock::MockExecutor;
use store::Store;

async fn fixture(node_count: usize, free_per_device: u64) -> (Store, ClusterId, Vec<NodeId>, Vec<DeviceId>) {
    let dir = std::env::temp_dir().join(format!("volmgr-scenario-{}-{}", std::process::id(), uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Store::open(dir.join("store.json")).await.unwrap();

    let cluster_id = ClusterId::new();
    let mut txn = store.begin_update().await;
    let mut node_ids = Vec::new();
    let mut device_ids = Vec::new();
    let mut cluster_nodes = BTreeSet::new();
    for i in 0..node_count {
        let node_id = NodeId::new();
        let device_id = DeviceId::new();
        txn.put_device(Device {
            id: device_id,
            node_id,
            name: "/dev/sdb".into(),
            total_size: free_per_device,
            free_size: free_per_device,
            bricks: BTreeSet::new(),
            online: true,
        });
        let mut devices = BTreeSet::new();
        devices.insert(device_id);
        txn.put_node(Node {
            id: node_id,
            cluster_id,
            manage_hostname: format!("node{i}"),
            storage_hostnames: vec![format!("node{i}-storage")],
            devices,
            online: true,
        });
        node_ids.push(node_id);
        device_ids.push(device_id);
        cluster_nodes.insert(node_id);
    }
    let mut cluster = Cluster::new(cluster_id);
    cluster.nodes = cluster_nodes;
    txn.put_cluster(cluster);
    txn.commit().unwrap();

    (store, cluster_id, node_ids, device_ids)
}

fn empty_volume(id: VolumeId, cluster_id: ClusterId, durability: DurabilityProfile) -> Volume {
    Volume {
        id,
        cluster_id,
        name: "vol0".into(),
        durability,
        snapshot_factor: 1.0,
        group_id: 0,
        size: 0,
        bricks: Vec::new(),
    }
}

/// Scenario 1: clean create, replicate-3 across 3 nodes.
#[tokio::test]
async fn clean_create_places_a_replicated_volume() {
    let (store, cluster_id, _node_ids, _device_ids) = fixture(3, 6_000 * GB).await;

    let volume_id = VolumeId::new();
    let mut txn = store.begin_update().await;
    txn.put_volume(empty_volume(volume_id, cluster_id, DurabilityProfile::Replicated { replica: 3 }));
    txn.commit().unwrap();

    let bricks = volmgr::alloc_bricks_in_cluster(&store, volume_id, 1024, common::BRICK_MAX_NUM)
        .await
        .unwrap();
    assert_eq!(bricks.len(), 3);
    let nodes: BTreeSet<_> = bricks.iter().map(|b| b.node_id).collect();
    assert_eq!(nodes.len(), 3);

    let view = store.view().await;
    let volume = view.volume(volume_id).unwrap();
    assert_eq!(volume.bricks.len(), 3);
}

/// Scenario 3: the first candidate size doesn't fit, the driver retries
/// with a smaller one and leaves nothing behind from the failed attempts.
#[tokio::test]
async fn size_shrink_retry_leaves_no_partial_state() {
    // 9 nodes, each with room for half the requested size: the first
    // candidate (one set, full size) needs a single device to hold the
    // whole volume and fails everywhere; the next candidate (two sets,
    // half size, spread across more of the 9 nodes) fits.
    let requested_gb = 8;
    let (store, cluster_id, _node_ids, _device_ids) = fixture(9, (requested_gb * GB) / 2).await;

    let volume_id = VolumeId::new();
    let mut txn = store.begin_update().await;
    txn.put_volume(empty_volume(volume_id, cluster_id, DurabilityProfile::Replicated { replica: 3 }));
    txn.commit().unwrap();

    let bricks = volmgr::alloc_bricks_in_cluster(&store, volume_id, requested_gb, common::BRICK_MAX_NUM)
        .await
        .unwrap();
    assert!(!bricks.is_empty());

    let view = store.view().await;
    let volume = view.volume(volume_id).unwrap();
    assert_eq!(volume.bricks.len(), bricks.len());
    for brick in &bricks {
        assert!(view.brick(brick.id).is_some());
    }
}

/// Scenario 4: a volume already near the brick ceiling refuses an
/// allocation that would push it over, with zero persistence.
#[tokio::test]
async fn ceiling_refusal_persists_nothing() {
    let (store, cluster_id, _node_ids, _device_ids) = fixture(3, 6_000 * GB).await;

    let volume_id = VolumeId::new();
    let mut volume = empty_volume(volume_id, cluster_id, DurabilityProfile::Replicated { replica: 3 });
    volume.bricks = (0..common::BRICK_MAX_NUM - 1).map(|_| BrickId::new()).collect();
    let mut txn = store.begin_update().await;
    txn.put_volume(volume);
    txn.commit().unwrap();

    let result = volmgr::alloc_bricks_in_cluster(&store, volume_id, 1024, common::BRICK_MAX_NUM).await;
    assert!(matches!(result, Err(common::CoreError::MaxBricks { .. })));

    let view = store.view().await;
    assert_eq!(view.volume(volume_id).unwrap().bricks.len(), common::BRICK_MAX_NUM - 1);
}

async fn seed_replicated_volume(store: &Store, cluster_id: ClusterId, node_ids: &[NodeId], device_ids: &[DeviceId]) -> (VolumeId, Vec<BrickId>) {
    let volume_id = VolumeId::new();
    let mut txn = store.begin_update().await;
    let mut bricks = Vec::new();
    for i in 0..3 {
        let brick_id = BrickId::new();
        let brick = Brick {
            id: brick_id,
            volume_id,
            device_id: device_ids[i],
            node_id: node_ids[i],
            path: format!("/bricks/vol0/{brick_id}"),
            size: 10,
            total_size: 10,
        };
        let mut device = txn.device(device_ids[i]).unwrap();
        device.free_size -= 10;
        device.bricks.insert(brick_id);
        txn.put_device(device);
        txn.put_brick(brick);
        bricks.push(brick_id);
    }
    txn.put_volume(Volume {
        id: volume_id,
        cluster_id,
        name: "vol0".into(),
        durability: DurabilityProfile::Replicated { replica: 3 },
        snapshot_factor: 1.0,
        group_id: 0,
        size: 30,
        bricks: bricks.clone(),
    });
    txn.commit().unwrap();
    (volume_id, bricks)
}

/// Scenario 5: replace happy path lands the new brick on a distinct node
/// and destroys the old brick remotely.
#[tokio::test]
async fn replace_happy_path_destroys_the_old_brick_remotely() {
    let (store, cluster_id, node_ids, device_ids) = fixture(4, 100).await;
    let (volume_id, bricks) = seed_replicated_volume(&store, cluster_id, &node_ids, &device_ids).await;
    let old_brick_id = bricks[0];

    let executor = MockExecutor::new();
    executor.set_volume_info(
        "vol0",
        executor::VolumeInfo { bricks_online: bricks.clone(), bricks_offline: Vec::new() },
    );

    let new_brick = volmgr::replace_brick(&store, &executor, volume_id, old_brick_id).await.unwrap();
    assert_ne!(new_brick.node_id, node_ids[0]);
    assert_ne!(new_brick.node_id, node_ids[1]);
    assert_ne!(new_brick.node_id, node_ids[2]);

    let destroyed_old = executor.calls().into_iter().any(|call| {
        matches!(call, executor::mock::Call::DestroyBricks(specs) if specs.iter().any(|s| s.brick_id == old_brick_id))
    });
    assert!(destroyed_old, "expected the old brick to be destroyed on the remote node");

    let view = store.view().await;
    let volume = view.volume(volume_id).unwrap();
    assert!(volume.bricks.contains(&new_brick.id));
    assert!(!volume.bricks.contains(&old_brick_id));
}

/// Scenario 6: replace is refused when the old brick is an active heal
/// source; no remote swap is ever issued.
#[tokio::test]
async fn replace_refused_on_active_heal_source_issues_no_swap() {
    let (store, cluster_id, node_ids, device_ids) = fixture(4, 100).await;
    let (volume_id, bricks) = seed_replicated_volume(&store, cluster_id, &node_ids, &device_ids).await;
    let old_brick_id = bricks[0];

    let executor = MockExecutor::new();
    executor.set_volume_info(
        "vol0",
        executor::VolumeInfo { bricks_online: bricks.clone(), bricks_offline: Vec::new() },
    );
    executor.set_heal_info(
        "vol0",
        executor::HealInfo { active_heal_sources: vec![old_brick_id], unreachable: Vec::new() },
    );

    let result = volmgr::replace_brick(&store, &executor, volume_id, old_brick_id).await;
    assert!(matches!(result, Err(common::CoreError::HealSourceConflict { .. })));

    let swapped = executor
        .calls()
        .into_iter()
        .any(|call| matches!(call, executor::mock::Call::ReplaceBrick { .. }));
    assert!(!swapped, "no remote swap should be issued once the safety check refuses");

    let view = store.view().await;
    let volume = view.volume(volume_id).unwrap();
    assert!(volume.bricks.contains(&old_brick_id));
}

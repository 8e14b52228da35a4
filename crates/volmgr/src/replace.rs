//! Replace-brick coordinator: swaps one brick in a live volume for a new
//! one on a different fault domain, per spec.md §4.5's eight phases.
//!
//! Compensations are explicit, not exception unwinding: each step that
//! claims a resource records what undoing it would take, and a failure
//! before the external swap (P7) runs those undos in reverse order. After
//! P7 the swap is a fact of the outside world and nothing is undone.

use tracing::{info, warn};

use common::{Brick, BrickId, CoreError, CoreResult, VolumeId};
use executor::{BrickSpec, VolumeExecutor};
use store::Store;

use crate::{physical_size, seed_from_uuid};

fn brick_spec(brick: &Brick, host: &str) -> BrickSpec {
    BrickSpec {
        brick_id: brick.id,
        host: host.to_string(),
        path: brick.path.clone(),
    }
}

/// Replaces `old_brick_id` in `volume_id` with a freshly allocated brick on
/// a node outside the containing set's fault domain. Returns the new
/// brick on success.
pub async fn replace_brick<E: VolumeExecutor>(
    store: &Store,
    executor: &E,
    volume_id: VolumeId,
    old_brick_id: BrickId,
) -> CoreResult<Brick> {
    // P1. Resolve old.
    let view = store.view().await;
    let volume = view
        .volume(volume_id)
        .ok_or_else(|| CoreError::not_found_volume(volume_id))?;

    if matches!(volume.durability, common::DurabilityProfile::DistributeOnly) {
        return Err(CoreError::UnsupportedDurability {
            reason: "distribute-only volumes have no replica to replace from".to_string(),
        });
    }

    let old_brick = view
        .brick(old_brick_id)
        .ok_or_else(|| CoreError::not_found_brick(old_brick_id))?;
    let _old_device = view
        .device(old_brick.device_id)
        .ok_or_else(|| CoreError::not_found_device(old_brick.device_id))?;
    let old_node = view
        .node(old_brick.node_id)
        .ok_or_else(|| CoreError::not_found_node(old_brick.node_id))?;

    // P2. Pick a management target.
    let mgmt_host = match executor.glusterd_check(old_node.id).await {
        Ok(()) => old_node
            .storage_hostname()
            .ok_or_else(|| CoreError::not_found_node(old_node.id))?
            .to_string(),
        Err(err) => {
            warn!(node_id = %old_node.id, error = %err, "old brick's node unreachable, looking for an alternative manage host");
            let mut alternative = None;
            for node in view.nodes_in_cluster(volume.cluster_id) {
                if node.id == old_node.id {
                    continue;
                }
                if executor.glusterd_check(node.id).await.is_ok() {
                    alternative = node.storage_hostname().map(str::to_string);
                    break;
                }
            }
            alternative.ok_or_else(|| CoreError::ExternalFailure {
                operation: "glusterd_check",
                source: anyhow::anyhow!("no reachable management node in cluster {}", volume.cluster_id),
            })?
        }
    };

    // P3. Reconstruct peer set from live volume info.
    let live = executor
        .volume_info(&volume.name)
        .await
        .map_err(|source| CoreError::ExternalFailure { operation: "volume_info", source })?;
    let bricks_in_set = volume.durability.bricks_in_set() as usize;

    let mut setlist: Option<Vec<BrickId>> = None;
    for stride in volume.bricks.chunks(bricks_in_set) {
        if stride.contains(&old_brick_id) {
            setlist = Some(stride.iter().filter(|id| **id != old_brick_id).copied().collect());
            break;
        }
    }
    let setlist = setlist.ok_or_else(|| {
        warn!(brick_id = %old_brick_id, volume_id = %volume_id, "db/live-state divergence: brick not found in any stride");
        CoreError::not_found_brick(old_brick_id)
    })?;

    if !live.bricks_online.contains(&old_brick_id) && !live.bricks_offline.contains(&old_brick_id) {
        warn!(brick_id = %old_brick_id, volume_id = %volume_id, "db/live-state divergence: brick unknown to the live volume info");
        return Err(CoreError::not_found_brick(old_brick_id));
    }

    // P4. Safety check.
    let heal = executor
        .heal_info(&volume.name)
        .await
        .map_err(|source| CoreError::ExternalFailure { operation: "heal_info", source })?;

    if heal.active_heal_sources.contains(&old_brick_id) {
        warn!(brick_id = %old_brick_id, "refusing replace: brick is an active heal source");
        return Err(CoreError::HealSourceConflict { brick_id: old_brick_id });
    }

    let online_peer_count = setlist.iter().filter(|id| !heal.unreachable.contains(id)).count() as u32;
    let required = volume.durability.quorum_brick_count();
    if online_peer_count < required {
        warn!(
            brick_id = %old_brick_id,
            online = online_peer_count,
            required,
            "refusing replace: set would drop below quorum"
        );
        return Err(CoreError::QuorumNotMet { online: online_peer_count, required });
    }

    // P5. Allocate replacement.
    let peer_nodes: Vec<_> = setlist
        .iter()
        .filter_map(|id| view.brick(*id))
        .map(|b| b.node_id)
        .collect();

    let seed_id = BrickId::new();
    let seed = seed_from_uuid(seed_id.as_uuid());
    let mut stream = allocator::allocate_stream(store.view().await, volume.cluster_id, seed);
    let total_size = physical_size(old_brick.size, volume.snapshot_factor);

    let mut allocated: Option<(common::DeviceId, Brick)> = None;
    loop {
        tokio::select! {
            biased;
            Ok(err) = &mut stream.errc => {
                return Err(err);
            }
            maybe_device = stream.devices.recv() => {
                let Some(device_id) = maybe_device else { break };
                if device_id == old_brick.device_id {
                    continue;
                }
                let Some(candidate_device) = view.device(device_id) else { continue };
                if peer_nodes.contains(&candidate_device.node_id) {
                    continue;
                }

                let mut txn = store.begin_update().await;
                let Some(mut device) = txn.device(device_id) else {
                    txn.rollback().map_err(|source| CoreError::Store { operation: "rollback_replace_probe", source })?;
                    continue;
                };
                if !device.has_space(total_size) {
                    txn.rollback().map_err(|source| CoreError::Store { operation: "rollback_replace_probe", source })?;
                    continue;
                }

                let brick_id = BrickId::new();
                let new_brick = Brick {
                    id: brick_id,
                    volume_id: volume.id,
                    device_id,
                    node_id: device.node_id,
                    path: format!("/bricks/{}/{}", volume.name, brick_id),
                    size: old_brick.size,
                    total_size,
                };
                device.free_size -= total_size;
                device.bricks.insert(brick_id);
                txn.put_device(device);
                txn.commit().map_err(|source| CoreError::Store { operation: "commit_replace_allocation", source })?;

                allocated = Some((device_id, new_brick));
                break;
            }
        }
    }
    stream.close();

    let Some((new_device_id, new_brick)) = allocated else {
        return Err(CoreError::NoReplacement { brick_id: old_brick_id });
    };

    info!(old_brick = %old_brick_id, new_brick = %new_brick.id, device_id = %new_device_id, "allocated replacement brick");

    let old_host = old_node.storage_hostname().unwrap_or_default().to_string();
    let new_node_host = view
        .node(new_brick.node_id)
        .and_then(|n| n.storage_hostname().map(str::to_string))
        .unwrap_or_default();

    let old_spec = brick_spec(&old_brick, &old_host);
    let new_spec = brick_spec(&new_brick, &new_node_host);

    // P6. Materialize the new brick.
    if let Err(source) = executor.create_bricks(std::slice::from_ref(&new_spec)).await {
        warn!(new_brick = %new_brick.id, error = %source, "failed to materialize replacement brick, compensating");
        compensate_allocation(store, new_device_id, &new_brick).await;
        return Err(CoreError::ExternalFailure { operation: "create_bricks", source });
    }

    // P7. External atomic swap.
    if let Err(source) = executor.replace_brick(&volume.name, &old_spec, &new_spec).await {
        warn!(old_brick = %old_brick_id, new_brick = %new_brick.id, error = %source, "remote swap failed, compensating");
        if let Err(destroy_err) = executor.destroy_bricks(std::slice::from_ref(&new_spec)).await {
            warn!(new_brick = %new_brick.id, error = %destroy_err, "failed to destroy uncommitted replacement brick during compensation");
        }
        compensate_allocation(store, new_device_id, &new_brick).await;
        return Err(CoreError::ExternalFailure { operation: "replace_brick", source });
    }

    // Past this point compensations are disarmed: the remote swap is a fact.
    info!(old_brick = %old_brick_id, new_brick = %new_brick.id, "remote swap committed, reconciling persistent state");

    // P8a. Best-effort destroy of the old brick.
    if let Err(err) = executor.destroy_bricks(std::slice::from_ref(&old_spec)).await {
        warn!(old_brick = %old_brick_id, error = %err, "best-effort destroy of old brick failed, continuing");
    }

    // P8b. Reconcile persistent state in one write transaction.
    let mut txn = store.begin_update().await;
    let reconcile: anyhow::Result<()> = (|| {
        let mut updated_volume = txn
            .volume(volume.id)
            .ok_or_else(|| anyhow::anyhow!("volume {} vanished during reconciliation", volume.id))?;
        if !updated_volume.bricks.contains(&new_brick.id) {
            updated_volume.bricks.push(new_brick.id);
        }
        txn.put_brick(new_brick.clone());
        txn.put_volume(updated_volume);
        registry::DeviceLedger::remove_brick(&mut txn, old_brick_id)
            .map_err(|err| anyhow::anyhow!(err))?;
        Ok(())
    })();

    match reconcile {
        Ok(()) => {
            if let Err(err) = txn.commit() {
                warn!(volume_id = %volume_id, error = %err, "failed to commit replace-brick reconciliation; persistent state may diverge from live state");
            }
        }
        Err(err) => {
            warn!(volume_id = %volume_id, error = %err, "replace-brick reconciliation step failed; persistent state may diverge from live state");
            let _ = txn.rollback();
        }
    }

    Ok(new_brick)
}

async fn compensate_allocation(store: &Store, device_id: common::DeviceId, brick: &Brick) {
    let mut txn = store.begin_update().await;
    if let Some(mut device) = txn.device(device_id) {
        device.bricks.remove(&brick.id);
        device.free_size += brick.total_size;
        txn.put_device(device);
    }
    txn.delete_brick(brick.id);
    match txn.commit() {
        Ok(()) => warn!(brick_id = %brick.id, "compensated failed replace-brick allocation"),
        Err(err) => warn!(brick_id = %brick.id, error = %err, "failed to compensate a failed replace-brick allocation"),
    }
}

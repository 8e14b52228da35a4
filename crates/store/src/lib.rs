//! Embedded transactional key-value store for cluster/node/device/brick/
//! volume state, persisted as a JSON sidecar file.
//!
//! Grounded on the teacher's NVRAM log: a single writer at a time, readers
//! clone a snapshot out from behind a lock instead of holding a guard
//! across an await point, and an unfinished transaction rolls itself back
//! on drop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use common::{Brick, BrickId, Cluster, ClusterId, Device, DeviceId, Node, NodeId, Update, View,
             Volume, VolumeId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    clusters: HashMap<ClusterId, Cluster>,
    nodes: HashMap<NodeId, Node>,
    devices: HashMap<DeviceId, Device>,
    bricks: HashMap<BrickId, Brick>,
    volumes: HashMap<VolumeId, Volume>,
}

/// A read-only clone of the store's committed state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(State);

impl View for Snapshot {
    fn cluster(&self, id: ClusterId) -> Option<Cluster> {
        self.0.clusters.get(&id).cloned()
    }

    fn node(&self, id: NodeId) -> Option<Node> {
        self.0.nodes.get(&id).cloned()
    }

    fn device(&self, id: DeviceId) -> Option<Device> {
        self.0.devices.get(&id).cloned()
    }

    fn brick(&self, id: BrickId) -> Option<Brick> {
        self.0.bricks.get(&id).cloned()
    }

    fn volume(&self, id: VolumeId) -> Option<Volume> {
        self.0.volumes.get(&id).cloned()
    }

    fn nodes_in_cluster(&self, cluster_id: ClusterId) -> Vec<Node> {
        match self.0.clusters.get(&cluster_id) {
            Some(cluster) => cluster
                .nodes
                .iter()
                .filter_map(|id| self.0.nodes.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    fn devices_on_node(&self, node_id: NodeId) -> Vec<Device> {
        match self.0.nodes.get(&node_id) {
            Some(node) => node
                .devices
                .iter()
                .filter_map(|id| self.0.devices.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// The embedded store. Cheap to clone: state lives behind an `Arc`.
#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<State>>,
    write_permit: Arc<Mutex<()>>,
    path: PathBuf,
}

impl Store {
    /// Opens (or creates) the store at `path`, loading persisted state if
    /// the file already exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let data = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading store file {}", path.display()))?;
            serde_json::from_str(&data).context("parsing store file")?
        } else {
            State::default()
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            write_permit: Arc::new(Mutex::new(())),
            path,
        })
    }

    /// A cheap read-only snapshot of the current committed state.
    pub async fn view(&self) -> Snapshot {
        let guard = self.state.read().unwrap();
        Snapshot(guard.clone())
    }

    /// Begins a write transaction. Blocks until any in-flight transaction
    /// commits or rolls back; the store allows exactly one writer at a
    /// time.
    pub async fn begin_update(&self) -> UpdateTxn {
        let permit = Arc::clone(&self.write_permit).lock_owned().await;
        let pending = self.state.read().unwrap().clone();
        debug!("opened write transaction");
        UpdateTxn {
            _permit: permit,
            state: Arc::clone(&self.state),
            path: self.path.clone(),
            pending,
            finalized: false,
        }
    }
}

/// A single in-flight write transaction. Holds the store's write permit
/// for its whole lifetime, so at most one `UpdateTxn` exists at a time.
pub struct UpdateTxn {
    _permit: OwnedMutexGuard<()>,
    state: Arc<RwLock<State>>,
    path: PathBuf,
    pending: State,
    finalized: bool,
}

impl View for UpdateTxn {
    fn cluster(&self, id: ClusterId) -> Option<Cluster> {
        self.pending.clusters.get(&id).cloned()
    }

    fn node(&self, id: NodeId) -> Option<Node> {
        self.pending.nodes.get(&id).cloned()
    }

    fn device(&self, id: DeviceId) -> Option<Device> {
        self.pending.devices.get(&id).cloned()
    }

    fn brick(&self, id: BrickId) -> Option<Brick> {
        self.pending.bricks.get(&id).cloned()
    }

    fn volume(&self, id: VolumeId) -> Option<Volume> {
        self.pending.volumes.get(&id).cloned()
    }

    fn nodes_in_cluster(&self, cluster_id: ClusterId) -> Vec<Node> {
        match self.pending.clusters.get(&cluster_id) {
            Some(cluster) => cluster
                .nodes
                .iter()
                .filter_map(|id| self.pending.nodes.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    fn devices_on_node(&self, node_id: NodeId) -> Vec<Device> {
        match self.pending.nodes.get(&node_id) {
            Some(node) => node
                .devices
                .iter()
                .filter_map(|id| self.pending.devices.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}

impl Update for UpdateTxn {
    fn put_cluster(&mut self, cluster: Cluster) {
        self.pending.clusters.insert(cluster.id, cluster);
    }

    fn put_device(&mut self, device: Device) {
        self.pending.devices.insert(device.id, device);
    }

    fn put_brick(&mut self, brick: Brick) {
        self.pending.bricks.insert(brick.id, brick);
    }

    fn delete_brick(&mut self, id: BrickId) {
        self.pending.bricks.remove(&id);
    }

    fn put_volume(&mut self, volume: Volume) {
        self.pending.volumes.insert(volume.id, volume);
    }

    fn put_node(&mut self, node: Node) {
        self.pending.nodes.insert(node.id, node);
    }

    fn commit(mut self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.pending).context("serializing store state")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing store file {}", self.path.display()))?;

        let mut state = self.state.write().unwrap();
        *state = self.pending.clone();
        drop(state);

        self.finalized = true;
        debug!("committed write transaction");
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.finalized = true;
        debug!("rolled back write transaction");
        Ok(())
    }
}

impl Drop for UpdateTxn {
    fn drop(&mut self) {
        if !self.finalized {
            warn!("write transaction dropped without commit or rollback; discarding pending writes");
        }
    }
}

//! Allocator stream: walks a cluster's devices in a deterministic,
//! consistent-hash order and feeds candidates to the placement engine over
//! a bounded channel.
//!
//! Grounded on the teacher's `MeshNode` channel-ownership pattern: the
//! producer task and its channel endpoints are wrapped in one guard so
//! closing out the `done` signal is structural rather than a per-call-site
//! discipline the caller has to remember.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use common::{ClusterId, CoreError, DeviceId, View};

/// Producer-side channel is bounded; a slow consumer applies backpressure
/// to the producer rather than letting candidates pile up in memory.
const CHANNEL_CAPACITY: usize = 32;

/// Handle to a running allocator stream. Dropping it signals the producer
/// to stop walking the ring, even if the consumer never reads `errc`.
pub struct AllocatorStream {
    pub devices: mpsc::Receiver<DeviceId>,
    pub errc: oneshot::Receiver<CoreError>,
    done_tx: Option<oneshot::Sender<()>>,
}

impl AllocatorStream {
    /// Stops the producer and releases the stream's resources. Equivalent
    /// to dropping the handle, spelled out for callers that want the
    /// shutdown to be visible at the call site.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for AllocatorStream {
    fn drop(&mut self) {
        if let Some(done_tx) = self.done_tx.take() {
            let _ = done_tx.send(());
        }
    }
}

/// Starts an allocator stream over every device in `cluster_id`, ordered by
/// a deterministic hash of `(seed, device_id)` so repeated calls with the
/// same seed walk devices in the same order.
pub fn allocate_stream<V>(view: V, cluster_id: ClusterId, seed: u64) -> AllocatorStream
where
    V: View + 'static,
{
    let (device_tx, device_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (errc_tx, errc_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(run_producer(view, cluster_id, seed, device_tx, errc_tx, done_rx));

    AllocatorStream {
        devices: device_rx,
        errc: errc_rx,
        done_tx: Some(done_tx),
    }
}

async fn run_producer<V: View>(
    view: V,
    cluster_id: ClusterId,
    seed: u64,
    device_tx: mpsc::Sender<DeviceId>,
    errc_tx: oneshot::Sender<CoreError>,
    mut done_rx: oneshot::Receiver<()>,
) {
    let Some(cluster) = view.cluster(cluster_id) else {
        let _ = errc_tx.send(CoreError::NotFound {
            what: "cluster",
            id: cluster_id.to_string(),
        });
        return;
    };

    let mut devices: Vec<DeviceId> = cluster
        .nodes
        .iter()
        .flat_map(|node_id| view.devices_on_node(*node_id))
        .map(|device| device.id)
        .collect();
    devices.sort_by_key(|device_id| ring_hash(seed, device_id));

    debug!(cluster_id = %cluster_id, count = devices.len(), "allocator stream starting");

    for device_id in devices {
        tokio::select! {
            biased;
            _ = &mut done_rx => {
                debug!(cluster_id = %cluster_id, "allocator stream cancelled by consumer");
                return;
            }
            send_result = device_tx.send(device_id) => {
                if send_result.is_err() {
                    debug!(cluster_id = %cluster_id, "allocator stream consumer dropped");
                    return;
                }
            }
        }
    }

    debug!(cluster_id = %cluster_id, "allocator stream exhausted the ring");
}

fn ring_hash(seed: u64, device_id: &DeviceId) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    device_id.hash(&mut hasher);
    hasher.finish()
}

/// Drains `stream` into a `Vec`, honoring a deferred error sent on `errc`.
/// Grounded on the "consumer owns draining, producer owns the error" split
/// spec.md describes for the allocator stream's contract.
pub async fn collect(mut stream: AllocatorStream) -> Result<Vec<DeviceId>, CoreError> {
    let mut collected = Vec::new();
    loop {
        tokio::select! {
            biased;
            Ok(err) = &mut stream.errc => {
                warn!(error = %err, "allocator stream reported an error");
                return Err(err);
            }
            maybe_device = stream.devices.recv() => {
                match maybe_device {
                    Some(device_id) => collected.push(device_id),
                    None => return Ok(collected),
                }
            }
        }
    }
}

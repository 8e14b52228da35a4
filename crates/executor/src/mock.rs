//! In-memory [`VolumeExecutor`] double for tests: records every call it
//! receives and answers from canned fixtures instead of touching real
//! bricks.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use common::NodeId;

use crate::{BrickSpec, HealInfo, VolumeExecutor, VolumeInfo};

#[derive(Debug, Clone)]
pub enum Call {
    GlusterdCheck(NodeId),
    VolumeInfo(String),
    HealInfo(String),
    CreateBricks(Vec<BrickSpec>),
    DestroyBricks(Vec<BrickSpec>),
    ReplaceBrick {
        volume_name: String,
        old: BrickSpec,
        new: BrickSpec,
    },
}

/// Records calls in order; seed [`MockExecutor::fail_nodes`] or
/// [`MockExecutor::volume_infos`] to script specific responses.
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<Call>>,
    fail_nodes: Mutex<Vec<NodeId>>,
    volume_infos: Mutex<HashMap<String, VolumeInfo>>,
    heal_infos: Mutex<HashMap<String, HealInfo>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Makes [`VolumeExecutor::glusterd_check`] fail for `node`.
    pub fn fail_node(&self, node: NodeId) {
        self.fail_nodes.lock().unwrap().push(node);
    }

    pub fn set_volume_info(&self, volume_name: impl Into<String>, info: VolumeInfo) {
        self.volume_infos.lock().unwrap().insert(volume_name.into(), info);
    }

    pub fn set_heal_info(&self, volume_name: impl Into<String>, info: HealInfo) {
        self.heal_infos.lock().unwrap().insert(volume_name.into(), info);
    }
}

impl Clone for Call {
    fn clone(&self) -> Self {
        match self {
            Call::GlusterdCheck(n) => Call::GlusterdCheck(*n),
            Call::VolumeInfo(v) => Call::VolumeInfo(v.clone()),
            Call::HealInfo(v) => Call::HealInfo(v.clone()),
            Call::CreateBricks(b) => Call::CreateBricks(b.clone()),
            Call::DestroyBricks(b) => Call::DestroyBricks(b.clone()),
            Call::ReplaceBrick { volume_name, old, new } => Call::ReplaceBrick {
                volume_name: volume_name.clone(),
                old: old.clone(),
                new: new.clone(),
            },
        }
    }
}

impl VolumeExecutor for MockExecutor {
    fn glusterd_check<'a>(&'a self, node: NodeId) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::GlusterdCheck(node));
            if self.fail_nodes.lock().unwrap().contains(&node) {
                anyhow::bail!("glusterd unreachable on {node}");
            }
            Ok(())
        })
    }

    fn volume_info<'a>(&'a self, volume_name: &'a str) -> BoxFuture<'a, anyhow::Result<VolumeInfo>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::VolumeInfo(volume_name.to_string()));
            Ok(self
                .volume_infos
                .lock()
                .unwrap()
                .get(volume_name)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn heal_info<'a>(&'a self, volume_name: &'a str) -> BoxFuture<'a, anyhow::Result<HealInfo>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::HealInfo(volume_name.to_string()));
            Ok(self
                .heal_infos
                .lock()
                .unwrap()
                .get(volume_name)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn create_bricks<'a>(&'a self, bricks: &'a [BrickSpec]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::CreateBricks(bricks.to_vec()));
            Ok(())
        })
    }

    fn destroy_bricks<'a>(&'a self, bricks: &'a [BrickSpec]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::DestroyBricks(bricks.to_vec()));
            Ok(())
        })
    }

    fn replace_brick<'a>(
        &'a self,
        volume_name: &'a str,
        old: &'a BrickSpec,
        new: &'a BrickSpec,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::ReplaceBrick {
                volume_name: volume_name.to_string(),
                old: old.clone(),
                new: new.clone(),
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let exec = MockExecutor::new();
        let node = NodeId::new();
        exec.glusterd_check(node).await.unwrap();
        exec.volume_info("vol0").await.unwrap();
        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::GlusterdCheck(n) if n == node));
    }

    #[tokio::test]
    async fn fail_node_makes_check_fail() {
        let exec = MockExecutor::new();
        let node = NodeId::new();
        exec.fail_node(node);
        assert!(exec.glusterd_check(node).await.is_err());
    }
}

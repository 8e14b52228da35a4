//! JSON-line RPC client for a real storage-node agent.
//!
//! Grounded on the teacher's `MeshNode` gossip client: connect a plain
//! `TcpStream`, write one newline-terminated frame, read one back, shut
//! the write half down. No connection pooling or retries -- the
//! replace-brick coordinator above this owns retry policy.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use common::NodeId;

use crate::{BrickSpec, HealInfo, VolumeExecutor, VolumeInfo};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    GlusterdCheck,
    VolumeInfo { volume_name: &'a str },
    HealInfo { volume_name: &'a str },
    CreateBricks { bricks: &'a [BrickSpec] },
    DestroyBricks { bricks: &'a [BrickSpec] },
    ReplaceBrick {
        volume_name: &'a str,
        old: &'a BrickSpec,
        new: &'a BrickSpec,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Response<T> {
    Ok(T),
    Err { error: String },
}

/// Talks to the agent listening on a node's management address.
pub struct TcpExecutor {
    /// `host:port` of each node's agent, keyed by node id.
    addresses: std::collections::HashMap<NodeId, String>,
}

impl TcpExecutor {
    pub fn new(addresses: std::collections::HashMap<NodeId, String>) -> Self {
        Self { addresses }
    }

    fn address(&self, node: NodeId) -> anyhow::Result<&str> {
        self.addresses
            .get(&node)
            .map(String::as_str)
            .ok_or_else(|| anyhow::anyhow!("no known agent address for node {node}"))
    }

    async fn roundtrip<T: for<'de> Deserialize<'de>>(
        addr: &str,
        request: &Request<'_>,
    ) -> anyhow::Result<T> {
        let mut stream = TcpStream::connect(addr).await?;
        let mut frame = serde_json::to_vec(request)?;
        frame.push(b'\n');
        stream.write_all(&frame).await?;
        stream.shutdown().await.ok();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        debug!(%addr, response = %line.trim(), "executor rpc roundtrip");

        match serde_json::from_str::<Response<T>>(&line)? {
            Response::Ok(value) => Ok(value),
            Response::Err { error } => Err(anyhow::anyhow!(error)),
        }
    }
}

/// Any storage node's agent only needs an address to be reached at; we
/// resolve `node` to an address and target that for every per-node call.
/// Bricks carry their own `host` and are addressed by that directly.
impl VolumeExecutor for TcpExecutor {
    fn glusterd_check<'a>(&'a self, node: NodeId) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let addr = self.address(node)?;
            Self::roundtrip(addr, &Request::GlusterdCheck).await
        })
    }

    fn volume_info<'a>(&'a self, volume_name: &'a str) -> BoxFuture<'a, anyhow::Result<VolumeInfo>> {
        Box::pin(async move {
            let addr = self
                .addresses
                .values()
                .next()
                .ok_or_else(|| anyhow::anyhow!("no agents configured"))?;
            Self::roundtrip(addr, &Request::VolumeInfo { volume_name }).await
        })
    }

    fn heal_info<'a>(&'a self, volume_name: &'a str) -> BoxFuture<'a, anyhow::Result<HealInfo>> {
        Box::pin(async move {
            let addr = self
                .addresses
                .values()
                .next()
                .ok_or_else(|| anyhow::anyhow!("no agents configured"))?;
            Self::roundtrip(addr, &Request::HealInfo { volume_name }).await
        })
    }

    fn create_bricks<'a>(&'a self, bricks: &'a [BrickSpec]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let addr = bricks
                .first()
                .map(|b| b.host.as_str())
                .ok_or_else(|| anyhow::anyhow!("create_bricks called with no bricks"))?;
            Self::roundtrip(addr, &Request::CreateBricks { bricks }).await
        })
    }

    fn destroy_bricks<'a>(&'a self, bricks: &'a [BrickSpec]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let addr = bricks
                .first()
                .map(|b| b.host.as_str())
                .ok_or_else(|| anyhow::anyhow!("destroy_bricks called with no bricks"))?;
            Self::roundtrip(addr, &Request::DestroyBricks { bricks }).await
        })
    }

    fn replace_brick<'a>(
        &'a self,
        volume_name: &'a str,
        old: &'a BrickSpec,
        new: &'a BrickSpec,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            Self::roundtrip(
                &old.host,
                &Request::ReplaceBrick { volume_name, old, new },
            )
            .await
        })
    }
}

//! `BlockAllocator`: the consumer of [`crate::placement`]'s output.
//!
//! Named so [`crate::placement::analyze_chunk_placement`]'s remove/allocate
//! lists have a documented destination. The actual placement of bytes on
//! storage nodes is explicitly out of scope for this crate; no
//! implementation is provided. The analyzer never calls this trait itself -
//! it returns data, the caller actuates it.

use async_trait::async_trait;

use crate::{
    ids::{ChunkId, NodeId, PoolId},
    placement::BlockInfo,
};

/// Where a new block replica should be allocated, and what to avoid.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub chunk: ChunkId,
    pub avoid_nodes: Vec<NodeId>,
    pub pools: Vec<PoolId>,
    /// Existing accessible block to replicate from, chosen round-robin by
    /// the analyzer.
    pub source: BlockInfo,
}

/// Consumer-side interface driven by [`crate::placement::AnalysisResult`].
#[async_trait]
pub trait BlockAllocator: Send + Sync {
    async fn allocate_block(&self, request: AllocationRequest) -> Result<(), AllocationError>;
    async fn remove_blocks(&self, blocks: Vec<BlockInfo>) -> Result<(), AllocationError>;
}

#[derive(Debug, thiserror::Error)]
#[error("block allocator operation failed: {0}")]
pub struct AllocationError(pub String);

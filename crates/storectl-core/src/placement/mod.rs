//! Chunk placement analyzer.
//!
//! A pure, synchronous function over fully-hydrated inputs: no
//! `&dyn DocumentStore`, no `&dyn ClusterNotifier`, no `.await`. Given a
//! chunk, every known block replicated for it, and the pool set its tiering
//! policy targets, it classifies block liveness, computes per-fragment and
//! chunk health, and returns what should be removed and what should be
//! allocated - it never calls the allocator itself.

mod classify;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

pub use classify::{block_access_sort, classify_block, BlockClass};

use crate::{
    config::PlacementConfig,
    ids::{BlockId, ChunkId, NodeId, PoolId, SystemId, TierId},
    model::{DataPlacement, SrvMode, Tier},
};

/// This version only analyzes data fragments; parity is a documented open
/// item and never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Data,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub system: SystemId,
    pub tier: TierId,
    pub size: u64,
    pub data_frags: usize,
}

/// A known replica of one fragment of a chunk, fully hydrated: the node's
/// pool, heartbeat, and service mode have already been resolved by the
/// caller through the Catalog Snapshot - the analyzer does not dereference
/// anything itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: BlockId,
    pub node: NodeId,
    pub pool: PoolId,
    pub heartbeat: DateTime<Utc>,
    pub srvmode: Option<SrvMode>,
    /// Set while the block is still being written; `None` once finished.
    pub building: Option<DateTime<Utc>>,
    pub layer: Layer,
    pub frag: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentHealth {
    Healthy,
    Repairing,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkHealth {
    Available,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct FragmentAnalysis {
    pub frag: usize,
    pub health: FragmentHealth,
    pub good: Vec<BlockInfo>,
    pub long_gone: Vec<BlockInfo>,
    pub short_gone: Vec<BlockInfo>,
    pub long_building: Vec<BlockInfo>,
    pub building: Vec<BlockInfo>,
    pub accessible_other: Vec<BlockInfo>,
    /// `good ∪ accessible_other` from policy blocks, plus any accessible
    /// replica found among `other_blocks` for this fragment - source pool
    /// for repair allocation requests is drawn from here, round-robin.
    pub accessible_blocks: Vec<BlockInfo>,
}

#[derive(Debug, Clone)]
pub struct AllocateRequest {
    pub system: SystemId,
    pub tier: TierId,
    pub chunk: ChunkId,
    pub layer: Layer,
    pub frag: usize,
    pub source: BlockInfo,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub chunk: ChunkId,
    pub all_blocks: Vec<BlockInfo>,
    pub frags: Vec<FragmentAnalysis>,
    pub blocks_info_to_allocate: Vec<AllocateRequest>,
    pub blocks_to_remove: Vec<BlockInfo>,
    pub chunk_health: ChunkHealth,
}

/// Derives the pool groups a tier's placement policy targets.
///
/// `MIRROR` keeps each pool as its own group (`[[p1], [p2], ...]`); `SPREAD`
/// combines every pool into a single group (`[[p1, p2, ...]]`).
#[must_use]
pub fn get_pools_groups(tier: &Tier) -> Vec<Vec<PoolId>> {
    match tier.data_placement {
        DataPlacement::Mirror => tier.pools.iter().map(|p| vec![*p]).collect(),
        DataPlacement::Spread => vec![tier.pools.clone()],
    }
}

/// The pure analysis entry point.
///
/// `pool_groups` is flattened into a single target pool set for this
/// version - per-group mirror-aware analysis is the documented extension
/// point, not implemented here.
#[must_use]
pub fn analyze_chunk_placement(
    chunk: ChunkRecord,
    allocated_blocks: &[BlockInfo],
    pool_groups: &[Vec<PoolId>],
    now: DateTime<Utc>,
    config: &PlacementConfig,
) -> AnalysisResult {
    let target_pools: HashSet<PoolId> = pool_groups.iter().flatten().copied().collect();

    let (policy_blocks, other_blocks): (Vec<BlockInfo>, Vec<BlockInfo>) = allocated_blocks
        .iter()
        .copied()
        .partition(|b| target_pools.contains(&b.pool));

    let mirrored_pool = policy_blocks.is_empty();

    let mut frags = Vec::with_capacity(chunk.data_frags);
    let mut blocks_to_remove = Vec::new();
    let mut blocks_info_to_allocate = Vec::new();
    let mut any_unavailable = false;

    for frag in 0..chunk.data_frags {
        let mut fragment_policy_blocks: Vec<BlockInfo> =
            policy_blocks.iter().copied().filter(|b| b.frag == frag).collect();
        let fragment_other_blocks: Vec<BlockInfo> =
            other_blocks.iter().copied().filter(|b| b.frag == frag).collect();

        block_access_sort(&mut fragment_policy_blocks);

        let mut good = Vec::new();
        let mut long_gone = Vec::new();
        let mut short_gone = Vec::new();
        let mut long_building = Vec::new();
        let mut building = Vec::new();
        let mut accessible_other = Vec::new();

        for block in &fragment_policy_blocks {
            match classify_block(block, now, config) {
                BlockClass::Good => good.push(*block),
                BlockClass::LongGone => long_gone.push(*block),
                BlockClass::ShortGone => short_gone.push(*block),
                BlockClass::LongBuilding => long_building.push(*block),
                BlockClass::Building => building.push(*block),
                BlockClass::AccessibleOther => accessible_other.push(*block),
            }
        }

        let mut accessible_blocks: Vec<BlockInfo> = good.iter().chain(&accessible_other).copied().collect();
        for block in &fragment_other_blocks {
            if classify_block(block, now, config).is_accessible() {
                accessible_blocks.push(*block);
            }
        }

        let health = if accessible_blocks.is_empty() {
            any_unavailable = true;
            FragmentHealth::Unavailable
        } else if good.len() < config.optimal_replicas || mirrored_pool {
            FragmentHealth::Repairing
        } else {
            FragmentHealth::Healthy
        };

        if good.len() > config.optimal_replicas {
            blocks_to_remove.extend(long_building.iter().copied());
            blocks_to_remove.extend(long_gone.iter().copied());
            blocks_to_remove.extend(good[config.optimal_replicas..].iter().copied());
        }

        if health == FragmentHealth::Repairing && !accessible_blocks.is_empty() {
            let num_to_add = config.optimal_replicas.saturating_sub(good.len());
            for i in 0..num_to_add {
                let source = accessible_blocks[i % accessible_blocks.len()];
                blocks_info_to_allocate.push(AllocateRequest {
                    system: chunk.system,
                    tier: chunk.tier,
                    chunk: chunk.id,
                    layer: Layer::Data,
                    frag,
                    source,
                });
            }
        }

        frags.push(FragmentAnalysis {
            frag,
            health,
            good,
            long_gone,
            short_gone,
            long_building,
            building,
            accessible_other,
            accessible_blocks,
        });
    }

    AnalysisResult {
        chunk: chunk.id,
        all_blocks: policy_blocks,
        frags,
        blocks_info_to_allocate,
        blocks_to_remove,
        chunk_health: if any_unavailable {
            ChunkHealth::Unavailable
        } else {
            ChunkHealth::Available
        },
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::ids::{BlockId, NodeId, SystemId, TierId};

    use super::*;

    fn chunk(data_frags: usize) -> ChunkRecord {
        ChunkRecord {
            id: ChunkId::new_random(),
            system: SystemId::new_random(),
            tier: TierId::new_random(),
            size: 4096,
            data_frags,
        }
    }

    fn block(pool: PoolId, frag: usize, heartbeat_age_secs: i64, srvmode: Option<SrvMode>) -> BlockInfo {
        BlockInfo {
            id: BlockId::new_random(),
            node: NodeId::new_random(),
            pool,
            heartbeat: Utc::now() - chrono::Duration::seconds(heartbeat_age_secs),
            srvmode,
            building: None,
            layer: Layer::Data,
            frag,
        }
    }

    #[test]
    fn s1_healthy_fragment_needs_no_action() {
        let config = PlacementConfig::default();
        let c = chunk(1);
        let pool = PoolId::new_random();
        let blocks = vec![block(pool, 0, 0, None), block(pool, 0, 0, None), block(pool, 0, 0, None)];
        let result = analyze_chunk_placement(c, &blocks, &[vec![pool]], Utc::now(), &config);

        assert_eq!(result.frags[0].health, FragmentHealth::Healthy);
        assert_eq!(result.chunk_health, ChunkHealth::Available);
        assert!(result.blocks_to_remove.is_empty());
        assert!(result.blocks_info_to_allocate.is_empty());
    }

    #[test]
    fn s2_repair_requests_exactly_the_shortfall() {
        let config = PlacementConfig::default();
        let c = chunk(1);
        let pool = PoolId::new_random();
        let blocks = vec![
            block(pool, 0, 0, None),
            block(pool, 0, 0, None),
            block(pool, 0, config.short_gone_threshold_secs as i64 + 1, None),
        ];
        let result = analyze_chunk_placement(c, &blocks, &[vec![pool]], Utc::now(), &config);

        assert_eq!(result.frags[0].health, FragmentHealth::Repairing);
        assert_eq!(result.blocks_info_to_allocate.len(), 1);
        assert!(result.blocks_to_remove.is_empty());
    }

    #[test]
    fn s3_surplus_and_stale_blocks_are_removed() {
        let config = PlacementConfig::default();
        let c = chunk(1);
        let pool = PoolId::new_random();
        let mut blocks: Vec<BlockInfo> = (0..5).map(|_| block(pool, 0, 0, None)).collect();
        blocks.push(block(pool, 0, config.long_gone_threshold_secs as i64 + 1, None));
        let mut long_building = block(pool, 0, 0, None);
        long_building.building = Some(Utc::now() - chrono::Duration::seconds(config.long_build_threshold_secs as i64 + 1));
        blocks.push(long_building);

        let result = analyze_chunk_placement(c, &blocks, &[vec![pool]], Utc::now(), &config);

        assert_eq!(result.blocks_to_remove.len(), 2 + 2);
        assert!(result.blocks_info_to_allocate.is_empty());
    }

    #[test]
    fn s4_all_gone_is_unavailable() {
        let config = PlacementConfig::default();
        let c = chunk(1);
        let pool = PoolId::new_random();
        let blocks: Vec<BlockInfo> = (0..3)
            .map(|_| block(pool, 0, config.long_gone_threshold_secs as i64 + 1, None))
            .collect();
        let result = analyze_chunk_placement(c, &blocks, &[vec![pool]], Utc::now(), &config);

        assert_matches!(result.frags[0].health, FragmentHealth::Unavailable);
        assert_matches!(result.chunk_health, ChunkHealth::Unavailable);
        assert!(result.blocks_info_to_allocate.is_empty());
    }

    #[test]
    fn s5_mirrored_pool_requests_a_full_replica_set() {
        let config = PlacementConfig::default();
        let c = chunk(1);
        let policy_pool = PoolId::new_random();
        let other_pool = PoolId::new_random();
        let blocks = vec![block(other_pool, 0, 0, None), block(other_pool, 0, 0, None)];

        let result = analyze_chunk_placement(c, &blocks, &[vec![policy_pool]], Utc::now(), &config);

        assert_eq!(result.frags[0].health, FragmentHealth::Repairing);
        assert_eq!(result.blocks_info_to_allocate.len(), config.optimal_replicas);
        for request in &result.blocks_info_to_allocate {
            assert_eq!(request.source.pool, other_pool);
        }
    }

    #[test]
    fn analyzer_is_idempotent() {
        let config = PlacementConfig::default();
        let c = chunk(1);
        let pool = PoolId::new_random();
        let blocks = vec![block(pool, 0, 0, None), block(pool, 0, 0, None)];
        let now = Utc::now();

        let first = analyze_chunk_placement(c, &blocks, &[vec![pool]], now, &config);
        let second = analyze_chunk_placement(c, &blocks, &[vec![pool]], now, &config);

        assert_eq!(first.blocks_to_remove.len(), second.blocks_to_remove.len());
        assert_eq!(first.blocks_info_to_allocate.len(), second.blocks_info_to_allocate.len());
    }

    #[test]
    fn mirror_placement_groups_one_pool_per_group() {
        let pools: Vec<PoolId> = (0..2).map(|_| PoolId::new_random()).collect();
        let tier = Tier {
            id: TierId::new_random(),
            system: SystemId::new_random(),
            name: "hot".to_string(),
            data_placement: DataPlacement::Mirror,
            pools: pools.clone(),
            deleted: None,
        };
        let groups = get_pools_groups(&tier);
        assert_eq!(groups, vec![vec![pools[0]], vec![pools[1]]]);
    }

    #[test]
    fn spread_placement_groups_all_pools_together() {
        let pools: Vec<PoolId> = (0..2).map(|_| PoolId::new_random()).collect();
        let tier = Tier {
            id: TierId::new_random(),
            system: SystemId::new_random(),
            name: "cold".to_string(),
            data_placement: DataPlacement::Spread,
            pools: pools.clone(),
            deleted: None,
        };
        let groups = get_pools_groups(&tier);
        assert_eq!(groups, vec![pools]);
    }
}

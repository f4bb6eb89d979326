//! Per-block liveness classification and the stable access-order sort used
//! before classification runs.

use chrono::{DateTime, Utc};

use crate::{config::PlacementConfig, model::SrvMode};

use super::{BlockInfo, Layer};

/// A block's primary liveness bucket. `AccessibleOther` covers the
/// `srvmode == decommissioning`, not-gone, not-building case: not `Good`,
/// but still counted into `accessible`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    LongGone,
    ShortGone,
    LongBuilding,
    Building,
    Good,
    AccessibleOther,
}

impl BlockClass {
    #[must_use]
    pub fn is_accessible(self) -> bool {
        matches!(self, BlockClass::Good | BlockClass::AccessibleOther)
    }

    #[must_use]
    pub fn is_good(self) -> bool {
        matches!(self, BlockClass::Good)
    }
}

/// Classifies one block's liveness as of `now`, per the waterfall in
/// `SPEC_FULL.md` section 4.4.
#[must_use]
pub fn classify_block(block: &BlockInfo, now: DateTime<Utc>, config: &PlacementConfig) -> BlockClass {
    let heartbeat_age = (now - block.heartbeat).num_seconds().max(0) as u64;

    if heartbeat_age > config.long_gone_threshold_secs || block.srvmode == Some(SrvMode::Disabled) {
        return BlockClass::LongGone;
    }
    if heartbeat_age > config.short_gone_threshold_secs {
        return BlockClass::ShortGone;
    }
    if let Some(building_since) = block.building {
        let build_age = (now - building_since).num_seconds().max(0) as u64;
        return if build_age > config.long_build_threshold_secs {
            BlockClass::LongBuilding
        } else {
            BlockClass::Building
        };
    }
    match block.srvmode {
        None => BlockClass::Good,
        Some(SrvMode::Decommissioning) => BlockClass::AccessibleOther,
        Some(SrvMode::Disabled) => unreachable!("disabled already routed to long_gone above"),
    }
}

/// Orders blocks the way `make_changes`'s repair decisions consume them:
/// building blocks last, any block with an `srvmode` set last among the
/// remainder, and otherwise most-recent heartbeat first. Ties are broken by
/// input order - this must be an explicitly stable sort (`slice::sort_by`),
/// not left to engine-default instability.
pub fn block_access_sort(blocks: &mut [BlockInfo]) {
    blocks.sort_by(|a, b| {
        let a_building = a.building.is_some();
        let b_building = b.building.is_some();
        if a_building != b_building {
            return a_building.cmp(&b_building);
        }
        let a_srvmode = a.srvmode.is_some();
        let b_srvmode = b.srvmode.is_some();
        if a_srvmode != b_srvmode {
            return a_srvmode.cmp(&b_srvmode);
        }
        b.heartbeat.cmp(&a.heartbeat)
    });
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::ids::{BlockId, NodeId, PoolId};

    use super::*;

    fn block(heartbeat_offset_secs: i64, srvmode: Option<SrvMode>, building: Option<i64>) -> BlockInfo {
        let now = Utc::now();
        BlockInfo {
            id: BlockId::new_random(),
            node: NodeId::new_random(),
            pool: PoolId::new_random(),
            heartbeat: now - chrono::Duration::seconds(heartbeat_offset_secs),
            srvmode,
            building: building.map(|secs| now - chrono::Duration::seconds(secs)),
            layer: Layer::Data,
            frag: 0,
        }
    }

    #[test]
    fn disabled_srvmode_is_long_gone_regardless_of_heartbeat() {
        let config = PlacementConfig::default();
        let b = block(0, Some(SrvMode::Disabled), None);
        assert_matches!(classify_block(&b, Utc::now(), &config), BlockClass::LongGone);
    }

    #[test]
    fn stale_heartbeat_past_long_gone_threshold_is_long_gone() {
        let config = PlacementConfig::default();
        let b = block(config.long_gone_threshold_secs as i64 + 1, None, None);
        assert_eq!(classify_block(&b, Utc::now(), &config), BlockClass::LongGone);
    }

    #[test]
    fn recent_block_with_no_srvmode_is_good() {
        let config = PlacementConfig::default();
        let b = block(0, None, None);
        assert_eq!(classify_block(&b, Utc::now(), &config), BlockClass::Good);
        assert!(classify_block(&b, Utc::now(), &config).is_accessible());
    }

    #[test]
    fn decommissioning_block_is_accessible_but_not_good() {
        let config = PlacementConfig::default();
        let b = block(0, Some(SrvMode::Decommissioning), None);
        let class = classify_block(&b, Utc::now(), &config);
        assert_eq!(class, BlockClass::AccessibleOther);
        assert!(class.is_accessible());
        assert!(!class.is_good());
    }

    #[test]
    fn sort_places_building_blocks_last() {
        let mut blocks = vec![block(0, None, Some(10)), block(0, None, None)];
        block_access_sort(&mut blocks);
        assert!(blocks[0].building.is_none());
        assert!(blocks[1].building.is_some());
    }

    #[test]
    fn sort_prefers_most_recent_heartbeat_among_equals() {
        let mut blocks = vec![block(100, None, None), block(0, None, None)];
        block_access_sort(&mut blocks);
        assert!(blocks[0].heartbeat > blocks[1].heartbeat);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let now = Utc::now();
        let a = BlockInfo {
            id: BlockId::new_random(),
            node: NodeId::new_random(),
            pool: PoolId::new_random(),
            heartbeat: now,
            srvmode: None,
            building: None,
            layer: Layer::Data,
            frag: 0,
        };
        let mut b = a.clone();
        b.id = BlockId::new_random();
        let mut blocks = vec![a.clone(), b.clone()];
        block_access_sort(&mut blocks);
        assert_eq!(blocks[0].id, a.id);
        assert_eq!(blocks[1].id, b.id);
    }
}

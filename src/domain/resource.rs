// ==========================================
// 插单排产系统 - 资源领域模型
// ==========================================
// 职责: 有限产能资源,持有块表与产能区间表
// ==========================================

use crate::domain::block::ResourceBlockList;
use crate::domain::capacity::ResourceCapacityIntervalList;
use crate::domain::ids::ResourceId;
use crate::domain::types::Ticks;

// ==========================================
// Resource - 资源
// ==========================================
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub blocks: ResourceBlockList,
    pub capacity: ResourceCapacityIntervalList,
}

impl Resource {
    pub fn new(id: ResourceId, name: impl Into<String>, capacity: ResourceCapacityIntervalList) -> Self {
        Self {
            id,
            name: name.into(),
            blocks: ResourceBlockList::new(id),
            capacity,
        }
    }

    /// 在 earliest 之后寻找可容纳 duration 个在线 tick 的最早空档
    ///
    /// # 返回
    /// - Some((start, end)): 不与已有块重叠的区间
    /// - None: 超出排程期仍找不到
    pub fn find_earliest_fit(&self, earliest: Ticks, duration: Ticks) -> Option<(Ticks, Ticks)> {
        let mut cursor = earliest;
        let mut hint = None;

        loop {
            let online = self.capacity.find_first_online(cursor, hint)?;
            hint = Some(online);
            let start = cursor.max(self.capacity.interval(online).start);
            let end = self.capacity.end_for_online_duration(start, duration)?;

            // 零时长工序不占块
            if end <= start {
                return Some((start, start));
            }

            match self.blocks.find_first_overlapping(start, end) {
                None => return Some((start, end)),
                Some(key) => {
                    cursor = self.blocks.get(key)?.end;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::block::Block;
    use crate::domain::capacity::CapacityInterval;
    use crate::domain::ids::{ActivityId, JobId, OperationId};
    use slotmap::SlotMap;

    fn resource_with_blocks(spans: &[(Ticks, Ticks)]) -> Resource {
        let mut ids: SlotMap<ResourceId, ()> = SlotMap::with_key();
        let mut jobs: SlotMap<JobId, ()> = SlotMap::with_key();
        let job = jobs.insert(());
        let capacity = ResourceCapacityIntervalList::from_spans(vec![
            CapacityInterval::new(0, 100, true),
            CapacityInterval::new(200, 1000, true),
        ])
        .unwrap();
        let mut resource = Resource::new(ids.insert(()), "R1", capacity);
        for (i, (start, end)) in spans.iter().enumerate() {
            resource
                .blocks
                .insert_sorted(Block {
                    start: *start,
                    end: *end,
                    requirement_index: 0,
                    activity: ActivityId {
                        job,
                        mo_index: 0,
                        operation: OperationId(i as u32),
                    },
                })
                .unwrap();
        }
        resource
    }

    #[test]
    fn test_fit_in_empty_resource() {
        let resource = resource_with_blocks(&[]);
        assert_eq!(resource.find_earliest_fit(10, 20), Some((10, 30)));
    }

    #[test]
    fn test_fit_skips_blocks_and_offline() {
        let resource = resource_with_blocks(&[(10, 90)]);
        // 90..100 只有 10 个在线 tick, 跨过离线段到 200
        assert_eq!(resource.find_earliest_fit(0, 20), Some((90, 210)));
    }

    #[test]
    fn test_fit_after_block_overlap() {
        let resource = resource_with_blocks(&[(200, 300), (310, 400)]);
        assert_eq!(resource.find_earliest_fit(200, 20), Some((400, 420)));
    }

    #[test]
    fn test_fit_past_horizon() {
        let resource = resource_with_blocks(&[]);
        assert_eq!(resource.find_earliest_fit(990, 20), None);
    }
}

// ==========================================
// 插单排产系统 - 资源块表
// ==========================================
// 职责: 单个资源上已承诺的作业块,按起点有序
// 红线: 同一资源上的块互不重叠,起点非递减
// 结构: 仓库节点 + 双向链接,插入为 O(1) 指针更新
// ==========================================

use crate::domain::error::{TimelineError, TimelineResult};
use crate::domain::ids::{ActivityId, BlockKey, BlockRef, ResourceId};
use crate::domain::types::Ticks;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

// ==========================================
// Block - 作业块
// ==========================================
// 放置后不再修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start: Ticks,              // 起点（含）
    pub end: Ticks,                // 终点（不含）
    pub requirement_index: usize,  // 满足的资源需求序号（即块 id）
    pub activity: ActivityId,      // 占用该块的活动
}

impl Block {
    pub fn contains(&self, point: Ticks) -> bool {
        self.start <= point && point < self.end
    }

    pub fn overlaps(&self, start: Ticks, end: Ticks) -> bool {
        self.start < end && start < self.end
    }
}

/// 插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// 成为新的首块
    BeforeAll,
    /// 插在指定块之后
    After(BlockKey),
}

#[derive(Debug, Clone)]
struct BlockNode {
    block: Block,
    prev: Option<BlockKey>,
    next: Option<BlockKey>,
}

// ==========================================
// ResourceBlockList - 资源块表
// ==========================================
#[derive(Debug, Clone)]
pub struct ResourceBlockList {
    resource: ResourceId,
    nodes: SlotMap<BlockKey, BlockNode>,
    head: Option<BlockKey>,
    tail: Option<BlockKey>,
}

impl ResourceBlockList {
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    // ==========================================
    // 访问器
    // ==========================================

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<BlockKey> {
        self.head
    }

    pub fn last(&self) -> Option<BlockKey> {
        self.tail
    }

    pub fn get(&self, key: BlockKey) -> Option<&Block> {
        self.nodes.get(key).map(|n| &n.block)
    }

    pub fn next(&self, key: BlockKey) -> Option<BlockKey> {
        self.nodes.get(key).and_then(|n| n.next)
    }

    pub fn prev(&self, key: BlockKey) -> Option<BlockKey> {
        self.nodes.get(key).and_then(|n| n.prev)
    }

    pub fn block_ref(&self, key: BlockKey) -> BlockRef {
        BlockRef {
            resource: self.resource,
            key,
        }
    }

    /// 正序遍历
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            list: self,
            cursor: self.head,
            forward: true,
        }
    }

    /// 逆序遍历
    pub fn iter_rev(&self) -> BlockIter<'_> {
        BlockIter {
            list: self,
            cursor: self.tail,
            forward: false,
        }
    }

    /// 最后一个块的终点
    pub fn last_block_end(&self) -> Option<Ticks> {
        self.tail.and_then(|k| self.get(k)).map(|b| b.end)
    }

    // ==========================================
    // 插入 / 删除
    // ==========================================

    /// 在指定位置后插入
    ///
    /// 只检查与前后相邻块的顺序与重叠,O(1)
    pub fn insert_after(&mut self, block: Block, position: InsertPosition) -> TimelineResult<BlockKey> {
        if block.start >= block.end {
            return Err(TimelineError::InvalidSpan {
                start: block.start,
                end: block.end,
            });
        }

        let (prev, next) = match position {
            InsertPosition::BeforeAll => (None, self.head),
            InsertPosition::After(after) => {
                let node = self
                    .nodes
                    .get(after)
                    .ok_or_else(|| TimelineError::UnknownBlock(format!("{:?}", after)))?;
                (Some(after), node.next)
            }
        };

        if let Some(prev_block) = prev.and_then(|k| self.get(k)) {
            if block.start < prev_block.start {
                return Err(TimelineError::OutOfOrderBlock {
                    start: block.start,
                    previous_start: prev_block.start,
                });
            }
            if prev_block.overlaps(block.start, block.end) {
                return Err(Self::overlap_error(&block, prev_block));
            }
        }
        if let Some(next_block) = next.and_then(|k| self.get(k)) {
            if next_block.start < block.start || next_block.overlaps(block.start, block.end) {
                return Err(Self::overlap_error(&block, next_block));
            }
        }

        let key = self.nodes.insert(BlockNode { block, prev, next });
        match prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(p) {
                    node.next = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(n) {
                    node.prev = Some(key);
                }
            }
            None => self.tail = Some(key),
        }
        Ok(key)
    }

    /// 按起点定位前驱后插入
    pub fn insert_sorted(&mut self, block: Block) -> TimelineResult<BlockKey> {
        let mut predecessor = None;
        for (key, existing) in self.iter_rev() {
            if existing.start <= block.start {
                predecessor = Some(key);
                break;
            }
        }
        let position = match predecessor {
            Some(key) => InsertPosition::After(key),
            None => InsertPosition::BeforeAll,
        };
        self.insert_after(block, position)
    }

    /// 删除块
    ///
    /// # Panics
    /// 块引用不属于本表时 panic（程序错误,不是可恢复情况）
    pub fn remove(&mut self, block_ref: BlockRef) -> Block {
        assert_eq!(
            block_ref.resource, self.resource,
            "删除的块不属于该资源块表"
        );
        let node = match self.nodes.remove(block_ref.key) {
            Some(node) => node,
            None => panic!("删除的块不属于该资源块表: {:?}", block_ref.key),
        };

        match node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.nodes.get_mut(n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        node.block
    }

    fn overlap_error(block: &Block, existing: &Block) -> TimelineError {
        TimelineError::OverlappingBlock {
            start: block.start,
            end: block.end,
            existing_start: existing.start,
            existing_end: existing.end,
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 第一个包含 point 的块
    pub fn find_first_containing(&self, point: Ticks) -> Option<BlockKey> {
        self.find_all_containing(point).into_iter().next()
    }

    /// 所有包含 point 的块（起点越过 point 后停止扫描）
    pub fn find_all_containing(&self, point: Ticks) -> Vec<BlockKey> {
        let mut found = Vec::new();
        for (key, block) in self.iter() {
            if block.start > point {
                break;
            }
            if block.contains(point) {
                found.push(key);
            }
        }
        found
    }

    /// 第一个起点晚于 point 的块
    pub fn find_first_starting_after(&self, point: Ticks) -> Option<BlockKey> {
        self.iter().find(|(_, b)| b.start > point).map(|(k, _)| k)
    }

    /// 最后一个在 point 之前结束的块
    pub fn find_first_before(&self, point: Ticks) -> Option<BlockKey> {
        self.iter_rev().find(|(_, b)| b.end <= point).map(|(k, _)| k)
    }

    /// 第一个与 [start, end) 重叠的块
    pub fn find_first_overlapping(&self, start: Ticks, end: Ticks) -> Option<BlockKey> {
        for (key, block) in self.iter() {
            if block.start >= end {
                break;
            }
            if block.overlaps(start, end) {
                return Some(key);
            }
        }
        None
    }

    /// 按 (资源需求序号, 活动) 查找
    pub fn find_by_key(&self, requirement_index: usize, activity: &ActivityId) -> Option<BlockKey> {
        self.iter()
            .find(|(_, b)| b.requirement_index == requirement_index && b.activity == *activity)
            .map(|(k, _)| k)
    }

    /// 校验有序且不重叠
    pub fn validate(&self) -> TimelineResult<()> {
        let mut previous: Option<&Block> = None;
        for (_, block) in self.iter() {
            if let Some(prev) = previous {
                if block.start < prev.start {
                    return Err(TimelineError::OutOfOrderBlock {
                        start: block.start,
                        previous_start: prev.start,
                    });
                }
                if prev.overlaps(block.start, block.end) {
                    return Err(Self::overlap_error(block, prev));
                }
            }
            previous = Some(block);
        }
        Ok(())
    }
}

// ==========================================
// BlockIter - 块遍历器
// ==========================================
pub struct BlockIter<'a> {
    list: &'a ResourceBlockList,
    cursor: Option<BlockKey>,
    forward: bool,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = (BlockKey, &'a Block);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let node = self.list.nodes.get(key)?;
        self.cursor = if self.forward { node.next } else { node.prev };
        Some((key, &node.block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{JobId, OperationId};
    use slotmap::SlotMap;

    fn ids() -> (ResourceId, ResourceId, JobId) {
        let mut resources: SlotMap<ResourceId, ()> = SlotMap::with_key();
        let mut jobs: SlotMap<JobId, ()> = SlotMap::with_key();
        (resources.insert(()), resources.insert(()), jobs.insert(()))
    }

    fn block(start: Ticks, end: Ticks, job: JobId, op: u32) -> Block {
        Block {
            start,
            end,
            requirement_index: 0,
            activity: ActivityId {
                job,
                mo_index: 0,
                operation: OperationId(op),
            },
        }
    }

    #[test]
    fn test_insert_sorted_keeps_order() {
        let (resource, _, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        list.insert_sorted(block(50, 60, job, 2)).unwrap();
        list.insert_sorted(block(10, 20, job, 1)).unwrap();
        list.insert_sorted(block(30, 40, job, 3)).unwrap();

        let starts: Vec<Ticks> = list.iter().map(|(_, b)| b.start).collect();
        assert_eq!(starts, vec![10, 30, 50]);
        let reversed: Vec<Ticks> = list.iter_rev().map(|(_, b)| b.start).collect();
        assert_eq!(reversed, vec![50, 30, 10]);
        assert!(list.validate().is_ok());
        assert_eq!(list.last_block_end(), Some(60));
    }

    #[test]
    fn test_insert_after_rejects_overlap() {
        let (resource, _, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        let first = list.insert_after(block(10, 20, job, 1), InsertPosition::BeforeAll).unwrap();
        let result = list.insert_after(block(15, 25, job, 2), InsertPosition::After(first));
        assert!(matches!(result, Err(TimelineError::OverlappingBlock { .. })));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_insert_before_all_becomes_head() {
        let (resource, _, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        list.insert_after(block(50, 60, job, 1), InsertPosition::BeforeAll).unwrap();
        let head = list.insert_after(block(10, 20, job, 2), InsertPosition::BeforeAll).unwrap();
        assert_eq!(list.first(), Some(head));
    }

    #[test]
    fn test_containment_queries() {
        let (resource, _, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        let a = list.insert_sorted(block(10, 20, job, 1)).unwrap();
        let b = list.insert_sorted(block(50, 60, job, 2)).unwrap();

        assert_eq!(list.find_first_containing(15), Some(a));
        assert_eq!(list.find_first_containing(20), None);
        assert!(list.find_all_containing(40).is_empty());
        assert_eq!(list.find_first_starting_after(20), Some(b));
        assert_eq!(list.find_first_before(45), Some(a));
        assert_eq!(list.find_first_before(5), None);
        assert_eq!(list.find_first_overlapping(55, 70), Some(b));
        assert_eq!(list.find_first_overlapping(20, 50), None);
    }

    #[test]
    fn test_find_by_key_requires_activity() {
        let (resource, _, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        list.insert_sorted(block(10, 20, job, 1)).unwrap();
        let second = list.insert_sorted(block(30, 40, job, 2)).unwrap();

        let activity = ActivityId {
            job,
            mo_index: 0,
            operation: OperationId(2),
        };
        assert_eq!(list.find_by_key(0, &activity), Some(second));
        assert_eq!(list.find_by_key(1, &activity), None);
    }

    #[test]
    fn test_remove_relinks() {
        let (resource, _, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        list.insert_sorted(block(10, 20, job, 1)).unwrap();
        let middle = list.insert_sorted(block(30, 40, job, 2)).unwrap();
        list.insert_sorted(block(50, 60, job, 3)).unwrap();

        let removed = list.remove(list.block_ref(middle));
        assert_eq!(removed.start, 30);
        let starts: Vec<Ticks> = list.iter().map(|(_, b)| b.start).collect();
        assert_eq!(starts, vec![10, 50]);
    }

    #[test]
    #[should_panic]
    fn test_remove_foreign_block_panics() {
        let (resource, other, job) = ids();
        let mut list = ResourceBlockList::new(resource);
        let key = list.insert_sorted(block(10, 20, job, 1)).unwrap();
        list.remove(BlockRef { resource: other, key });
    }
}

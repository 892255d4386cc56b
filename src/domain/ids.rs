// ==========================================
// 插单排产系统 - 实体标识
// ==========================================
// 职责: 场景仓库中各实体的稳定键
// 说明: 实体之间只通过键互相引用,不持有引用,
//       因此场景深拷贝就是一次整体数据复制
// ==========================================

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// 资源键
    pub struct ResourceId;
}

new_key_type! {
    /// 作业键
    pub struct JobId;
}

new_key_type! {
    /// 资源块表内部节点键（仅在所属资源内有效）
    pub struct BlockKey;
}

/// 操作标识（在所属制造订单内唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u32);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OP{}", self.0)
    }
}

/// 活动标识: (作业, 制造订单序号, 操作)
///
/// 块的 id 只是它满足的资源需求序号,全局不唯一;
/// 与活动标识组合后才唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivityId {
    pub job: JobId,
    pub mo_index: usize,
    pub operation: OperationId,
}

/// 块引用: 资源 + 资源内节点键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub resource: ResourceId,
    pub key: BlockKey,
}

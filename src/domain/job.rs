// ==========================================
// 插单排产系统 - 作业工艺路线模型
// ==========================================
// 职责: 作业 / 制造订单 / 替代路线 / 工序
// 红线: 路线偏好 0 表示禁用,不可选择;数值越小越优先
// ==========================================

use crate::domain::ids::{JobId, OperationId, ResourceId};
use crate::domain::types::Ticks;
use serde::{Deserialize, Serialize};

/// 主资源需求在块上的序号
pub const PRIMARY_REQUIREMENT_INDEX: usize = 0;

// ==========================================
// ResourceRequirement - 资源需求
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub eligible_resources: Vec<ResourceId>,
}

impl ResourceRequirement {
    pub fn is_eligible(&self, resource: ResourceId) -> bool {
        self.eligible_resources.contains(&resource)
    }
}

// ==========================================
// Operation - 工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    pub duration: Ticks,              // 所需在线时长
    pub primary: ResourceRequirement, // 主资源需求
    pub finished: bool,               // 已完工
    pub finished_end: Option<Ticks>,  // 完工时间
    pub no_wait: bool,                // 必须紧接前道工序（中间不允许离线）
}

// ==========================================
// AlternatePath - 替代路线
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternatePath {
    pub index: usize,
    pub preference: u32, // 0 = 禁用
    pub operations: Vec<Operation>,
}

impl AlternatePath {
    pub fn is_selectable(&self) -> bool {
        self.preference != 0
    }

    pub fn unfinished_operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|op| !op.finished)
    }

    /// 已完工工序中最晚的完工时间
    pub fn latest_finished_end(&self) -> Option<Ticks> {
        self.operations
            .iter()
            .filter(|op| op.finished)
            .filter_map(|op| op.finished_end)
            .max()
    }
}

// ==========================================
// ManufacturingOrder - 制造订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingOrder {
    pub name: String,
    pub paths: Vec<AlternatePath>,
    pub current_path: usize, // 当前路线在 paths 中的下标
}

impl ManufacturingOrder {
    pub fn current_path(&self) -> Option<&AlternatePath> {
        self.paths.get(self.current_path)
    }

    pub fn selectable_paths(&self) -> impl Iterator<Item = &AlternatePath> {
        self.paths.iter().filter(|p| p.is_selectable())
    }

    pub fn is_finished(&self) -> bool {
        self.current_path()
            .map(|p| p.operations.iter().all(|op| op.finished))
            .unwrap_or(true)
    }
}

// ==========================================
// ScheduledWindow - 插入结果窗口
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledWindow {
    pub start: Ticks,
    pub end: Ticks,
    pub late: bool,
}

// ==========================================
// Job - 作业
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub need_date: Ticks,
    pub release_date: Option<Ticks>,
    pub priority: i32,
    pub group: Option<String>, // 共享约束分组
    pub running: bool,         // 已开工（不参与插单）
    pub manufacturing_orders: Vec<ManufacturingOrder>,
    pub scheduled: Option<ScheduledWindow>,
}

impl Job {
    pub fn is_finished(&self) -> bool {
        self.manufacturing_orders.iter().all(|mo| mo.is_finished())
    }

    /// 已开工作业由车间控制,不参与插单;部分工序已完工但未开工后续工序的作业仍可插入
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_scheduled_on_time(&self) -> bool {
        matches!(self.scheduled, Some(window) if !window.late)
    }
}

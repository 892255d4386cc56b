// ==========================================
// 插单排产系统 - 领域类型定义
// ==========================================
// 职责: 时间刻度、排产阶段、作业状态等基础枚举
// 约定: 1 tick = 1 秒，时间轴为有符号整数
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 时间刻度 (Ticks)
// ==========================================
pub type Ticks = i64;

/// 最小时间单位
pub const ONE_TICK: Ticks = 1;

/// 一小时对应的 tick 数
pub const TICKS_PER_HOUR: Ticks = 3_600;

// ==========================================
// 排产阶段 (Simulation Phase)
// ==========================================
// 红线: 阶段只能前进,不能从 EvenIfLate 回到 OnOrBeforeNeedDate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimulationPhase {
    OnOrBeforeNeedDate, // 准时插入
    EvenIfLate,         // 允许延期插入
}

impl SimulationPhase {
    /// 下一个阶段（最后阶段返回 None）
    pub fn next(&self) -> Option<SimulationPhase> {
        match self {
            SimulationPhase::OnOrBeforeNeedDate => Some(SimulationPhase::EvenIfLate),
            SimulationPhase::EvenIfLate => None,
        }
    }

    pub fn is_on_time_phase(&self) -> bool {
        matches!(self, SimulationPhase::OnOrBeforeNeedDate)
    }
}

impl fmt::Display for SimulationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationPhase::OnOrBeforeNeedDate => write!(f, "ON_OR_BEFORE_NEED_DATE"),
            SimulationPhase::EvenIfLate => write!(f, "EVEN_IF_LATE"),
        }
    }
}

// ==========================================
// 模拟运行状态 (Simulation Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStatus {
    Initializing, // 初始化
    Running,      // 运行中
    Completed,    // 自然完成
    Canceled,     // 用户取消
    Error,        // 异常终止
    Stopped,      // 已中止
}

impl SimulationStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SimulationStatus::Completed
                | SimulationStatus::Canceled
                | SimulationStatus::Error
                | SimulationStatus::Stopped
        )
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationStatus::Initializing => write!(f, "INITIALIZING"),
            SimulationStatus::Running => write!(f, "RUNNING"),
            SimulationStatus::Completed => write!(f, "COMPLETED"),
            SimulationStatus::Canceled => write!(f, "CANCELED"),
            SimulationStatus::Error => write!(f, "ERROR"),
            SimulationStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

// ==========================================
// 作业插单状态 (Job Insert Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobInsertStatus {
    New,              // 尚未处理
    ScheduledOnTime,  // 准时插入
    ScheduledLate,    // 延期插入
    FailedToSchedule, // 插入失败
    Excluded,         // 被过滤（运行中/已完工）
}

impl fmt::Display for JobInsertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobInsertStatus::New => write!(f, "NEW"),
            JobInsertStatus::ScheduledOnTime => write!(f, "SCHEDULED_ON_TIME"),
            JobInsertStatus::ScheduledLate => write!(f, "SCHEDULED_LATE"),
            JobInsertStatus::FailedToSchedule => write!(f, "FAILED_TO_SCHEDULE"),
            JobInsertStatus::Excluded => write!(f, "EXCLUDED"),
        }
    }
}

// ==========================================
// 分组模式 (Group Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    /// 每个作业单独插入
    #[default]
    Independent,
    /// 共享约束分组的作业一起插入
    GroupInsert,
}

impl std::str::FromStr for GroupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "independent" => Ok(GroupMode::Independent),
            "group_insert" | "group-insert" | "group" => Ok(GroupMode::GroupInsert),
            other => Err(format!("未知分组模式: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_only_moves_forward() {
        assert_eq!(
            SimulationPhase::OnOrBeforeNeedDate.next(),
            Some(SimulationPhase::EvenIfLate)
        );
        assert_eq!(SimulationPhase::EvenIfLate.next(), None);
    }

    #[test]
    fn test_terminal_status() {
        assert!(!SimulationStatus::Running.is_terminal());
        assert!(SimulationStatus::Stopped.is_terminal());
        assert!(SimulationStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_group_mode_from_str() {
        assert_eq!("group-insert".parse::<GroupMode>(), Ok(GroupMode::GroupInsert));
        assert!("whatever".parse::<GroupMode>().is_err());
    }
}

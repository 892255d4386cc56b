// ==========================================
// 插单排产系统 - 领域层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::Ticks;
use thiserror::Error;

/// 时间轴操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    // ===== 区间错误 =====
    #[error("无效区间: start={start}, end={end}")]
    InvalidSpan { start: Ticks, end: Ticks },

    #[error("产能区间重叠: [{start}, {end}) 与已有区间冲突")]
    OverlappingCapacity { start: Ticks, end: Ticks },

    // ===== 块错误 =====
    #[error("块重叠: 新块 [{start}, {end}) 与已有块 [{existing_start}, {existing_end}) 冲突")]
    OverlappingBlock {
        start: Ticks,
        end: Ticks,
        existing_start: Ticks,
        existing_end: Ticks,
    },

    #[error("块顺序错误: 新块 start={start} 早于前驱块 start={previous_start}")]
    OutOfOrderBlock { start: Ticks, previous_start: Ticks },

    #[error("块不存在: {0}")]
    UnknownBlock(String),
}

/// Result 类型别名
pub type TimelineResult<T> = Result<T, TimelineError>;

/// 试插（加急）失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpediteError {
    #[error("作业不存在: {0}")]
    UnknownJob(String),

    #[error("作业 {job} 没有可选路线")]
    NoSelectablePath { job: String },

    #[error("作业 {job} 工序 {operation} 没有可用资源")]
    NoEligibleResource { job: String, operation: String },

    #[error("作业 {job} 工序 {operation} 在排程期内放不下")]
    PastHorizon { job: String, operation: String },

    #[error("完工时间 {completion} 晚于需求日期 {need_date}")]
    MissesNeedDate { completion: Ticks, need_date: Ticks },

    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

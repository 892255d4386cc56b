// ==========================================
// 插单排产系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 单个作业插入失败属于诊断数据,不走错误通道
// ==========================================

use crate::domain::error::{ExpediteError, TimelineError};
use thiserror::Error;

/// 插单模拟错误类型
#[derive(Error, Debug)]
pub enum SimulationError {
    // ===== 校验错误（初始化阶段,未修改任何状态）=====
    #[error("已有插单模拟正在运行")]
    AlreadyRunning,

    #[error("KPI not found: {0}")]
    KpiNotFound(String),

    #[error("插单参数无效: {0}")]
    InvalidSettings(String),

    #[error("作业不存在: {0}")]
    UnknownJob(String),

    #[error("时间轴错误: {0}")]
    Timeline(#[from] TimelineError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimulationError {
    /// 初始化阶段的校验错误（调用方可稍后重试）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SimulationError::AlreadyRunning
                | SimulationError::KpiNotFound(_)
                | SimulationError::InvalidSettings(_)
                | SimulationError::UnknownJob(_)
        )
    }
}

impl From<ExpediteError> for SimulationError {
    fn from(err: ExpediteError) -> Self {
        match err {
            ExpediteError::Timeline(inner) => SimulationError::Timeline(inner),
            ExpediteError::UnknownJob(job) => SimulationError::UnknownJob(job),
            other => SimulationError::Unexpected(other.to_string()),
        }
    }
}

pub type SimulationResult<T> = Result<T, SimulationError>;

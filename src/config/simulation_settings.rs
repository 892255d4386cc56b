// ==========================================
// 插单排产系统 - 插单模拟参数
// ==========================================
// 职责: 一次插单运行的全部可调参数
// ==========================================

use crate::domain::types::{GroupMode, SimulationPhase, Ticks, TICKS_PER_HOUR};
use serde::{Deserialize, Serialize};

/// 候选时间不足此数量时不拆分,单个试插任务即可
pub const DEFAULT_PARTITION_THRESHOLD: usize = 5;

/// 插单模拟参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// 起始阶段
    pub phase: SimulationPhase,

    // ===== KPI =====
    /// 选优使用的 KPI 名称（None 表示按时间选优）
    pub kpi_name: Option<String>,
    /// 覆盖 KPI 自身的优劣方向
    pub kpi_lower_is_better: Option<bool>,
    /// KPI 阈值: 劣于阈值的试插结果视为不可行
    pub kpi_threshold: Option<f64>,

    // ===== 并发 =====
    /// 同时运行的试插任务上限（与 CPU 核数无关）
    pub max_concurrency: usize,
    /// 候选数 <= 该值时不拆分
    pub partition_threshold: usize,

    // ===== 约束开关 =====
    pub use_release_dates: bool,
    pub use_alternate_paths: bool,

    // ===== 候选时间 =====
    /// 相邻两次尝试的最小间隔
    pub min_retry_spacing: Ticks,
    /// 延期阶段按替代路线扫描时块终点后的偏移
    pub late_path_block_offset: Ticks,
    /// 准时阶段在最后相关块与需求日期之间补充候选的步长
    pub gap_fill_step: Ticks,
    /// 补充候选数量上限
    pub max_gap_candidates: usize,

    // ===== 运行 =====
    pub group_mode: GroupMode,
    /// 胜出结果同时提交到原始场景
    pub commit_to_live: bool,
    /// 运行发起人
    pub instigator: String,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            phase: SimulationPhase::OnOrBeforeNeedDate,
            kpi_name: None,
            kpi_lower_is_better: None,
            kpi_threshold: None,
            max_concurrency: 4,
            partition_threshold: DEFAULT_PARTITION_THRESHOLD,
            use_release_dates: true,
            use_alternate_paths: false,
            min_retry_spacing: 0,
            late_path_block_offset: TICKS_PER_HOUR,
            gap_fill_step: TICKS_PER_HOUR,
            max_gap_candidates: 24,
            group_mode: GroupMode::Independent,
            commit_to_live: true,
            instigator: "system".to_string(),
        }
    }
}

impl SimulationSettings {
    /// 参数合法性检查
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency 必须 >= 1".to_string());
        }
        if self.min_retry_spacing < 0 {
            return Err(format!("min_retry_spacing 不能为负: {}", self.min_retry_spacing));
        }
        if self.gap_fill_step <= 0 && self.max_gap_candidates > 0 {
            return Err(format!("gap_fill_step 必须 > 0: {}", self.gap_fill_step));
        }
        if self.late_path_block_offset < 0 {
            return Err(format!(
                "late_path_block_offset 不能为负: {}",
                self.late_path_block_offset
            ));
        }
        Ok(())
    }
}

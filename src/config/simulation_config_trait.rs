// ==========================================
// 插单排产系统 - 插单配置读取 Trait
// ==========================================
// 职责: 定义插单编排器所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::simulation_settings::SimulationSettings;
use crate::domain::types::{GroupMode, Ticks};
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// SimulationConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从键值存储读取）
#[async_trait]
pub trait SimulationConfigReader: Send + Sync {
    // ===== 并发配置 =====

    /// 获取试插任务并发上限
    ///
    /// # 默认值
    /// - 4
    async fn get_max_concurrency(&self) -> ConfigResult<usize>;

    /// 获取不拆分的候选数阈值
    ///
    /// # 默认值
    /// - 5
    async fn get_partition_threshold(&self) -> ConfigResult<usize>;

    // ===== KPI 配置 =====

    /// 获取选优 KPI 名称
    ///
    /// # 返回
    /// - None: 按时间选优
    async fn get_kpi_name(&self) -> ConfigResult<Option<String>>;

    /// 获取 KPI 阈值
    async fn get_kpi_threshold(&self) -> ConfigResult<Option<f64>>;

    /// KPI 方向覆写
    ///
    /// # 返回
    /// - None: 沿用 KPI 自身方向
    async fn get_kpi_lower_is_better(&self) -> ConfigResult<Option<bool>>;

    // ===== 约束开关 =====

    /// 是否启用下达日期约束
    ///
    /// # 默认值
    /// - true
    async fn get_use_release_dates(&self) -> ConfigResult<bool>;

    /// 是否评估替代路线
    ///
    /// # 默认值
    /// - false
    async fn get_use_alternate_paths(&self) -> ConfigResult<bool>;

    // ===== 候选时间配置 =====

    /// 获取相邻尝试最小间隔（tick）
    ///
    /// # 默认值
    /// - 0
    async fn get_min_retry_spacing(&self) -> ConfigResult<Ticks>;

    /// 获取延期阶段替代路线块终点偏移（tick）
    ///
    /// # 默认值
    /// - 3600（一小时）
    async fn get_late_path_block_offset(&self) -> ConfigResult<Ticks>;

    /// 获取空档补点步长（tick）
    ///
    /// # 默认值
    /// - 3600（一小时）
    async fn get_gap_fill_step(&self) -> ConfigResult<Ticks>;

    /// 获取空档补点上限
    ///
    /// # 默认值
    /// - 24
    async fn get_max_gap_candidates(&self) -> ConfigResult<usize>;

    /// 获取分组模式
    ///
    /// # 默认值
    /// - Independent
    async fn get_group_mode(&self) -> ConfigResult<GroupMode>;

    // ===== 运行配置 =====

    /// 是否把结果提交到实际场景
    ///
    /// # 默认值
    /// - true
    async fn get_commit_to_live(&self) -> ConfigResult<bool>;

    /// 获取发起人
    ///
    /// # 默认值
    /// - system
    async fn get_instigator(&self) -> ConfigResult<String>;

    /// 汇总为插单模拟参数
    async fn load_simulation_settings(&self) -> ConfigResult<SimulationSettings> {
        Ok(SimulationSettings {
            max_concurrency: self.get_max_concurrency().await?,
            partition_threshold: self.get_partition_threshold().await?,
            kpi_name: self.get_kpi_name().await?,
            kpi_lower_is_better: self.get_kpi_lower_is_better().await?,
            kpi_threshold: self.get_kpi_threshold().await?,
            use_release_dates: self.get_use_release_dates().await?,
            use_alternate_paths: self.get_use_alternate_paths().await?,
            min_retry_spacing: self.get_min_retry_spacing().await?,
            late_path_block_offset: self.get_late_path_block_offset().await?,
            gap_fill_step: self.get_gap_fill_step().await?,
            max_gap_candidates: self.get_max_gap_candidates().await?,
            group_mode: self.get_group_mode().await?,
            commit_to_live: self.get_commit_to_live().await?,
            instigator: self.get_instigator().await?,
            ..SimulationSettings::default()
        })
    }
}

// ==========================================
// 插单排产系统 - 核心库
// ==========================================
// 职责: 在已有排程上为未排作业寻找插入点
// 流程: 作业排序 → 最早时间约束 → 候选时间 → 并行试插 → 选优提交
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与时间轴
pub mod domain;

// 引擎层 - 插单算法与编排
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    GroupMode, JobInsertStatus, SimulationPhase, SimulationStatus, Ticks, ONE_TICK, TICKS_PER_HOUR,
};

// 领域实体
pub use domain::{
    Block, CapacityInterval, Job, KpiCalculator, KpiRegistry, Resource, ResourceBlockList,
    ResourceCapacityIntervalList, ScenarioDetail, ScenarioHandle,
};

// 引擎
pub use engine::{
    CandidateTimeGenerator, ConstraintTimeCalculator, InsertJobsSimulationManager, JobSequencer,
    SimulationDiagnostics, SimulationError, SimulationResult, SimulationSummary,
};

// 配置
pub use config::{ConfigManager, SimulationSettings};

// 导入
pub use importer::{ImportError, ImportedScenario, ScenarioImporter};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "插单排产系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "插单排产系统");
    }
}

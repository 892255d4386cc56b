// ==========================================
// 插单排产系统 - 配置层
// ==========================================
// 职责: 插单模拟参数加载,支持文件 + 环境变量覆写
// 存储: 键值表（JSON 文件 / 内存映射）
// ==========================================

pub mod config_manager;
pub mod simulation_config_trait;
pub mod simulation_settings;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use simulation_config_trait::{ConfigResult, SimulationConfigReader};
pub use simulation_settings::{SimulationSettings, DEFAULT_PARTITION_THRESHOLD};

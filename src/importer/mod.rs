// ==========================================
// 插单排产系统 - 导入层
// ==========================================
// 职责: 外部场景数据导入,生成场景仓库
// 支持: JSON
// ==========================================

pub mod error;
pub mod scenario_importer;

pub use error::{ImportError, ImportResult};
pub use scenario_importer::{ImportedScenario, ScenarioDto, ScenarioImporter};

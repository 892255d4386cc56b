// ==========================================
// 插单排产系统 - 插单模拟编排器
// ==========================================
// 职责: 驱动两阶段插单循环,分段并行试插并确定性合并结果
// 输入: 工作场景句柄 + 待插作业 + 插单参数
// 输出: 结果场景 + 每个作业的诊断 + 完成事件
// ==========================================

mod core;
mod diagnostics;
mod selection;


pub use self::core::{InsertJobsSimulationManager, SimulationSummary};
pub use self::diagnostics::{JobDiagnostic, SimulationDiagnostics, DEFERRED_REASON, UNABLE_TO_INSERT_REASON};
pub use self::selection::SelectionPolicy;

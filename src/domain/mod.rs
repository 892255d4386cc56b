// ==========================================
// 插单排产系统 - 领域模型层
// ==========================================
// 职责: 定义实体、时间轴数据结构、KPI 契约
// 红线: 不含编排逻辑,不含并发调度
// ==========================================

pub mod block;
pub mod capacity;
pub mod error;
pub mod ids;
pub mod job;
pub mod kpi;
pub mod resource;
pub mod scenario;
pub mod types;

// 重导出核心类型
pub use block::{Block, BlockIter, InsertPosition, ResourceBlockList};
pub use capacity::{CapacityInterval, ResourceCapacityIntervalList};
pub use error::{ExpediteError, TimelineError, TimelineResult};
pub use ids::{ActivityId, BlockKey, BlockRef, JobId, OperationId, ResourceId};
pub use job::{
    AlternatePath, Job, ManufacturingOrder, Operation, ResourceRequirement, ScheduledWindow,
};
pub use kpi::{KpiCalculator, KpiRegistry, OnTimeJobCountKpi, TotalLatenessKpi};
pub use resource::Resource;
pub use scenario::{ExpediteOutcome, PathSelection, PlacedBlock, ScenarioDetail, ScenarioHandle};
pub use types::{
    GroupMode, JobInsertStatus, SimulationPhase, SimulationStatus, Ticks, ONE_TICK, TICKS_PER_HOUR,
};

// ==========================================
// 插单排产系统 - 引擎层
// ==========================================
// 职责: 约束时间、候选时间、作业排序、试插与编排
// 红线: 单个作业插入失败记为诊断结果,不中断运行
// ==========================================

pub mod candidate;
pub mod constraint;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod sequencer;
pub mod trial;

// 重导出核心引擎
pub use candidate::{CandidateFilter, CandidateTime, CandidateTimeGenerator, MinimumSpacingFilter, PathTag};
pub use constraint::{
    AlternatePathModule, ConstraintModule, ConstraintTimeCalculator, EarliestTime, FrozenSpanModule,
    NeedDateCeilingModule, ReleaseDateModule,
};
pub use error::{SimulationError, SimulationResult};
pub use events::{
    ChannelEventPublisher, JobProgressEvent, NoOpEventPublisher, OptionalEventPublisher,
    SimulationCompletedEvent, SimulationEvent, SimulationEventPublisher, SimulationEventType,
};
pub use orchestrator::{
    InsertJobsSimulationManager, JobDiagnostic, SelectionPolicy, SimulationDiagnostics, SimulationSummary,
    DEFERRED_REASON, UNABLE_TO_INSERT_REASON,
};
pub use sequencer::{ExpediteSet, FilterVerdict, JobFilter, JobSequencer};
pub use trial::{partition_candidates, run_trial, TrialOutcome, TrialReport, TrialRequest};

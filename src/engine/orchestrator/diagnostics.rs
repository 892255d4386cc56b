// ==========================================
// 插单排产系统 - 插单诊断信息
// ==========================================
// 职责: 每个作业的插入结果与运行计数
// 写入方: 仅协调任务;试插任务只通过结果对象通信
// ==========================================

use crate::domain::ids::JobId;
use crate::domain::job::{Job, ScheduledWindow};
use crate::domain::types::{JobInsertStatus, SimulationPhase, SimulationStatus};
use serde::Serialize;
use uuid::Uuid;

/// 延期阶段仍无法插入时的原因
pub const UNABLE_TO_INSERT_REASON: &str = "Unable to insert into schedule";

/// 准时阶段不可行,留待延期阶段
pub const DEFERRED_REASON: &str = "无法准时插入,转入延期阶段";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDiagnostic {
    pub job: JobId,
    pub name: String,
    pub status: JobInsertStatus,
    pub late: bool,
    pub reason: Option<String>,
    pub window: Option<ScheduledWindow>,
    /// 得出结果时所处的阶段
    pub phase: Option<SimulationPhase>,
}

impl JobDiagnostic {
    pub fn new(job: &Job) -> Self {
        Self {
            job: job.id,
            name: job.name.clone(),
            status: JobInsertStatus::New,
            late: false,
            reason: None,
            window: None,
            phase: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationDiagnostics {
    pub run_id: Option<Uuid>,
    pub status: SimulationStatus,
    pub phase: SimulationPhase,
    pub current_set: Option<String>,
    pub jobs: Vec<JobDiagnostic>,

    // ===== 计数 =====
    pub on_time: usize,
    pub late: usize,
    pub failed: usize,
    pub excluded: usize,
    pub pending: usize,

    // ===== 进度（当前作业集）=====
    pub trials_completed: usize,
    pub total_candidates: usize,
    pub progress_percent: f64,
}

impl Default for SimulationDiagnostics {
    fn default() -> Self {
        Self {
            run_id: None,
            status: SimulationStatus::Initializing,
            phase: SimulationPhase::OnOrBeforeNeedDate,
            current_set: None,
            jobs: Vec::new(),
            on_time: 0,
            late: 0,
            failed: 0,
            excluded: 0,
            pending: 0,
            trials_completed: 0,
            total_candidates: 0,
            progress_percent: 0.0,
        }
    }
}

impl SimulationDiagnostics {
    pub fn new(run_id: Uuid, phase: SimulationPhase, jobs: Vec<JobDiagnostic>) -> Self {
        let mut diagnostics = Self {
            run_id: Some(run_id),
            phase,
            jobs,
            ..Default::default()
        };
        diagnostics.recount();
        diagnostics
    }

    pub fn job(&self, id: JobId) -> Option<&JobDiagnostic> {
        self.jobs.iter().find(|d| d.job == id)
    }

    pub fn job_by_name(&self, name: &str) -> Option<&JobDiagnostic> {
        self.jobs.iter().find(|d| d.name == name)
    }

    pub fn status_of(&self, id: JobId) -> Option<JobInsertStatus> {
        self.job(id).map(|d| d.status)
    }

    /// 记录作业结果并刷新计数
    pub fn record(
        &mut self,
        id: JobId,
        status: JobInsertStatus,
        reason: Option<String>,
        window: Option<ScheduledWindow>,
        phase: SimulationPhase,
    ) {
        if let Some(entry) = self.jobs.iter_mut().find(|d| d.job == id) {
            entry.status = status;
            entry.late = window.map(|w| w.late).unwrap_or(status == JobInsertStatus::ScheduledLate);
            entry.reason = reason;
            entry.window = window;
            entry.phase = Some(phase);
        }
        self.recount();
    }

    /// 仅更新原因（状态保持 New）
    pub fn note(&mut self, id: JobId, reason: &str) {
        if let Some(entry) = self.jobs.iter_mut().find(|d| d.job == id) {
            entry.reason = Some(reason.to_string());
        }
    }

    fn recount(&mut self) {
        let count = |status: JobInsertStatus| self.jobs.iter().filter(|d| d.status == status).count();
        self.on_time = count(JobInsertStatus::ScheduledOnTime);
        self.late = count(JobInsertStatus::ScheduledLate);
        self.failed = count(JobInsertStatus::FailedToSchedule);
        self.excluded = count(JobInsertStatus::Excluded);
        self.pending = count(JobInsertStatus::New);
    }

    /// 摘要名称（用于完成事件）
    pub fn summary_name(&self) -> String {
        format!(
            "插单结果: 准时 {} / 延期 {} / 失败 {} / 排除 {}",
            self.on_time, self.late, self.failed, self.excluded
        )
    }
}

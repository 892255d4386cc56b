// ==========================================
// 插单排产系统 - 插单模拟编排器
// ==========================================
// 状态机: Initializing → Running → Completed / Canceled / Error / Stopped
// 主流程: 作业排序 → 约束时间 → 候选时间 → 分段试插 → 选优 → 提交
// 并发: 协调任务串行处理作业集;每个作业集的试插分段并行
// 红线: 工作场景只在拍快照与提交时持写锁;作业之间严格串行提交
// ==========================================

use crate::config::SimulationSettings;
use crate::domain::ids::JobId;
use crate::domain::job::Job;
use crate::domain::kpi::{KpiCalculator, KpiRegistry};
use crate::domain::scenario::{ScenarioDetail, ScenarioHandle};
use crate::domain::types::{JobInsertStatus, SimulationPhase, SimulationStatus};
use crate::engine::candidate::{CandidateTime, CandidateTimeGenerator};
use crate::engine::constraint::{ConstraintTimeCalculator, EarliestTime};
use crate::engine::error::{SimulationError, SimulationResult};
use crate::engine::events::{JobProgressEvent, OptionalEventPublisher, SimulationCompletedEvent, SimulationEvent};
use crate::engine::sequencer::{ExpediteSet, JobSequencer};
use crate::engine::trial::{partition_candidates, run_trial, TrialOutcome, TrialReport, TrialRequest};
use chrono::Utc;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::diagnostics::{JobDiagnostic, SimulationDiagnostics, DEFERRED_REASON, UNABLE_TO_INSERT_REASON};
use super::selection::SelectionPolicy;

// ==========================================
// SimulationSummary - 运行结果
// ==========================================
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub run_id: Uuid,
    pub status: SimulationStatus,
    pub summary_name: String,
    pub instigator: String,
    /// 工作场景的最终状态（最后一次提交之后）
    pub scenario: Arc<ScenarioDetail>,
    pub diagnostics: SimulationDiagnostics,
}

/// 单个作业集的试插汇总
#[derive(Debug)]
enum BatchResult {
    Winner(Box<TrialOutcome>),
    NoFeasible,
    Failed(String),
    Canceled,
}

#[derive(Debug, Default)]
pub(super) struct RunState {
    pub(super) diagnostics: SimulationDiagnostics,
    pub(super) cancel: Option<CancellationToken>,
}

struct ManagerInner {
    live: ScenarioHandle,
    kpis: KpiRegistry,
    publisher: OptionalEventPublisher,
    generator: CandidateTimeGenerator,
    running: AtomicBool,
    state: Mutex<RunState>,
    trials_completed: Arc<AtomicUsize>,
}

/// 运行期间占用运行标志,结束（含校验失败）时释放
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ==========================================
// InsertJobsSimulationManager - 插单模拟编排器
// ==========================================
#[derive(Clone)]
pub struct InsertJobsSimulationManager {
    inner: Arc<ManagerInner>,
}

impl InsertJobsSimulationManager {
    /// 使用内置 KPI、不发布事件
    pub fn new(live: ScenarioHandle) -> Self {
        Self::with_components(
            live,
            KpiRegistry::with_defaults(),
            OptionalEventPublisher::none(),
            CandidateTimeGenerator::new(),
        )
    }

    pub fn with_components(
        live: ScenarioHandle,
        kpis: KpiRegistry,
        publisher: OptionalEventPublisher,
        generator: CandidateTimeGenerator,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                live,
                kpis,
                publisher,
                generator,
                running: AtomicBool::new(false),
                state: Mutex::new(RunState::default()),
                trials_completed: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// 原始（工作）场景句柄
    pub fn scenario(&self) -> &ScenarioHandle {
        &self.inner.live
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SimulationStatus {
        self.lock_state().diagnostics.status
    }

    /// 诊断快照（含当前作业集的进度百分比）
    pub fn diagnostics(&self) -> SimulationDiagnostics {
        let mut diagnostics = self.lock_state().diagnostics.clone();
        diagnostics.trials_completed = self
            .inner
            .trials_completed
            .load(Ordering::Relaxed)
            .min(diagnostics.total_candidates);
        diagnostics.progress_percent = if diagnostics.total_candidates == 0 {
            0.0
        } else {
            diagnostics.trials_completed as f64 * 100.0 / diagnostics.total_candidates as f64
        };
        diagnostics
    }

    // ==========================================
    // 中止 / 取消
    // ==========================================

    /// 通知所有试插任务停止,状态置为 Stopped
    ///
    /// 已终止的运行上调用不做任何修改,返回 false
    pub fn abort(&self) -> bool {
        self.stop_with(SimulationStatus::Stopped)
    }

    /// 中止并将状态置为 Canceled（用户主动取消）
    pub fn cancel(&self) -> bool {
        self.stop_with(SimulationStatus::Canceled)
    }

    fn stop_with(&self, status: SimulationStatus) -> bool {
        let mut state = self.lock_state();
        if state.diagnostics.status.is_terminal() {
            return false;
        }
        let Some(token) = state.cancel.as_ref() else {
            return false;
        };
        token.cancel();
        state.diagnostics.status = status;
        info!(run_id = ?state.diagnostics.run_id, status = %status, "插单运行已中止");
        true
    }

    // ==========================================
    // 运行
    // ==========================================

    /// 执行一次插单运行（两阶段）
    ///
    /// # 错误
    /// - 校验错误（已有运行、KPI 不存在、参数无效、作业不存在）: 不修改任何状态
    /// - 意外错误: 状态置为 Error,工作场景保持最后一次提交后的状态
    #[instrument(skip_all, fields(jobs = jobs.len(), instigator = %settings.instigator))]
    pub async fn run(&self, jobs: &[JobId], settings: SimulationSettings) -> SimulationResult<SimulationSummary> {
        let inner = &self.inner;
        if inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SimulationError::AlreadyRunning);
        }
        let _guard = RunGuard(&inner.running);

        // ===== Initializing: 校验 =====
        settings.validate().map_err(SimulationError::InvalidSettings)?;
        let kpi = match &settings.kpi_name {
            Some(name) => Some(
                inner
                    .kpis
                    .get(name)
                    .ok_or_else(|| SimulationError::KpiNotFound(name.clone()))?,
            ),
            None => None,
        };

        let working_detail = inner.live.snapshot().await;
        let mut initial = Vec::with_capacity(jobs.len());
        for &id in jobs {
            let job = working_detail
                .job(id)
                .ok_or_else(|| SimulationError::UnknownJob(format!("{:?}", id)))?;
            if initial.iter().all(|d: &JobDiagnostic| d.job != id) {
                initial.push(JobDiagnostic::new(job));
            }
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut state = self.lock_state();
            state.diagnostics = SimulationDiagnostics::new(run_id, settings.phase, initial);
            state.cancel = Some(cancel.clone());
        }
        inner.trials_completed.store(0, Ordering::Relaxed);
        info!(
            run_id = %run_id,
            phase = %settings.phase,
            kpi = ?settings.kpi_name,
            max_concurrency = settings.max_concurrency,
            "插单运行开始"
        );

        let working = ScenarioHandle::new(working_detail);
        {
            let mut state = self.lock_state();
            if state.diagnostics.status == SimulationStatus::Initializing {
                state.diagnostics.status = SimulationStatus::Running;
            }
        }

        // ===== Running =====
        let result = self
            .run_phases(run_id, jobs, &settings, kpi, &working, &cancel)
            .await;

        let status = {
            let mut state = self.lock_state();
            match &result {
                Ok(()) => {
                    if !state.diagnostics.status.is_terminal() {
                        state.diagnostics.status = SimulationStatus::Completed;
                    }
                }
                Err(_) => state.diagnostics.status = SimulationStatus::Error,
            }
            state.diagnostics.current_set = None;
            state.cancel = None;
            state.diagnostics.status
        };

        let scenario = Arc::new(working.snapshot().await);
        let diagnostics = self.diagnostics();
        let summary_name = diagnostics.summary_name();

        let event = SimulationEvent::Completed(SimulationCompletedEvent {
            run_id,
            status,
            scenario: scenario.clone(),
            summary_name: summary_name.clone(),
            instigator: settings.instigator.clone(),
            finished_at: Utc::now(),
        });
        if let Err(e) = inner.publisher.publish(event) {
            warn!(run_id = %run_id, error = %e, "完成事件发布失败");
        }

        match result {
            Ok(()) => {
                info!(run_id = %run_id, status = %status, summary = %summary_name, "插单运行结束");
                Ok(SimulationSummary {
                    run_id,
                    status,
                    summary_name,
                    instigator: settings.instigator,
                    scenario,
                    diagnostics,
                })
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "插单运行异常终止");
                Err(e)
            }
        }
    }

    /// 两阶段主循环
    async fn run_phases(
        &self,
        run_id: Uuid,
        requested: &[JobId],
        settings: &SimulationSettings,
        kpi: Option<Arc<dyn KpiCalculator>>,
        working: &ScenarioHandle,
        cancel: &CancellationToken,
    ) -> SimulationResult<()> {
        let mut phase = settings.phase;
        let mut calculator = ConstraintTimeCalculator::for_phase(phase);

        loop {
            calculator.enter_phase(phase);

            // 试插失败已有结论的作业不再进入下一阶段
            let pending: Vec<JobId> = {
                let mut state = self.lock_state();
                if Self::settle_if_done(&mut state, requested) {
                    return Ok(());
                }
                state.diagnostics.phase = phase;
                requested
                    .iter()
                    .copied()
                    .filter(|id| state.diagnostics.status_of(*id) != Some(JobInsertStatus::FailedToSchedule))
                    .collect()
            };

            let mut sequencer = {
                let detail = working.read().await;
                JobSequencer::build(&detail, &pending, phase, settings.group_mode)
            };
            self.record_exclusions(&sequencer, phase);
            info!(phase = %phase, sets = sequencer.len(), excluded = sequencer.excluded().len(), "插单阶段开始");

            while let Some(set) = sequencer.get_next_expedite_set().cloned() {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.process_set(run_id, &set, phase, &calculator, settings, kpi.clone(), working, cancel)
                    .await?;
                if cancel.is_cancelled() {
                    return Ok(());
                }
                sequencer.remove_current_set();
            }

            match phase.next() {
                Some(next) => {
                    debug!(from = %phase, to = %next, "阶段切换");
                    phase = next;
                }
                None => {
                    let mut state = self.lock_state();
                    if !state.diagnostics.status.is_terminal() {
                        state.diagnostics.status = SimulationStatus::Completed;
                    }
                    state.cancel = None;
                    return Ok(());
                }
            }
        }
    }

    /// 所有作业都有结论时在同一临界区内完成运行,之后的中止返回 false
    pub(super) fn settle_if_done(state: &mut RunState, requested: &[JobId]) -> bool {
        let done = requested
            .iter()
            .all(|id| !matches!(state.diagnostics.status_of(*id), Some(JobInsertStatus::New)));
        if done {
            if !state.diagnostics.status.is_terminal() {
                state.diagnostics.status = SimulationStatus::Completed;
            }
            state.cancel = None;
        }
        done
    }

    /// 处理一个作业集: 候选 → 试插 → 选优 → 提交
    #[allow(clippy::too_many_arguments)]
    async fn process_set(
        &self,
        run_id: Uuid,
        set: &ExpediteSet,
        phase: SimulationPhase,
        calculator: &ConstraintTimeCalculator,
        settings: &SimulationSettings,
        kpi: Option<Arc<dyn KpiCalculator>>,
        working: &ScenarioHandle,
        cancel: &CancellationToken,
    ) -> SimulationResult<()> {
        // 读锁下计算最早时间与候选
        let (earliest, candidates) = {
            let detail = working.read().await;
            let jobs: Vec<&Job> = set.jobs.iter().filter_map(|id| detail.job(*id)).collect();
            let earliest = calculator.calculate_min_schedule_date(&detail, &jobs, settings);
            let candidates = self.inner.generator.generate(&detail, &jobs, &earliest, phase, settings);
            (earliest, candidates)
        };

        {
            let mut state = self.lock_state();
            state.diagnostics.current_set = Some(set.label.clone());
            state.diagnostics.total_candidates = candidates.len();
        }
        self.inner.trials_completed.store(0, Ordering::Relaxed);
        debug!(set = %set.label, earliest = ?earliest.time(), candidates = candidates.len(), "作业集开始处理");

        let result_status = if let EarliestTime::Unschedulable { reason, .. } = &earliest {
            if phase.is_on_time_phase() {
                // 不启动试插,直接转入延期阶段
                debug!(set = %set.label, reason = %reason, "准时阶段不可排,延后处理");
                self.note_set(set, DEFERRED_REASON);
                JobInsertStatus::New
            } else {
                let reason = format!("{}: {}", UNABLE_TO_INSERT_REASON, reason);
                self.record_set(set, JobInsertStatus::FailedToSchedule, Some(reason), phase);
                JobInsertStatus::FailedToSchedule
            }
        } else {
            let base = working.snapshot().await;
            let batch = self.run_batch(base, set, candidates, phase, settings, kpi, cancel).await;

            if cancel.is_cancelled() {
                debug!(set = %set.label, "运行已中止,丢弃试插结果");
                return Ok(());
            }

            match batch {
                BatchResult::Winner(trial) => self.commit(set, &trial, phase, settings, working).await?,
                BatchResult::NoFeasible if phase.is_on_time_phase() => {
                    self.note_set(set, DEFERRED_REASON);
                    JobInsertStatus::New
                }
                BatchResult::NoFeasible => {
                    self.record_set(
                        set,
                        JobInsertStatus::FailedToSchedule,
                        Some(UNABLE_TO_INSERT_REASON.to_string()),
                        phase,
                    );
                    JobInsertStatus::FailedToSchedule
                }
                BatchResult::Failed(message) => {
                    self.record_set(set, JobInsertStatus::FailedToSchedule, Some(message), phase);
                    JobInsertStatus::FailedToSchedule
                }
                BatchResult::Canceled => return Ok(()),
            }
        };

        let progress = self.diagnostics().progress_percent;
        let event = SimulationEvent::JobProgress(JobProgressEvent {
            run_id,
            label: set.label.clone(),
            phase,
            status: result_status,
            progress_percent: progress,
        });
        if let Err(e) = self.inner.publisher.publish(event) {
            warn!(set = %set.label, error = %e, "进度事件发布失败");
        }
        Ok(())
    }

    /// 分段并行试插,收齐全部分段后选优
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(set = %set.label, candidates = candidates.len(), phase = %phase))]
    async fn run_batch(
        &self,
        base: ScenarioDetail,
        set: &ExpediteSet,
        candidates: Vec<CandidateTime>,
        phase: SimulationPhase,
        settings: &SimulationSettings,
        kpi: Option<Arc<dyn KpiCalculator>>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let ranges = partition_candidates(candidates.len(), settings.max_concurrency, settings.partition_threshold);
        let expected = ranges.len();
        let batch_token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrency));
        let (tx, mut rx) = mpsc::channel::<TrialReport>(expected.max(1));

        let mut handles = Vec::with_capacity(expected);
        for (partition, range) in ranges.into_iter().enumerate() {
            let request = TrialRequest {
                partition,
                jobs: set.jobs.clone(),
                candidates: range.map(|i| (i, candidates[i])).collect(),
                phase,
                need_date: set.need_date,
                kpi: kpi.clone(),
                cancel: batch_token.clone(),
                progress: self.inner.trials_completed.clone(),
            };
            let copy = base.copy_scenario();
            let semaphore = semaphore.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                let report = match semaphore.acquire_owned().await {
                    Ok(_permit) => tokio::task::spawn_blocking(move || run_trial(copy, request))
                        .await
                        .unwrap_or_else(|e| TrialReport::Failed {
                            partition,
                            message: format!("试插任务异常退出: {}", e),
                        }),
                    Err(_) => TrialReport::Canceled { partition },
                };
                // 接收端已退出时丢弃结果
                let _ = tx.send(report).await;
            }));
        }
        drop(tx);
        debug!(partitions = expected, "试插分段已启动");

        // 收齐全部分段结果
        let mut outcomes = Vec::new();
        let mut failure: Option<String> = None;
        for _ in 0..expected {
            match rx.recv().await {
                Some(TrialReport::Completed { outcomes: found, attempted, partition }) => {
                    debug!(partition, attempted, feasible = found.len(), "试插分段完成");
                    outcomes.extend(found);
                }
                Some(TrialReport::Failed { partition, message }) => {
                    if failure.is_none() {
                        warn!(partition, error = %message, "试插分段失败,取消同批其余分段");
                        batch_token.cancel();
                        failure = Some(message);
                    }
                }
                Some(TrialReport::Canceled { partition }) => {
                    debug!(partition, "试插分段已取消");
                }
                None => break,
            }
        }
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "试插任务汇合失败");
            }
        }

        if let Some(message) = failure {
            return BatchResult::Failed(message);
        }
        if cancel.is_cancelled() {
            return BatchResult::Canceled;
        }

        let policy = SelectionPolicy::new(phase, kpi.as_deref(), settings);
        match policy.select_winner(&outcomes) {
            Some(winner) => {
                debug!(
                    candidate = winner.candidate.time,
                    path_preference = winner.path_preference(),
                    score = ?winner.score,
                    completion = winner.outcome.completion,
                    feasible = outcomes.len(),
                    "选出最优试插结果"
                );
                BatchResult::Winner(Box::new(winner.clone()))
            }
            None => BatchResult::NoFeasible,
        }
    }

    /// 在写锁下提交胜出结果（工作场景,按需同步到原始场景）
    #[instrument(skip_all, fields(set = %set.label, time = trial.candidate.time))]
    async fn commit(
        &self,
        set: &ExpediteSet,
        trial: &TrialOutcome,
        phase: SimulationPhase,
        settings: &SimulationSettings,
        working: &ScenarioHandle,
    ) -> SimulationResult<JobInsertStatus> {
        // 先提交原始场景: 失败时两份场景都未修改
        // 锁顺序: 原始场景 → 工作场景
        {
            let mut live = if settings.commit_to_live {
                let mut live = self.inner.live.write().await;
                live.apply_outcome(&trial.outcome)?;
                Some(live)
            } else {
                None
            };
            let mut detail = working.write().await;
            detail.apply_outcome(&trial.outcome)?;
            detail.touch();
            if let Some(live) = live.as_mut() {
                live.touch();
            }
        }

        let mut state = self.lock_state();
        for (job, window) in &trial.outcome.windows {
            let status = if window.late {
                JobInsertStatus::ScheduledLate
            } else {
                JobInsertStatus::ScheduledOnTime
            };
            state.diagnostics.record(*job, status, None, Some(*window), phase);
        }
        info!(
            set = %set.label,
            start = trial.outcome.start,
            completion = trial.outcome.completion,
            late = trial.outcome.late,
            "作业集已插入"
        );

        Ok(if trial.outcome.late {
            JobInsertStatus::ScheduledLate
        } else {
            JobInsertStatus::ScheduledOnTime
        })
    }

    // ==========================================
    // 诊断记录
    // ==========================================

    fn record_exclusions(&self, sequencer: &JobSequencer, phase: SimulationPhase) {
        let mut state = self.lock_state();
        for (job, reason) in sequencer.excluded() {
            if state.diagnostics.status_of(*job) == Some(JobInsertStatus::New) {
                state
                    .diagnostics
                    .record(*job, JobInsertStatus::Excluded, Some(reason.clone()), None, phase);
            }
        }
    }

    fn record_set(&self, set: &ExpediteSet, status: JobInsertStatus, reason: Option<String>, phase: SimulationPhase) {
        let mut state = self.lock_state();
        for job in &set.jobs {
            state.diagnostics.record(*job, status, reason.clone(), None, phase);
        }
    }

    fn note_set(&self, set: &ExpediteSet, reason: &str) {
        let mut state = self.lock_state();
        for job in &set.jobs {
            state.diagnostics.note(*job, reason);
        }
    }

    pub(super) fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InsertJobsSimulationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertJobsSimulationManager")
            .field("running", &self.is_running())
            .field("status", &self.status())
            .field("kpis", &self.inner.kpis)
            .finish()
    }
}

// ==========================================
// 插单运行端到端测试
// ==========================================
// 职责: 验证 导入 → 排序 → 约束 → 候选 → 试插 → 选优 → 提交 的完整流程
// 场景: 选优规则、不可排作业、试插异常、提交失败、分组插入、运行中止/取消、JSON 场景导入
// ==========================================


use insert_jobs_aps::config::SimulationSettings;
use insert_jobs_aps::domain::ids::JobId;
use insert_jobs_aps::domain::kpi::{KpiCalculator, KpiRegistry, TotalLatenessKpi};
use insert_jobs_aps::domain::scenario::{ExpediteOutcome, ScenarioDetail, ScenarioHandle};
use insert_jobs_aps::domain::types::{GroupMode, JobInsertStatus, SimulationPhase, SimulationStatus};
use insert_jobs_aps::engine::{
    CandidateTime, CandidateTimeGenerator, ChannelEventPublisher, InsertJobsSimulationManager,
    OptionalEventPublisher, SelectionPolicy, SimulationEvent, TrialOutcome, UNABLE_TO_INSERT_REASON,
};
use insert_jobs_aps::importer::ScenarioImporter;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{block_spans, occupy, ScenarioBuilder};

// ==========================================
// 测试辅助
// ==========================================

/// 每次计算都耗时的 KPI,用于在试插进行中中止运行
struct SlowKpi;

impl KpiCalculator for SlowKpi {
    fn name(&self) -> &str {
        "Slow"
    }

    fn lower_is_better(&self) -> bool {
        true
    }

    fn calculate(&self, _scenario: &ScenarioDetail) -> f64 {
        std::thread::sleep(Duration::from_millis(100));
        0.0
    }
}

/// 指定作业被试插后计算即崩溃的 KPI
struct PanicWhenScheduled(&'static str);

impl KpiCalculator for PanicWhenScheduled {
    fn name(&self) -> &str {
        "PanicWhenScheduled"
    }

    fn lower_is_better(&self) -> bool {
        true
    }

    fn calculate(&self, scenario: &ScenarioDetail) -> f64 {
        let scheduled = scenario
            .job_by_name(self.0)
            .and_then(|id| scenario.job(id))
            .is_some_and(|job| job.scheduled.is_some());
        if scheduled {
            panic!("KPI 计算崩溃: {}", self.0);
        }
        0.0
    }
}

fn slow_manager() -> (InsertJobsSimulationManager, ScenarioHandle, Vec<JobId>) {
    let mut builder = ScenarioBuilder::new(0, 0);
    let r1 = builder.resource("R1", 0, 1_000_000);
    let jobs = vec![
        builder.job("SLOW-A", 50_000, 100, vec![r1]),
        builder.job("SLOW-B", 60_000, 100, vec![r1]),
    ];
    let handle = builder.build_handle();

    let mut kpis = KpiRegistry::with_defaults();
    kpis.register(Arc::new(SlowKpi));
    let manager = InsertJobsSimulationManager::with_components(
        handle.clone(),
        kpis,
        OptionalEventPublisher::none(),
        CandidateTimeGenerator::new(),
    );
    (manager, handle, jobs)
}

fn slow_settings() -> SimulationSettings {
    SimulationSettings {
        kpi_name: Some("Slow".to_string()),
        ..Default::default()
    }
}

/// 等待运行进入第一个作业集
async fn wait_for_first_set(manager: &InsertJobsSimulationManager) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while manager.diagnostics().current_set.is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("run never started a set");
}

fn trial(partition: usize, index: usize, score: f64, time: i64) -> TrialOutcome {
    TrialOutcome {
        partition,
        candidate_index: index,
        candidate: CandidateTime::at(time),
        score: Some(score),
        outcome: ExpediteOutcome {
            placements: Vec::new(),
            path_selections: Vec::new(),
            windows: Vec::new(),
            start: time,
            completion: time + 50,
            late: false,
        },
    }
}

// ==========================================
// 选优
// ==========================================

#[test]
fn test_lower_kpi_score_wins_across_partitions() {
    let policy = SelectionPolicy::new(
        SimulationPhase::OnOrBeforeNeedDate,
        Some(&TotalLatenessKpi),
        &SimulationSettings::default(),
    );
    let outcomes = vec![trial(0, 0, 5.0, 100), trial(1, 3, 3.0, 200)];
    let winner = policy.select_winner(&outcomes).unwrap();
    assert_eq!(winner.score, Some(3.0));
    assert_eq!(winner.candidate.time, 200);

    let reversed: Vec<_> = outcomes.into_iter().rev().collect();
    assert_eq!(policy.select_winner(&reversed).unwrap().candidate.time, 200);
}

// ==========================================
// 不可排作业
// ==========================================

#[tokio::test]
async fn test_unschedulable_job_deferred_then_failed() {
    // 冻结区到 300,需求日期 100,且没有可用资源
    let mut builder = ScenarioBuilder::new(200, 100);
    builder.resource("R1", 0, 1000);
    let job = builder.job("NO-RESOURCE", 100, 10, Vec::new());
    let handle = builder.build_handle();

    let publisher = Arc::new(ChannelEventPublisher::new());
    let mut events = publisher.subscribe().unwrap();
    let manager = InsertJobsSimulationManager::with_components(
        handle,
        KpiRegistry::with_defaults(),
        OptionalEventPublisher::with_publisher(publisher),
        CandidateTimeGenerator::new(),
    );

    let summary = manager.run(&[job], SimulationSettings::default()).await.unwrap();
    assert_eq!(summary.status, SimulationStatus::Completed);

    let diagnostic = summary.diagnostics.job(job).unwrap();
    assert_eq!(diagnostic.status, JobInsertStatus::FailedToSchedule);
    assert_eq!(diagnostic.reason.as_deref(), Some(UNABLE_TO_INSERT_REASON));
    assert_eq!(diagnostic.phase, Some(SimulationPhase::EvenIfLate));
    assert_eq!(summary.diagnostics.failed, 1);

    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SimulationEvent::JobProgress(p) = event {
            progress.push(p);
        }
    }
    assert_eq!(progress.len(), 2);

    // 准时阶段没有试插
    assert_eq!(progress[0].phase, SimulationPhase::OnOrBeforeNeedDate);
    assert_eq!(progress[0].status, JobInsertStatus::New);
    assert_eq!(progress[0].progress_percent, 0.0);

    // 延期阶段试插唯一候选（冻结区终点）后失败
    assert_eq!(progress[1].phase, SimulationPhase::EvenIfLate);
    assert_eq!(progress[1].status, JobInsertStatus::FailedToSchedule);
    assert_eq!(progress[1].progress_percent, 100.0);
}

// ==========================================
// 试插异常与提交失败
// ==========================================

#[tokio::test]
async fn test_panicking_trial_fails_job_and_run_continues() {
    let mut builder = ScenarioBuilder::new(0, 0);
    let r1 = builder.resource("R1", 0, 10_000);
    let a = builder.job("A", 500, 100, vec![r1]);
    let b = builder.job("B", 600, 100, vec![r1]);
    let handle = builder.build_handle();

    let mut kpis = KpiRegistry::with_defaults();
    kpis.register(Arc::new(PanicWhenScheduled("A")));
    let manager = InsertJobsSimulationManager::with_components(
        handle.clone(),
        kpis,
        OptionalEventPublisher::none(),
        CandidateTimeGenerator::new(),
    );
    let settings = SimulationSettings {
        kpi_name: Some("PanicWhenScheduled".to_string()),
        ..Default::default()
    };

    let summary = manager.run(&[a, b], settings).await.unwrap();
    assert_eq!(summary.status, SimulationStatus::Completed);

    let failed = summary.diagnostics.job(a).unwrap();
    assert_eq!(failed.status, JobInsertStatus::FailedToSchedule);
    assert!(failed.reason.as_deref().unwrap().starts_with("试插任务异常退出"));
    assert!(failed.window.is_none());

    assert_eq!(summary.diagnostics.job(b).unwrap().status, JobInsertStatus::ScheduledOnTime);
    assert_eq!(summary.diagnostics.failed, 1);
    assert_eq!(summary.diagnostics.on_time, 1);

    // 只有 B 的块被提交
    let live = handle.read().await;
    assert_eq!(block_spans(&live, r1).len(), 1);
    assert!(live.job(a).unwrap().scheduled.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commit_conflict_on_live_scenario_ends_in_error() {
    let (manager, handle, jobs) = slow_manager();

    let running = {
        let manager = manager.clone();
        let jobs = jobs.clone();
        tokio::spawn(async move { manager.run(&jobs, slow_settings()).await })
    };
    wait_for_first_set(&manager).await;

    // 试插进行中,原始场景整段被外部占用
    let r1 = {
        let mut live = handle.write().await;
        let r1 = live.resource_by_name("R1").unwrap();
        occupy(&mut live, r1, jobs[1], 0, 1_000_000);
        r1
    };

    let result = running.await.unwrap();
    assert!(result.is_err());
    assert!(!result.unwrap_err().is_validation());
    assert_eq!(manager.status(), SimulationStatus::Error);
    assert!(!manager.is_running());
    assert!(!manager.abort());

    // 冲突的结果没有写入任何场景
    let diagnostics = manager.diagnostics();
    assert!(diagnostics.jobs.iter().all(|d| d.status == JobInsertStatus::New));
    assert_eq!(block_spans(&*handle.read().await, r1), vec![(0, 1_000_000)]);
}

// ==========================================
// 分组插入
// ==========================================

#[tokio::test]
async fn test_group_insert_places_jobs_together() {
    let mut builder = ScenarioBuilder::new(0, 0);
    let r1 = builder.resource("R1", 0, 10_000);
    let a = builder.grouped_job("G-A", "G1", 500, 100, vec![r1]);
    let b = builder.grouped_job("G-B", "G1", 500, 100, vec![r1]);
    let handle = builder.build_handle();
    let manager = InsertJobsSimulationManager::new(handle.clone());

    let settings = SimulationSettings {
        group_mode: GroupMode::GroupInsert,
        ..Default::default()
    };
    let summary = manager.run(&[a, b], settings).await.unwrap();

    assert_eq!(summary.diagnostics.on_time, 2);
    let window_a = summary.diagnostics.job(a).unwrap().window.unwrap();
    let window_b = summary.diagnostics.job(b).unwrap().window.unwrap();
    assert_eq!((window_a.start, window_a.end), (0, 100));
    assert_eq!((window_b.start, window_b.end), (100, 200));

    let live = handle.read().await;
    assert_eq!(block_spans(&live, r1), vec![(0, 100), (100, 200)]);
}

// ==========================================
// 中止与取消
// ==========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abort_mid_run_discards_in_flight_trials() {
    let (manager, handle, jobs) = slow_manager();

    let running = {
        let manager = manager.clone();
        let jobs = jobs.clone();
        tokio::spawn(async move { manager.run(&jobs, slow_settings()).await })
    };
    wait_for_first_set(&manager).await;

    assert!(manager.abort());
    let summary = running.await.unwrap().unwrap();

    assert_eq!(summary.status, SimulationStatus::Stopped);
    assert_eq!(manager.status(), SimulationStatus::Stopped);
    assert!(summary.diagnostics.jobs.iter().all(|d| d.status == JobInsertStatus::New));
    assert!(summary.scenario.resources().all(|r| r.blocks.is_empty()));
    assert!(handle.read().await.resources().all(|r| r.blocks.is_empty()));

    // 再次中止不改变任何诊断
    let before = manager.diagnostics();
    assert!(!manager.abort());
    assert!(!manager.cancel());
    assert_eq!(manager.diagnostics(), before);
    assert_eq!(manager.status(), SimulationStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_mid_run_marks_canceled() {
    let (manager, _, jobs) = slow_manager();

    let running = {
        let manager = manager.clone();
        let jobs = jobs.clone();
        tokio::spawn(async move { manager.run(&jobs, slow_settings()).await })
    };
    wait_for_first_set(&manager).await;

    assert!(manager.cancel());
    let summary = running.await.unwrap().unwrap();
    assert_eq!(summary.status, SimulationStatus::Canceled);
    assert!(!manager.is_running());

    // 结束后可以再次运行
    let rerun = manager.run(&jobs, SimulationSettings::default()).await.unwrap();
    assert_eq!(rerun.status, SimulationStatus::Completed);
    assert_eq!(rerun.diagnostics.on_time, 2);
}

// ==========================================
// JSON 场景导入 → 插单
// ==========================================

const SCENARIO_JSON: &str = r#"{
    "clock": 0,
    "frozen_span": 0,
    "resources": [
        {
            "name": "CUT",
            "capacity": [{"start": 0, "end": 480}, {"start": 600, "end": 1080}],
            "blocks": [{"start": 0, "end": 200, "job": "BOOKED", "operation": 10}]
        },
        {
            "name": "WELD",
            "capacity": [{"start": 0, "end": 1080}]
        }
    ],
    "jobs": [
        {
            "name": "BOOKED",
            "need_date": 300,
            "running": true,
            "manufacturing_orders": [{"name": "MO-BOOKED", "paths": [{"index": 0, "operations": [
                {"id": 10, "duration": 200, "resources": ["CUT"]}
            ]}]}]
        },
        {
            "name": "RUSH",
            "need_date": 1000,
            "priority": 5,
            "manufacturing_orders": [{"name": "MO-RUSH", "paths": [{"index": 0, "operations": [
                {"id": 10, "name": "CUT", "duration": 100, "resources": ["CUT"]},
                {"id": 20, "name": "WELD", "duration": 50, "resources": ["WELD"]}
            ]}]}]
        }
    ]
}"#;

#[tokio::test]
async fn test_imported_scenario_runs_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SCENARIO_JSON.as_bytes()).unwrap();

    let imported = ScenarioImporter::new().import_file(file.path()).unwrap();
    let rush = imported.scenario.job_by_name("RUSH").unwrap();
    assert_eq!(imported.unscheduled, vec![rush]);

    let handle = ScenarioHandle::new(imported.scenario);
    let manager = InsertJobsSimulationManager::new(handle.clone());
    let summary = manager.run(&[rush], SimulationSettings::default()).await.unwrap();

    let diagnostic = summary.diagnostics.job_by_name("RUSH").unwrap();
    assert_eq!(diagnostic.status, JobInsertStatus::ScheduledOnTime);
    let window = diagnostic.window.unwrap();
    assert!(window.start >= 200);
    assert!(window.end <= 1000);

    let live = handle.read().await;
    let cut = live.resource_by_name("CUT").unwrap();
    let weld = live.resource_by_name("WELD").unwrap();
    assert_eq!(block_spans(&live, cut).len(), 2);
    assert_eq!(block_spans(&live, weld).len(), 1);
    assert!(live.resource(cut).unwrap().blocks.validate().is_ok());
}

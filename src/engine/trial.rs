// ==========================================
// 插单排产系统 - 试插模拟
// ==========================================
// 职责: 在独立场景副本上逐个尝试一段候选时间
// 并发: 每个分段一个任务,副本独占,不需要加锁
// 取消: 每次尝试之前检查取消令牌
// ==========================================

use crate::domain::error::ExpediteError;
use crate::domain::ids::JobId;
use crate::domain::kpi::KpiCalculator;
use crate::domain::scenario::{ExpediteOutcome, ScenarioDetail};
use crate::domain::types::{SimulationPhase, Ticks};
use crate::engine::candidate::CandidateTime;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ==========================================
// 分段
// ==========================================

/// 将候选列表切分为连续分段
///
/// 分段大小 = ⌈count / max_concurrency⌉;count <= threshold 时只有一个分段
pub fn partition_candidates(count: usize, max_concurrency: usize, threshold: usize) -> Vec<Range<usize>> {
    if count == 0 {
        return Vec::new();
    }
    if count <= threshold || max_concurrency <= 1 {
        return vec![0..count];
    }
    let size = count.div_ceil(max_concurrency);
    (0..count)
        .step_by(size)
        .map(|start| start..(start + size).min(count))
        .collect()
}

// ==========================================
// 试插请求与结果
// ==========================================

pub struct TrialRequest {
    pub partition: usize,
    pub jobs: Vec<JobId>,
    /// (全局候选序号, 候选)
    pub candidates: Vec<(usize, CandidateTime)>,
    pub phase: SimulationPhase,
    pub need_date: Ticks,
    pub kpi: Option<Arc<dyn KpiCalculator>>,
    pub cancel: CancellationToken,
    pub progress: Arc<AtomicUsize>,
}

/// 一个可行的试插结果
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub partition: usize,
    pub candidate_index: usize,
    pub candidate: CandidateTime,
    pub score: Option<f64>,
    pub outcome: ExpediteOutcome,
}

impl TrialOutcome {
    pub fn path_preference(&self) -> u32 {
        self.candidate.path_preference()
    }
}

/// 分段试插报告
#[derive(Debug, Clone)]
pub enum TrialReport {
    Completed {
        partition: usize,
        attempted: usize,
        outcomes: Vec<TrialOutcome>,
    },
    Canceled {
        partition: usize,
    },
    Failed {
        partition: usize,
        message: String,
    },
}

// ==========================================
// 试插执行
// ==========================================

/// 在 base 上逐个尝试分段内的候选
///
/// 每个候选使用 base 的新副本;不可行的候选直接跳过,
/// 时间轴结构错误视为试插失败
pub fn run_trial(base: ScenarioDetail, request: TrialRequest) -> TrialReport {
    let TrialRequest {
        partition,
        jobs,
        candidates,
        phase,
        need_date,
        kpi,
        cancel,
        progress,
    } = request;

    let on_time_by = phase.is_on_time_phase().then_some(need_date);
    let mut outcomes = Vec::new();
    let mut attempted = 0;

    for (candidate_index, candidate) in candidates {
        if cancel.is_cancelled() {
            debug!(partition, attempted, "试插已取消");
            return TrialReport::Canceled { partition };
        }

        let mut copy = base.copy_scenario();
        let result = copy.expedite(&jobs, candidate.time, candidate.path_index(), on_time_by);
        attempted += 1;
        progress.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(outcome) => {
                let score = kpi.as_ref().map(|k| k.calculate(&copy));
                outcomes.push(TrialOutcome {
                    partition,
                    candidate_index,
                    candidate,
                    score,
                    outcome,
                });
            }
            Err(ExpediteError::Timeline(err)) => {
                warn!(partition, time = candidate.time, error = %err, "试插时间轴错误");
                return TrialReport::Failed {
                    partition,
                    message: err.to_string(),
                };
            }
            Err(err) => {
                debug!(partition, time = candidate.time, reason = %err, "候选不可行");
            }
        }
    }

    TrialReport::Completed {
        partition,
        attempted,
        outcomes,
    }
}

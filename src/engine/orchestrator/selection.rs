// ==========================================
// 插单排产系统 - 试插结果选优
// ==========================================
// 规则: (路线偏好, KPI 或时间, 阶段方向上的时间, 候选序号) 构成全序
// 结果与试插完成顺序无关
// ==========================================

use crate::config::SimulationSettings;
use crate::domain::kpi::KpiCalculator;
use crate::domain::types::SimulationPhase;
use crate::engine::trial::TrialOutcome;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    pub phase: SimulationPhase,
    /// None 表示按时间选优
    pub lower_is_better: Option<bool>,
    pub threshold: Option<f64>,
}

impl SelectionPolicy {
    pub fn new(phase: SimulationPhase, kpi: Option<&dyn KpiCalculator>, settings: &SimulationSettings) -> Self {
        let lower_is_better = kpi.map(|k| settings.kpi_lower_is_better.unwrap_or_else(|| k.lower_is_better()));
        Self {
            phase,
            lower_is_better,
            threshold: kpi.and(settings.kpi_threshold),
        }
    }

    /// 按时间选优的策略
    pub fn time_only(phase: SimulationPhase) -> Self {
        Self {
            phase,
            lower_is_better: None,
            threshold: None,
        }
    }

    /// 劣于阈值的结果视为不可行
    pub fn is_acceptable(&self, outcome: &TrialOutcome) -> bool {
        match (self.lower_is_better, self.threshold, outcome.score) {
            (Some(true), Some(limit), Some(score)) => score <= limit,
            (Some(false), Some(limit), Some(score)) => score >= limit,
            _ => true,
        }
    }

    /// a 优于 b 时返回 Less
    pub fn compare(&self, a: &TrialOutcome, b: &TrialOutcome) -> Ordering {
        a.path_preference()
            .cmp(&b.path_preference())
            .then_with(|| self.compare_score(a, b))
            .then_with(|| self.compare_time(a, b))
            .then_with(|| a.candidate_index.cmp(&b.candidate_index))
            .then_with(|| a.partition.cmp(&b.partition))
    }

    fn compare_score(&self, a: &TrialOutcome, b: &TrialOutcome) -> Ordering {
        let Some(lower_is_better) = self.lower_is_better else {
            return Ordering::Equal;
        };
        let sa = a.score.unwrap_or(f64::NAN);
        let sb = b.score.unwrap_or(f64::NAN);
        if lower_is_better {
            sa.total_cmp(&sb)
        } else {
            sb.total_cmp(&sa)
        }
    }

    /// 准时阶段: 候选时间越晚越好（尽量贴近需求日期）
    /// 延期阶段: 完工越早越好
    fn compare_time(&self, a: &TrialOutcome, b: &TrialOutcome) -> Ordering {
        match self.phase {
            SimulationPhase::OnOrBeforeNeedDate => b
                .candidate
                .time
                .cmp(&a.candidate.time)
                .then(a.outcome.completion.cmp(&b.outcome.completion)),
            SimulationPhase::EvenIfLate => a
                .outcome
                .completion
                .cmp(&b.outcome.completion)
                .then(a.candidate.time.cmp(&b.candidate.time)),
        }
    }

    pub fn select_winner<'a>(&self, outcomes: &'a [TrialOutcome]) -> Option<&'a TrialOutcome> {
        outcomes
            .iter()
            .filter(|o| self.is_acceptable(o))
            .min_by(|a, b| self.compare(a, b))
    }
}

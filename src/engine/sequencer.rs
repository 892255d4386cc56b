// ==========================================
// 插单排产系统 - 作业排序引擎
// ==========================================
// 职责: 过滤 → 分组 → 按需求日期排序,产出待插作业集队列
// 规则: 取队首不移除;结果记录后才前进
// ==========================================

use crate::domain::ids::JobId;
use crate::domain::job::Job;
use crate::domain::scenario::ScenarioDetail;
use crate::domain::types::{GroupMode, SimulationPhase, Ticks};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

// ==========================================
// 过滤器
// ==========================================

/// 过滤结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Keep,
    /// 不参与插单,计入排除数
    Exclude(String),
    /// 本阶段跳过（已有结果）
    Skip,
}

pub trait JobFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, job: &Job, phase: SimulationPhase) -> FilterVerdict;
}

/// 已开工作业
#[derive(Debug, Clone, Default)]
pub struct RunningJobFilter;

impl JobFilter for RunningJobFilter {
    fn name(&self) -> &'static str {
        "Running"
    }

    fn check(&self, job: &Job, _: SimulationPhase) -> FilterVerdict {
        if job.is_running() {
            FilterVerdict::Exclude("作业已开工".to_string())
        } else {
            FilterVerdict::Keep
        }
    }
}

/// 已完工作业
#[derive(Debug, Clone, Default)]
pub struct FinishedJobFilter;

impl JobFilter for FinishedJobFilter {
    fn name(&self) -> &'static str {
        "Finished"
    }

    fn check(&self, job: &Job, _: SimulationPhase) -> FilterVerdict {
        if job.is_finished() {
            FilterVerdict::Exclude("作业已完工".to_string())
        } else {
            FilterVerdict::Keep
        }
    }
}

/// 准时阶段结束后,跳过已准时排入的作业
#[derive(Debug, Clone, Default)]
pub struct ScheduledOnTimeFilter;

impl JobFilter for ScheduledOnTimeFilter {
    fn name(&self) -> &'static str {
        "ScheduledOnTime"
    }

    fn check(&self, job: &Job, phase: SimulationPhase) -> FilterVerdict {
        if !phase.is_on_time_phase() && job.is_scheduled_on_time() {
            FilterVerdict::Skip
        } else {
            FilterVerdict::Keep
        }
    }
}

// ==========================================
// ExpediteSet - 待插作业集
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpediteSet {
    pub jobs: Vec<JobId>,
    pub label: String,     // 作业名或分组名
    pub need_date: Ticks,  // 集合内最早的需求日期
}

// ==========================================
// JobSequencer - 作业排序器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct JobSequencer {
    queue: VecDeque<ExpediteSet>,
    excluded: Vec<(JobId, String)>,
}

impl JobSequencer {
    /// 内置过滤器（顺序即优先级）
    pub fn default_filters() -> Vec<Box<dyn JobFilter>> {
        vec![
            Box::new(RunningJobFilter),
            Box::new(FinishedJobFilter),
            Box::new(ScheduledOnTimeFilter),
        ]
    }

    /// 构建队列
    ///
    /// # 参数
    /// - `requested`: 待插作业（未知作业由调用方提前校验）
    pub fn build(
        scenario: &ScenarioDetail,
        requested: &[JobId],
        phase: SimulationPhase,
        group_mode: GroupMode,
    ) -> Self {
        Self::build_with_filters(scenario, requested, phase, group_mode, &Self::default_filters())
    }

    pub fn build_with_filters(
        scenario: &ScenarioDetail,
        requested: &[JobId],
        phase: SimulationPhase,
        group_mode: GroupMode,
        filters: &[Box<dyn JobFilter>],
    ) -> Self {
        let mut kept: Vec<&Job> = Vec::new();
        let mut excluded = Vec::new();

        'jobs: for &id in requested {
            let Some(job) = scenario.job(id) else {
                continue;
            };
            if kept.iter().any(|j| j.id == id) {
                continue;
            }
            for filter in filters {
                match filter.check(job, phase) {
                    FilterVerdict::Keep => {}
                    FilterVerdict::Exclude(reason) => {
                        debug!(job = %job.name, filter = filter.name(), reason = %reason, "作业被排除");
                        excluded.push((id, reason));
                        continue 'jobs;
                    }
                    FilterVerdict::Skip => continue 'jobs,
                }
            }
            kept.push(job);
        }

        let mut sets = match group_mode {
            GroupMode::Independent => kept.iter().map(|job| single_set(job)).collect::<Vec<_>>(),
            GroupMode::GroupInsert => group_sets(&kept),
        };

        // 需求日期升序;同日按优先级降序、名称升序
        sets.sort_by(|a, b| {
            a.0.need_date
                .cmp(&b.0.need_date)
                .then(b.1.cmp(&a.1))
                .then_with(|| a.0.label.cmp(&b.0.label))
        });

        let sequencer = Self {
            queue: sets.into_iter().map(|(set, _)| set).collect(),
            excluded,
        };
        debug!(
            phase = %phase,
            sets = sequencer.queue.len(),
            excluded = sequencer.excluded.len(),
            "插单队列构建完成"
        );
        sequencer
    }

    /// 查看队首作业集（不移除）
    pub fn get_next_expedite_set(&self) -> Option<&ExpediteSet> {
        self.queue.front()
    }

    /// 队首作业集已有结果,前进到下一个
    pub fn remove_current_set(&mut self) -> Option<ExpediteSet> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// 被过滤器排除的作业及原因
    pub fn excluded(&self) -> &[(JobId, String)] {
        &self.excluded
    }
}

fn single_set(job: &Job) -> (ExpediteSet, i32) {
    (
        ExpediteSet {
            jobs: vec![job.id],
            label: job.name.clone(),
            need_date: job.need_date,
        },
        job.priority,
    )
}

/// 分组插入: 共享 group 的作业捆绑为一个集合,无分组的作业单独成集
fn group_sets(jobs: &[&Job]) -> Vec<(ExpediteSet, i32)> {
    let mut groups: BTreeMap<&str, Vec<&Job>> = BTreeMap::new();
    let mut sets = Vec::new();

    for job in jobs {
        match job.group.as_deref() {
            Some(group) => groups.entry(group).or_default().push(job),
            None => sets.push(single_set(job)),
        }
    }

    for (group, members) in groups {
        let need_date = members.iter().map(|j| j.need_date).min().unwrap_or(Ticks::MAX);
        let priority = members.iter().map(|j| j.priority).max().unwrap_or(0);
        let mut ordered = members;
        ordered.sort_by(|a, b| a.need_date.cmp(&b.need_date).then_with(|| a.name.cmp(&b.name)));
        sets.push((
            ExpediteSet {
                jobs: ordered.iter().map(|j| j.id).collect(),
                label: group.to_string(),
                need_date,
            },
            priority,
        ));
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ScheduledWindow;

    fn job(id: JobId, name: &str, need_date: Ticks, group: Option<&str>) -> Job {
        Job {
            id,
            name: name.to_string(),
            need_date,
            release_date: None,
            priority: 0,
            group: group.map(str::to_string),
            running: false,
            manufacturing_orders: Vec::new(),
            scheduled: None,
        }
    }

    #[test]
    fn test_sorted_by_need_date_and_excludes_running() {
        let mut scenario = ScenarioDetail::new(0, 0);
        let a = scenario.add_job(|id| job(id, "A", 300, None));
        let b = scenario.add_job(|id| job(id, "B", 100, None));
        let c = scenario.add_job(|id| {
            let mut j = job(id, "C", 50, None);
            j.running = true;
            j
        });
        // 无制造订单视为已完工,这里只验证排序与运行中排除
        let filters: Vec<Box<dyn JobFilter>> = vec![Box::new(RunningJobFilter)];
        let mut sequencer = JobSequencer::build_with_filters(
            &scenario,
            &[a, b, c],
            SimulationPhase::OnOrBeforeNeedDate,
            GroupMode::Independent,
            &filters,
        );

        assert_eq!(sequencer.excluded().len(), 1);
        assert_eq!(sequencer.excluded()[0].0, c);
        assert_eq!(sequencer.get_next_expedite_set().unwrap().label, "B");
        // 查看不移除
        assert_eq!(sequencer.get_next_expedite_set().unwrap().label, "B");
        assert_eq!(sequencer.remove_current_set().unwrap().jobs, vec![b]);
        assert_eq!(sequencer.get_next_expedite_set().unwrap().jobs, vec![a]);
        sequencer.remove_current_set();
        assert!(sequencer.is_empty());
    }

    #[test]
    fn test_finished_jobs_excluded() {
        let mut scenario = ScenarioDetail::new(0, 0);
        let a = scenario.add_job(|id| job(id, "A", 300, None));
        let sequencer =
            JobSequencer::build(&scenario, &[a], SimulationPhase::OnOrBeforeNeedDate, GroupMode::Independent);
        assert!(sequencer.is_empty());
        assert_eq!(sequencer.excluded().len(), 1);
    }

    #[test]
    fn test_group_insert_bundles_jobs() {
        let mut scenario = ScenarioDetail::new(0, 0);
        let a = scenario.add_job(|id| job(id, "A", 300, Some("G1")));
        let b = scenario.add_job(|id| job(id, "B", 200, Some("G1")));
        let c = scenario.add_job(|id| job(id, "C", 250, None));
        let filters: Vec<Box<dyn JobFilter>> = Vec::new();
        let sequencer = JobSequencer::build_with_filters(
            &scenario,
            &[a, b, c],
            SimulationPhase::OnOrBeforeNeedDate,
            GroupMode::GroupInsert,
            &filters,
        );
        assert_eq!(sequencer.len(), 2);
        let first = sequencer.get_next_expedite_set().unwrap();
        assert_eq!(first.label, "G1");
        assert_eq!(first.need_date, 200);
        assert_eq!(first.jobs, vec![b, a]);
    }

    #[test]
    fn test_on_time_jobs_skipped_in_late_phase() {
        let mut scenario = ScenarioDetail::new(0, 0);
        let a = scenario.add_job(|id| {
            let mut j = job(id, "A", 300, None);
            j.scheduled = Some(ScheduledWindow {
                start: 0,
                end: 100,
                late: false,
            });
            j
        });
        let filters: Vec<Box<dyn JobFilter>> = vec![Box::new(ScheduledOnTimeFilter)];

        let phase1 = JobSequencer::build_with_filters(
            &scenario,
            &[a],
            SimulationPhase::OnOrBeforeNeedDate,
            GroupMode::Independent,
            &filters,
        );
        assert_eq!(phase1.len(), 1);

        let phase2 =
            JobSequencer::build_with_filters(&scenario, &[a], SimulationPhase::EvenIfLate, GroupMode::Independent, &filters);
        assert!(phase2.is_empty());
        assert!(phase2.excluded().is_empty());
    }
}

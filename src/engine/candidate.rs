// ==========================================
// 插单排产系统 - 候选时间生成引擎
// ==========================================
// 职责: 为作业集生成试插时间（可附带替代路线）
// 输入: 场景（读锁下扫描）+ 作业集 + 最早时间 + 阶段
// 输出: 去重、过滤、排序后的候选时间列表（非空）
// ==========================================
// 准时阶段: 正向扫描块,取需求日期前的块终点,时间降序
// 延期阶段: 反向扫描块,取需求日期后的块终点,时间升序
// ==========================================

use crate::config::SimulationSettings;
use crate::domain::ids::ResourceId;
use crate::domain::job::Job;
use crate::domain::resource::Resource;
use crate::domain::scenario::ScenarioDetail;
use crate::domain::types::{SimulationPhase, Ticks, ONE_TICK};
use crate::engine::constraint::EarliestTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, instrument};

// ==========================================
// CandidateTime - 候选时间
// ==========================================

/// 替代路线标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PathTag {
    pub index: usize,
    pub preference: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CandidateTime {
    pub time: Ticks,
    pub path: Option<PathTag>,
}

impl CandidateTime {
    pub fn at(time: Ticks) -> Self {
        Self { time, path: None }
    }

    pub fn with_path(time: Ticks, path: Option<PathTag>) -> Self {
        Self { time, path }
    }

    /// 路线偏好（未指定路线视为 0）
    pub fn path_preference(&self) -> u32 {
        self.path.map(|p| p.preference).unwrap_or(0)
    }

    pub fn path_index(&self) -> Option<usize> {
        self.path.map(|p| p.index)
    }
}

/// 阶段相关的候选顺序
///
/// - 准时阶段: 时间降序（最晚的准时空档优先）,再按路线偏好升序
/// - 延期阶段: 时间升序（最早的延期空档优先）,再按路线偏好升序
pub fn compare_candidates(phase: SimulationPhase, a: &CandidateTime, b: &CandidateTime) -> Ordering {
    let by_time = match phase {
        SimulationPhase::OnOrBeforeNeedDate => b.time.cmp(&a.time),
        SimulationPhase::EvenIfLate => a.time.cmp(&b.time),
    };
    by_time
        .then_with(|| a.path_preference().cmp(&b.path_preference()))
        .then_with(|| a.path_index().cmp(&b.path_index()))
}

// ==========================================
// CandidateFilter Trait
// ==========================================
pub trait CandidateFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, candidates: Vec<CandidateTime>, settings: &SimulationSettings) -> Vec<CandidateTime>;
}

/// 同一路线上两次尝试之间的最小间隔
///
/// 按时间升序保留,最早的候选（即最早时间本身）总会保留
#[derive(Debug, Clone, Default)]
pub struct MinimumSpacingFilter;

impl CandidateFilter for MinimumSpacingFilter {
    fn name(&self) -> &'static str {
        "MinimumSpacing"
    }

    fn apply(&self, mut candidates: Vec<CandidateTime>, settings: &SimulationSettings) -> Vec<CandidateTime> {
        let spacing = settings.min_retry_spacing;
        if spacing <= 0 || candidates.len() < 2 {
            return candidates;
        }

        candidates.sort_by(|a, b| a.path.cmp(&b.path).then(a.time.cmp(&b.time)));
        let mut last_kept: BTreeMap<Option<PathTag>, Ticks> = BTreeMap::new();
        candidates.retain(|c| match last_kept.get(&c.path) {
            Some(&prev) if c.time - prev < spacing => false,
            _ => {
                last_kept.insert(c.path, c.time);
                true
            }
        });
        candidates
    }
}

// ==========================================
// CandidateTimeGenerator - 候选时间生成器
// ==========================================
pub struct CandidateTimeGenerator {
    filters: Vec<Box<dyn CandidateFilter>>,
}

impl Default for CandidateTimeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateTimeGenerator {
    /// 带内置过滤器的生成器
    pub fn new() -> Self {
        Self {
            filters: vec![Box::new(MinimumSpacingFilter)],
        }
    }

    pub fn without_filters() -> Self {
        Self { filters: Vec::new() }
    }

    pub fn add_filter(&mut self, filter: Box<dyn CandidateFilter>) {
        self.filters.push(filter);
    }

    /// 生成候选时间
    ///
    /// # 参数
    /// - `jobs`: 作业集（分组插入时为多个作业）
    /// - `earliest`: 约束计算器输出
    ///
    /// # 返回
    /// 非空候选列表;不可排时只有一个冻结区终点候选
    #[instrument(skip_all, fields(phase = %phase, jobs = jobs.len()))]
    pub fn generate(
        &self,
        scenario: &ScenarioDetail,
        jobs: &[&Job],
        earliest: &EarliestTime,
        phase: SimulationPhase,
        settings: &SimulationSettings,
    ) -> Vec<CandidateTime> {
        let Some(earliest) = earliest.time() else {
            debug!(frozen_span_end = scenario.frozen_span_end(), "最早时间不可排,仅保留冻结区终点");
            return vec![CandidateTime::at(scenario.frozen_span_end())];
        };
        let need_date = jobs.iter().map(|j| j.need_date).min().unwrap_or(Ticks::MAX);

        let eligible = eligible_resources(scenario, jobs, settings.use_alternate_paths);
        let mut set: HashSet<CandidateTime> = HashSet::new();
        let mut tags: BTreeSet<Option<PathTag>> = BTreeSet::new();

        for (resource_id, resource_tags) in &eligible {
            let Some(resource) = scenario.resource(*resource_id) else {
                continue;
            };
            tags.extend(resource_tags.iter().copied());
            match phase {
                SimulationPhase::OnOrBeforeNeedDate => {
                    scan_forward(resource, earliest, need_date, resource_tags, settings, &mut set)
                }
                SimulationPhase::EvenIfLate => {
                    scan_backward(resource, earliest, need_date, resource_tags, settings, &mut set)
                }
            }
        }
        let found_from_blocks = !set.is_empty();

        if tags.is_empty() {
            tags.insert(None);
        }
        for tag in &tags {
            set.insert(CandidateTime::with_path(earliest, *tag));
        }

        if phase == SimulationPhase::EvenIfLate {
            if !found_from_blocks && need_date > earliest && need_date != Ticks::MAX {
                for tag in &tags {
                    set.insert(CandidateTime::with_path(need_date, *tag));
                }
            }
            if let Some(latest_end) = scenario.latest_block_end() {
                let after_all = (latest_end + ONE_TICK).max(earliest);
                for tag in &tags {
                    set.insert(CandidateTime::with_path(after_all, *tag));
                }
            }
        }

        let mut candidates: Vec<CandidateTime> = set.into_iter().collect();
        for filter in &self.filters {
            let before = candidates.len();
            candidates = filter.apply(candidates, settings);
            debug!(filter = filter.name(), before, after = candidates.len(), "候选过滤");
        }
        candidates.sort_by(|a, b| compare_candidates(phase, a, b));

        debug!(
            earliest,
            need_date,
            resources = eligible.len(),
            candidates = candidates.len(),
            "候选时间生成完成"
        );
        candidates
    }
}

impl std::fmt::Debug for CandidateTimeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.filters.iter().map(|flt| flt.name()).collect();
        f.debug_struct("CandidateTimeGenerator").field("filters", &names).finish()
    }
}

// ==========================================
// 扫描辅助函数
// ==========================================

/// 可用资源 → 路线标记
///
/// 未启用替代路线时只看当前路线,标记为 None
fn eligible_resources(
    scenario: &ScenarioDetail,
    jobs: &[&Job],
    use_alternate_paths: bool,
) -> Vec<(ResourceId, BTreeSet<Option<PathTag>>)> {
    // 保持资源在场景中的遍历顺序,扫描结果可复现
    let mut result: Vec<(ResourceId, BTreeSet<Option<PathTag>>)> = Vec::new();
    let mut add = |resource: ResourceId, tag: Option<PathTag>| {
        match result.iter_mut().find(|(id, _)| *id == resource) {
            Some((_, tags)) => {
                tags.insert(tag);
            }
            None => result.push((resource, BTreeSet::from([tag]))),
        }
    };

    for job in jobs {
        for mo in job.manufacturing_orders.iter().filter(|mo| !mo.is_finished()) {
            if use_alternate_paths {
                for path in mo.selectable_paths() {
                    let tag = PathTag {
                        index: path.index,
                        preference: path.preference,
                    };
                    for op in path.unfinished_operations() {
                        for &resource in &op.primary.eligible_resources {
                            add(resource, Some(tag));
                        }
                    }
                }
            } else if let Some(path) = mo.current_path() {
                for op in path.unfinished_operations() {
                    for &resource in &op.primary.eligible_resources {
                        add(resource, None);
                    }
                }
            }
        }
    }

    let order: Vec<ResourceId> = scenario.resources().map(|r| r.id).collect();
    result.sort_by_key(|(id, _)| order.iter().position(|r| r == id).unwrap_or(usize::MAX));
    result
}

/// 准时阶段: 从首块正向扫描,块终点到达需求日期即停止
fn scan_forward(
    resource: &Resource,
    earliest: Ticks,
    need_date: Ticks,
    tags: &BTreeSet<Option<PathTag>>,
    settings: &SimulationSettings,
    out: &mut HashSet<CandidateTime>,
) {
    let mut last_relevant_end: Option<Ticks> = None;

    for (_, block) in resource.blocks.iter() {
        if block.end >= need_date {
            break;
        }
        if block.end >= earliest {
            let time = block.end + ONE_TICK;
            for tag in tags {
                out.insert(CandidateTime::with_path(time, *tag));
            }
            last_relevant_end = Some(block.end);
        }
    }

    // 最后相关块与需求日期之间的补充候选
    if settings.max_gap_candidates == 0 || settings.gap_fill_step <= 0 {
        return;
    }
    let mut time = match last_relevant_end {
        Some(end) => end + ONE_TICK,
        None => earliest,
    };
    for _ in 0..settings.max_gap_candidates {
        time = time.saturating_add(settings.gap_fill_step);
        if time >= need_date {
            break;
        }
        for tag in tags {
            out.insert(CandidateTime::with_path(time, *tag));
        }
    }
}

/// 延期阶段: 从末块反向扫描,块终点早于需求日期即停止
fn scan_backward(
    resource: &Resource,
    earliest: Ticks,
    need_date: Ticks,
    tags: &BTreeSet<Option<PathTag>>,
    settings: &SimulationSettings,
    out: &mut HashSet<CandidateTime>,
) {
    let offset = if settings.use_alternate_paths {
        settings.late_path_block_offset
    } else {
        ONE_TICK
    };

    for (_, block) in resource.blocks.iter_rev() {
        if block.end < need_date {
            break;
        }
        if block.end >= earliest {
            for tag in tags {
                out.insert(CandidateTime::with_path(block.end + offset, *tag));
            }
        }
    }
}

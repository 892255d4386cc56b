// ==========================================
// 插单排产系统 - 场景仓库
// ==========================================
// 职责: 资源与作业的实体仓库,按稳定键互相引用
// 说明: 深拷贝 = 整体克隆仓库,试插模拟在副本上随意修改
// 并发: ScenarioHandle 以单把读写锁保护工作场景
// ==========================================

use crate::domain::block::Block;
use crate::domain::capacity::ResourceCapacityIntervalList;
use crate::domain::error::{ExpediteError, TimelineError};
use crate::domain::ids::{ActivityId, JobId, ResourceId};
use crate::domain::job::{Job, ScheduledWindow, PRIMARY_REQUIREMENT_INDEX};
use crate::domain::resource::Resource;
use crate::domain::types::Ticks;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ==========================================
// 试插结果
// ==========================================

/// 试插放置的一个块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedBlock {
    pub resource: ResourceId,
    pub block: Block,
}

/// 制造订单的路线选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSelection {
    pub job: JobId,
    pub mo_index: usize,
    pub path_position: usize, // 在 paths 中的下标
}

/// 一次试插的完整结果,可原样提交到工作场景
#[derive(Debug, Clone, PartialEq)]
pub struct ExpediteOutcome {
    pub placements: Vec<PlacedBlock>,
    pub path_selections: Vec<PathSelection>,
    pub windows: Vec<(JobId, ScheduledWindow)>,
    pub start: Ticks,
    pub completion: Ticks,
    pub late: bool,
}

// ==========================================
// ScenarioDetail - 场景明细
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScenarioDetail {
    pub clock: Ticks,       // 当前时钟
    pub frozen_span: Ticks, // 冻结区长度
    resources: SlotMap<ResourceId, Resource>,
    resource_index: HashMap<String, ResourceId>,
    jobs: SlotMap<JobId, Job>,
    job_index: HashMap<String, JobId>,
    revision: u64,
}

impl ScenarioDetail {
    pub fn new(clock: Ticks, frozen_span: Ticks) -> Self {
        Self {
            clock,
            frozen_span,
            ..Default::default()
        }
    }

    // ==========================================
    // 实体维护
    // ==========================================

    pub fn add_resource(&mut self, name: &str, capacity: ResourceCapacityIntervalList) -> ResourceId {
        let id = self
            .resources
            .insert_with_key(|id| Resource::new(id, name, capacity));
        self.resource_index.insert(name.to_string(), id);
        id
    }

    /// 添加作业（由闭包使用分配到的键构造作业）
    pub fn add_job(&mut self, build: impl FnOnce(JobId) -> Job) -> JobId {
        let id = self.jobs.insert_with_key(build);
        if let Some(job) = self.jobs.get(id) {
            self.job_index.insert(job.name.clone(), id);
        }
        id
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn resource_by_name(&self, name: &str) -> Option<ResourceId> {
        self.resource_index.get(name).copied()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub fn job_by_name(&self, name: &str) -> Option<JobId> {
        self.job_index.get(name).copied()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn job_name(&self, id: JobId) -> String {
        self.jobs
            .get(id)
            .map(|j| j.name.clone())
            .unwrap_or_else(|| format!("{:?}", id))
    }

    // ==========================================
    // 时间轴汇总
    // ==========================================

    /// 冻结区终点（最早可排时间下限）
    pub fn frozen_span_end(&self) -> Ticks {
        self.clock.saturating_add(self.frozen_span)
    }

    /// 所有资源上最晚的块终点
    pub fn latest_block_end(&self) -> Option<Ticks> {
        self.resources.values().filter_map(|r| r.blocks.last_block_end()).max()
    }

    // ==========================================
    // 快照与同步
    // ==========================================

    /// 独立可修改的深拷贝
    pub fn copy_scenario(&self) -> ScenarioDetail {
        self.clone()
    }

    /// 变更后推进修订号,使依赖场景的缓存失效
    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ==========================================
    // 试插（加急）
    // ==========================================

    /// 从 time 起按工艺顺序放置作业集中每道未完工工序
    ///
    /// 规则:
    /// 1) path 指定时使用该路线（必须可选）,否则使用当前路线
    /// 2) 每道工序选择完工最早的可用资源,平局取先列出的资源
    /// 3) 不等待工序与前道之间不允许出现离线间隙
    /// 4) on_time_by 给定时,完工晚于它视为失败
    ///
    /// 失败时场景可能已部分修改,只应在副本上调用
    pub fn expedite(
        &mut self,
        jobs: &[JobId],
        time: Ticks,
        path: Option<usize>,
        on_time_by: Option<Ticks>,
    ) -> Result<ExpediteOutcome, ExpediteError> {
        let mut placements = Vec::new();
        let mut path_selections = Vec::new();
        let mut windows = Vec::new();

        for &job_id in jobs {
            let job = self
                .jobs
                .get(job_id)
                .ok_or_else(|| ExpediteError::UnknownJob(format!("{:?}", job_id)))?
                .clone();

            let mut job_start = Ticks::MAX;
            let mut job_end = time;

            for (mo_index, mo) in job.manufacturing_orders.iter().enumerate() {
                if mo.is_finished() {
                    continue;
                }

                let path_position = match path {
                    Some(index) => mo
                        .paths
                        .iter()
                        .position(|p| p.index == index && p.is_selectable())
                        .unwrap_or(mo.current_path),
                    None => mo.current_path,
                };
                let chosen = mo.paths.get(path_position).ok_or_else(|| ExpediteError::NoSelectablePath {
                    job: job.name.clone(),
                })?;

                let mut previous_end = time.max(chosen.latest_finished_end().unwrap_or(Ticks::MIN));
                let mut previous_resource: Option<ResourceId> = None;

                for operation in chosen.unfinished_operations() {
                    let mut best: Option<(Ticks, Ticks, ResourceId)> = None;

                    if operation.primary.eligible_resources.is_empty() {
                        return Err(ExpediteError::NoEligibleResource {
                            job: job.name.clone(),
                            operation: operation.name.clone(),
                        });
                    }

                    for &resource_id in &operation.primary.eligible_resources {
                        let Some(resource) = self.resources.get(resource_id) else {
                            continue;
                        };
                        let Some((start, end)) = resource.find_earliest_fit(previous_end, operation.duration) else {
                            continue;
                        };
                        if operation.no_wait
                            && previous_resource.is_some()
                            && resource.capacity.has_gap_between(previous_end, start)
                        {
                            continue;
                        }
                        let better = match best {
                            None => true,
                            Some((best_start, best_end, _)) => (end, start) < (best_end, best_start),
                        };
                        if better {
                            best = Some((start, end, resource_id));
                        }
                    }

                    let (start, end, resource_id) = best.ok_or_else(|| ExpediteError::PastHorizon {
                        job: job.name.clone(),
                        operation: operation.name.clone(),
                    })?;

                    if end > start {
                        let block = Block {
                            start,
                            end,
                            requirement_index: PRIMARY_REQUIREMENT_INDEX,
                            activity: ActivityId {
                                job: job_id,
                                mo_index,
                                operation: operation.id,
                            },
                        };
                        let resource = self
                            .resources
                            .get_mut(resource_id)
                            .ok_or_else(|| TimelineError::UnknownBlock(format!("{:?}", resource_id)))?;
                        resource.blocks.insert_sorted(block)?;
                        placements.push(PlacedBlock {
                            resource: resource_id,
                            block,
                        });
                    }

                    job_start = job_start.min(start);
                    job_end = job_end.max(end);
                    previous_end = end;
                    previous_resource = Some(resource_id);
                }

                path_selections.push(PathSelection {
                    job: job_id,
                    mo_index,
                    path_position,
                });
            }

            if job_start == Ticks::MAX {
                job_start = time;
            }
            let window = ScheduledWindow {
                start: job_start,
                end: job_end,
                late: job_end > job.need_date,
            };
            windows.push((job_id, window));
        }

        let start = windows.iter().map(|(_, w)| w.start).min().unwrap_or(time);
        let completion = windows.iter().map(|(_, w)| w.end).max().unwrap_or(time);
        let late = windows.iter().any(|(_, w)| w.late);

        if let Some(need_date) = on_time_by {
            if completion > need_date {
                return Err(ExpediteError::MissesNeedDate { completion, need_date });
            }
        }

        let outcome = ExpediteOutcome {
            placements,
            path_selections,
            windows,
            start,
            completion,
            late,
        };
        self.record_selections(&outcome);
        Ok(outcome)
    }

    /// 将试插结果提交到本场景
    ///
    /// 先整体校验再修改,校验失败时场景保持不变
    pub fn apply_outcome(&mut self, outcome: &ExpediteOutcome) -> Result<(), TimelineError> {
        for placed in &outcome.placements {
            let resource = self
                .resources
                .get(placed.resource)
                .ok_or_else(|| TimelineError::UnknownBlock(format!("{:?}", placed.resource)))?;
            if let Some(key) = resource
                .blocks
                .find_first_overlapping(placed.block.start, placed.block.end)
            {
                if let Some(existing) = resource.blocks.get(key) {
                    return Err(TimelineError::OverlappingBlock {
                        start: placed.block.start,
                        end: placed.block.end,
                        existing_start: existing.start,
                        existing_end: existing.end,
                    });
                }
            }
        }

        for placed in &outcome.placements {
            if let Some(resource) = self.resources.get_mut(placed.resource) {
                resource.blocks.insert_sorted(placed.block)?;
            }
        }
        self.record_selections(outcome);
        Ok(())
    }

    fn record_selections(&mut self, outcome: &ExpediteOutcome) {
        for selection in &outcome.path_selections {
            if let Some(mo) = self
                .jobs
                .get_mut(selection.job)
                .and_then(|j| j.manufacturing_orders.get_mut(selection.mo_index))
            {
                mo.current_path = selection.path_position;
            }
        }
        for (job_id, window) in &outcome.windows {
            if let Some(job) = self.jobs.get_mut(*job_id) {
                job.scheduled = Some(*window);
            }
        }
    }
}

// ==========================================
// ScenarioHandle - 工作场景句柄
// ==========================================
// 读锁: 候选生成、KPI 读取
// 写锁: 拍快照、提交胜出结果（短临界区）
#[derive(Debug, Clone)]
pub struct ScenarioHandle {
    inner: Arc<RwLock<ScenarioDetail>>,
}

impl ScenarioHandle {
    pub fn new(detail: ScenarioDetail) -> Self {
        Self {
            inner: Arc::new(RwLock::new(detail)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ScenarioDetail> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ScenarioDetail> {
        self.inner.write().await
    }

    /// 在写锁下拍摄独立副本
    pub async fn snapshot(&self) -> ScenarioDetail {
        let guard = self.inner.write().await;
        guard.copy_scenario()
    }

    /// 推进修订号
    pub async fn touch(&self) {
        self.inner.write().await.touch();
    }
}

// ==========================================
// 插单排产系统 - 场景导入器
// ==========================================
// 职责: JSON 场景文件 → 场景仓库
// 流程: 解析 DTO → 资源（产能区间）→ 作业（按名称解析资源）→ 已有块（按名称解析作业）
// ==========================================

use crate::domain::block::Block;
use crate::domain::capacity::{CapacityInterval, ResourceCapacityIntervalList};
use crate::domain::ids::{ActivityId, JobId, OperationId, ResourceId};
use crate::domain::job::{
    AlternatePath, Job, ManufacturingOrder, Operation, ResourceRequirement, ScheduledWindow,
    PRIMARY_REQUIREMENT_INDEX,
};
use crate::domain::scenario::ScenarioDetail;
use crate::domain::types::Ticks;
use crate::importer::error::{ImportError, ImportResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};

// ==========================================
// DTO 定义
// ==========================================

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDto {
    #[serde(default)]
    pub clock: Ticks,
    #[serde(default)]
    pub frozen_span: Ticks,
    #[serde(default)]
    pub resources: Vec<ResourceDto>,
    #[serde(default)]
    pub jobs: Vec<JobDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDto {
    pub name: String,
    /// 为空时全时段在线
    #[serde(default)]
    pub capacity: Vec<CapacitySpanDto>,
    #[serde(default)]
    pub blocks: Vec<BlockDto>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapacitySpanDto {
    pub start: Ticks,
    pub end: Ticks,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// 已提交的块
#[derive(Debug, Clone, Deserialize)]
pub struct BlockDto {
    pub start: Ticks,
    pub end: Ticks,
    pub job: String,
    #[serde(default)]
    pub mo_index: usize,
    pub operation: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDto {
    pub name: String,
    pub need_date: Ticks,
    #[serde(default)]
    pub release_date: Option<Ticks>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub scheduled: Option<ScheduledWindow>,
    pub manufacturing_orders: Vec<ManufacturingOrderDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManufacturingOrderDto {
    pub name: String,
    #[serde(default)]
    pub current_path: usize,
    pub paths: Vec<AlternatePathDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlternatePathDto {
    pub index: usize,
    #[serde(default = "default_preference")]
    pub preference: u32,
    pub operations: Vec<OperationDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationDto {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub duration: Ticks,
    /// 可用资源名称
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub finished_end: Option<Ticks>,
    #[serde(default)]
    pub no_wait: bool,
}

fn default_true() -> bool {
    true
}

fn default_preference() -> u32 {
    1
}

// ==========================================
// ImportedScenario - 导入结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportedScenario {
    pub scenario: ScenarioDetail,
    /// 尚未排入的作业（文件中出现的顺序）
    pub unscheduled: Vec<JobId>,
}

// ==========================================
// ScenarioImporter - 场景导入器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScenarioImporter;

impl ScenarioImporter {
    pub fn new() -> Self {
        Self
    }

    /// 从 JSON 文件导入
    #[instrument(skip_all)]
    pub fn import_file(&self, path: impl AsRef<Path>) -> ImportResult<ImportedScenario> {
        let path = path.as_ref();
        debug!(file = %path.display(), "读取场景文件");
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        self.import_str(&raw)
    }

    /// 从 JSON 文本导入
    pub fn import_str(&self, raw: &str) -> ImportResult<ImportedScenario> {
        let dto: ScenarioDto = serde_json::from_str(raw)?;
        self.import_dto(dto)
    }

    pub fn import_dto(&self, dto: ScenarioDto) -> ImportResult<ImportedScenario> {
        let mut scenario = ScenarioDetail::new(dto.clock, dto.frozen_span);

        // 1. 资源
        let mut resources: HashMap<String, ResourceId> = HashMap::new();
        for resource in &dto.resources {
            if resources.contains_key(&resource.name) {
                return Err(ImportError::DuplicateName {
                    entity: "resource".to_string(),
                    name: resource.name.clone(),
                });
            }
            let capacity = if resource.capacity.is_empty() {
                ResourceCapacityIntervalList::always(true)
            } else {
                let spans = resource
                    .capacity
                    .iter()
                    .map(|s| CapacityInterval::new(s.start, s.end, s.active))
                    .collect();
                ResourceCapacityIntervalList::from_spans(spans).map_err(|source| ImportError::Timeline {
                    resource: resource.name.clone(),
                    source,
                })?
            };
            let id = scenario.add_resource(&resource.name, capacity);
            resources.insert(resource.name.clone(), id);
        }

        // 2. 作业
        let mut jobs: HashMap<String, JobId> = HashMap::new();
        let mut unscheduled = Vec::new();
        for job in dto.jobs {
            if jobs.contains_key(&job.name) {
                return Err(ImportError::DuplicateName {
                    entity: "job".to_string(),
                    name: job.name,
                });
            }
            let manufacturing_orders = convert_orders(&job, &resources)?;
            let is_unscheduled = job.scheduled.is_none() && !job.running;
            let name = job.name.clone();
            let id = scenario.add_job(|id| Job {
                id,
                name: job.name,
                need_date: job.need_date,
                release_date: job.release_date,
                priority: job.priority,
                group: job.group,
                running: job.running,
                manufacturing_orders,
                scheduled: job.scheduled,
            });
            if is_unscheduled {
                unscheduled.push(id);
            }
            jobs.insert(name, id);
        }

        // 3. 已提交的块
        for resource in &dto.resources {
            let Some(&resource_id) = resources.get(&resource.name) else {
                continue;
            };
            for block in &resource.blocks {
                let job = *jobs.get(&block.job).ok_or_else(|| ImportError::UnknownJob {
                    resource: resource.name.clone(),
                    job: block.job.clone(),
                })?;
                let placed = Block {
                    start: block.start,
                    end: block.end,
                    requirement_index: PRIMARY_REQUIREMENT_INDEX,
                    activity: ActivityId {
                        job,
                        mo_index: block.mo_index,
                        operation: OperationId(block.operation),
                    },
                };
                if let Some(target) = scenario.resource_mut(resource_id) {
                    target
                        .blocks
                        .insert_sorted(placed)
                        .map_err(|source| ImportError::Timeline {
                            resource: resource.name.clone(),
                            source,
                        })?;
                }
            }
            debug!(resource = %resource.name, blocks = resource.blocks.len(), "资源导入完成");
        }

        info!(
            resources = resources.len(),
            jobs = jobs.len(),
            unscheduled = unscheduled.len(),
            "场景导入完成"
        );
        Ok(ImportedScenario { scenario, unscheduled })
    }
}

fn convert_orders(job: &JobDto, resources: &HashMap<String, ResourceId>) -> ImportResult<Vec<ManufacturingOrder>> {
    job.manufacturing_orders
        .iter()
        .map(|mo| {
            if mo.current_path >= mo.paths.len() {
                return Err(ImportError::InvalidRouting {
                    job: job.name.clone(),
                    message: format!("{} 的当前路线 {} 超出路线数 {}", mo.name, mo.current_path, mo.paths.len()),
                });
            }
            let paths = mo
                .paths
                .iter()
                .map(|path| {
                    let operations = path
                        .operations
                        .iter()
                        .map(|op| convert_operation(job, op, resources))
                        .collect::<ImportResult<Vec<_>>>()?;
                    Ok(AlternatePath {
                        index: path.index,
                        preference: path.preference,
                        operations,
                    })
                })
                .collect::<ImportResult<Vec<_>>>()?;
            Ok(ManufacturingOrder {
                name: mo.name.clone(),
                paths,
                current_path: mo.current_path,
            })
        })
        .collect()
}

fn convert_operation(job: &JobDto, op: &OperationDto, resources: &HashMap<String, ResourceId>) -> ImportResult<Operation> {
    if op.duration < 0 {
        return Err(ImportError::InvalidRouting {
            job: job.name.clone(),
            message: format!("工序 {} 时长为负: {}", op.id, op.duration),
        });
    }
    let eligible_resources = op
        .resources
        .iter()
        .map(|name| {
            resources.get(name).copied().ok_or_else(|| ImportError::UnknownResource {
                job: job.name.clone(),
                resource: name.clone(),
            })
        })
        .collect::<ImportResult<Vec<_>>>()?;

    Ok(Operation {
        id: OperationId(op.id),
        name: op.name.clone().unwrap_or_else(|| OperationId(op.id).to_string()),
        duration: op.duration,
        primary: ResourceRequirement { eligible_resources },
        finished: op.finished,
        finished_end: op.finished_end,
        no_wait: op.no_wait,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "clock": 0,
        "frozen_span": 5,
        "resources": [
            {
                "name": "R1",
                "capacity": [{"start": 0, "end": 1000}],
                "blocks": [{"start": 10, "end": 20, "job": "OLD", "operation": 10}]
            },
            {"name": "R2"}
        ],
        "jobs": [
            {
                "name": "OLD",
                "need_date": 100,
                "scheduled": {"start": 10, "end": 20, "late": false},
                "manufacturing_orders": [{"name": "MO-OLD", "paths": [{"index": 0, "operations": [
                    {"id": 10, "duration": 10, "resources": ["R1"]}
                ]}]}]
            },
            {
                "name": "NEW",
                "need_date": 40,
                "group": "G1",
                "manufacturing_orders": [{"name": "MO-NEW", "paths": [{"index": 0, "operations": [
                    {"id": 10, "name": "CUT", "duration": 5, "resources": ["R1", "R2"]}
                ]}]}]
            }
        ]
    }"#;

    #[test]
    fn test_import_sample() {
        let imported = ScenarioImporter::new().import_str(SAMPLE).unwrap();
        let scenario = &imported.scenario;

        assert_eq!(scenario.frozen_span_end(), 5);
        let r1 = scenario.resource_by_name("R1").unwrap();
        assert_eq!(scenario.resource(r1).unwrap().blocks.len(), 1);
        assert_eq!(scenario.resource(r1).unwrap().capacity.online_capacity_between(100, 900), 800);

        let new_job = scenario.job_by_name("NEW").unwrap();
        assert_eq!(imported.unscheduled, vec![new_job]);
        let op = &scenario.job(new_job).unwrap().manufacturing_orders[0].paths[0].operations[0];
        assert_eq!(op.name, "CUT");
        assert_eq!(op.primary.eligible_resources.len(), 2);
    }

    #[test]
    fn test_unknown_resource_reported() {
        let raw = r#"{"jobs": [{"name": "J", "need_date": 1, "manufacturing_orders": [
            {"name": "MO", "paths": [{"index": 0, "operations": [{"id": 1, "duration": 1, "resources": ["NOPE"]}]}]}
        ]}]}"#;
        let err = ScenarioImporter::new().import_str(raw).unwrap_err();
        assert!(matches!(err, ImportError::UnknownResource { ref resource, .. } if resource == "NOPE"));
    }

    #[test]
    fn test_overlapping_blocks_rejected() {
        let raw = r#"{
            "resources": [{"name": "R1", "blocks": [
                {"start": 0, "end": 10, "job": "A", "operation": 1},
                {"start": 5, "end": 15, "job": "A", "operation": 2}
            ]}],
            "jobs": [{"name": "A", "need_date": 100, "running": true, "manufacturing_orders": []}]
        }"#;
        let err = ScenarioImporter::new().import_str(raw).unwrap_err();
        assert!(matches!(err, ImportError::Timeline { .. }));
    }

    #[test]
    fn test_import_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let imported = ScenarioImporter::new().import_file(file.path()).unwrap();
        assert_eq!(imported.scenario.jobs().count(), 2);

        let err = ScenarioImporter::new().import_file("/nonexistent/scenario.json").unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = ScenarioImporter::new().import_str("{not json").unwrap_err();
        assert!(matches!(err, ImportError::JsonParseError(_)));
    }
}

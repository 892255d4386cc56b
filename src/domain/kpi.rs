// ==========================================
// 插单排产系统 - KPI 计算接口
// ==========================================
// 职责: KPI 计算器契约与按名称注册的计算器表
// 说明: 具体业务 KPI 由外部注册,这里只内置两个基础指标
// ==========================================

use crate::domain::scenario::ScenarioDetail;
use std::collections::HashMap;
use std::sync::Arc;

// ==========================================
// KpiCalculator Trait
// ==========================================
pub trait KpiCalculator: Send + Sync {
    /// KPI 名称（注册键）
    fn name(&self) -> &str;

    /// 数值越小越好
    fn lower_is_better(&self) -> bool;

    /// 基于场景计算分数
    fn calculate(&self, scenario: &ScenarioDetail) -> f64;
}

/// 延期总时长（已插入作业完工晚于需求日期的 tick 之和）
#[derive(Debug, Clone, Default)]
pub struct TotalLatenessKpi;

impl KpiCalculator for TotalLatenessKpi {
    fn name(&self) -> &str {
        "TotalLateness"
    }

    fn lower_is_better(&self) -> bool {
        true
    }

    fn calculate(&self, scenario: &ScenarioDetail) -> f64 {
        scenario
            .jobs()
            .filter_map(|job| job.scheduled.map(|w| (w.end - job.need_date).max(0)))
            .map(|late| late as f64)
            .sum()
    }
}

/// 准时作业数
#[derive(Debug, Clone, Default)]
pub struct OnTimeJobCountKpi;

impl KpiCalculator for OnTimeJobCountKpi {
    fn name(&self) -> &str {
        "OnTimeJobCount"
    }

    fn lower_is_better(&self) -> bool {
        false
    }

    fn calculate(&self, scenario: &ScenarioDetail) -> f64 {
        scenario.jobs().filter(|job| job.is_scheduled_on_time()).count() as f64
    }
}

// ==========================================
// KpiRegistry - KPI 注册表
// ==========================================
#[derive(Clone, Default)]
pub struct KpiRegistry {
    calculators: HashMap<String, Arc<dyn KpiCalculator>>,
}

impl KpiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带内置 KPI 的注册表
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TotalLatenessKpi));
        registry.register(Arc::new(OnTimeJobCountKpi));
        registry
    }

    pub fn register(&mut self, calculator: Arc<dyn KpiCalculator>) {
        self.calculators.insert(calculator.name().to_string(), calculator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn KpiCalculator>> {
        self.calculators.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.calculators.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for KpiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpiRegistry").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = KpiRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["OnTimeJobCount", "TotalLateness"]);
        assert!(registry.get("TotalLateness").unwrap().lower_is_better());
        assert!(!registry.get("OnTimeJobCount").unwrap().lower_is_better());
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_empty_scenario_scores() {
        let scenario = ScenarioDetail::new(0, 0);
        assert_eq!(TotalLatenessKpi.calculate(&scenario), 0.0);
        assert_eq!(OnTimeJobCountKpi.calculate(&scenario), 0.0);
    }
}

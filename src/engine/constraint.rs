// ==========================================
// 插单排产系统 - 约束时间计算引擎
// ==========================================
// 职责: 计算作业集的最早合法排产时间
// 输入: 场景 + 作业集 + 插单参数
// 输出: 最早时间 / 不可排（附原因）
// 红线: 仅准时阶段使用的模块在进入延期阶段前移除
// ==========================================

use crate::config::SimulationSettings;
use crate::domain::job::Job;
use crate::domain::scenario::ScenarioDetail;
use crate::domain::types::{SimulationPhase, Ticks};
use tracing::{debug, instrument};

// ==========================================
// EarliestTime - 计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EarliestTime {
    At(Ticks),
    Unschedulable { module: &'static str, reason: String },
}

impl EarliestTime {
    pub fn time(&self) -> Option<Ticks> {
        match self {
            EarliestTime::At(t) => Some(*t),
            EarliestTime::Unschedulable { .. } => None,
        }
    }

    pub fn is_unschedulable(&self) -> bool {
        matches!(self, EarliestTime::Unschedulable { .. })
    }
}

// ==========================================
// ConstraintModule Trait
// ==========================================
pub trait ConstraintModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// 仅在准时阶段生效
    fn phase_one_only(&self) -> bool {
        false
    }

    /// 在 current 基础上收紧下限
    ///
    /// # 返回
    /// - Ok(floor): 该模块要求的最早时间（调用方取最大值）
    /// - Err(reason): 不存在合法时间
    fn narrow(
        &self,
        current: Ticks,
        jobs: &[&Job],
        scenario: &ScenarioDetail,
        settings: &SimulationSettings,
    ) -> Result<Ticks, String>;
}

/// 冻结区下限: clock + frozen_span
#[derive(Debug, Clone, Default)]
pub struct FrozenSpanModule;

impl ConstraintModule for FrozenSpanModule {
    fn name(&self) -> &'static str {
        "FrozenSpan"
    }

    fn narrow(&self, current: Ticks, _: &[&Job], scenario: &ScenarioDetail, _: &SimulationSettings) -> Result<Ticks, String> {
        Ok(current.max(scenario.frozen_span_end()))
    }
}

/// 下达日期下限
#[derive(Debug, Clone, Default)]
pub struct ReleaseDateModule;

impl ConstraintModule for ReleaseDateModule {
    fn name(&self) -> &'static str {
        "ReleaseDate"
    }

    fn narrow(&self, current: Ticks, jobs: &[&Job], _: &ScenarioDetail, settings: &SimulationSettings) -> Result<Ticks, String> {
        if !settings.use_release_dates {
            return Ok(current);
        }
        Ok(jobs
            .iter()
            .filter_map(|job| job.release_date)
            .fold(current, Ticks::max))
    }
}

/// 路线下限: 已完工工序之后才能继续;启用替代路线时必须存在可选路线
#[derive(Debug, Clone, Default)]
pub struct AlternatePathModule;

impl ConstraintModule for AlternatePathModule {
    fn name(&self) -> &'static str {
        "AlternatePath"
    }

    fn narrow(&self, current: Ticks, jobs: &[&Job], _: &ScenarioDetail, settings: &SimulationSettings) -> Result<Ticks, String> {
        let mut floor = current;
        for job in jobs {
            for mo in job.manufacturing_orders.iter().filter(|mo| !mo.is_finished()) {
                let Some(path) = mo.current_path() else {
                    return Err(format!("{} 的制造订单 {} 没有当前路线", job.name, mo.name));
                };
                if settings.use_alternate_paths && mo.selectable_paths().next().is_none() {
                    return Err(format!("{} 的制造订单 {} 没有可选替代路线", job.name, mo.name));
                }
                if let Some(end) = path.latest_finished_end() {
                    floor = floor.max(end);
                }
            }
        }
        Ok(floor)
    }
}

/// 需求日期上限（仅准时阶段）: 下限已晚于需求日期则不可能准时
#[derive(Debug, Clone, Default)]
pub struct NeedDateCeilingModule;

impl ConstraintModule for NeedDateCeilingModule {
    fn name(&self) -> &'static str {
        "NeedDateCeiling"
    }

    fn phase_one_only(&self) -> bool {
        true
    }

    fn narrow(&self, current: Ticks, jobs: &[&Job], _: &ScenarioDetail, _: &SimulationSettings) -> Result<Ticks, String> {
        let Some(need_date) = jobs.iter().map(|j| j.need_date).min() else {
            return Ok(current);
        };
        if current > need_date {
            return Err(format!("最早时间 {} 已晚于需求日期 {}", current, need_date));
        }
        Ok(current)
    }
}

// ==========================================
// ConstraintTimeCalculator - 约束时间计算器
// ==========================================
pub struct ConstraintTimeCalculator {
    modules: Vec<Box<dyn ConstraintModule>>,
    phase: SimulationPhase,
}

impl ConstraintTimeCalculator {
    /// 空管线（仅用于自定义组装）
    pub fn empty(phase: SimulationPhase) -> Self {
        Self {
            modules: Vec::new(),
            phase,
        }
    }

    /// 按阶段组装内置模块
    ///
    /// 顺序: 冻结区 → 下达日期 → 路线 → 需求日期上限（最后检查）
    pub fn for_phase(phase: SimulationPhase) -> Self {
        let mut calculator = Self::empty(SimulationPhase::OnOrBeforeNeedDate);
        calculator.add_module(Box::new(FrozenSpanModule));
        calculator.add_module(Box::new(ReleaseDateModule));
        calculator.add_module(Box::new(AlternatePathModule));
        calculator.add_module(Box::new(NeedDateCeilingModule));
        calculator.enter_phase(phase);
        calculator
    }

    pub fn add_module(&mut self, module: Box<dyn ConstraintModule>) {
        if module.phase_one_only() && !self.phase.is_on_time_phase() {
            debug!(module = module.name(), "延期阶段忽略准时阶段模块");
            return;
        }
        self.modules.push(module);
    }

    /// 切换阶段: 进入延期阶段时移除仅准时阶段的模块
    pub fn enter_phase(&mut self, phase: SimulationPhase) {
        self.phase = phase;
        if !phase.is_on_time_phase() {
            self.modules.retain(|m| !m.phase_one_only());
        }
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// 运行全部模块,返回各下限的最大值
    #[instrument(skip(self, scenario, jobs, settings), fields(phase = %self.phase, jobs = jobs.len()))]
    pub fn calculate_min_schedule_date(
        &self,
        scenario: &ScenarioDetail,
        jobs: &[&Job],
        settings: &SimulationSettings,
    ) -> EarliestTime {
        let mut earliest = Ticks::MIN;
        for module in &self.modules {
            match module.narrow(earliest, jobs, scenario, settings) {
                Ok(floor) => earliest = earliest.max(floor),
                Err(reason) => {
                    debug!(module = module.name(), reason = %reason, "作业集不可排");
                    return EarliestTime::Unschedulable {
                        module: module.name(),
                        reason,
                    };
                }
            }
        }
        if earliest == Ticks::MIN {
            earliest = scenario.clock;
        }
        EarliestTime::At(earliest)
    }
}

impl std::fmt::Debug for ConstraintTimeCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintTimeCalculator")
            .field("phase", &self.phase)
            .field("modules", &self.module_names())
            .finish()
    }
}

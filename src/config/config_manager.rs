// ==========================================
// 插单排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: 键值表（JSON 文件 / 内存映射）+ 环境变量覆写
// ==========================================

use crate::config::simulation_config_trait::{ConfigResult, SimulationConfigReader};
use crate::config::simulation_settings::{SimulationSettings, DEFAULT_PARTITION_THRESHOLD};
use crate::domain::types::{GroupMode, Ticks, TICKS_PER_HOUR};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// 环境变量覆写前缀: INSERT_JOBS_MAX_CONCURRENCY=8
pub const ENV_PREFIX: &str = "INSERT_JOBS_";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl ConfigManager {
    /// 创建空的 ConfigManager（全部取默认值）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从键值映射创建
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }

    /// 从 JSON 对象文件加载
    ///
    /// 非字符串值按其 JSON 文本保存（数字、布尔）
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let parsed: BTreeMap<String, JsonValue> = serde_json::from_str(&raw)?;

        let values = parsed
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();

        tracing::info!(path = %path.as_ref().display(), "配置文件加载完成");
        Ok(Self::from_map(values))
    }

    /// 用 INSERT_JOBS_ 前缀的环境变量覆写已知配置键
    pub fn with_env_overrides(self) -> Result<Self, Box<dyn Error + Send + Sync>> {
        for key in config_keys::ALL {
            let env_key = format!("{}{}", ENV_PREFIX, key.to_uppercase());
            if let Ok(value) = std::env::var(&env_key) {
                tracing::debug!(config_key = key, env_key = %env_key, "环境变量覆写配置");
                self.set_config_value(key, &value)?;
            }
        }
        Ok(self)
    }

    /// 读取配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let values = self.values.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        Ok(values.get(key).cloned())
    }

    /// 读取配置值（公开方法,供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入配置值
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let mut values = self.values.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// 读取配置值,带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 解析数值配置,格式错误时告警并使用默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        let Some(value) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %value,
                    default = %default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    fn get_bool_or_default(&self, key: &str, default: bool) -> ConfigResult<bool> {
        let Some(value) = self.get_config_value(key)? else {
            return Ok(default);
        };
        Ok(matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ))
    }

    /// 未配置时返回 None
    fn get_optional_bool(&self, key: &str) -> ConfigResult<Option<bool>> {
        match self.get_config_value(key)? {
            Some(_) => Ok(Some(self.get_bool_or_default(key, true)?)),
            None => Ok(None),
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 在运行完成事件中记录生效配置,保证结果可复现
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let values = self.values.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let ordered: BTreeMap<&String, &String> = values.iter().collect();
        Ok(serde_json::to_string(&ordered)?)
    }

    /// 同步读取完整插单参数（不经过 async 接口）
    pub fn get_simulation_settings(&self) -> ConfigResult<SimulationSettings> {
        let defaults = SimulationSettings::default();
        let group_mode = self
            .get_config_or_default(config_keys::GROUP_MODE, "independent")?
            .parse::<GroupMode>()
            .unwrap_or_default();

        Ok(SimulationSettings {
            max_concurrency: self.get_parsed_or_default(config_keys::MAX_CONCURRENCY, defaults.max_concurrency)?,
            partition_threshold: self
                .get_parsed_or_default(config_keys::PARTITION_THRESHOLD, DEFAULT_PARTITION_THRESHOLD)?,
            kpi_name: self.get_config_value(config_keys::KPI_NAME)?.filter(|v| !v.trim().is_empty()),
            kpi_lower_is_better: self.get_optional_bool(config_keys::KPI_LOWER_IS_BETTER)?,
            kpi_threshold: self
                .get_config_value(config_keys::KPI_THRESHOLD)?
                .and_then(|v| v.trim().parse::<f64>().ok()),
            use_release_dates: self.get_bool_or_default(config_keys::USE_RELEASE_DATES, defaults.use_release_dates)?,
            use_alternate_paths: self
                .get_bool_or_default(config_keys::USE_ALTERNATE_PATHS, defaults.use_alternate_paths)?,
            min_retry_spacing: self.get_parsed_or_default(config_keys::MIN_RETRY_SPACING, defaults.min_retry_spacing)?,
            late_path_block_offset: self
                .get_parsed_or_default::<Ticks>(config_keys::LATE_PATH_BLOCK_OFFSET, TICKS_PER_HOUR)?,
            gap_fill_step: self.get_parsed_or_default(config_keys::GAP_FILL_STEP, defaults.gap_fill_step)?,
            max_gap_candidates: self
                .get_parsed_or_default(config_keys::MAX_GAP_CANDIDATES, defaults.max_gap_candidates)?,
            group_mode,
            commit_to_live: self.get_bool_or_default(config_keys::COMMIT_TO_LIVE, defaults.commit_to_live)?,
            instigator: self.get_config_or_default(config_keys::INSTIGATOR, &defaults.instigator)?,
            ..defaults
        })
    }
}

// ==========================================
// SimulationConfigReader Trait 实现
// ==========================================
#[async_trait]
impl SimulationConfigReader for ConfigManager {
    async fn get_max_concurrency(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::MAX_CONCURRENCY, SimulationSettings::default().max_concurrency)
    }

    async fn get_partition_threshold(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::PARTITION_THRESHOLD, DEFAULT_PARTITION_THRESHOLD)
    }

    async fn get_kpi_name(&self) -> ConfigResult<Option<String>> {
        Ok(self.get_config_value(config_keys::KPI_NAME)?.filter(|v| !v.trim().is_empty()))
    }

    async fn get_kpi_threshold(&self) -> ConfigResult<Option<f64>> {
        Ok(self
            .get_config_value(config_keys::KPI_THRESHOLD)?
            .and_then(|v| v.trim().parse::<f64>().ok()))
    }

    async fn get_kpi_lower_is_better(&self) -> ConfigResult<Option<bool>> {
        self.get_optional_bool(config_keys::KPI_LOWER_IS_BETTER)
    }

    async fn get_use_release_dates(&self) -> ConfigResult<bool> {
        self.get_bool_or_default(config_keys::USE_RELEASE_DATES, true)
    }

    async fn get_use_alternate_paths(&self) -> ConfigResult<bool> {
        self.get_bool_or_default(config_keys::USE_ALTERNATE_PATHS, false)
    }

    async fn get_min_retry_spacing(&self) -> ConfigResult<Ticks> {
        self.get_parsed_or_default(config_keys::MIN_RETRY_SPACING, 0)
    }

    async fn get_late_path_block_offset(&self) -> ConfigResult<Ticks> {
        self.get_parsed_or_default(config_keys::LATE_PATH_BLOCK_OFFSET, TICKS_PER_HOUR)
    }

    async fn get_gap_fill_step(&self) -> ConfigResult<Ticks> {
        self.get_parsed_or_default(config_keys::GAP_FILL_STEP, SimulationSettings::default().gap_fill_step)
    }

    async fn get_max_gap_candidates(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(
            config_keys::MAX_GAP_CANDIDATES,
            SimulationSettings::default().max_gap_candidates,
        )
    }

    async fn get_group_mode(&self) -> ConfigResult<GroupMode> {
        let value = self.get_config_or_default(config_keys::GROUP_MODE, "independent")?;
        Ok(value.parse::<GroupMode>().unwrap_or_default())
    }

    async fn get_commit_to_live(&self) -> ConfigResult<bool> {
        self.get_bool_or_default(config_keys::COMMIT_TO_LIVE, SimulationSettings::default().commit_to_live)
    }

    async fn get_instigator(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::INSTIGATOR, &SimulationSettings::default().instigator)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 并发
    pub const MAX_CONCURRENCY: &str = "max_concurrency";
    pub const PARTITION_THRESHOLD: &str = "partition_threshold";

    // KPI
    pub const KPI_NAME: &str = "kpi_name";
    pub const KPI_LOWER_IS_BETTER: &str = "kpi_lower_is_better";
    pub const KPI_THRESHOLD: &str = "kpi_threshold";

    // 约束
    pub const USE_RELEASE_DATES: &str = "use_release_dates";
    pub const USE_ALTERNATE_PATHS: &str = "use_alternate_paths";

    // 候选时间
    pub const MIN_RETRY_SPACING: &str = "min_retry_spacing";
    pub const LATE_PATH_BLOCK_OFFSET: &str = "late_path_block_offset";
    pub const GAP_FILL_STEP: &str = "gap_fill_step";
    pub const MAX_GAP_CANDIDATES: &str = "max_gap_candidates";

    // 运行
    pub const GROUP_MODE: &str = "group_mode";
    pub const COMMIT_TO_LIVE: &str = "commit_to_live";
    pub const INSTIGATOR: &str = "instigator";

    pub const ALL: &[&str] = &[
        MAX_CONCURRENCY,
        PARTITION_THRESHOLD,
        KPI_NAME,
        KPI_LOWER_IS_BETTER,
        KPI_THRESHOLD,
        USE_RELEASE_DATES,
        USE_ALTERNATE_PATHS,
        MIN_RETRY_SPACING,
        LATE_PATH_BLOCK_OFFSET,
        GAP_FILL_STEP,
        MAX_GAP_CANDIDATES,
        GROUP_MODE,
        COMMIT_TO_LIVE,
        INSTIGATOR,
    ];
}

// ==========================================
// 插单排产系统 - 命令行入口
// ==========================================
// 用法: insert-jobs-aps <scenario.json> [config.json]
// 流程: 导入场景 → 读取配置 → 插单模拟 → 输出 JSON 结果
// ==========================================

use anyhow::{anyhow, Context};
use insert_jobs_aps::config::SimulationConfigReader;
use insert_jobs_aps::{logging, ConfigManager, InsertJobsSimulationManager, ScenarioHandle, ScenarioImporter};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let Some(scenario_path) = args.next() else {
        eprintln!("用法: insert-jobs-aps <scenario.json> [config.json]");
        std::process::exit(2);
    };
    let config_path = args.next();

    tracing::info!("==================================================");
    tracing::info!("{} - 系统版本: {}", insert_jobs_aps::APP_NAME, insert_jobs_aps::VERSION);
    tracing::info!("==================================================");

    // 1. 导入场景
    let imported = ScenarioImporter::new()
        .import_file(&scenario_path)
        .with_context(|| format!("无法导入场景文件: {}", scenario_path))?;
    tracing::info!(path = %scenario_path, unscheduled = imported.unscheduled.len(), "场景已加载");

    // 2. 配置
    let config = match &config_path {
        Some(path) => ConfigManager::from_json_file(path).map_err(|e| anyhow!("无法读取配置文件 {}: {}", path, e))?,
        None => ConfigManager::new(),
    }
    .with_env_overrides()
    .map_err(|e| anyhow!("环境变量配置无效: {}", e))?;
    let settings = config
        .load_simulation_settings()
        .await
        .map_err(|e| anyhow!("无法生成模拟参数: {}", e))?;

    // 3. 插单模拟
    let handle = ScenarioHandle::new(imported.scenario);
    let manager = InsertJobsSimulationManager::new(handle);
    let summary = manager.run(&imported.unscheduled, settings).await?;

    // 4. 输出
    let scenario = &summary.scenario;
    let resources: Vec<_> = scenario
        .resources()
        .map(|resource| {
            let blocks: Vec<_> = resource
                .blocks
                .iter()
                .map(|(_, block)| {
                    json!({
                        "job": scenario.job_name(block.activity.job),
                        "operation": block.activity.operation.0,
                        "start": block.start,
                        "end": block.end,
                    })
                })
                .collect();
            json!({ "name": resource.name, "blocks": blocks })
        })
        .collect();

    let report = json!({
        "run_id": summary.run_id,
        "status": summary.status,
        "summary": summary.summary_name,
        "instigator": summary.instigator,
        "diagnostics": summary.diagnostics,
        "resources": resources,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

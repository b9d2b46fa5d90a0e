//! 收益管理引擎命令行
//!
//! 加载配置、初始化可观测性，读取 JSON 请求并以 `{success, data|error}` 信封输出结果。
//! 结果写入 stdout，日志写入 stderr。

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{
    Cli, Commands, EvaluateRulesRequest, ExecuteFormulaRequest, ValidateFormulaRequest,
    ValidateRulesRequest,
};
use rms_engine::{FormulaEngine, RulesEngine};
use rms_shared::config::AppConfig;
use rms_shared::observability::{self, ObservabilityGuard};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

const SERVICE_NAME: &str = "rms-engine";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.global.config_dir {
        Some(dir) => AppConfig::load_from_dir(SERVICE_NAME, dir),
        None => AppConfig::load(SERVICE_NAME),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let service_name = if config.service_name.is_empty() {
        SERVICE_NAME
    } else {
        config.service_name.as_str()
    };
    let obs_config = config.observability.clone().with_service_name(service_name);
    let guard = observability::init(&obs_config).unwrap_or_else(|e| {
        eprintln!("Failed to initialize observability: {:#}", e);
        ObservabilityGuard::empty()
    });

    info!(environment = %config.environment, "rms-engine 启动");

    let (envelope, code) = match run(&cli.command, &config) {
        Ok(data) => (json!({"success": true, "data": data}), ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %format!("{:#}", e), "请求处理失败");
            (
                json!({"success": false, "error": format!("{:#}", e)}),
                ExitCode::FAILURE,
            )
        }
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Failed to serialize response: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if cli.global.print_metrics {
        if let Some(snapshot) = guard.render_metrics() {
            eprintln!("{}", snapshot);
        }
    }

    code
}

/// 执行子命令，返回响应数据
fn run(command: &Commands, config: &AppConfig) -> Result<serde_json::Value> {
    let formula = FormulaEngine::with_config(config.engine.clone());
    let path = command.request_path();

    let data = match command {
        Commands::ValidateFormula(_) => {
            let request: ValidateFormulaRequest = read_request(path)?;
            serde_json::to_value(formula.validate(&request.expression))?
        }
        Commands::ExecuteFormula(_) => {
            let request: ExecuteFormulaRequest = read_request(path)?;
            serde_json::to_value(formula.execute(&request.expression, &request.context))?
        }
        Commands::ValidateRules(_) => {
            let request: ValidateRulesRequest = read_request(path)?;
            let engine = RulesEngine::new(formula);
            serde_json::to_value(engine.validate_rule_set(&request.rules))?
        }
        Commands::EvaluateRules(_) => {
            let request: EvaluateRulesRequest = read_request(path)?;
            let engine = RulesEngine::new(formula);
            serde_json::to_value(engine.evaluate_rules(
                &request.rules,
                &request.context,
                &request.options,
            ))?
        }
    };

    Ok(data)
}

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid request JSON in {}", path.display()))
}

//! `rms-engine` 命令行定义
//!
//! 每个子命令读取一个 JSON 请求文件，请求体与 HTTP 层的请求一致。

use clap::{Args, Parser, Subcommand};
use rms_engine::formula::FormulaContext;
use rms_engine::rules::{EvaluationOptions, Rule, RuleContext};
use serde::Deserialize;
use std::path::PathBuf;

/// rms-engine -- revenue-management formula and rules engine.
#[derive(Parser, Debug)]
#[command(
    name = "rms-engine",
    about = "Validate and execute pricing formulas and rule sets",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration directory (default: $CONFIG_DIR or ./config).
    #[arg(long, global = true, env = "CONFIG_DIR")]
    pub config_dir: Option<String>,

    /// Print a Prometheus metrics snapshot to stderr before exiting.
    #[arg(long, global = true)]
    pub print_metrics: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the syntax of a formula: {"expression"}.
    ValidateFormula(RequestArgs),

    /// Execute a formula: {"expression", "variables", "parameters"}.
    ExecuteFormula(RequestArgs),

    /// Validate a rule set: {"rules"}.
    ValidateRules(RequestArgs),

    /// Evaluate a rule set: {"rules", "context", "options"}.
    EvaluateRules(RequestArgs),
}

impl Commands {
    pub fn request_path(&self) -> &PathBuf {
        match self {
            Self::ValidateFormula(args)
            | Self::ExecuteFormula(args)
            | Self::ValidateRules(args)
            | Self::EvaluateRules(args) => &args.request,
        }
    }
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Path to the JSON request file.
    pub request: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ValidateFormulaRequest {
    pub expression: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteFormulaRequest {
    pub expression: String,
    #[serde(flatten)]
    pub context: FormulaContext,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRulesRequest {
    pub rules: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRulesRequest {
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub context: RuleContext,
    #[serde(default)]
    pub options: EvaluationOptions,
}

//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集。
//! 引擎以库或命令行形式运行，不常驻端口，指标通过 [`MetricsHandle::render`] 以文本快照导出。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// 渲染 Prometheus 文本格式的指标快照
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// 安装全局 Prometheus recorder
///
/// 同一进程内只能安装一次，重复调用会返回错误。
pub fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_common_metrics(&config.service_name);

    Ok(MetricsHandle { handle })
}

/// 注册通用指标（预定义的业务指标）
fn register_common_metrics(service_name: &str) {
    // 这些描述会出现在指标快照的 HELP 注释中
    metrics::describe_counter!(
        "rms_formula_executions_total",
        "Total number of formula executions"
    );
    metrics::describe_histogram!(
        "rms_formula_execution_duration_seconds",
        "Formula execution duration in seconds"
    );

    metrics::describe_counter!(
        "rms_rule_evaluations_total",
        "Total number of rule evaluations"
    );
    metrics::describe_histogram!(
        "rms_rule_evaluation_duration_seconds",
        "Rule evaluation duration in seconds"
    );

    metrics::describe_counter!("rms_rule_actions_total", "Total number of executed rule actions");

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录公式执行
///
/// `outcome` 取值为 "success" 或错误类别（如 "ArithmeticError"）。
#[inline]
pub fn record_formula_execution(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "rms_formula_executions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!("rms_formula_execution_duration_seconds").record(duration_secs);
}

/// 记录规则评估
///
/// `status` 取值为 "matched"、"unmatched" 或 "error"。
#[inline]
pub fn record_rule_evaluation(rule_type: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "rms_rule_evaluations_total",
        "rule_type" => rule_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "rms_rule_evaluation_duration_seconds",
        "rule_type" => rule_type.to_string()
    )
    .record(duration_secs);
}

/// 记录规则动作执行
#[inline]
pub fn record_rule_action(action_type: &str, success: bool) {
    metrics::counter!(
        "rms_rule_actions_total",
        "action_type" => action_type.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

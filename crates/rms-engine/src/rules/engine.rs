//! 规则引擎
//!
//! 按调用方给定的顺序逐条评估规则，匹配后在共享的工作数据上执行动作。
//! 单条规则的错误只记录在该规则的结果中，不影响其余规则。

use super::actions::{ActionExecutor, ActionHandler};
use super::compiler::RuleCompiler;
use super::executor::RuleExecutor;
use super::models::{
    EvaluationOptions, Rule, RuleContext, RuleEvaluationResult, RuleSetEvaluationResult,
    RuleSetValidation, RuleStatus, RuleValidationError, ValidationWarning, WarningKind,
};
use super::priority::RulePriority;
use crate::error::Diagnostic;
use crate::formula::FormulaEngine;
use crate::value::Value;
use rms_shared::observability::metrics::record_rule_evaluation;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 规则引擎
#[derive(Clone)]
pub struct RulesEngine {
    formula: FormulaEngine,
    actions: ActionExecutor,
}

impl RulesEngine {
    pub fn new(formula: FormulaEngine) -> Self {
        Self {
            actions: ActionExecutor::new(formula.clone()),
            formula,
        }
    }

    /// 注册自定义动作处理器
    pub fn with_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.register_handler(handler);
        self
    }

    pub fn register_handler(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        if self.actions.handlers().contains(handler.name()) {
            warn!(handler = handler.name(), "替换已注册的同名动作处理器");
        }
        self.actions.handlers_mut().register(handler);
        self
    }

    pub fn formula(&self) -> &FormulaEngine {
        &self.formula
    }

    /// 评估规则集
    ///
    /// 规则按给定顺序评估，不排序也不过滤未启用的规则。
    #[instrument(skip_all, fields(rules = rules.len()))]
    pub fn evaluate_rules(
        &self,
        rules: &[Rule],
        context: &RuleContext,
        options: &EvaluationOptions,
    ) -> RuleSetEvaluationResult {
        let mut data = context.data.clone();
        let mut results = Vec::with_capacity(rules.len());
        let mut aggregated_actions: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        for rule in rules {
            let result = self.evaluate_with(rule, &mut data, context, options);

            for action in &result.actions_executed {
                if let (true, Some(value)) = (action.success, &action.result) {
                    aggregated_actions
                        .entry(action.action_type.clone())
                        .or_default()
                        .push(value.clone());
                }
            }

            let stop = options.stop_on_first_match && result.matched;
            results.push(result);

            if stop {
                debug!(rule_id = %rule.id, "规则匹配，停止后续评估");
                break;
            }
        }

        let matched_rules = results.iter().filter(|r| r.matched).count();
        let total_execution_time = results.iter().map(|r| r.execution_time).sum();

        info!(
            "规则集评估完成: {} 条评估, {} 条匹配",
            results.len(),
            matched_rules
        );

        RuleSetEvaluationResult {
            evaluated_rules: results.len(),
            matched_rules,
            total_execution_time,
            results,
            aggregated_actions,
            data,
        }
    }

    /// 评估单条规则（动作作用于上下文数据的副本）
    pub fn evaluate_rule(
        &self,
        rule: &Rule,
        context: &RuleContext,
        options: &EvaluationOptions,
    ) -> RuleEvaluationResult {
        let mut data = context.data.clone();
        self.evaluate_with(rule, &mut data, context, options)
    }

    #[instrument(skip_all, fields(rule_id = %rule.id, rule_name = %rule.name))]
    fn evaluate_with(
        &self,
        rule: &Rule,
        data: &mut Value,
        context: &RuleContext,
        options: &EvaluationOptions,
    ) -> RuleEvaluationResult {
        let start = Instant::now();

        let mut executor = RuleExecutor::new(&self.formula);
        if options.trace {
            executor = executor.with_trace();
        }

        let mut errors: Vec<Diagnostic> = Vec::new();
        let mut actions_executed = Vec::new();

        let status = match executor.execute(&rule.conditions, data) {
            Ok(true) => {
                if options.execute_actions {
                    for action in &rule.actions {
                        let result = self.actions.execute(action, data, context);
                        if let Some(error) = &result.error {
                            errors.push(error.clone());
                        }
                        actions_executed.push(result);
                    }
                }
                RuleStatus::Matched
            }
            Ok(false) => RuleStatus::Unmatched,
            Err(e) => {
                warn!(error = %e, "规则评估失败");
                errors.push(e.into());
                RuleStatus::Error
            }
        };

        let elapsed = start.elapsed();
        record_rule_evaluation(rule.rule_type.as_str(), status.as_str(), elapsed.as_secs_f64());

        RuleEvaluationResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            matched: status == RuleStatus::Matched,
            status,
            actions_executed,
            execution_time: elapsed.as_secs_f64() * 1000.0,
            errors,
            trace: options.trace.then(|| executor.take_trace()),
        }
    }

    /// 校验 JSON 形式的规则草稿
    ///
    /// 无法解码的草稿单独报告，不影响其余规则的校验。
    #[instrument(skip_all, fields(rules = drafts.len()))]
    pub fn validate_rule_set(&self, drafts: &[serde_json::Value]) -> RuleSetValidation {
        let decoded = drafts
            .iter()
            .enumerate()
            .map(|(index, draft)| {
                let id = draft.get("id").and_then(serde_json::Value::as_str).unwrap_or("");
                let rule = serde_json::from_value::<Rule>(draft.clone())
                    .map_err(|e| format!("Invalid rule definition: {}", e));
                (rule_ref(id, index), rule)
            })
            .collect();

        self.validate_decoded(decoded)
    }

    /// 校验已解码的规则
    pub fn validate_rules(&self, rules: &[Rule]) -> RuleSetValidation {
        let decoded = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| (rule_ref(&rule.id, index), Ok(rule.clone())))
            .collect();

        self.validate_decoded(decoded)
    }

    fn validate_decoded(
        &self,
        decoded: Vec<(String, std::result::Result<Rule, String>)>,
    ) -> RuleSetValidation {
        let compiler = RuleCompiler::new(&self.formula);
        let mut errors = Vec::new();
        let mut valid_shape: Vec<(String, Rule)> = Vec::new();

        for (rule_ref, rule) in decoded {
            match rule {
                Ok(rule) => {
                    let rule_errors = compiler.validate(&rule);
                    if !rule_errors.is_empty() {
                        errors.push(RuleValidationError {
                            rule_ref: rule_ref.clone(),
                            errors: rule_errors,
                        });
                    }
                    valid_shape.push((rule_ref, rule));
                }
                Err(message) => errors.push(RuleValidationError {
                    rule_ref,
                    errors: vec![message],
                }),
            }
        }

        let rules: Vec<Rule> = valid_shape.iter().map(|(_, rule)| rule.clone()).collect();
        let mut warnings: Vec<ValidationWarning> = RulePriority::detect_conflicts(&rules)
            .into_iter()
            .map(|conflict| ValidationWarning {
                kind: WarningKind::Conflict,
                message: format!(
                    "{} and {}: {}",
                    conflict.rule1, conflict.rule2, conflict.description
                ),
            })
            .collect();

        let cycles = detect_circular_dependencies(&compiler, &valid_shape);
        if !cycles.is_empty() {
            warnings.push(ValidationWarning {
                kind: WarningKind::Circular,
                message: format!("Circular dependencies detected: {}", cycles.join(" -> ")),
            });
        }

        if !errors.is_empty() {
            debug!(invalid = errors.len(), "规则集校验发现错误");
        }

        RuleSetValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// 规则引用：ID 为空时使用 `#<序号>`
fn rule_ref(id: &str, index: usize) -> String {
    if id.trim().is_empty() {
        format!("#{}", index)
    } else {
        id.to_string()
    }
}

/// 直接循环依赖：A 写入 B 读取的字段，同时 B 写入 A 读取的字段
fn detect_circular_dependencies(compiler: &RuleCompiler<'_>, rules: &[(String, Rule)]) -> Vec<String> {
    let fields: Vec<_> = rules
        .iter()
        .map(|(_, rule)| {
            (
                compiler.referenced_fields(rule),
                RulePriority::written_fields(rule),
            )
        })
        .collect();

    let mut cycles = Vec::new();
    for i in 0..rules.len() {
        for j in (i + 1)..rules.len() {
            let (reads_i, writes_i) = &fields[i];
            let (reads_j, writes_j) = &fields[j];

            if !writes_i.is_disjoint(reads_j) && !writes_j.is_disjoint(reads_i) {
                cycles.push(format!("{} <-> {}", rules[i].0, rules[j].0));
            }
        }
    }

    cycles
}

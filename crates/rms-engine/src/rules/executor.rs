//! 规则条件执行器
//!
//! 对条件组做短路求值，可选记录评估追踪。表达式条件交给公式引擎求值，结果必须为布尔值。

use super::actions::formula_context;
use super::evaluator::ConditionEvaluator;
use super::models::{Condition, ConditionGroup, ConditionNode, RuleConditions};
use crate::error::{EngineError, Result};
use crate::formula::FormulaEngine;
use crate::operators::LogicalOperator;
use crate::value::Value;

/// 条件执行器
pub struct RuleExecutor<'a> {
    formula: &'a FormulaEngine,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
    trace: Vec<String>,
}

impl<'a> RuleExecutor<'a> {
    pub fn new(formula: &'a FormulaEngine) -> Self {
        Self {
            formula,
            trace_enabled: false,
            trace: Vec::new(),
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 评估规则条件
    pub fn execute(&mut self, conditions: &RuleConditions, data: &Value) -> Result<bool> {
        match conditions {
            RuleConditions::Expression(expression) => {
                self.evaluate_expression(expression, data, "root")
            }
            RuleConditions::Group(group) => self.evaluate_group(group, data, "root"),
        }
    }

    /// 取出评估追踪
    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    fn record(&mut self, line: String) {
        if self.trace_enabled {
            self.trace.push(line);
        }
    }

    /// 递归评估条件节点
    fn evaluate_node(&mut self, node: &ConditionNode, data: &Value, path: &str) -> Result<bool> {
        match node {
            ConditionNode::Condition(cond) => self.evaluate_condition(cond, data, path),
            ConditionNode::Group(group) => self.evaluate_group(group, data, path),
            ConditionNode::Expression(expression) => {
                self.evaluate_expression(expression, data, path)
            }
        }
    }

    /// 评估叶子条件
    fn evaluate_condition(&mut self, cond: &Condition, data: &Value, path: &str) -> Result<bool> {
        let field_value = data.get_path(&cond.field);

        let matched =
            ConditionEvaluator::evaluate(field_value, cond.operator, &cond.value, cond.data_type)?;

        if self.trace_enabled {
            self.record(format!(
                "{}: {} {} {} => {}",
                path,
                cond.field,
                cond.operator,
                cond.value,
                outcome(matched)
            ));
        }

        Ok(matched)
    }

    /// 评估表达式条件
    fn evaluate_expression(&mut self, expression: &str, data: &Value, path: &str) -> Result<bool> {
        let value = self.formula.evaluate(expression, &formula_context(data))?;
        let matched = value.as_bool().ok_or_else(|| {
            EngineError::type_mismatch("boolean condition result", value.type_name())
        })?;

        if self.trace_enabled {
            self.record(format!("{}: {} => {}", path, expression, outcome(matched)));
        }

        Ok(matched)
    }

    /// 评估条件组（短路求值）
    fn evaluate_group(&mut self, group: &ConditionGroup, data: &Value, path: &str) -> Result<bool> {
        if self.trace_enabled {
            self.record(format!(
                "{}: 开始评估 {} 组 (共 {} 个子节点)",
                path,
                group.operator,
                group.conditions.len()
            ));
        }

        match group.operator {
            LogicalOperator::And => {
                // AND: 所有条件都必须满足，遇到 false 立即返回
                for (i, child) in group.conditions.iter().enumerate() {
                    let child_path = format!("{}.conditions[{}]", path, i);
                    if !self.evaluate_node(child, data, &child_path)? {
                        self.record(format!("{}: AND 短路 - 子节点 {} 不匹配", path, i));
                        return Ok(false);
                    }
                }

                self.record(format!("{}: AND 组全部匹配", path));
                Ok(true)
            }
            LogicalOperator::Or => {
                // OR: 任一条件满足即可，遇到 true 立即返回
                for (i, child) in group.conditions.iter().enumerate() {
                    let child_path = format!("{}.conditions[{}]", path, i);
                    if self.evaluate_node(child, data, &child_path)? {
                        self.record(format!("{}: OR 短路 - 子节点 {} 匹配", path, i));
                        return Ok(true);
                    }
                }

                self.record(format!("{}: OR 组无匹配", path));
                Ok(false)
            }
        }
    }
}

fn outcome(matched: bool) -> &'static str {
    if matched { "MATCHED" } else { "NOT_MATCHED" }
}

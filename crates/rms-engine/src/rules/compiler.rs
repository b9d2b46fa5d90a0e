//! 规则校验器
//!
//! 检查规则结构、操作符与值的兼容性、表达式语法以及动作参数，
//! 一次收集规则的全部问题而不是遇到第一个错误就返回。

use super::models::{Condition, ConditionGroup, ConditionNode, Rule, RuleAction, RuleConditions};
use crate::formula::FormulaEngine;
use crate::operators::ConditionOperator;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("valid URL pattern"));

/// 规则校验器
pub struct RuleCompiler<'a> {
    formula: &'a FormulaEngine,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(formula: &'a FormulaEngine) -> Self {
        Self { formula }
    }

    /// 校验规则，返回全部错误信息（为空表示合法）
    pub fn validate(&self, rule: &Rule) -> Vec<String> {
        let mut errors = Vec::new();

        if rule.name.trim().is_empty() {
            errors.push("Rule must have a name".to_string());
        }

        match &rule.conditions {
            RuleConditions::Expression(expression) => {
                self.validate_expression(expression, "conditions", &mut errors)
            }
            RuleConditions::Group(group) => self.validate_group(group, "conditions", &mut errors),
        }

        if rule.actions.is_empty() {
            errors.push("Rule must have at least one action".to_string());
        }

        for (i, action) in rule.actions.iter().enumerate() {
            self.validate_action(action, &format!("actions[{}]", i), &mut errors);
        }

        errors
    }

    /// 验证条件组
    fn validate_group(&self, group: &ConditionGroup, path: &str, errors: &mut Vec<String>) {
        if group.conditions.is_empty() {
            errors.push(format!(
                "{}: Condition group must have at least one condition",
                path
            ));
        }

        for (i, node) in group.conditions.iter().enumerate() {
            let child_path = format!("{}.conditions[{}]", path, i);
            match node {
                ConditionNode::Group(nested) => self.validate_group(nested, &child_path, errors),
                ConditionNode::Condition(condition) => {
                    Self::validate_condition(condition, &child_path, errors)
                }
                ConditionNode::Expression(expression) => {
                    self.validate_expression(expression, &child_path, errors)
                }
            }
        }
    }

    /// 验证叶子条件
    fn validate_condition(condition: &Condition, path: &str, errors: &mut Vec<String>) {
        if condition.field.trim().is_empty() {
            errors.push(format!("{}: Condition must have a field", path));
        }

        // 验证操作符和值的兼容性
        match condition.operator {
            ConditionOperator::Between => match condition.value.as_list() {
                Some(items) if items.len() == 2 => {}
                Some(items) => errors.push(format!(
                    "{}: Operator 'between' requires a [min, max] list, got {} element(s)",
                    path,
                    items.len()
                )),
                None => errors.push(format!(
                    "{}: Operator 'between' requires a [min, max] list",
                    path
                )),
            },
            op if op.requires_list() => {
                if condition.value.as_list().is_none() {
                    errors.push(format!("{}: Operator '{}' requires a list value", path, op));
                }
            }
            ConditionOperator::Regex => match condition.value.as_str() {
                Some(pattern) => {
                    if let Err(e) = Regex::new(pattern) {
                        errors.push(format!("{}: Invalid regex pattern '{}': {}", path, pattern, e));
                    }
                }
                None => errors.push(format!(
                    "{}: Operator 'regex' requires a string pattern",
                    path
                )),
            },
            _ => {}
        }
    }

    /// 条件表达式需语法合法且结果可能为布尔值
    fn validate_expression(&self, expression: &str, path: &str, errors: &mut Vec<String>) {
        let parsed = self.formula.parse(expression);
        for error in parsed.errors {
            errors.push(format!("{}: Invalid expression: {}", path, error));
        }

        if parsed.ast.is_some_and(|ast| !ast.may_yield_boolean()) {
            errors.push(format!("{}: Condition expression must be boolean", path));
        }
    }

    /// 验证动作参数
    fn validate_action(&self, action: &RuleAction, path: &str, errors: &mut Vec<String>) {
        match action {
            RuleAction::SetValue { target, value } => {
                if is_blank(target.as_deref()) {
                    errors.push(format!("{}: setValue requires target field", path));
                }
                if value.is_none() {
                    errors.push(format!("{}: setValue requires value", path));
                }
            }
            RuleAction::Calculate { formula, .. } => match formula.as_deref() {
                Some(formula) if !formula.trim().is_empty() => {
                    for error in self.formula.validate(formula).errors {
                        errors.push(format!("{}: calculate formula is invalid: {}", path, error));
                    }
                }
                _ => errors.push(format!("{}: calculate requires formula", path)),
            },
            RuleAction::Webhook { url, .. } => match url.as_deref() {
                Some(url) if !url.trim().is_empty() => {
                    if !HTTP_URL.is_match(url) {
                        errors.push(format!("{}: Invalid webhook URL", path));
                    }
                }
                _ => errors.push(format!("{}: webhook requires URL", path)),
            },
            RuleAction::Custom { custom_handler, .. } => {
                if is_blank(custom_handler.as_deref()) {
                    errors.push(format!("{}: custom requires handler name", path));
                }
            }
            RuleAction::Alert { .. } | RuleAction::Log { .. } => {}
        }
    }

    /// 规则条件中读取的所有字段（叶子字段与表达式变量）
    pub fn referenced_fields(&self, rule: &Rule) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        match &rule.conditions {
            RuleConditions::Expression(expression) => {
                self.collect_expression_fields(expression, &mut fields)
            }
            RuleConditions::Group(group) => self.collect_fields(group, &mut fields),
        }
        fields
    }

    /// 递归收集字段
    fn collect_fields(&self, group: &ConditionGroup, fields: &mut BTreeSet<String>) {
        for node in &group.conditions {
            match node {
                ConditionNode::Group(nested) => self.collect_fields(nested, fields),
                ConditionNode::Condition(condition) => {
                    fields.insert(condition.field.clone());
                }
                ConditionNode::Expression(expression) => {
                    self.collect_expression_fields(expression, fields)
                }
            }
        }
    }

    fn collect_expression_fields(&self, expression: &str, fields: &mut BTreeSet<String>) {
        fields.extend(self.formula.parse(expression).variables);
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(value: serde_json::Value) -> Rule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_rule() {
        let formula = FormulaEngine::new();
        let compiler = RuleCompiler::new(&formula);

        let rule = rule(json!({
            "id": "r1",
            "name": "weekend_markup",
            "ruleType": "modifier",
            "conditions": {
                "operator": "and",
                "conditions": [
                    {"field": "day_of_week", "operator": "in", "value": [5, 6]},
                    "occupancy > 0.8"
                ]
            },
            "actions": [
                {"type": "calculate", "formula": "rate * 1.1", "target": "rate"},
                {"type": "webhook", "url": "https://ops.example.com/hooks/rates"}
            ]
        }));

        assert!(compiler.validate(&rule).is_empty());
        assert_eq!(
            compiler.referenced_fields(&rule),
            BTreeSet::from(["day_of_week".to_string(), "occupancy".to_string()])
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let formula = FormulaEngine::new();
        let compiler = RuleCompiler::new(&formula);

        let rule = rule(json!({
            "name": "",
            "ruleType": "trigger",
            "conditions": {
                "operator": "or",
                "conditions": [
                    {"field": "", "operator": "equals", "value": 1},
                    {"field": "rate", "operator": "between", "value": [1, 2, 3]},
                    {"field": "code", "operator": "regex", "value": "("},
                    {"operator": "and", "conditions": []},
                    "rate +* 2"
                ]
            },
            "actions": [
                {"type": "setValue"},
                {"type": "calculate"},
                {"type": "webhook", "url": "ftp://example.com"},
                {"type": "custom"}
            ]
        }));

        let errors = compiler.validate(&rule);
        assert_eq!(errors[0], "Rule must have a name");
        assert!(errors.contains(&"conditions.conditions[0]: Condition must have a field".to_string()));
        assert!(errors.iter().any(|e| e.contains("requires a [min, max] list, got 3")));
        assert!(errors.iter().any(|e| e.contains("Invalid regex pattern")));
        assert!(errors.contains(
            &"conditions.conditions[3]: Condition group must have at least one condition"
                .to_string()
        ));
        assert!(errors.iter().any(|e| e.starts_with("conditions.conditions[4]: Invalid expression")));
        assert!(errors.contains(&"actions[0]: setValue requires target field".to_string()));
        assert!(errors.contains(&"actions[0]: setValue requires value".to_string()));
        assert!(errors.contains(&"actions[1]: calculate requires formula".to_string()));
        assert!(errors.contains(&"actions[2]: Invalid webhook URL".to_string()));
        assert!(errors.contains(&"actions[3]: custom requires handler name".to_string()));
    }

    #[test]
    fn test_condition_expression_must_be_boolean() {
        let formula = FormulaEngine::new();
        let compiler = RuleCompiler::new(&formula);

        let with_condition = |conditions: serde_json::Value| {
            compiler.validate(&rule(json!({
                "name": "typed_condition",
                "ruleType": "trigger",
                "conditions": conditions,
                "actions": [{"type": "log", "message": "hit"}]
            })))
        };

        assert_eq!(
            with_condition(json!("rate * 2")),
            vec!["conditions: Condition expression must be boolean"]
        );
        assert_eq!(
            with_condition(json!("'hello'")),
            vec!["conditions: Condition expression must be boolean"]
        );
        assert_eq!(
            with_condition(json!({"operator": "and", "conditions": ["occupancy > 0.8", "rate - 10"]})),
            vec!["conditions.conditions[1]: Condition expression must be boolean"]
        );

        assert!(with_condition(json!("occupancy > 0.8 && !is_blackout")).is_empty());
        assert!(with_condition(json!("is_weekend")).is_empty());
        assert!(with_condition(json!("if(is_weekend, occupancy > 0.7, occupancy > 0.9)")).is_empty());
    }

    #[test]
    fn test_rule_without_actions() {
        let formula = FormulaEngine::new();
        let compiler = RuleCompiler::new(&formula);

        let rule = rule(json!({
            "name": "no_actions",
            "ruleType": "threshold",
            "conditions": "rate < 50"
        }));

        assert_eq!(
            compiler.validate(&rule),
            vec!["Rule must have at least one action"]
        );
    }
}

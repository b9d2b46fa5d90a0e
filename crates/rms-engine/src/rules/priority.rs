//! 规则优先级辅助
//!
//! 评估时引擎按调用方给定的顺序执行规则，排序与冲突检测由调用方按需使用。

use super::models::{Rule, RuleType};
use serde::Serialize;
use std::collections::BTreeSet;

/// 冲突类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// 相同优先级与类型
    Priority,
    /// 写入相同目标字段
    Action,
}

/// 两条规则之间的潜在冲突
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConflict {
    pub rule1: String,
    pub rule2: String,
    pub kind: ConflictKind,
    pub description: String,
}

pub struct RulePriority;

impl RulePriority {
    /// 按优先级降序排序，优先级相同时按名称升序
    pub fn sort_by_priority(rules: &[Rule]) -> Vec<Rule> {
        let mut sorted = rules.to_vec();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        sorted
    }

    /// 按类型分组，组内按优先级排序
    pub fn group_by_type(rules: &[Rule]) -> Vec<(RuleType, Vec<Rule>)> {
        [RuleType::Trigger, RuleType::Modifier, RuleType::Threshold]
            .into_iter()
            .filter_map(|rule_type| {
                let group: Vec<Rule> = rules
                    .iter()
                    .filter(|r| r.rule_type == rule_type)
                    .cloned()
                    .collect();
                (!group.is_empty()).then(|| (rule_type, Self::sort_by_priority(&group)))
            })
            .collect()
    }

    /// 检测两两规则之间的潜在冲突（按输入顺序）
    pub fn detect_conflicts(rules: &[Rule]) -> Vec<RuleConflict> {
        let mut conflicts = Vec::new();

        for (i, rule1) in rules.iter().enumerate() {
            for rule2 in &rules[i + 1..] {
                if rule1.priority == rule2.priority && rule1.rule_type == rule2.rule_type {
                    conflicts.push(RuleConflict {
                        rule1: rule1.name.clone(),
                        rule2: rule2.name.clone(),
                        kind: ConflictKind::Priority,
                        description: format!(
                            "Rules have same priority ({}) and type ({})",
                            rule1.priority, rule1.rule_type
                        ),
                    });
                }

                let overlapping = Self::overlapping_targets(rule1, rule2);
                if !overlapping.is_empty() {
                    let descriptions: Vec<String> = overlapping
                        .iter()
                        .map(|target| format!("both rules set \"{}\"", target))
                        .collect();
                    conflicts.push(RuleConflict {
                        rule1: rule1.name.clone(),
                        rule2: rule2.name.clone(),
                        kind: ConflictKind::Action,
                        description: format!(
                            "Rules have conflicting actions: {}",
                            descriptions.join(", ")
                        ),
                    });
                }
            }
        }

        conflicts
    }

    /// 两条规则的 setValue 目标交集
    fn overlapping_targets(rule1: &Rule, rule2: &Rule) -> BTreeSet<String> {
        let targets1 = Self::set_value_targets(rule1);
        let targets2 = Self::set_value_targets(rule2);
        targets1.intersection(&targets2).cloned().collect()
    }

    fn set_value_targets(rule: &Rule) -> BTreeSet<String> {
        rule.actions
            .iter()
            .filter(|a| a.action_type() == "setValue")
            .filter_map(|a| a.written_field())
            .map(str::to_string)
            .collect()
    }

    /// 规则动作写入的全部字段
    pub fn written_fields(rule: &Rule) -> BTreeSet<String> {
        rule.actions
            .iter()
            .filter_map(|a| a.written_field())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::ConditionOperator;
    use crate::rules::models::{Condition, ConditionGroup, RuleAction};

    fn rule(name: &str, priority: i32, rule_type: RuleType, target: &str) -> Rule {
        Rule::new(
            name,
            rule_type,
            ConditionGroup::and(vec![
                Condition::new("occupancy", ConditionOperator::GreaterThan, 0.5).into(),
            ]),
            vec![RuleAction::set_value(target, 1.0)],
        )
        .with_priority(priority)
    }

    #[test]
    fn test_sort_by_priority() {
        let rules = vec![
            rule("b", 1, RuleType::Trigger, "x"),
            rule("c", 10, RuleType::Trigger, "y"),
            rule("a", 1, RuleType::Trigger, "z"),
        ];

        let names: Vec<String> = RulePriority::sort_by_priority(&rules)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_group_by_type() {
        let rules = vec![
            rule("t1", 1, RuleType::Threshold, "x"),
            rule("g1", 1, RuleType::Trigger, "y"),
        ];

        let groups = RulePriority::group_by_type(&rules);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, RuleType::Trigger);
        assert_eq!(groups[1].0, RuleType::Threshold);
    }

    #[test]
    fn test_detect_conflicts() {
        let rules = vec![
            rule("weekend", 5, RuleType::Modifier, "rate"),
            rule("event", 5, RuleType::Modifier, "rate"),
            rule("floor", 9, RuleType::Threshold, "min_rate"),
        ];

        let conflicts = RulePriority::detect_conflicts(&rules);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].kind, ConflictKind::Priority);
        assert_eq!(
            conflicts[0].description,
            "Rules have same priority (5) and type (modifier)"
        );
        assert_eq!(conflicts[1].kind, ConflictKind::Action);
        assert_eq!(
            conflicts[1].description,
            "Rules have conflicting actions: both rules set \"rate\""
        );
    }
}

//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    // 通用比较
    Equals,
    NotEquals,

    // 数值比较
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Between,

    // 包含检查
    Contains,
    NotContains,
    In,
    NotIn,
    ContainsAny,
    ContainsAll,

    // 字符串操作
    StartsWith,
    EndsWith,
    Regex,

    // 时间操作
    Before,
    After,

    // 空值检查
    IsEmpty,
    IsNotEmpty,
}

impl ConditionOperator {
    /// 是否为有序比较（需要可比较的操作数）
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan
                | Self::LessThan
                | Self::GreaterThanOrEqual
                | Self::LessThanOrEqual
                | Self::Between
                | Self::Before
                | Self::After
        )
    }

    /// 期望值必须为列表的操作符
    pub fn requires_list(&self) -> bool {
        matches!(
            self,
            Self::In | Self::NotIn | Self::ContainsAny | Self::ContainsAll
        )
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::ContainsAny => "containsAny",
            Self::ContainsAll => "containsAll",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Regex => "regex",
            Self::Before => "before",
            Self::After => "after",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
        };
        write!(f, "{}", s)
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_serde_names() {
        let op: ConditionOperator = serde_json::from_str("\"greaterThanOrEqual\"").unwrap();
        assert_eq!(op, ConditionOperator::GreaterThanOrEqual);
        assert_eq!(op.to_string(), "greaterThanOrEqual");

        let json = serde_json::to_string(&ConditionOperator::NotIn).unwrap();
        assert_eq!(json, "\"notIn\"");
    }

    #[test]
    fn test_logical_operator_accepts_both_cases() {
        let lower: LogicalOperator = serde_json::from_str("\"and\"").unwrap();
        let upper: LogicalOperator = serde_json::from_str("\"OR\"").unwrap();

        assert_eq!(lower, LogicalOperator::And);
        assert_eq!(upper, LogicalOperator::Or);
    }
}

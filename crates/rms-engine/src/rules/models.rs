//! 规则引擎领域模型
//!
//! 规则的 JSON 字段名统一为 camelCase。

use crate::error::Diagnostic;
use crate::operators::{ConditionOperator, LogicalOperator};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Trigger,
    Threshold,
    Modifier,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Threshold => "threshold",
            Self::Modifier => "modifier",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub rule_type: RuleType,
    pub conditions: RuleConditions,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        rule_type: RuleType,
        conditions: impl Into<RuleConditions>,
        actions: Vec<RuleAction>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            rule_type,
            conditions: conditions.into(),
            actions,
            priority: 0,
            is_active: true,
            description: None,
            metadata: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 规则条件：表达式字符串或条件组
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConditions {
    Expression(String),
    Group(ConditionGroup),
}

impl From<ConditionGroup> for RuleConditions {
    fn from(group: ConditionGroup) -> Self {
        Self::Group(group)
    }
}

impl From<&str> for RuleConditions {
    fn from(expression: &str) -> Self {
        Self::Expression(expression.to_string())
    }
}

/// 条件组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    pub conditions: Vec<ConditionNode>,
}

impl ConditionGroup {
    pub fn new(operator: LogicalOperator, conditions: Vec<ConditionNode>) -> Self {
        Self {
            operator,
            conditions,
        }
    }

    pub fn and(conditions: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::And, conditions)
    }

    pub fn or(conditions: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::Or, conditions)
    }
}

/// 条件组中的节点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Condition(Condition),
    Expression(String),
}

impl From<Condition> for ConditionNode {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(group: ConditionGroup) -> Self {
        Self::Group(group)
    }
}

/// 字段数据类型提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
    Array,
}

/// 叶子条件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            data_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

/// 规则动作
///
/// 必填参数以 Option 表示，缺失时由校验报告而不是在反序列化阶段失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    SetValue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(
            default,
            deserialize_with = "present",
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Value>,
    },
    Calculate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Alert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Webhook {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
    },
    #[serde(rename_all = "camelCase")]
    Custom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        custom_handler: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
}

/// 字段出现即为 Some，显式的 null 也保留
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RuleAction {
    pub fn set_value(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::SetValue {
            target: Some(target.into()),
            value: Some(value.into()),
        }
    }

    pub fn calculate(formula: impl Into<String>, target: Option<&str>) -> Self {
        Self::Calculate {
            formula: Some(formula.into()),
            target: target.map(str::to_string),
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::Alert {
            message: Some(message.into()),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: Some(message.into()),
        }
    }

    pub fn custom(handler: impl Into<String>, params: Option<Value>) -> Self {
        Self::Custom {
            custom_handler: Some(handler.into()),
            params,
        }
    }

    /// 动作类型名（与 JSON 中的 `type` 一致）
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::SetValue { .. } => "setValue",
            Self::Calculate { .. } => "calculate",
            Self::Alert { .. } => "alert",
            Self::Log { .. } => "log",
            Self::Webhook { .. } => "webhook",
            Self::Custom { .. } => "custom",
        }
    }

    /// 动作写入的字段
    pub fn written_field(&self) -> Option<&str> {
        match self {
            Self::SetValue { target, .. } | Self::Calculate { target, .. } => target.as_deref(),
            _ => None,
        }
    }
}

/// 规则评估上下文
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleContext {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RuleContext {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            metadata: None,
            timestamp: None,
        }
    }

    /// 从 JSON 字符串创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: serde_json::Value = serde_json::from_str(json)?;
        Ok(Self::new(data))
    }

    /// 获取字段值（支持点号分隔的路径，如 "room.rate" 或 "items.0.price"）
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        self.data.get_path(path)
    }
}

/// 评估选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationOptions {
    /// 匹配后是否执行动作
    pub execute_actions: bool,
    /// 首条规则匹配后停止
    pub stop_on_first_match: bool,
    /// 记录评估追踪
    pub trace: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            execute_actions: true,
            stop_on_first_match: false,
            trace: false,
        }
    }
}

/// 单条规则的评估状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Matched,
    Unmatched,
    Error,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::Error => "error",
        }
    }
}

/// 动作执行结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecutionResult {
    pub action_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Diagnostic>,
}

/// 单条规则的评估结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluationResult {
    pub rule_id: String,
    pub rule_name: String,
    pub matched: bool,
    pub status: RuleStatus,
    pub actions_executed: Vec<ActionExecutionResult>,
    /// 耗时（毫秒）
    pub execution_time: f64,
    pub errors: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

/// 规则集评估结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetEvaluationResult {
    pub evaluated_rules: usize,
    pub matched_rules: usize,
    /// 各规则耗时之和（毫秒）
    pub total_execution_time: f64,
    pub results: Vec<RuleEvaluationResult>,
    /// 动作类型 -> 成功动作的结果
    pub aggregated_actions: BTreeMap<String, Vec<Value>>,
    /// 执行全部动作后的工作数据
    pub data: Value,
}

/// 单条规则的校验错误
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidationError {
    /// 规则 ID，ID 为空时为 `#<序号>`
    pub rule_ref: String,
    pub errors: Vec<String>,
}

/// 校验警告类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    Conflict,
    Circular,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub message: String,
}

/// 规则集校验结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSetValidation {
    pub valid: bool,
    pub errors: Vec<RuleValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

//! 公式引擎领域模型

use super::ast::Expr;
use crate::error::Diagnostic;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 公式执行上下文
///
/// 标识符先在 `parameters` 中查找，再在 `variables` 中查找（参数覆盖变量）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaContext {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl FormulaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象构建变量表
    pub fn from_json(variables: serde_json::Value) -> Self {
        let variables = match Value::from(variables) {
            Value::Map(map) => map,
            _ => BTreeMap::new(),
        };
        Self {
            variables,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// 查找标识符（支持点号路径）
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        Self::lookup_in(&self.parameters, name).or_else(|| Self::lookup_in(&self.variables, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup_in<'a>(scope: &'a BTreeMap<String, Value>, name: &str) -> Option<&'a Value> {
        if let Some(value) = scope.get(name) {
            return Some(value);
        }
        let (head, rest) = name.split_once('.')?;
        scope.get(head)?.get_path(rest)
    }
}

/// 公式执行结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaResult {
    /// 出错时为 Null
    pub value: Value,
    /// 解析与求值耗时（毫秒）
    pub execution_time: f64,
    /// 求值过程中实际访问到的变量
    pub used_variables: BTreeSet<String>,
    pub errors: Vec<Diagnostic>,
}

impl FormulaResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 复杂度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

/// 语法校验结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaValidation {
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<String>,
    pub used_variables: BTreeSet<String>,
    pub estimated_complexity: ComplexityLevel,
}

/// 解析结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaParseResult {
    pub ast: Option<Expr>,
    pub variables: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
}

/// 单个测试上下文的执行结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaTestResult {
    pub input: FormulaContext,
    pub output: Value,
    pub passed: bool,
}

/// 带上下文与测试数据的校验报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<FormulaTestResult>>,
}

/// 新旧公式在同一输入上的差异
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDifference {
    pub input: FormulaContext,
    pub old_output: Value,
    pub new_output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_diff: Option<f64>,
}

/// 公式迁移兼容性报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub compatible: bool,
    pub differences: Vec<MigrationDifference>,
}

/// 常量折叠优化结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub original_expression: String,
    pub optimized_expression: String,
    pub improvements: Vec<String>,
}

/// 复杂度分析
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
    pub complexity: u32,
    pub suggestions: Vec<String>,
}

/// 公式变量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Number,
    Percentage,
    Currency,
    Boolean,
    Array,
    Object,
}

/// 公式声明的变量
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// 持久化的公式定义（由外部存储维护，name 唯一）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaDefinition {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub expression: String,
    #[serde(default)]
    pub variables: Vec<FormulaVariable>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl FormulaDefinition {
    /// 为上下文中缺失的变量补充声明的默认值
    pub fn apply_defaults(&self, context: &FormulaContext) -> FormulaContext {
        let mut resolved = context.clone();
        for variable in &self.variables {
            if let Some(default) = &variable.default {
                if !resolved.contains(&variable.name) {
                    resolved
                        .variables
                        .insert(variable.name.clone(), default.clone());
                }
            }
        }
        resolved
    }
}

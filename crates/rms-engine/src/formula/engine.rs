//! 公式引擎
//!
//! 对外提供校验、执行、解析、迁移比对、优化与文档生成能力。
//! 所有公开操作都不会 panic，也不会向调用方返回 `Err`，问题以诊断信息的形式写入结果对象。

use super::analyzer;
use super::ast::Expr;
use super::cache::{CacheStats, FormulaCache};
use super::evaluator::Evaluator;
use super::models::{
    ComplexityLevel, ComplexityReport, FormulaContext, FormulaDefinition, FormulaParseResult,
    FormulaResult, FormulaTestResult, FormulaValidation, FormulaValidationReport,
    MigrationDifference, MigrationReport, OptimizationResult,
};
use super::parser::{ParseLimits, parse};
use crate::error::Result;
use crate::value::Value;
use rms_shared::config::EngineConfig;
use rms_shared::observability::metrics::record_formula_execution;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// 迁移比对时允许的数值偏差（百分比）
const MIGRATION_TOLERANCE_PERCENT: f64 = 0.01;

/// 公式引擎
#[derive(Clone)]
pub struct FormulaEngine {
    config: EngineConfig,
    limits: ParseLimits,
    /// 解析缓存，关闭时为 None
    cache: Option<FormulaCache>,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// 使用指定配置创建引擎
    pub fn with_config(config: EngineConfig) -> Self {
        let cache = config
            .cache_enabled
            .then(|| FormulaCache::new(config.cache_capacity));

        Self {
            limits: ParseLimits::from(&config),
            config,
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 获取缓存统计信息
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(FormulaCache::stats)
    }

    /// 解析表达式，优先使用缓存
    pub(crate) fn parse_cached(&self, expression: &str) -> Result<Arc<Expr>> {
        if let Some(cache) = &self.cache {
            if let Some(expr) = cache.get(expression) {
                return Ok(expr);
            }
        }

        let expr = Arc::new(parse(expression, self.limits)?);

        if let Some(cache) = &self.cache {
            cache.insert(expression, Arc::clone(&expr));
        }

        Ok(expr)
    }

    /// 语法校验
    ///
    /// 不检查标识符是否存在。
    #[instrument(skip(self))]
    pub fn validate(&self, expression: &str) -> FormulaValidation {
        match self.parse_cached(expression) {
            Ok(expr) => FormulaValidation {
                is_valid: true,
                errors: Vec::new(),
                warnings: analyzer::validation_warnings(&expr),
                used_variables: expr.variables(),
                estimated_complexity: analyzer::estimate_complexity(&expr),
            },
            Err(e) => {
                debug!(error = %e, "公式校验失败");
                FormulaValidation {
                    is_valid: false,
                    errors: vec![e.into()],
                    warnings: Vec::new(),
                    used_variables: BTreeSet::new(),
                    estimated_complexity: ComplexityLevel::Low,
                }
            }
        }
    }

    /// 执行公式
    ///
    /// 出错时 `value` 为 Null，`used_variables` 为出错前已访问的变量。
    #[instrument(skip(self, context))]
    pub fn execute(&self, expression: &str, context: &FormulaContext) -> FormulaResult {
        let start = Instant::now();

        let mut used_variables = BTreeSet::new();
        let outcome = self.parse_cached(expression).and_then(|expr| {
            let mut evaluator = Evaluator::new(context);
            let value = evaluator.evaluate(&expr);
            used_variables = evaluator.into_used_variables();
            value
        });

        let elapsed = start.elapsed();
        let execution_time = elapsed.as_secs_f64() * 1000.0;

        match outcome {
            Ok(value) => {
                record_formula_execution("success", elapsed.as_secs_f64());
                FormulaResult {
                    value,
                    execution_time,
                    used_variables,
                    errors: Vec::new(),
                }
            }
            Err(e) => {
                debug!(error = %e, "公式执行失败");
                record_formula_execution(&e.kind().to_string(), elapsed.as_secs_f64());
                FormulaResult {
                    value: Value::Null,
                    execution_time,
                    used_variables,
                    errors: vec![e.into()],
                }
            }
        }
    }

    /// 执行公式并直接返回值或错误
    pub fn evaluate(&self, expression: &str, context: &FormulaContext) -> Result<Value> {
        let expr = self.parse_cached(expression)?;
        Evaluator::new(context).evaluate(&expr)
    }

    /// 解析表达式，返回语法树及其引用的变量和函数
    pub fn parse(&self, expression: &str) -> FormulaParseResult {
        match self.parse_cached(expression) {
            Ok(expr) => FormulaParseResult {
                variables: expr.variables(),
                functions: expr.functions(),
                ast: Some(expr.as_ref().clone()),
                is_valid: true,
                errors: Vec::new(),
            },
            Err(e) => FormulaParseResult {
                ast: None,
                variables: BTreeSet::new(),
                functions: BTreeSet::new(),
                is_valid: false,
                errors: vec![e.into()],
            },
        }
    }

    /// 带上下文与测试数据的完整校验
    #[instrument(skip(self, context, test_data), fields(test_cases = test_data.len()))]
    pub fn validate_with_context(
        &self,
        expression: &str,
        context: Option<&FormulaContext>,
        test_data: &[FormulaContext],
    ) -> FormulaValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match self.parse_cached(expression) {
            Ok(expr) => {
                if let Some(context) = context {
                    let missing: Vec<String> = expr
                        .variables()
                        .into_iter()
                        .filter(|name| !context.contains(name))
                        .collect();
                    if !missing.is_empty() {
                        errors.push(format!("Missing variables: {}", missing.join(", ")));
                    }

                    let result = self.execute(expression, context);
                    match result.errors.first() {
                        Some(diagnostic) => errors.push(format!("Execution failed: {}", diagnostic)),
                        None => {
                            if let Some(message) = self.check_result_range(&result.value) {
                                errors.push(message);
                            }
                        }
                    }

                    if result.execution_time > self.config.slow_formula_threshold_ms {
                        warnings.push(format!(
                            "Formula execution too slow: {:.2}ms",
                            result.execution_time
                        ));
                    }
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        let test_results = (!test_data.is_empty()).then(|| {
            test_data
                .iter()
                .map(|input| {
                    let result = self.execute(expression, input);
                    FormulaTestResult {
                        input: input.clone(),
                        passed: result.is_success(),
                        output: result.value,
                    }
                })
                .collect::<Vec<_>>()
        });

        if let Some(results) = &test_results {
            let failed = results.iter().filter(|r| !r.passed).count();
            if failed > 0 {
                errors.push(format!("{} test(s) failed", failed));
            }
        }

        FormulaValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            test_results,
        }
    }

    /// 非数值结果不做范围检查
    fn check_result_range(&self, value: &Value) -> Option<String> {
        let number = value.as_f64()?;
        if !number.is_finite() {
            Some("Formula produces invalid number".to_string())
        } else if number.abs() > self.config.result_magnitude_limit {
            Some("Formula produces unreasonably large value".to_string())
        } else {
            None
        }
    }

    /// 比对新旧公式在同一组输入上的输出
    #[instrument(skip(self, test_data), fields(test_cases = test_data.len()))]
    pub fn validate_migration(
        &self,
        old_expression: &str,
        new_expression: &str,
        test_data: &[FormulaContext],
    ) -> MigrationReport {
        let mut compatible = true;
        let mut differences = Vec::new();

        for input in test_data {
            let old_output = self.execute(old_expression, input).value;
            let new_output = self.execute(new_expression, input).value;

            if old_output == new_output {
                continue;
            }

            let percent_diff = match (&old_output, &new_output) {
                (Value::Number(old), Value::Number(new)) if *old != 0.0 => {
                    Some(((new - old) / old * 100.0).abs())
                }
                _ => None,
            };

            if percent_diff.is_none_or(|diff| diff > MIGRATION_TOLERANCE_PERCENT) {
                compatible = false;
            }

            differences.push(MigrationDifference {
                input: input.clone(),
                old_output,
                new_output,
                percent_diff,
            });
        }

        MigrationReport {
            compatible,
            differences,
        }
    }

    /// 执行公式定义，缺失的变量使用声明的默认值
    #[instrument(skip(self, definition, context), fields(formula = %definition.name))]
    pub fn execute_definition(
        &self,
        definition: &FormulaDefinition,
        context: &FormulaContext,
    ) -> FormulaResult {
        let resolved = definition.apply_defaults(context);
        self.execute(&definition.expression, &resolved)
    }

    /// 在同一上下文上批量执行多个命名公式
    #[instrument(skip(self, formulas, context), fields(count = formulas.len()))]
    pub fn execute_batch(
        &self,
        formulas: &[(String, String)],
        context: &FormulaContext,
    ) -> BTreeMap<String, FormulaResult> {
        let results: BTreeMap<String, FormulaResult> = formulas
            .iter()
            .map(|(name, expression)| (name.clone(), self.execute(expression, context)))
            .collect();

        let failed = results.values().filter(|r| !r.is_success()).count();
        info!("批量执行完成: {} 成功, {} 失败", results.len() - failed, failed);

        results
    }

    /// 常量折叠优化
    ///
    /// 无法解析的表达式原样返回。
    pub fn optimize(&self, expression: &str) -> OptimizationResult {
        let Ok(expr) = self.parse_cached(expression) else {
            return OptimizationResult {
                original_expression: expression.to_string(),
                optimized_expression: expression.to_string(),
                improvements: Vec::new(),
            };
        };

        let (folded, folds) = analyzer::fold_constants(&expr);
        let optimized_expression = if folds > 0 {
            folded.to_string()
        } else {
            expression.to_string()
        };

        OptimizationResult {
            original_expression: expression.to_string(),
            optimized_expression,
            improvements: analyzer::describe_improvements(&expr, folds),
        }
    }

    /// 复杂度分析，无法解析的表达式评分为 0
    pub fn analyze_complexity(&self, expression: &str) -> ComplexityReport {
        match self.parse_cached(expression) {
            Ok(expr) => analyzer::analyze_complexity(&expr),
            Err(e) => ComplexityReport {
                complexity: 0,
                suggestions: vec![format!("Fix syntax errors first: {}", e)],
            },
        }
    }

    /// 生成 Markdown 文档
    pub fn generate_documentation(&self, expression: &str) -> String {
        match self.parse_cached(expression) {
            Ok(expr) => analyzer::generate_documentation(expression, &expr),
            Err(e) => format!(
                "## Formula Documentation\n\n**Expression:** `{}`\n\n### Errors:\n- {}\n",
                expression,
                e.to_diagnostic()
            ),
        }
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

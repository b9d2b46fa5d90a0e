//! 公式引擎集成测试
//!
//! 通过公共 API 覆盖校验、执行、测试数据校验与迁移比对的完整流程。

use rms_engine::formula::{FormulaDefinition, FormulaEngine};
use rms_engine::{ErrorKind, FormulaContext, Value};
use rms_shared::config::EngineConfig;
use serde_json::json;
use std::collections::BTreeSet;

/// 创建测试上下文：模拟某酒店某日的收益数据
fn create_pricing_context() -> FormulaContext {
    FormulaContext::from_json(json!({
        "base_rate": 200,
        "occupancy": 0.86,
        "competitor": {
            "median_rate": 235,
            "rates": [210, 235, 260]
        },
        "is_weekend": true,
        "days_to_arrival": 3
    }))
    .with_parameter("demand_multiplier", 1.25)
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_constant_expression() {
    let engine = FormulaEngine::new();
    let result = engine.execute("2 + 2", &FormulaContext::new());

    assert_eq!(result.value, Value::Number(4.0));
    assert!(result.errors.is_empty());
    assert!(result.used_variables.is_empty());
}

#[test]
fn test_division_by_zero_yields_single_arithmetic_error() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"a": 10, "b": 0}));
    let result = engine.execute("a / b", &context);

    assert_eq!(result.value, Value::Null);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ErrorKind::ArithmeticError);
}

#[test]
fn test_short_circuit_records_only_visited_variables() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"a": false}));
    let result = engine.execute("a && b", &context);

    assert!(result.errors.is_empty());
    assert_eq!(result.value, Value::Bool(false));
    assert_eq!(result.used_variables, names(&["a"]));
}

#[test]
fn test_invalid_syntax() {
    let engine = FormulaEngine::new();
    let validation = engine.validate("a +* b");

    assert!(!validation.is_valid);
    assert!(!validation.errors.is_empty());
    assert_eq!(validation.errors[0].kind, ErrorKind::SyntaxError);
}

#[test]
fn test_unknown_function_is_rejected_at_validation() {
    let engine = FormulaEngine::new();
    let validation = engine.validate("system('rm -rf /')");

    assert!(!validation.is_valid);
    assert_eq!(validation.errors[0].kind, ErrorKind::SyntaxError);
}

#[test]
fn test_pricing_formulas_with_full_context() {
    let engine = FormulaEngine::new();
    let context = create_pricing_context();

    let expressions = [
        "base_rate * demand_multiplier",
        "if(occupancy > 0.8, base_rate * 1.2, base_rate)",
        "is_weekend ? max(base_rate, competitor.median_rate) : base_rate",
        "CLAMP(base_rate * (1 + occupancy), 150, 400)",
        "ROUND_TO(PERCENT_CHANGE(base_rate, competitor.median_rate), 2)",
        "mean(competitor.rates) - base_rate",
        "days_to_arrival <= 7 && occupancy >= 0.85",
    ];

    for expression in expressions {
        assert!(engine.validate(expression).is_valid, "{expression}");
        let result = engine.execute(expression, &context);
        assert!(result.errors.is_empty(), "{expression}: {:?}", result.errors);
    }

    let result = engine.execute("base_rate * demand_multiplier", &context);
    assert_eq!(result.value, Value::Number(250.0));
    assert_eq!(result.used_variables, names(&["base_rate", "demand_multiplier"]));

    let result = engine.execute("ROUND_TO(PERCENT_CHANGE(base_rate, competitor.median_rate), 2)", &context);
    assert_eq!(result.value, Value::Number(17.5));
}

#[test]
fn test_parameters_override_variables() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"rate": 100})).with_parameter("rate", 120.0);

    assert_eq!(
        engine.execute("rate + 1", &context).value,
        Value::Number(121.0)
    );
}

#[test]
fn test_missing_variable_is_reference_error() {
    let engine = FormulaEngine::new();
    let result = engine.execute("rate * 2", &FormulaContext::new());

    assert_eq!(result.value, Value::Null);
    assert_eq!(result.errors[0].kind, ErrorKind::ReferenceError);
}

#[test]
fn test_mixed_string_number_addition_is_type_error() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"label": "rate"}));
    let result = engine.execute("label + 1", &context);

    assert_eq!(result.errors[0].kind, ErrorKind::TypeError);
}

#[test]
fn test_expression_length_limit() {
    let engine = FormulaEngine::with_config(EngineConfig {
        max_expression_length: 16,
        ..EngineConfig::default()
    });

    assert!(engine.validate("1 + 2").is_valid);
    assert!(!engine.validate("a + b + c + d + e + f").is_valid);
}

/// 生成 `1+1+...+1` 形式的加法链
fn addition_chain(terms: usize) -> String {
    vec!["1"; terms].join("+")
}

#[test]
fn test_long_operator_chain_is_rejected_instead_of_overflowing() {
    let engine = FormulaEngine::new();
    let chain = addition_chain(2000);
    assert!(chain.len() < EngineConfig::default().max_expression_length);

    let validation = engine.validate(&chain);
    assert!(!validation.is_valid);
    assert_eq!(validation.errors[0].kind, ErrorKind::SyntaxError);
    assert!(validation.errors[0].message.contains("nesting depth"));

    // 校验与执行结论一致
    let result = engine.execute(&chain, &FormulaContext::new());
    assert_eq!(result.value, Value::Null);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ErrorKind::SyntaxError);
}

#[test]
fn test_operator_chain_at_default_depth_limit() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::new();

    // 65 项产生 64 层二元节点，恰好达到默认上限
    let result = engine.execute(&addition_chain(65), &context);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.value, Value::Number(65.0));

    let result = engine.execute(&addition_chain(66), &context);
    assert_eq!(result.value, Value::Null);
    assert_eq!(result.errors[0].kind, ErrorKind::SyntaxError);

    // 混合优先级：乘法子树只临时增加一层
    let mixed = vec!["2*3"; 30].join("+");
    let result = engine.execute(&mixed, &context);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.value, Value::Number(180.0));
}

#[test]
fn test_nested_calls_respect_depth_limit() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"rate": -120}));
    let nested = |depth: usize| format!("{}rate{}", "abs(".repeat(depth), ")".repeat(depth));

    let result = engine.execute(&nested(40), &context);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.value, Value::Number(120.0));

    let deep = nested(100);
    let validation = engine.validate(&deep);
    assert!(!validation.is_valid);
    assert_eq!(validation.errors[0].kind, ErrorKind::SyntaxError);

    let result = engine.execute(&deep, &context);
    assert_eq!(result.value, Value::Null);
    assert_eq!(result.errors[0].kind, ErrorKind::SyntaxError);

    let parens = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    assert_eq!(engine.validate(&parens).errors[0].kind, ErrorKind::SyntaxError);
}

#[test]
fn test_configured_depth_limit_applies_to_chains() {
    let engine = FormulaEngine::with_config(EngineConfig {
        max_nesting_depth: 4,
        ..EngineConfig::default()
    });

    assert!(engine.validate("a + b + c + d + e").is_valid);
    assert!(!engine.validate("a + b + c + d + e + f").is_valid);
    assert!(!engine.validate("abs(abs(abs(abs(abs(x)))))").is_valid);
}

#[test]
fn test_validate_with_context_and_test_data() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"rate": 100}));
    let test_data = vec![
        FormulaContext::from_json(json!({"rate": 100, "occupancy": 0.5})),
        FormulaContext::from_json(json!({"rate": 100})),
    ];

    let report = engine.validate_with_context("rate * (1 + occupancy)", Some(&context), &test_data);

    assert!(!report.is_valid);
    assert_eq!(report.errors[0], "Missing variables: occupancy");
    assert!(report.errors.contains(&"1 test(s) failed".to_string()));

    let results = report.test_results.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].passed);
    assert_eq!(results[0].output, Value::Number(150.0));
    assert!(!results[1].passed);
    assert_eq!(results[1].output, Value::Null);
}

#[test]
fn test_validate_with_context_rejects_huge_results() {
    let engine = FormulaEngine::new();
    let context = FormulaContext::from_json(json!({"rate": 1e8}));

    let report = engine.validate_with_context("rate * 100", Some(&context), &[]);
    assert!(!report.is_valid);
    assert_eq!(report.errors, vec!["Formula produces unreasonably large value"]);
    assert!(report.test_results.is_none());
}

#[test]
fn test_migration_report() {
    let engine = FormulaEngine::new();
    let test_data = vec![
        FormulaContext::from_json(json!({"rate": 100})),
        FormulaContext::from_json(json!({"rate": 0})),
    ];

    let same = engine.validate_migration("rate * 1.1", "rate + rate * 0.1", &test_data);
    assert!(same.compatible);

    let changed = engine.validate_migration("rate * 1.1", "rate * 1.2", &test_data);
    assert!(!changed.compatible);
    assert_eq!(changed.differences.len(), 1);
    assert_eq!(changed.differences[0].new_output.as_f64().map(f64::round), Some(120.0));
    assert!(changed.differences[0].percent_diff.is_some_and(|diff| diff > 9.0));
}

#[test]
fn test_definition_defaults() {
    let engine = FormulaEngine::new();
    let definition: FormulaDefinition = serde_json::from_value(json!({
        "name": "weekend_uplift",
        "category": "pricing",
        "expression": "base_rate * uplift",
        "variables": [
            {"name": "base_rate", "type": "currency"},
            {"name": "uplift", "type": "number", "default": 1.1}
        ]
    }))
    .unwrap();

    let result = engine.execute_definition(&definition, &FormulaContext::from_json(json!({"base_rate": 200})));
    assert!(result.errors.is_empty());
    assert_eq!(result.value.as_f64().map(|v| v.round()), Some(220.0));
}

#[test]
fn test_batch_execution_isolates_failures() {
    let engine = FormulaEngine::new();
    let formulas = vec![
        ("uplift".to_string(), "base_rate * 1.5".to_string()),
        ("broken".to_string(), "base_rate / 0".to_string()),
    ];

    let results = engine.execute_batch(&formulas, &create_pricing_context());
    assert_eq!(results["uplift"].value, Value::Number(300.0));
    assert_eq!(results["broken"].errors[0].kind, ErrorKind::ArithmeticError);
}

#[test]
fn test_analysis_helpers() {
    let engine = FormulaEngine::new();

    let optimized = engine.optimize("rate * (2 * 3)");
    assert_ne!(optimized.optimized_expression, optimized.original_expression);
    assert!(optimized.optimized_expression.contains('6'));
    assert_eq!(optimized.improvements[0], "Folded 1 constant subexpression(s)");

    let complexity = engine.analyze_complexity("a +");
    assert_eq!(complexity.complexity, 0);
    assert!(complexity.suggestions[0].starts_with("Fix syntax errors first"));

    let docs = engine.generate_documentation("max(rate, floor_rate)");
    assert!(docs.starts_with("## Formula Documentation"));
    assert!(docs.contains("- `floor_rate`: [Description needed]"));
}

#[test]
fn test_engine_is_shareable_across_threads() {
    let engine = FormulaEngine::new();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let context = FormulaContext::new().with_variable("x", i as f64);
                engine.execute("x * 2", &context).value
            })
        })
        .collect();

    let values: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        values,
        vec![Value::Number(0.0), Value::Number(2.0), Value::Number(4.0), Value::Number(6.0)]
    );
}

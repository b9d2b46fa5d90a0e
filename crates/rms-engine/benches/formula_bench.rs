//! 公式引擎性能基准测试
//!
//! 针对解析、缓存命中与求值的细粒度性能测试。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rms_engine::formula::{FormulaContext, FormulaEngine};
use rms_shared::config::EngineConfig;
use serde_json::json;
use std::hint::black_box;

const EXPRESSIONS: [(&str, &str); 4] = [
    ("arithmetic", "base_rate * (1 + markup) - discount"),
    ("conditional", "occupancy > 0.85 ? base_rate * 1.2 : base_rate"),
    (
        "functions",
        "ROUND_TO(CLAMP(base_rate * (1 + PERCENT_CHANGE(last_rate, base_rate) / 100), 90, 450), 2)",
    ),
    ("aggregate", "mean(competitor_rates) + std(competitor_rates)"),
];

fn create_context() -> FormulaContext {
    FormulaContext::from_json(json!({
        "base_rate": 180,
        "last_rate": 165,
        "markup": 0.15,
        "discount": 12.5,
        "occupancy": 0.88,
        "competitor_rates": [172, 189, 205, 199, 176]
    }))
}

/// 解析性能（关闭缓存）
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula_parse");
    let engine = FormulaEngine::with_config(EngineConfig {
        cache_enabled: false,
        ..EngineConfig::default()
    });

    for (name, expression) in EXPRESSIONS {
        group.bench_with_input(BenchmarkId::from_parameter(name), expression, |b, expr| {
            b.iter(|| engine.validate(black_box(expr)))
        });
    }

    group.finish();
}

/// 执行性能：缓存命中与未命中对比
fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula_execute");
    let context = create_context();
    let cached = FormulaEngine::new();
    let uncached = FormulaEngine::with_config(EngineConfig {
        cache_enabled: false,
        ..EngineConfig::default()
    });

    for (name, expression) in EXPRESSIONS {
        group.bench_with_input(BenchmarkId::new("cached", name), expression, |b, expr| {
            b.iter(|| cached.execute(black_box(expr), black_box(&context)))
        });
        group.bench_with_input(BenchmarkId::new("uncached", name), expression, |b, expr| {
            b.iter(|| uncached.execute(black_box(expr), black_box(&context)))
        });
    }

    group.finish();
}

/// 批量执行性能
fn bench_batch(c: &mut Criterion) {
    let engine = FormulaEngine::new();
    let context = create_context();
    let formulas: Vec<(String, String)> = EXPRESSIONS
        .iter()
        .map(|(name, expression)| (name.to_string(), expression.to_string()))
        .collect();

    c.bench_function("formula_execute_batch", |b| {
        b.iter(|| engine.execute_batch(black_box(&formulas), black_box(&context)))
    });
}

criterion_group!(benches, bench_parse, bench_execute, bench_batch);
criterion_main!(benches);

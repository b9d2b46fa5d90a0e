//! 配置与可观测性集成测试
//!
//! 测试配置文件分层加载和指标快照渲染。

use std::fs;
use std::path::PathBuf;

// ============================================================================
// 配置加载测试
// ============================================================================

mod config_tests {
    use super::*;
    use rms_shared::config::AppConfig;

    /// 在临时目录下写入配置文件
    fn write_config_dir(name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rms-shared-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_service_file_overrides_default_file() {
        let dir = write_config_dir(
            "layering",
            &[
                (
                    "default.toml",
                    r#"
                    [engine]
                    cache_capacity = 64
                    max_nesting_depth = 16

                    [observability]
                    log_level = "debug"
                    "#,
                ),
                (
                    "rms-engine.toml",
                    r#"
                    [engine]
                    cache_capacity = 256
                    "#,
                ),
            ],
        );

        let config = AppConfig::load_from_dir("rms-engine", dir.to_str().unwrap()).unwrap();

        assert_eq!(config.engine.cache_capacity, 256);
        assert_eq!(config.engine.max_nesting_depth, 16);
        // 未配置的字段保持默认值
        assert_eq!(config.engine.max_expression_length, 4096);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.service_name, "rms-engine");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let dir = write_config_dir(
            "invalid",
            &[(
                "default.toml",
                r#"
                [engine]
                cache_enabled = "sometimes"
                "#,
            )],
        );

        assert!(AppConfig::load_from_dir("rms-engine", dir.to_str().unwrap()).is_err());

        fs::remove_dir_all(dir).ok();
    }
}

// ============================================================================
// 指标快照测试
// ============================================================================

mod metrics_tests {
    use rms_shared::observability::ObservabilityConfig;
    use rms_shared::observability::metrics::{
        init, record_formula_execution, record_rule_action, record_rule_evaluation,
    };

    #[test]
    fn test_recorded_metrics_appear_in_snapshot() {
        let config = ObservabilityConfig::default().with_service_name("rms-engine-test");
        // recorder 全局只能安装一次，本文件中仅此处安装
        let handle = init(&config).unwrap();

        record_formula_execution("success", 0.0004);
        record_formula_execution("ArithmeticError", 0.0002);
        record_rule_evaluation("modifier", "matched", 0.003);
        record_rule_evaluation("trigger", "error", 0.001);
        record_rule_action("setValue", true);
        record_rule_action("custom", false);

        let snapshot = handle.render();
        assert!(snapshot.contains("rms_formula_executions_total"));
        assert!(snapshot.contains(r#"outcome="ArithmeticError""#));
        assert!(snapshot.contains("rms_rule_evaluations_total"));
        assert!(snapshot.contains(r#"status="error""#));
        assert!(snapshot.contains(r#"action_type="custom""#));
        assert!(snapshot.contains("service_starts_total"));
    }
}

//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 公式与规则引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 单个表达式允许的最大字符数
    pub max_expression_length: usize,
    /// 表达式允许的最大嵌套深度（括号、函数调用、一元运算）
    pub max_nesting_depth: usize,
    /// 是否启用解析结果缓存
    pub cache_enabled: bool,
    /// 缓存条目上限，达到上限后新表达式不再入缓存
    pub cache_capacity: usize,
    /// 带上下文校验时允许的结果绝对值上限
    pub result_magnitude_limit: f64,
    /// 超过该耗时（毫秒）的公式在校验时给出警告
    pub slow_formula_threshold_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_expression_length: 4096,
            max_nesting_depth: 64,
            cache_enabled: true,
            cache_capacity: 1024,
            result_magnitude_limit: 1e9,
            slow_formula_threshold_ms: 100.0,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub engine: EngineConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RMS_ 前缀，层级用双下划线分隔，如 RMS_ENGINE__CACHE_ENABLED -> engine.cache_enabled）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from_dir(service_name, &config_dir)
    }

    /// 从指定目录加载配置
    pub fn load_from_dir(service_name: &str, config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("RMS_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // 默认配置
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .set_default("observability.service_name", service_name)?
            // 加载默认配置文件
            .add_source(File::from(Path::new(config_dir).join("default.toml")).required(false))
            // 加载环境特定配置
            .add_source(
                File::from(Path::new(config_dir).join(format!("{}.toml", env))).required(false),
            )
            // 加载服务特定配置（如 rms-engine.toml）
            .add_source(
                File::from(Path::new(config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            // 环境变量覆盖
            .add_source(
                Environment::with_prefix("RMS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

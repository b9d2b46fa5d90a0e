//! 规则动作执行
//!
//! 动作直接作用于评估过程中的工作数据，后续规则可以看到前面规则写入的值。
//! 引擎不做任何网络 I/O：webhook 动作只生成分发记录，由调用方负责发送。

use super::models::{ActionExecutionResult, RuleAction, RuleContext};
use crate::error::{EngineError, Result};
use crate::formula::{FormulaContext, FormulaEngine};
use crate::value::Value;
use chrono::Utc;
use regex::{Captures, Regex};
use rms_shared::observability::metrics::record_rule_action;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("valid placeholder pattern"));

/// 自定义动作处理器
///
/// 通过 [`HandlerRegistry`] 按名称注册，由 `custom` 动作调用。
#[cfg_attr(test, mockall::automock)]
pub trait ActionHandler: Send + Sync {
    /// 注册名称，对应动作中的 `customHandler`
    fn name(&self) -> &str;

    /// 处理动作
    ///
    /// * `params` - 动作中配置的参数，未配置时为 Null
    /// * `data` - 当前工作数据
    fn handle(&self, params: &Value, data: &Value) -> Result<Value>;
}

/// 自定义处理器注册表
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同名处理器会被替换
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let name = handler.name().to_string();
        debug!(handler = %name, "注册自定义动作处理器");
        self.handlers.insert(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// 已注册的处理器名称（已排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// 动作执行器
#[derive(Clone)]
pub struct ActionExecutor {
    formula: FormulaEngine,
    handlers: HandlerRegistry,
}

impl ActionExecutor {
    pub fn new(formula: FormulaEngine) -> Self {
        Self {
            formula,
            handlers: HandlerRegistry::new(),
        }
    }

    pub(crate) fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// 执行单个动作，失败记录为 ActionError 而不是中断规则
    pub fn execute(
        &self,
        action: &RuleAction,
        data: &mut Value,
        context: &RuleContext,
    ) -> ActionExecutionResult {
        let action_type = action.action_type();

        let outcome = match action {
            RuleAction::SetValue { target, value } => Self::set_value(target, value, data),
            RuleAction::Calculate { formula, target } => self.calculate(formula, target, data),
            RuleAction::Alert { message } => {
                let message = interpolate(message.as_deref().unwrap_or("Rule triggered"), data);
                warn!(alert = %message, "[ALERT] 规则告警");
                Ok(Self::notice(message, context))
            }
            RuleAction::Log { message } => {
                let message = interpolate(message.as_deref().unwrap_or("Rule executed"), data);
                info!(message = %message, "[RULE LOG] 规则日志");
                Ok(Self::notice(message, context))
            }
            RuleAction::Webhook {
                url,
                method,
                headers,
            } => Self::webhook(action, url, method, headers, data, context),
            RuleAction::Custom {
                custom_handler,
                params,
            } => self.custom(custom_handler, params, data),
        };

        record_rule_action(action_type, outcome.is_ok());

        match outcome {
            Ok(result) => ActionExecutionResult {
                action_type: action_type.to_string(),
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                let error = match e {
                    EngineError::Action(_) => e,
                    other => EngineError::Action(other.to_string()),
                };
                warn!(action_type, error = %error, "规则动作执行失败");
                ActionExecutionResult {
                    action_type: action_type.to_string(),
                    success: false,
                    result: None,
                    error: Some(error.into()),
                }
            }
        }
    }

    fn set_value(target: &Option<String>, value: &Option<Value>, data: &mut Value) -> Result<Value> {
        let target = required(target.as_deref(), "setValue action requires a target field")?;
        let value = value
            .as_ref()
            .ok_or_else(|| EngineError::Action("setValue action requires a value".to_string()))?;

        data.set_path(target, value.clone());

        Ok(object([
            ("field", Value::from(target)),
            ("value", value.clone()),
        ]))
    }

    fn calculate(
        &self,
        formula: &Option<String>,
        target: &Option<String>,
        data: &mut Value,
    ) -> Result<Value> {
        let formula = required(formula.as_deref(), "calculate action requires a formula")?;

        let result = self.formula.execute(formula, &formula_context(data));
        if !result.errors.is_empty() {
            let messages: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            return Err(EngineError::Action(format!(
                "Formula execution failed: {}",
                messages.join(", ")
            )));
        }

        if let Some(target) = target.as_deref().filter(|t| !t.trim().is_empty()) {
            data.set_path(target, result.value.clone());
        }

        Ok(object([
            ("formula", Value::from(formula)),
            ("result", result.value),
            ("executionTime", Value::from(result.execution_time)),
        ]))
    }

    fn webhook(
        action: &RuleAction,
        url: &Option<String>,
        method: &Option<String>,
        headers: &Option<BTreeMap<String, String>>,
        data: &Value,
        context: &RuleContext,
    ) -> Result<Value> {
        let url = required(url.as_deref(), "webhook action requires a URL")?;

        let mut all_headers = BTreeMap::new();
        all_headers.insert(
            "Content-Type".to_string(),
            Value::from("application/json"),
        );
        for (name, value) in headers.iter().flatten() {
            all_headers.insert(name.clone(), Value::from(value.as_str()));
        }

        let rule_action = serde_json::to_value(action).map(Value::from)?;
        let body = object([
            ("ruleAction", rule_action),
            (
                "context",
                object([
                    ("data", data.clone()),
                    ("metadata", context.metadata.clone().unwrap_or_default()),
                    ("timestamp", Value::from(timestamp(context))),
                ]),
            ),
        ]);

        debug!(url, "生成 webhook 分发记录");

        Ok(object([
            ("url", Value::from(url)),
            ("method", Value::from(method.as_deref().unwrap_or("POST"))),
            ("headers", Value::Map(all_headers)),
            ("body", body),
        ]))
    }

    fn custom(&self, handler: &Option<String>, params: &Option<Value>, data: &Value) -> Result<Value> {
        let name = required(handler.as_deref(), "custom action requires a handler name")?;

        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| EngineError::Action(format!("Custom handler not found: {}", name)))?;

        let params = params.clone().unwrap_or_default();
        handler
            .handle(&params, data)
            .map_err(|e| EngineError::Action(format!("Custom handler '{}' failed: {}", name, e)))
    }

    fn notice(message: String, context: &RuleContext) -> Value {
        object([
            ("message", Value::from(message)),
            ("timestamp", Value::from(timestamp(context))),
        ])
    }
}

fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::Action(message.to_string()))
}

fn object<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

fn timestamp(context: &RuleContext) -> String {
    context.timestamp.unwrap_or_else(Utc::now).to_rfc3339()
}

/// 以工作数据的顶层字段作为公式变量
pub(crate) fn formula_context(data: &Value) -> FormulaContext {
    match data {
        Value::Map(map) => FormulaContext {
            variables: map.clone(),
            parameters: BTreeMap::new(),
        },
        _ => FormulaContext::new(),
    }
}

/// 替换消息中的 `{{path}}` 占位符，路径不存在时保留原文
pub fn interpolate(template: &str, data: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match data.get_path(caps[1].trim()) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn data() -> Value {
        Value::from(json!({
            "hotel": "Harbor View",
            "room": {"type": "suite", "rate": 250},
            "occupancy": 0.92
        }))
    }

    #[test]
    fn test_interpolate() {
        let data = data();
        assert_eq!(
            interpolate("{{hotel}}: {{ room.type }} at {{room.rate}}", &data),
            "Harbor View: suite at 250"
        );
        assert_eq!(interpolate("missing {{nope}}", &data), "missing {{nope}}");
    }

    #[test]
    fn test_set_value_and_calculate() {
        let executor = ActionExecutor::new(FormulaEngine::new());
        let context = RuleContext::default();
        let mut data = data();

        let result = executor.execute(&RuleAction::set_value("room.markup", 0.1), &mut data, &context);
        assert!(result.success);
        assert_eq!(data.get_path("room.markup"), Some(&Value::Number(0.1)));

        let result = executor.execute(
            &RuleAction::calculate("room.rate * (1 + room.markup)", Some("room.final_rate")),
            &mut data,
            &context,
        );
        assert!(result.success, "{:?}", result.error);
        assert_eq!(data.get_path("room.final_rate"), Some(&Value::Number(275.0)));
    }

    #[test]
    fn test_failures_are_action_errors() {
        let executor = ActionExecutor::new(FormulaEngine::new());
        let context = RuleContext::default();
        let mut data = data();

        let result = executor.execute(&RuleAction::calculate("room.rate / 0", None), &mut data, &context);
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ActionError);
        assert!(error.message.starts_with("Formula execution failed"));

        let result = executor.execute(&RuleAction::custom("unknown", None), &mut data, &context);
        assert_eq!(
            result.error.unwrap().message,
            "Custom handler not found: unknown"
        );
    }

    #[test]
    fn test_webhook_dispatch_record() {
        let executor = ActionExecutor::new(FormulaEngine::new());
        let context = RuleContext::default();
        let mut data = data();

        let action: RuleAction = serde_json::from_value(json!({
            "type": "webhook",
            "url": "https://ops.example.com/rates",
            "headers": {"X-Token": "abc"}
        }))
        .unwrap();

        let result = executor.execute(&action, &mut data, &context);
        let record = result.result.unwrap();

        assert_eq!(record.get_path("method"), Some(&Value::from("POST")));
        assert_eq!(
            record.get_path("headers.Content-Type"),
            Some(&Value::from("application/json"))
        );
        assert_eq!(record.get_path("headers.X-Token"), Some(&Value::from("abc")));
        assert_eq!(
            record.get_path("body.context.data.hotel"),
            Some(&Value::from("Harbor View"))
        );
    }

    #[test]
    fn test_custom_handler() {
        let mut handler = MockActionHandler::new();
        handler.expect_name().return_const("notify".to_string());
        handler
            .expect_handle()
            .withf(|params, _| params.get_path("channel") == Some(&Value::from("ops")))
            .times(1)
            .returning(|_, data| Ok(data.get_path("occupancy").cloned().unwrap_or_default()));

        let mut executor = ActionExecutor::new(FormulaEngine::new());
        executor.handlers_mut().register(Arc::new(handler));
        assert!(executor.handlers().contains("notify"));

        let action = RuleAction::custom("notify", Some(Value::from(json!({"channel": "ops"}))));
        let result = executor.execute(&action, &mut data(), &RuleContext::default());

        assert!(result.success);
        assert_eq!(result.result, Some(Value::Number(0.92)));
    }

    #[test]
    fn test_custom_handler_error() {
        let mut handler = MockActionHandler::new();
        handler.expect_name().return_const("fail".to_string());
        handler
            .expect_handle()
            .returning(|_, _| Err(EngineError::InvalidArgument("bad params".to_string())));

        let mut executor = ActionExecutor::new(FormulaEngine::new());
        executor.handlers_mut().register(Arc::new(handler));

        let result = executor.execute(
            &RuleAction::custom("fail", None),
            &mut data(),
            &RuleContext::default(),
        );
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ActionError);
        assert_eq!(error.message, "Custom handler 'fail' failed: bad params");
    }
}

//! 规则引擎
//!
//! - 条件组短路求值，叶子条件与表达式条件混合
//! - 动作在共享工作数据上按顺序执行
//! - 规则集校验（结构、参数、冲突与循环依赖）

pub mod actions;
pub mod compiler;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod priority;

pub use actions::{ActionExecutor, ActionHandler, HandlerRegistry};
pub use compiler::RuleCompiler;
pub use engine::RulesEngine;
pub use evaluator::ConditionEvaluator;
pub use executor::RuleExecutor;
pub use models::{
    ActionExecutionResult, Condition, ConditionGroup, ConditionNode, DataType, EvaluationOptions,
    Rule, RuleAction, RuleConditions, RuleContext, RuleEvaluationResult, RuleSetEvaluationResult,
    RuleSetValidation, RuleStatus, RuleType, RuleValidationError, ValidationWarning, WarningKind,
};
pub use priority::{ConflictKind, RuleConflict, RulePriority};

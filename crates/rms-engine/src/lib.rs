//! 收益管理公式与规则引擎
//!
//! 提供两个协作的进程内求值器：
//! - 公式引擎：校验并执行单个标量表达式，返回值、耗时、诊断信息与实际访问的变量
//! - 规则引擎：按顺序评估条件 → 动作规则，输出每条规则的决策记录与汇总
//!
//! 两个引擎都是显式构造的值，规则引擎通过注入获得公式引擎。

pub mod error;
pub mod formula;
pub mod operators;
pub mod rules;
pub mod value;

pub use error::{Diagnostic, EngineError, ErrorKind, Result};
pub use formula::{FormulaContext, FormulaEngine, FormulaResult, FormulaValidation};
pub use operators::{ConditionOperator, LogicalOperator};
pub use rules::{EvaluationOptions, Rule, RuleContext, RuleSetEvaluationResult, RulesEngine};
pub use value::Value;

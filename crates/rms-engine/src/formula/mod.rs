//! 公式引擎
//!
//! 表达式经词法分析、解析得到语法树，再对上下文求值。
//! 函数调用限定在内置白名单内，求值过程确定且不产生副作用。

pub mod analyzer;
pub mod ast;
pub mod cache;
pub mod engine;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod models;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use cache::{CacheStats, FormulaCache};
pub use engine::FormulaEngine;
pub use models::{
    ComplexityLevel, ComplexityReport, FormulaContext, FormulaDefinition, FormulaParseResult,
    FormulaResult, FormulaTestResult, FormulaValidation, FormulaValidationReport, FormulaVariable,
    MigrationDifference, MigrationReport, OptimizationResult, VariableType,
};
pub use parser::{ParseLimits, parse};

//! 公式求值器
//!
//! 遍历语法树求值，并记录求值过程中实际访问的变量。
//! `&&`、`||`、`?:` 以及 `if`、`and`、`or` 短路，未求值的分支不计入已用变量。

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::functions;
use super::models::FormulaContext;
use crate::error::{EngineError, Result};
use crate::value::Value;
use std::collections::BTreeSet;

pub struct Evaluator<'a> {
    context: &'a FormulaContext,
    used_variables: BTreeSet<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a FormulaContext) -> Self {
        Self {
            context,
            used_variables: BTreeSet::new(),
        }
    }

    /// 已访问的变量
    pub fn used_variables(&self) -> &BTreeSet<String> {
        &self.used_variables
    }

    pub fn into_used_variables(self) -> BTreeSet<String> {
        self.used_variables
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal { value } => Ok(value.clone()),
            Expr::Variable { name } => self.variable(name),
            Expr::List { items } => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                unary(*op, &value)
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate_bool(condition)? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn evaluate_bool(&mut self, expr: &Expr) -> Result<bool> {
        let value = self.evaluate(expr)?;
        functions::expect_bool(&value)
    }

    fn variable(&mut self, name: &str) -> Result<Value> {
        self.used_variables.insert(name.to_string());
        self.context
            .lookup(name)
            .cloned()
            .ok_or_else(|| EngineError::UndefinedVariable(name.to_string()))
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
        // 逻辑运算短路
        match op {
            BinaryOp::And => {
                let result = self.evaluate_bool(left)? && self.evaluate_bool(right)?;
                return Ok(Value::Bool(result));
            }
            BinaryOp::Or => {
                let result = self.evaluate_bool(left)? || self.evaluate_bool(right)?;
                return Ok(Value::Bool(result));
            }
            _ => {}
        }

        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;
        binary(op, &left, &right)
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value> {
        match name {
            "if" => match args {
                [condition, then_branch, else_branch] => {
                    if self.evaluate_bool(condition)? {
                        self.evaluate(then_branch)
                    } else {
                        self.evaluate(else_branch)
                    }
                }
                _ => Err(arity_error(name, "3", args.len())),
            },
            "and" => {
                for arg in args {
                    if !self.evaluate_bool(arg)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "or" => {
                for arg in args {
                    if self.evaluate_bool(arg)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            _ => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>>>()?;
                functions::call(name, &values)
            }
        }
    }
}

fn arity_error(function: &str, expected: &str, actual: usize) -> EngineError {
    EngineError::Arity {
        function: function.to_string(),
        expected: expected.to_string(),
        actual,
    }
}

fn expect_number(op: impl std::fmt::Display, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        EngineError::type_mismatch(format!("number operand for '{}'", op), value.type_name())
    })
}

pub(crate) fn unary(op: UnaryOp, value: &Value) -> Result<Value> {
    match op {
        UnaryOp::Neg => functions::number(-expect_number(op, value)?),
        UnaryOp::Plus => functions::number(expect_number(op, value)?),
        UnaryOp::Not => functions::expect_bool(value).map(|b| Value::Bool(!b)),
    }
}

/// 非短路二元运算
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => functions::number(a + b),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(EngineError::type_mismatch(
                "two numbers or two strings for '+'",
                format!("{} and {}", left.type_name(), right.type_name()),
            )),
        },
        BinaryOp::Sub => functions::number(expect_number(op, left)? - expect_number(op, right)?),
        BinaryOp::Mul => functions::number(expect_number(op, left)? * expect_number(op, right)?),
        BinaryOp::Div => functions::divide(expect_number(op, left)?, expect_number(op, right)?),
        BinaryOp::Mod => functions::modulo(expect_number(op, left)?, expect_number(op, right)?),
        BinaryOp::Pow => {
            functions::number(expect_number(op, left)?.powf(expect_number(op, right)?))
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => functions::compare(left, right).map(|o| Value::Bool(o.is_lt())),
        BinaryOp::LtEq => functions::compare(left, right).map(|o| Value::Bool(o.is_le())),
        BinaryOp::Gt => functions::compare(left, right).map(|o| Value::Bool(o.is_gt())),
        BinaryOp::GtEq => functions::compare(left, right).map(|o| Value::Bool(o.is_ge())),
        BinaryOp::And | BinaryOp::Or => {
            let a = functions::expect_bool(left)?;
            let b = functions::expect_bool(right)?;
            Ok(Value::Bool(if op == BinaryOp::And { a && b } else { a || b }))
        }
    }
}

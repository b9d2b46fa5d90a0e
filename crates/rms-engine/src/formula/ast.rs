//! 公式抽象语法树

use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neg => write!(f, "-"),
            Self::Plus => write!(f, "+"),
            Self::Not => write!(f, "!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    /// 优先级，数值越大结合越紧
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Or => 2,
            Self::And => 3,
            Self::Eq | Self::NotEq => 4,
            Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => 5,
            Self::Add | Self::Sub => 6,
            Self::Mul | Self::Div | Self::Mod => 7,
            Self::Pow => 9,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, Self::Pow)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
        };
        write!(f, "{}", s)
    }
}

const CONDITIONAL_PRECEDENCE: u8 = 1;
const UNARY_PRECEDENCE: u8 = 8;
const PRIMARY_PRECEDENCE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expr {
    Literal {
        value: Value,
    },
    Variable {
        name: String,
    },
    List {
        items: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn conditional(condition: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    /// 表达式中出现的全部标识符
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Self::Variable { name } = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// 表达式中调用的全部函数
    pub fn functions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Self::Call { name, .. } = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// 条件分支（`if(...)` 与 `?:`）的总数
    pub fn conditional_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |expr| {
            if expr.is_conditional() {
                count += 1;
            }
        });
        count
    }

    /// 条件分支的最大嵌套深度
    pub fn conditional_depth(&self) -> usize {
        let own = usize::from(self.is_conditional());
        own + self
            .children()
            .into_iter()
            .map(Expr::conditional_depth)
            .max()
            .unwrap_or(0)
    }

    /// 二元与一元运算的总数
    pub fn operation_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |expr| {
            if matches!(expr, Self::Binary { .. } | Self::Unary { .. }) {
                count += 1;
            }
        });
        count
    }

    /// 是否仅由字面量构成
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Literal { .. } => true,
            Self::Variable { .. } => false,
            _ => self.children().into_iter().all(Expr::is_constant),
        }
    }

    /// 结果是否可能为布尔值
    ///
    /// 变量与函数调用无法静态确定类型，视为可能。
    pub fn may_yield_boolean(&self) -> bool {
        match self {
            Self::Literal { value } => matches!(value, Value::Bool(_)),
            Self::Variable { .. } => true,
            Self::List { .. } => false,
            Self::Unary { op, .. } => *op == UnaryOp::Not,
            Self::Binary { op, .. } => !matches!(
                op,
                BinaryOp::Add
                    | BinaryOp::Sub
                    | BinaryOp::Mul
                    | BinaryOp::Div
                    | BinaryOp::Mod
                    | BinaryOp::Pow
            ),
            Self::Conditional {
                then_branch,
                else_branch,
                ..
            } => then_branch.may_yield_boolean() || else_branch.may_yield_boolean(),
            Self::Call { name, args } if name == "if" => {
                args.iter().skip(1).any(Expr::may_yield_boolean)
            }
            Self::Call { .. } => true,
        }
    }

    fn is_conditional(&self) -> bool {
        match self {
            Self::Conditional { .. } => true,
            Self::Call { name, .. } => name == "if",
            _ => false,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Literal { .. } | Self::Variable { .. } => Vec::new(),
            Self::List { items } => items.iter().collect(),
            Self::Call { args, .. } => args.iter().collect(),
            Self::Unary { operand, .. } => vec![operand],
            Self::Binary { left, right, .. } => vec![left, right],
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![condition, then_branch, else_branch],
        }
    }

    fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Conditional { .. } => CONDITIONAL_PRECEDENCE,
            Self::Binary { op, .. } => op.precedence(),
            Self::Unary { .. } => UNARY_PRECEDENCE,
            Self::Literal { value } if value.as_f64().is_some_and(|n| n < 0.0) => {
                UNARY_PRECEDENCE
            }
            _ => PRIMARY_PRECEDENCE,
        }
    }

    /// 子表达式优先级不足时加括号输出
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

fn fmt_literal(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => {
            let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
            write!(f, "'{}'", escaped)
        }
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_literal(item, f)?;
            }
            write!(f, "]")
        }
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal { value } => fmt_literal(value, f),
            Self::Variable { name } => write!(f, "{}", name),
            Self::List { items } => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Unary { op, operand } => {
                write!(f, "{}", op)?;
                operand.fmt_operand(f, UNARY_PRECEDENCE)
            }
            Self::Binary { op, left, right } => {
                let prec = op.precedence();
                let (left_min, right_min) = if op.is_right_associative() {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                left.fmt_operand(f, left_min)?;
                write!(f, " {} ", op)?;
                // `2 ^ -1` 的指数允许一元表达式
                if *op == BinaryOp::Pow && matches!(**right, Self::Unary { .. }) {
                    write!(f, "{}", right)
                } else {
                    right.fmt_operand(f, right_min)
                }
            }
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.fmt_operand(f, CONDITIONAL_PRECEDENCE + 1)?;
                write!(f, " ? {} : ", then_branch)?;
                else_branch.fmt_operand(f, CONDITIONAL_PRECEDENCE)
            }
            Self::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

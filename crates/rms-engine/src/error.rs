//! 引擎错误类型
//!
//! 所有引擎内部错误统一为 [`EngineError`]，对外通过 [`Diagnostic`] 以
//! `"<Kind>: <message>"` 字符串的形式出现在结果对象中。

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    SyntaxError,
    ReferenceError,
    ArithmeticError,
    TypeError,
    ActionError,
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SyntaxError => "SyntaxError",
            Self::ReferenceError => "ReferenceError",
            Self::ArithmeticError => "ArithmeticError",
            Self::TypeError => "TypeError",
            Self::ActionError => "ActionError",
            Self::InvalidArgument => "InvalidArgument",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("{message} (position {position})")]
    Syntax { position: usize, message: String },

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' expects {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("{0}")]
    Arithmetic(String),

    #[error("Expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("{0}")]
    Action(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Invalid JSON: {0}")]
    Json(String),
}

impl EngineError {
    /// 构造语法错误
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// 构造类型不匹配错误
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// 错误所属类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } | Self::UnknownFunction(_) | Self::Arity { .. } => {
                ErrorKind::SyntaxError
            }
            Self::UndefinedVariable(_) => ErrorKind::ReferenceError,
            Self::DivisionByZero | Self::Arithmetic(_) => ErrorKind::ArithmeticError,
            Self::TypeMismatch { .. } => ErrorKind::TypeError,
            Self::Action(_) => ErrorKind::ActionError,
            Self::InvalidArgument(_) | Self::Json(_) => ErrorKind::InvalidArgument,
        }
    }

    /// 转换为对外诊断信息
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.kind(), self.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// 结果对象中携带的诊断信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<EngineError> for Diagnostic {
    fn from(err: EngineError) -> Self {
        err.to_diagnostic()
    }
}

impl Serialize for Diagnostic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::syntax(3, "x").kind(), ErrorKind::SyntaxError);
        assert_eq!(
            EngineError::UnknownFunction("eval".into()).kind(),
            ErrorKind::SyntaxError
        );
        assert_eq!(
            EngineError::UndefinedVariable("a".into()).kind(),
            ErrorKind::ReferenceError
        );
        assert_eq!(EngineError::DivisionByZero.kind(), ErrorKind::ArithmeticError);
        assert_eq!(
            EngineError::type_mismatch("number", "string").kind(),
            ErrorKind::TypeError
        );
    }

    #[test]
    fn test_diagnostic_serializes_as_string() {
        let diagnostic = EngineError::DivisionByZero.to_diagnostic();
        let json = serde_json::to_value(&diagnostic).unwrap();

        assert_eq!(json, serde_json::json!("ArithmeticError: Division by zero"));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: EngineError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().starts_with("Invalid JSON"));
    }
}

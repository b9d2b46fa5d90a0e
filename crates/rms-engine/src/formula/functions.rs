//! 内置函数白名单
//!
//! 只有登记在 [`BUILTIN_FUNCTIONS`] 中的函数可以出现在公式里，参数个数在解析阶段检查。
//! `if`、`and`、`or` 为惰性求值，由求值器直接处理，其余函数在参数求值后调用 [`call`]。

use crate::error::{EngineError, Result};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, Utc};

/// 函数签名
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` 表示可变参数
    pub max_args: Option<usize>,
    pub lazy: bool,
    pub description: &'static str,
}

impl FunctionSpec {
    const fn fixed(name: &'static str, args: usize, description: &'static str) -> Self {
        Self {
            name,
            min_args: args,
            max_args: Some(args),
            lazy: false,
            description,
        }
    }

    const fn range(name: &'static str, min: usize, max: usize, description: &'static str) -> Self {
        Self {
            name,
            min_args: min,
            max_args: Some(max),
            lazy: false,
            description,
        }
    }

    const fn variadic(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            min_args: 1,
            max_args: None,
            lazy: false,
            description,
        }
    }

    const fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// 检查参数个数
    pub fn check_arity(&self, actual: usize) -> Result<()> {
        let ok = actual >= self.min_args && self.max_args.is_none_or(|max| actual <= max);
        if ok {
            return Ok(());
        }

        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };

        Err(EngineError::Arity {
            function: self.name.to_string(),
            expected,
            actual,
        })
    }
}

pub const BUILTIN_FUNCTIONS: &[FunctionSpec] = &[
    // 数学
    FunctionSpec::fixed("abs", 1, "Returns absolute value"),
    FunctionSpec::fixed("ceil", 1, "Rounds up to nearest integer"),
    FunctionSpec::fixed("floor", 1, "Rounds down to nearest integer"),
    FunctionSpec::range("round", 1, 2, "Rounds to nearest integer or to n decimals"),
    FunctionSpec::fixed("sqrt", 1, "Square root"),
    FunctionSpec::fixed("exp", 1, "Exponential function"),
    FunctionSpec::range("log", 1, 2, "Natural logarithm, or logarithm in the given base"),
    FunctionSpec::fixed("log10", 1, "Base-10 logarithm"),
    FunctionSpec::fixed("sin", 1, "Sine"),
    FunctionSpec::fixed("cos", 1, "Cosine"),
    FunctionSpec::fixed("tan", 1, "Tangent"),
    FunctionSpec::fixed("pow", 2, "Power/exponentiation"),
    FunctionSpec::fixed("mod", 2, "Modulus"),
    // 聚合
    FunctionSpec::variadic("min", "Returns the minimum value"),
    FunctionSpec::variadic("max", "Returns the maximum value"),
    FunctionSpec::variadic("sum", "Calculates the sum of values"),
    FunctionSpec::variadic("mean", "Calculates the average"),
    FunctionSpec::variadic("median", "Calculates the median"),
    FunctionSpec::variadic("prod", "Calculates the product of values"),
    FunctionSpec::variadic("std", "Sample standard deviation"),
    FunctionSpec::variadic("variance", "Sample variance"),
    // 算术
    FunctionSpec::fixed("add", 2, "Addition"),
    FunctionSpec::fixed("subtract", 2, "Subtraction"),
    FunctionSpec::fixed("multiply", 2, "Multiplication"),
    FunctionSpec::fixed("divide", 2, "Division"),
    // 比较
    FunctionSpec::fixed("equal", 2, "Tests equality"),
    FunctionSpec::fixed("unequal", 2, "Tests inequality"),
    FunctionSpec::fixed("smaller", 2, "Tests a < b"),
    FunctionSpec::fixed("larger", 2, "Tests a > b"),
    FunctionSpec::fixed("smallerEq", 2, "Tests a <= b"),
    FunctionSpec::fixed("largerEq", 2, "Tests a >= b"),
    // 逻辑
    FunctionSpec::fixed("if", 3, "Conditional logic (if condition then A else B)").lazy(),
    FunctionSpec {
        name: "and",
        min_args: 2,
        max_args: None,
        lazy: true,
        description: "Logical AND",
    },
    FunctionSpec {
        name: "or",
        min_args: 2,
        max_args: None,
        lazy: true,
        description: "Logical OR",
    },
    FunctionSpec::fixed("not", 1, "Logical NOT"),
    // 收益管理辅助函数
    FunctionSpec::fixed("PERCENT_CHANGE", 2, "Percentage change from old to new (0 when old is 0)"),
    FunctionSpec::fixed("CLAMP", 3, "Limits a value to the range [min, max]"),
    FunctionSpec::fixed("ROUND_TO", 2, "Rounds a value to the given number of decimals"),
    FunctionSpec::fixed("DAYS_BETWEEN", 2, "Whole days between two dates, rounded up"),
];

/// 查找函数签名
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    BUILTIN_FUNCTIONS.iter().find(|spec| spec.name == name)
}

pub fn is_allowed(name: &str) -> bool {
    lookup(name).is_some()
}

/// 函数说明（用于生成文档）
pub fn describe(name: &str) -> &'static str {
    lookup(name)
        .map(|spec| spec.description)
        .unwrap_or("Mathematical function")
}

/// 调用非惰性函数
pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "abs" => number(number_arg(name, args, 0)?.abs()),
        "ceil" => number(number_arg(name, args, 0)?.ceil()),
        "floor" => number(number_arg(name, args, 0)?.floor()),
        "round" => {
            let x = number_arg(name, args, 0)?;
            match args.get(1) {
                Some(_) => number(round_decimals(x, decimals_arg(name, args, 1)?)),
                None => number(x.round()),
            }
        }
        "sqrt" => number(number_arg(name, args, 0)?.sqrt()),
        "exp" => number(number_arg(name, args, 0)?.exp()),
        "log" => {
            let x = number_arg(name, args, 0)?;
            match args.get(1) {
                Some(_) => number(x.ln() / number_arg(name, args, 1)?.ln()),
                None => number(x.ln()),
            }
        }
        "log10" => number(number_arg(name, args, 0)?.log10()),
        "sin" => number(number_arg(name, args, 0)?.sin()),
        "cos" => number(number_arg(name, args, 0)?.cos()),
        "tan" => number(number_arg(name, args, 0)?.tan()),
        "pow" => number(number_arg(name, args, 0)?.powf(number_arg(name, args, 1)?)),
        "mod" => modulo(number_arg(name, args, 0)?, number_arg(name, args, 1)?),

        "min" => {
            let values = non_empty(name, flatten_numbers(name, args)?)?;
            number(values.into_iter().fold(f64::INFINITY, f64::min))
        }
        "max" => {
            let values = non_empty(name, flatten_numbers(name, args)?)?;
            number(values.into_iter().fold(f64::NEG_INFINITY, f64::max))
        }
        "sum" => number(flatten_numbers(name, args)?.into_iter().sum()),
        "prod" => number(flatten_numbers(name, args)?.into_iter().product()),
        "mean" => {
            let values = non_empty(name, flatten_numbers(name, args)?)?;
            number(mean(&values))
        }
        "median" => {
            let values = non_empty(name, flatten_numbers(name, args)?)?;
            number(median(values))
        }
        "variance" => {
            let values = non_empty(name, flatten_numbers(name, args)?)?;
            number(variance(&values))
        }
        "std" => {
            let values = non_empty(name, flatten_numbers(name, args)?)?;
            number(variance(&values).sqrt())
        }

        "add" => number(number_arg(name, args, 0)? + number_arg(name, args, 1)?),
        "subtract" => number(number_arg(name, args, 0)? - number_arg(name, args, 1)?),
        "multiply" => number(number_arg(name, args, 0)? * number_arg(name, args, 1)?),
        "divide" => divide(number_arg(name, args, 0)?, number_arg(name, args, 1)?),

        "equal" => Ok(Value::Bool(arg(args, 0) == arg(args, 1))),
        "unequal" => Ok(Value::Bool(arg(args, 0) != arg(args, 1))),
        "smaller" => compare(arg(args, 0), arg(args, 1)).map(|o| Value::Bool(o.is_lt())),
        "larger" => compare(arg(args, 0), arg(args, 1)).map(|o| Value::Bool(o.is_gt())),
        "smallerEq" => compare(arg(args, 0), arg(args, 1)).map(|o| Value::Bool(o.is_le())),
        "largerEq" => compare(arg(args, 0), arg(args, 1)).map(|o| Value::Bool(o.is_ge())),

        "not" => expect_bool(arg(args, 0)).map(|b| Value::Bool(!b)),

        "PERCENT_CHANGE" => {
            let old = number_arg(name, args, 0)?;
            let new = number_arg(name, args, 1)?;
            if old == 0.0 {
                Ok(Value::Number(0.0))
            } else {
                number((new - old) / old * 100.0)
            }
        }
        "CLAMP" => {
            let x = number_arg(name, args, 0)?;
            let min = number_arg(name, args, 1)?;
            let max = number_arg(name, args, 2)?;
            if min > max {
                return Err(EngineError::InvalidArgument(format!(
                    "CLAMP range is empty: min {} is greater than max {}",
                    min, max
                )));
            }
            number(x.clamp(min, max))
        }
        "ROUND_TO" => {
            let x = number_arg(name, args, 0)?;
            number(round_decimals(x, decimals_arg(name, args, 1)?))
        }
        "DAYS_BETWEEN" => {
            let a = date_arg(name, arg(args, 0))?;
            let b = date_arg(name, arg(args, 1))?;
            let millis = (b - a).num_milliseconds().unsigned_abs() as f64;
            number((millis / 86_400_000.0).ceil())
        }

        other => Err(EngineError::UnknownFunction(other.to_string())),
    }
}

/// 数值结果必须为有限数
pub fn number(n: f64) -> Result<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(EngineError::Arithmetic(
            "Result is not a finite number".to_string(),
        ))
    }
}

pub fn divide(a: f64, b: f64) -> Result<Value> {
    if b == 0.0 {
        return Err(EngineError::DivisionByZero);
    }
    number(a / b)
}

/// 取模，结果符号与除数一致
pub fn modulo(a: f64, b: f64) -> Result<Value> {
    if b == 0.0 {
        return Err(EngineError::Arithmetic("Modulo by zero".to_string()));
    }
    number(a - b * (a / b).floor())
}

/// 有序比较：仅支持数值与数值、字符串与字符串
pub fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| EngineError::Arithmetic("Cannot compare NaN".to_string())),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(EngineError::type_mismatch(
            "two numbers or two strings",
            format!("{} and {}", a.type_name(), b.type_name()),
        )),
    }
}

pub fn expect_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| EngineError::type_mismatch("boolean", value.type_name()))
}

static MISSING: Value = Value::Null;

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&MISSING)
}

fn number_arg(function: &str, args: &[Value], index: usize) -> Result<f64> {
    let value = arg(args, index);
    value.as_f64().ok_or_else(|| {
        EngineError::type_mismatch(
            format!("number for argument {} of {}", index + 1, function),
            value.type_name(),
        )
    })
}

fn decimals_arg(function: &str, args: &[Value], index: usize) -> Result<i32> {
    let n = number_arg(function, args, index)?;
    if n.fract() != 0.0 || !(0.0..=15.0).contains(&n) {
        return Err(EngineError::InvalidArgument(format!(
            "{} expects an integer number of decimals between 0 and 15, got {}",
            function,
            Value::Number(n)
        )));
    }
    Ok(n as i32)
}

fn round_decimals(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

/// 展开参数（数值或数值列表，列表可嵌套）
fn flatten_numbers(function: &str, args: &[Value]) -> Result<Vec<f64>> {
    fn collect(function: &str, value: &Value, out: &mut Vec<f64>) -> Result<()> {
        match value {
            Value::Number(n) => {
                out.push(*n);
                Ok(())
            }
            Value::List(items) => items.iter().try_for_each(|item| collect(function, item, out)),
            other => Err(EngineError::type_mismatch(
                format!("numbers or lists of numbers for {}", function),
                other.type_name(),
            )),
        }
    }

    let mut out = Vec::new();
    for arg in args {
        collect(function, arg, &mut out)?;
    }
    Ok(out)
}

fn non_empty(function: &str, values: Vec<f64>) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "{} requires at least one value",
            function
        )));
    }
    Ok(values)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// 样本方差（n - 1），单个值时为 0
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let squares: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    squares / (values.len() - 1) as f64
}

/// 解析日期参数：RFC 3339、`YYYY-MM-DD` 或毫秒时间戳
fn date_arg(function: &str, value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime(s).ok_or_else(|| {
            EngineError::InvalidArgument(format!("{} cannot parse date '{}'", function, s))
        }),
        Value::Number(ms) => DateTime::from_timestamp_millis(*ms as i64).ok_or_else(|| {
            EngineError::InvalidArgument(format!("{} timestamp out of range: {}", function, ms))
        }),
        other => Err(EngineError::type_mismatch(
            format!("date string or timestamp for {}", function),
            other.type_name(),
        )),
    }
}

/// 解析日期时间（RFC 3339 或纯日期）
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

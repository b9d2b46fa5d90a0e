//! 条件评估器
//!
//! 实现各种操作符的评估逻辑，支持多种数据类型的比较。
//! 数值比较接受可解析为数字的字符串；`dataType` 为 date 时有序比较按时间进行。

use super::models::DataType;
use crate::error::{EngineError, Result};
use crate::formula::functions::parse_datetime;
use crate::operators::ConditionOperator;
use crate::value::Value;
use chrono::{DateTime, Utc};
use regex::Regex;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 从工作数据中获取的字段值
    /// * `operator` - 操作符
    /// * `expected_value` - 规则中定义的期望值
    /// * `data_type` - 字段数据类型提示
    pub fn evaluate(
        field_value: Option<&Value>,
        operator: ConditionOperator,
        expected_value: &Value,
        data_type: Option<DataType>,
    ) -> Result<bool> {
        // 空值检查操作符需要特殊处理，因为它们的语义就是检查值是否存在
        match operator {
            ConditionOperator::IsEmpty => return Ok(Self::is_empty(field_value)),
            ConditionOperator::IsNotEmpty => return Ok(!Self::is_empty(field_value)),
            _ => {}
        }

        // 字段不存在时，其余操作一律不匹配
        let Some(field_value) = field_value else {
            return Ok(false);
        };

        let dates = data_type == Some(DataType::Date);

        match operator {
            ConditionOperator::Equals => Self::eq(field_value, expected_value, dates),
            ConditionOperator::NotEquals => {
                Self::eq(field_value, expected_value, dates).map(|r| !r)
            }
            ConditionOperator::GreaterThan => {
                Self::ordered(field_value, expected_value, dates, |o| o.is_gt())
            }
            ConditionOperator::LessThan => {
                Self::ordered(field_value, expected_value, dates, |o| o.is_lt())
            }
            ConditionOperator::GreaterThanOrEqual => {
                Self::ordered(field_value, expected_value, dates, |o| o.is_ge())
            }
            ConditionOperator::LessThanOrEqual => {
                Self::ordered(field_value, expected_value, dates, |o| o.is_le())
            }
            ConditionOperator::Between => Self::between(field_value, expected_value, dates),
            ConditionOperator::In => Self::in_list(field_value, expected_value),
            ConditionOperator::NotIn => Self::in_list(field_value, expected_value).map(|r| !r),
            ConditionOperator::Contains => Self::contains(field_value, expected_value),
            ConditionOperator::NotContains => {
                Self::contains(field_value, expected_value).map(|r| !r)
            }
            ConditionOperator::ContainsAny => Self::contains_any(field_value, expected_value),
            ConditionOperator::ContainsAll => Self::contains_all(field_value, expected_value),
            ConditionOperator::StartsWith => {
                Self::string_test(field_value, expected_value, |s, p| s.starts_with(p))
            }
            ConditionOperator::EndsWith => {
                Self::string_test(field_value, expected_value, |s, p| s.ends_with(p))
            }
            ConditionOperator::Regex => Self::regex_match(field_value, expected_value),
            ConditionOperator::Before => {
                Self::ordered(field_value, expected_value, true, |o| o.is_lt())
            }
            ConditionOperator::After => {
                Self::ordered(field_value, expected_value, true, |o| o.is_gt())
            }
            ConditionOperator::IsEmpty | ConditionOperator::IsNotEmpty => Ok(false),
        }
    }

    /// 判断值是否为空
    fn is_empty(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::List(items)) => items.is_empty(),
            Some(Value::Map(map)) => map.is_empty(),
            _ => false,
        }
    }

    /// 相等比较
    fn eq(field: &Value, expected: &Value, dates: bool) -> Result<bool> {
        if dates {
            return Ok(Self::datetime(field)? == Self::datetime(expected)?);
        }

        // 数值统一转为浮点数比较，"100" 与 100 视为相等
        if let (Some(a), Some(b)) = (Self::numeric(field), Self::numeric(expected)) {
            // 相对误差，量级不同的数值都只容忍舍入误差
            return Ok(a == b || (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()));
        }

        Ok(field == expected)
    }

    /// 有序比较
    fn ordered<F>(field: &Value, expected: &Value, dates: bool, cmp: F) -> Result<bool>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        if dates {
            let ordering = Self::datetime(field)?.cmp(&Self::datetime(expected)?);
            return Ok(cmp(ordering));
        }

        let a = Self::number(field)?;
        let b = Self::number(expected)?;
        Ok(a.partial_cmp(&b).is_some_and(cmp))
    }

    /// 范围比较 (between)，expected 应为 [min, max] 列表，两端闭区间
    fn between(field: &Value, expected: &Value, dates: bool) -> Result<bool> {
        let [min, max] = expected.as_list().unwrap_or_default() else {
            return Err(EngineError::InvalidArgument(
                "Operator 'between' requires a [min, max] list".to_string(),
            ));
        };

        Ok(Self::ordered(field, min, dates, |o| o.is_ge())?
            && Self::ordered(field, max, dates, |o| o.is_le())?)
    }

    /// 列表包含检查 (in)
    fn in_list(field: &Value, expected: &Value) -> Result<bool> {
        let items = Self::list(expected)?;

        for item in items {
            if Self::eq(field, item, false)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// 字符串/列表包含检查
    fn contains(field: &Value, expected: &Value) -> Result<bool> {
        match field {
            Value::String(s) => {
                let needle = match expected {
                    Value::String(needle) => needle.clone(),
                    Value::Number(_) => expected.to_string(),
                    _ => {
                        return Err(EngineError::type_mismatch(
                            "string",
                            expected.type_name(),
                        ));
                    }
                };
                Ok(s.contains(&needle))
            }
            Value::List(items) => {
                for item in items {
                    if Self::eq(item, expected, false)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(EngineError::type_mismatch(
                "string or list",
                field.type_name(),
            )),
        }
    }

    /// 列表包含任意一个 (containsAny)
    fn contains_any(field: &Value, expected: &Value) -> Result<bool> {
        let field_items = Self::list(field)?;
        let expected_items = Self::list(expected)?;

        for expected_item in expected_items {
            for field_item in field_items {
                if Self::eq(field_item, expected_item, false)? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// 列表包含全部 (containsAll)
    fn contains_all(field: &Value, expected: &Value) -> Result<bool> {
        let field_items = Self::list(field)?;
        let expected_items = Self::list(expected)?;

        for expected_item in expected_items {
            let mut found = false;
            for field_item in field_items {
                if Self::eq(field_item, expected_item, false)? {
                    found = true;
                    break;
                }
            }
            if !found {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// 字符串前缀/后缀检查
    fn string_test<F>(field: &Value, expected: &Value, test: F) -> Result<bool>
    where
        F: Fn(&str, &str) -> bool,
    {
        let s = Self::string(field)?;
        let pattern = Self::string(expected)?;
        Ok(test(s, pattern))
    }

    /// 正则表达式匹配
    fn regex_match(field: &Value, expected: &Value) -> Result<bool> {
        let pattern = Self::string(expected)?;
        let regex = Regex::new(pattern).map_err(|e| {
            EngineError::InvalidArgument(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        match field {
            Value::String(s) => Ok(regex.is_match(s)),
            Value::Number(_) | Value::Bool(_) => Ok(regex.is_match(&field.to_string())),
            _ => Err(EngineError::type_mismatch("string", field.type_name())),
        }
    }

    /// 数值或可解析为数字的字符串
    fn numeric(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn number(value: &Value) -> Result<f64> {
        Self::numeric(value).ok_or_else(|| EngineError::type_mismatch("number", value.type_name()))
    }

    fn string(value: &Value) -> Result<&str> {
        value
            .as_str()
            .ok_or_else(|| EngineError::type_mismatch("string", value.type_name()))
    }

    fn list(value: &Value) -> Result<&[Value]> {
        value
            .as_list()
            .ok_or_else(|| EngineError::type_mismatch("list", value.type_name()))
    }

    /// 解析日期时间（RFC 3339 或 YYYY-MM-DD）
    fn datetime(value: &Value) -> Result<DateTime<Utc>> {
        let s = value
            .as_str()
            .ok_or_else(|| EngineError::type_mismatch("datetime string", value.type_name()))?;

        parse_datetime(s)
            .ok_or_else(|| EngineError::InvalidArgument(format!("Cannot parse datetime '{}'", s)))
    }
}

//! 公式静态分析
//!
//! 复杂度评估、文档生成以及常量折叠优化，全部基于语法树完成，不执行任何变量求值。

use super::ast::{Expr, UnaryOp};
use super::evaluator::Evaluator;
use super::functions;
use super::models::{ComplexityLevel, ComplexityReport, FormulaContext};
use std::fmt::Write;

/// 变量数超过该值时给出警告
const MANY_VARIABLES: usize = 10;
/// 条件嵌套超过该深度时给出警告
const DEEP_CONDITIONALS: usize = 3;

/// 校验阶段的粗粒度复杂度
pub fn estimate_complexity(expr: &Expr) -> ComplexityLevel {
    let variable_count = expr.variables().len();
    let functions = expr.functions();
    let function_count = functions.len();
    let has_conditionals = expr.conditional_count() > 0
        || functions.contains("and")
        || functions.contains("or");

    if variable_count > 8 || function_count > 5 || (has_conditionals && function_count > 3) {
        ComplexityLevel::High
    } else if variable_count > 4 || function_count > 2 || has_conditionals {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::Low
    }
}

/// 校验阶段的警告
pub fn validation_warnings(expr: &Expr) -> Vec<String> {
    let mut warnings = Vec::new();

    if expr.variables().len() > MANY_VARIABLES {
        warnings.push("Formula uses many variables, consider simplifying".to_string());
    }

    if expr.conditional_depth() > DEEP_CONDITIONALS {
        warnings.push("Complex nested conditions detected".to_string());
    }

    warnings
}

/// 复杂度评分与优化建议
pub fn analyze_complexity(expr: &Expr) -> ComplexityReport {
    let operation_count = expr.operation_count();
    let function_count = expr.functions().len();
    let variable_count = expr.variables().len();
    let conditional_count = expr.conditional_count();

    let complexity = (operation_count * 2
        + function_count * 5
        + variable_count
        + conditional_count * 10) as u32;

    let mut suggestions = Vec::new();
    if operation_count > 10 {
        suggestions.push("Consider breaking down complex calculations into sub-formulas".to_string());
    }
    if variable_count > 8 {
        suggestions.push("High number of variables - consider grouping related variables".to_string());
    }
    if conditional_count > 3 {
        suggestions
            .push("Multiple conditionals - consider using a lookup table or rules engine".to_string());
    }
    if complexity > 50 {
        suggestions
            .push("High overall complexity - consider splitting into multiple formulas".to_string());
    }

    ComplexityReport {
        complexity,
        suggestions,
    }
}

/// 生成 Markdown 文档
pub fn generate_documentation(expression: &str, expr: &Expr) -> String {
    let mut doc = String::from("## Formula Documentation\n\n");
    let _ = writeln!(doc, "**Expression:** `{}`\n", expression);

    let variables = expr.variables();
    if !variables.is_empty() {
        doc.push_str("### Variables Used:\n");
        for name in &variables {
            let _ = writeln!(doc, "- `{}`: [Description needed]", name);
        }
        doc.push('\n');
    }

    let function_names = expr.functions();
    if !function_names.is_empty() {
        doc.push_str("### Functions Used:\n");
        for name in &function_names {
            let _ = writeln!(doc, "- `{}`: {}", name, functions::describe(name));
        }
        doc.push('\n');
    }

    let report = analyze_complexity(expr);
    let _ = writeln!(doc, "### Complexity Score: {}\n", report.complexity);

    if !report.suggestions.is_empty() {
        doc.push_str("### Optimization Suggestions:\n");
        for suggestion in &report.suggestions {
            let _ = writeln!(doc, "- {}", suggestion);
        }
    }

    doc
}

/// 常量折叠
///
/// 仅由字面量构成的子表达式被替换为求值结果，求值出错的子表达式保持原样。
/// 返回折叠后的语法树与折叠次数。
pub fn fold_constants(expr: &Expr) -> (Expr, usize) {
    let mut folds = 0;
    let folded = fold(expr, &mut folds);
    (folded, folds)
}

fn fold(expr: &Expr, folds: &mut usize) -> Expr {
    let rebuilt = match expr {
        Expr::Literal { .. } | Expr::Variable { .. } => return expr.clone(),
        Expr::List { items } => Expr::List {
            items: items.iter().map(|item| fold(item, folds)).collect(),
        },
        Expr::Unary { op, operand } => Expr::unary(*op, fold(operand, folds)),
        Expr::Binary { op, left, right } => {
            Expr::binary(*op, fold(left, folds), fold(right, folds))
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => Expr::conditional(
            fold(condition, folds),
            fold(then_branch, folds),
            fold(else_branch, folds),
        ),
        Expr::Call { name, args } => {
            Expr::call(name.clone(), args.iter().map(|arg| fold(arg, folds)).collect())
        }
    };

    // 负数字面量本身已是最简形式
    if let Expr::Unary {
        op: UnaryOp::Neg | UnaryOp::Plus,
        operand,
    } = &rebuilt
    {
        if matches!(&**operand, Expr::Literal { value } if value.as_f64().is_some()) {
            return rebuilt;
        }
    }

    if !rebuilt.is_constant() {
        return rebuilt;
    }

    let context = FormulaContext::default();
    match Evaluator::new(&context).evaluate(&rebuilt) {
        Ok(value) => {
            *folds += 1;
            Expr::literal(value)
        }
        Err(_) => rebuilt,
    }
}

/// 优化说明
pub fn describe_improvements(original: &Expr, folds: usize) -> Vec<String> {
    let mut improvements = Vec::new();

    if folds > 0 {
        improvements.push(format!("Folded {} constant subexpression(s)", folds));
    }

    if original.conditional_depth() > 1 {
        improvements.push("Found nested conditionals that could be optimized".to_string());
    }

    improvements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::{ParseLimits, parse};
    use crate::value::Value;

    fn parse_ok(input: &str) -> Expr {
        parse(input, ParseLimits::default()).unwrap()
    }

    #[test]
    fn test_estimate_complexity() {
        assert_eq!(estimate_complexity(&parse_ok("a + b")), ComplexityLevel::Low);
        assert_eq!(
            estimate_complexity(&parse_ok("if(a > 1, b, c)")),
            ComplexityLevel::Medium
        );
        assert_eq!(
            estimate_complexity(&parse_ok("a + b + c + d + e + f + g + h + i")),
            ComplexityLevel::High
        );
    }

    #[test]
    fn test_validation_warnings() {
        let many = (0..11).map(|i| format!("v{}", i)).collect::<Vec<_>>().join(" + ");
        assert_eq!(
            validation_warnings(&parse_ok(&many)),
            vec!["Formula uses many variables, consider simplifying"]
        );

        let nested = "if(a, if(b, if(c, if(d, 1, 2), 3), 4), 5)";
        assert_eq!(
            validation_warnings(&parse_ok(nested)),
            vec!["Complex nested conditions detected"]
        );

        assert!(validation_warnings(&parse_ok("a * b")).is_empty());
    }

    #[test]
    fn test_analyze_complexity_score() {
        // 1 次运算 * 2 + 1 个函数 * 5 + 2 个变量 + 0 个条件
        let report = analyze_complexity(&parse_ok("max(a, b) * 2"));
        assert_eq!(report.complexity, 9);
        assert!(report.suggestions.is_empty());

        let report = analyze_complexity(&parse_ok(
            "if(a, 1, 2) + if(b, 1, 2) + if(c, 1, 2) + if(d, 1, 2)",
        ));
        assert!(
            report
                .suggestions
                .iter()
                .any(|s| s.contains("lookup table"))
        );
    }

    #[test]
    fn test_documentation() {
        let doc = generate_documentation("round(rate * 1.1)", &parse_ok("round(rate * 1.1)"));

        assert!(doc.starts_with("## Formula Documentation"));
        assert!(doc.contains("- `rate`: [Description needed]"));
        assert!(doc.contains("- `round`: Rounds to nearest integer or to n decimals"));
        assert!(doc.contains("### Complexity Score: 8"));
    }

    #[test]
    fn test_fold_constants() {
        let (folded, folds) = fold_constants(&parse_ok("rate * (1 + 0.5) + max(2, 3)"));
        assert_eq!(folded.to_string(), "rate * 1.5 + 3");
        assert_eq!(folds, 2);

        let (folded, folds) = fold_constants(&parse_ok("x * -5"));
        assert_eq!(folded.to_string(), "x * -5");
        assert_eq!(folds, 0);
    }

    #[test]
    fn test_fold_keeps_failing_subexpressions() {
        let (folded, folds) = fold_constants(&parse_ok("a + 1 / 0"));
        assert_eq!(folded.to_string(), "a + 1 / 0");
        assert_eq!(folds, 0);

        let (folded, _) = fold_constants(&parse_ok("'a' + 'b'"));
        assert_eq!(folded, Expr::literal(Value::from("ab")));
    }
}

//! 公式解析器
//!
//! 递归下降解析，优先级从低到高：
//! `?:` · `||` · `&&` · `== !=` · `< <= > >=` · `+ -` · `* / %` · 一元 `- + !` · `^` · 调用/基本项。
//! 函数白名单与参数个数在解析阶段检查，未知函数直接视为语法错误。

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::functions;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{EngineError, Result};
use crate::value::Value;
use rms_shared::config::EngineConfig;

/// 解析限制
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub max_length: usize,
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ParseLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_length: config.max_expression_length,
            max_depth: config.max_nesting_depth,
        }
    }
}

/// 解析表达式为语法树
pub fn parse(expression: &str, limits: ParseLimits) -> Result<Expr> {
    if expression.trim().is_empty() {
        return Err(EngineError::syntax(0, "Expression is empty"));
    }

    let length = expression.chars().count();
    if length > limits.max_length {
        return Err(EngineError::syntax(
            limits.max_length,
            format!(
                "Expression exceeds maximum length of {} characters",
                limits.max_length
            ),
        ));
    }

    let tokens = Lexer::new(expression).tokenize()?;
    let mut parser = Parser::new(tokens, limits.max_depth);
    let expr = parser.parse_expression()?;
    parser.expect(TokenKind::Eof)?;

    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        // tokenize 保证末尾有 Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }

        let found = self.peek();
        let message = match kind {
            TokenKind::Eof => format!("Unexpected token '{}'", describe(found)),
            _ => format!("Expected '{}' but found {}", kind, describe_found(found)),
        };
        Err(EngineError::syntax(found.position, message))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EngineError::syntax(
                self.peek().position,
                format!(
                    "Expression exceeds maximum nesting depth of {}",
                    self.max_depth
                ),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- grammar ----

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let condition = self.parse_binary(BinaryOp::Or.precedence())?;

        if !self.matches(TokenKind::Question) {
            return Ok(condition);
        }

        self.enter()?;
        let then_branch = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let else_branch = self.parse_conditional()?;
        self.leave();

        Ok(Expr::conditional(condition, then_branch, else_branch))
    }

    /// 左结合二元运算（优先级爬升）
    ///
    /// 每构造一层二元节点即计入嵌套深度，长运算链与括号嵌套受同一上限约束。
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        let mut levels = 0;

        while let Some(op) = binary_op(self.peek().kind) {
            let precedence = op.precedence();
            // `^` 在 parse_power 中处理
            if precedence < min_precedence || op == BinaryOp::Pow {
                break;
            }
            self.advance();
            self.enter()?;
            levels += 1;
            let right = self.parse_binary(precedence + 1)?;
            left = Expr::binary(op, left, right);
        }

        for _ in 0..levels {
            self.leave();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.advance();

        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();

        Ok(Expr::unary(op, operand))
    }

    /// `^` 右结合，且比前置负号结合更紧：`-2 ^ 2` 为 `-(2 ^ 2)`
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;

        if !self.matches(TokenKind::Caret) {
            return Ok(base);
        }

        self.enter()?;
        let exponent = self.parse_unary()?;
        self.leave();

        Ok(Expr::binary(BinaryOp::Pow, base, exponent))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance();

        match token.kind {
            TokenKind::Number => {
                let n: f64 = token.text.parse().map_err(|_| {
                    EngineError::syntax(
                        token.position,
                        format!("Invalid number literal '{}'", token.text),
                    )
                })?;
                Ok(Expr::literal(n))
            }
            TokenKind::String => Ok(Expr::literal(token.text)),
            TokenKind::True => Ok(Expr::literal(true)),
            TokenKind::False => Ok(Expr::literal(false)),
            TokenKind::Null => Ok(Expr::literal(Value::Null)),
            TokenKind::Identifier => {
                if self.check(TokenKind::LParen) {
                    self.parse_call(token)
                } else {
                    Ok(Expr::variable(token.text))
                }
            }
            TokenKind::LParen => {
                self.enter()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                self.leave();
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.enter()?;
                let items = self.parse_arguments(TokenKind::RBracket)?;
                self.leave();
                Ok(Expr::List { items })
            }
            TokenKind::Eof => Err(EngineError::syntax(
                token.position,
                "Unexpected end of expression",
            )),
            _ => Err(EngineError::syntax(
                token.position,
                format!("Unexpected token '{}'", token.text),
            )),
        }
    }

    fn parse_call(&mut self, name: Token) -> Result<Expr> {
        let spec = functions::lookup(&name.text)
            .ok_or_else(|| EngineError::UnknownFunction(name.text.clone()))?;

        self.expect(TokenKind::LParen)?;
        self.enter()?;
        let args = self.parse_arguments(TokenKind::RParen)?;
        self.leave();

        spec.check_arity(args.len())?;

        Ok(Expr::call(name.text, args))
    }

    /// 逗号分隔的参数列表，消费结束符
    fn parse_arguments(&mut self, close: TokenKind) -> Result<Vec<Expr>> {
        let mut args = Vec::new();

        if self.matches(close) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);
            if self.matches(TokenKind::Comma) {
                continue;
            }
            self.expect(close)?;
            break;
        }

        Ok(args)
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::OrOr => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::String => format!("'{}'", token.text),
        _ => token.text.clone(),
    }
}

fn describe_found(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        _ => format!("'{}'", describe(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Expr {
        parse(input, ParseLimits::default()).unwrap()
    }

    fn parse_err(input: &str) -> EngineError {
        parse(input, ParseLimits::default()).unwrap_err()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parse_ok("1 + 2 * 3").to_string(), "1 + 2 * 3");
        assert_eq!(parse_ok("(1 + 2) * 3").to_string(), "(1 + 2) * 3");
        assert_eq!(parse_ok("a || b && c").to_string(), "a || b && c");
        assert_eq!(
            parse_ok("a > 1 == b < 2").to_string(),
            "a > 1 == b < 2"
        );
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse_ok("10 - 4 - 3");
        match expr {
            Expr::Binary { op, left, .. } => {
                assert_eq!(op, BinaryOp::Sub);
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let expr = parse_ok("-2 ^ 2");
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Neg, .. }));

        // 右结合
        let expr = parse_ok("2 ^ 3 ^ 2");
        match expr {
            Expr::Binary { right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }))
            }
            other => panic!("unexpected expression: {:?}", other),
        }

        assert_eq!(parse_ok("2 ^ -1").to_string(), "2 ^ -1");
    }

    #[test]
    fn test_conditional_is_right_associative() {
        let expr = parse_ok("a ? 1 : b ? 2 : 3");
        match expr {
            Expr::Conditional { else_branch, .. } => {
                assert!(matches!(*else_branch, Expr::Conditional { .. }))
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_calls_and_lists() {
        let expr = parse_ok("max([rate, floor_rate], 80) * if(vip, 0.9, 1)");
        let funcs: Vec<String> = expr.functions().into_iter().collect();
        assert_eq!(funcs, vec!["if", "max"]);

        assert_eq!(
            parse_ok("sum([1, 2, 3])").to_string(),
            "sum([1, 2, 3])"
        );
    }

    #[test]
    fn test_display_reparses_to_same_tree() {
        for input in [
            "a + b * c - d / e % f",
            "-(a + b) ^ 2",
            "(a ? b : c) ? d : e",
            "!(a && b) || c != 'x'",
            "round(rate * (1 + markup / 100), 2)",
        ] {
            let expr = parse_ok(input);
            assert_eq!(parse_ok(&expr.to_string()), expr, "input: {}", input);
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse_err("a +* b"), EngineError::Syntax { position: 3, .. }));
        assert!(matches!(parse_err(""), EngineError::Syntax { .. }));
        assert!(matches!(parse_err("   "), EngineError::Syntax { .. }));

        let err = parse_err("(a + b");
        assert_eq!(
            err.to_string(),
            "Expected ')' but found end of input (position 6)"
        );

        let err = parse_err("a + b)");
        assert_eq!(err.to_string(), "Unexpected token ')' (position 5)");

        assert!(parse_err("a ? b").to_string().contains("Expected ':'"));
        assert!(parse_err("[1, 2").to_string().contains("Expected ']'"));
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert_eq!(
            parse_err("eval('1')"),
            EngineError::UnknownFunction("eval".to_string())
        );
        assert_eq!(
            parse_err("APPLY_RANGE(1, 2)"),
            EngineError::UnknownFunction("APPLY_RANGE".to_string())
        );
        assert!(matches!(parse_err("sqrt(1, 2)"), EngineError::Arity { .. }));
        assert!(matches!(parse_err("if(a, b)"), EngineError::Arity { .. }));
    }

    #[test]
    fn test_limits() {
        let limits = ParseLimits {
            max_length: 10,
            max_depth: 3,
        };

        assert!(parse("a + b + c + d", limits).is_err());
        assert!(parse("((a))", limits).is_ok());

        let err = parse("((((a))))", limits).unwrap_err();
        assert!(err.to_string().contains("nesting depth"));

        let err = parse("----a", limits).unwrap_err();
        assert!(err.to_string().contains("nesting depth"));
    }

    #[test]
    fn test_operator_chain_counts_toward_depth() {
        let limits = ParseLimits {
            max_length: 100,
            max_depth: 3,
        };

        assert!(parse("a + b + c", limits).is_ok());
        assert!(parse("a + b * c - d", limits).is_ok());

        let err = parse("a + b + c + d + e", limits).unwrap_err();
        assert!(matches!(err, EngineError::Syntax { .. }));
        assert!(err.to_string().contains("nesting depth"));

        // 括号内的运算链与外层深度累加
        assert!(parse("(a + b + c) * d", limits).is_ok());
        assert!(parse("(a + b + c + d)", limits).is_err());

        // 默认上限下，超长加法链在解析阶段即被拒绝
        let chain = vec!["1"; 2000].join("+");
        let err = parse(&chain, ParseLimits::default()).unwrap_err();
        assert!(err.to_string().contains("nesting depth of 64"));
    }
}

//! 公式词法分析
//!
//! 将表达式文本切分为 token 流，供解析器消费。位置信息为字符偏移（从 0 开始）。

use crate::error::{EngineError, Result};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// token 原始文本（字符串字面量为转义后的内容）
    pub text: String,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // 字面量与标识符
    Number,
    String,
    Identifier,
    True,
    False,
    Null,

    // 运算符
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Question,
    Colon,

    // 分隔符
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string literal"),
            Self::Identifier => write!(f, "identifier"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Null => write!(f, "null"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Percent => write!(f, "%"),
            Self::Caret => write!(f, "^"),
            Self::Bang => write!(f, "!"),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::Question => write!(f, "?"),
            Self::Colon => write!(f, ":"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::Comma => write!(f, ","),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// 切分全部输入，末尾追加 Eof
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", self.pos));
                break;
            };

            let start = self.pos;
            let token = if ch.is_ascii_digit()
                || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.read_number()?
            } else if ch == '\'' || ch == '"' {
                self.read_string(ch)?
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                self.read_identifier()
            } else {
                self.read_operator(ch, start)?
            };

            tokens.push(token);
        }

        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut text = String::new();

        while let Some(ch) = self.peek().filter(char::is_ascii_digit) {
            text.push(ch);
            self.pos += 1;
        }

        if self.peek() == Some('.') {
            text.push('.');
            self.pos += 1;
            while let Some(ch) = self.peek().filter(char::is_ascii_digit) {
                text.push(ch);
                self.pos += 1;
            }
        }

        // 科学计数法: 2e3, 1.5E-2
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign_offset = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self
                .peek_at(1 + sign_offset)
                .is_some_and(|c| c.is_ascii_digit())
            {
                for _ in 0..=sign_offset {
                    if let Some(ch) = self.advance() {
                        text.push(ch);
                    }
                }
                while let Some(ch) = self.peek().filter(char::is_ascii_digit) {
                    text.push(ch);
                    self.pos += 1;
                }
            }
        }

        if text.parse::<f64>().is_err() {
            return Err(EngineError::syntax(
                start,
                format!("Invalid number literal '{}'", text),
            ));
        }

        Ok(Token::new(TokenKind::Number, text, start))
    }

    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(EngineError::syntax(start, "Unterminated string literal"));
                }
                Some(ch) if ch == quote => break,
                Some('\\') => {
                    let escaped = self.advance().ok_or_else(|| {
                        EngineError::syntax(start, "Unterminated string literal")
                    })?;
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                Some(ch) => text.push(ch),
            }
        }

        Ok(Token::new(TokenKind::String, text, start))
    }

    /// 标识符允许点号路径，如 `room.rate`、`items.0.price`
    fn read_identifier(&mut self) -> Token {
        let start = self.pos;
        let mut text = String::new();

        loop {
            while let Some(ch) = self
                .peek()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            {
                text.push(ch);
                self.pos += 1;
            }

            let continues = self.peek() == Some('.')
                && self
                    .peek_at(1)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if !continues {
                break;
            }
            text.push('.');
            self.pos += 1;
        }

        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier,
        };

        Token::new(kind, text, start)
    }

    fn read_operator(&mut self, ch: char, start: usize) -> Result<Token> {
        let next = self.peek_at(1);
        let (kind, len) = match (ch, next) {
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('?', _) => (TokenKind::Question, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('=', _) => {
                return Err(EngineError::syntax(
                    start,
                    "Unexpected character '=', use '==' for comparison",
                ));
            }
            _ => {
                return Err(EngineError::syntax(
                    start,
                    format!("Unexpected character '{}'", ch),
                ));
            }
        };

        let text: String = self.input[start..start + len].iter().collect();
        self.pos += len;
        Ok(Token::new(kind, text, start))
    }
}

/// 切分表达式
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_arithmetic_tokens() {
        assert_eq!(
            kinds("a + 2 * (b - 1.5)"),
            vec![
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Star,
                TokenKind::LParen,
                TokenKind::Identifier,
                TokenKind::Minus,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a >= 1 && b != 2 || !c"),
            vec![
                TokenKind::Identifier,
                TokenKind::GtEq,
                TokenKind::Number,
                TokenKind::AndAnd,
                TokenKind::Identifier,
                TokenKind::NotEq,
                TokenKind::Number,
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dotted_identifier() {
        let tokens = tokenize("items.0.price * room.rate").unwrap();
        assert_eq!(tokens[0].text, "items.0.price");
        assert_eq!(tokens[2].text, "room.rate");
    }

    #[test]
    fn test_number_forms() {
        let tokens = tokenize("12 1.5 .5 2e3 1.5E-2").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["12", "1.5", ".5", "2e3", "1.5E-2", ""]);
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it\'s' "a\"b""#).unwrap();
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].text, "a\"b");
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("true false null"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert!(err.to_string().contains("Unterminated"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a = b").unwrap_err();
        assert!(matches!(err, EngineError::Syntax { position: 2, .. }));

        assert!(tokenize("a & b").is_err());
        assert!(tokenize("a # b").is_err());
    }
}

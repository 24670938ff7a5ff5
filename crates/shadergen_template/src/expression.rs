//! Condition expressions over feature tokens.
//!
//! Grammar (whitespace is insignificant):
//!
//! ```text
//! or    := and ( "||" and )*
//! and   := unary ( "&&" unary )*
//! unary := "!" unary | "(" or ")" | FEATURE
//! ```
//!
//! Single `&` and `|` are accepted as aliases of the doubled operators.

use shadergen_core::{FeatureSet, Result, ShaderGenError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Feature(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Ident(name) => name,
            Token::And => "&&",
            Token::Or => "||",
            Token::Not => "!",
            Token::Open => "(",
            Token::Close => ")",
        }
    }
}

#[inline]
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '&' => {
                chars.next_if(|&(_, n)| n == '&');
                tokens.push(Token::And);
            }
            '|' => {
                chars.next_if(|&(_, n)| n == '|');
                tokens.push(Token::Or);
            }
            '!' => tokens.push(Token::Not),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            c if is_ident_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, n)) = chars.peek() {
                    if !is_ident_char(n) {
                        break;
                    }
                    end = i + n.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(text[start..end].to_string()));
            }
            other => {
                return Err(ShaderGenError::UnknownToken {
                    token: other.to_string(),
                    expression: text.to_string(),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn unexpected(&self, token: Option<&Token>) -> ShaderGenError {
        match token {
            Some(token) => ShaderGenError::UnknownToken {
                token: token.text().to_string(),
                expression: self.source.to_string(),
            },
            None => ShaderGenError::InvalidCondition(self.source.to_string()),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                if self.peek() == Some(&Token::Close) {
                    self.pos += 1;
                    Ok(inner)
                } else {
                    Err(self.unexpected(self.peek()))
                }
            }
            Some(Token::Ident(name)) => Ok(Expr::Feature(name)),
            other => Err(self.unexpected(other.as_ref())),
        }
    }
}

impl Expr {
    /// Parses a condition expression; an empty text is an invalid condition.
    pub fn parse(text: &str) -> Result<Expr> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(ShaderGenError::InvalidCondition(text.to_string()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            source: text,
        };
        let expr = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(parser.unexpected(Some(extra)));
        }
        Ok(expr)
    }

    #[must_use]
    pub fn evaluate(&self, features: &FeatureSet) -> bool {
        match self {
            Expr::Feature(name) => features.has(name),
            Expr::Not(inner) => !inner.evaluate(features),
            Expr::And(lhs, rhs) => lhs.evaluate(features) && rhs.evaluate(features),
            Expr::Or(lhs, rhs) => lhs.evaluate(features) || rhs.evaluate(features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, features: &[&str]) -> bool {
        Expr::parse(text).unwrap().evaluate(&FeatureSet::from(features))
    }

    #[test]
    fn test_single_feature() {
        assert!(eval("A", &["A"]));
        assert!(!eval("A", &["B"]));
    }

    #[test]
    fn test_operators() {
        assert!(eval("A && B", &["A", "B"]));
        assert!(!eval("A && B", &["A"]));
        assert!(eval("A || B", &["B"]));
        assert!(eval("A || !B", &[]));
        assert!(eval("!A&&!B", &[]));
    }

    #[test]
    fn test_precedence_and_groups() {
        // && binds tighter than ||
        assert!(eval("A || B && C", &["A"]));
        assert!(!eval("(A || B) && C", &["A"]));
        assert!(eval("!(A && B)", &["A"]));
    }

    #[test]
    fn test_single_char_operators() {
        assert!(eval("A & B", &["A", "B"]));
        assert!(eval("A | B", &["A"]));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(Expr::parse(""), Err(ShaderGenError::InvalidCondition(_))));
        assert!(matches!(Expr::parse("A && "), Err(ShaderGenError::InvalidCondition(_))));
        assert!(matches!(
            Expr::parse("A # B"),
            Err(ShaderGenError::UnknownToken { token, .. }) if token == "#"
        ));
        assert!(Expr::parse("(A || B").is_err());
        assert!(Expr::parse("A B").is_err());
    }
}

//! Tokenizer and recursive-descent evaluator
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | NUMBER | IDENT | '(' expr ')'
//! ```

use std::collections::HashMap;

use tracing::trace;

use crate::error::{CalcError, Result};

/// Longest accepted source text
pub const MAX_EXPRESSION_LEN: usize = 512;

/// Deepest accepted nesting of parentheses and unary signs
pub const MAX_NESTING_DEPTH: usize = 32;

/// Characters that mark a formula string as an expression rather than a key
const OPERATOR_CHARS: &[char] = &['+', '-', '*', '/', '(', ')'];

/// Whether a formula string should be evaluated as an arithmetic expression
pub fn is_expression(formula: &str) -> bool {
    formula.contains(OPERATOR_CHARS)
}

/// Whether `name` can be referenced as a variable
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => pos += 1,
            b'+' => {
                tokens.push((pos, Token::Plus));
                pos += 1;
            },
            b'-' => {
                tokens.push((pos, Token::Minus));
                pos += 1;
            },
            b'*' => {
                tokens.push((pos, Token::Star));
                pos += 1;
            },
            b'/' => {
                tokens.push((pos, Token::Slash));
                pos += 1;
            },
            b'(' => {
                tokens.push((pos, Token::LParen));
                pos += 1;
            },
            b')' => {
                tokens.push((pos, Token::RParen));
                pos += 1;
            },
            b'0'..=b'9' | b'.' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                // Optional exponent: 1e5, 2.5E-3
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut look = pos + 1;
                    if look < bytes.len() && (bytes[look] == b'+' || bytes[look] == b'-') {
                        look += 1;
                    }
                    if look < bytes.len() && bytes[look].is_ascii_digit() {
                        pos = look;
                        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let text = &source[start..pos];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalcError::syntax(start, format!("invalid number '{}'", text)))?;
                tokens.push((start, Token::Number(value)));
            },
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(source[start..pos].to_string())));
            },
            _ => {
                let ch = source[pos..].chars().next().unwrap_or('?');
                return Err(CalcError::syntax(
                    pos,
                    format!("unexpected character '{}'", ch),
                ));
            },
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Variable(String),
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    depth: usize,
    source_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(p, _)| *p)
            .unwrap_or(self.source_len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, t)| t.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(CalcError::too_complex(format!(
                "nesting deeper than {}",
                MAX_NESTING_DEPTH
            )));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn factor(&mut self) -> Result<Node> {
        let position = self.position();
        match self.advance() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::Ident(name)) => Ok(Node::Variable(name)),
            Some(Token::Plus) => {
                self.enter()?;
                let node = self.factor()?;
                self.depth -= 1;
                Ok(node)
            },
            Some(Token::Minus) => {
                self.enter()?;
                let node = self.factor()?;
                self.depth -= 1;
                Ok(Node::Negate(Box::new(node)))
            },
            Some(Token::LParen) => {
                self.enter()?;
                let node = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => {},
                    _ => return Err(CalcError::syntax(position, "unclosed '('")),
                }
                self.depth -= 1;
                Ok(node)
            },
            Some(other) => Err(CalcError::syntax(
                position,
                format!("unexpected token {:?}", other),
            )),
            None => Err(CalcError::syntax(position, "unexpected end of expression")),
        }
    }
}

// ============================================================================
// Expression
// ============================================================================

/// A parsed, reusable arithmetic expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse source text into an expression tree
    pub fn parse(source: &str) -> Result<Self> {
        if source.len() > MAX_EXPRESSION_LEN {
            return Err(CalcError::too_complex(format!(
                "{} characters exceeds {}",
                source.len(),
                MAX_EXPRESSION_LEN
            )));
        }

        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
            source_len: source.len(),
        };
        let root = parser.expr()?;
        if parser.cursor < parser.tokens.len() {
            return Err(CalcError::syntax(parser.position(), "trailing input"));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names referenced by the expression, in first-use order
    pub fn variables(&self) -> Vec<&str> {
        fn walk<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
            match node {
                Node::Number(_) => {},
                Node::Variable(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                },
                Node::Negate(inner) => walk(inner, out),
                Node::Binary(_, lhs, rhs) => {
                    walk(lhs, out);
                    walk(rhs, out);
                },
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Evaluate against a variable map
    pub fn evaluate(&self, vars: &HashMap<String, f64>) -> Result<f64> {
        self.evaluate_with(|name| vars.get(name).copied())
    }

    /// Evaluate with an arbitrary variable lookup
    pub fn evaluate_with<F>(&self, lookup: F) -> Result<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let value = eval_node(&self.root, &lookup)?;
        if !value.is_finite() {
            return Err(CalcError::NonFinite);
        }
        trace!("{} = {}", self.source, value);
        Ok(value)
    }
}

fn eval_node<F>(node: &Node, lookup: &F) -> Result<f64>
where
    F: Fn(&str) -> Option<f64>,
{
    match node {
        Node::Number(v) => Ok(*v),
        Node::Variable(name) => lookup(name)
            .filter(|v| v.is_finite())
            .ok_or_else(|| CalcError::variable_not_found(name.clone())),
        Node::Negate(inner) => Ok(-eval_node(inner, lookup)?),
        Node::Binary(op, lhs, rhs) => {
            let a = eval_node(lhs, lookup)?;
            let b = eval_node(rhs, lookup)?;
            match op {
                BinaryOp::Add => Ok(a + b),
                BinaryOp::Sub => Ok(a - b),
                BinaryOp::Mul => Ok(a * b),
                BinaryOp::Div => {
                    if b == 0.0 {
                        Err(CalcError::DivisionByZero)
                    } else {
                        Ok(a / b)
                    }
                },
            }
        },
    }
}

/// Parse and evaluate in one step
pub fn evaluate(source: &str, vars: &HashMap<String, f64>) -> Result<f64> {
    Expression::parse(source)?.evaluate(vars)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let empty = HashMap::new();
        assert_eq!(evaluate("2 + 3 * 4", &empty).unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4", &empty).unwrap(), 20.0);
        assert_eq!(evaluate("10 - 4 - 3", &empty).unwrap(), 3.0);
        assert_eq!(evaluate("12 / 3 / 2", &empty).unwrap(), 2.0);
        assert_eq!(evaluate("-(3 - 5) * 2", &empty).unwrap(), 4.0);
        assert_eq!(evaluate("1.5e2 + .5", &empty).unwrap(), 150.5);
    }

    #[test]
    fn test_variables() {
        let v = vars(&[("engine_rpm", 1200.0), ("speed_ratio", 1.5)]);
        assert_eq!(evaluate("engine_rpm * speed_ratio", &v).unwrap(), 1800.0);

        let expr = Expression::parse("a + b * a - c").unwrap();
        assert_eq!(expr.variables(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_and_non_finite_variables() {
        let v = vars(&[("a", f64::NAN)]);
        assert_eq!(
            evaluate("a + 1", &v).unwrap_err(),
            CalcError::VariableNotFound("a".to_string())
        );
        assert_eq!(
            evaluate("b + 1", &HashMap::new()).unwrap_err(),
            CalcError::VariableNotFound("b".to_string())
        );
    }

    #[test]
    fn test_division_by_zero() {
        let v = vars(&[("dp", 0.0)]);
        assert_eq!(
            evaluate("100 / dp", &v).unwrap_err(),
            CalcError::DivisionByZero
        );
    }

    #[test]
    fn test_rejects_anything_outside_the_grammar() {
        let empty = HashMap::new();
        for source in [
            "2 ** 3",
            "__import__('os')",
            "a.b",
            "1 % 2",
            "max(1, 2)",
            "a = 1",
            "",
            "(1 + 2",
            "1 + 2)",
            "3 4",
        ] {
            assert!(
                Expression::parse(source).is_err() || evaluate(source, &empty).is_err(),
                "{} should be rejected",
                source
            );
        }
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert!(matches!(
            Expression::parse(&deep),
            Err(CalcError::TooComplex(_))
        ));
        let long = "1+".repeat(300) + "1";
        assert!(matches!(
            Expression::parse(&long),
            Err(CalcError::TooComplex(_))
        ));
    }

    #[test]
    fn test_is_expression_and_identifier() {
        assert!(is_expression("stg1_discharge_temp - 15"));
        assert!(is_expression("(a)"));
        assert!(!is_expression("stage2_suction_temp"));

        assert!(is_identifier("stg1_discharge_temp"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("engine rpm"));
        assert!(!is_identifier(""));
    }
}

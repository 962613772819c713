//! Recursive-descent parser for the grammar in spec §4.6.

use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::GraphError;

pub fn parse(src: &str) -> Result<Expr, GraphError> {
    let tokens = Lexer::new(src).tokenize().map_err(|(o, m)| GraphError::query(o, m))?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_or()?;
    p.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> GraphError {
        GraphError::query(self.peek().offset, msg.into())
    }

    fn expect_eof(&self) -> Result<(), GraphError> {
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.err("unexpected trailing input"))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, GraphError> {
        let mut lhs = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, GraphError> {
        let mut lhs = self.parse_not()?;
        while self.peek().kind == TokenKind::And {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, GraphError> {
        if self.peek().kind == TokenKind::Not {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, GraphError> {
        if self.peek().kind == TokenKind::LParen {
            self.advance();
            let inner = self.parse_or()?;
            if self.advance().kind != TokenKind::RParen {
                return Err(self.err("expected ')'"));
            }
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, GraphError> {
        let offset = self.peek().offset;
        let qualref = self.parse_qualref()?;
        let accessor = self.parse_accessor()?;
        let operator = self.parse_operator()?;
        let literal = self.parse_literal()?;
        Ok(Expr::Predicate(Predicate { qualref, accessor, operator, literal, offset }))
    }

    fn parse_qualref(&mut self) -> Result<QualRef, GraphError> {
        if self.peek().kind == TokenKind::Dollar {
            self.advance();
            let head = match self.advance().kind {
                TokenKind::Ident(s) => s,
                _ => return Err(self.err("expected qualifier name after '$'")),
            };
            // `any.neighbor` / `both.neighbor` are two segments before the
            // attribute name's own leading dot.
            let qualifier = if (head == "any" || head == "both")
                && self.peek().kind == TokenKind::Dot
                && matches!(&self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Ident(n)) if n == "neighbor")
            {
                self.advance(); // Dot
                self.advance(); // "neighbor"
                if head == "any" { Qualifier::AnyNeighbor } else { Qualifier::BothNeighbor }
            } else {
                qualifier_from_str(&head).ok_or_else(|| self.err(format!("unknown qualifier '{head}'")))?
            };
            if self.advance().kind != TokenKind::Dot {
                return Err(self.err("expected '.' after qualifier"));
            }
            let name = self.ident()?;
            return Ok(QualRef { qualifier, name });
        }
        let name = self.ident()?;
        Ok(QualRef { qualifier: Qualifier::SelfRef, name })
    }

    fn ident(&mut self) -> Result<String, GraphError> {
        match self.advance().kind {
            TokenKind::Ident(s) => Ok(s),
            _ => Err(self.err("expected identifier")),
        }
    }

    fn parse_accessor(&mut self) -> Result<Option<Accessor>, GraphError> {
        match &self.peek().kind {
            TokenKind::LBracket => {
                self.advance();
                let n = match self.advance().kind {
                    TokenKind::Number(n) => n as usize,
                    _ => return Err(self.err("expected integer index")),
                };
                if self.advance().kind != TokenKind::RBracket {
                    return Err(self.err("expected ']'"));
                }
                Ok(Some(Accessor::Component(n)))
            }
            TokenKind::Dot => {
                self.advance();
                let name = self.ident()?;
                match name.as_str() {
                    "any" => Ok(Some(Accessor::Any)),
                    "all" => Ok(Some(Accessor::All)),
                    "min" => Ok(Some(Accessor::Min)),
                    "max" => Ok(Some(Accessor::Max)),
                    "avg" => Ok(Some(Accessor::Avg)),
                    "median" => Ok(Some(Accessor::Median)),
                    "std" => Ok(Some(Accessor::Std)),
                    "abs" => Ok(Some(Accessor::Abs)),
                    "dot" => {
                        if self.advance().kind != TokenKind::LParen {
                            return Err(self.err("expected '(' after .dot"));
                        }
                        let acc = if self.peek().kind == TokenKind::LBracket {
                            self.advance();
                            let mut nums = Vec::new();
                            loop {
                                match self.advance().kind {
                                    TokenKind::Number(n) => nums.push(n),
                                    _ => return Err(self.err("expected number in dot literal vector")),
                                }
                                match self.advance().kind {
                                    TokenKind::Comma => continue,
                                    TokenKind::RBracket => break,
                                    _ => return Err(self.err("expected ',' or ']'")),
                                }
                            }
                            Accessor::DotLiteral(nums)
                        } else {
                            Accessor::DotAttr(self.ident()?)
                        };
                        if self.advance().kind != TokenKind::RParen {
                            return Err(self.err("expected ')'"));
                        }
                        Ok(Some(acc))
                    }
                    other => Err(self.err(format!("unknown accessor '.{other}'"))),
                }
            }
            _ => Ok(None),
        }
    }

    fn parse_operator(&mut self) -> Result<Operator, GraphError> {
        let op = match self.advance().kind {
            TokenKind::Eq => Operator::Eq,
            TokenKind::Ne => Operator::Ne,
            TokenKind::Lt => Operator::Lt,
            TokenKind::Le => Operator::Le,
            TokenKind::Gt => Operator::Gt,
            TokenKind::Ge => Operator::Ge,
            TokenKind::In => Operator::In,
            TokenKind::Match => Operator::Match,
            _ => return Err(self.err("expected a comparison operator")),
        };
        Ok(op)
    }

    fn parse_one_literal(&mut self) -> Result<Literal, GraphError> {
        match self.advance().kind {
            TokenKind::Number(n) => Ok(Literal::Number(n)),
            TokenKind::Str(s) => Ok(Literal::Str(s)),
            _ => Err(self.err("expected a literal")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, GraphError> {
        if self.peek().kind == TokenKind::LParen {
            self.advance();
            let mut items = vec![self.parse_one_literal()?];
            while self.peek().kind == TokenKind::Comma {
                self.advance();
                items.push(self.parse_one_literal()?);
            }
            if self.advance().kind != TokenKind::RParen {
                return Err(self.err("expected ')'"));
            }
            Ok(Literal::List(items))
        } else {
            self.parse_one_literal()
        }
    }
}

fn qualifier_from_str(s: &str) -> Option<Qualifier> {
    match s.to_ascii_lowercase().as_str() {
        "src" => Some(Qualifier::Src),
        "dst" => Some(Qualifier::Dst),
        "any" => Some(Qualifier::Any),
        "both" => Some(Qualifier::Both),
        _ => None,
    }
}

//! Recursive-descent parser producing statements and expressions

use enclave_core::errors::ExErrorKind;
use enclave_core::plan::SourcePosition;

use super::lexer::{Token, TokenKind};
use crate::errors::InterpretationError;

/// Deepest expression tree the parser builds; evaluation recurses once per
/// level
pub const MAX_NESTING_DEPTH: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { target: String, value: Expr },
    Expr(Expr),
    /// `load("locator", "sym", alias="sym")`; pairs are (local name, exported name)
    Load {
        locator: String,
        symbols: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Call { callee: Box<Expr>, args: Vec<Arg> },
    Attr { object: Box<Expr>, name: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Add(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

pub struct Parser<'a> {
    locator: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
}

impl<'a> Parser<'a> {
    pub fn new(locator: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            locator,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// # Errors
    ///
    /// `Syntax` at the first token that does not fit the grammar,
    /// `InvalidInput` for expressions nested deeper than
    /// [`MAX_NESTING_DEPTH`].
    pub fn parse_program(mut self) -> Result<Vec<Stmt>, InterpretationError> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.at(&TokenKind::Eof) {
            statements.push(self.statement()?);
            if !self.at(&TokenKind::Eof) {
                self.expect(TokenKind::Newline)?;
            }
            self.skip_newlines();
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Stmt, InterpretationError> {
        let (line, column) = self.position();
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            if name == "load" && self.peek_kind_at(1) == Some(&TokenKind::LParen) {
                return self.load(line, column);
            }
            if self.peek_kind_at(1) == Some(&TokenKind::Assign) {
                self.advance();
                self.advance();
                let value = self.expression()?;
                return Ok(Stmt {
                    kind: StmtKind::Assign {
                        target: name,
                        value,
                    },
                    line,
                    column,
                });
            }
        }
        let expr = self.expression()?;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            line,
            column,
        })
    }

    fn load(&mut self, line: u32, column: u32) -> Result<Stmt, InterpretationError> {
        self.advance();
        self.expect(TokenKind::LParen)?;
        let locator = match self.advance().kind {
            TokenKind::Str(s) => s,
            _ => return Err(self.error_here_prev("load() module locator must be a string literal")),
        };
        let mut symbols = Vec::new();
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::RParen) {
                break;
            }
            let token = self.advance();
            match token.kind {
                TokenKind::Str(symbol) => symbols.push((symbol.clone(), symbol)),
                TokenKind::Ident(alias) => {
                    self.expect(TokenKind::Assign)?;
                    match self.advance().kind {
                        TokenKind::Str(symbol) => symbols.push((alias, symbol)),
                        _ => {
                            return Err(self
                                .error_here_prev("load() symbol names must be string literals"))
                        }
                    }
                }
                _ => return Err(self.error_here_prev("load() symbol names must be string literals")),
            }
        }
        self.expect(TokenKind::RParen)?;
        if symbols.is_empty() {
            return Err(self.error_at("load() requires at least one symbol", line, column));
        }
        Ok(Stmt {
            kind: StmtKind::Load { locator, symbols },
            line,
            column,
        })
    }

    fn expression(&mut self) -> Result<Expr, InterpretationError> {
        self.enter()?;
        let expr = self.sum();
        self.depth -= 1;
        expr
    }

    fn sum(&mut self) -> Result<Expr, InterpretationError> {
        let mut left = self.unary()?;
        let mut links = 0;
        while self.at(&TokenKind::Plus) {
            let (line, column) = self.position();
            self.enter()?;
            links += 1;
            self.advance();
            let right = self.unary()?;
            left = Expr {
                kind: ExprKind::Add(Box::new(left), Box::new(right)),
                line,
                column,
            };
        }
        self.depth -= links;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, InterpretationError> {
        if self.at(&TokenKind::Minus) {
            let (line, column) = self.position();
            self.enter()?;
            self.advance();
            let operand = self.unary();
            self.depth -= 1;
            let operand = operand?;
            return Ok(Expr {
                kind: ExprKind::Neg(Box::new(operand)),
                line,
                column,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, InterpretationError> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            let (line, column) = (expr.line, expr.column);
            if matches!(
                self.peek_kind(),
                TokenKind::LParen | TokenKind::Dot | TokenKind::LBracket
            ) {
                self.enter()?;
                links += 1;
            }
            if self.eat(&TokenKind::LParen) {
                let args = self.arguments()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    line,
                    column,
                };
            } else if self.eat(&TokenKind::Dot) {
                let name = match self.advance().kind {
                    TokenKind::Ident(name) => name,
                    _ => return Err(self.error_here_prev("expected attribute name after '.'")),
                };
                expr = Expr {
                    kind: ExprKind::Attr {
                        object: Box::new(expr),
                        name,
                    },
                    line,
                    column,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr {
                    kind: ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                    column,
                };
            } else {
                self.depth -= links;
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Arg>, InterpretationError> {
        let mut args: Vec<Arg> = Vec::new();
        while !self.eat(&TokenKind::RParen) {
            let named = match (self.peek_kind(), self.peek_kind_at(1)) {
                (TokenKind::Ident(name), Some(TokenKind::Assign)) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = named {
                self.advance();
                self.advance();
                let value = self.expression()?;
                args.push(Arg {
                    name: Some(name),
                    value,
                });
            } else {
                if args.iter().any(|a| a.name.is_some()) {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                let value = self.expression()?;
                args.push(Arg { name: None, value });
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, InterpretationError> {
        let token = self.advance();
        let (line, column) = (token.line, token.column);
        let kind = match token.kind {
            TokenKind::Int(i) => ExprKind::Int(i),
            TokenKind::Float(f) => ExprKind::Float(f),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::Ident(name) => match name.as_str() {
                "True" => ExprKind::Bool(true),
                "False" => ExprKind::Bool(false),
                "None" => ExprKind::None,
                _ => ExprKind::Name(name),
            },
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while !self.eat(&TokenKind::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(TokenKind::RBracket)?;
                        break;
                    }
                }
                ExprKind::List(items)
            }
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&TokenKind::RBrace) {
                    let key = self.expression()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(TokenKind::RBrace)?;
                        break;
                    }
                }
                ExprKind::Dict(entries)
            }
            other => {
                return Err(self.error_at(
                    format!("unexpected {}", other.describe()),
                    line,
                    column,
                ))
            }
        };
        Ok(Expr { kind, line, column })
    }

    fn enter(&mut self) -> Result<(), InterpretationError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            let (line, column) = self.position();
            return Err(InterpretationError::new(
                ExErrorKind::InvalidInput,
                format!(
                    "expression nested deeper than {} levels",
                    MAX_NESTING_DEPTH
                ),
            )
            .at(SourcePosition::new(self.locator, line, column)));
        }
        Ok(())
    }

    // ===== Token helpers =====

    fn peek_kind(&self) -> &TokenKind {
        self.peek_kind_at(0).unwrap_or(&TokenKind::Eof)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn position(&self) -> (u32, u32) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        match self.tokens.get(self.pos) {
            Some(token) => {
                let token = token.clone();
                if token.kind != TokenKind::Eof {
                    self.pos += 1;
                }
                token
            }
            None => {
                let (line, column) = self.position();
                Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                }
            }
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), InterpretationError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek_kind().describe()
            )))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn error_at(&self, message: impl Into<String>, line: u32, column: u32) -> InterpretationError {
        InterpretationError::new(ExErrorKind::Syntax, message)
            .at(SourcePosition::new(self.locator, line, column))
    }

    fn error_here(&self, message: impl Into<String>) -> InterpretationError {
        let (line, column) = self.position();
        self.error_at(message, line, column)
    }

    fn error_here_prev(&self, message: impl Into<String>) -> InterpretationError {
        let token = self
            .pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| (t.line, t.column));
        let (line, column) = token.unwrap_or_else(|| self.position());
        self.error_at(message, line, column)
    }
}

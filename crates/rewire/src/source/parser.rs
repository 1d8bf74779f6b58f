//! Recursive-descent parser for the source language.

use super::ast::*;
use super::lexer::{tokenize, Tok, Token};
use anyhow::{bail, Result};
use rewire_runtime::Value;

/// Parse a program: zero or more function definitions.
pub fn parse_program(src: &str) -> Result<Vec<FunctionDef>> {
    let mut p = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    let mut defs = Vec::new();
    while !p.at_end() {
        defs.push(p.function()?);
    }
    Ok(defs)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            self.unexpected(what)
        }
    }

    fn unexpected<T>(&self, what: &str) -> Result<T> {
        match self.peek() {
            Some(tok) => bail!("line {}: expected {}, found {:?}", self.line(), what, tok),
            None => bail!("line {}: expected {}, found end of input", self.line(), what),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.unexpected(what),
        }
    }

    // ── Items ────────────────────────────────────────────────────────────

    fn function(&mut self) -> Result<FunctionDef> {
        let line = self.line();
        self.expect(Tok::Fn, "`fn`")?;
        let name = self.ident("function name")?;
        self.expect(Tok::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                let param = self.ident("parameter name")?;
                if params.contains(&param) {
                    bail!("line {}: duplicate parameter `{}`", line, param);
                }
                params.push(param);
                if self.eat(&Tok::RParen) {
                    break;
                }
                self.expect(Tok::Comma, "`,` or `)`")?;
            }
        }
        let body = self.block()?;
        Ok(FunctionDef {
            name,
            params,
            body,
            line,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Tok::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.eat(&Tok::RBrace) {
            if self.at_end() {
                return self.unexpected("`}`");
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn stmt(&mut self) -> Result<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Tok::If) => return self.if_stmt(),
            Some(Tok::While) => {
                self.pos += 1;
                let cond = self.expr()?;
                let body = self.block()?;
                StmtKind::While { cond, body }
            }
            Some(Tok::Return) => {
                self.pos += 1;
                let value = match self.peek() {
                    None | Some(Tok::Semi) | Some(Tok::RBrace) => Expr::Lit(Value::Nothing),
                    _ => self.expr()?,
                };
                self.eat(&Tok::Semi);
                StmtKind::Return(value)
            }
            Some(Tok::Ident(_))
                if self.tokens.get(self.pos + 1).map(|t| &t.tok) == Some(&Tok::Assign) =>
            {
                let name = self.ident("name")?;
                self.pos += 1;
                let value = self.expr()?;
                self.eat(&Tok::Semi);
                StmtKind::Assign(name, value)
            }
            _ => {
                let e = self.expr()?;
                self.eat(&Tok::Semi);
                StmtKind::Expr(e)
            }
        };
        Ok(Stmt { kind, line })
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(Tok::If, "`if`")?;
        let cond = self.expr()?;
        let then_body = self.block()?;
        let else_body = if self.eat(&Tok::Else) {
            if self.peek() == Some(&Tok::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            line,
        })
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr> {
        let cond = self.cmp()?;
        if self.eat(&Tok::Question) {
            let then = self.expr()?;
            self.expect(Tok::Colon, "`:`")?;
            let other = self.expr()?;
            return Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(other)));
        }
        Ok(cond)
    }

    /// The operator name of the next token, if it is one of `ops`.
    fn peek_op(&self, ops: &[Tok]) -> Option<&'static str> {
        self.peek()
            .filter(|t| ops.contains(*t))
            .and_then(Tok::binary_op)
    }

    fn cmp(&mut self) -> Result<Expr> {
        let lhs = self.add()?;
        let ops = [Tok::Lt, Tok::Le, Tok::Gt, Tok::Ge, Tok::EqEq, Tok::Ne];
        if let Some(op) = self.peek_op(&ops) {
            self.pos += 1;
            let rhs = self.add()?;
            return Ok(Expr::call(op, vec![lhs, rhs]));
        }
        Ok(lhs)
    }

    fn add(&mut self) -> Result<Expr> {
        let mut lhs = self.mul()?;
        while let Some(op) = self.peek_op(&[Tok::Plus, Tok::Minus]) {
            self.pos += 1;
            let rhs = self.mul()?;
            lhs = Expr::call(op, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn mul(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op(&[Tok::Star, Tok::Slash, Tok::Percent]) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::call(op, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Tok::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::call("neg", vec![operand]));
        }
        if self.eat(&Tok::Bang) {
            let operand = self.unary()?;
            return Ok(Expr::call("!", vec![operand]));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut e = self.primary()?;
        while self.eat(&Tok::LParen) {
            let mut args = Vec::new();
            if !self.eat(&Tok::RParen) {
                loop {
                    args.push(self.expr()?);
                    if self.eat(&Tok::RParen) {
                        break;
                    }
                    self.expect(Tok::Comma, "`,` or `)`")?;
                }
            }
            e = Expr::Call(Box::new(e), args);
        }
        Ok(e)
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        match self.bump() {
            Some(Tok::Int(v)) => Ok(Expr::Lit(Value::Int(v))),
            Some(Tok::Float(v)) => Ok(Expr::Lit(Value::Float(v))),
            Some(Tok::True) => Ok(Expr::Lit(Value::Bool(true))),
            Some(Tok::False) => Ok(Expr::Lit(Value::Bool(false))),
            Some(Tok::Nothing) => Ok(Expr::Lit(Value::Nothing)),
            Some(Tok::Ident(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                let e = self.expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(e)
            }
            Some(tok) => bail!("line {}: expected expression, found {:?}", line, tok),
            None => bail!("line {}: expected expression, found end of input", line),
        }
    }
}

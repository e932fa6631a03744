/// Recursive descent parser for predicate expressions.
///
/// Grammar:
///   expr     = or ("?" or ":" expr)?
///   or       = and ("||" and)*
///   and      = relation ("&&" relation)*
///   relation = sum (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in") sum)*
///   sum      = product (("+" | "-") product)*
///   product  = unary (("*" | "/" | "%") unary)*
///   unary    = "!"+ member | "-"+ member | member
///   member   = primary ("." ident ("(" args ")")? | "[" expr "]")*
///   primary  = ident ("(" args ")")? | literal | "(" expr ")"
///            | "[" list "]" | "{" map_entries "}"
use super::lexer::{Spanned, Token, lex, syntax_error};
use super::{ArithOp, BoolOp, CmpOp, Comprehension, ComprehensionKind, Expr};
use crate::error::CompileError;
use crate::value::Value;

/// Deepest nesting the parser accepts before giving up.
const MAX_DEPTH: usize = 250;

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
    /// Offset reported for errors at end of input.
    end: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|s| &s.token);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        syntax_error(self.offset(), message)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CompileError> {
        match self.peek() {
            Some(tok) if tok == expected => {
                self.advance();
                Ok(())
            }
            Some(tok) => Err(self.error(format!("expected {expected:?}, got {tok:?}"))),
            None => Err(self.error(format!("expected {expected:?}, got end of input"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, CompileError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(tok) => Err(self.error(format!("expected {what}, got {tok:?}"))),
            None => Err(self.error(format!("expected {what}, got end of input"))),
        }
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Left-deep operator chains nest the AST without recursing here, so
    /// each link counts toward the depth limit too.
    fn leave_chain(&mut self, links: usize) {
        self.depth -= links;
    }

    // expr = or ("?" or ":" expr)?
    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let cond = self.parse_or()?;
        let result = if self.peek() == Some(&Token::Question) {
            self.advance();
            let then_branch = self.parse_or()?;
            self.expect(&Token::Colon)?;
            let else_branch = self.parse_expr()?;
            Expr::Conditional(Box::new(cond), Box::new(then_branch), Box::new(else_branch))
        } else {
            cond
        };
        self.leave();
        Ok(result)
    }

    // or = and ("||" and)*
    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut links = 0;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.enter()?;
            links += 1;
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BoolOp(Box::new(left), BoolOp::Or, Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    // and = relation ("&&" relation)*
    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut links = 0;
        let mut left = self.parse_relation()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.enter()?;
            links += 1;
            self.advance();
            let right = self.parse_relation()?;
            left = Expr::BoolOp(Box::new(left), BoolOp::And, Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    // relation = sum (relop sum)*
    fn parse_relation(&mut self) -> Result<Expr, CompileError> {
        let mut links = 0;
        let mut left = self.parse_sum()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => Some(CmpOp::Eq),
                Some(Token::Ne) => Some(CmpOp::Ne),
                Some(Token::Lt) => Some(CmpOp::Lt),
                Some(Token::Le) => Some(CmpOp::Le),
                Some(Token::Gt) => Some(CmpOp::Gt),
                Some(Token::Ge) => Some(CmpOp::Ge),
                Some(Token::In) => None,
                _ => break,
            };
            self.enter()?;
            links += 1;
            self.advance();
            let right = self.parse_sum()?;
            left = match op {
                Some(op) => Expr::Compare(Box::new(left), op, Box::new(right)),
                None => Expr::In(Box::new(left), Box::new(right)),
            };
        }
        self.leave_chain(links);
        Ok(left)
    }

    // sum = product (("+"|"-") product)*
    fn parse_sum(&mut self) -> Result<Expr, CompileError> {
        let mut links = 0;
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.enter()?;
            links += 1;
            self.advance();
            let right = self.parse_product()?;
            left = Expr::Arith(Box::new(left), op, Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    // product = unary (("*"|"/"|"%") unary)*
    fn parse_product(&mut self) -> Result<Expr, CompileError> {
        let mut links = 0;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Mod,
                _ => break,
            };
            self.enter()?;
            links += 1;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(Box::new(left), op, Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    // unary = "!"+ member | "-"+ member | member
    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.enter()?;
                self.advance();
                let inner = self.parse_unary()?;
                self.leave();
                Ok(Expr::Not(Box::new(inner)))
            }
            Some(Token::Minus) => {
                self.enter()?;
                self.advance();
                if self.peek() == Some(&Token::IntMinMagnitude) {
                    self.advance();
                    self.leave();
                    return Ok(Expr::Literal(Value::Int(i64::MIN)));
                }
                // Fold negative numeric literals into constants.
                let inner = self.parse_unary()?;
                self.leave();
                Ok(match inner {
                    Expr::Literal(Value::Int(n)) if n != i64::MIN => Expr::Literal(Value::Int(-n)),
                    Expr::Literal(Value::Double(f)) => Expr::Literal(Value::Double(-f)),
                    other => Expr::Neg(Box::new(other)),
                })
            }
            _ => self.parse_member(),
        }
    }

    // member = primary ("." ident ("(" args ")")? | "[" expr "]")*
    fn parse_member(&mut self) -> Result<Expr, CompileError> {
        let mut links = 0;
        let mut node = self.parse_primary()?;
        loop {
            if matches!(self.peek(), Some(Token::Dot | Token::LBrack)) {
                self.enter()?;
                links += 1;
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident("field name after '.'")?;
                    if self.peek() == Some(&Token::LParen) {
                        self.advance();
                        let args = self.parse_args(&Token::RParen)?;
                        node = self.receiver_call(node, name, args)?;
                    } else {
                        node = Expr::Select(Box::new(node), name);
                    }
                }
                Some(Token::LBrack) => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBrack)?;
                    node = Expr::Index(Box::new(node), Box::new(index));
                }
                _ => break,
            }
        }
        self.leave_chain(links);
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        let Some(tok) = self.advance().cloned() else {
            return Err(self.error("unexpected end of input"));
        };
        match tok {
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Uint(n) => Ok(Expr::Literal(Value::Uint(n))),
            Token::Float(f) => Ok(Expr::Literal(Value::Double(f))),
            Token::IntMinMagnitude => Err(syntax_error(offset, "integer literal out of range")),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Ident(name));
                }
                self.advance();
                let args = self.parse_args(&Token::RParen)?;
                if name == "has" {
                    return match <[Expr; 1]>::try_from(args) {
                        Ok([Expr::Select(operand, field)]) => Ok(Expr::Has(operand, field)),
                        _ => Err(syntax_error(offset, "has() requires a single field selection")),
                    };
                }
                Ok(Expr::Call {
                    target: None,
                    function: name,
                    args,
                })
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBrack => Ok(Expr::List(self.parse_args(&Token::RBrack)?)),
            Token::LBrace => Ok(Expr::Map(self.parse_map_entries()?)),
            other => Err(syntax_error(offset, format!("unexpected token {other:?}"))),
        }
    }

    /// Comma-separated expressions up to `close` (consumed). Allows a
    /// trailing comma.
    fn parse_args(&mut self, close: &Token) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        loop {
            if self.peek() == Some(close) {
                self.advance();
                return Ok(args);
            }
            args.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(tok) if tok == close => {}
                _ => return Err(self.error(format!("expected ',' or {close:?}"))),
            }
        }
    }

    fn parse_map_entries(&mut self) -> Result<Vec<(Expr, Expr)>, CompileError> {
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBrace) {
                self.advance();
                return Ok(entries);
            }
            let key = self.parse_expr()?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::RBrace) => {}
                _ => return Err(self.error("expected ',' or '}' in map literal")),
            }
        }
    }

    /// Build `target.name(args)`, expanding comprehension macros.
    fn receiver_call(
        &mut self,
        target: Expr,
        name: String,
        mut args: Vec<Expr>,
    ) -> Result<Expr, CompileError> {
        let kind = match name.as_str() {
            "all" => ComprehensionKind::All,
            "exists" => ComprehensionKind::Exists,
            "exists_one" => ComprehensionKind::ExistsOne,
            "map" => ComprehensionKind::Map,
            "filter" => ComprehensionKind::Filter,
            _ => {
                return Ok(Expr::Call {
                    target: Some(Box::new(target)),
                    function: name,
                    args,
                });
            }
        };
        let arity_ok = match kind {
            ComprehensionKind::Map => args.len() == 2 || args.len() == 3,
            _ => args.len() == 2,
        };
        if !arity_ok {
            return Err(self.error(format!("wrong number of arguments to macro '{name}'")));
        }
        let var = match args.remove(0) {
            Expr::Ident(var) => var,
            _ => {
                return Err(self.error(format!(
                    "first argument to '{name}' must be a simple identifier"
                )));
            }
        };
        let (predicate, transform) = match (kind, args.len()) {
            (ComprehensionKind::Map, 1) => (None, args.pop()),
            (ComprehensionKind::Map, _) => {
                let transform = args.pop();
                (args.pop(), transform)
            }
            _ => (args.pop(), None),
        };
        Ok(Expr::Comprehension(Box::new(Comprehension {
            kind,
            range: target,
            var,
            predicate,
            transform,
        })))
    }
}

/// Parse predicate text into an AST.
pub fn parse(text: &str) -> Result<Expr, CompileError> {
    if text.trim().is_empty() {
        return Err(CompileError::Empty);
    }
    let tokens = lex(text)?;
    if tokens.is_empty() {
        // Comment-only input.
        return Err(CompileError::Empty);
    }
    let mut parser = Parser::new(&tokens, text.len());
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.error(format!("unexpected token {tok:?} after expression")));
    }
    Ok(expr)
}

use super::{
    BinaryOp, Expr, SyntaxError, UnaryOp,
    lexer::{Token, TokenKind},
};
use crate::data::Value;

/// Deepest formula accepted. Parentheses, call arguments, unary operators
/// and operator chains all count towards it.
pub(crate) const MAX_DEPTH: usize = 200;

/// Recursive-descent parser over the token stream.
///
/// Precedence, loosest first: `+ -`, `* / // %`, unary `- +`, `**`.
/// `**` is right-associative and binds tighter than a unary minus on its
/// left (`-2 ** 2` is `-(2 ** 2)`).
pub(crate) struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    end: usize,
    depth: usize,
}

/// A subtree together with its height.
struct Parsed {
    expr: Expr,
    height: usize,
}

impl Parsed {
    fn leaf(expr: Expr) -> Self {
        Parsed { expr, height: 1 }
    }
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>, source_len: usize) -> Self {
        Parser {
            tokens,
            cursor: 0,
            end: source_len,
            depth: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Expr, SyntaxError> {
        if self.tokens.is_empty() {
            return Err(SyntaxError::new("empty formula", 0));
        }
        let parsed = self.parse_additive()?;
        if let Some(token) = self.tokens.get(self.cursor) {
            return Err(SyntaxError::new("unexpected trailing input", token.offset));
        }
        Ok(parsed.expr)
    }

    fn parse_additive(&mut self) -> Result<Parsed, SyntaxError> {
        let mut parsed = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.cursor += 1;
            let right = self.parse_term()?;
            parsed = self.binary(op, parsed, right)?;
        }
        Ok(parsed)
    }

    fn parse_term(&mut self) -> Result<Parsed, SyntaxError> {
        let mut parsed = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::DoubleSlash) => BinaryOp::FloorDiv,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.cursor += 1;
            let right = self.parse_unary()?;
            parsed = self.binary(op, parsed, right)?;
        }
        Ok(parsed)
    }

    fn parse_unary(&mut self) -> Result<Parsed, SyntaxError> {
        let op = match self.peek() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.cursor += 1;
        let operand = self.nested(Self::parse_unary)?;
        self.node(
            Expr::Unary {
                op,
                operand: Box::new(operand.expr),
            },
            operand.height + 1,
        )
    }

    fn parse_power(&mut self) -> Result<Parsed, SyntaxError> {
        let base = self.parse_primary()?;
        if matches!(self.peek(), Some(TokenKind::DoubleStar)) {
            self.cursor += 1;
            let exponent = self.nested(Self::parse_unary)?;
            return self.binary(BinaryOp::Pow, base, exponent);
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Parsed, SyntaxError> {
        let Some(token) = self.tokens.get(self.cursor).cloned() else {
            return Err(SyntaxError::new("unexpected end of formula", self.end));
        };
        self.cursor += 1;

        match token.kind {
            TokenKind::Number(number) => Ok(Parsed::leaf(Expr::Literal(Value::Number(number)))),
            TokenKind::Text(text) => Ok(Parsed::leaf(Expr::Literal(Value::Text(text)))),
            TokenKind::Ident(name) => {
                if matches!(self.peek(), Some(TokenKind::LParen)) {
                    self.cursor += 1;
                    let args = self.nested(|parser| parser.parse_arguments(token.offset))?;
                    let height = args.iter().map(|arg| arg.height).max().unwrap_or(0) + 1;
                    let args = args.into_iter().map(|arg| arg.expr).collect();
                    return self.node(Expr::Call { name, args }, height);
                }
                Ok(Parsed::leaf(Expr::Variable(name)))
            }
            TokenKind::LParen => {
                let parsed = self.nested(Self::parse_additive)?;
                if !self.consume(&TokenKind::RParen) {
                    return Err(SyntaxError::new("missing closing ')'", self.offset()));
                }
                Ok(parsed)
            }
            other => Err(SyntaxError::new(
                format!("unexpected {}", describe(&other)),
                token.offset,
            )),
        }
    }

    fn parse_arguments(&mut self, call_offset: usize) -> Result<Vec<Parsed>, SyntaxError> {
        let mut args = Vec::new();
        if self.consume(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_additive()?);
            if self.consume(&TokenKind::Comma) {
                continue;
            }
            if self.consume(&TokenKind::RParen) {
                return Ok(args);
            }
            if self.cursor >= self.tokens.len() {
                return Err(SyntaxError::new(
                    "unclosed argument list",
                    call_offset,
                ));
            }
            return Err(SyntaxError::new(
                "expected ',' or ')' in argument list",
                self.offset(),
            ));
        }
    }

    /// Runs `parse` one nesting level down, refusing to go past `MAX_DEPTH`.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn binary(&self, op: BinaryOp, left: Parsed, right: Parsed) -> Result<Parsed, SyntaxError> {
        let height = left.height.max(right.height) + 1;
        self.node(Expr::binary(op, left.expr, right.expr), height)
    }

    fn node(&self, expr: Expr, height: usize) -> Result<Parsed, SyntaxError> {
        if height > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(Parsed { expr, height })
    }

    fn too_deep(&self) -> SyntaxError {
        SyntaxError::new(
            format!("formula nested deeper than {MAX_DEPTH} levels"),
            self.offset(),
        )
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.cursor).map(|token| &token.kind)
    }

    fn consume(&mut self, expected: &TokenKind) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|token| token.offset)
            .unwrap_or(self.end)
    }
}

fn describe(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Number(_) => "number",
        TokenKind::Text(_) => "string",
        TokenKind::Ident(_) => "identifier",
        TokenKind::Plus => "'+'",
        TokenKind::Minus => "'-'",
        TokenKind::Star => "'*'",
        TokenKind::DoubleStar => "'**'",
        TokenKind::Slash => "'/'",
        TokenKind::DoubleSlash => "'//'",
        TokenKind::Percent => "'%'",
        TokenKind::LParen => "'('",
        TokenKind::RParen => "')'",
        TokenKind::Comma => "','",
    }
}

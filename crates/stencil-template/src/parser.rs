/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! Transforms the token stream produced by [`crate::lexer`] into the template
//! AST. The grammar has no assignment, import or definition statements;
//! anything other than `if`/`for` in statement position is a parse error.

use crate::ast::{
    BinaryOp, CallArgs, Comment, Conditional, Const, Expr, ForLoop, Literal, LoopTarget, Print,
    Span, TemplateNode, UnaryOp,
};
use crate::error::{TemplateError, TemplateResult};
use crate::lexer::{Token, TokenKind, line_col, tokenize};

/// Maximum nesting depth of expressions and statements.
pub const MAX_NESTING: usize = 64;

/// A compiled template ready for evaluation.
///
/// Compiled templates are immutable and can be shared across threads
/// (typically as `Arc<Template>` from an [`crate::Environment`] cache).
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// The parsed template AST.
    pub(crate) nodes: Vec<TemplateNode>,

    /// Original source (for error reporting).
    pub(crate) source: String,
}

impl Template {
    /// Compile a template from source text.
    ///
    /// # Arguments
    /// * `source` - The template source text
    ///
    /// # Returns
    /// A compiled template, or a [`TemplateError::ParseError`] if parsing fails.
    pub fn compile(source: &str) -> TemplateResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(source, tokens);
        let nodes = parser.parse_body(&[])?;
        Ok(Template {
            nodes,
            source: source.to_string(),
        })
    }

    /// Get the AST nodes of this template.
    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// Get the source text this template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// How a statement was opened: `<% ... %>` or a `%` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementStyle {
    Block,
    Line,
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn same_kind(a: &TokenKind, b: &TokenKind) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn current(&self) -> &Token {
        // The token stream always ends with Eof, and we never advance past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn previous_span(&self) -> Span {
        if self.pos == 0 {
            self.span()
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        same_kind(self.kind(), kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        let (line, column) = line_col(self.source, self.span().start);
        TemplateError::ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    fn unexpected(&self, expected: &str) -> TemplateError {
        self.error(format!(
            "unexpected {}, expected {}",
            self.kind().describe(),
            expected
        ))
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> TemplateResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self) -> TemplateResult<String> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn enter(&mut self) -> TemplateResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {MAX_NESTING} levels")));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Run a left-associative chain whose loop calls [`enter`](Self::enter)
    /// once per operator, then drop the levels it took.
    fn chain(&mut self, parse: fn(&mut Self) -> TemplateResult<Expr>) -> TemplateResult<Expr> {
        let depth = self.depth;
        let expr = parse(self);
        self.depth = depth;
        expr
    }

    // ========================================================================
    // Template structure
    // ========================================================================

    /// Parse nodes until a statement whose keyword is in `terminators`.
    ///
    /// The terminating statement is left unconsumed for the caller.
    fn parse_body(&mut self, terminators: &[TokenKind]) -> TemplateResult<Vec<TemplateNode>> {
        let mut nodes = Vec::new();

        loop {
            match self.kind() {
                TokenKind::Eof => {
                    if terminators.is_empty() {
                        return Ok(nodes);
                    }
                    let expected: Vec<String> =
                        terminators.iter().map(TokenKind::describe).collect();
                    return Err(self.unexpected(&expected.join(" or ")));
                }
                TokenKind::Text(text) => {
                    nodes.push(TemplateNode::Literal(Literal {
                        text: text.clone(),
                        span: self.span(),
                    }));
                    self.advance();
                }
                TokenKind::Comment(text) => {
                    nodes.push(TemplateNode::Comment(Comment {
                        text: text.clone(),
                        span: self.span(),
                    }));
                    self.advance();
                }
                TokenKind::ExprOpen => nodes.push(self.parse_print()?),
                TokenKind::BlockOpen | TokenKind::LineStatement => {
                    let keyword = self.peek_kind(1);
                    if terminators.iter().any(|t| same_kind(t, keyword)) {
                        return Ok(nodes);
                    }
                    nodes.push(self.parse_statement()?);
                }
                _ => return Err(self.unexpected("text, expression or statement")),
            }
        }
    }

    fn parse_print(&mut self) -> TemplateResult<TemplateNode> {
        let start = self.span();
        self.advance(); // ${
        if self.check(&TokenKind::ExprClose) {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::ExprClose, "'}'")?;
        Ok(TemplateNode::Print(Print {
            expr,
            span: start.to(self.previous_span()),
        }))
    }

    fn open_statement(&mut self) -> TemplateResult<StatementStyle> {
        let style = match self.kind() {
            TokenKind::BlockOpen => StatementStyle::Block,
            TokenKind::LineStatement => StatementStyle::Line,
            _ => return Err(self.unexpected("a statement")),
        };
        self.advance();
        Ok(style)
    }

    fn close_statement(&mut self, style: StatementStyle) -> TemplateResult<()> {
        match style {
            StatementStyle::Block => self.expect(&TokenKind::BlockClose, "'%>'"),
            StatementStyle::Line => {
                self.eat(&TokenKind::Colon);
                self.expect(&TokenKind::LineEnd, "end of line")
            }
        }
    }

    /// Consume a full `<% keyword %>` statement with no arguments.
    fn expect_bare_statement(&mut self, keyword: &TokenKind) -> TemplateResult<()> {
        let style = self.open_statement()?;
        self.expect(keyword, &keyword.describe())?;
        self.close_statement(style)
    }

    fn parse_statement(&mut self) -> TemplateResult<TemplateNode> {
        let start = self.span();
        let style = self.open_statement()?;
        self.enter()?;
        let node = match self.kind() {
            TokenKind::If => self.parse_if(style, start),
            TokenKind::For => self.parse_for(style, start),
            TokenKind::Ident(name) => Err(self.error(format!("unsupported statement '{name}'"))),
            TokenKind::Elif | TokenKind::Else | TokenKind::Endif | TokenKind::Endfor => {
                Err(self.error(format!("unexpected '{}'", self.kind().describe())))
            }
            _ => Err(self.unexpected("'if' or 'for'")),
        };
        self.leave();
        node
    }

    fn parse_if(&mut self, style: StatementStyle, start: Span) -> TemplateResult<TemplateNode> {
        self.advance(); // if
        let condition = self.parse_expr()?;
        self.close_statement(style)?;

        let terminators = [TokenKind::Elif, TokenKind::Else, TokenKind::Endif];
        let mut branches = vec![(condition, self.parse_body(&terminators)?)];
        let mut else_branch = None;

        loop {
            let style = self.open_statement()?;
            match self.kind() {
                TokenKind::Elif => {
                    self.advance();
                    let condition = self.parse_expr()?;
                    self.close_statement(style)?;
                    branches.push((condition, self.parse_body(&terminators)?));
                }
                TokenKind::Else => {
                    self.advance();
                    self.close_statement(style)?;
                    else_branch = Some(self.parse_body(&[TokenKind::Endif])?);
                    self.expect_bare_statement(&TokenKind::Endif)?;
                    break;
                }
                _ => {
                    self.expect(&TokenKind::Endif, "'endif'")?;
                    self.close_statement(style)?;
                    break;
                }
            }
        }

        Ok(TemplateNode::Conditional(Conditional {
            branches,
            else_branch,
            span: start.to(self.previous_span()),
        }))
    }

    fn parse_for(&mut self, style: StatementStyle, start: Span) -> TemplateResult<TemplateNode> {
        self.advance(); // for
        let first = self.expect_ident()?;
        let target = if self.check(&TokenKind::Comma) {
            let mut names = vec![first];
            while self.eat(&TokenKind::Comma) {
                names.push(self.expect_ident()?);
            }
            LoopTarget::Tuple(names)
        } else {
            LoopTarget::Single(first)
        };
        self.expect(&TokenKind::In, "'in'")?;
        let iter = self.parse_expr()?;
        self.close_statement(style)?;

        let body = self.parse_body(&[TokenKind::Else, TokenKind::Endfor])?;
        let style = self.open_statement()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            self.close_statement(style)?;
            let else_body = self.parse_body(&[TokenKind::Endfor])?;
            self.expect_bare_statement(&TokenKind::Endfor)?;
            Some(else_body)
        } else {
            self.expect(&TokenKind::Endfor, "'endfor'")?;
            self.close_statement(style)?;
            None
        };

        Ok(TemplateNode::ForLoop(ForLoop {
            target,
            iter,
            body,
            else_branch,
            span: start.to(self.previous_span()),
        }))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_expr(&mut self) -> TemplateResult<Expr> {
        self.enter()?;
        let expr = self.parse_conditional();
        self.leave();
        expr
    }

    fn parse_conditional(&mut self) -> TemplateResult<Expr> {
        let then = self.parse_or()?;
        if !self.eat(&TokenKind::If) {
            return Ok(then);
        }
        let cond = self.parse_or()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        let span = then.span().to(self.previous_span());
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
            span,
        })
    }

    fn parse_or(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::or_chain)
    }

    fn or_chain(&mut self) -> TemplateResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            self.enter()?;
            let right = self.parse_and()?;
            let span = left.span().to(right.span());
            left = Expr::Or {
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::and_chain)
    }

    fn and_chain(&mut self) -> TemplateResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            self.enter()?;
            let right = self.parse_not()?;
            let span = left.span().to(right.span());
            left = Expr::And {
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> TemplateResult<Expr> {
        if self.check(&TokenKind::Not) {
            let start = self.span();
            self.advance();
            self.enter()?;
            let expr = self.parse_not();
            self.leave();
            let expr = expr?;
            let span = start.to(expr.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::comparison_chain)
    }

    fn comparison_chain(&mut self) -> TemplateResult<Expr> {
        let mut left = self.parse_concat()?;

        loop {
            let op = match self.kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::In => BinaryOp::In,
                TokenKind::Not if matches!(self.peek_kind(1), TokenKind::In) => {
                    self.advance();
                    BinaryOp::NotIn
                }
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_concat()?;
            let span = left.span().to(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_concat(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::concat_chain)
    }

    fn concat_chain(&mut self) -> TemplateResult<Expr> {
        let mut left = self.parse_additive()?;
        while self.eat(&TokenKind::Tilde) {
            self.enter()?;
            let right = self.parse_additive()?;
            let span = left.span().to(right.span());
            left = Expr::Binary {
                op: BinaryOp::Concat,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::additive_chain)
    }

    fn additive_chain(&mut self) -> TemplateResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_term()?;
            let span = left.span().to(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::term_chain)
    }

    fn term_chain(&mut self) -> TemplateResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_unary()?;
            let span = left.span().to(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> TemplateResult<Expr> {
        let op = match self.kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_filtered(),
        };
        let start = self.span();
        self.advance();
        self.enter()?;
        let expr = self.parse_unary();
        self.leave();
        let expr = expr?;
        let span = start.to(expr.span());
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
            span,
        })
    }

    fn parse_filtered(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::filtered_chain)
    }

    fn filtered_chain(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.parse_postfix()?;

        while self.eat(&TokenKind::Pipe) {
            self.enter()?;
            let name = self.expect_ident()?;
            let args = if self.eat(&TokenKind::LParen) {
                let args = self.parse_call_args()?;
                self.expect(&TokenKind::RParen, "')'")?;
                args
            } else {
                CallArgs::default()
            };
            let span = expr.span().to(self.previous_span());
            expr = Expr::Filter {
                expr: Box::new(expr),
                name,
                args,
                span,
            };
        }

        Ok(expr)
    }

    fn parse_postfix(&mut self) -> TemplateResult<Expr> {
        self.chain(Self::postfix_chain)
    }

    fn postfix_chain(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&TokenKind::Dot)
                || self.check(&TokenKind::LBracket)
                || self.check(&TokenKind::LParen)
            {
                self.enter()?;
            }
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_ident()?;
                let span = expr.span().to(self.previous_span());
                expr = Expr::Attr {
                    base: Box::new(expr),
                    name,
                    span,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                let span = expr.span().to(self.previous_span());
                expr = Expr::Item {
                    base: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else if self.eat(&TokenKind::LParen) {
                let args = self.parse_call_args()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let span = expr.span().to(self.previous_span());
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> TemplateResult<Expr> {
        let span = self.span();
        let constant = match self.kind() {
            TokenKind::Str(s) => Some(Const::Str(s.clone())),
            TokenKind::Int(i) => Some(Const::Int(*i)),
            TokenKind::Float(f) => Some(Const::Float(*f)),
            TokenKind::True => Some(Const::Bool(true)),
            TokenKind::False => Some(Const::Bool(false)),
            TokenKind::None => Some(Const::None),
            _ => None,
        };
        if let Some(constant) = constant {
            self.advance();
            return Ok(Expr::Const(constant, span));
        }

        match self.kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Name(name, span))
            }
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr::List(Vec::new(), span.to(self.previous_span())));
                }
                let first = self.parse_expr()?;
                if !self.check(&TokenKind::Comma) {
                    self.expect(&TokenKind::RParen, "')'")?;
                    return Ok(first);
                }
                // Tuple display, represented as a list
                let mut items = vec![first];
                while self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RParen) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr::List(items, span.to(self.previous_span())))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expr()?);
                    while self.eat(&TokenKind::Comma) {
                        if self.check(&TokenKind::RBracket) {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Expr::List(items, span.to(self.previous_span())))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_call_args(&mut self) -> TemplateResult<CallArgs> {
        let mut args = CallArgs::default();
        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            let is_keyword = matches!(self.kind(), TokenKind::Ident(_))
                && matches!(self.peek_kind(1), TokenKind::Assign);
            if is_keyword {
                let name = self.expect_ident()?;
                self.advance(); // =
                let value = self.parse_expr()?;
                args.keyword.push((name, value));
            } else {
                if !args.keyword.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.positional.push(self.parse_expr()?);
            }

            if !self.eat(&TokenKind::Comma) || self.check(&TokenKind::RParen) {
                break;
            }
        }

        Ok(args)
    }
}

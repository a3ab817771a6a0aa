/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Lexer for the template language.
//!
//! The delimiter set is fixed:
//!
//! | Construct        | Syntax                                   |
//! |------------------|------------------------------------------|
//! | block statement  | `<% ... %>`                              |
//! | expression       | `${ ... }`                               |
//! | comment          | `<%doc> ... </%doc>`                     |
//! | line statement   | line whose first non-blank char is `%`   |
//! | line comment     | line whose first non-blank chars are `##`|
//!
//! The first newline after a block tag or comment is dropped. Line statements
//! and line comments consume their whole line.

use crate::ast::Span;
use crate::error::{TemplateError, TemplateResult};

pub const BLOCK_START: &str = "<%";
pub const BLOCK_END: &str = "%>";
pub const EXPR_START: &str = "${";
pub const EXPR_END: &str = "}";
pub const COMMENT_START: &str = "<%doc>";
pub const COMMENT_END: &str = "</%doc>";
pub const LINE_STATEMENT_PREFIX: &str = "%";
pub const LINE_COMMENT_PREFIX: &str = "##";

/// A token with its span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Text(String),
    Comment(String),
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),

    // Keywords
    If,
    Elif,
    Else,
    Endif,
    For,
    In,
    Endfor,
    True,
    False,
    None,
    Not,
    And,
    Or,

    // Delimiters
    ExprOpen,
    ExprClose,
    BlockOpen,
    BlockClose,
    LineStatement,
    LineEnd,

    // Operators
    Dot,
    Comma,
    Colon,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Tilde,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,

    Eof,
}

impl TokenKind {
    fn from_ident(s: &str) -> TokenKind {
        match s {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "endif" => TokenKind::Endif,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "endfor" => TokenKind::Endfor,
            "true" | "True" => TokenKind::True,
            "false" | "False" => TokenKind::False,
            "none" | "None" => TokenKind::None,
            "not" => TokenKind::Not,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            _ => TokenKind::Ident(s.to_string()),
        }
    }

    /// Short description used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Text(_) => "text".to_string(),
            TokenKind::Comment(_) => "comment".to_string(),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Int(i) => format!("number {i}"),
            TokenKind::Float(f) => format!("number {f}"),
            TokenKind::Ident(name) => format!("name '{name}'"),
            TokenKind::ExprOpen => format!("'{EXPR_START}'"),
            TokenKind::ExprClose => format!("'{EXPR_END}'"),
            TokenKind::BlockOpen => format!("'{BLOCK_START}'"),
            TokenKind::BlockClose => format!("'{BLOCK_END}'"),
            TokenKind::LineStatement => "line statement".to_string(),
            TokenKind::LineEnd => "end of line".to_string(),
            TokenKind::Eof => "end of template".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::Endif => "endif",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Endfor => "endfor",
            TokenKind::True => "True",
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::Not => "not",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Pipe => "|",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Tilde => "~",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Assign => "=",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Expr,
    Block,
    Line,
}

/// Lexer state.
pub struct Lexer<'a> {
    source: &'a str,
    /// Current byte position in source
    pos: usize,
    mode: Mode,
    /// Open brackets inside the current code section
    depth: usize,
    tokens: Vec<Token>,
}

/// Tokenize a whole template source.
pub fn tokenize(source: &str) -> TemplateResult<Vec<Token>> {
    Lexer::new(source).run()
}

/// Compute a 1-based (line, column) pair for a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            mode: Mode::Text,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    pub fn run(mut self) -> TemplateResult<Vec<Token>> {
        while self.pos < self.source.len() {
            match self.mode {
                Mode::Text => self.lex_text()?,
                Mode::Expr | Mode::Block | Mode::Line => self.lex_code()?,
            }
        }

        match self.mode {
            Mode::Text => {}
            Mode::Line => self.push(TokenKind::LineEnd, self.pos, self.pos),
            Mode::Expr => return Err(self.error_at(self.pos, format!("expected '{EXPR_END}'"))),
            Mode::Block => {
                return Err(self.error_at(self.pos, format!("expected '{BLOCK_END}'")));
            }
        }
        self.push(TokenKind::Eof, self.pos, self.pos);
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> TemplateError {
        let (line, column) = line_col(self.source, offset);
        TemplateError::ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.source.as_bytes()[self.pos - 1] == b'\n'
    }

    /// Skip a single newline (trim blocks).
    fn trim_newline(&mut self) {
        if self.rest().starts_with("\r\n") {
            self.pos += 2;
        } else if self.rest().starts_with('\n') {
            self.pos += 1;
        }
    }

    fn flush_text(&mut self, start: usize) {
        if self.pos > start {
            let text = self.source[start..self.pos].to_string();
            self.push(TokenKind::Text(text), start, self.pos);
        }
    }

    /// Lex raw template text until the next delimiter switches mode.
    fn lex_text(&mut self) -> TemplateResult<()> {
        let start = self.pos;

        while self.pos < self.source.len() {
            if self.at_line_start() && self.lex_line_prefix(start)? {
                return Ok(());
            }

            let rest = self.rest();
            if rest.starts_with(COMMENT_START) {
                self.flush_text(start);
                self.lex_comment()?;
                return Ok(());
            }
            if rest.starts_with(BLOCK_START) {
                self.flush_text(start);
                let open = self.pos;
                self.pos += BLOCK_START.len();
                self.push(TokenKind::BlockOpen, open, self.pos);
                self.mode = Mode::Block;
                self.depth = 0;
                return Ok(());
            }
            if rest.starts_with(EXPR_START) {
                self.flush_text(start);
                let open = self.pos;
                self.pos += EXPR_START.len();
                self.push(TokenKind::ExprOpen, open, self.pos);
                self.mode = Mode::Expr;
                self.depth = 0;
                return Ok(());
            }
            self.advance();
        }

        self.flush_text(start);
        Ok(())
    }

    /// Handle `%` line statements and `##` line comments at the start of a line.
    ///
    /// Returns `true` when a line construct was consumed.
    fn lex_line_prefix(&mut self, text_start: usize) -> TemplateResult<bool> {
        let indent = self
            .rest()
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(self.rest().len());
        let after_indent = &self.rest()[indent..];

        if after_indent.starts_with(LINE_COMMENT_PREFIX) {
            self.flush_text(text_start);
            let start = self.pos;
            let body_start = self.pos + indent + LINE_COMMENT_PREFIX.len();
            let line_end = self.source[body_start..]
                .find('\n')
                .map_or(self.source.len(), |i| body_start + i);
            let text = self.source[body_start..line_end].trim_end_matches('\r');
            self.push(TokenKind::Comment(text.to_string()), start, line_end);
            self.pos = line_end;
            self.trim_newline();
            return Ok(true);
        }

        if after_indent.starts_with(LINE_STATEMENT_PREFIX) && !after_indent.starts_with(BLOCK_END)
        {
            self.flush_text(text_start);
            let start = self.pos + indent;
            self.pos = start + LINE_STATEMENT_PREFIX.len();
            self.push(TokenKind::LineStatement, start, self.pos);
            self.mode = Mode::Line;
            self.depth = 0;
            return Ok(true);
        }

        Ok(false)
    }

    fn lex_comment(&mut self) -> TemplateResult<()> {
        let start = self.pos;
        let body_start = start + COMMENT_START.len();
        let Some(len) = self.source[body_start..].find(COMMENT_END) else {
            return Err(self.error_at(start, "unclosed comment"));
        };
        let text = self.source[body_start..body_start + len].to_string();
        self.pos = body_start + len + COMMENT_END.len();
        self.push(TokenKind::Comment(text), start, self.pos);
        self.trim_newline();
        Ok(())
    }

    /// Skip whitespace inside a code section. Returns `true` if a line
    /// statement was terminated by a newline.
    fn skip_code_whitespace(&mut self) -> bool {
        while let Some(c) = self.peek() {
            if c == '\n' && self.mode == Mode::Line && self.depth == 0 {
                let start = self.pos;
                self.advance();
                self.push(TokenKind::LineEnd, start, self.pos);
                self.mode = Mode::Text;
                return true;
            }
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        false
    }

    /// Lex one token inside `${ }`, `<% %>` or a line statement.
    fn lex_code(&mut self) -> TemplateResult<()> {
        if self.skip_code_whitespace() {
            return Ok(());
        }
        let start = self.pos;
        let rest = self.rest();
        if rest.is_empty() {
            return Ok(());
        }

        if self.mode == Mode::Block && rest.starts_with(BLOCK_END) {
            self.pos += BLOCK_END.len();
            self.push(TokenKind::BlockClose, start, self.pos);
            self.mode = Mode::Text;
            self.trim_newline();
            return Ok(());
        }
        if self.mode == Mode::Expr && self.depth == 0 && rest.starts_with(EXPR_END) {
            self.pos += EXPR_END.len();
            self.push(TokenKind::ExprClose, start, self.pos);
            self.mode = Mode::Text;
            return Ok(());
        }

        let two = match rest.get(..2) {
            Some("//") => Some(TokenKind::DoubleSlash),
            Some("==") => Some(TokenKind::Eq),
            Some("!=") => Some(TokenKind::Ne),
            Some("<=") => Some(TokenKind::Le),
            Some(">=") => Some(TokenKind::Ge),
            _ => None,
        };
        if let Some(kind) = two {
            self.pos += 2;
            self.push(kind, start, self.pos);
            return Ok(());
        }

        let Some(c) = self.peek() else {
            return Ok(());
        };
        let kind = match c {
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '|' => TokenKind::Pipe,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '~' => TokenKind::Tilde,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '=' => TokenKind::Assign,
            '"' | '\'' => return self.lex_string(c),
            '0'..='9' => return self.lex_number(),
            c if c.is_alphabetic() || c == '_' => return self.lex_ident(),
            other => {
                return Err(self.error_at(start, format!("unexpected character '{other}'")));
            }
        };
        match kind {
            TokenKind::LParen | TokenKind::LBracket => self.depth += 1,
            TokenKind::RParen | TokenKind::RBracket => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.advance();
        self.push(kind, start, self.pos);
        Ok(())
    }

    /// Lex a string literal; supports single, double and triple quotes.
    fn lex_string(&mut self, quote: char) -> TemplateResult<()> {
        let start = self.pos;
        let triple: String = std::iter::repeat_n(quote, 3).collect();
        let delimiter = if self.rest().starts_with(&triple) {
            triple
        } else {
            quote.to_string()
        };
        self.pos += delimiter.len();

        let mut value = String::new();
        loop {
            if self.rest().starts_with(&delimiter) {
                self.pos += delimiter.len();
                break;
            }
            match self.advance() {
                None => return Err(self.error_at(start, "unterminated string")),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some('\'') => value.push('\''),
                    Some('"') => value.push('"'),
                    Some(c) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => return Err(self.error_at(start, "unterminated string")),
                },
                Some(c) => value.push(c),
            }
        }

        self.push(TokenKind::Str(value), start, self.pos);
        Ok(())
    }

    /// Lex a number (int or float).
    fn lex_number(&mut self) -> TemplateResult<()> {
        let start = self.pos;
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else if c == '.' && !is_float {
                // Only a float if a digit follows; otherwise it's attribute access
                let next = self.source[self.pos + 1..].chars().next();
                if next.is_some_and(|n| n.is_ascii_digit()) {
                    is_float = true;
                    self.advance();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let text: String = self.source[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        let kind = if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error_at(start, format!("invalid number '{text}'")))?
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error_at(start, format!("invalid number '{text}'")))?
        };
        self.push(kind, start, self.pos);
        Ok(())
    }

    fn lex_ident(&mut self) -> TemplateResult<()> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let kind = TokenKind::from_ident(&self.source[start..self.pos]);
        self.push(kind, start, self.pos);
        Ok(())
    }
}

//! JMS-style selector expressions.
//!
//! The grammar is the SQL-92 conditional subset used by JMS message
//! selectors:
//!
//! ```text
//! or_expr    := and_expr ( OR and_expr )*
//! and_expr   := not_expr ( AND not_expr )*
//! not_expr   := NOT not_expr | predicate
//! predicate  := additive [ cmp_op additive
//!                        | [NOT] BETWEEN additive AND additive
//!                        | [NOT] IN '(' string ( ',' string )* ')'
//!                        | [NOT] LIKE string [ ESCAPE string ]
//!                        | IS [NOT] NULL ]
//! additive   := multiplicative ( ('+' | '-') multiplicative )*
//! multiplicative := unary ( ('*' | '/') unary )*
//! unary      := ('-' | '+') unary | primary
//! primary    := literal | identifier | '(' or_expr ')'
//! ```
//!
//! Evaluation follows SQL three-valued logic. A missing property, a `null`
//! header, a type mismatch or a division by zero yields *unknown*, and a
//! selector only matches when it evaluates to true.
//!
//! `AND`/`OR` chains are kept flat and evaluated iteratively. Nesting depth
//! and operand count are bounded at parse time so that evaluating and
//! dropping an accepted selector never recurses deeper than [`MAX_DEPTH`].

use std::cmp::Ordering;

use super::{FilterError, Filterable};
use crate::message::Value;

/// Deepest expression tree a selector may compile to.
pub const MAX_DEPTH: usize = 64;

/// Most literals and identifiers a selector may contain.
pub const MAX_OPERANDS: usize = 1024;

/// A parsed selector, ready for evaluation.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    root: Expr,
}

impl Selector {
    /// Parses a selector expression.
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
            operands: 0,
        };
        let root = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(syntax(token.offset, format!("unexpected {}", token.kind.describe())));
        }
        if root.depth() > MAX_DEPTH {
            return Err(syntax(0, format!("selector nests deeper than {MAX_DEPTH} levels")));
        }
        if !root.is_condition() {
            return Err(syntax(0, "selector must be a boolean expression"));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The expression text this selector was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the selector. Unknown results do not match.
    pub fn matches(&self, message: &dyn Filterable) -> bool {
        self.root.eval_condition(message) == Some(true)
    }
}

fn syntax(position: usize, message: impl Into<String>) -> FilterError {
    FilterError::Syntax {
        position,
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    And,
    Or,
    Not,
    Between,
    In,
    Like,
    Escape,
    Is,
    Null,
    True,
    False,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Int(n) => format!("number {n}"),
            TokenKind::Float(n) => format!("number {n}"),
            other => format!("{other:?}").to_uppercase(),
        }
    }

    fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "BETWEEN" => TokenKind::Between,
            "IN" => TokenKind::In,
            "LIKE" => TokenKind::Like,
            "ESCAPE" => TokenKind::Escape,
            "IS" => TokenKind::Is,
            "NULL" => TokenKind::Null,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, FilterError> {
        let mut tokens = Vec::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let kind = match c {
                '\'' => TokenKind::Str(self.quoted(offset, '\'')?),
                '"' => TokenKind::Ident(self.quoted(offset, '"')?),
                '0'..='9' | '.' => self.number(offset)?,
                c if c.is_alphabetic() || c == '_' || c == '$' => self.word(offset),
                _ => self.operator(offset, c)?,
            };
            tokens.push(Token { kind, offset });
        }
        Ok(tokens)
    }

    /// Reads a quoted literal; a doubled quote stands for itself.
    fn quoted(&mut self, start: usize, quote: char) -> Result<String, FilterError> {
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => {
                    if matches!(self.chars.peek(), Some(&(_, next)) if next == quote) {
                        self.chars.next();
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some((_, c)) => out.push(c),
                None => return Err(syntax(start, "unterminated quoted literal")),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, FilterError> {
        let mut end = start;
        let mut is_float = false;
        let mut prev = '\0';
        while let Some(&(offset, c)) = self.chars.peek() {
            let accept = c.is_ascii_digit()
                || c == '.'
                || c == 'e'
                || c == 'E'
                || ((c == '+' || c == '-') && (prev == 'e' || prev == 'E'));
            if !accept {
                break;
            }
            if !c.is_ascii_digit() {
                is_float = true;
            }
            prev = c;
            end = offset + c.len_utf8();
            self.chars.next();
        }
        let text = &self.src[start..end];
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| syntax(start, format!("invalid number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| syntax(start, format!("integer '{text}' out of range")))
        }
    }

    fn word(&mut self, start: usize) -> TokenKind {
        let mut end = start;
        while let Some(&(offset, c)) = self.chars.peek() {
            if !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.') {
                break;
            }
            end = offset + c.len_utf8();
            self.chars.next();
        }
        let word = &self.src[start..end];
        TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
    }

    fn operator(&mut self, offset: usize, c: char) -> Result<TokenKind, FilterError> {
        self.chars.next();
        let next = self.chars.peek().map(|&(_, n)| n);
        let kind = match (c, next) {
            ('<', Some('>')) => {
                self.chars.next();
                TokenKind::Ne
            }
            ('<', Some('=')) => {
                self.chars.next();
                TokenKind::Le
            }
            ('>', Some('=')) => {
                self.chars.next();
                TokenKind::Ge
            }
            ('<', _) => TokenKind::Lt,
            ('>', _) => TokenKind::Gt,
            ('=', _) => TokenKind::Eq,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            (',', _) => TokenKind::Comma,
            _ => return Err(syntax(offset, format!("unexpected character '{c}'"))),
        };
        Ok(kind)
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Property(String),
    Neg(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    In {
        expr: Box<Expr>,
        list: Vec<String>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: LikePattern,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    /// True if the expression can yield a boolean.
    fn is_condition(&self) -> bool {
        match self {
            Expr::Literal(Value::Bool(_)) | Expr::Property(_) => true,
            Expr::Literal(_) | Expr::Neg(_) | Expr::Arith(..) => false,
            _ => true,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Property(_) => Vec::new(),
            Expr::Neg(inner) | Expr::Not(inner) => vec![inner.as_ref()],
            Expr::Arith(_, left, right) | Expr::Compare(_, left, right) => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::And(terms) | Expr::Or(terms) => terms.iter().collect(),
            Expr::Between { expr, low, high, .. } => {
                vec![expr.as_ref(), low.as_ref(), high.as_ref()]
            }
            Expr::In { expr, .. } | Expr::Like { expr, .. } | Expr::IsNull { expr, .. } => {
                vec![expr.as_ref()]
            }
        }
    }

    /// Height of the tree, computed without recursion.
    fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, level)) = pending.pop() {
            deepest = deepest.max(level);
            pending.extend(expr.children().into_iter().map(|child| (child, level + 1)));
        }
        deepest
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    /// Current recursion depth through `NOT`, unary signs and parentheses.
    depth: usize,
    operands: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), FilterError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> FilterError {
        match self.peek() {
            Some(token) => syntax(
                token.offset,
                format!("expected {expected}, found {}", token.kind.describe()),
            ),
            None => syntax(self.end, format!("expected {expected}, found end of input")),
        }
    }

    fn enter(&mut self) -> Result<(), FilterError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(
                self.offset(),
                format!("selector nests deeper than {MAX_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&TokenKind::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut terms = vec![self.parse_not()?];
        while self.eat(&TokenKind::And) {
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, FilterError> {
        let left = self.parse_additive()?;

        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => Some(CmpOp::Eq),
            Some(TokenKind::Ne) => Some(CmpOp::Ne),
            Some(TokenKind::Lt) => Some(CmpOp::Lt),
            Some(TokenKind::Le) => Some(CmpOp::Le),
            Some(TokenKind::Gt) => Some(CmpOp::Gt),
            Some(TokenKind::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }

        if self.eat(&TokenKind::Is) {
            let negated = self.eat(&TokenKind::Not);
            self.expect(TokenKind::Null, "NULL")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = self.eat(&TokenKind::Not);
        match self.peek_kind() {
            Some(TokenKind::Between) => {
                self.advance();
                let low = self.parse_additive()?;
                self.expect(TokenKind::And, "AND")?;
                let high = self.parse_additive()?;
                Ok(Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                })
            }
            Some(TokenKind::In) => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let mut list = vec![self.string_literal()?];
                while self.eat(&TokenKind::Comma) {
                    list.push(self.string_literal()?);
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::In {
                    expr: Box::new(left),
                    list,
                    negated,
                })
            }
            Some(TokenKind::Like) => {
                self.advance();
                let pattern_offset = self.offset();
                let pattern = self.string_literal()?;
                let escape = if self.eat(&TokenKind::Escape) {
                    let escape_offset = self.offset();
                    let text = self.string_literal()?;
                    let mut chars = text.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(c),
                        _ => {
                            return Err(syntax(
                                escape_offset,
                                "ESCAPE must be a single character",
                            ))
                        }
                    }
                } else {
                    None
                };
                let pattern = LikePattern::compile(&pattern, escape)
                    .map_err(|message| syntax(pattern_offset, message))?;
                Ok(Expr::Like {
                    expr: Box::new(left),
                    pattern,
                    negated,
                })
            }
            _ if negated => Err(self.unexpected("BETWEEN, IN or LIKE after NOT")),
            _ => Ok(left),
        }
    }

    fn string_literal(&mut self) -> Result<String, FilterError> {
        match self.peek_kind() {
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(match inner {
                Expr::Literal(Value::Int(n)) => Expr::Literal(Value::Int(-n)),
                Expr::Literal(Value::Float(n)) => Expr::Literal(Value::Float(-n)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        if self.eat(&TokenKind::Plus) {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(inner);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        let Some(token) = self.advance() else {
            return Err(syntax(self.end, "unexpected end of input"));
        };
        if token.kind != TokenKind::LParen {
            self.operands += 1;
            if self.operands > MAX_OPERANDS {
                return Err(syntax(
                    token.offset,
                    format!("selector has more than {MAX_OPERANDS} operands"),
                ));
            }
        }
        let expr = match token.kind {
            TokenKind::Ident(name) => Expr::Property(name),
            TokenKind::Str(s) => Expr::Literal(Value::String(s)),
            TokenKind::Int(n) => Expr::Literal(Value::Int(n)),
            TokenKind::Float(n) => Expr::Literal(Value::Float(n)),
            TokenKind::True => Expr::Literal(Value::Bool(true)),
            TokenKind::False => Expr::Literal(Value::Bool(false)),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.leave();
                inner
            }
            other => {
                return Err(syntax(
                    token.offset,
                    format!("unexpected {}", other.describe()),
                ))
            }
        };
        Ok(expr)
    }
}

// ---------------------------------------------------------------------------
// LIKE patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum LikeToken {
    Char(char),
    AnyOne,
    AnyMany,
}

#[derive(Debug, Clone)]
struct LikePattern {
    tokens: Vec<LikeToken>,
}

impl LikePattern {
    fn compile(pattern: &str, escape: Option<char>) -> Result<Self, String> {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            if Some(c) == escape {
                match chars.next() {
                    Some(escaped) => tokens.push(LikeToken::Char(escaped)),
                    None => return Err("LIKE pattern ends with the escape character".to_string()),
                }
            } else if c == '%' {
                if tokens.last() != Some(&LikeToken::AnyMany) {
                    tokens.push(LikeToken::AnyMany);
                }
            } else if c == '_' {
                tokens.push(LikeToken::AnyOne);
            } else {
                tokens.push(LikeToken::Char(c));
            }
        }
        Ok(Self { tokens })
    }

    fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let (mut t, mut p) = (0, 0);
        // Backtrack point: pattern index after the last `%` and the text index it covers up to.
        let mut star: Option<(usize, usize)> = None;
        while t < text.len() {
            match self.tokens.get(p) {
                Some(LikeToken::AnyMany) => {
                    star = Some((p + 1, t));
                    p += 1;
                }
                Some(LikeToken::AnyOne) => {
                    t += 1;
                    p += 1;
                }
                Some(LikeToken::Char(c)) if *c == text[t] => {
                    t += 1;
                    p += 1;
                }
                _ => match star {
                    Some((sp, st)) => {
                        p = sp;
                        t = st + 1;
                        star = Some((sp, st + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens[p..].iter().all(|tok| *tok == LikeToken::AnyMany)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    fn apply(self, op: ArithOp, other: Number) -> Option<Number> {
        if let (Number::Int(a), Number::Int(b)) = (self, other) {
            let exact = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div if b == 0 => return None,
                ArithOp::Div => a.checked_div(b),
            };
            if let Some(n) = exact {
                return Some(Number::Int(n));
            }
        }
        let (a, b) = (self.as_f64(), other.as_f64());
        let result = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div if b == 0.0 => return None,
            ArithOp::Div => a / b,
        };
        Some(Number::Float(result))
    }
}

/// Result of evaluating a sub-expression. `Unknown` is SQL's null.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Unknown,
    Bool(bool),
    Num(Number),
    Str(String),
}

impl Operand {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Operand::Unknown,
            Value::Bool(b) => Operand::Bool(*b),
            Value::Int(n) => Operand::Num(Number::Int(*n)),
            Value::Float(n) => Operand::Num(Number::Float(*n)),
            Value::String(s) => Operand::Str(s.clone()),
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Operand::Num(n) => Some(*n),
            _ => None,
        }
    }
}

impl Expr {
    fn eval(&self, message: &dyn Filterable) -> Operand {
        match self {
            Expr::Literal(value) => Operand::from_value(value),
            Expr::Property(name) => message
                .property(name)
                .map(|v| Operand::from_value(&v))
                .unwrap_or(Operand::Unknown),
            Expr::Neg(inner) => match inner.eval(message).number() {
                Some(Number::Int(n)) => n
                    .checked_neg()
                    .map(|n| Operand::Num(Number::Int(n)))
                    .unwrap_or(Operand::Num(Number::Float(-(n as f64)))),
                Some(Number::Float(n)) => Operand::Num(Number::Float(-n)),
                None => Operand::Unknown,
            },
            Expr::Arith(op, left, right) => {
                match (left.eval(message).number(), right.eval(message).number()) {
                    (Some(a), Some(b)) => a.apply(*op, b).map(Operand::Num).unwrap_or(Operand::Unknown),
                    _ => Operand::Unknown,
                }
            }
            _ => match self.eval_condition(message) {
                Some(b) => Operand::Bool(b),
                None => Operand::Unknown,
            },
        }
    }

    /// Three-valued boolean evaluation: `None` is unknown.
    fn eval_condition(&self, message: &dyn Filterable) -> Option<bool> {
        match self {
            Expr::And(terms) => {
                let mut result = Some(true);
                for term in terms {
                    match term.eval_condition(message) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Expr::Or(terms) => {
                let mut result = Some(false);
                for term in terms {
                    match term.eval_condition(message) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Expr::Not(inner) => inner.eval_condition(message).map(|b| !b),
            Expr::Compare(op, left, right) => compare(*op, &left.eval(message), &right.eval(message)),
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = expr.eval(message).number()?;
                let low = low.eval(message).number()?;
                let high = high.eval(message).number()?;
                let inside = value.compare(low)? != Ordering::Less
                    && value.compare(high)? != Ordering::Greater;
                Some(inside != *negated)
            }
            Expr::In {
                expr,
                list,
                negated,
            } => match expr.eval(message) {
                Operand::Str(s) => Some(list.iter().any(|item| *item == s) != *negated),
                _ => None,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => match expr.eval(message) {
                Operand::Str(s) => Some(pattern.matches(&s) != *negated),
                _ => None,
            },
            Expr::IsNull { expr, negated } => {
                let is_null = expr.eval(message) == Operand::Unknown;
                Some(is_null != *negated)
            }
            other => match other.eval(message) {
                Operand::Bool(b) => Some(b),
                _ => None,
            },
        }
    }
}

fn compare(op: CmpOp, left: &Operand, right: &Operand) -> Option<bool> {
    let ordering = match (left, right) {
        (Operand::Num(a), Operand::Num(b)) => a.compare(*b)?,
        (Operand::Str(a), Operand::Str(b)) => {
            return match op {
                CmpOp::Eq => Some(a == b),
                CmpOp::Ne => Some(a != b),
                _ => None,
            }
        }
        (Operand::Bool(a), Operand::Bool(b)) => {
            return match op {
                CmpOp::Eq => Some(a == b),
                CmpOp::Ne => Some(a != b),
                _ => None,
            }
        }
        _ => return None,
    };
    let result = match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    };
    Some(result)
}

//! Query text parsing and time-bound extraction.
//!
//! The grammar is the subset the store accepts from this client:
//!
//! ```text
//! statement  := SELECT projection FROM ident [WHERE or_expr] [;]
//!             | DESCRIBE ident [;]
//! projection := '*' | ident (',' ident)*
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := primary (AND primary)*
//! primary    := '(' or_expr ')' | operand cmp operand
//! operand    := ident | 'string' | integer | float | TRUE | FALSE
//! ```
//!
//! For planning, only the time column matters. [`extract_time_range`] walks
//! the top-level conjunction, folds every comparison on the time column into
//! a half-open `[start, end)` interval, and hands back the remaining conjuncts
//! untouched as the residual predicate.

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, NaiveDateTime};
use snafu::prelude::*;

use crate::{
    data::{Cell, Row},
    planner::TimeRange,
    schema::ColumnDescription,
};

/// Errors produced while parsing query text or extracting time bounds.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum PredicateError {
    /// The text contained nothing to parse.
    #[snafu(display("query text is empty"))]
    Empty,

    /// A character that starts no token.
    #[snafu(display("unexpected character '{character}' at offset {position}"))]
    UnexpectedCharacter {
        /// The offending character.
        character: char,
        /// Byte offset into the text.
        position: usize,
    },

    /// A quoted string or identifier ran to the end of the text.
    #[snafu(display("unterminated quote starting at offset {position}"))]
    UnterminatedQuote {
        /// Byte offset of the opening quote.
        position: usize,
    },

    /// A numeric literal could not be parsed.
    #[snafu(display("invalid numeric literal '{text}'"))]
    InvalidNumber {
        /// The literal as written.
        text: String,
    },

    /// A token other than the one the grammar requires.
    #[snafu(display("expected {expected}, found {found}"))]
    UnexpectedToken {
        /// What the grammar required.
        expected: &'static str,
        /// What was there instead.
        found: String,
    },

    /// The text ended where the grammar required more.
    #[snafu(display("expected {expected}, found end of query"))]
    UnexpectedEnd {
        /// What the grammar required.
        expected: &'static str,
    },

    /// The time column appears under OR, where it cannot bound a range.
    #[snafu(display("time column '{column}' may only be constrained by top-level AND terms"))]
    TimeColumnInDisjunction {
        /// The time column.
        column: String,
    },

    /// The time column is bounded on one side only.
    #[snafu(display("time column '{column}' has no {side} bound"))]
    MissingTimeBound {
        /// The time column.
        column: String,
        /// "lower" or "upper".
        side: &'static str,
    },

    /// An operator that cannot bound a time range.
    #[snafu(display("operator {op} cannot bound time column '{column}'"))]
    UnsupportedTimeOperator {
        /// The time column.
        column: String,
        /// The operator used.
        op: CmpOp,
    },

    /// A literal compared against the time column is not a timestamp.
    #[snafu(display("'{literal}' is not a timestamp for column '{column}'"))]
    InvalidTimeLiteral {
        /// The time column.
        column: String,
        /// The literal as rendered.
        literal: String,
    },

    /// Converting an exclusive bound to an inclusive one overflowed.
    #[snafu(display("time bound on column '{column}' overflows"))]
    TimeBoundOverflow {
        /// The time column.
        column: String,
    },

    /// The predicate names a column the rows do not have.
    #[snafu(display("unknown column '{column}'"))]
    UnknownColumn {
        /// The column name.
        column: String,
    },

    /// A literal cannot be compared with the column's values.
    #[snafu(display("cannot compare column '{column}' with {literal}"))]
    Incomparable {
        /// The column name.
        column: String,
        /// The literal as rendered.
        literal: String,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=` or `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CmpOp {
    /// The operator with its operands swapped (`a < b` is `b > a`).
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::LtEq => CmpOp::GtEq,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::GtEq => CmpOp::LtEq,
            same => same,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::NotEq => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::LtEq => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        })
    }
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Single-quoted text.
    Str(String),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// `TRUE` / `FALSE`.
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// `column op literal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Column name.
    pub column: String,
    /// Operator, oriented with the column on the left.
    pub op: CmpOp,
    /// Literal operand.
    pub value: Literal,
}

/// A boolean predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Both sides hold.
    And(Box<Predicate>, Box<Predicate>),
    /// Either side holds.
    Or(Box<Predicate>, Box<Predicate>),
    /// A single comparison.
    Compare(Comparison),
}

impl Predicate {
    /// Conjoin two predicates.
    pub fn and(left: Predicate, right: Predicate) -> Predicate {
        Predicate::And(Box::new(left), Box::new(right))
    }

    /// The top-level AND terms, left to right.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Predicate::And(l, r) => {
                let mut terms = l.conjuncts();
                terms.extend(r.conjuncts());
                terms
            }
            other => vec![other],
        }
    }

    /// Whether any comparison in the tree names `column`.
    pub fn mentions(&self, column: &str) -> bool {
        match self {
            Predicate::And(l, r) | Predicate::Or(l, r) => l.mentions(column) || r.mentions(column),
            Predicate::Compare(c) => c.column == column,
        }
    }

    /// Evaluate against a row described by `columns`. Comparisons against a
    /// null cell are false.
    pub fn evaluate(
        &self,
        columns: &[ColumnDescription],
        row: &Row,
    ) -> Result<bool, PredicateError> {
        match self {
            Predicate::And(l, r) => Ok(l.evaluate(columns, row)? && r.evaluate(columns, row)?),
            Predicate::Or(l, r) => Ok(l.evaluate(columns, row)? || r.evaluate(columns, row)?),
            Predicate::Compare(c) => {
                let cell = columns
                    .iter()
                    .position(|d| d.name() == c.column)
                    .and_then(|i| row.get(i))
                    .context(UnknownColumnSnafu { column: &c.column })?;
                compare(cell, c)
            }
        }
    }
}

fn compare(cell: &Cell, cmp: &Comparison) -> Result<bool, PredicateError> {
    let ordering = match (cell, &cmp.value) {
        (Cell::Null, _) => return Ok(false),
        (Cell::Varchar(v), Literal::Str(s)) => Some(v.as_ref().cmp(s.as_bytes())),
        (Cell::Timestamp(v) | Cell::Sint64(v), Literal::Int(i)) => Some(v.cmp(i)),
        (Cell::Timestamp(v) | Cell::Sint64(v), Literal::Float(x)) => (*v as f64).partial_cmp(x),
        (Cell::Timestamp(v), Literal::Str(s)) => {
            let at = parse_time_text(s).context(IncomparableSnafu {
                column: &cmp.column,
                literal: cmp.value.to_string(),
            })?;
            Some(v.cmp(&at))
        }
        (Cell::Double(v), Literal::Float(x)) => v.partial_cmp(x),
        (Cell::Double(v), Literal::Int(i)) => v.partial_cmp(&(*i as f64)),
        (Cell::Boolean(v), Literal::Bool(b)) => Some(v.cmp(b)),
        _ => {
            return IncomparableSnafu {
                column: &cmp.column,
                literal: cmp.value.to_string(),
            }
            .fail();
        }
    };
    Ok(ordering.is_some_and(|o| cmp.op.holds(o)))
}

fn fmt_ident(f: &mut fmt::Formatter<'_>, ident: &str) -> fmt::Result {
    let plain = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && ident.chars().all(|c| c.is_alphanumeric() || c == '_');
    if plain {
        f.write_str(ident)
    } else {
        write!(f, "\"{}\"", ident.replace('"', "\"\""))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare(c) => {
                fmt_ident(f, &c.column)?;
                write!(f, " {} {}", c.op, c.value)
            }
            Predicate::Or(l, r) => write!(f, "{l} OR {r}"),
            Predicate::And(l, r) => {
                for (i, side) in [l, r].into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    match side.as_ref() {
                        Predicate::Or(..) => write!(f, "({side})")?,
                        _ => write!(f, "{side}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Which columns a SELECT returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*`: every column in table order.
    All,
    /// The named columns, in the order named.
    Columns(Vec<String>),
}

/// A parsed SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Table named in FROM.
    pub table: String,
    /// Selected columns.
    pub projection: Projection,
    /// WHERE clause, if any.
    pub predicate: Option<Predicate>,
}

/// A parsed query statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `SELECT ... FROM ... [WHERE ...]`
    Select(Select),
    /// `DESCRIBE table`
    Describe {
        /// Table to describe.
        table: String,
    },
}

impl Statement {
    /// The table the statement addresses.
    pub fn table(&self) -> &str {
        match self {
            Statement::Select(select) => &select.table,
            Statement::Describe { table } => table,
        }
    }
}

/// A predicate split into its time interval and everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPredicate {
    /// Half-open interval on the time column; `None` when the predicate does
    /// not mention the time column.
    pub range: Option<TimeRange>,
    /// Remaining conjuncts, in their original order.
    pub residual: Option<Predicate>,
}

/// Fold the top-level comparisons on `time_column` into a half-open interval.
///
/// `> a` becomes start `a + 1`, `>= a` start `a`, `< b` end `b`, `<= b` end
/// `b + 1`, and `= a` the single-millisecond range `[a, a + 1)`. Repeated
/// bounds tighten the interval. Quoted RFC 3339 literals are converted to
/// epoch milliseconds.
pub fn extract_time_range(
    predicate: &Predicate,
    time_column: &str,
) -> Result<SplitPredicate, PredicateError> {
    let mut start: Option<i64> = None;
    let mut end: Option<i64> = None;
    let mut residual: Option<Predicate> = None;

    let successor = |at: i64| {
        at.checked_add(1)
            .context(TimeBoundOverflowSnafu { column: time_column })
    };

    for term in predicate.conjuncts() {
        match term {
            Predicate::Compare(c) if c.column == time_column => {
                let at = time_literal(time_column, &c.value)?;
                let (lower, upper) = match c.op {
                    CmpOp::Gt => (Some(successor(at)?), None),
                    CmpOp::GtEq => (Some(at), None),
                    CmpOp::Lt => (None, Some(at)),
                    CmpOp::LtEq => (None, Some(successor(at)?)),
                    CmpOp::Eq => (Some(at), Some(successor(at)?)),
                    CmpOp::NotEq => {
                        return UnsupportedTimeOperatorSnafu {
                            column: time_column,
                            op: c.op,
                        }
                        .fail();
                    }
                };
                if let Some(lower) = lower {
                    start = Some(start.map_or(lower, |s| s.max(lower)));
                }
                if let Some(upper) = upper {
                    end = Some(end.map_or(upper, |e| e.min(upper)));
                }
            }
            other => {
                ensure!(
                    !other.mentions(time_column),
                    TimeColumnInDisjunctionSnafu {
                        column: time_column
                    }
                );
                residual = Some(match residual.take() {
                    Some(acc) => Predicate::and(acc, other.clone()),
                    None => other.clone(),
                });
            }
        }
    }

    let range = match (start, end) {
        (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
        (None, None) => None,
        (Some(_), None) => {
            return MissingTimeBoundSnafu {
                column: time_column,
                side: "upper",
            }
            .fail();
        }
        (None, Some(_)) => {
            return MissingTimeBoundSnafu {
                column: time_column,
                side: "lower",
            }
            .fail();
        }
    };

    Ok(SplitPredicate { range, residual })
}

/// Parse `text` as a bare predicate and split off the time interval.
pub fn split_time_predicate(
    text: &str,
    time_column: &str,
) -> Result<SplitPredicate, PredicateError> {
    extract_time_range(&parse_predicate(text)?, time_column)
}

fn time_literal(column: &str, value: &Literal) -> Result<i64, PredicateError> {
    let parsed = match value {
        Literal::Int(v) => Some(*v),
        Literal::Str(s) => parse_time_text(s),
        _ => None,
    };
    parsed.context(InvalidTimeLiteralSnafu {
        column,
        literal: value.to_string(),
    })
}

fn parse_time_text(text: &str) -> Option<i64> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.timestamp_millis());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

// --------------------------- lexer -----------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(CmpOp),
    LParen,
    RParen,
    Comma,
    Star,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{s}'"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Op(op) => write!(f, "'{op}'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Star => f.write_str("'*'"),
        }
    }
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.text[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let begin = self.pos;
        while self.peek().is_some_and(&keep) {
            self.bump();
        }
        &self.text[begin..self.pos]
    }

    /// Read a quoted run; a doubled quote character stands for itself.
    fn quoted(&mut self, quote: char) -> Result<String, PredicateError> {
        let position = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => {
                    if self.eat(quote) {
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
                None => return UnterminatedQuoteSnafu { position }.fail(),
            }
        }
    }

    fn number(&mut self) -> Result<Token, PredicateError> {
        let begin = self.pos;
        self.eat('-');
        self.take_while(|c| c.is_ascii_digit());
        let is_float = self.eat('.');
        if is_float {
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = &self.text[begin..self.pos];
        let invalid = || PredicateError::InvalidNumber {
            text: text.to_string(),
        };
        if is_float {
            text.parse().map(Token::Float).map_err(|_| invalid())
        } else {
            text.parse().map(Token::Int).map_err(|_| invalid())
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, PredicateError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let position = self.pos;
            let token = match c {
                c if c.is_whitespace() || c == ';' => {
                    self.bump();
                    continue;
                }
                '(' | ')' | ',' | '*' | '=' => {
                    self.bump();
                    match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        ',' => Token::Comma,
                        '*' => Token::Star,
                        _ => Token::Op(CmpOp::Eq),
                    }
                }
                '!' => {
                    self.bump();
                    ensure!(
                        self.eat('='),
                        UnexpectedCharacterSnafu {
                            character: '!',
                            position
                        }
                    );
                    Token::Op(CmpOp::NotEq)
                }
                '<' => {
                    self.bump();
                    if self.eat('=') {
                        Token::Op(CmpOp::LtEq)
                    } else if self.eat('>') {
                        Token::Op(CmpOp::NotEq)
                    } else {
                        Token::Op(CmpOp::Lt)
                    }
                }
                '>' => {
                    self.bump();
                    if self.eat('=') {
                        Token::Op(CmpOp::GtEq)
                    } else {
                        Token::Op(CmpOp::Gt)
                    }
                }
                '\'' => Token::Str(self.quoted('\'')?),
                '"' => Token::Ident(self.quoted('"')?),
                c if c.is_ascii_digit()
                    || (c == '-' && self.peek_second().is_some_and(|d| d.is_ascii_digit())) =>
                {
                    self.number()?
                }
                c if c.is_alphabetic() || c == '_' => Token::Ident(
                    self.take_while(|c| c.is_alphanumeric() || c == '_')
                        .to_string(),
                ),
                character => return UnexpectedCharacterSnafu { character, position }.fail(),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

// --------------------------- parser -----------------------

enum Operand {
    Column(String),
    Value(Literal),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, PredicateError> {
        let tokens = Lexer { text, pos: 0 }.tokenize()?;
        ensure!(!tokens.is_empty(), EmptySnafu);
        Ok(Parser { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, PredicateError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .context(UnexpectedEndSnafu { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &'static str) -> Result<(), PredicateError> {
        if self.keyword(keyword) {
            return Ok(());
        }
        let found = self.next(keyword)?;
        UnexpectedTokenSnafu {
            expected: keyword,
            found: found.to_string(),
        }
        .fail()
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), PredicateError> {
        let found = self.next(expected)?;
        ensure!(
            found == token,
            UnexpectedTokenSnafu {
                expected,
                found: found.to_string()
            }
        );
        Ok(())
    }

    fn ident(&mut self, expected: &'static str) -> Result<String, PredicateError> {
        match self.next(expected)? {
            Token::Ident(name) => Ok(name),
            other => UnexpectedTokenSnafu {
                expected,
                found: other.to_string(),
            }
            .fail(),
        }
    }

    fn finish(&self) -> Result<(), PredicateError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => UnexpectedTokenSnafu {
                expected: "end of query",
                found: token.to_string(),
            }
            .fail(),
        }
    }

    fn statement(&mut self) -> Result<Statement, PredicateError> {
        if self.keyword("describe") {
            let table = self.ident("table name")?;
            return Ok(Statement::Describe { table });
        }

        self.expect_keyword("select")?;
        let projection = if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            Projection::All
        } else {
            let mut columns = vec![self.ident("column name or '*'")?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                columns.push(self.ident("column name")?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("from")?;
        let table = self.ident("table name")?;
        let predicate = if self.keyword("where") {
            Some(self.or_expr()?)
        } else {
            None
        };

        Ok(Statement::Select(Select {
            table,
            projection,
            predicate,
        }))
    }

    fn or_expr(&mut self) -> Result<Predicate, PredicateError> {
        let mut left = self.and_expr()?;
        while self.keyword("or") {
            let right = self.and_expr()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate, PredicateError> {
        let mut left = self.primary()?;
        while self.keyword("and") {
            let right = self.primary()?;
            left = Predicate::and(left, right);
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Predicate, PredicateError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(inner);
        }

        let left = self.operand()?;
        let op = match self.next("comparison operator")? {
            Token::Op(op) => op,
            other => {
                return UnexpectedTokenSnafu {
                    expected: "comparison operator",
                    found: other.to_string(),
                }
                .fail();
            }
        };
        let right = self.operand()?;

        let comparison = match (left, right) {
            (Operand::Column(column), Operand::Value(value)) => Comparison { column, op, value },
            (Operand::Value(value), Operand::Column(column)) => Comparison {
                column,
                op: op.flip(),
                value,
            },
            (Operand::Column(_), Operand::Column(other)) => {
                return UnexpectedTokenSnafu {
                    expected: "literal",
                    found: format!("column '{other}'"),
                }
                .fail();
            }
            (Operand::Value(_), Operand::Value(value)) => {
                return UnexpectedTokenSnafu {
                    expected: "column name",
                    found: value.to_string(),
                }
                .fail();
            }
        };
        Ok(Predicate::Compare(comparison))
    }

    fn operand(&mut self) -> Result<Operand, PredicateError> {
        Ok(match self.next("column name or literal")? {
            Token::Ident(word) if word.eq_ignore_ascii_case("true") => {
                Operand::Value(Literal::Bool(true))
            }
            Token::Ident(word) if word.eq_ignore_ascii_case("false") => {
                Operand::Value(Literal::Bool(false))
            }
            Token::Ident(name) => Operand::Column(name),
            Token::Str(s) => Operand::Value(Literal::Str(s)),
            Token::Int(v) => Operand::Value(Literal::Int(v)),
            Token::Float(v) => Operand::Value(Literal::Float(v)),
            other => {
                return UnexpectedTokenSnafu {
                    expected: "column name or literal",
                    found: other.to_string(),
                }
                .fail();
            }
        })
    }
}

/// Parse a full query statement.
pub fn parse_statement(text: &str) -> Result<Statement, PredicateError> {
    let mut parser = Parser::new(text)?;
    let statement = parser.statement()?;
    parser.finish()?;
    Ok(statement)
}

/// Parse a bare predicate (the text after WHERE).
pub fn parse_predicate(text: &str) -> Result<Predicate, PredicateError> {
    let mut parser = Parser::new(text)?;
    let predicate = parser.or_expr()?;
    parser.finish()?;
    Ok(predicate)
}

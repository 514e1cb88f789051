//! Declarative conditions
//!
//! A `ConditionList` is a flat sequence of conditions separated by AND/OR
//! junctions. Each junction carries a nesting level; a higher level binds
//! tighter, so `a AND (b OR c)` is stored as
//!
//! ```text
//! a  [AND @0]  b  [OR @1]  c
//! ```
//!
//! Lists are deserialized from JSON or parsed from text with
//! `parse_condition_list`:
//!
//! ```
//! use tablelens::condition::parse_condition_list;
//!
//! let list = parse_condition_list("region = 'East' AND (amount > 10 OR [unit price] BETWEEN 1 AND 5)").unwrap();
//! assert_eq!(list.condition_count(), 3);
//! ```

use crate::error::{LensError, Result};
use crate::value::CellValue;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

/// Comparison performed by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    EqualTo,
    OneOf,
    LessThan,
    GreaterThan,
    Between,
    StartingWith,
    Contains,
    /// SQL pattern: `%` matches any run of characters, `_` one character
    Like,
    Null,
}

impl ConditionOp {
    /// Operands the comparison needs
    pub fn operand_count(&self) -> Option<usize> {
        match self {
            ConditionOp::Null => Some(0),
            ConditionOp::Between => Some(2),
            ConditionOp::OneOf => None,
            _ => Some(1),
        }
    }
}

/// A value a condition compares against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Value(CellValue),
    /// Another column of the same row
    Field(String),
    /// The column under test
    This,
    /// Evaluated once through the script environment
    Expression(String),
}

impl Operand {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Operand::Field(_) | Operand::This)
    }
}

impl From<CellValue> for Operand {
    fn from(value: CellValue) -> Self {
        Operand::Value(value)
    }
}

macro_rules! operand_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Operand {
            fn from(value: $t) -> Self {
                Operand::Value(CellValue::from(value))
            }
        })*
    };
}

operand_from!(&str, String, i32, i64, f64, bool);

/// Compiled `Like` pattern, rebuilt only when the pattern text changes
#[derive(Default)]
struct LikeCache {
    compiled: Mutex<Option<(String, Option<Regex>)>>,
}

impl Clone for LikeCache {
    fn clone(&self) -> Self {
        LikeCache::default()
    }
}

impl PartialEq for LikeCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl std::fmt::Debug for LikeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LikeCache")
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: ConditionOp,
    #[serde(default)]
    pub negated: bool,
    /// Bounds of `LessThan`, `GreaterThan` and `Between` match equal values
    #[serde(default)]
    pub inclusive: bool,
    #[serde(default = "yes")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub operands: Vec<Operand>,
    #[serde(skip)]
    like: LikeCache,
}

impl Condition {
    pub fn new(op: ConditionOp, operands: Vec<Operand>) -> Self {
        Condition {
            op,
            negated: false,
            inclusive: false,
            case_sensitive: true,
            operands,
            like: LikeCache::default(),
        }
    }

    pub fn equal_to(value: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::EqualTo, vec![value.into()])
    }

    pub fn one_of(values: impl IntoIterator<Item = impl Into<Operand>>) -> Self {
        Self::new(ConditionOp::OneOf, values.into_iter().map(Into::into).collect())
    }

    pub fn less_than(value: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::LessThan, vec![value.into()])
    }

    pub fn greater_than(value: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::GreaterThan, vec![value.into()])
    }

    /// Inclusive range
    pub fn between(low: impl Into<Operand>, high: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::Between, vec![low.into(), high.into()]).inclusive()
    }

    pub fn starting_with(value: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::StartingWith, vec![value.into()])
    }

    pub fn contains(value: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::Contains, vec![value.into()])
    }

    pub fn like(pattern: impl Into<Operand>) -> Self {
        Self::new(ConditionOp::Like, vec![pattern.into()])
    }

    pub fn null() -> Self {
        Self::new(ConditionOp::Null, Vec::new())
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn inclusive(mut self) -> Self {
        self.inclusive = true;
        self
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Check operand arity
    pub fn validate(&self) -> Result<()> {
        let found = self.operands.len();
        let ok = match self.op.operand_count() {
            Some(n) => found == n,
            None => found > 0,
        };
        if ok {
            Ok(())
        } else {
            Err(LensError::InvalidCondition(format!(
                "{:?} cannot take {} operand(s)",
                self.op, found
            )))
        }
    }

    /// Test `value` against resolved operand values (one per operand).
    ///
    /// A null value only satisfies `Null`; missing operands never match.
    /// Negation applies after the comparison.
    pub fn evaluate(&self, value: &CellValue, operands: &[CellValue]) -> bool {
        self.compare(value, operands) != self.negated
    }

    fn compare(&self, value: &CellValue, operands: &[CellValue]) -> bool {
        if value.is_null() && self.op != ConditionOp::Null {
            return false;
        }

        match self.op {
            ConditionOp::Null => is_blank(value),
            ConditionOp::EqualTo => first(operands).is_some_and(|o| self.equals(value, o)),
            ConditionOp::OneOf => operands.iter().any(|o| self.equals(value, o)),
            ConditionOp::LessThan => first(operands)
                .is_some_and(|o| self.within(self.order(value, o), Ordering::Less)),
            ConditionOp::GreaterThan => first(operands)
                .is_some_and(|o| self.within(self.order(value, o), Ordering::Greater)),
            ConditionOp::Between => match operands {
                [low, high, ..] if !low.is_null() && !high.is_null() => {
                    self.within(self.order(value, low), Ordering::Greater)
                        && self.within(self.order(value, high), Ordering::Less)
                }
                _ => false,
            },
            ConditionOp::StartingWith => first(operands)
                .is_some_and(|o| self.text(value).starts_with(&self.text(o))),
            ConditionOp::Contains => first(operands)
                .is_some_and(|o| self.text(value).contains(&self.text(o))),
            ConditionOp::Like => first(operands)
                .is_some_and(|o| self.like_matches(&value.to_string(), &o.to_string())),
        }
    }

    fn within(&self, ord: Ordering, wanted: Ordering) -> bool {
        ord == wanted || (self.inclusive && ord == Ordering::Equal)
    }

    fn text(&self, value: &CellValue) -> String {
        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_string().to_lowercase()
        }
    }

    fn order(&self, value: &CellValue, operand: &CellValue) -> Ordering {
        match (value, operand) {
            (CellValue::String(a), CellValue::String(b)) if !self.case_sensitive => {
                a.to_lowercase().cmp(&b.to_lowercase())
            }
            _ => value.compare(operand),
        }
    }

    fn equals(&self, value: &CellValue, operand: &CellValue) -> bool {
        !operand.is_null() && self.order(value, operand) == Ordering::Equal
    }

    fn like_matches(&self, text: &str, pattern: &str) -> bool {
        let mut cache = self.like.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = !matches!(cache.as_ref(), Some((p, _)) if p == pattern);
        if stale {
            let compiled = RegexBuilder::new(&like_to_regex(pattern))
                .case_insensitive(!self.case_sensitive)
                .build()
                .map_err(|err| log::warn!("unusable LIKE pattern {:?}: {}", pattern, err))
                .ok();
            *cache = Some((pattern.to_string(), compiled));
        }
        match cache.as_ref() {
            Some((_, Some(regex))) => regex.is_match(text),
            _ => false,
        }
    }
}

/// First operand unless it is null
fn first(operands: &[CellValue]) -> Option<&CellValue> {
    operands.first().filter(|o| !o.is_null())
}

/// Null or empty text
fn is_blank(value: &CellValue) -> bool {
    match value {
        CellValue::Null => true,
        CellValue::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Anchored regex for a SQL `LIKE` pattern
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunctionOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionItem {
    /// Test the column named `attribute`
    Condition { attribute: String, condition: Condition },
    Junction { op: JunctionOp, level: usize },
}

/// Conditions alternating with junctions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionList {
    items: Vec<ConditionItem>,
}

impl ConditionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<ConditionItem>) -> Self {
        ConditionList { items }
    }

    /// Single-condition list
    pub fn single(attribute: impl Into<String>, condition: Condition) -> Self {
        let mut list = Self::new();
        list.push_condition(attribute, condition);
        list
    }

    pub fn push_condition(&mut self, attribute: impl Into<String>, condition: Condition) {
        self.items.push(ConditionItem::Condition {
            attribute: attribute.into(),
            condition,
        });
    }

    pub fn push_junction(&mut self, op: JunctionOp, level: usize) {
        self.items.push(ConditionItem::Junction { op, level });
    }

    /// Append `a AND b` style: junction then condition
    pub fn and(mut self, attribute: impl Into<String>, condition: Condition) -> Self {
        self.push_junction(JunctionOp::And, 0);
        self.push_condition(attribute, condition);
        self
    }

    pub fn or(mut self, attribute: impl Into<String>, condition: Condition) -> Self {
        self.push_junction(JunctionOp::Or, 0);
        self.push_condition(attribute, condition);
        self
    }

    pub fn items(&self) -> &[ConditionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions().count()
    }

    /// Conditions in order with their attributes
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.items.iter().filter_map(|item| match item {
            ConditionItem::Condition {
                attribute,
                condition,
            } => Some((attribute.as_str(), condition)),
            ConditionItem::Junction { .. } => None,
        })
    }

    /// Check that conditions and junctions alternate, starting and ending
    /// with a condition, and that every condition has the operands it needs.
    pub fn validate(&self) -> Result<()> {
        for (i, item) in self.items.iter().enumerate() {
            let expect_condition = i % 2 == 0;
            match item {
                ConditionItem::Condition { condition, .. } if expect_condition => {
                    condition.validate()?
                }
                ConditionItem::Junction { .. } if !expect_condition => {}
                _ => {
                    return Err(LensError::InvalidCondition(format!(
                        "item {} should be a {}",
                        i,
                        if expect_condition { "condition" } else { "junction" }
                    )))
                }
            }
        }
        if self.items.len() % 2 == 0 && !self.items.is_empty() {
            return Err(LensError::InvalidCondition(
                "condition list ends with a junction".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Text syntax
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    /// `[column name]`
    Quoted(String),
    /// `{script}`
    Script(String),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Is,
    In,
    Between,
    Starts,
    With,
    Contains,
    Like,
    This,
    LParen,
    RParen,
    Comma,
    Eof,
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn error(&self, message: impl Into<String>) -> LensError {
        LensError::ConditionParse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self) -> Token {
        let mut num_str = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                num_str.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                num_str.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            Token::Float(num_str.parse().unwrap_or(0.0))
        } else {
            num_str
                .parse()
                .map(Token::Int)
                .unwrap_or_else(|_| Token::Float(num_str.parse().unwrap_or(0.0)))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token> {
        self.advance();
        let mut s = String::new();

        while let Some(c) = self.advance() {
            if c == quote {
                return Ok(Token::String(s));
            } else if c == '\\' {
                match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(escaped) => s.push(escaped),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }

        Err(self.error("unterminated string"))
    }

    /// Text up to the matching `close`, nesting on `open`
    fn read_enclosed(&mut self, open: char, close: char, what: &str) -> Result<String> {
        self.advance();
        let mut depth = 0usize;
        let mut s = String::new();
        while let Some(c) = self.advance() {
            if c == close && depth == 0 {
                return Ok(s.trim().to_string());
            }
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
            }
            s.push(c);
        }
        Err(self.error(format!("unterminated {}", what)))
    }

    /// Next token and the position it starts at
    fn next_token(&mut self) -> Result<(Token, usize)> {
        self.skip_whitespace();
        let start = self.pos;

        let Some(c) = self.peek() else {
            return Ok((Token::Eof, start));
        };
        let token = match c {
            '(' => {
                self.advance();
                Token::LParen
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '[' => Token::Quoted(self.read_enclosed('[', ']', "column name")?),
            '{' => Token::Script(self.read_enclosed('{', '}', "script")?),
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
                Token::Eq
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '<' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        Token::Le
                    }
                    Some('>') => {
                        self.advance();
                        Token::Ne
                    }
                    _ => Token::Lt,
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '\'' | '"' => self.read_string(c)?,
            '-' if self
                .input
                .get(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit() || *c == '.') =>
            {
                self.advance();
                match self.read_number() {
                    Token::Int(v) => Token::Int(-v),
                    Token::Float(v) => Token::Float(-v),
                    other => other,
                }
            }
            _ if c.is_ascii_digit() => self.read_number(),
            _ if c.is_alphabetic() || c == '_' => {
                let ident = self.read_ident();
                match ident.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "IS" => Token::Is,
                    "IN" => Token::In,
                    "BETWEEN" => Token::Between,
                    "STARTS" => Token::Starts,
                    "WITH" => Token::With,
                    "CONTAINS" => Token::Contains,
                    "LIKE" => Token::Like,
                    "NULL" => Token::Null,
                    "TRUE" => Token::Bool(true),
                    "FALSE" => Token::Bool(false),
                    "THIS" => Token::This,
                    _ => Token::Ident(ident),
                }
            }
            _ => return Err(self.error(format!("unexpected character: {}", c))),
        };
        Ok((token, start))
    }
}

/// Builds a flat condition list; parenthesis depth becomes junction level.
struct Parser {
    lexer: Lexer,
    current: Token,
    position: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let (current, position) = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            position,
        })
    }

    fn advance(&mut self) -> Result<()> {
        let (token, position) = self.lexer.next_token()?;
        self.current = token;
        self.position = position;
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> LensError {
        LensError::ConditionParse {
            position: self.position,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(self.error(format!("expected {:?}, got {:?}", expected, self.current)))
        }
    }

    fn parse_sequence(&mut self, depth: usize, list: &mut ConditionList) -> Result<()> {
        self.parse_term(depth, list)?;
        loop {
            let op = match self.current {
                Token::And => JunctionOp::And,
                Token::Or => JunctionOp::Or,
                _ => return Ok(()),
            };
            self.advance()?;
            list.push_junction(op, depth);
            self.parse_term(depth, list)?;
        }
    }

    fn parse_term(&mut self, depth: usize, list: &mut ConditionList) -> Result<()> {
        if self.current == Token::LParen {
            self.advance()?;
            self.parse_sequence(depth + 1, list)?;
            return self.expect(&Token::RParen);
        }

        let mut negated = false;
        while self.current == Token::Not {
            negated = !negated;
            self.advance()?;
        }
        if self.current == Token::LParen {
            return Err(self.error("NOT applies to a single comparison"));
        }

        let (attribute, mut condition) = self.parse_comparison()?;
        if negated {
            condition = condition.negate();
        }
        list.push_condition(attribute, condition);
        Ok(())
    }

    fn parse_attribute(&mut self) -> Result<String> {
        let name = match &self.current {
            Token::Ident(name) | Token::Quoted(name) => name.clone(),
            Token::This => "this".to_string(),
            other => return Err(self.error(format!("expected column name, got {:?}", other))),
        };
        self.advance()?;
        Ok(name)
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        let operand = match &self.current {
            Token::Int(n) => Operand::Value(CellValue::Int(*n)),
            Token::Float(f) => Operand::Value(CellValue::Double(*f)),
            Token::String(s) => Operand::Value(CellValue::String(s.clone())),
            Token::Bool(b) => Operand::Value(CellValue::Bool(*b)),
            Token::Ident(name) | Token::Quoted(name) => Operand::Field(name.clone()),
            Token::Script(expr) => Operand::Expression(expr.clone()),
            Token::This => Operand::This,
            other => return Err(self.error(format!("expected value, got {:?}", other))),
        };
        self.advance()?;
        Ok(operand)
    }

    fn parse_comparison(&mut self) -> Result<(String, Condition)> {
        let attribute = self.parse_attribute()?;

        if self.current == Token::Is {
            self.advance()?;
            let negated = self.current == Token::Not;
            if negated {
                self.advance()?;
            }
            self.expect(&Token::Null)?;
            let condition = Condition::null();
            return Ok((attribute, if negated { condition.negate() } else { condition }));
        }

        let mut negated = false;
        if self.current == Token::Not {
            negated = true;
            self.advance()?;
        }

        let condition = match self.current {
            Token::Eq | Token::Ne if negated => {
                return Err(self.error("NOT cannot precede a comparison operator"));
            }
            Token::Eq => {
                self.advance()?;
                Condition::equal_to(self.parse_operand()?)
            }
            Token::Ne => {
                self.advance()?;
                Condition::equal_to(self.parse_operand()?).negate()
            }
            Token::Lt | Token::Le | Token::Gt | Token::Ge if negated => {
                return Err(self.error("NOT cannot precede a comparison operator"));
            }
            Token::Lt => {
                self.advance()?;
                Condition::less_than(self.parse_operand()?)
            }
            Token::Le => {
                self.advance()?;
                Condition::less_than(self.parse_operand()?).inclusive()
            }
            Token::Gt => {
                self.advance()?;
                Condition::greater_than(self.parse_operand()?)
            }
            Token::Ge => {
                self.advance()?;
                Condition::greater_than(self.parse_operand()?).inclusive()
            }
            Token::In => {
                self.advance()?;
                self.expect(&Token::LParen)?;
                let mut operands = vec![self.parse_operand()?];
                while self.current == Token::Comma {
                    self.advance()?;
                    operands.push(self.parse_operand()?);
                }
                self.expect(&Token::RParen)?;
                Condition::new(ConditionOp::OneOf, operands)
            }
            Token::Between => {
                self.advance()?;
                let low = self.parse_operand()?;
                self.expect(&Token::And)?;
                let high = self.parse_operand()?;
                Condition::between(low, high)
            }
            Token::Starts => {
                self.advance()?;
                self.expect(&Token::With)?;
                Condition::starting_with(self.parse_operand()?)
            }
            Token::Contains => {
                self.advance()?;
                Condition::contains(self.parse_operand()?)
            }
            Token::Like => {
                self.advance()?;
                Condition::like(self.parse_operand()?)
            }
            _ => {
                return Err(self.error(format!(
                    "expected comparison operator, got {:?}",
                    self.current
                )))
            }
        };

        Ok((attribute, if negated { condition.negate() } else { condition }))
    }
}

/// Parse the text form of a condition list.
///
/// Supported: `= == != <> < <= > >=`, `IN (..)`, `BETWEEN a AND b`,
/// `STARTS WITH`, `CONTAINS`, `LIKE`, `IS [NOT] NULL`, prefix `NOT` (also
/// `NOT IN`, `NOT LIKE`, ...). Columns are bare identifiers or `[quoted
/// names]`; `this` names the column under test; `{...}` is a script operand.
pub fn parse_condition_list(input: &str) -> Result<ConditionList> {
    let mut parser = Parser::new(input)?;
    let mut list = ConditionList::new();
    if parser.current == Token::Eof {
        return Ok(list);
    }

    parser.parse_sequence(0, &mut list)?;
    if parser.current != Token::Eof {
        return Err(parser.error(format!("unexpected {:?} after condition", parser.current)));
    }
    Ok(list)
}

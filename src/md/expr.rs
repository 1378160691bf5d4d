/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use super::{ParamError, ParamRef};
use crate::errors::CommandError;
use crate::store::Scope;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(
        r"^\s*(?:(?P<num>(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)|(?P<ref>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*|\s*\(\s*\d+\s*,\s*\d+\s*\))?)|(?P<op>[-+*/^()]))"
    )
    .unwrap();
    static ref CMP_RE: Regex = Regex::new(r"==|~=|<=|>=|<|>").unwrap();
}

/// Formats a real the way scripts write them: plain when readable, in exponent notation otherwise.
pub(crate) fn fmt_real(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e9).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    const fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 3,
        }
    }

    const fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Pow => '^',
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Pow => lhs.powf(rhs),
        }
    }
}

/// An arithmetic expression over numbers and object parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Param(ParamRef),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Default for Expr {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<ParamRef> for Expr {
    fn from(param: ParamRef) -> Self {
        Self::Param(param)
    }
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eval(&self, scope: &Scope, command: &str) -> Result<f64, CommandError> {
        Ok(match self {
            Self::Number(value) => *value,
            Self::Param(param) => param.get(scope, command)?,
            Self::Neg(inner) => -inner.eval(scope, command)?,
            Self::Binary { op, lhs, rhs } => {
                op.apply(lhs.eval(scope, command)?, rhs.eval(scope, command)?)
            }
        })
    }

    /// Value of the expression if it does not reference any object
    pub fn constant(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Param(_) => None,
            Self::Neg(inner) => inner.constant().map(|v| -v),
            Self::Binary { op, lhs, rhs } => Some(op.apply(lhs.constant()?, rhs.constant()?)),
        }
    }

    pub fn params(&self) -> Vec<&ParamRef> {
        match self {
            Self::Number(_) => vec![],
            Self::Param(param) => vec![param],
            Self::Neg(inner) => inner.params(),
            Self::Binary { lhs, rhs, .. } => {
                let mut params = lhs.params();
                params.extend(rhs.params());
                params
            }
        }
    }

    /// Checks that every referenced parameter can be read.
    pub fn validate(&self, scope: &Scope, command: &str) -> Result<(), CommandError> {
        for param in self.params() {
            param.validate(scope, command)?;
        }
        Ok(())
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Param(param) => param.rename(old_name, new_name),
            Self::Neg(inner) => inner.rename(old_name, new_name),
            Self::Binary { lhs, rhs, .. } => {
                // Both sides must be visited
                let left = lhs.rename(old_name, new_name);
                rhs.rename(old_name, new_name) || left
            }
        }
    }

    const fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::Neg(_) => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", fmt_real(*value)),
            Self::Param(param) => write!(f, "{param}"),
            Self::Neg(inner) => {
                if inner.precedence() < 4 {
                    write!(f, "-({inner})")
                } else {
                    write!(f, "-{inner}")
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                let left_parens = lhs.precedence() < prec || (*op == BinOp::Pow && lhs.precedence() == prec);
                let right_parens = rhs.precedence() < prec
                    || (rhs.precedence() == prec && matches!(op, BinOp::Sub | BinOp::Div));
                if left_parens {
                    write!(f, "({lhs})")?;
                } else {
                    write!(f, "{lhs}")?;
                }
                if *op == BinOp::Pow {
                    write!(f, "{}", op.symbol())?;
                } else {
                    write!(f, " {} ", op.symbol())?;
                }
                if right_parens {
                    write!(f, "({rhs})")
                } else {
                    write!(f, "{rhs}")
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ref(ParamRef),
    Op(char),
}

fn tokenize(text: &str) -> Result<Vec<Token>, ParamError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while !rest.trim().is_empty() {
        let cap = TOKEN_RE.captures(rest).ok_or_else(|| ParamError::Parse {
            text: text.to_string(),
            reason: format!("unexpected `{}`", rest.trim()),
        })?;
        if let Some(num) = cap.name("num") {
            let value = num.as_str().parse::<f64>().map_err(|e| ParamError::Parse {
                text: text.to_string(),
                reason: e.to_string(),
            })?;
            tokens.push(Token::Num(value));
        } else if let Some(reference) = cap.name("ref") {
            tokens.push(Token::Ref(ParamRef::from_str(reference.as_str())?));
        } else if let Some(op) = cap.name("op") {
            tokens.push(Token::Op(op.as_str().chars().next().unwrap_or(' ')));
        }
        let consumed = cap.get(0).map(|m| m.end()).unwrap_or(rest.len());
        rest = &rest[consumed..];
    }
    Ok(tokens)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> ParamError {
        ParamError::Parse {
            text: self.text.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek_op(&self) -> Option<char> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr, ParamError> {
        let mut lhs = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.term()?;
            let op = if op == '+' { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParamError> {
        let mut lhs = self.unary()?;
        while let Some(op @ ('*' | '/')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            let op = if op == '*' { BinOp::Mul } else { BinOp::Div };
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParamError> {
        match self.peek_op() {
            Some('-') => {
                self.pos += 1;
                Ok(match self.unary()? {
                    Expr::Number(value) => Expr::Number(-value),
                    inner => Expr::Neg(Box::new(inner)),
                })
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ParamError> {
        let base = self.atom()?;
        if self.peek_op() == Some('^') {
            self.pos += 1;
            let exponent = self.unary()?;
            Ok(Expr::binary(BinOp::Pow, base, exponent))
        } else {
            Ok(base)
        }
    }

    fn atom(&mut self) -> Result<Expr, ParamError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Num(value) => Ok(Expr::Number(value)),
            Token::Ref(param) => Ok(Expr::Param(param)),
            Token::Op('(') => {
                let inner = self.expr()?;
                if self.peek_op() == Some(')') {
                    self.pos += 1;
                    Ok(inner)
                } else {
                    Err(self.error("missing closing parenthesis"))
                }
            }
            Token::Op(op) => Err(self.error(&format!("unexpected `{op}`"))),
        }
    }
}

impl FromStr for Expr {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            text: s,
            tokens: tokenize(s)?,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing tokens"));
        }
        Ok(expr)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

impl FromStr for CmpOp {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" => Ok(Self::Eq),
            "~=" | "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            _ => Err(ParamError::Parse {
                text: s.to_string(),
                reason: "unknown comparison operator".to_string(),
            }),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Eq => "==",
            Self::Ne => "~=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{repr}")
    }
}

/// A single comparison, e.g. `Sat.SMA > 7000`
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub lhs: Expr,
    pub op: CmpOp,
    pub rhs: Expr,
}

impl Condition {
    pub fn new(lhs: Expr, op: CmpOp, rhs: Expr) -> Self {
        Self { lhs, op, rhs }
    }

    pub fn eval(&self, scope: &Scope, command: &str) -> Result<bool, CommandError> {
        Ok(self
            .op
            .holds(self.lhs.eval(scope, command)?, self.rhs.eval(scope, command)?))
    }
}

impl FromStr for Condition {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let found = CMP_RE.find(s).ok_or_else(|| ParamError::Parse {
            text: s.to_string(),
            reason: "missing comparison operator".to_string(),
        })?;
        Ok(Self {
            lhs: Expr::from_str(&s[..found.start()])?,
            op: CmpOp::from_str(found.as_str())?,
            rhs: Expr::from_str(&s[found.end()..])?,
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

/// Comparisons joined by `&` and `|`, evaluated strictly from left to right without precedence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions {
    conditions: Vec<Condition>,
    operators: Vec<Logic>,
}

impl Conditions {
    pub fn single(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
            operators: vec![],
        }
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.push(Logic::And, condition);
        self
    }

    pub fn or(mut self, condition: Condition) -> Self {
        self.push(Logic::Or, condition);
        self
    }

    fn push(&mut self, logic: Logic, condition: Condition) {
        if !self.conditions.is_empty() {
            self.operators.push(logic);
        }
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// An empty set of conditions always holds.
    pub fn eval(&self, scope: &Scope, command: &str) -> Result<bool, CommandError> {
        let mut iter = self.conditions.iter();
        let mut result = match iter.next() {
            Some(first) => first.eval(scope, command)?,
            None => return Ok(true),
        };
        for (logic, condition) in self.operators.iter().zip(iter) {
            let value = condition.eval(scope, command)?;
            result = match logic {
                Logic::And => result && value,
                Logic::Or => result || value,
            };
        }
        Ok(result)
    }

    pub fn validate(&self, scope: &Scope, command: &str) -> Result<(), CommandError> {
        for condition in &self.conditions {
            condition.lhs.validate(scope, command)?;
            condition.rhs.validate(scope, command)?;
        }
        Ok(())
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        let mut renamed = false;
        for condition in &mut self.conditions {
            renamed |= condition.lhs.rename(old_name, new_name);
            renamed |= condition.rhs.rename(old_name, new_name);
        }
        renamed
    }
}

impl FromStr for Conditions {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut me = Self::default();
        let mut logic = Logic::And;
        let mut start = 0;
        for (idx, chr) in s.char_indices() {
            if chr == '&' || chr == '|' {
                me.push(logic, Condition::from_str(&s[start..idx])?);
                logic = if chr == '&' { Logic::And } else { Logic::Or };
                start = idx + 1;
            }
        }
        me.push(logic, Condition::from_str(&s[start..])?);
        Ok(me)
    }
}

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, condition) in self.conditions.iter().enumerate() {
            if idx > 0 {
                match self.operators[idx - 1] {
                    Logic::And => write!(f, " & ")?,
                    Logic::Or => write!(f, " | ")?,
                }
            }
            write!(f, "{condition}")?;
        }
        Ok(())
    }
}

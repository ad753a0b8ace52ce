//! `#if` constant expressions.
//!
//! The text handed to [`evaluate`] has already had `defined` operators, macros
//! and leftover identifiers replaced, so only integer literals, operators and
//! parentheses remain.

use alloc::{boxed::Box, string::String};
use core::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_opt, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

/// Parsed constant expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Num(i64),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Why a constant expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    Syntax(String),
    DivisionByZero,
    Empty,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Syntax(rest) => write!(f, "invalid constant expression near '{}'", rest),
            EvalError::DivisionByZero => f.write_str("division by zero in constant expression"),
            EvalError::Empty => f.write_str("missing expression in #if"),
        }
    }
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn hex_literal(input: &str) -> IResult<&str, i64> {
    map_opt(
        preceded(
            alt((tag("0x"), tag("0X"))),
            take_while1(|c: char| c.is_ascii_hexdigit()),
        ),
        |digits: &str| u64::from_str_radix(digits, 16).ok().map(|v| v as i64),
    )(input)
}

fn decimal_literal(input: &str) -> IResult<&str, i64> {
    map_opt(take_while1(|c: char| c.is_ascii_digit()), |digits: &str| {
        if digits.len() > 1 && digits.starts_with('0') {
            u64::from_str_radix(&digits[1..], 8).ok().map(|v| v as i64)
        } else {
            digits.parse::<u64>().ok().map(|v| v as i64)
        }
    })(input)
}

fn int_suffix(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'))(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    terminated(alt((hex_literal, decimal_literal)), int_suffix)(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(integer, Expr::Num),
        delimited(char('('), expression, char(')')),
    )))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let op = ws(alt((
        map(char('!'), |_| UnaryOp::Not),
        map(char('~'), |_| UnaryOp::BitNot),
        map(char('-'), |_| UnaryOp::Neg),
        map(char('+'), |_| UnaryOp::Plus),
    )));
    alt((
        map(pair(op, unary), |(op, e)| Expr::Unary(op, Box::new(e))),
        primary,
    ))(input)
}

/// Left-associative chain of one precedence level.
fn chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    operator: fn(&'a str) -> IResult<&'a str, BinaryOp>,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(pair(ws(operator), operand))(input)?;
    let expr = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    });
    Ok((input, expr))
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    chain(input, unary, |i| {
        alt((
            map(char('*'), |_| BinaryOp::Mul),
            map(char('/'), |_| BinaryOp::Div),
            map(char('%'), |_| BinaryOp::Rem),
        ))(i)
    })
}

fn additive(input: &str) -> IResult<&str, Expr> {
    chain(input, multiplicative, |i| {
        alt((
            map(char('+'), |_| BinaryOp::Add),
            map(char('-'), |_| BinaryOp::Sub),
        ))(i)
    })
}

fn shift(input: &str) -> IResult<&str, Expr> {
    chain(input, additive, |i| {
        alt((
            map(tag("<<"), |_| BinaryOp::Shl),
            map(tag(">>"), |_| BinaryOp::Shr),
        ))(i)
    })
}

fn relational(input: &str) -> IResult<&str, Expr> {
    chain(input, shift, |i| {
        alt((
            map(tag("<="), |_| BinaryOp::Le),
            map(tag(">="), |_| BinaryOp::Ge),
            map(char('<'), |_| BinaryOp::Lt),
            map(char('>'), |_| BinaryOp::Gt),
        ))(i)
    })
}

fn equality(input: &str) -> IResult<&str, Expr> {
    chain(input, relational, |i| {
        alt((
            map(tag("=="), |_| BinaryOp::Eq),
            map(tag("!="), |_| BinaryOp::Ne),
        ))(i)
    })
}

/// `&` but not `&&`.
fn bit_and(input: &str) -> IResult<&str, Expr> {
    chain(input, equality, |i| {
        map(
            recognize(pair(char('&'), nom::combinator::not(char('&')))),
            |_| BinaryOp::BitAnd,
        )(i)
    })
}

fn bit_xor(input: &str) -> IResult<&str, Expr> {
    chain(input, bit_and, |i| map(char('^'), |_| BinaryOp::BitXor)(i))
}

fn bit_or(input: &str) -> IResult<&str, Expr> {
    chain(input, bit_xor, |i| {
        map(
            recognize(pair(char('|'), nom::combinator::not(char('|')))),
            |_| BinaryOp::BitOr,
        )(i)
    })
}

fn logical_and(input: &str) -> IResult<&str, Expr> {
    chain(input, bit_or, |i| map(tag("&&"), |_| BinaryOp::And)(i))
}

fn logical_or(input: &str) -> IResult<&str, Expr> {
    chain(input, logical_and, |i| map(tag("||"), |_| BinaryOp::Or)(i))
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, cond) = logical_or(input)?;
    let (input, branches) = opt(tuple((
        ws(char('?')),
        expression,
        ws(char(':')),
        expression,
    )))(input)?;
    Ok(match branches {
        Some((_, then, _, otherwise)) => (
            input,
            Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)),
        ),
        None => (input, cond),
    })
}

/// Parse a fully substituted expression.
pub fn parse_expression(text: &str) -> Result<Expr, EvalError> {
    if text.trim().is_empty() {
        return Err(EvalError::Empty);
    }
    all_consuming(ws(expression))(text)
        .map(|(_, expr)| expr)
        .map_err(|e| {
            let rest = match e {
                nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
                nom::Err::Incomplete(_) => "",
            };
            EvalError::Syntax(String::from(rest.trim()))
        })
}

impl Expr {
    /// Evaluate with wrapping integer arithmetic. `&&`, `||` and `?:` only
    /// evaluate the operands they need.
    pub fn eval(&self) -> Result<i64, EvalError> {
        match self {
            Expr::Num(n) => Ok(*n),
            Expr::Unary(op, e) => {
                let v = e.eval()?;
                Ok(match op {
                    UnaryOp::Not => (v == 0) as i64,
                    UnaryOp::BitNot => !v,
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Plus => v,
                })
            }
            Expr::Ternary(c, t, f) => {
                if c.eval()? != 0 {
                    t.eval()
                } else {
                    f.eval()
                }
            }
            Expr::Binary(op, l, r) => {
                let a = l.eval()?;
                match op {
                    BinaryOp::And if a == 0 => return Ok(0),
                    BinaryOp::Or if a != 0 => return Ok(1),
                    _ => {}
                }
                let b = r.eval()?;
                Ok(match op {
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div => a.checked_div(b).ok_or(EvalError::DivisionByZero)?,
                    BinaryOp::Rem => a.checked_rem(b).ok_or(EvalError::DivisionByZero)?,
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Shl => a.wrapping_shl(b as u32),
                    BinaryOp::Shr => a.wrapping_shr(b as u32),
                    BinaryOp::Lt => (a < b) as i64,
                    BinaryOp::Gt => (a > b) as i64,
                    BinaryOp::Le => (a <= b) as i64,
                    BinaryOp::Ge => (a >= b) as i64,
                    BinaryOp::Eq => (a == b) as i64,
                    BinaryOp::Ne => (a != b) as i64,
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitXor => a ^ b,
                    BinaryOp::BitOr => a | b,
                    BinaryOp::And | BinaryOp::Or => (b != 0) as i64,
                })
            }
        }
    }
}

/// Parse and evaluate a fully substituted expression.
pub fn evaluate(text: &str) -> Result<i64, EvalError> {
    parse_expression(text)?.eval()
}

//! Lexer and precedence grammar built on chumsky combinators.
//!
//! Precedence, loosest first: `+ -`, `* /`, unary `+ -`, `**`. Exponentiation
//! is right-associative and its right operand may carry a unary sign, so
//! `-2 ** 2` is `-(2 ** 2)` and `2 ** -1` is `2 ** (-1)`.

use std::fmt;

use chumsky::input::{Input, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use super::ast::{BinaryOp, Function, Node, UnaryOp};
use crate::error::{Error, Result};

pub type Span = SimpleSpan;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'src> {
    Number(f64),
    Ident(&'src str),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "{v}"),
            Token::Ident(name) => f.write_str(name),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::StarStar => f.write_str("**"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

pub fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<(Token<'src>, Span)>, extra::Err<Rich<'src, char>>> {
    // decimal literal with optional fraction and exponent, `.25` included
    let digits = text::digits(10);
    let mantissa = choice((
        digits.clone().then(just('.').then(digits.clone().or_not()).or_not()).ignored(),
        just('.').then(digits.clone()).ignored(),
    ));
    let exponent = one_of("eE").then(one_of("+-").or_not()).then(digits);
    let number = mantissa
        .then(exponent.or_not())
        .to_slice()
        .try_map(|text: &str, span| match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Token::Number(value)),
            Ok(_) => Err(Rich::custom(span, format!("number '{text}' is out of range"))),
            Err(_) => Err(Rich::custom(span, format!("invalid number '{text}'"))),
        });

    let sym = choice((
        just("**").to(Token::StarStar),
        just('*').to(Token::Star),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('/').to(Token::Slash),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
    ));

    let ident = text::ascii::ident().map(Token::Ident);

    choice((number, sym, ident))
        .map_with(|token, e| (token, e.span()))
        .padded()
        .repeated()
        .collect()
}

/// Band identifier `bN` or `bandN` as a 0-based index.
fn band_index(name: &str) -> std::result::Result<Option<usize>, String> {
    let digits = name
        .strip_prefix("band")
        .filter(|d| !d.is_empty())
        .or_else(|| name.strip_prefix('b'));
    let Some(digits) = digits.filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit())) else {
        return Ok(None);
    };
    match digits.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n - 1)),
        _ => Err(format!("band '{name}' must be numbered from 1")),
    }
}

/// Constant or band reference named by an identifier.
fn resolve_identifier(name: &str) -> std::result::Result<Node, String> {
    match name {
        "pi" => Ok(Node::Number(std::f64::consts::PI)),
        "e" => Ok(Node::Number(std::f64::consts::E)),
        _ => band_index(name)?
            .map(Node::Band)
            .ok_or_else(|| format!("unknown identifier '{name}'")),
    }
}

fn binary(lhs: Node, op: BinaryOp, rhs: Node) -> Node {
    Node::Binary { lhs: Box::new(lhs), op, rhs: Box::new(rhs) }
}

pub fn parser<'tokens, 'src: 'tokens, I>() -> impl Parser<'tokens, I, Node, extra::Err<Rich<'tokens, Token<'src>, Span>>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    recursive(|expr| {
        let number = select! { Token::Number(v) => Node::Number(v) };
        let function = select! { Token::Ident(name) if Function::from_name(name).is_some() => name };
        let variable = select! { Token::Ident(name) => name }
            .try_map(|name: &str, span| resolve_identifier(name).map_err(|msg| Rich::custom(span, msg)));
        let parens = expr.delimited_by(just(Token::LParen), just(Token::RParen));

        let call = function.then(parens.clone()).try_map(|(name, arg): (&str, Node), span| {
            let func = Function::from_name(name).ok_or_else(|| Rich::custom(span, format!("unknown function '{name}'")))?;
            Ok(Node::Call { func, arg: Box::new(arg) })
        });

        let atom = choice((number, call, parens, variable)).boxed();

        let unary = recursive(|unary| {
            let power = atom
                .clone()
                .then(just(Token::StarStar).ignore_then(unary).or_not())
                .map(|(base, exponent)| match exponent {
                    Some(exponent) => binary(base, BinaryOp::Pow, exponent),
                    None => base,
                });
            let unary_op = choice((just(Token::Plus).to(UnaryOp::Plus), just(Token::Minus).to(UnaryOp::Neg)));
            unary_op
                .repeated()
                .foldr(power, |op, expr| Node::Unary { op, expr: Box::new(expr) })
        })
        .boxed();

        let mul_op = choice((just(Token::Star).to(BinaryOp::Mul), just(Token::Slash).to(BinaryOp::Div)));
        let add_op = choice((just(Token::Plus).to(BinaryOp::Add), just(Token::Minus).to(BinaryOp::Sub)));

        let product = unary
            .clone()
            .foldl(mul_op.then(unary).repeated(), |lhs, (op, rhs)| binary(lhs, op, rhs))
            .boxed();

        product
            .clone()
            .foldl(add_op.then(product).repeated(), |lhs, (op, rhs)| binary(lhs, op, rhs))
    })
}

fn first_error<T: fmt::Display>(errors: Vec<Rich<'_, T>>) -> Error {
    match errors.into_iter().next() {
        Some(err) => Error::Expression { offset: err.span().start, message: err.to_string() },
        None => Error::Expression { offset: 0, message: "invalid expression".into() },
    }
}

/// Parse `input` into an expression tree.
pub fn parse(input: &str) -> Result<Node> {
    let tokens = lexer().parse(input).into_result().map_err(first_error)?;
    let eoi: Span = (input.len()..input.len()).into();
    parser()
        .parse(tokens.as_slice().map(eoi, |(token, span)| (token, span)))
        .into_result()
        .map_err(first_error)
}

//! Constraint-expression parsing and evaluation.
//!
//! Expression-bound parameters hold a small arithmetic expression over other
//! flat parameter names. Global fits use them to tie shape parameters of
//! spectrum columns 2..N to column 1; users can also write them directly to
//! link arbitrary parameters.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0, one_of};
use nom::combinator::{opt, recognize};
use nom::multi::{fold_many0, many0, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, Parser};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("failed to parse expression: {message}")]
    Parse { message: String },

    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("undefined function: {name}")]
    UndefinedFunction { name: String },
}

type ExprResult<T> = Result<T, ExpressionError>;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    Variable(String),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Function(String, Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Source of variable values during evaluation.
pub trait EvaluationContext {
    fn get_variable(&self, name: &str) -> ExprResult<f64>;
}

impl EvaluationContext for HashMap<String, f64> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

impl Expression {
    /// Parse an expression, requiring the whole input to be consumed.
    pub fn parse(input: &str) -> ExprResult<Self> {
        match expression(input.trim()) {
            Ok((remainder, expr)) if remainder.trim().is_empty() => Ok(expr),
            Ok((remainder, _)) => Err(ExpressionError::Parse {
                message: format!("unexpected trailing characters: '{}'", remainder),
            }),
            Err(e) => Err(ExpressionError::Parse {
                message: format!("{:?}", e),
            }),
        }
    }

    pub fn evaluate<C: EvaluationContext>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Variable(name) => context.get_variable(name),
            Self::Unary(UnaryOp::Neg, expr) => Ok(-expr.evaluate(context)?),
            Self::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            Err(ExpressionError::DivisionByZero)
                        } else {
                            Ok(lhs / rhs)
                        }
                    }
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }
            Self::Function(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<f64>>>()?;
                apply_function(name, &args)
            }
        }
    }

    /// All variable names referenced, sorted and deduplicated.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => vars.push(name.clone()),
            Self::Unary(_, expr) => expr.collect_variables(vars),
            Self::Binary(_, left, right) => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Self::Function(_, args) => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
        }
    }
}

fn apply_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let one = |f: fn(f64) -> f64| -> ExprResult<f64> {
        if args.len() != 1 {
            return Err(ExpressionError::InvalidOperation {
                message: format!("{}() requires 1 argument, got {}", name, args.len()),
            });
        }
        Ok(f(args[0]))
    };
    let spread = |init: f64, f: fn(f64, f64) -> f64| -> ExprResult<f64> {
        if args.len() < 2 {
            return Err(ExpressionError::InvalidOperation {
                message: format!("{}() requires at least 2 arguments, got {}", name, args.len()),
            });
        }
        Ok(args.iter().fold(init, |acc, &v| f(acc, v)))
    };

    match name {
        "sin" => one(f64::sin),
        "cos" => one(f64::cos),
        "tan" => one(f64::tan),
        "exp" => one(f64::exp),
        "log" | "ln" => one(f64::ln),
        "log10" => one(f64::log10),
        "sqrt" => one(f64::sqrt),
        "abs" => one(f64::abs),
        "max" => spread(f64::NEG_INFINITY, f64::max),
        "min" => spread(f64::INFINITY, f64::min),
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

// Grammar, loosest to tightest binding:
//   expression := term (('+' | '-') term)*          left-associative
//   term       := power (('*' | '/') power)*        left-associative
//   power      := unary ('^' power)?                right-associative
//   unary      := '-' unary | primary
//   primary    := number | function | variable | '(' expression ')'

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, Expression> {
    double.map(Expression::Number).parse(input)
}

fn variable(input: &str) -> IResult<&str, Expression> {
    identifier
        .map(|name: &str| Expression::Variable(name.to_string()))
        .parse(input)
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (input, name) = identifier(input)?;
    let (input, args) = delimited(
        preceded(multispace0, char('(')),
        separated_list0(delimited(multispace0, char(','), multispace0), expression),
        preceded(multispace0, char(')')),
    )
    .parse(input)?;
    Ok((input, Expression::Function(name.to_string(), args)))
}

fn parens(input: &str) -> IResult<&str, Expression> {
    delimited(char('('), expression, preceded(multispace0, char(')'))).parse(input)
}

fn primary(input: &str) -> IResult<&str, Expression> {
    preceded(multispace0, alt((number, function_call, variable, parens))).parse(input)
}

fn unary(input: &str) -> IResult<&str, Expression> {
    preceded(
        multispace0,
        alt((
            preceded(char('-'), unary)
                .map(|expr| Expression::Unary(UnaryOp::Neg, Box::new(expr))),
            primary,
        )),
    )
    .parse(input)
}

fn power(input: &str) -> IResult<&str, Expression> {
    let (input, base) = unary(input)?;
    let (input, exponent) = opt(preceded(
        delimited(multispace0, char('^'), multispace0),
        power,
    ))
    .parse(input)?;
    let expr = match exponent {
        Some(exponent) => Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
        None => base,
    };
    Ok((input, expr))
}

fn term(input: &str) -> IResult<&str, Expression> {
    let (input, first) = power(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("*/"), multispace0), power),
        move || first.clone(),
        |lhs, (op, rhs)| {
            let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            Expression::Binary(op, Box::new(lhs), Box::new(rhs))
        },
    )
    .parse(input)
}

fn expression(input: &str) -> IResult<&str, Expression> {
    let (input, first) = term(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("+-"), multispace0), term),
        move || first.clone(),
        |lhs, (op, rhs)| {
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            Expression::Binary(op, Box::new(lhs), Box::new(rhs))
        },
    )
    .parse(input)
}

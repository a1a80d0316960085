//! Formula language.
//!
//! A formula is compiled once into an [`Expr`] tree and evaluated against a
//! [`Scope`]. Only names the scope defines and calls to the [`Builtin`]
//! functions are reachable; there is no other way for a formula to touch the
//! host.
//!
//! ```text
//! expr     := additive
//! additive := term (("+" | "-") term)*
//! term     := unary (("*" | "/" | "//" | "%") unary)*
//! unary    := ("-" | "+") unary | power
//! power    := primary ("**" unary)?
//! primary  := NUMBER | STRING | IDENT | IDENT "(" args ")" | "(" expr ")"
//! ```

mod functions;
mod lexer;
mod parser;

use std::{collections::HashMap, fmt};

pub use functions::Builtin;

use crate::data::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

impl UnaryOp {
    fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid syntax: {message} at offset {offset}")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        SyntaxError {
            message: message.into(),
            offset,
        }
    }
}

/// Why a single formula could not produce a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("name '{0}' is not defined")]
    Undefined(String),

    #[error("'{0}' is a function and cannot be used as a value")]
    FunctionAsValue(String),

    #[error("unsupported operand types for {op}: '{left}' and '{right}'")]
    OperandTypes {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("bad operand type for unary {op}: '{operand}'")]
    UnaryOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow")]
    Overflow,

    #[error("math domain error")]
    Domain,

    #[error("{function}() takes {expected} argument(s) ({given} given)")]
    Arity {
        function: &'static str,
        expected: String,
        given: usize,
    },

    #[error("{function}() {detail}")]
    Argument {
        function: &'static str,
        detail: String,
    },
}

/// Name resolution for evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Scope for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// A compiled formula together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    tree: Expr,
}

impl Formula {
    pub fn compile(source: &str) -> Result<Self, SyntaxError> {
        let tokens = lexer::tokenize(source)?;
        let tree = parser::Parser::new(tokens, source.len()).parse()?;
        Ok(Formula {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &Expr {
        &self.tree
    }

    /// Names the formula reads, in first-occurrence order. Callee names are
    /// not included.
    pub fn free_variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_variables(&self.tree, &mut names);
        names
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Value, EvalError> {
        evaluate(&self.tree, scope)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_variables<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Variable(name) => {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Expr::Unary { operand, .. } => collect_variables(operand, names),
        Expr::Binary { left, right, .. } => {
            collect_variables(left, names);
            collect_variables(right, names);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_variables(arg, names);
            }
        }
    }
}

pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => {
            if Builtin::from_name(name).is_some() {
                return Err(EvalError::FunctionAsValue(name.clone()));
            }
            scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::Undefined(name.clone()))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            let number = value.as_number().ok_or(EvalError::UnaryOperand {
                op: op.symbol(),
                operand: value.type_name(),
            })?;
            Ok(Value::Number(match op {
                UnaryOp::Neg => -number,
                UnaryOp::Pos => number,
            }))
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            apply_binary(*op, left, right)
        }
        Expr::Call { name, args } => {
            let function =
                Builtin::from_name(name).ok_or_else(|| EvalError::Undefined(name.clone()))?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            function.call(args)
        }
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let (a, b) = match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => (*a, *b),
        (Value::Text(a), Value::Text(b)) if op == BinaryOp::Add => {
            return Ok(Value::Text(format!("{a}{b}")));
        }
        _ => {
            return Err(EvalError::OperandTypes {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            });
        }
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            (a / b).floor()
        }
        BinaryOp::Rem => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            // Result takes the sign of the divisor.
            let rem = a % b;
            if rem != 0.0 && (rem < 0.0) != (b < 0.0) {
                rem + b
            } else {
                rem
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let power = a.powf(b);
            if power.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(EvalError::Domain);
            }
            power
        }
    };
    if result.is_infinite() && a.is_finite() && b.is_finite() {
        return Err(EvalError::Overflow);
    }
    Ok(Value::Number(result))
}

use std::cmp::Ordering;

use super::EvalError;
use crate::data::Value;

/// The only callables a formula can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Max,
    Min,
    Abs,
    Round,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [Builtin::Max, Builtin::Min, Builtin::Abs, Builtin::Round];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "max" => Some(Builtin::Max),
            "min" => Some(Builtin::Min),
            "abs" => Some(Builtin::Abs),
            "round" => Some(Builtin::Round),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
        }
    }

    pub fn call(self, args: Vec<Value>) -> Result<Value, EvalError> {
        match self {
            Builtin::Max => extreme(self, args, Ordering::Greater),
            Builtin::Min => extreme(self, args, Ordering::Less),
            Builtin::Abs => {
                let [value] = expect_arity::<1>(self, args)?;
                Ok(Value::Number(expect_number(self, &value)?.abs()))
            }
            Builtin::Round => round(args),
        }
    }
}

fn expect_arity<const N: usize>(
    function: Builtin,
    args: Vec<Value>,
) -> Result<[Value; N], EvalError> {
    let given = args.len();
    args.try_into().map_err(|_| EvalError::Arity {
        function: function.name(),
        expected: format!("exactly {N}"),
        given,
    })
}

fn expect_number(function: Builtin, value: &Value) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| EvalError::Argument {
        function: function.name(),
        detail: format!("expects a number, got {}", value.type_name()),
    })
}

/// Largest (`Greater`) or smallest (`Less`) argument. Ties keep the first
/// occurrence. Arguments must be all numbers or all texts.
fn extreme(function: Builtin, args: Vec<Value>, wanted: Ordering) -> Result<Value, EvalError> {
    let mut args = args.into_iter();
    let mut best = args.next().ok_or_else(|| EvalError::Arity {
        function: function.name(),
        expected: "at least 1".to_string(),
        given: 0,
    })?;
    for candidate in args {
        let ordering = match (&candidate, &best) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => {
                return Err(EvalError::Argument {
                    function: function.name(),
                    detail: format!(
                        "cannot compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    ),
                });
            }
        };
        if ordering == wanted {
            best = candidate;
        }
    }
    Ok(best)
}

/// `round(x)` or `round(x, ndigits)`, ties to even.
fn round(args: Vec<Value>) -> Result<Value, EvalError> {
    let given = args.len();
    let mut args = args.into_iter();
    let (value, digits) = match (args.next(), args.next(), args.next()) {
        (Some(value), None, None) => (value, None),
        (Some(value), Some(digits), None) => (value, Some(digits)),
        _ => {
            return Err(EvalError::Arity {
                function: "round",
                expected: "1 or 2".to_string(),
                given,
            });
        }
    };
    let number = expect_number(Builtin::Round, &value)?;
    let Some(digits) = digits else {
        return Ok(Value::Number(number.round_ties_even()));
    };
    let digits = expect_number(Builtin::Round, &digits)?;
    if digits.fract() != 0.0 {
        return Err(EvalError::Argument {
            function: "round",
            detail: "ndigits must be an integer".to_string(),
        });
    }
    if !number.is_finite() || digits > 15.0 {
        return Ok(Value::Number(number));
    }
    if digits < -308.0 {
        return Ok(Value::Number(0.0));
    }
    let factor = 10f64.powi(digits.abs() as i32);
    let rounded = if digits >= 0.0 {
        let scaled = number * factor;
        if !scaled.is_finite() {
            // Already more precise than `digits` can express.
            return Ok(Value::Number(number));
        }
        scaled.round_ties_even() / factor
    } else {
        (number / factor).round_ties_even() * factor
    };
    Ok(Value::Number(rounded))
}

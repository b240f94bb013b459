//! Operand values and mixed integer/real arithmetic.

use std::convert::TryFrom;
use std::fmt;

/// A scanned or computed operand value.
///
/// Arithmetic between two integers stays in the integer domain; any real
/// operand promotes the result to real. True division always yields real.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
}

impl Value {
    pub fn as_real(self) -> f64 {
        match self {
            Value::Int(i) => i as f64,
            Value::Real(r) => r,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            // {:?} keeps a trailing ".0" on integral reals
            Value::Real(r) => write!(f, "{:?}", r),
        }
    }
}

/// Arithmetic failure, surfaced to the operand parser as a parse error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithError {
    DivideByZero,
    Overflow,
    InvalidShift(i64),
}

impl fmt::Display for ArithError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArithError::DivideByZero => write!(f, "Division by zero"),
            ArithError::Overflow => write!(f, "Integer overflow"),
            ArithError::InvalidShift(n) => write!(f, "Invalid shift count {}", n),
        }
    }
}

pub fn add(a: Value, b: Value) -> Result<Value, ArithError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_add(y)
            .map(Value::Int)
            .ok_or(ArithError::Overflow),
        _ => Ok(Value::Real(a.as_real() + b.as_real())),
    }
}

pub fn sub(a: Value, b: Value) -> Result<Value, ArithError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_sub(y)
            .map(Value::Int)
            .ok_or(ArithError::Overflow),
        _ => Ok(Value::Real(a.as_real() - b.as_real())),
    }
}

pub fn mul(a: Value, b: Value) -> Result<Value, ArithError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_mul(y)
            .map(Value::Int)
            .ok_or(ArithError::Overflow),
        _ => Ok(Value::Real(a.as_real() * b.as_real())),
    }
}

/// True division, always real.
pub fn div(a: Value, b: Value) -> Result<Value, ArithError> {
    if b.as_real() == 0.0 {
        return Err(ArithError::DivideByZero);
    }
    Ok(Value::Real(a.as_real() / b.as_real()))
}

/// Floor division. Integer operands stay integer, rounding toward
/// negative infinity.
pub fn floor_div(a: Value, b: Value) -> Result<Value, ArithError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if y == 0 {
                return Err(ArithError::DivideByZero);
            }
            let q = x.checked_div(y).ok_or(ArithError::Overflow)?;
            let r = x % y;
            Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) {
                q - 1
            } else {
                q
            }))
        }
        _ => {
            if b.as_real() == 0.0 {
                return Err(ArithError::DivideByZero);
            }
            Ok(Value::Real((a.as_real() / b.as_real()).floor()))
        }
    }
}

/// Exponentiation. An integer raised to a negative power yields real.
pub fn pow(a: Value, b: Value) -> Result<Value, ArithError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if y >= 0 {
                let e = u32::try_from(y).map_err(|_| ArithError::Overflow)?;
                x.checked_pow(e).map(Value::Int).ok_or(ArithError::Overflow)
            } else if x == 0 {
                Err(ArithError::DivideByZero)
            } else {
                Ok(Value::Real((x as f64).powf(y as f64)))
            }
        }
        _ => Ok(Value::Real(a.as_real().powf(b.as_real()))),
    }
}

pub fn neg(a: Value) -> Result<Value, ArithError> {
    match a {
        Value::Int(x) => x.checked_neg().map(Value::Int).ok_or(ArithError::Overflow),
        Value::Real(r) => Ok(Value::Real(-r)),
    }
}

/// Round to the nearest integer with ties going to the even neighbour.
pub fn round_half_even(v: f64) -> i64 {
    let floor = v.floor();
    let diff = v - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as i64
}

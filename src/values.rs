use core::fmt;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// 値の型システム
///
/// Every quantity flowing through a model is one of these tagged scalars.
/// `Error` is an ordinary value, not a fault: any operation applied to
/// operands it is not defined for yields `Error`, and `Error` absorbs all
/// further arithmetic. Measures treat it as "no data".
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    #[default]
    Error,
}

/// Static type of a [`Value`], used by the compiler's inference pass.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
pub enum ValueType {
    Boolean,
    Integer,
    Real,
    None,
}

impl ValueType {
    /// Result type of an arithmetic operator applied to two operands:
    /// Integer only when both sides are Integer, Real when the sides mix,
    /// None otherwise.
    pub fn promote(self, other: ValueType) -> ValueType {
        match (self, other) {
            (ValueType::Integer, ValueType::Integer) => ValueType::Integer,
            (ValueType::Integer, ValueType::Real)
            | (ValueType::Real, ValueType::Integer)
            | (ValueType::Real, ValueType::Real) => ValueType::Real,
            _ => ValueType::None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Real)
    }

    /// Two types are comparable when a relational operator may be applied
    /// to them: numeric against numeric, or boolean against boolean.
    pub fn comparable_with(self, other: ValueType) -> bool {
        (self.is_numeric() && other.is_numeric())
            || (self == ValueType::Boolean && other == ValueType::Boolean)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Error => write!(f, "<error>"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl Value {
    pub fn value_type(self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::Error => ValueType::None,
        }
    }

    /// Numeric reading of this value. Error (and Boolean) read as NaN, so
    /// that statistics consuming a failed evaluation keep propagating
    /// "no data" instead of a fabricated number.
    pub fn double_of(self) -> f64 {
        match self {
            Value::Integer(i) => i as f64,
            Value::Real(r) => r,
            Value::Boolean(_) | Value::Error => f64::NAN,
        }
    }

    pub fn int_of(self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(i),
            Value::Real(r) => Some(r as i64),
            _ => None,
        }
    }

    pub fn boolean_of(self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    pub fn is_error(self) -> bool {
        matches!(self, Value::Error)
    }

    fn numeric_pair(self, other: Value) -> Option<(f64, f64)> {
        match (self, other) {
            (Value::Integer(_) | Value::Real(_), Value::Integer(_) | Value::Real(_)) => {
                Some((self.double_of(), other.double_of()))
            }
            _ => None,
        }
    }

    fn int_pair(self, other: Value) -> Option<(i64, i64)> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn sum(self, other: Value) -> Value {
        if let Some((a, b)) = self.int_pair(other) {
            return Value::Integer(a.wrapping_add(b));
        }
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(a + b),
            None => Value::Error,
        }
    }

    pub fn sub(self, other: Value) -> Value {
        if let Some((a, b)) = self.int_pair(other) {
            return Value::Integer(a.wrapping_sub(b));
        }
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(a - b),
            None => Value::Error,
        }
    }

    pub fn mul(self, other: Value) -> Value {
        if let Some((a, b)) = self.int_pair(other) {
            return Value::Integer(a.wrapping_mul(b));
        }
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(a * b),
            None => Value::Error,
        }
    }

    pub fn div(self, other: Value) -> Value {
        if let Some((a, b)) = self.int_pair(other) {
            if b == 0 {
                return Value::Error;
            }
            return Value::Integer(a / b);
        }
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(a / b),
            None => Value::Error,
        }
    }

    /// Zero-preserving division: a divisor of zero yields zero of the
    /// promoted type rather than an undefined form.
    pub fn zero_div(self, other: Value) -> Value {
        if let Some((a, b)) = self.int_pair(other) {
            return Value::Integer(if b == 0 { 0 } else { a / b });
        }
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(if b == 0.0 { 0.0 } else { a / b }),
            None => Value::Error,
        }
    }

    pub fn modulo(self, other: Value) -> Value {
        if let Some((a, b)) = self.int_pair(other) {
            if b == 0 {
                return Value::Error;
            }
            return Value::Integer(a % b);
        }
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(a % b),
            None => Value::Error,
        }
    }

    pub fn pow(self, other: Value) -> Value {
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(a.powf(b)),
            None => Value::Error,
        }
    }

    pub fn neg(self) -> Value {
        match self {
            Value::Integer(i) => Value::Integer(-i),
            Value::Real(r) => Value::Real(-r),
            _ => Value::Error,
        }
    }

    pub fn and(self, other: Value) -> Value {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Value::Boolean(a && b),
            _ => Value::Error,
        }
    }

    pub fn or(self, other: Value) -> Value {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Value::Boolean(a || b),
            _ => Value::Error,
        }
    }

    pub fn not(self) -> Value {
        match self {
            Value::Boolean(b) => Value::Boolean(!b),
            _ => Value::Error,
        }
    }

    /// Total ordering between same-tagged numeric values; `None` when the
    /// operands are not comparable.
    pub fn partial_compare(self, other: Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(&b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(&b)),
            _ => self
                .numeric_pair(other)
                .and_then(|(a, b)| a.partial_cmp(&b)),
        }
    }

    pub fn min_value(self, other: Value) -> Value {
        match self.partial_compare(other) {
            Some(Ordering::Greater) => other,
            Some(_) => self,
            None => Value::Error,
        }
    }

    pub fn max_value(self, other: Value) -> Value {
        match self.partial_compare(other) {
            Some(Ordering::Less) => other,
            Some(_) => self,
            None => Value::Error,
        }
    }

    pub fn cast(self, target: ValueType) -> Value {
        match (self, target) {
            (Value::Integer(i), ValueType::Real) => Value::Real(i as f64),
            (Value::Real(r), ValueType::Integer) => Value::Integer(r as i64),
            (v, t) if v.value_type() == t => v,
            _ => Value::Error,
        }
    }

    /// Applies a real-valued unary builtin, e.g. `sin`/`log`.
    pub fn apply(self, op: fn(f64) -> f64) -> Value {
        match self {
            Value::Integer(_) | Value::Real(_) => Value::Real(op(self.double_of())),
            _ => Value::Error,
        }
    }

    /// Applies a real-valued binary builtin, e.g. `atan2`.
    pub fn apply2(self, other: Value, op: fn(f64, f64) -> f64) -> Value {
        match self.numeric_pair(other) {
            Some((a, b)) => Value::Real(op(a, b)),
            None => Value::Error,
        }
    }
}

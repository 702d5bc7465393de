//! This module defines the runtime datum of the engine, [`Value`]: a number, a
//! character, or an ordered, arbitrarily nested sequence of values. Sequences
//! are reference counted so that evaluation can pass them around and take
//! slices of them without copying. Ergonomic helpers such as [`val`], [`chr`],
//! [`text`] and [`nil`] are provided for building values in code and tests, and
//! conversion traits are implemented for common Rust types.
//!
//! Depth is a structural property computed on demand: scalars have depth 0, the
//! empty sequence has depth 1, and any other sequence is one deeper than its
//! deepest element.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::Error;

/// Integer representation used by the interpreter
pub(crate) type IntType = i64;

/// Numeric scalar. Integers and floats compare equal when they are
/// numerically equal, so `1` and `1.0` are the same value.
#[derive(Clone, Copy)]
pub enum Number {
    Int(IntType),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    /// Integer coercion: integers as-is, finite floats truncated toward zero.
    pub fn to_integer(self) -> Option<IntType> {
        match self {
            Number::Int(n) => Some(n),
            Number::Float(x) if x.is_finite() => {
                let truncated = x.trunc();
                if truncated >= IntType::MIN as f64 && truncated <= IntType::MAX as f64 {
                    Some(truncated as IntType)
                } else {
                    None
                }
            }
            Number::Float(_) => None,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(x) => x == 0.0,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

/// Runtime value
///
/// To build values, use the helper functions:
/// - `val(42)`, `val(2.5)` for numbers
/// - `chr('a')` for characters, `text("abc")` for character sequences
/// - `val([1, 2, 3])` for homogeneous sequences, `nil()` for the empty sequence
/// - `val(vec![val(1), val([2, 3])])` for mixed sequences
#[derive(Clone)]
pub enum Value {
    Number(Number),
    Char(char),
    /// Ordered sequence; shared structurally between evaluations
    List(Rc<[Value]>),
}

impl Value {
    pub fn int(n: IntType) -> Value {
        Value::Number(Number::Int(n))
    }

    pub fn float(x: f64) -> Value {
        Value::Number(Number::Float(x))
    }

    /// Build a sequence from any iterator of values
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// Boolean results are represented as 1 and 0
    pub fn from_bool(b: bool) -> Value {
        Value::int(IntType::from(b))
    }

    /// Nesting level: scalars are 0, the empty sequence is 1
    pub fn depth(&self) -> usize {
        match self {
            Value::Number(_) | Value::Char(_) => 0,
            Value::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
        }
    }

    /// Zero and the empty sequence are falsy; characters are always truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => !n.is_zero(),
            Value::Char(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer coercion used by conversion adapters and index computations
    pub fn to_integer(&self) -> Option<IntType> {
        self.as_number().and_then(Number::to_integer)
    }

    /// View a value as a sequence: sequences as themselves, scalars as a
    /// one-element sequence
    pub fn items(&self) -> Rc<[Value]> {
        match self {
            Value::List(items) => Rc::clone(items),
            scalar => Rc::from([scalar.clone()]),
        }
    }

    /// A non-empty sequence made only of characters
    pub fn is_string(&self) -> bool {
        matches!(self, Value::List(items)
            if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Char(_))))
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Char(_) => "character",
            Value::List(_) => "sequence",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::List(items) => {
                write!(f, "List(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::List(items) if self.is_string() => {
                for item in items.iter() {
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false, // Different variants are never equal
        }
    }
}

// From trait implementations for Value - enables .into() conversion

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::float(x)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_bool(b)
    }
}

/// Strings become character sequences
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::list(s.chars().map(Value::Char))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from(s.as_str())
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::int(n as IntType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::list(slice.iter().cloned().map(Into::into))
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<IntType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<IntType, Error> {
        match self {
            Value::Number(Number::Int(n)) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }
}

impl std::convert::TryInto<Number> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Number, Error> {
        match self {
            Value::Number(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn chr(c: char) -> Value {
    Value::Char(c)
}

/// Character sequence from a string slice
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn text(s: &str) -> Value {
    Value::from(s)
}

/// The empty sequence
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::list([])
}

use crate::Error;
use crate::ast::{Number, Value};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

// NOTE: This module is the adapter layer that turns strongly-typed Rust
// functions into the erased `OperationFn` stored on every primitive.
//
// Primitives see their operands only after the dispatcher has matched
// declared depths, so a depth-0 operand is always a scalar and a depth-1
// operand is always a flat sequence. The adapters still type-check every
// argument and report mismatches as `TypeError`.

/// Canonical erased primitive function type used by the evaluator.
///
/// Primitives receive ownership of their argument vector, enabling
/// implementations that consume or rearrange arguments if desired.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

// =====================================================================
// Argument conversion
// =====================================================================

/// Core trait used by the fixed-arity adapters to turn `Value` operands
/// into strongly-typed parameters.
///
/// The associated `Param<'a>` type is the parameter type as seen by
/// the primitive for a given lifetime of the local `Value` slots used
/// during argument conversion.
pub trait FromParam {
    type Param<'a>;

    /// Convert a single operand into this parameter type, either by
    /// borrowing from the slot (iterators) or by moving out of it.
    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::int(0)))
    }
}

// Blanket implementation for by-value scalar parameters that can be
// obtained from a `Value` via the standard `TryInto` trait. This covers
// `i64` and `Number`, for which `ast.rs` provides
// `impl TryInto<T> for Value`.
impl<T> FromParam for T
where
    Value: std::convert::TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let owned = std::mem::replace(value, Value::int(0));
        <Value as std::convert::TryInto<T>>::try_into(owned)
    }
}

impl<'b, K> FromParam for TypedValueIter<'b, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match value {
            Value::List(items) => TypedValueIter::<K>::new(items),
            other => Err(Error::TypeError(format!(
                "expected sequence, got {}",
                other.type_name()
            ))),
        }
    }
}

// =====================================================================
// Typed iterators over sequence operands
// =====================================================================

/// Describes how to view a `Value` slice as a typed iterator.
/// Implementations validate the slice upfront and project each element.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item<'a>;

    fn precheck(slice: &[Value]) -> Result<(), Error>;
    fn project<'a>(v: &'a Value) -> Self::Item<'a>;
}

/// Iterator over the elements of a sequence operand, parameterized by a
/// [`ValueElementKind`] that determines the element type and validation.
#[doc(hidden)]
pub struct TypedValueIter<'a, K: ValueElementKind> {
    inner: std::slice::Iter<'a, Value>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: &'a [Value]) -> Result<Self, Error> {
        K::precheck(values)?;
        Ok(TypedValueIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }
}

impl<'a, K> Iterator for TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.inner.next()?;
        Some(K::project(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> DoubleEndedIterator for TypedValueIter<'_, K>
where
    K: ValueElementKind,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        let v = self.inner.next_back()?;
        Some(K::project(v))
    }
}

impl<K> ExactSizeIterator for TypedValueIter<'_, K> where K: ValueElementKind {}
impl<K> FusedIterator for TypedValueIter<'_, K> where K: ValueElementKind {}

#[doc(hidden)]
pub struct ValueKind;

impl ValueElementKind for ValueKind {
    type Item<'a> = &'a Value;

    fn precheck(_slice: &[Value]) -> Result<(), Error> {
        Ok(())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item<'a> = Number;

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        for v in slice {
            if !matches!(v, Value::Number(_)) {
                return Err(Error::TypeError(format!(
                    "expected number, got {}",
                    v.type_name()
                )));
            }
        }
        Ok(())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let Value::Number(n) = v {
            *n
        } else {
            debug_assert!(false, "NumberKind::project saw non-number after precheck");
            unreachable!("NumberKind invariant violated")
        }
    }
}

/// Borrowed iterator over the elements of a sequence operand.
pub type ValueIter<'a> = TypedValueIter<'a, ValueKind>;

/// Borrowed iterator over a sequence operand whose elements must all be
/// numbers.
pub type NumIter<'a> = TypedValueIter<'a, NumberKind>;

// =====================================================================
// Return-type adaptation
// =====================================================================

/// Normalizes primitive return types to the canonical
/// `Result<Value, Error>` expected by the evaluator.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Converts strongly-typed Rust functions or closures into the erased
/// [`OperationFn`], parameterized by an argument tuple type.
///
/// Links have at most two operands, so adapters exist for zero, one and
/// two parameters.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Implements `IntoOperation` for one fixed arity.
///
/// Arity is checked up front, then the owned `Vec<Value>` is
/// destructured into local slots so that `FromParam` can either borrow
/// from or consume each operand.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(Error::arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

// Niladic primitives
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error(0, args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{IntType, chr, nil, val};

    #[test]
    fn test_fixed_arity_adapters() {
        let zero = IntoOperation::<()>::into_operation(|| -> IntType { 7 });
        assert_eq!(zero(vec![]).unwrap(), val(7));
        assert!(matches!(
            zero(vec![val(1)]),
            Err(Error::ArityError { expected: 0, got: 1, .. })
        ));

        let negate = IntoOperation::<(IntType,)>::into_operation(|n: IntType| -n);
        assert_eq!(negate(vec![val(4)]).unwrap(), val(-4));
        assert!(matches!(negate(vec![chr('a')]), Err(Error::TypeError(_))));
        assert!(matches!(
            negate(vec![val(1), val(2)]),
            Err(Error::ArityError { expected: 1, got: 2, .. })
        ));

        let pair = IntoOperation::<(Value, Value)>::into_operation(|a: Value, b: Value| {
            Value::list([a, b])
        });
        assert_eq!(pair(vec![val(1), chr('x')]).unwrap(), val(vec![val(1), chr('x')]));
    }

    #[test]
    fn test_iterator_parameters() {
        fn total(nums: NumIter<'_>) -> Result<Value, Error> {
            let mut sum: IntType = 0;
            for n in nums {
                sum += n
                    .to_integer()
                    .ok_or_else(|| Error::TypeError("expected integer".into()))?;
            }
            Ok(val(sum))
        }
        fn count(items: ValueIter<'_>) -> IntType {
            items.len() as IntType
        }

        let total = IntoOperation::<(NumIter<'static>,)>::into_operation(total);
        assert_eq!(total(vec![val([1, 2, 3])]).unwrap(), val(6));
        assert_eq!(total(vec![nil()]).unwrap(), val(0));
        assert!(matches!(total(vec![val(3)]), Err(Error::TypeError(_))));
        assert!(matches!(total(vec![val("ab")]), Err(Error::TypeError(_))));

        let count = IntoOperation::<(ValueIter<'static>,)>::into_operation(count);
        assert_eq!(count(vec![val(vec![val(1), val("ab")])]).unwrap(), val(2));
    }

    #[test]
    fn test_result_returning_primitive() {
        let checked = IntoOperation::<(IntType, IntType)>::into_operation(
            |a: IntType, b: IntType| -> Result<IntType, Error> {
                a.checked_add(b)
                    .ok_or_else(|| Error::EvalError("Integer overflow in addition".into()))
            },
        );
        assert_eq!(checked(vec![val(2), val(3)]).unwrap(), val(5));
        let err = checked(vec![val(IntType::MAX), val(1)]).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }
}

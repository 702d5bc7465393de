//! Rank-polymorphic dispatch.
//!
//! A primitive declares the depth at which each operand is consumed. An
//! operand shallower than declared is wrapped in a one-element sequence, a
//! deeper one is mapped over, so a scalar primitive applies elementwise to
//! arbitrarily nested sequences. When both operands are too deep by the same
//! amount, their elements are paired index by index and the tail of the longer
//! side is kept unchanged.

use crate::Error;
use crate::ast::Value;
use crate::link::Link;

use super::Evaluator;

impl Evaluator<'_> {
    /// Apply a link to one operand. `flat` ignores the declared depth.
    pub(super) fn dispatch_monadic(
        &mut self,
        link: &Link,
        x: Value,
        flat: bool,
    ) -> Result<Value, Error> {
        let declared = if flat { None } else { link.depths().left };
        let Some(declared) = declared else {
            return self.invoke(link, Some(x), None);
        };
        let actual = x.depth();
        if actual == declared {
            self.invoke(link, Some(x), None)
        } else if actual < declared {
            self.dispatch_monadic(link, Value::list([x]), flat)
        } else {
            let items = x.items();
            let mapped = items
                .iter()
                .map(|item| self.dispatch_monadic(link, item.clone(), flat))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(mapped))
        }
    }

    /// Apply a link to two operands. `flat` ignores both declared depths.
    pub(super) fn dispatch_dyadic(
        &mut self,
        link: &Link,
        x: Value,
        y: Value,
        flat: bool,
    ) -> Result<Value, Error> {
        let depths = link.depths();
        let (left, right) = if flat {
            (None, None)
        } else {
            (depths.left, depths.right)
        };
        // (actual, declared) per side, for the sides that declare a depth
        let left = left.map(|declared| (x.depth(), declared));
        let right = right.map(|declared| (y.depth(), declared));

        let matches = |side: Option<(usize, usize)>| side.is_none_or(|(a, d)| a == d);
        if matches(left) && matches(right) {
            return self.invoke(link, Some(x), Some(y));
        }

        if let Some((actual, declared)) = left
            && actual < declared
        {
            return self.dispatch_dyadic(link, Value::list([x]), y, flat);
        }
        if let Some((actual, declared)) = right
            && actual < declared
        {
            return self.dispatch_dyadic(link, x, Value::list([y]), flat);
        }

        // Neither side is shallower: descend into the side with more excess
        let excess = |side: Option<(usize, usize)>| side.map(|(a, d)| a - d);
        let (left_excess, right_excess) = (excess(left), excess(right));
        let descend_right = match (left_excess, right_excess) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(l), Some(r)) => l < r,
        };
        let descend_left = match (left_excess, right_excess) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(l), Some(r)) => l > r,
        };

        if descend_right {
            let items = y.items();
            let mapped = items
                .iter()
                .map(|item| self.dispatch_dyadic(link, x.clone(), item.clone(), flat))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::list(mapped));
        }
        if descend_left {
            let items = x.items();
            let mapped = items
                .iter()
                .map(|item| self.dispatch_dyadic(link, item.clone(), y.clone(), flat))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::list(mapped));
        }

        let (xs, ys) = (x.items(), y.items());
        let mut zipped = xs
            .iter()
            .zip(ys.iter())
            .map(|(a, b)| self.dispatch_dyadic(link, a.clone(), b.clone(), flat))
            .collect::<Result<Vec<_>, _>>()?;
        let shorter = xs.len().min(ys.len());
        zipped.extend(xs.iter().skip(shorter).cloned());
        zipped.extend(ys.iter().skip(shorter).cloned());
        Ok(Value::list(zipped))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use std::sync::Arc;

    use crate::ast::{Value, chr, nil, text, val};
    use crate::builtinops::{Depths, Primitive, find_primitive};
    use crate::evaluator::Evaluator;
    use crate::evaluator::intooperation::IntoOperation;
    use crate::host::RecordingHost;
    use crate::link::{Arity, Link};
    use crate::program::Program;

    fn link(symbol: &str) -> Link {
        Link::primitive(find_primitive(symbol).unwrap())
    }

    /// A primitive that reports the operands it was handed
    fn probe(depths: Depths) -> Link {
        let func = IntoOperation::<(Value, Value)>::into_operation(|a: Value, b: Value| {
            Value::list([text("call"), a, b])
        });
        Link::primitive(Arc::new(
            Primitive::new("P", "probe", Arity::Dyadic, func).with_depths(depths),
        ))
    }

    fn call(x: Value, y: Value, depths: Depths, flat: bool) -> Value {
        let program = Program::from_tokens(vec![]).unwrap();
        let mut host = RecordingHost::default();
        let mut evaluator = Evaluator::new(&program, &mut host);
        evaluator.dispatch_dyadic(&probe(depths), x, y, flat).unwrap()
    }

    fn called(a: Value, b: Value) -> Value {
        Value::list([text("call"), a, b])
    }

    #[test]
    fn test_monadic_dispatch() {
        let program = Program::from_tokens(vec![]).unwrap();
        let mut host = RecordingHost::default();
        let mut evaluator = Evaluator::new(&program, &mut host);

        // (link symbol, argument, expected)
        let test_cases = vec![
            ("D", val(4), val(8)),
            ("D", val([1, 2]), val([2, 4])),
            ("D", val(vec![val([1]), val(vec![val([2])])]), val(vec![val([2]), val(vec![val([4])])])),
            ("D", nil(), nil()),
            // depth 1: scalars are wrapped first
            ("S", val(4), val(4)),
            ("S", val([[1, 2], [3, 4]]), val([3, 7])),
            ("U", text("ab"), text("ba")),
            ("U", val(vec![text("ab"), text("cd")]), val(vec![text("ba"), text("dc")])),
            // no declared depth: passed through whole
            ("L", val([[1, 2], [3, 4]]), val(2)),
            // integer conversion adapter falls back to 0
            ("~", val([0, 1]), val([-1, -2])),
            ("~", val(vec![chr('a'), val(2.7)]), val([0, -3])),
        ];

        for (i, (symbol, arg, expected)) in test_cases.into_iter().enumerate() {
            let result = evaluator.dispatch_monadic(&link(symbol), arg, false).unwrap();
            assert_eq!(result, expected, "Test case {} ({symbol})", i + 1);
        }
    }

    #[test]
    fn test_matched_depths_apply_directly() {
        let scalars = Depths::dyadic(0, 0);
        assert_eq!(call(val(1), val(2), scalars, false), called(val(1), val(2)));

        let vectors = Depths::dyadic(1, 1);
        assert_eq!(
            call(val([1, 2]), val([3]), vectors, false),
            called(val([1, 2]), val([3]))
        );

        // Flat dispatch ignores every declared depth
        assert_eq!(
            call(val([1, 2]), val([3, 4]), scalars, true),
            called(val([1, 2]), val([3, 4]))
        );
    }

    #[test]
    fn test_dyadic_wrapping_and_mapping() {
        let vectors = Depths::dyadic(1, 1);
        // Scalars are wrapped up to the declared depth, left side first
        assert_eq!(call(val(1), val(2), vectors, false), called(val([1]), val([2])));

        let scalar_vector = Depths::dyadic(0, 1);
        // Right is at its depth, left is deeper: map over left
        assert_eq!(
            call(val([1, 2]), val([9]), scalar_vector, false),
            val(vec![called(val(1), val([9])), called(val(2), val([9]))])
        );

        // Undeclared left side: descend into the right
        let right_only = Depths::new(None, Some(0));
        assert_eq!(
            call(val([1, 2]), val([3, 4]), right_only, false),
            val(vec![called(val([1, 2]), val(3)), called(val([1, 2]), val(4))])
        );

        // Undeclared right side: descend into the left
        let left_only = Depths::new(Some(0), None);
        assert_eq!(
            call(val([1, 2]), val([3, 4]), left_only, false),
            val(vec![called(val(1), val([3, 4])), called(val(2), val([3, 4]))])
        );
    }

    #[test]
    fn test_broadcast_tails() {
        let program = Program::from_tokens(vec![]).unwrap();
        let mut host = RecordingHost::default();
        let mut evaluator = Evaluator::new(&program, &mut host);
        let add = link("+");

        // (left, right, expected)
        let test_cases = vec![
            (val([1, 2, 3]), val([10, 20]), val([11, 22, 3])),
            (val([1]), val([10, 20, 30]), val([11, 20, 30])),
            (nil(), val([1, 2]), val([1, 2])),
            (val([1, 2]), val(10), val([11, 12])),
            (val(10), val([1, 2]), val([11, 12])),
            (
                val(vec![val([1, 2]), val(3)]),
                val([10, 20]),
                val(vec![val([11, 22]), val([13, 23])]),
            ),
            (
                val([[1, 2], [3, 4]]),
                val(vec![val([10]), val([20, 30, 40])]),
                val(vec![val([11, 2]), val([23, 34, 40])]),
            ),
        ];

        for (i, (left, right, expected)) in test_cases.into_iter().enumerate() {
            let result = evaluator.dispatch_dyadic(&add, left, right, false).unwrap();
            assert_eq!(result, expected, "Test case {}", i + 1);
        }
    }
}

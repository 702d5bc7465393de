//! Chain evaluation.
//!
//! A chain is evaluated with zero, one or two arguments. Before a monadic or
//! dyadic pass, every unresolved link of the chain is bound to the pass arity;
//! the pass then consumes the links left to right, choosing at each step from
//! the arities of the next few links how the running value and the arguments
//! are combined (see [`Evaluator::monadic_chain`] and
//! [`Evaluator::dyadic_chain`]).
//!
//! Leaf primitives are reached through the rank-polymorphic dispatcher in
//! `dispatch`; higher-order links run through `combinators`.

use std::rc::Rc;

use tracing::{trace, warn};

use crate::ast::Value;
use crate::host::Host;
use crate::link::{Arity, Chain, Link, LinkKind, leading_constant};
use crate::program::Program;
use crate::{Error, MAX_EVAL_DEPTH};

mod combinators;
mod dispatch;
pub mod intooperation;

/// Remaining stack below which evaluation moves to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each stack segment allocated for deep evaluation
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluation guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum nesting of chain references. Only self-reference, relative
    /// and indexed chain calls count; groups and combinator bodies do not,
    /// so a recursive program may recurse `max_depth` times.
    pub max_depth: usize,
    /// Maximum iterations of any single loop; `None` lets loops run until
    /// their own condition stops them
    pub max_iterations: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
            max_iterations: None,
        }
    }
}

/// Evaluates the chains of one program against a host
pub struct Evaluator<'a> {
    program: &'a Program,
    host: &'a mut dyn Host,
    config: EvalConfig,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(program: &'a Program, host: &'a mut dyn Host) -> Self {
        Self::with_config(program, host, EvalConfig::default())
    }

    pub fn with_config(program: &'a Program, host: &'a mut dyn Host, config: EvalConfig) -> Self {
        Evaluator {
            program,
            host,
            config,
            depth: 0,
        }
    }

    /// Evaluate the entry chain with zero, one or two arguments
    pub fn run(&mut self, args: &[Value]) -> Result<Value, Error> {
        let entry = self.program.entry_index();
        match args {
            [] => self.niladic(entry),
            [x] => self.monadic(entry, x.clone()),
            [x, y] => self.dyadic(entry, x.clone(), y.clone()),
            _ => Err(Error::arity_error_with_expr(
                2,
                args.len(),
                "program".to_owned(),
            )),
        }
    }

    pub fn niladic(&mut self, chain: usize) -> Result<Value, Error> {
        let chain = self.chain(chain)?;
        self.niladic_chain(chain.links())
    }

    pub fn monadic(&mut self, chain: usize, x: Value) -> Result<Value, Error> {
        let chain = self.chain(chain)?;
        self.monadic_chain(chain.links(), x)
    }

    pub fn dyadic(&mut self, chain: usize, x: Value, y: Value) -> Result<Value, Error> {
        let chain = self.chain(chain)?;
        self.dyadic_chain(chain.links(), x, y)
    }

    /// Evaluate a chain with however many arguments are present
    pub fn variadic(
        &mut self,
        chain: usize,
        x: Option<Value>,
        y: Option<Value>,
    ) -> Result<Value, Error> {
        let chain = self.chain(chain)?;
        self.variadic_chain(chain, x, y)
    }

    /// Invoke a single link with however many arguments are present,
    /// binding it first if its arity is unresolved
    pub fn call_link(
        &mut self,
        link: &Link,
        x: Option<Value>,
        y: Option<Value>,
    ) -> Result<Value, Error> {
        self.variadic_link(link, x, y, false)
    }

    fn chain(&self, index: usize) -> Result<&'a Chain, Error> {
        let program = self.program;
        program
            .chain(index)
            .ok_or_else(|| Error::EvalError(format!("No chain at index {index}")))
    }

    /// Run `f` on a stack with at least `STACK_RED_ZONE` bytes left,
    /// growing it onto the heap when needed
    fn with_stack<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || f(self))
    }

    /// Follow a chain reference one level deeper, failing once the depth
    /// limit is reached
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.depth >= self.config.max_depth {
            warn!(max_depth = self.config.max_depth, "evaluation depth limit hit");
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_depth
            )));
        }
        self.depth += 1;
        let result = self.with_stack(f);
        self.depth -= 1;
        result
    }

    /// Check a loop's iteration count against the configured cap
    fn tick(&self, iterations: usize) -> Result<(), Error> {
        match self.config.max_iterations {
            Some(max) if iterations > max => {
                warn!(max_iterations = max, "loop iteration limit hit");
                Err(Error::EvalError(format!(
                    "Loop iteration limit exceeded (max: {max})"
                )))
            }
            _ => Ok(()),
        }
    }

    fn variadic_chain(
        &mut self,
        chain: &Chain,
        x: Option<Value>,
        y: Option<Value>,
    ) -> Result<Value, Error> {
        match (x, y) {
            (None, None) => self.niladic_chain(chain.links()),
            (Some(x), None) | (None, Some(x)) => self.monadic_chain(chain.links(), x),
            (Some(x), Some(y)) => self.dyadic_chain(chain.links(), x, y),
        }
    }

    /// Zero-argument evaluation: a chain that does not open with a niladic
    /// (or unresolved) link runs monadically on `0`; otherwise the first link
    /// supplies the seed for a monadic pass over the rest.
    fn niladic_chain(&mut self, links: &[Rc<Link>]) -> Result<Value, Error> {
        match links.first() {
            Some(first) if first.arity_code() <= 0 => {
                let seed = self.with_stack(|ev| ev.niladic_link(first))?;
                self.monadic_chain(&links[1..], seed)
            }
            _ => self.monadic_chain(links, Value::int(0)),
        }
    }

    /// One-argument evaluation
    ///
    /// | next arities | step                          |
    /// |--------------|-------------------------------|
    /// | 2, 1         | `ret = l0(ret, l1(arg))`      |
    /// | 2, 0         | `ret = l0(ret, l1())`         |
    /// | 0, 2         | `ret = l1(l0(), ret)`         |
    /// | 2            | `ret = l0(ret, arg)`          |
    /// | 1            | `ret = l0(ret)`               |
    /// | 0            | emit `ret`, then `ret = l0()` |
    fn monadic_chain(&mut self, links: &[Rc<Link>], arg: Value) -> Result<Value, Error> {
        self.with_stack(|ev| {
            for link in links {
                link.bind(Arity::Monadic);
            }
            let mut rest = links;
            let mut ret = if leading_constant(rest) {
                let seed = ev.niladic_link(&rest[0])?;
                rest = &rest[1..];
                seed
            } else {
                arg.clone()
            };

            while let Some(first) = rest.first() {
                let second = rest.get(1);
                let pattern = (first.bind(Arity::Monadic), second.map(|l| l.bind(Arity::Monadic)));
                trace!(arity = 1, pattern = ?pattern, link = %first.describe(), "chain step");
                let consumed = match pattern {
                    (Arity::Dyadic, Some(Arity::Monadic)) => {
                        let right = ev.monadic_link(&rest[1], arg.clone())?;
                        ret = ev.dyadic_link(first, ret, right)?;
                        2
                    }
                    (Arity::Dyadic, Some(Arity::Niladic)) => {
                        let right = ev.niladic_link(&rest[1])?;
                        ret = ev.dyadic_link(first, ret, right)?;
                        2
                    }
                    (Arity::Niladic, Some(Arity::Dyadic)) => {
                        let left = ev.niladic_link(first)?;
                        ret = ev.dyadic_link(&rest[1], left, ret)?;
                        2
                    }
                    (Arity::Dyadic, _) => {
                        ret = ev.dyadic_link(first, ret, arg.clone())?;
                        1
                    }
                    (Arity::Monadic, _) => {
                        ret = ev.monadic_link(first, ret)?;
                        1
                    }
                    (Arity::Niladic, _) => {
                        ev.host.emit(&ret)?;
                        ret = ev.niladic_link(first)?;
                        1
                    }
                };
                rest = &rest[consumed..];
            }
            Ok(ret)
        })
    }

    /// Two-argument evaluation
    ///
    /// | next arities                     | step                                |
    /// |----------------------------------|-------------------------------------|
    /// | 2, 2, 0 and a seed from `l2` on  | `ret = l1(l0(ret, right), l2())`    |
    /// | 2, 2                             | `ret = l0(ret, l1(left, right))`    |
    /// | 2, 0                             | `ret = l0(ret, l1())`               |
    /// | 0, 2                             | `ret = l1(l0(), ret)`               |
    /// | 2                                | `ret = l0(ret, right)`              |
    /// | 1                                | `ret = l0(ret)`                     |
    /// | 0                                | emit `ret`, then `ret = l0()`       |
    fn dyadic_chain(&mut self, links: &[Rc<Link>], left: Value, right: Value) -> Result<Value, Error> {
        self.with_stack(|ev| {
            for link in links {
                link.bind(Arity::Dyadic);
            }
            let mut rest = links;
            let opens_with_dyads = rest.len() >= 3
                && rest[..3].iter().all(|l| l.arity() == Some(Arity::Dyadic));
            let mut ret = if opens_with_dyads {
                let seed = ev.dyadic_link(&rest[0], left.clone(), right.clone())?;
                rest = &rest[1..];
                seed
            } else if leading_constant(rest) {
                let seed = ev.niladic_link(&rest[0])?;
                rest = &rest[1..];
                seed
            } else {
                left.clone()
            };

            while let Some(first) = rest.first() {
                let arity_at = |i: usize| rest.get(i).map(|l: &Rc<Link>| l.bind(Arity::Dyadic));
                let pattern = (first.bind(Arity::Dyadic), arity_at(1), arity_at(2));
                trace!(arity = 2, pattern = ?pattern, link = %first.describe(), "chain step");
                let consumed = match pattern {
                    (Arity::Dyadic, Some(Arity::Dyadic), Some(Arity::Niladic))
                        if leading_constant(&rest[2..]) =>
                    {
                        let inner = ev.dyadic_link(first, ret, right.clone())?;
                        let constant = ev.niladic_link(&rest[2])?;
                        ret = ev.dyadic_link(&rest[1], inner, constant)?;
                        3
                    }
                    (Arity::Dyadic, Some(Arity::Dyadic), _) => {
                        let inner = ev.dyadic_link(&rest[1], left.clone(), right.clone())?;
                        ret = ev.dyadic_link(first, ret, inner)?;
                        2
                    }
                    (Arity::Dyadic, Some(Arity::Niladic), _) => {
                        let constant = ev.niladic_link(&rest[1])?;
                        ret = ev.dyadic_link(first, ret, constant)?;
                        2
                    }
                    (Arity::Niladic, Some(Arity::Dyadic), _) => {
                        let constant = ev.niladic_link(first)?;
                        ret = ev.dyadic_link(&rest[1], constant, ret)?;
                        2
                    }
                    (Arity::Dyadic, _, _) => {
                        ret = ev.dyadic_link(first, ret, right.clone())?;
                        1
                    }
                    (Arity::Monadic, _, _) => {
                        ret = ev.monadic_link(first, ret)?;
                        1
                    }
                    (Arity::Niladic, _, _) => {
                        ev.host.emit(&ret)?;
                        ret = ev.niladic_link(first)?;
                        1
                    }
                };
                rest = &rest[consumed..];
            }
            Ok(ret)
        })
    }

    /// Call a link with no arguments, without binding its arity
    fn niladic_link(&mut self, link: &Link) -> Result<Value, Error> {
        self.invoke(link, None, None)
    }

    fn monadic_link(&mut self, link: &Link, x: Value) -> Result<Value, Error> {
        self.dispatch_monadic(link, x, false)
    }

    fn dyadic_link(&mut self, link: &Link, x: Value, y: Value) -> Result<Value, Error> {
        self.dispatch_dyadic(link, x, y, false)
    }

    /// Call a link with whatever arguments are present. An unresolved link is
    /// bound to the number of present arguments; a dyadic link without a
    /// right argument receives the left one twice.
    fn variadic_link(
        &mut self,
        link: &Link,
        x: Option<Value>,
        y: Option<Value>,
        flat: bool,
    ) -> Result<Value, Error> {
        let present = usize::from(x.is_some()) + usize::from(y.is_some());
        let arity = link.bind(Arity::from_count(present).unwrap_or(Arity::Dyadic));
        let mut args = x.into_iter().chain(y);
        match arity {
            Arity::Niladic => self.niladic_link(link),
            Arity::Monadic => {
                let x = args
                    .next()
                    .ok_or_else(|| Error::arity_error_with_expr(1, 0, link.describe()))?;
                self.dispatch_monadic(link, x, flat)
            }
            Arity::Dyadic => {
                let x = args
                    .next()
                    .ok_or_else(|| Error::arity_error_with_expr(2, 0, link.describe()))?;
                let y = args.next().unwrap_or_else(|| x.clone());
                self.dispatch_dyadic(link, x, y, flat)
            }
        }
    }

    /// Perform a link's operation on exactly the given arguments
    fn invoke(&mut self, link: &Link, x: Option<Value>, y: Option<Value>) -> Result<Value, Error> {
        match link.kind() {
            LinkKind::Primitive(primitive) => primitive.call(x.into_iter().chain(y).collect()),
            LinkKind::Literal(value) => Ok(value.clone()),
            LinkKind::Register => Ok(self.program.register()),
            LinkKind::Group(chain) => self.variadic_chain(chain, x, y),
            LinkKind::Combinator(combinator) => self.call_combinator(combinator, x, y),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};
    use crate::host::RecordingHost;
    use crate::program::parse_program;

    /// Test result variants for data-driven evaluation tests
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
    }
    use TestResult::*;

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn run_cases(test_cases: Vec<(&str, Vec<Value>, TestResult)>) {
        for (i, (source, args, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("#{} '{source}'", i + 1);
            let program = parse_program(source)
                .unwrap_or_else(|e| panic!("{test_id}: unexpected parse error: {e}"));
            let mut host = RecordingHost::default();
            match (program.run(&mut host, &args), expected) {
                (Ok(actual), EvalResult(expected)) => {
                    assert_eq!(actual, expected, "{test_id}");
                }
                (Err(e), SpecificError(text)) => {
                    let msg = e.to_string();
                    assert!(msg.contains(text), "{test_id}: error should contain '{text}', got: {msg}");
                }
                (Ok(actual), SpecificError(text)) => {
                    panic!("{test_id}: expected error containing '{text}', got {actual:?}");
                }
                (Err(e), EvalResult(expected)) => {
                    panic!("{test_id}: expected {expected:?}, got error {e:?}");
                }
            }
        }
    }

    #[test]
    fn test_chain_patterns() {
        run_cases(vec![
            // Monadic trains
            ("DC", vec![val(5)], success(11)),
            ("+/", vec![val([1, 2, 3, 4])], success(10)),
            ("+D", vec![val(3)], success(9)), // [2,1]: x + D(x)
            ("+1", vec![val(3)], success(4)), // [2,0]
            ("2-", vec![val(3)], success(-1)), // [0,2]: 2 - x
            ("*", vec![val(4)], success(16)), // [2]: x * x
            ("1+D", vec![val(3)], success(8)), // [0,2]: 1 + x, then double
            // Dyadic trains
            ("+-", vec![val(10), val(3)], success(17)), // fork: x + (x - y)
            ("-", vec![val(10), val(3)], success(7)),
            ("+2", vec![val(10), val(3)], success(12)), // [2,0]
            ("2-", vec![val(10), val(3)], success(-8)), // [0,2]: 2 - x
            ("2+1", vec![val(10), val(3)], success(3)), // opens with a seed
            ("+-*", vec![val(5), val(2)], success(-3)), // seeded by x + y, then minus x * y
            ("+*2", vec![val(5), val(2)], success(14)), // (x + y) * 2
            ("+C", vec![val(5), val(2)], success(8)), // [2] then [1]
            // Niladic
            ("5D", vec![], success(10)),
            ("D", vec![], success(0)),
            ("", vec![], success(0)),
            ("", vec![val(7)], success(7)),
            // Broadcasting through the dispatcher
            ("+", vec![val([1, 2, 3]), val([10, 20])], success([11, 22, 3])),
            ("+", vec![val([1, 2]), val(10)], success([11, 12])),
            ("D", vec![val(vec![val(1), val([2, 3])])], success(vec![val(2), val([4, 6])])),
            ("S", vec![val([[1, 2], [3, 4]])], success([3, 7])),
            ("S", vec![val(5)], success(5)),
            // Leaf failures abort the evaluation
            (":", vec![val(1), val(0)], SpecificError("zero")),
            ("D", vec![val(1), val(2), val(3)], SpecificError("ArityError")),
        ]);
    }

    #[test]
    fn test_leading_constant_tie_break() {
        // [niladic, dyadic] takes no seed: dyadic(niladic(), x)
        run_cases(vec![
            ("2,", vec![val(10), val(3)], success([2, 10])),
            ("2,1", vec![val(10), val(3)], success([2, 1])),
        ]);
    }

    #[test]
    fn test_emit_from_constant_in_chain() {
        let program = parse_program("D5C").unwrap();
        let mut host = RecordingHost::default();
        let result = program.run(&mut host, &[val(4)]).unwrap();
        assert_eq!(result, val(6));
        assert_eq!(host.emitted(), &[val(8)]);
    }

    #[test]
    fn test_loop_cycle_detection() {
        run_cases(vec![
            ("+2%5µ`A", vec![val(3)], success([3, 0, 2, 4, 1])),
            ("+2%5µ`L", vec![val(3)], success(1)),
            ("+2%5µ`C", vec![val(3)], success([3, 0, 2, 4, 1])),
            ("H`A", vec![val(0)], EvalResult(val(vec![val(0)]))),
        ]);
    }

    #[test]
    fn test_permanent_binding() {
        let program = parse_program("D").unwrap();
        let group = &program.chain(0).unwrap().links()[0];
        assert_eq!(group.arity(), None);

        let mut host = RecordingHost::default();
        let mut evaluator = Evaluator::new(&program, &mut host);
        assert_eq!(evaluator.monadic(0, val(5)).unwrap(), val(10));
        assert_eq!(group.arity(), Some(Arity::Monadic));

        // Reached dyadically later, the group still runs monadically on x
        assert_eq!(evaluator.dyadic(0, val(5), val(7)).unwrap(), val(10));
        assert_eq!(group.arity(), Some(Arity::Monadic));

        let fresh = parse_program("D").unwrap();
        let mut host = RecordingHost::default();
        let mut evaluator = Evaluator::new(&fresh, &mut host);
        assert_eq!(evaluator.dyadic(0, val(5), val(7)).unwrap(), val(10));
        assert_eq!(fresh.chain(0).unwrap().links()[0].arity(), Some(Arity::Dyadic));
    }

    #[test]
    fn test_variadic_entry_points() {
        let program = parse_program("C\n+").unwrap();
        let mut host = RecordingHost::default();
        let mut evaluator = Evaluator::new(&program, &mut host);
        assert_eq!(evaluator.variadic(0, Some(val(1)), None).unwrap(), val(2));
        assert_eq!(evaluator.variadic(1, Some(val(1)), Some(val(2))).unwrap(), val(3));
        assert_eq!(evaluator.variadic(1, None, None).unwrap(), val(0));
        assert!(matches!(evaluator.niladic(5), Err(Error::EvalError(_))));

        let increment = Link::primitive(crate::builtinops::find_primitive("C").unwrap());
        assert_eq!(evaluator.call_link(&increment, Some(val([1, 2])), None).unwrap(), val([2, 3]));
        assert!(matches!(
            evaluator.call_link(&increment, None, None),
            Err(Error::ArityError { .. })
        ));

        let pair = Link::primitive(crate::builtinops::find_primitive(",").unwrap());
        assert_eq!(evaluator.call_link(&pair, Some(val(4)), None).unwrap(), val([4, 4]));
        assert_eq!(evaluator.call_link(&pair, Some(nil()), Some(val(1))).unwrap(), val(vec![nil(), val(1)]));
    }

    /// Run `f` on a thread with a 2 MiB stack, the default for spawned threads
    fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_evaluation_depth_limit() {
        on_small_stack(|| {
            run_cases(vec![
                ("s", vec![val(1)], SpecificError("depth")),
                // Each self-reference is one level: n + f(n - 1), f(0) = 1
                ("+Ks$$1I?", vec![val(100)], success(5051)),
                ("+Ks$$1I?", vec![val(MAX_EVAL_DEPTH as i64 + 50)], SpecificError("depth")),
            ]);
        });

        let program = parse_program("C\n`mD").unwrap();
        let mut host = RecordingHost::default();
        let no_calls = EvalConfig {
            max_depth: 0,
            ..EvalConfig::default()
        };
        let err = program.run_with_config(&mut host, &[val(1)], no_calls).unwrap_err();
        assert!(err.to_string().contains("depth limit exceeded (max: 0)"));
        let one_call = EvalConfig {
            max_depth: 1,
            ..EvalConfig::default()
        };
        assert_eq!(program.run_with_config(&mut host, &[val(1)], one_call).unwrap(), val(4));
        assert_eq!(program.run(&mut host, &[val(1)]).unwrap(), val(4));
    }

    #[test]
    fn test_iteration_limit() {
        let program = parse_program("C`L").unwrap();
        let mut host = RecordingHost::default();
        let capped = EvalConfig {
            max_iterations: Some(100),
            ..EvalConfig::default()
        };
        let err = program.run_with_config(&mut host, &[val(0)], capped).unwrap_err();
        assert!(err.to_string().contains("iteration limit"));
    }
}

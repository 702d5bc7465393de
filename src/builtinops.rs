//! Leaf primitive registry and vocabulary.
//!
//! Primitives are the leaves of every program: plain functions over already
//! depth-matched operands. Each registry entry records how the engine should
//! treat the function, not what it computes:
//!
//! - **arity**: how many operands it takes (0, 1 or 2)
//! - **depths**: the nesting level at which each operand is consumed; the
//!   dispatcher maps over deeper values and wraps shallower ones
//! - **conversion**: an optional adapter that coerces operands to integers
//!   and falls back to a plain value instead of failing
//!
//! ```text
//! +   add        dyadic   depths 0/0   [1, 2] + 10 gives [11, 12]
//! S   sum        monadic  depth 1      [[1, 2], [3, 4]] gives [3, 7]
//! L   length     monadic  no depth     [[1, 2], [3, 4]] gives 2
//! ```
//!
//! ## Adding New Primitives
//!
//! 1. **Implement the function** with typed parameters (`Number`, `IntType`,
//!    `Value`, `NumIter`, `ValueIter`) returning a value or `Result`
//! 2. **Add it to BUILTIN_PRIMITIVES** with a symbol, arity and depths
//! 3. **Add tests** covering broadcasting edge cases and error conditions
//!
//! Embedders can also extend a [`Vocabulary`] at runtime with
//! [`Vocabulary::register_operation`]; the lexer resolves symbols against it.

use crate::Error;
use crate::ast::{IntType, Number, Value};
use crate::evaluator::intooperation::{IntoOperation, NumIter, OperationFn, ValueIter};
use crate::link::Arity;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Declared operand depths of a primitive; `None` on a side means the
/// operand is passed through without depth matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Depths {
    pub left: Option<usize>,
    pub right: Option<usize>,
}

impl Depths {
    /// No depth matching on either side
    pub const FLAT: Depths = Depths {
        left: None,
        right: None,
    };

    pub const fn new(left: Option<usize>, right: Option<usize>) -> Self {
        Depths { left, right }
    }

    pub const fn monadic(depth: usize) -> Self {
        Depths::new(Some(depth), None)
    }

    pub const fn dyadic(left: usize, right: usize) -> Self {
        Depths::new(Some(left), Some(right))
    }
}

/// Operand coercion applied before invoking a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Coerce operands to integers. Operands that cannot be coerced are
    /// not an error: a monadic call yields `0`, and a dyadic call yields
    /// whichever operand did coerce (or `0` if neither did).
    Integer,
}

/// Definition of a leaf primitive
#[derive(Clone)]
pub struct Primitive {
    /// Source symbol resolved by the lexer
    pub symbol: String,
    /// Human-readable name used in diagnostics
    pub name: String,
    pub arity: Arity,
    pub depths: Depths,
    pub conversion: Option<Conversion>,
    func: Arc<OperationFn>,
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("symbol", &self.symbol)
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("depths", &self.depths)
            .field("conversion", &self.conversion)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && Arc::ptr_eq(&self.func, &other.func)
    }
}

impl Primitive {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        arity: Arity,
        func: Arc<OperationFn>,
    ) -> Self {
        Primitive {
            symbol: symbol.into(),
            name: name.into(),
            arity,
            depths: Depths::FLAT,
            conversion: None,
            func,
        }
    }

    pub fn with_depths(mut self, depths: Depths) -> Self {
        self.depths = depths;
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }

    /// Invoke on depth-matched operands, through the conversion adapter if
    /// one is declared.
    pub(crate) fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
        match self.conversion {
            None => (self.func)(args),
            Some(Conversion::Integer) => self.call_integer(args),
        }
    }

    fn call_integer(&self, args: Vec<Value>) -> Result<Value, Error> {
        let coerce = |v: &Value| v.to_integer().map(Value::int);
        match args.as_slice() {
            [x] => match coerce(x) {
                Some(x) => (self.func)(vec![x]),
                None => Ok(Value::int(0)),
            },
            [x, y] => match (coerce(x), coerce(y)) {
                (Some(x), Some(y)) => (self.func)(vec![x, y]),
                (Some(x), None) => Ok(x),
                (None, Some(y)) => Ok(y),
                (None, None) => Ok(Value::int(0)),
            },
            _ => (self.func)(args),
        }
    }
}

//
// Primitive Implementations
//

fn overflow(op: &str) -> Error {
    Error::EvalError(format!("Integer overflow in {op}"))
}

// Integers stay exact until they overflow; any float operand makes the
// result a float.
macro_rules! arithmetic {
    ($name:ident, $checked:ident, $op:tt, $op_str:expr) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Int(x), Number::Int(y)) => {
                    x.$checked(y).map(Number::Int).ok_or_else(|| overflow($op_str))
                }
                _ => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

arithmetic!(builtin_add, checked_add, +, "addition");
arithmetic!(builtin_sub, checked_sub, -, "subtraction");
arithmetic!(builtin_mul, checked_mul, *, "multiplication");

fn division_by_zero() -> Error {
    Error::EvalError("division by zero".into())
}

/// Exact integer quotient when it exists, otherwise a float
fn builtin_div(a: Number, b: Number) -> Result<Number, Error> {
    if b.is_zero() {
        return Err(division_by_zero());
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) if x.checked_rem(y).is_none_or(|r| r == 0) => {
            x.checked_div(y).map(Number::Int).ok_or_else(|| overflow("division"))
        }
        _ => Ok(Number::Float(a.as_f64() / b.as_f64())),
    }
}

/// Floored modulo: the result takes the sign of the divisor
fn builtin_mod(a: Number, b: Number) -> Result<Number, Error> {
    if b.is_zero() {
        return Err(division_by_zero());
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            // MIN % -1 overflows in checked_rem but is mathematically zero
            let r = x.checked_rem(y).unwrap_or(0);
            Ok(Number::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let r = x % y;
            Ok(Number::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }))
        }
    }
}

fn builtin_equal(a: Value, b: Value) -> bool {
    a == b
}

macro_rules! scalar_ordering {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(a: Value, b: Value) -> Result<bool, Error> {
            match (&a, &b) {
                (Value::Number(x), Value::Number(y)) => Ok(*x $op *y),
                (Value::Char(x), Value::Char(y)) => Ok(*x $op *y),
                _ => Err(Error::TypeError(format!(
                    "cannot compare {} {} {}",
                    a.type_name(),
                    $op_str,
                    b.type_name()
                ))),
            }
        }
    };
}

scalar_ordering!(builtin_lt, <, "<");
scalar_ordering!(builtin_gt, >, ">");

fn builtin_max(a: Number, b: Number) -> Number {
    if b > a { b } else { a }
}

fn builtin_min(a: Number, b: Number) -> Number {
    if b < a { b } else { a }
}

fn builtin_bit_and(a: IntType, b: IntType) -> IntType {
    a & b
}

fn builtin_bit_or(a: IntType, b: IntType) -> IntType {
    a | b
}

fn builtin_bit_xor(a: IntType, b: IntType) -> IntType {
    a ^ b
}

fn builtin_bit_not(a: IntType) -> IntType {
    !a
}

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

fn builtin_negate(n: Number) -> Result<Number, Error> {
    match n {
        Number::Int(x) => x.checked_neg().map(Number::Int).ok_or_else(|| overflow("negation")),
        Number::Float(x) => Ok(Number::Float(-x)),
    }
}

fn builtin_abs(n: Number) -> Result<Number, Error> {
    match n {
        Number::Int(x) => x.checked_abs().map(Number::Int).ok_or_else(|| overflow("absolute value")),
        Number::Float(x) => Ok(Number::Float(x.abs())),
    }
}

fn builtin_double(n: Number) -> Result<Number, Error> {
    builtin_mul(n, Number::Int(2))
}

fn builtin_halve(n: Number) -> Number {
    match n {
        Number::Int(x) if x % 2 == 0 => Number::Int(x / 2),
        _ => Number::Float(n.as_f64() / 2.0),
    }
}

fn builtin_increment(n: Number) -> Result<Number, Error> {
    builtin_add(n, Number::Int(1))
}

fn builtin_decrement(n: Number) -> Result<Number, Error> {
    builtin_sub(n, Number::Int(1))
}

fn builtin_identity(value: Value) -> Value {
    value
}

fn builtin_length(value: Value) -> IntType {
    match value {
        Value::List(items) => items.len() as IntType,
        _ => 1,
    }
}

fn builtin_range(n: Number) -> Result<Value, Error> {
    let end = n
        .to_integer()
        .ok_or_else(|| Error::TypeError(format!("range bound {n} is not an integer")))?;
    Ok(Value::list((1..=end).map(Value::int)))
}

fn builtin_reverse(items: ValueIter<'_>) -> Value {
    Value::list(items.rev().cloned())
}

fn builtin_sum(mut nums: NumIter<'_>) -> Result<Number, Error> {
    nums.try_fold(Number::Int(0), builtin_add)
}

fn builtin_wrap(value: Value) -> Value {
    Value::list([value])
}

fn builtin_flatten(value: Value) -> Value {
    fn collect(value: &Value, out: &mut Vec<Value>) {
        match value {
            Value::List(items) => items.iter().for_each(|item| collect(item, out)),
            scalar => out.push(scalar.clone()),
        }
    }
    let mut out = Vec::new();
    collect(&value, &mut out);
    Value::list(out)
}

fn builtin_unique(items: ValueIter<'_>) -> Value {
    let mut seen: Vec<Value> = Vec::new();
    for item in items {
        if !seen.contains(item) {
            seen.push(item.clone());
        }
    }
    Value::list(seen)
}

fn builtin_pair(a: Value, b: Value) -> Value {
    Value::list([a, b])
}

fn builtin_concat(a: Value, b: Value) -> Value {
    Value::list(a.items().iter().chain(b.items().iter()).cloned())
}

/// 1-based position of the right operand in the left, `0` when absent
fn builtin_index_of(haystack: Value, needle: Value) -> IntType {
    haystack
        .items()
        .iter()
        .position(|item| *item == needle)
        .map_or(0, |i| i as IntType + 1)
}

/// Global registry of the default primitives.
///
/// The registry is a single contiguous collection for ease of auditing;
/// every implementation is wired through the same typed adapter layer used
/// for runtime registration. This is done once at initialization time via a
/// `LazyLock`.
static BUILTIN_PRIMITIVES: LazyLock<Vec<Arc<Primitive>>> = LazyLock::new(|| {
    fn op<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn dyad(symbol: &str, name: &str, func: Arc<OperationFn>) -> Primitive {
        Primitive::new(symbol, name, Arity::Dyadic, func)
    }

    fn monad(symbol: &str, name: &str, func: Arc<OperationFn>) -> Primitive {
        Primitive::new(symbol, name, Arity::Monadic, func)
    }

    const SCALARS: Depths = Depths::dyadic(0, 0);
    const SCALAR: Depths = Depths::monadic(0);
    const VECTOR: Depths = Depths::monadic(1);

    vec![
        // Arithmetic
        dyad("+", "add", op::<(Number, Number), _>(builtin_add)).with_depths(SCALARS),
        dyad("-", "subtract", op::<(Number, Number), _>(builtin_sub)).with_depths(SCALARS),
        dyad("*", "multiply", op::<(Number, Number), _>(builtin_mul)).with_depths(SCALARS),
        dyad(":", "divide", op::<(Number, Number), _>(builtin_div)).with_depths(SCALARS),
        dyad("%", "modulo", op::<(Number, Number), _>(builtin_mod)).with_depths(SCALARS),
        // Comparison
        dyad("=", "equal", op::<(Value, Value), _>(builtin_equal)).with_depths(SCALARS),
        dyad("<", "less", op::<(Value, Value), _>(builtin_lt)).with_depths(SCALARS),
        dyad(">", "greater", op::<(Value, Value), _>(builtin_gt)).with_depths(SCALARS),
        dyad("X", "maximum", op::<(Number, Number), _>(builtin_max)).with_depths(SCALARS),
        dyad("Y", "minimum", op::<(Number, Number), _>(builtin_min)).with_depths(SCALARS),
        // Bitwise, through the integer conversion adapter
        dyad("&", "bit-and", op::<(IntType, IntType), _>(builtin_bit_and))
            .with_depths(SCALARS)
            .with_conversion(Conversion::Integer),
        dyad("|", "bit-or", op::<(IntType, IntType), _>(builtin_bit_or))
            .with_depths(SCALARS)
            .with_conversion(Conversion::Integer),
        dyad("^", "bit-xor", op::<(IntType, IntType), _>(builtin_bit_xor))
            .with_depths(SCALARS)
            .with_conversion(Conversion::Integer),
        monad("~", "bit-not", op::<(IntType,), _>(builtin_bit_not))
            .with_depths(SCALAR)
            .with_conversion(Conversion::Integer),
        // Logic
        monad("!", "not", op::<(Value,), _>(builtin_not)),
        // Unary arithmetic
        monad("N", "negate", op::<(Number,), _>(builtin_negate)).with_depths(SCALAR),
        monad("A", "absolute", op::<(Number,), _>(builtin_abs)).with_depths(SCALAR),
        monad("D", "double", op::<(Number,), _>(builtin_double)).with_depths(SCALAR),
        monad("H", "halve", op::<(Number,), _>(builtin_halve)).with_depths(SCALAR),
        monad("C", "increment", op::<(Number,), _>(builtin_increment)).with_depths(SCALAR),
        monad("K", "decrement", op::<(Number,), _>(builtin_decrement)).with_depths(SCALAR),
        // Structure
        monad("I", "identity", op::<(Value,), _>(builtin_identity)),
        monad("L", "length", op::<(Value,), _>(builtin_length)),
        monad("R", "range", op::<(Number,), _>(builtin_range)).with_depths(SCALAR),
        monad("U", "reverse", op::<(ValueIter<'static>,), _>(builtin_reverse))
            .with_depths(VECTOR),
        monad("S", "sum", op::<(NumIter<'static>,), _>(builtin_sum)).with_depths(VECTOR),
        monad("W", "wrap", op::<(Value,), _>(builtin_wrap)),
        monad("F", "flatten", op::<(Value,), _>(builtin_flatten)),
        monad("Q", "unique", op::<(ValueIter<'static>,), _>(builtin_unique))
            .with_depths(VECTOR),
        dyad(",", "pair", op::<(Value, Value), _>(builtin_pair)),
        dyad(";", "concatenate", op::<(Value, Value), _>(builtin_concat)),
        dyad("G", "index-of", op::<(Value, Value), _>(builtin_index_of)),
    ]
    .into_iter()
    .map(Arc::new)
    .collect()
});

/// Lazy static map from symbol to primitive (private - use find_primitive)
static BUILTIN_BY_SYMBOL: LazyLock<HashMap<&'static str, &'static Arc<Primitive>>> =
    LazyLock::new(|| {
        let prims: &'static [Arc<Primitive>] = BUILTIN_PRIMITIVES.as_slice();
        prims.iter().map(|p| (p.symbol.as_str(), p)).collect()
    });

/// Get all default primitives
pub fn builtin_primitives() -> &'static [Arc<Primitive>] {
    BUILTIN_PRIMITIVES.as_slice()
}

/// Find a default primitive by its symbol
pub fn find_primitive(symbol: &str) -> Option<Arc<Primitive>> {
    BUILTIN_BY_SYMBOL.get(symbol).copied().cloned()
}

/// Symbol table the lexer resolves primitive references against.
///
/// Starts from the default registry; entries can be added or replaced.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    primitives: HashMap<String, Arc<Primitive>>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary {
            primitives: builtin_primitives()
                .iter()
                .map(|p| (p.symbol.clone(), Arc::clone(p)))
                .collect(),
        }
    }
}

impl Vocabulary {
    /// A vocabulary without any primitives
    pub fn empty() -> Self {
        Vocabulary {
            primitives: HashMap::new(),
        }
    }

    /// Add a primitive, replacing any existing entry with the same symbol
    pub fn register(&mut self, primitive: Primitive) {
        self.primitives
            .insert(primitive.symbol.clone(), Arc::new(primitive));
    }

    /// Register a strongly-typed Rust function as a primitive using
    /// automatic argument extraction and result conversion.
    ///
    /// ```
    /// use tacit::builtinops::{Depths, Vocabulary};
    /// use tacit::link::Arity;
    ///
    /// fn triple(n: i64) -> i64 {
    ///     n * 3
    /// }
    ///
    /// let mut vocabulary = Vocabulary::default();
    /// vocabulary.register_operation::<_, (i64,)>("T", "triple", Arity::Monadic, Depths::monadic(0), triple);
    /// assert!(vocabulary.get("T").is_some());
    /// ```
    ///
    /// Supported parameter types: `i64`, `Number`, `Value`, `ValueIter<'_>`
    /// and `NumIter<'_>`. Supported return types: anything convertible into
    /// `Value`, or a `Result` of one. Conversion failures yield `TypeError`.
    pub fn register_operation<F, Args>(
        &mut self,
        symbol: &str,
        name: &str,
        arity: Arity,
        depths: Depths,
        func: F,
    ) where
        F: IntoOperation<Args>,
    {
        let primitive = Primitive::new(symbol, name, arity, func.into_operation()).with_depths(depths);
        self.register(primitive);
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<Primitive>> {
        self.primitives.get(symbol).cloned()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.primitives.keys().map(String::as_str)
    }
}

//! Semantics of the higher-order links built by the program assembler.
//!
//! Every combinator receives the arguments its link was called with, either
//! of which may be absent. Inner links are invoked with whatever arguments
//! are present unless the combinator fixes their arity.

use tracing::trace;

use crate::Error;
use crate::ast::{IntType, Number, Value};
use crate::link::{Arity, Combinator, Link, LoopResult};

use super::Evaluator;

/// The left argument, which this combinator cannot do without
fn required(combinator: &Combinator, x: Option<Value>) -> Result<Value, Error> {
    x.ok_or_else(|| Error::arity_error_with_expr(1, 0, combinator.name().to_owned()))
}

/// Both arguments; a missing right argument repeats the left one
fn operands(
    combinator: &Combinator,
    x: Option<Value>,
    y: Option<Value>,
) -> Result<(Value, Value), Error> {
    let x = x.ok_or_else(|| Error::arity_error_with_expr(2, 0, combinator.name().to_owned()))?;
    let y = y.unwrap_or_else(|| x.clone());
    Ok((x, y))
}

fn integer(value: &Value, what: &str) -> Result<IntType, Error> {
    value.to_integer().ok_or_else(|| {
        Error::TypeError(format!("{what} must be an integer, got {}", value.type_name()))
    })
}

/// A match count; fractional counts round up
fn match_count(value: &Value) -> Result<usize, Error> {
    let wanted = match value {
        Value::Number(Number::Float(f)) if f.is_finite() => f.ceil() as IntType,
        other => integer(other, "match count")?,
    };
    Ok(usize::try_from(wanted).unwrap_or(0))
}

fn successor(n: Number) -> Result<Number, Error> {
    match n {
        Number::Int(i) => i
            .checked_add(1)
            .map(Number::Int)
            .ok_or_else(|| Error::EvalError("Integer overflow in search counter".into())),
        Number::Float(f) => Ok(Number::Float(f + 1.0)),
    }
}

/// The final value, or every intermediate value followed by it
fn with_history(cumulative: bool, mut history: Vec<Value>, last: Value) -> Value {
    if cumulative {
        history.push(last);
        Value::list(history)
    } else {
        last
    }
}

impl Evaluator<'_> {
    pub(super) fn call_combinator(
        &mut self,
        combinator: &Combinator,
        x: Option<Value>,
        y: Option<Value>,
    ) -> Result<Value, Error> {
        trace!(combinator = combinator.name(), "combinator call");
        match combinator {
            Combinator::Flat(link) => self.variadic_link(link, x, y, true),
            Combinator::Swap(link) => {
                let (x, y) = operands(combinator, x, y)?;
                self.dyadic_link(link, y, x)
            }
            Combinator::Reduce(link) => {
                let items = required(combinator, x)?.items();
                let mut items = items.iter().cloned();
                match items.next() {
                    Some(first) => items.try_fold(first, |acc, item| self.dyadic_link(link, acc, item)),
                    None => Ok(Value::int(0)),
                }
            }
            Combinator::Scan(link) => {
                let items = required(combinator, x)?.items();
                let mut partials: Vec<Value> = Vec::with_capacity(items.len());
                for item in items.iter() {
                    let next = match partials.last() {
                        Some(acc) => self.dyadic_link(link, acc.clone(), item.clone())?,
                        None => item.clone(),
                    };
                    partials.push(next);
                }
                Ok(Value::list(partials))
            }
            Combinator::FixLeft(link) => {
                let (x, _) = operands(combinator, x, y)?;
                self.monadic_link(link, x)
            }
            Combinator::FixRight(link) => {
                let (_, y) = operands(combinator, x, y)?;
                self.monadic_link(link, y)
            }
            Combinator::Each(link) => {
                let items = required(combinator, x)?.items();
                let mapped = items
                    .iter()
                    .map(|item| self.variadic_link(link, Some(item.clone()), y.clone(), false))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(mapped))
            }
            Combinator::ZipWith(link) => {
                let (x, y) = operands(combinator, x, y)?;
                let (xs, ys) = (x.items(), y.items());
                let mut zipped = xs
                    .iter()
                    .zip(ys.iter())
                    .map(|(a, b)| self.variadic_link(link, Some(a.clone()), Some(b.clone()), false))
                    .collect::<Result<Vec<_>, _>>()?;
                let shorter = xs.len().min(ys.len());
                zipped.extend(xs.iter().skip(shorter).cloned());
                zipped.extend(ys.iter().skip(shorter).cloned());
                Ok(Value::list(zipped))
            }
            Combinator::SelfReference => {
                let entry = self.chain(self.program.entry_index())?;
                self.nested(|ev| ev.variadic_chain(entry, x, y))
            }
            Combinator::Relative {
                origin,
                offset,
                arity,
            } => {
                let count = self.program.chains().len() as isize;
                let target = (*origin as isize + offset).rem_euclid(count) as usize;
                self.chain_with_arity(combinator, target, *arity, x, y)
            }
            Combinator::Indexed { index, arity } => {
                let count = self.program.chains().len();
                if count < 2 {
                    return Err(Error::EvalError(
                        "Indexed chain call needs a chain besides the entry chain".into(),
                    ));
                }
                let selector = match index {
                    Some(link) => self.variadic_link(link, x.clone(), y.clone(), false)?,
                    None => required(combinator, x.clone())?,
                };
                let modulus = (count - 1) as IntType;
                let index = integer(&selector, "chain index")?.rem_euclid(modulus);
                let target = (index - 1).rem_euclid(modulus) as usize;
                self.chain_with_arity(combinator, target, *arity, x, y)
            }
            Combinator::Sparse { link, indices } => self.sparse(combinator, link, indices, x, y),
            Combinator::Repeat {
                body,
                count,
                cumulative,
            } => {
                let repetitions = match count {
                    Some(link) => self.variadic_link(link, x.clone(), y.clone(), false)?,
                    None => self.host.last_input()?,
                };
                let repetitions = usize::try_from(integer(&repetitions, "repetition count")?)
                    .unwrap_or(0);

                let mut ret = x.unwrap_or_else(|| Value::int(0));
                let mut rarg = y;
                let mut history = Vec::new();
                for step in 1..=repetitions {
                    self.tick(step)?;
                    if *cumulative {
                        history.push(ret.clone());
                    }
                    let larg = ret;
                    ret = self.variadic_link(body, Some(larg.clone()), rarg, false)?;
                    rarg = Some(larg);
                }
                Ok(with_history(*cumulative, history, ret))
            }
            Combinator::While {
                body,
                condition,
                cumulative,
            } => {
                let mut ret = x.unwrap_or_else(|| Value::int(0));
                let mut rarg = y;
                let mut history = Vec::new();
                let mut step = 0;
                while self
                    .variadic_link(condition, Some(ret.clone()), rarg.clone(), false)?
                    .is_truthy()
                {
                    step += 1;
                    self.tick(step)?;
                    if *cumulative {
                        history.push(ret.clone());
                    }
                    let larg = ret;
                    ret = self.variadic_link(body, Some(larg.clone()), rarg, false)?;
                    rarg = Some(larg);
                }
                Ok(with_history(*cumulative, history, ret))
            }
            Combinator::Loop { body, result } => {
                let mut ret = x.unwrap_or_else(|| Value::int(0));
                let mut rarg = y;
                let mut history: Vec<Value> = Vec::new();
                let mut step = 0;
                loop {
                    step += 1;
                    self.tick(step)?;
                    history.push(ret.clone());
                    let larg = ret;
                    ret = self.variadic_link(body, Some(larg.clone()), rarg, false)?;
                    if let Some(first) = history.iter().position(|seen| *seen == ret) {
                        return Ok(match result {
                            LoopResult::Last => larg,
                            LoopResult::All => Value::list(history),
                            LoopResult::Cycle => Value::list(history.drain(first..)),
                        });
                    }
                    rarg = Some(larg);
                }
            }
            Combinator::Conditional {
                then,
                otherwise,
                condition,
            } => {
                let chosen = if self
                    .variadic_link(condition, x.clone(), y.clone(), false)?
                    .is_truthy()
                {
                    then
                } else {
                    otherwise
                };
                self.variadic_link(chosen, x, y, false)
            }
            Combinator::Search { predicate, count } => {
                let wanted = match count {
                    Some(link) => self.variadic_link(link, x.clone(), y.clone(), false)?,
                    None => self.host.last_input()?,
                };
                let wanted = match_count(&wanted)?;
                let mut counter = match &x {
                    Some(start) => start.as_number().ok_or_else(|| {
                        Error::TypeError(format!(
                            "search start must be a number, got {}",
                            start.type_name()
                        ))
                    })?,
                    None => Number::Int(0),
                };

                let mut found = Vec::new();
                let mut step = 0;
                while found.len() < wanted {
                    step += 1;
                    self.tick(step)?;
                    let candidate = Value::Number(counter);
                    if self
                        .variadic_link(predicate, Some(candidate.clone()), y.clone(), false)?
                        .is_truthy()
                    {
                        found.push(candidate);
                    }
                    counter = successor(counter)?;
                }
                Ok(Value::list(found))
            }
            Combinator::Filter { predicate, keep } => {
                let items = required(combinator, x)?.items();
                let mut kept = Vec::new();
                for item in items.iter() {
                    let verdict = self
                        .variadic_link(predicate, Some(item.clone()), y.clone(), false)?
                        .is_truthy();
                    if verdict == *keep {
                        kept.push(item.clone());
                    }
                }
                Ok(Value::list(kept))
            }
            Combinator::Store(link) => {
                let value = self.variadic_link(link, x, y, false)?;
                self.program.store(value.clone());
                Ok(value)
            }
        }
    }

    fn chain_with_arity(
        &mut self,
        combinator: &Combinator,
        index: usize,
        arity: Arity,
        x: Option<Value>,
        y: Option<Value>,
    ) -> Result<Value, Error> {
        let chain = self.chain(index)?;
        self.nested(|ev| match arity {
            Arity::Niladic => ev.niladic_chain(chain.links()),
            Arity::Monadic => ev.monadic_chain(chain.links(), required(combinator, x)?),
            Arity::Dyadic => {
                let (x, y) = operands(combinator, x, y)?;
                ev.dyadic_chain(chain.links(), x, y)
            }
        })
    }

    /// Replace selected positions of the left argument with the matching
    /// elements of `link`'s result. Indices are 1-based; 0 and negative
    /// indices count from the end.
    fn sparse(
        &mut self,
        combinator: &Combinator,
        link: &Link,
        indices: &Link,
        x: Option<Value>,
        y: Option<Value>,
    ) -> Result<Value, Error> {
        let left = required(combinator, x.clone())?;
        let items = left.items();
        let len = items.len() as IntType;
        let selected: Vec<IntType> = self
            .variadic_link(indices, x.clone(), y.clone(), false)?
            .items()
            .iter()
            .filter_map(|index| match index {
                Value::Number(Number::Float(f)) if f.fract() != 0.0 => None,
                other => other.to_integer(),
            })
            .map(|i| if i > 0 { i - 1 } else { i.saturating_sub(1).saturating_add(len) })
            .collect();
        let replacement = self.variadic_link(link, x, y, false)?.items();
        if replacement.is_empty() {
            return Ok(left);
        }
        let result = items.iter().enumerate().map(|(position, item)| {
            if selected.contains(&(position as IntType)) {
                replacement[position % replacement.len()].clone()
            } else {
                item.clone()
            }
        });
        Ok(Value::list(result))
    }
}

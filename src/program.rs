//! Program assembly: token stream to chains.
//!
//! A program is one chain per source line; the last line is the entry point.
//! Within a line, chain separators split the links into sub-chains. Each
//! sub-chain becomes a group link whose arity is given by the separator that
//! opened it (the first sub-chain of a line is left unresolved), and the group
//! links of a line form that line's chain.
//!
//! Combinator references build new links from the links immediately before
//! them. Their operands are popped from the sub-chain being built or, once it
//! is empty, from the completed sub-chains of the same line, so a combinator
//! can take a whole preceding sub-chain as one operand:
//!
//! ```text
//! +2%5µ`A     the loop takes the group "+2%5" as its body
//! D3n         repeat D three times; the count link comes second
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::ast::Value;
use crate::builtinops::{Primitive, Vocabulary};
use crate::evaluator::{EvalConfig, Evaluator};
use crate::host::Host;
use crate::lexer::tokenize;
use crate::link::{
    Arity, Chain, Combinator, Link, LinkKind, LoopResult, leading_constant, max_arity,
    max_resolved_arity,
};
use crate::{Error, ParseError, ParseErrorKind};

/// Combinator references, named by what they build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quick {
    Flat,
    Swap,
    Reduce,
    Scan,
    FixLeft,
    FixRight,
    Each,
    ZipWith,
    SelfReference,
    Previous(Arity),
    Next(Arity),
    Indexed(Arity),
    Sparse,
    Repeat,
    CumulativeRepeat,
    While,
    CumulativeWhile,
    Loop(LoopResult),
    Conditional,
    Search,
    Filter,
    FilterFalse,
    Store,
    NiladGroup,
    MonadGroup,
    DyadGroup,
}

impl Quick {
    pub fn name(self) -> &'static str {
        match self {
            Quick::Flat => "flat",
            Quick::Swap => "swap",
            Quick::Reduce => "reduce",
            Quick::Scan => "scan",
            Quick::FixLeft => "fix-left",
            Quick::FixRight => "fix-right",
            Quick::Each => "each",
            Quick::ZipWith => "zip-with",
            Quick::SelfReference => "self",
            Quick::Previous(_) => "previous-chain",
            Quick::Next(_) => "next-chain",
            Quick::Indexed(_) => "indexed-chain",
            Quick::Sparse => "sparse",
            Quick::Repeat => "repeat",
            Quick::CumulativeRepeat => "cumulative-repeat",
            Quick::While => "while",
            Quick::CumulativeWhile => "cumulative-while",
            Quick::Loop(_) => "loop",
            Quick::Conditional => "conditional",
            Quick::Search => "search",
            Quick::Filter => "filter",
            Quick::FilterFalse => "filter-false",
            Quick::Store => "store",
            Quick::NiladGroup => "nilad-group",
            Quick::MonadGroup => "monad-group",
            Quick::DyadGroup => "dyad-group",
        }
    }
}

/// One element of the token stream
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Primitive(Arc<Primitive>),
    /// Niladic read of the program register
    Register,
    Literal(Value),
    Quick(Quick),
    /// Starts a sub-chain of the given arity
    Separator(Arity),
    LineBreak,
}

/// A compiled program: an arena of chains plus the mutable register.
///
/// Cross-chain references are indices into the arena, resolved at call time.
/// The register and the arity bindings of unresolved links are the only
/// mutable state; both live here, so rebuilding the program resets them.
#[derive(Debug)]
pub struct Program {
    chains: Vec<Chain>,
    register: RefCell<Value>,
}

impl Program {
    /// Assemble a program from a token stream
    pub fn from_tokens<I>(tokens: I) -> Result<Program, Error>
    where
        I: IntoIterator<Item = Token>,
    {
        let mut assembler = Assembler::default();
        for token in tokens {
            assembler.push(token)?;
        }
        let program = assembler.finish();
        debug!(chains = program.chains.len(), "program assembled");
        Ok(program)
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self, index: usize) -> Option<&Chain> {
        self.chains.get(index)
    }

    /// Index of the entry chain (the last line)
    pub fn entry_index(&self) -> usize {
        self.chains.len().saturating_sub(1)
    }

    /// Current register value, `0` until something is stored
    pub fn register(&self) -> Value {
        self.register.borrow().clone()
    }

    pub fn store(&self, value: Value) {
        debug!(%value, "register store");
        *self.register.borrow_mut() = value;
    }

    /// Evaluate the entry chain with zero, one or two arguments
    pub fn run(&self, host: &mut dyn Host, args: &[Value]) -> Result<Value, Error> {
        self.run_with_config(host, args, EvalConfig::default())
    }

    pub fn run_with_config(
        &self,
        host: &mut dyn Host,
        args: &[Value],
        config: EvalConfig,
    ) -> Result<Value, Error> {
        Evaluator::with_config(self, host, config).run(args)
    }
}

/// Parse source text with the default vocabulary
pub fn parse_program(source: &str) -> Result<Program, Error> {
    parse_program_with(source, &Vocabulary::default())
}

/// Parse source text, resolving primitive symbols against `vocabulary`
pub fn parse_program_with(source: &str, vocabulary: &Vocabulary) -> Result<Program, Error> {
    let tokens = tokenize(source, vocabulary)?;
    Program::from_tokens(tokens)
}

fn missing_operand(quick: Quick, expected: &str, found: usize) -> Error {
    Error::ParseError(ParseError::from_message(
        ParseErrorKind::MissingOperand,
        format!(
            "'{}' needs {expected} link(s) before it, found {found}",
            quick.name()
        ),
    ))
}

fn combinator(kind: Combinator, arity: Option<Arity>) -> Link {
    Link::with_arity(LinkKind::Combinator(kind), arity)
}

/// Builds chains from tokens, one line at a time
#[derive(Default)]
struct Assembler {
    lines: Vec<Chain>,
    /// Completed sub-chains of the current line, as group links
    groups: Vec<Rc<Link>>,
    /// Sub-chain in progress
    current: Vec<Rc<Link>>,
    /// Declared arity of the sub-chain in progress
    arity: Option<Arity>,
    /// Whether anything was seen since the last line break
    pending: bool,
}

impl Assembler {
    fn push(&mut self, token: Token) -> Result<(), Error> {
        if token != Token::LineBreak {
            self.pending = true;
        }
        match token {
            Token::Primitive(primitive) => self.current.push(Rc::new(Link::primitive(primitive))),
            Token::Register => self.current.push(Rc::new(Link::register())),
            Token::Literal(value) => self.current.push(Rc::new(Link::literal(value))),
            Token::Quick(quick) => {
                let link = self.build(quick)?;
                self.current.push(Rc::new(link));
            }
            Token::Separator(arity) => {
                self.close_sub_chain();
                self.arity = Some(arity);
            }
            Token::LineBreak => self.close_line(),
        }
        Ok(())
    }

    fn finish(mut self) -> Program {
        if self.pending || self.lines.is_empty() {
            self.close_line();
        }
        Program {
            chains: self.lines,
            register: RefCell::new(Value::int(0)),
        }
    }

    fn close_sub_chain(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let links = std::mem::take(&mut self.current);
        self.groups.push(Rc::new(Link::group(Chain::new(links, self.arity))));
    }

    fn close_line(&mut self) {
        self.close_sub_chain();
        self.lines.push(Chain::new(std::mem::take(&mut self.groups), None));
        self.arity = None;
        self.pending = false;
    }

    fn pop_link(&mut self) -> Option<Rc<Link>> {
        self.current.pop().or_else(|| self.groups.pop())
    }

    /// Pop links, prepending each, until `satisfied` holds or nothing is left
    fn pop_window(&mut self, satisfied: impl Fn(&[Rc<Link>]) -> bool) -> Vec<Rc<Link>> {
        let mut window = Vec::new();
        while !satisfied(&window) {
            match self.pop_link() {
                Some(link) => window.insert(0, link),
                None => break,
            }
        }
        window
    }

    fn pop_one(&mut self, quick: Quick) -> Result<Rc<Link>, Error> {
        self.pop_link().ok_or_else(|| missing_operand(quick, "1", 0))
    }

    fn pop_exact<const N: usize>(&mut self, quick: Quick) -> Result<[Rc<Link>; N], Error> {
        let window = self.pop_window(|w| w.len() == N);
        <[Rc<Link>; N]>::try_from(window)
            .map_err(|w| missing_operand(quick, &N.to_string(), w.len()))
    }

    /// Window of a body link and an optional count link. When two links are
    /// found and the first is niladic, it goes back into the chain and the
    /// count comes from the host instead.
    fn pop_counted(&mut self, quick: Quick) -> Result<Vec<Rc<Link>>, Error> {
        let mut window = self.pop_window(|w| w.len() == 2);
        if window.len() == 2 && window[0].arity() == Some(Arity::Niladic) {
            let seed = window.remove(0);
            self.current.push(seed);
        }
        if window.is_empty() {
            return Err(missing_operand(quick, "1 or 2", 0));
        }
        Ok(window)
    }

    fn pop_group(&mut self, quick: Quick, niladic: bool) -> Result<Vec<Rc<Link>>, Error> {
        let satisfied = |w: &[Rc<Link>]| {
            w.len() > 1
                && if niladic {
                    w[0].arity() == Some(Arity::Niladic)
                } else {
                    !leading_constant(w)
                }
        };
        let window = self.pop_window(satisfied);
        if satisfied(&window) {
            Ok(window)
        } else {
            Err(missing_operand(quick, "2 or more", window.len()))
        }
    }

    fn build(&mut self, quick: Quick) -> Result<Link, Error> {
        let line = self.lines.len();
        let link = match quick {
            Quick::Flat => {
                let inner = self.pop_one(quick)?;
                let arity = inner.arity();
                combinator(Combinator::Flat(inner), arity)
            }
            Quick::Swap => combinator(Combinator::Swap(self.pop_one(quick)?), Some(Arity::Dyadic)),
            Quick::Reduce => {
                combinator(Combinator::Reduce(self.pop_one(quick)?), Some(Arity::Monadic))
            }
            Quick::Scan => combinator(Combinator::Scan(self.pop_one(quick)?), Some(Arity::Monadic)),
            Quick::FixLeft => {
                combinator(Combinator::FixLeft(self.pop_one(quick)?), Some(Arity::Dyadic))
            }
            Quick::FixRight => {
                combinator(Combinator::FixRight(self.pop_one(quick)?), Some(Arity::Dyadic))
            }
            Quick::Each => {
                let inner = self.pop_one(quick)?;
                let arity = inner.arity();
                combinator(Combinator::Each(inner), arity)
            }
            Quick::ZipWith => {
                combinator(Combinator::ZipWith(self.pop_one(quick)?), Some(Arity::Dyadic))
            }
            Quick::SelfReference => combinator(Combinator::SelfReference, None),
            Quick::Previous(arity) => combinator(
                Combinator::Relative {
                    origin: line,
                    offset: -1,
                    arity,
                },
                Some(arity),
            ),
            Quick::Next(arity) => combinator(
                Combinator::Relative {
                    origin: line,
                    offset: 1,
                    arity,
                },
                Some(arity),
            ),
            Quick::Indexed(arity) => {
                let index = self.pop_link();
                let link_arity = match (arity, &index) {
                    (Arity::Niladic, Some(index)) => index.arity(),
                    (Arity::Niladic, None) | (Arity::Monadic, _) => Some(Arity::Monadic),
                    (Arity::Dyadic, _) => Some(Arity::Dyadic),
                };
                combinator(Combinator::Indexed { index, arity }, link_arity)
            }
            Quick::Sparse => {
                let [link, indices] = self.pop_exact::<2>(quick)?;
                let window = [Rc::clone(&link), Rc::clone(&indices)];
                let arity = max_arity(&window).map(|a| a.max(Arity::Monadic));
                combinator(Combinator::Sparse { link, indices }, arity)
            }
            Quick::Repeat | Quick::CumulativeRepeat | Quick::Search => {
                let window = self.pop_counted(quick)?;
                let arity = if quick == Quick::CumulativeRepeat {
                    max_resolved_arity(&window)
                } else {
                    max_arity(&window)
                };
                let mut window = window.into_iter();
                let (Some(body), count) = (window.next(), window.next()) else {
                    return Err(missing_operand(quick, "1 or 2", 0));
                };
                let kind = match quick {
                    Quick::Search => Combinator::Search {
                        predicate: body,
                        count,
                    },
                    _ => Combinator::Repeat {
                        body,
                        count,
                        cumulative: quick == Quick::CumulativeRepeat,
                    },
                };
                combinator(kind, arity)
            }
            Quick::While | Quick::CumulativeWhile => {
                let window = self.pop_exact::<2>(quick)?;
                let arity = max_resolved_arity(&window);
                let [body, condition] = window;
                combinator(
                    Combinator::While {
                        body,
                        condition,
                        cumulative: quick == Quick::CumulativeWhile,
                    },
                    arity,
                )
            }
            Quick::Loop(result) => {
                let body = self.pop_one(quick)?;
                let arity = body.arity();
                combinator(Combinator::Loop { body, result }, arity)
            }
            Quick::Conditional => {
                let window = self.pop_exact::<3>(quick)?;
                let arity = max_resolved_arity(&window);
                let [then, otherwise, condition] = window;
                combinator(
                    Combinator::Conditional {
                        then,
                        otherwise,
                        condition,
                    },
                    arity,
                )
            }
            Quick::Filter | Quick::FilterFalse => {
                let predicate = self.pop_one(quick)?;
                let arity = predicate.arity();
                combinator(
                    Combinator::Filter {
                        predicate,
                        keep: quick == Quick::Filter,
                    },
                    arity,
                )
            }
            Quick::Store => {
                let inner = self.pop_one(quick)?;
                let arity = inner.arity();
                combinator(Combinator::Store(inner), arity)
            }
            Quick::NiladGroup => {
                Link::group(Chain::new(self.pop_group(quick, true)?, Some(Arity::Niladic)))
            }
            Quick::MonadGroup => {
                Link::group(Chain::new(self.pop_group(quick, false)?, Some(Arity::Monadic)))
            }
            Quick::DyadGroup => {
                Link::group(Chain::new(self.pop_group(quick, false)?, Some(Arity::Dyadic)))
            }
        };
        Ok(link)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::builtinops::find_primitive;
    use crate::host::RecordingHost;

    fn prim(symbol: &str) -> Token {
        Token::Primitive(find_primitive(symbol).unwrap())
    }

    fn lit<T: Into<Value>>(value: T) -> Token {
        Token::Literal(val(value))
    }

    /// Kinds of the links of a chain, for structural assertions
    fn shape(chain: &Chain) -> Vec<String> {
        chain.links().iter().map(|link| link.describe()).collect()
    }

    fn group_links(link: &Link) -> &[Rc<Link>] {
        match link.kind() {
            LinkKind::Group(chain) => chain.links(),
            _ => panic!("expected group, got {}", link.describe()),
        }
    }

    #[test]
    fn test_lines_and_sub_chains() {
        let program = Program::from_tokens(vec![
            prim("D"),
            Token::LineBreak,
            prim("+"),
            lit(1),
            Token::Separator(Arity::Monadic),
            prim("H"),
            Token::Separator(Arity::Dyadic),
            Token::Separator(Arity::Niladic),
        ])
        .unwrap();

        assert_eq!(program.chains().len(), 2);
        assert_eq!(program.entry_index(), 1);

        let entry = program.chain(1).unwrap();
        assert_eq!(entry.declared_arity(), None);
        // Empty sub-chains are skipped
        assert_eq!(entry.len(), 2);
        assert_eq!(entry.links()[0].arity(), None);
        assert_eq!(entry.links()[1].arity(), Some(Arity::Monadic));
        assert_eq!(group_links(&entry.links()[0]).len(), 2);
    }

    #[test]
    fn test_empty_programs_and_lines() {
        let empty = Program::from_tokens(vec![]).unwrap();
        assert_eq!(empty.chains().len(), 1);
        assert!(empty.chain(0).unwrap().is_empty());

        let trailing = Program::from_tokens(vec![prim("D"), Token::LineBreak]).unwrap();
        assert_eq!(trailing.chains().len(), 1);

        let blank_middle = Program::from_tokens(vec![
            prim("D"),
            Token::LineBreak,
            Token::LineBreak,
            prim("H"),
        ])
        .unwrap();
        assert_eq!(blank_middle.chains().len(), 3);
        assert!(blank_middle.chain(1).unwrap().is_empty());
    }

    #[test]
    fn test_combinator_windows() {
        // (tokens, expected link descriptions of the single sub-chain)
        let test_cases: Vec<(Vec<Token>, Vec<&str>)> = vec![
            (vec![prim("+"), Token::Quick(Quick::Reduce)], vec!["reduce"]),
            (
                vec![prim("D"), prim("+"), Token::Quick(Quick::Swap)],
                vec!["double", "swap"],
            ),
            (
                vec![prim("D"), lit(3), Token::Quick(Quick::Repeat)],
                vec!["repeat"],
            ),
            // A niladic first operand goes back into the chain
            (
                vec![lit(3), prim("D"), Token::Quick(Quick::Repeat)],
                vec!["literal 3", "repeat"],
            ),
            (
                vec![lit(1), prim("+"), prim("D"), Token::Quick(Quick::MonadGroup)],
                vec!["literal 1", "group of 2"],
            ),
            (
                vec![lit(1), prim("+"), lit(2), Token::Quick(Quick::NiladGroup)],
                vec!["group of 3"],
            ),
            (
                vec![prim("D"), prim("H"), prim("!"), Token::Quick(Quick::Conditional)],
                vec!["conditional"],
            ),
            (vec![Token::Quick(Quick::SelfReference)], vec!["self"]),
            (vec![Token::Quick(Quick::Indexed(Arity::Monadic))], vec!["indexed-chain"]),
        ];

        for (i, (tokens, expected)) in test_cases.into_iter().enumerate() {
            let program = Program::from_tokens(tokens).unwrap();
            let entry = program.chain(0).unwrap();
            assert_eq!(entry.len(), 1, "Test case {}: one sub-chain", i + 1);
            let links = group_links(&entry.links()[0]);
            let described: Vec<String> = links.iter().map(|l| l.describe()).collect();
            assert_eq!(described, expected, "Test case {}", i + 1);
        }
    }

    #[test]
    fn test_combinator_arities() {
        use Arity::*;
        // (tokens, arity of the last link built)
        let test_cases: Vec<(Vec<Token>, Option<Arity>)> = vec![
            (vec![prim("+"), Token::Quick(Quick::Reduce)], Some(Monadic)),
            (vec![prim("D"), Token::Quick(Quick::Swap)], Some(Dyadic)),
            (vec![prim("D"), Token::Quick(Quick::Flat)], Some(Monadic)),
            (vec![prim("+"), Token::Quick(Quick::Each)], Some(Dyadic)),
            (vec![Token::Quick(Quick::SelfReference)], None),
            (vec![Token::Quick(Quick::Previous(Niladic))], Some(Niladic)),
            (vec![Token::Quick(Quick::Next(Dyadic))], Some(Dyadic)),
            (vec![lit(2), Token::Quick(Quick::Indexed(Niladic))], Some(Niladic)),
            (vec![Token::Quick(Quick::Indexed(Niladic))], Some(Monadic)),
            (vec![prim("+"), Token::Quick(Quick::Indexed(Monadic))], Some(Monadic)),
            (vec![lit(2), Token::Quick(Quick::Indexed(Dyadic))], Some(Dyadic)),
            (vec![lit(0), lit(1), Token::Quick(Quick::Sparse)], Some(Monadic)),
            (vec![prim("+"), lit(1), Token::Quick(Quick::Sparse)], Some(Dyadic)),
            (vec![prim("D"), lit(3), Token::Quick(Quick::Repeat)], Some(Monadic)),
            (vec![prim("+"), Token::Quick(Quick::Repeat)], Some(Dyadic)),
            (vec![prim("C"), prim("<"), Token::Quick(Quick::While)], Some(Dyadic)),
            (vec![prim("D"), Token::Quick(Quick::Loop(LoopResult::All))], Some(Monadic)),
            (vec![prim("+"), Token::Quick(Quick::Store)], Some(Dyadic)),
            (vec![prim("!"), Token::Quick(Quick::Filter)], Some(Monadic)),
            (
                vec![prim("D"), prim("H"), prim("!"), Token::Quick(Quick::Conditional)],
                Some(Monadic),
            ),
            (
                vec![prim("+"), prim("D"), Token::Quick(Quick::DyadGroup)],
                Some(Dyadic),
            ),
        ];

        for (i, (tokens, expected)) in test_cases.into_iter().enumerate() {
            let program = Program::from_tokens(tokens).unwrap();
            let entry = program.chain(0).unwrap();
            let links = group_links(&entry.links()[0]);
            let last = links.last().unwrap();
            assert_eq!(last.arity(), expected, "Test case {}: {last:?}", i + 1);
        }
    }

    #[test]
    fn test_unresolved_operands_propagate() {
        // The group "+1" is unresolved, so the loop built from it is too
        let program = Program::from_tokens(vec![
            prim("+"),
            lit(1),
            Token::Separator(Arity::Monadic),
            Token::Quick(Quick::Loop(LoopResult::Last)),
        ])
        .unwrap();
        let entry = program.chain(0).unwrap();
        assert_eq!(entry.len(), 1);
        let links = group_links(&entry.links()[0]);
        assert_eq!(shape(entry), vec!["group of 1"]);
        assert_eq!(links[0].arity(), None);

        // Plain maximum ignores the unresolved operand
        let program = Program::from_tokens(vec![
            Token::Quick(Quick::SelfReference),
            prim("D"),
            Token::Quick(Quick::While),
        ])
        .unwrap();
        let links = group_links(&program.chain(0).unwrap().links()[0]);
        assert_eq!(links[0].arity(), Some(Arity::Monadic));
    }

    #[test]
    fn test_missing_operands() {
        let test_cases: Vec<Vec<Token>> = vec![
            vec![Token::Quick(Quick::Reduce)],
            vec![prim("D"), Token::Quick(Quick::Sparse)],
            vec![prim("D"), Token::Quick(Quick::While)],
            vec![prim("D"), prim("H"), Token::Quick(Quick::Conditional)],
            vec![Token::Quick(Quick::Repeat)],
            vec![prim("D"), Token::Quick(Quick::MonadGroup)],
            vec![prim("D"), prim("H"), Token::Quick(Quick::NiladGroup)],
            // Operands never cross a line break
            vec![prim("+"), Token::LineBreak, Token::Quick(Quick::Each)],
        ];

        for (i, tokens) in test_cases.into_iter().enumerate() {
            match Program::from_tokens(tokens) {
                Err(Error::ParseError(e)) => {
                    assert_eq!(e.kind, ParseErrorKind::MissingOperand, "Test case {}", i + 1);
                }
                other => panic!("Test case {}: expected MissingOperand, got {other:?}", i + 1),
            }
        }
    }

    #[test]
    fn test_register_lifecycle() {
        let program = Program::from_tokens(vec![Token::Register]).unwrap();
        assert_eq!(program.register(), val(0));
        program.store(val([1, 2]));
        assert_eq!(program.register(), val([1, 2]));

        let mut host = RecordingHost::default();
        assert_eq!(program.run(&mut host, &[]).unwrap(), val([1, 2]));

        // Rebuilding resets the register
        let rebuilt = Program::from_tokens(vec![Token::Register]).unwrap();
        assert_eq!(rebuilt.register(), val(0));
    }

    #[test]
    fn test_parse_program_from_source() {
        let program = parse_program("D C").unwrap();
        let mut host = RecordingHost::default();
        assert_eq!(program.run(&mut host, &[val(5)]).unwrap(), val(11));

        let err = parse_program("/").unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError {
                kind: ParseErrorKind::MissingOperand,
                ..
            })
        ));
    }
}

//! Links and chains: the executable units a program is compiled into.
//!
//! A [`Link`] has an arity that is either fixed when the link is built or left
//! unresolved. Unresolved arities are bound exactly once, the first time the
//! link is evaluated, to the arity of the context that evaluates it; that
//! binding then sticks for the lifetime of the program, even if the same link
//! is later reached from a context of different arity.
//!
//! The operation behind a link is a closed set of kinds ([`LinkKind`]); the
//! higher-order kinds built by the combinator layer are spelled out in
//! [`Combinator`]. Links are shared through `Rc` because combinators capture
//! the links they were built from.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::Value;
use crate::builtinops::{Depths, Primitive};

/// Number of values a link consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arity {
    Niladic = 0,
    Monadic = 1,
    Dyadic = 2,
}

impl Arity {
    pub fn count(self) -> usize {
        self as usize
    }

    pub fn from_count(count: usize) -> Option<Arity> {
        match count {
            0 => Some(Arity::Niladic),
            1 => Some(Arity::Monadic),
            2 => Some(Arity::Dyadic),
            _ => None,
        }
    }

    /// Sort key used by the chain patterns, where an unresolved arity is -1
    pub(crate) fn code(arity: Option<Arity>) -> i8 {
        arity.map_or(-1, |a| a as i8)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Niladic => write!(f, "niladic"),
            Arity::Monadic => write!(f, "monadic"),
            Arity::Dyadic => write!(f, "dyadic"),
        }
    }
}

/// Arity slot of a link
enum ArityState {
    Fixed(Arity),
    /// Bound on first evaluation, permanently
    Unresolved(Cell<Option<Arity>>),
}

/// How the loop-to-repeat combinator reports its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopResult {
    /// The value just before the first repeat
    Last,
    /// Every value produced before the first repeat
    All,
    /// The history from the first occurrence of the repeated value
    Cycle,
}

/// Higher-order links built by the combinator layer from existing links.
///
/// Cross-chain references store the index of the chain (program line) they
/// were built in; the target is resolved against the program at call time.
pub enum Combinator {
    /// Dispatch ignoring every declared depth
    Flat(Rc<Link>),
    Swap(Rc<Link>),
    Reduce(Rc<Link>),
    Scan(Rc<Link>),
    /// Apply a monadic link to the left argument, discarding the right
    FixLeft(Rc<Link>),
    /// Apply a monadic link to the right argument, discarding the left
    FixRight(Rc<Link>),
    Each(Rc<Link>),
    ZipWith(Rc<Link>),
    SelfReference,
    /// Chain `origin + offset`, wrapping around the chain count
    Relative {
        origin: usize,
        offset: isize,
        arity: Arity,
    },
    /// Non-entry chain selected by a computed 1-based index; without an
    /// index link the left argument is the index
    Indexed {
        index: Option<Rc<Link>>,
        arity: Arity,
    },
    Sparse {
        link: Rc<Link>,
        indices: Rc<Link>,
    },
    Repeat {
        body: Rc<Link>,
        count: Option<Rc<Link>>,
        cumulative: bool,
    },
    While {
        body: Rc<Link>,
        condition: Rc<Link>,
        cumulative: bool,
    },
    Loop {
        body: Rc<Link>,
        result: LoopResult,
    },
    Conditional {
        then: Rc<Link>,
        otherwise: Rc<Link>,
        condition: Rc<Link>,
    },
    Search {
        predicate: Rc<Link>,
        count: Option<Rc<Link>>,
    },
    Filter {
        predicate: Rc<Link>,
        keep: bool,
    },
    /// Evaluate the link and overwrite the program's register with the result
    Store(Rc<Link>),
}

impl Combinator {
    pub fn name(&self) -> &'static str {
        match self {
            Combinator::Flat(_) => "flat",
            Combinator::Swap(_) => "swap",
            Combinator::Reduce(_) => "reduce",
            Combinator::Scan(_) => "scan",
            Combinator::FixLeft(_) => "fix-left",
            Combinator::FixRight(_) => "fix-right",
            Combinator::Each(_) => "each",
            Combinator::ZipWith(_) => "zip-with",
            Combinator::SelfReference => "self",
            Combinator::Relative { offset, .. } if *offset < 0 => "previous-chain",
            Combinator::Relative { .. } => "next-chain",
            Combinator::Indexed { .. } => "indexed-chain",
            Combinator::Sparse { .. } => "sparse",
            Combinator::Repeat { .. } => "repeat",
            Combinator::While { .. } => "while",
            Combinator::Loop { .. } => "loop",
            Combinator::Conditional { .. } => "conditional",
            Combinator::Search { .. } => "search",
            Combinator::Filter { .. } => "filter",
            Combinator::Store(_) => "store",
        }
    }
}

/// The operation a link performs
pub enum LinkKind {
    Primitive(Arc<Primitive>),
    Literal(Value),
    /// Niladic read of the program's register
    Register,
    /// Inline sub-chain, evaluated with however many arguments it receives
    Group(Chain),
    Combinator(Combinator),
}

/// An executable unit with a fixed or first-use-bound arity
pub struct Link {
    arity: ArityState,
    kind: LinkKind,
}

impl Link {
    pub fn new(kind: LinkKind, arity: Arity) -> Self {
        Link {
            arity: ArityState::Fixed(arity),
            kind,
        }
    }

    /// A link whose arity is decided by the first context that evaluates it
    pub fn unresolved(kind: LinkKind) -> Self {
        Link {
            arity: ArityState::Unresolved(Cell::new(None)),
            kind,
        }
    }

    /// Fixed arity when known, otherwise unresolved
    pub fn with_arity(kind: LinkKind, arity: Option<Arity>) -> Self {
        match arity {
            Some(arity) => Link::new(kind, arity),
            None => Link::unresolved(kind),
        }
    }

    pub fn primitive(primitive: Arc<Primitive>) -> Self {
        let arity = primitive.arity;
        Link::new(LinkKind::Primitive(primitive), arity)
    }

    pub fn literal(value: Value) -> Self {
        Link::new(LinkKind::Literal(value), Arity::Niladic)
    }

    pub fn register() -> Self {
        Link::new(LinkKind::Register, Arity::Niladic)
    }

    pub fn group(chain: Chain) -> Self {
        let arity = chain.declared_arity();
        Link::with_arity(LinkKind::Group(chain), arity)
    }

    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    /// Current arity; `None` while an unresolved link has not been evaluated
    pub fn arity(&self) -> Option<Arity> {
        match &self.arity {
            ArityState::Fixed(arity) => Some(*arity),
            ArityState::Unresolved(cell) => cell.get(),
        }
    }

    pub(crate) fn arity_code(&self) -> i8 {
        Arity::code(self.arity())
    }

    /// Bind an unresolved arity; a link that already has an arity keeps it.
    /// Returns the arity in effect afterwards.
    pub(crate) fn bind(&self, arity: Arity) -> Arity {
        match &self.arity {
            ArityState::Fixed(fixed) => *fixed,
            ArityState::Unresolved(cell) => match cell.get() {
                Some(bound) => bound,
                None => {
                    cell.set(Some(arity));
                    arity
                }
            },
        }
    }

    /// Declared operand depths; only primitives declare any
    pub fn depths(&self) -> Depths {
        match &self.kind {
            LinkKind::Primitive(primitive) => primitive.depths,
            _ => Depths::FLAT,
        }
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            LinkKind::Primitive(p) => p.name.to_owned(),
            LinkKind::Literal(v) => format!("literal {v}"),
            LinkKind::Register => "register".to_owned(),
            LinkKind::Group(chain) => format!("group of {}", chain.len()),
            LinkKind::Combinator(c) => c.name().to_owned(),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity() {
            Some(arity) => write!(f, "Link({}, {arity})", self.describe()),
            None => write!(f, "Link({}, unresolved)", self.describe()),
        }
    }
}

/// Ordered links making up one expression
#[derive(Debug, Default)]
pub struct Chain {
    links: Vec<Rc<Link>>,
    declared: Option<Arity>,
}

impl Chain {
    pub fn new(links: Vec<Rc<Link>>, declared: Option<Arity>) -> Self {
        Chain { links, declared }
    }

    pub fn links(&self) -> &[Rc<Link>] {
        &self.links
    }

    /// Arity given by a chain separator; `None` when left to the caller
    pub fn declared_arity(&self) -> Option<Arity> {
        self.declared
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Arities of a link window as pattern codes
pub(crate) fn arity_codes(links: &[Rc<Link>]) -> Vec<i8> {
    links.iter().map(|link| link.arity_code()).collect()
}

/// Whether a link sequence opens with a niladic seed.
///
/// The arities, followed by a sentinel 1, are compared lexicographically with
/// the repeating pattern `[0, 2, 0, 2, ...]` of twice the window length; the
/// sequence opens with a seed iff it is strictly smaller.
pub(crate) fn leading_constant(links: &[Rc<Link>]) -> bool {
    if links.is_empty() {
        return false;
    }
    let mut codes = arity_codes(links);
    codes.push(1);
    let pattern: Vec<i8> = [0, 2].iter().copied().cycle().take(2 * links.len()).collect();
    codes < pattern
}

/// Largest arity of a window, unresolved if any input is unresolved
pub(crate) fn max_arity(links: &[Rc<Link>]) -> Option<Arity> {
    links
        .iter()
        .map(|link| link.arity())
        .try_fold(Arity::Niladic, |acc, arity| arity.map(|a| acc.max(a)))
}

/// Largest resolved arity of a window, ignoring unresolved inputs
pub(crate) fn max_resolved_arity(links: &[Rc<Link>]) -> Option<Arity> {
    links.iter().filter_map(|link| link.arity()).max()
}

//! Target value expressions
//!
//! A [`Term`] is the right-hand side of every target action: a pure expression
//! tree evaluated by the rule engine when the action runs. Terms never have
//! side effects; all mutation happens through [`Action`](super::Action)s.
//!
//! Array combinators (`Filtered`, `Mapped`, `Sorted`, `IsTrueForAny`) evaluate
//! their second operand once per element with [`Term::ArrayElement`] and
//! [`Term::ArrayIndex`] bound to the element being visited.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::vars::Slot;

/// Binary operators understood by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// Bitwise and over the integer parts of both operands
    BitAnd,
}

impl BinOp {
    /// Operator symbol used by the disassembler
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::Min => "min",
            BinOp::Max => "max",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
        }
    }

    /// Min/max print as function calls rather than infix
    fn is_call_like(self) -> bool {
        matches!(self, BinOp::Min | BinOp::Max)
    }
}

/// Target expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Null,
    Number(f64),
    Bool(bool),
    /// Array literal
    Array(Vec<Term>),
    /// Read a storage slot
    Var(Slot),
    /// `array[index]`; out of range yields null
    Index(Box<Term>, Box<Term>),
    /// First element of an array
    First(Box<Term>),
    /// Last element of an array
    Last(Box<Term>),
    CountOf(Box<Term>),
    /// `contains(array, value)`
    Contains(Box<Term>, Box<Term>),
    /// `index_of(array, value)`; -1 when absent
    IndexOf(Box<Term>, Box<Term>),
    Binary(BinOp, Box<Term>, Box<Term>),
    Not(Box<Term>),
    /// `cond ? then : else`
    IfThenElse(Box<Term>, Box<Term>, Box<Term>),
    /// Euclidean distance between two position arrays
    Distance(Box<Term>, Box<Term>),
    /// Current element inside an array combinator
    ArrayElement,
    /// Current index inside an array combinator
    ArrayIndex,
    /// Elements of the array for which the predicate holds
    Filtered(Box<Term>, Box<Term>),
    /// Array of the mapping applied to each element
    Mapped(Box<Term>, Box<Term>),
    /// Array sorted ascending by the key term (stable)
    Sorted(Box<Term>, Box<Term>),
    /// True when the predicate holds for at least one element
    IsTrueForAny(Box<Term>, Box<Term>),
}

impl Term {
    pub fn number(value: impl Into<f64>) -> Self {
        Term::Number(value.into())
    }

    pub fn empty_array() -> Self {
        Term::Array(Vec::new())
    }

    pub fn binary(op: BinOp, left: Term, right: Term) -> Self {
        Term::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn not(operand: Term) -> Self {
        Term::Not(Box::new(operand))
    }

    pub fn index(self, index: Term) -> Self {
        Term::Index(Box::new(self), Box::new(index))
    }

    pub fn first(self) -> Self {
        Term::First(Box::new(self))
    }

    pub fn last(self) -> Self {
        Term::Last(Box::new(self))
    }

    pub fn count_of(self) -> Self {
        Term::CountOf(Box::new(self))
    }

    pub fn contains(self, value: Term) -> Self {
        Term::Contains(Box::new(self), Box::new(value))
    }

    pub fn if_then_else(condition: Term, then: Term, otherwise: Term) -> Self {
        Term::IfThenElse(Box::new(condition), Box::new(then), Box::new(otherwise))
    }

    pub fn distance(a: Term, b: Term) -> Self {
        Term::Distance(Box::new(a), Box::new(b))
    }

    pub fn filtered(self, predicate: Term) -> Self {
        Term::Filtered(Box::new(self), Box::new(predicate))
    }

    pub fn mapped(self, mapping: Term) -> Self {
        Term::Mapped(Box::new(self), Box::new(mapping))
    }

    pub fn sorted(self, key: Term) -> Self {
        Term::Sorted(Box::new(self), Box::new(key))
    }

    pub fn any(self, predicate: Term) -> Self {
        Term::IsTrueForAny(Box::new(self), Box::new(predicate))
    }

    /// `CountOf(self) - 1`, the index of the last element
    pub fn last_index(self) -> Self {
        Term::binary(BinOp::Sub, self.count_of(), Term::Number(1.0))
    }

    /// Simplify `Not` over literals and comparisons so emitted predicates stay
    /// readable in disassembly.
    pub fn negate(self) -> Self {
        match self {
            Term::Bool(b) => Term::Bool(!b),
            Term::Not(inner) => *inner,
            Term::Binary(op, l, r) => {
                let flipped = match op {
                    BinOp::Eq => Some(BinOp::Ne),
                    BinOp::Ne => Some(BinOp::Eq),
                    BinOp::Lt => Some(BinOp::Ge),
                    BinOp::Ge => Some(BinOp::Lt),
                    BinOp::Gt => Some(BinOp::Le),
                    BinOp::Le => Some(BinOp::Gt),
                    _ => None,
                };
                match flipped {
                    Some(op) => Term::Binary(op, l, r),
                    None => Term::not(Term::Binary(op, l, r)),
                }
            }
            other => Term::not(other),
        }
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Term::Number(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::Bool(value)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Null => write!(f, "null"),
            Term::Number(n) => write!(f, "{}", n),
            Term::Bool(b) => write!(f, "{}", b),
            Term::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Term::Var(slot) => write!(f, "{}", slot),
            Term::Index(a, i) => write!(f, "{}[{}]", a, i),
            Term::First(a) => write!(f, "first({})", a),
            Term::Last(a) => write!(f, "last({})", a),
            Term::CountOf(a) => write!(f, "count({})", a),
            Term::Contains(a, v) => write!(f, "contains({}, {})", a, v),
            Term::IndexOf(a, v) => write!(f, "index_of({}, {})", a, v),
            Term::Binary(op, l, r) if op.is_call_like() => {
                write!(f, "{}({}, {})", op.symbol(), l, r)
            }
            Term::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Term::Not(t) => write!(f, "!{}", t),
            Term::IfThenElse(c, t, e) => write!(f, "({} ? {} : {})", c, t, e),
            Term::Distance(a, b) => write!(f, "distance({}, {})", a, b),
            Term::ArrayElement => write!(f, "elem"),
            Term::ArrayIndex => write!(f, "idx"),
            Term::Filtered(a, p) => write!(f, "filtered({}, {})", a, p),
            Term::Mapped(a, m) => write!(f, "mapped({}, {})", a, m),
            Term::Sorted(a, k) => write!(f, "sorted({}, {})", a, k),
            Term::IsTrueForAny(a, p) => write!(f, "any({}, {})", a, p),
        }
    }
}

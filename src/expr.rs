use crate::span::Spanned;

/// Lexical elements of the arithmetic grammar.
pub mod lex;

/// Recursive descent parser building [Expression] trees out of candidate text.
pub mod parse;

/// Numeric evaluation of parsed trees.
pub mod eval;

pub use eval::{evaluate, EvalError, EvalErrorKind, Evaluator, Number};
pub use parse::{parse, Expected, ParseError, Parser};

/// Parsed arithmetic expression: a tree of [Node]s, each tagged with the span of
/// the candidate text it came from.
///
/// The tree owns all of its nodes and references nothing else. There are no
/// identifiers, calls or any other way for a node to reach outside of plain
/// arithmetic.
pub type Expression = Spanned<Node>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Finite number literal. Literals are never negative, negation is a [Node::Unary].
    Number(f64),

    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Parenthesized expression. Kept in the tree so the normalized text
    /// reproduces the grouping as written.
    Group(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

impl BinaryOp {
    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        use BinaryOp::*;
        match self {
            Add | Sub => 1,
            Mul | Div => 2,
            Pow => 3,
        }
    }

    pub fn associativity(self) -> Assoc {
        match self {
            BinaryOp::Pow => Assoc::Right,
            _ => Assoc::Left,
        }
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Pow => "^",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
        }
    }
}

impl TryFrom<&str> for Expression {
    type Error = ParseError;

    /// Tries to parse the expression from the provided string.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        parse(value)
    }
}

/// Normalized form: binary operators surrounded by single spaces, negation
/// attached to its operand, parentheses exactly where the source had them.
/// Parsing the result gives back an equal tree.
impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Number(v) => write!(f, "{v}"),
            Node::Binary { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.symbol()),
            Node::Unary { op, operand } => write!(f, "{}{operand}", op.symbol()),
            Node::Group(inner) => write!(f, "({inner})"),
        }
    }
}

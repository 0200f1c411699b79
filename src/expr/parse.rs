//! Precedence climbing over the grammar
//!
//! ```text
//! expr    := term (('+'|'-') term)*
//! term    := factor (('*'|'/') factor)*
//! factor  := unary ('^' factor)?
//! unary   := '-'? primary
//! primary := NUMBER | '(' expr ')'
//! ```
//!
//! Binary operator levels are driven by [BinaryOp::precedence] and
//! [BinaryOp::associativity] instead of one function per level.
//!
//! Every parsed tree is at most `max_depth` nodes tall, whatever the length of
//! the input. Long sums count as much as nested groups, so everything walking
//! the tree recursively stays within a bounded stack.

use log::trace;
use logos::Logos;

use super::{lex::Token, Assoc, BinaryOp, Expression, Node, UnaryOp};
use crate::span::Span;

/// Iterator over lexical elements.
type LexIter<'a> = logos::SpannedIter<'a, Token>;

/// Default limit of the tree height.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Highest tree height a parser accepts, whatever it is configured with.
pub const MAX_DEPTH_CAP: usize = 256;

/// Parsed subtree with its height. Numbers have height 0.
type Tree = (Expression, usize);

/// Parse the input with the default depth limit.
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    Parser::new(input).parse()
}

/// What the parser was looking for when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Start of an operand: a number, `-` or `(`.
    Operand,

    /// An operator continuing the expression, or the `)` closing the current group.
    CloseParen,

    /// An operator continuing the expression, or nothing at all.
    End,
}

impl std::fmt::Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Operand => write!(f, "a number or `(`"),
            Expected::CloseParen => write!(f, "an operator or `)`"),
            Expected::End => write!(f, "an operator or end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Text that is not a token of the grammar at all.
    #[error("expected {expected} at position {offset}, found unknown token `{text}`")]
    UnknownToken {
        offset: usize,
        expected: Expected,
        text: String,
    },

    /// Valid token in the wrong place.
    #[error("expected {expected} at position {offset}, found `{found}`")]
    Unexpected {
        offset: usize,
        expected: Expected,
        found: String,
    },

    #[error("unexpected end of input at position {offset}, expected {expected}")]
    UnexpectedEnd { offset: usize, expected: Expected },

    #[error("number `{text}` at position {offset} is out of range")]
    NumberOutOfRange { offset: usize, text: String },

    #[error("expression is nested deeper than {limit} levels at position {offset}")]
    TooDeep { offset: usize, limit: usize },
}

impl ParseError {
    /// Byte offset of the offending input.
    pub fn offset(&self) -> usize {
        use ParseError::*;
        match self {
            UnknownToken { offset, .. }
            | Unexpected { offset, .. }
            | UnexpectedEnd { offset, .. }
            | NumberOutOfRange { offset, .. }
            | TooDeep { offset, .. } => *offset,
        }
    }

    /// Span of the offending input. Empty when there is no offending text, as at
    /// the end of input.
    pub fn span(&self) -> Span {
        use ParseError::*;
        match self {
            UnknownToken { offset, text, .. }
            | Unexpected {
                offset,
                found: text,
                ..
            }
            | NumberOutOfRange { offset, text } => Span::from(*offset..*offset + text.len()),
            UnexpectedEnd { offset, .. } => Span::at(*offset),
            TooDeep { offset, .. } => Span::from(*offset..*offset + 1),
        }
    }
}

pub struct Parser<'src> {
    src: &'src str,
    tokens: LexIter<'src>,
    depth: usize,
    max_depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            tokens: Token::lexer(src).spanned(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit the height of the tree: operators, negations and groups stacked on
    /// top of each other. Clamped to [MAX_DEPTH_CAP].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_DEPTH_CAP);
        self
    }

    /// Parse the whole input as one expression. Trailing input is an error.
    pub fn parse(mut self) -> Result<Expression, ParseError> {
        trace!("Parsing `{}`", self.src);

        let (expr, height) = self.binary(0)?;
        trace!("Parsed tree of height {height}");
        match self.next(Expected::End)? {
            None => Ok(expr),
            Some((_, span)) => Err(ParseError::Unexpected {
                offset: span.start(),
                expected: Expected::End,
                found: self.text(span),
            }),
        }
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Tree, ParseError> {
        let (mut lhs, mut height) = self.unary()?;

        while let Some((op, op_span)) = self.peek_operator() {
            if op.precedence() < min_precedence {
                break;
            }
            self.tokens.next();

            let (rhs, rhs_height) = match op.associativity() {
                Assoc::Left => self.binary(op.precedence() + 1)?,
                Assoc::Right => {
                    self.descend(op_span)?;
                    let rhs = self.binary(op.precedence())?;
                    self.depth -= 1;
                    rhs
                }
            };
            height = self.grow(height.max(rhs_height), op_span)?;

            let span = lhs.span().combine(&rhs.span());
            lhs = span.with(Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        Ok((lhs, height))
    }

    fn unary(&mut self) -> Result<Tree, ParseError> {
        if let Some(minus) = self.spanprobe(Token::Minus) {
            let (operand, height) = self.primary()?;
            let height = self.grow(height, minus)?;
            let span = minus.combine(&operand.span());
            let node = Node::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            };
            return Ok((span.with(node), height));
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<Tree, ParseError> {
        match self.next(Expected::Operand)? {
            Some((Token::Number(v), span)) => {
                if v.is_finite() {
                    Ok((span.with(Node::Number(v)), 0))
                } else {
                    Err(ParseError::NumberOutOfRange {
                        offset: span.start(),
                        text: self.text(span),
                    })
                }
            }
            Some((Token::OpenParen, open)) => {
                self.descend(open)?;
                let (inner, height) = self.binary(0)?;
                let close = self.expect(Token::CloseParen, Expected::CloseParen)?;
                self.depth -= 1;

                let height = self.grow(height, open)?;
                Ok((open.combine(&close).with(Node::Group(Box::new(inner))), height))
            }
            Some((_, span)) => Err(ParseError::Unexpected {
                offset: span.start(),
                expected: Expected::Operand,
                found: self.text(span),
            }),
            None => Err(ParseError::UnexpectedEnd {
                offset: self.src.len(),
                expected: Expected::Operand,
            }),
        }
    }

    /// Enter one more nesting level, failing once the limit is reached.
    fn descend(&mut self, at: Span) -> Result<(), ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::TooDeep {
                offset: at.start(),
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Height of a node put on top of a subtree of the given height.
    fn grow(&self, height: usize, at: Span) -> Result<usize, ParseError> {
        if height >= self.max_depth {
            return Err(ParseError::TooDeep {
                offset: at.start(),
                limit: self.max_depth,
            });
        }
        Ok(height + 1)
    }

    /// Advance to the next token. Text the lexer cannot recognize is an error.
    fn next(&mut self, expected: Expected) -> Result<Option<(Token, Span)>, ParseError> {
        match self.tokens.next() {
            None => Ok(None),
            Some((Ok(token), range)) => Ok(Some((token, range.into()))),
            Some((Err(()), range)) => Err(ParseError::UnknownToken {
                offset: range.start,
                expected,
                text: self.text(range.into()),
            }),
        }
    }

    /// Expect next token to be the given one.
    fn expect(&mut self, token: Token, expected: Expected) -> Result<Span, ParseError> {
        match self.next(expected)? {
            Some((next, span)) if next == token => Ok(span),
            Some((_, span)) => Err(ParseError::Unexpected {
                offset: span.start(),
                expected,
                found: self.text(span),
            }),
            None => Err(ParseError::UnexpectedEnd {
                offset: self.src.len(),
                expected,
            }),
        }
    }

    /// Check if next token is the given one. If so, advance the iterator and return its [Span].
    fn spanprobe(&mut self, token: Token) -> Option<Span> {
        let backup = self.tokens.clone();

        if let Some((Ok(next), range)) = self.tokens.next() {
            if next == token {
                return Some(Span::from(range));
            }
        }

        self.tokens = backup;
        None
    }

    /// Look at the next token without advancing, if it is a binary operator.
    fn peek_operator(&self) -> Option<(BinaryOp, Span)> {
        let (token, range) = self.tokens.clone().next()?;
        let op = match token.ok()? {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Caret => BinaryOp::Pow,
            _ => return None,
        };
        Some((op, range.into()))
    }

    /// Source text of the span. Falls back to the single character at the start
    /// of the span if it does not fall on character boundaries.
    fn text(&self, span: Span) -> String {
        if let Some(s) = self.src.get(span.start()..span.end()) {
            return s.to_owned();
        }

        (span.start() + 1..=span.start() + 4)
            .find_map(|end| self.src.get(span.start()..end))
            .and_then(|s| s.chars().next())
            .map(String::from)
            .unwrap_or_default()
    }
}

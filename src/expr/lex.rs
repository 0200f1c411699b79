use logos::Logos;

/// Lexical element of an arithmetic expression. Anything that is not listed here
/// (identifiers, quotes, `;`, `**` as a single operator and so on) comes out of the
/// lexer as an error and is rejected by the parser.
#[derive(Debug, Logos, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", lex_number)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", lex_number)]
    Number(f64),

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("^")]
    Caret,

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,
}

/// Convert lexical token to a number literal.
///
/// Literals too large for `f64` become infinite here; the parser rejects them.
fn lex_number(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

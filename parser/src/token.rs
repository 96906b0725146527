//! FILENAME: parser/src/token.rs
//! PURPOSE: Token definitions for the report expression lexer.
//! CONTEXT: Tokens are the atomic units produced by the lexer and consumed by the parser.

/// Tokens recognized by the expression lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // Literals
    /// Numeric literal, kept as its decimal text so no precision is lost
    /// before the engine converts it to an arbitrary precision number.
    Number(String),
    String(String),
    /// Datetime literal written as {1980-05-05 06:10:15}
    Datetime(String),
    Identifier(String),

    // Arithmetic operators
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Caret,
    Increment,
    Decrement,

    // Logical and bitwise operators
    Bang,
    Tilde,
    Ampersand,
    Pipe,
    DoubleAmpersand,
    DoublePipe,
    DoubleCaret,
    ShiftLeft,
    ShiftRight,

    // Comparison operators. `=` and `==` both lex as Equals,
    // `!=` and `<>` both lex as NotEqual.
    Equals,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Delimiters
    LParen,
    RParen,
    Comma,
    Dot,
    Question,
    Colon,

    // Special
    EOF,
    Illegal(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Token::Datetime(s) => write!(f, "{{{}}}", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Increment => write!(f, "++"),
            Token::Decrement => write!(f, "--"),
            Token::Bang => write!(f, "!"),
            Token::Tilde => write!(f, "~"),
            Token::Ampersand => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::DoubleAmpersand => write!(f, "&&"),
            Token::DoublePipe => write!(f, "||"),
            Token::DoubleCaret => write!(f, "^^"),
            Token::ShiftLeft => write!(f, "<<"),
            Token::ShiftRight => write!(f, ">>"),
            Token::Equals => write!(f, "="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::GreaterThan => write!(f, ">"),
            Token::LessEqual => write!(f, "<="),
            Token::GreaterEqual => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::EOF => write!(f, "EOF"),
            Token::Illegal(c) => write!(f, "ILLEGAL({})", c),
        }
    }
}

//! FILENAME: parser/src/lexer.rs
//! PURPOSE: Scans a raw expression string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. It handles
//! whitespace skipping, number parsing (with exponents), quoted strings,
//! datetime literals and the multi-character C-style operators.
//!
//! SUPPORTED OPERATORS:
//! - Single char: + - * / % ^ ! ~ & | < > = ( ) , . ? :
//! - Multi char: ++ -- && || ^^ << >> <= >= == != <>
//! - Strings: 'text' or "text", a doubled quote escapes the quote
//! - Datetime literals: {1980-05-05 06:10:15}
//! - Quoted identifiers: `column name`

use crate::token::Token;
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.input.next() {
            Some('+') => self.read_doubled('+', Token::Increment, Token::Plus),
            Some('-') => self.read_doubled('-', Token::Decrement, Token::Minus),
            Some('&') => self.read_doubled('&', Token::DoubleAmpersand, Token::Ampersand),
            Some('|') => self.read_doubled('|', Token::DoublePipe, Token::Pipe),
            Some('^') => self.read_doubled('^', Token::DoubleCaret, Token::Caret),
            Some('*') => Token::Asterisk,
            Some('/') => Token::Slash,
            Some('%') => Token::Percent,
            Some('~') => Token::Tilde,
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,
            Some(',') => Token::Comma,
            Some('?') => Token::Question,
            Some(':') => Token::Colon,

            // = and ==
            Some('=') => self.read_doubled('=', Token::Equals, Token::Equals),

            // ! and !=
            Some('!') => self.read_doubled('=', Token::NotEqual, Token::Bang),

            // <, <=, <>, <<
            Some('<') => self.read_less_than_operator(),

            // >, >=, >>
            Some('>') => self.read_greater_than_operator(),

            Some(quote @ ('"' | '\'')) => self.read_string(quote),

            Some('{') => self.read_datetime(),

            Some('`') => self.read_quoted_identifier(),

            // A dot directly followed by a digit starts a number (.5),
            // otherwise it separates a query name from a column name.
            Some('.') => match self.input.peek() {
                Some(ch) if ch.is_ascii_digit() => self.read_number('.'),
                _ => Token::Dot,
            },

            Some(ch) if ch.is_ascii_digit() => self.read_number(ch),

            Some(ch) if is_letter(ch) => self.read_identifier(ch),

            None => Token::EOF,

            Some(ch) => Token::Illegal(ch),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    /// Returns `doubled` if the next char is `second`, `single` otherwise.
    fn read_doubled(&mut self, second: char, doubled: Token, single: Token) -> Token {
        if self.input.peek() == Some(&second) {
            self.input.next();
            doubled
        } else {
            single
        }
    }

    /// Handles operators starting with '<': <, <=, <>, <<
    fn read_less_than_operator(&mut self) -> Token {
        match self.input.peek() {
            Some('=') => {
                self.input.next();
                Token::LessEqual
            }
            Some('>') => {
                self.input.next();
                Token::NotEqual
            }
            Some('<') => {
                self.input.next();
                Token::ShiftLeft
            }
            _ => Token::LessThan,
        }
    }

    /// Handles operators starting with '>': >, >=, >>
    fn read_greater_than_operator(&mut self) -> Token {
        match self.input.peek() {
            Some('=') => {
                self.input.next();
                Token::GreaterEqual
            }
            Some('>') => {
                self.input.next();
                Token::ShiftRight
            }
            _ => Token::GreaterThan,
        }
    }

    /// Reads a string delimited by `quote`. A doubled quote is an escaped quote.
    /// An unterminated string is reported as an illegal quote character.
    fn read_string(&mut self, quote: char) -> Token {
        let mut result = String::new();
        while let Some(ch) = self.input.next() {
            if ch == quote {
                if self.input.peek() == Some(&quote) {
                    result.push(quote);
                    self.input.next();
                } else {
                    return Token::String(result);
                }
            } else {
                result.push(ch);
            }
        }
        Token::Illegal(quote)
    }

    fn read_datetime(&mut self) -> Token {
        let mut result = String::new();
        for ch in self.input.by_ref() {
            if ch == '}' {
                return Token::Datetime(result.trim().to_string());
            }
            result.push(ch);
        }
        Token::Illegal('{')
    }

    fn read_quoted_identifier(&mut self) -> Token {
        let mut result = String::new();
        for ch in self.input.by_ref() {
            if ch == '`' {
                return Token::Identifier(result);
            }
            result.push(ch);
        }
        Token::Illegal('`')
    }

    /// Reads 1, 1.5, .5, 1e5, 1.5E-5. An 'e' that is not followed by
    /// digits is left for the identifier reader, so "2e" is 2 times e.
    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::from(first_char);
        let mut has_dot = first_char == '.';

        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.input.next();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                number_str.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        if matches!(self.input.peek(), Some('e') | Some('E')) {
            // Lookahead on a clone: the exponent is only consumed when complete
            let mut lookahead = self.input.clone();
            let mut exponent = String::new();
            if let Some(e) = lookahead.next() {
                exponent.push(e);
            }
            if let Some(&sign @ ('+' | '-')) = lookahead.peek() {
                exponent.push(sign);
                lookahead.next();
            }
            let mut digits = 0;
            while let Some(&ch) = lookahead.peek() {
                if !ch.is_ascii_digit() {
                    break;
                }
                exponent.push(ch);
                lookahead.next();
                digits += 1;
            }
            if digits > 0 {
                number_str.push_str(&exponent);
                self.input = lookahead;
            }
        }

        Token::Number(number_str)
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::from(first_char);

        while let Some(&ch) = self.input.peek() {
            if is_letter(ch) || ch.is_ascii_digit() {
                ident.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }
}

/// Returns true if `ch` can start an identifier.
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

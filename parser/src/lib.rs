//! FILENAME: parser/src/lib.rs
//! PURPOSE: Library root for the report expression parser.
//! CONTEXT: This module exposes the lexer, parser, and AST components
//! needed to convert expression strings into trees the engine compiles.
//!
//! PIPELINE: Expression String --> Lexer --> Tokens --> Parser --> AST --> engine::compile
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, %, ^ (power), implicit multiplication
//! - Comparison: =, ==, !=, <>, <, >, <=, >=
//! - Logical and bitwise: &&, ||, !, &, |, ^^, ~, <<, >>
//! - Increment/decrement: prefix and postfix ++ --
//! - Conditional: cond ? a : b
//! - References: age, .age, people.age, m.HOME, r.self, v.total
//! - Function calls: concat(a, 'x'), rownum()
//! - Literals: 1.5e3, 'text', "text", {2024-02-29 12:00:00}

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

// Register the separate tests module
#[cfg(test)]
mod tests;

// Re-export commonly used types for convenience
pub use ast::{BinaryOperator, Expression, UnaryOperator, Value, VariableScope};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use token::Token;

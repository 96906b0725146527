//! FILENAME: parser/src/parser.rs
//! PURPOSE: Recursive descent parser that converts a stream of Tokens into an AST.
//! CONTEXT: This is the second stage of the parsing pipeline. It takes tokens
//! from the Lexer and builds an Expression tree that the engine compiles.
//!
//! GRAMMAR (lowest precedence first):
//!   expression     --> ternary
//!   ternary        --> logical_or ( "?" expression ":" ternary )?
//!   logical_or     --> logical_and ( "||" logical_and )*
//!   logical_and    --> bit_or ( "&&" bit_or )*
//!   bit_or         --> bit_xor ( "|" bit_xor )*
//!   bit_xor        --> bit_and ( "^^" bit_and )*
//!   bit_and        --> equality ( "&" equality )*
//!   equality       --> relational ( ("=" | "!=") relational )*
//!   relational     --> shift ( ("<" | "<=" | ">" | ">=") shift )*
//!   shift          --> additive ( ("<<" | ">>") additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/" | "%") unary | implicit_mul )*
//!   implicit_mul   --> unary starting with "(", IDENTIFIER, NUMBER or DATETIME
//!   unary          --> ("-" | "+" | "!" | "~" | "++" | "--") unary | power
//!   power          --> postfix ( "^" unary )?
//!   postfix        --> primary ( "++" | "--" )*
//!   primary        --> NUMBER | STRING | DATETIME | reference | function_call | "(" expression ")"
//!   reference      --> IDENTIFIER ( "." IDENTIFIER )? | "." IDENTIFIER
//!   function_call  --> IDENTIFIER "(" arguments? ")"
//!   arguments      --> expression ("," expression)*

use crate::ast::{BinaryOperator, Expression, UnaryOperator, Value, VariableScope};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Signature of one precedence level of the descent.
type LevelFn<'a> = fn(&mut Parser<'a>) -> ParseResult<Expression>;

/// The Parser struct holds the lexer and current token state.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the entire input and returns the AST.
    pub fn parse(&mut self) -> ParseResult<Expression> {
        if self.current_token == Token::EOF {
            return Err(ParseError::new("Empty expression"));
        }

        let expr = self.parse_expression()?;

        // Ensure we consumed all tokens
        if self.current_token != Token::EOF {
            return Err(ParseError::new(format!(
                "Unexpected token after expression: {}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Checks if the current token matches the expected token.
    /// If it matches, advances and returns Ok. Otherwise returns an error.
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {}, found {}",
                expected, self.current_token
            )))
        }
    }

    /// Entry point for expression parsing.
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_ternary()
    }

    /// Parses the conditional operator. It is right associative:
    /// a ? b : c ? d : e is a ? b : (c ? d : e).
    fn parse_ternary(&mut self) -> ParseResult<Expression> {
        let condition = self.parse_logical_or()?;

        if self.current_token != Token::Question {
            return Ok(condition);
        }

        self.advance();
        let then_branch = self.parse_expression()?;
        self.expect(Token::Colon)?;
        let else_branch = self.parse_ternary()?;

        Ok(Expression::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// Parses one left-associative binary precedence level.
    fn parse_left_assoc(
        &mut self,
        next: LevelFn<'a>,
        operator_for: fn(&Token) -> Option<BinaryOperator>,
    ) -> ParseResult<Expression> {
        let mut left = next(self)?;

        while let Some(op) = operator_for(&self.current_token) {
            self.advance();
            let right = next(self)?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_logical_and, |t| match t {
            Token::DoublePipe => Some(BinaryOperator::LogicalOr),
            _ => None,
        })
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_bit_or, |t| match t {
            Token::DoubleAmpersand => Some(BinaryOperator::LogicalAnd),
            _ => None,
        })
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_bit_xor, |t| match t {
            Token::Pipe => Some(BinaryOperator::BitOr),
            _ => None,
        })
    }

    fn parse_bit_xor(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_bit_and, |t| match t {
            Token::DoubleCaret => Some(BinaryOperator::BitXor),
            _ => None,
        })
    }

    fn parse_bit_and(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_equality, |t| match t {
            Token::Ampersand => Some(BinaryOperator::BitAnd),
            _ => None,
        })
    }

    /// Parses equality expressions (=, ==, !=, <>).
    fn parse_equality(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_relational, |t| match t {
            Token::Equals => Some(BinaryOperator::Equal),
            Token::NotEqual => Some(BinaryOperator::NotEqual),
            _ => None,
        })
    }

    /// Parses relational expressions (<, <=, >, >=).
    fn parse_relational(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_shift, |t| match t {
            Token::LessThan => Some(BinaryOperator::LessThan),
            Token::LessEqual => Some(BinaryOperator::LessEqual),
            Token::GreaterThan => Some(BinaryOperator::GreaterThan),
            Token::GreaterEqual => Some(BinaryOperator::GreaterEqual),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_additive, |t| match t {
            Token::ShiftLeft => Some(BinaryOperator::ShiftLeft),
            Token::ShiftRight => Some(BinaryOperator::ShiftRight),
            _ => None,
        })
    }

    /// Parses additive expressions (+ and -).
    fn parse_additive(&mut self) -> ParseResult<Expression> {
        self.parse_left_assoc(Self::parse_multiplicative, |t| match t {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    /// Parses multiplicative expressions (*, /, %) and implicit
    /// multiplication such as (1+1)(2+2) or 2x.
    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current_token {
                Token::Asterisk => {
                    self.advance();
                    BinaryOperator::Multiply
                }
                Token::Slash => {
                    self.advance();
                    BinaryOperator::Divide
                }
                Token::Percent => {
                    self.advance();
                    BinaryOperator::Modulo
                }
                // Implicit multiplication: the token is left for the operand
                Token::LParen | Token::Identifier(_) | Token::Number(_) | Token::Datetime(_) => {
                    BinaryOperator::Multiply
                }
                _ => break,
            };

            let right = self.parse_unary()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses prefix unary expressions.
    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let op = match &self.current_token {
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            Token::Bang => UnaryOperator::LogicalNot,
            Token::Tilde => UnaryOperator::BitNot,
            Token::Increment => UnaryOperator::PreIncrement,
            Token::Decrement => UnaryOperator::PreDecrement,
            _ => return self.parse_power(),
        };

        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parses power/exponentiation expressions (^), right associative.
    fn parse_power(&mut self) -> ParseResult<Expression> {
        let left = self.parse_postfix()?;

        if self.current_token == Token::Caret {
            self.advance();
            let right = self.parse_unary()?;

            return Ok(Expression::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Power,
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    /// Parses postfix ++ and --.
    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            let op = match &self.current_token {
                Token::Increment => UnaryOperator::PostIncrement,
                Token::Decrement => UnaryOperator::PostDecrement,
                _ => break,
            };
            self.advance();
            expr = Expression::UnaryOp {
                op,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    /// Parses primary expressions (literals, references, function calls, parentheses).
    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expression::Literal(Value::Number(n)))
            }

            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Value::String(s)))
            }

            Token::Datetime(s) => {
                self.advance();
                Ok(Expression::Literal(Value::Datetime(s)))
            }

            // .column: explicitly unqualified column reference
            Token::Dot => {
                self.advance();
                let name = self.expect_identifier("'.'")?;
                Ok(Expression::Identifier {
                    domain: None,
                    name,
                    dot_prefixed: true,
                })
            }

            // Identifier: function call, qualified or plain reference
            Token::Identifier(name) => {
                self.advance();

                if self.current_token == Token::LParen {
                    return self.parse_function_call(name);
                }

                if self.current_token == Token::Dot {
                    self.advance();
                    let member = self.expect_identifier(&format!("'{}.'", name))?;
                    return Ok(match VariableScope::from_domain(&name) {
                        Some(scope) => Expression::Variable {
                            scope,
                            name: member,
                        },
                        None => Expression::Identifier {
                            domain: Some(name),
                            name: member,
                            dot_prefixed: false,
                        },
                    });
                }

                Ok(Expression::Identifier {
                    domain: None,
                    name,
                    dot_prefixed: false,
                })
            }

            // Parenthesized expression
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(Expression::Grouped(Box::new(expr)))
            }

            // Error cases
            Token::EOF => Err(ParseError::new("Unexpected end of expression")),

            Token::Illegal(ch) => Err(ParseError::new(match ch {
                '\'' | '"' => "Unterminated string literal".to_string(),
                '{' => "Unterminated datetime literal".to_string(),
                '`' => "Unterminated quoted identifier".to_string(),
                _ => format!("Illegal character: {}", ch),
            })),

            token => Err(ParseError::new(format!("Unexpected token: {}", token))),
        }
    }

    fn expect_identifier(&mut self, after: &str) -> ParseResult<String> {
        match self.current_token.clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::new(format!(
                "Expected identifier after {}, found {}",
                after, other
            ))),
        }
    }

    /// Parses a function call like concat(a, 'x', 10).
    fn parse_function_call(&mut self, name: String) -> ParseResult<Expression> {
        // Consume the '('
        self.advance();

        let mut args = Vec::new();

        // Handle empty argument list
        if self.current_token == Token::RParen {
            self.advance();
            return Ok(Expression::FunctionCall { name, args });
        }

        args.push(self.parse_expression()?);

        while self.current_token == Token::Comma {
            self.advance();
            args.push(self.parse_expression()?);
        }

        self.expect(Token::RParen)?;

        Ok(Expression::FunctionCall { name, args })
    }
}

/// Convenience function to parse an expression string directly.
pub fn parse(input: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(input);
    parser.parse()
}

//! FILENAME: parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the parser crate.

use crate::ast::{BinaryOperator, Expression, UnaryOperator, Value, VariableScope};
use crate::lexer::Lexer;
use crate::parser::parse;
use crate::token::Token;

fn num(n: &str) -> Expression {
    Expression::Literal(Value::Number(n.to_string()))
}

fn ident(name: &str) -> Expression {
    Expression::Identifier {
        domain: None,
        name: name.to_string(),
        dot_prefixed: false,
    }
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn unary(op: UnaryOperator, operand: Expression) -> Expression {
    Expression::UnaryOp {
        op,
        operand: Box::new(operand),
    }
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn lexer_tokenizes_simple_math() {
    let mut lexer = Lexer::new("1 + 2.5");

    assert_eq!(lexer.next_token(), Token::Number("1".to_string()));
    assert_eq!(lexer.next_token(), Token::Plus);
    assert_eq!(lexer.next_token(), Token::Number("2.5".to_string()));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_tokenizes_functions() {
    let mut lexer = Lexer::new("concat(name, 10)");

    assert_eq!(lexer.next_token(), Token::Identifier("concat".to_string()));
    assert_eq!(lexer.next_token(), Token::LParen);
    assert_eq!(lexer.next_token(), Token::Identifier("name".to_string()));
    assert_eq!(lexer.next_token(), Token::Comma);
    assert_eq!(lexer.next_token(), Token::Number("10".to_string()));
    assert_eq!(lexer.next_token(), Token::RParen);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_preserves_identifier_case() {
    let mut lexer = Lexer::new("Age");
    assert_eq!(lexer.next_token(), Token::Identifier("Age".to_string()));
}

#[test]
fn lexer_tokenizes_comparison_operators() {
    let mut lexer = Lexer::new("< > <= >= <> != = ==");

    assert_eq!(lexer.next_token(), Token::LessThan);
    assert_eq!(lexer.next_token(), Token::GreaterThan);
    assert_eq!(lexer.next_token(), Token::LessEqual);
    assert_eq!(lexer.next_token(), Token::GreaterEqual);
    assert_eq!(lexer.next_token(), Token::NotEqual);
    assert_eq!(lexer.next_token(), Token::NotEqual);
    assert_eq!(lexer.next_token(), Token::Equals);
    assert_eq!(lexer.next_token(), Token::Equals);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_tokenizes_doubled_operators() {
    let mut lexer = Lexer::new("++ -- && || ^^ << >> ^ & |");

    assert_eq!(lexer.next_token(), Token::Increment);
    assert_eq!(lexer.next_token(), Token::Decrement);
    assert_eq!(lexer.next_token(), Token::DoubleAmpersand);
    assert_eq!(lexer.next_token(), Token::DoublePipe);
    assert_eq!(lexer.next_token(), Token::DoubleCaret);
    assert_eq!(lexer.next_token(), Token::ShiftLeft);
    assert_eq!(lexer.next_token(), Token::ShiftRight);
    assert_eq!(lexer.next_token(), Token::Caret);
    assert_eq!(lexer.next_token(), Token::Ampersand);
    assert_eq!(lexer.next_token(), Token::Pipe);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_handles_both_quote_styles() {
    let mut lexer = Lexer::new("'single' \"double\"");

    assert_eq!(lexer.next_token(), Token::String("single".to_string()));
    assert_eq!(lexer.next_token(), Token::String("double".to_string()));
}

#[test]
fn lexer_handles_escaped_quote() {
    let mut lexer = Lexer::new("'it''s'");
    assert_eq!(lexer.next_token(), Token::String("it's".to_string()));
}

#[test]
fn lexer_reports_unterminated_string() {
    let mut lexer = Lexer::new("'abc");
    assert_eq!(lexer.next_token(), Token::Illegal('\''));
}

#[test]
fn lexer_reads_datetime_literal() {
    let mut lexer = Lexer::new("{ 1980-05-05 06:10:15 }");
    assert_eq!(
        lexer.next_token(),
        Token::Datetime("1980-05-05 06:10:15".to_string())
    );
}

#[test]
fn lexer_reads_number_forms() {
    let mut lexer = Lexer::new(".5 1e5 1.5E-5");

    assert_eq!(lexer.next_token(), Token::Number(".5".to_string()));
    assert_eq!(lexer.next_token(), Token::Number("1e5".to_string()));
    assert_eq!(lexer.next_token(), Token::Number("1.5E-5".to_string()));
}

#[test]
fn lexer_leaves_incomplete_exponent_as_identifier() {
    let mut lexer = Lexer::new("2e");

    assert_eq!(lexer.next_token(), Token::Number("2".to_string()));
    assert_eq!(lexer.next_token(), Token::Identifier("e".to_string()));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_separates_query_and_column() {
    let mut lexer = Lexer::new("people.age");

    assert_eq!(lexer.next_token(), Token::Identifier("people".to_string()));
    assert_eq!(lexer.next_token(), Token::Dot);
    assert_eq!(lexer.next_token(), Token::Identifier("age".to_string()));
}

#[test]
fn lexer_reads_backtick_identifier() {
    let mut lexer = Lexer::new("`first name`");
    assert_eq!(
        lexer.next_token(),
        Token::Identifier("first name".to_string())
    );
}

// ========================================
// PARSER TESTS - LITERALS
// ========================================

#[test]
fn parser_parses_number_literal() {
    assert_eq!(parse("42").unwrap(), num("42"));
}

#[test]
fn parser_keeps_number_text() {
    assert_eq!(
        parse("3.14159265358979323846264338327950288").unwrap(),
        num("3.14159265358979323846264338327950288")
    );
}

#[test]
fn parser_parses_string_literal() {
    assert_eq!(
        parse("\"Hello World\"").unwrap(),
        Expression::Literal(Value::String("Hello World".to_string()))
    );
}

#[test]
fn parser_parses_datetime_literal() {
    assert_eq!(
        parse("{2024-01-31}").unwrap(),
        Expression::Literal(Value::Datetime("2024-01-31".to_string()))
    );
}

// ========================================
// PARSER TESTS - REFERENCES
// ========================================

#[test]
fn parser_parses_plain_identifier() {
    assert_eq!(parse("age").unwrap(), ident("age"));
}

#[test]
fn parser_parses_dot_prefixed_identifier() {
    assert_eq!(
        parse(".age").unwrap(),
        Expression::Identifier {
            domain: None,
            name: "age".to_string(),
            dot_prefixed: true,
        }
    );
}

#[test]
fn parser_parses_query_qualified_identifier() {
    assert_eq!(
        parse("people.age").unwrap(),
        Expression::Identifier {
            domain: Some("people".to_string()),
            name: "age".to_string(),
            dot_prefixed: false,
        }
    );
}

#[test]
fn parser_maps_reserved_domains_to_variables() {
    assert_eq!(
        parse("m.HOME").unwrap(),
        Expression::Variable {
            scope: VariableScope::Environment,
            name: "HOME".to_string()
        }
    );
    assert_eq!(
        parse("r.self").unwrap(),
        Expression::Variable {
            scope: VariableScope::Row,
            name: "self".to_string()
        }
    );
    assert_eq!(
        parse("v.total").unwrap(),
        Expression::Variable {
            scope: VariableScope::Report,
            name: "total".to_string()
        }
    );
}

#[test]
fn parser_rejects_dangling_domain() {
    let err = parse("people.").unwrap_err();
    assert!(err.message.contains("Expected identifier"));
}

// ========================================
// PARSER TESTS - OPERATORS
// ========================================

#[test]
fn parser_respects_multiplicative_precedence() {
    assert_eq!(
        parse("1 + 2 * 3").unwrap(),
        binary(
            num("1"),
            BinaryOperator::Add,
            binary(num("2"), BinaryOperator::Multiply, num("3"))
        )
    );
}

#[test]
fn parser_division_is_left_associative() {
    assert_eq!(
        parse("6/3/2").unwrap(),
        binary(
            binary(num("6"), BinaryOperator::Divide, num("3")),
            BinaryOperator::Divide,
            num("2")
        )
    );
}

#[test]
fn parser_power_is_right_associative() {
    assert_eq!(
        parse("2^3^2").unwrap(),
        binary(
            num("2"),
            BinaryOperator::Power,
            binary(num("3"), BinaryOperator::Power, num("2"))
        )
    );
}

#[test]
fn parser_negation_binds_looser_than_power() {
    assert_eq!(
        parse("-2^2").unwrap(),
        unary(
            UnaryOperator::Negate,
            binary(num("2"), BinaryOperator::Power, num("2"))
        )
    );
}

#[test]
fn parser_parses_implicit_multiplication() {
    assert_eq!(
        parse("2x").unwrap(),
        binary(num("2"), BinaryOperator::Multiply, ident("x"))
    );

    let grouped = |l: &str, r: &str| {
        Expression::Grouped(Box::new(binary(num(l), BinaryOperator::Add, num(r))))
    };
    assert_eq!(
        parse("(1+1)(2+2)").unwrap(),
        binary(grouped("1", "1"), BinaryOperator::Multiply, grouped("2", "2"))
    );
}

#[test]
fn parser_orders_logical_and_bitwise_levels() {
    assert_eq!(
        parse("!a && b || c").unwrap(),
        binary(
            binary(
                unary(UnaryOperator::LogicalNot, ident("a")),
                BinaryOperator::LogicalAnd,
                ident("b")
            ),
            BinaryOperator::LogicalOr,
            ident("c")
        )
    );

    assert_eq!(
        parse("a & b | c ^^ d").unwrap(),
        binary(
            binary(ident("a"), BinaryOperator::BitAnd, ident("b")),
            BinaryOperator::BitOr,
            binary(ident("c"), BinaryOperator::BitXor, ident("d"))
        )
    );
}

#[test]
fn parser_shift_binds_looser_than_addition() {
    assert_eq!(
        parse("1 << 2 + 3").unwrap(),
        binary(
            num("1"),
            BinaryOperator::ShiftLeft,
            binary(num("2"), BinaryOperator::Add, num("3"))
        )
    );
}

#[test]
fn parser_comparison_aliases() {
    assert_eq!(parse("a == b").unwrap(), parse("a = b").unwrap());
    assert_eq!(parse("a <> b").unwrap(), parse("a != b").unwrap());
}

#[test]
fn parser_parses_prefix_and_postfix_increment() {
    assert_eq!(
        parse("++x").unwrap(),
        unary(UnaryOperator::PreIncrement, ident("x"))
    );
    assert_eq!(
        parse("x--").unwrap(),
        unary(UnaryOperator::PostDecrement, ident("x"))
    );
}

#[test]
fn parser_conditional_is_right_associative() {
    assert_eq!(
        parse("a ? b : c ? d : e").unwrap(),
        Expression::Conditional {
            condition: Box::new(ident("a")),
            then_branch: Box::new(ident("b")),
            else_branch: Box::new(Expression::Conditional {
                condition: Box::new(ident("c")),
                then_branch: Box::new(ident("d")),
                else_branch: Box::new(ident("e")),
            }),
        }
    );
}

// ========================================
// PARSER TESTS - FUNCTION CALLS
// ========================================

#[test]
fn parser_parses_function_with_args() {
    assert_eq!(
        parse("concat('a', \"b\", 3)").unwrap(),
        Expression::FunctionCall {
            name: "concat".to_string(),
            args: vec![
                Expression::Literal(Value::String("a".to_string())),
                Expression::Literal(Value::String("b".to_string())),
                num("3"),
            ],
        }
    );
}

#[test]
fn parser_parses_function_without_args() {
    assert_eq!(
        parse("rownum()").unwrap(),
        Expression::FunctionCall {
            name: "rownum".to_string(),
            args: vec![],
        }
    );
}

#[test]
fn parser_parses_nested_calls() {
    let expr = parse("upper(left(name, 2))").unwrap();
    match expr {
        Expression::FunctionCall { name, args } => {
            assert_eq!(name, "upper");
            assert_eq!(args.len(), 1);
            assert!(matches!(&args[0], Expression::FunctionCall { name, .. } if name == "left"));
        }
        other => panic!("expected function call, got {:?}", other),
    }
}

// ========================================
// PARSER TESTS - ERRORS
// ========================================

#[test]
fn parser_rejects_empty_input() {
    assert_eq!(parse("   ").unwrap_err().message, "Empty expression");
}

#[test]
fn parser_rejects_trailing_tokens() {
    let err = parse("1 )").unwrap_err();
    assert!(err.message.starts_with("Unexpected token after expression"));
}

#[test]
fn parser_rejects_missing_operand() {
    assert!(parse("1 +").is_err());
}

#[test]
fn parser_rejects_unclosed_paren() {
    let err = parse("(1 + 2").unwrap_err();
    assert!(err.message.contains("Expected )"));
}

#[test]
fn parser_reports_unterminated_string() {
    assert_eq!(
        parse("'abc").unwrap_err().message,
        "Unterminated string literal"
    );
}

#[test]
fn parser_rejects_missing_colon() {
    assert!(parse("a ? b").is_err());
}

// ========================================
// DISPLAY
// ========================================

#[test]
fn expression_display_round_trips_text() {
    let expr = parse("people.age * (2 + .x)").unwrap();
    assert_eq!(expr.to_string(), "people.age * (2 + .x)");
}

#[test]
fn parse_error_display() {
    let err = parse("").unwrap_err();
    assert_eq!(err.to_string(), "Parse error: Empty expression");
}

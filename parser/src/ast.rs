//! FILENAME: parser/src/ast.rs
//! PURPOSE: Defines the Abstract Syntax Tree (AST) for report expressions.
//! CONTEXT: After the Lexer tokenizes an expression string, the Parser converts
//! those tokens into this tree structure. The engine then compiles this
//! tree into an evaluatable expression with result slots.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: numbers (decimal text), strings, datetimes
//! - Column references: age, .age, people.age
//! - Variable references: m.HOME (environment), r.self (row), v.total (report variable)
//! - Binary operations: arithmetic, comparison, logical, bitwise, shifts
//! - Unary operations: - + ! ~ and prefix/postfix ++ --
//! - Conditional: cond ? a : b
//! - Function calls: add(1, 2, 3), upper(name)
//! - Parentheses are kept as Grouped nodes for the optimizer

/// Represents a parsed report expression.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A literal value: number, string or datetime.
    Literal(Value),

    /// A column reference. `domain` is the query name for `query.column`,
    /// `dot_prefixed` is set for the `.column` form.
    Identifier {
        domain: Option<String>,
        name: String,
        dot_prefixed: bool,
    },

    /// A reference with one of the reserved domains `m`, `r` or `v`.
    Variable { scope: VariableScope, name: String },

    /// A binary operation: left op right.
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// A unary operation, prefix or postfix.
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// cond ? then_branch : else_branch
    Conditional {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },

    /// A function call like concat(a, b).
    FunctionCall { name: String, args: Vec<Expression> },

    /// A parenthesized subexpression.
    Grouped(Box<Expression>),
}

/// Literal values that can appear in expressions.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    /// Decimal text as written, e.g. "1.5e-3".
    Number(String),
    String(String),
    /// Raw text of a {...} datetime literal.
    Datetime(String),
}

/// The reserved identifier domains.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum VariableScope {
    /// m.NAME: environment lookup
    Environment,
    /// r.NAME: row/iteration variables such as r.self
    Row,
    /// v.NAME: report variables
    Report,
}

impl VariableScope {
    /// Maps a domain prefix to a scope, if it is one of the reserved ones.
    pub fn from_domain(domain: &str) -> Option<Self> {
        match domain {
            "m" => Some(VariableScope::Environment),
            "r" => Some(VariableScope::Row),
            "v" => Some(VariableScope::Report),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            VariableScope::Environment => "m",
            VariableScope::Row => "r",
            VariableScope::Report => "v",
        }
    }
}

/// Binary operators, lowest precedence group first.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    LogicalOr,  // ||
    LogicalAnd, // &&
    BitOr,      // |
    BitXor,     // ^^
    BitAnd,     // &

    Equal,        // = ==
    NotEqual,     // != <>
    LessThan,     // <
    LessEqual,    // <=
    GreaterThan,  // >
    GreaterEqual, // >=

    ShiftLeft,  // <<
    ShiftRight, // >>

    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Modulo,   // %
    Power,    // ^ (right associative)
}

impl BinaryOperator {
    /// Name of the builtin function implementing this operator.
    pub fn function_name(&self) -> &'static str {
        match self {
            BinaryOperator::LogicalOr => "lor",
            BinaryOperator::LogicalAnd => "land",
            BinaryOperator::BitOr => "or",
            BinaryOperator::BitXor => "xor",
            BinaryOperator::BitAnd => "and",
            BinaryOperator::Equal => "eq",
            BinaryOperator::NotEqual => "ne",
            BinaryOperator::LessThan => "lt",
            BinaryOperator::LessEqual => "le",
            BinaryOperator::GreaterThan => "gt",
            BinaryOperator::GreaterEqual => "ge",
            BinaryOperator::ShiftLeft => "shl",
            BinaryOperator::ShiftRight => "shr",
            BinaryOperator::Add => "add",
            BinaryOperator::Subtract => "sub",
            BinaryOperator::Multiply => "mul",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "remainder",
            BinaryOperator::Power => "pow",
        }
    }
}

/// Unary operators.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOperator {
    Negate,        // -x
    Plus,          // +x
    LogicalNot,    // !x
    BitNot,        // ~x
    PreIncrement,  // ++x
    PreDecrement,  // --x
    PostIncrement, // x++
    PostDecrement, // x--
}

impl UnaryOperator {
    /// Name of the builtin implementing this operator. Unary plus is a no-op.
    pub fn function_name(&self) -> Option<&'static str> {
        match self {
            UnaryOperator::Negate => Some("uminus"),
            UnaryOperator::Plus => None,
            UnaryOperator::LogicalNot => Some("lnot"),
            UnaryOperator::BitNot => Some("not"),
            UnaryOperator::PreIncrement | UnaryOperator::PostIncrement => Some("inc"),
            UnaryOperator::PreDecrement | UnaryOperator::PostDecrement => Some("dec"),
        }
    }

    pub fn is_postfix(&self) -> bool {
        matches!(
            self,
            UnaryOperator::PostIncrement | UnaryOperator::PostDecrement
        )
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::LogicalOr => write!(f, "||"),
            BinaryOperator::LogicalAnd => write!(f, "&&"),
            BinaryOperator::BitOr => write!(f, "|"),
            BinaryOperator::BitXor => write!(f, "^^"),
            BinaryOperator::BitAnd => write!(f, "&"),
            BinaryOperator::Equal => write!(f, "="),
            BinaryOperator::NotEqual => write!(f, "!="),
            BinaryOperator::LessThan => write!(f, "<"),
            BinaryOperator::LessEqual => write!(f, "<="),
            BinaryOperator::GreaterThan => write!(f, ">"),
            BinaryOperator::GreaterEqual => write!(f, ">="),
            BinaryOperator::ShiftLeft => write!(f, "<<"),
            BinaryOperator::ShiftRight => write!(f, ">>"),
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Subtract => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Divide => write!(f, "/"),
            BinaryOperator::Modulo => write!(f, "%"),
            BinaryOperator::Power => write!(f, "^"),
        }
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Plus => write!(f, "+"),
            UnaryOperator::LogicalNot => write!(f, "!"),
            UnaryOperator::BitNot => write!(f, "~"),
            UnaryOperator::PreIncrement | UnaryOperator::PostIncrement => write!(f, "++"),
            UnaryOperator::PreDecrement | UnaryOperator::PostDecrement => write!(f, "--"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Datetime(s) => write!(f, "{{{}}}", s),
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(v) => write!(f, "{}", v),
            Expression::Identifier {
                domain,
                name,
                dot_prefixed,
            } => match domain {
                Some(d) => write!(f, "{}.{}", d, name),
                None if *dot_prefixed => write!(f, ".{}", name),
                None => write!(f, "{}", name),
            },
            Expression::Variable { scope, name } => write!(f, "{}.{}", scope.prefix(), name),
            Expression::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expression::UnaryOp { op, operand } => {
                if op.is_postfix() {
                    write!(f, "{}{}", operand, op)
                } else {
                    write!(f, "{}{}", op, operand)
                }
            }
            Expression::Conditional {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "{} ? {} : {}", condition, then_branch, else_branch),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Grouped(inner) => write!(f, "({})", inner),
        }
    }
}

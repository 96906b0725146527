//! FILENAME: engine/src/functions/mod.rs
//! PURPOSE: The function table: builtin functions plus user-registered ones.
//! CONTEXT: Every operator of the expression language is a function call
//! (`a + b` is `add(a, b)`). Builtins form a closed enum dispatched by
//! `match`; a report may register further functions at runtime, and those
//! are looked up before the builtins so they can shadow them.
//!
//! Each function declares its arity and the algebraic properties the
//! optimizer relies on: commutative, associative, left-associative, and
//! "don't optimize" for functions whose value is not a pure function of
//! their operands (random, rownum, ...).

mod arithmetic;
mod compare;
mod datetime;
mod format;
mod math;
mod strings;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::evaluator::EvalEnv;
use crate::value::{ResultValue, ValueKind};

pub use format::format_values;

/// Outcome of a builtin. `Err` carries an early result: a re-surfaced
/// operand error, an "invalid operand(s)" error or a typed null.
pub(crate) type FnResult = Result<ResultValue, ResultValue>;

/// How many operands a function takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => *n == count,
            Arity::Variadic => true,
        }
    }
}

/// Algebraic properties used by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionProperties {
    pub commutative: bool,
    pub associative: bool,
    pub left_associative: bool,
    pub dont_optimize: bool,
}

impl FunctionProperties {
    const PLAIN: FunctionProperties = FunctionProperties {
        commutative: false,
        associative: false,
        left_associative: false,
        dont_optimize: false,
    };
    const COMM_ASSOC: FunctionProperties = FunctionProperties {
        commutative: true,
        associative: true,
        left_associative: false,
        dont_optimize: false,
    };
    const COMMUTATIVE: FunctionProperties = FunctionProperties {
        commutative: true,
        associative: false,
        left_associative: false,
        dont_optimize: false,
    };
    const COMM_ASSOC_LEFT: FunctionProperties = FunctionProperties {
        commutative: true,
        associative: true,
        left_associative: true,
        dont_optimize: false,
    };
    const LEFT_ASSOC: FunctionProperties = FunctionProperties {
        commutative: false,
        associative: false,
        left_associative: true,
        dont_optimize: false,
    };
    const VOLATILE: FunctionProperties = FunctionProperties {
        commutative: false,
        associative: false,
        left_associative: false,
        dont_optimize: true,
    };
}

/// The builtin functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Uminus,
    Abs,
    Inc,
    Dec,
    Remainder,
    Fmod,
    Pow,
    Factorial,
    Sqr,
    Sqrt,
    Ceil,
    Floor,
    Round,
    Trunc,
    Rint,
    // Logic and bitwise
    Land,
    Lor,
    Lnot,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    // Comparison and conversion
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Iif,
    Val,
    Isnull,
    Null,
    Nulldt,
    Nulln,
    Nulls,
    Error,
    // Strings
    Concat,
    Left,
    Right,
    Mid,
    Lower,
    Upper,
    Proper,
    Strlen,
    Str,
    Fxpval,
    Format,
    Printf,
    Translate,
    Translate2,
    // Datetime
    Stodt,
    Dtos,
    Dtosf,
    Date,
    Now,
    Year,
    Month,
    Day,
    Dim,
    Wiy,
    Wiy1,
    Wiyo,
    Stdwiy,
    Dateof,
    Timeof,
    Chgdateof,
    Chgtimeof,
    Gettimeinsecs,
    Settimeinsecs,
    Interval,
    // Math
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sec,
    Csc,
    Cot,
    Log,
    Log2,
    Log10,
    Exp,
    Exp2,
    Exp10,
    // Row state
    Random,
    Rownum,
    Brrownum,
    Prevval,
}

/// A row of the builtin table.
#[derive(Debug)]
pub struct FunctionInfo {
    pub name: &'static str,
    pub builtin: Builtin,
    pub arity: Arity,
    pub properties: FunctionProperties,
}

macro_rules! builtin {
    ($name:expr, $variant:ident, $arity:expr, $props:ident) => {
        FunctionInfo {
            name: $name,
            builtin: Builtin::$variant,
            arity: $arity,
            properties: FunctionProperties::$props,
        }
    };
}

use Arity::{Exact, Variadic};

/// Sorted by name. Aliases (ln, mod, stod, ...) share a variant.
static BUILTINS: &[FunctionInfo] = &[
    builtin!("abs", Abs, Exact(1), PLAIN),
    builtin!("acos", Acos, Exact(1), PLAIN),
    builtin!("add", Add, Variadic, COMM_ASSOC),
    builtin!("and", And, Variadic, COMM_ASSOC),
    builtin!("asin", Asin, Exact(1), PLAIN),
    builtin!("atan", Atan, Exact(1), PLAIN),
    builtin!("brrownum", Brrownum, Exact(1), VOLATILE),
    builtin!("ceil", Ceil, Exact(1), PLAIN),
    builtin!("chgdateof", Chgdateof, Exact(2), PLAIN),
    builtin!("chgtimeof", Chgtimeof, Exact(2), PLAIN),
    builtin!("concat", Concat, Variadic, PLAIN),
    builtin!("cos", Cos, Exact(1), PLAIN),
    builtin!("cot", Cot, Exact(1), PLAIN),
    builtin!("csc", Csc, Exact(1), PLAIN),
    builtin!("date", Date, Exact(0), VOLATILE),
    builtin!("dateof", Dateof, Exact(1), PLAIN),
    builtin!("day", Day, Exact(1), PLAIN),
    builtin!("dec", Dec, Exact(1), PLAIN),
    builtin!("dim", Dim, Exact(1), PLAIN),
    builtin!("div", Div, Variadic, LEFT_ASSOC),
    builtin!("dtos", Dtos, Exact(1), PLAIN),
    builtin!("dtosf", Dtosf, Exact(2), PLAIN),
    builtin!("eq", Eq, Exact(2), COMMUTATIVE),
    builtin!("error", Error, Exact(1), PLAIN),
    builtin!("exp", Exp, Exact(1), PLAIN),
    builtin!("exp10", Exp10, Exact(1), PLAIN),
    builtin!("exp2", Exp2, Exact(1), PLAIN),
    builtin!("factorial", Factorial, Exact(1), PLAIN),
    builtin!("floor", Floor, Exact(1), PLAIN),
    builtin!("fmod", Fmod, Exact(2), PLAIN),
    builtin!("format", Format, Exact(2), PLAIN),
    builtin!("fxpval", Fxpval, Exact(2), PLAIN),
    builtin!("ge", Ge, Exact(2), PLAIN),
    builtin!("gettimeinsecs", Gettimeinsecs, Exact(1), PLAIN),
    builtin!("gt", Gt, Exact(2), PLAIN),
    builtin!("iif", Iif, Exact(3), PLAIN),
    builtin!("inc", Inc, Exact(1), PLAIN),
    builtin!("interval", Interval, Variadic, PLAIN),
    builtin!("isnull", Isnull, Exact(1), PLAIN),
    builtin!("land", Land, Variadic, COMM_ASSOC),
    builtin!("le", Le, Exact(2), PLAIN),
    builtin!("left", Left, Exact(2), PLAIN),
    builtin!("ln", Log, Exact(1), PLAIN),
    builtin!("lnot", Lnot, Exact(1), PLAIN),
    builtin!("log", Log, Exact(1), PLAIN),
    builtin!("log10", Log10, Exact(1), PLAIN),
    builtin!("log2", Log2, Exact(1), PLAIN),
    builtin!("lor", Lor, Variadic, COMM_ASSOC),
    builtin!("lower", Lower, Exact(1), PLAIN),
    builtin!("lt", Lt, Exact(2), PLAIN),
    builtin!("mid", Mid, Exact(3), PLAIN),
    builtin!("mod", Remainder, Exact(2), PLAIN),
    builtin!("month", Month, Exact(1), PLAIN),
    builtin!("mul", Mul, Variadic, COMM_ASSOC),
    builtin!("ne", Ne, Exact(2), COMMUTATIVE),
    builtin!("not", Not, Exact(1), PLAIN),
    builtin!("now", Now, Exact(0), VOLATILE),
    builtin!("null", Null, Exact(1), PLAIN),
    builtin!("nulldt", Nulldt, Exact(0), PLAIN),
    builtin!("nulln", Nulln, Exact(0), PLAIN),
    builtin!("nulls", Nulls, Exact(0), PLAIN),
    builtin!("or", Or, Variadic, COMM_ASSOC),
    builtin!("pow", Pow, Exact(2), PLAIN),
    builtin!("prevval", Prevval, Exact(1), VOLATILE),
    builtin!("printf", Printf, Variadic, PLAIN),
    builtin!("proper", Proper, Exact(1), PLAIN),
    builtin!("random", Random, Exact(0), VOLATILE),
    builtin!("remainder", Remainder, Exact(2), PLAIN),
    builtin!("right", Right, Exact(2), PLAIN),
    builtin!("rint", Rint, Exact(1), PLAIN),
    builtin!("round", Round, Exact(1), PLAIN),
    builtin!("rownum", Rownum, Variadic, VOLATILE),
    builtin!("sec", Sec, Exact(1), PLAIN),
    builtin!("settimeinsecs", Settimeinsecs, Exact(2), PLAIN),
    builtin!("shl", Shl, Exact(2), PLAIN),
    builtin!("shr", Shr, Exact(2), PLAIN),
    builtin!("sin", Sin, Exact(1), PLAIN),
    builtin!("sqr", Sqr, Exact(1), PLAIN),
    builtin!("sqrt", Sqrt, Exact(1), PLAIN),
    builtin!("stdwiy", Stdwiy, Exact(1), PLAIN),
    builtin!("stod", Stodt, Exact(1), PLAIN),
    builtin!("stodt", Stodt, Exact(1), PLAIN),
    builtin!("stodtsql", Stodt, Exact(1), PLAIN),
    builtin!("str", Str, Exact(3), PLAIN),
    builtin!("strlen", Strlen, Exact(1), PLAIN),
    builtin!("sub", Sub, Variadic, LEFT_ASSOC),
    builtin!("tan", Tan, Exact(1), PLAIN),
    builtin!("timeof", Timeof, Exact(1), PLAIN),
    builtin!("translate", Translate, Exact(1), PLAIN),
    builtin!("translate2", Translate2, Exact(3), PLAIN),
    builtin!("trunc", Trunc, Exact(1), PLAIN),
    builtin!("tstod", Stodt, Exact(1), PLAIN),
    builtin!("uminus", Uminus, Exact(1), PLAIN),
    builtin!("upper", Upper, Exact(1), PLAIN),
    builtin!("val", Val, Exact(1), PLAIN),
    builtin!("wiy", Wiy, Exact(1), PLAIN),
    builtin!("wiy1", Wiy1, Exact(1), PLAIN),
    builtin!("wiyo", Wiyo, Exact(2), PLAIN),
    builtin!("xor", Xor, Variadic, COMM_ASSOC_LEFT),
    builtin!("year", Year, Exact(1), PLAIN),
];

static BUILTIN_INDEX: Lazy<FxHashMap<&'static str, &'static FunctionInfo>> =
    Lazy::new(|| BUILTINS.iter().map(|info| (info.name, info)).collect());

/// Looks up a builtin by (case-insensitive) name.
pub fn builtin_info(name: &str) -> Option<&'static FunctionInfo> {
    BUILTIN_INDEX.get(name.to_ascii_lowercase().as_str()).copied()
}

/// All builtin names, aliases included.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|info| info.name)
}

// ========================================
// USER FUNCTIONS
// ========================================

/// Signature of a user-registered function. Operands are already
/// evaluated; the function never sees unevaluated subtrees.
pub type NativeFunction =
    dyn Fn(&[&ResultValue], &EvalEnv<'_>) -> ResultValue + Send + Sync;

/// A function registered on a report at runtime.
pub struct UserFunction {
    pub name: String,
    pub arity: Arity,
    pub properties: FunctionProperties,
    callback: Box<NativeFunction>,
}

impl UserFunction {
    pub fn new<F>(name: &str, arity: Arity, properties: FunctionProperties, callback: F) -> Self
    where
        F: Fn(&[&ResultValue], &EvalEnv<'_>) -> ResultValue + Send + Sync + 'static,
    {
        UserFunction {
            name: name.to_ascii_lowercase(),
            arity,
            properties,
            callback: Box::new(callback),
        }
    }

    pub fn call(&self, args: &[&ResultValue], env: &EvalEnv<'_>) -> ResultValue {
        (self.callback)(args, env)
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("properties", &self.properties)
            .finish()
    }
}

/// A resolved function of an expression node.
#[derive(Debug, Clone)]
pub enum FunctionRef {
    Builtin(&'static FunctionInfo),
    User(Arc<UserFunction>),
}

impl FunctionRef {
    pub fn name(&self) -> &str {
        match self {
            FunctionRef::Builtin(info) => info.name,
            FunctionRef::User(f) => &f.name,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            FunctionRef::Builtin(info) => info.arity,
            FunctionRef::User(f) => f.arity,
        }
    }

    pub fn properties(&self) -> FunctionProperties {
        match self {
            FunctionRef::Builtin(info) => info.properties,
            FunctionRef::User(f) => f.properties,
        }
    }

    pub fn builtin(&self) -> Option<Builtin> {
        match self {
            FunctionRef::Builtin(info) => Some(info.builtin),
            FunctionRef::User(_) => None,
        }
    }

    /// Same function: the same builtin variant or the same registration.
    pub fn same_as(&self, other: &FunctionRef) -> bool {
        match (self, other) {
            (FunctionRef::Builtin(a), FunctionRef::Builtin(b)) => a.builtin == b.builtin,
            (FunctionRef::User(a), FunctionRef::User(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Calls the function on evaluated operands.
    pub fn call(&self, args: &[&ResultValue], env: &EvalEnv<'_>) -> ResultValue {
        if !self.arity().accepts(args.len()) {
            return ResultValue::invalid_operands();
        }
        match self {
            FunctionRef::Builtin(info) => {
                dispatch(info.builtin, args, env).unwrap_or_else(|early| early)
            }
            FunctionRef::User(f) => f.call(args, env),
        }
    }
}

/// The per-report function table: user functions first, then builtins.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    user: FxHashMap<String, Arc<UserFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a user function.
    pub fn register(&mut self, function: UserFunction) {
        log::debug!("registering user function '{}'", function.name);
        self.user.insert(function.name.clone(), Arc::new(function));
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionRef> {
        let lower = name.to_ascii_lowercase();
        if let Some(f) = self.user.get(&lower) {
            return Some(FunctionRef::User(Arc::clone(f)));
        }
        builtin_info(&lower).map(FunctionRef::Builtin)
    }
}

// ========================================
// DISPATCH
// ========================================

fn dispatch(builtin: Builtin, args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    use Builtin as B;
    match builtin {
        B::Add => arithmetic::add(args, env),
        B::Sub => arithmetic::sub(args, env),
        B::Mul => arithmetic::mul(args, env),
        B::Div => arithmetic::div(args, env),
        B::Uminus => arithmetic::uminus(args),
        B::Abs => arithmetic::abs(args),
        B::Inc => arithmetic::step(args, env, 1),
        B::Dec => arithmetic::step(args, env, -1),
        B::Remainder | B::Fmod => arithmetic::remainder(args, env),
        B::Pow => arithmetic::pow(args, env),
        B::Factorial => arithmetic::factorial(args, env),
        B::Sqr => arithmetic::sqr(args, env),
        B::Sqrt => arithmetic::sqrt(args, env),
        B::Ceil => arithmetic::unary_number(args, |n| n.ceil()),
        B::Floor => arithmetic::unary_number(args, |n| n.floor()),
        B::Round => arithmetic::unary_number(args, |n| n.round()),
        B::Trunc => arithmetic::unary_number(args, |n| n.trunc()),
        B::Rint => {
            let ctx = env.numeric;
            arithmetic::unary_number(args, |n| n.rint(ctx))
        }
        B::Land => arithmetic::logical(args, true),
        B::Lor => arithmetic::logical(args, false),
        B::Lnot => arithmetic::lnot(args),
        B::And => arithmetic::bitwise(args, |a, b| a & b),
        B::Or => arithmetic::bitwise(args, |a, b| a | b),
        B::Xor => arithmetic::bitwise(args, |a, b| a ^ b),
        B::Not => arithmetic::not(args),
        B::Shl => arithmetic::shift(args, true),
        B::Shr => arithmetic::shift(args, false),
        B::Random => arithmetic::random(env),

        B::Eq => compare::equality(args, |o| o.is_eq()),
        B::Ne => compare::equality(args, |o| o.is_ne()),
        B::Lt => compare::ordering(args, |o| o.is_lt()),
        B::Le => compare::ordering(args, |o| o.is_le()),
        B::Gt => compare::ordering(args, |o| o.is_gt()),
        B::Ge => compare::ordering(args, |o| o.is_ge()),
        B::Iif => compare::iif(args, env),
        B::Val => compare::val(args, env),
        B::Isnull => compare::isnull(args),
        B::Null => compare::null(args),
        B::Nulldt => Ok(ResultValue::null(ValueKind::Datetime)),
        B::Nulln => Ok(ResultValue::null(ValueKind::Number)),
        B::Nulls => Ok(ResultValue::null(ValueKind::String)),
        B::Error => compare::error(args),

        B::Concat => strings::concat(args),
        B::Left => strings::left(args, env),
        B::Right => strings::right(args, env),
        B::Mid => strings::mid(args, env),
        B::Lower => strings::map_string(args, |s| s.to_lowercase()),
        B::Upper => strings::map_string(args, |s| s.to_uppercase()),
        B::Proper => strings::map_string(args, strings::proper_case),
        B::Strlen => strings::strlen(args),
        B::Str => strings::str(args, env),
        B::Fxpval => strings::fxpval(args, env),
        B::Format => format::format(args, env),
        B::Printf => format::printf(args, env),
        B::Translate => strings::translate(args),
        B::Translate2 => strings::translate2(args),

        B::Stodt => datetime::stodt(args, env),
        B::Dtos => datetime::dtos(args, env),
        B::Dtosf => format::dtosf(args, env),
        B::Date => Ok(ResultValue::datetime(env.clock.today())),
        B::Now => Ok(ResultValue::datetime(env.clock.now())),
        B::Year => datetime::date_part(args, |dt| i64::from(dt.year)),
        B::Month => datetime::date_part(args, |dt| i64::from(dt.month)),
        B::Day => datetime::date_part(args, |dt| i64::from(dt.day)),
        B::Dim => datetime::dim(args),
        B::Wiy => datetime::week_of_year(args, datetime::WeekStart::Sunday),
        B::Wiy1 => datetime::week_of_year(args, datetime::WeekStart::Monday),
        B::Wiyo => datetime::wiyo(args, env),
        B::Stdwiy => datetime::week_of_year(args, datetime::WeekStart::Iso),
        B::Dateof => datetime::dateof(args),
        B::Timeof => datetime::timeof(args),
        B::Chgdateof => datetime::chgdateof(args),
        B::Chgtimeof => datetime::chgtimeof(args),
        B::Gettimeinsecs => datetime::gettimeinsecs(args),
        B::Settimeinsecs => datetime::settimeinsecs(args, env),
        B::Interval => datetime::interval(args, env),

        B::Sin => math::apply(args, env, f64::sin),
        B::Cos => math::apply(args, env, f64::cos),
        B::Tan => math::apply(args, env, f64::tan),
        B::Asin => math::apply(args, env, f64::asin),
        B::Acos => math::apply(args, env, f64::acos),
        B::Atan => math::apply(args, env, f64::atan),
        B::Sec => math::apply(args, env, |x| 1.0 / x.cos()),
        B::Csc => math::apply(args, env, |x| 1.0 / x.sin()),
        B::Cot => math::apply(args, env, |x| 1.0 / x.tan()),
        B::Log => math::apply(args, env, f64::ln),
        B::Log2 => math::apply(args, env, f64::log2),
        B::Log10 => math::apply(args, env, f64::log10),
        B::Exp => math::apply(args, env, f64::exp),
        B::Exp2 => math::apply(args, env, f64::exp2),
        B::Exp10 => math::apply(args, env, |x| 10f64.powf(x)),

        B::Rownum => row_counter(args, env, RowCounter::Query),
        B::Brrownum => row_counter(args, env, RowCounter::Break),
        // The evaluator answers prevval() from the operand's Previous slot.
        B::Prevval => Err(ResultValue::error("Subexpression has no previous result")),
    }
}

// ========================================
// SHARED OPERAND CHECKS
// ========================================

/// Re-surfaces the first Error operand.
pub(crate) fn surface_errors(args: &[&ResultValue]) -> Result<(), ResultValue> {
    match args.iter().find_map(|a| a.error_message()) {
        Some(message) => Err(ResultValue::error(message)),
        None => Ok(()),
    }
}

/// Fails with "invalid operand(s)" unless every operand has `kind`.
pub(crate) fn require_kind(args: &[&ResultValue], kind: ValueKind) -> Result<(), ResultValue> {
    if args.iter().all(|a| a.kind() == kind) {
        Ok(())
    } else {
        Err(ResultValue::invalid_operands())
    }
}

/// Returns a null of `kind` early if any operand is null.
pub(crate) fn null_if_any(args: &[&ResultValue], kind: ValueKind) -> Result<(), ResultValue> {
    if args.iter().any(|a| a.is_null()) {
        Err(ResultValue::null(kind))
    } else {
        Ok(())
    }
}

/// The common prologue: errors, then kinds, then nulls.
pub(crate) fn check_all(
    args: &[&ResultValue],
    operand_kind: ValueKind,
    result_kind: ValueKind,
) -> Result<(), ResultValue> {
    surface_errors(args)?;
    require_kind(args, operand_kind)?;
    null_if_any(args, result_kind)
}

pub(crate) fn at_least(args: &[&ResultValue], count: usize) -> Result<(), ResultValue> {
    if args.len() < count {
        Err(ResultValue::invalid_operands())
    } else {
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum RowCounter {
    Query,
    Break,
}

/// rownum() and brrownum() with an operand that was not constant when the
/// expression was resolved: look the counter up by name now.
fn row_counter(args: &[&ResultValue], env: &EvalEnv<'_>, counter: RowCounter) -> FnResult {
    let name = match (counter, args) {
        (RowCounter::Query, []) => None,
        (_, [arg]) => {
            surface_errors(args)?;
            require_kind(args, ValueKind::String)?;
            arg.as_str()
        }
        _ => return Err(ResultValue::invalid_operands()),
    };

    let source = match counter {
        RowCounter::Query => env.scope.resolve_query_row_number(name),
        RowCounter::Break => name.and_then(|n| env.scope.resolve_break_row_number(n)),
    };

    match source.and_then(|s| env.scope.lookup(&s, env.slot)) {
        Some(value) => Ok(value.into_owned()),
        None => Err(ResultValue::error(match counter {
            RowCounter::Query => "rownum(): no such query",
            RowCounter::Break => "brrownum(): no such break",
        })),
    }
}

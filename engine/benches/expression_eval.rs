//! FILENAME: engine/benches/expression_eval.rs
//! PURPOSE: Compares evaluation cost of compiled expressions before and
//! after optimization, and over a query-backed scope.
//!
//! Run with: cargo bench -p engine --bench expression_eval

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use engine::{
    compile_str, optimize, resolve, ArrayTable, Clock, DateOrder, EmptyScope, EngineContext, EvalEnv,
    FunctionRegistry, NumericContext, ValueKind,
};

const EXPRESSIONS: &[(&str, &str)] = &[
    ("arithmetic", "1 + 2 * 3 - 4 / 5 + 6 * (7 - 8)"),
    ("strings", "upper(left('hello' + ' ' + 'world', 7)) + proper('rEPORT')"),
    ("datetime", "{2023-01-31} + interval('1 month') + interval('1 month')"),
    ("mixed_constants", "1 + rownum() + 2 + 3"),
];

fn bench_plain_vs_optimized(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let registry = FunctionRegistry::new();
    let numeric = NumericContext::default();
    let clock = Clock::new();
    let env = EvalEnv::new(&numeric, DateOrder::DayFirst, &clock, &EmptyScope);

    for (name, text) in EXPRESSIONS {
        let mut plain = match compile_str(text, &registry, &numeric, DateOrder::DayFirst) {
            Ok(expr) => expr,
            Err(_) => continue,
        };
        resolve(&mut plain, &EmptyScope);
        let mut fast = plain.clone();
        optimize(&mut fast, &numeric, DateOrder::DayFirst);

        group.bench_with_input(BenchmarkId::new("plain", name), text, |b, _| {
            b.iter(|| black_box(plain.evaluate(&env)).is_error())
        });
        group.bench_with_input(BenchmarkId::new("optimized", name), text, |b, _| {
            b.iter(|| black_box(fast.evaluate(&env)).is_error())
        });
    }
    group.finish();
}

fn bench_query_scan(c: &mut Criterion) {
    let mut ctx = EngineContext::default();
    if ctx.add_datasource("bench", "array").is_err() {
        return;
    }
    let mut rows: Vec<Vec<String>> = vec![vec!["n".to_string(), "label".to_string()]];
    rows.extend((0..1000).map(|i| vec![i.to_string(), format!("row {}", i)]));
    let borrowed: Vec<Vec<&str>> = rows.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
    let slices: Vec<&[&str]> = borrowed.iter().map(Vec::as_slice).collect();
    let table = ArrayTable::from_rows(&slices).with_types(&[ValueKind::Number, ValueKind::String]);
    let query = match ctx.add_query_array("numbers", "bench", table) {
        Ok(id) => id,
        Err(_) => return,
    };

    let mut expr = match ctx.compiler().compile_str("n * 2 + strlen(label)") {
        Ok(expr) => expr,
        Err(_) => return,
    };
    resolve(&mut expr, &ctx.query_scope(Some(query)));

    c.bench_function("scan_1000_rows", |b| {
        b.iter(|| {
            let mut total = 0usize;
            if ctx.navigate_start(query).is_err() {
                return total;
            }
            while let Ok(true) = ctx.navigate_next(query) {
                let scope = ctx.query_scope(Some(query));
                let env = ctx.settings().env(&scope);
                total += black_box(expr.evaluate(&env)).to_string().len();
            }
            total
        })
    });
}

criterion_group!(benches, bench_plain_vs_optimized, bench_query_scan);
criterion_main!(benches);

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lookahead::{
    BoundEvaluator, Dataset, EvaluationStrategy, EvaluatorConfig, SearchContext, TabulatedBound,
};

fn benchmark_strategies(c: &mut Criterion) {
    let data = Dataset::unlabeled(1);
    let ctx = SearchContext::new(&data, &[], &[], &[0]).expect("valid context");
    let oracle = TabulatedBound::new((0..=16).map(|k| (k as f64 + 1.0) / 18.0).collect())
        .expect("non-empty table");

    let mut group = c.benchmark_group("lookahead_bound");
    for lookahead in [4_usize, 8, 12] {
        for strategy in [
            EvaluationStrategy::Recursive,
            EvaluationStrategy::Parallel,
            EvaluationStrategy::Table,
        ] {
            let evaluator = BoundEvaluator::new(EvaluatorConfig {
                strategy,
                ..EvaluatorConfig::default()
            });
            let id = BenchmarkId::new(format!("{strategy:?}"), lookahead);
            group.bench_with_input(id, &lookahead, |b, &depth| {
                b.iter(|| {
                    let estimate = evaluator
                        .evaluate(&ctx, &oracle, black_box(depth), 0)
                        .expect("bound evaluation");
                    black_box(estimate.bound);
                });
            });
        }
    }
    group.finish();
}

criterion_group!(lookahead_bound, benchmark_strategies);
criterion_main!(lookahead_bound);

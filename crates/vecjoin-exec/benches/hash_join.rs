use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use vecjoin_exec::{BatchSource, HashJoinConfig, HashJoiner, HashJoinerSpec, JoinType, Operator};
use vecjoin_types::{ColumnSpec, ColumnVectorType, Cx, DEFAULT_BATCH_ROW_CAPACITY, Value};

fn specs(prefix: &str) -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(format!("{prefix}_key"), ColumnVectorType::Int64),
        ColumnSpec::new(format!("{prefix}_name"), ColumnVectorType::Text),
    ]
}

/// `row_count` rows whose keys repeat every `distinct_keys` rows.
fn rows(row_count: usize, distinct_keys: usize) -> Vec<Vec<Value>> {
    (0..row_count)
        .map(|idx| {
            let key = i64::try_from(idx % distinct_keys).expect("key should fit into i64");
            vec![Value::Integer(key), Value::Text(format!("row-{idx:06}"))]
        })
        .collect()
}

#[derive(Clone, Debug)]
struct JoinFixture {
    right_distinct: bool,
    left: Vec<Vec<Value>>,
    right: Vec<Vec<Value>>,
}

fn run_join(fixture: &JoinFixture) -> usize {
    let spec = HashJoinerSpec::new(
        JoinType::Inner,
        &[0],
        &[0],
        specs("l"),
        specs("r"),
        fixture.right_distinct,
    )
    .expect("spec should validate");
    let left = BatchSource::from_rows(specs("l"), &fixture.left, DEFAULT_BATCH_ROW_CAPACITY)
        .expect("left source should build");
    let right = BatchSource::from_rows(specs("r"), &fixture.right, DEFAULT_BATCH_ROW_CAPACITY)
        .expect("right source should build");
    let mut joiner = HashJoiner::with_config(spec, HashJoinConfig::default(), left, right)
        .expect("joiner should initialize");
    let cx = Cx::new();
    joiner.init().expect("init should succeed");
    let mut produced = 0usize;
    loop {
        let batch = joiner.next_batch(&cx).expect("join should succeed");
        if batch.is_empty() {
            break;
        }
        produced = produced.saturating_add(batch.len());
    }
    produced
}

fn bench_hash_join_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_join_probe");

    for row_count in [4_096_usize, 16_384_usize] {
        let cases = [
            (
                "distinct",
                JoinFixture {
                    right_distinct: true,
                    left: rows(row_count, row_count),
                    right: rows(row_count, row_count),
                },
            ),
            (
                "duplicate",
                JoinFixture {
                    right_distinct: false,
                    left: rows(row_count, row_count / 4),
                    right: rows(row_count / 4, row_count / 16),
                },
            ),
        ];
        for (label, fixture) in cases {
            let probe_rows = u64::try_from(fixture.left.len()).unwrap_or(u64::MAX);
            group.throughput(Throughput::Elements(probe_rows));
            group.bench_with_input(
                BenchmarkId::new(label, row_count),
                &fixture,
                |b, fixture| {
                    b.iter(|| criterion::black_box(run_join(fixture)));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_hash_join_probe);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livebuffer::*;

/// A buffer of `count` slots with every `stride`-th slot populated.
fn sparse_buffer(count: usize, stride: usize, storage: StorageHint) -> Buffer {
    let mut buffer = Buffer::with_count(count, storage);
    for index in (0..count).step_by(stride) {
        buffer.fill(index, vec![Row::new(index as u64 + 1, index as f64 + 1.0)]);
    }
    buffer
}

fn dense_buffer(count: usize, storage: StorageHint) -> Buffer {
    let mut buffer = Buffer::with_count(count, storage);
    let rows = (0..count).map(|i| Row::new(i as u64 + 1, i as f64 + 1.0)).collect();
    buffer.fill(0, rows);
    buffer
}

fn bench_range_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_plan");

    for size in [1_000, 10_000, 100_000].iter() {
        let buffer = sparse_buffer(*size, 7, StorageHint::FastReads);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let start = black_box(size / 2);
                RangeCalculator::plan(&buffer, 100, start, start + 40)
            });
        });
    }
    group.finish();
}

fn bench_locate_insertion_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_insertion_point");
    let comparator = RowComparator::by_order();

    for size in [1_000, 10_000, 50_000].iter() {
        let buffer = dense_buffer(*size, StorageHint::FastReads);
        let candidate = Row::new(u64::MAX, *size as f64 / 2.0 + 0.5);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| RowIndexResolver::locate_insertion_point(&buffer, &comparator, black_box(&candidate)));
        });
    }
    group.finish();
}

fn bench_reconcile_create_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_create_delete");
    let view = ViewContext::new(Vec::new(), ViewDefinition::default());

    for storage in [StorageHint::FastReads, StorageHint::FastUpdates] {
        let label = format!("{:?}", storage);
        group.bench_function(BenchmarkId::new(label, 10_000), |b| {
            let mut buffer = sparse_buffer(10_000, 3, storage);
            let row = Row::new(u64::MAX, 5_000.5);
            b.iter(|| {
                MutationReconciler::row_created(&mut buffer, &view, black_box(row.clone()));
                MutationReconciler::row_deleted(&mut buffer, &view, black_box(&row));
            });
        });
    }
    group.finish();
}

fn bench_reconcile_update_reposition(c: &mut Criterion) {
    let view = ViewContext::new(Vec::new(), ViewDefinition::default());

    c.bench_function("reconcile_update_reposition", |b| {
        let mut buffer = dense_buffer(10_000, StorageHint::FastUpdates);
        let mut current = Row::new(1, 1.0);
        let mut flip = false;
        b.iter(|| {
            let order = if flip { 1.0 } else { 9_999.5 };
            flip = !flip;
            let moved = Row::new(1, order);
            MutationReconciler::row_updated(&mut buffer, &view, &current, black_box(moved.clone()));
            current = moved;
        });
    });
}

fn bench_sequence_insert_middle(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_insert_middle");

    for size in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("array", size), size, |b, &size| {
            b.iter(|| {
                let mut seq = ArraySequence::filled(0u32, size);
                for i in 0..100 {
                    seq.insert(size / 2, black_box(i)).unwrap();
                }
            });
        });
        group.bench_with_input(BenchmarkId::new("tiered", size), size, |b, &size| {
            b.iter(|| {
                let mut seq = TieredVectorSequence::filled(0u32, size);
                for i in 0..100 {
                    seq.insert(size / 2, black_box(i)).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_bucket_migration(c: &mut Criterion) {
    let fields = vec![Field::new(
        1,
        "status",
        FieldType::SingleSelect {
            options: vec![SelectOption::new(1, "A"), SelectOption::new(2, "B")],
        },
    )];
    let view = ViewContext::new(fields, ViewDefinition::default());

    c.bench_function("bucket_migration", |b| {
        let mut partitioner = Partitioner::new(PartitionBy::SingleSelect { field: 1 });
        let rows = (1..=1_000u64)
            .map(|i| Row::new(i, i as f64).with_value(1, FieldValue::SelectOption(1)))
            .collect();
        partitioner.set_bucket(BucketKey::Option(1), 1_000, rows);
        partitioner.set_bucket(BucketKey::Option(2), 0, Vec::new());

        let mut current = Row::new(500, 500.0).with_value(1, FieldValue::SelectOption(1));
        b.iter(|| {
            let target = if current.value(1).as_option_id() == Some(1) { 2 } else { 1 };
            let moved = current.clone().with_value(1, FieldValue::SelectOption(target));
            partitioner.row_updated(&view, &current, black_box(moved.clone()));
            current = moved;
        });
    });
}

criterion_group!(
    benches,
    bench_range_plan,
    bench_locate_insertion_point,
    bench_reconcile_create_delete,
    bench_reconcile_update_reposition,
    bench_sequence_insert_middle,
    bench_bucket_migration,
);
criterion_main!(benches);

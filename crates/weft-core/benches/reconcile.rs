use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_core::{append_child, element, keyed_list, text, NodeId, Signal};
use weft_testing::RenderTestRule;

const LIST_SIZES: &[usize] = &[16, 128, 1024];

fn row(id: &u32) -> NodeId {
    let li = element("li");
    append_child(li, text(&id.to_string())).expect("append label");
    li
}

struct ListFixture {
    rule: RenderTestRule,
    items: Signal<Vec<u32>>,
}

impl ListFixture {
    fn new(size: usize) -> Self {
        let mut rule = RenderTestRule::new();
        let items = Signal::new((0..size as u32).collect::<Vec<_>>());
        {
            let items = items.clone();
            rule.set_content(move || keyed_list(&items, |id: &u32| *id, row))
                .expect("mount list");
        }
        Self { rule, items }
    }
}

fn bench_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_list_unchanged");
    for &size in LIST_SIZES {
        group.bench_with_input(BenchmarkId::new("items", size), &size, |b, _| {
            let fixture = ListFixture::new(size);
            b.iter(|| {
                fixture.items.update(|_| {});
                black_box(fixture.rule.mutation_count());
            });
        });
    }
    group.finish();
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_list_reverse");
    for &size in LIST_SIZES {
        group.bench_with_input(BenchmarkId::new("items", size), &size, |b, _| {
            let fixture = ListFixture::new(size);
            b.iter(|| {
                fixture.items.update(|items| items.reverse());
            });
        });
    }
    group.finish();
}

fn bench_rotate_and_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_list_rotate_replace");
    for &size in LIST_SIZES {
        group.bench_with_input(BenchmarkId::new("items", size), &size, |b, &size| {
            let fixture = ListFixture::new(size);
            let mut next = size as u32;
            b.iter(|| {
                fixture.items.update(|items| {
                    items.remove(0);
                    items.push(next);
                });
                next += 1;
            });
        });
    }
    group.finish();
}

criterion_group!(
    reconcile,
    bench_unchanged,
    bench_reverse,
    bench_rotate_and_replace
);
criterion_main!(reconcile);

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pokedex_rs::view::{filter, page_slice};
use pokedex_rs::{EntityDetail, ViewState};

const TYPES: &[&str] = &["grass", "poison", "fire", "water", "electric", "bug", "normal"];

fn roster(count: usize) -> Vec<EntityDetail> {
    (0..count)
        .map(|i| {
            let first = TYPES[i % TYPES.len()];
            let second = TYPES[(i / TYPES.len()) % TYPES.len()];
            EntityDetail::new(
                format!("creature-{i:05}"),
                Some(format!("https://img/{i}.png")),
                [first, second],
            )
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let entities = roster(1_000);
    for &term in &["", "creature-00", "9", "missing"] {
        c.bench_with_input(BenchmarkId::new("filter::search", term), &term, |b, &term| {
            b.iter(|| black_box(filter(&entities, term, None).len()));
        });
    }
    c.bench_function("filter::search_and_tag", |b| {
        b.iter(|| black_box(filter(&entities, "creature-0", Some("fire")).len()));
    });
}

fn bench_project(c: &mut Criterion) {
    let entities = roster(1_000);
    let state = ViewState::new(12).set_debounced_term("creature").set_tag("water");
    c.bench_function("project::page_one", |b| {
        b.iter(|| black_box(state.project(&entities).items.len()));
    });
    let refs: Vec<_> = entities.iter().collect();
    c.bench_function("page_slice::all_pages", |b| {
        b.iter(|| {
            let mut total = 0usize;
            let mut page = 1;
            loop {
                let slice = page_slice(&refs, page, 12);
                if slice.is_empty() {
                    break;
                }
                total += slice.len();
                page += 1;
            }
            black_box(total)
        });
    });
}

criterion_group!(benches, bench_filter, bench_project);
criterion_main!(benches);

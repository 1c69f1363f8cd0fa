//! Template rendering benchmark suite
//!
//! Rendering runs once per input before its compiles, so it should stay far
//! below compile time even for long generated lists.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use metabench::render::{JinjaEngine, Renderer};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const TYPE_LIST: &str = "\
#include <tuple>
using list = std::tuple<{% for i in range(item) %}std::integral_constant<int, {{ i }}>{% if not loop.last %}, {% endif %}{% endfor %}>;
#ifdef METABENCH
static_assert(std::tuple_size_v<list> == {{ item }});
#endif
";

fn bench_render(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("type_list.cpp.j2");
    fs::write(&template, TYPE_LIST).unwrap();
    let renderer = Renderer::new(JinjaEngine::new());

    let mut group = c.benchmark_group("render");
    for n in [10u64, 100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("type_list", n), &n, |bencher, &n| {
            let item = json!(n);
            bencher.iter(|| black_box(renderer.render(&template, black_box(&item)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sharplens_core::syntax::SyntaxIndex;
use sharplens_core::{CSharpEngine, Document, Parser};

/// Generate C# source with `size` service classes
fn generate_csharp_source(size: usize) -> String {
    let mut source = String::from("using System;\nusing System.Linq;\n\nnamespace Bench\n{\n");

    for i in 0..size {
        source.push_str(&format!(
            r#"
    public class Service{i}
    {{
        private int counter{i};

        public int Compute{i}(int x, int y)
        {{
            if (x > y && y > 0)
            {{
                return x * {i} + y;
            }}
            foreach (var item in Enumerable.Range(0, x))
            {{
                counter{i} += item;
            }}
            return Helper{i}(counter{i});
        }}

        private int Helper{i}(int value) => value switch {{ 0 => 1, _ => value }};
    }}
"#,
            i = i
        ));
    }

    source.push_str("}\n");
    source
}

/// Benchmark raw parsing performance
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for size in [10, 50, 100, 500].iter() {
        let source = generate_csharp_source(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| {
                let mut parser = Parser::new().expect("Parser creation failed");
                let tree = parser.parse(black_box(source)).expect("Parse failed");
                black_box(tree);
            });
        });
    }

    group.finish();
}

/// Benchmark building the syntax index (parse, walk, metrics)
fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for size in [10, 50, 100].iter() {
        let document = Document::new("Bench.cs", generate_csharp_source(*size), 0);

        group.bench_with_input(BenchmarkId::from_parameter(size), &document, |b, document| {
            b.iter(|| {
                let index = SyntaxIndex::build(black_box(document)).expect("Index failed");
                black_box(index);
            });
        });
    }

    group.finish();
}

/// Benchmark cached index lookups
fn bench_cached_index(c: &mut Criterion) {
    let engine = CSharpEngine::new();
    let document = Document::new("Bench.cs", generate_csharp_source(100), 0);
    engine.index(&document).expect("Index failed");

    c.bench_function("cached_index", |b| {
        b.iter(|| {
            let index = engine.index(black_box(&document)).expect("Index failed");
            black_box(index);
        });
    });
}

criterion_group!(benches, bench_parse, bench_index, bench_cached_index);
criterion_main!(benches);

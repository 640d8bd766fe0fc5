use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_nas::nas::{random_tokens, FeatureShape, MobileNetV1Space, SearchSpace, ShapeInference};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("token2arch");
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

    for block_num in [1, 3, 5].iter() {
        let space = MobileNetV1Space::new(224, 224 >> block_num, *block_num).unwrap();
        let tokens = random_tokens(&space.range_table(), &mut rng).unwrap();

        group.bench_with_input(
            BenchmarkId::new("decode", block_num),
            &tokens,
            |b, tokens| {
                b.iter(|| space.token2arch(Some(black_box(tokens.as_slice()))).unwrap())
            },
        );
    }

    group.finish();
}

fn bench_shape_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("shape_inference");

    let space = MobileNetV1Space::new(224, 7, 5).unwrap();
    let arch = space.token2arch(None).unwrap();

    group.bench_function("build_default", |b| {
        b.iter(|| {
            let mut tracer = ShapeInference::new();
            arch.build(&mut tracer, black_box(FeatureShape::image(3, 224))).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_shape_inference);
criterion_main!(benches);

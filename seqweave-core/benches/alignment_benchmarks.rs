use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seqweave_core::{
    AlignerParams, AssemblerParams, MatchMode, MumFinder, MumParams, NeedlemanWunsch,
    PairwiseAligner, ParallelDeNovoAssembler, Sequence, SmithWaterman,
};

fn generate_test_sequence(length: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..length).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

/// Copy of `sequence` with roughly one substitution every `spacing` bases
fn mutate(sequence: &[u8], spacing: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    sequence
        .iter()
        .map(|&base| {
            if rng.gen_range(0..spacing) == 0 {
                b"ACGT"[rng.gen_range(0..4)]
            } else {
                base
            }
        })
        .collect()
}

fn bench_pairwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairwise");
    for length in [250usize, 1000] {
        let first = Sequence::dna("a", generate_test_sequence(length, 1)).unwrap();
        let second =
            Sequence::dna("b", mutate(first.symbols(), 10, 2)).unwrap();

        let global = NeedlemanWunsch::new(AlignerParams::default());
        group.bench_with_input(BenchmarkId::new("needleman_wunsch", length), &length, |b, _| {
            b.iter(|| black_box(global.align(black_box(&first), black_box(&second))))
        });

        let local = SmithWaterman::new(AlignerParams::default());
        group.bench_with_input(BenchmarkId::new("smith_waterman", length), &length, |b, _| {
            b.iter(|| black_box(local.align(black_box(&first), black_box(&second))))
        });

        let linear = NeedlemanWunsch::new(AlignerParams {
            max_matrix_cells: 1024,
            ..AlignerParams::default()
        });
        group.bench_with_input(BenchmarkId::new("linear_space", length), &length, |b, _| {
            b.iter(|| black_box(linear.align(black_box(&first), black_box(&second))))
        });
    }
    group.finish();
}

fn bench_mum_search(c: &mut Criterion) {
    let reference = Sequence::dna("ref", generate_test_sequence(100_000, 3)).unwrap();
    let query = Sequence::dna("q", mutate(reference.symbols(), 50, 4)).unwrap();
    let finder = MumFinder::new(
        std::slice::from_ref(&reference),
        MumParams {
            min_length: 20,
            mode: MatchMode::MumReference,
        },
    )
    .unwrap();

    c.bench_function("mum_100kb", |b| {
        b.iter(|| black_box(finder.find(black_box(&query))))
    });
}

fn bench_assembly(c: &mut Criterion) {
    let genome = generate_test_sequence(5_000, 5);
    let reads: Vec<Sequence> = (0..genome.len() - 100)
        .step_by(10)
        .map(|start| {
            Sequence::dna(format!("read{}", start), genome[start..start + 100].to_vec()).unwrap()
        })
        .collect();
    let assembler = ParallelDeNovoAssembler::new(AssemblerParams {
        kmer_length: 21,
        ..AssemblerParams::default()
    });

    c.bench_function("assemble_5kb", |b| {
        b.iter(|| black_box(assembler.assemble(black_box(&reads))))
    });
}

criterion_group!(benches, bench_pairwise, bench_mum_search, bench_assembly);
criterion_main!(benches);

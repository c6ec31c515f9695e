use ai_2048_bench::engine::{new_game, Board, Direction, SpawnPolicy};
use ai_2048_bench::harness::{run_games_with, HarnessConfig};
use ai_2048_bench::strategy::{Depth, Expectimax, MonteCarlo, MonteCarloConfig, Player, SearchConfig, StrategyKind};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use rayon::ThreadPoolBuilder;
use std::hint::black_box;

fn corpus() -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(7777);
    let mut boards = Vec::new();
    let mut b = new_game(&mut rng, SpawnPolicy::STANDARD).unwrap();
    boards.push(b);
    for i in 0..32 {
        let out = b.apply_move(Direction::ALL[i % 4]);
        if out.changed {
            b = out.board.spawn_tile(&mut rng).unwrap();
        }
        boards.push(b);
    }
    boards
}

fn bench_search(c: &mut Criterion) {
    ai_2048_bench::init_game();
    // Pin a small pool for stability
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let boards = corpus();
    let seq = Expectimax::new(SearchConfig { depth: Depth::Fixed(3), ..SearchConfig::default() });
    let par = Expectimax::new(SearchConfig { depth: Depth::Fixed(3), parallel_root: true, ..SearchConfig::default() });

    c.bench_function("expectimax/branch_evals", |bch| {
        bch.iter(|| {
            let mut acc = 0.0;
            for &bd in &boards {
                for be in seq.branch_evals(bd) {
                    if be.legal { acc += be.ev; }
                }
            }
            black_box(acc)
        })
    });
    c.bench_function("expectimax_par/branch_evals", |bch| {
        bch.iter(|| pool.install(|| {
            let mut acc = 0.0;
            for &bd in &boards {
                for be in par.branch_evals(bd) {
                    if be.legal { acc += be.ev; }
                }
            }
            black_box(acc)
        }))
    });
}

fn bench_monte_carlo(c: &mut Criterion) {
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let boards = corpus();
    let mc = MonteCarlo::new(MonteCarloConfig { rollouts: 32, ..MonteCarloConfig::default() });
    c.bench_function("monte_carlo/choose_move", |bch| {
        bch.iter(|| pool.install(|| {
            let mut rng = StdRng::seed_from_u64(1);
            boards.iter().filter_map(|&bd| mc.choose_move(bd, &mut rng)).count()
        }))
    });
}

fn bench_harness(c: &mut Criterion) {
    let mut group = c.benchmark_group("harness");
    group.sample_size(10);
    for kind in [StrategyKind::Random, StrategyKind::Ordered, StrategyKind::Score] {
        let player = Player::from_kind(kind);
        let cfg = HarnessConfig { games: 16, threads: Some(4), ..HarnessConfig::default() };
        group.bench_function(format!("run_games/{kind}"), |bch| {
            bch.iter(|| run_games_with(&player, &cfg, &mut StdRng::seed_from_u64(3), None).unwrap().total_moves)
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search, bench_monte_carlo, bench_harness);
criterion_main!(benches);

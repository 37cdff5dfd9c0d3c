use criterion::{criterion_group, criterion_main, Criterion};
use ixa_contacts::rand::{rngs::StdRng, SeedableRng};
use ixa_contacts::{
    AgentId, ContactConfig, ContactOrchestrator, Intensity, PartitionTree, PoissonSampler,
};
use std::hint::black_box;

const SEED: u64 = 42;
const POPULATION: usize = 10_000;

fn campus() -> ContactOrchestrator {
    let config = ContactConfig {
        seed: SEED,
        ..ContactConfig::default()
    };
    let mut contacts = ContactOrchestrator::new(config).unwrap();
    let everyone: Vec<AgentId> = (0..POPULATION).map(AgentId).collect();

    // Sections of 50 students, each meeting on one weekday.
    for (section, students) in everyone.chunks(50).enumerate() {
        let id = contacts
            .new_context(1 + section % 5, format!("section {section}"))
            .unwrap();
        contacts.add_transmitters(id, students, 1).unwrap();
        contacts.add_receivers(id, students, 1).unwrap();
        contacts.context_mut(id).unwrap().set_rate(0.02).unwrap();
    }
    // Roommates.
    let rooms = contacts.new_permanent("rooms");
    for pair in everyone.chunks(2) {
        contacts.add_product_set(rooms, pair, pair, None).unwrap();
    }
    contacts
        .register_symmetric(None, Intensity::Constant(0.0005), "incidental")
        .unwrap();
    contacts
}

pub fn criterion_benchmark(criterion: &mut Criterion) {
    let mut criterion = criterion.benchmark_group("contact_sampling");

    criterion.bench_function("poisson_draws_mixed_intensity", |bencher| {
        let poisson = PoissonSampler::default();
        let mut rng = StdRng::seed_from_u64(SEED);
        bencher.iter(|| {
            for intensity in [0.3, 4.0, 37.5, 900.0, 20_000.0] {
                black_box(poisson.draw(&mut rng, black_box(intensity)));
            }
        });
    });

    criterion.bench_function("partition_tree_nth_in_state", |bencher| {
        let mut tree = PartitionTree::new(POPULATION, false);
        for index in (0..POPULATION).step_by(3) {
            tree.set_state(index, true);
        }
        bencher.iter(|| {
            for order in (0..tree.count_in_state(false)).step_by(97) {
                black_box(tree.nth_in_state(black_box(order), false));
            }
        });
    });

    // One simulated week in which every agent is queried as a transmitter each day.
    criterion.bench_function("campus_week_transmit_queries", |bencher| {
        bencher.iter_with_large_drop(|| {
            let mut contacts = campus();
            for _ in 0..7 {
                contacts.advance_day();
                for agent in 0..POPULATION {
                    black_box(contacts.query_transmit(AgentId(agent), 0).unwrap());
                }
            }
            contacts
        });
    });

    criterion.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sigil_ecs::{EntityManager, Schema, Signature};

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

struct Moving;
impl Signature for Moving {
    type Components = (Position, Velocity);
    type Tags = ();
}

const ENTITY_COUNT: usize = 10_000;

fn schema() -> Schema {
    Schema::builder()
        .component::<Position>()
        .component::<Velocity>()
        .signature::<Moving>()
        .freeze()
        .unwrap()
}

fn populated_manager() -> EntityManager {
    let mut manager = EntityManager::with_capacity(schema(), ENTITY_COUNT);
    for i in 0..ENTITY_COUNT {
        let e = manager.create_entity();
        let f = i as f32;
        manager.add_component(e, Position { x: f, y: -f }).unwrap();
        if i % 2 == 0 {
            manager
                .add_component(e, Velocity { dx: 0.1, dy: 0.2 })
                .unwrap();
        }
    }
    manager
}

fn bench_spawn_attach(c: &mut Criterion) {
    c.bench_function("spawn_attach_10k", |b| {
        b.iter(|| {
            let manager = populated_manager();
            black_box(manager.entity_count())
        });
    });
}

fn bench_signature_traversal(c: &mut Criterion) {
    let manager = populated_manager();
    c.bench_function("traverse_signature_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            manager
                .traverse_entity_match_signature::<Moving, _>(|(pos, vel)| {
                    sum += pos.x + vel.dx;
                })
                .unwrap();
            black_box(sum)
        });
    });
}

fn bench_destroy_refresh(c: &mut Criterion) {
    c.bench_function("destroy_refresh_10k", |b| {
        b.iter(|| {
            let mut manager = populated_manager();
            let doomed: Vec<_> = manager.entities().collect();
            for entity in doomed {
                manager.destroy_entity(entity).unwrap();
            }
            black_box(manager.refresh())
        });
    });
}

criterion_group!(
    benches,
    bench_spawn_attach,
    bench_signature_traversal,
    bench_destroy_refresh
);
criterion_main!(benches);

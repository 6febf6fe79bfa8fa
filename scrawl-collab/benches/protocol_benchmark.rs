use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scrawl_collab::protocol::{Command, Update};

fn bench_parse_add(c: &mut Criterion) {
    c.bench_function("parse_add_rect", |b| {
        b.iter(|| black_box(Command::parse(black_box("add rect 10 10 50 50 -16777216")).unwrap()))
    });
}

fn bench_parse_polyline(c: &mut Criterion) {
    let points = (0..50)
        .map(|i| format!("{i},{}", i * 2))
        .collect::<Vec<_>>()
        .join(";");
    let line = format!("add polyline [{points}] -16777216");

    c.bench_function("parse_add_polyline_50_points", |b| {
        b.iter(|| black_box(Command::parse(black_box(&line)).unwrap()))
    });
}

fn bench_parse_move(c: &mut Criterion) {
    c.bench_function("parse_move", |b| {
        b.iter(|| black_box(Command::parse(black_box("move 3 -5 12")).unwrap()))
    });
}

fn bench_command_encode(c: &mut Criterion) {
    let cmd = Command::parse("add rect 10 10 50 50 -16777216").unwrap();

    c.bench_function("encode_add_rect", |b| {
        b.iter(|| black_box(black_box(&cmd).encode()))
    });
}

fn bench_update_parse(c: &mut Criterion) {
    c.bench_function("parse_explicit_id_update", |b| {
        b.iter(|| black_box(Update::parse(black_box("7 segment 0 0 100 100 255")).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_parse_add,
    bench_parse_polyline,
    bench_parse_move,
    bench_command_encode,
    bench_update_parse
);
criterion_main!(benches);

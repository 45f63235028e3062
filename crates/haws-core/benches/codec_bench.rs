//! Criterion benchmarks for the hub websocket JSON codec.
//!
//! The read loop decodes and classifies every frame on a single task, so
//! decode + classify latency bounds how fast a busy `state_changed`
//! subscription can be drained.
//!
//! Run with:
//! ```bash
//! cargo bench --package haws-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use haws_core::protocol::messages::{call_service, ping, render_template, Inbound};
use haws_core::protocol::{decode, encode};
use serde_json::json;

// ── Frame fixtures ────────────────────────────────────────────────────────────

const RESULT_FRAME: &str = r#"{"type":"result","id":17,"success":true,"result":null}"#;

const PONG_FRAME: &str = r#"{"type":"pong","id":18}"#;

fn state_changed_frame() -> String {
    json!({
        "type": "event",
        "id": 3,
        "event": {
            "event_type": "state_changed",
            "data": {
                "entity_id": "light.kitchen",
                "old_state": {"state": "off", "attributes": {"friendly_name": "Kitchen"}},
                "new_state": {"state": "on", "attributes": {"friendly_name": "Kitchen", "brightness": 180}},
            },
            "origin": "LOCAL",
            "time_fired": "2024-01-01T00:00:00.000000+00:00",
        },
    })
    .to_string()
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let fixtures = [
        ("ping", ping()),
        (
            "call_service",
            call_service(
                "light.turn_on",
                Some(json!({"brightness": 200})),
                Some(json!({"entity_id": ["light.kitchen"]})),
                false,
            ),
        ),
        ("render_template", render_template("{{ states('sun.sun') }}", true)),
    ];
    for (name, msg) in &fixtures {
        group.bench_with_input(BenchmarkId::from_parameter(name), msg, |b, msg| {
            b.iter(|| encode(black_box(msg)))
        });
    }
    group.finish();
}

fn bench_decode_and_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_classify");
    let event = state_changed_frame();
    let fixtures = [
        ("result", RESULT_FRAME),
        ("pong", PONG_FRAME),
        ("state_changed", event.as_str()),
    ];
    for (name, text) in fixtures {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| {
                let msg = decode(black_box(text)).unwrap();
                Inbound::from_message(&msg).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_and_classify);
criterion_main!(benches);

// Criterion benchmarks for the skygate-common protocol layer
//
// Run benchmarks with:
//   cargo bench -p skygate-common
//
// For detailed output with plots:
//   cargo bench -p skygate-common -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use skygate_common::{GatewayError, RpcError, RpcRequest, RpcResponse};

fn bench_envelope_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_serialization");

    let success = RpcResponse::success(1, json!({"count": 10, "source": "api_fresh"}));
    let failure = RpcResponse::error(1, RpcError::new("api_error", "Upstream API error"));
    let posts: Vec<serde_json::Value> = (0..25)
        .map(|i| json!({"id": format!("p{i}"), "text": "post body text", "author": "user.test"}))
        .collect();
    let large = RpcResponse::success(1, json!({ "posts": posts, "count": 25 }));

    group.bench_function("serialize_success", |b| {
        b.iter(|| serde_json::to_string(black_box(&success)));
    });

    group.bench_function("serialize_error", |b| {
        b.iter(|| serde_json::to_string(black_box(&failure)));
    });

    group.bench_function("serialize_large_result", |b| {
        b.iter(|| serde_json::to_string(black_box(&large)));
    });

    group.finish();
}

fn bench_envelope_deserialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_deserialization");

    let small = r#"{"jsonrpc":"2.0","method":"post-assist","params":{"mood":"happy"},"id":1}"#;
    let medium = r#"{"jsonrpc":"2.0","method":"feed-analysis","params":{"hashtag":"rust","limit":25},"id":42}"#;
    let no_params = r#"{"jsonrpc":"2.0","method":"feed-analysis"}"#;

    group.bench_function("deserialize_small", |b| {
        b.iter(|| serde_json::from_str::<RpcRequest>(black_box(small)));
    });

    group.bench_function("deserialize_medium", |b| {
        b.iter(|| serde_json::from_str::<RpcRequest>(black_box(medium)));
    });

    group.bench_function("deserialize_defaulted", |b| {
        b.iter(|| serde_json::from_str::<RpcRequest>(black_box(no_params)));
    });

    group.finish();
}

fn bench_error_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_classification");

    let upstream = GatewayError::Api {
        status: 503,
        message: "service melting".into(),
    };
    let transport = GatewayError::Transport("connection refused".into());

    group.bench_function("code_and_status", |b| {
        b.iter(|| {
            let err = black_box(&upstream);
            (err.code(), err.http_status())
        });
    });

    group.bench_function("is_retryable", |b| {
        b.iter(|| black_box(&transport).is_retryable());
    });

    group.bench_function("classify_message", |b| {
        b.iter(|| GatewayError::classify_message(black_box("API error (status 502): bad gateway")));
    });

    group.bench_function("retryable_message_markers", |b| {
        b.iter(|| GatewayError::retryable_message(black_box("dial tcp 10.0.0.1:443: i/o timeout")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_serialization,
    bench_envelope_deserialization,
    bench_error_classification,
);
criterion_main!(benches);

use criterion::{Criterion, criterion_group, criterion_main};
use domain::TransferRequest;
use std::hint::black_box;

fn bench_validate(c: &mut Criterion) {
    let request = TransferRequest::new("85-150", "43-812", 250, "tx-bench");

    c.bench_function("domain/validate_transfer", |b| {
        b.iter(|| black_box(&request).validate().unwrap());
    });
}

fn bench_decode_request(c: &mut Criterion) {
    let body = serde_json::json!({
        "source_account": "85-150",
        "target_account": "43-812",
        "amount": 250,
        "reference_id": "tx-bench"
    });

    c.bench_function("domain/decode_and_validate", |b| {
        b.iter(|| {
            let request: TransferRequest = serde_json::from_value(black_box(body.clone())).unwrap();
            request.validate().unwrap();
            request.workflow_id()
        });
    });
}

criterion_group!(benches, bench_validate, bench_decode_request);
criterion_main!(benches);

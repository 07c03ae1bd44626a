use civic_core::{AddressDeriver, LogicalRecordKey, Namespace, Pubkey};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_derivation(c: &mut Criterion) {
    let deriver = AddressDeriver::default();
    let authority = Pubkey::new([1u8; 32]);

    c.bench_function("derive::air_quality", |b| {
        b.iter(|| {
            let derived = deriver
                .derive(
                    Namespace::AirQuality,
                    black_box("Business_District"),
                    black_box("ENV_001"),
                    &authority,
                )
                .unwrap();
            black_box(derived);
        });
    });

    // ENV_006 needs three bumps before leaving the curve
    let key = LogicalRecordKey::air_quality("Business_District", "ENV_006", authority);
    let stored = deriver.derive_key(&key).unwrap();
    c.bench_function("audit::air_quality", |b| {
        b.iter(|| {
            deriver.audit(black_box(&key), &stored).unwrap();
        });
    });
}

criterion_group!(benches, bench_derivation);
criterion_main!(benches);

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use warehouse_loader::{
    catalog::Catalog,
    data::{Frame, RawRecord},
    reconcile::reconcile,
    sanitize::sanitize,
};

fn generate_balances(rows: usize) -> Frame {
    let headers = ["on_date", "account_rk", "currency_rk", "balance_out"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let records = (0..rows)
        .map(|i| {
            // Every 50th row repeats its predecessor; every 97th has a broken date.
            let n = if i % 50 == 0 && i > 0 { i - 1 } else { i };
            let date = if n % 97 == 0 {
                "n/a".to_string()
            } else {
                format!("{:02}.01.2018", (n % 28) + 1)
            };
            vec![
                Some(date),
                Some(n.to_string()),
                Some(((n % 3) + 34).to_string()),
                Some(format!("{}.{:02}", n * 7, n % 100)),
            ]
        })
        .collect::<Vec<RawRecord>>();
    Frame::new(headers, records)
}

fn bench_sanitize(c: &mut Criterion) {
    let catalog = Catalog::builtin();
    let spec = catalog.get("ft_balance_f").expect("builtin balance table");
    let frame = generate_balances(50_000);

    let mut group = c.benchmark_group("sanitize");
    group.bench_function("balance_50k", |b| {
        b.iter_batched(
            || frame.clone(),
            |frame| sanitize(frame, spec),
            BatchSize::LargeInput,
        )
    });
    group.bench_function("balance_50k_reconciled", |b| {
        b.iter_batched(
            || frame.clone(),
            |frame| {
                let (frame, _) = sanitize(frame, spec);
                reconcile(frame, spec).expect("reconcile")
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_sanitize);
criterion_main!(benches);

use common::{OrderId, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use downloads::{DEFAULT_TOKEN_TTL, TokenIssuer};
use secrecy::SecretString;

const NOW: i64 = 1_704_067_200;

fn issuer() -> TokenIssuer {
    TokenIssuer::new(
        &SecretString::new("bench-download-secret".to_string()),
        DEFAULT_TOKEN_TTL,
    )
}

fn bench_mint(c: &mut Criterion) {
    let issuer = issuer();
    let order_id = OrderId::new();

    c.bench_function("token/mint", |b| {
        b.iter(|| {
            issuer
                .mint_at(order_id, ProductId::from("prod-1"), "books/a.pdf", NOW)
                .unwrap()
        });
    });
}

fn bench_verify_valid(c: &mut Criterion) {
    let issuer = issuer();
    let token = issuer
        .mint_at(OrderId::new(), ProductId::from("prod-1"), "books/a.pdf", NOW)
        .unwrap();

    c.bench_function("token/verify_valid", |b| {
        b.iter(|| issuer.verify_at(&token, NOW + 10));
    });
}

fn bench_verify_bad_signature(c: &mut Criterion) {
    let token = TokenIssuer::new(&SecretString::new("other".to_string()), DEFAULT_TOKEN_TTL)
        .mint_at(OrderId::new(), ProductId::from("prod-1"), "books/a.pdf", NOW)
        .unwrap();
    let issuer = issuer();

    c.bench_function("token/verify_bad_signature", |b| {
        b.iter(|| issuer.verify_at(&token, NOW + 10));
    });
}

criterion_group!(
    benches,
    bench_mint,
    bench_verify_valid,
    bench_verify_bad_signature
);
criterion_main!(benches);

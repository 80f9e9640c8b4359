use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{AvailabilityStore, Book, IdempotencyKey, InMemoryAvailabilityStore};

fn bench_decrement_increment_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryAvailabilityStore::new();
    let book = Book::new("Bench", "Criterion", 1);
    let id = book.id;
    rt.block_on(store.add_book(book)).unwrap();

    c.bench_function("availability/decrement_increment_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .try_decrement(id, &IdempotencyKey::random())
                    .await
                    .unwrap();
                store
                    .increment(id, &IdempotencyKey::random())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_contended_last_copies(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("availability/contended_32_borrowers_4_copies", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryAvailabilityStore::new();
                let book = Book::new("Bench", "Criterion", 4);
                let id = book.id;
                store.add_book(book).await.unwrap();

                let handles: Vec<_> = (0..32)
                    .map(|_| {
                        let store = store.clone();
                        tokio::spawn(async move {
                            store.try_decrement(id, &IdempotencyKey::random()).await
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_decrement_increment_cycle,
    bench_contended_last_copies
);
criterion_main!(benches);

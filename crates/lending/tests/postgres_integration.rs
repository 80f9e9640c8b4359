//! PostgreSQL integration tests for the borrowing ledger and the
//! reservation queue. They need a Docker daemon and are ignored by default:
//!
//! ```bash
//! cargo test -p lending --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::IdempotencyKey;
use futures_util::future::join_all;
use lending::{
    BookId, Borrowing, BorrowingId, BorrowingLedger, LedgerStats, LendingError, Money,
    PendingIncrement, PendingIncrementStore, PostgresBorrowingLedger, PostgresPendingIncrements,
    PostgresReservationQueue, PostgresUserDirectory, ReservationQueue, Role, User, UserDirectory,
    UserId,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // kept alive for the whole test binary
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/lending/002_create_lending_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/lending/004_create_pending_increments_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/users/003_create_users_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE borrowings, reservations, users, pending_increments")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn loan(user_id: UserId, book_id: BookId) -> Borrowing {
    Borrowing::new(
        BorrowingId::new(),
        user_id,
        book_id,
        Utc::now(),
        Duration::days(14),
    )
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn insert_enforces_duplicate_and_limit() {
    let ledger = PostgresBorrowingLedger::new(get_test_pool().await);
    let user = UserId::new();
    let book = BookId::new();

    ledger.insert(loan(user, book), 2).await.unwrap();
    let dup = ledger.insert(loan(user, book), 2).await;
    assert!(matches!(dup, Err(LendingError::AlreadyBorrowed { .. })));

    ledger.insert(loan(user, BookId::new()), 2).await.unwrap();
    let over = ledger.insert(loan(user, BookId::new()), 2).await;
    assert!(matches!(over, Err(LendingError::LimitExceeded { .. })));

    assert_eq!(ledger.count_active(user).await.unwrap(), 2);
    assert!(ledger.find_active(user, book).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn concurrent_inserts_respect_the_limit() {
    let ledger = PostgresBorrowingLedger::new(get_test_pool().await);
    let user = UserId::new();

    let attempts = (0..6).map(|_| {
        let ledger = ledger.clone();
        async move { ledger.insert(loan(user, BookId::new()), 3).await }
    });
    let results = join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(ledger.count_active(user).await.unwrap(), 3);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn mark_returned_is_conditional() {
    let ledger = PostgresBorrowingLedger::new(get_test_pool().await);
    let b = loan(UserId::new(), BookId::new());
    let id = b.id();
    ledger.insert(b, 3).await.unwrap();

    let closed = ledger
        .mark_returned(id, Utc::now(), Money::from_dollars(6))
        .await
        .unwrap();
    assert!(closed.is_returned());

    let again = ledger
        .mark_returned(id, Utc::now(), Money::from_dollars(9))
        .await;
    assert!(matches!(again, Err(LendingError::AlreadyReturned(_))));
    let stored = ledger.get(id).await.unwrap().unwrap();
    assert_eq!(stored.fine_amount(), Money::from_dollars(6));

    let missing = ledger
        .mark_returned(BorrowingId::new(), Utc::now(), Money::zero())
        .await;
    assert!(matches!(missing, Err(LendingError::BorrowingNotFound(_))));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn overdue_orders_by_due_date() {
    let ledger = PostgresBorrowingLedger::new(get_test_pool().await);
    let now = Utc::now();
    let user = UserId::new();
    let late = Borrowing::with_due_date(
        BorrowingId::new(),
        user,
        BookId::new(),
        now - Duration::days(20),
        now - Duration::days(6),
    );
    let later = Borrowing::with_due_date(
        BorrowingId::new(),
        user,
        BookId::new(),
        now - Duration::days(30),
        now - Duration::days(16),
    );
    let (late_id, later_id) = (late.id(), later.id());
    ledger.insert(late, 5).await.unwrap();
    ledger.insert(later, 5).await.unwrap();
    ledger.insert(loan(user, BookId::new()), 5).await.unwrap();

    let ids: Vec<_> = ledger
        .overdue(now)
        .await
        .unwrap()
        .iter()
        .map(|b| b.id())
        .collect();
    assert_eq!(ids, [later_id, late_id]);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn concurrent_reservations_are_numbered_one_to_three() {
    let queue = PostgresReservationQueue::new(get_test_pool().await);
    let book = BookId::new();

    let attempts = (0..3).map(|_| {
        let queue = queue.clone();
        async move { queue.reserve(UserId::new(), book, Utc::now()).await }
    });
    let mut priorities: Vec<u32> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap().priority)
        .collect();
    priorities.sort_unstable();

    assert_eq!(priorities, [1, 2, 3]);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn reservation_queue_rejects_duplicates_and_notifies_in_order() {
    let queue = PostgresReservationQueue::new(get_test_pool().await);
    let book = BookId::new();
    let user = UserId::new();

    let first = queue.reserve(user, book, Utc::now()).await.unwrap();
    let dup = queue.reserve(user, book, Utc::now()).await;
    assert!(matches!(dup, Err(LendingError::DuplicateReservation { .. })));
    queue.reserve(UserId::new(), book, Utc::now()).await.unwrap();

    let notified = queue.notify_next(book).await.unwrap().unwrap();
    assert_eq!(notified.id, first.id);
    assert!(notified.notified);

    let active = queue.active_for_book(book).await.unwrap();
    assert_eq!(active.iter().map(|r| r.priority).collect::<Vec<_>>(), [1, 2]);
    assert_eq!(queue.get(first.id).await.unwrap().unwrap().priority, 1);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn user_directory_round_trip() {
    let directory = PostgresUserDirectory::new(get_test_pool().await);
    let mut user = User::member("carol");
    directory.add_user(user.clone()).await.unwrap();
    assert_eq!(directory.get_user(user.id).await.unwrap(), Some(user.clone()));

    user.role = Role::Staff;
    directory.add_user(user.clone()).await.unwrap();
    assert_eq!(
        directory.get_user(user.id).await.unwrap().map(|u| u.role),
        Some(Role::Staff)
    );
    assert!(directory.get_user(UserId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn stats_count_every_state() {
    let ledger = PostgresBorrowingLedger::new(get_test_pool().await);
    let now = Utc::now();
    let user = UserId::new();
    let late = Borrowing::with_due_date(
        BorrowingId::new(),
        user,
        BookId::new(),
        now - Duration::days(20),
        now - Duration::days(6),
    );
    let closed = loan(user, BookId::new());
    let closed_id = closed.id();
    ledger.insert(late, 5).await.unwrap();
    ledger.insert(closed, 5).await.unwrap();
    ledger
        .mark_returned(closed_id, now, Money::zero())
        .await
        .unwrap();

    assert_eq!(
        ledger.stats(now).await.unwrap(),
        LedgerStats {
            total: 2,
            active: 1,
            overdue: 1
        }
    );

    let queue = PostgresReservationQueue::new(ledger.pool().clone());
    queue.reserve(UserId::new(), BookId::new(), now).await.unwrap();
    assert_eq!(queue.count_active().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn pending_increments_survive_a_new_store_instance() {
    let pool = get_test_pool().await;
    let book = BookId::new();
    let borrowing = BorrowingId::new();

    let before = PostgresPendingIncrements::new(pool.clone());
    before
        .push(PendingIncrement::undo_decrement(
            IdempotencyKey::borrow(borrowing),
            IdempotencyKey::compensate(borrowing),
            book,
            Utc::now(),
        ))
        .await
        .unwrap();
    before
        .push(PendingIncrement::new(
            IdempotencyKey::compensate(borrowing),
            book,
            Utc::now(),
        ))
        .await
        .unwrap();
    before
        .record_failure(&IdempotencyKey::compensate(borrowing))
        .await
        .unwrap();
    drop(before);

    let after = PostgresPendingIncrements::new(pool);
    let items = after.list().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, IdempotencyKey::compensate(borrowing));
    assert_eq!(items[0].book_id, book);
    assert_eq!(items[0].attempts, 2);
    assert_eq!(
        items[0].unresolved_decrement,
        Some(IdempotencyKey::borrow(borrowing))
    );

    after
        .remove(&IdempotencyKey::compensate(borrowing))
        .await
        .unwrap();
    assert_eq!(after.count().await.unwrap(), 0);
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Book, BookId, IdempotencyKey, InventoryError, Result,
    store::{AvailabilityStore, DecrementOutcome, MutationOutcome},
};

#[derive(Default)]
struct InventoryState {
    books: HashMap<BookId, Book>,
    mutations: HashMap<IdempotencyKey, (BookId, MutationOutcome)>,
}

impl InventoryState {
    fn replay(&self, key: &IdempotencyKey, book_id: BookId) -> Result<Option<MutationOutcome>> {
        match self.mutations.get(key) {
            Some((recorded_book, _)) if *recorded_book != book_id => {
                Err(InventoryError::IdempotencyConflict {
                    key: key.clone(),
                    book_id,
                })
            }
            Some((_, outcome)) => Ok(Some(*outcome)),
            None => Ok(None),
        }
    }
}

/// In-memory availability store.
///
/// Each mutation runs under a single write lock, which makes the guarded
/// decrement atomic in the same way the conditional `UPDATE` is in
/// PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryAvailabilityStore {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryAvailabilityStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of idempotency keys recorded so far.
    pub async fn mutation_count(&self) -> usize {
        self.state.read().await.mutations.len()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn add_book(&self, book: Book) -> Result<()> {
        book.validate()?;
        let mut state = self.state.write().await;
        if state.books.contains_key(&book.id) {
            return Err(InventoryError::DuplicateBook(book.id));
        }
        state.books.insert(book.id, book);
        Ok(())
    }

    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>> {
        Ok(self.state.read().await.books.get(&book_id).cloned())
    }

    async fn list_books(&self, category: Option<&str>) -> Result<Vec<Book>> {
        let state = self.state.read().await;
        let mut books: Vec<_> = state
            .books
            .values()
            .filter(|b| category.is_none() || b.category.as_deref() == category)
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    async fn check_available(&self, book_id: BookId) -> Result<u32> {
        self.state
            .read()
            .await
            .books
            .get(&book_id)
            .map(|b| b.available_copies)
            .ok_or(InventoryError::BookNotFound(book_id))
    }

    #[tracing::instrument(skip(self))]
    async fn try_decrement(
        &self,
        book_id: BookId,
        key: &IdempotencyKey,
    ) -> Result<DecrementOutcome> {
        let mut state = self.state.write().await;

        if let Some(outcome) = state.replay(key, book_id)? {
            tracing::debug!(%key, "replayed decrement");
            return outcome.as_decrement(key, book_id);
        }

        let book = state
            .books
            .get_mut(&book_id)
            .ok_or(InventoryError::BookNotFound(book_id))?;

        let outcome = if book.available_copies > 0 {
            book.available_copies -= 1;
            MutationOutcome::Decremented(book.available_copies)
        } else {
            MutationOutcome::NotAvailable
        };

        state.mutations.insert(key.clone(), (book_id, outcome));
        outcome.as_decrement(key, book_id)
    }

    #[tracing::instrument(skip(self))]
    async fn increment(&self, book_id: BookId, key: &IdempotencyKey) -> Result<u32> {
        let mut state = self.state.write().await;

        if let Some(outcome) = state.replay(key, book_id)? {
            tracing::debug!(%key, "replayed increment");
            return outcome.as_increment(key, book_id);
        }

        let book = state
            .books
            .get_mut(&book_id)
            .ok_or(InventoryError::BookNotFound(book_id))?;

        if book.available_copies < book.total_copies {
            book.available_copies += 1;
        } else {
            tracing::warn!(%book_id, "increment saturated at total copies");
        }
        let available = book.available_copies;

        state
            .mutations
            .insert(key.clone(), (book_id, MutationOutcome::Incremented(available)));
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(total: u32) -> (InMemoryAvailabilityStore, BookId) {
        let store = InMemoryAvailabilityStore::new();
        let book = Book::new("The Rust Book", "Klabnik", total);
        let id = book.id;
        store.add_book(book).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn decrement_until_empty() {
        let (store, id) = store_with(2).await;

        let first = store
            .try_decrement(id, &IdempotencyKey::random())
            .await
            .unwrap();
        assert_eq!(
            first,
            DecrementOutcome::Decremented {
                available_copies: 1
            }
        );
        store
            .try_decrement(id, &IdempotencyKey::random())
            .await
            .unwrap();

        let third = store
            .try_decrement(id, &IdempotencyKey::random())
            .await
            .unwrap();
        assert_eq!(third, DecrementOutcome::NotAvailable);
        assert_eq!(store.check_available(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_saturates_at_total() {
        let (store, id) = store_with(1).await;

        let count = store.increment(id, &IdempotencyKey::random()).await.unwrap();
        assert_eq!(count, 1);

        let book = store.get_book(id).await.unwrap().unwrap();
        assert_eq!(book.total_copies, 1);
        assert_eq!(book.available_copies, 1);
    }

    #[tokio::test]
    async fn replayed_decrement_does_not_take_a_second_copy() {
        let (store, id) = store_with(3).await;
        let key = IdempotencyKey::new("borrow:retry");

        let first = store.try_decrement(id, &key).await.unwrap();
        let replay = store.try_decrement(id, &key).await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(store.check_available(id).await.unwrap(), 2);
        assert_eq!(store.mutation_count().await, 1);
    }

    #[tokio::test]
    async fn replayed_increment_does_not_add_a_second_copy() {
        let (store, id) = store_with(3).await;
        store
            .try_decrement(id, &IdempotencyKey::random())
            .await
            .unwrap();
        store
            .try_decrement(id, &IdempotencyKey::random())
            .await
            .unwrap();

        let key = IdempotencyKey::new("return:retry");
        assert_eq!(store.increment(id, &key).await.unwrap(), 2);
        assert_eq!(store.increment(id, &key).await.unwrap(), 2);
        assert_eq!(store.check_available(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn key_reused_on_another_book_conflicts() {
        let (store, id) = store_with(1).await;
        let other = Book::new("Other", "Someone", 1);
        let other_id = other.id;
        store.add_book(other).await.unwrap();

        let key = IdempotencyKey::new("shared");
        store.try_decrement(id, &key).await.unwrap();
        let result = store.try_decrement(other_id, &key).await;

        assert!(matches!(
            result,
            Err(InventoryError::IdempotencyConflict { .. })
        ));
        assert_eq!(store.check_available(other_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let store = InMemoryAvailabilityStore::new();
        let id = BookId::new();

        assert!(matches!(
            store.check_available(id).await,
            Err(InventoryError::BookNotFound(_))
        ));
        assert!(matches!(
            store.try_decrement(id, &IdempotencyKey::random()).await,
            Err(InventoryError::BookNotFound(_))
        ));
        assert_eq!(store.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_borrowers_cannot_share_the_last_copy() {
        let (store, id) = store_with(1).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(
                    async move { store.try_decrement(id, &IdempotencyKey::random()).await },
                )
            })
            .collect();

        let mut taken = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_decremented() {
                taken += 1;
            }
        }

        assert_eq!(taken, 1);
        assert_eq!(store.check_available(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_books_filters_by_category() {
        let store = InMemoryAvailabilityStore::new();
        store
            .add_book(Book::new("B", "x", 1).with_category("history"))
            .await
            .unwrap();
        store
            .add_book(Book::new("A", "y", 1).with_category("history"))
            .await
            .unwrap();
        store
            .add_book(Book::new("C", "z", 1).with_category("poetry"))
            .await
            .unwrap();

        let history = store.list_books(Some("history")).await.unwrap();
        let titles: Vec<_> = history.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
        assert_eq!(store.list_books(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_and_invalid_books_are_rejected() {
        let (store, id) = store_with(1).await;
        let again = Book::new("Again", "x", 1).with_id(id);
        assert!(matches!(
            store.add_book(again).await,
            Err(InventoryError::DuplicateBook(_))
        ));
        let invalid = Book::new("Bad", "x", 1).with_available(4);
        assert!(matches!(
            store.add_book(invalid).await,
            Err(InventoryError::InvalidCopies { .. })
        ));
    }
}

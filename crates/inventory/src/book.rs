use serde::{Deserialize, Serialize};

use crate::{BookId, InventoryError, Result};

/// A catalogued book and its copy counts.
///
/// `available_copies` is only ever changed by the store's conditional
/// operations once the book has been registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl Book {
    /// Creates a book with every copy on the shelf.
    pub fn new(title: impl Into<String>, author: impl Into<String>, total_copies: u32) -> Self {
        Self {
            id: BookId::new(),
            title: title.into(),
            author: author.into(),
            isbn: None,
            category: None,
            description: None,
            total_copies,
            available_copies: total_copies,
        }
    }

    pub fn with_id(mut self, id: BookId) -> Self {
        self.id = id;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Overrides the number of copies on the shelf at registration time.
    pub fn with_available(mut self, available_copies: u32) -> Self {
        self.available_copies = available_copies;
        self
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Checks `0 <= available_copies <= total_copies`.
    pub fn validate(&self) -> Result<()> {
        if self.available_copies > self.total_copies {
            return Err(InventoryError::InvalidCopies {
                total: self.total_copies,
                available: self.available_copies,
            });
        }
        Ok(())
    }

    pub fn availability(&self) -> BookAvailability {
        BookAvailability {
            book_id: self.id,
            available_copies: self.available_copies,
            total_copies: self.total_copies,
        }
    }
}

/// Copy counts of a single book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAvailability {
    pub book_id: BookId,
    pub available_copies: u32,
    pub total_copies: u32,
}

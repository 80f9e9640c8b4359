//! Book catalogue and availability endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use inventory::{Book, BookAvailability};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub total_copies: u32,
}

#[derive(Deserialize)]
pub struct ListBooksQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl From<Book> for BookResponse {
    fn from(b: Book) -> Self {
        Self {
            id: b.id.to_string(),
            title: b.title,
            author: b.author,
            isbn: b.isbn,
            category: b.category,
            description: b.description,
            total_copies: b.total_copies,
            available_copies: b.available_copies,
        }
    }
}

/// POST /books: add a book to the catalogue.
#[tracing::instrument(skip(state, req), fields(title = %req.title))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    if req.title.trim().is_empty() || req.author.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "title and author are required".to_string(),
        ));
    }

    let mut book = Book::new(req.title, req.author, req.total_copies);
    if let Some(isbn) = req.isbn {
        book = book.with_isbn(isbn);
    }
    if let Some(category) = req.category {
        book = book.with_category(category);
    }
    if let Some(description) = req.description {
        book = book.with_description(description);
    }

    state.catalogue.add_book(book.clone()).await?;
    Ok((StatusCode::CREATED, Json(BookResponse::from(book))))
}

/// GET /books: list the catalogue, optionally by category.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBooksQuery>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = state.catalogue.list_books(query.category.as_deref()).await?;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

/// GET /books/{id}/availability: copy counts, served through the cache.
#[tracing::instrument(skip(state))]
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookAvailability>, ApiError> {
    let book_id = parse_id("book id", &id)?;
    Ok(Json(state.coordinator.book_availability(book_id).await?))
}

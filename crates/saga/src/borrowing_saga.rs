//! Borrow and return saga constants.

/// Saga label for borrowing a book.
pub const SAGA_BORROW: &str = "borrow_book";

/// Saga label for returning a book.
pub const SAGA_RETURN: &str = "return_book";

/// Step name: user, book, duplicate and limit checks.
pub const STEP_CHECK_ELIGIBILITY: &str = "check_eligibility";

/// Step name: conditional decrement at the inventory service.
pub const STEP_DECREMENT_AVAILABILITY: &str = "decrement_availability";

/// Step name: conditional insert into the borrowing ledger.
pub const STEP_RECORD_BORROWING: &str = "record_borrowing";

/// Step name: give the decremented copy back after a failed insert.
pub const STEP_COMPENSATE_DECREMENT: &str = "compensate_decrement";

/// Step name: close the borrowing with its fine.
pub const STEP_MARK_RETURNED: &str = "mark_returned";

/// Step name: best-effort increment after a return.
pub const STEP_INCREMENT_AVAILABILITY: &str = "increment_availability";

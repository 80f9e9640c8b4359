use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fine::days_overdue;
use crate::{BookId, BorrowingId, LendingError, Money, Result, UserId};

/// A loan of one copy of a book to one user.
///
/// The book and the user are held by id only; both belong to other
/// services. Once `returned` is set the record is terminal and its fine
/// can no longer change.
///
/// Deserialization goes through the same consistency checks as rows read
/// from the database, so a cached copy cannot carry a return time without
/// the returned flag or a due date before the loan began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BorrowingRecord")]
pub struct Borrowing {
    pub(crate) id: BorrowingId,
    pub(crate) user_id: UserId,
    pub(crate) book_id: BookId,
    pub(crate) borrowed_at: DateTime<Utc>,
    pub(crate) due_at: DateTime<Utc>,
    pub(crate) returned_at: Option<DateTime<Utc>>,
    pub(crate) returned: bool,
    pub(crate) fine_amount: Money,
}

/// Unchecked shape of a serialized borrowing.
#[derive(Deserialize)]
struct BorrowingRecord {
    id: BorrowingId,
    user_id: UserId,
    book_id: BookId,
    borrowed_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    returned: bool,
    fine_amount: Money,
}

impl TryFrom<BorrowingRecord> for Borrowing {
    type Error = LendingError;

    fn try_from(r: BorrowingRecord) -> Result<Self> {
        Borrowing {
            id: r.id,
            user_id: r.user_id,
            book_id: r.book_id,
            borrowed_at: r.borrowed_at,
            due_at: r.due_at,
            returned_at: r.returned_at,
            returned: r.returned,
            fine_amount: r.fine_amount,
        }
        .checked()
    }
}

impl Borrowing {
    /// Creates an active borrowing due `loan_period` after `borrowed_at`.
    ///
    /// A negative period is treated as zero and a due date past the end
    /// of the calendar saturates there. Callers that need to refuse such
    /// periods check them first.
    pub fn new(
        id: BorrowingId,
        user_id: UserId,
        book_id: BookId,
        borrowed_at: DateTime<Utc>,
        loan_period: Duration,
    ) -> Self {
        Self {
            id,
            user_id,
            book_id,
            borrowed_at,
            due_at: borrowed_at
                .checked_add_signed(loan_period.max(Duration::zero()))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            returned_at: None,
            returned: false,
            fine_amount: Money::zero(),
        }
    }

    /// Creates an active borrowing with an explicit due date.
    pub fn with_due_date(
        id: BorrowingId,
        user_id: UserId,
        book_id: BookId,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            book_id,
            borrowed_at,
            due_at,
            returned_at: None,
            returned: false,
            fine_amount: Money::zero(),
        }
    }

    /// Rejects field combinations no operation can produce.
    pub(crate) fn checked(self) -> Result<Self> {
        if self.returned != self.returned_at.is_some() {
            return Err(LendingError::CorruptRecord(format!(
                "borrowing {}: returned flag disagrees with return time",
                self.id
            )));
        }
        if self.due_at < self.borrowed_at {
            return Err(LendingError::CorruptRecord(format!(
                "borrowing {}: due before it was borrowed",
                self.id
            )));
        }
        if self.fine_amount.is_negative() || (!self.returned && !self.fine_amount.is_zero()) {
            return Err(LendingError::CorruptRecord(format!(
                "borrowing {}: fine {} does not fit its state",
                self.id, self.fine_amount
            )));
        }
        Ok(self)
    }

    /// Closes the borrowing. Fails if it was already returned, leaving the
    /// recorded fine and return time untouched.
    pub(crate) fn close(&mut self, returned_at: DateTime<Utc>, fine_amount: Money) -> Result<()> {
        if self.returned {
            return Err(LendingError::AlreadyReturned(self.id));
        }
        self.returned = true;
        self.returned_at = Some(returned_at);
        self.fine_amount = fine_amount;
        Ok(())
    }

    pub fn id(&self) -> BorrowingId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn borrowed_at(&self) -> DateTime<Utc> {
        self.borrowed_at
    }

    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    pub fn is_returned(&self) -> bool {
        self.returned
    }

    /// Active means not yet returned.
    pub fn is_active(&self) -> bool {
        !self.returned
    }

    pub fn fine_amount(&self) -> Money {
        self.fine_amount
    }

    /// Returns true if the borrowing is still out past its due date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.returned && now > self.due_at
    }

    /// Whole days past due, as of `now` for an active borrowing or as of
    /// the return for a closed one.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> u32 {
        days_overdue(self.due_at, self.returned_at.unwrap_or(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
    }

    fn borrowing() -> Borrowing {
        Borrowing::new(
            BorrowingId::new(),
            UserId::new(),
            BookId::new(),
            start(),
            Duration::days(14),
        )
    }

    #[test]
    fn new_borrowing_is_active_and_due_after_loan_period() {
        let b = borrowing();
        assert!(b.is_active());
        assert_eq!(b.due_at(), start() + Duration::days(14));
        assert!(b.fine_amount().is_zero());
        assert!(b.returned_at().is_none());
    }

    #[test]
    fn overdue_tracking() {
        let b = borrowing();
        assert!(!b.is_overdue(start() + Duration::days(14)));
        assert!(b.is_overdue(start() + Duration::days(15)));
        assert_eq!(b.days_overdue(start() + Duration::days(17)), 3);
    }

    #[test]
    fn closing_twice_keeps_the_first_fine() {
        let mut b = borrowing();
        let first_return = start() + Duration::days(20);
        b.close(first_return, Money::from_dollars(6)).unwrap();

        let second = b.close(start() + Duration::days(40), Money::from_dollars(26));

        assert!(matches!(second, Err(LendingError::AlreadyReturned(_))));
        assert_eq!(b.fine_amount(), Money::from_dollars(6));
        assert_eq!(b.returned_at(), Some(first_return));
        assert!(!b.is_overdue(start() + Duration::days(50)));
        assert_eq!(b.days_overdue(start() + Duration::days(50)), 6);
    }

    #[test]
    fn serializes_with_ids_only() {
        let b = borrowing();
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["book_id"], b.book_id().to_string());
        assert_eq!(json["returned"], false);
    }

    #[test]
    fn deserialization_restores_consistent_records() {
        let mut b = borrowing();
        b.close(start() + Duration::days(3), Money::zero()).unwrap();
        let json = serde_json::to_string(&b).unwrap();
        let back: Borrowing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn deserialization_rejects_inconsistent_records() {
        let b = borrowing();

        let mut returned_without_time = serde_json::to_value(&b).unwrap();
        returned_without_time["returned"] = serde_json::json!(true);
        assert!(serde_json::from_value::<Borrowing>(returned_without_time).is_err());

        let mut time_without_flag = serde_json::to_value(&b).unwrap();
        time_without_flag["returned_at"] = serde_json::to_value(start()).unwrap();
        assert!(serde_json::from_value::<Borrowing>(time_without_flag).is_err());

        let mut due_before_start = serde_json::to_value(&b).unwrap();
        due_before_start["due_at"] = serde_json::to_value(start() - Duration::days(1)).unwrap();
        assert!(serde_json::from_value::<Borrowing>(due_before_start).is_err());

        let mut fined_while_active = serde_json::to_value(&b).unwrap();
        fined_while_active["fine_amount"] = serde_json::to_value(Money::from_dollars(2)).unwrap();
        assert!(serde_json::from_value::<Borrowing>(fined_while_active).is_err());
    }

    #[test]
    fn huge_loan_period_saturates_instead_of_overflowing() {
        let b = Borrowing::new(
            BorrowingId::new(),
            UserId::new(),
            BookId::new(),
            start(),
            Duration::days(i64::from(u32::MAX)),
        );
        assert_eq!(b.due_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!b.is_overdue(start() + Duration::days(36500)));
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each entity gets its own type so a `BookId` can never be passed where a
/// `UserId` is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a book, owned by the inventory service.
    BookId
);

uuid_id!(
    /// Identifier of a library user, owned by the user service.
    UserId
);

uuid_id!(
    /// Identifier of a borrowing record, owned by the borrowing service.
    BorrowingId
);

uuid_id!(
    /// Identifier of a reservation.
    ReservationId
);

/// Client-generated key attached to a remote mutation.
///
/// The inventory service records every key it has applied together with the
/// outcome, so replaying a request after an ambiguous timeout returns the
/// recorded outcome instead of mutating twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a key from an arbitrary string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Creates a random key for one-off mutations.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Key for the decrement that backs a borrowing.
    pub fn borrow(borrowing_id: BorrowingId) -> Self {
        Self(format!("borrow:{borrowing_id}"))
    }

    /// Key for the increment that undoes a borrow decrement.
    pub fn compensate(borrowing_id: BorrowingId) -> Self {
        Self(format!("compensate:{borrowing_id}"))
    }

    /// Key for the increment issued when a borrowing is returned.
    pub fn give_back(borrowing_id: BorrowingId) -> Self {
        Self(format!("return:{borrowing_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! The borrowing service's view of library users.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{LendingError, Result, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Staff => "staff",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Role::Member),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }
}

/// A library user.
///
/// The active-borrowing count is not stored here; it is always computed
/// from the ledger when a decision needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn member(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            role: Role::Member,
        }
    }

    pub fn staff(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            role: Role::Staff,
        }
    }
}

/// Lookup of users owned by the user service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Registers a user. Re-registering an id replaces the stored user.
    async fn add_user(&self, user: User) -> Result<()>;

    async fn count_users(&self) -> Result<u64>;
}

/// In-memory user directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn add_user(&self, user: User) -> Result<()> {
        self.add(user).await;
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.users.read().await.len() as u64)
    }
}

/// User directory reading the user service's table.
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/users");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, role FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.try_get("role")?;
        Ok(Some(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            role: Role::parse(&role)
                .ok_or_else(|| LendingError::CorruptRecord(format!("user role {role}")))?,
        }))
    }

    async fn add_user(&self, user: User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, role) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, role = EXCLUDED.role
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_known_and_unknown_users() {
        let directory = InMemoryUserDirectory::new();
        let alice = User::member("alice");
        let id = alice.id;
        directory.add(alice).await;

        let found = directory.get_user(id).await.unwrap().unwrap();
        assert_eq!(found.role, Role::Member);
        assert!(directory.get_user(UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_user_replaces_existing_entry() {
        let directory = InMemoryUserDirectory::new();
        let mut user = User::member("bob");
        directory.add_user(user.clone()).await.unwrap();
        user.role = Role::Staff;
        directory.add_user(user.clone()).await.unwrap();

        assert_eq!(directory.get_user(user.id).await.unwrap(), Some(user));
        assert_eq!(directory.count_users().await.unwrap(), 1);
    }

    #[test]
    fn role_text_round_trip() {
        assert_eq!(Role::parse(Role::Staff.as_str()), Some(Role::Staff));
        assert_eq!(Role::parse("admin"), None);
    }
}

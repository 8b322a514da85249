/// Identity store
///
/// Persistence contract consumed by the credential service. Email uniqueness
/// and single-record token updates rely on the store's own atomicity.
/// Cancellation is by dropping the returned future; the service bounds every
/// call with a timeout.

mod memory;
mod postgres;

pub use memory::InMemoryIdentityStore;
pub use postgres::PgIdentityStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::Identity;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Fails with `StoreError::Duplicate` when the email is already taken
    async fn insert(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Fails with `StoreError::NotFound` when no record has this id
    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Replace the token pair only if the stored refresh token still equals
    /// `expected_refresh_token`. Returns `false` when it does not, or when no
    /// record has this id.
    async fn rotate_tokens(
        &self,
        id: Uuid,
        expected_refresh_token: &str,
        access_token: &str,
        refresh_token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn count_by_email(&self, email: &str) -> Result<i64, StoreError>;
}

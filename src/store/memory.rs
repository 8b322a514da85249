/// In-memory identity store
///
/// Same contract as the Postgres store, including email uniqueness.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::Identity;
use crate::store::IdentityStore;

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: Mutex<HashMap<Uuid, Identity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Identity>>, StoreError> {
        self.identities
            .lock()
            .map_err(|_| StoreError::Persistence("identity map lock poisoned".to_string()))
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn insert(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut identities = self.lock()?;

        if identities.values().any(|existing| existing.email == identity.email) {
            return Err(StoreError::Duplicate);
        }
        if identities.contains_key(&identity.id) {
            return Err(StoreError::Duplicate);
        }

        identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut identities = self.lock()?;
        let identity = identities.get_mut(&id).ok_or(StoreError::NotFound)?;

        identity.access_token = access_token.to_string();
        identity.refresh_token = refresh_token.to_string();
        identity.updated_at = updated_at;
        Ok(())
    }

    async fn rotate_tokens(
        &self,
        id: Uuid,
        expected_refresh_token: &str,
        access_token: &str,
        refresh_token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut identities = self.lock()?;
        let identity = match identities.get_mut(&id) {
            Some(identity) if identity.refresh_token == expected_refresh_token => identity,
            _ => return Ok(false),
        };

        identity.access_token = access_token.to_string();
        identity.refresh_token = refresh_token.to_string();
        identity.updated_at = updated_at;
        Ok(true)
    }

    async fn count_by_email(&self, email: &str) -> Result<i64, StoreError> {
        Ok(self
            .lock()?
            .values()
            .filter(|identity| identity.email == email)
            .count() as i64)
    }
}

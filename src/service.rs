/// Credential Service
///
/// Orchestrates signup, signin, token write-back, refresh-token redemption
/// and authorization over an injected identity store, token codec and
/// password hasher. Every failure returns early; no path issues tokens after
/// a failed check.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{Capability, IdentityClaims, PasswordHasher, RefreshClaims, TokenCodec, TokenPair};
use crate::error::{AppError, AuthError, StoreError};
use crate::identity::Identity;
use crate::store::IdentityStore;
use crate::validators::validate_signup;

/// Raw signup input as received from the transport
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: String,
}

/// A freshly registered identity and its first token pair
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub identity: Identity,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenCodec,
    hasher: PasswordHasher,
    store_timeout: Duration,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        tokens: TokenCodec,
        hasher: PasswordHasher,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
            store_timeout,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Register a new identity and issue its first token pair
    ///
    /// # Errors
    /// - `Validation` listing every violated input constraint
    /// - `DuplicateIdentity` if the email is taken, including a lost insert race
    /// - `HashingFailure` if bcrypt fails; nothing is persisted
    /// - `Store` on persistence failure or time-out
    pub async fn signup(&self, request: SignupRequest) -> Result<SignupOutcome, AppError> {
        let input = validate_signup(
            &request.name,
            &request.email,
            &request.password,
            &request.user_type,
        )?;

        let existing = self
            .bounded("count_by_email", self.store.count_by_email(&input.email))
            .await?;
        if existing > 0 {
            tracing::info!("Signup rejected: email already registered");
            return Err(AppError::DuplicateIdentity);
        }

        let password_hash = self.hasher.hash(&input.password).await?;

        let now = Utc::now();
        let mut identity = Identity {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            password_hash,
            user_type: input.user_type,
            access_token: String::new(),
            refresh_token: String::new(),
            created_at: now,
            updated_at: now,
        };

        let tokens = self.tokens.mint_pair(&identity)?;
        identity.access_token = tokens.access_token.clone();
        identity.refresh_token = tokens.refresh_token.clone();

        self.bounded("insert", self.store.insert(&identity)).await?;

        tracing::info!(
            user_id = %identity.id,
            user_type = %identity.user_type,
            "Identity registered"
        );

        Ok(SignupOutcome { identity, tokens })
    }

    /// Authenticate by email and password, rotating the stored token pair
    ///
    /// Unknown email and wrong password fail with the same
    /// `InvalidCredentials` error.
    pub async fn signin(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let email = email.trim().to_lowercase();

        let mut identity = match self
            .bounded("find_by_email", self.store.find_by_email(&email))
            .await?
        {
            Some(identity) => identity,
            None => {
                tracing::info!("Signin rejected: unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.hasher.verify(password, &identity.password_hash).await {
            tracing::info!(user_id = %identity.id, "Signin rejected: password mismatch");
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.tokens.mint_pair(&identity)?;
        let updated_at = self.refresh(identity.id, &tokens).await?;

        identity.access_token = tokens.access_token;
        identity.refresh_token = tokens.refresh_token;
        identity.updated_at = updated_at;

        tracing::info!(user_id = %identity.id, "Identity signed in");
        Ok(identity)
    }

    /// Write a token pair onto an identity record
    ///
    /// An unknown id is a persistence failure here, not a client error.
    pub async fn refresh(&self, identity_id: Uuid, tokens: &TokenPair) -> Result<DateTime<Utc>, AppError> {
        let updated_at = Utc::now();

        self.bounded(
            "update_tokens",
            self.store.update_tokens(
                identity_id,
                &tokens.access_token,
                &tokens.refresh_token,
                updated_at,
            ),
        )
        .await
        .map_err(|e| match e {
            StoreError::NotFound => StoreError::Persistence(format!(
                "token write-back matched no identity {}",
                identity_id
            )),
            other => other,
        })?;

        Ok(updated_at)
    }

    /// Redeem a refresh token for a new pair
    ///
    /// Only the refresh token currently stored on the record is accepted, so
    /// each refresh token can be redeemed once.
    pub async fn renew(&self, refresh_token: &str) -> Result<Identity, AppError> {
        let claims: RefreshClaims = self.tokens.validate(refresh_token).map_err(|e| {
            tracing::info!("Refresh rejected: {}", e);
            AuthError::Unauthenticated
        })?;

        let mut identity = match self
            .bounded("find_by_id", self.store.find_by_id(claims.sub))
            .await?
        {
            Some(identity) => identity,
            None => {
                tracing::warn!(user_id = %claims.sub, "Refresh token for unknown identity");
                return Err(AuthError::Unauthenticated.into());
            }
        };

        if identity.refresh_token != refresh_token {
            tracing::warn!(user_id = %identity.id, "Superseded refresh token presented");
            return Err(AuthError::Unauthenticated.into());
        }

        let tokens = self.tokens.mint_pair(&identity)?;
        let updated_at = Utc::now();

        // A concurrent redemption of the same token loses the swap
        let rotated = self
            .bounded(
                "rotate_tokens",
                self.store.rotate_tokens(
                    identity.id,
                    refresh_token,
                    &tokens.access_token,
                    &tokens.refresh_token,
                    updated_at,
                ),
            )
            .await?;
        if !rotated {
            tracing::warn!(user_id = %identity.id, "Refresh token redeemed concurrently");
            return Err(AuthError::Unauthenticated.into());
        }

        identity.access_token = tokens.access_token;
        identity.refresh_token = tokens.refresh_token;
        identity.updated_at = updated_at;

        tracing::info!(user_id = %identity.id, "Token pair renewed");
        Ok(identity)
    }

    /// Validate an access token and check it grants `capability`
    pub fn authorize(&self, token: &str, capability: Capability) -> Result<IdentityClaims, AppError> {
        let claims: IdentityClaims = self.tokens.validate(token).map_err(|e| {
            tracing::debug!("Access token rejected: {}", e);
            AuthError::Unauthenticated
        })?;

        capability.check(&claims).map_err(|e| {
            tracing::warn!(user_id = %claims.sub, ?capability, "Capability check failed");
            e
        })?;

        Ok(claims)
    }

    pub async fn find_identity(&self, id: Uuid) -> Result<Identity, AppError> {
        self.bounded("find_by_id", self.store.find_by_id(id))
            .await?
            .ok_or(AppError::IdentityNotFound)
    }

    /// Run a store call under the configured timeout. Dropping the future on
    /// expiry cancels the underlying query.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Identity store call timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticSigningKeys;
    use crate::identity::UserType;
    use crate::store::InMemoryIdentityStore;
    use async_trait::async_trait;

    const TEST_COST: u32 = 4;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            Arc::new(StaticSigningKeys::from_secret(
                b"test-secret-key-at-least-32-characters-long",
            )),
            "test",
            chrono::Duration::hours(24),
            chrono::Duration::hours(168),
        )
    }

    fn service_with(store: Arc<dyn IdentityStore>, timeout: Duration) -> CredentialService {
        CredentialService::new(store, codec(), PasswordHasher::new(TEST_COST, 2), timeout)
    }

    fn service() -> (CredentialService, Arc<InMemoryIdentityStore>) {
        let store = Arc::new(InMemoryIdentityStore::new());
        (service_with(store.clone(), Duration::from_secs(5)), store)
    }

    fn signup_request(name: &str, email: &str, password: &str, user_type: &str) -> SignupRequest {
        SignupRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            user_type: user_type.to_string(),
        }
    }

    fn alice() -> SignupRequest {
        signup_request("Alice", "alice@x.com", "secret1", "ADMIN")
    }

    /// Store whose calls never complete
    struct StalledStore;

    #[async_trait]
    impl IdentityStore for StalledStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<Identity>, StoreError> {
            futures::future::pending().await
        }
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<Identity>, StoreError> {
            futures::future::pending().await
        }
        async fn insert(&self, _identity: &Identity) -> Result<(), StoreError> {
            futures::future::pending().await
        }
        async fn update_tokens(
            &self,
            _id: Uuid,
            _access_token: &str,
            _refresh_token: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            futures::future::pending().await
        }
        async fn rotate_tokens(
            &self,
            _id: Uuid,
            _expected_refresh_token: &str,
            _access_token: &str,
            _refresh_token: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            futures::future::pending().await
        }
        async fn count_by_email(&self, _email: &str) -> Result<i64, StoreError> {
            futures::future::pending().await
        }
    }

    /// Store that reports a free email but rejects the insert as a duplicate,
    /// as happens when two signups race past the count check
    struct RacingStore;

    #[async_trait]
    impl IdentityStore for RacingStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<Identity>, StoreError> {
            Ok(None)
        }
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<Identity>, StoreError> {
            Ok(None)
        }
        async fn insert(&self, _identity: &Identity) -> Result<(), StoreError> {
            Err(StoreError::Duplicate)
        }
        async fn update_tokens(
            &self,
            _id: Uuid,
            _access_token: &str,
            _refresh_token: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Persistence("write failed".to_string()))
        }
        async fn rotate_tokens(
            &self,
            _id: Uuid,
            _expected_refresh_token: &str,
            _access_token: &str,
            _refresh_token: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Persistence("write failed".to_string()))
        }
        async fn count_by_email(&self, _email: &str) -> Result<i64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn signup_returns_id_and_two_distinct_tokens() {
        let (service, store) = service();
        let outcome = service.signup(alice()).await.expect("signup failed");

        assert!(!outcome.tokens.access_token.is_empty());
        assert!(!outcome.tokens.refresh_token.is_empty());
        assert_ne!(outcome.tokens.access_token, outcome.tokens.refresh_token);

        let stored = store.find_by_id(outcome.identity.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token, outcome.tokens.access_token);
        assert_eq!(stored.refresh_token, outcome.tokens.refresh_token);
        assert_ne!(stored.password_hash, "secret1");
        assert!(crate::auth::verify_password("secret1", &stored.password_hash));
        assert_eq!(stored.created_at, stored.updated_at);
    }

    #[tokio::test]
    async fn signup_then_signin_rotates_tokens() {
        let (service, _) = service();
        let outcome = service.signup(alice()).await.unwrap();

        let identity = service.signin("alice@x.com", "secret1").await.unwrap();

        assert_eq!(identity.id, outcome.identity.id);
        assert_eq!(identity.user_type, UserType::Admin);
        assert_ne!(identity.access_token, outcome.tokens.access_token);
        assert_ne!(identity.refresh_token, outcome.tokens.refresh_token);

        let claims = service
            .authorize(&identity.access_token, Capability::Authenticated)
            .unwrap();
        assert_eq!(claims.sub, identity.id);
        assert_eq!(claims.email, "alice@x.com");
    }

    #[tokio::test]
    async fn second_signup_with_same_email_is_duplicate() {
        let (service, store) = service();
        let first = service.signup(alice()).await.unwrap();

        let result = service
            .signup(signup_request("Alice Two", "ALICE@x.com", "other-secret", "USER"))
            .await;
        assert!(matches!(result, Err(AppError::DuplicateIdentity)));

        // The original record is untouched
        let stored = store.find_by_email("alice@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.identity.id);
        assert_eq!(stored.name, "Alice");
    }

    #[tokio::test]
    async fn insert_race_is_reported_as_duplicate() {
        let service = service_with(Arc::new(RacingStore), Duration::from_secs(5));
        let result = service.signup(alice()).await;
        assert!(matches!(result, Err(AppError::DuplicateIdentity)));
    }

    #[tokio::test]
    async fn signup_rejects_invalid_input_without_persisting() {
        let (service, store) = service();
        let result = service
            .signup(signup_request("", "nope", "123", "ROOT"))
            .await;

        match result {
            Err(AppError::Validation(errors)) => assert_eq!(errors.0.len(), 4),
            other => panic!("expected validation error, got {:?}", other.map(|o| o.identity.id)),
        }
        assert_eq!(store.count_by_email("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let (service, _) = service();
        service.signup(alice()).await.unwrap();

        let unknown = service.signin("bob@nowhere.com", "whatever").await.unwrap_err();
        let wrong = service.signin("alice@x.com", "wrong-secret").await.unwrap_err();

        assert!(matches!(unknown, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, AppError::Auth(AuthError::InvalidCredentials)));
        assert_eq!(unknown.code(), wrong.code());
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn failed_signin_leaves_stored_tokens_alone() {
        let (service, store) = service();
        let outcome = service.signup(alice()).await.unwrap();

        assert!(service.signin("alice@x.com", "wrong-secret").await.is_err());

        let stored = store.find_by_id(outcome.identity.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token, outcome.tokens.access_token);
        assert_eq!(stored.refresh_token, outcome.tokens.refresh_token);
    }

    #[tokio::test]
    async fn signin_fails_when_write_back_fails() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let service = service_with(store.clone(), Duration::from_secs(5));
        service.signup(alice()).await.unwrap();

        // A record that verifies but can no longer be written
        let failing = service_with(Arc::new(WriteFailingStore(store)), Duration::from_secs(5));
        let result = failing.signin("alice@x.com", "secret1").await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::Persistence(_)))
        ));
    }

    /// Delegates reads to an inner store and fails every token write
    struct WriteFailingStore(Arc<InMemoryIdentityStore>);

    #[async_trait]
    impl IdentityStore for WriteFailingStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
            self.0.find_by_email(email).await
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
            self.0.find_by_id(id).await
        }
        async fn insert(&self, identity: &Identity) -> Result<(), StoreError> {
            self.0.insert(identity).await
        }
        async fn update_tokens(
            &self,
            id: Uuid,
            _access_token: &str,
            _refresh_token: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Persistence(format!("write to {} failed", id)))
        }
        async fn rotate_tokens(
            &self,
            id: Uuid,
            _expected_refresh_token: &str,
            _access_token: &str,
            _refresh_token: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Persistence(format!("write to {} failed", id)))
        }
        async fn count_by_email(&self, email: &str) -> Result<i64, StoreError> {
            self.0.count_by_email(email).await
        }
    }

    /// Delegates to an inner store, suspending once after the `find_by_id`
    /// read the way a networked store would
    struct YieldingStore(Arc<InMemoryIdentityStore>);

    #[async_trait]
    impl IdentityStore for YieldingStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
            self.0.find_by_email(email).await
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
            let found = self.0.find_by_id(id).await;
            tokio::task::yield_now().await;
            found
        }
        async fn insert(&self, identity: &Identity) -> Result<(), StoreError> {
            self.0.insert(identity).await
        }
        async fn update_tokens(
            &self,
            id: Uuid,
            access_token: &str,
            refresh_token: &str,
            updated_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.0
                .update_tokens(id, access_token, refresh_token, updated_at)
                .await
        }
        async fn rotate_tokens(
            &self,
            id: Uuid,
            expected_refresh_token: &str,
            access_token: &str,
            refresh_token: &str,
            updated_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.0
                .rotate_tokens(id, expected_refresh_token, access_token, refresh_token, updated_at)
                .await
        }
        async fn count_by_email(&self, email: &str) -> Result<i64, StoreError> {
            self.0.count_by_email(email).await
        }
    }

    #[tokio::test]
    async fn refresh_writes_tokens_onto_record() {
        let (service, store) = service();
        let outcome = service.signup(alice()).await.unwrap();
        let pair = TokenPair {
            access_token: "new-access".to_string(),
            refresh_token: "new-refresh".to_string(),
        };

        let updated_at = service.refresh(outcome.identity.id, &pair).await.unwrap();

        let stored = store.find_by_id(outcome.identity.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "new-access");
        assert_eq!(stored.refresh_token, "new-refresh");
        assert_eq!(stored.updated_at, updated_at);
    }

    #[tokio::test]
    async fn refresh_of_unknown_identity_is_persistence_error() {
        let (service, _) = service();
        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };

        let result = service.refresh(Uuid::new_v4(), &pair).await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::Persistence(_)))
        ));
    }

    #[tokio::test]
    async fn store_timeout_surfaces_as_timeout() {
        let service = service_with(Arc::new(StalledStore), Duration::from_millis(20));

        let signin = service.signin("alice@x.com", "secret1").await;
        assert!(matches!(signin, Err(AppError::Store(StoreError::Timeout))));

        let signup = service.signup(alice()).await;
        assert!(matches!(signup, Err(AppError::Store(StoreError::Timeout))));
    }

    #[tokio::test]
    async fn renew_rotates_and_rejects_superseded_refresh_token() {
        let (service, _) = service();
        let outcome = service.signup(alice()).await.unwrap();

        let renewed = service.renew(&outcome.tokens.refresh_token).await.unwrap();
        assert_ne!(renewed.refresh_token, outcome.tokens.refresh_token);
        assert_ne!(renewed.access_token, outcome.tokens.access_token);

        let replay = service.renew(&outcome.tokens.refresh_token).await;
        assert!(matches!(replay, Err(AppError::Auth(AuthError::Unauthenticated))));

        assert!(service.renew(&renewed.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn renew_rejects_access_tokens() {
        let (service, _) = service();
        let outcome = service.signup(alice()).await.unwrap();

        let result = service.renew(&outcome.tokens.access_token).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::Unauthenticated))));
    }

    #[tokio::test]
    async fn concurrent_renewals_redeem_refresh_token_once() {
        let inner = Arc::new(InMemoryIdentityStore::new());
        let service = service_with(
            Arc::new(YieldingStore(inner.clone())),
            Duration::from_secs(5),
        );
        let outcome = service.signup(alice()).await.unwrap();
        let refresh_token = &outcome.tokens.refresh_token;

        let (first, second) = tokio::join!(service.renew(refresh_token), service.renew(refresh_token));

        let winner = match (&first, &second) {
            (Ok(renewed), Err(_)) | (Err(_), Ok(renewed)) => renewed.refresh_token.clone(),
            _ => panic!("expected exactly one renewal to succeed"),
        };

        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AppError::Auth(AuthError::Unauthenticated))));

        let stored = inner.find_by_id(outcome.identity.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token, winner);
    }

    #[tokio::test]
    async fn signup_hashing_failure_persists_nothing() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let service = CredentialService::new(
            store.clone(),
            codec(),
            PasswordHasher::new(99, 1),
            Duration::from_secs(5),
        );

        let result = service.signup(alice()).await;

        assert!(matches!(result, Err(AppError::HashingFailure(_))));
        assert_eq!(store.count_by_email("alice@x.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn authorize_rejects_expired_token() {
        let (service, _) = service();
        let outcome = service.signup(alice()).await.unwrap();

        let issued_long_ago = Utc::now().timestamp() - 48 * 3_600;
        let expired = service
            .tokens()
            .mint_pair_at(&outcome.identity, issued_long_ago)
            .unwrap();

        let result = service.authorize(&expired.access_token, Capability::Authenticated);
        assert!(matches!(result, Err(AppError::Auth(AuthError::Unauthenticated))));
    }

    #[tokio::test]
    async fn authorize_rejects_garbage() {
        let (service, _) = service();
        let result = service.authorize("not-a-token", Capability::Authenticated);
        assert!(matches!(result, Err(AppError::Auth(AuthError::Unauthenticated))));
    }

    #[tokio::test]
    async fn authorize_self_or_admin() {
        let (service, _) = service();
        let admin = service.signup(alice()).await.unwrap();
        let bob = service
            .signup(signup_request("Bob", "bob@x.com", "secret2", "USER"))
            .await
            .unwrap();
        let carol = service
            .signup(signup_request("Carol", "carol@x.com", "secret3", "USER"))
            .await
            .unwrap();

        let bob_token = &bob.tokens.access_token;
        assert!(service
            .authorize(bob_token, Capability::SelfOrAdmin(bob.identity.id))
            .is_ok());
        assert!(matches!(
            service.authorize(bob_token, Capability::SelfOrAdmin(carol.identity.id)),
            Err(AppError::Auth(AuthError::Forbidden))
        ));
        assert!(service
            .authorize(
                &admin.tokens.access_token,
                Capability::SelfOrAdmin(carol.identity.id)
            )
            .is_ok());
    }

    #[tokio::test]
    async fn find_identity() {
        let (service, _) = service();
        let outcome = service.signup(alice()).await.unwrap();

        let found = service.find_identity(outcome.identity.id).await.unwrap();
        assert_eq!(found.email, "alice@x.com");

        let missing = service.find_identity(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::IdentityNotFound)));
    }
}

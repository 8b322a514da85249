/// Password Hashing and Verification
///
/// bcrypt hashing with a configurable work factor. The async `PasswordHasher`
/// runs the CPU-bound work on the blocking pool behind a semaphore so a burst
/// of signins cannot starve the request workers.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::AppError;

/// bcrypt only reads the first 72 bytes of its input
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a password using bcrypt
///
/// # Errors
/// Returns `HashingFailure` if the password exceeds bcrypt's input limit,
/// the cost is out of range, or bcrypt itself fails.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::HashingFailure(format!(
            "password exceeds {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }

    bcrypt::hash(password, cost)
        .map_err(|e| AppError::HashingFailure(format!("bcrypt failed: {}", e)))
}

/// Verify a password against its hash
///
/// A malformed hash is reported as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Password verification error treated as mismatch: {}", e);
            false
        }
    }
}

/// Bounded, non-blocking front for bcrypt
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    permits: Arc<Semaphore>,
}

impl PasswordHasher {
    pub fn new(cost: u32, max_concurrent: usize) -> Self {
        Self {
            cost,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::HashingFailure("hashing pool closed".to_string()))?;

        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AppError::HashingFailure(format!("hashing task failed: {}", e)))?
    }

    pub async fn verify(&self, password: &str, hash: &str) -> bool {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };

        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Verification task failed: {}", e);
                false
            })
    }
}

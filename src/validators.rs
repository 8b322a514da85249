/// Input validators for signup requests
/// Features:
/// 1. Length limits on every field (DoS protection)
/// 2. Email syntax validation
/// 3. Control-character rejection in names
/// 4. Collection of every violated constraint in one pass

use regex::Regex;
use lazy_static::lazy_static;

use crate::auth::MAX_PASSWORD_BYTES;
use crate::error::{ValidationError, ValidationErrors};
use crate::identity::UserType;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MIN_NAME_LENGTH: usize = 2;
const MAX_NAME_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 6;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).expect("email regex is valid");
}

/// Signup input after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSignup {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: UserType,
}

/// Validate every signup field, reporting all violations together
pub fn validate_signup(
    name: &str,
    email: &str,
    password: &str,
    user_type: &str,
) -> Result<ValidSignup, ValidationErrors> {
    let mut violations = Vec::new();

    let name = is_valid_name(name).map_err(|e| violations.push(e)).ok();
    let email = is_valid_email(email).map_err(|e| violations.push(e)).ok();
    let password_ok = is_valid_password(password)
        .map_err(|e| violations.push(e))
        .is_ok();
    let user_type = user_type
        .parse::<UserType>()
        .map_err(|e| violations.push(e))
        .ok();

    match (name, email, password_ok, user_type) {
        (Some(name), Some(email), true, Some(user_type)) => Ok(ValidSignup {
            name,
            email,
            password: password.to_string(),
            user_type,
        }),
        _ => Err(ValidationErrors(violations)),
    }
}

/// Validates email address
/// - Checks length constraints
/// - Checks format using RFC 5322 simplified regex
/// - Lowercases so uniqueness is case-insensitive
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email", MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email"));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates display name
/// - Checks length constraints
/// - Rejects control characters
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }

    let length = trimmed.chars().count();
    if length < MIN_NAME_LENGTH {
        return Err(ValidationError::TooShort("name", MIN_NAME_LENGTH));
    }

    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name", MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("name"));
    }

    Ok(trimmed.to_string())
}

/// Validates password length. The upper bound is bcrypt's input limit.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_BYTES));
    }

    Ok(())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if let Some(at_pos) = email.find('@') {
        if email[..at_pos].len() > MAX_LOCAL_PART_LENGTH {
            return true;
        }
    }

    email.matches('@').count() != 1
}

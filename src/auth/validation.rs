use serde::de::DeserializeOwned;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::error::AppError;

const PASSWORD_SPECIALS: &str = "@$!%*?&";

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,
    #[validate(
        email(message = "Invalid email format"),
        length(max = 100, message = "Email cannot exceed 100 characters")
    )]
    pub email: String,
    #[validate(length(min = 10, max = 100, message = "Password must be between 10 and 100 characters"))]
    #[validate(custom(
        function = "validate_password_strength",
        message = "Password must contain an uppercase letter, a lowercase letter, a digit and one of @$!%*?&"
    ))]
    pub password: String,
}

fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    let charset_ok = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));

    if has_lower && has_upper && has_digit && has_special && charset_ok {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength"))
    }
}

/// Decodes a JSON body and runs its validation rules.
pub fn parse_body<T: DeserializeOwned + Validate>(body: &[u8]) -> Result<T, AppError> {
    let input: T = serde_json::from_slice(body)
        .map_err(|e| AppError::ValidationError(format!("invalid JSON body: {}", e)))?;
    input.validate()?;
    Ok(input)
}

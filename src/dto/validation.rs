//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates a chat handle: 1 to 32 characters of letters, digits and underscores,
/// optionally prefixed with `@`.
///
/// # Examples
///
/// ```ignore
/// validate_username("@arena_5") // Ok
/// validate_username("two words") // Err - space
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let handle = username.strip_prefix('@').unwrap_or(username);
    if handle.is_empty() || handle.chars().count() > 32 {
        let mut err = ValidationError::new("username_length");
        err.message = Some("Username must be between 1 and 32 characters".into());
        return Err(err);
    }

    if !handle.chars().all(|c| c.is_alphanumeric() || c == '_') {
        let mut err = ValidationError::new("username_format");
        err.message = Some("Username may contain only letters, digits and underscores".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a phone number: digits only, with an optional leading `+`.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number must be 7 to 15 digits".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_valid() {
        assert!(validate_username("arena_5").is_ok());
        assert!(validate_username("@Coach").is_ok());
    }

    #[test]
    fn test_validate_username_invalid() {
        assert!(validate_username("").is_err());
        assert!(validate_username("@").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+77001112233").is_ok());
        assert!(validate_phone("77001112233").is_ok());
        assert!(validate_phone("7700-111").is_err());
        assert!(validate_phone("123").is_err());
    }
}

//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest nickname accepted at the DTO boundary.
pub const NICKNAME_MAX_CHARS: usize = 24;

/// Validates that a game PIN is exactly 6 ASCII digits.
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("Game PIN must be exactly 6 digits".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a player nickname: non-blank, bounded length, no control
/// characters. Uniqueness within the session is enforced by the store.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    if nickname.trim().is_empty() {
        let mut err = ValidationError::new("nickname_blank");
        err.message = Some("Nickname must not be blank".into());
        return Err(err);
    }

    if nickname.chars().count() > NICKNAME_MAX_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message =
            Some(format!("Nickname must be at most {NICKNAME_MAX_CHARS} characters").into());
        return Err(err);
    }

    if nickname.chars().any(char::is_control) {
        let mut err = ValidationError::new("nickname_control_chars");
        err.message = Some("Nickname must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin_valid() {
        assert!(validate_pin("123456").is_ok());
        assert!(validate_pin("000000").is_ok());
    }

    #[test]
    fn test_validate_pin_invalid() {
        assert!(validate_pin("12345").is_err()); // too short
        assert!(validate_pin("1234567").is_err()); // too long
        assert!(validate_pin("12345a").is_err()); // non-digit
        assert!(validate_pin("").is_err()); // empty
    }

    #[test]
    fn test_validate_nickname_valid() {
        assert!(validate_nickname("Ada").is_ok());
        assert!(validate_nickname("player one").is_ok());
    }

    #[test]
    fn test_validate_nickname_invalid() {
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(25)).is_err());
        assert!(validate_nickname("bad\nname").is_err());
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
}

pub fn validate_nickname(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 32 {
        return Err(ValidationError::TooLong { max: 32, got: len });
    }
    Ok(())
}

/// Installation ids come from the client; bound them and keep them printable
/// so they are safe to log and index.
pub fn validate_installation_id(id: &str) -> Result<(), ValidationError> {
    let len = id.len();
    if len < 8 {
        return Err(ValidationError::TooShort { min: 8, got: len });
    }
    if len > 64 {
        return Err(ValidationError::TooLong { max: 64, got: len });
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_channel_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 100 {
        return Err(ValidationError::TooLong { max: 100, got: len });
    }
    Ok(())
}

pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    let len = content.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 2000 {
        return Err(ValidationError::TooLong { max: 2000, got: len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installation_id_rules() {
        assert!(validate_installation_id("a1b2c3d4-e5f6").is_ok());
        assert!(validate_installation_id("short").is_err());
        assert!(validate_installation_id("has spaces not allowed").is_err());
    }

    #[test]
    fn message_content_bounds() {
        assert!(validate_message_content("hi").is_ok());
        assert!(validate_message_content("").is_err());
        assert!(validate_message_content(&"x".repeat(2001)).is_err());
    }
}

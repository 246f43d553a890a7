use anyhow::{Result, anyhow};

pub fn validate_fcm_token(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(anyhow!("fcmToken cannot be empty"));
    }

    if token.len() < 20 {
        return Err(anyhow!("fcmToken too short (minimum 20 characters)"));
    }

    if token.len() > 4096 {
        return Err(anyhow!("fcmToken too long (maximum 4096 characters)"));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(anyhow!("fcmToken contains invalid characters"));
    }

    Ok(())
}

pub fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} is required", field));
    }
    Ok(())
}

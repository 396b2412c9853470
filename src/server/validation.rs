use crate::server::response::ApiError;

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ApiError::bad_request("invalid email address"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
        return Err(ApiError::bad_request("invalid email address"));
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<(), ApiError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ApiError::bad_request(
            "url must start with http:// or https://",
        ));
    }
    Ok(())
}

pub fn validate_interval_minutes(interval: i64) -> Result<(), ApiError> {
    if !(1..=10_080).contains(&interval) {
        return Err(ApiError::bad_request(
            "interval_minutes must be between 1 and 10080",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@nodot").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("example.com").is_err());
    }

    #[test]
    fn test_validate_interval() {
        assert!(validate_interval_minutes(60).is_ok());
        assert!(validate_interval_minutes(0).is_err());
        assert!(validate_interval_minutes(20_000).is_err());
    }
}

use crate::errors::AppError;
use regex::Regex;

/// Email shape check for operator-supplied arguments.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    // RFC 5322 simplified email regex
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .map(|re| re.is_match(email))
    .unwrap_or(false)
}

/// Reads `<email> <password>` from positional arguments (program name excluded).
pub fn email_and_password(args: &[String]) -> Result<(String, String), AppError> {
    let (email, password) = match args {
        [email, password, ..] => (email.trim(), password.as_str()),
        _ => {
            return Err(AppError::Config(
                "usage: <email> <password>".to_string(),
            ))
        }
    };

    if !is_valid_email(email) {
        return Err(AppError::Config(format!("'{}' is not a valid email", email)));
    }
    if password.len() < 6 {
        return Err(AppError::Config(
            "password must be at least 6 characters".to_string(),
        ));
    }

    Ok((email.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("founder@example.com"));
        assert!(is_valid_email("probe+abc123@example.co.uk"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("founder"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("a@b"));
    }

    #[test]
    fn test_email_and_password_parsed() {
        let (email, password) =
            email_and_password(&args(&[" founder@example.com ", "hunter22"])).unwrap();
        assert_eq!(email, "founder@example.com");
        assert_eq!(password, "hunter22");
    }

    #[test]
    fn test_missing_password_rejected() {
        assert!(email_and_password(&args(&["founder@example.com"])).is_err());
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(email_and_password(&args(&["founder@example.com", "abc"])).is_err());
    }
}

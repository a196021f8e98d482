//! Security utilities for credential protection and output redaction.
//!
//! # Security Guarantees
//! - Credentials are stored in `Zeroizing` containers for automatic memory clearing
//! - Sensitive columns are masked in every row returned to a caller
//! - Redaction fails closed
//!
//! # Module Structure
//! - `credentials`: Secure credential container with automatic memory zeroing
//! - `redaction`: Column-name based masking of result rows

mod credentials;
mod redaction;

pub use credentials::Credentials;
pub use redaction::{
    REDACTION_MASK, SENSITIVE_NAMES, is_sensitive_column, redact_row, redact_rows,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_zeroization() {
        let creds = Credentials::new("user".to_string(), Some("password".to_string()));
        assert_eq!(creds.username(), "user");
        assert!(creds.has_password());
        // Credentials will be automatically zeroized on drop
    }

    #[test]
    fn test_redaction_mask_is_stable() {
        assert_eq!(REDACTION_MASK, "***REDACTED***");
        assert!(SENSITIVE_NAMES.iter().all(|name| is_sensitive_column(name)));
    }
}

//! API credentials

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// An API key and secret pair.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The raw secret. Never log it.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Value for the `Authorization` header
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.key, self.secret));
        format!("Basic {token}")
    }

    /// JAAS configuration authenticating a cluster link with these credentials
    pub fn jaas_config(&self) -> String {
        format!(
            "org.apache.kafka.common.security.plain.PlainLoginModule required username=\"{}\" password=\"{}\";",
            self.key, self.secret
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let creds = Credentials::new("user", "pass");
        assert_eq!(creds.basic_auth(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = Credentials::new("KEY", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("KEY"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_jaas_config() {
        let creds = Credentials::new("KEY", "SECRET");
        assert!(creds.jaas_config().contains("username=\"KEY\""));
        assert!(creds.jaas_config().ends_with("password=\"SECRET\";"));
    }
}

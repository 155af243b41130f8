//! Credential types for authentication.

use std::borrow::Cow;

/// User name and password for an X Protocol session.
///
/// Credentials are designed to minimize copying of sensitive data.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: Cow<'static, str>,
    password: Cow<'static, str>,
}

impl Credentials {
    /// Create credentials from a user name and password.
    pub fn new(
        username: impl Into<Cow<'static, str>>,
        password: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether the password is empty.
    #[must_use]
    pub fn has_empty_password(&self) -> bool {
        self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose sensitive data in debug output
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("app", "s3cret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("app"));
        assert!(!debug.contains("s3cret"));
    }
}

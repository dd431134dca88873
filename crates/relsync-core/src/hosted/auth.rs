//! Credentials for the hosted API.

/// How the token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer {token}` (API keys and OAuth tokens).
    Bearer,
    /// `Authorization: HmacScheme {token}` (pre-signed CI tokens).
    Hmac,
}

impl AuthScheme {
    /// Header prefix for this scheme.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Bearer => "Bearer",
            Self::Hmac => "HmacScheme",
        }
    }
}

/// A scheme plus token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Header scheme.
    pub scheme: AuthScheme,
    /// Secret token.
    pub token: String,
}

impl Credential {
    /// Bearer credential.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::Bearer,
            token: token.into(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.scheme.prefix(), self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Source of credentials. Returning `None` means "not logged in".
pub trait AuthProvider: Send + Sync {
    /// Current credential, if any.
    fn credential(&self) -> Option<Credential>;
}

/// A fixed credential, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth(Option<Credential>);

impl StaticAuth {
    /// Wrap a credential.
    pub fn new(credential: Option<Credential>) -> Self {
        Self(credential)
    }

    /// Bearer auth from an API key; an empty key counts as missing.
    pub fn from_api_key(key: Option<&str>) -> Self {
        Self(key.filter(|k| !k.trim().is_empty()).map(Credential::bearer))
    }
}

impl AuthProvider for StaticAuth {
    fn credential(&self) -> Option<Credential> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_redaction() {
        let cred = Credential::bearer("s3cret");
        assert_eq!(cred.header_value(), "Bearer s3cret");
        assert!(!format!("{cred:?}").contains("s3cret"));

        let hmac = Credential {
            scheme: AuthScheme::Hmac,
            token: "sig".to_string(),
        };
        assert_eq!(hmac.header_value(), "HmacScheme sig");
    }

    #[test]
    fn blank_api_key_is_missing() {
        assert!(StaticAuth::from_api_key(Some("  ")).credential().is_none());
        assert!(StaticAuth::from_api_key(None).credential().is_none());
        assert!(StaticAuth::from_api_key(Some("k")).credential().is_some());
    }
}

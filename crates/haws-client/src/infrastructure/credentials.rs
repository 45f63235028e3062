//! Where the access token comes from.
//!
//! The binary takes its token from the command line or the config file.
//! When neither supplies one, it falls back to `SUPERVISOR_TOKEN`, which
//! the supervisor injects into add-on containers.

/// Environment variable holding the token inside an add-on container.
pub const SUPERVISOR_TOKEN_VAR: &str = "SUPERVISOR_TOKEN";

/// A source of hub access tokens.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialSource: Send + Sync {
    /// The token, or `None` if this source has none.
    fn token(&self) -> Option<String>;

    /// Short description for log records.  Never includes the token.
    fn describe(&self) -> String;
}

/// A token fixed at construction.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone()).filter(|t| !t.is_empty())
    }

    fn describe(&self) -> String {
        "configured token".to_string()
    }
}

/// A token read from an environment variable on every call.
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    /// Reads [`SUPERVISOR_TOKEN_VAR`].
    pub fn supervisor() -> Self {
        Self::new(SUPERVISOR_TOKEN_VAR)
    }
}

impl CredentialSource for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|t| !t.is_empty())
    }

    fn describe(&self) -> String {
        format!("${}", self.var)
    }
}

/// Returns the first token offered by `sources`, in order, with the
/// description of the source that supplied it.
pub fn resolve_token(sources: &[&dyn CredentialSource]) -> Option<(String, String)> {
    sources
        .iter()
        .find_map(|source| source.token().map(|token| (token, source.describe())))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token_empty_is_none() {
        assert_eq!(StaticToken::new("").token(), None);
        assert_eq!(StaticToken::new("T").token().as_deref(), Some("T"));
    }

    #[test]
    fn test_env_token_missing_variable_is_none() {
        let source = EnvToken::new("HAWS_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(source.token(), None);
        assert_eq!(source.describe(), "$HAWS_TEST_TOKEN_THAT_IS_NEVER_SET");
    }

    #[test]
    fn test_resolve_token_prefers_first_source() {
        // Arrange
        let mut first = MockCredentialSource::new();
        first.expect_token().return_const(Some("from-cli".to_string()));
        first.expect_describe().return_const("cli".to_string());
        let mut second = MockCredentialSource::new();
        second.expect_token().never();

        // Act
        let resolved = resolve_token(&[&first, &second]);

        // Assert
        assert_eq!(resolved, Some(("from-cli".to_string(), "cli".to_string())));
    }

    #[test]
    fn test_resolve_token_falls_back() {
        let mut empty = MockCredentialSource::new();
        empty.expect_token().times(1).return_const(None::<String>);
        let mut fallback = MockCredentialSource::new();
        fallback.expect_token().return_const(Some("env".to_string()));
        fallback
            .expect_describe()
            .return_const("$SUPERVISOR_TOKEN".to_string());

        let resolved = resolve_token(&[&empty, &fallback]);

        assert_eq!(resolved.map(|(token, _)| token).as_deref(), Some("env"));
    }

    #[test]
    fn test_resolve_token_none_when_no_source_has_one() {
        let mut empty = MockCredentialSource::new();
        empty.expect_token().return_const(None::<String>);

        assert_eq!(resolve_token(&[&empty]), None);
    }
}

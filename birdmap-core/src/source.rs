use async_trait::async_trait;
use std::fmt::{self, Debug};

use crate::{error::{AuthFailure, FetchError}, model::{NotableQuery, Observation}};

pub mod ebird;

/// Environment variable holding the eBird API key.
pub const API_KEY_ENV: &str = "EBIRD_API_KEY";

/// An eBird API token. Never printed: `Debug` is redacted and there is no
/// `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key. Blank input counts as missing.
    pub fn new(raw: impl Into<String>) -> Result<Self, FetchError> {
        let raw = raw.into();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(FetchError::Auth(AuthFailure::Missing));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Something that can produce the notable observations for a query.
#[async_trait]
pub trait ObservationSource: Send + Sync + Debug {
    async fn fetch_notable(&self, query: &NotableQuery) -> Result<Vec<Observation>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_missing() {
        for raw in ["", "   ", "\n"] {
            let err = ApiKey::new(raw).unwrap_err();
            assert!(matches!(err, FetchError::Auth(AuthFailure::Missing)));
        }
    }

    #[test]
    fn key_is_trimmed() {
        let key = ApiKey::new("  abc123\n").unwrap();
        assert_eq!(key.expose(), "abc123");
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = ApiKey::new("super-secret-token").unwrap();
        let shown = format!("{key:?}");

        assert!(!shown.contains("super-secret-token"));
        assert!(shown.contains("redacted"));
    }
}

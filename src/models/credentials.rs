//! Credential bundles: the cookies that authenticate one operator account.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScrapeError;

/// Wildcard cookie domain for the platform.
pub const PLATFORM_COOKIE_DOMAIN: &str = ".x.com";

/// One browser cookie. Domain and path are optional in the stored JSON and
/// default to the platform host and `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CookieEntry {
    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or(PLATFORM_COOKIE_DOMAIN)
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }
}

/// An ordered list of cookies authenticating one operator account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub cookies: Vec<CookieEntry>,
}

impl CredentialBundle {
    /// Parse a bundle from its stored JSON form: an array of cookie objects.
    /// Tolerates `key` as an alias for `name`; entries without a name or
    /// value are skipped.
    pub fn from_json(raw: &str) -> Result<Self, ScrapeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ScrapeError::Config(format!("invalid cookie JSON: {e}")))?;
        let items = value
            .as_array()
            .ok_or_else(|| ScrapeError::Config("cookie JSON must be an array".to_string()))?;

        let mut cookies = Vec::with_capacity(items.len());
        for item in items {
            let name = item
                .get("name")
                .or_else(|| item.get("key"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let value = item.get("value").and_then(|v| v.as_str()).unwrap_or_default();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            cookies.push(CookieEntry {
                name: name.to_string(),
                value: value.to_string(),
                domain: item
                    .get("domain")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                path: item
                    .get("path")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            });
        }
        Ok(Self { cookies })
    }

    /// Parse a JSON array of bundles (the `X_COOKIES_LIST` config value).
    /// Each element is itself an array of cookie objects; empty bundles are
    /// dropped.
    pub fn list_from_json(raw: &str) -> Result<Vec<Self>, ScrapeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ScrapeError::Config(format!("invalid cookie-list JSON: {e}")))?;
        let items = value
            .as_array()
            .ok_or_else(|| ScrapeError::Config("cookie list must be an array".to_string()))?;

        let mut bundles = Vec::with_capacity(items.len());
        for item in items {
            let bundle = Self::from_json(&item.to_string())?;
            if !bundle.cookies.is_empty() {
                bundles.push(bundle);
            }
        }
        Ok(bundles)
    }

    /// Whether the bundle carries the session cookie the platform requires
    /// for viewing conversations.
    pub fn has_auth_token(&self) -> bool {
        self.cookies.iter().any(|c| c.name == "auth_token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_defaults_domain_and_path() {
        let bundle =
            CredentialBundle::from_json(r#"[{"name":"auth_token","value":"abc123"}]"#).unwrap();
        assert_eq!(bundle.cookies.len(), 1);
        assert_eq!(bundle.cookies[0].domain(), ".x.com");
        assert_eq!(bundle.cookies[0].path(), "/");
        assert!(bundle.has_auth_token());
    }

    #[test]
    fn from_json_accepts_key_alias_and_skips_empty() {
        let bundle = CredentialBundle::from_json(
            r#"[{"key":"ct0","value":"def"},{"name":"","value":"x"},{"name":"gt"}]"#,
        )
        .unwrap();
        assert_eq!(bundle.cookies.len(), 1);
        assert_eq!(bundle.cookies[0].name, "ct0");
        assert!(!bundle.has_auth_token());
    }

    #[test]
    fn list_from_json_drops_empty_bundles() {
        let bundles = CredentialBundle::list_from_json(
            r#"[[{"name":"auth_token","value":"a"}],[],[{"name":"ct0","value":"b","domain":".twitter.com"}]]"#,
        )
        .unwrap();
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[1].cookies[0].domain(), ".twitter.com");
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(CredentialBundle::from_json("{not json").is_err());
        assert!(CredentialBundle::from_json(r#"{"name":"a"}"#).is_err());
    }
}

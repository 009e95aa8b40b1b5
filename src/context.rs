// 🍪 Session Context - read-only snapshot of the host's ambient state
//
// The host (browser extension, CLI, test) hands adapters a cookie string and
// a key-value token store. Adapters never read process-wide globals.

use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Semicolon-delimited cookie header value ("a=1; b=2")
    cookies: String,

    /// Token storage (localStorage / sessionStorage equivalent)
    storage: BTreeMap<String, String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set the cookie string
    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = cookies.into();
        self
    }

    /// Builder pattern: add one storage entry
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage.insert(key.into(), value.into());
        self
    }

    /// Load a token store dumped as a flat JSON object of string values.
    pub fn with_storage_file(mut self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token store: {}", path.display()))?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("Token store is not a JSON string map: {}", path.display()))?;
        self.storage.extend(entries);
        Ok(self)
    }

    pub fn cookies(&self) -> &str {
        &self.cookies
    }

    /// Value of a named cookie, percent-decoded. Empty values count as absent.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.split(';').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key.trim() != name {
                return None;
            }
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some(decoded)
        })
    }

    pub fn storage_keys(&self) -> impl Iterator<Item = &str> {
        self.storage.keys().map(|k| k.as_str())
    }

    pub fn storage_item(&self, key: &str) -> Option<&str> {
        self.storage.get(key).map(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_lookup_trims_and_decodes() {
        let ctx = SessionContext::new().with_cookies("a=1;  harbor_session=abc%3D%3D ; b=");
        assert_eq!(ctx.cookie("a"), Some("1".to_string()));
        assert_eq!(ctx.cookie("harbor_session"), Some("abc==".to_string()));
        assert_eq!(ctx.cookie("b"), None);
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn test_cookie_name_must_match_exactly() {
        let ctx = SessionContext::new().with_cookies("xharbor_session=1");
        assert_eq!(ctx.cookie("harbor_session"), None);
    }

    #[test]
    fn test_storage_items() {
        let ctx = SessionContext::new()
            .with_item("k1", "v1")
            .with_item("k2", "v2");
        assert_eq!(ctx.storage_keys().collect::<Vec<_>>(), vec!["k1", "k2"]);
        assert_eq!(ctx.storage_item("k2"), Some("v2"));
        assert_eq!(ctx.storage_item("k3"), None);
    }
}

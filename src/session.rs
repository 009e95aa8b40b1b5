// 🔑 Session Locator - find a bank credential in the ambient context
//
// Strategies:
// 1. CookieLocator     → named cookie, then a fallback cookie
// 2. TokenStoreLocator → scan OIDC token records, prefer the broadest scope
// 3. Scoped fallback   → adapters call `find_scoped` and substitute the
//                        profile's session credential when the narrow token is absent

use crate::context::SessionContext;
use crate::error::{AdapterError, AdapterResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// COOKIE EXTRACTION
// ============================================================================

#[derive(Debug, Clone)]
pub struct CookieLocator {
    bank: &'static str,
    primary: &'static str,
    fallback: Option<&'static str>,
}

impl CookieLocator {
    pub fn new(bank: &'static str, primary: &'static str) -> Self {
        CookieLocator {
            bank,
            primary,
            fallback: None,
        }
    }

    /// Builder pattern: secondary cookie consulted when the primary is absent
    pub fn with_fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn locate(&self, ctx: &SessionContext) -> AdapterResult<String> {
        if let Some(value) = ctx.cookie(self.primary) {
            return Ok(value);
        }

        if let Some(fallback) = self.fallback {
            if let Some(value) = ctx.cookie(fallback) {
                debug!(bank = self.bank, cookie = fallback, "using fallback session cookie");
                return Ok(value);
            }
        }

        let tried = match self.fallback {
            Some(fallback) => format!("cookies '{}' and '{}' are absent", self.primary, fallback),
            None => format!("cookie '{}' is absent", self.primary),
        };
        Err(AdapterError::session_not_found(self.bank, tried))
    }
}

// ============================================================================
// TOKEN STORE SCAN
// ============================================================================

/// OIDC user record as cached by browser OIDC clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,

    #[serde(default)]
    pub scope: String,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub expires_at: Option<i64>,

    /// ID token claims (sub, name, given_name, ...)
    #[serde(default)]
    pub profile: serde_json::Value,
}

impl StoredToken {
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|s| s == scope)
    }
}

/// Scans storage keys shaped like `oidc.user:<authority>:<client_id>`.
///
/// The authority may be stored with or without a trailing slash.
#[derive(Debug, Clone)]
pub struct TokenStoreLocator {
    bank: &'static str,
    key_pattern: Regex,
    preferred_scope: &'static str,
}

impl TokenStoreLocator {
    pub fn new(
        bank: &'static str,
        authority: &str,
        preferred_scope: &'static str,
    ) -> AdapterResult<Self> {
        let authority = authority.trim_end_matches('/');
        let pattern = format!(r"^oidc\.user:{}/?:[^:]+$", regex::escape(authority));
        let key_pattern = Regex::new(&pattern)
            .map_err(|e| AdapterError::Config(format!("invalid token key pattern: {}", e)))?;

        Ok(TokenStoreLocator {
            bank,
            key_pattern,
            preferred_scope,
        })
    }

    /// Every decodable token under a matching key, in key order.
    ///
    /// Returns the number of matching keys alongside, so callers can tell
    /// "no keys" from "keys with undecodable values".
    fn matching_tokens(&self, ctx: &SessionContext) -> (usize, Vec<StoredToken>) {
        let mut matched = 0;
        let mut tokens = Vec::new();

        for key in ctx.storage_keys().filter(|k| self.key_pattern.is_match(k)) {
            matched += 1;
            let Some(raw) = ctx.storage_item(key) else {
                continue;
            };
            match serde_json::from_str::<StoredToken>(raw) {
                Ok(token) if !token.access_token.is_empty() => tokens.push(token),
                Ok(_) => debug!(bank = self.bank, key, "token record without access_token"),
                Err(e) => debug!(bank = self.bank, key, error = %e, "undecodable token record"),
            }
        }

        (matched, tokens)
    }

    /// Token with the broadest access: prefer records granting the preferred
    /// scope, most scopes first; otherwise any matching record.
    pub fn locate(&self, ctx: &SessionContext) -> AdapterResult<StoredToken> {
        let (matched, tokens) = self.matching_tokens(ctx);
        if matched == 0 {
            return Err(AdapterError::session_not_found(
                self.bank,
                "no token store key matches the institution pattern",
            ));
        }

        let mut best: Option<&StoredToken> = None;
        for token in tokens.iter().filter(|t| t.has_scope(self.preferred_scope)) {
            let broader = match best {
                Some(current) => token.scopes().count() > current.scopes().count(),
                None => true,
            };
            if broader {
                best = Some(token);
            }
        }

        best.or_else(|| tokens.first())
            .cloned()
            .ok_or_else(|| {
                AdapterError::session_not_found(self.bank, "matching token records are unreadable")
            })
    }

    /// Token granting a specific (usually narrower) scope, if one is stored.
    pub fn find_scoped(&self, ctx: &SessionContext, scope: &str) -> Option<StoredToken> {
        let (_, tokens) = self.matching_tokens(ctx);
        tokens.into_iter().find(|t| t.has_scope(scope))
    }

    /// Token record whose access token equals `access_token`.
    pub fn find_by_access_token(
        &self,
        ctx: &SessionContext,
        access_token: &str,
    ) -> Option<StoredToken> {
        let (_, tokens) = self.matching_tokens(ctx);
        tokens.into_iter().find(|t| t.access_token == access_token)
    }
}

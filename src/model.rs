// 📦 Normalized Data Model - the only shapes that cross the adapter boundary
//
// Profile → Account → Statement → BinaryContent
// Every record is created once by an adapter and never mutated afterwards.
// Each child owns a copy of its parent (no back-references).

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PROFILE
// ============================================================================

/// Minimal identity record for one discovered session.
///
/// `profile_id` equals `session_id` when the bank has no separate identifier.
/// Serialized output never carries the credential: `session_id` is skipped,
/// and so is a `profile_id` that merely repeats it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    /// Raw credential used for authenticated calls
    #[serde(default)]
    pub session_id: String,

    /// Bank-assigned identifier
    pub profile_id: String,

    /// Display name, or adapter-defined fallback text
    pub profile_name: String,
}

impl Profile {
    pub fn new(
        session_id: impl Into<String>,
        profile_id: impl Into<String>,
        profile_name: impl Into<String>,
    ) -> Self {
        Profile {
            session_id: session_id.into(),
            profile_id: profile_id.into(),
            profile_name: profile_name.into(),
        }
    }

    /// Degraded profile used when optional enrichment is unavailable
    pub fn placeholder(session_id: &str, fallback_name: &str) -> Self {
        Profile::new(session_id, session_id, fallback_name)
    }
}

impl Serialize for Profile {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Profile", 2)?;
        if self.profile_id != self.session_id {
            state.serialize_field("profile_id", &self.profile_id)?;
        } else {
            state.skip_field("profile_id")?;
        }
        state.serialize_field("profile_name", &self.profile_name)?;
        state.end()
    }
}

// ============================================================================
// ACCOUNT TYPE
// ============================================================================

/// Closed account-type taxonomy shared by every bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Checking,
    Savings,
    CreditCard,
    Investment,
    Loan,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "Checking",
            AccountType::Savings => "Savings",
            AccountType::CreditCard => "Credit Card",
            AccountType::Investment => "Investment",
            AccountType::Loan => "Loan",
        }
    }
}

// ============================================================================
// ACCOUNT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub profile: Profile,
    pub account_id: String,
    pub account_name: String,
    /// Tail of the displayed account number (4-5 characters)
    pub account_mask: String,
    pub account_type: AccountType,
}

/// Take the last `len` alphanumeric characters of a displayed account number.
///
/// "XXXX-XXXXXX-71006" with len 5 → "71006"
/// "****1234" with len 4 → "1234"
pub fn account_mask(raw: &str, len: usize) -> String {
    let chars: Vec<char> = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let start = chars.len().saturating_sub(len);
    chars[start..].iter().collect()
}

// ============================================================================
// STATEMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub account: Account,
    /// Opaque per bank; unique within one listing
    pub statement_id: String,
    pub statement_date: DateTime<Utc>,
}

impl Statement {
    /// ISO 8601 instant, e.g. "2024-03-31T00:00:00Z"
    pub fn iso_date(&self) -> String {
        self.statement_date.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Suggested file name for callers that persist the document:
    /// `<bank>-<mask>-<YYYY-MM-DD>.pdf`
    pub fn file_name(&self, bank_id: &str) -> String {
        format!("{}.pdf", self.file_stem(bank_id))
    }

    /// Like `file_name`, with the statement id folded in. Unique per account
    /// even when two statements share a date.
    pub fn qualified_file_name(&self, bank_id: &str) -> String {
        let id: String = self
            .statement_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}-{}.pdf", self.file_stem(bank_id), id)
    }

    fn file_stem(&self, bank_id: &str) -> String {
        format!(
            "{}-{}-{}",
            bank_id,
            self.account.account_mask,
            self.statement_date.format("%Y-%m-%d")
        )
    }
}

// ============================================================================
// BINARY CONTENT
// ============================================================================

/// Downloaded statement document. Non-empty whenever an adapter returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryContent {
    bytes: Bytes,
    mime_type: String,
}

impl BinaryContent {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        BinaryContent {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

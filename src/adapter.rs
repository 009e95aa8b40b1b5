// 🏦 Bank Adapter Contract - one interface, five banks
//
// Adding a bank = implementing BankAdapter + registering it.
// Calling code never branches on the concrete bank.

use crate::error::{AdapterError, AdapterResult};
use crate::model::{Account, BinaryContent, Profile, Statement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// BANK IDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankId {
    Harbor,
    Summit,
    Cedar,
    Lakeshore,
    Northwind,
}

impl BankId {
    pub const ALL: [BankId; 5] = [
        BankId::Harbor,
        BankId::Summit,
        BankId::Cedar,
        BankId::Lakeshore,
        BankId::Northwind,
    ];

    /// Stable identifier used by the registry
    pub fn code(&self) -> &'static str {
        match self {
            BankId::Harbor => "harbor",
            BankId::Summit => "summit",
            BankId::Cedar => "cedar",
            BankId::Lakeshore => "lakeshore",
            BankId::Northwind => "northwind",
        }
    }

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            BankId::Harbor => "Harbor Card Services",
            BankId::Summit => "Summit Brokerage",
            BankId::Cedar => "Cedar Bank",
            BankId::Lakeshore => "Lakeshore Credit Union",
            BankId::Northwind => "Northwind Savings",
        }
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BankId {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        BankId::ALL
            .iter()
            .copied()
            .find(|bank| bank.code() == wanted)
            .ok_or_else(|| AdapterError::UnknownBank(s.to_string()))
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

/// The five operations every bank adapter provides.
///
/// Network-calling operations classify failures as
/// `Authentication` (401/403), `Upstream` (other non-2xx or bad shape),
/// or `Network` (no response).
#[async_trait]
pub trait BankAdapter: Send + Sync {
    /// Stable identifier, no side effects
    fn bank_id(&self) -> &'static str;

    /// Read the session credential from the injected context.
    ///
    /// Fails with `SessionNotFound` when nothing recognisable is stored.
    fn get_session_id(&self) -> AdapterResult<String>;

    /// Identity for a session. Degrades to placeholder values on partial
    /// data; fails only when the bank rejects the session.
    async fn get_profile(&self, session_id: &str) -> AdapterResult<Profile>;

    /// Eligible accounts, unique by id. Empty is `NoAccountsFound`.
    async fn get_accounts(&self, profile: &Profile) -> AdapterResult<Vec<Account>>;

    /// Statements newest first, unique by id. Empty is not an error.
    async fn get_statements(&self, account: &Account) -> AdapterResult<Vec<Statement>>;

    /// Decoded, validated document bytes.
    async fn download_statement(&self, statement: &Statement) -> AdapterResult<BinaryContent>;
}

/// Optional-enrichment rule for `get_profile`: shape/status problems degrade
/// to a placeholder profile, authorization and transport failures propagate.
pub(crate) fn degrade_profile(
    bank: &str,
    session_id: &str,
    fallback_name: &str,
    result: AdapterResult<Profile>,
) -> AdapterResult<Profile> {
    match result {
        Ok(profile) => Ok(profile),
        Err(err @ AdapterError::Upstream { .. }) => {
            warn!(bank, error = %err, "profile enrichment unavailable, using placeholder");
            Ok(Profile::placeholder(session_id, fallback_name))
        }
        Err(err) => Err(err),
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Adapters keyed by `bank_id`.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn BankAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn BankAdapter>) {
        self.adapters.insert(adapter.bank_id().to_string(), adapter);
    }

    pub fn get(&self, bank_id: &str) -> AdapterResult<Arc<dyn BankAdapter>> {
        self.adapters
            .get(bank_id)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownBank(bank_id.to_string()))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Adapters whose session credential is currently discoverable, sorted by id
    pub fn available(&self) -> Vec<Arc<dyn BankAdapter>> {
        self.ids()
            .iter()
            .filter_map(|id| self.adapters.get(id))
            .filter(|adapter| match adapter.get_session_id() {
                Ok(_) => true,
                Err(err) => {
                    debug!(bank = adapter.bank_id(), error = %err, "no session");
                    false
                }
            })
            .cloned()
            .collect()
    }
}

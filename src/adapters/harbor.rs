// 💳 Harbor Card Services
//
// - session: cookie `harbor_session`, fallback `hbr_auth`
// - profile + accounts: client state embedded in the dashboard page as a
//   nested-array string literal (see transit.rs)
// - accounts are the join of two sub-trees of that state:
//     accounts.registry  → entries grouped by product type
//     accounts.details   → display details keyed by account token
// - statements: one call, grouped by year → month, dates "YYYY/MM/DD"
// - download: raw PDF body

use crate::adapter::{degrade_profile, BankAdapter, BankId};
use crate::catalog::{classify, AccountSet, StatementCatalog};
use crate::config::AdapterSettings;
use crate::content::{self, ContentPolicy};
use crate::context::SessionContext;
use crate::error::{AdapterError, AdapterResult};
use crate::fields::{path, str_field};
use crate::http::{HttpRequest, Transport};
use crate::model::{account_mask, Account, AccountType, BinaryContent, Profile, Statement};
use crate::session::CookieLocator;
use crate::transit;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://online.harborcard.example";
pub const STATE_VARIABLE: &str = "__HARBOR_STATE__";
const SESSION_COOKIE: &str = "harbor_session";
const FALLBACK_COOKIE: &str = "hbr_auth";
const FALLBACK_NAME: &str = "Harbor Cardmember";
const MIN_DOCUMENT_BYTES: usize = 2048;
const MASK_LEN: usize = 5;

/// Product group → taxonomy
const PRODUCT_GROUPS: &[(&str, AccountType)] = &[
    ("CARD_PRODUCT", AccountType::CreditCard),
    ("CHARGE_CARD", AccountType::CreditCard),
    ("CREDIT_CARD", AccountType::CreditCard),
    ("LENDING", AccountType::Loan),
    ("PERSONAL_LOAN", AccountType::Loan),
    ("SAVINGS", AccountType::Savings),
    ("HIGH_YIELD_SAVINGS", AccountType::Savings),
    ("CERTIFICATE_OF_DEPOSIT", AccountType::Savings),
    ("CHECKING", AccountType::Checking),
];

const TOKEN_FIELDS: &[&str] = &["account_token", "accountToken"];
const TOKENS_FIELDS: &[&str] = &["account_tokens", "accountTokens"];
const KEY_FIELDS: &[&str] = &["account_key", "accountKey"];
const DISPLAY_FIELDS: &[&str] = &["display_account_number", "displayAccountNumber"];
const NAME_FIELDS: &[&str] = &["description", "product_name", "productName"];

pub struct HarborAdapter {
    ctx: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    cookies: CookieLocator,
    base_url: String,
    content: ContentPolicy,
}

impl HarborAdapter {
    pub fn new(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        settings: &AdapterSettings,
    ) -> Self {
        HarborAdapter {
            ctx,
            transport,
            cookies: CookieLocator::new(BankId::Harbor.code(), SESSION_COOKIE)
                .with_fallback(FALLBACK_COOKIE),
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            content: ContentPolicy::new(settings.min_document_bytes_or(MIN_DOCUMENT_BYTES)),
        }
    }

    /// Fetch the dashboard page and decode its embedded state.
    async fn load_state(&self, context: &str) -> AdapterResult<Value> {
        let response = self
            .transport
            .send(
                HttpRequest::get(format!("{}/dashboard", self.base_url))
                    .header("Accept", "text/html"),
            )
            .await?
            .ensure_success(context)?;

        let state = transit::parse_page_state(&response.text(), STATE_VARIABLE)?;
        if !state.is_object() {
            return Err(AdapterError::malformed(context, "decoded state is not a map"));
        }
        Ok(state)
    }
}

// ============================================================================
// STATE EXTRACTION
// ============================================================================

fn profile_from_state(state: &Value, session_id: &str) -> AdapterResult<Profile> {
    let profile = state
        .get("profile")
        .filter(|p| p.is_object())
        .ok_or_else(|| AdapterError::missing_field("profile", "profile"))?;

    let first = str_field(profile, &["first_name", "firstName"]);
    let last = str_field(profile, &["last_name", "lastName"]);
    let name = match (first, last) {
        (Some(f), Some(l)) => format!("{} {}", f, l),
        (Some(f), None) => f,
        (None, Some(l)) => l,
        (None, None) => FALLBACK_NAME.to_string(),
    };
    let profile_id =
        str_field(profile, &["profile_id", "profileId"]).unwrap_or_else(|| session_id.to_string());

    Ok(Profile::new(session_id, profile_id, name))
}

/// Tokens listed by one registry entry: a single token or a token list.
fn entry_tokens(entry: &Value) -> Vec<String> {
    let mut tokens: Vec<String> = TOKENS_FIELDS
        .iter()
        .find_map(|name| entry.get(*name).and_then(|v| v.as_array()))
        .map(|list| {
            list.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if let Some(token) = str_field(entry, TOKEN_FIELDS) {
        if !tokens.contains(&token) {
            tokens.insert(0, token);
        }
    }
    tokens
}

/// Join registry entries with their details by account token.
fn accounts_from_state(state: &Value, profile: &Profile) -> AdapterResult<Vec<Account>> {
    let registry = path(state, &["accounts", "registry"])
        .and_then(|r| r.as_object())
        .ok_or_else(|| AdapterError::missing_field("accounts", "accounts.registry"))?;
    let details = path(state, &["accounts", "details"]);

    let mut seen_keys = Vec::new();
    let mut accounts = AccountSet::new();

    for (group, entries) in registry {
        let Some(account_type) = classify(group, PRODUCT_GROUPS) else {
            debug!(group = %group, "skipping unsupported product group");
            continue;
        };

        // A group holds either a list of entries or a single entry.
        let entries: Vec<&Value> = match entries {
            Value::Array(list) => list.iter().collect(),
            Value::Object(_) => vec![entries],
            _ => return Err(AdapterError::missing_field("accounts", group)),
        };

        for entry in entries {
            let tokens = entry_tokens(entry);
            let Some(primary) = tokens.first().cloned() else {
                return Err(AdapterError::missing_field("accounts", "account_token"));
            };

            // Same underlying account under another token / group
            let key = str_field(entry, KEY_FIELDS).unwrap_or_else(|| primary.clone());
            if seen_keys.contains(&key) {
                continue;
            }
            seen_keys.push(key);

            let detail = tokens
                .iter()
                .find_map(|token| details.and_then(|d| d.get(token.as_str())))
                .filter(|d| d.is_object());

            let display = detail
                .and_then(|d| str_field(d, DISPLAY_FIELDS))
                .or_else(|| str_field(entry, DISPLAY_FIELDS))
                .unwrap_or_else(|| primary.clone());
            let name = detail
                .and_then(|d| str_field(d, NAME_FIELDS))
                .or_else(|| str_field(entry, NAME_FIELDS))
                .unwrap_or_else(|| format!("{} {}", BankId::Harbor.name(), account_type.as_str()));

            accounts.push(Account {
                profile: profile.clone(),
                account_id: primary,
                account_name: name,
                account_mask: account_mask(&display, MASK_LEN),
                account_type,
            });
        }
    }

    accounts.finish(BankId::Harbor.code())
}

/// `statements_by_year` → year → month → [statement] (or a single statement)
fn statements_from_listing(body: &Value, account: &Account) -> AdapterResult<Vec<Statement>> {
    let years = body
        .get("statements_by_year")
        .or_else(|| body.get("statementsByYear"))
        .and_then(|y| y.as_object())
        .ok_or_else(|| AdapterError::missing_field("statements", "statements_by_year"))?;

    let mut catalog = StatementCatalog::new(account);
    for months in years.values() {
        let Some(months) = months.as_object() else {
            continue;
        };
        for entries in months.values() {
            let entries: Vec<&Value> = match entries {
                Value::Array(list) => list.iter().collect(),
                other => vec![other],
            };
            for entry in entries {
                let id = str_field(entry, &["statement_id", "statementId"])
                    .ok_or_else(|| AdapterError::missing_field("statements", "statement_id"))?;
                let date = str_field(entry, &["closing_date", "closingDate"]);
                catalog.push_raw(id, date.as_deref());
            }
        }
    }

    Ok(catalog.finish())
}

// ============================================================================
// CONTRACT
// ============================================================================

#[async_trait]
impl BankAdapter for HarborAdapter {
    fn bank_id(&self) -> &'static str {
        BankId::Harbor.code()
    }

    fn get_session_id(&self) -> AdapterResult<String> {
        self.cookies.locate(&self.ctx)
    }

    async fn get_profile(&self, session_id: &str) -> AdapterResult<Profile> {
        let result = match self.load_state("profile").await {
            Ok(state) => profile_from_state(&state, session_id),
            Err(err) => Err(err),
        };
        degrade_profile(self.bank_id(), session_id, FALLBACK_NAME, result)
    }

    async fn get_accounts(&self, profile: &Profile) -> AdapterResult<Vec<Account>> {
        let state = self.load_state("accounts").await?;
        let accounts = accounts_from_state(&state, profile)?;
        info!(bank = self.bank_id(), count = accounts.len(), "accounts listed");
        Ok(accounts)
    }

    async fn get_statements(&self, account: &Account) -> AdapterResult<Vec<Statement>> {
        let url = format!(
            "{}/api/servicing/v1/statements?account_token={}",
            self.base_url,
            urlencoding::encode(&account.account_id)
        );
        let body: Value = self
            .transport
            .send(HttpRequest::get(url).header("Accept", "application/json"))
            .await?
            .ensure_success("statements")?
            .json("statements")?;

        statements_from_listing(&body, account)
    }

    async fn download_statement(&self, statement: &Statement) -> AdapterResult<BinaryContent> {
        let url = format!(
            "{}/api/servicing/v1/statements/pdf?account_token={}&statement_id={}",
            self.base_url,
            urlencoding::encode(&statement.account.account_id),
            urlencoding::encode(&statement.statement_id)
        );
        let response = self
            .transport
            .send(HttpRequest::get(url).header("Accept", "application/pdf"))
            .await?
            .ensure_success("download")?;

        self.content
            .validate(&statement.statement_id, content::from_raw(response))
    }
}

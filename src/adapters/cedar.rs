// 🌲 Cedar Bank
//
// - session: OIDC token store, keys `oidc.user:<authority>[/]:<client>`;
//   the token granting `accounts` with the most scopes wins
// - profile: claims cached alongside the token, no network call
// - statements: one call per year (current year + lookback window),
//   entries carry year + month → last calendar day of that month
// - statements and downloads use a narrower `documents` token when one is
//   stored, else the profile's own credential
// - download: base64 in JSON `document.content`

use crate::adapter::{BankAdapter, BankId};
use crate::catalog::{
    classify, current_year, last_day_of_month, year_window, AccountSet, StatementCatalog,
};
use crate::config::AdapterSettings;
use crate::content::{self, ContentPolicy};
use crate::context::SessionContext;
use crate::error::AdapterResult;
use crate::fields::{i64_field, require_array, require_str, str_field};
use crate::http::{HttpRequest, Transport};
use crate::model::{account_mask, Account, AccountType, BinaryContent, Profile, Statement};
use crate::session::{StoredToken, TokenStoreLocator};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://api.cedarbank.example";
pub const AUTHORITY: &str = "https://login.cedar.example";
const ACCOUNTS_SCOPE: &str = "accounts";
const DOCUMENTS_SCOPE: &str = "documents";
const FALLBACK_NAME: &str = "Cedar Customer";
const MIN_DOCUMENT_BYTES: usize = 1024;
const LOOKBACK_YEARS: u32 = 2;

const PRODUCT_CODES: &[(&str, AccountType)] = &[
    ("DDA", AccountType::Checking),
    ("CHK", AccountType::Checking),
    ("SAV", AccountType::Savings),
    ("MMA", AccountType::Savings),
    ("CD", AccountType::Savings),
    ("CCA", AccountType::CreditCard),
    ("BRK", AccountType::Investment),
    ("IRA", AccountType::Investment),
    ("MTG", AccountType::Loan),
    ("HELOC", AccountType::Loan),
    ("ILA", AccountType::Loan),
];

pub struct CedarAdapter {
    ctx: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    tokens: TokenStoreLocator,
    base_url: String,
    content: ContentPolicy,
    lookback_years: u32,
    current_year: i32,
}

impl CedarAdapter {
    pub fn new(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        settings: &AdapterSettings,
    ) -> AdapterResult<Self> {
        Ok(CedarAdapter {
            ctx,
            transport,
            tokens: TokenStoreLocator::new(BankId::Cedar.code(), AUTHORITY, ACCOUNTS_SCOPE)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            content: ContentPolicy::new(settings.min_document_bytes_or(MIN_DOCUMENT_BYTES)),
            lookback_years: settings.lookback_years_or(LOOKBACK_YEARS),
            current_year: current_year(),
        })
    }

    /// Pin the year window (the newest year fetched).
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    /// `documents` token when stored, else the profile credential.
    fn documents_token(&self, account: &Account) -> String {
        match self.tokens.find_scoped(&self.ctx, DOCUMENTS_SCOPE) {
            Some(token) => token.access_token,
            None => {
                debug!("no documents-scoped token, using the profile credential");
                account.profile.session_id.clone()
            }
        }
    }

    async fn get_json(&self, path: &str, token: &str, context: &str) -> AdapterResult<Value> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, path))
            .bearer(token)
            .header("Accept", "application/json");
        self.transport.send(request).await?.ensure_success(context)?.json(context)
    }
}

fn profile_from_claims(token: &StoredToken, session_id: &str) -> Option<Profile> {
    let claims = &token.profile;
    let name = str_field(claims, &["name"]).or_else(|| {
        let given = str_field(claims, &["given_name"])?;
        Some(match str_field(claims, &["family_name"]) {
            Some(family) => format!("{} {}", given, family),
            None => given,
        })
    });
    let profile_id = str_field(claims, &["sub"]).unwrap_or_else(|| session_id.to_string());
    Some(Profile::new(session_id, profile_id, name?))
}

fn accounts_from_listing(body: &Value, profile: &Profile) -> AdapterResult<Vec<Account>> {
    let mut accounts = AccountSet::new();
    for raw in require_array(body, &["accounts"], "accounts")? {
        let id = require_str(raw, &["id", "accountId"], "accounts")?;
        let code = str_field(raw, &["productCode"]).unwrap_or_default();
        let Some(account_type) = classify(&code, PRODUCT_CODES) else {
            debug!(product_code = %code, "skipping unsupported product");
            continue;
        };

        let number =
            str_field(raw, &["maskedNumber", "accountNumber"]).unwrap_or_else(|| id.clone());
        let mask = account_mask(&number, 4);
        let name = str_field(raw, &["nickname", "productName"])
            .unwrap_or_else(|| format!("Cedar {} {}", account_type.as_str(), mask));

        accounts.push(Account {
            profile: profile.clone(),
            account_id: id,
            account_name: name,
            account_mask: mask,
            account_type,
        });
    }
    accounts.finish(BankId::Cedar.code())
}

/// One year's listing into the shared catalog.
fn push_year(catalog: &mut StatementCatalog, body: &Value) -> AdapterResult<()> {
    for entry in require_array(body, &["statements"], "statements")? {
        let id = require_str(entry, &["documentId", "id"], "statements")?;
        let date = match (i64_field(entry, &["year"]), i64_field(entry, &["month"])) {
            (Some(year), Some(month)) => {
                let year = i32::try_from(year).ok();
                let month = u32::try_from(month).ok();
                year.zip(month).and_then(|(y, m)| last_day_of_month(y, m))
            }
            _ => None,
        };
        catalog.push(id, date);
    }
    Ok(())
}

#[async_trait]
impl BankAdapter for CedarAdapter {
    fn bank_id(&self) -> &'static str {
        BankId::Cedar.code()
    }

    fn get_session_id(&self) -> AdapterResult<String> {
        self.tokens.locate(&self.ctx).map(|token| token.access_token)
    }

    async fn get_profile(&self, session_id: &str) -> AdapterResult<Profile> {
        let profile = self
            .tokens
            .find_by_access_token(&self.ctx, session_id)
            .and_then(|token| profile_from_claims(&token, session_id));
        Ok(profile.unwrap_or_else(|| {
            debug!("no usable identity claims, using placeholder profile");
            Profile::placeholder(session_id, FALLBACK_NAME)
        }))
    }

    async fn get_accounts(&self, profile: &Profile) -> AdapterResult<Vec<Account>> {
        let body = self
            .get_json("/accounts/v2/accounts", &profile.session_id, "accounts")
            .await?;
        accounts_from_listing(&body, profile)
    }

    async fn get_statements(&self, account: &Account) -> AdapterResult<Vec<Statement>> {
        let token = self.documents_token(account);
        let mut catalog = StatementCatalog::new(account);

        for year in year_window(self.current_year, self.lookback_years) {
            let path = format!(
                "/documents/v1/accounts/{}/statements?year={}",
                urlencoding::encode(&account.account_id),
                year
            );
            let body = self.get_json(&path, &token, "statements").await?;
            push_year(&mut catalog, &body)?;
        }

        if catalog.dropped() > 0 {
            info!(dropped = catalog.dropped(), "statements without year/month were skipped");
        }
        Ok(catalog.finish())
    }

    async fn download_statement(&self, statement: &Statement) -> AdapterResult<BinaryContent> {
        let token = self.documents_token(&statement.account);
        let path = format!(
            "/documents/v1/statements/{}?accountId={}",
            urlencoding::encode(&statement.statement_id),
            urlencoding::encode(&statement.account.account_id)
        );
        let body = self.get_json(&path, &token, "download").await?;
        let document = content::from_json_field(&body, "download")?;
        self.content.validate(&statement.statement_id, document)
    }
}

// 🧭 Northwind Savings
//
// - session: cookie `NW_SESSION`, fallback `NWSSO`
// - every call runs under the auth-refresh policy; the refresh is the
//   legacy SSO re-handshake:
//     GET /legacy/session/bootstrap → GET /auth/login/complete
//   (bodies discarded, they only set server-side session state)
// - accounts are listed under several groups; one account can repeat
// - statements: one call for all accounts, filtered to the one asked for,
//   dates RFC 3339 with offset
// - download: raw PDF body

use crate::adapter::{degrade_profile, BankAdapter, BankId};
use crate::catalog::{classify, AccountSet, StatementCatalog};
use crate::config::AdapterSettings;
use crate::content::{self, ContentPolicy};
use crate::context::SessionContext;
use crate::error::{AdapterError, AdapterResult};
use crate::fields::{require_array, require_str, str_field};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::model::{account_mask, Account, AccountType, BinaryContent, Profile, Statement};
use crate::refresh::{AuthRefreshPolicy, SessionRefresher};
use crate::session::CookieLocator;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://secure.northwindsavings.example";
const SESSION_COOKIE: &str = "NW_SESSION";
const FALLBACK_COOKIE: &str = "NWSSO";
const BOOTSTRAP_PATH: &str = "/legacy/session/bootstrap";
const LOGIN_COMPLETE_PATH: &str = "/auth/login/complete";
const FALLBACK_NAME: &str = "Northwind Customer";
const MIN_DOCUMENT_BYTES: usize = 1024;

const PRODUCT_CODES: &[(&str, AccountType)] = &[
    ("CURRENT", AccountType::Checking),
    ("CHECKING", AccountType::Checking),
    ("SAVINGS", AccountType::Savings),
    ("EASY_ACCESS", AccountType::Savings),
    ("FIXED_TERM", AccountType::Savings),
    ("ISA", AccountType::Savings),
    ("CREDIT_CARD", AccountType::CreditCard),
    ("STOCKS_ISA", AccountType::Investment),
    ("INVESTMENT", AccountType::Investment),
    ("MORTGAGE", AccountType::Loan),
    ("PERSONAL_LOAN", AccountType::Loan),
];

// ============================================================================
// SSO RE-HANDSHAKE
// ============================================================================

pub struct LegacySsoHandshake {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl LegacySsoHandshake {
    async fn step(&self, path: &str, context: &str) -> AdapterResult<()> {
        self.transport
            .send(HttpRequest::get(format!("{}{}", self.base_url, path)))
            .await?
            .ensure_success(context)?;
        Ok(())
    }
}

#[async_trait]
impl SessionRefresher for LegacySsoHandshake {
    async fn refresh(&self) -> AdapterResult<()> {
        self.step(BOOTSTRAP_PATH, "session bootstrap").await?;
        self.step(LOGIN_COMPLETE_PATH, "login completion").await?;
        debug!("legacy SSO session re-established");
        Ok(())
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

pub struct NorthwindAdapter {
    ctx: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    cookies: CookieLocator,
    base_url: String,
    content: ContentPolicy,
    policy: AuthRefreshPolicy<LegacySsoHandshake>,
}

impl NorthwindAdapter {
    pub fn new(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        settings: &AdapterSettings,
    ) -> Self {
        let base_url = settings.base_url_or(DEFAULT_BASE_URL);
        let policy = AuthRefreshPolicy::new(LegacySsoHandshake {
            transport: transport.clone(),
            base_url: base_url.clone(),
        });

        NorthwindAdapter {
            ctx,
            transport,
            cookies: CookieLocator::new(BankId::Northwind.code(), SESSION_COOKIE)
                .with_fallback(FALLBACK_COOKIE),
            base_url,
            content: ContentPolicy::new(settings.min_document_bytes_or(MIN_DOCUMENT_BYTES)),
            policy,
        }
    }

    async fn get(&self, path: &str, accept: &str, context: &str) -> AdapterResult<HttpResponse> {
        let request =
            HttpRequest::get(format!("{}{}", self.base_url, path)).header("Accept", accept);
        self.transport.send(request).await?.ensure_success(context)
    }

    /// GET under the auth-refresh policy.
    async fn guarded(
        &self,
        path: &str,
        accept: &str,
        context: &str,
    ) -> AdapterResult<HttpResponse> {
        self.policy
            .execute(context, || self.get(path, accept, context))
            .await
    }

    async fn guarded_json(&self, path: &str, context: &str) -> AdapterResult<Value> {
        self.guarded(path, "application/json", context)
            .await?
            .json(context)
    }
}

fn profile_from_summary(body: &Value, session_id: &str) -> AdapterResult<Profile> {
    let customer = body.get("customer").unwrap_or(body);
    let name = str_field(customer, &["fullName", "displayName"])
        .ok_or_else(|| AdapterError::missing_field("profile", "customer.fullName"))?;
    let id = str_field(customer, &["customerNumber", "customerId"])
        .unwrap_or_else(|| session_id.to_string());
    Ok(Profile::new(session_id, id, name))
}

fn accounts_from_groups(body: &Value, profile: &Profile) -> AdapterResult<Vec<Account>> {
    let mut accounts = AccountSet::new();
    for group in require_array(body, &["groups"], "accounts")? {
        let group_code = str_field(group, &["groupCode"]).unwrap_or_default();
        let Some(members) = group.get("accounts").and_then(|a| a.as_array()) else {
            continue;
        };

        for raw in members {
            let id = require_str(raw, &["accountId"], "accounts")?;
            if accounts.contains(&id) {
                debug!(group = %group_code, account_id = %id, "account repeated across groups");
                continue;
            }
            let product = str_field(raw, &["productCode"]).unwrap_or_default();
            let Some(account_type) = classify(&product, PRODUCT_CODES) else {
                debug!(product_code = %product, "skipping unsupported product");
                continue;
            };

            let mask = account_mask(
                &str_field(raw, &["accountNumber"]).unwrap_or_else(|| id.clone()),
                4,
            );
            let name = str_field(raw, &["nickname", "productName"])
                .unwrap_or_else(|| format!("Northwind {}", account_type.as_str()));

            accounts.push(Account {
                profile: profile.clone(),
                account_id: id,
                account_name: name,
                account_mask: mask,
                account_type,
            });
        }
    }
    accounts.finish(BankId::Northwind.code())
}

fn statements_for_account(body: &Value, account: &Account) -> AdapterResult<Vec<Statement>> {
    let mut catalog = StatementCatalog::new(account);
    for entry in require_array(body, &["statements"], "statements")? {
        if str_field(entry, &["accountId"]).as_deref() != Some(account.account_id.as_str()) {
            continue;
        }
        let id = require_str(entry, &["statementId"], "statements")?;
        let date = str_field(entry, &["issuedAt", "statementDate"]);
        catalog.push_raw(id, date.as_deref());
    }
    Ok(catalog.finish())
}

#[async_trait]
impl BankAdapter for NorthwindAdapter {
    fn bank_id(&self) -> &'static str {
        BankId::Northwind.code()
    }

    fn get_session_id(&self) -> AdapterResult<String> {
        self.cookies.locate(&self.ctx)
    }

    async fn get_profile(&self, session_id: &str) -> AdapterResult<Profile> {
        let result = match self.guarded_json("/api/customer/summary", "profile").await {
            Ok(body) => profile_from_summary(&body, session_id),
            Err(err) => Err(err),
        };
        degrade_profile(self.bank_id(), session_id, FALLBACK_NAME, result)
    }

    async fn get_accounts(&self, profile: &Profile) -> AdapterResult<Vec<Account>> {
        let body = self.guarded_json("/api/accounts/groups", "accounts").await?;
        accounts_from_groups(&body, profile)
    }

    async fn get_statements(&self, account: &Account) -> AdapterResult<Vec<Statement>> {
        let body = self.guarded_json("/api/documents/statements", "statements").await?;
        statements_for_account(&body, account)
    }

    async fn download_statement(&self, statement: &Statement) -> AdapterResult<BinaryContent> {
        let path = format!(
            "/api/documents/statements/{}/file",
            urlencoding::encode(&statement.statement_id)
        );
        let response = self.guarded(&path, "application/pdf", "download").await?;
        self.content
            .validate(&statement.statement_id, content::from_raw(response))
    }
}

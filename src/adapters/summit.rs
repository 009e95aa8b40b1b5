// 📈 Summit Brokerage
//
// - session: cookie `SUMMIT_SESSION`, fallback `summit_auth`
// - REST JSON throughout
// - statements come from a shared documents endpoint that lists every
//   account and every document category; filter to the requested account
//   and to statement categories
// - dates are display strings ("March 31, 2024")
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
use crate::session::CookieLocator;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://digital.summitbrokerage.example";
const SESSION_COOKIE: &str = "SUMMIT_SESSION";
const FALLBACK_COOKIE: &str = "summit_auth";
const CLIENT_HEADER: (&str, &str) = ("X-Summit-Client", "web-portal");
const FALLBACK_NAME: &str = "Summit Investor";
const MIN_DOCUMENT_BYTES: usize = 1024;

const REGISTRATION_TYPES: &[(&str, AccountType)] = &[
    ("INDIVIDUAL", AccountType::Investment),
    ("JOINT", AccountType::Investment),
    ("MARGIN", AccountType::Investment),
    ("TRUST", AccountType::Investment),
    ("IRA", AccountType::Investment),
    ("ROTH_IRA", AccountType::Investment),
    ("ROLLOVER_IRA", AccountType::Investment),
    ("401K", AccountType::Investment),
    ("CASH_MANAGEMENT", AccountType::Checking),
    ("SWEEP_SAVINGS", AccountType::Savings),
    ("PLEDGED_ASSET_LINE", AccountType::Loan),
];

/// Document categories that are account statements (notices, tax forms and
/// trade confirmations share the endpoint)
const STATEMENT_CATEGORIES: &[&str] = &["STATEMENT", "MONTHLY_STATEMENT", "QUARTERLY_STATEMENT"];

pub struct SummitAdapter {
    ctx: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    cookies: CookieLocator,
    base_url: String,
    content: ContentPolicy,
}

impl SummitAdapter {
    pub fn new(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        settings: &AdapterSettings,
    ) -> Self {
        SummitAdapter {
            ctx,
            transport,
            cookies: CookieLocator::new(BankId::Summit.code(), SESSION_COOKIE)
                .with_fallback(FALLBACK_COOKIE),
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            content: ContentPolicy::new(settings.min_document_bytes_or(MIN_DOCUMENT_BYTES)),
        }
    }

    async fn get(&self, path: &str, accept: &str, context: &str) -> AdapterResult<HttpResponse> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, path))
            .header(CLIENT_HEADER.0, CLIENT_HEADER.1)
            .header("Accept", accept);
        self.transport.send(request).await?.ensure_success(context)
    }

    async fn get_json(&self, path: &str, context: &str) -> AdapterResult<Value> {
        self.get(path, "application/json", context).await?.json(context)
    }
}

fn profile_from_customer(body: &Value, session_id: &str) -> AdapterResult<Profile> {
    let customer = body.get("customer").unwrap_or(body);
    let name = str_field(customer, &["displayName", "display_name"])
        .ok_or_else(|| AdapterError::missing_field("profile", "customer.displayName"))?;
    let profile_id = str_field(customer, &["customerId", "customer_id"])
        .unwrap_or_else(|| session_id.to_string());
    Ok(Profile::new(session_id, profile_id, name))
}

fn accounts_from_listing(body: &Value, profile: &Profile) -> AdapterResult<Vec<Account>> {
    let mut accounts = AccountSet::new();
    for raw in require_array(body, &["accounts"], "accounts")? {
        let number = require_str(raw, &["accountNumber"], "accounts")?;
        let registration = str_field(raw, &["registrationType"]).unwrap_or_default();
        let Some(account_type) = classify(&registration, REGISTRATION_TYPES) else {
            debug!(registration = %registration, "skipping unsupported registration type");
            continue;
        };

        let mask = account_mask(&number, 4);
        let name = str_field(raw, &["nickname", "accountName"])
            .unwrap_or_else(|| format!("{} ...{}", account_type.as_str(), mask));

        accounts.push(Account {
            profile: profile.clone(),
            account_id: number,
            account_name: name,
            account_mask: mask,
            account_type,
        });
    }
    accounts.finish(BankId::Summit.code())
}

fn document_accounts(doc: &Value) -> Vec<String> {
    let mut numbers: Vec<String> = doc
        .get("accountNumbers")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if let Some(single) = str_field(doc, &["accountNumber"]) {
        numbers.push(single);
    }
    numbers
}

fn statements_from_documents(body: &Value, account: &Account) -> AdapterResult<Vec<Statement>> {
    let mut catalog = StatementCatalog::new(account);
    for doc in require_array(body, &["documents"], "statements")? {
        let category = str_field(doc, &["category", "documentType"]).unwrap_or_default();
        if !STATEMENT_CATEGORIES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&category))
        {
            continue;
        }
        if !document_accounts(doc).contains(&account.account_id) {
            continue;
        }

        let id = require_str(doc, &["documentId"], "statements")?;
        let date = str_field(doc, &["displayDate", "documentDate"]);
        catalog.push_raw(id, date.as_deref());
    }
    Ok(catalog.finish())
}

#[async_trait]
impl BankAdapter for SummitAdapter {
    fn bank_id(&self) -> &'static str {
        BankId::Summit.code()
    }

    fn get_session_id(&self) -> AdapterResult<String> {
        self.cookies.locate(&self.ctx)
    }

    async fn get_profile(&self, session_id: &str) -> AdapterResult<Profile> {
        let result = match self.get_json("/api/v1/customer", "profile").await {
            Ok(body) => profile_from_customer(&body, session_id),
            Err(err) => Err(err),
        };
        degrade_profile(self.bank_id(), session_id, FALLBACK_NAME, result)
    }

    async fn get_accounts(&self, profile: &Profile) -> AdapterResult<Vec<Account>> {
        let body = self.get_json("/api/v1/accounts", "accounts").await?;
        accounts_from_listing(&body, profile)
    }

    async fn get_statements(&self, account: &Account) -> AdapterResult<Vec<Statement>> {
        let body = self.get_json("/api/v1/documents", "statements").await?;
        statements_from_documents(&body, account)
    }

    async fn download_statement(&self, statement: &Statement) -> AdapterResult<BinaryContent> {
        let path = format!(
            "/api/v1/documents/{}/content?accountNumber={}",
            urlencoding::encode(&statement.statement_id),
            urlencoding::encode(&statement.account.account_id)
        );
        let response = self.get(&path, "application/pdf", "download").await?;
        self.content
            .validate(&statement.statement_id, content::from_raw(response))
    }
}

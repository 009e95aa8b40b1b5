// 🌊 Lakeshore Credit Union
//
// - session: cookie `ls_access`, fallback `ls_token`; sent as a bearer token
// - every call carries X-Client-Id and a fresh X-Correlation-Id
// - profile: REST; accounts: GraphQL
// - statements: one page, capped by page size ("YYYY-MM-DD HH:MM:SS")
// - download: best-effort refresh POST, then GraphQL with base64 content

use crate::adapter::{degrade_profile, BankAdapter, BankId};
use crate::catalog::{classify, AccountSet, StatementCatalog};
use crate::config::AdapterSettings;
use crate::content::{self, ContentPolicy};
use crate::context::SessionContext;
use crate::error::{AdapterError, AdapterResult};
use crate::fields::{i64_field, require_array, require_str, str_field};
use crate::http::{correlation_id, graphql_data, graphql_request, HttpRequest, Transport};
use crate::model::{account_mask, Account, AccountType, BinaryContent, Profile, Statement};
use crate::session::CookieLocator;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://members.lakeshorecu.example";
const SESSION_COOKIE: &str = "ls_access";
const FALLBACK_COOKIE: &str = "ls_token";
const CLIENT_ID: &str = "lakeshore-web";
const CORRELATION_PREFIX: &str = "LSW";
const FALLBACK_NAME: &str = "Lakeshore Member";
const MIN_DOCUMENT_BYTES: usize = 1024;
const PAGE_SIZE: u32 = 100;

const ACCOUNTS_OPERATION: &str = "memberAccounts";
const ACCOUNTS_QUERY: &str = "query memberAccounts { memberAccounts { accounts { accountId displayName accountNumber productType } } }";
const DOCUMENT_OPERATION: &str = "statementDocument";
const DOCUMENT_QUERY: &str = "query statementDocument($accountId: ID!, $statementId: ID!) { statementDocument(accountId: $accountId, statementId: $statementId) { content contentType } }";

const PRODUCT_TYPES: &[(&str, AccountType)] = &[
    ("SHARE_DRAFT", AccountType::Checking),
    ("CHECKING", AccountType::Checking),
    ("SHARE_SAVINGS", AccountType::Savings),
    ("MONEY_MARKET", AccountType::Savings),
    ("CERTIFICATE", AccountType::Savings),
    ("VISA", AccountType::CreditCard),
    ("CREDIT_CARD", AccountType::CreditCard),
    ("IRA", AccountType::Investment),
    ("AUTO_LOAN", AccountType::Loan),
    ("MORTGAGE", AccountType::Loan),
    ("HELOC", AccountType::Loan),
    ("PERSONAL_LOAN", AccountType::Loan),
];

pub struct LakeshoreAdapter {
    ctx: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    cookies: CookieLocator,
    base_url: String,
    content: ContentPolicy,
    page_size: u32,
}

impl LakeshoreAdapter {
    pub fn new(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        settings: &AdapterSettings,
    ) -> Self {
        LakeshoreAdapter {
            ctx,
            transport,
            cookies: CookieLocator::new(BankId::Lakeshore.code(), SESSION_COOKIE)
                .with_fallback(FALLBACK_COOKIE),
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            content: ContentPolicy::new(settings.min_document_bytes_or(MIN_DOCUMENT_BYTES)),
            page_size: settings.page_size_or(PAGE_SIZE),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: HttpRequest, session_id: &str) -> HttpRequest {
        request
            .bearer(session_id)
            .header("X-Client-Id", CLIENT_ID)
            .header("X-Correlation-Id", correlation_id(CORRELATION_PREFIX))
    }

    async fn send_json(&self, request: HttpRequest, context: &str) -> AdapterResult<Value> {
        self.transport.send(request).await?.ensure_success(context)?.json(context)
    }

    /// Ask the server to stage the document. Failure is logged, never raised.
    async fn refresh_document(&self, statement: &Statement) {
        let request = HttpRequest::post(self.url(&format!(
            "/api/v2/statements/{}/refresh",
            urlencoding::encode(&statement.statement_id)
        )))
        .json_body(&json!({ "accountId": statement.account.account_id }));
        let request = self.authorize(request, &statement.account.profile.session_id);

        match self.transport.send(request).await.and_then(|r| r.ensure_success("refresh")) {
            Ok(_) => debug!(
                statement_id = %statement.statement_id,
                "document refresh acknowledged"
            ),
            Err(err) => warn!(
                statement_id = %statement.statement_id,
                error = %err,
                "document refresh failed, downloading anyway"
            ),
        }
    }
}

fn profile_from_body(body: &Value, session_id: &str) -> AdapterResult<Profile> {
    let name = str_field(body, &["preferredName"]).or_else(|| {
        let first = str_field(body, &["firstName"])?;
        Some(match str_field(body, &["lastName"]) {
            Some(last) => format!("{} {}", first, last),
            None => first,
        })
    });
    let name = name.ok_or_else(|| AdapterError::missing_field("profile", "firstName"))?;
    let member = str_field(body, &["memberNumber", "memberId"])
        .unwrap_or_else(|| session_id.to_string());
    Ok(Profile::new(session_id, member, name))
}

fn accounts_from_data(data: &Value, profile: &Profile) -> AdapterResult<Vec<Account>> {
    let mut accounts = AccountSet::new();
    for raw in require_array(data, &[ACCOUNTS_OPERATION, "accounts"], "accounts")? {
        let id = require_str(raw, &["accountId"], "accounts")?;
        let product = str_field(raw, &["productType"]).unwrap_or_default();
        let Some(account_type) = classify(&product, PRODUCT_TYPES) else {
            debug!(product_type = %product, "skipping unsupported product");
            continue;
        };

        let mask = account_mask(
            &str_field(raw, &["accountNumber"]).unwrap_or_else(|| id.clone()),
            4,
        );
        let name = str_field(raw, &["displayName"])
            .unwrap_or_else(|| format!("{} {}", account_type.as_str(), mask));

        accounts.push(Account {
            profile: profile.clone(),
            account_id: id,
            account_name: name,
            account_mask: mask,
            account_type,
        });
    }
    accounts.finish(BankId::Lakeshore.code())
}

fn statements_from_page(
    body: &Value,
    account: &Account,
    page_size: u32,
) -> AdapterResult<Vec<Statement>> {
    let entries = require_array(body, &["statements"], "statements")?;
    if let Some(total) = i64_field(body, &["totalCount"]) {
        if total > entries.len() as i64 {
            warn!(
                total,
                returned = entries.len(),
                page_size,
                "statement listing truncated by page size"
            );
        }
    }

    let mut catalog = StatementCatalog::new(account);
    for entry in entries {
        let id = require_str(entry, &["statementId"], "statements")?;
        let date = str_field(entry, &["statementDate"]);
        catalog.push_raw(id, date.as_deref());
    }
    Ok(catalog.finish())
}

#[async_trait]
impl BankAdapter for LakeshoreAdapter {
    fn bank_id(&self) -> &'static str {
        BankId::Lakeshore.code()
    }

    fn get_session_id(&self) -> AdapterResult<String> {
        self.cookies.locate(&self.ctx)
    }

    async fn get_profile(&self, session_id: &str) -> AdapterResult<Profile> {
        let request = self.authorize(HttpRequest::get(self.url("/api/v2/profile")), session_id);
        let result = match self.send_json(request, "profile").await {
            Ok(body) => profile_from_body(&body, session_id),
            Err(err) => Err(err),
        };
        degrade_profile(self.bank_id(), session_id, FALLBACK_NAME, result)
    }

    async fn get_accounts(&self, profile: &Profile) -> AdapterResult<Vec<Account>> {
        let request = graphql_request(
            &self.url("/graphql"),
            ACCOUNTS_OPERATION,
            json!({}),
            ACCOUNTS_QUERY,
        );
        let body = self
            .send_json(self.authorize(request, &profile.session_id), "accounts")
            .await?;
        accounts_from_data(graphql_data(&body, "accounts")?, profile)
    }

    async fn get_statements(&self, account: &Account) -> AdapterResult<Vec<Statement>> {
        let url = self.url(&format!(
            "/api/v2/accounts/{}/statements?pageSize={}",
            urlencoding::encode(&account.account_id),
            self.page_size
        ));
        let request = self.authorize(HttpRequest::get(url), &account.profile.session_id);
        let body = self.send_json(request, "statements").await?;
        statements_from_page(&body, account, self.page_size)
    }

    async fn download_statement(&self, statement: &Statement) -> AdapterResult<BinaryContent> {
        self.refresh_document(statement).await;

        let request = graphql_request(
            &self.url("/graphql"),
            DOCUMENT_OPERATION,
            json!({
                "accountId": statement.account.account_id,
                "statementId": statement.statement_id,
            }),
            DOCUMENT_QUERY,
        );
        let body = self
            .send_json(
                self.authorize(request, &statement.account.profile.session_id),
                "download",
            )
            .await?;
        let document = content::from_graphql_field(&body, DOCUMENT_OPERATION, "download")?;
        self.content.validate(&statement.statement_id, document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::ScriptedTransport;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn adapter(transport: Arc<ScriptedTransport>) -> LakeshoreAdapter {
        let ctx = SessionContext::new().with_cookies("theme=dark; ls_token=fallback-tok");
        LakeshoreAdapter::new(Arc::new(ctx), transport, &AdapterSettings::default())
    }

    fn statement() -> Statement {
        Statement {
            account: Account {
                profile: Profile::new("fallback-tok", "M-100", "Sam Ortiz"),
                account_id: "acct-9".to_string(),
                account_name: "Share Savings".to_string(),
                account_mask: "0042".to_string(),
                account_type: AccountType::Savings,
            },
            statement_id: "st-1".to_string(),
            statement_date: chrono::Utc::now(),
        }
    }

    fn pdf_payload() -> Value {
        json!({ "data": { "statementDocument": {
            "content": STANDARD.encode(b"%PDF-1.5 lakeshore"),
            "contentType": "application/pdf"
        } } })
    }

    #[test]
    fn test_session_falls_back_to_secondary_cookie() {
        let lakeshore = adapter(Arc::new(ScriptedTransport::new()));
        assert_eq!(lakeshore.get_session_id().unwrap(), "fallback-tok");
    }

    #[tokio::test]
    async fn test_profile_headers_and_name() {
        let transport = Arc::new(ScriptedTransport::new().respond_json(
            200,
            json!({ "memberNumber": "M-100", "firstName": "Sam", "lastName": "Ortiz" }),
        ));
        let profile = adapter(transport.clone()).get_profile("fallback-tok").await.unwrap();
        assert_eq!(profile, Profile::new("fallback-tok", "M-100", "Sam Ortiz"));

        let call = &transport.calls()[0];
        assert_eq!(call.header_value("X-Client-Id"), Some(CLIENT_ID));
        assert!(call
            .header_value("X-Correlation-Id")
            .map(|id| id.starts_with("LSW-"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_profile_rejection_is_not_degraded() {
        let transport = Arc::new(ScriptedTransport::new().respond_json(403, json!({})));
        let err = adapter(transport).get_profile("tok").await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_accounts_over_graphql() {
        let transport = Arc::new(ScriptedTransport::new().respond_json(
            200,
            json!({ "data": { "memberAccounts": { "accounts": [
                { "accountId": "acct-9", "displayName": "Share Savings", "accountNumber": "7700420042", "productType": "SHARE_SAVINGS" },
                { "accountId": "acct-7", "accountNumber": "5500000017", "productType": "VISA" },
                { "accountId": "acct-5", "productType": "SAFE_DEPOSIT_BOX" }
            ] } } }),
        ));
        let accounts = adapter(transport.clone())
            .get_accounts(&statement().account.profile)
            .await
            .unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_mask, "0042");
        assert_eq!(accounts[1].account_type, AccountType::CreditCard);
        assert_eq!(transport.calls()[0].method, Method::Post);
    }

    #[tokio::test]
    async fn test_graphql_unauthenticated_is_auth_error() {
        let transport = Arc::new(ScriptedTransport::new().respond_json(
            200,
            json!({ "errors": [ { "message": "expired", "extensions": { "code": "UNAUTHENTICATED" } } ] }),
        ));
        let err = adapter(transport)
            .get_accounts(&statement().account.profile)
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_statements_space_timestamps_and_page_size() {
        let transport = Arc::new(ScriptedTransport::new().respond_json(
            200,
            json!({ "totalCount": 3, "statements": [
                { "statementId": "st-1", "statementDate": "2024-01-31 00:00:00" },
                { "statementId": "st-2", "statementDate": "2024-02-29 08:30:00" },
                { "statementId": "st-3", "statementDate": "" }
            ] }),
        ));
        let statements = adapter(transport.clone())
            .get_statements(&statement().account)
            .await
            .unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].statement_id, "st-2");
        assert_eq!(statements[0].iso_date(), "2024-02-29T08:30:00Z");
        assert!(transport.urls()[0].ends_with("/api/v2/accounts/acct-9/statements?pageSize=100"));
    }

    #[tokio::test]
    async fn test_download_refreshes_then_decodes() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond_json(200, json!({ "status": "READY" }))
                .respond_json(200, pdf_payload()),
        );
        let content = adapter(transport.clone())
            .download_statement(&statement())
            .await
            .unwrap();

        assert_eq!(content.bytes().as_ref(), b"%PDF-1.5 lakeshore");
        let urls = transport.urls();
        assert!(urls[0].ends_with("/api/v2/statements/st-1/refresh"));
        assert!(urls[1].ends_with("/graphql"));
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_abort_download() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond_json(500, json!({ "error": "busy" }))
                .respond_json(200, pdf_payload()),
        );
        let content = adapter(transport.clone())
            .download_statement(&statement())
            .await
            .unwrap();
        assert_eq!(content.mime_type(), "application/pdf");

        let transport = Arc::new(
            ScriptedTransport::new()
                .fail_network()
                .respond_json(200, pdf_payload()),
        );
        assert!(adapter(transport).download_statement(&statement()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_graphql_content_is_upstream() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond_json(200, json!({}))
                .respond_json(200, json!({ "data": { "statementDocument": null } })),
        );
        let err = adapter(transport)
            .download_statement(&statement())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Upstream { .. }));
    }
}

// 🌾 Harvest Pipeline - Session → Profile → Accounts → Statements → Documents
//
// Runs the five contract operations in order against any adapter.
// Catalog failures stop the run; download failures are collected per statement.

use crate::adapter::BankAdapter;
use crate::error::{AdapterError, AdapterResult};
use crate::model::{Account, BinaryContent, Profile, Statement};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AccountStatements {
    pub account: Account,
    pub statements: Vec<Statement>,
}

/// Everything one session can see at one bank.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub bank_id: String,
    pub profile: Profile,
    pub accounts: Vec<AccountStatements>,
    pub collected_at: DateTime<Utc>,
}

impl Catalog {
    pub fn statement_count(&self) -> usize {
        self.accounts.iter().map(|a| a.statements.len()).sum()
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.accounts.iter().flat_map(|a| a.statements.iter())
    }
}

pub async fn collect_catalog(adapter: &dyn BankAdapter) -> AdapterResult<Catalog> {
    let bank = adapter.bank_id();
    let session_id = adapter.get_session_id()?;
    let profile = adapter.get_profile(&session_id).await?;
    let accounts = adapter.get_accounts(&profile).await?;
    info!(bank, profile = %profile.profile_name, accounts = accounts.len(), "accounts found");

    let mut listed = Vec::with_capacity(accounts.len());
    for account in accounts {
        let statements = adapter.get_statements(&account).await?;
        info!(
            bank,
            account = %account.account_name,
            mask = %account.account_mask,
            statements = statements.len(),
            "statements listed"
        );
        listed.push(AccountStatements {
            account,
            statements,
        });
    }

    Ok(Catalog {
        bank_id: bank.to_string(),
        profile,
        accounts: listed,
        collected_at: Utc::now(),
    })
}

// ============================================================================
// DOWNLOADS
// ============================================================================

#[derive(Debug)]
pub struct DownloadOutcome {
    pub statement: Statement,
    pub result: AdapterResult<BinaryContent>,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&Statement, &AdapterError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.statement, e)))
    }
}

/// Download every statement in `catalog`, one at a time. One failure never
/// stops the rest.
pub async fn download_all(adapter: &dyn BankAdapter, catalog: &Catalog) -> DownloadReport {
    let mut report = DownloadReport::default();

    for statement in catalog.statements() {
        let result = adapter.download_statement(statement).await;
        match &result {
            Ok(content) => info!(
                bank = adapter.bank_id(),
                statement_id = %statement.statement_id,
                bytes = content.len(),
                "statement downloaded"
            ),
            Err(err) => warn!(
                bank = adapter.bank_id(),
                statement_id = %statement.statement_id,
                error = %err,
                "statement download failed"
            ),
        }
        report.outcomes.push(DownloadOutcome {
            statement: statement.clone(),
            result,
        });
    }

    report
}

/// One output file name per statement, in order, none repeated.
///
/// Statements whose `file_name` is shared by another statement (same
/// account mask and date) all take `qualified_file_name` instead. Any name
/// still taken after that gets a numeric suffix.
pub fn file_names<'a>(
    bank_id: &str,
    statements: impl IntoIterator<Item = &'a Statement>,
) -> Vec<String> {
    let statements: Vec<&Statement> = statements.into_iter().collect();
    let plain: Vec<String> = statements.iter().map(|s| s.file_name(bank_id)).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &plain {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    let mut used = HashSet::new();
    let mut names = Vec::with_capacity(statements.len());
    for (statement, name) in statements.iter().zip(&plain) {
        let base = if counts[name.as_str()] > 1 {
            statement.qualified_file_name(bank_id)
        } else {
            name.clone()
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while !used.insert(candidate.clone()) {
            candidate = format!("{}-{}.pdf", base.trim_end_matches(".pdf"), n);
            n += 1;
        }
        names.push(candidate);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SummitAdapter;
    use crate::config::AdapterSettings;
    use crate::context::SessionContext;
    use crate::http::HttpResponse;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn summit(transport: Arc<ScriptedTransport>, cookies: &str) -> SummitAdapter {
        SummitAdapter::new(
            Arc::new(SessionContext::new().with_cookies(cookies)),
            transport,
            &AdapterSettings::default(),
        )
    }

    fn documents() -> serde_json::Value {
        json!({ "documents": [
            { "documentId": "D1", "accountNumbers": ["Z1111"], "category": "STATEMENT", "displayDate": "January 31, 2024" },
            { "documentId": "D2", "accountNumbers": ["Z1111"], "category": "STATEMENT", "displayDate": "February 29, 2024" },
            { "documentId": "D3", "accountNumbers": ["Z2222"], "category": "STATEMENT", "displayDate": "February 29, 2024" }
        ] })
    }

    fn scripted_catalog() -> ScriptedTransport {
        ScriptedTransport::new()
            .respond_json(200, json!({ "customer": { "customerId": "C-1", "displayName": "Jo" } }))
            .respond_json(
                200,
                json!({ "accounts": [
                    { "accountNumber": "Z1111", "registrationType": "INDIVIDUAL" },
                    { "accountNumber": "Z2222", "registrationType": "ROTH_IRA" }
                ] }),
            )
            .respond_json(200, documents())
            .respond_json(200, documents())
    }

    #[tokio::test]
    async fn test_collect_catalog_walks_every_account() {
        let transport = Arc::new(scripted_catalog());
        let adapter = summit(transport.clone(), "SUMMIT_SESSION=abc");

        let catalog = collect_catalog(&adapter).await.unwrap();

        assert_eq!(catalog.bank_id, "summit");
        assert_eq!(catalog.profile.profile_name, "Jo");
        assert_eq!(catalog.accounts.len(), 2);
        assert_eq!(catalog.statement_count(), 3);
        assert_eq!(catalog.accounts[0].statements[0].statement_id, "D2");
        assert_eq!(transport.remaining(), 0);

        let serialized = serde_json::to_value(&catalog).unwrap();
        assert_eq!(serialized["accounts"][1]["account"]["account_type"], "Investment");
    }

    #[tokio::test]
    async fn test_collect_catalog_without_session_makes_no_calls() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = collect_catalog(&summit(transport.clone(), "unrelated=1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::SessionNotFound { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_download_all_continues_past_failures() {
        let catalog = collect_catalog(&summit(Arc::new(scripted_catalog()), "SUMMIT_SESSION=abc"))
            .await
            .unwrap();

        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(
                    HttpResponse::new(200, &b"%PDF-1.4 first"[..])
                        .with_header("Content-Type", "application/pdf"),
                )
                .respond(HttpResponse::new(500, "boom"))
                .respond(
                    HttpResponse::new(200, &b"%PDF-1.4 third"[..])
                        .with_header("Content-Type", "application/pdf"),
                ),
        );
        let report = download_all(&summit(transport, "SUMMIT_SESSION=abc"), &catalog).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        let (failed, err) = report.errors().next().unwrap();
        assert_eq!(failed.statement_id, "D1");
        assert!(matches!(err, AdapterError::Upstream { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_serialized_catalog_carries_no_session_credential() {
        let catalog = collect_catalog(&summit(
            Arc::new(scripted_catalog()),
            "SUMMIT_SESSION=live-cookie-value",
        ))
        .await
        .unwrap();

        assert_eq!(catalog.profile.session_id, "live-cookie-value");
        let text = serde_json::to_string(&catalog).unwrap();
        assert!(!text.contains("live-cookie-value"));
        assert!(text.contains("C-1"));
    }

    #[tokio::test]
    async fn test_file_names_never_collide() {
        let transport = ScriptedTransport::new()
            .respond_json(200, json!({ "customer": { "customerId": "C-1", "displayName": "Jo" } }))
            .respond_json(
                200,
                json!({ "accounts": [
                    { "accountNumber": "Z1111", "registrationType": "INDIVIDUAL" }
                ] }),
            )
            .respond_json(
                200,
                json!({ "documents": [
                    { "documentId": "D1", "accountNumbers": ["Z1111"], "category": "STATEMENT", "displayDate": "January 31, 2024" },
                    { "documentId": "D1/c", "accountNumbers": ["Z1111"], "category": "STATEMENT", "displayDate": "January 31, 2024" },
                    { "documentId": "D2", "accountNumbers": ["Z1111"], "category": "STATEMENT", "displayDate": "February 29, 2024" }
                ] }),
            );
        let catalog = collect_catalog(&summit(Arc::new(transport), "SUMMIT_SESSION=abc"))
            .await
            .unwrap();

        let names = file_names("summit", catalog.statements());
        assert_eq!(
            names,
            vec![
                "summit-1111-2024-02-29.pdf",
                "summit-1111-2024-01-31-D1.pdf",
                "summit-1111-2024-01-31-D1_c.pdf",
            ]
        );
    }

    #[test]
    fn test_file_names_suffix_when_ids_sanitize_alike() {
        let account = crate::model::Account {
            profile: Profile::new("s", "p", "n"),
            account_id: "a".to_string(),
            account_name: "Checking".to_string(),
            account_mask: "1111".to_string(),
            account_type: crate::model::AccountType::Checking,
        };
        let date = crate::catalog::last_day_of_month(2024, 1).unwrap();
        let statements: Vec<Statement> = ["x/1", "x:1"]
            .iter()
            .map(|id| Statement {
                account: account.clone(),
                statement_id: id.to_string(),
                statement_date: date,
            })
            .collect();

        assert_eq!(
            file_names("summit", &statements),
            vec!["summit-1111-2024-01-31-x_1.pdf", "summit-1111-2024-01-31-x_1-2.pdf"]
        );
    }
}

// 🗂️ Catalog Normalization - dates, dedup, ordering, classification
//
// Every adapter funnels raw records through here so that:
// - statement dates become one UTC instant regardless of bank format
// - statements are unique by id and sorted newest first
// - accounts are unique by id, and an empty list is NoAccountsFound
// - product codes map onto the closed AccountType taxonomy

use crate::error::{AdapterError, AdapterResult};
use crate::model::{Account, AccountType, Statement};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::collections::HashSet;
use tracing::debug;

// ============================================================================
// DATE NORMALIZATION
// ============================================================================

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Normalize a bank date string into a UTC instant.
///
/// Accepted shapes:
/// - RFC 3339 with offset: "2024-03-31T00:00:00-05:00" (converted to UTC)
/// - space-delimited timestamp: "2024-03-31 13:45:00" (read as UTC)
/// - slash date: "2024/03/31"
/// - display date: "March 31, 2024" / "Mar 31, 2024"
/// - plain ISO date: "2024-03-31", US date: "03/31/2024"
///
/// Bare dates mean midnight UTC. Returns None when nothing matches.
pub fn normalize_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // "2024-03-31 13:45:00" → strict ISO delimiter
    let iso = match raw.split_once(' ') {
        Some((date, time)) if time.contains(':') => format!("{}T{}", date, time),
        _ => raw.to_string(),
    };
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&iso, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(midnight_utc)
}

/// Year + month pair → last calendar day of that month, midnight UTC.
pub fn last_day_of_month(year: i32, month: u32) -> Option<DateTime<Utc>> {
    if month == 0 {
        return None;
    }
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt().and_then(midnight_utc)
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Furthest back any per-year listing reaches.
pub const MAX_LOOKBACK_YEARS: u32 = 10;

/// Current calendar year followed by `lookback` prior years, capped at
/// `MAX_LOOKBACK_YEARS`.
pub fn year_window(current_year: i32, lookback: u32) -> Vec<i32> {
    let lookback = i32::try_from(lookback.min(MAX_LOOKBACK_YEARS)).unwrap_or(0);
    (0..=lookback).map(|back| current_year - back).collect()
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

// ============================================================================
// STATEMENT CATALOG
// ============================================================================

/// Accumulates statements across pages / years for one account.
///
/// - records without a usable date are dropped (counted, logged)
/// - the first occurrence of an id wins
/// - `finish` sorts by date descending; ties keep insertion order
pub struct StatementCatalog {
    account: Account,
    seen: HashSet<String>,
    entries: Vec<Statement>,
    dropped: usize,
}

impl StatementCatalog {
    pub fn new(account: &Account) -> Self {
        StatementCatalog {
            account: account.clone(),
            seen: HashSet::new(),
            entries: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, statement_id: impl Into<String>, date: Option<DateTime<Utc>>) {
        let statement_id = statement_id.into();
        let Some(statement_date) = date else {
            debug!(statement_id = %statement_id, "dropping statement without a usable date");
            self.dropped += 1;
            return;
        };

        if !self.seen.insert(statement_id.clone()) {
            return;
        }

        self.entries.push(Statement {
            account: self.account.clone(),
            statement_id,
            statement_date,
        });
    }

    /// Push with a raw date string, normalized via `normalize_date`.
    pub fn push_raw(&mut self, statement_id: impl Into<String>, raw_date: Option<&str>) {
        self.push(statement_id, raw_date.and_then(normalize_date));
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn finish(mut self) -> Vec<Statement> {
        self.entries.sort_by(|a, b| b.statement_date.cmp(&a.statement_date));
        self.entries
    }
}

// ============================================================================
// ACCOUNT SET
// ============================================================================

/// Accounts unique by id, in first-seen order.
#[derive(Default)]
pub struct AccountSet {
    seen: HashSet<String>,
    accounts: Vec<Account>,
}

impl AccountSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id was already present.
    pub fn push(&mut self, account: Account) -> bool {
        if !self.seen.insert(account.account_id.clone()) {
            return false;
        }
        self.accounts.push(account);
        true
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.seen.contains(account_id)
    }

    /// Empty is a fatal NoAccountsFound for `bank`.
    pub fn finish(self, bank: &str) -> AdapterResult<Vec<Account>> {
        if self.accounts.is_empty() {
            return Err(AdapterError::NoAccountsFound(bank.to_string()));
        }
        Ok(self.accounts)
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Bank product/group code → AccountType via a per-bank table (case-insensitive).
pub fn classify(code: &str, table: &[(&str, AccountType)]) -> Option<AccountType> {
    let code = code.trim();
    table
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(code))
        .map(|(_, account_type)| *account_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Profile;

    fn account() -> Account {
        Account {
            profile: Profile::new("s", "p", "n"),
            account_id: "a1".to_string(),
            account_name: "Checking".to_string(),
            account_mask: "1234".to_string(),
            account_type: AccountType::Checking,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_normalize_date_shapes() {
        let midnight = utc(2024, 3, 31, 0, 0, 0);
        assert_eq!(normalize_date("2024/03/31"), Some(midnight));
        assert_eq!(normalize_date("2024-03-31"), Some(midnight));
        assert_eq!(normalize_date("March 31, 2024"), Some(midnight));
        assert_eq!(normalize_date("Mar 31, 2024"), Some(midnight));
        assert_eq!(normalize_date("03/31/2024"), Some(midnight));
        assert_eq!(normalize_date("March 5, 2024"), Some(utc(2024, 3, 5, 0, 0, 0)));
        assert_eq!(
            normalize_date("2024-03-31 13:45:00"),
            Some(utc(2024, 3, 31, 13, 45, 0))
        );
        assert_eq!(
            normalize_date("2024-03-31T00:00:00-05:00"),
            Some(utc(2024, 3, 31, 5, 0, 0))
        );
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("soon"), None);
        assert_eq!(normalize_date("2024/13/40"), None);
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2024, 2), Some(utc(2024, 2, 29, 0, 0, 0)));
        assert_eq!(last_day_of_month(2023, 2), Some(utc(2023, 2, 28, 0, 0, 0)));
        assert_eq!(last_day_of_month(2023, 12), Some(utc(2023, 12, 31, 0, 0, 0)));
        assert_eq!(last_day_of_month(2023, 0), None);
        assert_eq!(last_day_of_month(2023, 13), None);
    }

    #[test]
    fn test_year_window() {
        assert_eq!(year_window(2024, 2), vec![2024, 2023, 2022]);
        assert_eq!(year_window(2024, 0), vec![2024]);
    }

    #[test]
    fn test_year_window_is_capped() {
        let years = year_window(2024, u32::MAX);
        assert_eq!(years.len(), MAX_LOOKBACK_YEARS as usize + 1);
        assert_eq!(years.first(), Some(&2024));
        assert_eq!(years.last(), Some(&2014));
    }

    #[test]
    fn test_catalog_dedups_sorts_and_drops_undated() {
        let mut catalog = StatementCatalog::new(&account());
        catalog.push_raw("jan", Some("2024-01-31"));
        catalog.push_raw("mar", Some("2024-03-31"));
        catalog.push_raw("jan", Some("2024-01-31"));
        catalog.push_raw("nodate", None);
        catalog.push_raw("baddate", Some("someday"));
        catalog.push_raw("feb", Some("2024-02-29"));

        assert_eq!(catalog.dropped(), 2);
        let ids: Vec<String> = catalog
            .finish()
            .into_iter()
            .map(|s| s.statement_id)
            .collect();
        assert_eq!(ids, vec!["mar", "feb", "jan"]);
    }

    #[test]
    fn test_catalog_ties_keep_insertion_order() {
        let mut catalog = StatementCatalog::new(&account());
        catalog.push_raw("first", Some("2024-01-31"));
        catalog.push_raw("second", Some("2024-01-31"));
        let ids: Vec<String> = catalog
            .finish()
            .into_iter()
            .map(|s| s.statement_id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_account_set() {
        let mut set = AccountSet::new();
        assert!(set.push(account()));
        assert!(!set.push(account()));
        assert!(set.contains("a1"));
        assert_eq!(set.finish("bank").unwrap().len(), 1);

        let err = AccountSet::new().finish("bank").unwrap_err();
        assert!(matches!(err, AdapterError::NoAccountsFound(_)));
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let table = [("DDA", AccountType::Checking), ("CC", AccountType::CreditCard)];
        assert_eq!(classify("dda", &table), Some(AccountType::Checking));
        assert_eq!(classify(" CC ", &table), Some(AccountType::CreditCard));
        assert_eq!(classify("XYZ", &table), None);
    }
}

// ⚙️ Harvest Configuration - per-bank overrides, all optional
//
// {
//   "cedar":  { "lookback_years": 3 },
//   "harbor": { "min_document_bytes": 4096, "base_url": "http://localhost:8080" }
// }

use crate::adapter::BankId;
use crate::catalog::MAX_LOOKBACK_YEARS;
use crate::error::{AdapterError, AdapterResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Replaces the bank's default origin (tests, staging)
    pub base_url: Option<String>,

    /// Downloads smaller than this must carry a document media type
    pub min_document_bytes: Option<usize>,

    /// Prior years fetched by per-year statement listings
    pub lookback_years: Option<u32>,

    /// Page size for page-capped statement listings
    pub page_size: Option<u32>,
}

impl AdapterSettings {
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn min_document_bytes_or(&self, default: usize) -> usize {
        self.min_document_bytes.unwrap_or(default)
    }

    pub fn lookback_years_or(&self, default: u32) -> u32 {
        self.lookback_years.unwrap_or(default)
    }

    pub fn page_size_or(&self, default: u32) -> u32 {
        self.page_size.unwrap_or(default)
    }

    fn validate(&self, bank: BankId) -> AdapterResult<()> {
        if let Some(url) = &self.base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(AdapterError::Config(format!(
                    "{}: base_url must be an http(s) URL, got '{}'",
                    bank.code(),
                    url
                )));
            }
        }
        if self.page_size == Some(0) {
            return Err(AdapterError::Config(format!(
                "{}: page_size must be positive",
                bank.code()
            )));
        }
        if self.lookback_years.map(|y| y > MAX_LOOKBACK_YEARS).unwrap_or(false) {
            return Err(AdapterError::Config(format!(
                "{}: lookback_years is capped at {}",
                bank.code(),
                MAX_LOOKBACK_YEARS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub harbor: AdapterSettings,
    pub summit: AdapterSettings,
    pub cedar: AdapterSettings,
    pub lakeshore: AdapterSettings,
    pub northwind: AdapterSettings,
}

impl HarvestConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: HarvestConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn for_bank(&self, bank: BankId) -> &AdapterSettings {
        match bank {
            BankId::Harbor => &self.harbor,
            BankId::Summit => &self.summit,
            BankId::Cedar => &self.cedar,
            BankId::Lakeshore => &self.lakeshore,
            BankId::Northwind => &self.northwind,
        }
    }

    pub fn validate(&self) -> AdapterResult<()> {
        BankId::ALL
            .iter()
            .try_for_each(|bank| self.for_bank(*bank).validate(*bank))
    }
}

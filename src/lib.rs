// Statement Harvest - Core Library
// One adapter contract for pulling statements out of five online banks.
// Exposes all modules for use in the CLI and tests.

pub mod adapter;
pub mod adapters;
pub mod catalog;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod fields;
pub mod harvest;
pub mod http;
pub mod model;
pub mod refresh;   // Auth-refresh retry-once policy
pub mod session;   // Cookie + token-store locators
pub mod transit;   // Nested-array page state decoder

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use adapter::{AdapterRegistry, BankAdapter, BankId};
pub use adapters::{
    build_adapter, CedarAdapter, HarborAdapter, LakeshoreAdapter, NorthwindAdapter,
    SummitAdapter,
};
pub use config::{AdapterSettings, HarvestConfig};
pub use content::{ContentPolicy, DecodedDocument};
pub use context::SessionContext;
pub use error::{AdapterError, AdapterResult};
pub use harvest::{
    collect_catalog, download_all, file_names, Catalog, DownloadOutcome, DownloadReport,
};
pub use http::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use model::{Account, AccountType, BinaryContent, Profile, Statement};
pub use refresh::{AuthRefreshPolicy, SessionRefresher};
pub use session::{CookieLocator, StoredToken, TokenStoreLocator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

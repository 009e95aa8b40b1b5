// 🏛️ Concrete adapters, one module per bank

pub mod cedar;
pub mod harbor;
pub mod lakeshore;
pub mod northwind;
pub mod summit;

pub use cedar::CedarAdapter;
pub use harbor::HarborAdapter;
pub use lakeshore::LakeshoreAdapter;
pub use northwind::NorthwindAdapter;
pub use summit::SummitAdapter;

use crate::adapter::{AdapterRegistry, BankAdapter, BankId};
use crate::config::{AdapterSettings, HarvestConfig};
use crate::context::SessionContext;
use crate::error::AdapterResult;
use crate::http::Transport;
use std::sync::Arc;

/// Factory: BankId → adapter sharing the given context and transport.
pub fn build_adapter(
    bank: BankId,
    ctx: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    settings: &AdapterSettings,
) -> AdapterResult<Arc<dyn BankAdapter>> {
    let adapter: Arc<dyn BankAdapter> = match bank {
        BankId::Harbor => Arc::new(HarborAdapter::new(ctx, transport, settings)),
        BankId::Summit => Arc::new(SummitAdapter::new(ctx, transport, settings)),
        BankId::Cedar => Arc::new(CedarAdapter::new(ctx, transport, settings)?),
        BankId::Lakeshore => Arc::new(LakeshoreAdapter::new(ctx, transport, settings)),
        BankId::Northwind => Arc::new(NorthwindAdapter::new(ctx, transport, settings)),
    };
    Ok(adapter)
}

impl AdapterRegistry {
    /// Registry holding all five banks. Rejects a config that fails
    /// `HarvestConfig::validate`, however it was built.
    pub fn with_defaults(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        config: &HarvestConfig,
    ) -> AdapterResult<Self> {
        config.validate()?;
        let mut registry = AdapterRegistry::new();
        for bank in BankId::ALL {
            registry.register(build_adapter(
                bank,
                ctx.clone(),
                transport.clone(),
                config.for_bank(bank),
            )?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    #[test]
    fn test_defaults_register_every_bank() {
        let registry = AdapterRegistry::with_defaults(
            Arc::new(SessionContext::new()),
            Arc::new(ScriptedTransport::new()),
            &HarvestConfig::default(),
        )
        .unwrap();

        assert_eq!(
            registry.ids(),
            vec!["cedar", "harbor", "lakeshore", "northwind", "summit"]
        );
        for bank in BankId::ALL {
            assert_eq!(registry.get(bank.code()).unwrap().bank_id(), bank.code());
        }
    }

    #[test]
    fn test_available_detects_sessions_across_banks() {
        let ctx = SessionContext::new()
            .with_cookies("SUMMIT_SESSION=s1; NWSSO=n1; other=x")
            .with_item(
                "oidc.user:https://login.cedar.example:cedar-web",
                json!({ "access_token": "c1", "scope": "openid accounts" }).to_string(),
            );
        let registry = AdapterRegistry::with_defaults(
            Arc::new(ctx),
            Arc::new(ScriptedTransport::new()),
            &HarvestConfig::default(),
        )
        .unwrap();

        let available: Vec<&str> = registry.available().iter().map(|a| a.bank_id()).collect();
        assert_eq!(available, vec!["cedar", "northwind", "summit"]);
    }

    #[test]
    fn test_defaults_reject_out_of_range_settings() {
        let mut config = HarvestConfig::default();
        config.cedar.lookback_years = Some(u32::MAX);

        let result = AdapterRegistry::with_defaults(
            Arc::new(SessionContext::new()),
            Arc::new(ScriptedTransport::new()),
            &config,
        );
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }
}

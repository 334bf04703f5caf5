use std::sync::Arc;

use kosh_authority::AuthorityService;
use kosh_common::auth::TokenCodec;
use kosh_common::config::CoreConfig;
use kosh_common::{Currency, Result};
use kosh_events::EventHub;
use kosh_identity::IdentityService;
use kosh_ledger::LedgerService;
use kosh_orchestrator::risk::HttpRiskGate;
use kosh_orchestrator::Orchestrator;
use kosh_store::Store;
use kosh_wallet::WalletService;

/// Everything a request handler can reach, built once at boot and threaded
/// explicitly. No ambient globals.
#[derive(Clone)]
pub struct AppContext {
    pub config: CoreConfig,
    pub store: Store,
    pub ledger: LedgerService,
    pub wallets: WalletService,
    pub authority: AuthorityService,
    pub identity: IdentityService,
    pub orchestrator: Orchestrator,
    pub events: EventHub,
}

/// Builds the component graph and seeds the chart and built-in roles.
pub async fn build(config: CoreConfig, seed: bool) -> Result<AppContext> {
    let store = Store::new();
    if seed {
        store
            .write(|t| {
                kosh_ledger::chart::seed_chart(t, Currency::Inr)?;
                kosh_authority::seed::seed_builtin_roles(t)
            })
            .await?;
        tracing::info!("system chart and built-in roles seeded");
    }

    let codec = TokenCodec::new(&config.jwt_secret)?;
    let ledger = LedgerService::new(store.clone());
    let wallets = WalletService::new(store.clone());
    let authority = AuthorityService::new(store.clone());
    let identity = IdentityService::new(
        store.clone(),
        authority.clone(),
        wallets.clone(),
        codec,
        config.token_ttl_secs,
    );
    let events = EventHub::new();
    let orchestrator = Orchestrator::new(
        store.clone(),
        identity.clone(),
        events.clone(),
        Arc::new(HttpRiskGate::new(config.service_urls.risk.clone())),
        config.high_value_threshold,
    );

    Ok(AppContext {
        config,
        store,
        ledger,
        wallets,
        authority,
        identity,
        orchestrator,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kosh_common::config::ServiceUrls;
    use kosh_common::Paise;

    fn test_config() -> CoreConfig {
        CoreConfig {
            database_url: "kosh://test".into(),
            jwt_secret: b"0123456789abcdef0123456789abcdef".to_vec(),
            service_port: 0,
            gateway_url: "http://127.0.0.1:8080".into(),
            service_urls: ServiceUrls {
                ledger: "http://127.0.0.1:8081".into(),
                wallet: "http://127.0.0.1:8082".into(),
                authority: "http://127.0.0.1:8083".into(),
                identity: "http://127.0.0.1:8084".into(),
                orchestrator: "http://127.0.0.1:8085".into(),
                events: "http://127.0.0.1:8086".into(),
                risk: "http://127.0.0.1:8090".into(),
            },
            migrations_dir: "./migrations".into(),
            log_level: "info".into(),
            high_value_threshold: Paise(50_000),
            token_ttl_secs: 3600,
        }
    }

    #[tokio::test]
    async fn test_build_seeds_chart_and_roles() {
        let ctx = build(test_config(), true).await.unwrap();
        let seeded = ctx
            .store
            .read(|t| {
                (
                    t.account_by_code(kosh_ledger::chart::SYSTEM_CASH_CODE).is_some(),
                    t.role_by_name(kosh_authority::seed::ROLE_USER).is_some(),
                )
            })
            .await;
        assert_eq!(seeded, (true, true));
    }

    #[tokio::test]
    async fn test_short_secret_is_fatal() {
        let mut config = test_config();
        config.jwt_secret = b"short".to_vec();
        assert!(build(config, false).await.is_err());
    }
}

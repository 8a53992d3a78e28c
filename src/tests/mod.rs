//! Ceremony tests over an in-memory database, a manual clock and a software
//! authenticator.

mod registration;

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::clock::{Clock, ManualClock};
use crate::config::{Config, CounterPolicy, SessionConfig, WebauthnConfig};
use crate::state::AppState;
use crate::webauthn::coordinator::CeremonyOutcome;
use crate::webauthn::CeremonyCoordinator;
use authenticator::SoftAuthenticator;

pub const ORIGIN: &str = "https://shop.example.com";
pub const RP_ID: &str = "shop.example.com";

pub fn test_config() -> Config {
    let webauthn = WebauthnConfig::for_origin(ORIGIN, None, "Storefront").unwrap();
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        webauthn,
        session: SessionConfig {
            secret: "test-secret".to_string(),
            previous_secrets: vec![],
            ttl: Duration::days(7),
            cookie_secure: true,
        },
    }
}

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_policy(policy: CounterPolicy) -> Self {
        let mut config = test_config();
        config.webauthn.counter_policy = policy;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Self {
        let pool = crate::db::connect_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let state = AppState::with_pool(pool, config, clock.clone() as Arc<dyn Clock>);
        Self { state, clock }
    }

    pub fn coordinator(&self) -> &CeremonyCoordinator {
        &self.state.coordinator
    }

    pub fn authenticator(&self) -> SoftAuthenticator {
        SoftAuthenticator::new(RP_ID, ORIGIN)
    }

    /// Run a full registration for `email` with `authenticator`.
    pub async fn register(&self, authenticator: &SoftAuthenticator, email: &str) -> CeremonyOutcome {
        let start = self
            .coordinator()
            .begin_registration("Ada Lovelace", email)
            .await
            .unwrap();
        let response = authenticator.register(&start.options);
        self.coordinator()
            .finish_registration(&start.user_id, &response)
            .await
            .unwrap()
    }
}

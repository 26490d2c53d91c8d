//! Application state

use std::sync::Arc;

use bizreport_billing::{BillingError, BillingService, TierRegistry};
use bizreport_shared::DynStore;
use thiserror::Error;

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
    reports::ReportOrchestrator,
    workflow::{ChatClient, ChatError, WorkflowClient, WorkflowError},
};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Billing setup failed: {0}")]
    Billing(#[from] BillingError),

    #[error("Workflow client setup failed: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Chat client setup failed: {0}")]
    Chat(#[from] ChatError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: DynStore,
    pub jwt_manager: JwtManager,
    pub billing: BillingService,
    pub orchestrator: ReportOrchestrator,
    /// Chat token issuance; `None` when the chat provider is not configured
    pub chat: Option<ChatClient>,
}

impl AppState {
    /// Build state with the tier catalog priced from the environment
    pub fn new(store: DynStore, config: Config) -> Result<Self, StateError> {
        let tiers = TierRegistry::from_env()?;
        Self::with_tiers(store, config, tiers)
    }

    pub fn with_tiers(
        store: DynStore,
        config: Config,
        tiers: TierRegistry,
    ) -> Result<Self, StateError> {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let stale_after = time::Duration::try_from(config.stale_report_after)
            .unwrap_or(time::Duration::minutes(15));
        let billing = BillingService::new(store.clone(), tiers, stale_after);
        tracing::info!(
            tiers = billing.tiers.list_tiers().len(),
            "Billing service initialized"
        );

        let workflow = WorkflowClient::new(
            &config.workflow_url,
            &config.workflow_api_key,
            config.workflow_timeout,
        )?;
        tracing::info!(
            url = %config.workflow_url,
            timeout_secs = config.workflow_timeout.as_secs(),
            "Workflow client initialized"
        );

        let orchestrator = ReportOrchestrator::new(
            store.clone(),
            billing.ledger.clone(),
            workflow,
            config.upgrade_url(),
            config.max_report_attempts,
        );

        let chat = match (
            config.chat_token_url.as_deref(),
            config.chat_api_key.as_deref(),
            config.chat_bot_id.as_deref(),
        ) {
            (Some(url), Some(api_key), Some(bot_id)) => {
                tracing::info!("Chat token issuance enabled");
                Some(ChatClient::new(url, api_key, bot_id)?)
            }
            _ => {
                tracing::warn!(
                    "Chat token issuance not configured (missing CHAT_TOKEN_URL, CHAT_API_KEY or CHAT_BOT_ID)"
                );
                None
            }
        };

        Ok(Self {
            config,
            store,
            jwt_manager,
            billing,
            orchestrator,
            chat,
        })
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }

    pub fn tiers(&self) -> &Arc<TierRegistry> {
        &self.billing.tiers
    }
}

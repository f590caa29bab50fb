use std::sync::atomic::{AtomicU64, Ordering};

use crate::bearer::BearerResolver;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::transport::UpstreamClient;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub client: UpstreamClient,
    pub bearer: BearerResolver,
    request_seq: AtomicU64,
}

impl AppState {
    /// Build the shared state from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the upstream HTTP client
    /// cannot be constructed.
    pub fn new(config: AppConfig) -> Result<Self, GatewayError> {
        let client = UpstreamClient::new(&config.upstream)?;
        let bearer = BearerResolver::new(&config.auth);
        Ok(Self {
            config,
            client,
            bearer,
            request_seq: AtomicU64::new(1),
        })
    }

    /// Generate a process-unique id for request log correlation.
    #[must_use]
    pub fn next_request_id(&self) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed);
        format!("req-{seq:016x}")
    }
}

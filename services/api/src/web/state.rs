//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use records_core::ports::{ActivationNotifier, RecordsRepository};
use records_core::roles::ResolutionPolicy;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn RecordsRepository>,
    pub notifier: Arc<dyn ActivationNotifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn RecordsRepository>,
        notifier: Arc<dyn ActivationNotifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repo,
            notifier,
            config,
        }
    }

    pub fn resolution_policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            email_fallback: self.config.allow_email_role_fallback,
        }
    }
}

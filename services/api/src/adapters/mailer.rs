//! services/api/src/adapters/mailer.rs
//!
//! The console mail backend: activation emails are written to the log instead of
//! being delivered over SMTP.

use async_trait::async_trait;
use records_core::ports::{ActivationMessage, ActivationNotifier, PortResult};
use std::sync::Mutex;
use tracing::info;

/// Logs every activation message at `info` level.
#[derive(Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActivationNotifier for LogNotifier {
    async fn send_activation(&self, message: &ActivationMessage) -> PortResult<()> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "Activation email:\n{}",
            message.body
        );
        Ok(())
    }
}

/// Keeps sent messages in memory so tests can follow the activation link.
#[derive(Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<ActivationMessage>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ActivationMessage> {
        self.sent
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActivationNotifier for OutboxNotifier {
    async fn send_activation(&self, message: &ActivationMessage) -> PortResult<()> {
        info!(to = %message.to, "Queued activation email in outbox");
        if let Ok(mut outbox) = self.sent.lock() {
            outbox.push(message.clone());
        }
        Ok(())
    }
}

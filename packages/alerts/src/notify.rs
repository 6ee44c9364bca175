//! Notification channel seam.
//!
//! Transport gateways (SMS/WhatsApp/email providers) live outside this
//! core; the engine only needs `send(address, message)` per channel.
//! Every send is isolated behind its own timeout by the engine, so a
//! stalled provider never stalls the run.

use async_trait::async_trait;
use crime_pulse_alerts_models::Channel;
use thiserror::Error;

/// A notification send failure. Always non-fatal: the engine logs it and
/// moves on to the next recipient/channel.
#[derive(Debug, Error)]
#[error("notification send failed: {message}")]
pub struct NotifyError {
    /// Description of what went wrong.
    pub message: String,
}

/// Delivers one message to one address over one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempts a single delivery.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the underlying gateway rejects or
    /// fails the send.
    async fn send(&self, channel: Channel, address: &str, message: &str)
    -> Result<(), NotifyError>;
}

/// Notifier that only logs. Default for local runs and the `schedule`
/// loop until a real gateway collaborator is wired in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        channel: Channel,
        address: &str,
        message: &str,
    ) -> Result<(), NotifyError> {
        log::info!("[{channel}] -> {address}: {message}");
        Ok(())
    }
}

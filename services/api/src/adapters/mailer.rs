//! services/api/src/adapters/mailer.rs
//!
//! A `Mailer` that writes outgoing mail to the log instead of sending it.
//! Useful for local development, where nobody wants real password-reset emails.

use async_trait::async_trait;
use progress_core::ports::{Mailer, PortResult};
use tracing::info;

#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, email: &str, token: &str) -> PortResult<()> {
        info!(to = %email, reset_token = %token, "Password reset requested");
        Ok(())
    }
}

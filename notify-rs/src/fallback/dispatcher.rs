use std::sync::Arc;
use tracing::{info, warn};

use super::types::{DeliveryChannel, FallbackDelivery};
use crate::counter::DailyCounter;
use crate::credential::guard::mask_key;
use crate::credential::CredentialRecord;
use crate::error::{NotifyError, Result};
use crate::transport::push::truncate_body;
use crate::transport::{EmailContext, EmailTransport, PushData, PushTransport};
use crate::utils::Clock;

pub struct FallbackDispatcher {
    email: Arc<dyn EmailTransport>,
    push: Arc<dyn PushTransport>,
    email_counter: DailyCounter,
    clock: Arc<dyn Clock>,
    click_url: String,
}

impl FallbackDispatcher {
    pub fn new(
        email: Arc<dyn EmailTransport>,
        push: Arc<dyn PushTransport>,
        email_counter: DailyCounter,
        clock: Arc<dyn Clock>,
        click_url: impl Into<String>,
    ) -> Self {
        FallbackDispatcher {
            email,
            push,
            email_counter,
            clock,
            click_url: click_url.into(),
        }
    }

    pub fn email_counter(&self) -> &DailyCounter {
        &self.email_counter
    }

    /// Deliver `message` to the credential owner over email, then push
    ///
    /// Returns `CapacityExceeded` when neither channel delivered.
    pub async fn dispatch(
        &self,
        credential: &CredentialRecord,
        recipient: &str,
        message: &str,
    ) -> Result<FallbackDelivery> {
        if let Some(address) = credential.email.as_deref() {
            if let Some(delivery) = self.try_email(credential, address, recipient, message).await {
                return Ok(delivery);
            }
        }

        if let Some(delivery) = self.try_push(credential, recipient, message).await {
            return Ok(delivery);
        }

        warn!(
            "No fallback channel delivered for {}",
            mask_key(&credential.api_key)
        );
        Err(NotifyError::CapacityExceeded)
    }

    async fn try_email(
        &self,
        credential: &CredentialRecord,
        address: &str,
        recipient: &str,
        message: &str,
    ) -> Option<FallbackDelivery> {
        match self.email_counter.is_exhausted().await {
            Ok(false) => {}
            Ok(true) => {
                info!("Email capacity exhausted, skipping email fallback");
                return None;
            }
            Err(e) => {
                warn!("Email counter unavailable, skipping email fallback: {}", e);
                return None;
            }
        }

        let count = match self.email_counter.increment().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Email counter unavailable, skipping email fallback: {}", e);
                return None;
            }
        };
        if count > self.email_counter.limit() {
            // Another request took the last slot first
            self.release_email_slot().await;
            return None;
        }

        let context = EmailContext {
            project_name: credential.project_name.clone(),
            original_recipient: recipient.to_string(),
        };

        match self.email.send(address, message, &context).await {
            Ok(receipt) => {
                info!(
                    "Delivered by email fallback for {} ({}/{})",
                    mask_key(&credential.api_key),
                    count,
                    self.email_counter.limit()
                );
                Some(FallbackDelivery {
                    channel: DeliveryChannel::EmailFallback,
                    delivered_to: address.to_string(),
                    receipt: Some(receipt),
                    push: None,
                    email_count: Some(count),
                })
            }
            Err(e) => {
                warn!("Email fallback failed: {}", e);
                self.release_email_slot().await;
                None
            }
        }
    }

    async fn release_email_slot(&self) {
        if let Err(e) = self.email_counter.decrement().await {
            warn!("Failed to roll back email counter: {}", e);
        }
    }

    async fn try_push(
        &self,
        credential: &CredentialRecord,
        recipient: &str,
        message: &str,
    ) -> Option<FallbackDelivery> {
        let title = format!("Message from {}", credential.project_name);
        let body = truncate_body(message);
        let data = PushData {
            url: self.click_url.clone(),
            recipient: recipient.to_string(),
            timestamp: self.clock.now(),
        };

        match self
            .push
            .send(&credential.user_id, &title, &body, &data)
            .await
        {
            Ok(outcome) if outcome.delivered() => {
                info!(
                    "Delivered by push fallback for {} ({}/{} devices)",
                    mask_key(&credential.api_key),
                    outcome.sent,
                    outcome.total
                );
                Some(FallbackDelivery {
                    channel: DeliveryChannel::WebPush,
                    delivered_to: credential.user_id.clone(),
                    receipt: None,
                    push: Some(outcome),
                    email_count: None,
                })
            }
            Ok(outcome) => {
                info!(
                    "Push fallback reached no device ({} subscriptions)",
                    outcome.total
                );
                None
            }
            Err(e) => {
                warn!("Push fallback failed: {}", e);
                None
            }
        }
    }
}

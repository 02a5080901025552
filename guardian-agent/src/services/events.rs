use crate::config::NotifyConfig;
use crate::models::ThreatEvent;
use crate::services::mailer::{Mailer, OutgoingMail};
use crate::services::store::AgentStore;
use crate::services::template::{render, EventFields};
use agent_core::error::AppError;
use std::sync::Arc;

/// Delivery report for one processed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReceipt {
    pub user_mail_sent: bool,
    pub support_copy_sent: bool,
}

/// Turns threat events from the risk service into user notifications.
pub struct EventProcessor {
    store: Arc<dyn AgentStore>,
    mailer: Arc<dyn Mailer>,
    notify: NotifyConfig,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn AgentStore>, mailer: Arc<dyn Mailer>, notify: NotifyConfig) -> Self {
        Self {
            store,
            mailer,
            notify,
        }
    }

    /// Fails with `UnknownUserHash` when no local account matches; callers
    /// drop the event rather than crash on it.
    pub async fn process_event(&self, event: &ThreatEvent) -> Result<EventReceipt, AppError> {
        let link = self
            .store
            .find_user_by_hash(&event.user_hash)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    user_hash = %event.user_hash,
                    "No local user for event hash"
                );
                AppError::UnknownUserHash(event.user_hash.clone())
            })?;

        let fields = EventFields::from_event(
            event,
            &self.notify.date_format,
            &self.notify.time_format,
        );
        let body_text = render(&self.notify.email_text, &fields);
        let body_html = render(&self.notify.email_html, &fields);

        let mut user_mail_sent = false;
        if self.notify.test_mode {
            tracing::info!(
                username = %link.username,
                "Test mode: skipping user notification"
            );
        } else {
            let mail = OutgoingMail {
                to: link.email.clone(),
                subject: self.notify.email_subject.clone(),
                body_text: body_text.clone(),
                body_html: body_html.clone(),
            };
            match self.mailer.send(&mail).await {
                Ok(()) => user_mail_sent = true,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        username = %link.username,
                        "Failed to notify user of threat event"
                    );
                }
            }
        }

        let mut support_copy_sent = false;
        if let Some(support_addr) = &self.notify.support_addr {
            let mail = OutgoingMail {
                to: support_addr.clone(),
                subject: format!("{} (user {})", self.notify.email_subject, link.username),
                body_text,
                body_html,
            };
            match self.mailer.send(&mail).await {
                Ok(()) => support_copy_sent = true,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        support_addr = %support_addr,
                        "Failed to send support copy of threat event"
                    );
                }
            }
        }

        tracing::info!(
            username = %link.username,
            user_mail_sent,
            support_copy_sent,
            "Processed threat event"
        );

        Ok(EventReceipt {
            user_mail_sent,
            support_copy_sent,
        })
    }
}

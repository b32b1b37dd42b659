use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use crate::error::NotifierError;
use crate::models::AppointmentType;

pub const REMINDER_SUBJECT: &str = "Appointment reminder";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifierError>;
}

/// Builds the HTML body of the reminder sent ahead of an appointment.
pub fn reminder_body(appointment_type: AppointmentType, date_time: DateTime<Utc>) -> String {
    format!(
        "<html><body>\
         <h2>{subject}</h2>\
         <p>This is a reminder of your upcoming <strong>{label}</strong> appointment.</p>\
         <p>Date: <strong>{date}</strong></p>\
         <p>If you cannot attend, please cancel the reservation so the slot can be offered to someone else.</p>\
         </body></html>",
        subject = REMINDER_SUBJECT,
        label = appointment_type.label(),
        date = date_time.format("%d/%m/%Y at %H:%M"),
    )
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        info!("Notification to {}: {}", recipient, subject);
        debug!("Notification body: {}", body);
        Ok(())
    }
}

/// Posts notifications as JSON to an HTTP endpoint (mail relay, chat hook, ...).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        debug!("Posting notification for {} to {}", recipient, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "to": recipient,
                "subject": subject,
                "html": body,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

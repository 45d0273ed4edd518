//! 参与状态变更通知
//!
//! 向配置的 webhook 地址异步推送 JSON，失败只记录日志，不影响主流程。

use serde::Serialize;

use crate::config::NotificationConfig;
use crate::entities::{ParticipationStatus, StatusReason};

#[derive(Debug, Clone, Serialize)]
pub struct ParticipationNotification {
    pub event: &'static str,
    pub raffle_id: i64,
    pub raffle_name: String,
    pub reference: String,
    pub participant_name: String,
    pub participant_email: String,
    pub elements: Vec<String>,
    pub status: ParticipationStatus,
    pub reason: Option<StatusReason>,
}

impl ParticipationNotification {
    pub fn event_name(status: ParticipationStatus) -> &'static str {
        match status {
            ParticipationStatus::Confirmed => "participation.confirmed",
            ParticipationStatus::Rejected => "participation.rejected",
            ParticipationStatus::Pending => "participation.pending",
        }
    }
}

#[derive(Clone, Default)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone().filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// fire-and-forget
    pub fn send(&self, notification: ParticipationNotification) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&notification)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => log::info!(
                    "Notification {} sent for participation {}",
                    notification.event,
                    notification.reference
                ),
                Err(e) => log::warn!(
                    "Notification {} for participation {} failed: {e}",
                    notification.event,
                    notification.reference
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_url() {
        assert!(!Notifier::new(&NotificationConfig::default()).is_enabled());
        assert!(!Notifier::new(&NotificationConfig {
            webhook_url: Some("  ".into())
        })
        .is_enabled());
        assert!(Notifier::new(&NotificationConfig {
            webhook_url: Some("https://hooks.example.com/raffles".into())
        })
        .is_enabled());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            ParticipationNotification::event_name(ParticipationStatus::Confirmed),
            "participation.confirmed"
        );
        assert_eq!(
            ParticipationNotification::event_name(ParticipationStatus::Rejected),
            "participation.rejected"
        );
    }
}
